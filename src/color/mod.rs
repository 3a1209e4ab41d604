//! Conversion between raw sample bytes and [`FrameBuffer`] pixels.
//!
//! Every combination of photometric interpretation, channel count, bit width, sample kind and
//! arrangement resolves to one [`ColorType`]. [`color_codec`] maps a color type to the
//! [`ColorCodec`] that unpacks (and, for the encodable subset, packs) its samples.

mod cmyk;
mod gray;
mod palette;
mod rgb;
pub(crate) mod samples;
mod ycbcr;

use std::fmt::Debug;
use std::sync::Arc;

pub use cmyk::{CieLabCodec, CmykCodec};
pub use gray::{GrayCodec, GrayFloatCodec};
pub use palette::PaletteCodec;
pub use rgb::RgbCodec;
pub use ycbcr::{YCbCrCodec, YCbCrInfo};

use crate::error::TiffCodecResult;
use crate::frame::{FrameBuffer, PixelFormat};
use crate::options::{BitsPerSample, ExtraSampleType};
use crate::quantize::Palette;
use crate::reader::Endianness;
use crate::tiff::{TiffResult, TiffUnsupportedError};

/// The resolved pixel encoding of a frame.
///
/// Fixed variants name the per-channel bit widths; the unsuffixed variant of each family covers any
/// other legal width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum ColorType {
    WhiteIsZero1,
    WhiteIsZero4,
    WhiteIsZero8,
    WhiteIsZero16,
    WhiteIsZero24,
    WhiteIsZero32,
    WhiteIsZero32Float,
    WhiteIsZero,

    BlackIsZero1,
    BlackIsZero4,
    BlackIsZero8,
    BlackIsZero16,
    BlackIsZero24,
    BlackIsZero32,
    BlackIsZero32Float,
    BlackIsZero,

    PaletteColor,

    Rgb222,
    Rgb444,
    Rgb888,
    Rgb101010,
    Rgb121212,
    Rgb141414,
    Rgb161616,
    Rgb242424,
    Rgb323232,
    RgbFloat323232,
    Rgb,

    Rgba2222,
    Rgba4444,
    Rgba8888,
    Rgba10101010,
    Rgba12121212,
    Rgba14141414,
    Rgba16161616,
    Rgba24242424,
    Rgba32323232,
    RgbaFloat32323232,
    Rgba,

    Rgb888Planar,
    Rgb161616Planar,
    Rgb242424Planar,
    Rgb323232Planar,
    RgbFloat323232Planar,
    RgbPlanar,

    Rgba8888Planar,
    Rgba16161616Planar,
    Rgba24242424Planar,
    Rgba32323232Planar,
    RgbaFloat32323232Planar,
    RgbaPlanar,

    YCbCr,
    YCbCrPlanar,
    Cmyk,
    CieLab,
    CieLabPlanar,
}

impl ColorType {
    /// Whether samples of this type are stored one channel per plane.
    pub fn is_planar(&self) -> bool {
        use ColorType::*;
        matches!(
            self,
            Rgb888Planar
                | Rgb161616Planar
                | Rgb242424Planar
                | Rgb323232Planar
                | RgbFloat323232Planar
                | RgbPlanar
                | Rgba8888Planar
                | Rgba16161616Planar
                | Rgba24242424Planar
                | Rgba32323232Planar
                | RgbaFloat32323232Planar
                | RgbaPlanar
                | YCbCrPlanar
                | CieLabPlanar
        )
    }

    /// The grayscale variant for samples of `bits` bits.
    pub(crate) fn gray(white_is_zero: bool, bits: u16, float: bool) -> Self {
        use ColorType::*;
        match (white_is_zero, bits, float) {
            (true, 32, true) => WhiteIsZero32Float,
            (true, 1, _) => WhiteIsZero1,
            (true, 4, _) => WhiteIsZero4,
            (true, 8, _) => WhiteIsZero8,
            (true, 16, _) => WhiteIsZero16,
            (true, 24, _) => WhiteIsZero24,
            (true, 32, _) => WhiteIsZero32,
            (true, _, _) => WhiteIsZero,
            (false, 32, true) => BlackIsZero32Float,
            (false, 1, _) => BlackIsZero1,
            (false, 4, _) => BlackIsZero4,
            (false, 8, _) => BlackIsZero8,
            (false, 16, _) => BlackIsZero16,
            (false, 24, _) => BlackIsZero24,
            (false, 32, _) => BlackIsZero32,
            (false, _, _) => BlackIsZero,
        }
    }

    /// The RGB variant with `channels` (3 or 4) channels of `bits` bits each.
    pub(crate) fn rgb(channels: usize, bits: u16, float: bool, planar: bool) -> Self {
        use ColorType::*;
        match (planar, channels, bits, float) {
            (false, 3, 32, true) => RgbFloat323232,
            (false, 3, 2, _) => Rgb222,
            (false, 3, 4, _) => Rgb444,
            (false, 3, 8, _) => Rgb888,
            (false, 3, 10, _) => Rgb101010,
            (false, 3, 12, _) => Rgb121212,
            (false, 3, 14, _) => Rgb141414,
            (false, 3, 16, _) => Rgb161616,
            (false, 3, 24, _) => Rgb242424,
            (false, 3, 32, _) => Rgb323232,
            (false, 3, _, _) => Rgb,
            (false, _, 32, true) => RgbaFloat32323232,
            (false, _, 2, _) => Rgba2222,
            (false, _, 4, _) => Rgba4444,
            (false, _, 8, _) => Rgba8888,
            (false, _, 10, _) => Rgba10101010,
            (false, _, 12, _) => Rgba12121212,
            (false, _, 14, _) => Rgba14141414,
            (false, _, 16, _) => Rgba16161616,
            (false, _, 24, _) => Rgba24242424,
            (false, _, 32, _) => Rgba32323232,
            (false, _, _, _) => Rgba,
            (true, 3, 32, true) => RgbFloat323232Planar,
            (true, 3, 8, _) => Rgb888Planar,
            (true, 3, 16, _) => Rgb161616Planar,
            (true, 3, 24, _) => Rgb242424Planar,
            (true, 3, 32, _) => Rgb323232Planar,
            (true, 3, _, _) => RgbPlanar,
            (true, _, 32, true) => RgbaFloat32323232Planar,
            (true, _, 8, _) => Rgba8888Planar,
            (true, _, 16, _) => Rgba16161616Planar,
            (true, _, 24, _) => Rgba24242424Planar,
            (true, _, 32, _) => Rgba32323232Planar,
            (true, _, _, _) => RgbaPlanar,
        }
    }
}

/// Everything a codec needs beyond its [`ColorType`].
#[derive(Debug, Clone)]
pub struct CodecContext {
    /// Byte order of multi-byte samples
    pub endianness: Endianness,
    /// Per-channel bit widths
    pub bits_per_sample: BitsPerSample,
    /// Meaning of the fourth channel, if any
    pub extra_samples: Option<ExtraSampleType>,
    /// ColorMap entries for decoding palette images
    pub color_map: Option<Arc<[u16]>>,
    /// Palette for encoding palette images
    pub palette: Option<Arc<Palette>>,
    /// YCbCr conversion parameters
    pub ycbcr: YCbCrInfo,
}

/// A converter between raw sample bytes and pixels of a [`FrameBuffer`].
///
/// `data` and `planes` hold `height` rows of `width` pixels, in the stream's byte order, each row
/// padded to a byte boundary. `(x, y)` is where the top left pixel lands in the frame.
pub trait ColorCodec: Debug + Send + Sync {
    /// The frame layout this codec decodes into.
    fn pixel_format(&self) -> PixelFormat;

    /// Unpack interleaved samples into `frame`.
    fn decode(
        &self,
        data: &[u8],
        frame: &mut FrameBuffer,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> TiffCodecResult<()>;

    /// Unpack one plane per channel into `frame`.
    fn decode_planar(
        &self,
        _planes: &[&[u8]],
        _frame: &mut FrameBuffer,
        _x: u32,
        _y: u32,
        _width: u32,
        _height: u32,
    ) -> TiffCodecResult<()> {
        Err(TiffUnsupportedError::UnsupportedPlanarConfig(Some(
            crate::tiff::tags::PlanarConfiguration::Planar,
        ))
        .into())
    }

    /// Pack the pixels of a rectangle of `frame` as interleaved samples, appending to `out`.
    fn encode(
        &self,
        _frame: &FrameBuffer,
        _x: u32,
        _y: u32,
        _width: u32,
        _height: u32,
        _out: &mut Vec<u8>,
    ) -> TiffCodecResult<()> {
        Err(TiffUnsupportedError::EncodingWithoutCodec.into())
    }
}

/// Look up the codec for `color_type`.
pub fn color_codec(color_type: ColorType, context: &CodecContext) -> TiffResult<Box<dyn ColorCodec>> {
    use ColorType::*;
    let endianness = context.endianness;
    let bits = context.bits_per_sample.channel(0);
    let associated = context.extra_samples == Some(ExtraSampleType::AssociatedAlphaData);

    let codec: Box<dyn ColorCodec> = match color_type {
        WhiteIsZero1 | WhiteIsZero4 | WhiteIsZero8 | WhiteIsZero16 | WhiteIsZero24
        | WhiteIsZero32 | WhiteIsZero => Box::new(GrayCodec::new(bits, true, endianness)?),
        BlackIsZero1 | BlackIsZero4 | BlackIsZero8 | BlackIsZero16 | BlackIsZero24
        | BlackIsZero32 | BlackIsZero => Box::new(GrayCodec::new(bits, false, endianness)?),
        WhiteIsZero32Float => Box::new(GrayFloatCodec::new(true, endianness)),
        BlackIsZero32Float => Box::new(GrayFloatCodec::new(false, endianness)),

        PaletteColor => Box::new(PaletteCodec::new(
            bits,
            context.color_map.clone(),
            context.palette.clone(),
        )?),

        Rgb222 | Rgb444 | Rgb888 | Rgb101010 | Rgb121212 | Rgb141414 | Rgb161616 | Rgb242424
        | Rgb323232 | Rgb | Rgb888Planar | Rgb161616Planar | Rgb242424Planar
        | Rgb323232Planar | RgbPlanar => {
            Box::new(RgbCodec::new(3, bits, false, false, endianness)?)
        }
        RgbFloat323232 | RgbFloat323232Planar => {
            Box::new(RgbCodec::new(3, 32, true, false, endianness)?)
        }
        Rgba2222 | Rgba4444 | Rgba8888 | Rgba10101010 | Rgba12121212 | Rgba14141414
        | Rgba16161616 | Rgba24242424 | Rgba32323232 | Rgba | Rgba8888Planar
        | Rgba16161616Planar | Rgba24242424Planar | Rgba32323232Planar | RgbaPlanar => {
            Box::new(RgbCodec::new(4, bits, false, associated, endianness)?)
        }
        RgbaFloat32323232 | RgbaFloat32323232Planar => {
            Box::new(RgbCodec::new(4, 32, true, associated, endianness)?)
        }

        YCbCr | YCbCrPlanar => Box::new(YCbCrCodec::new(context.ycbcr)),
        Cmyk => Box::new(CmykCodec),
        CieLab | CieLabPlanar => Box::new(CieLabCodec),
    };
    Ok(codec)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame::{Channels, PixelData, SampleDepth};

    fn context(bits: &[u16]) -> CodecContext {
        CodecContext {
            endianness: Endianness::BigEndian,
            bits_per_sample: BitsPerSample::new(bits),
            extra_samples: None,
            color_map: None,
            palette: None,
            ycbcr: YCbCrInfo::default(),
        }
    }

    #[test]
    fn selects_dense_and_generic_variants() {
        assert_eq!(ColorType::rgb(3, 8, false, false), ColorType::Rgb888);
        assert_eq!(ColorType::rgb(4, 16, false, true), ColorType::Rgba16161616Planar);
        assert_eq!(ColorType::rgb(3, 5, false, false), ColorType::Rgb);
        assert_eq!(ColorType::gray(true, 32, true), ColorType::WhiteIsZero32Float);
        assert_eq!(ColorType::gray(false, 12, false), ColorType::BlackIsZero);
        assert!(ColorType::YCbCrPlanar.is_planar());
        assert!(!ColorType::Rgb888.is_planar());
    }

    #[test]
    fn codec_pixel_formats_follow_sample_width() {
        let codec = color_codec(ColorType::Rgb, &context(&[12, 12, 12])).unwrap();
        assert_eq!(
            codec.pixel_format(),
            PixelFormat::new(Channels::Rgb, SampleDepth::U16)
        );
        let codec = color_codec(ColorType::BlackIsZero1, &context(&[1])).unwrap();
        assert_eq!(codec.pixel_format(), PixelFormat::new(Channels::L, SampleDepth::U8));
    }

    #[test]
    fn decodes_rgb_planes() {
        let codec = color_codec(ColorType::Rgb888Planar, &context(&[8, 8, 8])).unwrap();
        let mut frame = FrameBuffer::new(2, 1, codec.pixel_format()).unwrap();
        let planes: [&[u8]; 3] = [&[1, 2], &[3, 4], &[5, 6]];
        codec.decode_planar(&planes, &mut frame, 0, 0, 2, 1).unwrap();
        assert_eq!(frame.data(), &PixelData::U8(vec![1, 3, 5, 2, 4, 6]));
    }
}
