use std::sync::Arc;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use tracing::debug;

use crate::color::samples::row_bytes;
use crate::color::{CodecContext, ColorType, YCbCrInfo};
use crate::frame::{Channels, PixelFormat, SampleDepth};
use crate::options::{BitsPerSample, CompressionType, ExtraSampleType};
use crate::quantize::Palette;
use crate::reader::Endianness;
use crate::tiff::tags::{PhotometricInterpretation, Predictor};

/// Total bits per pixel an encoder can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum BitsPerPixel {
    Bit1 = 1,
    Bit4 = 4,
    Bit6 = 6,
    Bit8 = 8,
    Bit10 = 10,
    Bit12 = 12,
    Bit14 = 14,
    Bit16 = 16,
    Bit24 = 24,
    Bit30 = 30,
    Bit32 = 32,
    Bit36 = 36,
    Bit42 = 42,
    Bit48 = 48,
    Bit64 = 64,
}

/// One rank of encoder settings. Any field may be left open for a lower rank to fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeRequest {
    /// Total bits per pixel
    pub bits_per_pixel: Option<BitsPerPixel>,
    /// Photometric interpretation
    pub photometric_interpretation: Option<PhotometricInterpretation>,
    /// Compression
    pub compression: Option<CompressionType>,
    /// Predictor
    pub predictor: Option<Predictor>,
}

impl EncodeRequest {
    /// Fill every open field of `self` from `lower`.
    pub fn or(self, lower: EncodeRequest) -> EncodeRequest {
        EncodeRequest {
            bits_per_pixel: self.bits_per_pixel.or(lower.bits_per_pixel),
            photometric_interpretation: self
                .photometric_interpretation
                .or(lower.photometric_interpretation),
            compression: self.compression.or(lower.compression),
            predictor: self.predictor.or(lower.predictor),
        }
    }

    /// Settings used when neither the caller nor the frame provide one.
    pub fn defaults() -> EncodeRequest {
        EncodeRequest {
            bits_per_pixel: Some(BitsPerPixel::Bit24),
            photometric_interpretation: Some(PhotometricInterpretation::RGB),
            compression: Some(CompressionType::None),
            predictor: Some(Predictor::None),
        }
    }
}

/// The sanitized settings one frame is encoded with.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeParameters {
    /// Total bits per pixel
    pub bits_per_pixel: BitsPerPixel,
    /// Photometric interpretation
    pub photometric_interpretation: PhotometricInterpretation,
    /// Compression
    pub compression: CompressionType,
    /// Predictor
    pub predictor: Predictor,
    /// Pixel encoding written
    pub color_type: ColorType,
    /// Per-channel bit widths written
    pub bits_per_sample: BitsPerSample,
    /// Meaning of the alpha channel, if one is written
    pub extra_samples: Option<ExtraSampleType>,
    /// Byte order of the output stream
    pub endianness: Endianness,
}

impl EncodeParameters {
    /// Merge `explicit` over `inherited` over the built-in defaults, and sanitize the result.
    ///
    /// Bits per pixel come from the explicit request, then from the explicit photometric
    /// interpretation, then from the inherited settings, and last from `source`, the format of the
    /// pixels being encoded.
    pub fn resolve(
        explicit: &EncodeRequest,
        inherited: &EncodeRequest,
        source: PixelFormat,
    ) -> EncodeParameters {
        let merged = explicit.or(*inherited);
        let bits_per_pixel = explicit
            .bits_per_pixel
            .or_else(|| {
                explicit
                    .photometric_interpretation
                    .map(|p| infer_bits_per_pixel(Some(p), source))
            })
            .or(inherited.bits_per_pixel)
            .unwrap_or_else(|| infer_bits_per_pixel(inherited.photometric_interpretation, source));
        let defaults = EncodeRequest::defaults();
        let compression = merged
            .compression
            .or(defaults.compression)
            .unwrap_or(CompressionType::None);
        let predictor = merged
            .predictor
            .or(defaults.predictor)
            .unwrap_or(Predictor::None);

        sanitize(
            bits_per_pixel,
            merged.photometric_interpretation,
            compression,
            predictor,
        )
    }

    /// Samples per pixel written.
    pub fn samples_per_pixel(&self) -> u16 {
        self.bits_per_sample.channels() as u16
    }

    /// Bytes in one packed row of `width` pixels.
    pub fn row_bytes(&self, width: u32) -> usize {
        row_bytes(width, 1, self.bits_per_sample.bits_per_pixel())
    }

    /// The context the frame's [`ColorCodec`][crate::color::ColorCodec] is built from.
    pub fn codec_context(&self, palette: Option<Arc<Palette>>) -> CodecContext {
        CodecContext {
            endianness: self.endianness,
            bits_per_sample: self.bits_per_sample,
            extra_samples: self.extra_samples,
            color_map: None,
            palette,
            ycbcr: YCbCrInfo::default(),
        }
    }
}

fn infer_bits_per_pixel(
    photometric: Option<PhotometricInterpretation>,
    source: PixelFormat,
) -> BitsPerPixel {
    let gray16 = source == PixelFormat::new(Channels::L, SampleDepth::U16);
    let color = match (source.channels, source.depth) {
        (Channels::Rgba, _) => BitsPerPixel::Bit32,
        (Channels::Rgb, SampleDepth::U16) => BitsPerPixel::Bit48,
        _ => BitsPerPixel::Bit24,
    };
    match photometric {
        Some(PhotometricInterpretation::RGBPalette) => BitsPerPixel::Bit8,
        Some(PhotometricInterpretation::WhiteIsZero | PhotometricInterpretation::BlackIsZero) => {
            if gray16 {
                BitsPerPixel::Bit16
            } else {
                BitsPerPixel::Bit8
            }
        }
        Some(PhotometricInterpretation::RGB) => color,
        Some(_) => BitsPerPixel::Bit24,
        None if gray16 => BitsPerPixel::Bit16,
        None if source.channels == Channels::L => BitsPerPixel::Bit8,
        None => color,
    }
}

fn sanitize(
    bits_per_pixel: BitsPerPixel,
    photometric: Option<PhotometricInterpretation>,
    mut compression: CompressionType,
    requested_predictor: Predictor,
) -> EncodeParameters {
    use BitsPerPixel::*;
    use PhotometricInterpretation::*;

    let (bits_per_pixel, photometric, mut predictor) = match bits_per_pixel {
        Bit1 => {
            let photometric = if compression.is_bilevel() {
                WhiteIsZero
            } else {
                BlackIsZero
            };
            (Bit1, photometric, Predictor::None)
        }
        Bit4 => (Bit4, RGBPalette, Predictor::None),
        Bit8 => {
            let photometric = match photometric {
                Some(p @ (WhiteIsZero | BlackIsZero | RGBPalette)) => p,
                _ => BlackIsZero,
            };
            (Bit8, photometric, requested_predictor)
        }
        Bit16 => (Bit16, BlackIsZero, requested_predictor),
        Bit6 | Bit10 | Bit12 | Bit14 | Bit30 | Bit36 | Bit42 => {
            debug!(?bits_per_pixel, "unsupported encoding depth, writing 24 bit RGB");
            (Bit24, RGB, Predictor::None)
        }
        Bit64 => {
            debug!(?bits_per_pixel, "unsupported encoding depth, writing 32 bit RGBA");
            (Bit32, RGB, Predictor::None)
        }
        other => (other, RGB, requested_predictor),
    };

    if compression.is_bilevel() && bits_per_pixel != Bit1 {
        debug!(?compression, "bilevel compression on multi-bit pixels, writing uncompressed");
        compression = CompressionType::None;
    }
    if predictor == Predictor::Horizontal && !matches!(photometric, RGB | RGBPalette | BlackIsZero)
    {
        debug!(?photometric, "horizontal predictor is not written for this interpretation");
        predictor = Predictor::None;
    }

    let (color_type, bits_per_sample, extra_samples) = match (bits_per_pixel, photometric) {
        (Bit4 | Bit8, RGBPalette) => (
            ColorType::PaletteColor,
            BitsPerSample::new(&[u16::from(bits_per_pixel)]),
            None,
        ),
        (Bit1 | Bit8 | Bit16, _) => {
            let bits = u16::from(bits_per_pixel);
            (
                ColorType::gray(photometric == WhiteIsZero, bits, false),
                BitsPerSample::new(&[bits]),
                None,
            )
        }
        (Bit32, _) => (
            ColorType::Rgba8888,
            BitsPerSample::uniform(8, 4),
            Some(ExtraSampleType::UnassociatedAlphaData),
        ),
        (Bit48, _) => (ColorType::Rgb161616, BitsPerSample::uniform(16, 3), None),
        _ => (ColorType::Rgb888, BitsPerSample::uniform(8, 3), None),
    };
    // Anything that fell through to 24 bit RGB is reported as such.
    let bits_per_pixel = match color_type {
        ColorType::Rgb888 => Bit24,
        _ => bits_per_pixel,
    };

    EncodeParameters {
        bits_per_pixel,
        photometric_interpretation: photometric,
        compression,
        predictor,
        color_type,
        bits_per_sample,
        extra_samples,
        endianness: Endianness::LittleEndian,
    }
}
