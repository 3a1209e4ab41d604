use std::sync::Arc;

use crate::color::samples::{check_len, row_bytes, SampleReader, SampleWriter};
use crate::color::ColorCodec;
use crate::error::TiffCodecResult;
use crate::frame::{Channels, FrameBuffer, PixelData, PixelFormat, SampleDepth};
use crate::quantize::Palette;
use crate::reader::Endianness;
use crate::tiff::tags::Tag;
use crate::tiff::{TiffFormatError, TiffResult, TiffUnsupportedError};

/// Palette indices of up to 8 bits, decoded through the ColorMap to 16-bit RGB.
#[derive(Debug, Clone)]
pub struct PaletteCodec {
    bits: u16,
    color_map: Option<Arc<[u16]>>,
    palette: Option<Arc<Palette>>,
}

impl PaletteCodec {
    /// Create a codec for indices of `bits` bits.
    ///
    /// A `color_map` must hold `3 * 2^bits` entries: all reds, then all greens, then all blues.
    pub fn new(
        bits: u16,
        color_map: Option<Arc<[u16]>>,
        palette: Option<Arc<Palette>>,
    ) -> TiffResult<Self> {
        if !(1..=8).contains(&bits) {
            return Err(TiffUnsupportedError::UnsupportedBitsPerChannel(bits).into());
        }
        if let Some(map) = &color_map {
            let expected = 3 << bits;
            if map.len() != expected {
                return Err(TiffFormatError::ColorMapLengthMismatch {
                    actual: map.len(),
                    expected,
                }
                .into());
            }
        }
        Ok(Self {
            bits,
            color_map,
            palette,
        })
    }
}

impl ColorCodec for PaletteCodec {
    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::new(Channels::Rgb, SampleDepth::U16)
    }

    fn decode(
        &self,
        data: &[u8],
        frame: &mut FrameBuffer,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> TiffCodecResult<()> {
        let map = self
            .color_map
            .as_deref()
            .ok_or(TiffFormatError::RequiredTagNotFound(Tag::ColorMap))?;
        let entries = 1usize << self.bits;
        let stride = row_bytes(width, 1, self.bits);
        check_len(data, stride, height)?;
        for row in 0..height {
            let mut indices =
                SampleReader::new(&data[row as usize * stride..], self.bits, Endianness::BigEndian);
            let start = frame.sample_index(x, y + row);
            let PixelData::U16(pixels) = frame.data_mut() else {
                return Err(TiffFormatError::InconsistentSizesEncountered.into());
            };
            for col in 0..width as usize {
                let i = indices.next_uint() as usize;
                let at = start + col * 3;
                pixels[at] = map[i];
                pixels[at + 1] = map[entries + i];
                pixels[at + 2] = map[2 * entries + i];
            }
        }
        Ok(())
    }

    fn encode(
        &self,
        frame: &FrameBuffer,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        out: &mut Vec<u8>,
    ) -> TiffCodecResult<()> {
        let palette = self
            .palette
            .as_deref()
            .ok_or(TiffUnsupportedError::EncodingWithoutCodec)?;
        let mut writer = SampleWriter::new(out, self.bits, Endianness::LittleEndian);
        for row in y..y + height {
            for col in x..x + width {
                let [r, g, b, _] = frame.rgba16(col, row);
                let rgb = [(r >> 8) as u8, (g >> 8) as u8, (b >> 8) as u8];
                writer.push(u32::from(palette.index_of(rgb)));
            }
            writer.finish_row();
        }
        Ok(())
    }
}
