use crate::color::samples::{check_len, max_value, row_bytes, scale, SampleReader, SampleWriter};
use crate::color::ColorCodec;
use crate::error::TiffCodecResult;
use crate::frame::{Channels, FrameBuffer, PixelFormat, SampleDepth};
use crate::reader::Endianness;
use crate::tiff::{TiffResult, TiffUnsupportedError};

/// Unsigned integer grayscale of 1 to 32 bits per sample.
#[derive(Debug, Clone)]
pub struct GrayCodec {
    bits: u16,
    white_is_zero: bool,
    endianness: Endianness,
}

impl GrayCodec {
    /// Create a codec for samples of `bits` bits.
    pub fn new(bits: u16, white_is_zero: bool, endianness: Endianness) -> TiffResult<Self> {
        if !(1..=32).contains(&bits) {
            return Err(TiffUnsupportedError::UnsupportedBitsPerChannel(bits).into());
        }
        Ok(Self {
            bits,
            white_is_zero,
            endianness,
        })
    }
}

impl ColorCodec for GrayCodec {
    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::new(Channels::L, SampleDepth::for_bits(self.bits))
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
        let stride = row_bytes(width, 1, self.bits);
        check_len(data, stride, height)?;
        let max = max_value(self.bits) as u32;
        for row in 0..height {
            let mut samples =
                SampleReader::new(&data[row as usize * stride..], self.bits, self.endianness);
            let start = frame.sample_index(x, y + row);
            let pixels = frame.data_mut();
            for col in 0..width as usize {
                let value = samples.next_uint();
                let value = if self.white_is_zero { max - value } else { value };
                pixels.put_uint(start + col, value, self.bits);
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
        if !matches!(self.bits, 1 | 2 | 4 | 8 | 16 | 32) {
            return Err(TiffUnsupportedError::EncodingWithoutCodec.into());
        }
        let max = max_value(self.bits) as u32;
        let mut writer = SampleWriter::new(out, self.bits, self.endianness);
        for row in y..y + height {
            for col in x..x + width {
                let value = scale(u32::from(frame.luma16(col, row)), 16, self.bits);
                writer.push(if self.white_is_zero { max - value } else { value });
            }
            writer.finish_row();
        }
        Ok(())
    }
}

/// 32-bit IEEE float grayscale, decoded to `0.0..=1.0` samples.
#[derive(Debug, Clone)]
pub struct GrayFloatCodec {
    white_is_zero: bool,
    endianness: Endianness,
}

impl GrayFloatCodec {
    /// Create a float codec.
    pub fn new(white_is_zero: bool, endianness: Endianness) -> Self {
        Self {
            white_is_zero,
            endianness,
        }
    }
}

impl ColorCodec for GrayFloatCodec {
    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::new(Channels::L, SampleDepth::F32)
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
        let stride = row_bytes(width, 1, 32);
        check_len(data, stride, height)?;
        for row in 0..height {
            let mut samples = SampleReader::new(&data[row as usize * stride..], 32, self.endianness);
            let start = frame.sample_index(x, y + row);
            let pixels = frame.data_mut();
            for col in 0..width as usize {
                let value = samples.next_f32();
                pixels.put_f32(start + col, if self.white_is_zero { 1.0 - value } else { value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame::PixelData;

    #[test]
    fn decodes_inverted_bilevel_rows() {
        let codec = GrayCodec::new(1, true, Endianness::LittleEndian).unwrap();
        let mut frame = FrameBuffer::new(10, 2, codec.pixel_format()).unwrap();
        // rows are padded to whole bytes
        codec
            .decode(&[0b1000_0000, 0b0100_0000, 0xff, 0xff], &mut frame, 0, 0, 10, 2)
            .unwrap();
        let PixelData::U8(pixels) = frame.data() else {
            panic!("expected 8 bit output");
        };
        assert_eq!(pixels[..10], [0, 255, 255, 255, 255, 255, 255, 255, 255, 0]);
        assert!(pixels[10..].iter().all(|p| *p == 0));
    }

    #[test]
    fn decodes_big_endian_words_at_an_offset() {
        let codec = GrayCodec::new(16, false, Endianness::BigEndian).unwrap();
        let mut frame = FrameBuffer::new(2, 2, codec.pixel_format()).unwrap();
        codec.decode(&[0x12, 0x34, 0xab, 0xcd], &mut frame, 0, 1, 2, 1).unwrap();
        assert_eq!(frame.data(), &PixelData::U16(vec![0, 0, 0x1234, 0xabcd]));
    }

    #[test]
    fn encodes_luminance() {
        let source = FrameBuffer::from_data(3, 1, Channels::L, PixelData::U8(vec![0, 128, 255]))
            .unwrap();
        let mut out = Vec::new();
        GrayCodec::new(8, false, Endianness::LittleEndian)
            .unwrap()
            .encode(&source, 0, 0, 3, 1, &mut out)
            .unwrap();
        assert_eq!(out, [0, 128, 255]);

        let mut out = Vec::new();
        GrayCodec::new(1, true, Endianness::LittleEndian)
            .unwrap()
            .encode(&source, 0, 0, 3, 1, &mut out)
            .unwrap();
        assert_eq!(out, [0b1000_0000]);
    }

    #[test]
    fn decodes_floats() {
        let codec = GrayFloatCodec::new(false, Endianness::LittleEndian);
        let mut frame = FrameBuffer::new(1, 1, codec.pixel_format()).unwrap();
        codec.decode(&0.25f32.to_le_bytes(), &mut frame, 0, 0, 1, 1).unwrap();
        assert_eq!(frame.data(), &PixelData::F32(vec![0.25]));
    }

    #[test]
    fn rejects_wide_samples() {
        assert!(GrayCodec::new(33, false, Endianness::LittleEndian).is_err());
    }
}
