use crate::color::samples::{check_len, max_value, row_bytes, scale, SampleReader, SampleWriter};
use crate::color::ColorCodec;
use crate::error::TiffCodecResult;
use crate::frame::{Channels, FrameBuffer, PixelFormat, SampleDepth};
use crate::reader::Endianness;
use crate::tiff::{TiffFormatError, TiffResult, TiffUnsupportedError};

/// RGB and RGBA with equal channel widths, chunky or planar, integer or 32-bit float.
#[derive(Debug, Clone)]
pub struct RgbCodec {
    channels: usize,
    bits: u16,
    float: bool,
    associated_alpha: bool,
    endianness: Endianness,
}

impl RgbCodec {
    /// Create a codec for `channels` (3 or 4) channels of `bits` bits.
    ///
    /// With `associated_alpha` the color channels are premultiplied and get divided by alpha on
    /// decode.
    pub fn new(
        channels: usize,
        bits: u16,
        float: bool,
        associated_alpha: bool,
        endianness: Endianness,
    ) -> TiffResult<Self> {
        if !(1..=32).contains(&bits) || (float && bits != 32) {
            return Err(TiffUnsupportedError::UnsupportedBitsPerChannel(bits).into());
        }
        Ok(Self {
            channels,
            bits,
            float,
            associated_alpha: associated_alpha && channels == 4,
            endianness,
        })
    }

    fn channels(&self) -> Channels {
        if self.channels == 4 {
            Channels::Rgba
        } else {
            Channels::Rgb
        }
    }

    /// Write one pixel whose samples come from `next(channel)`.
    fn put_pixel(
        &self,
        frame: &mut FrameBuffer,
        index: usize,
        mut next: impl FnMut(usize) -> Sample,
    ) {
        let mut pixel = [Sample::Uint(0); 4];
        for (c, sample) in pixel.iter_mut().enumerate().take(self.channels) {
            *sample = next(c);
        }
        if self.associated_alpha {
            unpremultiply(&mut pixel, self.bits);
        }
        let pixels = frame.data_mut();
        for (c, sample) in pixel.iter().enumerate().take(self.channels) {
            match *sample {
                Sample::Uint(v) => pixels.put_uint(index + c, v, self.bits),
                Sample::Float(v) => pixels.put_f32(index + c, v),
            }
        }
    }

    fn read(&self, reader: &mut SampleReader) -> Sample {
        if self.float {
            Sample::Float(reader.next_f32())
        } else {
            Sample::Uint(reader.next_uint())
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Sample {
    Uint(u32),
    Float(f32),
}

fn unpremultiply(pixel: &mut [Sample; 4], bits: u16) {
    match pixel[3] {
        Sample::Uint(alpha) if alpha > 0 => {
            let max = max_value(bits);
            let alpha = u64::from(alpha);
            for sample in &mut pixel[..3] {
                if let Sample::Uint(v) = sample {
                    *v = ((u64::from(*v) * max + alpha / 2) / alpha).min(max) as u32;
                }
            }
        }
        Sample::Float(alpha) if alpha > 0.0 => {
            for sample in &mut pixel[..3] {
                if let Sample::Float(v) = sample {
                    *v /= alpha;
                }
            }
        }
        _ => {}
    }
}

impl ColorCodec for RgbCodec {
    fn pixel_format(&self) -> PixelFormat {
        let depth = if self.float {
            SampleDepth::F32
        } else {
            SampleDepth::for_bits(self.bits)
        };
        PixelFormat::new(self.channels(), depth)
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
        let stride = row_bytes(width, self.channels, self.bits);
        check_len(data, stride, height)?;
        for row in 0..height {
            let mut reader =
                SampleReader::new(&data[row as usize * stride..], self.bits, self.endianness);
            for col in 0..width {
                let index = frame.sample_index(x + col, y + row);
                self.put_pixel(frame, index, |_| self.read(&mut reader));
            }
        }
        Ok(())
    }

    fn decode_planar(
        &self,
        planes: &[&[u8]],
        frame: &mut FrameBuffer,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> TiffCodecResult<()> {
        if planes.len() != self.channels {
            return Err(TiffFormatError::InconsistentSizesEncountered.into());
        }
        let stride = row_bytes(width, 1, self.bits);
        for plane in planes {
            check_len(plane, stride, height)?;
        }
        for row in 0..height {
            let offset = row as usize * stride;
            let mut readers: Vec<SampleReader> = planes
                .iter()
                .map(|plane| SampleReader::new(&plane[offset..], self.bits, self.endianness))
                .collect();
            for col in 0..width {
                let index = frame.sample_index(x + col, y + row);
                self.put_pixel(frame, index, |c| self.read(&mut readers[c]));
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
        if self.float || !matches!(self.bits, 8 | 16) {
            return Err(TiffUnsupportedError::EncodingWithoutCodec.into());
        }
        let mut writer = SampleWriter::new(out, self.bits, self.endianness);
        for row in y..y + height {
            for col in x..x + width {
                let pixel = frame.rgba16(col, row);
                for sample in &pixel[..self.channels] {
                    writer.push(scale(u32::from(*sample), 16, self.bits));
                }
            }
            writer.finish_row();
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame::PixelData;

    #[test]
    fn decodes_packed_rgb444() {
        let codec = RgbCodec::new(3, 4, false, false, Endianness::BigEndian).unwrap();
        let mut frame = FrameBuffer::new(1, 1, codec.pixel_format()).unwrap();
        codec.decode(&[0xf0, 0x80], &mut frame, 0, 0, 1, 1).unwrap();
        assert_eq!(frame.data(), &PixelData::U8(vec![255, 0, 136]));
    }

    #[test]
    fn divides_associated_alpha() {
        let codec = RgbCodec::new(4, 8, false, true, Endianness::LittleEndian).unwrap();
        let mut frame = FrameBuffer::new(1, 1, codec.pixel_format()).unwrap();
        codec.decode(&[64, 0, 128, 128], &mut frame, 0, 0, 1, 1).unwrap();
        assert_eq!(frame.data(), &PixelData::U8(vec![128, 0, 255, 128]));
    }

    #[test]
    fn decodes_float_planes() {
        let codec = RgbCodec::new(3, 32, true, false, Endianness::LittleEndian).unwrap();
        let mut frame = FrameBuffer::new(1, 1, codec.pixel_format()).unwrap();
        let r = 0.5f32.to_le_bytes();
        let g = 0.25f32.to_le_bytes();
        let b = 1.0f32.to_le_bytes();
        codec
            .decode_planar(&[&r[..], &g[..], &b[..]], &mut frame, 0, 0, 1, 1)
            .unwrap();
        assert_eq!(frame.data(), &PixelData::F32(vec![0.5, 0.25, 1.0]));
    }

    #[test]
    fn encodes_rgba_from_rgb_source() {
        let source =
            FrameBuffer::from_data(1, 1, Channels::Rgb, PixelData::U8(vec![1, 2, 3])).unwrap();
        let mut out = Vec::new();
        RgbCodec::new(4, 8, false, false, Endianness::LittleEndian)
            .unwrap()
            .encode(&source, 0, 0, 1, 1, &mut out)
            .unwrap();
        assert_eq!(out, [1, 2, 3, 255]);
    }
}
