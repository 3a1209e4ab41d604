//! Packing and unpacking of sample values within rows.
//!
//! Byte-sized samples (8, 16, 24 and 32 bits) are stored in the stream's byte order. Any other
//! width is a big-endian bit stream. Every row starts on a byte boundary.

use crate::frame::PixelData;
use crate::reader::Endianness;
use crate::tiff::{TiffFormatError, TiffResult};

/// Bytes in one row of `width` pixels with `samples` samples of `bits` bits each.
pub(crate) fn row_bytes(width: u32, samples: usize, bits: u16) -> usize {
    (width as usize * samples * bits as usize).div_ceil(8)
}

/// Check that `data` holds at least `rows` rows of `row_bytes` bytes.
pub(crate) fn check_len(data: &[u8], row_bytes: usize, rows: u32) -> TiffResult<()> {
    let required = row_bytes * rows as usize;
    if data.len() < required {
        return Err(TiffFormatError::UnexpectedCompressedData {
            actual_bytes: data.len(),
            required_bytes: required,
        }
        .into());
    }
    Ok(())
}

/// Largest value a sample of `bits` bits can hold.
pub(crate) fn max_value(bits: u16) -> u64 {
    (1u64 << bits) - 1
}

/// Rescale `value` from `from` bits to `to` bits, rounding to nearest.
pub(crate) fn scale(value: u32, from: u16, to: u16) -> u32 {
    if from == to {
        return value;
    }
    let from_max = max_value(from);
    ((u64::from(value) * max_value(to) + from_max / 2) / from_max) as u32
}

/// Sequential reader over the samples of one row.
pub(crate) struct SampleReader<'a> {
    row: &'a [u8],
    bits: u16,
    endianness: Endianness,
    bit: usize,
}

impl<'a> SampleReader<'a> {
    pub(crate) fn new(row: &'a [u8], bits: u16, endianness: Endianness) -> Self {
        Self {
            row,
            bits,
            endianness,
            bit: 0,
        }
    }

    /// The next unsigned sample.
    pub(crate) fn next_uint(&mut self) -> u32 {
        let start = self.bit / 8;
        let value = match self.bits {
            8 => u32::from(self.row[start]),
            16 => u32::from(self.endianness.read_u16(&self.row[start..])),
            24 => self.endianness.read_u24(&self.row[start..]),
            32 => self.endianness.read_u32(&self.row[start..]),
            bits => {
                let mut value = 0u32;
                for bit in self.bit..self.bit + bits as usize {
                    let byte = self.row[bit / 8];
                    value = (value << 1) | u32::from((byte >> (7 - bit % 8)) & 1);
                }
                value
            }
        };
        self.bit += self.bits as usize;
        value
    }

    /// The next 32-bit float sample.
    pub(crate) fn next_f32(&mut self) -> f32 {
        let start = self.bit / 8;
        self.bit += 32;
        self.endianness.read_f32(&self.row[start..])
    }
}

/// Appends samples to an output row in the given byte order.
pub(crate) struct SampleWriter<'a> {
    out: &'a mut Vec<u8>,
    bits: u16,
    endianness: Endianness,
    acc: u8,
    filled: u16,
}

impl<'a> SampleWriter<'a> {
    pub(crate) fn new(out: &'a mut Vec<u8>, bits: u16, endianness: Endianness) -> Self {
        Self {
            out,
            bits,
            endianness,
            acc: 0,
            filled: 0,
        }
    }

    pub(crate) fn push(&mut self, value: u32) {
        match self.bits {
            8 => self.out.push(value as u8),
            16 => {
                let mut buf = [0; 2];
                self.endianness.write_u16(&mut buf, value as u16);
                self.out.extend_from_slice(&buf);
            }
            32 => {
                let mut buf = [0; 4];
                self.endianness.write_u32(&mut buf, value);
                self.out.extend_from_slice(&buf);
            }
            bits => {
                for shift in (0..bits).rev() {
                    self.acc = (self.acc << 1) | ((value >> shift) & 1) as u8;
                    self.filled += 1;
                    if self.filled == 8 {
                        self.out.push(self.acc);
                        self.acc = 0;
                        self.filled = 0;
                    }
                }
            }
        }
    }

    /// Pad the current row to a byte boundary.
    pub(crate) fn finish_row(&mut self) {
        if self.filled > 0 {
            self.out.push(self.acc << (8 - self.filled));
            self.acc = 0;
            self.filled = 0;
        }
    }
}

impl PixelData {
    /// Store an unsigned sample of `bits` bits, rescaled to this buffer's depth.
    pub(crate) fn put_uint(&mut self, index: usize, value: u32, bits: u16) {
        match self {
            PixelData::U8(v) => v[index] = scale(value, bits, 8) as u8,
            PixelData::U16(v) => v[index] = scale(value, bits, 16) as u16,
            PixelData::U32(v) => v[index] = scale(value, bits, 32),
            PixelData::F32(v) => v[index] = (f64::from(value) / max_value(bits) as f64) as f32,
        }
    }

    /// Store a normalized float sample.
    pub(crate) fn put_f32(&mut self, index: usize, value: f32) {
        match self {
            PixelData::F32(v) => v[index] = value,
            _ => {
                let clamped = (value.clamp(0.0, 1.0) * 65535.0).round() as u32;
                self.put_uint(index, clamped, 16)
            }
        }
    }
}
