//! Byte order and endian-aware stream access.

use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use bytes::Bytes;

use crate::error::{TiffCodecError, TiffCodecResult};
use crate::tiff::TiffFormatError;

/// Endianness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// Little Endian
    LittleEndian,
    /// Big Endian
    BigEndian,
}

impl Endianness {
    /// The two byte marker that opens a TIFF stream in this byte order.
    pub fn marker(&self) -> [u8; 2] {
        match self {
            Endianness::LittleEndian => *b"II",
            Endianness::BigEndian => *b"MM",
        }
    }

    pub(crate) fn read_u16(&self, buf: &[u8]) -> u16 {
        match self {
            Endianness::LittleEndian => LittleEndian::read_u16(buf),
            Endianness::BigEndian => BigEndian::read_u16(buf),
        }
    }

    pub(crate) fn read_u24(&self, buf: &[u8]) -> u32 {
        match self {
            Endianness::LittleEndian => LittleEndian::read_u24(buf),
            Endianness::BigEndian => BigEndian::read_u24(buf),
        }
    }

    pub(crate) fn read_u32(&self, buf: &[u8]) -> u32 {
        match self {
            Endianness::LittleEndian => LittleEndian::read_u32(buf),
            Endianness::BigEndian => BigEndian::read_u32(buf),
        }
    }

    pub(crate) fn read_u64(&self, buf: &[u8]) -> u64 {
        match self {
            Endianness::LittleEndian => LittleEndian::read_u64(buf),
            Endianness::BigEndian => BigEndian::read_u64(buf),
        }
    }

    pub(crate) fn read_f32(&self, buf: &[u8]) -> f32 {
        match self {
            Endianness::LittleEndian => LittleEndian::read_f32(buf),
            Endianness::BigEndian => BigEndian::read_f32(buf),
        }
    }

    pub(crate) fn write_u16(&self, buf: &mut [u8], n: u16) {
        match self {
            Endianness::LittleEndian => LittleEndian::write_u16(buf, n),
            Endianness::BigEndian => BigEndian::write_u16(buf, n),
        }
    }

    pub(crate) fn write_u32(&self, buf: &mut [u8], n: u32) {
        match self {
            Endianness::LittleEndian => LittleEndian::write_u32(buf, n),
            Endianness::BigEndian => BigEndian::write_u32(buf, n),
        }
    }

    pub(crate) fn write_u64(&self, buf: &mut [u8], n: u64) {
        match self {
            Endianness::LittleEndian => LittleEndian::write_u64(buf, n),
            Endianness::BigEndian => BigEndian::write_u64(buf, n),
        }
    }
}

/// A seekable byte source that reads numbers in the stream's byte order.
pub(crate) struct EndianAwareReader<R> {
    reader: R,
    endianness: Endianness,
}

impl<R: Read + Seek> EndianAwareReader<R> {
    pub(crate) fn new(reader: R, endianness: Endianness) -> Self {
        Self { reader, endianness }
    }

    pub(crate) fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub(crate) fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    pub(crate) fn seek(&mut self, offset: u64) -> TiffCodecResult<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Read a u8 from the cursor, advancing the internal state by 1 byte.
    pub(crate) fn read_u8(&mut self) -> TiffCodecResult<u8> {
        Ok(self.reader.read_u8()?)
    }

    pub(crate) fn read_u16(&mut self) -> TiffCodecResult<u16> {
        match self.endianness {
            Endianness::LittleEndian => Ok(self.reader.read_u16::<LittleEndian>()?),
            Endianness::BigEndian => Ok(self.reader.read_u16::<BigEndian>()?),
        }
    }

    pub(crate) fn read_u32(&mut self) -> TiffCodecResult<u32> {
        match self.endianness {
            Endianness::LittleEndian => Ok(self.reader.read_u32::<LittleEndian>()?),
            Endianness::BigEndian => Ok(self.reader.read_u32::<BigEndian>()?),
        }
    }

    pub(crate) fn read_u64(&mut self) -> TiffCodecResult<u64> {
        match self.endianness {
            Endianness::LittleEndian => Ok(self.reader.read_u64::<LittleEndian>()?),
            Endianness::BigEndian => Ok(self.reader.read_u64::<BigEndian>()?),
        }
    }

    /// Read exactly `len` bytes at the current position.
    ///
    /// Allocation follows the bytes actually present in the stream, not the requested length.
    pub(crate) fn read_exact_bytes(&mut self, len: u64) -> TiffCodecResult<Bytes> {
        let mut buf = Vec::new();
        (&mut self.reader).take(len).read_to_end(&mut buf)?;
        if (buf.len() as u64) < len {
            return Err(TiffCodecError::EndOfFile(usize::try_from(len)?, buf.len()));
        }
        Ok(buf.into())
    }

    /// Retrieve the bytes in `range`.
    pub(crate) fn get_bytes(&mut self, range: Range<u64>) -> TiffCodecResult<Bytes> {
        let length = range
            .end
            .checked_sub(range.start)
            .ok_or(TiffFormatError::ChunkOutOfBounds {
                offset: range.start,
                length: 0,
            })?;
        self.seek(range.start)?;
        self.read_exact_bytes(length)
    }
}
