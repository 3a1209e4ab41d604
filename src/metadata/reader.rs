use std::collections::HashSet;
use std::io::{Read, Seek};

use tracing::{debug, trace};

use crate::error::{TiffCodecError, TiffCodecResult};
use crate::ifd::{ImageFileDirectory, TagEntry};
use crate::reader::{EndianAwareReader, Endianness};
use crate::tiff::tags::{Tag, Type};
use crate::tiff::{TiffError, TiffFormatError, Value};

/// Entry point to reading TIFF metadata.
///
/// This is a stateful reader because we don't know how many IFDs will be encountered.
///
/// ```notest
/// let mut metadata_reader = TiffMetadataReader::try_open(&mut file)?;
/// let ifds = metadata_reader.read_all_ifds(&mut file)?;
/// ```
pub struct TiffMetadataReader {
    endianness: Endianness,
    bigtiff: bool,
    next_ifd_offset: Option<u64>,
    visited: HashSet<u64>,
}

impl TiffMetadataReader {
    /// Open a new TIFF stream, validating the magic bytes, reading the endianness, and checking for
    /// the bigtiff flag.
    ///
    /// This does not read any IFD metadata.
    pub fn try_open<R: Read + Seek>(source: &mut R) -> TiffCodecResult<Self> {
        let mut cursor = EndianAwareReader::new(source, Endianness::LittleEndian);
        cursor.seek(0)?;
        let magic_bytes = [cursor.read_u8()?, cursor.read_u8()?];

        // Should be b"II" for little endian or b"MM" for big endian
        let endianness = match &magic_bytes {
            b"II" => Endianness::LittleEndian,
            b"MM" => Endianness::BigEndian,
            _ => return Err(TiffFormatError::TiffSignatureNotFound.into()),
        };
        cursor.set_endianness(endianness);

        let version = cursor.read_u16()?;
        let bigtiff = match version {
            42 => false,
            43 => {
                // Bytesize of offsets, always 8 in BigTIFF
                if cursor.read_u16()? != 8 {
                    return Err(TiffFormatError::TiffSignatureNotFound.into());
                }
                // This constant should always be 0
                if cursor.read_u16()? != 0 {
                    return Err(TiffFormatError::TiffSignatureNotFound.into());
                }
                true
            }
            _ => return Err(TiffFormatError::TiffSignatureInvalid.into()),
        };

        let first_ifd_location = if bigtiff {
            cursor.read_u64()?
        } else {
            cursor.read_u32()?.into()
        };
        if first_ifd_location == 0 {
            return Err(TiffFormatError::ImageFileDirectoryNotFound.into());
        }
        debug!(?endianness, bigtiff, first_ifd_location, "opened TIFF stream");

        Ok(Self {
            endianness,
            bigtiff,
            next_ifd_offset: Some(first_ifd_location),
            visited: HashSet::new(),
        })
    }

    /// Returns the endianness of the file.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Returns `true` if this is a bigtiff file.
    pub fn bigtiff(&self) -> bool {
        self.bigtiff
    }

    /// Returns `true` if there are more IFDs to read.
    pub fn has_next_ifd(&self) -> bool {
        self.next_ifd_offset.is_some()
    }

    /// The byte offset of the start of the next IFD.
    ///
    /// This will be `None` if all IFDs have already been read.
    pub fn next_ifd_offset(&self) -> Option<u64> {
        self.next_ifd_offset
    }

    /// Read the next IFD from the file.
    ///
    /// If there are no more IFDs, returns `None`. A directory offset that was already visited is a
    /// format error.
    pub fn read_next_ifd<R: Read + Seek>(
        &mut self,
        source: &mut R,
    ) -> TiffCodecResult<Option<ImageFileDirectory>> {
        let Some(ifd_start) = self.next_ifd_offset else {
            return Ok(None);
        };
        if !self.visited.insert(ifd_start) {
            return Err(TiffFormatError::CycleInOffsets.into());
        }
        let mut cursor = EndianAwareReader::new(source, self.endianness);
        let ifd_reader = ImageFileDirectoryReader::open(&mut cursor, ifd_start, self.bigtiff)?;
        let ifd = ifd_reader.read(&mut cursor)?;
        self.next_ifd_offset = ifd_reader.finish(&mut cursor)?;
        Ok(Some(ifd))
    }

    /// Read all IFDs from the file.
    pub fn read_all_ifds<R: Read + Seek>(
        &mut self,
        source: &mut R,
    ) -> TiffCodecResult<Vec<ImageFileDirectory>> {
        let mut ifds = vec![];
        while let Some(ifd) = self.read_next_ifd(source)? {
            ifds.push(ifd);
        }
        Ok(ifds)
    }
}

/// Reads the [`ImageFileDirectory`] metadata.
///
/// TIFF metadata is not necessarily contiguous in the files: IFDs are normally all stored
/// contiguously in the header, but the format allows them to be spread out through the file.
///
/// Note that you must call [`finish`][ImageFileDirectoryReader::finish] to read the offset of the
/// following IFD.
pub(crate) struct ImageFileDirectoryReader {
    bigtiff: bool,
    /// The byte offset of the beginning of this IFD
    ifd_start_offset: u64,
    /// The number of tags in this IFD
    tag_count: u64,
    /// The number of bytes that each IFD entry takes up.
    /// This is 12 bytes for normal TIFF and 20 bytes for BigTIFF.
    ifd_entry_byte_size: u64,
    /// The number of bytes that the value for the number of tags takes up.
    tag_count_byte_size: u64,
}

impl ImageFileDirectoryReader {
    /// Read the entry count of the IFD starting at the given file offset
    pub(crate) fn open<R: Read + Seek>(
        cursor: &mut EndianAwareReader<R>,
        ifd_start_offset: u64,
        bigtiff: bool,
    ) -> TiffCodecResult<Self> {
        cursor.seek(ifd_start_offset)?;

        // Tag   2 bytes
        // Type  2 bytes
        // Count:
        //  - bigtiff: 8 bytes
        //  - else: 4 bytes
        // Value:
        //  - bigtiff: 8 bytes either a pointer the value itself
        //  - else: 4 bytes either a pointer the value itself
        let ifd_entry_byte_size = if bigtiff { 20 } else { 12 };
        let tag_count_byte_size = if bigtiff { 8 } else { 2 };

        let tag_count = if bigtiff {
            cursor.read_u64()?
        } else {
            cursor.read_u16()?.into()
        };
        trace!(ifd_start_offset, tag_count, "reading directory");

        Ok(Self {
            bigtiff,
            ifd_entry_byte_size,
            tag_count,
            tag_count_byte_size,
            ifd_start_offset,
        })
    }

    fn entry_offset(&self, tag_idx: u64) -> TiffCodecResult<u64> {
        self.ifd_entry_byte_size
            .checked_mul(tag_idx)
            .and_then(|table| table.checked_add(self.ifd_start_offset))
            .and_then(|offset| offset.checked_add(self.tag_count_byte_size))
            .ok_or(TiffError::IntSizeError.into())
    }

    /// Read all entries out of this IFD, in stream order.
    ///
    /// Keep in mind that you'll still need to call [`finish`][Self::finish] to get the byte offset
    /// of the next IFD.
    pub(crate) fn read<R: Read + Seek>(
        &self,
        cursor: &mut EndianAwareReader<R>,
    ) -> TiffCodecResult<ImageFileDirectory> {
        let mut entries = Vec::new();
        for tag_idx in 0..self.tag_count {
            let tag_offset = self.entry_offset(tag_idx)?;
            if let Some(entry) = read_tag(cursor, tag_offset, self.bigtiff)? {
                entries.push(entry);
            }
        }
        Ok(ImageFileDirectory::from_entries(entries)?)
    }

    /// Finish this reader, reading the byte offset of the next IFD
    pub(crate) fn finish<R: Read + Seek>(
        self,
        cursor: &mut EndianAwareReader<R>,
    ) -> TiffCodecResult<Option<u64>> {
        cursor.seek(self.entry_offset(self.tag_count)?)?;

        let next_ifd_offset = if self.bigtiff {
            cursor.read_u64()?
        } else {
            cursor.read_u32()?.into()
        };

        // If the ifd_offset is 0, no more IFDs
        if next_ifd_offset == 0 {
            Ok(None)
        } else {
            Ok(Some(next_ifd_offset))
        }
    }
}

/// Read a single entry at `tag_offset`.
///
/// Entries with a type code this reader does not know are skipped.
fn read_tag<R: Read + Seek>(
    cursor: &mut EndianAwareReader<R>,
    tag_offset: u64,
    bigtiff: bool,
) -> TiffCodecResult<Option<TagEntry>> {
    cursor.seek(tag_offset)?;
    let tag = Tag::from_u16_exhaustive(cursor.read_u16()?);

    let tag_type_code = cursor.read_u16()?;
    let Some(tag_type) = Type::from_u16(tag_type_code) else {
        debug!(?tag, tag_type_code, "skipping entry with unknown type");
        return Ok(None);
    };
    let count = if bigtiff {
        cursor.read_u64()?
    } else {
        cursor.read_u32()?.into()
    };

    let value = read_tag_value(cursor, tag_type, count, bigtiff)?;
    Ok(Some(TagEntry::new(tag, tag_type, value)))
}

/// Read an entry's value, either from the entry's value field or from the out-of-line block it
/// points at.
///
/// The cursor must be positioned at the start of the value field.
fn read_tag_value<R: Read + Seek>(
    cursor: &mut EndianAwareReader<R>,
    tag_type: Type,
    count: u64,
    bigtiff: bool,
) -> TiffCodecResult<Value> {
    if count == 0 {
        return Ok(Value::List(vec![]));
    }

    let value_byte_length = count
        .checked_mul(tag_type.size())
        .ok_or(TiffError::IntSizeError)?;
    let value_field_size = if bigtiff { 8 } else { 4 };

    let data = if value_byte_length <= value_field_size {
        cursor.read_exact_bytes(value_byte_length)?
    } else {
        let offset = if bigtiff {
            cursor.read_u64()?
        } else {
            cursor.read_u32()?.into()
        };
        let end = offset
            .checked_add(value_byte_length)
            .ok_or(TiffFormatError::ChunkOutOfBounds {
                offset,
                length: value_byte_length,
            })?;
        cursor.get_bytes(offset..end)?
    };

    if tag_type == Type::ASCII {
        let mut out = data.to_vec();
        // Strings may be null-terminated, so we trim anything downstream of the null byte
        if let Some(first) = out.iter().position(|&b| b == 0) {
            out.truncate(first);
        }
        return Ok(Value::Ascii(String::from_utf8(out).map_err(TiffError::from)?));
    }

    let endianness = cursor.endianness();
    let element_size = usize::try_from(tag_type.size())?;
    let mut values = data
        .chunks_exact(element_size)
        .map(|chunk| read_element(tag_type, chunk, endianness));

    if count == 1 {
        values
            .next()
            .ok_or(TiffCodecError::EndOfFile(element_size, data.len()))
    } else {
        Ok(Value::List(values.collect()))
    }
}

/// Decode one element of `tag_type` from exactly `tag_type.size()` bytes.
fn read_element(tag_type: Type, chunk: &[u8], endianness: Endianness) -> Value {
    match tag_type {
        // UNDEFINED is opaque, so it is carried as bytes
        Type::BYTE | Type::UNDEFINED | Type::ASCII => Value::Byte(chunk[0]),
        Type::SBYTE => Value::SignedByte(chunk[0] as i8),
        Type::SHORT => Value::Short(endianness.read_u16(chunk)),
        Type::SSHORT => Value::SignedShort(endianness.read_u16(chunk) as i16),
        Type::LONG => Value::Unsigned(endianness.read_u32(chunk)),
        Type::SLONG => Value::Signed(endianness.read_u32(chunk) as i32),
        Type::FLOAT => Value::Float(f32::from_bits(endianness.read_u32(chunk))),
        Type::DOUBLE => Value::Double(f64::from_bits(endianness.read_u64(chunk))),
        Type::RATIONAL => Value::Rational(
            endianness.read_u32(&chunk[..4]),
            endianness.read_u32(&chunk[4..]),
        ),
        Type::SRATIONAL => Value::SRational(
            endianness.read_u32(&chunk[..4]) as i32,
            endianness.read_u32(&chunk[4..]) as i32,
        ),
        Type::IFD => Value::Ifd(endianness.read_u32(chunk)),
        Type::LONG8 => Value::UnsignedBig(endianness.read_u64(chunk)),
        Type::SLONG8 => Value::SignedBig(endianness.read_u64(chunk) as i64),
        Type::IFD8 => Value::IfdBig(endianness.read_u64(chunk)),
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    fn read_one(buf: Vec<u8>, byte_order: Endianness, bigtiff: bool) -> (Tag, Value) {
        let mut source = Cursor::new(buf);
        let mut cursor = EndianAwareReader::new(&mut source, byte_order);
        let entry = read_tag(&mut cursor, 0, bigtiff).unwrap().unwrap();
        (entry.tag(), entry.value().clone())
    }

    #[test]
    #[rustfmt::skip]
    fn single_values_fit_classic() {
        let cases = [
        // tag type   count      value
        ([1,1, 1, 0, 1,0,0,0, 42, 0, 0, 0], Endianness::LittleEndian, Value::Byte       (42)),
        ([1,1, 0, 7, 0,0,0,1, 42, 0, 0, 0], Endianness::BigEndian,    Value::Byte       (42)),
        ([1,1, 2, 0, 1,0,0,0,  0, 0, 0, 0], Endianness::LittleEndian, Value::Ascii      ("".into())),
        ([1,1, 0, 3, 0,0,0,1,  0,42, 0, 0], Endianness::BigEndian,    Value::Short      (42)),
        ([1,1, 8, 0, 1,0,0,0,214,255,0, 0], Endianness::LittleEndian, Value::SignedShort(-42)),
        ([1,1, 0, 4, 0,0,0,1,  0, 0, 0,42], Endianness::BigEndian,    Value::Unsigned   (42)),
        ([1,1,11, 0, 1,0,0,0, 42, 0, 0, 0], Endianness::LittleEndian, Value::Float      (f32::from_bits(42))),
        ([1,1, 0,13, 0,0,0,1,  0, 0, 0,42], Endianness::BigEndian,    Value::Ifd        (42)),
        ];
        for (buf, byte_order, res) in cases {
            assert_eq!(read_one(buf.to_vec(), byte_order, false), (Tag::ImageLength, res));
        }
    }

    #[test]
    #[rustfmt::skip]
    fn eight_byte_values_are_inline_in_bigtiff() {
        let cases = [
        //      type       count            value
        ([1,1, 16, 0, 1,0,0,0,0,0,0,0, 42, 0, 0, 0, 0, 0, 0, 0], Endianness::LittleEndian, Value::UnsignedBig(42)),
        ([1,1,  0,12, 0,0,0,0,0,0,0,1,  0, 0, 0, 0, 0, 0, 0,42], Endianness::BigEndian,    Value::Double     (f64::from_bits(42))),
        ([1,1,  5, 0, 1,0,0,0,0,0,0,0, 42, 0, 0, 0,43, 0, 0, 0], Endianness::LittleEndian, Value::Rational   (42, 43)),
        ([1,1,  0, 3, 0,0,0,0,0,0,0,4,  0,42, 0,42, 0,42, 0,42], Endianness::BigEndian,    Value::List(vec![Value::Short(42); 4])),
        ];
        for (buf, byte_order, res) in cases {
            assert_eq!(read_one(buf.to_vec(), byte_order, true), (Tag::ImageLength, res));
        }
    }

    #[test]
    #[rustfmt::skip]
    fn out_of_line_values_classic() {
        let cases = [
        //          type  count    offset 12
        (vec![1,1, 7, 0, 5,0,0,0, 12, 0, 0, 0, 1,2,3,4,5],                Endianness::LittleEndian, Value::List(vec![Value::Byte(1), Value::Byte(2), Value::Byte(3), Value::Byte(4), Value::Byte(5)])),
        (vec![1,1, 0, 2, 0,0,0,6,  0, 0, 0,12, b'T',b'I',b'F',b'F',0,0], Endianness::BigEndian,    Value::Ascii("TIFF".into())),
        (vec![1,1, 5, 0, 1,0,0,0, 12, 0, 0, 0, 72, 0, 0, 0, 1, 0, 0, 0],  Endianness::LittleEndian, Value::Rational(72, 1)),
        (vec![1,1, 0, 4, 0,0,0,2,  0, 0, 0,12,  0, 0, 1, 0, 0, 0, 2, 0],  Endianness::BigEndian,    Value::List(vec![Value::Unsigned(256), Value::Unsigned(512)])),
        ];
        for (buf, byte_order, res) in cases {
            assert_eq!(read_one(buf, byte_order, false), (Tag::ImageLength, res));
        }
    }

    #[test]
    fn unknown_types_are_skipped() {
        let mut source = Cursor::new(vec![1, 1, 99, 0, 1, 0, 0, 0, 42, 0, 0, 0]);
        let mut cursor = EndianAwareReader::new(&mut source, Endianness::LittleEndian);
        assert!(read_tag(&mut cursor, 0, false).unwrap().is_none());
    }

    #[test]
    fn truncated_out_of_line_value_is_end_of_file() {
        let mut source = Cursor::new(vec![1, 1, 3, 0, 8, 0, 0, 0, 12, 0, 0, 0, 1, 0]);
        let mut cursor = EndianAwareReader::new(&mut source, Endianness::LittleEndian);
        assert!(matches!(
            read_tag(&mut cursor, 0, false),
            Err(TiffCodecError::EndOfFile(16, 2))
        ));
    }

    #[test]
    fn rejects_bad_signatures() {
        for header in [&b"XX\x2a\x00\x08\x00\x00\x00"[..], &b"II\x2c\x00\x08\x00\x00\x00"[..]] {
            let err = TiffMetadataReader::try_open(&mut Cursor::new(header.to_vec()))
                .err()
                .unwrap();
            assert!(err.is_format_error());
        }
    }

    #[test]
    fn detects_cycles_in_directory_chain() {
        // One directory at offset 8 whose next pointer is itself.
        let mut buf = b"II\x2a\x00\x08\x00\x00\x00".to_vec();
        buf.extend_from_slice(&[2, 0]);
        buf.extend_from_slice(&[0, 1, 4, 0, 1, 0, 0, 0, 1, 0, 0, 0]);
        buf.extend_from_slice(&[1, 1, 4, 0, 1, 0, 0, 0, 1, 0, 0, 0]);
        buf.extend_from_slice(&8u32.to_le_bytes());
        let mut source = Cursor::new(buf);
        let mut reader = TiffMetadataReader::try_open(&mut source).unwrap();
        let first = reader.read_next_ifd(&mut source).unwrap().unwrap();
        assert_eq!(first.image_width(), 1);
        assert_eq!(reader.next_ifd_offset(), Some(8));
        let err = reader.read_next_ifd(&mut source).unwrap_err();
        assert!(matches!(
            err,
            TiffCodecError::InternalTIFFError(TiffError::FormatError(
                TiffFormatError::CycleInOffsets
            ))
        ));
    }
}
