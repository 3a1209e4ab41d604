use std::io::{Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::trace;

use crate::error::TiffCodecResult;
use crate::ifd::TagEntry;
use crate::reader::Endianness;
use crate::tiff::tags::Type;
use crate::tiff::{TiffError, TiffFormatError, TiffResult, Value};

/// A forward reference to an offset field whose value is not known yet.
///
/// The field is written as zero when reserved and patched by seeking back once the target offset
/// exists. A field that is never patched keeps its zero, which terminates the directory chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct DeferredOffset {
    position: u64,
}

impl DeferredOffset {
    /// Stream position of the reserved field.
    pub fn position(&self) -> u64 {
        self.position
    }
}

/// Serializes a little-endian TIFF stream: header, pixel data blocks and the directory chain.
///
/// Each directory patches the pending next-directory field (the header's first-IFD field for the
/// first directory) and leaves its own next-directory field pending.
pub struct StreamWriter<W> {
    writer: W,
    bigtiff: bool,
    pending: DeferredOffset,
}

impl<W: Write + Seek> StreamWriter<W> {
    /// Write the header and reserve the first-IFD field.
    pub fn new(mut writer: W, bigtiff: bool) -> TiffCodecResult<Self> {
        writer.write_all(&Endianness::LittleEndian.marker())?;
        if bigtiff {
            writer.write_u16::<LittleEndian>(43)?;
            // Bytesize of offsets, then a reserved zero
            writer.write_u16::<LittleEndian>(8)?;
            writer.write_u16::<LittleEndian>(0)?;
        } else {
            writer.write_u16::<LittleEndian>(42)?;
        }
        let mut stream_writer = Self {
            writer,
            bigtiff,
            pending: DeferredOffset { position: 0 },
        };
        stream_writer.pending = stream_writer.reserve_offset()?;
        Ok(stream_writer)
    }

    /// Whether offsets are 8 bytes wide.
    pub fn bigtiff(&self) -> bool {
        self.bigtiff
    }

    /// The current stream position.
    pub fn position(&mut self) -> TiffCodecResult<u64> {
        Ok(self.writer.stream_position()?)
    }

    /// Append an opaque block, such as one compressed strip, and return its start offset.
    pub fn write_block(&mut self, data: &[u8]) -> TiffCodecResult<u64> {
        let offset = self.position()?;
        self.writer.write_all(data)?;
        Ok(offset)
    }

    fn pad_to_even(&mut self) -> TiffCodecResult<()> {
        if self.position()? % 2 != 0 {
            self.writer.write_u8(0)?;
        }
        Ok(())
    }

    fn write_offset(&mut self, offset: u64) -> TiffCodecResult<()> {
        if self.bigtiff {
            self.writer.write_u64::<LittleEndian>(offset)?;
        } else {
            self.writer
                .write_u32::<LittleEndian>(u32::try_from(offset)?)?;
        }
        Ok(())
    }

    fn reserve_offset(&mut self) -> TiffCodecResult<DeferredOffset> {
        let position = self.position()?;
        self.write_offset(0)?;
        Ok(DeferredOffset { position })
    }

    /// Seek back to `deferred`, write `offset` there, and return to the end of the stream.
    fn patch(&mut self, deferred: DeferredOffset, offset: u64) -> TiffCodecResult<()> {
        let end = self.position()?;
        self.writer.seek(SeekFrom::Start(deferred.position))?;
        self.write_offset(offset)?;
        self.writer.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    /// Serialize one directory at the current (even-aligned) position and link it into the chain.
    ///
    /// Entries are written in ascending tag order. If a tag id occurs more than once, the first
    /// occurrence in `entries` is written and the rest are dropped. Returns the directory's offset.
    pub fn write_directory(&mut self, mut entries: Vec<TagEntry>) -> TiffCodecResult<u64> {
        // Stable, so the first occurrence of a duplicate stays in front.
        entries.sort_by_key(|entry| entry.tag().to_u16());
        entries.dedup_by_key(|entry| entry.tag().to_u16());

        self.pad_to_even()?;
        let ifd_start = self.position()?;

        // (entry count field, entry, value field / next-directory field)
        let (count_size, entry_size, value_field_size): (u64, u64, usize) = if self.bigtiff {
            (8, 20, 8)
        } else {
            (2, 12, 4)
        };
        let entry_count = u64::try_from(entries.len())?;
        let table_end = ifd_start + count_size + entry_count * entry_size;
        // The out-of-line area starts after the next-directory field.
        let mut data_offset = table_end + u64::try_from(value_field_size)?;

        let mut table = Vec::new();
        let mut data_area = Vec::new();
        if self.bigtiff {
            table.write_u64::<LittleEndian>(entry_count)?;
        } else {
            table.write_u16::<LittleEndian>(u16::try_from(entries.len())?)?;
        }

        for entry in &entries {
            let bytes = encode_value(entry.kind(), entry.value(), Endianness::LittleEndian)?;
            table.write_u16::<LittleEndian>(entry.tag().to_u16())?;
            table.write_u16::<LittleEndian>(entry.kind().to_u16())?;
            if self.bigtiff {
                table.write_u64::<LittleEndian>(entry.count())?;
            } else {
                table.write_u32::<LittleEndian>(u32::try_from(entry.count())?)?;
            }

            if bytes.len() <= value_field_size {
                let mut field = bytes;
                field.resize(value_field_size, 0);
                table.extend_from_slice(&field);
            } else {
                if self.bigtiff {
                    table.write_u64::<LittleEndian>(data_offset)?;
                } else {
                    table.write_u32::<LittleEndian>(u32::try_from(data_offset)?)?;
                }
                data_offset += u64::try_from(bytes.len())?;
                data_area.extend_from_slice(&bytes);
                // Align to word boundary
                if data_offset % 2 != 0 {
                    data_area.push(0);
                    data_offset += 1;
                }
            }
        }

        let previous = self.pending;
        self.writer.write_all(&table)?;
        self.pending = self.reserve_offset()?;
        self.writer.write_all(&data_area)?;
        self.patch(previous, ifd_start)?;

        trace!(ifd_start, entries = entries.len(), "wrote directory");
        Ok(ifd_start)
    }

    /// Flush and return the inner writer. The last directory's next field stays zero.
    pub fn finish(mut self) -> TiffCodecResult<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Serialize `value` as elements of `kind` in the given byte order.
///
/// A [`Value::List`] is flattened element by element. ASCII strings gain their NUL terminator.
pub fn encode_value(kind: Type, value: &Value, endianness: Endianness) -> TiffResult<Vec<u8>> {
    let mut out = Vec::new();
    encode_into(kind, value, endianness, &mut out)?;
    Ok(out)
}

fn encode_into(
    kind: Type,
    value: &Value,
    endianness: Endianness,
    out: &mut Vec<u8>,
) -> TiffResult<()> {
    let push_u16 = |out: &mut Vec<u8>, n: u16| {
        let mut buf = [0; 2];
        endianness.write_u16(&mut buf, n);
        out.extend_from_slice(&buf);
    };
    let push_u32 = |out: &mut Vec<u8>, n: u32| {
        let mut buf = [0; 4];
        endianness.write_u32(&mut buf, n);
        out.extend_from_slice(&buf);
    };
    let push_u64 = |out: &mut Vec<u8>, n: u64| {
        let mut buf = [0; 8];
        endianness.write_u64(&mut buf, n);
        out.extend_from_slice(&buf);
    };

    match (kind, value) {
        (_, Value::List(values)) => {
            for value in values {
                encode_into(kind, value, endianness, out)?;
            }
        }
        (Type::ASCII, Value::Ascii(text)) => {
            out.extend_from_slice(text.as_bytes());
            out.push(0);
        }
        (Type::BYTE | Type::UNDEFINED | Type::ASCII, value) => out.push(value.clone().into_u8()?),
        (Type::SBYTE, Value::SignedByte(n)) => out.push(*n as u8),
        (Type::SHORT, value) => push_u16(out, value.clone().into_u16()?),
        (Type::SSHORT, Value::SignedShort(n)) => push_u16(out, *n as u16),
        (Type::LONG | Type::IFD, value) => push_u32(out, value.clone().into_u32()?),
        (Type::SLONG, Value::Signed(n)) => push_u32(out, *n as u32),
        (Type::LONG8 | Type::IFD8, value) => push_u64(out, value.clone().into_u64()?),
        (Type::SLONG8, Value::SignedBig(n)) => push_u64(out, *n as u64),
        (Type::RATIONAL, Value::Rational(n, d)) => {
            push_u32(out, *n);
            push_u32(out, *d);
        }
        (Type::SRATIONAL, Value::SRational(n, d)) => {
            push_u32(out, *n as u32);
            push_u32(out, *d as u32);
        }
        (Type::FLOAT, Value::Float(n)) => push_u32(out, n.to_bits()),
        (Type::DOUBLE, Value::Double(n)) => push_u64(out, n.to_bits()),
        _ => return Err(TiffError::FormatError(TiffFormatError::InvalidTag)),
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;
    use crate::metadata::TiffMetadataReader;
    use crate::tiff::tags::Tag;

    #[test]
    fn encodes_values_in_byte_order() {
        assert_eq!(
            encode_value(Type::SHORT, &Value::Short(0x0102), Endianness::BigEndian).unwrap(),
            vec![1, 2]
        );
        assert_eq!(
            encode_value(Type::RATIONAL, &Value::Rational(72, 1), Endianness::LittleEndian)
                .unwrap(),
            vec![72, 0, 0, 0, 1, 0, 0, 0]
        );
        assert_eq!(
            encode_value(Type::ASCII, &Value::Ascii("ab".into()), Endianness::LittleEndian)
                .unwrap(),
            b"ab\0".to_vec()
        );
        assert!(encode_value(Type::RATIONAL, &Value::Short(1), Endianness::LittleEndian).is_err());
    }

    #[test]
    fn entries_are_sorted_and_unique() {
        let mut stream = StreamWriter::new(Cursor::new(Vec::new()), false).unwrap();
        stream
            .write_directory(vec![
                TagEntry::ascii(Tag::Software, "first"),
                TagEntry::long(Tag::ImageLength, 3),
                TagEntry::ascii(Tag::Software, "second"),
                TagEntry::long(Tag::ImageWidth, 5),
            ])
            .unwrap();
        let bytes = stream.finish().unwrap().into_inner();

        // Header is 8 bytes, so the directory starts at 8.
        assert_eq!(&bytes[4..8], &8u32.to_le_bytes());
        assert_eq!(&bytes[8..10], &3u16.to_le_bytes());
        let tags: Vec<u16> = (0..3)
            .map(|i| u16::from_le_bytes([bytes[10 + i * 12], bytes[11 + i * 12]]))
            .collect();
        assert_eq!(tags, vec![256, 257, 305]);

        let mut source = Cursor::new(bytes);
        let mut reader = TiffMetadataReader::try_open(&mut source).unwrap();
        let ifds = reader.read_all_ifds(&mut source).unwrap();
        assert_eq!(ifds.len(), 1);
        assert_eq!(ifds[0].image_width(), 5);
        assert_eq!(ifds[0].software(), Some("first"));
    }

    #[test]
    fn chains_directories_through_deferred_offsets() {
        for bigtiff in [false, true] {
            let mut stream = StreamWriter::new(Cursor::new(Vec::new()), bigtiff).unwrap();
            let strip = stream.write_block(&[1, 2, 3]).unwrap();
            let first = stream
                .write_directory(vec![
                    TagEntry::long(Tag::ImageWidth, 1),
                    TagEntry::long(Tag::ImageLength, 1),
                    TagEntry::ascii(Tag::ImageDescription, "out of line"),
                ])
                .unwrap();
            let second = stream
                .write_directory(vec![
                    TagEntry::long(Tag::ImageWidth, 2),
                    TagEntry::long(Tag::ImageLength, 2),
                ])
                .unwrap();
            assert_eq!(first % 2, 0);
            assert_eq!(second % 2, 0);
            assert!(strip < first && first < second);

            let mut source = Cursor::new(stream.finish().unwrap().into_inner());
            let mut reader = TiffMetadataReader::try_open(&mut source).unwrap();
            assert_eq!(reader.bigtiff(), bigtiff);
            assert_eq!(reader.next_ifd_offset(), Some(first));
            let ifds = reader.read_all_ifds(&mut source).unwrap();
            assert_eq!(ifds.len(), 2);
            assert_eq!(
                ifds[0].get(Tag::ImageDescription).map(|e| e.value().clone()),
                Some(Value::Ascii("out of line".into()))
            );
            assert_eq!(ifds[1].image_width(), 2);
        }
    }
}
