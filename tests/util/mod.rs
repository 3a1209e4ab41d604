#![allow(dead_code)]

use std::io::Cursor;

use tiff_codec::frame::{Channels, FrameBuffer, PixelData};
use tiff_codec::{DecoderOptions, EncoderOptions, TiffDecoder, TiffEncoder, TiffImage};

pub(crate) fn encode(image: &TiffImage, options: EncoderOptions) -> Vec<u8> {
    TiffEncoder::new(options)
        .encode(Cursor::new(Vec::new()), image)
        .expect("encoding failed")
        .into_inner()
}

pub(crate) fn decode(bytes: &[u8]) -> TiffImage {
    TiffDecoder::new(DecoderOptions::default())
        .decode(&mut Cursor::new(bytes))
        .expect("decoding failed")
}

/// An 8 bit frame whose samples all differ from their left neighbour.
pub(crate) fn gradient(width: u32, height: u32, channels: Channels) -> FrameBuffer {
    let n = channels.count();
    let data = (0..height)
        .flat_map(|y| (0..width).flat_map(move |x| (0..n).map(move |c| (x * 7 + y * 3 + c as u32 * 50) as u8)))
        .collect();
    FrameBuffer::from_data(width, height, channels, PixelData::U8(data)).unwrap()
}

/// A 16 bit grayscale frame.
pub(crate) fn gradient16(width: u32, height: u32) -> FrameBuffer {
    let data = (0..width * height).map(|i| (i * 977 % 65536) as u16).collect();
    FrameBuffer::from_data(width, height, Channels::L, PixelData::U16(data)).unwrap()
}

/// One directory entry of [`big_endian_tiff`]: tag, type code and a value that fits inline.
pub(crate) struct Entry {
    pub tag: u16,
    pub kind: u16,
    pub values: Vec<u32>,
}

pub(crate) fn short(tag: u16, value: u16) -> Entry {
    Entry {
        tag,
        kind: 3,
        values: vec![u32::from(value)],
    }
}

pub(crate) fn shorts(tag: u16, values: &[u16]) -> Entry {
    Entry {
        tag,
        kind: 3,
        values: values.iter().map(|v| u32::from(*v)).collect(),
    }
}

pub(crate) fn long(tag: u16, value: u32) -> Entry {
    Entry {
        tag,
        kind: 4,
        values: vec![value],
    }
}

/// A classic big-endian TIFF with one directory and one strip holding `strip`.
///
/// StripOffsets and StripByteCounts are added; every other value must fit in 4 bytes.
pub(crate) fn big_endian_tiff(mut entries: Vec<Entry>, strip: &[u8]) -> Vec<u8> {
    let count = entries.len() + 2;
    let strip_offset = 8 + 2 + count as u32 * 12 + 4;
    entries.push(long(273, strip_offset));
    entries.push(long(279, strip.len() as u32));
    entries.sort_by_key(|entry| entry.tag);

    let mut out = b"MM\x00\x2a\x00\x00\x00\x08".to_vec();
    out.extend((count as u16).to_be_bytes());
    for entry in &entries {
        out.extend(entry.tag.to_be_bytes());
        out.extend(entry.kind.to_be_bytes());
        out.extend((entry.values.len() as u32).to_be_bytes());
        let mut field = Vec::new();
        for value in &entry.values {
            match entry.kind {
                3 => field.extend((*value as u16).to_be_bytes()),
                _ => field.extend(value.to_be_bytes()),
            }
        }
        assert!(field.len() <= 4, "value of tag {} does not fit inline", entry.tag);
        field.resize(4, 0);
        out.extend(field);
    }
    out.extend([0; 4]);
    assert_eq!(out.len() as u32, strip_offset);
    out.extend_from_slice(strip);
    out
}
