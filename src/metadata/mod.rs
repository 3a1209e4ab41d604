//! API for reading and writing the TIFF header and directory chain.
//!
//! ### Reading all TIFF metadata
//!
//! [`TiffMetadataReader::read_all_ifds`] walks the chain of directories from the header's first
//! offset until a zero next-offset terminates it:
//!
//! ```
//! use std::io::Cursor;
//!
//! use tiff_codec::ifd::TagEntry;
//! use tiff_codec::metadata::{StreamWriter, TiffMetadataReader};
//! use tiff_codec::tiff::tags::Tag;
//!
//! let mut writer = StreamWriter::new(Cursor::new(Vec::new()), false).unwrap();
//! writer
//!     .write_directory(vec![
//!         TagEntry::long(Tag::ImageWidth, 16),
//!         TagEntry::long(Tag::ImageLength, 8),
//!     ])
//!     .unwrap();
//! let mut stream = Cursor::new(writer.finish().unwrap().into_inner());
//!
//! let mut metadata_reader = TiffMetadataReader::try_open(&mut stream).unwrap();
//! let ifds = metadata_reader.read_all_ifds(&mut stream).unwrap();
//! assert_eq!(ifds[0].image_width(), 16);
//! ```
//!
//! ### Writing
//!
//! [`StreamWriter`] writes the header, then any number of data blocks and directories. Every
//! directory is linked into the chain by patching a [`DeferredOffset`] reserved before it.

mod reader;
mod writer;

pub use reader::TiffMetadataReader;
pub use writer::{encode_value, DeferredOffset, StreamWriter};
