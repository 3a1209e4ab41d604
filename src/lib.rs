#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod cancel;
pub mod color;
pub mod compression;
pub mod decoder;
pub mod encoder;
pub mod entries;
pub mod error;
pub mod frame;
pub mod ifd;
pub mod layout;
pub mod metadata;
pub mod options;
pub mod predictor;
pub mod quantize;
pub mod reader;
pub mod tiff;

pub use cancel::CancellationToken;
pub use decoder::{DecoderOptions, TiffDecoder};
pub use encoder::{EncoderOptions, TiffEncoder};
pub use frame::{Frame, FrameBuffer, FrameMetadata, PixelData, TiffImage};
pub use ifd::ImageFileDirectory;
