//! Tag catalogue, tag values and the format/unsupported error split

mod error;
mod ifd;
pub mod tags;

pub use error::{
    JpegDecoderError, TiffError, TiffFormatError, TiffResult, TiffUnsupportedError, UsageError,
};
pub use ifd::Value;
