//! Error handling.

use std::fmt::Debug;
use thiserror::Error;

use crate::tiff::TiffError;

/// Enum with all errors in this crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TiffCodecError {
    /// End of file error.
    #[error("End of File: expected to read {0} bytes, got {1}")]
    EndOfFile(usize, usize),

    /// General error.
    #[error("General error: {0}")]
    General(String),

    /// IO Error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Error while encoding or decoding LZW data.
    #[error(transparent)]
    LZWError(#[from] weezl::LzwError),

    /// An error during TIFF tag parsing, parameter resolution or layout.
    #[error(transparent)]
    InternalTIFFError(#[from] TiffError),

    /// The operation was cancelled through its [`CancellationToken`][crate::CancellationToken].
    #[error("Operation cancelled")]
    Cancelled,

    /// External error
    #[error(transparent)]
    External(Box<dyn std::error::Error + Send + Sync>),
}

impl TiffCodecError {
    /// Whether the stream is structurally invalid or lacks a mandatory tag.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            TiffCodecError::InternalTIFFError(TiffError::FormatError(_))
                | TiffCodecError::LZWError(_)
                | TiffCodecError::EndOfFile(..)
        )
    }

    /// Whether the stream is valid but describes a feature combination this codec does not
    /// implement.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            TiffCodecError::InternalTIFFError(TiffError::UnsupportedError(_))
        )
    }
}

impl From<crate::tiff::TiffFormatError> for TiffCodecError {
    fn from(err: crate::tiff::TiffFormatError) -> Self {
        TiffError::FormatError(err).into()
    }
}

impl From<crate::tiff::TiffUnsupportedError> for TiffCodecError {
    fn from(err: crate::tiff::TiffUnsupportedError) -> Self {
        TiffError::UnsupportedError(err).into()
    }
}

impl From<crate::tiff::UsageError> for TiffCodecError {
    fn from(err: crate::tiff::UsageError) -> Self {
        TiffError::UsageError(err).into()
    }
}

impl From<std::num::TryFromIntError> for TiffCodecError {
    fn from(_err: std::num::TryFromIntError) -> Self {
        TiffError::IntSizeError.into()
    }
}

/// Crate-specific result type.
pub type TiffCodecResult<T> = std::result::Result<T, TiffCodecError>;

#[cfg(test)]
mod test {
    use super::*;
    use crate::tiff::tags::Tag;
    use crate::tiff::{TiffFormatError, TiffUnsupportedError};

    #[test]
    fn classifies_error_kinds() {
        let missing: TiffCodecError =
            TiffFormatError::RequiredTagNotFound(Tag::PhotometricInterpretation).into();
        assert!(missing.is_format_error());
        assert!(!missing.is_unsupported());

        let unsupported: TiffCodecError = TiffUnsupportedError::VariableRowsPerStrip.into();
        assert!(unsupported.is_unsupported());
        assert!(!unsupported.is_format_error());

        assert!(!TiffCodecError::Cancelled.is_format_error());
    }
}
