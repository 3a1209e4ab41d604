use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::str;
use std::string;
use std::sync::Arc;

use jpeg::UnsupportedFeature;

use super::ifd::Value;
use super::tags::{
    CompressionMethod, PhotometricInterpretation, PlanarConfiguration, Predictor, SampleFormat,
    Tag,
};

/// Tiff error kinds.
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub enum TiffError {
    /// The Image is not formatted properly.
    FormatError(TiffFormatError),

    /// The codec does not support features required by the image.
    UnsupportedError(TiffUnsupportedError),

    /// An I/O Error occurred while decoding or encoding the image.
    IoError(io::Error),

    /// A size or offset does not fit the platform or the output format.
    IntSizeError,

    /// The caller passed frames or options that cannot be encoded
    UsageError(UsageError),
}

/// The stream is structurally invalid or lacks a tag every directory must carry.
///
/// Never recovered from: the frame (and the decode) is abandoned.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum TiffFormatError {
    TiffSignatureNotFound,
    TiffSignatureInvalid,
    ImageFileDirectoryNotFound,
    InconsistentSizesEncountered,
    UnexpectedCompressedData {
        actual_bytes: usize,
        required_bytes: usize,
    },
    InvalidDimensions(u32, u32),
    InvalidTag,
    InvalidTagValueType(Tag),
    RequiredTagNotFound(Tag),
    UnknownPredictor(u16),
    UnknownPlanarConfiguration(u16),
    ByteExpected(Value),
    ShortExpected(Value),
    UnsignedIntegerExpected(Value),
    AsciiExpected(Value),
    Format(String),
    RequiredTagEmpty(Tag),
    CycleInOffsets,
    JpegDecoder(JpegDecoderError),
    SamplesPerPixelIsZero,
    InvalidYCbCrSubsampling(Vec<u16>),
    ColorMapLengthMismatch {
        actual: usize,
        expected: usize,
    },
    ChunkCountMismatch {
        offsets: usize,
        byte_counts: usize,
    },
    PlanarChunksNotGrouped {
        chunks: usize,
        channels: usize,
    },
    ChunkOutOfBounds {
        offset: u64,
        length: u64,
    },
}

impl fmt::Display for TiffFormatError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use self::TiffFormatError::*;
        match *self {
            TiffSignatureNotFound => write!(fmt, "TIFF signature not found."),
            TiffSignatureInvalid => write!(fmt, "TIFF signature invalid."),
            ImageFileDirectoryNotFound => write!(fmt, "Image file directory not found."),
            InconsistentSizesEncountered => write!(fmt, "Inconsistent sizes encountered."),
            UnexpectedCompressedData {
                actual_bytes,
                required_bytes,
            } => {
                write!(
                    fmt,
                    "Decompression returned different amount of bytes than expected: got {actual_bytes}, expected {required_bytes}."
                )
            }
            InvalidDimensions(width, height) => write!(fmt, "Invalid dimensions: {width}x{height}."),
            InvalidTag => write!(fmt, "Image contains invalid tag."),
            InvalidTagValueType(ref tag) => {
                write!(fmt, "Tag `{tag:?}` did not have the expected value type.")
            }
            RequiredTagNotFound(ref tag) => write!(fmt, "Required tag `{tag:?}` not found."),
            UnknownPredictor(ref predictor) => {
                write!(fmt, "Unknown predictor “{predictor}” encountered")
            }
            UnknownPlanarConfiguration(ref planar_config) => {
                write!(fmt, "Unknown planar configuration “{planar_config}” encountered")
            }
            ByteExpected(ref val) => write!(fmt, "Expected byte, {val:?} found."),
            ShortExpected(ref val) => write!(fmt, "Expected short, {val:?} found."),
            UnsignedIntegerExpected(ref val) => {
                write!(fmt, "Expected unsigned integer, {val:?} found.")
            }
            AsciiExpected(ref val) => write!(fmt, "Expected ascii string, {val:?} found."),
            Format(ref val) => write!(fmt, "Invalid format: {val:?}."),
            RequiredTagEmpty(ref val) => write!(fmt, "Required tag {val:?} was empty."),
            CycleInOffsets => write!(fmt, "File contained a cycle in the list of IFDs"),
            JpegDecoder(ref error) => write!(fmt, "{error}"),
            SamplesPerPixelIsZero => write!(fmt, "Samples per pixel is zero"),
            InvalidYCbCrSubsampling(ref factors) => write!(
                fmt,
                "YCbCrSubSampling must have two factors with vertical <= horizontal, got {factors:?}"
            ),
            ColorMapLengthMismatch { actual, expected } => write!(
                fmt,
                "ColorMap has {actual} entries, expected {expected}."
            ),
            ChunkCountMismatch {
                offsets,
                byte_counts,
            } => write!(
                fmt,
                "Found {offsets} chunk offsets but {byte_counts} chunk byte counts."
            ),
            PlanarChunksNotGrouped { chunks, channels } => write!(
                fmt,
                "{chunks} planar chunks cannot be grouped into {channels} channels."
            ),
            ChunkOutOfBounds { offset, length } => write!(
                fmt,
                "Chunk at offset {offset} with length {length} lies outside the stream."
            ),
        }
    }
}

/// The stream is valid but combines features this codec does not implement.
///
/// No partial decode is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum TiffUnsupportedError {
    InconsistentBitsPerSample(Vec<u16>),
    InterpretationWithBits(PhotometricInterpretation, Vec<u16>),
    UnknownInterpretation(u16),
    UnsupportedCompressionMethod(CompressionMethod),
    UnsupportedPredictor(Predictor),
    PredictorWithBits(Predictor, u16),
    UnsupportedSampleFormat(Vec<SampleFormat>),
    UnsupportedBitsPerChannel(u16),
    UnsupportedPlanarConfig(Option<PlanarConfiguration>),
    UnsupportedInterpretation(PhotometricInterpretation),
    UnsupportedJpegFeature(UnsupportedFeature),
    FillOrderWithBits(u16),
    MultipleExtraSamples(usize),
    UnsupportedExtraSample(u16),
    VariableRowsPerStrip,
    TiledWithInkNames,
    EncodingWithoutCodec,
    SubsampledLayout(Vec<u16>),
}

impl fmt::Display for TiffUnsupportedError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use self::TiffUnsupportedError::*;
        match *self {
            InconsistentBitsPerSample(ref bits_per_sample) => {
                write!(fmt, "Inconsistent bits per sample: {bits_per_sample:?}.")
            }
            InterpretationWithBits(ref photometric_interpretation, ref bits_per_sample) => write!(
                fmt,
                "{photometric_interpretation:?} with {bits_per_sample:?} bits per sample is unsupported"
            ),
            UnknownInterpretation(code) => write!(
                fmt,
                "The image is using an unknown photometric interpretation {code}."
            ),
            UnsupportedCompressionMethod(method) => {
                write!(fmt, "Compression method {method:?} is unsupported")
            }
            UnsupportedPredictor(p) => {
                write!(fmt, "Predictor {p:?} is unsupported")
            }
            PredictorWithBits(p, bits) => {
                write!(fmt, "Predictor {p:?} with {bits} bits per sample is unsupported")
            }
            UnsupportedSampleFormat(ref formats) => {
                write!(fmt, "Sample format {formats:?} is unsupported.")
            }
            UnsupportedBitsPerChannel(bits) => {
                write!(fmt, "{bits} bits per channel not supported")
            }
            UnsupportedPlanarConfig(config) => {
                write!(fmt, "Unsupported planar configuration “{config:?}”.")
            }
            UnsupportedInterpretation(interpretation) => {
                write!(
                    fmt,
                    "Unsupported photometric interpretation \"{interpretation:?}\"."
                )
            }
            UnsupportedJpegFeature(ref unsupported_feature) => {
                write!(fmt, "Unsupported JPEG feature {unsupported_feature:?}")
            }
            FillOrderWithBits(bits) => write!(
                fmt,
                "LSB-first fill order is only supported at 1 bit per pixel, got {bits}"
            ),
            MultipleExtraSamples(count) => write!(
                fmt,
                "Only a single extra alpha sample is supported, got {count}"
            ),
            UnsupportedExtraSample(code) => write!(fmt, "Extra sample type {code} is unsupported"),
            VariableRowsPerStrip => write!(fmt, "Variable-sized strips are unsupported"),
            TiledWithInkNames => write!(fmt, "Tiled images with custom ink names are unsupported"),
            EncodingWithoutCodec => write!(fmt, "This color type can be decoded but not encoded"),
            SubsampledLayout(ref factors) => write!(
                fmt,
                "YCbCr subsampling {factors:?} is only supported in chunky strips"
            ),
        }
    }
}

/// Misuse of the encoder or of a frame buffer.
#[derive(Debug)]
#[allow(missing_docs)]
pub enum UsageError {
    BufferSizeMismatch { expected: usize, actual: usize },
    NoFrames,
}

impl fmt::Display for UsageError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::UsageError::*;
        match *self {
            BufferSizeMismatch { expected, actual } => write!(
                fmt,
                "Pixel buffer holds {actual} samples, expected {expected}."
            ),
            NoFrames => write!(fmt, "At least one frame is required."),
        }
    }
}

impl fmt::Display for TiffError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match *self {
            TiffError::FormatError(ref e) => write!(fmt, "Format error: {e}"),
            TiffError::UnsupportedError(ref f) => write!(
                fmt,
                "The codec does not support the \
                 image format `{f}`"
            ),
            TiffError::IoError(ref e) => e.fmt(fmt),
            TiffError::IntSizeError => write!(fmt, "Platform or format size limits exceeded"),
            TiffError::UsageError(ref e) => write!(fmt, "Usage error: {e}"),
        }
    }
}

impl Error for TiffError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            TiffError::IoError(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TiffError {
    fn from(err: io::Error) -> TiffError {
        TiffError::IoError(err)
    }
}

impl From<str::Utf8Error> for TiffError {
    fn from(_err: str::Utf8Error) -> TiffError {
        TiffError::FormatError(TiffFormatError::InvalidTag)
    }
}

impl From<string::FromUtf8Error> for TiffError {
    fn from(_err: string::FromUtf8Error) -> TiffError {
        TiffError::FormatError(TiffFormatError::InvalidTag)
    }
}

impl From<TiffFormatError> for TiffError {
    fn from(err: TiffFormatError) -> TiffError {
        TiffError::FormatError(err)
    }
}

impl From<TiffUnsupportedError> for TiffError {
    fn from(err: TiffUnsupportedError) -> TiffError {
        TiffError::UnsupportedError(err)
    }
}

impl From<UsageError> for TiffError {
    fn from(err: UsageError) -> TiffError {
        TiffError::UsageError(err)
    }
}

impl From<std::num::TryFromIntError> for TiffError {
    fn from(_err: std::num::TryFromIntError) -> TiffError {
        TiffError::IntSizeError
    }
}

/// A cloneable wrapper around a JPEG decoding failure.
#[derive(Debug, Clone)]
pub struct JpegDecoderError {
    inner: Arc<jpeg::Error>,
}

impl JpegDecoderError {
    fn new(error: jpeg::Error) -> Self {
        Self {
            inner: Arc::new(error),
        }
    }
}

impl PartialEq for JpegDecoderError {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Display for JpegDecoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl From<JpegDecoderError> for TiffError {
    fn from(error: JpegDecoderError) -> Self {
        TiffError::FormatError(TiffFormatError::JpegDecoder(error))
    }
}

impl From<jpeg::Error> for TiffError {
    fn from(error: jpeg::Error) -> Self {
        match error {
            jpeg::Error::Unsupported(feature) => {
                TiffError::UnsupportedError(TiffUnsupportedError::UnsupportedJpegFeature(feature))
            }
            error => JpegDecoderError::new(error).into(),
        }
    }
}

/// Result of an image decoding/encoding process
pub type TiffResult<T> = Result<T, TiffError>;
