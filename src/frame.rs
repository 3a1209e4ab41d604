//! Pixel buffers that decoded frames are written into and encoded frames are read from.

use crate::ifd::{ImageFileDirectory, TagEntry};
use crate::tiff::tags::{CompressionMethod, PhotometricInterpretation, Predictor, ResolutionUnit};
use crate::tiff::{TiffError, TiffResult, UsageError};

/// The channels of a pixel, interleaved in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channels {
    /// Luminance
    L,
    /// Red, green, blue
    Rgb,
    /// Red, green, blue, alpha
    Rgba,
}

impl Channels {
    /// Samples per pixel.
    pub fn count(&self) -> usize {
        match self {
            Channels::L => 1,
            Channels::Rgb => 3,
            Channels::Rgba => 4,
        }
    }
}

/// The storage type of each sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleDepth {
    /// 8 bit unsigned
    U8,
    /// 16 bit unsigned
    U16,
    /// 32 bit unsigned
    U32,
    /// 32 bit IEEE float, nominally in `0.0..=1.0`
    F32,
}

impl SampleDepth {
    /// Bits per sample.
    pub fn bits(&self) -> u16 {
        match self {
            SampleDepth::U8 => 8,
            SampleDepth::U16 => 16,
            SampleDepth::U32 | SampleDepth::F32 => 32,
        }
    }

    /// The narrowest unsigned depth holding `bits` bits.
    pub(crate) fn for_bits(bits: u16) -> Self {
        match bits {
            0..=8 => SampleDepth::U8,
            9..=16 => SampleDepth::U16,
            _ => SampleDepth::U32,
        }
    }
}

/// The layout of one pixel in a [`FrameBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormat {
    /// Channels per pixel
    pub channels: Channels,
    /// Storage of each sample
    pub depth: SampleDepth,
}

impl PixelFormat {
    /// Create a pixel format.
    pub const fn new(channels: Channels, depth: SampleDepth) -> Self {
        Self { channels, depth }
    }

    /// Bits per pixel across all channels.
    pub fn bits_per_pixel(&self) -> u16 {
        self.channels.count() as u16 * self.depth.bits()
    }
}

/// Sample storage of a [`FrameBuffer`]
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum PixelData {
    /// A vector of unsigned bytes
    U8(Vec<u8>),
    /// A vector of unsigned words
    U16(Vec<u16>),
    /// A vector of 32 bit unsigned ints
    U32(Vec<u32>),
    /// A vector of 32 bit IEEE floats
    F32(Vec<f32>),
}

impl PixelData {
    fn zeroed(depth: SampleDepth, len: usize) -> Self {
        match depth {
            SampleDepth::U8 => PixelData::U8(vec![0; len]),
            SampleDepth::U16 => PixelData::U16(vec![0; len]),
            SampleDepth::U32 => PixelData::U32(vec![0; len]),
            SampleDepth::F32 => PixelData::F32(vec![0.0; len]),
        }
    }

    fn depth(&self) -> SampleDepth {
        match self {
            PixelData::U8(_) => SampleDepth::U8,
            PixelData::U16(_) => SampleDepth::U16,
            PixelData::U32(_) => SampleDepth::U32,
            PixelData::F32(_) => SampleDepth::F32,
        }
    }

    fn len(&self) -> usize {
        match self {
            PixelData::U8(v) => v.len(),
            PixelData::U16(v) => v.len(),
            PixelData::U32(v) => v.len(),
            PixelData::F32(v) => v.len(),
        }
    }
}

/// A 2-D, row-major pixel buffer with interleaved channels.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    channels: Channels,
    data: PixelData,
}

impl FrameBuffer {
    /// Allocate a zeroed buffer.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> TiffResult<Self> {
        let len = sample_count(width, height, format.channels)?;
        Ok(Self {
            width,
            height,
            channels: format.channels,
            data: PixelData::zeroed(format.depth, len),
        })
    }

    /// Wrap existing samples. The sample count must be `width * height * channels`.
    pub fn from_data(
        width: u32,
        height: u32,
        channels: Channels,
        data: PixelData,
    ) -> TiffResult<Self> {
        let expected = sample_count(width, height, channels)?;
        if data.len() != expected {
            return Err(UsageError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            }
            .into());
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The layout of one pixel.
    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::new(self.channels, self.data.depth())
    }

    /// The samples.
    pub fn data(&self) -> &PixelData {
        &self.data
    }

    /// The samples, mutably.
    pub fn data_mut(&mut self) -> &mut PixelData {
        &mut self.data
    }

    /// Consume the buffer, returning its samples.
    pub fn into_data(self) -> PixelData {
        self.data
    }

    /// Index of the first sample of pixel (x, y).
    pub(crate) fn sample_index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels.count()
    }

    /// Pixel (x, y) as RGBA with 16 bit samples; luminance is replicated and a missing alpha is
    /// opaque.
    pub(crate) fn rgba16(&self, x: u32, y: u32) -> [u16; 4] {
        let index = self.sample_index(x, y);
        let n = self.channels.count();
        let mut samples = [0u16; 4];
        for (c, sample) in samples.iter_mut().enumerate().take(n) {
            *sample = match &self.data {
                PixelData::U8(v) => u16::from(v[index + c]) * 257,
                PixelData::U16(v) => v[index + c],
                PixelData::U32(v) => (v[index + c] >> 16) as u16,
                PixelData::F32(v) => (v[index + c].clamp(0.0, 1.0) * 65535.0).round() as u16,
            };
        }
        match self.channels {
            Channels::L => [samples[0], samples[0], samples[0], u16::MAX],
            Channels::Rgb => [samples[0], samples[1], samples[2], u16::MAX],
            Channels::Rgba => samples,
        }
    }

    /// Pixel (x, y) as 16 bit luminance (Rec. 601 weights for colour sources).
    pub(crate) fn luma16(&self, x: u32, y: u32) -> u16 {
        let [r, g, b, _] = self.rgba16(x, y);
        if self.channels == Channels::L {
            return r;
        }
        ((299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b) + 500) / 1000) as u16
    }
}

fn sample_count(width: u32, height: u32, channels: Channels) -> TiffResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(channels.count()))
        .ok_or(TiffError::IntSizeError)
}

/// Frame-level settings carried out of a decoded directory so a frame can be re-encoded with the
/// settings it was stored with.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Sum of the stored bits per sample
    pub bits_per_pixel: u16,
    /// Stored photometric interpretation
    pub photometric_interpretation: Option<PhotometricInterpretation>,
    /// Stored compression
    pub compression: CompressionMethod,
    /// Stored predictor
    pub predictor: Predictor,
    /// X and Y resolution, in `resolution_unit`
    pub resolution: Option<(f64, f64)>,
    /// Unit of `resolution`
    pub resolution_unit: ResolutionUnit,
    /// The source directory, for pass-through of descriptive tags
    pub directory: Option<ImageFileDirectory>,
}

impl Default for FrameMetadata {
    fn default() -> Self {
        Self {
            bits_per_pixel: 0,
            photometric_interpretation: None,
            compression: CompressionMethod::None,
            predictor: Predictor::None,
            resolution: None,
            resolution_unit: ResolutionUnit::Inch,
            directory: None,
        }
    }
}

/// One decoded (or to-be-encoded) frame: its pixels and the settings it carries.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The pixels
    pub buffer: FrameBuffer,
    /// Frame-level settings
    pub metadata: FrameMetadata,
}

impl Frame {
    /// A frame with default metadata.
    pub fn new(buffer: FrameBuffer) -> Self {
        Self {
            buffer,
            metadata: FrameMetadata::default(),
        }
    }
}

/// The frames of one stream, plus the descriptive entries shared by all of them.
#[derive(Debug, Clone, Default)]
pub struct TiffImage {
    /// Frames in directory order
    pub frames: Vec<Frame>,
    /// Image-level descriptive entries. They take precedence over a frame's own entries when
    /// encoding.
    pub metadata: Vec<TagEntry>,
}

impl TiffImage {
    /// An image of `frames` without image-level metadata.
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            metadata: vec![],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_mismatched_sample_counts() {
        let err = FrameBuffer::from_data(2, 2, Channels::Rgb, PixelData::U8(vec![0; 11]))
            .unwrap_err();
        assert!(matches!(
            err,
            TiffError::UsageError(UsageError::BufferSizeMismatch {
                expected: 12,
                actual: 11
            })
        ));
    }

    #[test]
    fn converts_pixels_for_encoding() {
        let frame =
            FrameBuffer::from_data(1, 1, Channels::Rgb, PixelData::U8(vec![255, 0, 128])).unwrap();
        assert_eq!(frame.rgba16(0, 0), [65535, 0, 128 * 257, 65535]);
        let gray = FrameBuffer::from_data(1, 1, Channels::L, PixelData::U16(vec![1234])).unwrap();
        assert_eq!(gray.luma16(0, 0), 1234);
        assert_eq!(gray.pixel_format().bits_per_pixel(), 16);
    }
}
