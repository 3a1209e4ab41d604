//! Decoding a TIFF stream into frames.

use std::io::{Read, Seek};

use tracing::debug;

use crate::cancel::CancellationToken;
use crate::color::color_codec;
use crate::compression::CompressionRegistry;
use crate::entries::is_metadata;
use crate::error::TiffCodecResult;
use crate::frame::{Frame, FrameBuffer, FrameMetadata, TiffImage};
use crate::ifd::ImageFileDirectory;
use crate::layout::LayoutEngine;
use crate::metadata::TiffMetadataReader;
use crate::options::DecodeParameters;
use crate::reader::Endianness;
use crate::tiff::tags::ResolutionUnit;
use crate::tiff::TiffFormatError;

/// Options for [`TiffDecoder`].
#[derive(Debug, Clone, Default)]
pub struct DecoderOptions {
    /// Stop after this many frames. All frames are decoded when `None`.
    pub max_frames: Option<usize>,
    /// Polled before every frame and every chunk.
    pub cancellation: CancellationToken,
}

/// Decodes every frame of a TIFF stream.
///
/// ```
/// use std::io::Cursor;
///
/// use tiff_codec::decoder::{DecoderOptions, TiffDecoder};
/// use tiff_codec::encoder::{EncoderOptions, TiffEncoder};
/// use tiff_codec::frame::{Channels, Frame, FrameBuffer, PixelData, TiffImage};
///
/// let buffer = FrameBuffer::from_data(2, 1, Channels::Rgb, PixelData::U8(vec![1, 2, 3, 4, 5, 6]))
///     .unwrap();
/// let image = TiffImage::new(vec![Frame::new(buffer)]);
/// let stream = TiffEncoder::new(EncoderOptions::default())
///     .encode(Cursor::new(Vec::new()), &image)
///     .unwrap();
///
/// let decoded = TiffDecoder::new(DecoderOptions::default())
///     .decode(&mut Cursor::new(stream.into_inner()))
///     .unwrap();
/// assert_eq!(decoded.frames[0].buffer.data(), &PixelData::U8(vec![1, 2, 3, 4, 5, 6]));
/// ```
#[derive(Debug, Default)]
pub struct TiffDecoder {
    options: DecoderOptions,
    registry: CompressionRegistry,
}

impl TiffDecoder {
    /// Create a decoder with the default compression ports.
    pub fn new(options: DecoderOptions) -> Self {
        Self::with_registry(options, CompressionRegistry::default())
    }

    /// Create a decoder using the ports of `registry`.
    pub fn with_registry(options: DecoderOptions, registry: CompressionRegistry) -> Self {
        Self { options, registry }
    }

    /// The compression ports, for registering or replacing a port.
    pub fn registry_mut(&mut self) -> &mut CompressionRegistry {
        &mut self.registry
    }

    /// Decode the frames of `source`.
    ///
    /// Image-level metadata is taken from the first directory. If any frame fails, the frames
    /// decoded before it are dropped and the error is returned.
    pub fn decode<R: Read + Seek>(&self, source: &mut R) -> TiffCodecResult<TiffImage> {
        let mut metadata_reader = TiffMetadataReader::try_open(source)?;
        let endianness = metadata_reader.endianness();
        let mut image = TiffImage::default();

        loop {
            if self
                .options
                .max_frames
                .is_some_and(|max| image.frames.len() >= max)
            {
                break;
            }
            let Some(ifd) = metadata_reader.read_next_ifd(source)? else {
                break;
            };
            self.options.cancellation.check()?;
            debug!(frame = image.frames.len(), "decoding frame");
            if image.frames.is_empty() {
                image.metadata = ifd
                    .entries()
                    .iter()
                    .filter(|entry| is_metadata(entry.tag()))
                    .cloned()
                    .collect();
            }
            let frame = self.decode_frame(source, ifd, endianness)?;
            image.frames.push(frame);
        }

        if image.frames.is_empty() {
            return Err(TiffFormatError::ImageFileDirectoryNotFound.into());
        }
        Ok(image)
    }

    /// Decode the pixels described by one directory.
    pub fn decode_frame<R: Read + Seek>(
        &self,
        source: &mut R,
        ifd: ImageFileDirectory,
        endianness: Endianness,
    ) -> TiffCodecResult<Frame> {
        let params = DecodeParameters::from_directory(&ifd, endianness)?;
        let codec = color_codec(params.color_type, &params.codec_context())?;
        let mut buffer = FrameBuffer::new(params.width, params.height, codec.pixel_format())?;
        LayoutEngine::new(&self.registry, &self.options.cancellation).decode(
            source,
            &params,
            codec.as_ref(),
            &mut buffer,
        )?;

        let metadata = FrameMetadata {
            bits_per_pixel: params.bits_per_sample.bits_per_pixel(),
            photometric_interpretation: Some(params.photometric_interpretation),
            compression: ifd.compression(),
            predictor: params.predictor,
            resolution: ifd.x_resolution().zip(ifd.y_resolution()),
            resolution_unit: ifd.resolution_unit().unwrap_or(ResolutionUnit::Inch),
            directory: Some(ifd),
        };
        Ok(Frame { buffer, metadata })
    }
}
