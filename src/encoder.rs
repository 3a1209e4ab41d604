//! Encoding frames into a little-endian TIFF stream.

use std::io::{Seek, Write};
use std::sync::Arc;

use tracing::debug;

use crate::cancel::CancellationToken;
use crate::color::{color_codec, ColorType};
use crate::compression::CompressionRegistry;
use crate::entries::EntryCollector;
use crate::error::TiffCodecResult;
use crate::frame::{Frame, FrameMetadata, TiffImage};
use crate::ifd::TagEntry;
use crate::layout::LayoutEngine;
use crate::metadata::StreamWriter;
use crate::options::{BitsPerPixel, CompressionType, EncodeParameters, EncodeRequest};
use crate::quantize::{PopularityQuantizer, Quantizer};
use crate::tiff::tags::{PhotometricInterpretation, Predictor, ResolutionUnit};
use crate::tiff::UsageError;

/// Options for [`TiffEncoder`].
///
/// Settings left at `None` are taken from each frame's [`FrameMetadata`], then from the built-in
/// defaults (24 bit RGB, uncompressed, no predictor).
#[derive(Debug, Clone)]
pub struct EncoderOptions {
    /// Total bits per pixel
    pub bits_per_pixel: Option<BitsPerPixel>,
    /// Photometric interpretation
    pub photometric_interpretation: Option<PhotometricInterpretation>,
    /// Compression
    pub compression: Option<CompressionType>,
    /// Predictor
    pub predictor: Option<Predictor>,
    /// Write 8 byte offsets
    pub big_tiff: bool,
    /// Uncompressed size each strip aims for
    pub target_strip_bytes: usize,
    /// Unit the resolution is written in, when it can be converted
    pub resolution_unit: Option<ResolutionUnit>,
    /// Polled before every frame and every strip.
    pub cancellation: CancellationToken,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            bits_per_pixel: None,
            photometric_interpretation: None,
            compression: None,
            predictor: None,
            big_tiff: false,
            target_strip_bytes: 8192,
            resolution_unit: None,
            cancellation: CancellationToken::default(),
        }
    }
}

impl EncoderOptions {
    fn request(&self) -> EncodeRequest {
        EncodeRequest {
            bits_per_pixel: self.bits_per_pixel,
            photometric_interpretation: self.photometric_interpretation,
            compression: self.compression,
            predictor: self.predictor,
        }
    }
}

/// The settings a decoded frame was stored with.
fn inherited_request(metadata: &FrameMetadata) -> EncodeRequest {
    EncodeRequest {
        bits_per_pixel: BitsPerPixel::try_from(metadata.bits_per_pixel).ok(),
        photometric_interpretation: metadata.photometric_interpretation,
        compression: CompressionType::try_from(metadata.compression).ok(),
        predictor: Some(metadata.predictor),
    }
}

/// Encodes frames as chunky strips, one directory per frame.
#[derive(Debug)]
pub struct TiffEncoder {
    options: EncoderOptions,
    registry: CompressionRegistry,
    quantizer: Box<dyn Quantizer>,
}

impl TiffEncoder {
    /// Create an encoder with the default compression ports and palette builder.
    pub fn new(options: EncoderOptions) -> Self {
        Self {
            options,
            registry: CompressionRegistry::default(),
            quantizer: Box::new(PopularityQuantizer),
        }
    }

    /// Use `quantizer` to build the palettes of PaletteColor frames.
    pub fn with_quantizer(mut self, quantizer: Box<dyn Quantizer>) -> Self {
        self.quantizer = quantizer;
        self
    }

    /// The compression ports, for registering or replacing a port.
    pub fn registry_mut(&mut self) -> &mut CompressionRegistry {
        &mut self.registry
    }

    /// Write `image` to `writer` and return the writer.
    pub fn encode<W: Write + Seek>(&self, writer: W, image: &TiffImage) -> TiffCodecResult<W> {
        if image.frames.is_empty() {
            return Err(UsageError::NoFrames.into());
        }
        let mut writer = StreamWriter::new(writer, self.options.big_tiff)?;
        for (index, frame) in image.frames.iter().enumerate() {
            self.options.cancellation.check()?;
            debug!(frame = index, "encoding frame");
            self.encode_frame(&mut writer, frame, &image.metadata)?;
        }
        writer.finish()
    }

    fn encode_frame<W: Write + Seek>(
        &self,
        writer: &mut StreamWriter<W>,
        frame: &Frame,
        image_metadata: &[TagEntry],
    ) -> TiffCodecResult<()> {
        let buffer = &frame.buffer;
        let params = EncodeParameters::resolve(
            &self.options.request(),
            &inherited_request(&frame.metadata),
            buffer.pixel_format(),
        );
        debug!(
            bits_per_pixel = ?params.bits_per_pixel,
            photometric_interpretation = ?params.photometric_interpretation,
            compression = ?params.compression,
            predictor = ?params.predictor,
            "resolved encode parameters"
        );

        let (palette, color_map) = if params.color_type == ColorType::PaletteColor {
            let bits = params.bits_per_sample.channel(0);
            let palette = self.quantizer.build_palette(buffer, 1 << bits);
            let color_map = palette.color_map(bits);
            (Some(Arc::new(palette)), Some(color_map))
        } else {
            (None, None)
        };
        let codec = color_codec(params.color_type, &params.codec_context(palette))?;

        let strips = LayoutEngine::new(&self.registry, &self.options.cancellation).encode(
            buffer,
            &params,
            codec.as_ref(),
            writer,
            self.options.target_strip_bytes,
        )?;

        let mut entries = EntryCollector::new();
        entries.collect_metadata(image_metadata);
        if let Some(directory) = &frame.metadata.directory {
            entries.collect_metadata(directory.entries());
        }
        entries.add_resolution(&frame.metadata, self.options.resolution_unit);
        entries.add_structure(
            (buffer.width(), buffer.height()),
            &params,
            color_map.as_deref(),
            &strips,
            writer.bigtiff(),
        )?;
        writer.write_directory(entries.finish())?;
        Ok(())
    }
}
