use std::sync::Arc;

use bytes::Bytes;
use num_enum::TryFromPrimitive;
use tracing::{debug, warn};

use crate::color::samples::row_bytes;
use crate::color::{CodecContext, ColorType, YCbCrInfo};
use crate::ifd::ImageFileDirectory;
use crate::options::{BitsPerSample, CompressionType, ExtraSampleType};
use crate::predictor::check_predictor_support;
use crate::reader::Endianness;
use crate::tiff::tags::{
    FillOrder, PhotometricInterpretation, PlanarConfiguration, Predictor, SampleFormat, Tag,
};
use crate::tiff::{TiffError, TiffFormatError, TiffResult, TiffUnsupportedError};

/// How a frame's pixel data is cut into independently compressed chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkLayout {
    /// Bands of whole rows
    Strips {
        /// Rows in every strip but possibly the last
        rows_per_strip: u32,
    },
    /// A grid of equally sized tiles
    Tiles {
        /// Nominal tile width
        tile_width: u32,
        /// Nominal tile height
        tile_height: u32,
    },
}

/// The validated settings needed to decode one frame.
///
/// Built once per directory by [`DecodeParameters::from_directory`].
#[derive(Debug, Clone)]
pub struct DecodeParameters {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Byte order of the stream
    pub endianness: Endianness,
    /// Resolved pixel encoding
    pub color_type: ColorType,
    /// Compression of every chunk
    pub compression: CompressionType,
    /// Predictor applied before compression
    pub predictor: Predictor,
    /// Chunky or planar storage
    pub planar_configuration: PlanarConfiguration,
    /// Unsigned integer or IEEE float samples
    pub sample_format: SampleFormat,
    /// Bit order within bytes
    pub fill_order: FillOrder,
    /// Per-channel bit widths
    pub bits_per_sample: BitsPerSample,
    /// The single alpha channel, if any
    pub extra_samples: Option<ExtraSampleType>,
    /// ColorMap of palette images
    pub color_map: Option<Arc<[u16]>>,
    /// YCbCr conversion parameters
    pub ycbcr: YCbCrInfo,
    /// Photometric interpretation the pixels are decoded as
    pub photometric_interpretation: PhotometricInterpretation,
    /// Photometric interpretation as stored; differs from the above for JPEG-coded YCbCr
    pub stored_photometric_interpretation: PhotometricInterpretation,
    /// Strip or tile geometry
    pub layout: ChunkLayout,
    /// Absolute offset of every chunk, planes grouped together when planar
    pub chunk_offsets: Vec<u64>,
    /// Byte count of every chunk
    pub chunk_byte_counts: Vec<u64>,
    /// Shared JPEG quantization and Huffman tables
    pub jpeg_tables: Option<Bytes>,
}

impl DecodeParameters {
    /// Resolve the tags of `ifd` into decode parameters, rejecting invalid or unsupported
    /// combinations.
    pub fn from_directory(ifd: &ImageFileDirectory, endianness: Endianness) -> TiffResult<Self> {
        let (width, height) = (ifd.image_width(), ifd.image_height());
        if width == 0 || height == 0 {
            return Err(TiffFormatError::InvalidDimensions(width, height).into());
        }

        let compression = CompressionType::try_from(ifd.compression())?;
        let planar_configuration = ifd
            .planar_configuration()
            .unwrap_or(PlanarConfiguration::Chunky);

        let code = ifd
            .photometric_interpretation
            .ok_or(TiffFormatError::RequiredTagNotFound(Tag::PhotometricInterpretation))?;
        let stored_photometric_interpretation = PhotometricInterpretation::from_u16(code)
            .ok_or(TiffUnsupportedError::UnknownInterpretation(code))?;

        let sample_format = resolve_sample_format(ifd.sample_format())?;
        let mut bits_per_sample = resolve_bits_per_sample(ifd)?;
        if compression.is_bilevel() {
            bits_per_sample = force_bilevel(bits_per_sample);
        }
        let extra_samples = resolve_extra_samples(ifd.extra_samples())?;

        let mut ycbcr = resolve_ycbcr(ifd)?;
        let mut photometric_interpretation = stored_photometric_interpretation;
        if compression.is_jpeg() {
            // The JPEG stream carries its own chroma subsampling and color conversion.
            ycbcr.subsampling = (1, 1);
            if photometric_interpretation == PhotometricInterpretation::YCbCr {
                photometric_interpretation = PhotometricInterpretation::RGB;
            }
        }

        let color_type = resolve_color_type(
            photometric_interpretation,
            &bits_per_sample,
            sample_format,
            planar_configuration,
        )?;

        let color_map = match color_type {
            ColorType::PaletteColor => Some(resolve_color_map(ifd, bits_per_sample.channel(0))?),
            _ => None,
        };

        let fill_order = ifd.fill_order().unwrap_or(FillOrder::MsbFirst);
        if fill_order == FillOrder::LsbFirst && bits_per_sample.bits_per_pixel() != 1 {
            return Err(
                TiffUnsupportedError::FillOrderWithBits(bits_per_sample.bits_per_pixel()).into(),
            );
        }

        let predictor = ifd.predictor().unwrap_or(Predictor::None);
        if predictor != Predictor::None {
            check_predictor_support(predictor, bits_per_sample.channel(0), sample_format)?;
            if color_type == ColorType::YCbCr && ycbcr.subsampling != (1, 1) {
                return Err(TiffUnsupportedError::UnsupportedPredictor(predictor).into());
            }
        }

        let (layout, chunk_offsets, chunk_byte_counts) =
            resolve_layout(ifd, height, planar_configuration)?;
        if matches!(layout, ChunkLayout::Tiles { .. })
            && color_type == ColorType::YCbCr
            && ycbcr.subsampling != (1, 1)
        {
            let (h, v) = ycbcr.subsampling;
            return Err(TiffUnsupportedError::SubsampledLayout(vec![h, v]).into());
        }
        if color_type == ColorType::YCbCrPlanar && ycbcr.subsampling != (1, 1) {
            let (h, v) = ycbcr.subsampling;
            return Err(TiffUnsupportedError::SubsampledLayout(vec![h, v]).into());
        }

        let params = Self {
            width,
            height,
            endianness,
            color_type,
            compression,
            predictor,
            planar_configuration,
            sample_format,
            fill_order,
            bits_per_sample,
            extra_samples,
            color_map,
            ycbcr,
            photometric_interpretation,
            stored_photometric_interpretation,
            layout,
            chunk_offsets,
            chunk_byte_counts,
            jpeg_tables: ifd.jpeg_tables.clone(),
        };
        debug!(
            color_type = ?params.color_type,
            compression = ?params.compression,
            predictor = ?params.predictor,
            layout = ?params.layout,
            "resolved decode parameters"
        );
        Ok(params)
    }

    /// Bytes in one row of `width` pixels of one plane (planar) or of all channels (chunky).
    pub fn row_bytes(&self, width: u32, plane: Option<usize>) -> usize {
        match plane {
            Some(channel) => row_bytes(width, 1, self.bits_per_sample.channel(channel)),
            None => row_bytes(width, 1, self.bits_per_sample.bits_per_pixel()),
        }
    }

    /// Bytes of a chunky chunk of `width` x `rows` pixels.
    pub fn chunky_bytes(&self, width: u32, rows: u32) -> usize {
        if self.color_type == ColorType::YCbCr {
            self.ycbcr.chunky_bytes(width, rows)
        } else {
            self.row_bytes(width, None) * rows as usize
        }
    }

    /// The context the frame's [`ColorCodec`][crate::color::ColorCodec] is built from.
    pub fn codec_context(&self) -> CodecContext {
        CodecContext {
            endianness: self.endianness,
            bits_per_sample: self.bits_per_sample,
            extra_samples: self.extra_samples,
            color_map: self.color_map.clone(),
            palette: None,
            ycbcr: self.ycbcr,
        }
    }
}

fn resolve_sample_format(formats: Option<&[SampleFormat]>) -> TiffResult<SampleFormat> {
    let formats = formats.unwrap_or(&[SampleFormat::Uint]);
    let first = formats.first().copied().unwrap_or(SampleFormat::Uint);
    if formats.iter().any(|f| *f != first)
        || !matches!(first, SampleFormat::Uint | SampleFormat::IEEEFP)
    {
        return Err(TiffUnsupportedError::UnsupportedSampleFormat(formats.to_vec()).into());
    }
    Ok(first)
}

fn resolve_bits_per_sample(ifd: &ImageFileDirectory) -> TiffResult<BitsPerSample> {
    let declared = ifd.bits_per_sample().unwrap_or(&[1]);
    let channels = match ifd.samples_per_pixel() {
        Some(0) => return Err(TiffFormatError::SamplesPerPixelIsZero.into()),
        Some(spp) => spp as usize,
        None => declared.len(),
    };
    if channels > 4 {
        return Err(TiffUnsupportedError::MultipleExtraSamples(channels - 3).into());
    }
    match declared {
        [] => Err(TiffFormatError::RequiredTagEmpty(Tag::BitsPerSample).into()),
        // A single value stands for every sample
        [bits] => Ok(BitsPerSample::uniform(*bits, channels)),
        bits if bits.len() >= channels => Ok(BitsPerSample::new(&bits[..channels])),
        bits => Err(TiffUnsupportedError::InconsistentBitsPerSample(bits.to_vec()).into()),
    }
}

/// CCITT encoders are known to misreport BitsPerSample; the fax schemes only carry bilevel data.
fn force_bilevel(bits: BitsPerSample) -> BitsPerSample {
    if bits.as_slice() != [1] {
        warn!(declared = ?bits.as_slice(), "CCITT compression, forcing 1 bit per pixel");
    }
    BitsPerSample::new(&[1])
}

fn resolve_extra_samples(extra: Option<&[u16]>) -> TiffResult<Option<ExtraSampleType>> {
    match extra.unwrap_or(&[]) {
        [] => Ok(None),
        // CorelDRAW writes 999 where it means unassociated alpha
        [999] => {
            warn!("ExtraSamples value 999, treating as unassociated alpha");
            Ok(Some(ExtraSampleType::UnassociatedAlphaData))
        }
        [code] => match ExtraSampleType::try_from_primitive(*code) {
            Ok(ExtraSampleType::Unspecified) => Ok(None),
            Ok(kind) => Ok(Some(kind)),
            Err(_) => Err(TiffUnsupportedError::UnsupportedExtraSample(*code).into()),
        },
        codes => Err(TiffUnsupportedError::MultipleExtraSamples(codes.len()).into()),
    }
}

fn resolve_ycbcr(ifd: &ImageFileDirectory) -> TiffResult<YCbCrInfo> {
    let mut info = YCbCrInfo::default();
    if let Some(factors) = ifd.ycbcr_subsampling() {
        match factors {
            [h, v] if *h > 0 && *v > 0 && v <= h => info.subsampling = (*h, *v),
            factors => {
                return Err(TiffFormatError::InvalidYCbCrSubsampling(factors.to_vec()).into())
            }
        }
    }
    if let Some([r, g, b]) = ifd.ycbcr_coefficients() {
        info.coefficients = [*r as f32, *g as f32, *b as f32];
    }
    if let Some(reference) = ifd.reference_black_white() {
        if let Ok(values) = <[f64; 6]>::try_from(reference) {
            info.reference_black_white = values.map(|v| v as f32);
        }
    }
    Ok(info)
}

fn resolve_color_map(ifd: &ImageFileDirectory, bits: u16) -> TiffResult<Arc<[u16]>> {
    let map = ifd
        .color_map()
        .ok_or(TiffFormatError::RequiredTagNotFound(Tag::ColorMap))?;
    let expected = 3usize << bits;
    if map.len() != expected {
        return Err(TiffFormatError::ColorMapLengthMismatch {
            actual: map.len(),
            expected,
        }
        .into());
    }
    Ok(map.into())
}

/// Select the color type for `photometric` and validate its channel count and widths.
fn resolve_color_type(
    photometric: PhotometricInterpretation,
    bits: &BitsPerSample,
    sample_format: SampleFormat,
    planar: PlanarConfiguration,
) -> TiffResult<ColorType> {
    use PhotometricInterpretation::*;

    let unsupported = || -> TiffError {
        TiffUnsupportedError::InterpretationWithBits(photometric, bits.as_slice().to_vec()).into()
    };
    if let Some(width) = bits.as_slice().iter().find(|b| **b == 0 || **b > 32) {
        return Err(TiffUnsupportedError::UnsupportedBitsPerChannel(*width).into());
    }
    if !bits.is_uniform() {
        return Err(TiffUnsupportedError::InconsistentBitsPerSample(bits.as_slice().to_vec()).into());
    }
    let width = bits.channel(0);
    let float = sample_format == SampleFormat::IEEEFP;
    if float && width != 32 {
        return Err(TiffUnsupportedError::UnsupportedSampleFormat(vec![sample_format]).into());
    }
    let planar = planar == PlanarConfiguration::Planar;

    let color_type = match photometric {
        WhiteIsZero | BlackIsZero => {
            if bits.channels() != 1 {
                return Err(unsupported());
            }
            ColorType::gray(photometric == WhiteIsZero, width, float)
        }
        RGBPalette => {
            if bits.channels() != 1 || width > 8 || float {
                return Err(unsupported());
            }
            ColorType::PaletteColor
        }
        RGB => {
            if !matches!(bits.channels(), 3 | 4) {
                return Err(unsupported());
            }
            ColorType::rgb(bits.channels(), width, float, planar)
        }
        YCbCr | CIELab => {
            if bits.channels() != 3 || width != 8 || float {
                return Err(unsupported());
            }
            match (photometric, planar) {
                (YCbCr, false) => ColorType::YCbCr,
                (YCbCr, true) => ColorType::YCbCrPlanar,
                (_, false) => ColorType::CieLab,
                (_, true) => ColorType::CieLabPlanar,
            }
        }
        CMYK => {
            if bits.channels() != 4 || width != 8 || float {
                return Err(unsupported());
            }
            if planar {
                return Err(TiffUnsupportedError::UnsupportedPlanarConfig(Some(
                    PlanarConfiguration::Planar,
                ))
                .into());
            }
            ColorType::Cmyk
        }
        TransparencyMask => {
            return Err(TiffUnsupportedError::UnsupportedInterpretation(photometric).into())
        }
    };
    Ok(color_type)
}

fn resolve_layout(
    ifd: &ImageFileDirectory,
    height: u32,
    planar: PlanarConfiguration,
) -> TiffResult<(ChunkLayout, Vec<u64>, Vec<u64>)> {
    if ifd.tile_width().is_some() || ifd.tile_height().is_some() {
        if ifd.has_ink_names {
            return Err(TiffUnsupportedError::TiledWithInkNames.into());
        }
        let tile_width = ifd
            .tile_width()
            .ok_or(TiffFormatError::RequiredTagNotFound(Tag::TileWidth))?;
        let tile_height = ifd
            .tile_height()
            .ok_or(TiffFormatError::RequiredTagNotFound(Tag::TileLength))?;
        if tile_width == 0 || tile_height == 0 {
            return Err(TiffFormatError::InvalidDimensions(tile_width, tile_height).into());
        }
        let layout = ChunkLayout::Tiles {
            tile_width,
            tile_height,
        };
        let (offsets, counts) = match (ifd.tile_offsets(), ifd.tile_byte_counts()) {
            (Some(offsets), Some(counts)) => (offsets.to_vec(), counts.to_vec()),
            (Some(_), None) => {
                return Err(TiffFormatError::RequiredTagNotFound(Tag::TileByteCounts).into())
            }
            (None, _) if planar == PlanarConfiguration::Planar => {
                resolve_tile_offsets_fallback(ifd)?
            }
            (None, _) => return Err(TiffFormatError::RequiredTagNotFound(Tag::TileOffsets).into()),
        };
        return Ok((layout, offsets, counts));
    }

    let offsets = ifd
        .strip_offsets()
        .ok_or(TiffFormatError::RequiredTagNotFound(Tag::StripOffsets))?;
    let counts = ifd
        .strip_byte_counts()
        .ok_or(TiffFormatError::RequiredTagNotFound(Tag::StripByteCounts))?;
    let rows_per_strip = match ifd.rows_per_strip() {
        None | Some([]) => height,
        Some([rows]) => *rows,
        Some(rows) if rows.windows(2).all(|w| w[0] == w[1]) => rows[0],
        Some(_) => return Err(TiffUnsupportedError::VariableRowsPerStrip.into()),
    };
    // 2^32 - 1 is the "single strip" marker; anything at or above the height is one strip
    let rows_per_strip = rows_per_strip.clamp(1, height);
    Ok((
        ChunkLayout::Strips { rows_per_strip },
        offsets.to_vec(),
        counts.to_vec(),
    ))
}

/// Some writers store planar tiles under StripOffsets/StripByteCounts. This is not valid TIFF
/// but the chunk order is the same, so the strip tags are used as tile tags.
fn resolve_tile_offsets_fallback(ifd: &ImageFileDirectory) -> TiffResult<(Vec<u64>, Vec<u64>)> {
    let offsets = ifd
        .strip_offsets()
        .ok_or(TiffFormatError::RequiredTagNotFound(Tag::TileOffsets))?;
    let counts = ifd
        .strip_byte_counts()
        .ok_or(TiffFormatError::RequiredTagNotFound(Tag::TileByteCounts))?;
    warn!("planar tiled image without TileOffsets, using StripOffsets and StripByteCounts");
    Ok((offsets.to_vec(), counts.to_vec()))
}
