use bytes::Bytes;

use crate::tiff::tags::{
    CompressionMethod, FillOrder, PhotometricInterpretation, PlanarConfiguration, Predictor,
    ResolutionUnit, SampleFormat, Tag, Type,
};
use crate::tiff::{TiffError, TiffFormatError, TiffResult, Value};

/// One directory entry: a tag id, the data kind it is stored as, and its value or array.
///
/// Tag ids are not unique within a stored directory, but every directory written by this crate
/// holds each tag id at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct TagEntry {
    tag: Tag,
    kind: Type,
    value: Value,
}

impl TagEntry {
    /// Create an entry from its parts.
    pub fn new(tag: Tag, kind: Type, value: Value) -> Self {
        Self { tag, kind, value }
    }

    /// A single SHORT.
    pub fn short(tag: Tag, value: u16) -> Self {
        Self::new(tag, Type::SHORT, Value::Short(value))
    }

    /// An array of SHORT.
    pub fn shorts(tag: Tag, values: &[u16]) -> Self {
        Self::new(
            tag,
            Type::SHORT,
            Value::List(values.iter().copied().map(Value::Short).collect()),
        )
    }

    /// A single LONG.
    pub fn long(tag: Tag, value: u32) -> Self {
        Self::new(tag, Type::LONG, Value::Unsigned(value))
    }

    /// An array of LONG.
    pub fn longs(tag: Tag, values: &[u32]) -> Self {
        Self::new(
            tag,
            Type::LONG,
            Value::List(values.iter().copied().map(Value::Unsigned).collect()),
        )
    }

    /// An array of LONG8, for BigTIFF offsets.
    pub fn long8s(tag: Tag, values: &[u64]) -> Self {
        Self::new(
            tag,
            Type::LONG8,
            Value::List(values.iter().copied().map(Value::UnsignedBig).collect()),
        )
    }

    /// A single RATIONAL.
    pub fn rational(tag: Tag, numerator: u32, denominator: u32) -> Self {
        Self::new(tag, Type::RATIONAL, Value::Rational(numerator, denominator))
    }

    /// A NUL terminated ASCII string.
    pub fn ascii(tag: Tag, value: &str) -> Self {
        Self::new(tag, Type::ASCII, Value::Ascii(value.to_string()))
    }

    /// An opaque byte payload stored as `kind` (BYTE or UNDEFINED).
    pub fn bytes(tag: Tag, kind: Type, payload: &[u8]) -> Self {
        Self::new(
            tag,
            kind,
            Value::List(payload.iter().copied().map(Value::Byte).collect()),
        )
    }

    /// The tag id.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// The data kind the value is stored as.
    pub fn kind(&self) -> Type {
        self.kind
    }

    /// The value or array.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The element count, as stored in the entry's count field.
    pub fn count(&self) -> u64 {
        self.value.count()
    }
}

/// An ImageFileDirectory: one frame's tag entries.
///
/// The structural tags are parsed eagerly into typed fields when the directory is built. Every
/// entry is also kept, in stream order, so pure metadata can be carried into an encoded copy.
#[derive(Debug, Clone)]
pub struct ImageFileDirectory {
    pub(crate) new_subfile_type: Option<u32>,

    /// The number of columns in the image, i.e., the number of pixels per row.
    pub(crate) image_width: u32,

    /// The number of rows of pixels in the image.
    pub(crate) image_height: u32,

    pub(crate) bits_per_sample: Option<Vec<u16>>,

    pub(crate) compression: CompressionMethod,

    /// Raw code, so that a missing tag and an unknown interpretation stay distinguishable.
    pub(crate) photometric_interpretation: Option<u16>,

    pub(crate) fill_order: Option<FillOrder>,

    pub(crate) strip_offsets: Option<Vec<u64>>,

    /// The number of components per pixel.
    ///
    /// SamplesPerPixel is usually 1 for bilevel, grayscale, and palette-color images.
    /// SamplesPerPixel is usually 3 for RGB images. If this value is higher, ExtraSamples should
    /// give an indication of the meaning of the additional channels.
    pub(crate) samples_per_pixel: Option<u16>,

    pub(crate) rows_per_strip: Option<Vec<u32>>,

    pub(crate) strip_byte_counts: Option<Vec<u64>>,

    /// The number of pixels per ResolutionUnit in the ImageWidth direction.
    pub(crate) x_resolution: Option<f64>,

    /// The number of pixels per ResolutionUnit in the ImageLength direction.
    pub(crate) y_resolution: Option<f64>,

    /// How the components of each pixel are stored.
    ///
    /// - Chunky format. The component values for each pixel are stored contiguously. For example,
    ///   for RGB data, the data is stored as RGBRGBRGB
    /// - Planar format. The components are stored in separate component planes. For example, RGB
    ///   data is stored with the Red components in one component plane, the Green in another, and
    ///   the Blue in another.
    pub(crate) planar_configuration: Option<PlanarConfiguration>,

    pub(crate) resolution_unit: Option<ResolutionUnit>,

    /// Name and version number of the software package(s) used to create the image.
    pub(crate) software: Option<String>,

    pub(crate) predictor: Option<Predictor>,

    /// A color map for palette color images.
    ///
    /// In a TIFF ColorMap, all the Red values come first, followed by the Green values, then the
    /// Blue values. The number of values for each color is 2**BitsPerSample. 0 represents the
    /// minimum intensity, and 65535 represents the maximum intensity.
    pub(crate) color_map: Option<Vec<u16>>,

    pub(crate) tile_width: Option<u32>,
    pub(crate) tile_height: Option<u32>,

    pub(crate) tile_offsets: Option<Vec<u64>>,
    pub(crate) tile_byte_counts: Option<Vec<u64>>,

    pub(crate) extra_samples: Option<Vec<u16>>,

    pub(crate) sample_format: Option<Vec<SampleFormat>>,

    pub(crate) jpeg_tables: Option<Bytes>,

    pub(crate) ycbcr_coefficients: Option<Vec<f64>>,
    pub(crate) ycbcr_subsampling: Option<Vec<u16>>,
    pub(crate) reference_black_white: Option<Vec<f64>>,

    pub(crate) has_ink_names: bool,

    pub(crate) entries: Vec<TagEntry>,
}

impl ImageFileDirectory {
    /// Build a directory from entries in stream order.
    ///
    /// When a tag id occurs more than once, the first occurrence defines the typed field.
    pub fn from_entries(entries: Vec<TagEntry>) -> TiffResult<Self> {
        let mut new_subfile_type = None;
        let mut image_width = None;
        let mut image_height = None;
        let mut bits_per_sample = None;
        let mut compression = None;
        let mut photometric_interpretation = None;
        let mut fill_order = None;
        let mut strip_offsets = None;
        let mut samples_per_pixel = None;
        let mut rows_per_strip = None;
        let mut strip_byte_counts = None;
        let mut x_resolution = None;
        let mut y_resolution = None;
        let mut planar_configuration = None;
        let mut resolution_unit = None;
        let mut software = None;
        let mut predictor = None;
        let mut color_map = None;
        let mut tile_width = None;
        let mut tile_height = None;
        let mut tile_offsets = None;
        let mut tile_byte_counts = None;
        let mut extra_samples = None;
        let mut sample_format = None;
        let mut jpeg_tables = None;
        let mut ycbcr_coefficients = None;
        let mut ycbcr_subsampling = None;
        let mut reference_black_white = None;
        let mut has_ink_names = false;

        fn first<T>(slot: &mut Option<T>, value: impl FnOnce() -> TiffResult<T>) -> TiffResult<()> {
            if slot.is_none() {
                *slot = Some(value()?);
            }
            Ok(())
        }

        entries.iter().try_for_each(|entry| {
            let value = || entry.value.clone();
            match entry.tag {
                Tag::NewSubfileType => first(&mut new_subfile_type, || value().into_u32())?,
                Tag::ImageWidth => first(&mut image_width, || value().into_u32())?,
                Tag::ImageLength => first(&mut image_height, || value().into_u32())?,
                Tag::BitsPerSample => first(&mut bits_per_sample, || value().into_u16_vec())?,
                Tag::Compression => first(&mut compression, || {
                    Ok(CompressionMethod::from_u16_exhaustive(value().into_u16()?))
                })?,
                Tag::PhotometricInterpretation => {
                    first(&mut photometric_interpretation, || value().into_u16())?
                }
                Tag::FillOrder => first(&mut fill_order, || {
                    FillOrder::from_u16(value().into_u16()?).ok_or(TiffError::FormatError(
                        TiffFormatError::InvalidTagValueType(Tag::FillOrder),
                    ))
                })?,
                Tag::StripOffsets => first(&mut strip_offsets, || value().into_u64_vec())?,
                Tag::SamplesPerPixel => first(&mut samples_per_pixel, || value().into_u16())?,
                Tag::RowsPerStrip => first(&mut rows_per_strip, || value().into_u32_vec())?,
                Tag::StripByteCounts => first(&mut strip_byte_counts, || value().into_u64_vec())?,
                Tag::XResolution => first(&mut x_resolution, || value().into_f64())?,
                Tag::YResolution => first(&mut y_resolution, || value().into_f64())?,
                Tag::PlanarConfiguration => first(&mut planar_configuration, || {
                    let code = value().into_u16()?;
                    PlanarConfiguration::from_u16(code).ok_or(TiffError::FormatError(
                        TiffFormatError::UnknownPlanarConfiguration(code),
                    ))
                })?,
                Tag::ResolutionUnit => {
                    if resolution_unit.is_none() {
                        resolution_unit = ResolutionUnit::from_u16(value().into_u16()?);
                    }
                }
                Tag::Software => first(&mut software, || value().into_string())?,
                Tag::Predictor => first(&mut predictor, || {
                    let code = value().into_u16()?;
                    Predictor::from_u16(code).ok_or(TiffError::FormatError(
                        TiffFormatError::UnknownPredictor(code),
                    ))
                })?,
                Tag::ColorMap => first(&mut color_map, || value().into_u16_vec())?,
                Tag::TileWidth => first(&mut tile_width, || value().into_u32())?,
                Tag::TileLength => first(&mut tile_height, || value().into_u32())?,
                Tag::TileOffsets => first(&mut tile_offsets, || value().into_u64_vec())?,
                Tag::TileByteCounts => first(&mut tile_byte_counts, || value().into_u64_vec())?,
                Tag::ExtraSamples => first(&mut extra_samples, || value().into_u16_vec())?,
                Tag::SampleFormat => first(&mut sample_format, || {
                    Ok(value()
                        .into_u16_vec()?
                        .into_iter()
                        .map(SampleFormat::from_u16_exhaustive)
                        .collect())
                })?,
                Tag::JPEGTables => {
                    first(&mut jpeg_tables, || Ok(value().into_u8_vec()?.into()))?
                }
                Tag::YCbCrCoefficients => {
                    first(&mut ycbcr_coefficients, || value().into_f64_vec())?
                }
                Tag::YCbCrSubSampling => {
                    first(&mut ycbcr_subsampling, || value().into_u16_vec())?
                }
                Tag::ReferenceBlackWhite => {
                    first(&mut reference_black_white, || value().into_f64_vec())?
                }
                Tag::InkNames => has_ink_names = true,
                _ => {}
            };
            Ok::<_, TiffError>(())
        })?;

        Ok(Self {
            new_subfile_type,
            image_width: image_width.ok_or(TiffError::FormatError(
                TiffFormatError::RequiredTagNotFound(Tag::ImageWidth),
            ))?,
            image_height: image_height.ok_or(TiffError::FormatError(
                TiffFormatError::RequiredTagNotFound(Tag::ImageLength),
            ))?,
            bits_per_sample,
            // Defaults to no compression
            // https://web.archive.org/web/20240329145331/https://www.awaresystems.be/imaging/tiff/tifftags/compression.html
            compression: compression.unwrap_or(CompressionMethod::None),
            photometric_interpretation,
            fill_order,
            strip_offsets,
            samples_per_pixel,
            rows_per_strip,
            strip_byte_counts,
            x_resolution,
            y_resolution,
            planar_configuration,
            resolution_unit,
            software,
            predictor,
            color_map,
            tile_width,
            tile_height,
            tile_offsets,
            tile_byte_counts,
            extra_samples,
            sample_format,
            jpeg_tables,
            ycbcr_coefficients,
            ycbcr_subsampling,
            reference_black_white,
            has_ink_names,
            entries,
        })
    }

    /// Every entry of this directory, in stream order.
    pub fn entries(&self) -> &[TagEntry] {
        &self.entries
    }

    /// The first entry with the given tag id.
    pub fn get(&self, tag: Tag) -> Option<&TagEntry> {
        self.entries.iter().find(|entry| entry.tag == tag)
    }

    /// A general indication of the kind of data contained in this subfile.
    /// <https://web.archive.org/web/20240329145250/https://www.awaresystems.be/imaging/tiff/tifftags/newsubfiletype.html>
    pub fn new_subfile_type(&self) -> Option<u32> {
        self.new_subfile_type
    }

    /// The number of columns in the image, i.e., the number of pixels per row.
    /// <https://web.archive.org/web/20240329145250/https://www.awaresystems.be/imaging/tiff/tifftags/imagewidth.html>
    pub fn image_width(&self) -> u32 {
        self.image_width
    }

    /// The number of rows of pixels in the image.
    /// <https://web.archive.org/web/20240329145250/https://www.awaresystems.be/imaging/tiff/tifftags/imagelength.html>
    pub fn image_height(&self) -> u32 {
        self.image_height
    }

    /// Number of bits per component.
    /// <https://web.archive.org/web/20240329145250/https://www.awaresystems.be/imaging/tiff/tifftags/bitspersample.html>
    pub fn bits_per_sample(&self) -> Option<&[u16]> {
        self.bits_per_sample.as_deref()
    }

    /// Compression scheme used on the image data.
    /// <https://web.archive.org/web/20240329145250/https://www.awaresystems.be/imaging/tiff/tifftags/compression.html>
    pub fn compression(&self) -> CompressionMethod {
        self.compression
    }

    /// The color space of the image data, if the tag is present and known.
    /// <https://web.archive.org/web/20240329145250/https://www.awaresystems.be/imaging/tiff/tifftags/photometricinterpretation.html>
    pub fn photometric_interpretation(&self) -> Option<PhotometricInterpretation> {
        self.photometric_interpretation
            .and_then(PhotometricInterpretation::from_u16)
    }

    /// The logical order of bits within a byte.
    pub fn fill_order(&self) -> Option<FillOrder> {
        self.fill_order
    }

    /// For each strip, the byte offset of that strip.
    /// <https://web.archive.org/web/20240329145250/https://www.awaresystems.be/imaging/tiff/tifftags/stripoffsets.html>
    pub fn strip_offsets(&self) -> Option<&[u64]> {
        self.strip_offsets.as_deref()
    }

    /// The number of components per pixel.
    pub fn samples_per_pixel(&self) -> Option<u16> {
        self.samples_per_pixel
    }

    /// The number of rows per strip.
    /// <https://web.archive.org/web/20240329145250/https://www.awaresystems.be/imaging/tiff/tifftags/rowsperstrip.html>
    pub fn rows_per_strip(&self) -> Option<&[u32]> {
        self.rows_per_strip.as_deref()
    }

    /// For each strip, the number of bytes in the strip after compression.
    /// <https://web.archive.org/web/20240329145250/https://www.awaresystems.be/imaging/tiff/tifftags/stripbytecounts.html>
    pub fn strip_byte_counts(&self) -> Option<&[u64]> {
        self.strip_byte_counts.as_deref()
    }

    /// The number of pixels per ResolutionUnit in the ImageWidth direction.
    pub fn x_resolution(&self) -> Option<f64> {
        self.x_resolution
    }

    /// The number of pixels per ResolutionUnit in the ImageLength direction.
    pub fn y_resolution(&self) -> Option<f64> {
        self.y_resolution
    }

    /// How the components of each pixel are stored.
    /// <https://web.archive.org/web/20240329145250/https://www.awaresystems.be/imaging/tiff/tifftags/planarconfiguration.html>
    pub fn planar_configuration(&self) -> Option<PlanarConfiguration> {
        self.planar_configuration
    }

    /// The unit of measurement for XResolution and YResolution.
    pub fn resolution_unit(&self) -> Option<ResolutionUnit> {
        self.resolution_unit
    }

    /// Name and version number of the software package(s) used to create the image.
    pub fn software(&self) -> Option<&str> {
        self.software.as_deref()
    }

    /// A mathematical operator that is applied to the image data before an encoding scheme is
    /// applied.
    /// <https://web.archive.org/web/20240329145342/https://www.awaresystems.be/imaging/tiff/tifftags/predictor.html>
    pub fn predictor(&self) -> Option<Predictor> {
        self.predictor
    }

    /// The raw ColorMap values: all reds, then all greens, then all blues.
    pub fn color_map(&self) -> Option<&[u16]> {
        self.color_map.as_deref()
    }

    /// The tile width in pixels. This is the number of columns in each tile.
    /// <https://web.archive.org/web/20240329145339/https://www.awaresystems.be/imaging/tiff/tifftags/tilewidth.html>
    pub fn tile_width(&self) -> Option<u32> {
        self.tile_width
    }

    /// The tile length (height) in pixels. This is the number of rows in each tile.
    /// <https://web.archive.org/web/20240329145339/https://www.awaresystems.be/imaging/tiff/tifftags/tilelength.html>
    pub fn tile_height(&self) -> Option<u32> {
        self.tile_height
    }

    /// For each tile, the byte offset of that tile, as compressed and stored on disk.
    /// <https://web.archive.org/web/20240329145339/https://www.awaresystems.be/imaging/tiff/tifftags/tileoffsets.html>
    pub fn tile_offsets(&self) -> Option<&[u64]> {
        self.tile_offsets.as_deref()
    }

    /// For each tile, the number of (compressed) bytes in that tile.
    /// <https://web.archive.org/web/20240329145339/https://www.awaresystems.be/imaging/tiff/tifftags/tilebytecounts.html>
    pub fn tile_byte_counts(&self) -> Option<&[u64]> {
        self.tile_byte_counts.as_deref()
    }

    /// Description of extra components.
    /// <https://web.archive.org/web/20240329145334/https://www.awaresystems.be/imaging/tiff/tifftags/extrasamples.html>
    pub fn extra_samples(&self) -> Option<&[u16]> {
        self.extra_samples.as_deref()
    }

    /// Specifies how to interpret each data sample in a pixel.
    /// <https://web.archive.org/web/20240329145340/https://www.awaresystems.be/imaging/tiff/tifftags/sampleformat.html>
    pub fn sample_format(&self) -> Option<&[SampleFormat]> {
        self.sample_format.as_deref()
    }

    /// JPEG quantization and/or Huffman tables shared by all strips or tiles.
    pub fn jpeg_tables(&self) -> Option<&[u8]> {
        self.jpeg_tables.as_deref()
    }

    /// The transformation from RGB to YCbCr image data.
    pub fn ycbcr_coefficients(&self) -> Option<&[f64]> {
        self.ycbcr_coefficients.as_deref()
    }

    /// The subsampling factors used for the chrominance components.
    pub fn ycbcr_subsampling(&self) -> Option<&[u16]> {
        self.ycbcr_subsampling.as_deref()
    }

    /// Headroom and footroom pairs for each component.
    pub fn reference_black_white(&self) -> Option<&[f64]> {
        self.reference_black_white.as_deref()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn minimal() -> Vec<TagEntry> {
        vec![
            TagEntry::long(Tag::ImageWidth, 4),
            TagEntry::long(Tag::ImageLength, 2),
            TagEntry::short(Tag::PhotometricInterpretation, 1),
        ]
    }

    #[test]
    fn parses_structural_tags() {
        let mut entries = minimal();
        entries.push(TagEntry::shorts(Tag::BitsPerSample, &[8]));
        entries.push(TagEntry::longs(Tag::StripOffsets, &[100, 200]));
        entries.push(TagEntry::rational(Tag::XResolution, 144, 2));
        let ifd = ImageFileDirectory::from_entries(entries).unwrap();
        assert_eq!(ifd.image_width(), 4);
        assert_eq!(ifd.image_height(), 2);
        assert_eq!(ifd.bits_per_sample(), Some(&[8u16][..]));
        assert_eq!(ifd.strip_offsets(), Some(&[100u64, 200][..]));
        assert_eq!(ifd.x_resolution(), Some(72.0));
        assert_eq!(ifd.compression(), CompressionMethod::None);
        assert_eq!(
            ifd.photometric_interpretation(),
            Some(PhotometricInterpretation::BlackIsZero)
        );
    }

    #[test]
    fn first_occurrence_wins() {
        let mut entries = minimal();
        entries.push(TagEntry::ascii(Tag::Software, "first"));
        entries.push(TagEntry::ascii(Tag::Software, "second"));
        let ifd = ImageFileDirectory::from_entries(entries).unwrap();
        assert_eq!(ifd.software(), Some("first"));
        assert_eq!(ifd.entries().len(), 5);
    }

    #[test]
    fn missing_width_is_a_format_error() {
        let err = ImageFileDirectory::from_entries(vec![TagEntry::long(Tag::ImageLength, 2)])
            .unwrap_err();
        assert!(matches!(
            err,
            TiffError::FormatError(TiffFormatError::RequiredTagNotFound(Tag::ImageWidth))
        ));
    }

    #[test]
    fn unknown_predictor_is_a_format_error() {
        let mut entries = minimal();
        entries.push(TagEntry::short(Tag::Predictor, 9));
        assert!(matches!(
            ImageFileDirectory::from_entries(entries),
            Err(TiffError::FormatError(TiffFormatError::UnknownPredictor(9)))
        ));
    }
}
