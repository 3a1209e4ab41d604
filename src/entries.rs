//! Assembly of the directory written for one encoded frame.

use tracing::trace;

use crate::error::TiffCodecResult;
use crate::frame::FrameMetadata;
use crate::ifd::TagEntry;
use crate::layout::EncodedStrips;
use crate::options::EncodeParameters;
use crate::tiff::tags::{
    PhotometricInterpretation, PlanarConfiguration, Predictor, ResolutionUnit, Tag,
};

/// Software tag written when none is carried over.
pub const SOFTWARE: &str = concat!("tiff-codec ", env!("CARGO_PKG_VERSION"));

/// Resolution written when the frame carries none: 72 pixels per inch.
const DEFAULT_RESOLUTION: (f64, f64) = (72.0, 72.0);

/// Whether `tag` is descriptive metadata that is copied into re-encoded frames.
///
/// Everything else is structure and is recomputed for every encoded frame.
pub fn is_metadata(tag: Tag) -> bool {
    matches!(
        tag,
        Tag::DocumentName
            | Tag::ImageDescription
            | Tag::Make
            | Tag::Model
            | Tag::Software
            | Tag::DateTime
            | Tag::Artist
            | Tag::HostComputer
            | Tag::TargetPrinter
            | Tag::Xmp
            | Tag::Rating
            | Tag::RatingPercent
            | Tag::ImageId
            | Tag::Copyright
            | Tag::Iptc
            | Tag::IccProfile
    )
}

/// Convert resolution values between inches and centimeters.
///
/// Any other pair of units is returned unchanged.
pub fn convert_resolution(
    (x, y): (f64, f64),
    from: ResolutionUnit,
    to: ResolutionUnit,
) -> (f64, f64) {
    match (from, to) {
        (ResolutionUnit::Centimeter, ResolutionUnit::Inch) => (x * 2.54, y * 2.54),
        (ResolutionUnit::Inch, ResolutionUnit::Centimeter) => (x / 2.54, y / 2.54),
        _ => (x, y),
    }
}

/// `value` as a fraction with a denominator dividing 10000, in lowest terms.
fn rational(value: f64) -> (u32, u32) {
    if !value.is_finite() || value <= 0.0 {
        return (0, 1);
    }
    let denominator = 10_000u64;
    let numerator = (value * denominator as f64).round() as u64;
    let divisor = gcd(numerator, denominator);
    match u32::try_from(numerator / divisor) {
        Ok(numerator) => (numerator, (denominator / divisor) as u32),
        Err(_) => (value.round().min(f64::from(u32::MAX)) as u32, 1),
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Builds the entries of one frame's directory.
///
/// Descriptive entries are collected first, the first occurrence of a tag winning. Structural
/// entries always replace whatever was collected under the same tag.
#[derive(Debug, Default)]
pub struct EntryCollector {
    entries: Vec<TagEntry>,
}

impl EntryCollector {
    /// An empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, tag: Tag) -> Option<usize> {
        self.entries.iter().position(|entry| entry.tag() == tag)
    }

    /// Copy the descriptive entries of `source` that are not collected yet.
    pub fn collect_metadata<'a>(&mut self, source: impl IntoIterator<Item = &'a TagEntry>) {
        for entry in source {
            if is_metadata(entry.tag()) && self.position(entry.tag()).is_none() {
                trace!(tag = ?entry.tag(), "carrying metadata entry");
                self.entries.push(entry.clone());
            }
        }
    }

    /// Add `entry`, replacing any entry with the same tag.
    pub fn set(&mut self, entry: TagEntry) {
        match self.position(entry.tag()) {
            Some(index) => self.entries[index] = entry,
            None => self.entries.push(entry),
        }
    }

    /// Add the entries describing the frame's pixels and where its strips were written.
    pub fn add_structure(
        &mut self,
        (width, height): (u32, u32),
        params: &EncodeParameters,
        color_map: Option<&[u16]>,
        strips: &EncodedStrips,
        bigtiff: bool,
    ) -> TiffCodecResult<()> {
        self.set(TagEntry::long(Tag::ImageWidth, width));
        self.set(TagEntry::long(Tag::ImageLength, height));

        self.set(TagEntry::short(
            Tag::PlanarConfiguration,
            PlanarConfiguration::Chunky.to_u16(),
        ));
        self.set(TagEntry::short(Tag::SamplesPerPixel, params.samples_per_pixel()));
        self.set(TagEntry::shorts(
            Tag::BitsPerSample,
            params.bits_per_sample.as_slice(),
        ));
        self.set(TagEntry::short(
            Tag::Compression,
            params.compression.method().to_u16(),
        ));
        self.set(TagEntry::short(
            Tag::PhotometricInterpretation,
            params.photometric_interpretation.to_u16(),
        ));
        if params.predictor == Predictor::Horizontal
            && matches!(
                params.photometric_interpretation,
                PhotometricInterpretation::RGB
                    | PhotometricInterpretation::RGBPalette
                    | PhotometricInterpretation::BlackIsZero
            )
        {
            self.set(TagEntry::short(Tag::Predictor, Predictor::Horizontal.to_u16()));
        }
        if let Some(color_map) = color_map {
            self.set(TagEntry::shorts(Tag::ColorMap, color_map));
        }
        if let Some(extra) = params.extra_samples {
            self.set(TagEntry::short(Tag::ExtraSamples, extra.into()));
        }

        self.set(TagEntry::long(Tag::RowsPerStrip, strips.rows_per_strip));
        if bigtiff {
            self.set(TagEntry::long8s(Tag::StripOffsets, &strips.offsets));
            self.set(TagEntry::long8s(Tag::StripByteCounts, &strips.byte_counts));
        } else {
            let narrow = |values: &[u64]| -> TiffCodecResult<Vec<u32>> {
                Ok(values
                    .iter()
                    .map(|v| u32::try_from(*v))
                    .collect::<Result<Vec<u32>, _>>()?)
            };
            self.set(TagEntry::longs(Tag::StripOffsets, &narrow(&strips.offsets)?));
            self.set(TagEntry::longs(
                Tag::StripByteCounts,
                &narrow(&strips.byte_counts)?,
            ));
        }
        Ok(())
    }

    /// Add the frame's resolution, converted to `unit` when it is stored in inches or centimeters.
    ///
    /// Frames without a resolution get 72 pixels per inch.
    pub fn add_resolution(&mut self, metadata: &FrameMetadata, unit: Option<ResolutionUnit>) {
        let (stored_unit, resolution) = match metadata.resolution {
            Some(resolution) => (metadata.resolution_unit, resolution),
            None => (ResolutionUnit::Inch, DEFAULT_RESOLUTION),
        };
        let unit = match (stored_unit, unit) {
            (ResolutionUnit::Inch, Some(to @ ResolutionUnit::Centimeter))
            | (ResolutionUnit::Centimeter, Some(to @ ResolutionUnit::Inch)) => to,
            _ => stored_unit,
        };
        let (x, y) = convert_resolution(resolution, stored_unit, unit);
        self.set(TagEntry::short(Tag::ResolutionUnit, unit.to_u16()));
        let (numerator, denominator) = rational(x);
        self.set(TagEntry::rational(Tag::XResolution, numerator, denominator));
        let (numerator, denominator) = rational(y);
        self.set(TagEntry::rational(Tag::YResolution, numerator, denominator));
    }

    /// The collected entries, with a Software entry added if none was carried over.
    pub fn finish(mut self) -> Vec<TagEntry> {
        if self.position(Tag::Software).is_none() {
            self.entries.push(TagEntry::ascii(Tag::Software, SOFTWARE));
        }
        self.entries
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame::{Channels, PixelFormat, SampleDepth};
    use crate::options::{BitsPerPixel, CompressionType, EncodeRequest};
    use crate::tiff::tags::Type;
    use crate::tiff::Value;

    fn params(bits_per_pixel: BitsPerPixel, predictor: Predictor) -> EncodeParameters {
        let explicit = EncodeRequest {
            bits_per_pixel: Some(bits_per_pixel),
            compression: Some(CompressionType::Lzw),
            predictor: Some(predictor),
            ..Default::default()
        };
        EncodeParameters::resolve(
            &explicit,
            &EncodeRequest::default(),
            PixelFormat::new(Channels::Rgb, SampleDepth::U8),
        )
    }

    fn strips() -> EncodedStrips {
        EncodedStrips {
            rows_per_strip: 2,
            offsets: vec![8, 20],
            byte_counts: vec![12, 6],
        }
    }

    #[test]
    fn metadata_first_occurrence_wins() {
        let mut collector = EntryCollector::new();
        collector.collect_metadata(&[
            TagEntry::ascii(Tag::Artist, "first"),
            TagEntry::long(Tag::ImageWidth, 99),
            TagEntry::ascii(Tag::Artist, "second"),
        ]);
        collector.collect_metadata(&[TagEntry::ascii(Tag::Software, "scanner")]);
        let entries = collector.finish();
        assert_eq!(
            entries,
            vec![
                TagEntry::ascii(Tag::Artist, "first"),
                TagEntry::ascii(Tag::Software, "scanner"),
            ]
        );
    }

    #[test]
    fn structure_replaces_carried_entries() {
        let mut collector = EntryCollector::new();
        collector.collect_metadata(&[TagEntry::ascii(Tag::Copyright, "me")]);
        collector
            .add_structure(
                (4, 3),
                &params(BitsPerPixel::Bit24, Predictor::Horizontal),
                None,
                &strips(),
                false,
            )
            .unwrap();
        collector.add_resolution(&FrameMetadata::default(), None);
        let entries = collector.finish();
        let get = |tag| entries.iter().find(|e| e.tag() == tag).map(|e| e.value().clone());

        assert_eq!(get(Tag::SamplesPerPixel), Some(Value::Short(3)));
        assert_eq!(get(Tag::Compression), Some(Value::Short(5)));
        assert_eq!(get(Tag::Predictor), Some(Value::Short(2)));
        assert_eq!(get(Tag::XResolution), Some(Value::Rational(72, 1)));
        assert_eq!(get(Tag::ResolutionUnit), Some(Value::Short(2)));
        assert_eq!(
            get(Tag::StripOffsets),
            Some(Value::List(vec![Value::Unsigned(8), Value::Unsigned(20)]))
        );
        assert_eq!(get(Tag::Software), Some(Value::Ascii(SOFTWARE.to_string())));
        assert_eq!(get(Tag::ExtraSamples), None);
        let mut tags: Vec<u16> = entries.iter().map(|e| e.tag().to_u16()).collect();
        let count = tags.len();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), count);
    }

    #[test]
    fn rgba_and_bigtiff_entries() {
        let mut collector = EntryCollector::new();
        collector
            .add_structure(
                (4, 3),
                &params(BitsPerPixel::Bit32, Predictor::None),
                None,
                &strips(),
                true,
            )
            .unwrap();
        let metadata = FrameMetadata {
            resolution: Some((118.0, 59.5)),
            resolution_unit: ResolutionUnit::Centimeter,
            ..Default::default()
        };
        collector.add_resolution(&metadata, None);
        let entries = collector.finish();
        let get = |tag| entries.iter().find(|e| e.tag() == tag).cloned();
        assert_eq!(get(Tag::ExtraSamples).unwrap().value(), &Value::Short(2));
        assert_eq!(get(Tag::SamplesPerPixel).unwrap().value(), &Value::Short(4));
        assert_eq!(get(Tag::Predictor), None);
        assert_eq!(get(Tag::StripOffsets).unwrap().kind(), Type::LONG8);
        assert_eq!(
            get(Tag::YResolution).unwrap().value(),
            &Value::Rational(119, 2)
        );
        assert_eq!(get(Tag::ResolutionUnit).unwrap().value(), &Value::Short(3));
    }

    #[test]
    fn converts_between_inches_and_centimeters() {
        let metadata = FrameMetadata {
            resolution: Some((100.0, 50.0)),
            resolution_unit: ResolutionUnit::Centimeter,
            ..Default::default()
        };
        let mut collector = EntryCollector::new();
        collector.add_resolution(&metadata, Some(ResolutionUnit::Inch));
        let entries = collector.finish();
        assert_eq!(entries[0].value(), &Value::Short(2));
        assert_eq!(entries[1].value(), &Value::Rational(254, 1));
        assert_eq!(entries[2].value(), &Value::Rational(127, 1));

        let (x, _) = convert_resolution((100.0, 100.0), ResolutionUnit::Centimeter, ResolutionUnit::Inch);
        assert!((x - 254.0).abs() < 1e-9);
        assert_eq!(
            convert_resolution((3.0, 4.0), ResolutionUnit::None, ResolutionUnit::Inch),
            (3.0, 4.0)
        );
    }

    #[test]
    fn classifies_metadata_tags() {
        assert!(is_metadata(Tag::IccProfile));
        assert!(is_metadata(Tag::Iptc));
        assert!(!is_metadata(Tag::BitsPerSample));
        assert!(!is_metadata(Tag::Predictor));
    }
}
