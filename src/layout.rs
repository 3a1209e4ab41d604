//! Strip and tile geometry, and the loops that move chunks between the stream and a frame.
//!
//! Decoding reads each chunk, decompresses it into a scratch buffer sized for one strip or tile,
//! undoes the predictor and hands the buffer to a [`ColorCodec`] together with the rectangle it
//! covers. Encoding runs the same steps in reverse, one strip at a time.

use std::io::{Read, Seek, Write};

use tracing::{debug, trace, warn};

use crate::cancel::CancellationToken;
use crate::color::ColorCodec;
use crate::compression::{CompressionPort, CompressionRegistry};
use crate::error::TiffCodecResult;
use crate::frame::FrameBuffer;
use crate::metadata::StreamWriter;
use crate::options::{ChunkLayout, CompressionType, DecodeParameters, EncodeParameters};
use crate::predictor::{predict, rev_predict, PredictorInfo};
use crate::reader::EndianAwareReader;
use crate::tiff::tags::FillOrder;
use crate::tiff::{TiffFormatError, TiffResult};

/// Heights of the strips covering `height` rows: `rows_per_strip` each, the last one holding the
/// remainder.
pub fn strip_heights(height: u32, rows_per_strip: u32) -> Vec<u32> {
    let rows_per_strip = rows_per_strip.max(1);
    (0..height.div_ceil(rows_per_strip))
        .map(|strip| rows_per_strip.min(height - strip * rows_per_strip))
        .collect()
}

/// Number of tile columns needed to cover `width` pixels.
pub fn tiles_across(width: u32, tile_width: u32) -> u32 {
    width.div_ceil(tile_width.max(1))
}

/// Width of the pixels tile column `column` actually covers.
pub fn effective_width(width: u32, tile_width: u32, column: u32) -> u32 {
    tile_width.min(width.saturating_sub(column * tile_width))
}

/// Strips of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripLayout {
    /// Rows in every strip but possibly the last
    pub rows_per_strip: u32,
    /// Strips declared for each plane
    pub strips_per_plane: usize,
}

/// Tiles of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    /// Nominal tile width
    pub tile_width: u32,
    /// Nominal tile height
    pub tile_height: u32,
    /// Tile columns
    pub tiles_across: u32,
    /// Tile rows
    pub tiles_down: u32,
}

impl TileLayout {
    /// Tiles in one plane.
    pub fn tiles_per_plane(&self) -> usize {
        self.tiles_across as usize * self.tiles_down as usize
    }
}

/// How a frame's chunks cover it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    /// Bands of whole rows
    Strips(StripLayout),
    /// A grid of tiles
    Tiles(TileLayout),
}

impl Geometry {
    /// Derive the geometry of a frame and check its chunk table against it.
    pub fn new(params: &DecodeParameters) -> TiffResult<Self> {
        let chunks = params.chunk_offsets.len();
        if chunks != params.chunk_byte_counts.len() {
            return Err(TiffFormatError::ChunkCountMismatch {
                offsets: chunks,
                byte_counts: params.chunk_byte_counts.len(),
            }
            .into());
        }
        let planes = planes(params);
        if chunks % planes != 0 {
            return Err(TiffFormatError::PlanarChunksNotGrouped {
                chunks,
                channels: planes,
            }
            .into());
        }

        Ok(match params.layout {
            ChunkLayout::Strips { rows_per_strip } => Geometry::Strips(StripLayout {
                rows_per_strip,
                strips_per_plane: chunks / planes,
            }),
            ChunkLayout::Tiles {
                tile_width,
                tile_height,
            } => {
                let layout = TileLayout {
                    tile_width,
                    tile_height,
                    tiles_across: tiles_across(params.width, tile_width),
                    tiles_down: params.height.div_ceil(tile_height),
                };
                if chunks / planes < layout.tiles_per_plane() {
                    return Err(TiffFormatError::ChunkCountMismatch {
                        offsets: chunks,
                        byte_counts: layout.tiles_per_plane() * planes,
                    }
                    .into());
                }
                Geometry::Tiles(layout)
            }
        })
    }
}

/// Channels stored in separate chunks: 1 for chunky frames.
fn planes(params: &DecodeParameters) -> usize {
    if params.color_type.is_planar() {
        params.bits_per_sample.channels()
    } else {
        1
    }
}

/// Rows per strip for encoding: as many rows as fit in `target_strip_bytes`, at least one.
///
/// Deflate and LZW get twice the target, JPEG always a single strip.
pub fn encode_rows_per_strip(
    bytes_per_row: usize,
    height: u32,
    compression: CompressionType,
    target_strip_bytes: usize,
) -> u32 {
    if compression.is_jpeg() {
        return height;
    }
    let target = match compression {
        CompressionType::Deflate | CompressionType::Lzw => target_strip_bytes.saturating_mul(2),
        _ => target_strip_bytes,
    };
    let rows = (target / bytes_per_row.max(1)).max(1);
    u32::try_from(rows).unwrap_or(u32::MAX).min(height)
}

/// Where the strips of an encoded frame were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedStrips {
    /// Rows in every strip but possibly the last
    pub rows_per_strip: u32,
    /// Stream offset of every strip
    pub offsets: Vec<u64>,
    /// Compressed size of every strip
    pub byte_counts: Vec<u64>,
}

/// Runs the strip and tile loops of one decode or encode call.
#[derive(Debug)]
pub struct LayoutEngine<'a> {
    registry: &'a CompressionRegistry,
    cancellation: &'a CancellationToken,
}

impl<'a> LayoutEngine<'a> {
    /// Create an engine using the ports of `registry`.
    pub fn new(registry: &'a CompressionRegistry, cancellation: &'a CancellationToken) -> Self {
        Self {
            registry,
            cancellation,
        }
    }

    /// Decode every chunk of a frame from `source` into `frame`.
    pub fn decode<R: Read + Seek>(
        &self,
        source: &mut R,
        params: &DecodeParameters,
        codec: &dyn ColorCodec,
        frame: &mut FrameBuffer,
    ) -> TiffCodecResult<()> {
        let geometry = Geometry::new(params)?;
        let mut chunks = ChunkReader {
            source: EndianAwareReader::new(source, params.endianness),
            port: self.registry.port(params.compression)?,
            params,
        };
        trace!(?geometry, "decoding frame");
        match (geometry, params.color_type.is_planar()) {
            (Geometry::Strips(strips), false) => self.strips_chunky(&mut chunks, strips, codec, frame),
            (Geometry::Strips(strips), true) => self.strips_planar(&mut chunks, strips, codec, frame),
            (Geometry::Tiles(tiles), false) => self.tiles_chunky(&mut chunks, tiles, codec, frame),
            (Geometry::Tiles(tiles), true) => self.tiles_planar(&mut chunks, tiles, codec, frame),
        }
    }

    fn strips_chunky<R: Read + Seek>(
        &self,
        chunks: &mut ChunkReader<'_, R>,
        strips: StripLayout,
        codec: &dyn ColorCodec,
        frame: &mut FrameBuffer,
    ) -> TiffCodecResult<()> {
        let params = chunks.params;
        let rows_per_strip = strips.rows_per_strip;
        let mut buffer = vec![0u8; params.chunky_bytes(params.width, rows_per_strip)];
        let predictor = chunky_predictor(params, params.width);

        for strip in 0..strips.strips_per_plane {
            let Some(y) = strip_start(strip, rows_per_strip, params.height) else {
                warn!(
                    declared = strips.strips_per_plane,
                    used = strip,
                    "more strips than rows, ignoring the rest"
                );
                break;
            };
            self.cancellation.check()?;
            let rows = rows_per_strip.min(params.height - y);
            let data = &mut buffer[..params.chunky_bytes(params.width, rows)];
            data.fill(0);
            chunks.read(strip, data)?;
            rev_predict(params.predictor, data, &predictor)?;
            codec.decode(data, frame, 0, y, params.width, rows)?;
        }
        Ok(())
    }

    fn strips_planar<R: Read + Seek>(
        &self,
        chunks: &mut ChunkReader<'_, R>,
        strips: StripLayout,
        codec: &dyn ColorCodec,
        frame: &mut FrameBuffer,
    ) -> TiffCodecResult<()> {
        let params = chunks.params;
        let rows_per_strip = strips.rows_per_strip;
        let channels = params.bits_per_sample.channels();
        let mut buffers: Vec<Vec<u8>> = (0..channels)
            .map(|c| vec![0u8; params.row_bytes(params.width, Some(c)) * rows_per_strip as usize])
            .collect();

        for strip in 0..strips.strips_per_plane {
            let Some(y) = strip_start(strip, rows_per_strip, params.height) else {
                warn!(
                    declared = strips.strips_per_plane,
                    used = strip,
                    "more strips than rows, ignoring the rest"
                );
                break;
            };
            let rows = rows_per_strip.min(params.height - y);
            for (c, buffer) in buffers.iter_mut().enumerate() {
                self.cancellation.check()?;
                let row_bytes = params.row_bytes(params.width, Some(c));
                let data = &mut buffer[..row_bytes * rows as usize];
                data.fill(0);
                chunks.read(c * strips.strips_per_plane + strip, data)?;
                rev_predict(params.predictor, data, &plane_predictor(params, row_bytes, c))?;
            }
            let planes: Vec<&[u8]> = buffers
                .iter()
                .enumerate()
                .map(|(c, buffer)| {
                    &buffer[..params.row_bytes(params.width, Some(c)) * rows as usize]
                })
                .collect();
            codec.decode_planar(&planes, frame, 0, y, params.width, rows)?;
        }
        Ok(())
    }

    fn tiles_chunky<R: Read + Seek>(
        &self,
        chunks: &mut ChunkReader<'_, R>,
        tiles: TileLayout,
        codec: &dyn ColorCodec,
        frame: &mut FrameBuffer,
    ) -> TiffCodecResult<()> {
        let params = chunks.params;
        let tile_row_bytes = params.row_bytes(tiles.tile_width, None);
        let mut tile = vec![0u8; tile_row_bytes * tiles.tile_height as usize];
        let predictor = chunky_predictor(params, tiles.tile_width);

        for (index, (column, x, y)) in tile_origins(tiles).enumerate() {
            self.cancellation.check()?;
            tile.fill(0);
            chunks.read(index, &mut tile)?;
            rev_predict(params.predictor, &mut tile, &predictor)?;

            let width = effective_width(params.width, tiles.tile_width, column);
            let rows = tiles.tile_height.min(params.height - y);
            let row_bytes = params.row_bytes(width, None);
            compact_rows(&mut tile, tile_row_bytes, row_bytes, rows);
            codec.decode(&tile[..row_bytes * rows as usize], frame, x, y, width, rows)?;
        }
        Ok(())
    }

    fn tiles_planar<R: Read + Seek>(
        &self,
        chunks: &mut ChunkReader<'_, R>,
        tiles: TileLayout,
        codec: &dyn ColorCodec,
        frame: &mut FrameBuffer,
    ) -> TiffCodecResult<()> {
        let params = chunks.params;
        let channels = params.bits_per_sample.channels();
        let tile_row_bytes: Vec<usize> = (0..channels)
            .map(|c| params.row_bytes(tiles.tile_width, Some(c)))
            .collect();
        let mut buffers: Vec<Vec<u8>> = tile_row_bytes
            .iter()
            .map(|row_bytes| vec![0u8; row_bytes * tiles.tile_height as usize])
            .collect();

        for (index, (column, x, y)) in tile_origins(tiles).enumerate() {
            let width = effective_width(params.width, tiles.tile_width, column);
            let rows = tiles.tile_height.min(params.height - y);
            for (c, buffer) in buffers.iter_mut().enumerate() {
                self.cancellation.check()?;
                buffer.fill(0);
                chunks.read(c * tiles.tiles_per_plane() + index, buffer)?;
                rev_predict(
                    params.predictor,
                    buffer,
                    &plane_predictor(params, tile_row_bytes[c], c),
                )?;
                let row_bytes = params.row_bytes(width, Some(c));
                compact_rows(buffer, tile_row_bytes[c], row_bytes, rows);
            }
            let planes: Vec<&[u8]> = buffers
                .iter()
                .enumerate()
                .map(|(c, buffer)| &buffer[..params.row_bytes(width, Some(c)) * rows as usize])
                .collect();
            codec.decode_planar(&planes, frame, x, y, width, rows)?;
        }
        Ok(())
    }

    /// Encode `frame` as chunky strips appended to `writer`.
    pub fn encode<W: Write + Seek>(
        &self,
        frame: &FrameBuffer,
        params: &EncodeParameters,
        codec: &dyn ColorCodec,
        writer: &mut StreamWriter<W>,
        target_strip_bytes: usize,
    ) -> TiffCodecResult<EncodedStrips> {
        let port = self.registry.port(params.compression)?;
        let (width, height) = (frame.width(), frame.height());
        let row_bytes = params.row_bytes(width);
        let rows_per_strip =
            encode_rows_per_strip(row_bytes, height, params.compression, target_strip_bytes);
        let predictor = PredictorInfo {
            endianness: params.endianness,
            row_bytes,
            samples: usize::from(params.samples_per_pixel()),
            bits_per_sample: params.bits_per_sample.channel(0),
        };
        debug!(rows_per_strip, row_bytes, "encoding strips");

        let mut buffer = Vec::with_capacity(row_bytes * rows_per_strip as usize);
        let mut strips = EncodedStrips {
            rows_per_strip,
            offsets: vec![],
            byte_counts: vec![],
        };
        let mut y = 0;
        for rows in strip_heights(height, rows_per_strip) {
            self.cancellation.check()?;
            buffer.clear();
            codec.encode(frame, 0, y, width, rows, &mut buffer)?;
            predict(params.predictor, &mut buffer, &predictor)?;
            let compressed = port.compress(&buffer)?;
            strips.offsets.push(writer.write_block(&compressed)?);
            strips.byte_counts.push(u64::try_from(compressed.len())?);
            y += rows;
        }
        Ok(strips)
    }
}

/// Reads and decompresses chunks of one frame by index.
struct ChunkReader<'a, R> {
    source: EndianAwareReader<&'a mut R>,
    port: &'a dyn CompressionPort,
    params: &'a DecodeParameters,
}

impl<R: Read + Seek> ChunkReader<'_, R> {
    fn read(&mut self, index: usize, output: &mut [u8]) -> TiffCodecResult<()> {
        let (Some(offset), Some(length)) = (
            self.params.chunk_offsets.get(index).copied(),
            self.params.chunk_byte_counts.get(index).copied(),
        ) else {
            return Err(TiffFormatError::InconsistentSizesEncountered.into());
        };
        let end = offset
            .checked_add(length)
            .ok_or(TiffFormatError::ChunkOutOfBounds { offset, length })?;
        let compressed = self.source.get_bytes(offset..end)?;
        trace!(index, offset, length, "decompressing chunk");
        self.port.decompress(
            compressed,
            output,
            self.params.stored_photometric_interpretation,
            self.params.jpeg_tables.as_deref(),
        )?;
        if self.params.fill_order == FillOrder::LsbFirst {
            output.iter_mut().for_each(|b| *b = b.reverse_bits());
        }
        Ok(())
    }
}

/// First row of strip `strip`, or `None` once strips start past the frame.
fn strip_start(strip: usize, rows_per_strip: u32, height: u32) -> Option<u32> {
    let y = u64::try_from(strip).ok()? * u64::from(rows_per_strip);
    u32::try_from(y).ok().filter(|y| *y < height)
}

/// (column, x, y) of every tile of one plane, in chunk order.
fn tile_origins(tiles: TileLayout) -> impl Iterator<Item = (u32, u32, u32)> {
    let TileLayout {
        tile_width,
        tile_height,
        tiles_across,
        tiles_down,
    } = tiles;
    (0..tiles_down).flat_map(move |row| {
        (0..tiles_across).map(move |column| (column, column * tile_width, row * tile_height))
    })
}

/// Move the first `row_bytes` of each of `rows` rows of stride `stride` together.
fn compact_rows(buffer: &mut [u8], stride: usize, row_bytes: usize, rows: u32) {
    if row_bytes == stride {
        return;
    }
    for row in 1..rows as usize {
        buffer.copy_within(row * stride..row * stride + row_bytes, row * row_bytes);
    }
}

fn chunky_predictor(params: &DecodeParameters, width: u32) -> PredictorInfo {
    PredictorInfo {
        endianness: params.endianness,
        row_bytes: params.row_bytes(width, None),
        samples: params.bits_per_sample.channels(),
        bits_per_sample: params.bits_per_sample.channel(0),
    }
}

fn plane_predictor(params: &DecodeParameters, row_bytes: usize, channel: usize) -> PredictorInfo {
    PredictorInfo {
        endianness: params.endianness,
        row_bytes,
        samples: 1,
        bits_per_sample: params.bits_per_sample.channel(channel),
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;
    use crate::color::{color_codec, ColorType};
    use crate::frame::PixelData;
    use crate::ifd::{ImageFileDirectory, TagEntry};
    use crate::reader::Endianness;
    use crate::tiff::tags::{Tag, Type};

    #[test]
    fn strip_heights_keep_the_remainder_last() {
        assert_eq!(strip_heights(100, 32), vec![32, 32, 32, 4]);
        assert_eq!(strip_heights(64, 32), vec![32, 32]);
        assert_eq!(strip_heights(5, 10), vec![5]);
    }

    #[test]
    fn last_tile_column_is_narrow() {
        assert_eq!(tiles_across(130, 64), 3);
        assert_eq!(effective_width(130, 64, 0), 64);
        assert_eq!(effective_width(130, 64, 2), 2);
    }

    #[test]
    fn encode_strip_sizing() {
        assert_eq!(encode_rows_per_strip(300, 1000, CompressionType::None, 8192), 27);
        assert_eq!(encode_rows_per_strip(300, 1000, CompressionType::Lzw, 8192), 54);
        assert_eq!(encode_rows_per_strip(300, 10, CompressionType::None, 8192), 10);
        assert_eq!(encode_rows_per_strip(100_000, 10, CompressionType::None, 8192), 1);
        assert_eq!(encode_rows_per_strip(300, 1000, CompressionType::Jpeg, 8192), 1000);
    }

    fn decode(entries: Vec<TagEntry>, stream: Vec<u8>) -> TiffCodecResult<FrameBuffer> {
        let ifd = ImageFileDirectory::from_entries(entries).unwrap();
        let params = DecodeParameters::from_directory(&ifd, Endianness::LittleEndian)?;
        let codec = color_codec(params.color_type, &params.codec_context())?;
        let mut frame = FrameBuffer::new(params.width, params.height, codec.pixel_format())?;
        let registry = CompressionRegistry::default();
        let token = CancellationToken::new();
        LayoutEngine::new(&registry, &token).decode(
            &mut Cursor::new(stream),
            &params,
            codec.as_ref(),
            &mut frame,
        )?;
        Ok(frame)
    }

    fn gray(width: u32, height: u32) -> Vec<TagEntry> {
        vec![
            TagEntry::long(Tag::ImageWidth, width),
            TagEntry::long(Tag::ImageLength, height),
            TagEntry::short(Tag::PhotometricInterpretation, 1),
            TagEntry::shorts(Tag::BitsPerSample, &[8]),
        ]
    }

    #[test]
    fn decodes_strips_and_ignores_surplus() {
        let mut entries = gray(3, 3);
        entries.extend([
            TagEntry::long(Tag::RowsPerStrip, 2),
            TagEntry::longs(Tag::StripOffsets, &[0, 6, 9]),
            TagEntry::longs(Tag::StripByteCounts, &[6, 3, 3]),
        ]);
        let stream = (1..=12).collect();
        let frame = decode(entries, stream).unwrap();
        assert_eq!(frame.data(), &PixelData::U8((1..=9).collect()));
    }

    #[test]
    fn decodes_planar_strips() {
        let entries = vec![
            TagEntry::long(Tag::ImageWidth, 2),
            TagEntry::long(Tag::ImageLength, 1),
            TagEntry::short(Tag::PhotometricInterpretation, 2),
            TagEntry::short(Tag::SamplesPerPixel, 3),
            TagEntry::shorts(Tag::BitsPerSample, &[8, 8, 8]),
            TagEntry::short(Tag::PlanarConfiguration, 2),
            TagEntry::longs(Tag::StripOffsets, &[0, 2, 4]),
            TagEntry::longs(Tag::StripByteCounts, &[2, 2, 2]),
        ];
        let frame = decode(entries, vec![1, 2, 10, 20, 100, 200]).unwrap();
        assert_eq!(frame.data(), &PixelData::U8(vec![1, 10, 100, 2, 20, 200]));
    }

    #[test]
    fn decodes_tiles_with_partial_edges() {
        // 3x3 frame of 2x2 tiles: the right column and the bottom row are cut off
        let mut entries = gray(3, 3);
        entries.extend([
            TagEntry::long(Tag::TileWidth, 2),
            TagEntry::long(Tag::TileLength, 2),
            TagEntry::longs(Tag::TileOffsets, &[0, 4, 8, 12]),
            TagEntry::longs(Tag::TileByteCounts, &[4, 4, 4, 4]),
        ]);
        #[rustfmt::skip]
        let stream = vec![
            1, 2, 4, 5,
            3, 0, 6, 0,
            7, 8, 0, 0,
            9, 0, 0, 0,
        ];
        let frame = decode(entries, stream).unwrap();
        assert_eq!(frame.data(), &PixelData::U8((1..=9).collect()));
    }

    #[test]
    fn decodes_planar_tiles() {
        let entries = vec![
            TagEntry::long(Tag::ImageWidth, 3),
            TagEntry::long(Tag::ImageLength, 1),
            TagEntry::short(Tag::PhotometricInterpretation, 2),
            TagEntry::short(Tag::SamplesPerPixel, 3),
            TagEntry::shorts(Tag::BitsPerSample, &[8, 8, 8]),
            TagEntry::short(Tag::PlanarConfiguration, 2),
            TagEntry::long(Tag::TileWidth, 2),
            TagEntry::long(Tag::TileLength, 1),
            TagEntry::longs(Tag::TileOffsets, &[0, 2, 4, 6, 8, 10]),
            TagEntry::longs(Tag::TileByteCounts, &[2, 2, 2, 2, 2, 2]),
        ];
        #[rustfmt::skip]
        let stream = vec![
            1, 2, 3, 0,
            10, 20, 30, 0,
            100, 110, 120, 0,
        ];
        let frame = decode(entries, stream).unwrap();
        assert_eq!(
            frame.data(),
            &PixelData::U8(vec![1, 10, 100, 2, 20, 110, 3, 30, 120])
        );
    }

    #[test]
    fn short_strips_do_not_repeat_the_previous_strip() {
        let mut entries = gray(2, 3);
        entries.extend([
            TagEntry::long(Tag::RowsPerStrip, 1),
            TagEntry::longs(Tag::StripOffsets, &[0, 2, 3]),
            TagEntry::longs(Tag::StripByteCounts, &[2, 1, 2]),
        ]);
        let frame = decode(entries, vec![1, 2, 3, 5, 6]).unwrap();
        assert_eq!(frame.data(), &PixelData::U8(vec![1, 2, 3, 0, 5, 6]));
    }

    #[test]
    fn decodes_planar_tiles_cut_off_at_both_edges() {
        // 3x3 RGB frame of 2x2 tiles, one plane after another; 0xEE marks tile padding
        let value = |c: u32, x: u32, y: u32| (c * 100 + y * 3 + x + 1) as u8;
        let mut stream = vec![];
        for c in 0..3 {
            for (tx, ty) in [(0, 0), (2, 0), (0, 2), (2, 2)] {
                for y in ty..ty + 2 {
                    for x in tx..tx + 2 {
                        stream.push(if x < 3 && y < 3 { value(c, x, y) } else { 0xEE });
                    }
                }
            }
        }
        let offsets: Vec<u32> = (0..12).map(|i| i * 4).collect();
        let entries = vec![
            TagEntry::long(Tag::ImageWidth, 3),
            TagEntry::long(Tag::ImageLength, 3),
            TagEntry::short(Tag::PhotometricInterpretation, 2),
            TagEntry::short(Tag::SamplesPerPixel, 3),
            TagEntry::shorts(Tag::BitsPerSample, &[8, 8, 8]),
            TagEntry::short(Tag::PlanarConfiguration, 2),
            TagEntry::long(Tag::TileWidth, 2),
            TagEntry::long(Tag::TileLength, 2),
            TagEntry::longs(Tag::TileOffsets, &offsets),
            TagEntry::longs(Tag::TileByteCounts, &[4; 12]),
        ];
        let frame = decode(entries, stream).unwrap();
        let expected = (0..3)
            .flat_map(|y| (0..3).flat_map(move |x| (0..3).map(move |c| value(c, x, y))))
            .collect();
        assert_eq!(frame.data(), &PixelData::U8(expected));
    }

    /// A baseline JPEG of one 8x8 block per component: luma 144, neutral chroma.
    ///
    /// Returns the shared tables stream (SOI, DQT, DHT, EOI) and the abbreviated image stream
    /// (SOI, SOF0, SOS, scan, EOI).
    fn baseline_jpeg(components: u8) -> (Vec<u8>, Vec<u8>) {
        let mut tables = vec![0xFF, 0xD8];
        // every quantizer is 1
        tables.extend([0xFF, 0xDB, 0x00, 0x43, 0x00]);
        tables.extend([1; 64]);
        // DC: "00" is category 0, "01" is category 8; AC: "0" is end of block
        tables.extend([0xFF, 0xC4, 0x00, 0x27, 0x00, 0, 2]);
        tables.extend([0; 14]);
        tables.extend([0, 8, 0x10, 1]);
        tables.extend([0; 15]);
        tables.extend([0x00, 0xFF, 0xD9]);

        let mut image = vec![0xFF, 0xD8, 0xFF, 0xC0, 0x00, 8 + 3 * components, 8, 0, 8, 0, 8];
        image.push(components);
        for id in 1..=components {
            image.extend([id, 0x11, 0]);
        }
        image.extend([0xFF, 0xDA, 0x00, 6 + 2 * components, components]);
        for id in 1..=components {
            image.extend([id, 0x00]);
        }
        image.extend([0, 63, 0]);
        // luma: DC diff 128 (8 * 16) then EOB; chroma: DC diff 0 then EOB; padded with ones
        match components {
            1 => image.extend([0b0110_0000, 0b0001_1111]),
            _ => image.extend([0b0110_0000, 0b0000_0000, 0b0111_1111]),
        }
        image.extend([0xFF, 0xD9]);
        (tables, image)
    }

    /// `tables` and `image` joined into one self-contained stream.
    fn interchange_jpeg(tables: &[u8], image: &[u8]) -> Vec<u8> {
        [&tables[..tables.len() - 2], &image[2..]].concat()
    }

    fn jpeg_entries(photometric: u16, samples: u16, strip: usize) -> Vec<TagEntry> {
        vec![
            TagEntry::long(Tag::ImageWidth, 8),
            TagEntry::long(Tag::ImageLength, 8),
            TagEntry::short(Tag::Compression, 7),
            TagEntry::short(Tag::PhotometricInterpretation, photometric),
            TagEntry::short(Tag::SamplesPerPixel, samples),
            TagEntry::shorts(Tag::BitsPerSample, &vec![8; samples as usize]),
            TagEntry::longs(Tag::StripOffsets, &[0]),
            TagEntry::longs(Tag::StripByteCounts, &[strip as u32]),
        ]
    }

    fn assert_all_near(frame: &FrameBuffer, len: usize, expected: u8) {
        let PixelData::U8(samples) = frame.data() else {
            panic!("expected 8 bit samples");
        };
        assert_eq!(samples.len(), len);
        assert!(
            samples.iter().all(|s| s.abs_diff(expected) <= 1),
            "{samples:?}"
        );
    }

    #[test]
    fn decodes_jpeg_strips() {
        let (tables, image) = baseline_jpeg(1);
        let stream = interchange_jpeg(&tables, &image);
        let frame = decode(jpeg_entries(1, 1, stream.len()), stream).unwrap();
        assert_all_near(&frame, 64, 144);
    }

    #[test]
    fn splices_shared_jpeg_tables() {
        let (tables, image) = baseline_jpeg(1);
        let mut entries = jpeg_entries(1, 1, image.len());
        entries.push(TagEntry::bytes(Tag::JPEGTables, Type::UNDEFINED, &tables));
        let frame = decode(entries, image.clone()).unwrap();
        assert_all_near(&frame, 64, 144);

        // without the tables the abbreviated stream has no quantization table
        assert!(decode(jpeg_entries(1, 1, image.len()), image).is_err());
    }

    #[test]
    fn jpeg_ycbcr_is_converted_to_rgb() {
        let (tables, image) = baseline_jpeg(3);
        let mut entries = jpeg_entries(6, 3, image.len());
        entries.push(TagEntry::bytes(Tag::JPEGTables, Type::UNDEFINED, &tables));
        let frame = decode(entries, image).unwrap();
        assert_eq!(frame.pixel_format().channels, crate::frame::Channels::Rgb);
        assert_all_near(&frame, 192, 144);
    }

    #[test]
    fn reverses_fill_order_and_predictor() {
        let mut entries = gray(8, 1);
        entries[3] = TagEntry::shorts(Tag::BitsPerSample, &[1]);
        entries.extend([
            TagEntry::short(Tag::FillOrder, 2),
            TagEntry::longs(Tag::StripOffsets, &[0]),
            TagEntry::longs(Tag::StripByteCounts, &[1]),
        ]);
        let frame = decode(entries, vec![0b0000_0001]).unwrap();
        assert_eq!(
            frame.data(),
            &PixelData::U8(vec![255, 0, 0, 0, 0, 0, 0, 0])
        );

        let mut entries = gray(4, 1);
        entries.extend([
            TagEntry::short(Tag::Predictor, 2),
            TagEntry::longs(Tag::StripOffsets, &[0]),
            TagEntry::longs(Tag::StripByteCounts, &[4]),
        ]);
        let frame = decode(entries, vec![10, 1, 1, 1]).unwrap();
        assert_eq!(frame.data(), &PixelData::U8(vec![10, 11, 12, 13]));
    }

    #[test]
    fn rejects_short_chunk_tables() {
        let mut entries = gray(4, 4);
        entries.extend([
            TagEntry::long(Tag::TileWidth, 2),
            TagEntry::long(Tag::TileLength, 2),
            TagEntry::longs(Tag::TileOffsets, &[0, 4]),
            TagEntry::longs(Tag::TileByteCounts, &[4, 4]),
        ]);
        assert!(decode(entries, vec![0; 8]).unwrap_err().is_format_error());

        let mut entries = gray(4, 4);
        entries.extend([
            TagEntry::longs(Tag::StripOffsets, &[0, 4]),
            TagEntry::longs(Tag::StripByteCounts, &[4]),
        ]);
        assert!(decode(entries, vec![0; 8]).unwrap_err().is_format_error());
    }

    #[test]
    fn stops_when_cancelled() {
        let mut entries = gray(2, 2);
        entries.extend([
            TagEntry::longs(Tag::StripOffsets, &[0]),
            TagEntry::longs(Tag::StripByteCounts, &[4]),
        ]);
        let ifd = ImageFileDirectory::from_entries(entries).unwrap();
        let params = DecodeParameters::from_directory(&ifd, Endianness::LittleEndian).unwrap();
        assert_eq!(params.color_type, ColorType::BlackIsZero8);
        let codec = color_codec(params.color_type, &params.codec_context()).unwrap();
        let mut frame = FrameBuffer::new(2, 2, codec.pixel_format()).unwrap();
        let registry = CompressionRegistry::default();
        let token = CancellationToken::new();
        token.cancel();
        let result = LayoutEngine::new(&registry, &token).decode(
            &mut Cursor::new(vec![0; 4]),
            &params,
            codec.as_ref(),
            &mut frame,
        );
        assert!(matches!(result, Err(crate::error::TiffCodecError::Cancelled)));
    }
}
