//! Compression ports: the byte-level transcoders behind each [`CompressionType`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::io::{Cursor, Read, Write};

use bytes::Bytes;
use flate2::bufread::ZlibDecoder;
use flate2::write::ZlibEncoder;
use tracing::trace;

use crate::error::{TiffCodecError, TiffCodecResult};
use crate::options::CompressionType;
use crate::tiff::tags::PhotometricInterpretation;
use crate::tiff::{TiffError, TiffFormatError, TiffUnsupportedError};

/// A registry of compression ports.
///
/// This allows end users to register their own ports, for compression methods without a default
/// implementation (CCITT, WebP, old-style JPEG), or override the default implementations.
#[derive(Debug)]
pub struct CompressionRegistry(HashMap<CompressionType, Box<dyn CompressionPort>>);

impl CompressionRegistry {
    /// Create a new registry with no ports registered
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// The port registered for `compression`.
    pub fn port(&self, compression: CompressionType) -> TiffCodecResult<&dyn CompressionPort> {
        self.0
            .get(&compression)
            .map(|port| port.as_ref())
            .ok_or_else(|| {
                TiffUnsupportedError::UnsupportedCompressionMethod(compression.method()).into()
            })
    }
}

impl AsRef<HashMap<CompressionType, Box<dyn CompressionPort>>> for CompressionRegistry {
    fn as_ref(&self) -> &HashMap<CompressionType, Box<dyn CompressionPort>> {
        &self.0
    }
}

impl AsMut<HashMap<CompressionType, Box<dyn CompressionPort>>> for CompressionRegistry {
    fn as_mut(&mut self) -> &mut HashMap<CompressionType, Box<dyn CompressionPort>> {
        &mut self.0
    }
}

impl Default for CompressionRegistry {
    fn default() -> Self {
        let mut registry = HashMap::with_capacity(5);
        registry.insert(CompressionType::None, Box::new(Uncompressed) as _);
        registry.insert(CompressionType::PackBits, Box::new(PackBits) as _);
        registry.insert(CompressionType::Deflate, Box::new(Deflate) as _);
        registry.insert(CompressionType::Lzw, Box::new(Lzw) as _);
        registry.insert(CompressionType::Jpeg, Box::new(Jpeg) as _);
        Self(registry)
    }
}

/// A trait to transcode one strip or tile.
pub trait CompressionPort: Debug + Send + Sync {
    /// Decompress `compressed` into `output`.
    ///
    /// Streams that end early leave the rest of `output` untouched.
    fn decompress(
        &self,
        compressed: Bytes,
        output: &mut [u8],
        photometric_interpretation: PhotometricInterpretation,
        jpeg_tables: Option<&[u8]>,
    ) -> TiffCodecResult<()>;

    /// Compress one packed strip.
    fn compress(&self, _data: &[u8]) -> TiffCodecResult<Vec<u8>> {
        Err(TiffError::UnsupportedError(TiffUnsupportedError::EncodingWithoutCodec).into())
    }
}

/// Uncompressed data.
#[derive(Debug, Clone)]
pub struct Uncompressed;

impl CompressionPort for Uncompressed {
    fn decompress(
        &self,
        compressed: Bytes,
        output: &mut [u8],
        _photometric_interpretation: PhotometricInterpretation,
        _jpeg_tables: Option<&[u8]>,
    ) -> TiffCodecResult<()> {
        let len = compressed.len().min(output.len());
        output[..len].copy_from_slice(&compressed[..len]);
        Ok(())
    }

    fn compress(&self, data: &[u8]) -> TiffCodecResult<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Macintosh PackBits run-length encoding.
#[derive(Debug, Clone)]
pub struct PackBits;

impl CompressionPort for PackBits {
    fn decompress(
        &self,
        compressed: Bytes,
        output: &mut [u8],
        _photometric_interpretation: PhotometricInterpretation,
        _jpeg_tables: Option<&[u8]>,
    ) -> TiffCodecResult<()> {
        let truncated = || TiffFormatError::Format("PackBits: unexpected end of data".into());
        let mut i = 0;
        let mut filled = 0;
        while i < compressed.len() && filled < output.len() {
            let header = compressed[i] as i8;
            i += 1;
            if header >= 0 {
                let count = header as usize + 1;
                let literal = compressed.get(i..i + count).ok_or_else(truncated)?;
                let n = count.min(output.len() - filled);
                output[filled..filled + n].copy_from_slice(&literal[..n]);
                filled += n;
                i += count;
            } else if header != -128 {
                let count = (1 - isize::from(header)) as usize;
                let value = *compressed.get(i).ok_or_else(truncated)?;
                i += 1;
                let n = count.min(output.len() - filled);
                output[filled..filled + n].fill(value);
                filled += n;
            }
            // -128 is a no-op
        }
        Ok(())
    }

    fn compress(&self, data: &[u8]) -> TiffCodecResult<Vec<u8>> {
        let mut output = Vec::with_capacity(data.len() + data.len() / 128 + 1);
        let mut i = 0;
        while i < data.len() {
            let mut run = 1;
            while i + run < data.len() && run < 128 && data[i + run] == data[i] {
                run += 1;
            }
            if run > 1 {
                output.push((257 - run) as u8);
                output.push(data[i]);
                i += run;
                continue;
            }
            let start = i;
            i += 1;
            while i < data.len() && i - start < 128 {
                if i + 1 < data.len() && data[i] == data[i + 1] {
                    break;
                }
                i += 1;
            }
            output.push((i - start - 1) as u8);
            output.extend_from_slice(&data[start..i]);
        }
        Ok(output)
    }
}

/// zlib ("Adobe Deflate"), under both its registered and its older private code.
#[derive(Debug, Clone)]
pub struct Deflate;

impl CompressionPort for Deflate {
    fn decompress(
        &self,
        compressed: Bytes,
        output: &mut [u8],
        _photometric_interpretation: PhotometricInterpretation,
        _jpeg_tables: Option<&[u8]>,
    ) -> TiffCodecResult<()> {
        let mut decoder = ZlibDecoder::new(Cursor::new(compressed));
        let mut filled = 0;
        while filled < output.len() {
            match decoder.read(&mut output[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        if filled < output.len() {
            trace!(filled, expected = output.len(), "short deflate stream");
        }
        Ok(())
    }

    fn compress(&self, data: &[u8]) -> TiffCodecResult<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }
}

/// LZW with MSB-first codes and the TIFF early code size switch.
#[derive(Debug, Clone)]
pub struct Lzw;

impl CompressionPort for Lzw {
    fn decompress(
        &self,
        compressed: Bytes,
        output: &mut [u8],
        _photometric_interpretation: PhotometricInterpretation,
        _jpeg_tables: Option<&[u8]>,
    ) -> TiffCodecResult<()> {
        // https://github.com/image-rs/image-tiff/blob/90ae5b8e54356a35e266fb24e969aafbcb26e990/src/decoder/stream.rs#L147
        let mut decoder = weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
        let mut input = &compressed[..];
        let mut filled = 0;
        // decode_bytes may stop after any amount of input or output
        while filled < output.len() {
            let result = decoder.decode_bytes(input, &mut output[filled..]);
            input = &input[result.consumed_in..];
            filled += result.consumed_out;
            let progressed = result.consumed_in > 0 || result.consumed_out > 0;
            match result.status? {
                weezl::LzwStatus::Done => break,
                weezl::LzwStatus::Ok if progressed => {}
                _ if input.is_empty() => break,
                _ => {
                    return Err(TiffCodecError::General(
                        "Internal LZW decoder reported no progress".into(),
                    ))
                }
            }
        }
        if filled < output.len() {
            trace!(filled, expected = output.len(), "short lzw stream");
        }
        Ok(())
    }

    fn compress(&self, data: &[u8]) -> TiffCodecResult<Vec<u8>> {
        let mut encoder = weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
        Ok(encoder.encode(data)?)
    }
}

/// TIFF 6.0 JPEG (TechNote 2), decode only.
#[derive(Debug, Clone)]
pub struct Jpeg;

impl CompressionPort for Jpeg {
    fn decompress(
        &self,
        compressed: Bytes,
        output: &mut [u8],
        photometric_interpretation: PhotometricInterpretation,
        jpeg_tables: Option<&[u8]>,
    ) -> TiffCodecResult<()> {
        decode_modern_jpeg(compressed, output, photometric_interpretation, jpeg_tables)
    }
}

// https://github.com/image-rs/image-tiff/blob/3bfb43e83e31b0da476832067ada68a82b378b7b/src/decoder/image.rs#L389-L450
fn decode_modern_jpeg(
    compressed: Bytes,
    output: &mut [u8],
    photometric_interpretation: PhotometricInterpretation,
    jpeg_tables: Option<&[u8]>,
) -> TiffCodecResult<()> {
    // Shared JPEGTables are a complete stream of their own: SOI, tables, EOI. Splice them in
    // front of the chunk by dropping their trailing EOI and the chunk's leading SOI.
    let reader = Cursor::new(compressed);

    let jpeg_reader = match jpeg_tables {
        Some(jpeg_tables) if jpeg_tables.len() >= 2 => {
            let mut reader = reader;
            reader.read_exact(&mut [0; 2])?;

            Box::new(Cursor::new(&jpeg_tables[..jpeg_tables.len() - 2]).chain(reader))
                as Box<dyn Read + '_>
        }
        _ => Box::new(reader),
    };

    let mut decoder = jpeg::Decoder::new(jpeg_reader);

    match photometric_interpretation {
        PhotometricInterpretation::RGB => decoder.set_color_transform(jpeg::ColorTransform::RGB),
        PhotometricInterpretation::WhiteIsZero
        | PhotometricInterpretation::BlackIsZero
        | PhotometricInterpretation::TransparencyMask => {
            decoder.set_color_transform(jpeg::ColorTransform::None)
        }
        PhotometricInterpretation::CMYK => decoder.set_color_transform(jpeg::ColorTransform::CMYK),
        PhotometricInterpretation::YCbCr => {
            decoder.set_color_transform(jpeg::ColorTransform::YCbCr)
        }
        photometric_interpretation => {
            return Err(TiffUnsupportedError::UnsupportedInterpretation(
                photometric_interpretation,
            )
            .into());
        }
    }

    let data = decoder.decode().map_err(TiffError::from)?;
    // jpeg decoder doesn't support decoding into a buffer -> copy
    let len = data.len().min(output.len());
    output[..len].copy_from_slice(&data[..len]);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    const GRAY: PhotometricInterpretation = PhotometricInterpretation::BlackIsZero;

    fn round_trip(compression: CompressionType, data: &[u8]) -> Vec<u8> {
        let registry = CompressionRegistry::default();
        let port = registry.port(compression).unwrap();
        let compressed = port.compress(data).unwrap();
        let mut output = vec![0; data.len()];
        port.decompress(compressed.into(), &mut output, GRAY, None)
            .unwrap();
        output
    }

    #[test]
    fn decodes_packbits_example() {
        // The example stream from the TIFF 6.0 specification, section 9.
        let compressed = Bytes::from_static(&[
            0xFE, 0xAA, 0x02, 0x80, 0x00, 0x2A, 0xFD, 0xAA, 0x03, 0x80, 0x00, 0x2A, 0x22, 0xF7,
            0xAA,
        ]);
        let expected = [
            0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0xAA, 0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0x22,
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
        ];
        let mut output = vec![0; expected.len()];
        PackBits
            .decompress(compressed, &mut output, GRAY, None)
            .unwrap();
        assert_eq!(output, expected);
    }

    #[test]
    fn packbits_long_runs() {
        let mut data = vec![7u8; 300];
        data.extend(0..=255u8);
        assert_eq!(round_trip(CompressionType::PackBits, &data), data);
        let compressed = PackBits.compress(&[9; 128]).unwrap();
        assert_eq!(compressed, vec![0x81, 9]);
    }

    #[test]
    fn truncated_packbits_is_an_error() {
        let mut output = vec![0; 4];
        let result = PackBits.decompress(Bytes::from_static(&[0x03, 1, 2]), &mut output, GRAY, None);
        assert!(result.unwrap_err().is_format_error());
    }

    #[test]
    fn deflate_and_lzw_round_trip() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 251) as u8).collect();
        assert_eq!(round_trip(CompressionType::Deflate, &data), data);
        assert_eq!(round_trip(CompressionType::Lzw, &data), data);
    }

    #[test]
    fn lzw_fills_large_strips() {
        let data: Vec<u8> = (0..20_000u32).map(|i| ((i * i) >> 3) as u8).collect();
        let compressed = Lzw.compress(&data).unwrap();
        let mut output = vec![0; data.len()];
        Lzw.decompress(Bytes::from(compressed.clone()), &mut output, GRAY, None)
            .unwrap();
        assert_eq!(output, data);

        // a stream shorter than the strip leaves the tail alone
        let mut output = vec![0xAA; data.len() + 16];
        Lzw.decompress(Bytes::from(compressed), &mut output, GRAY, None)
            .unwrap();
        assert_eq!(&output[..data.len()], &data[..]);
        assert_eq!(&output[data.len()..], &[0xAA; 16]);
    }

    #[test]
    fn missing_ports_are_unsupported() {
        let registry = CompressionRegistry::default();
        let err = registry.port(CompressionType::T6).unwrap_err();
        assert!(err.is_unsupported());
        let err = registry
            .port(CompressionType::Jpeg)
            .unwrap()
            .compress(&[0])
            .unwrap_err();
        assert!(err.is_unsupported());
    }
}
