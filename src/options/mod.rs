//! Resolution of directory tags and encoder requests into validated codec parameters.

mod decode;
mod encode;

pub use decode::{ChunkLayout, DecodeParameters};
pub use encode::{BitsPerPixel, EncodeParameters, EncodeRequest};

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::tiff::tags::CompressionMethod;
use crate::tiff::{TiffResult, TiffUnsupportedError};

/// Per-channel bit widths of up to four channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BitsPerSample {
    bits: [u16; 4],
    channels: usize,
}

impl BitsPerSample {
    /// Widths of the first (up to four) channels in `bits`.
    pub fn new(bits: &[u16]) -> Self {
        let channels = bits.len().min(4);
        let mut widths = [0; 4];
        widths[..channels].copy_from_slice(&bits[..channels]);
        Self {
            bits: widths,
            channels,
        }
    }

    /// `channels` channels of `bits` bits each.
    pub fn uniform(bits: u16, channels: usize) -> Self {
        Self::new(&vec![bits; channels.min(4)])
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Width of channel `index`, or 0 past the last channel.
    pub fn channel(&self, index: usize) -> u16 {
        self.bits.get(index).copied().unwrap_or(0)
    }

    /// The widths of all channels.
    pub fn as_slice(&self) -> &[u16] {
        &self.bits[..self.channels]
    }

    /// Sum of all channel widths.
    pub fn bits_per_pixel(&self) -> u16 {
        self.as_slice().iter().sum()
    }

    /// Whether all channels share one width.
    pub fn is_uniform(&self) -> bool {
        self.as_slice().windows(2).all(|w| w[0] == w[1])
    }
}

/// The meaning of a single extra sample.
///
/// See [ExtraSamples](https://web.archive.org/web/20240329145253/https://www.awaresystems.be/imaging/tiff/tifftags/extrasamples.html).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum ExtraSampleType {
    /// Unspecified data
    Unspecified = 0,
    /// Premultiplied alpha
    AssociatedAlphaData = 1,
    /// Straight alpha
    UnassociatedAlphaData = 2,
}

/// Compression schemes, with the aliases of [`CompressionMethod`] folded together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionType {
    /// No compression
    None,
    /// Macintosh RLE
    PackBits,
    /// zlib, both the registered (8) and the older private (32946) code
    Deflate,
    /// LZW with the TIFF early code size switch
    Lzw,
    /// CCITT Group 3 fax
    T4,
    /// CCITT Group 4 fax
    T6,
    /// CCITT modified Huffman RLE (Group 3 one-dimensional)
    HuffmanRle,
    /// Pre-TIFF 6.0 JPEG
    OldJpeg,
    /// TIFF 6.0 (TechNote 2) JPEG
    Jpeg,
    /// WebP
    Webp,
}

impl CompressionType {
    /// The code written to the Compression tag.
    pub fn method(&self) -> CompressionMethod {
        match self {
            CompressionType::None => CompressionMethod::None,
            CompressionType::PackBits => CompressionMethod::PackBits,
            CompressionType::Deflate => CompressionMethod::Deflate,
            CompressionType::Lzw => CompressionMethod::LZW,
            CompressionType::T4 => CompressionMethod::Fax3,
            CompressionType::T6 => CompressionMethod::Fax4,
            CompressionType::HuffmanRle => CompressionMethod::Huffman,
            CompressionType::OldJpeg => CompressionMethod::JPEG,
            CompressionType::Jpeg => CompressionMethod::ModernJPEG,
            CompressionType::Webp => CompressionMethod::WebP,
        }
    }

    /// Whether this scheme only encodes bilevel (1 bit per pixel) data.
    pub fn is_bilevel(&self) -> bool {
        matches!(
            self,
            CompressionType::T4 | CompressionType::T6 | CompressionType::HuffmanRle
        )
    }

    /// Whether the compressed stream is JPEG, which carries its own color conversion.
    pub fn is_jpeg(&self) -> bool {
        matches!(self, CompressionType::OldJpeg | CompressionType::Jpeg)
    }
}

impl TryFrom<CompressionMethod> for CompressionType {
    type Error = crate::tiff::TiffError;

    fn try_from(method: CompressionMethod) -> TiffResult<Self> {
        Ok(match method {
            CompressionMethod::None => CompressionType::None,
            CompressionMethod::Huffman => CompressionType::HuffmanRle,
            CompressionMethod::Fax3 => CompressionType::T4,
            CompressionMethod::Fax4 => CompressionType::T6,
            CompressionMethod::LZW => CompressionType::Lzw,
            CompressionMethod::JPEG => CompressionType::OldJpeg,
            CompressionMethod::ModernJPEG => CompressionType::Jpeg,
            CompressionMethod::Deflate | CompressionMethod::OldDeflate => CompressionType::Deflate,
            CompressionMethod::PackBits => CompressionType::PackBits,
            CompressionMethod::WebP => CompressionType::Webp,
            method => {
                return Err(TiffUnsupportedError::UnsupportedCompressionMethod(method).into())
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn folds_compression_aliases() {
        #[rustfmt::skip]
        let cases = [
            (CompressionMethod::Deflate,    CompressionType::Deflate),
            (CompressionMethod::OldDeflate, CompressionType::Deflate),
            (CompressionMethod::Fax4,       CompressionType::T6),
            (CompressionMethod::JPEG,       CompressionType::OldJpeg),
        ];
        for (method, expected) in cases {
            assert_eq!(CompressionType::try_from(method).unwrap(), expected);
        }
        assert!(CompressionType::try_from(CompressionMethod::Unknown(34712)).is_err());
        assert_eq!(CompressionType::Lzw.method().to_u16(), 5);
    }

    #[test]
    fn bits_per_sample_shape() {
        let bits = BitsPerSample::new(&[8, 8, 8]);
        assert_eq!(bits.channels(), 3);
        assert_eq!(bits.bits_per_pixel(), 24);
        assert!(bits.is_uniform());
        assert_eq!(bits.channel(3), 0);
        assert!(!BitsPerSample::new(&[5, 6, 5]).is_uniform());
        assert_eq!(ExtraSampleType::try_from_primitive(2).unwrap(), ExtraSampleType::UnassociatedAlphaData);
    }
}
