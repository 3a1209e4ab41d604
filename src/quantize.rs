//! Palette generation for PaletteColor encoding.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::frame::FrameBuffer;

/// An indexed set of 8-bit RGB colors.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
    lookup: HashMap<[u8; 3], u8>,
}

impl Palette {
    /// Create a palette. Only the first 256 colors are kept.
    pub fn new(mut colors: Vec<[u8; 3]>) -> Self {
        colors.truncate(256);
        let lookup = colors
            .iter()
            .enumerate()
            .rev()
            .map(|(i, color)| (*color, i as u8))
            .collect();
        Self { colors, lookup }
    }

    /// The colors, in index order.
    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    /// The index of `color`, or of the nearest palette color by squared distance.
    pub fn index_of(&self, color: [u8; 3]) -> u8 {
        if let Some(index) = self.lookup.get(&color) {
            return *index;
        }
        let distance = |candidate: &[u8; 3]| -> u32 {
            candidate
                .iter()
                .zip(color)
                .map(|(a, b)| (i32::from(*a) - i32::from(b)).unsigned_abs().pow(2))
                .sum()
        };
        self.colors
            .iter()
            .enumerate()
            .min_by_key(|(_, candidate)| distance(candidate))
            .map(|(i, _)| i as u8)
            .unwrap_or(0)
    }

    /// ColorMap tag values for indices of `bits` bits: `2^bits` reds, then greens, then blues,
    /// scaled to 16 bits. Unused entries are black.
    pub fn color_map(&self, bits: u16) -> Vec<u16> {
        let entries = 1usize << bits;
        let mut map = vec![0u16; 3 * entries];
        for (i, color) in self.colors.iter().take(entries).enumerate() {
            for (c, value) in color.iter().enumerate() {
                map[c * entries + i] = u16::from(*value) * 257;
            }
        }
        map
    }
}

/// Builds the palette a PaletteColor frame is encoded with.
pub trait Quantizer: Debug + Send + Sync {
    /// Choose at most `max_colors` colors for `frame`.
    fn build_palette(&self, frame: &FrameBuffer, max_colors: usize) -> Palette;
}

/// Popularity quantizer: keeps the most frequent colors, ties broken by color value.
///
/// Frames with no more distinct colors than fit are reproduced exactly.
#[derive(Debug, Clone, Default)]
pub struct PopularityQuantizer;

impl Quantizer for PopularityQuantizer {
    fn build_palette(&self, frame: &FrameBuffer, max_colors: usize) -> Palette {
        let mut histogram: HashMap<[u8; 3], u32> = HashMap::new();
        for y in 0..frame.height() {
            for x in 0..frame.width() {
                let [r, g, b, _] = frame.rgba16(x, y);
                *histogram
                    .entry([(r >> 8) as u8, (g >> 8) as u8, (b >> 8) as u8])
                    .or_default() += 1;
            }
        }
        let mut colors: Vec<([u8; 3], u32)> = histogram.into_iter().collect();
        colors.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Palette::new(
            colors
                .into_iter()
                .take(max_colors.min(256))
                .map(|(color, _)| color)
                .collect(),
        )
    }
}
