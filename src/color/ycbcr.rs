use crate::color::samples::check_len;
use crate::color::ColorCodec;
use crate::error::TiffCodecResult;
use crate::frame::{Channels, FrameBuffer, PixelData, PixelFormat, SampleDepth};
use crate::tiff::{TiffFormatError, TiffUnsupportedError};

/// Parameters of the YCbCr to RGB conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YCbCrInfo {
    /// Luma coefficients of red, green and blue
    pub coefficients: [f32; 3],
    /// Horizontal and vertical chroma subsampling
    pub subsampling: (u16, u16),
    /// Footroom and headroom of Y, Cb and Cr
    pub reference_black_white: [f32; 6],
}

impl Default for YCbCrInfo {
    fn default() -> Self {
        Self {
            coefficients: [0.299, 0.587, 0.114],
            subsampling: (2, 2),
            reference_black_white: [0.0, 255.0, 128.0, 255.0, 128.0, 255.0],
        }
    }
}

impl YCbCrInfo {
    /// Bytes of a chunky strip of `width` x `rows` 8-bit pixels.
    ///
    /// Every block of `h * v` luma samples is followed by one Cb and one Cr sample.
    pub(crate) fn chunky_bytes(&self, width: u32, rows: u32) -> usize {
        let (h, v) = (self.subsampling.0 as usize, self.subsampling.1 as usize);
        (width as usize).div_ceil(h) * (rows as usize).div_ceil(v) * (h * v + 2)
    }

    fn to_rgb(&self, y: u8, cb: u8, cr: u8) -> [u8; 3] {
        let [lr, lg, lb] = self.coefficients;
        let rbw = &self.reference_black_white;
        let y = (f32::from(y) - rbw[0]) * 255.0 / (rbw[1] - rbw[0]);
        let cb = (f32::from(cb) - rbw[2]) * 127.0 / (rbw[3] - rbw[2]);
        let cr = (f32::from(cr) - rbw[4]) * 127.0 / (rbw[5] - rbw[4]);
        let r = y + cr * (2.0 - 2.0 * lr);
        let b = y + cb * (2.0 - 2.0 * lb);
        let g = (y - lb * b - lr * r) / lg;
        [r, g, b].map(|c| c.round().clamp(0.0, 255.0) as u8)
    }
}

/// 8-bit YCbCr, chunky with any subsampling or planar without, decoded to 8-bit RGB.
#[derive(Debug, Clone)]
pub struct YCbCrCodec {
    info: YCbCrInfo,
}

impl YCbCrCodec {
    /// Create a codec with the given conversion parameters.
    pub fn new(info: YCbCrInfo) -> Self {
        Self { info }
    }
}

impl ColorCodec for YCbCrCodec {
    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::new(Channels::Rgb, SampleDepth::U8)
    }

    fn decode(
        &self,
        data: &[u8],
        frame: &mut FrameBuffer,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> TiffCodecResult<()> {
        let (h, v) = (
            u32::from(self.info.subsampling.0),
            u32::from(self.info.subsampling.1),
        );
        let block = (h * v + 2) as usize;
        let across = width.div_ceil(h);
        let required = self.info.chunky_bytes(width, height);
        check_len(data, required, 1)?;

        for by in 0..height.div_ceil(v) {
            for bx in 0..across {
                let base = (by * across + bx) as usize * block;
                let samples = &data[base..base + block];
                let (cb, cr) = (samples[block - 2], samples[block - 1]);
                for j in 0..v {
                    for i in 0..h {
                        let (px, py) = (bx * h + i, by * v + j);
                        if px >= width || py >= height {
                            continue;
                        }
                        let rgb = self.info.to_rgb(samples[(j * h + i) as usize], cb, cr);
                        let index = frame.sample_index(x + px, y + py);
                        let PixelData::U8(pixels) = frame.data_mut() else {
                            return Err(TiffFormatError::InconsistentSizesEncountered.into());
                        };
                        pixels[index..index + 3].copy_from_slice(&rgb);
                    }
                }
            }
        }
        Ok(())
    }

    fn decode_planar(
        &self,
        planes: &[&[u8]],
        frame: &mut FrameBuffer,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> TiffCodecResult<()> {
        let (h, v) = self.info.subsampling;
        if (h, v) != (1, 1) {
            return Err(TiffUnsupportedError::SubsampledLayout(vec![h, v]).into());
        }
        let [luma, blue, red] = planes else {
            return Err(TiffFormatError::InconsistentSizesEncountered.into());
        };
        for plane in [luma, blue, red] {
            check_len(plane, width as usize, height)?;
        }
        for row in 0..height {
            let start = frame.sample_index(x, y + row);
            let PixelData::U8(pixels) = frame.data_mut() else {
                return Err(TiffFormatError::InconsistentSizesEncountered.into());
            };
            for col in 0..width as usize {
                let i = row as usize * width as usize + col;
                let rgb = self.info.to_rgb(luma[i], blue[i], red[i]);
                pixels[start + col * 3..start + col * 3 + 3].copy_from_slice(&rgb);
            }
        }
        Ok(())
    }
}
