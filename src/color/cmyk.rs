use crate::color::samples::{check_len, row_bytes};
use crate::color::ColorCodec;
use crate::error::TiffCodecResult;
use crate::frame::{Channels, FrameBuffer, PixelData, PixelFormat, SampleDepth};
use crate::tiff::TiffFormatError;

/// Write the 8-bit RGB triples produced by `pixel(col, row)` into a rectangle of `frame`.
fn fill_rgb8(
    frame: &mut FrameBuffer,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    mut pixel: impl FnMut(usize, usize) -> [u8; 3],
) -> TiffCodecResult<()> {
    for row in 0..height {
        let start = frame.sample_index(x, y + row);
        let PixelData::U8(pixels) = frame.data_mut() else {
            return Err(TiffFormatError::InconsistentSizesEncountered.into());
        };
        for col in 0..width as usize {
            let at = start + col * 3;
            pixels[at..at + 3].copy_from_slice(&pixel(col, row as usize));
        }
    }
    Ok(())
}

/// 8-bit inked CMYK, decoded to 8-bit RGB.
#[derive(Debug, Clone)]
pub struct CmykCodec;

impl ColorCodec for CmykCodec {
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
        let stride = row_bytes(width, 4, 8);
        check_len(data, stride, height)?;
        fill_rgb8(frame, x, y, width, height, |col, row| {
            let at = row * stride + col * 4;
            let k = 255 - u32::from(data[at + 3]);
            [0, 1, 2].map(|c| ((255 - u32::from(data[at + c])) * k / 255) as u8)
        })
    }
}

/// 8-bit CIE L*a*b*, chunky or planar, decoded to 8-bit sRGB under a D65 white point.
#[derive(Debug, Clone)]
pub struct CieLabCodec;

fn lab_to_rgb(l: u8, a: u8, b: u8) -> [u8; 3] {
    const EPSILON: f32 = 0.008856;
    const KAPPA: f32 = 903.3;

    let l = f32::from(l) * 100.0 / 255.0;
    let (a, b) = (f32::from(a as i8), f32::from(b as i8));
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;
    let f_inv = |f: f32| {
        let cube = f * f * f;
        if cube > EPSILON {
            cube
        } else {
            (116.0 * f - 16.0) / KAPPA
        }
    };
    let yr = if l > KAPPA * EPSILON { fy * fy * fy } else { l / KAPPA };
    let (x, y, z) = (f_inv(fx) * 0.95047, yr, f_inv(fz) * 1.08883);

    let linear = [
        3.240_454_2 * x - 1.537_138_5 * y - 0.498_531_4 * z,
        -0.969_266 * x + 1.876_010_8 * y + 0.041_556 * z,
        0.055_643_4 * x - 0.204_025_9 * y + 1.057_225_2 * z,
    ];
    linear.map(|c| {
        let c = c.clamp(0.0, 1.0);
        let srgb = if c <= 0.003_130_8 {
            12.92 * c
        } else {
            1.055 * c.powf(1.0 / 2.4) - 0.055
        };
        (srgb * 255.0).round() as u8
    })
}

impl ColorCodec for CieLabCodec {
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
        let stride = row_bytes(width, 3, 8);
        check_len(data, stride, height)?;
        fill_rgb8(frame, x, y, width, height, |col, row| {
            let at = row * stride + col * 3;
            lab_to_rgb(data[at], data[at + 1], data[at + 2])
        })
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
        let [l, a, b] = planes else {
            return Err(TiffFormatError::InconsistentSizesEncountered.into());
        };
        for plane in [l, a, b] {
            check_len(plane, width as usize, height)?;
        }
        fill_rgb8(frame, x, y, width, height, |col, row| {
            let i = row * width as usize + col;
            lab_to_rgb(l[i], a[i], b[i])
        })
    }
}
