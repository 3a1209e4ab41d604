//! Predictors for no predictor, horizontal and floating-point
//!
//! Buffers handed to these functions hold whole rows of samples in the stream's byte order, and
//! are left in that byte order.

use crate::error::TiffCodecResult;
use crate::reader::Endianness;
use crate::tiff::tags::{Predictor, SampleFormat};
use crate::tiff::{TiffResult, TiffUnsupportedError};

/// The shape of the rows a predictor runs over.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PredictorInfo {
    pub(crate) endianness: Endianness,
    /// Bytes in one row of the chunk, including any tile padding.
    pub(crate) row_bytes: usize,
    /// Samples per pixel within one chunk: all channels when chunky, 1 when planar.
    pub(crate) samples: usize,
    pub(crate) bits_per_sample: u16,
}

/// Check that `predictor` can run on samples of `bits` bits and the given format.
pub(crate) fn check_predictor_support(
    predictor: Predictor,
    bits: u16,
    sample_format: SampleFormat,
) -> TiffResult<()> {
    let supported = match predictor {
        Predictor::None => true,
        Predictor::Horizontal => matches!(bits, 8 | 16 | 32 | 64),
        Predictor::FloatingPoint => {
            sample_format == SampleFormat::IEEEFP && matches!(bits, 32 | 64)
        }
    };
    if supported {
        Ok(())
    } else {
        Err(TiffUnsupportedError::PredictorWithBits(predictor, bits).into())
    }
}

/// Undo `predictor` on every row of `buffer`.
pub(crate) fn rev_predict(
    predictor: Predictor,
    buffer: &mut [u8],
    info: &PredictorInfo,
) -> TiffCodecResult<()> {
    check_predictor_support(
        predictor,
        info.bits_per_sample,
        if predictor == Predictor::FloatingPoint {
            SampleFormat::IEEEFP
        } else {
            SampleFormat::Uint
        },
    )?;
    if info.row_bytes == 0 {
        return Ok(());
    }
    match predictor {
        Predictor::None => {}
        Predictor::Horizontal => {
            for row in buffer.chunks_mut(info.row_bytes) {
                rev_hpredict_nsamp(row, info.bits_per_sample, info.samples, info.endianness);
            }
        }
        Predictor::FloatingPoint => {
            let mut output = vec![0; info.row_bytes];
            for row in buffer.chunks_exact_mut(info.row_bytes) {
                match info.bits_per_sample {
                    32 => rev_predict_f32(row, &mut output, info.samples, info.endianness),
                    _ => rev_predict_f64(row, &mut output, info.samples, info.endianness),
                }
                row.copy_from_slice(&output);
            }
        }
    }
    Ok(())
}

/// Apply `predictor` to every row of `buffer` before compression.
pub(crate) fn predict(
    predictor: Predictor,
    buffer: &mut [u8],
    info: &PredictorInfo,
) -> TiffCodecResult<()> {
    match predictor {
        Predictor::None => Ok(()),
        Predictor::Horizontal => {
            check_predictor_support(predictor, info.bits_per_sample, SampleFormat::Uint)?;
            if info.row_bytes > 0 {
                for row in buffer.chunks_mut(info.row_bytes) {
                    hpredict_nsamp(row, info.bits_per_sample, info.samples, info.endianness);
                }
            }
            Ok(())
        }
        Predictor::FloatingPoint => {
            Err(TiffUnsupportedError::UnsupportedPredictor(predictor).into())
        }
    }
}

/// Reverse horizontal differencing of one row, for sample sizes of 8, 16, 32 or 64 bits.
pub fn rev_hpredict_nsamp(buf: &mut [u8], bit_depth: u16, samples: usize, endianness: Endianness) {
    match bit_depth {
        0..=8 => {
            for i in samples..buf.len() {
                buf[i] = buf[i].wrapping_add(buf[i - samples]);
            }
        }
        9..=16 => {
            for i in (samples * 2..buf.len().saturating_sub(1)).step_by(2) {
                let v = endianness.read_u16(&buf[i..]);
                let p = endianness.read_u16(&buf[i - 2 * samples..]);
                endianness.write_u16(&mut buf[i..], v.wrapping_add(p));
            }
        }
        17..=32 => {
            for i in (samples * 4..buf.len().saturating_sub(3)).step_by(4) {
                let v = endianness.read_u32(&buf[i..]);
                let p = endianness.read_u32(&buf[i - 4 * samples..]);
                endianness.write_u32(&mut buf[i..], v.wrapping_add(p));
            }
        }
        _ => {
            for i in (samples * 8..buf.len().saturating_sub(7)).step_by(8) {
                let v = endianness.read_u64(&buf[i..]);
                let p = endianness.read_u64(&buf[i - 8 * samples..]);
                endianness.write_u64(&mut buf[i..], v.wrapping_add(p));
            }
        }
    }
}

/// Horizontal differencing of one row; the inverse of [`rev_hpredict_nsamp`].
pub fn hpredict_nsamp(buf: &mut [u8], bit_depth: u16, samples: usize, endianness: Endianness) {
    // Walk backwards so every difference is taken against the original left neighbour.
    match bit_depth {
        0..=8 => {
            for i in (samples..buf.len()).rev() {
                buf[i] = buf[i].wrapping_sub(buf[i - samples]);
            }
        }
        9..=16 => {
            for i in (samples * 2..buf.len().saturating_sub(1)).step_by(2).rev() {
                let v = endianness.read_u16(&buf[i..]);
                let p = endianness.read_u16(&buf[i - 2 * samples..]);
                endianness.write_u16(&mut buf[i..], v.wrapping_sub(p));
            }
        }
        17..=32 => {
            for i in (samples * 4..buf.len().saturating_sub(3)).step_by(4).rev() {
                let v = endianness.read_u32(&buf[i..]);
                let p = endianness.read_u32(&buf[i - 4 * samples..]);
                endianness.write_u32(&mut buf[i..], v.wrapping_sub(p));
            }
        }
        _ => {
            for i in (samples * 8..buf.len().saturating_sub(7)).step_by(8).rev() {
                let v = endianness.read_u64(&buf[i..]);
                let p = endianness.read_u64(&buf[i - 8 * samples..]);
                endianness.write_u64(&mut buf[i..], v.wrapping_sub(p));
            }
        }
    }
}

/// Reverse floating point prediction of one row of 32-bit floats.
///
/// Floating point prediction first shuffles the bytes into planes, most significant first, and
/// then uses horizontal differencing. The output is written in `endianness`.
pub fn rev_predict_f32(input: &mut [u8], output: &mut [u8], samples: usize, endianness: Endianness) {
    for i in samples..input.len() {
        input[i] = input[i].wrapping_add(input[i - samples]);
    }
    let plane = input.len() / 4;
    for (i, chunk) in output.chunks_exact_mut(4).enumerate() {
        let value = u32::from_be_bytes([
            input[i],
            input[plane + i],
            input[plane * 2 + i],
            input[plane * 3 + i],
        ]);
        endianness.write_u32(chunk, value);
    }
}

/// Reverse floating point prediction of one row of 64-bit floats.
pub fn rev_predict_f64(input: &mut [u8], output: &mut [u8], samples: usize, endianness: Endianness) {
    for i in samples..input.len() {
        input[i] = input[i].wrapping_add(input[i - samples]);
    }
    let plane = input.len() / 8;
    for (i, chunk) in output.chunks_exact_mut(8).enumerate() {
        let value = u64::from_be_bytes([
            input[i],
            input[plane + i],
            input[plane * 2 + i],
            input[plane * 3 + i],
            input[plane * 4 + i],
            input[plane * 5 + i],
            input[plane * 6 + i],
            input[plane * 7 + i],
        ]);
        endianness.write_u64(chunk, value);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[rustfmt::skip]
    const RES: [u8; 16] = [
        0,1, 2,3,
        1,0, 1,2,

        2,1, 0,1,
        3,2, 1,0,
    ];

    #[rustfmt::skip]
    const DIFFERENCED: [i32; 16] = [
        0, 1, 1, 1,
        1,-1, 1, 1,
        2,-1,-1, 1,
        3,-1,-1,-1,
    ];

    fn info(endianness: Endianness, bits: u16, row_bytes: usize) -> PredictorInfo {
        PredictorInfo { endianness, row_bytes, samples: 1, bits_per_sample: bits }
    }

    #[test]
    fn reverses_horizontal_differencing() {
        let mut buf: Vec<u8> = DIFFERENCED.iter().map(|v| *v as u8).collect();
        rev_predict(Predictor::Horizontal, &mut buf, &info(Endianness::LittleEndian, 8, 4))
            .unwrap();
        assert_eq!(buf, RES);

        for endianness in [Endianness::LittleEndian, Endianness::BigEndian] {
            let mut buf = vec![0u8; 32];
            for (chunk, v) in buf.chunks_exact_mut(2).zip(DIFFERENCED) {
                endianness.write_u16(chunk, v as u16);
            }
            rev_predict(Predictor::Horizontal, &mut buf, &info(endianness, 16, 8)).unwrap();
            let decoded: Vec<u16> = buf.chunks_exact(2).map(|c| endianness.read_u16(c)).collect();
            assert_eq!(decoded, RES.iter().map(|v| *v as u16).collect::<Vec<_>>());

            let mut buf = vec![0u8; 64];
            for (chunk, v) in buf.chunks_exact_mut(4).zip(DIFFERENCED) {
                endianness.write_u32(chunk, v as u32);
            }
            rev_predict(Predictor::Horizontal, &mut buf, &info(endianness, 32, 16)).unwrap();
            let decoded: Vec<u32> = buf.chunks_exact(4).map(|c| endianness.read_u32(c)).collect();
            assert_eq!(decoded, RES.iter().map(|v| *v as u32).collect::<Vec<_>>());
        }
    }

    #[test]
    fn forward_then_reverse_is_identity() {
        let original: Vec<u8> = (0..48u8).map(|v| v.wrapping_mul(37)).collect();
        let mut buf = original.clone();
        let info = PredictorInfo {
            endianness: Endianness::BigEndian,
            row_bytes: 12,
            samples: 3,
            bits_per_sample: 16,
        };
        predict(Predictor::Horizontal, &mut buf, &info).unwrap();
        assert_ne!(buf, original);
        rev_predict(Predictor::Horizontal, &mut buf, &info).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn reverses_floating_point_prediction() {
        let expected: Vec<u8> = [42.0f32, 43.0].iter().flat_map(|f| f.to_le_bytes()).collect();
        let mut buf = vec![0x42u8, 0, 230, 4, 212, 0, 0, 0];
        rev_predict(Predictor::FloatingPoint, &mut buf, &info(Endianness::LittleEndian, 32, 8))
            .unwrap();
        assert_eq!(buf, expected);
    }

    #[test]
    fn rejects_unsupported_bit_depths() {
        assert!(check_predictor_support(Predictor::Horizontal, 4, SampleFormat::Uint).is_err());
        assert!(check_predictor_support(Predictor::Horizontal, 24, SampleFormat::Uint).is_err());
        assert!(check_predictor_support(Predictor::FloatingPoint, 16, SampleFormat::IEEEFP).is_err());
        assert!(check_predictor_support(Predictor::FloatingPoint, 32, SampleFormat::Uint).is_err());
        assert!(check_predictor_support(Predictor::Horizontal, 16, SampleFormat::Uint).is_ok());
    }
}
