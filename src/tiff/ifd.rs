//! Loosely typed tag values
#![allow(missing_docs)]

use super::error::{TiffError, TiffFormatError, TiffResult};

use self::Value::{
    Ascii, Byte, Double, Float, Ifd, IfdBig, List, Rational, SRational, Short, Unsigned, UnsignedBig,
};

/// A loosely typed tag value as it was read from (or will be written to) a directory entry.
#[allow(unused_qualifications)]
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    Byte(u8),
    Short(u16),
    SignedByte(i8),
    SignedShort(i16),
    Signed(i32),
    SignedBig(i64),
    Unsigned(u32),
    UnsignedBig(u64),
    Float(f32),
    Double(f64),
    List(Vec<Value>),
    Rational(u32, u32),
    SRational(i32, i32),
    Ascii(String),
    Ifd(u32),
    IfdBig(u64),
}

impl Value {
    pub fn into_u8(self) -> TiffResult<u8> {
        match self {
            Byte(val) => Ok(val),
            List(mut vec) if vec.len() == 1 => vec.remove(0).into_u8(),
            val => Err(TiffError::FormatError(TiffFormatError::ByteExpected(val))),
        }
    }

    pub fn into_u16(self) -> TiffResult<u16> {
        match self {
            Byte(val) => Ok(val.into()),
            Short(val) => Ok(val),
            Unsigned(val) => Ok(u16::try_from(val)?),
            UnsignedBig(val) => Ok(u16::try_from(val)?),
            List(mut vec) if vec.len() == 1 => vec.remove(0).into_u16(),
            val => Err(TiffError::FormatError(TiffFormatError::ShortExpected(val))),
        }
    }

    pub fn into_u32(self) -> TiffResult<u32> {
        match self {
            Byte(val) => Ok(val.into()),
            Short(val) => Ok(val.into()),
            Unsigned(val) => Ok(val),
            UnsignedBig(val) => Ok(u32::try_from(val)?),
            Ifd(val) => Ok(val),
            IfdBig(val) => Ok(u32::try_from(val)?),
            List(mut vec) if vec.len() == 1 => vec.remove(0).into_u32(),
            val => Err(TiffError::FormatError(
                TiffFormatError::UnsignedIntegerExpected(val),
            )),
        }
    }

    pub fn into_u64(self) -> TiffResult<u64> {
        match self {
            Byte(val) => Ok(val.into()),
            Short(val) => Ok(val.into()),
            Unsigned(val) => Ok(val.into()),
            UnsignedBig(val) => Ok(val),
            Ifd(val) => Ok(val.into()),
            IfdBig(val) => Ok(val),
            List(mut vec) if vec.len() == 1 => vec.remove(0).into_u64(),
            val => Err(TiffError::FormatError(
                TiffFormatError::UnsignedIntegerExpected(val),
            )),
        }
    }

    pub fn into_f64(self) -> TiffResult<f64> {
        match self {
            Float(val) => Ok(val.into()),
            Double(val) => Ok(val),
            Rational(numerator, denominator) if denominator != 0 => {
                Ok(f64::from(numerator) / f64::from(denominator))
            }
            SRational(numerator, denominator) if denominator != 0 => {
                Ok(f64::from(numerator) / f64::from(denominator))
            }
            List(mut vec) if vec.len() == 1 => vec.remove(0).into_f64(),
            val => match val.into_u32() {
                Ok(val) => Ok(val.into()),
                Err(_) => Err(TiffError::FormatError(TiffFormatError::InvalidTag)),
            },
        }
    }

    pub fn into_string(self) -> TiffResult<String> {
        match self {
            Ascii(val) => Ok(val),
            List(mut vec) if vec.len() == 1 => vec.remove(0).into_string(),
            val => Err(TiffError::FormatError(TiffFormatError::AsciiExpected(val))),
        }
    }

    pub fn into_u8_vec(self) -> TiffResult<Vec<u8>> {
        match self {
            List(vec) => vec.into_iter().map(Value::into_u8).collect(),
            Ascii(val) => Ok(val.into_bytes()),
            val => Ok(vec![val.into_u8()?]),
        }
    }

    pub fn into_u16_vec(self) -> TiffResult<Vec<u16>> {
        match self {
            List(vec) => vec.into_iter().map(Value::into_u16).collect(),
            val => Ok(vec![val.into_u16()?]),
        }
    }

    pub fn into_u32_vec(self) -> TiffResult<Vec<u32>> {
        match self {
            List(vec) => vec.into_iter().map(Value::into_u32).collect(),
            val => Ok(vec![val.into_u32()?]),
        }
    }

    pub fn into_u64_vec(self) -> TiffResult<Vec<u64>> {
        match self {
            List(vec) => vec.into_iter().map(Value::into_u64).collect(),
            val => Ok(vec![val.into_u64()?]),
        }
    }

    pub fn into_f64_vec(self) -> TiffResult<Vec<f64>> {
        match self {
            List(vec) => vec.into_iter().map(Value::into_f64).collect(),
            val => Ok(vec![val.into_f64()?]),
        }
    }

    /// Number of elements this value serializes to, as stored in the entry's count field.
    pub fn count(&self) -> u64 {
        match self {
            List(vec) => vec.len() as u64,
            // NUL terminator
            Ascii(val) => val.len() as u64 + 1,
            _ => 1,
        }
    }
}
