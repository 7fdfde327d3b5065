//! Tagged raw value storage, one variant per catalog type, in host byte order.
use super::{
    bcd::{bcd_to_binary, binary_to_bcd},
    catalog::DataType,
};
use crate::error::{DeviceError, DeviceResult};

#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Bcd8(u8),
    Bcd16(u16),
    Bcd32(u32),
}

macro_rules! take {
    ($t:ty, $bytes:expr) => {{
        let mut raw = [0u8; std::mem::size_of::<$t>()];
        raw.copy_from_slice(&$bytes[..std::mem::size_of::<$t>()]);
        <$t>::from_ne_bytes(raw)
    }};
}

impl RawValue {
    /// Reinterpret host-order bytes as `ty`. Strings stop at the first NUL.
    pub fn decode(ty: DataType, bytes: &[u8]) -> DeviceResult<Self> {
        if let Some(width) = ty.width() {
            if bytes.len() < width {
                return Err(DeviceError::BufferTooSmall {
                    needed: width,
                    actual: bytes.len(),
                });
            }
        }
        Ok(match ty {
            DataType::Int8 => RawValue::Int8(take!(i8, bytes)),
            DataType::UInt8 => RawValue::UInt8(bytes[0]),
            DataType::Int16 => RawValue::Int16(take!(i16, bytes)),
            DataType::UInt16 => RawValue::UInt16(take!(u16, bytes)),
            DataType::Int32 => RawValue::Int32(take!(i32, bytes)),
            DataType::UInt32 => RawValue::UInt32(take!(u32, bytes)),
            DataType::Int64 => RawValue::Int64(take!(i64, bytes)),
            DataType::UInt64 => RawValue::UInt64(take!(u64, bytes)),
            DataType::Float32 => RawValue::Float32(take!(f32, bytes)),
            DataType::Float64 => RawValue::Float64(take!(f64, bytes)),
            DataType::Bcd8 => RawValue::Bcd8(bytes[0]),
            DataType::Bcd16 => RawValue::Bcd16(take!(u16, bytes)),
            DataType::Bcd32 => RawValue::Bcd32(take!(u32, bytes)),
            DataType::String => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                RawValue::Text(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
        })
    }

    /// Write host-order bytes into `out`. Text is truncated or NUL padded to `out.len()`.
    pub fn encode(&self, out: &mut [u8]) -> DeviceResult<()> {
        let bytes: Vec<u8> = match self {
            RawValue::Int8(v) => v.to_ne_bytes().to_vec(),
            RawValue::UInt8(v) | RawValue::Bcd8(v) => vec![*v],
            RawValue::Int16(v) => v.to_ne_bytes().to_vec(),
            RawValue::UInt16(v) | RawValue::Bcd16(v) => v.to_ne_bytes().to_vec(),
            RawValue::Int32(v) => v.to_ne_bytes().to_vec(),
            RawValue::UInt32(v) | RawValue::Bcd32(v) => v.to_ne_bytes().to_vec(),
            RawValue::Int64(v) => v.to_ne_bytes().to_vec(),
            RawValue::UInt64(v) => v.to_ne_bytes().to_vec(),
            RawValue::Float32(v) => v.to_ne_bytes().to_vec(),
            RawValue::Float64(v) => v.to_ne_bytes().to_vec(),
            RawValue::Text(text) => {
                out.fill(0);
                let len = text.len().min(out.len());
                out[..len].copy_from_slice(&text.as_bytes()[..len]);
                return Ok(());
            }
        };
        if out.len() < bytes.len() {
            return Err(DeviceError::BufferTooSmall {
                needed: bytes.len(),
                actual: out.len(),
            });
        }
        out[..bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    pub fn data_type(&self) -> DataType {
        match self {
            RawValue::Int8(_) => DataType::Int8,
            RawValue::UInt8(_) => DataType::UInt8,
            RawValue::Int16(_) => DataType::Int16,
            RawValue::UInt16(_) => DataType::UInt16,
            RawValue::Int32(_) => DataType::Int32,
            RawValue::UInt32(_) => DataType::UInt32,
            RawValue::Int64(_) => DataType::Int64,
            RawValue::UInt64(_) => DataType::UInt64,
            RawValue::Float32(_) => DataType::Float32,
            RawValue::Float64(_) => DataType::Float64,
            RawValue::Text(_) => DataType::String,
            RawValue::Bcd8(_) => DataType::Bcd8,
            RawValue::Bcd16(_) => DataType::Bcd16,
            RawValue::Bcd32(_) => DataType::Bcd32,
        }
    }

    /// Stored bit pattern, zero-extended. Floats yield their IEEE bits, text yields zero.
    pub fn to_bits(&self) -> u64 {
        match *self {
            RawValue::Int8(v) => v as u8 as u64,
            RawValue::UInt8(v) | RawValue::Bcd8(v) => v as u64,
            RawValue::Int16(v) => v as u16 as u64,
            RawValue::UInt16(v) | RawValue::Bcd16(v) => v as u64,
            RawValue::Int32(v) => v as u32 as u64,
            RawValue::UInt32(v) | RawValue::Bcd32(v) => v as u64,
            RawValue::Int64(v) => v as u64,
            RawValue::UInt64(v) => v,
            RawValue::Float32(v) => v.to_bits() as u64,
            RawValue::Float64(v) => v.to_bits(),
            RawValue::Text(_) => 0,
        }
    }

    /// Build a value of `ty` from a bit pattern, truncating to the type width.
    pub fn from_bits(ty: DataType, bits: u64) -> Self {
        match ty {
            DataType::Int8 => RawValue::Int8(bits as u8 as i8),
            DataType::UInt8 => RawValue::UInt8(bits as u8),
            DataType::Int16 => RawValue::Int16(bits as u16 as i16),
            DataType::UInt16 => RawValue::UInt16(bits as u16),
            DataType::Int32 => RawValue::Int32(bits as u32 as i32),
            DataType::UInt32 => RawValue::UInt32(bits as u32),
            DataType::Int64 => RawValue::Int64(bits as i64),
            DataType::UInt64 => RawValue::UInt64(bits),
            DataType::Float32 => RawValue::Float32(f32::from_bits(bits as u32)),
            DataType::Float64 => RawValue::Float64(f64::from_bits(bits)),
            DataType::String => RawValue::Text(String::new()),
            DataType::Bcd8 => RawValue::Bcd8(bits as u8),
            DataType::Bcd16 => RawValue::Bcd16(bits as u16),
            DataType::Bcd32 => RawValue::Bcd32(bits as u32),
        }
    }

    /// Numeric value; BCD variants are decoded to binary first.
    pub fn as_f64(&self) -> f64 {
        match *self {
            RawValue::Int8(v) => v as f64,
            RawValue::UInt8(v) => v as f64,
            RawValue::Int16(v) => v as f64,
            RawValue::UInt16(v) => v as f64,
            RawValue::Int32(v) => v as f64,
            RawValue::UInt32(v) => v as f64,
            RawValue::Int64(v) => v as f64,
            RawValue::UInt64(v) => v as f64,
            RawValue::Float32(v) => v as f64,
            RawValue::Float64(v) => v,
            RawValue::Bcd8(v) => bcd_to_binary(v as u64) as f64,
            RawValue::Bcd16(v) => bcd_to_binary(v as u64) as f64,
            RawValue::Bcd32(v) => bcd_to_binary(v as u64) as f64,
            RawValue::Text(ref text) => text.trim().parse().unwrap_or(0.0),
        }
    }

    /// Build a value of `ty` from a number, saturating at the type range.
    pub fn from_f64(ty: DataType, value: f64) -> Self {
        match ty {
            DataType::Int8 => RawValue::Int8(value as i8),
            DataType::UInt8 => RawValue::UInt8(value as u8),
            DataType::Int16 => RawValue::Int16(value as i16),
            DataType::UInt16 => RawValue::UInt16(value as u16),
            DataType::Int32 => RawValue::Int32(value as i32),
            DataType::UInt32 => RawValue::UInt32(value as u32),
            DataType::Int64 => RawValue::Int64(value as i64),
            DataType::UInt64 => RawValue::UInt64(value as u64),
            DataType::Float32 => RawValue::Float32(value as f32),
            DataType::Float64 => RawValue::Float64(value),
            DataType::String => RawValue::Text(value.to_string()),
            DataType::Bcd8 => RawValue::Bcd8(binary_to_bcd((value as u64).min(99)) as u8),
            DataType::Bcd16 => RawValue::Bcd16(binary_to_bcd((value as u64).min(9999)) as u16),
            DataType::Bcd32 => {
                RawValue::Bcd32(binary_to_bcd((value as u64).min(99_999_999)) as u32)
            }
        }
    }
}
