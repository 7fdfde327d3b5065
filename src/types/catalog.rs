//! The fixed catalog of register data types and their raw-value ranges.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
    Bcd8,
    Bcd16,
    Bcd32,
}

/// Accepted names. The first name listed for a type is its canonical name.
const CATALOG: &[(&str, DataType)] = &[
    ("int8", DataType::Int8),
    ("char", DataType::Int8),
    ("byte", DataType::Int8),
    ("uint8", DataType::UInt8),
    ("uchar", DataType::UInt8),
    ("unsigned8", DataType::UInt8),
    ("int16", DataType::Int16),
    ("short", DataType::Int16),
    ("uint16", DataType::UInt16),
    ("ushort", DataType::UInt16),
    ("unsigned16", DataType::UInt16),
    ("word", DataType::UInt16),
    ("int32", DataType::Int32),
    ("long", DataType::Int32),
    ("uint32", DataType::UInt32),
    ("ulong", DataType::UInt32),
    ("unsigned32", DataType::UInt32),
    ("dword", DataType::UInt32),
    ("int64", DataType::Int64),
    ("longlong", DataType::Int64),
    ("uint64", DataType::UInt64),
    ("ulonglong", DataType::UInt64),
    ("unsigned64", DataType::UInt64),
    ("qword", DataType::UInt64),
    ("float32", DataType::Float32),
    ("float", DataType::Float32),
    ("single", DataType::Float32),
    ("real32", DataType::Float32),
    ("float64", DataType::Float64),
    ("double", DataType::Float64),
    ("real64", DataType::Float64),
    ("string", DataType::String),
    ("bcd8", DataType::Bcd8),
    ("bcd16", DataType::Bcd16),
    ("bcd32", DataType::Bcd32),
];

/// Hardware-domain endpoints used for engineering-unit scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBounds {
    pub low: i128,
    pub high: i128,
}

impl RawBounds {
    pub const fn new(low: i128, high: i128) -> Self {
        Self { low, high }
    }
}

impl DataType {
    /// Case-insensitive whole-name lookup, so no alias can shadow another name.
    pub fn lookup(name: &str) -> Option<Self> {
        CATALOG
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, ty)| *ty)
    }

    pub fn name(self) -> &'static str {
        CATALOG
            .iter()
            .find(|(_, ty)| *ty == self)
            .map_or("unknown", |(name, _)| name)
    }

    /// Element width in bytes; `None` for strings, whose length comes from the descriptor.
    pub fn width(self) -> Option<usize> {
        match self {
            DataType::Int8 | DataType::UInt8 | DataType::Bcd8 => Some(1),
            DataType::Int16 | DataType::UInt16 | DataType::Bcd16 => Some(2),
            DataType::Int32 | DataType::UInt32 | DataType::Float32 | DataType::Bcd32 => Some(4),
            DataType::Int64 | DataType::UInt64 | DataType::Float64 => Some(8),
            DataType::String => None,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub fn is_bcd(self) -> bool {
        matches!(self, DataType::Bcd8 | DataType::Bcd16 | DataType::Bcd32)
    }

    /// Integer or BCD: the types that take part in linear scaling and bit logic.
    pub fn is_integral(self) -> bool {
        !self.is_float() && self != DataType::String
    }

    /// Bounds substituted when the descriptor gives no `L`/`H`.
    pub fn default_bounds(self) -> Option<RawBounds> {
        let bits = (self.width()? * 8) as u32;
        if self.is_signed() {
            let max = (1i128 << (bits - 1)) - 1;
            Some(RawBounds::new(-max, max))
        } else if self.is_bcd() {
            Some(RawBounds::new(0, 10i128.pow(bits / 4) - 1))
        } else if self.is_integral() {
            Some(RawBounds::new(0, (1i128 << bits) - 1))
        } else {
            None
        }
    }

    /// Range an explicit `L`/`H` must fall within.
    pub fn bound_limits(self) -> Option<RawBounds> {
        let bits = (self.width()? * 8) as u32;
        if self.is_signed() {
            Some(RawBounds::new(-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1))
        } else {
            self.default_bounds()
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
