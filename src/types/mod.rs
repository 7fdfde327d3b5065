//! Data-type catalog, BCD conversion, linear engineering-unit scaling and bit logic.

pub mod bcd;
pub mod bits;
pub mod catalog;
pub mod scale;
pub mod value;

pub use bcd::{bcd_to_binary, binary_to_bcd};
pub use bits::{apply_read_bits, compose_write_bits, effective_mask, width_mask};
pub use catalog::{DataType, RawBounds};
pub use scale::LinearScale;
pub use value::RawValue;
