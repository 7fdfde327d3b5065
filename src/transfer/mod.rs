//! Byte transfer engine: element-wise copy with optional byte swap and bitmask merge.
//!
//! Knows nothing about devices, clients or data types. Backends use it to move bytes between
//! host buffers and device storage, correcting endianness and preserving bits outside a mask.

pub mod copy;
pub mod word;

pub use copy::copy;
pub use word::{Endianness, SwapWord};
