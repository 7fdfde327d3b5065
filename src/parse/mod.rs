//! Descriptor parsing: turns a client's address text into a `Descriptor` bound to a registered
//! device.
pub mod descriptor;
pub mod expr;
pub mod links;
mod literal;
mod parser;
mod scanner;

pub use descriptor::{Descriptor, LinkedOffset, Offset, Packing};
pub use expr::{EvalContext, ExprProgram, OpCode};
pub use links::{Link, LinkError, LinkTable, OffsetLinks, OffsetSource};
pub use parser::{DEFAULT_STRING_LEN, Parser};
