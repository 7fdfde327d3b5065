//! Register access engine: named devices behind pluggable backends, per-client address
//! descriptors, synchronous and deferred transfers with optional priority work queues, and the
//! type conversion and byte transfer layers underneath.
pub mod debug;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod parse;
pub mod transfer;
pub mod types;

pub use device::{Backend, Device, DeviceHandle, Priority, Registry, Request, SimMemory, Transfer};
pub use dispatch::{Dispatcher, DispatcherConfig, IoOutcome, Reprocess, WorkQueueConfig};
pub use error::{DeviceError, DeviceResult, RegDevError, RegDevResult, Status};
pub use parse::{Descriptor, Parser};
