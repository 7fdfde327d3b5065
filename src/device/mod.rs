#[path = "backend.rs"]
mod backend_trait;
pub mod registry;
pub mod sim;

pub use crate::transfer::Endianness;
pub use backend_trait::{Backend, Priority, Request, ScanTrigger, Transfer};
pub use registry::{Device, DeviceHandle, Registry};
pub(crate) use registry::SharedBackend;
pub use sim::SimMemory;
