//! Status codes and the two error layers of the register access engine.
//!
//! Backends report `DeviceError`; everything the engine hands back to a client is a
//! `RegDevError`, which wraps device failures together with the device name. Each engine error
//! maps onto one boundary `Status` so client adapters can raise the matching alarm.
use std::{fmt, io};

use thiserror::Error;

use crate::{device::Priority, parse::LinkError};

pub type DeviceResult<T> = Result<T, DeviceError>;
pub type RegDevResult<T> = Result<T, RegDevError>;

/// Status codes returned across the client boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    BadArgument,
    BadArgumentType,
    NoDevice,
    NoMemory,
    /// Offset outside the device.
    BadSignalNumber,
    /// Transfer length exceeds the device.
    BadSignalCount,
    /// Operation not supported by the backend.
    BadRequest,
    /// Backend failure (disconnected, timed out, cancelled).
    DeviceFault,
    /// Not a failure: the transaction completes later through a notification.
    Pending,
}

impl Status {
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Success | Status::Pending)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Success => "success",
            Status::BadArgument => "bad argument",
            Status::BadArgumentType => "bad argument type",
            Status::NoDevice => "no device",
            Status::NoMemory => "no memory",
            Status::BadSignalNumber => "bad signal number",
            Status::BadSignalCount => "bad signal count",
            Status::BadRequest => "bad request",
            Status::DeviceFault => "device fault",
            Status::Pending => "pending asynchronous completion",
        };
        f.write_str(text)
    }
}

/// Failures raised by a backend or by the byte transfer engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
    #[error("{len} bytes at offset {offset} exceed capacity {capacity}")]
    OutOfRange {
        offset: usize,
        len: usize,
        capacity: usize,
    },
    #[error("buffer holds {actual} bytes but {needed} are required")]
    BufferTooSmall { needed: usize, actual: usize },
    #[error("device unavailable: {0}")]
    Unavailable(String),
    #[error("request cancelled by work queue shutdown")]
    Cancelled,
    #[error("completion token dropped without a result")]
    Abandoned,
    #[error("timed out waiting for completion")]
    Timeout,
}

impl DeviceError {
    pub fn status(&self) -> Status {
        match self {
            DeviceError::Unsupported(_) => Status::BadRequest,
            DeviceError::OutOfRange { .. } => Status::BadSignalNumber,
            DeviceError::BufferTooSmall { .. } => Status::BadSignalCount,
            DeviceError::Unavailable(_)
            | DeviceError::Cancelled
            | DeviceError::Abandoned
            | DeviceError::Timeout => Status::DeviceFault,
        }
    }
}

/// Failures reported to clients of the engine.
#[derive(Debug, Error)]
pub enum RegDevError {
    #[error("{client}: {reason}")]
    BadArgument { client: String, reason: String },
    #[error("{client}: {reason}")]
    BadArgumentType { client: String, reason: String },
    #[error("{client}: device '{device}' not found")]
    NoDevice { client: String, device: String },
    #[error("device '{0}' already registered")]
    AlreadyExists(String),
    #[error("device '{device}': offset {offset} outside device size {size}")]
    OffsetOutOfRange {
        device: String,
        offset: i64,
        size: usize,
    },
    #[error("device '{device}': {len} bytes at offset {offset} exceed device size {size}")]
    LengthExceedsDevice {
        device: String,
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("device '{device}': {count} elements of {elem_len} bytes overflow the address space")]
    LengthOverflow {
        device: String,
        elem_len: usize,
        count: usize,
    },
    #[error("device '{device}': {priority} priority work queue is full")]
    QueueFull { device: String, priority: Priority },
    #[error("device '{device}': cannot start work queue thread")]
    Spawn {
        device: String,
        #[source]
        source: io::Error,
    },
    #[error("{client}: offset reference failed")]
    Link {
        client: String,
        #[source]
        source: LinkError,
    },
    #[error("device '{device}' reported a fault")]
    Device {
        device: String,
        #[source]
        source: DeviceError,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

impl RegDevError {
    pub fn device(device: &str, source: DeviceError) -> Self {
        RegDevError::Device {
            device: device.to_string(),
            source,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            RegDevError::BadArgument { .. } | RegDevError::InvalidConfig(_) => Status::BadArgument,
            RegDevError::BadArgumentType { .. } => Status::BadArgumentType,
            RegDevError::NoDevice { .. } => Status::NoDevice,
            RegDevError::AlreadyExists(_) => Status::BadArgument,
            RegDevError::OffsetOutOfRange { .. } => Status::BadSignalNumber,
            RegDevError::LengthExceedsDevice { .. } | RegDevError::LengthOverflow { .. } => {
                Status::BadSignalCount
            }
            RegDevError::QueueFull { .. } | RegDevError::Spawn { .. } => Status::NoMemory,
            RegDevError::Link { .. } => Status::DeviceFault,
            RegDevError::Device { source, .. } => source.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn device_faults_keep_their_source() {
        let err = RegDevError::device("dev1", DeviceError::Unsupported("write"));
        assert_eq!(err.status(), Status::BadRequest, "unsupported maps to bad request");
        let source = err.source().expect("wrapped device error");
        assert_eq!(source.to_string(), "write is not supported by this backend");
    }

    #[test]
    fn parser_errors_name_the_client() {
        let err = RegDevError::NoDevice {
            client: "rec:temp".into(),
            device: "dev2".into(),
        };
        assert!(err.to_string().starts_with("rec:temp:"), "message should lead with the client");
        assert_eq!(err.status(), Status::NoDevice);
    }

    #[test]
    fn pending_is_not_a_failure() {
        assert!(Status::Pending.is_ok());
        assert!(!Status::DeviceFault.is_ok());
    }
}
