//! The device registry owns every named device for the lifetime of the process. Devices are
//! appended at startup, looked up by exact name, and never removed; each carries the mutex
//! that serializes calls into its backend and, optionally, a priority work queue.
use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use ahash::AHashMap;
use log::{debug, warn};
use parking_lot::Mutex;

use super::Backend;
use crate::{
    dispatch::{WorkQueue, WorkQueueConfig},
    error::{DeviceError, RegDevError, RegDevResult},
};

pub(crate) type SharedBackend = Arc<Mutex<Box<dyn Backend>>>;

pub type DeviceHandle = Arc<Device>;

pub struct Device {
    name: String,
    size: usize,
    backend: SharedBackend,
    queue: OnceLock<WorkQueue>,
}

impl Device {
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared size in bytes; zero means unknown and disables range checks.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `f` with the device mutex held. The lock is released on every exit path.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut dyn Backend) -> R) -> R {
        let mut backend = self.backend.lock();
        f(backend.as_mut())
    }

    pub(crate) fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    pub fn work_queue(&self) -> Option<&WorkQueue> {
        self.queue.get()
    }

    /// Start the three priority workers for this device.
    pub fn install_work_queue(&self, config: &WorkQueueConfig) -> RegDevResult<()> {
        if self.queue.get().is_some() {
            return Err(RegDevError::AlreadyExists(format!("{} work queue", self.name)));
        }
        let queue = WorkQueue::start(&self.name, self.backend.clone(), config)?;
        if let Err(queue) = self.queue.set(queue) {
            queue.shutdown();
            return Err(RegDevError::AlreadyExists(format!("{} work queue", self.name)));
        }
        Ok(())
    }

    /// Validate `len` bytes at `offset` against the declared size.
    ///
    /// A zero-length status check may sit exactly at the end of the device; a real transfer must
    /// start strictly inside it.
    pub fn check_range(&self, offset: i64, len: usize) -> RegDevResult<usize> {
        let out_of_range = || RegDevError::OffsetOutOfRange {
            device: self.name.clone(),
            offset,
            size: self.size,
        };
        let start = usize::try_from(offset).map_err(|_| out_of_range())?;
        if self.size == 0 {
            return Ok(start);
        }
        if start > self.size || (len > 0 && start == self.size) {
            return Err(out_of_range());
        }
        match start.checked_add(len) {
            Some(end) if end <= self.size => Ok(start),
            _ => Err(RegDevError::LengthExceedsDevice {
                device: self.name.clone(),
                offset: start,
                len,
                size: self.size,
            }),
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("work_queue", &self.queue.get().is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct Registry {
    // Registration order, for reports
    devices: Vec<DeviceHandle>,
    index: AHashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        backend: impl Backend + 'static,
        size: usize,
    ) -> RegDevResult<DeviceHandle> {
        self.register_boxed(name, Box::new(backend), size)
    }

    pub fn register_boxed(
        &mut self,
        name: impl Into<String>,
        backend: Box<dyn Backend>,
        size: usize,
    ) -> RegDevResult<DeviceHandle> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(RegDevError::AlreadyExists(name));
        }
        let device = Arc::new(Device {
            name: name.clone(),
            size,
            backend: Arc::new(Mutex::new(backend)),
            queue: OnceLock::new(),
        });
        debug!("registered device '{name}' ({size} bytes)");
        self.index.insert(name, self.devices.len());
        self.devices.push(device.clone());
        Ok(device)
    }

    pub fn find(&self, name: &str) -> Option<DeviceHandle> {
        self.index.get(name).map(|&id| self.devices[id].clone())
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Describe every device. Backend report failures are logged and skipped.
    pub fn report(&self, level: u32, out: &mut dyn fmt::Write) -> fmt::Result {
        for device in &self.devices {
            match device.size {
                0 => writeln!(out, "{} size=unknown", device.name)?,
                size => writeln!(out, "{} size={size}", device.name)?,
            }
            if level == 0 {
                continue;
            }
            let mut detail = String::new();
            match device.with_lock(|backend| backend.report(level, &mut detail)) {
                Ok(()) => {
                    for line in detail.lines() {
                        writeln!(out, "    {line}")?;
                    }
                }
                Err(DeviceError::Unsupported(_)) => {}
                Err(err) => warn!("device '{}' report failed: {err}", device.name),
            }
            if let Some(queue) = device.work_queue() {
                writeln!(out, "    work queue: {queue}")?;
            }
        }
        Ok(())
    }

    /// Stop every installed work queue.
    pub fn shutdown(&self) {
        for device in &self.devices {
            if let Some(queue) = device.work_queue() {
                queue.shutdown();
            }
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Endianness, SimMemory};
    use crate::error::{DeviceResult, Status};

    struct Silent;

    impl Backend for Silent {}

    struct Broken;

    impl Backend for Broken {
        fn report(&self, _level: u32, _out: &mut dyn fmt::Write) -> DeviceResult<()> {
            Err(DeviceError::Unavailable("bus error".into()))
        }
    }

    #[test]
    fn register_and_find_by_exact_name() {
        let mut registry = Registry::new();
        registry.register("dev1", Silent, 0x40).expect("register dev1");
        assert!(registry.find("dev1").is_some());
        assert!(registry.find("DEV1").is_none(), "names compare exactly");
        assert!(registry.find("dev").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = Registry::new();
        registry.register("dev1", Silent, 0).expect("first registration");
        let err = registry.register("dev1", Silent, 0).expect_err("duplicate");
        assert!(matches!(err, RegDevError::AlreadyExists(ref name) if name == "dev1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn range_check_honours_declared_size() {
        let mut registry = Registry::new();
        let dev = registry.register("dev1", Silent, 60).unwrap();
        assert_eq!(dev.check_range(56, 4).unwrap(), 56);
        assert_eq!(dev.check_range(60, 0).unwrap(), 60, "status check at the boundary");
        let err = dev.check_range(60, 1).expect_err("transfer at the boundary");
        assert_eq!(err.status(), Status::BadSignalNumber);
        let err = dev.check_range(58, 4).expect_err("transfer past the end");
        assert_eq!(err.status(), Status::BadSignalCount);
        assert!(dev.check_range(-1, 0).is_err(), "negative offsets never pass");
    }

    #[test]
    fn unknown_size_disables_range_checks() {
        let mut registry = Registry::new();
        let dev = registry.register("dev1", Silent, 0).unwrap();
        assert_eq!(dev.check_range(1 << 20, 64).unwrap(), 1 << 20);
    }

    #[test]
    fn report_lists_devices_and_swallows_backend_failures() {
        let mut registry = Registry::new();
        registry
            .register("sim", SimMemory::new(16, Endianness::Big), 16)
            .unwrap();
        registry.register("broken", Broken, 0).unwrap();
        let mut out = String::new();
        registry.report(1, &mut out).expect("report");
        assert!(out.contains("sim size=16"), "report: {out}");
        assert!(out.contains("broken size=unknown"), "report: {out}");
        assert!(out.contains("big endian"), "backend detail should be indented in: {out}");
    }

    #[test]
    fn lock_is_released_after_each_call() {
        let mut registry = Registry::new();
        let dev = registry.register("dev1", Silent, 0).unwrap();
        let first = dev.with_lock(|backend| backend.input_trigger(0).is_none());
        let second = dev.with_lock(|backend| backend.output_trigger(0).is_none());
        assert!(first && second, "second lock must not deadlock");
    }
}
