#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use regdev::{
    Backend, DeviceError, DeviceHandle, Registry, Request, Status, Transfer,
    device::{Endianness, SimMemory},
    dispatch::{Completion, Reprocess},
};

/// Global mutex to serialize integration tests that spawn worker threads.
pub fn serial() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|err| err.into_inner())
}

pub const WAIT: Duration = Duration::from_secs(5);

/// Registry with one native-order simulated device named `name`.
pub fn sim_registry(name: &str, size: usize, bytes: &[u8]) -> (Registry, DeviceHandle) {
    let mut registry = Registry::new();
    let sim = SimMemory::new(size, Endianness::native())
        .with_bytes(0, bytes)
        .expect("preload");
    let handle = registry.register(name, sim, size).expect("register sim");
    (registry, handle)
}

/// Records every asynchronous completion notification.
#[derive(Default)]
pub struct Notifications {
    seen: Mutex<Vec<(String, Status)>>,
    tx: OnceLock<Sender<String>>,
}

impl Notifications {
    pub fn new() -> (Arc<Self>, Receiver<String>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let notes = Arc::new(Self::default());
        let _ = notes.tx.set(tx);
        (notes, rx)
    }

    pub fn seen(&self) -> Vec<(String, Status)> {
        self.seen.lock().expect("notifications lock").clone()
    }
}

impl Reprocess for Notifications {
    fn reprocess(&self, client: &str, status: Status) {
        self.seen
            .lock()
            .expect("notifications lock")
            .push((client.to_string(), status));
        if let Some(tx) = self.tx.get() {
            let _ = tx.send(client.to_string());
        }
    }
}

/// One request a `ParkingBackend` took the token for.
pub struct Parked {
    pub offset: usize,
    pub len: usize,
    pub write: bool,
    pub completion: Completion,
}

/// Backend that defers every request carrying a token and hands the token to the test.
pub struct ParkingBackend {
    parked: Sender<Parked>,
}

impl ParkingBackend {
    pub fn new() -> (Self, Receiver<Parked>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { parked: tx }, rx)
    }

    fn park(&mut self, req: &mut Request, write: bool) -> Result<Transfer, DeviceError> {
        match req.defer() {
            Some(completion) => {
                let _ = self.parked.send(Parked {
                    offset: req.offset,
                    len: req.len(),
                    write,
                    completion,
                });
                Ok(Transfer::Deferred)
            }
            None => Err(DeviceError::Unsupported("synchronous transfer")),
        }
    }
}

impl Backend for ParkingBackend {
    fn read(&mut self, req: &mut Request, _buf: &mut [u8]) -> Result<Transfer, DeviceError> {
        self.park(req, false)
    }

    fn write(
        &mut self,
        req: &mut Request,
        _data: &[u8],
        _mask: Option<&[u8]>,
    ) -> Result<Transfer, DeviceError> {
        self.park(req, true)
    }
}

/// What a `RecordingBackend` saw for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub offset: usize,
    pub elem_len: usize,
    pub count: usize,
    pub masked: bool,
    pub thread: Option<String>,
}

/// Synchronous backend that logs every call. Reads return an incrementing byte stream. When a
/// gate is installed the first call announces itself and blocks until the gate opens.
pub struct RecordingBackend {
    calls: Arc<Mutex<Vec<Call>>>,
    next: u8,
    gate: Option<(Sender<()>, Receiver<()>)>,
}

impl RecordingBackend {
    pub fn new() -> (Self, Arc<Mutex<Vec<Call>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let backend = Self {
            calls: calls.clone(),
            next: 0,
            gate: None,
        };
        (backend, calls)
    }

    /// Returns (entered, release): `entered` fires when the first call arrives, sending on
    /// `release` lets it finish.
    pub fn gated(mut self) -> (Self, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded(1);
        self.gate = Some((entered_tx, release_rx));
        (self, entered_rx, release_tx)
    }

    fn record(&mut self, req: &Request, masked: bool) {
        self.calls.lock().expect("calls lock").push(Call {
            offset: req.offset,
            elem_len: req.elem_len,
            count: req.count,
            masked,
            thread: std::thread::current().name().map(str::to_string),
        });
        if let Some((entered, release)) = self.gate.take() {
            let _ = entered.send(());
            let _ = release.recv_timeout(WAIT);
        }
    }
}

impl Backend for RecordingBackend {
    fn read(&mut self, req: &mut Request, buf: &mut [u8]) -> Result<Transfer, DeviceError> {
        self.record(req, false);
        for byte in &mut buf[..req.len()] {
            *byte = self.next;
            self.next = self.next.wrapping_add(1);
        }
        Ok(Transfer::Done)
    }

    fn write(
        &mut self,
        req: &mut Request,
        _data: &[u8],
        mask: Option<&[u8]>,
    ) -> Result<Transfer, DeviceError> {
        self.record(req, mask.is_some());
        Ok(Transfer::Done)
    }
}
