//! Defines the `Backend` trait every registered device is bound to. Backends move byte ranges
//! for the engine; each capability defaults to "unsupported" so the dispatcher can report
//! `DeviceError::Unsupported` instead of calling a missing entry.
use std::{fmt, sync::Arc};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::{dispatch::Completion, error::DeviceError, error::DeviceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        })
    }
}

/// Outcome of a backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Done,
    /// The backend took the completion token and will finish through it later.
    Deferred,
}

/// One transfer as seen by a backend: `count` elements of `elem_len` bytes starting at
/// `offset`, consecutive in device space.
#[derive(Debug)]
pub struct Request {
    pub offset: usize,
    pub elem_len: usize,
    pub count: usize,
    pub priority: Priority,
    completion: Option<Completion>,
}

impl Request {
    pub fn new(offset: usize, elem_len: usize, count: usize, priority: Priority) -> Self {
        Self {
            offset,
            elem_len,
            count,
            priority,
            completion: None,
        }
    }

    pub(crate) fn with_completion(mut self, completion: Completion) -> Self {
        self.completion = Some(completion);
        self
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.elem_len * self.count
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the caller can accept a deferred completion for this request.
    pub fn can_defer(&self) -> bool {
        self.completion.is_some()
    }

    /// Take ownership of the completion token. A backend that takes it owns the outcome and
    /// must answer with `Transfer::Deferred`.
    pub fn defer(&mut self) -> Option<Completion> {
        self.completion.take()
    }

    pub(crate) fn into_completion(self) -> Option<Completion> {
        self.completion
    }
}

/// Broadcast source for I/O-interrupt driven scanning.
#[derive(Clone, Default)]
pub struct ScanTrigger {
    subscribers: Arc<Mutex<Vec<Sender<()>>>>,
}

impl ScanTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<()> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Wake every live subscriber; returns how many were reached.
    pub fn fire(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(()).is_ok());
        subscribers.len()
    }
}

impl fmt::Debug for ScanTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanTrigger")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

pub trait Backend: Send {
    /// Backend-specific detail for the registry report.
    fn report(&self, _level: u32, _out: &mut dyn fmt::Write) -> DeviceResult<()> {
        Err(DeviceError::Unsupported("report"))
    }

    fn input_trigger(&mut self, _offset: usize) -> Option<ScanTrigger> {
        None
    }

    fn output_trigger(&mut self, _offset: usize) -> Option<ScanTrigger> {
        None
    }

    /// Fill `buf[..req.len()]` with host-order data, or defer through `req.defer()`.
    fn read(&mut self, _req: &mut Request, _buf: &mut [u8]) -> DeviceResult<Transfer> {
        Err(DeviceError::Unsupported("read"))
    }

    /// Store `data[..req.len()]`, touching only bits set in `mask` when one is given.
    fn write(
        &mut self,
        _req: &mut Request,
        _data: &[u8],
        _mask: Option<&[u8]>,
    ) -> DeviceResult<Transfer> {
        Err(DeviceError::Unsupported("write"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ReadOnly;

    impl Backend for ReadOnly {
        fn read(&mut self, req: &mut Request, buf: &mut [u8]) -> DeviceResult<Transfer> {
            buf[..req.len()].fill(0x5A);
            Ok(Transfer::Done)
        }
    }

    #[test]
    fn missing_capabilities_report_unsupported() {
        let mut dev = ReadOnly;
        let mut req = Request::new(0, 2, 1, Priority::Low);
        let mut buf = [0u8; 2];
        assert_eq!(dev.read(&mut req, &mut buf), Ok(Transfer::Done));
        assert_eq!(
            dev.write(&mut req, &buf, None),
            Err(DeviceError::Unsupported("write")),
            "write should surface as unsupported"
        );
        let mut out = String::new();
        assert!(dev.report(1, &mut out).is_err());
        assert!(dev.input_trigger(0).is_none());
    }

    #[test]
    fn trigger_reaches_live_subscribers_only() {
        let trigger = ScanTrigger::new();
        let live = trigger.subscribe();
        drop(trigger.subscribe());
        assert_eq!(trigger.fire(), 1, "dropped receiver should be pruned");
        assert!(live.try_recv().is_ok());
    }

    #[test]
    fn priorities_index_their_queue() {
        assert_eq!(Priority::ALL.map(Priority::index), [0, 1, 2]);
    }
}
