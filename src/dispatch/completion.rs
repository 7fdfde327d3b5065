//! Completion tokens and per-client transaction bookkeeping.
//!
//! Every issued transfer gets exactly one `Completion`. Consuming it delivers the outcome into
//! the client's slot; dropping it unconsumed delivers `DeviceError::Abandoned`. During startup
//! the token wakes the blocked caller instead of asking the client to reprocess.
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use crossbeam_channel::Sender;
use log::{debug, warn};
use parking_lot::Mutex;

use crate::error::{DeviceError, DeviceResult, Status};

/// Client adapter hook, invoked from the completing thread once an asynchronous transfer
/// finishes. The adapter re-runs its own processing, which collects the result.
pub trait Reprocess: Send + Sync {
    fn reprocess(&self, client: &str, status: Status);
}

/// Result of a request: data is ready now, or a completion will follow.
#[derive(Debug, Clone, PartialEq)]
pub enum IoOutcome<T> {
    Ready(T),
    Pending,
}

impl<T> IoOutcome<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, IoOutcome::Pending)
    }

    pub fn ready(self) -> Option<T> {
        match self {
            IoOutcome::Ready(value) => Some(value),
            IoOutcome::Pending => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> IoOutcome<U> {
        match self {
            IoOutcome::Ready(value) => IoOutcome::Ready(f(value)),
            IoOutcome::Pending => IoOutcome::Pending,
        }
    }
}

#[derive(Debug)]
pub struct CompletionEvent {
    pub result: DeviceResult<()>,
    pub data: Option<Vec<u8>>,
}

pub(crate) struct CompletionSlot {
    client: String,
    // Ticket of the transfer currently issued; older tokens are stale.
    current: AtomicU64,
    event: Mutex<Option<(u64, CompletionEvent)>>,
    notify: Mutex<Option<Arc<dyn Reprocess>>>,
}

/// Exactly-once completion target handed to a backend or a work-queue item.
pub struct Completion {
    slot: Arc<CompletionSlot>,
    ticket: u64,
    wake: Option<Sender<()>>,
    done: bool,
}

impl Completion {
    pub fn client(&self) -> &str {
        &self.slot.client
    }

    pub fn complete(mut self, result: DeviceResult<()>) {
        self.deliver(result, None);
    }

    /// Complete a deferred read, handing back the bytes that were read in host order.
    pub fn complete_read(mut self, result: DeviceResult<()>, data: Vec<u8>) {
        self.deliver(result, Some(data));
    }

    /// The transfer finished synchronously and its caller already has the result.
    pub(crate) fn dismiss(mut self) {
        self.done = true;
    }

    fn deliver(&mut self, result: DeviceResult<()>, data: Option<Vec<u8>>) {
        self.done = true;
        if self.slot.current.load(Ordering::Acquire) != self.ticket {
            debug!("{}: discarding stale completion #{}", self.slot.client, self.ticket);
            return;
        }
        let status = match &result {
            Ok(()) => Status::Success,
            Err(err) => err.status(),
        };
        *self.slot.event.lock() = Some((self.ticket, CompletionEvent { result, data }));
        match self.wake.take() {
            Some(wake) => {
                // A closed channel means the startup waiter gave up; the event is stale.
                let _ = wake.send(());
            }
            None => {
                let notify = self.slot.notify.lock().clone();
                if let Some(notify) = notify {
                    notify.reprocess(&self.slot.client, status);
                }
            }
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.done {
            warn!("{}: completion dropped without a result", self.slot.client);
            self.deliver(Err(DeviceError::Abandoned), None);
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("client", &self.slot.client)
            .field("ticket", &self.ticket)
            .field("startup", &self.wake.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Idle,
    Issued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Read,
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Read => "read",
            Direction::Write => "write",
        })
    }
}

pub(crate) enum TxnPoll {
    Idle,
    InFlight,
    /// The issued transfer finished; carries the direction it was issued for.
    Finished(Direction, CompletionEvent),
}

/// Async bookkeeping carried by each descriptor.
pub struct Transaction {
    slot: Arc<CompletionSlot>,
    state: TxnState,
    direction: Direction,
    ticket: u64,
    last_status: Status,
    readback_done: bool,
}

impl Transaction {
    pub(crate) fn new(client: &str) -> Self {
        Self {
            slot: Arc::new(CompletionSlot {
                client: client.to_string(),
                current: AtomicU64::new(0),
                event: Mutex::new(None),
                notify: Mutex::new(None),
            }),
            state: TxnState::Idle,
            direction: Direction::Read,
            ticket: 0,
            last_status: Status::Success,
            readback_done: false,
        }
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn last_status(&self) -> Status {
        self.last_status
    }

    /// The startup readback through the init offset has not happened yet.
    pub(crate) fn readback_pending(&self) -> bool {
        !self.readback_done
    }

    pub(crate) fn finish_readback(&mut self) {
        self.readback_done = true;
    }

    pub(crate) fn set_reprocess(&self, notify: Arc<dyn Reprocess>) {
        *self.slot.notify.lock() = Some(notify);
    }

    pub(crate) fn poll(&mut self) -> TxnPoll {
        if self.state == TxnState::Idle {
            return TxnPoll::Idle;
        }
        match self.slot.event.lock().take() {
            Some((ticket, event)) if ticket == self.ticket => {
                self.state = TxnState::Idle;
                TxnPoll::Finished(self.direction, event)
            }
            _ => TxnPoll::InFlight,
        }
    }

    pub(crate) fn issue(&mut self, direction: Direction, wake: Option<Sender<()>>) -> Completion {
        self.ticket += 1;
        self.direction = direction;
        self.slot.current.store(self.ticket, Ordering::Release);
        self.state = TxnState::Issued;
        self.last_status = Status::Pending;
        self.slot.event.lock().take();
        Completion {
            slot: self.slot.clone(),
            ticket: self.ticket,
            wake,
            done: false,
        }
    }

    pub(crate) fn settle(&mut self, status: Status) {
        self.state = TxnState::Idle;
        self.last_status = status;
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .field("direction", &self.direction)
            .field("ticket", &self.ticket)
            .field("last_status", &self.last_status)
            .finish()
    }
}
