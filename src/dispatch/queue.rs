//! Per-device priority work queue: three bounded queues, each drained in arrival order by its
//! own worker thread. A full queue rejects the request instead of blocking the caller.
use std::{
    fmt,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use super::{
    completion::{Completion, Direction},
    io::{Layout, Performed, perform_read, perform_write},
};
use crate::{
    device::{Priority, SharedBackend},
    error::{DeviceError, RegDevError, RegDevResult},
};

#[derive(Debug, Clone)]
pub struct WorkQueueConfig {
    /// Capacity of each priority queue.
    pub depth: usize,
    /// Worker threads are named `<prefix><device>-<priority>`.
    pub thread_prefix: String,
}

impl Default for WorkQueueConfig {
    fn default() -> Self {
        Self {
            depth: 32,
            thread_prefix: "regdev-".into(),
        }
    }
}

/// One queued transfer awaiting a worker.
pub(crate) struct WorkItem {
    direction: Direction,
    layout: Layout,
    priority: Priority,
    buffer: Vec<u8>,
    mask: Option<SmallVec<[u8; 8]>>,
    completion: Completion,
}

impl WorkItem {
    pub(crate) fn read(layout: Layout, priority: Priority, completion: Completion) -> Self {
        Self {
            direction: Direction::Read,
            layout,
            priority,
            buffer: vec![0; layout.len()],
            mask: None,
            completion,
        }
    }

    pub(crate) fn write(
        layout: Layout,
        priority: Priority,
        data: &[u8],
        mask: Option<&[u8]>,
        completion: Completion,
    ) -> Self {
        Self {
            direction: Direction::Write,
            layout,
            priority,
            buffer: data[..layout.len()].to_vec(),
            mask: mask.map(SmallVec::from_slice),
            completion,
        }
    }

    fn service(self, backend: &SharedBackend) {
        let WorkItem {
            direction,
            layout,
            priority,
            mut buffer,
            mask,
            completion,
        } = self;
        match direction {
            Direction::Read => {
                if let Performed::Finished(result, token) =
                    perform_read(backend, layout, priority, &mut buffer, completion)
                {
                    token.complete_read(result, buffer);
                }
            }
            Direction::Write => {
                if let Performed::Finished(result, token) = perform_write(
                    backend,
                    layout,
                    priority,
                    &buffer,
                    mask.as_deref(),
                    completion,
                ) {
                    token.complete(result);
                }
            }
        }
    }
}

enum Command {
    Transfer(WorkItem),
    Shutdown,
}

pub struct WorkQueue {
    device: String,
    depth: usize,
    senders: [Sender<Command>; 3],
    // Kept so leftovers can be cancelled after the workers exit.
    receivers: [Receiver<Command>; 3],
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: RwLock<bool>,
}

impl WorkQueue {
    pub(crate) fn start(
        device: &str,
        backend: SharedBackend,
        config: &WorkQueueConfig,
    ) -> RegDevResult<Self> {
        if config.depth == 0 {
            return Err(RegDevError::InvalidConfig("work queue depth must be positive"));
        }
        let channels = Priority::ALL.map(|_| crossbeam_channel::bounded(config.depth));
        let mut workers = Vec::with_capacity(Priority::ALL.len());
        for priority in Priority::ALL {
            let rx = channels[priority.index()].1.clone();
            let backend = backend.clone();
            let worker = thread::Builder::new()
                .name(format!("{}{device}-{priority}", config.thread_prefix))
                .spawn(move || run_worker(rx, backend))
                .map_err(|source| RegDevError::Spawn {
                    device: device.to_string(),
                    source,
                })?;
            workers.push(worker);
        }
        debug!("started work queue for '{device}' (depth {})", config.depth);
        let [(low_tx, low_rx), (mid_tx, mid_rx), (high_tx, high_rx)] = channels;
        Ok(Self {
            device: device.to_string(),
            depth: config.depth,
            senders: [low_tx, mid_tx, high_tx],
            receivers: [low_rx, mid_rx, high_rx],
            workers: Mutex::new(workers),
            closed: RwLock::new(false),
        })
    }

    /// Enqueue without blocking. On rejection the item's token is discarded unused.
    pub(crate) fn submit(&self, item: WorkItem) -> RegDevResult<()> {
        let closed = self.closed.read();
        if *closed {
            item.completion.dismiss();
            return Err(RegDevError::device(&self.device, DeviceError::Cancelled));
        }
        let priority = item.priority;
        match self.senders[priority.index()].try_send(Command::Transfer(item)) {
            Ok(()) => Ok(()),
            Err(err) => {
                if let TrySendError::Full(Command::Transfer(item))
                | TrySendError::Disconnected(Command::Transfer(item)) = err
                {
                    item.completion.dismiss();
                }
                warn!("device '{}': {priority} priority queue full", self.device);
                Err(RegDevError::QueueFull {
                    device: self.device.clone(),
                    priority,
                })
            }
        }
    }

    /// Items waiting in the queue for `priority`.
    pub fn queued(&self, priority: Priority) -> usize {
        self.senders[priority.index()].len()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    /// Send the stop sentinel to every worker, wait for them, then cancel whatever was still
    /// queued behind it. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut closed = self.closed.write();
            if *closed {
                return;
            }
            *closed = true;
        }
        for sender in &self.senders {
            let _ = sender.send(Command::Shutdown);
        }
        let current = thread::current().id();
        for worker in self.workers.lock().drain(..) {
            // A worker dropping the last device handle cannot join itself.
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                warn!("device '{}': work queue thread panicked", self.device);
            }
        }
        for receiver in &self.receivers {
            for command in receiver.try_iter() {
                if let Command::Transfer(item) = command {
                    item.completion.complete(Err(DeviceError::Cancelled));
                }
            }
        }
        debug!("stopped work queue for '{}'", self.device);
    }

    #[cfg(test)]
    fn worker_ids(&self) -> Vec<thread::ThreadId> {
        self.workers.lock().iter().map(|w| w.thread().id()).collect()
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Display for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        for priority in Priority::ALL {
            write!(f, "{sep}{priority}={}/{}", self.queued(priority), self.depth)?;
            sep = " ";
        }
        Ok(())
    }
}

fn run_worker(rx: Receiver<Command>, backend: SharedBackend) {
    while let Ok(command) = rx.recv() {
        match command {
            Command::Shutdown => break,
            Command::Transfer(item) => item.service(&backend),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Backend, Endianness, SimMemory};
    use std::sync::Arc;

    fn backend() -> SharedBackend {
        let sim: Box<dyn Backend> = Box::new(SimMemory::new(16, Endianness::Little));
        Arc::new(Mutex::new(sim))
    }

    #[test]
    fn zero_depth_is_rejected() {
        let config = WorkQueueConfig {
            depth: 0,
            ..WorkQueueConfig::default()
        };
        assert!(matches!(
            WorkQueue::start("dev", backend(), &config),
            Err(RegDevError::InvalidConfig(_))
        ));
    }

    #[test]
    fn starts_one_worker_per_priority_and_stops_cleanly() {
        let queue = WorkQueue::start("dev", backend(), &WorkQueueConfig::default())
            .expect("start queue");
        assert_eq!(queue.worker_ids().len(), 3);
        assert_eq!(queue.to_string(), "low=0/32 medium=0/32 high=0/32");
        queue.shutdown();
        assert!(queue.is_closed());
        assert!(queue.worker_ids().is_empty(), "workers joined");
        queue.shutdown();
    }
}
