//! Request dispatch for one client descriptor at a time.
//!
//! A descriptor moves `Idle -> Issued -> Idle`. Each call first collects a finished completion if
//! one is waiting, reports `Pending` while the transfer is still in flight, and otherwise issues a
//! new transfer: offset resolution, packing, range check, then the work queue or a direct backend
//! call. A completion collected by a call in the other direction is recorded and a fresh transfer
//! is issued. Until `finish_startup` is called, a deferred completion is waited for on the calling
//! thread so startup readback behaves synchronously; a client's first startup read goes through
//! its init offset.
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, trace};
use smallvec::SmallVec;

use super::{
    completion::{CompletionEvent, Direction, IoOutcome, TxnPoll},
    io::{Layout, Performed, perform_read, perform_write},
    queue::WorkItem,
};
use crate::{
    device::ScanTrigger,
    error::{DeviceError, DeviceResult, RegDevError, RegDevResult, Status},
    parse::{Descriptor, Packing},
};

#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    /// Longest a startup request waits for a deferred completion; `None` waits indefinitely.
    pub startup_timeout: Option<Duration>,
}

pub struct Dispatcher {
    config: DispatcherConfig,
    startup: AtomicBool,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            startup: AtomicBool::new(true),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn in_startup(&self) -> bool {
        self.startup.load(Ordering::Acquire)
    }

    /// From now on deferred completions notify clients instead of blocking callers.
    pub fn finish_startup(&self) {
        if self.startup.swap(false, Ordering::AcqRel) {
            debug!("startup phase finished, asynchronous completion enabled");
        }
    }

    /// Read `nelem` elements into `buf` in host byte order.
    pub fn read(
        &self,
        desc: &mut Descriptor,
        nelem: usize,
        buf: &mut [u8],
    ) -> RegDevResult<IoOutcome<()>> {
        match desc.txn.poll() {
            TxnPoll::InFlight => return Ok(IoOutcome::Pending),
            TxnPoll::Finished(Direction::Read, event) => return finish(desc, event, buf),
            TxnPoll::Finished(Direction::Write, event) => retire(desc, Direction::Write, event),
            TxnPoll::Idle => {}
        }
        let startup = self.in_startup();
        let readback = startup && desc.txn.readback_pending();
        let layout = layout(desc, nelem, readback)?;
        ensure_len(desc, layout.len(), buf.len())?;
        if readback {
            desc.txn.finish_readback();
        }

        let (wake, waiter) = startup_channel(startup);
        let token = desc.txn.issue(Direction::Read, wake);
        let device = desc.device().clone();
        let priority = desc.priority();
        trace!(
            "{}: read {} x {} at {:#x} on '{}'",
            desc.client(),
            layout.count,
            layout.elem_len,
            layout.offset,
            device.name()
        );
        match device.work_queue() {
            Some(queue) => {
                if let Err(err) = queue.submit(WorkItem::read(layout, priority, token)) {
                    desc.txn.settle(err.status());
                    return Err(err);
                }
            }
            None => {
                if let Performed::Finished(result, token) =
                    perform_read(device.backend(), layout, priority, buf, token)
                {
                    token.dismiss();
                    return settle(desc, result);
                }
            }
        }
        self.wait_for_startup(desc, waiter, buf)
    }

    /// Write `nelem` elements from `data`. With a `mask` (one element long, host order) only the
    /// set bits are changed; a mask covering every bit is the same as no mask.
    pub fn write(
        &self,
        desc: &mut Descriptor,
        nelem: usize,
        data: &[u8],
        mask: Option<&[u8]>,
    ) -> RegDevResult<IoOutcome<()>> {
        match desc.txn.poll() {
            TxnPoll::InFlight => return Ok(IoOutcome::Pending),
            TxnPoll::Finished(Direction::Write, event) => return finish(desc, event, &mut []),
            TxnPoll::Finished(Direction::Read, event) => retire(desc, Direction::Read, event),
            TxnPoll::Idle => {}
        }
        let startup = self.in_startup();
        let layout = layout(desc, nelem, false)?;
        ensure_len(desc, layout.len(), data.len())?;
        let mask = write_mask(desc, mask)?;

        let (wake, waiter) = startup_channel(startup);
        let token = desc.txn.issue(Direction::Write, wake);
        let device = desc.device().clone();
        let priority = desc.priority();
        trace!(
            "{}: write {} x {} at {:#x} on '{}'{}",
            desc.client(),
            layout.count,
            layout.elem_len,
            layout.offset,
            device.name(),
            if mask.is_some() { " (masked)" } else { "" }
        );
        match device.work_queue() {
            Some(queue) => {
                let item = WorkItem::write(layout, priority, data, mask.as_deref(), token);
                if let Err(err) = queue.submit(item) {
                    desc.txn.settle(err.status());
                    return Err(err);
                }
            }
            None => {
                if let Performed::Finished(result, token) =
                    perform_write(device.backend(), layout, priority, data, mask.as_deref(), token)
                {
                    token.dismiss();
                    return settle(desc, result);
                }
            }
        }
        self.wait_for_startup(desc, waiter, &mut [])
    }

    /// Scan trigger for input clients, if the backend offers one at the resolved offset.
    pub fn input_trigger(&self, desc: &Descriptor) -> RegDevResult<Option<ScanTrigger>> {
        let offset = trigger_offset(desc)?;
        Ok(desc.device().with_lock(|backend| backend.input_trigger(offset)))
    }

    /// Scan trigger for output clients, if the backend offers one at the resolved offset.
    pub fn output_trigger(&self, desc: &Descriptor) -> RegDevResult<Option<ScanTrigger>> {
        let offset = trigger_offset(desc)?;
        Ok(desc.device().with_lock(|backend| backend.output_trigger(offset)))
    }

    fn wait_for_startup(
        &self,
        desc: &mut Descriptor,
        waiter: Option<Receiver<()>>,
        buf: &mut [u8],
    ) -> RegDevResult<IoOutcome<()>> {
        let Some(waiter) = waiter else {
            return Ok(IoOutcome::Pending);
        };
        let woke = match self.config.startup_timeout {
            Some(limit) => waiter.recv_timeout(limit).is_ok(),
            None => waiter.recv().is_ok(),
        };
        if woke {
            if let TxnPoll::Finished(_, event) = desc.txn.poll() {
                return finish(desc, event, buf);
            }
        }
        // A completion arriving later carries an old ticket and is discarded.
        settle(desc, Err(DeviceError::Timeout))
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

fn startup_channel(startup: bool) -> (Option<Sender<()>>, Option<Receiver<()>>) {
    if startup {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    }
}

fn trigger_offset(desc: &Descriptor) -> RegDevResult<usize> {
    let offset = desc.resolve_offset(false)?;
    desc.device().check_range(offset, 0)
}

/// Offset, packing and range check, all before the device lock or a queue is touched.
fn layout(desc: &Descriptor, nelem: usize, readback: bool) -> RegDevResult<Layout> {
    let offset = desc.resolve_offset(readback)?;
    let dlen = desc.dlen();
    let overflow = |elem_len, count| RegDevError::LengthOverflow {
        device: desc.device().name().to_string(),
        elem_len,
        count,
    };
    let (elem_len, count, fifo) = match desc.packing() {
        Packing::None => (dlen, nelem, false),
        Packing::Array(n) => {
            if nelem % n != 0 {
                return Err(RegDevError::BadArgument {
                    client: desc.client().to_string(),
                    reason: format!("{nelem} elements do not fill array packing of {n}"),
                });
            }
            let unit = dlen.checked_mul(n).ok_or_else(|| overflow(dlen, n))?;
            (unit, nelem / n, false)
        }
        Packing::Fifo(n) => {
            let steps = nelem.checked_mul(n).ok_or_else(|| overflow(dlen / n, nelem))?;
            (dlen / n, steps, true)
        }
    };
    if elem_len.checked_mul(count).is_none() {
        return Err(overflow(elem_len, count));
    }
    let mut layout = Layout {
        offset: 0,
        elem_len,
        count,
        fifo,
    };
    layout.offset = desc.device().check_range(offset, layout.span())?;
    Ok(layout)
}

fn ensure_len(desc: &Descriptor, needed: usize, actual: usize) -> RegDevResult<()> {
    if actual < needed {
        return Err(RegDevError::device(
            desc.device().name(),
            DeviceError::BufferTooSmall { needed, actual },
        ));
    }
    Ok(())
}

fn write_mask(desc: &Descriptor, mask: Option<&[u8]>) -> RegDevResult<Option<SmallVec<[u8; 16]>>> {
    let Some(mask) = mask else {
        return Ok(None);
    };
    let dlen = desc.dlen();
    ensure_len(desc, dlen, mask.len())?;
    let mask = &mask[..dlen];
    if mask.iter().all(|&b| b == 0xff) {
        return Ok(None);
    }
    match desc.packing() {
        Packing::None => Ok(Some(SmallVec::from_slice(mask))),
        Packing::Array(n) => Ok(Some(mask.repeat(n).into())),
        Packing::Fifo(_) => Err(RegDevError::device(
            desc.device().name(),
            DeviceError::Unsupported("masked fifo write"),
        )),
    }
}

fn finish(
    desc: &mut Descriptor,
    event: CompletionEvent,
    buf: &mut [u8],
) -> RegDevResult<IoOutcome<()>> {
    if let (Ok(()), Some(data)) = (&event.result, &event.data) {
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
    }
    settle(desc, event.result)
}

/// Record a completion that belongs to a transfer in the other direction. It answers nothing the
/// current call asked for, so only its status is kept.
fn retire(desc: &mut Descriptor, direction: Direction, event: CompletionEvent) {
    let status = match &event.result {
        Ok(()) => Status::Success,
        Err(err) => err.status(),
    };
    debug!("{}: collected {direction} completion ({status})", desc.client());
    desc.txn.settle(status);
}

fn settle(desc: &mut Descriptor, result: DeviceResult<()>) -> RegDevResult<IoOutcome<()>> {
    match result {
        Ok(()) => {
            desc.txn.settle(Status::Success);
            Ok(IoOutcome::Ready(()))
        }
        Err(err) => {
            desc.txn.settle(err.status());
            Err(RegDevError::device(desc.device().name(), err))
        }
    }
}
