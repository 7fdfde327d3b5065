//! Backend invocation shared by the caller-thread path and the work-queue workers.
//!
//! The device mutex is taken once per backend call and released before returning. A backend
//! that takes the completion token owns the outcome; otherwise the token comes back to the
//! caller together with the result.
use log::warn;

use super::completion::Completion;
use crate::{
    device::{Priority, Request, SharedBackend, Transfer},
    error::{DeviceError, DeviceResult},
};

/// Resolved placement of one client request in device space. `elem_len * count` is checked to
/// fit in `usize` when the layout is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Layout {
    pub offset: usize,
    pub elem_len: usize,
    pub count: usize,
    /// Every element goes to the same offset, one backend call each.
    pub fifo: bool,
}

impl Layout {
    /// Host buffer bytes covered by the request.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.elem_len * self.count
    }

    /// Device bytes touched by the request.
    pub fn span(&self) -> usize {
        match (self.fifo, self.count) {
            (true, 0) => 0,
            (true, _) => self.elem_len,
            (false, _) => self.len(),
        }
    }
}

pub(crate) enum Performed {
    Finished(DeviceResult<()>, Completion),
    Deferred,
}

pub(crate) fn perform_read(
    backend: &SharedBackend,
    layout: Layout,
    priority: Priority,
    buf: &mut [u8],
    token: Completion,
) -> Performed {
    if layout.fifo {
        let result = fifo_steps(layout, |at| {
            let mut req = Request::new(layout.offset, layout.elem_len, 1, priority);
            let slot = &mut buf[at..at + layout.elem_len];
            backend.lock().read(&mut req, slot)
        });
        return Performed::Finished(result, token);
    }
    let mut req = Request::new(layout.offset, layout.elem_len, layout.count, priority)
        .with_completion(token);
    let result = backend.lock().read(&mut req, &mut buf[..layout.len()]);
    settle(req, result)
}

pub(crate) fn perform_write(
    backend: &SharedBackend,
    layout: Layout,
    priority: Priority,
    data: &[u8],
    mask: Option<&[u8]>,
    token: Completion,
) -> Performed {
    if layout.fifo {
        let result = fifo_steps(layout, |at| {
            let mut req = Request::new(layout.offset, layout.elem_len, 1, priority);
            backend
                .lock()
                .write(&mut req, &data[at..at + layout.elem_len], mask)
        });
        return Performed::Finished(result, token);
    }
    let mut req = Request::new(layout.offset, layout.elem_len, layout.count, priority)
        .with_completion(token);
    let result = backend.lock().write(&mut req, &data[..layout.len()], mask);
    settle(req, result)
}

fn fifo_steps(
    layout: Layout,
    mut step: impl FnMut(usize) -> DeviceResult<Transfer>,
) -> DeviceResult<()> {
    for index in 0..layout.count {
        match step(index * layout.elem_len)? {
            Transfer::Done => {}
            Transfer::Deferred => return Err(DeviceError::Unsupported("deferred fifo transfer")),
        }
    }
    Ok(())
}

fn settle(req: Request, result: DeviceResult<Transfer>) -> Performed {
    match req.into_completion() {
        None => {
            if let Err(err) = result {
                warn!("backend failed after taking its completion token: {err}");
            }
            Performed::Deferred
        }
        Some(token) => match result {
            Ok(Transfer::Done) => Performed::Finished(Ok(()), token),
            Ok(Transfer::Deferred) => Performed::Finished(
                Err(DeviceError::Unsupported("deferred completion without a token")),
                token,
            ),
            Err(err) => Performed::Finished(Err(err), token),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_layout_touches_one_element_of_device_space() {
        let layout = Layout {
            offset: 8,
            elem_len: 2,
            count: 6,
            fifo: true,
        };
        assert_eq!(layout.len(), 12, "host buffer holds every step");
        assert_eq!(layout.span(), 2, "device sees one register");
    }

    #[test]
    fn fifo_steps_stop_at_first_failure() {
        let layout = Layout {
            offset: 0,
            elem_len: 1,
            count: 4,
            fifo: true,
        };
        let mut seen = Vec::new();
        let result = fifo_steps(layout, |at| {
            seen.push(at);
            if at == 2 {
                Err(DeviceError::Unavailable("gone".into()))
            } else {
                Ok(Transfer::Done)
            }
        });
        assert!(result.is_err());
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
