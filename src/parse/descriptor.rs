//! The per-client binding produced by the parser and consumed by the dispatcher.
use std::{fmt, sync::Arc, time::Duration};

use super::{
    expr::ExprProgram,
    links::{LinkError, OffsetSource, SourceContext},
};
use crate::{
    device::{DeviceHandle, Priority},
    dispatch::{Reprocess, Transaction, TxnState},
    error::{RegDevError, RegDevResult, Status},
    types::{DataType, LinearScale, RawBounds, effective_mask},
};

/// Offset recomputed from another client's value on every request.
pub struct LinkedOffset {
    name: String,
    source: Arc<dyn OffsetSource>,
    program: ExprProgram,
}

impl LinkedOffset {
    pub(super) fn new(name: String, source: Arc<dyn OffsetSource>, program: ExprProgram) -> Self {
        Self {
            name,
            source,
            program,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &ExprProgram {
        &self.program
    }

    /// `value * scale + constant`; may be negative, which the range check rejects. Results
    /// beyond `i64` saturate, which the range check rejects as well.
    pub fn evaluate(&self) -> Result<i64, LinkError> {
        let value = self.program.evaluate(&mut SourceContext(self.source.as_ref()))?;
        Ok(i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX }))
    }
}

pub enum Offset {
    Fixed(usize),
    Linked(LinkedOffset),
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Offset::Fixed(offset) => write!(f, "{offset:#x}"),
            Offset::Linked(link) => write!(f, "'{}'", link.name),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Packing {
    #[default]
    None,
    /// `n` consecutive elements move as one transfer unit.
    Array(usize),
    /// Each element is streamed through the same offset in `n` pieces.
    Fifo(usize),
}

pub struct Descriptor {
    pub(super) client: String,
    pub(super) device: DeviceHandle,
    pub(super) offset: Offset,
    pub(super) init_offset: Option<usize>,
    pub(super) data_type: DataType,
    pub(super) dlen: usize,
    pub(super) bit: Option<u32>,
    pub(super) invert: u64,
    pub(super) bounds: Option<RawBounds>,
    pub(super) packing: Packing,
    pub(super) update: Option<Duration>,
    pub(super) priority: Priority,
    pub(crate) txn: Transaction,
}

impl Descriptor {
    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    pub fn offset(&self) -> &Offset {
        &self.offset
    }

    pub fn init_offset(&self) -> Option<usize> {
        self.init_offset
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Element length in bytes.
    pub fn dlen(&self) -> usize {
        self.dlen
    }

    pub fn bit(&self) -> Option<u32> {
        self.bit
    }

    pub fn invert(&self) -> u64 {
        self.invert
    }

    pub fn bounds(&self) -> Option<RawBounds> {
        self.bounds
    }

    pub fn packing(&self) -> Packing {
        self.packing
    }

    pub fn update_period(&self) -> Option<Duration> {
        self.update
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// Install the client's notification hook for asynchronous completions.
    pub fn set_reprocess(&self, notify: Arc<dyn Reprocess>) {
        self.txn.set_reprocess(notify);
    }

    pub fn txn_state(&self) -> TxnState {
        self.txn.state()
    }

    pub fn last_status(&self) -> Status {
        self.txn.last_status()
    }

    /// Bit mask implied by `B=`, collapsed when it covers the element.
    pub fn mask(&self) -> Option<u64> {
        effective_mask(self.bit.map(|bit| 1u64 << bit), self.dlen.min(8))
    }

    /// Linear scaling between the raw bounds and `[eng_low, eng_high]`. Floats and strings are
    /// never scaled.
    pub fn scale(&self, eng_low: f64, eng_high: f64) -> Option<LinearScale> {
        if !self.data_type.is_integral() {
            return None;
        }
        LinearScale::new(self.bounds?, eng_low, eng_high)
    }

    /// Offset for the next request. `readback` marks the client's first read during startup,
    /// the only request that goes through the init offset when one was given.
    pub fn resolve_offset(&self, readback: bool) -> RegDevResult<i64> {
        if readback {
            if let Some(init) = self.init_offset {
                return Ok(signed_offset(init));
            }
        }
        match &self.offset {
            Offset::Fixed(offset) => Ok(signed_offset(*offset)),
            Offset::Linked(link) => link.evaluate().map_err(|source| RegDevError::Link {
                client: self.client.clone(),
                source,
            }),
        }
    }
}

// Offsets past `i64::MAX` saturate and fail the range check.
fn signed_offset(offset: usize) -> i64 {
    i64::try_from(offset).unwrap_or(i64::MAX)
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("client", &self.client)
            .field("device", &self.device.name())
            .field("offset", &self.offset.to_string())
            .field("init_offset", &self.init_offset)
            .field("data_type", &self.data_type)
            .field("dlen", &self.dlen)
            .field("bit", &self.bit)
            .field("invert", &self.invert)
            .field("bounds", &self.bounds)
            .field("packing", &self.packing)
            .field("update", &self.update)
            .field("priority", &self.priority)
            .field("txn", &self.txn)
            .finish()
    }
}
