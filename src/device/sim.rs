//! Pure-simulation backend: a byte buffer with a declared endianness.
//!
//! Stored bytes are in device order; request buffers are in host order, so every transfer goes
//! through the byte transfer engine with `swap` set when the two differ. In deferred mode each
//! request that carries a completion token is finished from a helper thread.
use std::{fmt, thread};

use log::trace;

use super::{Backend, Request, ScanTrigger, Transfer};
use crate::{
    error::{DeviceError, DeviceResult},
    transfer::{self, Endianness},
};

pub struct SimMemory {
    bytes: Vec<u8>,
    endian: Endianness,
    deferred: bool,
    trigger: ScanTrigger,
}

impl SimMemory {
    pub fn new(len: usize, endian: Endianness) -> Self {
        Self {
            bytes: vec![0_u8; len],
            endian,
            deferred: false,
            trigger: ScanTrigger::new(),
        }
    }

    /// Complete requests asynchronously whenever the caller can accept it.
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// Preload raw device-order bytes at `offset`. Fails when `data` does not fit.
    pub fn with_bytes(mut self, offset: usize, data: &[u8]) -> DeviceResult<Self> {
        let capacity = self.bytes.len();
        let range = offset
            .checked_add(data.len())
            .filter(|&end| end <= capacity)
            .map(|end| offset..end)
            .ok_or(DeviceError::OutOfRange {
                offset,
                len: data.len(),
                capacity,
            })?;
        self.bytes[range].copy_from_slice(data);
        Ok(self)
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline(always)]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn trigger(&self) -> ScanTrigger {
        self.trigger.clone()
    }

    fn span(&self, req: &Request) -> DeviceResult<std::ops::Range<usize>> {
        let len = req.len();
        match req.offset.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(req.offset..end),
            _ => Err(DeviceError::OutOfRange {
                offset: req.offset,
                len,
                capacity: self.bytes.len(),
            }),
        }
    }
}

impl Backend for SimMemory {
    fn report(&self, level: u32, out: &mut dyn fmt::Write) -> DeviceResult<()> {
        let order = match self.endian {
            Endianness::Little => "little",
            Endianness::Big => "big",
        };
        let mode = if self.deferred { "deferred" } else { "immediate" };
        let _ = writeln!(out, "simulated {} bytes, {order} endian, {mode}", self.len());
        if level > 1 {
            for (row, chunk) in self.bytes.chunks(16).enumerate() {
                let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
                let _ = writeln!(out, "{:04x}: {}", row * 16, hex.join(" "));
            }
        }
        Ok(())
    }

    fn input_trigger(&mut self, _offset: usize) -> Option<ScanTrigger> {
        Some(self.trigger.clone())
    }

    fn output_trigger(&mut self, _offset: usize) -> Option<ScanTrigger> {
        Some(self.trigger.clone())
    }

    fn read(&mut self, req: &mut Request, buf: &mut [u8]) -> DeviceResult<Transfer> {
        let span = self.span(req)?;
        trace!("sim read {} x {} at {:#x}", req.count, req.elem_len, req.offset);
        let swap = self.endian.needs_swap();
        if self.deferred {
            if let Some(token) = req.defer() {
                let mut data = vec![0u8; span.len()];
                let result = transfer::copy(
                    req.elem_len,
                    req.count,
                    &self.bytes[span],
                    &mut data,
                    None,
                    swap,
                );
                thread::spawn(move || token.complete_read(result, data));
                return Ok(Transfer::Deferred);
            }
        }
        transfer::copy(req.elem_len, req.count, &self.bytes[span], buf, None, swap)?;
        Ok(Transfer::Done)
    }

    fn write(
        &mut self,
        req: &mut Request,
        data: &[u8],
        mask: Option<&[u8]>,
    ) -> DeviceResult<Transfer> {
        let span = self.span(req)?;
        trace!("sim write {} x {} at {:#x}", req.count, req.elem_len, req.offset);
        let swap = self.endian.needs_swap();
        let result = transfer::copy(
            req.elem_len,
            req.count,
            data,
            &mut self.bytes[span],
            mask,
            swap,
        );
        if result.is_ok() && !req.is_empty() {
            self.trigger.fire();
        }
        if self.deferred {
            if let Some(token) = req.defer() {
                thread::spawn(move || token.complete(result));
                return Ok(Transfer::Deferred);
            }
        }
        result.map(|()| Transfer::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Priority;

    #[test]
    fn big_endian_storage_is_swapped_to_host_order() {
        let mut sim = SimMemory::new(8, Endianness::Big)
            .with_bytes(0, &[0x12, 0x34])
            .expect("preload");
        let mut req = Request::new(0, 2, 1, Priority::Low);
        let mut buf = [0u8; 2];
        assert_eq!(sim.read(&mut req, &mut buf), Ok(Transfer::Done));
        assert_eq!(u16::from_ne_bytes(buf), 0x1234);
    }

    #[test]
    fn masked_write_keeps_unmasked_bits() {
        let mut sim = SimMemory::new(2, Endianness::native())
            .with_bytes(0, &[0xF0, 0x0F])
            .expect("preload");
        let mut req = Request::new(0, 2, 1, Priority::Low);
        let data = 0xFFFFu16.to_ne_bytes();
        let mask = 0x00FFu16.to_ne_bytes();
        sim.write(&mut req, &data, Some(&mask)).expect("write");
        let before = u16::from_ne_bytes([0xF0, 0x0F]);
        let after = u16::from_ne_bytes([sim.bytes()[0], sim.bytes()[1]]);
        assert_eq!(after, (before & 0xFF00) | 0x00FF, "only masked bits change");
    }

    #[test]
    fn out_of_range_requests_fail() {
        let mut sim = SimMemory::new(4, Endianness::Little);
        let mut req = Request::new(2, 4, 1, Priority::Low);
        let mut buf = [0u8; 4];
        assert!(matches!(
            sim.read(&mut req, &mut buf),
            Err(DeviceError::OutOfRange { offset: 2, len: 4, capacity: 4 })
        ));
    }

    #[test]
    fn preload_outside_the_buffer_is_an_error() {
        let result = SimMemory::new(4, Endianness::Little).with_bytes(3, &[1, 2]);
        assert!(matches!(
            result,
            Err(DeviceError::OutOfRange { offset: 3, len: 2, capacity: 4 })
        ));
        assert!(SimMemory::new(4, Endianness::Little).with_bytes(usize::MAX, &[1]).is_err());
    }

    #[test]
    fn writes_fire_the_scan_trigger() {
        let mut sim = SimMemory::new(4, Endianness::Little);
        let events = sim.input_trigger(0).expect("sim supports triggers").subscribe();
        let mut req = Request::new(0, 1, 1, Priority::Low);
        sim.write(&mut req, &[1], None).expect("write");
        assert!(events.try_recv().is_ok(), "write should fire the trigger");
    }
}
