//! Typed single-element access on top of the byte-level dispatcher: raw values, scaled analog
//! values and invert/mask bit patterns.
use smallvec::{SmallVec, smallvec};

use super::{Dispatcher, IoOutcome};
use crate::{
    error::{RegDevError, RegDevResult},
    parse::Descriptor,
    types::{RawValue, apply_read_bits, compose_write_bits, effective_mask},
};

type Scratch = SmallVec<[u8; 16]>;

impl Dispatcher {
    pub fn read_raw(&self, desc: &mut Descriptor) -> RegDevResult<IoOutcome<RawValue>> {
        let mut buf: Scratch = smallvec![0; desc.dlen()];
        match self.read(desc, 1, &mut buf)? {
            IoOutcome::Pending => Ok(IoOutcome::Pending),
            IoOutcome::Ready(()) => RawValue::decode(desc.data_type(), &buf)
                .map(IoOutcome::Ready)
                .map_err(|err| RegDevError::device(desc.device().name(), err)),
        }
    }

    pub fn write_raw(&self, desc: &mut Descriptor, value: &RawValue) -> RegDevResult<IoOutcome<()>> {
        let buf = encode(desc, value)?;
        self.write(desc, 1, &buf, None)
    }

    /// Read and convert to engineering units over `[eng_low, eng_high]`. Types without raw
    /// bounds are returned unscaled.
    pub fn read_analog(
        &self,
        desc: &mut Descriptor,
        eng_low: f64,
        eng_high: f64,
    ) -> RegDevResult<IoOutcome<f64>> {
        let outcome = self.read_raw(desc)?;
        let scale = desc.scale(eng_low, eng_high);
        Ok(outcome.map(|raw| {
            let value = raw.as_f64();
            scale.map_or(value, |scale| scale.to_engineering(value))
        }))
    }

    /// Convert from engineering units, clamp to the raw bounds and write.
    pub fn write_analog(
        &self,
        desc: &mut Descriptor,
        eng_low: f64,
        eng_high: f64,
        value: f64,
    ) -> RegDevResult<IoOutcome<()>> {
        let raw = match desc.scale(eng_low, eng_high) {
            Some(scale) => scale.to_raw(value),
            None => value,
        };
        let value = RawValue::from_f64(desc.data_type(), raw);
        self.write_raw(desc, &value)
    }

    /// Read the element as a bit pattern, inverted and narrowed to `mask` (or the descriptor's
    /// own bit when `mask` is `None`).
    pub fn read_bits(
        &self,
        desc: &mut Descriptor,
        mask: Option<u64>,
    ) -> RegDevResult<IoOutcome<u64>> {
        let mask = bit_mask(desc, mask);
        let invert = desc.invert();
        Ok(self
            .read_raw(desc)?
            .map(|raw| apply_read_bits(raw.to_bits(), invert, mask)))
    }

    /// Write a bit pattern; only the bits in the effective mask change on the device.
    pub fn write_bits(
        &self,
        desc: &mut Descriptor,
        value: u64,
        mask: Option<u64>,
    ) -> RegDevResult<IoOutcome<()>> {
        let mask = bit_mask(desc, mask);
        let bits = compose_write_bits(value, desc.invert(), mask);
        let data = encode(desc, &RawValue::from_bits(desc.data_type(), bits))?;
        match mask {
            Some(mask) => {
                let mask = encode(desc, &RawValue::from_bits(desc.data_type(), mask))?;
                self.write(desc, 1, &data, Some(&mask))
            }
            None => self.write(desc, 1, &data, None),
        }
    }
}

fn bit_mask(desc: &Descriptor, mask: Option<u64>) -> Option<u64> {
    match mask {
        Some(mask) => effective_mask(Some(mask), desc.dlen().min(8)),
        None => desc.mask(),
    }
}

fn encode(desc: &Descriptor, value: &RawValue) -> RegDevResult<Scratch> {
    let mut buf: Scratch = smallvec![0; desc.dlen()];
    value
        .encode(&mut buf)
        .map_err(|err| RegDevError::device(desc.device().name(), err))?;
    Ok(buf)
}
