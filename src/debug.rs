//! Interactive inspection helpers that bypass client descriptors: a hex dump of any device range
//! and a single-element poke. Both run synchronously under the device lock.
use std::fmt::Write as _;

use smallvec::SmallVec;

use crate::{
    device::{Device, Priority, Request, Transfer},
    error::{DeviceError, RegDevError, RegDevResult},
};

const ROW_BYTES: usize = 16;
const CLIENT: &str = "debug";

fn check_width(width: usize) -> RegDevResult<()> {
    if matches!(width, 1 | 2 | 4 | 8) {
        Ok(())
    } else {
        Err(RegDevError::BadArgument {
            client: CLIENT.into(),
            reason: format!("element width {width} is not 1, 2, 4 or 8"),
        })
    }
}

/// Byte length of `count` elements and the checked start offset.
fn span(
    device: &Device,
    offset: usize,
    width: usize,
    count: usize,
) -> RegDevResult<(usize, usize)> {
    let len = width
        .checked_mul(count)
        .ok_or_else(|| RegDevError::LengthOverflow {
            device: device.name().to_string(),
            elem_len: width,
            count,
        })?;
    let start = i64::try_from(offset).map_err(|_| RegDevError::BadArgument {
        client: CLIENT.into(),
        reason: format!("offset {offset:#x} out of range"),
    })?;
    Ok((device.check_range(start, len)?, len))
}

fn synchronous(device: &Device, result: Result<Transfer, DeviceError>) -> RegDevResult<()> {
    match result {
        Ok(Transfer::Done) => Ok(()),
        Ok(Transfer::Deferred) => Err(RegDevError::device(
            device.name(),
            DeviceError::Unsupported("deferred debug access"),
        )),
        Err(err) => Err(RegDevError::device(device.name(), err)),
    }
}

/// Read `count` elements of `width` bytes at `offset` and render them in rows of 16 bytes:
/// address, elements in hex (host order), then the bytes as ASCII.
pub fn dump(device: &Device, offset: usize, width: usize, count: usize) -> RegDevResult<String> {
    check_width(width)?;
    let (offset, len) = span(device, offset, width, count)?;
    let mut buf = vec![0u8; len];
    let result = device.with_lock(|backend| {
        let mut req = Request::new(offset, width, count, Priority::High);
        backend.read(&mut req, &mut buf)
    });
    synchronous(device, result)?;

    let mut out = String::new();
    for (row, chunk) in buf.chunks(ROW_BYTES).enumerate() {
        let _ = write!(out, "{:08x}:", offset + row * ROW_BYTES);
        for element in chunk.chunks(width) {
            let _ = write!(out, " {}", read_hex(element));
        }
        let missing = (ROW_BYTES - chunk.len()) / width;
        out.extend(std::iter::repeat_n(' ', missing * (width * 2 + 1)));
        let _ = writeln!(out, "  |{}|", read_ascii(chunk));
    }
    Ok(out)
}

/// Write the low `width` bytes of `value` as one host-order element at `offset`.
pub fn poke(device: &Device, offset: usize, width: usize, value: u64) -> RegDevResult<()> {
    check_width(width)?;
    let (offset, _) = span(device, offset, width, 1)?;
    let data: SmallVec<[u8; 8]> = match width {
        1 => SmallVec::from_slice(&(value as u8).to_ne_bytes()),
        2 => SmallVec::from_slice(&(value as u16).to_ne_bytes()),
        4 => SmallVec::from_slice(&(value as u32).to_ne_bytes()),
        _ => SmallVec::from_slice(&value.to_ne_bytes()),
    };
    let result = device.with_lock(|backend| {
        let mut req = Request::new(offset, width, 1, Priority::High);
        backend.write(&mut req, &data, None)
    });
    synchronous(device, result)
}

/// Host-order element value in hex, as wide as the element.
fn read_hex(element: &[u8]) -> String {
    let mut raw = [0u8; 8];
    let len = element.len().min(8);
    let value = if cfg!(target_endian = "little") {
        raw[..len].copy_from_slice(&element[..len]);
        u64::from_le_bytes(raw)
    } else {
        raw[8 - len..].copy_from_slice(&element[..len]);
        u64::from_be_bytes(raw)
    };
    format!("{value:0width$x}", width = len * 2)
}

fn read_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
        .collect()
}
