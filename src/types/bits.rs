//! Invert/mask logic for bit-level register access.

/// All-ones mask covering `bytes` bytes.
#[inline]
pub fn width_mask(bytes: usize) -> u64 {
    let len = bytes * 8;
    if len >= 64 {
        u64::MAX
    } else {
        (1u64 << len) - 1
    }
}

/// Collapse a mask that covers the whole element into "no mask" (full overwrite).
pub fn effective_mask(mask: Option<u64>, bytes: usize) -> Option<u64> {
    let full = width_mask(bytes);
    match mask {
        Some(mask) if mask & full == full => None,
        Some(mask) => Some(mask & full),
        None => None,
    }
}

/// Read side: invert, then narrow to the mask if one is configured.
#[inline]
pub fn apply_read_bits(raw: u64, invert: u64, mask: Option<u64>) -> u64 {
    let value = raw ^ invert;
    match mask {
        Some(mask) => value & mask,
        None => value,
    }
}

/// Write side: invert, then confine the outgoing value to the mask.
#[inline]
pub fn compose_write_bits(value: u64, invert: u64, mask: Option<u64>) -> u64 {
    let value = value ^ invert;
    match mask {
        Some(mask) => value & mask,
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_width_mask_collapses() {
        assert_eq!(effective_mask(Some(0xFFFF), 2), None);
        assert_eq!(effective_mask(Some(u64::MAX), 8), None);
        assert_eq!(effective_mask(Some(0x0F00), 2), Some(0x0F00));
        assert_eq!(effective_mask(None, 4), None);
    }

    #[test]
    fn read_inverts_before_masking() {
        assert_eq!(apply_read_bits(0b1010, 0b0110, Some(0b0100)), 0b0100);
        assert_eq!(apply_read_bits(0b1010, 0b0110, None), 0b1100);
    }

    #[test]
    fn write_inverts_before_masking() {
        assert_eq!(compose_write_bits(0b0001, 0b0001, Some(0b0001)), 0);
        assert_eq!(compose_write_bits(0b0000, 0b0001, Some(0b0001)), 1);
    }
}
