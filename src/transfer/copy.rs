//! Generic element copy. Widths of 1, 2, 4 or 8 bytes on buffers aligned to that width take a
//! fixed-width path selected by `(mask present, swap requested)`. Any other width, or a
//! misaligned buffer, is decomposed into the widest machine word dividing the element width.
//!
//! The mask covers one element and is given in source byte order; it is reused for every
//! element. Bits set in the mask are taken from the source, clear bits keep the destination.
use super::word::SwapWord;
use crate::error::{DeviceError, DeviceResult};

/// Copy `count` elements of `elem_len` bytes from `src` to `dst`.
pub fn copy(
    elem_len: usize,
    count: usize,
    src: &[u8],
    dst: &mut [u8],
    mask: Option<&[u8]>,
    swap: bool,
) -> DeviceResult<()> {
    let total = elem_len.checked_mul(count).ok_or(DeviceError::BufferTooSmall {
        needed: usize::MAX,
        actual: src.len(),
    })?;
    if total == 0 {
        return Ok(());
    }
    ensure_len(src.len(), total)?;
    ensure_len(dst.len(), total)?;
    let mask = match mask {
        Some(mask) => {
            ensure_len(mask.len(), elem_len)?;
            Some(&mask[..elem_len])
        }
        None => None,
    };
    let src = &src[..total];
    let dst = &mut dst[..total];

    if is_fixed_width(elem_len, src, dst, mask) {
        match elem_len {
            1 => fixed::<u8>(src, dst, mask, swap),
            2 => fixed::<u16>(src, dst, mask, swap),
            4 => fixed::<u32>(src, dst, mask, swap),
            _ => fixed::<u64>(src, dst, mask, swap),
        }
    } else {
        match elem_len % 8 {
            0 => split::<u64>(elem_len, src, dst, mask, swap),
            4 => split::<u32>(elem_len, src, dst, mask, swap),
            2 | 6 => split::<u16>(elem_len, src, dst, mask, swap),
            _ => split::<u8>(elem_len, src, dst, mask, swap),
        }
    }
    Ok(())
}

#[inline]
fn ensure_len(actual: usize, needed: usize) -> DeviceResult<()> {
    if actual < needed {
        return Err(DeviceError::BufferTooSmall { needed, actual });
    }
    Ok(())
}

fn is_fixed_width(elem_len: usize, src: &[u8], dst: &[u8], mask: Option<&[u8]>) -> bool {
    if !matches!(elem_len, 1 | 2 | 4 | 8) {
        return false;
    }
    let aligned = |ptr: *const u8| (ptr as usize) % elem_len == 0;
    aligned(src.as_ptr()) && aligned(dst.as_ptr()) && mask.is_none_or(|m| aligned(m.as_ptr()))
}

fn fixed<W: SwapWord>(src: &[u8], dst: &mut [u8], mask: Option<&[u8]>, swap: bool) {
    let pairs = src.chunks_exact(W::BYTES).zip(dst.chunks_exact_mut(W::BYTES));
    match (mask.map(W::load), swap) {
        (None, false) => {
            for (s, d) in pairs {
                W::load(s).store(d);
            }
        }
        (None, true) => {
            for (s, d) in pairs {
                W::load(s).swapped().store(d);
            }
        }
        (Some(mask), false) => {
            for (s, d) in pairs {
                W::load(s).merge(W::load(d), mask).store(d);
            }
        }
        (Some(mask), true) => {
            let mask = mask.swapped();
            for (s, d) in pairs {
                W::load(s).swapped().merge(W::load(d), mask).store(d);
            }
        }
    }
}

fn split<W: SwapWord>(
    elem_len: usize,
    src: &[u8],
    dst: &mut [u8],
    mask: Option<&[u8]>,
    swap: bool,
) {
    let parts = elem_len / W::BYTES;
    for (s_elem, d_elem) in src.chunks_exact(elem_len).zip(dst.chunks_exact_mut(elem_len)) {
        for part in 0..parts {
            // A swapped element is written in reverse word order, each word byte-swapped.
            let from = if swap { parts - 1 - part } else { part };
            let src_at = from * W::BYTES;
            let dst_at = part * W::BYTES;
            let mut value = W::load(&s_elem[src_at..]);
            if swap {
                value = value.swapped();
            }
            let d = &mut d_elem[dst_at..dst_at + W::BYTES];
            let out = match mask {
                Some(mask) => {
                    let mut m = W::load(&mask[src_at..]);
                    if swap {
                        m = m.swapped();
                    }
                    value.merge(W::load(d), m)
                }
                None => value,
            };
            out.store(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_copy_moves_every_element() {
        let src = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut dst = [0u8; 8];
        copy(2, 4, &src, &mut dst, None, false).expect("copy");
        assert_eq!(dst, src);
    }

    #[test]
    fn swap_reverses_within_each_element() {
        let src = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut dst = [0u8; 8];
        copy(4, 2, &src, &mut dst, None, true).expect("copy");
        assert_eq!(dst, [4, 3, 2, 1, 8, 7, 6, 5]);
    }

    #[test]
    fn odd_width_swap_reverses_whole_element() {
        let src = [1u8, 2, 3, 4, 5, 6];
        let mut dst = [0u8; 6];
        copy(3, 2, &src, &mut dst, None, true).expect("copy");
        assert_eq!(dst, [3, 2, 1, 6, 5, 4], "3-byte elements swap as a unit");
    }

    #[test]
    fn wide_element_swap_reverses_word_order() {
        let src: Vec<u8> = (0..16).collect();
        let mut dst = [0u8; 16];
        copy(16, 1, &src, &mut dst, None, true).expect("copy");
        let expected: Vec<u8> = (0..16).rev().collect();
        assert_eq!(dst.to_vec(), expected, "16-byte element should be fully reversed");
    }

    #[test]
    fn masked_copy_preserves_destination_bits() {
        let src = [0xFFu8, 0xFF];
        let mut dst = [0x00u8, 0xAA];
        let mask = [0x0Fu8, 0x00];
        copy(2, 1, &src, &mut dst, Some(&mask), false).expect("copy");
        assert_eq!(dst, [0x0F, 0xAA]);
    }

    #[test]
    fn masked_swap_applies_mask_in_source_order() {
        let src = [0x12u8, 0x34];
        let mut dst = [0xEEu8, 0xEE];
        // Keep only the first source byte; after the swap it lands in the last slot.
        let mask = [0xFFu8, 0x00];
        copy(2, 1, &src, &mut dst, Some(&mask), true).expect("copy");
        assert_eq!(dst, [0xEE, 0x12]);
    }

    #[test]
    fn misaligned_buffers_take_the_decomposed_path() {
        let backing = [0u8, 0x11, 0x22, 0x33, 0x44];
        let mut dst = [0u8; 5];
        copy(4, 1, &backing[1..], &mut dst[1..], None, true).expect("copy");
        assert_eq!(&dst[1..], &[0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let src = [0u8; 3];
        let mut dst = [0u8; 4];
        let err = copy(4, 1, &src, &mut dst, None, false).expect_err("source too short");
        assert_eq!(err, DeviceError::BufferTooSmall { needed: 4, actual: 3 });
    }

    #[test]
    fn zero_count_is_a_no_op() {
        let mut dst = [7u8; 2];
        copy(2, 0, &[], &mut dst, None, true).expect("empty copy");
        assert_eq!(dst, [7, 7]);
    }
}
