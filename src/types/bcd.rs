//! Packed BCD, one decimal digit per nibble, most significant nibble first.

/// Decode packed BCD. Nibbles above 9 are not rejected: each nibble contributes its low four
/// bits at its digit position, so `0x1A` decodes to 20.
pub fn bcd_to_binary(bcd: u64) -> u64 {
    let mut value = 0u64;
    let mut scale = 1u64;
    let mut rest = bcd;
    while rest != 0 {
        value = value.wrapping_add((rest & 0xF).wrapping_mul(scale));
        rest >>= 4;
        scale = scale.wrapping_mul(10);
    }
    value
}

/// Encode as packed BCD. Digits beyond the sixteenth are dropped.
pub fn binary_to_bcd(value: u64) -> u64 {
    let mut bcd = 0u64;
    let mut rest = value;
    let mut shift = 0u32;
    while rest != 0 && shift < 64 {
        bcd |= (rest % 10) << shift;
        rest /= 10;
        shift += 4;
    }
    bcd
}
