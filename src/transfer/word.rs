use std::mem::size_of;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Endianness::Little
        } else {
            Endianness::Big
        }
    }

    /// True when data stored in this order must be swapped to reach host order.
    #[inline(always)]
    pub fn needs_swap(self) -> bool {
        self != Self::native()
    }
}

/// Fixed-width machine word the transfer engine can load, swap and merge.
pub trait SwapWord: Copy {
    const BYTES: usize;

    fn load(bytes: &[u8]) -> Self;
    fn store(self, out: &mut [u8]);
    fn swapped(self) -> Self;
    /// `(self & mask) | (old & !mask)`
    fn merge(self, old: Self, mask: Self) -> Self;
}

macro_rules! impl_word {
    ($t:ty) => {
        impl SwapWord for $t {
            const BYTES: usize = size_of::<$t>();

            #[inline(always)]
            fn load(bytes: &[u8]) -> Self {
                let mut raw = [0u8; size_of::<$t>()];
                raw.copy_from_slice(&bytes[..size_of::<$t>()]);
                <$t>::from_ne_bytes(raw)
            }

            #[inline(always)]
            fn store(self, out: &mut [u8]) {
                out[..size_of::<$t>()].copy_from_slice(&self.to_ne_bytes());
            }

            #[inline(always)]
            fn swapped(self) -> Self {
                self.swap_bytes()
            }

            #[inline(always)]
            fn merge(self, old: Self, mask: Self) -> Self {
                (self & mask) | (old & !mask)
            }
        }
    };
}

impl_word!(u8);
impl_word!(u16);
impl_word!(u32);
impl_word!(u64);
