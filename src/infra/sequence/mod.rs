//! Wrap-around generation counters.
//!
//! Records synchronised between the two nodes carry a fixed-width version that
//! rolls over to zero. Two versions are compared with the half-range rule:
//! `new` is newer than `old` iff `(new - old) mod 2^N` lies strictly inside
//! `(0, 2^(N-1))`. Ordinary `<`/`>` must never be used on these values.
//!
//! ```text
//! u8: 0xFE -> 0xFF -> 0x00 -> 0x01
//!     is_newer(0x00, 0xFF) == true
//!     is_newer(0x80, 0x00) == false   (exactly half a turn: ambiguous, not newer)
//! ```

/// Unsigned counter that wraps and compares with the half-range rule.
pub trait VersionCounter: Copy + Eq {
    /// Half of the counter range, `2^(N-1)`.
    const HALF_RANGE: Self;

    /// Advance in place, rolling over to zero, and return the new value.
    fn increment(&mut self) -> Self;

    /// `true` when `new` is strictly ahead of `old` by less than half the range.
    fn is_newer(new: Self, old: Self) -> bool;

    /// Forward distance from `old` to `new`. Only meaningful when
    /// [`is_newer`](Self::is_newer) holds.
    fn distance(new: Self, old: Self) -> Self;
}

macro_rules! impl_version_counter {
    ($($ty:ty),*) => {
        $(
            impl VersionCounter for $ty {
                const HALF_RANGE: Self = 1 << (<$ty>::BITS - 1);

                #[inline]
                fn increment(&mut self) -> Self {
                    *self = self.wrapping_add(1);
                    *self
                }

                #[inline]
                fn is_newer(new: Self, old: Self) -> bool {
                    let diff = new.wrapping_sub(old);
                    diff != 0 && diff < Self::HALF_RANGE
                }

                #[inline]
                fn distance(new: Self, old: Self) -> Self {
                    new.wrapping_sub(old)
                }
            }
        )*
    };
}

impl_version_counter!(u8, u16, u32);

/// Free-function form of [`VersionCounter::is_newer`].
#[inline]
pub fn is_newer<T: VersionCounter>(new: T, old: T) -> bool {
    T::is_newer(new, old)
}

/// Free-function form of [`VersionCounter::distance`].
#[inline]
pub fn distance<T: VersionCounter>(new: T, old: T) -> T {
    T::distance(new, old)
}
