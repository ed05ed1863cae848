//! Utility functions and data structures
//!
//! This module contains small helpers and data structures used
//! throughout the emulator and the kernel side of the VM subsystem.

pub mod bitmap;
pub mod random;

// Re-export commonly used utilities
pub use self::bitmap::Bitmap;
pub use self::random::Lcg;

use num_traits::PrimInt;

/// Utility macros
#[macro_export]
macro_rules! is_aligned {
    ($addr:expr, $align:expr) => {
        $addr % $align == 0
    };
}

/// Divide `n` by `s`, rounding up
#[inline]
pub fn div_round_up<T: PrimInt>(n: T, s: T) -> T {
    if n % s > T::zero() {
        n / s + T::one()
    } else {
        n / s
    }
}
