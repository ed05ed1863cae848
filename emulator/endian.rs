//! Conversion between the simulated machine's little-endian byte order and
//! the host's. The conversions are no-ops on little-endian hosts.

cfg_if::cfg_if! {
    if #[cfg(target_endian = "big")] {
        /// Machine word to host order
        #[inline]
        pub fn word_to_host(word: u32) -> u32 {
            word.swap_bytes()
        }

        /// Machine half-word to host order
        #[inline]
        pub fn short_to_host(short: u16) -> u16 {
            short.swap_bytes()
        }
    } else {
        /// Machine word to host order
        #[inline]
        pub fn word_to_host(word: u32) -> u32 {
            word
        }

        /// Machine half-word to host order
        #[inline]
        pub fn short_to_host(short: u16) -> u16 {
            short
        }
    }
}

/// Host word to machine order
#[inline]
pub fn word_to_machine(word: u32) -> u32 {
    word_to_host(word)
}

/// Host half-word to machine order
#[inline]
pub fn short_to_machine(short: u16) -> u16 {
    short_to_host(short)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_order_is_little_endian() {
        // A word stored in machine order must have its low byte first.
        let stored = word_to_machine(0x1122_3344).to_ne_bytes();
        assert_eq!(stored, [0x44, 0x33, 0x22, 0x11]);

        let stored = short_to_machine(0xAABB).to_ne_bytes();
        assert_eq!(stored, [0xBB, 0xAA]);
    }

    #[test]
    fn test_conversions_are_involutions() {
        assert_eq!(word_to_host(word_to_machine(0xDEAD_BEEF)), 0xDEAD_BEEF);
        assert_eq!(short_to_host(short_to_machine(0xBEEF)), 0xBEEF);
    }
}
