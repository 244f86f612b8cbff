//! Bit-addressable keys.
//!
//! Bit `0` is the most significant bit of the first byte. Neither operation
//! knows about prefix lengths: callers bound comparisons themselves.

use std::net::{Ipv4Addr, Ipv6Addr};

/// A fixed-width key the trie can branch on.
pub trait BitKey: Copy + Eq {
    /// Number of addressable bits.
    const BITS: u32;

    /// Returns the bit at `idx` as `0` or `1`.
    ///
    /// # Panics
    /// Panics if `idx >= Self::BITS`.
    fn bit_at(&self, idx: u32) -> u8;

    /// Number of leading bits shared with `other`, in `0..=Self::BITS`.
    fn common_prefix_len(&self, other: &Self) -> u32;
}

// =============================================================================
// Byte arrays
// =============================================================================

impl<const N: usize> BitKey for [u8; N] {
    const BITS: u32 = (N as u32) * 8;

    #[inline]
    fn bit_at(&self, idx: u32) -> u8 {
        assert!(idx < Self::BITS, "bit index {idx} out of range for {N}-byte key");
        let byte = self[(idx / 8) as usize];
        (byte >> (7 - idx % 8)) & 1
    }

    #[inline]
    fn common_prefix_len(&self, other: &Self) -> u32 {
        let mut out = 0;
        for (a, b) in self.iter().zip(other.iter()) {
            let lz = (a ^ b).leading_zeros();
            out += lz;
            if lz != 8 {
                break;
            }
        }
        out
    }
}

// =============================================================================
// IP addresses
// =============================================================================

impl BitKey for Ipv4Addr {
    const BITS: u32 = 32;

    #[inline]
    fn bit_at(&self, idx: u32) -> u8 {
        assert!(idx < Self::BITS, "bit index {idx} out of range for IPv4 address");
        ((u32::from(*self) >> (31 - idx)) & 1) as u8
    }

    #[inline]
    fn common_prefix_len(&self, other: &Self) -> u32 {
        (u32::from(*self) ^ u32::from(*other)).leading_zeros()
    }
}

impl BitKey for Ipv6Addr {
    const BITS: u32 = 128;

    #[inline]
    fn bit_at(&self, idx: u32) -> u8 {
        assert!(idx < Self::BITS, "bit index {idx} out of range for IPv6 address");
        ((u128::from(*self) >> (127 - idx)) & 1) as u8
    }

    #[inline]
    fn common_prefix_len(&self, other: &Self) -> u32 {
        (u128::from(*self) ^ u128::from(*other)).leading_zeros()
    }
}
