//! Error types for bitlpm

use thiserror::Error;

/// Result type alias for bitlpm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in bitlpm operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("prefix length {prefix_len} exceeds maximum of {max_bits} bits")]
    PrefixTooLong { prefix_len: u32, max_bits: u32 },

    #[error("trie width of {max_bits} bits exceeds key width of {key_bits} bits")]
    WidthTooLarge { max_bits: u32, key_bits: u32 },
}
