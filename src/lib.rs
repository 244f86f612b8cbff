//! # bitlpm
//!
//! Longest-prefix-match over bit-string keys.
//!
//! [`Trie`] is a binary trie generic over any [`BitKey`]: insert a value
//! under the first `n` bits of a key, then resolve keys to the most specific
//! stored prefix that covers them. [`CidrTrie`] puts a 32-bit and a 128-bit
//! trie behind one API so IPv4 and IPv6 prefixes can share a map.
//!
//! Neither type locks internally. Callers sharing one across threads wrap it
//! in a `Mutex` or `RwLock`.
//!
//! ## Example
//!
//! ```rust
//! use std::net::IpAddr;
//! use std::ops::ControlFlow;
//! use bitlpm::{Cidr, CidrTrie};
//!
//! let net = |s: &str| {
//!     let (addr, len) = s.split_once('/').unwrap();
//!     Cidr::new(addr.parse::<IpAddr>().unwrap(), len.parse().unwrap()).unwrap()
//! };
//!
//! let mut t = CidrTrie::new();
//! t.upsert(net("0.0.0.0/0"), "world");
//! t.upsert(net("10.0.0.0/8"), "private");
//! t.upsert(net("10.1.0.0/16"), "office");
//!
//! assert_eq!(t.lookup(&net("10.1.4.4/32")), Some(&"office"));
//! assert_eq!(t.lookup(&net("10.9.4.4/32")), Some(&"private"));
//!
//! let mut path = Vec::new();
//! t.path(&net("10.1.4.4/32"), |_, v| {
//!     path.push(*v);
//!     ControlFlow::Continue(())
//! });
//! assert_eq!(path, ["world", "private", "office"]);
//!
//! assert_eq!(t.delete(&net("10.1.0.0/16")), Some("office"));
//! assert_eq!(t.len(), 2);
//! ```

#![deny(unsafe_code)]

mod cidr;
mod error;
mod key;
pub mod trie;

pub use cidr::{Cidr, CidrTrie, Entries};
pub use error::{Error, Result};
pub use key::BitKey;
pub use trie::Trie;

#[cfg(test)]
mod proptests;
