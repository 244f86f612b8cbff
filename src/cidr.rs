//! IPv4 and IPv6 prefixes in a single map.
//!
//! [`CidrTrie`] owns one 32-bit and one 128-bit [`Trie`] and routes every
//! call by the address family of the [`Cidr`] it is given. IPv4-mapped IPv6
//! addresses are IPv6 as far as routing is concerned.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::ControlFlow;

use log::trace;

use crate::error::{Error, Result};
use crate::key::BitKey;
use crate::trie::{self, Trie};

// =============================================================================
// Cidr
// =============================================================================

/// An address and the number of leading bits that are significant.
///
/// Host bits past the prefix length are kept as given.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Cidr {
    addr: IpAddr,
    prefix_len: u8,
}

impl Cidr {
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self> {
        let max_bits = max_prefix_len(&addr);
        if prefix_len > max_bits {
            return Err(Error::PrefixTooLong {
                prefix_len: u32::from(prefix_len),
                max_bits: u32::from(max_bits),
            });
        }
        Ok(Self { addr, prefix_len })
    }

    /// A prefix covering exactly one address.
    pub fn host(addr: IpAddr) -> Self {
        Self {
            addr,
            prefix_len: max_prefix_len(&addr),
        }
    }

    #[inline]
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    #[inline]
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// 32 for IPv4, 128 for IPv6.
    #[inline]
    pub fn max_prefix_len(&self) -> u8 {
        max_prefix_len(&self.addr)
    }

    #[inline]
    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    #[inline]
    pub fn is_ipv6(&self) -> bool {
        self.addr.is_ipv6()
    }

    // Only called with lengths read back from a trie of the matching family.
    fn from_parts(addr: IpAddr, prefix_len: u32) -> Self {
        debug_assert!(prefix_len <= u32::from(max_prefix_len(&addr)));
        Self {
            addr,
            prefix_len: prefix_len as u8,
        }
    }
}

#[inline]
fn max_prefix_len(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => <Ipv4Addr as BitKey>::BITS as u8,
        IpAddr::V6(_) => <Ipv6Addr as BitKey>::BITS as u8,
    }
}

impl From<IpAddr> for Cidr {
    fn from(addr: IpAddr) -> Self {
        Self::host(addr)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

// =============================================================================
// CidrTrie
// =============================================================================

/// Longest-prefix-match map over both IP families.
///
/// ```rust
/// use std::net::IpAddr;
/// use bitlpm::{Cidr, CidrTrie};
///
/// let net = |s: &str, len| Cidr::new(s.parse::<IpAddr>().unwrap(), len).unwrap();
///
/// let mut t = CidrTrie::new();
/// t.upsert(net("10.0.0.0", 8), "v4");
/// t.upsert(net("fd00::", 8), "v6");
///
/// assert_eq!(t.lookup(&net("10.1.2.3", 32)), Some(&"v4"));
/// assert_eq!(t.lookup(&net("fd00::1", 128)), Some(&"v6"));
/// assert_eq!(t.len(), 2);
/// ```
#[derive(Clone)]
pub struct CidrTrie<V> {
    v4: Trie<Ipv4Addr, V>,
    v6: Trie<Ipv6Addr, V>,
}

impl<V> CidrTrie<V> {
    pub fn new() -> Self {
        Self {
            v4: Trie::default(),
            v6: Trie::default(),
        }
    }

    /// Total number of IPv4 and IPv6 prefixes.
    #[inline]
    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    pub fn clear(&mut self) {
        self.v4.clear();
        self.v6.clear();
    }

    /// Add or update the value for `cidr`, returning the value it replaced.
    pub fn upsert(&mut self, cidr: Cidr, value: V) -> Option<V> {
        trace!("upsert {cidr}");
        let len = u32::from(cidr.prefix_len);
        match cidr.addr {
            IpAddr::V4(addr) => self.v4.upsert_unchecked(len, addr, value),
            IpAddr::V6(addr) => self.v6.upsert_unchecked(len, addr, value),
        }
    }

    /// Value of the most specific prefix containing the address of `cidr`.
    ///
    /// Only the address matters; the declared prefix length is ignored.
    pub fn lookup(&self, cidr: &Cidr) -> Option<&V> {
        match cidr.addr {
            IpAddr::V4(addr) => self.v4.lookup(&addr),
            IpAddr::V6(addr) => self.v6.lookup(&addr),
        }
    }

    /// Like [`CidrTrie::lookup`], but also returns the matching prefix.
    pub fn longest_prefix_match(&self, cidr: &Cidr) -> Option<(Cidr, &V)> {
        match cidr.addr {
            IpAddr::V4(addr) => self
                .v4
                .longest_prefix_match(&addr)
                .map(|(len, k, v)| (Cidr::from_parts(IpAddr::V4(*k), len), v)),
            IpAddr::V6(addr) => self
                .v6
                .longest_prefix_match(&addr)
                .map(|(len, k, v)| (Cidr::from_parts(IpAddr::V6(*k), len), v)),
        }
    }

    /// Value stored for exactly `cidr`.
    pub fn exact_lookup(&self, cidr: &Cidr) -> Option<&V> {
        let len = u32::from(cidr.prefix_len);
        match cidr.addr {
            IpAddr::V4(addr) => self.v4.exact_lookup(len, &addr),
            IpAddr::V6(addr) => self.v6.exact_lookup(len, &addr),
        }
    }

    /// Stored prefixes containing `cidr`, least specific first.
    pub fn ancestors(&self, cidr: &Cidr) -> Entries<'_, V> {
        let len = u32::from(cidr.prefix_len);
        match cidr.addr {
            IpAddr::V4(addr) => Entries::Ancestors4(self.v4.ancestors(len, &addr)),
            IpAddr::V6(addr) => Entries::Ancestors6(self.v6.ancestors(len, &addr)),
        }
    }

    /// Call `visit` for every stored prefix containing `cidr`, least specific
    /// first, until it breaks.
    pub fn path<F>(&self, cidr: &Cidr, mut visit: F)
    where
        F: FnMut(Cidr, &V) -> ControlFlow<()>,
    {
        for (prefix, value) in self.ancestors(cidr) {
            if visit(prefix, value).is_break() {
                return;
            }
        }
    }

    /// Stored prefixes contained in `cidr`, `cidr` itself included.
    pub fn descendants(&self, cidr: &Cidr) -> Entries<'_, V> {
        let len = u32::from(cidr.prefix_len);
        match cidr.addr {
            IpAddr::V4(addr) => Entries::Subtree4(self.v4.descendants(len, &addr)),
            IpAddr::V6(addr) => Entries::Subtree6(self.v6.descendants(len, &addr)),
        }
    }

    /// Remove `cidr`, returning its value if it was stored.
    pub fn delete(&mut self, cidr: &Cidr) -> Option<V> {
        let len = u32::from(cidr.prefix_len);
        let removed = match cidr.addr {
            IpAddr::V4(addr) => self.v4.delete_unchecked(len, &addr),
            IpAddr::V6(addr) => self.v6.delete_unchecked(len, &addr),
        };
        trace!("delete {cidr}: found={}", removed.is_some());
        removed
    }

    /// Every stored prefix: IPv4 in key order, then IPv6 in key order.
    pub fn iter(&self) -> impl Iterator<Item = (Cidr, &V)> + '_ {
        Entries::Subtree4(self.v4.iter()).chain(Entries::Subtree6(self.v6.iter()))
    }
}

impl<V> Default for CidrTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: fmt::Debug> fmt::Debug for CidrTrie<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(c, v)| (DisplayAsDebug(c), v)))
            .finish()
    }
}

struct DisplayAsDebug(Cidr);

impl fmt::Debug for DisplayAsDebug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Entries of one family, translated back to [`Cidr`].
pub enum Entries<'a, V> {
    Ancestors4(trie::Ancestors<'a, Ipv4Addr, V>),
    Ancestors6(trie::Ancestors<'a, Ipv6Addr, V>),
    Subtree4(trie::Iter<'a, Ipv4Addr, V>),
    Subtree6(trie::Iter<'a, Ipv6Addr, V>),
}

impl<'a, V> Iterator for Entries<'a, V> {
    type Item = (Cidr, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let (len, addr, value) = match self {
            Entries::Ancestors4(it) => it.next().map(|(l, k, v)| (l, IpAddr::V4(*k), v))?,
            Entries::Ancestors6(it) => it.next().map(|(l, k, v)| (l, IpAddr::V6(*k), v))?,
            Entries::Subtree4(it) => it.next().map(|(l, k, v)| (l, IpAddr::V4(*k), v))?,
            Entries::Subtree6(it) => it.next().map(|(l, k, v)| (l, IpAddr::V6(*k), v))?,
        };
        Some((Cidr::from_parts(addr, len), value))
    }
}
