//! Binary trie keyed by bit prefixes.
//!
//! Every node stands for the first `prefix_len` bits of its key. Nodes that
//! carry no value only exist where two stored prefixes diverge, so the node
//! count tracks the entry count rather than the key width.

use std::fmt;
use std::ops::{ControlFlow, Index, IndexMut};

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::key::BitKey;

// =============================================================================
// Node arena
// =============================================================================

/// Index of a node in the arena. `NULL` marks an empty slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct NodeRef(u32);

impl NodeRef {
    const NULL: NodeRef = NodeRef(u32::MAX);

    #[inline]
    fn is_null(self) -> bool {
        self == Self::NULL
    }

    #[inline]
    fn idx(self) -> usize {
        debug_assert!(!self.is_null());
        self.0 as usize
    }
}

/// A parent node and the child slot that was followed out of it.
type Slot = (NodeRef, usize);

#[derive(Clone)]
struct Node<K, V> {
    /// Number of leading key bits this node represents.
    prefix_len: u32,
    key: K,
    /// `None` on branch nodes created at a divergence point.
    value: Option<V>,
    children: [NodeRef; 2],
}

impl<K: BitKey, V> Node<K, V> {
    fn new(prefix_len: u32, key: K, value: Option<V>) -> Self {
        Self {
            prefix_len,
            key,
            value,
            children: [NodeRef::NULL; 2],
        }
    }

    /// Bits shared by `key` and this node, bounded by both prefix lengths.
    #[inline]
    fn prefix_match(&self, prefix_len: u32, key: &K) -> u32 {
        key.common_prefix_len(&self.key)
            .min(self.prefix_len)
            .min(prefix_len)
    }
}

/// Node storage with a free list. Slots of removed nodes are reused by later
/// insertions.
#[derive(Clone)]
struct NodeArena<K, V> {
    nodes: Vec<Node<K, V>>,
    free: Vec<NodeRef>,
}

impl<K, V> NodeArena<K, V> {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
        }
    }

    fn alloc(&mut self, node: Node<K, V>) -> NodeRef {
        if let Some(r) = self.free.pop() {
            self.nodes[r.idx()] = node;
            return r;
        }
        debug_assert!(self.nodes.len() < u32::MAX as usize);
        let r = NodeRef(self.nodes.len() as u32);
        self.nodes.push(node);
        r
    }

    fn free_node(&mut self, r: NodeRef) {
        let node = &mut self.nodes[r.idx()];
        node.value = None;
        node.children = [NodeRef::NULL; 2];
        self.free.push(r);
    }

    /// Number of nodes reachable from some root, i.e. not on the free list.
    #[cfg(test)]
    fn live(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
    }
}

impl<K, V> Index<NodeRef> for NodeArena<K, V> {
    type Output = Node<K, V>;

    #[inline]
    fn index(&self, r: NodeRef) -> &Node<K, V> {
        &self.nodes[r.idx()]
    }
}

impl<K, V> IndexMut<NodeRef> for NodeArena<K, V> {
    #[inline]
    fn index_mut(&mut self, r: NodeRef) -> &mut Node<K, V> {
        &mut self.nodes[r.idx()]
    }
}

// =============================================================================
// Trie
// =============================================================================

/// A longest-prefix-match map from `(prefix_len, key)` pairs to values.
///
/// The trie is not internally synchronized; share it behind a lock if more
/// than one thread needs it.
///
/// ```rust
/// use std::net::Ipv4Addr;
/// use bitlpm::Trie;
///
/// let mut t: Trie<Ipv4Addr, &str> = Trie::default();
/// t.upsert(8, Ipv4Addr::new(10, 0, 0, 0), "ten").unwrap();
/// t.upsert(16, Ipv4Addr::new(10, 1, 0, 0), "ten-one").unwrap();
///
/// assert_eq!(t.lookup(&Ipv4Addr::new(10, 1, 2, 3)), Some(&"ten-one"));
/// assert_eq!(t.lookup(&Ipv4Addr::new(10, 2, 0, 0)), Some(&"ten"));
/// assert_eq!(t.lookup(&Ipv4Addr::new(11, 0, 0, 0)), None);
/// ```
#[derive(Clone)]
pub struct Trie<K, V> {
    nodes: NodeArena<K, V>,
    root: NodeRef,
    max_bits: u32,
    count: usize,
}

impl<K: BitKey, V> Trie<K, V> {
    /// Create a trie that accepts prefixes of up to `max_bits` bits.
    pub fn new(max_bits: u32) -> Result<Self> {
        if max_bits > K::BITS {
            debug!(
                "rejected trie width {max_bits}, key type only has {} bits",
                K::BITS
            );
            return Err(Error::WidthTooLarge {
                max_bits,
                key_bits: K::BITS,
            });
        }
        Ok(Self::with_width(max_bits))
    }

    fn with_width(max_bits: u32) -> Self {
        Self {
            nodes: NodeArena::new(),
            root: NodeRef::NULL,
            max_bits,
            count: 0,
        }
    }

    #[inline]
    pub fn max_bits(&self) -> u32 {
        self.max_bits
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = NodeRef::NULL;
        self.count = 0;
    }

    fn check_prefix_len(&self, prefix_len: u32) -> Result<()> {
        if prefix_len > self.max_bits {
            debug!(
                "rejected prefix length {prefix_len}, trie holds at most {} bits",
                self.max_bits
            );
            return Err(Error::PrefixTooLong {
                prefix_len,
                max_bits: self.max_bits,
            });
        }
        Ok(())
    }

    #[inline]
    fn set_slot(&mut self, slot: Option<Slot>, r: NodeRef) {
        match slot {
            Some((parent, bit)) => self.nodes[parent].children[bit] = r,
            None => self.root = r,
        }
    }

    /// Insert or replace the value stored for the first `prefix_len` bits of
    /// `key`, returning the value it replaced.
    pub fn upsert(&mut self, prefix_len: u32, key: K, value: V) -> Result<Option<V>> {
        self.check_prefix_len(prefix_len)?;
        Ok(self.upsert_unchecked(prefix_len, key, value))
    }

    pub(crate) fn upsert_unchecked(&mut self, prefix_len: u32, key: K, value: V) -> Option<V> {
        debug_assert!(prefix_len <= self.max_bits);

        let mut slot: Option<Slot> = None;
        let mut cur = self.root;
        let match_len = loop {
            if cur.is_null() {
                let leaf = self.nodes.alloc(Node::new(prefix_len, key, Some(value)));
                self.set_slot(slot, leaf);
                self.count += 1;
                return None;
            }

            let node = &self.nodes[cur];
            let match_len = node.prefix_match(prefix_len, &key);
            if match_len != node.prefix_len || node.prefix_len == prefix_len {
                break match_len;
            }
            let bit = key.bit_at(match_len) as usize;
            slot = Some((cur, bit));
            cur = node.children[bit];
        };

        let node_len = self.nodes[cur].prefix_len;

        // Exact prefix already has a node.
        if match_len == node_len {
            let node = &mut self.nodes[cur];
            node.key = key;
            let old = node.value.replace(value);
            if old.is_none() {
                self.count += 1;
            }
            return old;
        }

        self.count += 1;

        if match_len == prefix_len {
            // The new prefix covers the existing node: it becomes its parent.
            trace!("inserting /{prefix_len} above existing /{node_len}");
            let bit = self.nodes[cur].key.bit_at(match_len) as usize;
            let mut parent = Node::new(prefix_len, key, Some(value));
            parent.children[bit] = cur;
            let r = self.nodes.alloc(parent);
            self.set_slot(slot, r);
            return None;
        }

        // Keys diverge at bit `match_len`: join both under a valueless branch.
        trace!("branching at bit {match_len} for /{prefix_len} against existing /{node_len}");
        let bit = key.bit_at(match_len) as usize;
        let leaf = self.nodes.alloc(Node::new(prefix_len, key, Some(value)));
        let mut branch = Node::new(match_len, key, None);
        branch.children[bit] = leaf;
        branch.children[bit ^ 1] = cur;
        let r = self.nodes.alloc(branch);
        self.set_slot(slot, r);
        None
    }

    /// Value of the most specific stored prefix covering all of `key`.
    pub fn lookup(&self, key: &K) -> Option<&V> {
        self.longest_prefix_match(key).map(|(_, _, v)| v)
    }

    /// Like [`Trie::lookup`], but also returns the prefix length and key
    /// material of the matching entry.
    pub fn longest_prefix_match(&self, key: &K) -> Option<(u32, &K, &V)> {
        self.ancestors(self.max_bits, key).last()
    }

    /// Value stored for exactly the first `prefix_len` bits of `key`, even when
    /// a more specific prefix would win a longest-match lookup.
    pub fn exact_lookup(&self, prefix_len: u32, key: &K) -> Option<&V> {
        if prefix_len > self.max_bits {
            return None;
        }
        let mut cur = self.root;
        while !cur.is_null() {
            let node = &self.nodes[cur];
            if node.prefix_match(prefix_len, key) != node.prefix_len {
                return None;
            }
            if node.prefix_len == prefix_len {
                return node.value.as_ref();
            }
            cur = node.children[key.bit_at(node.prefix_len) as usize];
        }
        None
    }

    /// Stored entries covering the first `prefix_len` bits of `key`, from the
    /// least to the most specific. `prefix_len` is capped at the trie width.
    pub fn ancestors(&self, prefix_len: u32, key: &K) -> Ancestors<'_, K, V> {
        Ancestors {
            trie: self,
            key: *key,
            prefix_len: prefix_len.min(self.max_bits),
            cur: self.root,
        }
    }

    /// Visit the entries [`Trie::ancestors`] yields until `visit` breaks.
    pub fn search<F>(&self, prefix_len: u32, key: &K, mut visit: F)
    where
        F: FnMut(u32, &K, &V) -> ControlFlow<()>,
    {
        for (len, k, v) in self.ancestors(prefix_len, key) {
            if visit(len, k, v).is_break() {
                return;
            }
        }
    }

    /// [`Trie::search`] over the full trie width.
    pub fn path<F>(&self, key: &K, visit: F)
    where
        F: FnMut(u32, &K, &V) -> ControlFlow<()>,
    {
        self.search(self.max_bits, key, visit)
    }

    /// Stored entries inside the prefix formed by the first `prefix_len` bits
    /// of `key`, the prefix itself included, in key order.
    pub fn descendants(&self, prefix_len: u32, key: &K) -> Iter<'_, K, V> {
        if prefix_len > self.max_bits {
            return Iter::new(self, NodeRef::NULL);
        }
        let mut cur = self.root;
        while !cur.is_null() {
            let node = &self.nodes[cur];
            let match_len = node.prefix_match(prefix_len, key);
            if match_len == prefix_len {
                return Iter::new(self, cur);
            }
            if match_len < node.prefix_len {
                break;
            }
            cur = node.children[key.bit_at(match_len) as usize];
        }
        Iter::new(self, NodeRef::NULL)
    }

    /// All entries in key order; a prefix comes before the prefixes it covers.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self, self.root)
    }

    /// Remove the value stored for exactly the first `prefix_len` bits of
    /// `key`. Returns `Ok(None)` without touching the trie if there is none.
    pub fn delete(&mut self, prefix_len: u32, key: &K) -> Result<Option<V>> {
        self.check_prefix_len(prefix_len)?;
        Ok(self.delete_unchecked(prefix_len, key))
    }

    pub(crate) fn delete_unchecked(&mut self, prefix_len: u32, key: &K) -> Option<V> {
        debug_assert!(prefix_len <= self.max_bits);

        let mut stack: Vec<Slot> = Vec::new();
        let mut cur = self.root;
        loop {
            if cur.is_null() {
                return None;
            }
            let node = &self.nodes[cur];
            if node.prefix_match(prefix_len, key) != node.prefix_len {
                return None;
            }
            if node.prefix_len == prefix_len {
                break;
            }
            let bit = key.bit_at(node.prefix_len) as usize;
            stack.push((cur, bit));
            cur = node.children[bit];
        }

        let old = self.nodes[cur].value.take()?;
        self.count -= 1;
        self.compact(cur, stack);
        Some(old)
    }

    /// Drop valueless nodes with fewer than two children, starting at `cur`
    /// and walking up through the parents in `stack`.
    fn compact(&mut self, mut cur: NodeRef, mut stack: Vec<Slot>) {
        loop {
            let node = &self.nodes[cur];
            if node.value.is_some() {
                return;
            }
            let [zero, one] = node.children;
            if !zero.is_null() && !one.is_null() {
                return;
            }
            let replacement = if zero.is_null() { one } else { zero };
            let depth = node.prefix_len;

            self.nodes.free_node(cur);
            let parent = stack.pop();
            self.set_slot(parent, replacement);

            if !replacement.is_null() {
                // Parent keeps the same number of children.
                trace!("spliced child over removed node at depth {depth}");
                return;
            }
            trace!("removed empty node at depth {depth}");
            match parent {
                Some((p, _)) => cur = p,
                None => return,
            }
        }
    }
}

impl<K: BitKey, V> Default for Trie<K, V> {
    /// A trie as wide as its key type.
    fn default() -> Self {
        Self::with_width(K::BITS)
    }
}

impl<K: BitKey + fmt::Debug, V: fmt::Debug> fmt::Debug for Trie<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(len, k, v)| ((k, len), v)))
            .finish()
    }
}

impl<'a, K: BitKey, V> IntoIterator for &'a Trie<K, V> {
    type Item = (u32, &'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

// =============================================================================
// Iterators
// =============================================================================

/// Root-to-leaf walk along one key. See [`Trie::ancestors`].
pub struct Ancestors<'a, K, V> {
    trie: &'a Trie<K, V>,
    key: K,
    prefix_len: u32,
    cur: NodeRef,
}

impl<'a, K: BitKey, V> Iterator for Ancestors<'a, K, V> {
    type Item = (u32, &'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let trie = self.trie;
        while !self.cur.is_null() {
            let node = &trie.nodes[self.cur];
            if node.prefix_match(self.prefix_len, &self.key) < node.prefix_len {
                self.cur = NodeRef::NULL;
                break;
            }

            self.cur = if node.prefix_len >= self.prefix_len {
                NodeRef::NULL
            } else {
                node.children[self.key.bit_at(node.prefix_len) as usize]
            };

            if let Some(ref value) = node.value {
                return Some((node.prefix_len, &node.key, value));
            }
        }
        None
    }
}

/// Pre-order walk of a subtree. See [`Trie::iter`] and [`Trie::descendants`].
pub struct Iter<'a, K, V> {
    trie: &'a Trie<K, V>,
    stack: Vec<NodeRef>,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn new(trie: &'a Trie<K, V>, start: NodeRef) -> Self {
        let mut stack = Vec::new();
        if !start.is_null() {
            stack.push(start);
        }
        Self { trie, stack }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (u32, &'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let trie = self.trie;
        while let Some(r) = self.stack.pop() {
            let node = &trie.nodes[r];
            for &child in node.children.iter().rev() {
                if !child.is_null() {
                    self.stack.push(child);
                }
            }
            if let Some(ref value) = node.value {
                return Some((node.prefix_len, &node.key, value));
            }
        }
        None
    }
}

// =============================================================================
// Test support
// =============================================================================

#[cfg(test)]
impl<K: BitKey + fmt::Debug, V> Trie<K, V> {
    /// Number of nodes in the tree, branch nodes included.
    pub(crate) fn node_count(&self) -> usize {
        self.nodes.live()
    }

    /// Panic if the node graph breaks any structural invariant.
    pub(crate) fn assert_invariants(&self) {
        let mut stack = Vec::new();
        if !self.root.is_null() {
            stack.push(self.root);
        }

        let mut reachable = 0usize;
        let mut present = 0usize;
        while let Some(r) = stack.pop() {
            reachable += 1;
            let node = &self.nodes[r];
            assert!(node.prefix_len <= self.max_bits, "node deeper than trie width");

            let children = node.children.iter().filter(|c| !c.is_null()).count();
            if node.value.is_some() {
                present += 1;
            } else {
                assert_eq!(
                    children, 2,
                    "valueless node {:?}/{} must have two children",
                    node.key, node.prefix_len
                );
            }

            for (bit, &child) in node.children.iter().enumerate() {
                if child.is_null() {
                    continue;
                }
                let c = &self.nodes[child];
                assert!(c.prefix_len > node.prefix_len, "child must be deeper than parent");
                assert!(
                    c.key.common_prefix_len(&node.key) >= node.prefix_len,
                    "child {:?}/{} escapes parent {:?}/{}",
                    c.key,
                    c.prefix_len,
                    node.key,
                    node.prefix_len
                );
                assert_eq!(
                    c.key.bit_at(node.prefix_len) as usize,
                    bit,
                    "child sits in the wrong slot"
                );
                stack.push(child);
            }
        }

        assert_eq!(present, self.count, "present nodes must match Trie::len");
        assert_eq!(reachable, self.nodes.live(), "arena leaked or double-freed nodes");
    }
}
