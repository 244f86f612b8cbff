use super::*;

use proptest::prelude::*;
use proptest_derive::Arbitrary;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

// =============================================================================
// Brute-force model
// =============================================================================

/// Exact prefixes keyed by `(prefix_len, masked bits)`, holding the last
/// written key material and value.
type Model = BTreeMap<(u32, u16), ([u8; 2], u16)>;

fn mask16(key: [u8; 2], len: u32) -> u16 {
    if len == 0 {
        0
    } else {
        u16::from_be_bytes(key) & (u16::MAX << (16 - len))
    }
}

fn model_ancestors(m: &Model, len: u32, key: [u8; 2]) -> Vec<(u32, [u8; 2], u16)> {
    // BTreeMap order puts shorter prefixes first.
    m.iter()
        .filter(|((l, bits), _)| *l <= len && mask16(key, *l) == *bits)
        .map(|((l, _), (k, v))| (*l, *k, *v))
        .collect()
}

fn model_descendants(m: &Model, len: u32, key: [u8; 2]) -> Vec<(u32, [u8; 2], u16)> {
    let mut out: Vec<_> = m
        .iter()
        .filter(|((l, _), (k, _))| *l >= len && mask16(*k, len) == mask16(key, len))
        .map(|((l, _), (k, v))| (*l, *k, *v))
        .collect();
    out.sort();
    out
}

fn collect<'a>(it: impl Iterator<Item = (u32, &'a [u8; 2], &'a u16)>) -> Vec<(u32, [u8; 2], u16)> {
    it.map(|(l, k, v)| (l, *k, *v)).collect()
}

// =============================================================================
// Random operation sequences
// =============================================================================

#[derive(Clone, Debug, Arbitrary)]
enum Op {
    #[proptest(weight = 4)]
    Upsert(#[proptest(strategy = "0u32..=16")] u32, [u8; 2], u16),
    #[proptest(weight = 2)]
    Delete(#[proptest(strategy = "0u32..=16")] u32, [u8; 2]),
    #[proptest(weight = 2)]
    Lookup([u8; 2]),
    Exact(#[proptest(strategy = "0u32..=16")] u32, [u8; 2]),
    Ancestors(#[proptest(strategy = "0u32..=16")] u32, [u8; 2]),
    Descendants(#[proptest(strategy = "0u32..=16")] u32, [u8; 2]),
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(any::<Op>(), 0..=500)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(ops in ops_strategy()) {
        let mut t: Trie<[u8; 2], u16> = Trie::default();
        let mut m: Model = BTreeMap::new();

        for op in ops {
            match op {
                Op::Upsert(len, key, value) => {
                    let old_t = t.upsert(len, key, value).unwrap();
                    let old_m = m.insert((len, mask16(key, len)), (key, value)).map(|(_, v)| v);
                    prop_assert_eq!(old_t, old_m);
                }
                Op::Delete(len, key) => {
                    let nodes = t.node_count();
                    let old_t = t.delete(len, &key).unwrap();
                    let old_m = m.remove(&(len, mask16(key, len))).map(|(_, v)| v);
                    prop_assert_eq!(old_t, old_m);
                    if old_t.is_none() {
                        prop_assert_eq!(t.node_count(), nodes);
                    }
                }
                Op::Lookup(key) => {
                    let got = t.longest_prefix_match(&key).map(|(l, k, v)| (l, *k, *v));
                    let want = model_ancestors(&m, 16, key).pop();
                    prop_assert_eq!(got, want);
                    prop_assert_eq!(t.lookup(&key).copied(), want.map(|(_, _, v)| v));
                }
                Op::Exact(len, key) => {
                    let got = t.exact_lookup(len, &key).copied();
                    let want = m.get(&(len, mask16(key, len))).map(|(_, v)| *v);
                    prop_assert_eq!(got, want);
                }
                Op::Ancestors(len, key) => {
                    let got = collect(t.ancestors(len, &key));
                    prop_assert_eq!(got, model_ancestors(&m, len, key));
                }
                Op::Descendants(len, key) => {
                    let mut got = collect(t.descendants(len, &key));
                    got.sort();
                    prop_assert_eq!(got, model_descendants(&m, len, key));
                }
            }

            prop_assert_eq!(t.len(), m.len());
        }

        t.assert_invariants();
        let mut got = collect(t.iter());
        got.sort();
        let mut expected: Vec<_> = m.iter().map(|((l, _), (k, v))| (*l, *k, *v)).collect();
        expected.sort();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_common_prefix_len_is_symmetric_and_bounds_bits(a in any::<[u8; 4]>(), b in any::<[u8; 4]>()) {
        let n = a.common_prefix_len(&b);
        prop_assert_eq!(n, b.common_prefix_len(&a));
        prop_assert_eq!(a.common_prefix_len(&a), 32);
        prop_assert_eq!(n == 32, a == b);
        for i in 0..n {
            prop_assert_eq!(a.bit_at(i), b.bit_at(i));
        }
        if n < 32 {
            prop_assert_ne!(a.bit_at(n), b.bit_at(n));
        }
    }
}

// =============================================================================
// Exhaustive orderings
// =============================================================================

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

fn small_set() -> Vec<(u32, Ipv4Addr)> {
    vec![
        (0, Ipv4Addr::new(0, 0, 0, 0)),
        (8, Ipv4Addr::new(1, 0, 0, 0)),
        (24, Ipv4Addr::new(1, 1, 1, 0)),
        (25, Ipv4Addr::new(1, 1, 1, 0)),
        (25, Ipv4Addr::new(1, 1, 1, 128)),
        (16, Ipv4Addr::new(1, 2, 0, 0)),
    ]
}

fn probes() -> Vec<Ipv4Addr> {
    vec![
        Ipv4Addr::new(1, 1, 1, 1),
        Ipv4Addr::new(1, 1, 1, 200),
        Ipv4Addr::new(1, 1, 2, 0),
        Ipv4Addr::new(1, 2, 3, 4),
        Ipv4Addr::new(9, 9, 9, 9),
    ]
}

fn brute_force_lpm(entries: &[(u32, Ipv4Addr, u32)], addr: Ipv4Addr) -> Option<u32> {
    entries
        .iter()
        .filter(|(len, key, _)| addr.common_prefix_len(key) >= *len)
        .max_by_key(|(len, _, _)| *len)
        .map(|(_, _, v)| *v)
}

#[test]
fn exhaustive_insert_order_small_set() {
    let keys = small_set();
    let entries: Vec<(u32, Ipv4Addr, u32)> = keys
        .iter()
        .map(|(l, k)| (*l, *k, *l * 100 + u32::from(k.octets()[3])))
        .collect();

    let mut baseline: Option<(Vec<(u32, Ipv4Addr, u32)>, usize)> = None;
    for_each_permutation(&entries, |perm| {
        let mut t: Trie<Ipv4Addr, u32> = Trie::default();
        for (len, key, value) in &perm {
            assert_eq!(t.upsert(*len, *key, *value).unwrap(), None);
        }
        t.assert_invariants();
        assert_eq!(t.len(), entries.len());

        for addr in probes() {
            assert_eq!(t.lookup(&addr).copied(), brute_force_lpm(&entries, addr), "lookup {addr}");
        }

        // Shape does not depend on insertion order.
        let listing: Vec<(u32, Ipv4Addr, u32)> = t.iter().map(|(l, k, v)| (l, *k, *v)).collect();
        match &baseline {
            Some((want, nodes)) => {
                assert_eq!(&listing, want);
                assert_eq!(t.node_count(), *nodes);
            }
            None => baseline = Some((listing, t.node_count())),
        }
    });
}

#[test]
fn exhaustive_delete_order_small_set() {
    let keys = small_set();

    let mut base: Trie<Ipv4Addr, u32> = Trie::default();
    for (i, (len, key)) in keys.iter().enumerate() {
        base.upsert(*len, *key, i as u32).unwrap();
    }

    for_each_permutation(&keys, |perm| {
        let mut t = base.clone();
        let mut remaining: Vec<(u32, Ipv4Addr, u32)> = keys
            .iter()
            .enumerate()
            .map(|(i, (l, k))| (*l, *k, i as u32))
            .collect();

        for (len, key) in perm {
            let before = t.len();
            assert!(t.delete(len, &key).unwrap().is_some());
            assert_eq!(t.len(), before - 1);
            assert_eq!(t.delete(len, &key).unwrap(), None);
            assert_eq!(t.len(), before - 1);
            remaining.retain(|(l, k, _)| !(*l == len && *k == key));

            t.assert_invariants();
            for addr in probes() {
                assert_eq!(t.lookup(&addr).copied(), brute_force_lpm(&remaining, addr));
            }
        }
        assert!(t.is_empty());
        assert_eq!(t.node_count(), 0);
    });
}

// =============================================================================
// Seeded stress
// =============================================================================

type Model4 = BTreeMap<(u32, u32), (Ipv4Addr, u32)>;

#[test]
fn randomized_lpm_against_brute_force() {
    let mut rng = StdRng::seed_from_u64(0x6c70_6d5f_7472_6965);
    let mut t: Trie<Ipv4Addr, u32> = Trie::default();
    let mut entries: Model4 = BTreeMap::new();

    // A handful of /8s keeps prefixes overlapping.
    let firsts = [10u8, 172, 192];
    for i in 0..2000u32 {
        let addr = Ipv4Addr::new(
            firsts[rng.gen_range(0..firsts.len())],
            rng.gen_range(0..4),
            rng.gen(),
            rng.gen(),
        );
        let len = rng.gen_range(0..=32u32);
        let masked = if len == 0 { 0 } else { u32::from(addr) & (u32::MAX << (32 - len)) };
        t.upsert(len, addr, i).unwrap();
        entries.insert((len, masked), (addr, i));
    }
    assert_eq!(t.len(), entries.len());
    t.assert_invariants();

    let check = |t: &Trie<Ipv4Addr, u32>, entries: &Model4, rng: &mut StdRng| {
        let flat: Vec<(u32, Ipv4Addr, u32)> = entries
            .iter()
            .map(|((l, _), (k, v))| (*l, *k, *v))
            .collect();
        for _ in 0..2000 {
            let addr = Ipv4Addr::new(
                firsts[rng.gen_range(0..firsts.len())],
                rng.gen_range(0..4),
                rng.gen(),
                rng.gen(),
            );
            assert_eq!(t.lookup(&addr).copied(), brute_force_lpm(&flat, addr), "lookup {addr}");
        }
    };
    check(&t, &entries, &mut rng);

    let victims: Vec<(u32, u32)> = entries.keys().copied().filter(|_| rng.gen_bool(0.5)).collect();
    for (len, masked) in victims {
        let (addr, value) = entries.remove(&(len, masked)).unwrap();
        assert_eq!(t.delete(len, &addr).unwrap(), Some(value));
    }
    assert_eq!(t.len(), entries.len());
    t.assert_invariants();
    check(&t, &entries, &mut rng);
}
