//! XOR-metric nearest-neighbour queries over router contacts

use std::cmp::Ordering;
use veil_core::{RouterContact, RouterId};

/// Order two ids by distance to `target`, closest first.
///
/// Distinct ids never sit at the same distance from one target, so the id
/// comparison only settles `a == b`.
pub fn cmp_distance(a: &RouterId, b: &RouterId, target: &RouterId) -> Ordering {
    a.xor_distance(target)
        .cmp(&b.xor_distance(target))
        .then_with(|| a.cmp(b))
}

/// The contact closest to `target`, or `None` if there are none
pub fn closest<'a>(
    contacts: impl IntoIterator<Item = &'a RouterContact>,
    target: &RouterId,
) -> Option<&'a RouterContact> {
    contacts
        .into_iter()
        .min_by(|a, b| cmp_distance(&a.pubkey, &b.pubkey, target))
}

/// The `k` contacts closest to `target`, closest first
pub fn k_closest<'a>(
    contacts: impl IntoIterator<Item = &'a RouterContact>,
    target: &RouterId,
    k: usize,
) -> Vec<&'a RouterContact> {
    if k == 0 {
        return Vec::new();
    }

    let mut all: Vec<_> = contacts.into_iter().collect();
    let by_distance = |a: &&RouterContact, b: &&RouterContact| cmp_distance(&a.pubkey, &b.pubkey, target);

    // Partial sort: only the first k need ordering
    if k < all.len() {
        all.select_nth_unstable_by(k - 1, by_distance);
        all.truncate(k);
    }
    all.sort_unstable_by(by_distance);
    all
}
