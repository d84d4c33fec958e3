//! Cheap rolling hashes for change detection.

/// Incremental hash over a sequence of renderable ids.
///
/// Used to detect whether the set of visible renderables changed between
/// two calls without keeping a copy of the previous set. The element count
/// is folded into the digest so that a subset and its superset never share
/// a prefix-equal hash.
#[derive(Debug, Clone, Copy)]
pub struct RollingHash {
    hash: i32,
    count: u32,
}

impl RollingHash {
    /// Fresh hash state.
    #[must_use]
    pub fn new() -> Self {
        Self { hash: 23, count: 0 }
    }

    /// Mix one id into the hash.
    pub fn push(&mut self, id: u32) {
        self.hash = self.hash.wrapping_mul(31).wrapping_add(id as i32);
        self.count += 1;
    }

    /// Final digest.
    #[must_use]
    pub fn finish(&self) -> u64 {
        let h = hash1(self.hash as u32);
        (u64::from(self.count) << 32) | u64::from(h)
    }
}

impl Default for RollingHash {
    fn default() -> Self {
        Self::new()
    }
}

/// Integer avalanche (Thomas Wang style) to spread low-entropy inputs.
#[must_use]
pub fn hash1(mut x: u32) -> u32 {
    x = ((x >> 16) ^ x).wrapping_mul(0x045d_9f3b);
    x = ((x >> 16) ^ x).wrapping_mul(0x045d_9f3b);
    (x >> 16) ^ x
}

/// Hash of a sequence of ids, in iteration order.
pub fn hash_ids(ids: impl IntoIterator<Item = u32>) -> u64 {
    let mut h = RollingHash::new();
    for id in ids {
        h.push(id);
    }
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_and_membership_change_hash() {
        let a = hash_ids([1, 2, 3]);
        assert_eq!(a, hash_ids([1, 2, 3]));
        assert_ne!(a, hash_ids([1, 2]));
        assert_ne!(a, hash_ids([1, 2, 4]));
        assert_ne!(hash_ids([]), hash_ids([0]));
    }
}
