//! Version-stable hashing of sequence-analysis match keys.
//!
//! Dependency probing compares chunks by the 32-bit hashes of their match
//! keys rather than the keys themselves. The hash therefore forms part of
//! the cluster contract: every node version sharing a cluster must compute
//! identical values, so `std::hash` (randomized, unspecified) is off the
//! table. FNV-1a is used instead: tiny, well-specified, and stable.

/// FNV-1a 32-bit offset basis.
const FNV_OFFSET: u32 = 0x811c_9dc5;
/// FNV-1a 32-bit prime.
const FNV_PRIME: u32 = 0x0100_0193;

/// Computes the stable 32-bit hash of a match key.
///
/// The result is reinterpreted as `i32` because hashes travel alongside
/// other signed 32-bit values in the tracking entry.
#[must_use]
pub fn match_hash(key: &str) -> i32 {
    let mut hash = FNV_OFFSET;
    for byte in key.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    i32::from_ne_bytes(hash.to_ne_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(match_hash("870970:12345678"), match_hash("870970:12345678"));
    }

    #[test]
    fn hash_distinguishes_keys() {
        assert_ne!(match_hash("870970:12345678"), match_hash("870970:12345679"));
    }

    #[test]
    fn empty_key_hashes_to_offset_basis() {
        assert_eq!(match_hash(""), i32::from_ne_bytes(FNV_OFFSET.to_ne_bytes()));
    }

    #[test]
    fn known_vector() {
        // FNV-1a("a") = 0xe40c292c
        assert_eq!(match_hash("a"), i32::from_ne_bytes(0xe40c_292cu32.to_ne_bytes()));
    }
}
