//! Deterministic string hashing used for string object hash caching.
//!
//! String objects hash their payload once, at construction, with 32-bit FNV-1a.
//! The result is stable across runs and platforms, which keeps heap snapshots
//! portable: a hash recomputed after `Heap::load` always matches the one that was
//! cached before `Heap::dump`.
//!
//! The hash is only a fast pre-filter for equality in lookup tables. Two strings
//! with equal hashes still need a byte comparison.

/// FNV-1a 32-bit offset basis.
const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;

/// FNV-1a 32-bit prime.
const FNV_PRIME: u32 = 0x0100_0193;

/// Hashes raw bytes with 32-bit FNV-1a.
///
/// The empty input hashes to the offset basis (`2166136261`).
#[must_use]
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
