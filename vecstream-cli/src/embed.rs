//! Placeholder text-to-vector embedder.
//!
//! The core accepts pre-computed vectors only; the real embedding
//! pipeline is an external collaborator out of scope for this crate.
//! This hashes text into a fixed-width bag-of-character-shingles vector
//! so the CLI has something deterministic to feed `add`/`search` with
//! until a real embedder is wired in.

/// Width of vectors produced by [`embed`]. Every collection created
/// through this CLI's `add` command ends up with this dimension.
pub const EMBED_DIM: usize = 128;

/// Deterministically hashes `text` into an `EMBED_DIM`-wide, L2-normalized
/// vector. Same text always yields the same vector; no two runs differ.
pub fn embed(text: &str, dim: usize) -> Vec<f32> {
    let mut buckets = vec![0f32; dim.max(1)];
    let bytes = text.as_bytes();
    if bytes.is_empty() {
        return buckets;
    }
    for (i, window) in bytes.windows(3.min(bytes.len())).enumerate() {
        let mut h: u64 = 1469598103934665603; // FNV offset basis
        for &b in window {
            h ^= b as u64;
            h = h.wrapping_mul(1099511628211); // FNV prime
        }
        h ^= i as u64;
        let bucket = (h as usize) % buckets.len();
        let sign = if h & 1 == 0 { 1.0 } else { -1.0 };
        buckets[bucket] += sign;
    }
    vecstream_core::normalized(&buckets)
}
