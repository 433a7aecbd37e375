//! Similarity kernels over fixed-length `f32` vectors.
//!
//! Partial sums accumulate in `f64` once a vector's dimension exceeds
//! [`WIDE_ACCUMULATOR_THRESHOLD`], bounding rounding error on high-dimensional
//! embeddings without paying the `f64` cost on the common case.

/// Dimension past which dot-product and magnitude accumulate in `f64`.
pub const WIDE_ACCUMULATOR_THRESHOLD: usize = 1024;

/// Dot product of two equal-length vectors.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    if a.len() > WIDE_ACCUMULATOR_THRESHOLD {
        let sum: f64 = a
            .iter()
            .zip(b)
            .map(|(&x, &y)| x as f64 * y as f64)
            .sum();
        sum as f32
    } else {
        a.iter().zip(b).map(|(&x, &y)| x * y).sum()
    }
}

/// L2 norm (magnitude) of a vector.
#[inline]
pub fn magnitude(v: &[f32]) -> f32 {
    if v.len() > WIDE_ACCUMULATOR_THRESHOLD {
        let sum: f64 = v.iter().map(|&x| x as f64 * x as f64).sum();
        sum.sqrt() as f32
    } else {
        v.iter().map(|&x| x * x).sum::<f32>().sqrt()
    }
}

/// Cosine similarity in `[-1, 1]`. Zero if either vector has zero magnitude.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mag_a = magnitude(a);
    let mag_b = magnitude(b);
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (mag_a * mag_b)
}

/// Euclidean (L2) distance, provided for the brute-force correctness
/// fallback and for host callers that want it; `Collection::search_similar`
/// itself is cosine-only.
#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    if a.len() > WIDE_ACCUMULATOR_THRESHOLD {
        let sum: f64 = a
            .iter()
            .zip(b)
            .map(|(&x, &y)| {
                let d = x as f64 - y as f64;
                d * d
            })
            .sum();
        sum.sqrt() as f32
    } else {
        a.iter()
            .zip(b)
            .map(|(&x, &y)| {
                let d = x - y;
                d * d
            })
            .sum::<f32>()
            .sqrt()
    }
}

/// Returns a unit-length copy of `v`, or an all-zero copy if `v` has zero
/// magnitude. Used to memoize the normalized form HNSW computes distance
/// over (see the store's and HNSW's normalized-vector caches).
pub fn normalized(v: &[f32]) -> Vec<f32> {
    let mag = magnitude(v);
    if mag == 0.0 {
        return vec![0.0; v.len()];
    }
    v.iter().map(|&x| x / mag).collect()
}

/// Cosine distance in `[0, 2]`, derived from similarity as `1 - similarity`.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}
