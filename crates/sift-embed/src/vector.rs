//! Vector helpers.

/// Euclidean length of `v`.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length. A zero vector is returned unchanged.
///
/// # Examples
///
/// ```
/// use sift_embed::vector::{l2_norm, normalize};
///
/// let v = normalize(vec![3.0, 4.0]);
/// assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
/// assert_eq!(normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
/// ```
pub fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = l2_norm(&v);
    if norm > 0.0 && norm.is_finite() {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Squared Euclidean distance between two equal-length vectors.
pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
