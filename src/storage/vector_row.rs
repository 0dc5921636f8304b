//! The derived vector-index row shape (C3/C5), independent of which backend
//! (`vec0` virtual table vs. in-memory fallback) actually stores it.

use crate::model::LibraryId;

#[derive(Debug, Clone, PartialEq)]
pub struct VectorRow {
    pub embedding: Vec<f32>,
    pub file_type_group: String,
    pub created_at_timestamp: i64,
    pub file_created_at_timestamp: i64,
    pub file_created_at_date: String,
    pub app_name: String,
    pub library_id: LibraryId,
}

/// L2-normalizes a vector in place so cosine distance reduces to a dot
/// product comparison, matching how `vec0`'s cosine metric is typically fed.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Converts an L2 distance between two L2-normalized vectors into cosine
/// similarity: `sim = 1 - dist^2 / 2`.
pub fn l2_distance_to_cosine_similarity(distance: f32) -> f32 {
    1.0 - (distance * distance) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_distance_is_full_similarity() {
        assert!((l2_distance_to_cosine_similarity(0.0) - 1.0).abs() < 1e-6);
    }
}
