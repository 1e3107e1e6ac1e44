use std::cmp::Ordering;

use ndarray::ArrayView1;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum VectorError {
    #[error("vector must not be empty")]
    Empty,
    #[error("vector length mismatch: {0} != {1}")]
    DimensionMismatch(usize, usize),
    #[error("vector contains non-finite values")]
    NonFinite,
}

/// Cosine similarity of two equal-length vectors. Pairs with a zero norm score 0.
pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> Result<f32, VectorError> {
    if query.is_empty() || candidate.is_empty() {
        return Err(VectorError::Empty);
    }
    if query.len() != candidate.len() {
        return Err(VectorError::DimensionMismatch(query.len(), candidate.len()));
    }
    if !query.iter().chain(candidate).all(|value| value.is_finite()) {
        return Err(VectorError::NonFinite);
    }

    let query = ArrayView1::from(query);
    let candidate = ArrayView1::from(candidate);

    let dot = query.dot(&candidate);
    let denom = query.dot(&query).sqrt() * candidate.dot(&candidate).sqrt();
    if denom <= f32::EPSILON {
        return Ok(0.0);
    }

    Ok(dot / denom)
}

/// Scores every candidate against `query`, highest first. Candidates that cannot be
/// scored are returned separately by index.
pub fn rank_descending_by_cosine(
    query: &[f32],
    candidates: &[Vec<f32>],
) -> (Vec<(usize, f32)>, Vec<(usize, VectorError)>) {
    let mut scores = Vec::with_capacity(candidates.len());
    let mut rejected = Vec::new();
    for (idx, candidate) in candidates.iter().enumerate() {
        match cosine_similarity(query, candidate) {
            Ok(score) => scores.push((idx, score)),
            Err(err) => rejected.push((idx, err)),
        }
    }

    scores.sort_by(|left, right| right.1.partial_cmp(&left.1).unwrap_or(Ordering::Equal));
    (scores, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-5
    }

    #[test]
    fn cosine_is_one_for_identical_vectors() {
        let vec = vec![1.0, 2.0, 3.0, 4.0];
        let score = cosine_similarity(&vec, &vec).expect("cosine should work");
        assert!(approx_eq(score, 1.0));
    }

    #[test]
    fn cosine_is_zero_for_orthogonal_vectors() {
        let score = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).expect("cosine should work");
        assert!(approx_eq(score, 0.0));
    }

    #[test]
    fn zero_norm_scores_zero() {
        let score = cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).expect("cosine should work");
        assert_eq!(score, 0.0);
    }

    #[test]
    fn malformed_vectors_are_rejected() {
        assert_eq!(cosine_similarity(&[], &[1.0]), Err(VectorError::Empty));
        assert_eq!(
            cosine_similarity(&[1.0, 0.0], &[1.0]),
            Err(VectorError::DimensionMismatch(2, 1))
        );
        assert_eq!(
            cosine_similarity(&[1.0, 0.0], &[f32::NAN, 1.0]),
            Err(VectorError::NonFinite)
        );
    }

    #[test]
    fn ranking_returns_highest_similarity_first() {
        let query = vec![1.0, 0.0];
        let candidates = vec![vec![0.8, 0.2], vec![0.1, 0.9], vec![0.9, 0.0], vec![1.0]];
        let (ranked, rejected) = rank_descending_by_cosine(&query, &candidates);

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].0, 2);
        assert_eq!(ranked[2].0, 1);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].0, 3);
    }
}
