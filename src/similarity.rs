//! Sparse document vectors and the cosine k-nearest-neighbour index.

use std::cmp::Ordering;

use rayon::prelude::*;
use serde::Serialize;

use crate::error::QueryError;

/// A sparse vector over one generation's feature space.
///
/// `indices` are strictly increasing and below `dimension`; `values` has
/// the same length as `indices`.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentVector {
    dimension: u32,
    indices: Vec<u32>,
    values: Vec<f32>,
}

impl DocumentVector {
    /// The all-zero vector of the given dimension.
    pub fn zero(dimension: u32) -> Self {
        Self {
            dimension,
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build a vector from parallel index/value arrays, validating the
    /// sparse layout.
    pub fn from_parts(
        dimension: u32,
        indices: Vec<u32>,
        values: Vec<f32>,
    ) -> Result<Self, String> {
        if indices.len() != values.len() {
            return Err(format!(
                "{} indices but {} values",
                indices.len(),
                values.len()
            ));
        }
        if indices.windows(2).any(|w| w[0] >= w[1]) {
            return Err("indices are not strictly increasing".to_string());
        }
        if indices.last().is_some_and(|&i| i >= dimension) {
            return Err(format!("index out of range for dimension {dimension}"));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err("non-finite value".to_string());
        }
        Ok(Self {
            dimension,
            indices,
            values,
        })
    }

    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of stored (non-zero) entries.
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }

    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Scale to unit length in place. Zero vectors are left untouched.
    pub fn normalize(&mut self) {
        let norm = self.norm();
        if norm > 0.0 {
            for v in &mut self.values {
                *v /= norm;
            }
        }
    }

    /// Sparse dot product via a merge over the sorted index lists.
    pub fn dot(&self, other: &Self) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Cosine similarity of two vectors of the same dimension. A zero vector
/// has similarity 0 with everything.
pub fn cosine_similarity(
    a: &DocumentVector,
    b: &DocumentVector,
) -> Result<f32, QueryError> {
    check_dimension(a.dimension, b.dimension)?;
    Ok(cosine_with_norms(a, a.norm(), b, b.norm()))
}

fn cosine_with_norms(
    a: &DocumentVector,
    norm_a: f32,
    b: &DocumentVector,
    norm_b: f32,
) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    a.dot(b) / (norm_a * norm_b)
}

fn check_dimension(expected: u32, actual: u32) -> Result<(), QueryError> {
    if expected != actual {
        return Err(QueryError::DimensionMismatch {
            expected: expected as usize,
            actual: actual as usize,
        });
    }
    Ok(())
}

/// One nearest-neighbour hit: the position of the document in load order
/// and its cosine similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub similarity: f32,
}

/// A similarity hit resolved to its document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityHit {
    pub document_id: String,
    pub similarity: f32,
    /// 1-based position in the result list.
    pub rank: usize,
}

/// Brute-force cosine index over one generation's document vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityIndex {
    dimension: u32,
    vectors: Vec<DocumentVector>,
    norms: Vec<f32>,
}

impl SimilarityIndex {
    /// Build the index in one pass. Every vector must have `dimension`.
    pub fn new(
        dimension: u32,
        vectors: Vec<DocumentVector>,
    ) -> Result<Self, QueryError> {
        for v in &vectors {
            check_dimension(dimension, v.dimension)?;
        }
        let norms = vectors.iter().map(DocumentVector::norm).collect();
        Ok(Self {
            dimension,
            vectors,
            norms,
        })
    }

    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vectors(&self) -> &[DocumentVector] {
        &self.vectors
    }

    /// Up to `k` neighbours by descending cosine similarity.
    ///
    /// `k` is clamped to the number of indexed vectors. Equal similarities
    /// keep load order, earliest first.
    pub fn query(
        &self,
        query: &DocumentVector,
        k: usize,
    ) -> Result<Vec<Neighbor>, QueryError> {
        check_dimension(self.dimension, query.dimension)?;
        let k = k.min(self.vectors.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = query.norm();
        let mut scored: Vec<Neighbor> = self
            .vectors
            .par_iter()
            .zip(self.norms.par_iter())
            .enumerate()
            .map(|(index, (vector, &norm))| Neighbor {
                index,
                similarity: cosine_with_norms(query, query_norm, vector, norm),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.index.cmp(&b.index))
        });
        scored.truncate(k);
        Ok(scored)
    }
}
