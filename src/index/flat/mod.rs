#[cfg(test)]
mod tests;

use std::ops::Range;
use tracing::debug;

use super::{DistanceMetric, Neighbors};
use crate::{Result, SupportError};

/// Brute-force vector index.
///
/// Vectors are stored row-major in one contiguous buffer. The vector at position `i` is the
/// `i`-th vector ever added, which is what ties it to row `i` of the corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    metric: DistanceMetric,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index for vectors of `dimension` components
    #[inline]
    pub fn create(dimension: usize, metric: DistanceMetric) -> Result<Self> {
        if dimension == 0 {
            return Err(SupportError::InvalidArgument(
                "index dimension must be greater than zero".to_string(),
            ));
        }

        debug!(
            "Creating flat index with {} dimensions ({})",
            dimension, metric
        );

        Ok(Self {
            dimension,
            metric,
            data: Vec::new(),
        })
    }

    /// Rebuild an index from a row-major buffer (used when loading from disk)
    pub(crate) fn from_parts(
        dimension: usize,
        metric: DistanceMetric,
        data: Vec<f32>,
    ) -> Result<Self> {
        if dimension == 0 || data.len() % dimension != 0 {
            return Err(SupportError::IndexLoad(format!(
                "payload of {} values does not divide into vectors of {} dimensions",
                data.len(),
                dimension
            )));
        }

        Ok(Self {
            dimension,
            metric,
            data,
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Number of stored vectors
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    pub(crate) fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Append vectors in order and return the positions they were assigned.
    ///
    /// Every vector is checked before any is stored, so a rejected batch leaves the index
    /// untouched. Adding the same vectors twice stores them twice.
    #[inline]
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Range<usize>> {
        for (offset, vector) in vectors.iter().enumerate() {
            if vector.len() != self.dimension {
                return Err(SupportError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
            if vector.iter().any(|value| !value.is_finite()) {
                return Err(SupportError::InvalidArgument(format!(
                    "vector {} of the batch contains a non-finite value",
                    offset
                )));
            }
        }

        let start = self.len();
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }

        debug!(
            "Added {} vectors to flat index (now {})",
            vectors.len(),
            self.len()
        );
        Ok(start..self.len())
    }

    /// Drop every vector at or after `len`
    pub(crate) fn truncate(&mut self, len: usize) {
        self.data.truncate(len * self.dimension);
    }

    /// Return the `k` nearest stored vectors to `query`, closest first.
    ///
    /// Fewer than `k` vectors in the index yields all of them. Ties are broken by position.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Neighbors> {
        if k == 0 {
            return Err(SupportError::InvalidArgument(
                "k must be a positive integer".to_string(),
            ));
        }
        if query.len() != self.dimension {
            return Err(SupportError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let metric = self.metric;
        let mut scored: Vec<(f32, usize)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, stored)| (metric.score(query, stored), position))
            .collect();

        let compare = |a: &(f32, usize), b: &(f32, usize)| metric.rank(a.0, b.0).then(a.1.cmp(&b.1));

        let k = k.min(scored.len());
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, compare);
            scored.truncate(k);
        }
        scored.sort_unstable_by(compare);

        Ok(Neighbors::new(metric, scored))
    }
}
