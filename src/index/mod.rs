// Vector index module
// Flat (brute-force) nearest-neighbour search plus on-disk persistence


pub mod flat;
pub mod store;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub use flat::FlatIndex;
pub use store::{IndexStore, SharedIndex, load, persist};

/// Distance metric an index is built with.
///
/// `Euclidean` ranks by squared L2 distance, smallest first. `Cosine` ranks by raw inner
/// product, largest first; vectors are not normalized here, so callers wanting true cosine
/// similarity must store and query unit-length vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceMetric {
    #[serde(rename = "L2", alias = "l2", alias = "EUCLIDEAN", alias = "euclidean")]
    Euclidean,
    #[serde(rename = "COSINE", alias = "cosine", alias = "Cosine")]
    Cosine,
}

impl DistanceMetric {
    /// Score a stored vector against a query under this metric
    #[inline]
    pub fn score(self, query: &[f32], stored: &[f32]) -> f32 {
        match self {
            Self::Euclidean => squared_l2(query, stored),
            Self::Cosine => inner_product(query, stored),
        }
    }

    /// Order two scores so that the closer neighbour sorts first
    #[inline]
    pub fn rank(self, a: f32, b: f32) -> Ordering {
        match self {
            Self::Euclidean => a.total_cmp(&b),
            Self::Cosine => b.total_cmp(&a),
        }
    }

    /// True when larger scores mean closer neighbours
    #[inline]
    pub fn higher_is_closer(self) -> bool {
        matches!(self, Self::Cosine)
    }

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Euclidean => "L2",
            Self::Cosine => "COSINE",
        }
    }
}

impl fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    #[inline]
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "L2" | "EUCLIDEAN" => Ok(Self::Euclidean),
            "COSINE" => Ok(Self::Cosine),
            _ => Err(format!(
                "unknown distance metric '{}' (expected 'L2' or 'COSINE')",
                value
            )),
        }
    }
}

/// Result of a k-nearest-neighbour search, closest first.
///
/// For `Euclidean` the distances are non-decreasing; for `Cosine` they are similarities
/// and non-increasing.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbors {
    metric: DistanceMetric,
    distances: Vec<f32>,
    positions: Vec<usize>,
}

impl Neighbors {
    pub(crate) fn new(metric: DistanceMetric, scored: Vec<(f32, usize)>) -> Self {
        let (distances, positions) = scored.into_iter().unzip();
        Self {
            metric,
            distances,
            positions,
        }
    }

    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    #[inline]
    pub fn distances(&self) -> &[f32] {
        &self.distances
    }

    #[inline]
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Closest neighbour as `(position, distance)`
    #[inline]
    pub fn first(&self) -> Option<(usize, f32)> {
        self.iter().next()
    }

    /// Iterate `(position, distance)` pairs, closest first
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.positions
            .iter()
            .copied()
            .zip(self.distances.iter().copied())
    }

    #[inline]
    pub fn into_parts(self) -> (Vec<f32>, Vec<usize>) {
        (self.distances, self.positions)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
