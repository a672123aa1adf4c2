// Corpus/index consistency validation
// Row i of the corpus must be vector i of the index; this module detects drift between them


use std::ops::Range;
use tracing::{debug, info, warn};

use crate::Result;
use crate::corpus::Corpus;
use crate::embeddings::Embedder;
use crate::index::FlatIndex;

/// Consistency check results between the corpus file and the index file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Number of rows in the corpus
    pub corpus_rows: usize,
    /// Number of vectors in the index
    pub index_vectors: usize,
    /// Corpus rows with no vector
    pub missing_vectors: Range<usize>,
    /// Vectors with no corpus row
    pub orphaned_vectors: Range<usize>,
    /// Sampled rows whose own query did not retrieve them first
    pub misaligned_rows: Vec<usize>,
    /// Number of rows re-embedded by a spot check
    pub rows_sampled: usize,
    /// Overall consistency status
    pub is_consistent: bool,
}

impl ConsistencyReport {
    /// Compare row and vector counts only
    #[inline]
    pub fn compare(corpus_rows: usize, index_vectors: usize) -> Self {
        let missing_vectors = index_vectors.min(corpus_rows)..corpus_rows;
        let orphaned_vectors = corpus_rows.min(index_vectors)..index_vectors;
        let is_consistent = missing_vectors.is_empty() && orphaned_vectors.is_empty();

        Self {
            corpus_rows,
            index_vectors,
            missing_vectors,
            orphaned_vectors,
            misaligned_rows: Vec::new(),
            rows_sampled: 0,
            is_consistent,
        }
    }

    #[inline]
    pub fn log_issues(&self) {
        if !self.missing_vectors.is_empty() {
            warn!(
                "Corpus rows {}..{} have no vectors in the index",
                self.missing_vectors.start, self.missing_vectors.end
            );
        }
        if !self.orphaned_vectors.is_empty() {
            warn!(
                "Index vectors {}..{} have no corpus rows",
                self.orphaned_vectors.start, self.orphaned_vectors.end
            );
        }
        if !self.misaligned_rows.is_empty() {
            warn!(
                "{} of {} sampled rows did not retrieve themselves: {:?}",
                self.misaligned_rows.len(),
                self.rows_sampled,
                self.misaligned_rows
            );
        }
    }
}

/// Performs consistency validation between a corpus and its index
pub struct ConsistencyValidator<'a> {
    corpus: &'a Corpus,
    index: &'a FlatIndex,
}

impl<'a> ConsistencyValidator<'a> {
    #[inline]
    pub fn new(corpus: &'a Corpus, index: &'a FlatIndex) -> Self {
        Self { corpus, index }
    }

    /// Check that every corpus row has exactly one vector
    #[inline]
    pub fn validate(&self) -> ConsistencyReport {
        info!("Starting corpus/index consistency validation");
        let report = ConsistencyReport::compare(self.corpus.len(), self.index.len());

        if report.is_consistent {
            info!(
                "Consistency validation passed ({} rows)",
                report.corpus_rows
            );
        } else {
            warn!("Consistency validation found issues");
            report.log_issues();
        }
        report
    }

    /// Re-embed up to `sample` rows spread over the corpus and check that each one's nearest
    /// neighbour is itself, or a row with the same query text.
    ///
    /// Catches a corpus that was reordered or edited without rebuilding the index.
    #[inline]
    pub fn spot_check<E: Embedder>(
        &self,
        embedder: &E,
        model_id: &str,
        sample: usize,
        mut report: ConsistencyReport,
    ) -> Result<ConsistencyReport> {
        let positions = sample_positions(self.corpus.len(), sample);
        debug!("Spot-checking {} rows", positions.len());

        let texts: Vec<String> = positions
            .iter()
            .filter_map(|&p| self.corpus.get(p).map(|r| r.query.clone()))
            .collect();
        let vectors = embedder.embed_batch(&texts, model_id)?;

        for (&position, vector) in positions.iter().zip(&vectors) {
            let neighbors = self.index.search(vector, 1)?;
            let aligned = neighbors.first().is_some_and(|(found, _)| {
                found == position
                    || self.corpus.get(found).map(|r| &r.query)
                        == self.corpus.get(position).map(|r| &r.query)
            });
            if !aligned {
                report.misaligned_rows.push(position);
            }
        }

        report.rows_sampled = positions.len();
        if !report.misaligned_rows.is_empty() {
            report.is_consistent = false;
            report.log_issues();
        }
        Ok(report)
    }
}

/// Up to `sample` positions spread evenly over `0..len`, always including the last row
fn sample_positions(len: usize, sample: usize) -> Vec<usize> {
    if len == 0 || sample == 0 {
        return Vec::new();
    }
    if sample >= len {
        return (0..len).collect();
    }
    if sample == 1 {
        return vec![len - 1];
    }

    let mut positions: Vec<usize> = (0..sample)
        .map(|i| i * (len - 1) / (sample - 1))
        .collect();
    positions.dedup();
    positions
}
