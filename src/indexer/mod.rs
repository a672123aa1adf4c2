// Corpus ingestion
// Embeds the corpus query column in row order and creates or extends the index file

pub mod consistency;

#[cfg(test)]
mod tests;

use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub use consistency::{ConsistencyReport, ConsistencyValidator};

use crate::config::Config;
use crate::corpus::{Corpus, CorpusColumns};
use crate::embeddings::{Embedder, Embedding};
use crate::index::{IndexStore, SharedIndex};
use crate::{Result, SupportError};

/// Compare the configured corpus file with the configured index file. No service is called.
#[inline]
pub fn verify(config: &Config) -> Result<ConsistencyReport> {
    let corpus = Corpus::load(&config.corpus_path(), &CorpusColumns::from_config(config))?;
    let index = IndexStore::from_config(config).open()?;
    Ok(ConsistencyValidator::new(&corpus, &index).validate())
}

/// Outcome of a build or append run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingStats {
    /// Rows embedded by this run
    pub rows_embedded: usize,
    /// Index positions the new vectors landed at
    pub positions: Range<usize>,
    /// Vectors in the index afterwards
    pub total_vectors: usize,
}

/// Writes the index for one corpus file. Only one ingestion may run per index file at a time;
/// a lock file next to the index enforces this across processes.
#[derive(Debug)]
pub struct Indexer<E> {
    embedder: E,
    model_id: String,
    store: IndexStore,
    corpus_path: PathBuf,
    columns: CorpusColumns,
    batch_size: usize,
    show_progress: bool,
}

impl<E: Embedder> Indexer<E> {
    #[inline]
    pub fn new(embedder: E, config: &Config) -> Self {
        Self {
            embedder,
            model_id: config.retrieval.embedding_model.clone(),
            store: IndexStore::from_config(config),
            corpus_path: config.corpus_path(),
            columns: CorpusColumns::from_config(config),
            batch_size: config.service.batch_size.max(1),
            show_progress: false,
        }
    }

    /// Show a progress bar on stderr while embedding, when stderr is a terminal
    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    #[inline]
    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    #[inline]
    pub fn corpus_path(&self) -> &Path {
        &self.corpus_path
    }

    /// Build a fresh index from the whole corpus.
    ///
    /// An existing index file is only replaced when `force` is set.
    #[inline]
    pub fn build(&self, force: bool) -> Result<IndexingStats> {
        let _lock = IndexLock::acquire(self.store.path())?;

        if self.store.exists() && !force {
            return Err(SupportError::InvalidArgument(format!(
                "an index already exists at {}; rebuild it with --force or use append",
                self.store.path().display()
            )));
        }

        let corpus = Corpus::load(&self.corpus_path, &self.columns)?;
        info!(
            "Building index for {} corpus rows with {}",
            corpus.len(),
            self.model_id
        );

        let vectors = self.embed_column(&corpus.queries())?;

        let mut index = self.store.create()?;
        let positions = index.add(&vectors)?;
        self.store.persist(&index)?;

        info!(
            "Index built with {} vectors at {}",
            index.len(),
            self.store.path().display()
        );
        Ok(IndexingStats {
            rows_embedded: vectors.len(),
            positions,
            total_vectors: index.len(),
        })
    }

    /// Append new rows to the corpus file and their vectors to the existing index.
    ///
    /// The corpus and index must agree before anything is written. If the index cannot be
    /// persisted the corpus file is restored, so row *i* keeps matching vector *i*.
    #[inline]
    pub fn append(&self, new_rows: &Corpus) -> Result<IndexingStats> {
        let _lock = IndexLock::acquire(self.store.path())?;

        let shared = SharedIndex::open(self.store.clone())?;
        let corpus = Corpus::load(&self.corpus_path, &self.columns)?;

        let report = ConsistencyReport::compare(corpus.len(), shared.len());
        if !report.is_consistent {
            report.log_issues();
            return Err(SupportError::Corpus(format!(
                "corpus has {} rows but the index holds {} vectors; rebuild the index before appending",
                report.corpus_rows, report.index_vectors
            )));
        }

        if new_rows.is_empty() {
            info!("No new rows to append");
            return Ok(IndexingStats {
                rows_embedded: 0,
                positions: shared.len()..shared.len(),
                total_vectors: shared.len(),
            });
        }

        info!("Appending {} rows to the corpus and index", new_rows.len());
        let vectors = self.embed_column(&new_rows.queries())?;

        let original_corpus = fs::read(&self.corpus_path)?;
        Corpus::append_to_file(&self.corpus_path, &self.columns, new_rows)?;

        let positions = match shared.append(&vectors) {
            Ok(positions) => positions,
            Err(e) => {
                error!("Index append failed, restoring corpus file: {}", e);
                if let Err(restore_error) = fs::write(&self.corpus_path, &original_corpus) {
                    error!(
                        "Failed to restore corpus file {}: {}",
                        self.corpus_path.display(),
                        restore_error
                    );
                }
                return Err(e);
            }
        };

        info!(
            "Appended vectors at positions {}..{} ({} total)",
            positions.start,
            positions.end,
            shared.len()
        );
        Ok(IndexingStats {
            rows_embedded: vectors.len(),
            positions,
            total_vectors: shared.len(),
        })
    }

    /// Compare the corpus file with the index file
    #[inline]
    pub fn verify(&self) -> Result<ConsistencyReport> {
        let corpus = Corpus::load(&self.corpus_path, &self.columns)?;
        let index = self.store.open()?;
        Ok(ConsistencyValidator::new(&corpus, &index).validate())
    }

    /// Verify counts, then re-embed up to `sample` rows and check each retrieves itself
    #[inline]
    pub fn verify_deep(&self, sample: usize) -> Result<ConsistencyReport> {
        let corpus = Corpus::load(&self.corpus_path, &self.columns)?;
        let index = self.store.open()?;
        let validator = ConsistencyValidator::new(&corpus, &index);

        let mut report = validator.validate();
        if report.is_consistent {
            report = validator.spot_check(&self.embedder, &self.model_id, sample, report)?;
        }
        Ok(report)
    }

    /// Embed texts in order, batch by batch, checking every vector fits the index
    fn embed_column(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let bar = if self.show_progress && console::user_attended_stderr() {
            ProgressBar::new(texts.len() as u64).with_style(
                ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(self.model_id.clone());

        let mut vectors = Vec::with_capacity(texts.len());
        for (batch_number, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!(
                "Embedding batch {} ({} rows)",
                batch_number + 1,
                batch.len()
            );
            let embedded = self
                .embedder
                .embed_batch(batch, &self.model_id)
                .inspect_err(|e| {
                    warn!(
                        "Embedding failed at batch starting row {}: {}",
                        batch_number * self.batch_size,
                        e
                    );
                })?;

            if embedded.len() != batch.len() {
                return Err(SupportError::ExternalService {
                    service: "embedding",
                    message: format!(
                        "expected {} vectors for the batch, got {}",
                        batch.len(),
                        embedded.len()
                    ),
                    retryable: false,
                });
            }
            if let Some(vector) = embedded
                .iter()
                .find(|v| v.len() != self.store.dimension())
            {
                return Err(SupportError::DimensionMismatch {
                    expected: self.store.dimension(),
                    actual: vector.len(),
                });
            }

            vectors.extend(embedded);
            bar.set_position(vectors.len() as u64);
        }

        bar.finish_and_clear();
        Ok(vectors)
    }
}

/// Lock file guarding an index against concurrent ingestion runs, removed on drop
#[derive(Debug)]
struct IndexLock {
    path: PathBuf,
}

impl IndexLock {
    fn acquire(index_path: &Path) -> Result<Self> {
        let mut name = index_path.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                debug!("Acquired index lock {}", path.display());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(SupportError::IndexPersist(format!(
                    "another ingestion run holds {}; remove it if no run is active",
                    path.display()
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for IndexLock {
    #[inline]
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove index lock {}: {}", self.path.display(), e);
        }
    }
}
