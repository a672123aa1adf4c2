
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use super::{DistanceMetric, FlatIndex, Neighbors};
use crate::config::Config;
use crate::{Result, SupportError};

const INDEX_MAGIC: [u8; 7] = *b"SRAGIDX";
const FORMAT_VERSION: u32 = 1;

/// On-disk layout of a persisted index
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    magic: [u8; 7],
    version: u32,
    dimension: u64,
    metric: DistanceMetric,
    count: u64,
    data: Vec<f32>,
}

/// Serialize the complete index to `path`.
///
/// The bytes go to a temporary file next to the target which is then renamed over it, so a
/// crash mid-write leaves the previous file intact.
#[inline]
pub fn persist(index: &FlatIndex, path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| {
        SupportError::IndexPersist(format!(
            "Failed to create index directory {}: {}",
            parent.display(),
            e
        ))
    })?;

    let file = IndexFile {
        magic: INDEX_MAGIC,
        version: FORMAT_VERSION,
        dimension: index.dimension() as u64,
        metric: index.metric(),
        count: index.len() as u64,
        data: index.as_slice().to_vec(),
    };

    let temp = NamedTempFile::new_in(&parent).map_err(|e| {
        SupportError::IndexPersist(format!("Failed to create temporary index file: {}", e))
    })?;

    {
        let mut writer = BufWriter::new(temp.as_file());
        bincode::serialize_into(&mut writer, &file).map_err(|e| {
            SupportError::IndexPersist(format!("Failed to serialize index: {}", e))
        })?;
        writer
            .flush()
            .map_err(|e| SupportError::IndexPersist(format!("Failed to write index: {}", e)))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|e| SupportError::IndexPersist(format!("Failed to sync index file: {}", e)))?;

    temp.persist(path).map_err(|e| {
        error!("Failed to move index into place at {}: {}", path.display(), e);
        SupportError::IndexPersist(format!(
            "Failed to replace index file {}: {}",
            path.display(),
            e.error
        ))
    })?;

    info!(
        "Persisted index with {} vectors to {}",
        index.len(),
        path.display()
    );
    Ok(())
}

/// Read an index from `path`, requiring it to hold vectors of `expected_dimension`
#[inline]
pub fn load(path: &Path, expected_dimension: usize) -> Result<FlatIndex> {
    debug!("Loading index from {}", path.display());

    if !path.exists() {
        return Err(SupportError::IndexLoad(format!(
            "index file {} does not exist",
            path.display()
        )));
    }

    let handle = fs::File::open(path).map_err(|e| {
        SupportError::IndexLoad(format!("Failed to open {}: {}", path.display(), e))
    })?;

    let file: IndexFile = bincode::deserialize_from(BufReader::new(handle)).map_err(|e| {
        warn!("Index file {} could not be decoded: {}", path.display(), e);
        SupportError::IndexLoad(format!(
            "index file {} is corrupt: {}",
            path.display(),
            e
        ))
    })?;

    if file.magic != INDEX_MAGIC {
        return Err(SupportError::IndexLoad(format!(
            "{} is not an index file",
            path.display()
        )));
    }
    if file.version != FORMAT_VERSION {
        return Err(SupportError::IndexLoad(format!(
            "unsupported index format version {} (expected {})",
            file.version, FORMAT_VERSION
        )));
    }

    let dimension = usize::try_from(file.dimension).map_err(|_| {
        SupportError::IndexLoad(format!("stored dimension {} is too large", file.dimension))
    })?;
    if dimension != expected_dimension {
        return Err(SupportError::IndexLoad(format!(
            "index stores {}-dimensional vectors but the embedding model produces {}",
            dimension, expected_dimension
        )));
    }

    let expected_values = file.count.checked_mul(file.dimension);
    if expected_values != Some(file.data.len() as u64) {
        return Err(SupportError::IndexLoad(format!(
            "index file {} is corrupt: header declares {} vectors but payload holds {} values",
            path.display(),
            file.count,
            file.data.len()
        )));
    }

    let index = FlatIndex::from_parts(dimension, file.metric, file.data)?;
    info!(
        "Loaded index with {} vectors ({} dims, {}) from {}",
        index.len(),
        dimension,
        index.metric(),
        path.display()
    );
    Ok(index)
}

/// Index persistence bound to one path, dimension and metric.
///
/// `create` and `open` are separate on purpose: whether a corpus build starts from scratch or
/// appends is the caller's decision, never inferred from the file being present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStore {
    path: PathBuf,
    dimension: usize,
    metric: DistanceMetric,
}

impl IndexStore {
    #[inline]
    pub fn new(path: impl Into<PathBuf>, dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            path: path.into(),
            dimension,
            metric,
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.index_path(),
            config.retrieval.embedding_dimension,
            config.retrieval.metric,
        )
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    #[inline]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// A new, empty index with the configured dimension and metric. Nothing is written until
    /// `persist`.
    #[inline]
    pub fn create(&self) -> Result<FlatIndex> {
        info!(
            "Creating new {} index ({} dims) for {}",
            self.metric,
            self.dimension,
            self.path.display()
        );
        FlatIndex::create(self.dimension, self.metric)
    }

    /// Load the existing index, rejecting one built with a different metric
    #[inline]
    pub fn open(&self) -> Result<FlatIndex> {
        let index = load(&self.path, self.dimension)?;
        if index.metric() != self.metric {
            return Err(SupportError::IndexLoad(format!(
                "index at {} was built with the {} metric but {} is configured",
                self.path.display(),
                index.metric(),
                self.metric
            )));
        }
        Ok(index)
    }

    #[inline]
    pub fn persist(&self, index: &FlatIndex) -> Result<()> {
        if index.dimension() != self.dimension || index.metric() != self.metric {
            return Err(SupportError::InvalidArgument(format!(
                "index ({} dims, {}) does not match store ({} dims, {})",
                index.dimension(),
                index.metric(),
                self.dimension,
                self.metric
            )));
        }
        persist(index, &self.path)
    }
}

/// Long-lived in-memory index shared between readers and a single writer.
///
/// Searches take the read lock. Appends take the write lock for the in-memory update and the
/// file write only; embedding happens before the lock is taken.
#[derive(Debug)]
pub struct SharedIndex {
    store: IndexStore,
    index: RwLock<FlatIndex>,
}

impl SharedIndex {
    #[inline]
    pub fn new(store: IndexStore, index: FlatIndex) -> Self {
        Self {
            store,
            index: RwLock::new(index),
        }
    }

    /// Load the index once from the store's path
    #[inline]
    pub fn open(store: IndexStore) -> Result<Self> {
        let index = store.open()?;
        Ok(Self::new(store, index))
    }

    #[inline]
    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.index.read().dimension()
    }

    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.index.read().metric()
    }

    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Neighbors> {
        self.index.read().search(query, k)
    }

    /// Append vectors and persist, all under the write lock.
    ///
    /// If the file cannot be written the in-memory index is rolled back so memory and disk
    /// never disagree.
    #[inline]
    pub fn append(&self, vectors: &[Vec<f32>]) -> Result<Range<usize>> {
        let mut index = self.index.write();
        let previous_len = index.len();
        let positions = index.add(vectors)?;

        if let Err(e) = self.store.persist(&index) {
            error!("Persisting appended vectors failed, rolling back: {}", e);
            index.truncate(previous_len);
            return Err(e);
        }

        Ok(positions)
    }

    /// Re-read the index file after an external corpus update
    #[inline]
    pub fn reload(&self) -> Result<usize> {
        let fresh = self.store.open()?;
        let len = fresh.len();
        *self.index.write() = fresh;
        info!("Reloaded index from {} ({} vectors)", self.store.path().display(), len);
        Ok(len)
    }

    /// Copy of the current index contents
    #[inline]
    pub fn snapshot(&self) -> FlatIndex {
        self.index.read().clone()
    }
}
