// Support corpus module
// Loads the historical query/response table whose row order is the index's identifier scheme


use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::Config;
use crate::{Result, SupportError};

/// One row of the support corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Row number in the source table, which is also the record's index position
    pub position: usize,
    pub query: String,
    pub response: String,
}

/// Names of the two columns the corpus is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusColumns {
    pub query: String,
    pub response: String,
}

impl Default for CorpusColumns {
    #[inline]
    fn default() -> Self {
        Self {
            query: "query".to_string(),
            response: "response".to_string(),
        }
    }
}

impl CorpusColumns {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            query: config.retrieval.query_column.clone(),
            response: config.retrieval.response_column.clone(),
        }
    }

    fn locate(&self, headers: &csv::StringRecord) -> Result<(usize, usize)> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|header| header.trim().eq_ignore_ascii_case(name.trim()))
                .ok_or_else(|| {
                    SupportError::Corpus(format!(
                        "missing column '{}' (found: {})",
                        name,
                        headers.iter().collect::<Vec<_>>().join(", ")
                    ))
                })
        };
        Ok((find(&self.query)?, find(&self.response)?))
    }
}

/// Read-only table of support records, in row order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    records: Vec<Record>,
}

impl Corpus {
    /// Build a corpus from in-memory pairs, numbering rows from zero
    #[inline]
    pub fn from_pairs<Q, R>(pairs: impl IntoIterator<Item = (Q, R)>) -> Self
    where
        Q: Into<String>,
        R: Into<String>,
    {
        let records = pairs
            .into_iter()
            .enumerate()
            .map(|(position, (query, response))| Record {
                position,
                query: query.into(),
                response: response.into(),
            })
            .collect();
        Self { records }
    }

    /// Load a CSV corpus. Every row must have a non-empty query since each row gets exactly
    /// one vector.
    #[inline]
    pub fn load(path: &Path, columns: &CorpusColumns) -> Result<Self> {
        debug!("Loading corpus from {}", path.display());

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|e| {
                SupportError::Corpus(format!("Failed to open {}: {}", path.display(), e))
            })?;

        let headers = reader
            .headers()
            .map_err(|e| SupportError::Corpus(format!("Failed to read header row: {}", e)))?
            .clone();
        let (query_idx, response_idx) = columns.locate(&headers)?;

        let mut records = Vec::new();
        for (position, row) in reader.records().enumerate() {
            let row = row.map_err(|e| {
                SupportError::Corpus(format!("Malformed row {}: {}", position, e))
            })?;

            let query = row.get(query_idx).unwrap_or_default();
            if query.trim().is_empty() {
                return Err(SupportError::Corpus(format!(
                    "row {} has an empty '{}' value",
                    position, columns.query
                )));
            }

            records.push(Record {
                position,
                query: query.to_string(),
                response: row.get(response_idx).unwrap_or_default().to_string(),
            });
        }

        info!(
            "Loaded corpus of {} records from {}",
            records.len(),
            path.display()
        );
        Ok(Self { records })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[inline]
    pub fn get(&self, position: usize) -> Option<&Record> {
        self.records.get(position)
    }

    /// Query texts in row order, ready for batch embedding
    #[inline]
    pub fn queries(&self) -> Vec<String> {
        self.records.iter().map(|r| r.query.clone()).collect()
    }

    /// Append another corpus, renumbering its rows to follow this one
    #[inline]
    pub fn extend(&mut self, other: Self) {
        let offset = self.records.len();
        self.records
            .extend(other.records.into_iter().map(|record| Record {
                position: offset + record.position,
                ..record
            }));
    }

    /// Write the corpus as a two-column CSV, replacing `path` atomically
    #[inline]
    pub fn save(&self, path: &Path, columns: &CorpusColumns) -> Result<()> {
        let temp = temp_file_beside(path)?;
        {
            let mut writer = csv::Writer::from_writer(temp.as_file());
            writer
                .write_record([columns.query.as_str(), columns.response.as_str()])
                .map_err(|e| SupportError::Corpus(format!("Failed to write header: {}", e)))?;
            for record in &self.records {
                writer
                    .write_record([record.query.as_str(), record.response.as_str()])
                    .map_err(|e| SupportError::Corpus(format!("Failed to write row: {}", e)))?;
            }
            writer.flush()?;
        }
        replace_with(temp, path)
    }

    /// Append rows to an existing CSV corpus file, keeping its header and any extra columns
    /// (left empty for the new rows). The file is replaced atomically.
    #[inline]
    pub fn append_to_file(path: &Path, columns: &CorpusColumns, new_rows: &Self) -> Result<()> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|e| {
                SupportError::Corpus(format!("Failed to open {}: {}", path.display(), e))
            })?;
        let headers = reader
            .headers()
            .map_err(|e| SupportError::Corpus(format!("Failed to read header row: {}", e)))?
            .clone();
        let (query_idx, response_idx) = columns.locate(&headers)?;

        let mut temp = temp_file_beside(path)?;
        {
            let mut existing = fs::File::open(path)?;
            io::copy(&mut existing, temp.as_file_mut())?;
        }
        ensure_trailing_newline(temp.as_file_mut())?;

        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(temp.as_file());
            for record in &new_rows.records {
                let mut row = vec![""; headers.len()];
                row[query_idx] = record.query.as_str();
                row[response_idx] = record.response.as_str();
                writer
                    .write_record(&row)
                    .map_err(|e| SupportError::Corpus(format!("Failed to write row: {}", e)))?;
            }
            writer.flush()?;
        }

        replace_with(temp, path)?;
        info!(
            "Appended {} records to corpus {}",
            new_rows.len(),
            path.display()
        );
        Ok(())
    }
}

fn temp_file_beside(path: &Path) -> Result<NamedTempFile> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    Ok(NamedTempFile::new_in(parent)?)
}

fn replace_with(temp: NamedTempFile, path: &Path) -> Result<()> {
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| {
        SupportError::Corpus(format!(
            "Failed to replace corpus file {}: {}",
            path.display(),
            e.error
        ))
    })?;
    Ok(())
}

fn ensure_trailing_newline(file: &mut fs::File) -> Result<()> {
    let len = file.seek(SeekFrom::End(0))?;
    if len == 0 {
        return Ok(());
    }

    file.seek(SeekFrom::End(-1))?;
    let mut last = [0_u8; 1];
    io::Read::read_exact(file, &mut last)?;
    file.seek(SeekFrom::End(0))?;
    if last[0] != b'\n' {
        file.write_all(b"\n")?;
    }
    Ok(())
}
