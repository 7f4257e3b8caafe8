//! The persisted GBI dataset: one flat table, partitioned by symbol.
//!
//! Layout on disk:
//! - `{path}`: CSV with columns `Date,Stock Price,Gold Price,GBI,Stock Symbol`
//! - `{path}.meta.json`: sidecar with row count, per-symbol coverage, hash
//!
//! The dataset is loaded once, appended to in memory, and written back in
//! full. Writes are atomic (write to `.tmp`, rename into place).

use crate::gbi::GbiRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column headers of the persisted table, in order.
pub const COLUMNS: [&str; 5] = ["Date", "Stock Price", "Gold Price", "GBI", "Stock Symbol"];

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dataset CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("dataset schema mismatch: expected columns {expected:?}, found {found:?}")]
    Schema {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("dataset metadata error: {0}")]
    Meta(#[from] serde_json::Error),
}

/// Earliest and latest date present for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageWindow {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
}

impl CoverageWindow {
    /// True when `[start, end]` lies inside this window.
    pub fn contains(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.earliest <= start && self.latest >= end
    }
}

/// How an incoming batch is merged into an existing partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Append every row. Boundary dates shared with existing rows end up
    /// twice in the partition.
    #[default]
    Append,
    /// Drop incoming rows whose `(symbol, date)` is already present; the
    /// existing row wins.
    KeepExisting,
}

/// In-memory dataset. Rows keep insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<GbiRecord>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<GbiRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[GbiRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows belonging to `symbol`, in insertion order.
    pub fn partition<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a GbiRecord> + 'a {
        self.records.iter().filter(move |r| r.symbol == symbol)
    }

    pub fn partition_len(&self, symbol: &str) -> usize {
        self.partition(symbol).count()
    }

    /// Min/max date of the symbol's partition, `None` if it has no rows.
    pub fn coverage(&self, symbol: &str) -> Option<CoverageWindow> {
        self.partition(symbol).fold(None, |acc, r| {
            Some(match acc {
                None => CoverageWindow {
                    earliest: r.date,
                    latest: r.date,
                },
                Some(w) => CoverageWindow {
                    earliest: w.earliest.min(r.date),
                    latest: w.latest.max(r.date),
                },
            })
        })
    }

    /// Distinct symbols in order of first appearance.
    pub fn symbols(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.symbol.as_str()))
            .map(|r| r.symbol.as_str())
            .collect()
    }

    /// Number of rows in the partition whose date already appeared earlier in
    /// the same partition.
    pub fn duplicate_dates(&self, symbol: &str) -> usize {
        let mut seen = HashSet::new();
        self.partition(symbol).filter(|r| !seen.insert(r.date)).count()
    }

    /// Append one batch under `policy`. Returns the number of rows appended.
    pub fn append_batch(&mut self, batch: Vec<GbiRecord>, policy: MergePolicy) -> usize {
        match policy {
            MergePolicy::Append => {
                let n = batch.len();
                self.records.extend(batch);
                n
            }
            MergePolicy::KeepExisting => {
                let existing: HashSet<(String, NaiveDate)> = self
                    .records
                    .iter()
                    .map(|r| (r.symbol.clone(), r.date))
                    .collect();
                let before = self.records.len();
                self.records.extend(
                    batch
                        .into_iter()
                        .filter(|r| !existing.contains(&(r.symbol.clone(), r.date))),
                );
                self.records.len() - before
            }
        }
    }

    /// Serialize to CSV bytes. The header is written even when empty.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, DatasetError> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(vec![]);
        wtr.write_record(COLUMNS)?;
        for record in &self.records {
            wtr.serialize(record)?;
        }
        wtr.into_inner()
            .map_err(|e| DatasetError::Csv(e.into_error().into()))
    }

    /// Parse CSV produced by [`Dataset::to_csv_bytes`] (or the same schema).
    pub fn from_csv_reader<R: std::io::Read>(reader: R) -> Result<Self, DatasetError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();
        if headers.iter().ne(COLUMNS.iter().copied()) {
            return Err(DatasetError::Schema {
                expected: COLUMNS.iter().map(|c| c.to_string()).collect(),
                found: headers.iter().map(String::from).collect(),
            });
        }

        let records = rdr
            .deserialize::<GbiRecord>()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { records })
    }
}

/// Sidecar written next to the dataset file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub row_count: usize,
    pub coverage: BTreeMap<String, SymbolCoverage>,
    pub data_hash: String,
    pub written_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolCoverage {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
    pub rows: usize,
    pub duplicate_dates: usize,
}

impl DatasetMeta {
    fn describe(dataset: &Dataset, csv_bytes: &[u8]) -> Self {
        let coverage = dataset
            .symbols()
            .into_iter()
            .filter_map(|sym| {
                let window = dataset.coverage(sym)?;
                Some((
                    sym.to_string(),
                    SymbolCoverage {
                        earliest: window.earliest,
                        latest: window.latest,
                        rows: dataset.partition_len(sym),
                        duplicate_dates: dataset.duplicate_dates(sym),
                    },
                ))
            })
            .collect();

        Self {
            row_count: dataset.len(),
            coverage,
            data_hash: blake3::hash(csv_bytes).to_hex().to_string(),
            written_at: chrono::Local::now().naive_local(),
        }
    }
}

/// File-backed store for a single dataset.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    path: PathBuf,
}

impl DatasetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the metadata sidecar: `{path}.meta.json`.
    pub fn meta_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".meta.json");
        PathBuf::from(name)
    }

    /// Load the dataset. A missing file is an empty dataset.
    pub fn load(&self) -> Result<Dataset, DatasetError> {
        if !self.path.exists() {
            return Ok(Dataset::new());
        }
        let file = fs::File::open(&self.path).map_err(|source| DatasetError::Io {
            path: self.path.clone(),
            source,
        })?;
        Dataset::from_csv_reader(file)
    }

    /// Overwrite the file with the full dataset and refresh the sidecar.
    pub fn save(&self, dataset: &Dataset) -> Result<DatasetMeta, DatasetError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| DatasetError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let bytes = dataset.to_csv_bytes()?;
        atomic_write(&self.path, &bytes)?;

        let meta = DatasetMeta::describe(dataset, &bytes);
        let meta_json = serde_json::to_vec_pretty(&meta)?;
        atomic_write(&self.meta_path(), &meta_json)?;

        Ok(meta)
    }

    /// Read the sidecar, if present and parseable.
    pub fn load_meta(&self) -> Option<DatasetMeta> {
        let content = fs::read_to_string(self.meta_path()).ok()?;
        serde_json::from_str(&content).ok()
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), DatasetError> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    fs::write(&tmp_path, bytes).map_err(|source| DatasetError::Io {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        DatasetError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}
