//! Embedding-column vector storage.
//!
//! Vector columns arrive in tabular files as text, either a base64
//! encoding of raw little-endian floats or a plain separated list of
//! numbers. At import time each value is decoded, optionally
//! L2-normalized, re-encoded at the configured dtype, and stored
//! either inline as a BLOB in the graph table or appended to an
//! external flat file beside the database. External files are pure
//! little-endian vector data: the vector for table row `N` lives at
//! byte offset `(N - 1) * dim * dtype_size`, so lookups are a seek and
//! one read.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use half::f16;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{QuiverError, Result};
use crate::index::VectorColumn;

/// Element type vectors are stored at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorDtype {
    /// Half-precision floats.
    Float16,
    /// Single-precision floats (the default).
    Float32,
    /// Double-precision floats.
    Float64,
}

impl VectorDtype {
    /// Parses a dtype option value.
    pub fn parse(text: &str) -> Result<VectorDtype> {
        match text.to_ascii_lowercase().as_str() {
            "float16" | "f16" | "half" => Ok(VectorDtype::Float16),
            "float32" | "f32" | "float" => Ok(VectorDtype::Float32),
            "float64" | "f64" | "double" => Ok(VectorDtype::Float64),
            other => Err(QuiverError::Configuration(format!(
                "unknown vector dtype '{other}'"
            ))),
        }
    }

    /// Bytes per element.
    pub fn size(&self) -> usize {
        match self {
            VectorDtype::Float16 => 2,
            VectorDtype::Float32 => 4,
            VectorDtype::Float64 => 8,
        }
    }
}

/// Source text format of a vector column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorFormat {
    /// base64 of raw little-endian floats.
    Base64,
    /// Separated list of decimal numbers.
    Text,
    /// Decide per value: base64 unless a list separator is present.
    Auto,
}

/// Where the re-encoded vectors live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorStorage {
    /// BLOB column in the graph table.
    Inline,
    /// Flat file beside the database.
    External,
}

/// Resolved configuration of one vector column.
#[derive(Debug, Clone)]
pub struct VectorConfig {
    /// Storage dtype.
    pub dtype: VectorDtype,
    /// Source text format.
    pub format: VectorFormat,
    /// Inline or external storage.
    pub storage: VectorStorage,
    /// Whether values are L2-normalized at import.
    pub normalized: bool,
    /// Flat-file path for external storage.
    pub path: Option<PathBuf>,
}

impl VectorConfig {
    /// Resolves configuration from an index description's option list.
    pub fn from_column(column: &VectorColumn, default_path: PathBuf) -> Result<VectorConfig> {
        let mut config = VectorConfig {
            dtype: VectorDtype::Float32,
            format: VectorFormat::Auto,
            storage: VectorStorage::Inline,
            normalized: false,
            path: None,
        };
        for (key, value) in &column.options {
            match key.as_str() {
                "dtype" => config.dtype = VectorDtype::parse(value)?,
                "fmt" => {
                    config.format = match value.to_ascii_lowercase().as_str() {
                        "base64" => VectorFormat::Base64,
                        "text" => VectorFormat::Text,
                        "auto" => VectorFormat::Auto,
                        other => {
                            return Err(QuiverError::Configuration(format!(
                                "unknown vector format '{other}'"
                            )))
                        }
                    }
                }
                "norm" => match value.to_ascii_lowercase().as_str() {
                    "l2" | "true" => config.normalized = true,
                    "false" | "none" => config.normalized = false,
                    other => {
                        return Err(QuiverError::Configuration(format!(
                            "unknown vector norm '{other}'"
                        )))
                    }
                },
                "store" => {
                    config.storage = match value.to_ascii_lowercase().as_str() {
                        "inline" => VectorStorage::Inline,
                        // Array-file stores all behave as external flat
                        // files at this level.
                        "external" | "array" | "numpy" | "hd5" => VectorStorage::External,
                        other => {
                            return Err(QuiverError::Configuration(format!(
                                "unknown vector store '{other}'"
                            )))
                        }
                    }
                }
                "ext" => config.path = Some(PathBuf::from(value)),
                // Accepted and recorded; nearest-neighbor backends are
                // resolved at search time.
                "nn" | "ram" | "nlist" | "niter" | "nprobe" => {}
                other => {
                    return Err(QuiverError::Configuration(format!(
                        "unknown vector option '{other}'"
                    )))
                }
            }
        }
        if config.storage == VectorStorage::External && config.path.is_none() {
            config.path = Some(default_path);
        }
        Ok(config)
    }
}

/// One vector column's runtime state.
#[derive(Debug)]
pub struct VectorDataset {
    /// Owning graph table.
    pub table: String,
    /// Column name.
    pub column: String,
    /// Resolved configuration.
    pub config: VectorConfig,
    /// Element count, fixed by the first imported value.
    pub dim: Option<usize>,
    /// Rows imported so far.
    pub rows: usize,
    writer: Option<BufWriter<File>>,
}

impl VectorDataset {
    fn row_bytes(&self) -> Option<usize> {
        self.dim.map(|dim| dim * self.config.dtype.size())
    }
}

/// Manager for all vector columns of one store, keyed `table:column`.
#[derive(Debug, Default)]
pub struct VectorStore {
    datasets: FxHashMap<String, VectorDataset>,
}

fn dataset_key(table: &str, column: &str) -> String {
    format!("{table}:{column}")
}

impl VectorStore {
    /// Creates an empty manager.
    pub fn new() -> VectorStore {
        VectorStore::default()
    }

    /// Registers a vector column ahead of import. `db_path` seeds the
    /// default external-file location.
    pub fn declare(
        &mut self,
        table: &str,
        column: &VectorColumn,
        db_path: &Path,
    ) -> Result<()> {
        let default_path =
            db_path.with_extension(format!("{table}.{}.vec", column.name));
        let config = VectorConfig::from_column(column, default_path)?;
        debug!(table, column = %column.name, ?config, "declaring vector column");
        self.datasets.insert(
            dataset_key(table, &column.name),
            VectorDataset {
                table: table.to_string(),
                column: column.name.clone(),
                config,
                dim: None,
                rows: 0,
                writer: None,
            },
        );
        Ok(())
    }

    /// Whether a column was declared as a vector column.
    pub fn is_declared(&self, table: &str, column: &str) -> bool {
        self.datasets.contains_key(&dataset_key(table, column))
    }

    /// The dataset for a declared column.
    pub fn dataset(&self, table: &str, column: &str) -> Option<&VectorDataset> {
        self.datasets.get(&dataset_key(table, column))
    }

    /// Whether a declared column stores L2-normalized vectors.
    pub fn is_normalized(&self, table: &str, column: &str) -> bool {
        self.dataset(table, column)
            .map(|d| d.config.normalized)
            .unwrap_or(false)
    }

    /// Imports one source value. Returns the bytes to store inline, or
    /// `None` when the vector went to the external file.
    pub fn import_value(
        &mut self,
        table: &str,
        column: &str,
        text: &str,
    ) -> Result<Option<Vec<u8>>> {
        let dataset = self
            .datasets
            .get_mut(&dataset_key(table, column))
            .ok_or_else(|| {
                QuiverError::Internal(format!(
                    "vector import into undeclared column {table}.{column}"
                ))
            })?;

        let mut values = parse_vector(text, dataset.config.format, dataset.config.dtype)?;
        match dataset.dim {
            None => dataset.dim = Some(values.len()),
            Some(dim) if dim != values.len() => {
                return Err(QuiverError::Configuration(format!(
                    "inconsistent vector length in {table}.{column}: \
                     expected {dim}, got {}",
                    values.len()
                )));
            }
            Some(_) => {}
        }
        if dataset.config.normalized {
            l2_normalize(&mut values);
        }
        let bytes = encode_vector(&values, dataset.config.dtype);
        dataset.rows += 1;

        match dataset.config.storage {
            VectorStorage::Inline => Ok(Some(bytes)),
            VectorStorage::External => {
                if dataset.writer.is_none() {
                    let path = dataset.config.path.as_ref().ok_or_else(|| {
                        QuiverError::Internal("external vector store without a path".into())
                    })?;
                    let file = OpenOptions::new()
                        .create(true)
                        .write(true)
                        .truncate(true)
                        .open(path)
                        .map_err(|e| {
                            QuiverError::store_io(path.display().to_string(), e.to_string())
                        })?;
                    dataset.writer = Some(BufWriter::new(file));
                }
                let writer = dataset.writer.as_mut().unwrap();
                writer.write_all(&bytes)?;
                Ok(None)
            }
        }
    }

    /// Flushes external writers after an import finishes.
    pub fn finish_import(&mut self, table: &str) -> Result<()> {
        for dataset in self.datasets.values_mut() {
            if dataset.table == table {
                if let Some(mut writer) = dataset.writer.take() {
                    writer.flush()?;
                }
            }
        }
        Ok(())
    }

    /// Fetches one vector as f64, from an inline blob or by seeking the
    /// external file at the given 1-based row id.
    pub fn get_vector(
        &self,
        table: &str,
        column: &str,
        rowid: i64,
        inline: Option<&[u8]>,
    ) -> Result<Vec<f64>> {
        let dataset = self.dataset(table, column).ok_or_else(|| {
            QuiverError::Internal(format!(
                "vector lookup on undeclared column {table}.{column}"
            ))
        })?;
        if let Some(bytes) = inline {
            return decode_vector(bytes, dataset.config.dtype);
        }
        let path = dataset.config.path.as_ref().ok_or_else(|| {
            QuiverError::Internal("external vector store without a path".into())
        })?;
        let row_bytes = dataset.row_bytes().ok_or_else(|| {
            QuiverError::Internal(format!(
                "vector dimension of {table}.{column} is not known yet"
            ))
        })?;
        let mut file = File::open(path)
            .map_err(|e| QuiverError::store_io(path.display().to_string(), e.to_string()))?;
        let offset = (rowid - 1) as u64 * row_bytes as u64;
        file.seek(SeekFrom::Start(offset))?;
        let mut bytes = vec![0u8; row_bytes];
        file.read_exact(&mut bytes)?;
        decode_vector(&bytes, dataset.config.dtype)
    }
}

/// Parses one source value into f64 elements.
pub fn parse_vector(text: &str, format: VectorFormat, dtype: VectorDtype) -> Result<Vec<f64>> {
    let trimmed = text.trim();
    let looks_textual = trimmed.starts_with('[')
        || trimmed.contains(',')
        || trimmed.contains(char::is_whitespace);
    let use_base64 = match format {
        VectorFormat::Base64 => true,
        VectorFormat::Text => false,
        VectorFormat::Auto => !looks_textual,
    };
    if use_base64 {
        let bytes = BASE64.decode(trimmed).map_err(|e| {
            QuiverError::Configuration(format!("invalid base64 vector value: {e}"))
        })?;
        decode_vector(&bytes, dtype)
    } else {
        let inner = trimmed
            .trim_start_matches('[')
            .trim_end_matches(']');
        inner
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<f64>().map_err(|_| {
                    QuiverError::Configuration(format!(
                        "invalid vector element '{part}'"
                    ))
                })
            })
            .collect()
    }
}

/// Encodes elements as little-endian bytes at the given dtype.
pub fn encode_vector(values: &[f64], dtype: VectorDtype) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * dtype.size());
    for &value in values {
        match dtype {
            VectorDtype::Float16 => {
                bytes.extend_from_slice(&f16::from_f64(value).to_le_bytes())
            }
            VectorDtype::Float32 => {
                bytes.extend_from_slice(&(value as f32).to_le_bytes())
            }
            VectorDtype::Float64 => bytes.extend_from_slice(&value.to_le_bytes()),
        }
    }
    bytes
}

/// Decodes little-endian bytes at the given dtype.
pub fn decode_vector(bytes: &[u8], dtype: VectorDtype) -> Result<Vec<f64>> {
    let size = dtype.size();
    if bytes.len() % size != 0 {
        return Err(QuiverError::Configuration(format!(
            "vector blob length {} is not a multiple of element size {size}",
            bytes.len()
        )));
    }
    let mut values = Vec::with_capacity(bytes.len() / size);
    for chunk in bytes.chunks_exact(size) {
        let value = match dtype {
            VectorDtype::Float16 => {
                f16::from_le_bytes([chunk[0], chunk[1]]).to_f64()
            }
            VectorDtype::Float32 => {
                f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64
            }
            VectorDtype::Float64 => f64::from_le_bytes(chunk.try_into().map_err(
                |_| QuiverError::Internal("bad f64 chunk length".into()),
            )?),
        };
        values.push(value);
    }
    Ok(values)
}

/// Scales the vector to unit L2 length. Zero vectors stay zero.
pub fn l2_normalize(values: &mut [f64]) {
    let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for value in values.iter_mut() {
            *value /= norm;
        }
    }
}
