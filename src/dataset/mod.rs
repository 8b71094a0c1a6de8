//! In-memory currency dataset.
//!
//! The dataset is loaded once at process start from a CSV file and never mutated afterwards.
//! Connection handlers share it read-only (usually behind an [`Arc`](std::sync::Arc)), so no
//! synchronization is needed once [`Dataset::load`] returns.
//!
//! # Source Format
//!
//! The CSV file must carry a header row naming the `code`, `name`, `country` and `symbol`
//! columns (any order, case-insensitive). Extra columns are ignored and surrounding whitespace
//! is trimmed from every field.
//!
//! ```text
//! code,name,country,symbol
//! USD,US Dollar,United States,$
//! EUR,Euro,European Union,€
//! ```
//!
//! # Matching
//!
//! [`Dataset::find`] treats an empty selector or [`WILDCARD`] as "everything". Any other
//! selector is compared case-insensitively: it matches a record whose code equals it, or
//! whose name or country contains it. Results keep load order.
mod record;

use std::{fs::File, io::Read, path::Path};

use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info};
use thiserror::Error;

pub use record::Record;

/// Selector matching every record.
pub const WILDCARD: &str = "*";

const COLUMNS: [&str; 4] = ["code", "name", "country", "symbol"];

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to open dataset '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed dataset: {0}")]
    Csv(#[from] csv::Error),
    #[error("dataset is missing column '{0}'")]
    MissingColumn(&'static str),
    #[error("row {row} has no value for column '{column}'")]
    ShortRow { row: usize, column: &'static str },
}

/// Read-only, ordered collection of currency records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    records: Vec<Record>,
}

impl Dataset {
    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Loads the dataset from a CSV file on disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DatasetError::Open {
            path: path.display().to_string(),
            source,
        })?;

        let dataset = Self::from_reader(file)?;
        info!(
            "loaded {} currencies from {}",
            dataset.len(),
            path.display()
        );
        Ok(dataset)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let columns = column_indices(reader.headers()?)?;
        let mut records = Vec::new();

        for (i, row) in reader.records().enumerate() {
            let row = row?;
            let field = |slot: usize| {
                row.get(columns[slot])
                    .map(str::to_string)
                    .ok_or(DatasetError::ShortRow {
                        row: i + 1,
                        column: COLUMNS[slot],
                    })
            };

            records.push(Record {
                code: field(0)?,
                name: field(1)?,
                country: field(2)?,
                symbol: field(3)?,
            });
        }

        debug!("parsed {} dataset rows", records.len());
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns every record matching `selector`, in load order.
    pub fn find(&self, selector: &str) -> Vec<Record> {
        let selector = selector.trim();
        if selector.is_empty() || selector == WILDCARD {
            return self.records.clone();
        }

        let needle = selector.to_lowercase();
        self.records
            .iter()
            .filter(|record| record.matches(&needle))
            .cloned()
            .collect()
    }
}

fn column_indices(headers: &StringRecord) -> Result<[usize; 4], DatasetError> {
    let mut indices = [0; 4];
    for (slot, column) in COLUMNS.iter().enumerate() {
        indices[slot] = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(column))
            .ok_or(DatasetError::MissingColumn(column))?;
    }
    Ok(indices)
}
