//! CSV profile reader and JSON snapshot reader.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use morphoseg_collection::{BorderObject, CollectionError};
use morphoseg_dataset::Dataset;
use morphoseg_profile::Profile;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::IoError;
use crate::snapshot::DatasetSnapshot;

/// Reads angle profiles from a CSV file, one member per row.
///
/// Expected CSV format:
/// - Header row required: `object_id,0,1,...,n`
/// - First column is the object id; the rest are angle values from the
///   object's reference point
/// - Rows may differ in length; trailing empty cells are ignored
///
/// An object id that parses as a UUID becomes the member id. Any other id gets a
/// fresh random UUID. The raw id is always kept as the member name.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::MissingObjectId`] | A row has an empty first cell |
/// | [`IoError::NonFiniteValue`] | Cell is NaN, Inf, or unparseable float |
/// | [`IoError::DuplicateObjectId`] | Same object id appears twice |
/// | [`IoError::InvalidProfile`] | A row has too few values for a profile |
pub struct ProfileReader {
    path: PathBuf,
}

impl ProfileReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read and validate the CSV file, returning one member per row in file order.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<Vec<BorderObject>, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // rows are ragged, so the csv crate must not enforce a column count
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let header = rdr.headers().map_err(|e| IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        })?;
        debug!(columns = header.len(), "read CSV header");

        let mut members = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| IoError::CsvParse {
                path: self.path.clone(),
                offset: e.position().map_or(0, |p| p.byte()),
                source: e,
            })?;

            let object_id = record.get(0).unwrap_or("").trim().to_string();
            if object_id.is_empty() {
                return Err(IoError::MissingObjectId {
                    path: self.path.clone(),
                    row_index,
                });
            }
            if let Some(&first_row) = seen.get(&object_id) {
                return Err(IoError::DuplicateObjectId {
                    path: self.path.clone(),
                    object_id,
                    first_row,
                    second_row: row_index,
                });
            }
            seen.insert(object_id.clone(), row_index);

            let cells: Vec<&str> = record.iter().skip(1).map(str::trim).collect();
            let used = cells.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1);
            let mut values = Vec::with_capacity(used);
            for (col_index, raw) in cells[..used].iter().enumerate() {
                let value = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| IoError::NonFiniteValue {
                        path: self.path.clone(),
                        row_index,
                        col_index,
                        raw: (*raw).to_string(),
                    })?;
                values.push(value);
            }

            let invalid = |source: CollectionError| IoError::InvalidProfile {
                path: self.path.clone(),
                row_index,
                object_id: object_id.clone(),
                source,
            };
            let profile = Profile::new(values).map_err(|e| invalid(e.into()))?;
            let id = Uuid::parse_str(&object_id).unwrap_or_else(|_| Uuid::new_v4());
            members.push(BorderObject::new(id, object_id.clone(), profile).map_err(invalid)?);
        }

        if members.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        info!(members = members.len(), "profiles loaded");
        Ok(members)
    }
}

/// Reads a dataset hierarchy from a JSON snapshot and rebuilds its aggregates.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::Json`] | The file is not a snapshot |
/// | [`IoError::InvalidSnapshot`] | The snapshot references unknown members or lacks a profile |
/// | [`IoError::Collection`] | Segments or landmarks do not fit their profiles |
pub struct SnapshotReader {
    path: PathBuf,
}

impl SnapshotReader {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<Dataset, IoError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;
        let snapshot: DatasetSnapshot = serde_json::from_str(&content).map_err(|e| IoError::Json {
            path: self.path.clone(),
            source: e,
        })?;
        let dataset = snapshot.into_dataset()?;
        info!(
            members = dataset.members().len(),
            children = dataset.children().len(),
            "snapshot loaded"
        );
        Ok(dataset)
    }
}
