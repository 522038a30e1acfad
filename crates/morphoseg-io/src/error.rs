//! I/O error types for morphoseg-io.

use std::path::PathBuf;

use morphoseg_collection::CollectionError;
use morphoseg_dataset::DatasetError;

/// Errors from CSV input and dataset snapshots.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when the CSV file contains a header but zero data rows.
    #[error("no profiles in {path}")]
    EmptyDataset {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when a row has an empty object id.
    #[error("missing object id in {path}: row {row_index}")]
    MissingObjectId {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
    },

    /// Returned when a cell value is NaN, Inf, or otherwise not a finite float.
    #[error("non-finite value in {path}: row {row_index}, column {col_index}, raw value \"{raw}\"")]
    NonFiniteValue {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Zero-based column index (excluding the object id column).
        col_index: usize,
        /// The raw string value that failed to parse.
        raw: String,
    },

    /// Returned when the same object id appears more than once.
    #[error("duplicate object id \"{object_id}\" in {path}: first at row {first_row}, again at row {second_row}")]
    DuplicateObjectId {
        /// Path to the CSV file.
        path: PathBuf,
        /// The duplicated id.
        object_id: String,
        /// Zero-based row index of the first occurrence.
        first_row: usize,
        /// Zero-based row index of the second occurrence.
        second_row: usize,
    },

    /// Returned when a row's values do not form a valid profile.
    #[error("invalid profile for \"{object_id}\" in {path}: row {row_index}")]
    InvalidProfile {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Object id of the row.
        object_id: String,
        /// Underlying failure.
        source: CollectionError,
    },

    /// Returned when the experiment name contains characters outside `[a-zA-Z0-9_-]`.
    #[error("invalid experiment name \"{name}\": must match [a-zA-Z0-9_-]+")]
    InvalidExperimentName {
        /// The invalid name.
        name: String,
    },

    /// Returned when the output directory cannot be created.
    #[error("cannot create output directory {path}")]
    OutputDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a file cannot be written.
    #[error("cannot write file {path}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a snapshot cannot be encoded or decoded.
    #[error("malformed JSON in {path}")]
    Json {
        /// Path of the snapshot.
        path: PathBuf,
        /// Underlying serde error.
        source: serde_json::Error,
    },

    /// Returned when a decoded snapshot does not describe a consistent dataset.
    #[error("invalid snapshot: {reason}")]
    InvalidSnapshot {
        /// What was wrong.
        reason: String,
    },

    /// Wraps a collection error raised while rebuilding a snapshot.
    #[error("collection error: {0}")]
    Collection(#[from] CollectionError),

    /// Wraps a dataset error raised while building a dataset from input.
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),
}
