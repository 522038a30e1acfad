use morphoseg_collection::CollectionError;

use crate::validator::ValidationReport;

/// Errors from dataset hierarchies and handler edits.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// Returned when a dataset fails validation before or after an edit.
    #[error("dataset failed validation with {} error(s)", .0.errors().len())]
    Validation(ValidationReport),

    /// Returned when a previous edit panicked while holding the dataset lock.
    #[error("dataset lock poisoned by an earlier panic")]
    Poisoned,

    /// Returned when an edit targets a derived child dataset.
    #[error("'{name}' is a child dataset; edit its root instead")]
    NotRoot {
        /// Name of the child dataset.
        name: String,
    },

    /// Returned when a dataset name matches neither the root nor any child.
    #[error("no dataset named '{name}'")]
    MissingChild {
        /// The requested name.
        name: String,
    },

    /// Returned when a child dataset name is already taken.
    #[error("a dataset named '{name}' already exists")]
    DuplicateChild {
        /// The rejected name.
        name: String,
    },

    /// Returned when a dataset or child is created without members.
    #[error("dataset '{name}' has no members")]
    EmptyDataset {
        /// Name of the dataset.
        name: String,
    },

    /// Wraps a collection error from aggregation or an edit.
    #[error("collection error: {0}")]
    Collection(#[from] CollectionError),
}
