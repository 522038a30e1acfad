//! CSV profile input and JSON dataset snapshots for morphoseg.

mod domain;
mod error;
mod reader;
mod snapshot;
mod writer;

pub use domain::ExperimentName;
pub use error::IoError;
pub use reader::{ProfileReader, SnapshotReader};
pub use snapshot::{ChildRecord, CollectionRecord, DatasetSnapshot, LandmarkRecord, MemberRecord, SegmentRecord};
pub use writer::{SnapshotWriter, write_snapshot};
