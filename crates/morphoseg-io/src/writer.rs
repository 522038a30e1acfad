//! JSON writers for dataset snapshots and validation reports.

use std::fs;
use std::path::{Path, PathBuf};

use morphoseg_dataset::{Dataset, ValidationReport};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::ExperimentName;
use crate::snapshot::DatasetSnapshot;

/// Writes dataset snapshots and validation reports for one experiment.
///
/// Creates the output directory on construction if it does not exist.
/// Output files are named `{experiment}_dataset.json` and
/// `{experiment}_validation.json`.
pub struct SnapshotWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl SnapshotWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    /// Path of the snapshot file this writer produces.
    #[must_use]
    pub fn dataset_path(&self) -> PathBuf {
        self.output_dir.join(self.experiment.dataset_file())
    }

    /// Write the dataset hierarchy to `{experiment}_dataset.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    pub fn write_dataset(&self, dataset: &Dataset) -> Result<PathBuf, IoError> {
        let path = self.dataset_path();
        write_snapshot(&path, dataset)?;
        Ok(path)
    }

    /// Write a validation report to `{experiment}_validation.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all)]
    pub fn write_validation(&self, report: &ValidationReport) -> Result<PathBuf, IoError> {
        let path = self.output_dir.join(self.experiment.validation_file());
        let artifact = ValidationArtifact {
            experiment: self.experiment.as_str(),
            valid: report.is_valid(),
            report,
        };
        write_json(&path, &artifact)?;
        info!(path = %path.display(), valid = report.is_valid(), "validation report written");
        Ok(path)
    }
}

/// Write a dataset snapshot to `path`, replacing any existing file.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::Json`] | The snapshot cannot be encoded |
/// | [`IoError::WriteFile`] | The file cannot be written |
#[instrument(skip(dataset), fields(path = %path.display(), members = dataset.members().len()))]
pub fn write_snapshot(path: &Path, dataset: &Dataset) -> Result<(), IoError> {
    write_json(path, &DatasetSnapshot::from_dataset(dataset))?;
    info!("snapshot written");
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), IoError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| IoError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    fs::write(path, json).map_err(|e| IoError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

#[derive(Serialize)]
struct ValidationArtifact<'a> {
    experiment: &'a str,
    valid: bool,
    #[serde(flatten)]
    report: &'a ValidationReport,
}

#[cfg(test)]
mod tests {
    use super::*;
    use morphoseg_collection::BorderObject;
    use morphoseg_profile::Profile;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn dataset() -> Dataset {
        let members = (1..=3)
            .map(|n| {
                let values = (0..20).map(|i| 100.0 + (i * n) as f64).collect();
                BorderObject::new(Uuid::from_u128(n as u128), format!("m{n}"), Profile::new(values).unwrap())
                    .unwrap()
            })
            .collect();
        Dataset::new("root", members).unwrap()
    }

    #[test]
    fn writer_creates_output_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let writer = SnapshotWriter::new(&nested, ExperimentName::new("test".into()).unwrap()).unwrap();
        assert!(nested.is_dir());
        assert_eq!(writer.dataset_path(), nested.join("test_dataset.json"));
    }

    #[test]
    fn validation_report_is_flattened() {
        let dir = TempDir::new().unwrap();
        let writer = SnapshotWriter::new(dir.path(), ExperimentName::new("val".into()).unwrap()).unwrap();
        let report = morphoseg_dataset::DatasetValidator::new().validate(&dataset());
        let path = writer.write_validation(&report).unwrap();

        let content: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(content["experiment"], "val");
        assert_eq!(content["valid"], true);
        assert!(content["summary"].as_array().is_some());
        assert_eq!(content["errors"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn snapshot_file_lists_members() {
        let dir = TempDir::new().unwrap();
        let writer = SnapshotWriter::new(dir.path(), ExperimentName::new("snap".into()).unwrap()).unwrap();
        let path = writer.write_dataset(&dataset()).unwrap();

        let content: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(content["name"], "root");
        assert_eq!(content["members"].as_array().unwrap().len(), 3);
        assert_eq!(content["collection"]["length"], 20);
    }
}
