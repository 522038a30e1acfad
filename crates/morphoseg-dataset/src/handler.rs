//! Dataset-level segmentation edits.
//!
//! [`SegmentationHandler`] is the entry point for user edits. Every edit runs
//! under the dataset lock as one sequence: root check, pre-edit validation,
//! application to the root, proportional replay onto each child dataset and
//! post-edit validation. By default a failed edit or a failed post-edit
//! validation restores the snapshot taken before the edit.

use std::sync::Mutex;

use morphoseg_collection::{BorderObject, Landmark, ManagerConfig, Profileable};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::HandlerConfig;
use crate::dataset::Dataset;
use crate::error::DatasetError;
use crate::validator::{DatasetValidator, ValidationReport};

/// Serialises edits to a dataset hierarchy and keeps its children in step.
///
/// Edits address a dataset by name and are refused for child datasets; a child
/// follows every edit made to its root.
#[derive(Debug)]
pub struct SegmentationHandler<M = BorderObject> {
    dataset: Mutex<Dataset<M>>,
    config: HandlerConfig,
    validator: DatasetValidator,
}

impl<M: Profileable + Clone + Send + Sync> SegmentationHandler<M> {
    #[must_use]
    pub fn new(dataset: Dataset<M>) -> Self {
        Self {
            dataset: Mutex::new(dataset),
            config: HandlerConfig::default(),
            validator: DatasetValidator::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: HandlerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Release the dataset.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Poisoned`] if an earlier edit panicked.
    pub fn into_inner(self) -> Result<Dataset<M>, DatasetError> {
        self.dataset.into_inner().map_err(|_| DatasetError::Poisoned)
    }

    /// Run `f` against the dataset while holding the lock.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Poisoned`] if an earlier edit panicked.
    pub fn read<R>(&self, f: impl FnOnce(&Dataset<M>) -> R) -> Result<R, DatasetError> {
        let dataset = self.dataset.lock().map_err(|_| DatasetError::Poisoned)?;
        Ok(f(&*dataset))
    }

    /// Validate the whole hierarchy.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Poisoned`] if an earlier edit panicked.
    pub fn validate(&self) -> Result<ValidationReport, DatasetError> {
        self.read(|dataset| self.validator.validate(dataset))
    }

    /// Merge two adjacent segments in the root and every child. Returns the id
    /// of the merged segment.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`DatasetError::NotRoot`] | `target` is a child dataset |
    /// | [`DatasetError::MissingChild`] | `target` is unknown |
    /// | [`DatasetError::Validation`] | the dataset is inconsistent before or after the edit |
    /// | [`DatasetError::Collection`] | the merge is rejected |
    /// | [`DatasetError::Poisoned`] | an earlier edit panicked |
    #[instrument(skip(self))]
    pub fn merge_segments(&self, target: &str, first: Uuid, second: Uuid) -> Result<Uuid, DatasetError> {
        let merged = Uuid::new_v4();
        self.edit(target, "merge", |dataset, config| {
            dataset.manager(config.clone()).merge_segments(first, second, merged)?;
            for child in dataset.children_mut() {
                child.manager::<M>(config.clone()).merge_segments(first, second, merged)?;
            }
            Ok(())
        })?;
        Ok(merged)
    }

    /// Split a segment at its midpoint in the root and every child. Returns the
    /// ids of the two new segments.
    ///
    /// # Errors
    ///
    /// As [`SegmentationHandler::merge_segments`].
    #[instrument(skip(self))]
    pub fn split_segment(&self, target: &str, id: Uuid) -> Result<(Uuid, Uuid), DatasetError> {
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        self.edit(target, "split", |dataset, config| {
            dataset.manager(config.clone()).split_segment(id, first, second)?;
            for child in dataset.children_mut() {
                child.manager::<M>(config.clone()).split_segment(id, first, second)?;
            }
            Ok(())
        })?;
        Ok((first, second))
    }

    /// Restore the merge sources of a segment in the root and every child.
    ///
    /// # Errors
    ///
    /// As [`SegmentationHandler::merge_segments`].
    #[instrument(skip(self))]
    pub fn unmerge_segment(&self, target: &str, id: Uuid) -> Result<(), DatasetError> {
        self.edit(target, "unmerge", |dataset, config| {
            dataset.manager(config.clone()).unmerge_segment(id)?;
            for child in dataset.children_mut() {
                child.manager::<M>(config.clone()).unmerge_segment(id)?;
            }
            Ok(())
        })
    }

    /// Move the start of a segment to `index` in the root aggregate. Each child
    /// moves the same segment to the index at the same proportion of its own
    /// aggregate, then rebuilds its aggregate from the realigned members.
    ///
    /// # Errors
    ///
    /// As [`SegmentationHandler::merge_segments`].
    #[instrument(skip(self))]
    pub fn update_segment_start(&self, target: &str, id: Uuid, index: usize) -> Result<(), DatasetError> {
        self.edit(target, "move segment start", |dataset, config| {
            let proportion = dataset.collection().proportion_of_index(index)?;
            dataset
                .manager(config.clone())
                .update_median_segment_index(true, id, index)?;
            for child in dataset.children_mut() {
                let child_index = child.collection().index_of_proportion(proportion)?;
                debug!(child = child.name(), child_index, "replaying segment start");
                child
                    .manager::<M>(config.clone())
                    .update_median_segment_index(true, id, child_index)?;
            }
            dataset.rebuild_children()
        })
    }

    /// Move a landmark to `index` in the root aggregate and realign the members.
    /// Children follow proportionally, as for
    /// [`SegmentationHandler::update_segment_start`].
    ///
    /// # Errors
    ///
    /// As [`SegmentationHandler::merge_segments`].
    #[instrument(skip(self, landmark), fields(landmark = %landmark))]
    pub fn set_landmark(&self, target: &str, landmark: &Landmark, index: usize) -> Result<(), DatasetError> {
        self.edit(target, "set landmark", |dataset, config| {
            let proportion = dataset.collection().proportion_of_index(index)?;
            dataset.manager(config.clone()).update_border_tag(landmark, index)?;
            for child in dataset.children_mut() {
                let child_index = child.collection().index_of_proportion(proportion)?;
                debug!(child = child.name(), child_index, "replaying landmark");
                child
                    .manager::<M>(config.clone())
                    .update_border_tag(landmark, child_index)?;
            }
            dataset.rebuild_children()
        })
    }

    /// Lock or unlock every segment in the hierarchy.
    ///
    /// # Errors
    ///
    /// As [`SegmentationHandler::merge_segments`].
    pub fn set_lock_on_all_segments(&self, target: &str, locked: bool) -> Result<(), DatasetError> {
        self.edit(target, "lock segments", |dataset, config| {
            dataset.manager(config.clone()).set_lock_on_all_segments(locked)?;
            for child in dataset.children_mut() {
                child.manager::<M>(config.clone()).set_lock_on_all_segments(locked)?;
            }
            Ok(())
        })
    }

    /// Lock or unlock every segment in the hierarchy except `id`, which takes
    /// the opposite state.
    ///
    /// # Errors
    ///
    /// As [`SegmentationHandler::merge_segments`].
    pub fn set_lock_on_all_segments_except(&self, target: &str, id: Uuid, locked: bool) -> Result<(), DatasetError> {
        self.edit(target, "lock segments", |dataset, config| {
            dataset
                .manager(config.clone())
                .set_lock_on_all_segments_except(id, locked)?;
            for child in dataset.children_mut() {
                child
                    .manager::<M>(config.clone())
                    .set_lock_on_all_segments_except(id, locked)?;
            }
            Ok(())
        })
    }

    fn edit(
        &self,
        target: &str,
        action: &'static str,
        apply: impl FnOnce(&mut Dataset<M>, &ManagerConfig) -> Result<(), DatasetError>,
    ) -> Result<(), DatasetError> {
        let mut dataset = self.dataset.lock().map_err(|_| DatasetError::Poisoned)?;
        dataset.check_root(target)?;

        if self.config.validate_before_edit {
            let report = self.validator.validate(&*dataset);
            if !report.is_valid() {
                warn!(action, errors = report.errors().len(), "refusing to edit an inconsistent dataset");
                return Err(DatasetError::Validation(report));
            }
        }

        let snapshot = self.config.rollback_on_invalid.then(|| dataset.clone());
        if let Err(e) = apply(&mut *dataset, &self.config.manager) {
            warn!(action, error = %e, "edit failed");
            if let Some(snapshot) = snapshot {
                *dataset = snapshot;
            }
            return Err(e);
        }

        let report = self.validator.validate(&*dataset);
        if !report.is_valid() {
            warn!(action, errors = report.errors().len(), "dataset inconsistent after edit");
            for line in report.errors() {
                debug!("{line}");
            }
            if let Some(snapshot) = snapshot {
                *dataset = snapshot;
                return Err(DatasetError::Validation(report));
            }
        }
        info!(action, dataset = target, "edit applied");
        Ok(())
    }
}
