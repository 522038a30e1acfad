//! Configuration for the segmentation handler.

use morphoseg_collection::ManagerConfig;

/// Settings for a [`SegmentationHandler`](crate::SegmentationHandler).
///
/// Construct via [`HandlerConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter              | Default                   |
/// |------------------------|---------------------------|
/// | `rollback_on_invalid`  | true                      |
/// | `validate_before_edit` | true                      |
/// | `manager`              | `ManagerConfig::default()` |
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerConfig {
    pub(crate) rollback_on_invalid: bool,
    pub(crate) validate_before_edit: bool,
    pub(crate) manager: ManagerConfig,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rollback_on_invalid: true,
            validate_before_edit: true,
            manager: ManagerConfig::default(),
        }
    }

    /// Restore the dataset when an edit fails or leaves it inconsistent. When
    /// off, a failed post-edit validation is logged and the edit kept.
    #[must_use]
    pub fn with_rollback_on_invalid(mut self, rollback: bool) -> Self {
        self.rollback_on_invalid = rollback;
        self
    }

    /// Refuse edits on a dataset that is already inconsistent.
    #[must_use]
    pub fn with_validate_before_edit(mut self, validate: bool) -> Self {
        self.validate_before_edit = validate;
        self
    }

    /// Settings passed to every [`ProfileManager`](morphoseg_collection::ProfileManager)
    /// the handler creates.
    #[must_use]
    pub fn with_manager(mut self, manager: ManagerConfig) -> Self {
        self.manager = manager;
        self
    }

    #[must_use]
    pub fn rollback_on_invalid(&self) -> bool {
        self.rollback_on_invalid
    }

    #[must_use]
    pub fn validate_before_edit(&self) -> bool {
        self.validate_before_edit
    }

    #[must_use]
    pub fn manager(&self) -> &ManagerConfig {
        &self.manager
    }
}
