//! Configuration for collection-wide realignment and edits.

use crate::kind::ProfileType;

/// Settings for a [`ProfileManager`](crate::ProfileManager).
///
/// Construct via [`ManagerConfig::new`], then chain `with_*` methods to override defaults.
///
/// # Defaults
///
/// | Parameter         | Default              |
/// |-------------------|----------------------|
/// | `realign_type`    | `ProfileType::Angle` |
/// | `parallel`        | true                 |
/// | `best_fit_window` | `None` (full circle) |
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    pub(crate) realign_type: ProfileType,
    pub(crate) parallel: bool,
    pub(crate) best_fit_window: Option<usize>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            realign_type: ProfileType::Angle,
            parallel: true,
            best_fit_window: None,
        }
    }

    /// Set the profile type whose median is used as the alignment template and
    /// whose segmented median receives structural edits.
    #[must_use]
    pub fn with_realign_type(mut self, realign_type: ProfileType) -> Self {
        self.realign_type = realign_type;
        self
    }

    /// Realign and replay edits on members in parallel with rayon.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Restrict the best-fit search to `window` indices either side of each
    /// member's current landmark index.
    #[must_use]
    pub fn with_best_fit_window(mut self, window: usize) -> Self {
        self.best_fit_window = Some(window);
        self
    }

    #[must_use]
    pub fn realign_type(&self) -> ProfileType {
        self.realign_type
    }

    #[must_use]
    pub fn parallel(&self) -> bool {
        self.parallel
    }

    #[must_use]
    pub fn best_fit_window(&self) -> Option<usize> {
        self.best_fit_window
    }
}
