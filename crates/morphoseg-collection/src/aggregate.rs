//! Per-index distributions of member profiles.

use morphoseg_profile::Profile;
use tracing::debug;

use crate::error::CollectionError;
use crate::kind::Quartile;

/// Every member profile interpolated to a common length, stored column-wise
/// with each column sorted so percentiles are cheap to extract.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileAggregate {
    columns: Vec<Vec<f64>>,
    member_count: usize,
}

impl ProfileAggregate {
    /// Build an aggregate of `length` columns.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::EmptyCollection`] | `profiles` is empty |
    /// | [`CollectionError::Profile`] | `length` is below the minimum profile length |
    pub fn new(profiles: &[Profile], length: usize) -> Result<Self, CollectionError> {
        if profiles.is_empty() {
            return Err(CollectionError::EmptyCollection);
        }
        let mut columns = vec![Vec::with_capacity(profiles.len()); length];
        for profile in profiles {
            let resampled = profile.interpolate(length)?;
            for (column, &v) in columns.iter_mut().zip(resampled.as_slice()) {
                column.push(v);
            }
        }
        for column in &mut columns {
            column.sort_by(f64::total_cmp);
        }
        debug!(length, members = profiles.len(), "built profile aggregate");
        Ok(Self {
            columns,
            member_count: profiles.len(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.member_count
    }

    /// Sorted member values at `index`, or `None` past the end.
    #[must_use]
    pub fn values_at(&self, index: usize) -> Option<&[f64]> {
        self.columns.get(index).map(Vec::as_slice)
    }

    /// The profile formed by the given percentile at every index.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::Profile`] if the aggregate is shorter than the
    /// minimum profile length.
    pub fn quartile(&self, quartile: Quartile) -> Result<Profile, CollectionError> {
        let values = self
            .columns
            .iter()
            .map(|column| percentile(column, quartile.value()))
            .collect();
        Ok(Profile::new(values)?)
    }

    /// Rotate columns so that `k` becomes index 0.
    pub(crate) fn rotate(&mut self, k: usize) {
        let len = self.columns.len();
        if len > 0 {
            self.columns.rotate_left(k % len);
        }
    }
}

/// Percentile of sorted values using the `p(n+1)/100` position estimator.
///
/// Positions below the first order statistic give the minimum, positions at or
/// beyond the last give the maximum, and anything between interpolates linearly.
///
/// # Panics
///
/// Panics if `sorted` is empty.
#[must_use]
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = p * (n as f64 + 1.0) / 100.0;
    if pos < 1.0 {
        return sorted[0];
    }
    if pos >= n as f64 {
        return sorted[n - 1];
    }
    let floor = pos.floor();
    let d = pos - floor;
    let lower = sorted[floor as usize - 1];
    let upper = sorted[floor as usize];
    lower + d * (upper - lower)
}
