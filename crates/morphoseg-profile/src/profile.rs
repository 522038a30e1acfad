//! Fixed-length circular profiles with validation guarantees.

use serde::{Deserialize, Serialize};

use crate::error::ProfileError;
use crate::segment::Segment;
use crate::{MIN_PROFILE_LENGTH, wrap_index};

/// Owned, validated circular profile. Guaranteed to hold at least
/// [`MIN_PROFILE_LENGTH`] finite values.
///
/// Index `i` and `i + len()` name the same border point. Every transform is pure
/// and returns a new profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Profile(Vec<f64>);

impl Profile {
    /// Create a new profile, validating its length and that all values are finite.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ProfileError::TooShort`] | fewer than [`MIN_PROFILE_LENGTH`] values |
    /// | [`ProfileError::NonFiniteValue`] | any value is NaN or infinite |
    pub fn new(values: Vec<f64>) -> Result<Self, ProfileError> {
        if values.len() < MIN_PROFILE_LENGTH {
            return Err(ProfileError::TooShort {
                len: values.len(),
                min: MIN_PROFILE_LENGTH,
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(ProfileError::NonFiniteValue { index });
        }
        Ok(Self(values))
    }

    /// Create a profile holding `len` copies of `value`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Profile::new`].
    pub fn constant(value: f64, len: usize) -> Result<Self, ProfileError> {
        Self::new(vec![value; len])
    }

    /// Return the number of border points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false` for a constructed profile. Provided to satisfy the
    /// `len_without_is_empty` convention.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return the underlying values.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Consume and return the inner vector.
    #[must_use]
    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    /// Return the value at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::IndexOutOfRange`] if `index >= len()`.
    pub fn get(&self, index: usize) -> Result<f64, ProfileError> {
        self.0
            .get(index)
            .copied()
            .ok_or(ProfileError::IndexOutOfRange {
                index,
                len: self.len(),
            })
    }

    /// Return the value at a signed index, wrapping around the profile.
    #[must_use]
    pub fn get_wrapped(&self, index: isize) -> f64 {
        self.0[wrap_index(index, self.len())]
    }

    /// Return the value at the given fraction of the profile.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::FractionOutOfRange`] unless `0 <= fraction <= 1`.
    pub fn get_at_fraction(&self, fraction: f64) -> Result<f64, ProfileError> {
        let index = self.index_of_fraction(fraction)?;
        Ok(self.0[index])
    }

    /// Map a fraction in `[0, 1]` to an index: `floor(len * fraction)`, with
    /// `1.0` mapping onto the last index.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::FractionOutOfRange`] unless `0 <= fraction <= 1`.
    pub fn index_of_fraction(&self, fraction: f64) -> Result<usize, ProfileError> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ProfileError::FractionOutOfRange { fraction });
        }
        let index = (self.len() as f64 * fraction) as usize;
        Ok(index.min(self.len() - 1))
    }

    /// Map an index to its fraction of the profile: `index / len`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::IndexOutOfRange`] if `index >= len()`.
    pub fn fraction_of_index(&self, index: usize) -> Result<f64, ProfileError> {
        if index >= self.len() {
            return Err(ProfileError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok(index as f64 / self.len() as f64)
    }

    /// Return the largest value.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.0.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Return the smallest value.
    #[must_use]
    pub fn min(&self) -> f64 {
        self.0.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Return the index of the largest value. The first index wins ties.
    #[must_use]
    pub fn index_of_max(&self) -> usize {
        self.extreme_index(None, |candidate, best| candidate > best)
            .unwrap_or(0)
    }

    /// Return the index of the smallest value. The first index wins ties.
    #[must_use]
    pub fn index_of_min(&self) -> usize {
        self.extreme_index(None, |candidate, best| candidate < best)
            .unwrap_or(0)
    }

    /// Return the index of the largest value among indices where `mask` is true.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ProfileError::LengthMismatch`] | `mask.len() != len()` |
    /// | [`ProfileError::EmptyMask`] | no index in `mask` is true |
    pub fn index_of_max_in(&self, mask: &[bool]) -> Result<usize, ProfileError> {
        self.check_mask(mask)?;
        self.extreme_index(Some(mask), |candidate, best| candidate > best)
            .ok_or(ProfileError::EmptyMask)
    }

    /// Return the index of the smallest value among indices where `mask` is true.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ProfileError::LengthMismatch`] | `mask.len() != len()` |
    /// | [`ProfileError::EmptyMask`] | no index in `mask` is true |
    pub fn index_of_min_in(&self, mask: &[bool]) -> Result<usize, ProfileError> {
        self.check_mask(mask)?;
        self.extreme_index(Some(mask), |candidate, best| candidate < best)
            .ok_or(ProfileError::EmptyMask)
    }

    fn check_mask(&self, mask: &[bool]) -> Result<(), ProfileError> {
        if mask.len() != self.len() {
            return Err(ProfileError::LengthMismatch {
                expected: self.len(),
                got: mask.len(),
            });
        }
        Ok(())
    }

    fn extreme_index(
        &self,
        mask: Option<&[bool]>,
        better: impl Fn(f64, f64) -> bool,
    ) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, &v) in self.0.iter().enumerate() {
            if mask.is_some_and(|m| !m[i]) {
                continue;
            }
            match best {
                Some(b) if !better(v, self.0[b]) => {}
                _ => best = Some(i),
            }
        }
        best
    }

    /// Rotate the profile so that it starts from index `k`:
    /// `result[i] = self[(i + k) mod len]`.
    #[must_use]
    pub fn offset(&self, k: isize) -> Self {
        let start = wrap_index(k, self.len());
        let mut values = Vec::with_capacity(self.len());
        values.extend_from_slice(&self.0[start..]);
        values.extend_from_slice(&self.0[..start]);
        Self(values)
    }

    /// Resample to `new_len` points at evenly spaced proportional positions,
    /// interpolating linearly and wrapping past the last point.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::TooShort`] if `new_len < MIN_PROFILE_LENGTH`.
    pub fn interpolate(&self, new_len: usize) -> Result<Self, ProfileError> {
        if new_len < MIN_PROFILE_LENGTH {
            return Err(ProfileError::TooShort {
                len: new_len,
                min: MIN_PROFILE_LENGTH,
            });
        }
        Ok(Self(resample(&self.0, new_len)))
    }

    /// Circular moving average over `2 * window + 1` points.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::InvalidWindow`] if `window == 0`.
    pub fn smooth(&self, window: usize) -> Result<Self, ProfileError> {
        check_window(window)?;
        let values = (0..self.len())
            .map(|i| {
                let centre = i as isize;
                let sum: f64 = (1..=window as isize)
                    .map(|k| self.get_wrapped(centre - k) + self.get_wrapped(centre + k))
                    .sum();
                (self.0[i] + sum) / (window * 2 + 1) as f64
            })
            .collect();
        Ok(Self(values))
    }

    /// Sum of successive differences across a window of `window` points either
    /// side of each index.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::InvalidWindow`] if `window == 0`.
    pub fn deltas(&self, window: usize) -> Result<Self, ProfileError> {
        check_window(window)?;
        let values = (0..self.len())
            .map(|i| {
                let centre = i as isize;
                let mut delta = 0.0;
                for k in 1..=window as isize {
                    let (prev, next) = (self.get_wrapped(centre - k), self.get_wrapped(centre + k));
                    let (prev_inner, next_inner) = (
                        self.get_wrapped(centre - k + 1),
                        self.get_wrapped(centre + k - 1),
                    );
                    delta += (prev_inner - prev) + (next - next_inner);
                }
                delta
            })
            .collect();
        Ok(Self(values))
    }

    /// Circular first difference: `result[i] = self[i] - self[i + 1]`.
    #[must_use]
    pub fn derivative(&self) -> Self {
        let n = self.len();
        Self((0..n).map(|i| self.0[i] - self.0[(i + 1) % n]).collect())
    }

    /// Absolute value of every point.
    #[must_use]
    pub fn absolute(&self) -> Self {
        Self(self.0.iter().map(|v| v.abs()).collect())
    }

    /// Raise every point to `exponent`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::NonFiniteValue`] if any result is not finite
    /// (e.g. a fractional power of a negative value).
    pub fn powf(&self, exponent: f64) -> Result<Self, ProfileError> {
        Self::new(self.0.iter().map(|v| v.powf(exponent)).collect())
    }

    /// Reverse the order of the values.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self(self.0.iter().rev().copied().collect())
    }

    /// Add `value` to every point.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::NonFiniteOperand`] if `value` is not finite.
    pub fn add_scalar(&self, value: f64) -> Result<Self, ProfileError> {
        self.map_scalar(value, |a, b| a + b)
    }

    /// Subtract `value` from every point.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::NonFiniteOperand`] if `value` is not finite.
    pub fn subtract_scalar(&self, value: f64) -> Result<Self, ProfileError> {
        self.map_scalar(value, |a, b| a - b)
    }

    /// Multiply every point by `value`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::NonFiniteOperand`] if `value` is not finite.
    pub fn multiply_scalar(&self, value: f64) -> Result<Self, ProfileError> {
        self.map_scalar(value, |a, b| a * b)
    }

    /// Divide every point by `value`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ProfileError::NonFiniteOperand`] | `value` is not finite |
    /// | [`ProfileError::NonFiniteValue`] | `value` is zero |
    pub fn divide_scalar(&self, value: f64) -> Result<Self, ProfileError> {
        self.map_scalar(value, |a, b| a / b)
    }

    /// Pointwise sum with a profile of the same length.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::LengthMismatch`] if the lengths differ.
    pub fn add(&self, other: &Profile) -> Result<Self, ProfileError> {
        self.zip_with(other, |a, b| a + b)
    }

    /// Pointwise difference with a profile of the same length.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::LengthMismatch`] if the lengths differ.
    pub fn subtract(&self, other: &Profile) -> Result<Self, ProfileError> {
        self.zip_with(other, |a, b| a - b)
    }

    /// Pointwise product with a profile of the same length.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::LengthMismatch`] if the lengths differ.
    pub fn multiply(&self, other: &Profile) -> Result<Self, ProfileError> {
        self.zip_with(other, |a, b| a * b)
    }

    /// Pointwise quotient with a profile of the same length.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ProfileError::LengthMismatch`] | the lengths differ |
    /// | [`ProfileError::NonFiniteValue`] | a divisor is zero |
    pub fn divide(&self, other: &Profile) -> Result<Self, ProfileError> {
        self.zip_with(other, |a, b| a / b)
    }

    fn map_scalar(&self, value: f64, op: impl Fn(f64, f64) -> f64) -> Result<Self, ProfileError> {
        if !value.is_finite() {
            return Err(ProfileError::NonFiniteOperand { value });
        }
        Self::new(self.0.iter().map(|&v| op(v, value)).collect())
    }

    fn zip_with(&self, other: &Profile, op: impl Fn(f64, f64) -> f64) -> Result<Self, ProfileError> {
        if other.len() != self.len() {
            return Err(ProfileError::LengthMismatch {
                expected: self.len(),
                got: other.len(),
            });
        }
        Self::new(self.0.iter().zip(&other.0).map(|(&a, &b)| op(a, b)).collect())
    }

    /// Flag indices that are strict local minima over `window` points either side.
    ///
    /// A point qualifies when each value stepping away from it, in both
    /// directions, is strictly greater than the value before it.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::InvalidWindow`] if `window == 0`.
    pub fn local_minima(&self, window: usize) -> Result<Vec<bool>, ProfileError> {
        self.local_extrema(window, |further, nearer| further > nearer)
    }

    /// As [`Profile::local_minima`], additionally requiring the value to be below
    /// `threshold`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::InvalidWindow`] if `window == 0`.
    pub fn local_minima_below(
        &self,
        window: usize,
        threshold: f64,
    ) -> Result<Vec<bool>, ProfileError> {
        let mut minima = self.local_minima(window)?;
        for (flag, &v) in minima.iter_mut().zip(&self.0) {
            *flag = *flag && v < threshold;
        }
        Ok(minima)
    }

    /// Flag indices that are strict local maxima over `window` points either side.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::InvalidWindow`] if `window == 0`.
    pub fn local_maxima(&self, window: usize) -> Result<Vec<bool>, ProfileError> {
        self.local_extrema(window, |further, nearer| further < nearer)
    }

    /// As [`Profile::local_maxima`], additionally requiring the value to be above
    /// `threshold`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::InvalidWindow`] if `window == 0`.
    pub fn local_maxima_above(
        &self,
        window: usize,
        threshold: f64,
    ) -> Result<Vec<bool>, ProfileError> {
        let mut maxima = self.local_maxima(window)?;
        for (flag, &v) in maxima.iter_mut().zip(&self.0) {
            *flag = *flag && v > threshold;
        }
        Ok(maxima)
    }

    fn local_extrema(
        &self,
        window: usize,
        moves_away: impl Fn(f64, f64) -> bool,
    ) -> Result<Vec<bool>, ProfileError> {
        check_window(window)?;
        let flags = (0..self.len() as isize)
            .map(|i| {
                (1..=window as isize).all(|k| {
                    moves_away(self.get_wrapped(i - k), self.get_wrapped(i - k + 1))
                        && moves_away(self.get_wrapped(i + k), self.get_wrapped(i + k - 1))
                })
            })
            .collect();
        Ok(flags)
    }

    /// Sum of squared differences against `other`.
    ///
    /// When the lengths differ, the shorter profile is interpolated up to the
    /// longer length first, so the result does not depend on call order.
    #[must_use]
    pub fn absolute_square_difference(&self, other: &Profile) -> f64 {
        let n = self.len().max(other.len());
        square_difference(&resample(&self.0, n), &resample(&other.0, n))
    }

    /// Sum of squared differences after interpolating both profiles to `len`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::TooShort`] if `len < MIN_PROFILE_LENGTH`.
    pub fn absolute_square_difference_at(
        &self,
        other: &Profile,
        len: usize,
    ) -> Result<f64, ProfileError> {
        let a = self.interpolate(len)?;
        let b = other.interpolate(len)?;
        Ok(square_difference(&a.0, &b.0))
    }

    /// Return the rotation `k` for which `other.offset(k)` best matches this profile,
    /// searching every offset.
    ///
    /// `other` is interpolated to this profile's length first. The lowest squared
    /// difference wins, and the first offset encountered wins ties.
    #[must_use]
    pub fn find_best_fit_offset(&self, other: &Profile) -> usize {
        best_fit(&self.0, &resample(&other.0, self.len()), 0, self.len())
    }

    /// As [`Profile::find_best_fit_offset`], restricted to offsets in `min..max`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::InvalidOffsetRange`] if `min >= max` or `max > len()`.
    pub fn find_best_fit_offset_in(
        &self,
        other: &Profile,
        min: usize,
        max: usize,
    ) -> Result<usize, ProfileError> {
        if min >= max || max > self.len() {
            return Err(ProfileError::InvalidOffsetRange {
                min,
                max,
                len: self.len(),
            });
        }
        Ok(best_fit(&self.0, &resample(&other.0, self.len()), min, max))
    }

    /// Return the `2 * window + 1` values centred on `index`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ProfileError::IndexOutOfRange`] | `index >= len()` |
    /// | [`ProfileError::InvalidWindow`] | `window == 0` |
    pub fn window(&self, index: usize, window: usize) -> Result<Self, ProfileError> {
        self.get(index)?;
        check_window(window)?;
        let centre = index as isize;
        let w = window as isize;
        Ok(Self((-w..=w).map(|k| self.get_wrapped(centre + k)).collect()))
    }

    /// Return the inclusive region `start..=end`, wrapping through index 0 when
    /// `end <= start`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ProfileError::IndexOutOfRange`] | either index is `>= len()` |
    /// | [`ProfileError::TooShort`] | the region holds fewer than the minimum points |
    pub fn sub_region(&self, start: usize, end: usize) -> Result<Self, ProfileError> {
        self.get(start)?;
        self.get(end)?;
        if start < end {
            return Self::new(self.0[start..=end].to_vec());
        }
        let mut values = self.0[start..].to_vec();
        values.extend_from_slice(&self.0[..=end]);
        Self::new(values)
    }

    /// Return the values covered by `segment`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ProfileError::LengthMismatch`] | the segment belongs to a different length profile |
    /// | [`ProfileError::IndexOutOfRange`] | a segment bound lies outside this profile |
    pub fn sub_region_of(&self, segment: &Segment) -> Result<Self, ProfileError> {
        if segment.profile_len() != self.len() {
            return Err(ProfileError::LengthMismatch {
                expected: self.len(),
                got: segment.profile_len(),
            });
        }
        self.sub_region(segment.start(), segment.end())
    }
}

impl AsRef<[f64]> for Profile {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}

impl TryFrom<Vec<f64>> for Profile {
    type Error = ProfileError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Profile> for Vec<f64> {
    fn from(profile: Profile) -> Self {
        profile.0
    }
}

fn check_window(window: usize) -> Result<(), ProfileError> {
    if window == 0 {
        return Err(ProfileError::InvalidWindow { window });
    }
    Ok(())
}

/// Linear circular resampling. Returns a copy when the length is unchanged.
pub(crate) fn resample(values: &[f64], len: usize) -> Vec<f64> {
    let n = values.len();
    if n == len {
        return values.to_vec();
    }
    let ratio = n as f64 / len as f64;
    (0..len)
        .map(|i| {
            let position = i as f64 * ratio;
            let mut j0 = position.floor() as usize;
            let mut fraction = position - j0 as f64;
            if j0 >= n {
                j0 = 0;
                fraction = 0.0;
            }
            let j1 = (j0 + 1) % n;
            values[j0] + (values[j1] - values[j0]) * fraction
        })
        .collect()
}

fn square_difference(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn best_fit(template: &[f64], test: &[f64], min: usize, max: usize) -> usize {
    let n = template.len();
    let mut best_offset = min;
    let mut best_score = f64::INFINITY;
    for k in min..max {
        let score: f64 = template
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let d = t - test[(i + k) % n];
                d * d
            })
            .sum();
        if score < best_score {
            best_score = score;
            best_offset = k;
        }
    }
    best_offset
}
