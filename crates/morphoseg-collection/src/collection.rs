//! Aggregate profiles, the landmark table and the canonical segmentation of a collection.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use morphoseg_profile::{Profile, Segment, SegmentedProfile, link_segments, scale_segments, wrap_index};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::aggregate::ProfileAggregate;
use crate::error::CollectionError;
use crate::kind::{ProfileType, Quartile};
use crate::landmark::{Landmark, REFERENCE_POINT};
use crate::member::Profileable;

type CacheKey = (ProfileType, u64, Landmark);

/// Quartile profiles already extracted from the aggregates.
#[derive(Debug, Default)]
struct ProfileCache(RwLock<HashMap<CacheKey, Profile>>);

impl ProfileCache {
    fn get(&self, key: &CacheKey) -> Option<Profile> {
        self.0.read().ok()?.get(key).cloned()
    }

    fn insert(&self, key: CacheKey, profile: Profile) {
        if let Ok(mut map) = self.0.write() {
            map.insert(key, profile);
        }
    }

    fn remove_landmark(&mut self, landmark: &Landmark) {
        if let Ok(map) = self.0.get_mut() {
            map.retain(|(_, _, l), _| l != landmark);
        }
    }

    fn clear(&mut self) {
        if let Ok(map) = self.0.get_mut() {
            map.clear();
        }
    }
}

impl Clone for ProfileCache {
    fn clone(&self) -> Self {
        let map = self.0.read().map(|m| m.clone()).unwrap_or_default();
        Self(RwLock::new(map))
    }
}

/// Per-collection aggregates, landmark indices and segments.
///
/// Everything is indexed with the reference point at 0: landmark indices are
/// positions in the aggregate, and the segment list is stored zeroed at the
/// reference point.
#[derive(Debug, Clone)]
pub struct ProfileCollection {
    length: usize,
    landmarks: BTreeMap<Landmark, usize>,
    segments: Vec<Segment>,
    aggregates: BTreeMap<ProfileType, ProfileAggregate>,
    cache: ProfileCache,
}

impl Default for ProfileCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ProfileCollection {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length
            && self.landmarks == other.landmarks
            && self.segments == other.segments
            && self.aggregates == other.aggregates
    }
}

impl ProfileCollection {
    /// An empty collection with the reference point at index 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            length: 0,
            landmarks: BTreeMap::from([(REFERENCE_POINT, 0)]),
            segments: Vec::new(),
            aggregates: BTreeMap::new(),
            cache: ProfileCache::default(),
        }
    }

    /// Restore a collection from persisted parts. Aggregates are rebuilt later by
    /// [`ProfileCollection::create_aggregate`].
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::IndexOutOfRange`] | a landmark lies outside `length` |
    /// | [`CollectionError::Segment`] | the segments do not link or do not fit `length` |
    pub fn from_parts(
        length: usize,
        landmarks: impl IntoIterator<Item = (Landmark, usize)>,
        mut segments: Vec<Segment>,
    ) -> Result<Self, CollectionError> {
        let mut collection = Self::new();
        collection.length = length;
        for (landmark, index) in landmarks {
            if index >= length {
                return Err(CollectionError::IndexOutOfRange { index, len: length });
            }
            if !landmark.is_reference_point() {
                collection.landmarks.insert(landmark, index);
            }
        }
        if !segments.is_empty() {
            check_segment_length(&segments, length)?;
            link_segments(&mut segments)?;
        }
        collection.segments = segments;
        Ok(collection)
    }

    /// Length of the aggregate profiles.
    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    #[must_use]
    pub fn landmarks(&self) -> &BTreeMap<Landmark, usize> {
        &self.landmarks
    }

    #[must_use]
    pub fn has_landmark(&self, landmark: &Landmark) -> bool {
        self.landmarks.contains_key(landmark)
    }

    /// # Errors
    ///
    /// Returns [`CollectionError::MissingLandmark`] if the landmark is absent.
    pub fn landmark_index(&self, landmark: &Landmark) -> Result<usize, CollectionError> {
        self.landmarks
            .get(landmark)
            .copied()
            .ok_or_else(|| CollectionError::MissingLandmark {
                name: landmark.name().to_owned(),
            })
    }

    /// Place a landmark in the aggregate. The reference point is fixed at 0, so
    /// requests to move it are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexOutOfRange`] if `index >= length()`.
    pub fn set_landmark(&mut self, landmark: Landmark, index: usize) -> Result<(), CollectionError> {
        if landmark.is_reference_point() {
            return Ok(());
        }
        if index >= self.length {
            return Err(CollectionError::IndexOutOfRange {
                index,
                len: self.length,
            });
        }
        self.cache.remove_landmark(&landmark);
        self.landmarks.insert(landmark, index);
        Ok(())
    }

    /// Profile types an aggregate has been built for.
    #[must_use]
    pub fn profile_types(&self) -> Vec<ProfileType> {
        self.aggregates.keys().copied().collect()
    }

    #[must_use]
    pub fn aggregate(&self, kind: ProfileType) -> Option<&ProfileAggregate> {
        self.aggregates.get(&kind)
    }

    /// The `quartile` profile of `kind`, rotated to start at `landmark`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::MissingLandmark`] | `landmark` is absent |
    /// | [`CollectionError::MissingAggregate`] | no aggregate of `kind` |
    pub fn profile(
        &self,
        kind: ProfileType,
        landmark: &Landmark,
        quartile: Quartile,
    ) -> Result<Profile, CollectionError> {
        let index = self.landmark_index(landmark)?;
        let key = (kind, quartile.key(), landmark.clone());
        if let Some(profile) = self.cache.get(&key) {
            return Ok(profile);
        }
        let aggregate = self
            .aggregates
            .get(&kind)
            .ok_or(CollectionError::MissingAggregate { kind })?;
        let profile = aggregate.quartile(quartile)?.offset(index as isize);
        self.cache.insert(key, profile.clone());
        Ok(profile)
    }

    /// [`ProfileCollection::profile`] carrying the canonical segments rotated to
    /// the same landmark.
    ///
    /// # Errors
    ///
    /// As [`ProfileCollection::profile`], plus [`CollectionError::Unsegmented`] if
    /// no segments exist.
    pub fn segmented_profile(
        &self,
        kind: ProfileType,
        landmark: &Landmark,
        quartile: Quartile,
    ) -> Result<SegmentedProfile, CollectionError> {
        let profile = self.profile(kind, landmark, quartile)?;
        let segments = self.segments_from(landmark)?;
        Ok(SegmentedProfile::with_segments(profile, segments)?)
    }

    /// Interquartile range profile, `Q75 - Q25`.
    ///
    /// # Errors
    ///
    /// As [`ProfileCollection::profile`].
    pub fn iqr_profile(&self, kind: ProfileType, landmark: &Landmark) -> Result<Profile, CollectionError> {
        let lower = self.profile(kind, landmark, Quartile::LOWER)?;
        let upper = self.profile(kind, landmark, Quartile::UPPER)?;
        Ok(upper.subtract(&lower)?)
    }

    /// Canonical segments zeroed at the reference point.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn has_segments(&self) -> bool {
        !self.segments.is_empty()
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn segment_ids(&self) -> Vec<Uuid> {
        self.segments.iter().map(Segment::id).collect()
    }

    /// Segments rotated so that `landmark` lies at index 0.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::MissingLandmark`] | `landmark` is absent |
    /// | [`CollectionError::Unsegmented`] | no segments exist |
    pub fn segments_from(&self, landmark: &Landmark) -> Result<Vec<Segment>, CollectionError> {
        let index = self.landmark_index(landmark)? as isize;
        if self.segments.is_empty() {
            return Err(CollectionError::Unsegmented);
        }
        let mut segments: Vec<Segment> = self.segments.iter().map(|s| s.offset(-index)).collect();
        link_segments(&mut segments)?;
        Ok(segments)
    }

    /// The segment at list `position`, rotated to `landmark`.
    ///
    /// # Errors
    ///
    /// As [`ProfileCollection::segments_from`].
    pub fn segment_at(&self, landmark: &Landmark, position: usize) -> Result<Option<Segment>, CollectionError> {
        Ok(self.segments_from(landmark)?.into_iter().nth(position))
    }

    /// The segment whose start lies on `landmark`, if any.
    ///
    /// # Errors
    ///
    /// As [`ProfileCollection::segments_from`].
    pub fn segment_starting_with(&self, landmark: &Landmark) -> Result<Option<Segment>, CollectionError> {
        Ok(self.segments_from(landmark)?.into_iter().find(|s| s.start() == 0))
    }

    /// The segment whose end lies on `landmark`, if any.
    ///
    /// # Errors
    ///
    /// As [`ProfileCollection::segments_from`].
    pub fn segment_ending_with(&self, landmark: &Landmark) -> Result<Option<Segment>, CollectionError> {
        Ok(self.segments_from(landmark)?.into_iter().find(|s| s.end() == 0))
    }

    /// The first segment containing `index`, counted from the reference point.
    #[must_use]
    pub fn segment_containing(&self, index: usize) -> Option<&Segment> {
        self.segments.iter().find(|s| s.contains(index))
    }

    /// Replace the canonical segments with a list zeroed at the reference point.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::Segment`] | the list is empty, does not link, or lies on a different length |
    pub fn set_segments(&mut self, segments: Vec<Segment>) -> Result<(), CollectionError> {
        self.set_segments_from(&REFERENCE_POINT, segments)
    }

    /// Replace the canonical segments with a list zeroed at `landmark`.
    ///
    /// # Errors
    ///
    /// As [`ProfileCollection::set_segments`], plus
    /// [`CollectionError::MissingLandmark`].
    pub fn set_segments_from(&mut self, landmark: &Landmark, segments: Vec<Segment>) -> Result<(), CollectionError> {
        let index = self.landmark_index(landmark)? as isize;
        check_segment_length(&segments, self.length)?;
        let mut zeroed: Vec<Segment> = segments.iter().map(|s| s.offset(index)).collect();
        link_segments(&mut zeroed)?;
        self.segments = zeroed;
        Ok(())
    }

    /// Rebuild every aggregate at `length` from the members' profiles zeroed at
    /// their reference points.
    ///
    /// Existing segments and landmarks are rescaled proportionally when the
    /// length changes; a collection without segments receives one default
    /// segment. A member missing a profile type is skipped for that type.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::InvalidLength`] | `length` is zero |
    /// | [`CollectionError::EmptyCollection`] | no member provides any profile |
    /// | [`CollectionError::Segment`] | existing segments cannot be rescaled to `length` |
    #[instrument(skip(self, members), fields(old_length = self.length))]
    pub fn create_aggregate<'m, M: Profileable + 'm>(
        &mut self,
        members: impl IntoIterator<Item = &'m M>,
        length: usize,
    ) -> Result<(), CollectionError> {
        if length == 0 {
            return Err(CollectionError::InvalidLength { length });
        }
        let members: Vec<&M> = members.into_iter().collect();
        if members.is_empty() {
            return Err(CollectionError::EmptyCollection);
        }

        let mut aggregates = BTreeMap::new();
        for kind in ProfileType::ALL {
            let profiles: Vec<Profile> = members
                .iter()
                .filter_map(|m| match m.profile(kind, &REFERENCE_POINT) {
                    Ok(p) => Some(p),
                    Err(CollectionError::MissingProfile { .. }) => None,
                    Err(e) => {
                        warn!(member = %m.id(), error = %e, "skipping member in aggregate");
                        None
                    }
                })
                .collect();
            if profiles.is_empty() {
                continue;
            }
            aggregates.insert(kind, ProfileAggregate::new(&profiles, length)?);
        }
        if aggregates.is_empty() {
            return Err(CollectionError::EmptyCollection);
        }

        let segments = if self.segments.is_empty() {
            let mut segments = vec![Segment::full(length)?];
            link_segments(&mut segments)?;
            segments
        } else if self.segments[0].profile_len() != length {
            debug!(length, "segments already exist, interpolating");
            scale_segments(&self.segments, length)?
        } else {
            self.segments.clone()
        };

        if self.length != 0 && self.length != length {
            let old = self.length;
            for index in self.landmarks.values_mut() {
                *index = rescale_index(*index, old, length);
            }
        }

        self.length = length;
        self.segments = segments;
        self.aggregates = aggregates;
        self.cache.clear();
        Ok(())
    }

    /// Move the reference point to aggregate index `k`. Aggregates, segments and
    /// the other landmarks are rotated to stay on the same values.
    pub fn move_reference_point(&mut self, k: usize) {
        if self.length == 0 {
            return;
        }
        let k = k % self.length;
        for aggregate in self.aggregates.values_mut() {
            aggregate.rotate(k);
        }
        for (landmark, index) in &mut self.landmarks {
            if !landmark.is_reference_point() {
                *index = wrap_index(*index as isize - k as isize, self.length);
            }
        }
        let mut segments: Vec<Segment> = self.segments.iter().map(|s| s.offset(-(k as isize))).collect();
        if link_segments(&mut segments).is_ok() {
            self.segments = segments;
        }
        self.cache.clear();
    }

    /// Fraction of the aggregate preceding `index`: 0 for the first index, 1 for
    /// the last, `index / (length - 1)` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexOutOfRange`] if `index >= length()`.
    pub fn proportion_of_index(&self, index: usize) -> Result<f64, CollectionError> {
        if index >= self.length {
            return Err(CollectionError::IndexOutOfRange {
                index,
                len: self.length,
            });
        }
        if index == 0 {
            return Ok(0.0);
        }
        if index == self.length - 1 {
            return Ok(1.0);
        }
        Ok(index as f64 / (self.length - 1) as f64)
    }

    /// Proportional position of a landmark.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::MissingLandmark`] if the landmark is absent.
    pub fn proportion_of_landmark(&self, landmark: &Landmark) -> Result<f64, CollectionError> {
        self.proportion_of_index(self.landmark_index(landmark)?)
    }

    /// Inverse of [`ProfileCollection::proportion_of_index`]: 0 maps to the first
    /// index, 1 to the last, anything else to `floor(length * proportion)`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::ProportionOutOfRange`] | `proportion` is outside `[0, 1]` |
    /// | [`CollectionError::InvalidLength`] | the collection has no aggregate yet |
    pub fn index_of_proportion(&self, proportion: f64) -> Result<usize, CollectionError> {
        if !(0.0..=1.0).contains(&proportion) {
            return Err(CollectionError::ProportionOutOfRange { proportion });
        }
        if self.length == 0 {
            return Err(CollectionError::InvalidLength { length: 0 });
        }
        if proportion == 0.0 {
            return Ok(0);
        }
        if proportion == 1.0 {
            return Ok(self.length - 1);
        }
        Ok(((self.length as f64 * proportion).floor() as usize).min(self.length - 1))
    }
}

fn rescale_index(index: usize, old: usize, new: usize) -> usize {
    if index == 0 {
        return 0;
    }
    if index == old - 1 {
        return new - 1;
    }
    let proportion = index as f64 / (old - 1) as f64;
    ((new as f64 * proportion).floor() as usize).min(new - 1)
}

fn check_segment_length(segments: &[Segment], length: usize) -> Result<(), CollectionError> {
    if let Some(bad) = segments.iter().find(|s| s.profile_len() != length) {
        return Err(morphoseg_profile::SegmentError::ProfileLengthMismatch {
            expected: length,
            got: bad.profile_len(),
        }
        .into());
    }
    Ok(())
}
