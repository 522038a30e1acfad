//! A profile together with an ordered, linked list of segments covering it.

use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{SegmentError, UpdateRejected};
use crate::profile::Profile;
use crate::segment::{Segment, link_segments, scale_segments, update_linked};

/// A [`Profile`] partitioned into segments.
///
/// The segments always tile the profile: each starts where its predecessor ends,
/// the last ends where the first starts, and their lengths sum to
/// `len() + segment_count()`.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedProfile {
    profile: Profile,
    segments: Vec<Segment>,
}

impl SegmentedProfile {
    /// Wrap a profile in the single default segment spanning it.
    ///
    /// # Errors
    ///
    /// Never fails for a validated profile; the `Result` mirrors
    /// [`Segment::full`].
    pub fn new(profile: Profile) -> Result<Self, SegmentError> {
        let mut segments = vec![Segment::full(profile.len())?];
        link_segments(&mut segments)?;
        Ok(Self { profile, segments })
    }

    /// Pair a profile with a list of segments, linking them in order.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`SegmentError::EmptyList`] | `segments` is empty |
    /// | [`SegmentError::ProfileLengthMismatch`] | a segment lies on a different length profile |
    /// | [`SegmentError::Discontinuous`] | the segments do not tile the profile |
    pub fn with_segments(profile: Profile, mut segments: Vec<Segment>) -> Result<Self, SegmentError> {
        check_lengths(&profile, &segments)?;
        link_segments(&mut segments)?;
        Ok(Self { profile, segments })
    }

    #[must_use]
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    #[must_use]
    pub fn into_profile(self) -> Profile {
        self.profile
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.profile.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profile.is_empty()
    }

    /// The segments in list order.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn segment_ids(&self) -> Vec<Uuid> {
        self.segments.iter().map(Segment::id).collect()
    }

    #[must_use]
    pub fn segment_names(&self) -> Vec<String> {
        self.segments.iter().map(Segment::name).collect()
    }

    #[must_use]
    pub fn has_segment(&self, id: Uuid) -> bool {
        self.segments.iter().any(|s| s.id() == id)
    }

    /// True if more than the default whole-profile segment is present.
    #[must_use]
    pub fn has_segments(&self) -> bool {
        self.segments.len() > 1
    }

    /// True if a segment with the same id and bounds is present.
    #[must_use]
    pub fn contains(&self, segment: &Segment) -> bool {
        self.segments.iter().any(|s| {
            s.id() == segment.id() && s.start() == segment.start() && s.end() == segment.end()
        })
    }

    /// # Errors
    ///
    /// Returns [`SegmentError::MissingSegment`] if no segment has `id`.
    pub fn segment(&self, id: Uuid) -> Result<&Segment, SegmentError> {
        self.segments
            .iter()
            .find(|s| s.id() == id)
            .ok_or(SegmentError::MissingSegment { id })
    }

    /// Look up a segment by its positional name, e.g. `Seg_0`.
    #[must_use]
    pub fn segment_named(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name() == name)
    }

    /// The first segment in list order that contains `index`.
    #[must_use]
    pub fn segment_containing(&self, index: usize) -> Option<&Segment> {
        self.segments.iter().find(|s| s.contains(index))
    }

    /// The segment following `id`, wrapping from last to first.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::MissingSegment`] if no segment has `id`.
    pub fn next_segment(&self, id: Uuid) -> Result<&Segment, SegmentError> {
        let position = self.position_of(id)?;
        Ok(&self.segments[(position + 1) % self.segments.len()])
    }

    /// The segment preceding `id`, wrapping from first to last.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::MissingSegment`] if no segment has `id`.
    pub fn prev_segment(&self, id: Uuid) -> Result<&Segment, SegmentError> {
        let position = self.position_of(id)?;
        let count = self.segments.len();
        Ok(&self.segments[(position + count - 1) % count])
    }

    /// Segments beginning with the one that contains index 0 and does not merely
    /// end there. A lone segment is returned as is.
    #[must_use]
    pub fn ordered_segments(&self) -> Vec<Segment> {
        let first = if self.segments.len() == 1 {
            Some(0)
        } else {
            self.segments
                .iter()
                .position(|s| s.contains(0) && s.end() != 0)
        };
        let Some(first) = first else {
            return self.segments.clone();
        };
        self.segments_from_position(first)
    }

    /// Segments in linked order beginning with `id`, re-positioned from zero.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::MissingSegment`] if no segment has `id`.
    pub fn segments_from(&self, id: Uuid) -> Result<Vec<Segment>, SegmentError> {
        Ok(self.segments_from_position(self.position_of(id)?))
    }

    fn segments_from_position(&self, first: usize) -> Vec<Segment> {
        let mut result: Vec<Segment> = self.segments[first..]
            .iter()
            .chain(&self.segments[..first])
            .cloned()
            .collect();
        for (position, segment) in result.iter_mut().enumerate() {
            segment.set_position(position);
        }
        result
    }

    /// Replace the segment list.
    ///
    /// # Errors
    ///
    /// As [`SegmentedProfile::with_segments`]. The profile is unchanged on error.
    pub fn set_segments(&mut self, mut segments: Vec<Segment>) -> Result<(), SegmentError> {
        check_lengths(&self.profile, &segments)?;
        link_segments(&mut segments)?;
        self.segments = segments;
        Ok(())
    }

    /// Reset to the single default segment.
    ///
    /// # Errors
    ///
    /// Never fails for a validated profile.
    pub fn clear_segments(&mut self) -> Result<(), SegmentError> {
        let mut segments = vec![Segment::full(self.len())?];
        link_segments(&mut segments)?;
        self.segments = segments;
        Ok(())
    }

    /// Absolute difference between the profile values at a segment's endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::MissingSegment`] if no segment has `id`.
    pub fn displacement(&self, id: Uuid) -> Result<f64, SegmentError> {
        let segment = self.segment(id)?;
        let start = self.profile.get(segment.start())?;
        let end = self.profile.get(segment.end())?;
        Ok((start - end).abs())
    }

    /// Lock or unlock one segment.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::MissingSegment`] if no segment has `id`.
    pub fn set_segment_lock(&mut self, id: Uuid, locked: bool) -> Result<(), SegmentError> {
        let position = self.position_of(id)?;
        self.segments[position].set_locked(locked);
        Ok(())
    }

    /// Lock or unlock every segment.
    pub fn set_all_locks(&mut self, locked: bool) {
        for segment in &mut self.segments {
            segment.set_locked(locked);
        }
    }

    /// Move the boundaries of segment `id`, dragging its neighbours' shared
    /// boundaries along. The profile is unchanged when the move is rejected.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`SegmentError::MissingSegment`] | no segment has `id` |
    /// | [`SegmentError::Rejected`] | the move breaks a lock, a length or an adjacency rule |
    #[instrument(level = "debug", skip(self), err)]
    pub fn update(&mut self, id: Uuid, start: usize, end: usize) -> Result<(), SegmentError> {
        let position = self.position_of(id)?;
        let count = self.segments.len();
        let prev = (position + count - 1) % count;
        let next = (position + 1) % count;
        for (i, other) in self.segments.iter().enumerate() {
            if i == position || i == prev || i == next {
                continue;
            }
            for index in [start, end] {
                if other.contains(index) {
                    return Err(UpdateRejected::Intrudes {
                        index,
                        id: other.id(),
                    }
                    .into());
                }
            }
        }
        update_linked(&mut self.segments, position, start, end)?;
        Ok(())
    }

    /// Rotate the profile so it starts from index `k`, shifting segments by `-k`
    /// so they stay on the same values.
    #[must_use]
    pub fn start_from(&self, k: isize) -> Self {
        let mut rotated = Self {
            profile: self.profile.offset(k),
            segments: self.segments.iter().map(|s| s.offset(-k)).collect(),
        };
        rotated.relink_positions();
        rotated
    }

    /// Shift every segment by `k` without touching the values.
    pub fn move_segments(&mut self, k: isize) {
        self.segments = self.segments.iter().map(|s| s.offset(k)).collect();
        self.relink_positions();
    }

    fn relink_positions(&mut self) {
        for (position, segment) in self.segments.iter_mut().enumerate() {
            segment.set_position(position);
        }
    }

    /// Resample values and segments to `new_len` points.
    ///
    /// Boundaries land at `round(start / len * new_len)`; segments squeezed below
    /// the minimum length are repaired by nudging boundaries. Ids and locks are
    /// kept, and merge sources are rescaled or dropped when they no longer fit.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`SegmentError::Profile`] | `new_len` is below the minimum profile length |
    /// | [`SegmentError::CannotFit`] | `new_len` cannot hold every segment at minimum length |
    #[instrument(level = "debug", skip(self), fields(len = self.len(), segments = self.segments.len()), err)]
    pub fn interpolate(&self, new_len: usize) -> Result<Self, SegmentError> {
        let profile = self.profile.interpolate(new_len)?;
        let segments = scale_segments(&self.segments, new_len)?;
        Ok(Self { profile, segments })
    }

    /// Merge two adjacent segments into one with id `new_id`, recording both as
    /// merge sources. The merged segment runs from the start of whichever comes
    /// first to the end of the other.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`SegmentError::MissingSegment`] | either id is absent |
    /// | [`SegmentError::NotAdjacent`] | the segments are not neighbours |
    /// | [`SegmentError::PartialDefault`] | `new_id` is the default id and the merge does not span the profile |
    #[instrument(level = "debug", skip(self), err)]
    pub fn merge_segments(&mut self, first: Uuid, second: Uuid, new_id: Uuid) -> Result<(), SegmentError> {
        let p1 = self.position_of(first)?;
        let p2 = self.position_of(second)?;
        let count = self.segments.len();
        let not_adjacent = SegmentError::NotAdjacent { first, second };
        if count < 2 || p1 == p2 {
            return Err(not_adjacent);
        }
        let (lead, follow) = if (p1 + 1) % count == p2 {
            (p1, p2)
        } else if (p2 + 1) % count == p1 {
            (p2, p1)
        } else {
            return Err(not_adjacent);
        };

        let a = &self.segments[lead];
        let b = &self.segments[follow];
        let mut merged = Segment::new(a.start(), b.end(), self.len(), new_id)?;
        merged.add_merge_source(a.clone())?;
        merged.add_merge_source(b.clone())?;

        let mut segments = self.segments.clone();
        segments[lead] = merged;
        segments.remove(follow);
        self.set_segments(segments)?;
        debug!(%first, %second, %new_id, "merged segments");
        Ok(())
    }

    /// Replace a merged segment by its merge sources. A segment without sources
    /// is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::MissingSegment`] if no segment has `id`.
    #[instrument(level = "debug", skip(self), err)]
    pub fn unmerge_segment(&mut self, id: Uuid) -> Result<(), SegmentError> {
        let position = self.position_of(id)?;
        if !self.segments[position].has_merge_sources() {
            return Ok(());
        }
        let sources = self.segments[position].merge_sources().to_vec();
        let mut segments = self.segments.clone();
        segments.splice(position..=position, sources);
        self.set_segments(segments)
    }

    /// True if `index` lies strictly inside segment `id` and both halves of a
    /// split there would reach the minimum segment length.
    #[must_use]
    pub fn is_splittable(&self, id: Uuid, index: usize) -> bool {
        let Ok(segment) = self.segment(id) else {
            return false;
        };
        segment.contains(index)
            && index != segment.start()
            && index != segment.end()
            && Segment::new(segment.start(), index, self.len(), Uuid::nil()).is_ok()
            && Segment::new(index, segment.end(), self.len(), Uuid::nil()).is_ok()
    }

    /// Split segment `id` at `index` into `first_id` (start to index) and
    /// `second_id` (index to end).
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`SegmentError::MissingSegment`] | no segment has `id` |
    /// | [`SegmentError::NotSplittable`] | [`SegmentedProfile::is_splittable`] is false |
    #[instrument(level = "debug", skip(self), err)]
    pub fn split_segment(
        &mut self,
        id: Uuid,
        index: usize,
        first_id: Uuid,
        second_id: Uuid,
    ) -> Result<(), SegmentError> {
        let position = self.position_of(id)?;
        if !self.is_splittable(id, index) {
            return Err(SegmentError::NotSplittable { id, index });
        }
        let mut parent = self.segments[position].clone();
        let first = Segment::new(parent.start(), index, self.len(), first_id)?;
        let second = Segment::new(index, parent.end(), self.len(), second_id)?;
        parent.clear_merge_sources();
        parent.add_merge_source(first)?;
        parent.add_merge_source(second)?;
        if parent.merge_sources().len() != 2 {
            // one half carried the default id and was ignored
            return Err(SegmentError::NotSplittable { id, index });
        }
        self.segments[position] = parent;
        self.unmerge_segment(id)
    }

    /// The profile traversed in the opposite direction, with segments mirrored
    /// and listed in reverse order.
    ///
    /// # Errors
    ///
    /// Never fails for a consistent segmented profile.
    pub fn reversed(&self) -> Result<Self, SegmentError> {
        let segments = self.segments.iter().rev().map(Segment::reversed).collect();
        Self::with_segments(self.profile.reversed(), segments)
    }

    fn position_of(&self, id: Uuid) -> Result<usize, SegmentError> {
        self.segments
            .iter()
            .position(|s| s.id() == id)
            .ok_or(SegmentError::MissingSegment { id })
    }
}

fn check_lengths(profile: &Profile, segments: &[Segment]) -> Result<(), SegmentError> {
    if let Some(bad) = segments.iter().find(|s| s.profile_len() != profile.len()) {
        return Err(SegmentError::ProfileLengthMismatch {
            expected: profile.len(),
            got: bad.profile_len(),
        });
    }
    Ok(())
}

impl std::fmt::Display for SegmentedProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Profile of length {}", self.len())?;
        for segment in &self.segments {
            write!(f, " | {segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_SEGMENT_ID;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn ramp(len: usize) -> Profile {
        Profile::new((0..len).map(|i| i as f64).collect()).unwrap()
    }

    fn three_segments() -> SegmentedProfile {
        let segments = vec![
            Segment::new(0, 4, 12, id(1)).unwrap(),
            Segment::new(4, 8, 12, id(2)).unwrap(),
            Segment::new(8, 0, 12, id(3)).unwrap(),
        ];
        SegmentedProfile::with_segments(ramp(12), segments).unwrap()
    }

    #[test]
    fn new_has_default_segment() {
        let sp = SegmentedProfile::new(ramp(10)).unwrap();
        assert_eq!(sp.segment_count(), 1);
        assert_eq!(sp.segments()[0].id(), DEFAULT_SEGMENT_ID);
        assert!(!sp.has_segments());
    }

    #[test]
    fn lookups() {
        let sp = three_segments();
        assert_eq!(sp.segment(id(2)).unwrap().start(), 4);
        assert!(matches!(
            sp.segment(id(9)),
            Err(SegmentError::MissingSegment { .. })
        ));
        assert_eq!(sp.segment_named("Seg_2").unwrap().id(), id(3));
        assert_eq!(sp.next_segment(id(3)).unwrap().id(), id(1));
        assert_eq!(sp.prev_segment(id(1)).unwrap().id(), id(3));
        assert_eq!(sp.segment_containing(6).unwrap().id(), id(2));
        assert!((sp.displacement(id(2)).unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn ordered_segments_start_at_zero() {
        let sp = three_segments().start_from(2);
        let ordered = sp.ordered_segments();
        assert!(ordered[0].contains(0));
        assert_ne!(ordered[0].end(), 0);
        assert_eq!(ordered[0].position(), 0);
        assert_eq!(ordered.len(), 3);
    }

    #[test]
    fn update_rejects_intrusion() {
        let segments = vec![
            Segment::new(0, 4, 16, id(1)).unwrap(),
            Segment::new(4, 8, 16, id(2)).unwrap(),
            Segment::new(8, 12, 16, id(3)).unwrap(),
            Segment::new(12, 0, 16, id(4)).unwrap(),
        ];
        let mut sp = SegmentedProfile::with_segments(ramp(16), segments).unwrap();
        let before = sp.clone();
        assert!(matches!(
            sp.update(id(2), 4, 13),
            Err(SegmentError::Rejected(UpdateRejected::Intrudes { id, .. })) if id == Uuid::from_u128(4)
        ));
        assert_eq!(sp, before);
        sp.update(id(2), 5, 10).unwrap();
        assert_eq!(sp.segment(id(1)).unwrap().end(), 5);
        assert_eq!(sp.segment(id(3)).unwrap().start(), 10);
    }

    #[test]
    fn rotation_round_trip() {
        let sp = three_segments();
        for k in [-5, 1, 7, 12] {
            assert_eq!(sp.start_from(k).start_from(-k), sp);
        }
        let rotated = sp.start_from(3);
        assert_eq!(rotated.segment(id(2)).unwrap().start(), 1);
        assert!((rotated.profile().as_slice()[1] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn interpolation_keeps_ids_and_locks() {
        let mut sp = three_segments();
        sp.set_segment_lock(id(2), true).unwrap();
        let big = sp.interpolate(24).unwrap();
        assert_eq!(big.len(), 24);
        assert_eq!(big.segment_ids(), sp.segment_ids());
        assert!(big.segment(id(2)).unwrap().is_locked());
        assert_eq!(big.segment(id(2)).unwrap().start(), 8);
        let total: usize = big.segments().iter().map(Segment::length).sum();
        assert_eq!(total, 24 + 3);
    }

    #[test]
    fn lone_segment_interpolates_to_full_span() {
        let sp = SegmentedProfile::new(ramp(10)).unwrap();
        let scaled = sp.interpolate(30).unwrap();
        assert_eq!(scaled.segment_count(), 1);
        let only = &scaled.segments()[0];
        assert_eq!(only.start(), only.end());
        assert_eq!(only.id(), DEFAULT_SEGMENT_ID);
    }

    #[test]
    fn merge_and_unmerge_restore() {
        let mut sp = three_segments();
        let before = sp.clone();
        sp.merge_segments(id(2), id(1), id(10)).unwrap();
        assert_eq!(sp.segment_count(), 2);
        let merged = sp.segment(id(10)).unwrap();
        assert_eq!((merged.start(), merged.end()), (0, 8));
        assert!(merged.has_merge_source(id(1)));
        sp.unmerge_segment(id(10)).unwrap();
        assert_eq!(sp, before);
    }

    #[test]
    fn merge_across_the_wrap() {
        let mut sp = three_segments();
        sp.merge_segments(id(3), id(1), id(10)).unwrap();
        let merged = sp.segment(id(10)).unwrap();
        assert_eq!((merged.start(), merged.end()), (8, 4));
        let total: usize = sp.segments().iter().map(Segment::length).sum();
        assert_eq!(total, 12 + 2);
    }

    #[test]
    fn merge_requires_adjacency() {
        let segments = vec![
            Segment::new(0, 4, 16, id(1)).unwrap(),
            Segment::new(4, 8, 16, id(2)).unwrap(),
            Segment::new(8, 12, 16, id(3)).unwrap(),
            Segment::new(12, 0, 16, id(4)).unwrap(),
        ];
        let mut sp = SegmentedProfile::with_segments(ramp(16), segments).unwrap();
        assert!(matches!(
            sp.merge_segments(id(1), id(3), id(10)),
            Err(SegmentError::NotAdjacent { .. })
        ));
    }

    #[test]
    fn unmerge_without_sources_is_noop() {
        let mut sp = three_segments();
        let before = sp.clone();
        sp.unmerge_segment(id(2)).unwrap();
        assert_eq!(sp, before);
    }

    #[test]
    fn split_then_merge_is_identity() {
        let mut sp = three_segments();
        sp.split_segment(id(3), 10, id(20), id(21)).unwrap();
        assert_eq!(sp.segment_count(), 4);
        assert_eq!(sp.segment(id(20)).unwrap().end(), 10);
        sp.merge_segments(id(20), id(21), id(3)).unwrap();
        let restored = sp.segment(id(3)).unwrap();
        assert_eq!((restored.start(), restored.end()), (8, 0));
    }

    #[test]
    fn split_requires_room() {
        let mut sp = three_segments();
        assert!(!sp.is_splittable(id(2), 5));
        assert!(!sp.is_splittable(id(2), 4));
        assert!(!sp.is_splittable(id(2), 10));
        assert!(sp.is_splittable(id(2), 6));
        assert!(matches!(
            sp.split_segment(id(2), 5, id(20), id(21)),
            Err(SegmentError::NotSplittable { .. })
        ));
    }

    #[test]
    fn reverse_mirrors_segments() {
        let sp = three_segments();
        let reversed = sp.reversed().unwrap();
        assert_eq!(reversed.segment_ids(), vec![id(3), id(2), id(1)]);
        let mirrored = reversed.segment(id(1)).unwrap();
        assert_eq!((mirrored.start(), mirrored.end()), (7, 11));
        assert!((reversed.profile().as_slice()[0] - 11.0).abs() < 1e-12);
        assert_eq!(reversed.reversed().unwrap(), sp);
    }
}
