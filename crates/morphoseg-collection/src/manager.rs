//! Collection-wide segmentation edits and landmark realignment.
//!
//! [`ProfileManager`] keeps a [`ProfileCollection`], its members and an optional
//! consensus member consistent with each other. Structural edits are applied to
//! the segmented median first and then replayed by segment id on every member;
//! landmark moves are propagated by best-fit alignment against the median.

use morphoseg_profile::{
    Profile, Segment, SegmentError, SegmentedProfile, scale_segments, wrap_index,
};
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::collection::ProfileCollection;
use crate::config::ManagerConfig;
use crate::error::CollectionError;
use crate::kind::{ProfileType, Quartile};
use crate::landmark::{Landmark, ORIENTATION_POINT, REFERENCE_POINT};
use crate::member::Profileable;

/// New segment lists for every member and the consensus, computed before any of
/// them is committed.
type Plan = (Vec<Vec<Segment>>, Option<Vec<Segment>>);

/// Applies edits to a collection and keeps its members in step.
///
/// A manager over an empty member slice edits the collection alone; this is how
/// derived datasets that share members with their root are updated.
pub struct ProfileManager<'a, M: Profileable> {
    collection: &'a mut ProfileCollection,
    members: &'a mut [M],
    consensus: Option<&'a mut M>,
    config: ManagerConfig,
}

impl<'a, M: Profileable + Send + Sync> ProfileManager<'a, M> {
    pub fn new(collection: &'a mut ProfileCollection, members: &'a mut [M]) -> Self {
        Self {
            collection,
            members,
            consensus: None,
            config: ManagerConfig::default(),
        }
    }

    /// Keep `consensus` in step with every edit.
    #[must_use]
    pub fn with_consensus(mut self, consensus: &'a mut M) -> Self {
        self.consensus = Some(consensus);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn collection(&self) -> &ProfileCollection {
        self.collection
    }

    #[must_use]
    pub fn members(&self) -> &[M] {
        self.members
    }

    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.collection.segment_count()
    }

    /// Median profile of the realignment type, rotated to `landmark`.
    ///
    /// # Errors
    ///
    /// As [`ProfileCollection::profile`].
    pub fn median_profile(&self, landmark: &Landmark) -> Result<Profile, CollectionError> {
        self.collection
            .profile(self.config.realign_type, landmark, Quartile::MEDIAN)
    }

    /// Segmented median of the realignment type, zeroed at the reference point.
    ///
    /// # Errors
    ///
    /// As [`ProfileCollection::segmented_profile`].
    pub fn segmented_median(&self) -> Result<SegmentedProfile, CollectionError> {
        self.collection.segmented_profile(
            self.config.realign_type,
            &REFERENCE_POINT,
            Quartile::MEDIAN,
        )
    }

    // -----------------------------------------------------------------------
    // Landmarks
    // -----------------------------------------------------------------------

    /// Move `landmark` in every unlocked member to the border index where the
    /// member best matches `median`. Moving either vertical also repositions the
    /// orientation point of members that carry geometry.
    ///
    /// Members that fail are logged and left as they were. Returns the number of
    /// members skipped that way.
    #[instrument(skip(self, median), fields(landmark = %landmark, members = self.members.len()))]
    pub fn update_landmark_to_median_best_fit(&mut self, landmark: &Landmark, median: &Profile) -> usize {
        let kind = self.config.realign_type;
        let window = self.config.best_fit_window;
        let skipped = self.for_each_unlocked("best-fit realignment", |member| {
            let index = best_fit_index(member, median, kind, landmark, window)?;
            member.set_landmark(landmark.clone(), index as isize)?;
            if landmark.is_vertical() {
                reorient(member)?;
            }
            Ok(())
        });
        debug!(skipped, "members realigned");
        skipped
    }

    /// Place `landmark` at aggregate `index` and propagate it to the members.
    ///
    /// Moving the reference point rotates the whole collection: the segmented
    /// median is restarted at `index`, the boundary that sat on the old reference
    /// point follows it, and every unlocked member is realigned and resegmented.
    /// Any other landmark placed on an index already held by another landmark is
    /// copied from that landmark in each member; otherwise it is realigned alone.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::IndexOutOfRange`] | `index` is outside the aggregate |
    /// | [`CollectionError::Unsegmented`] | the reference point moves in an unsegmented collection |
    /// | [`CollectionError::Segment`] | the boundary on the reference point cannot follow it |
    #[instrument(skip(self), fields(landmark = %landmark))]
    pub fn update_border_tag(&mut self, landmark: &Landmark, index: usize) -> Result<(), CollectionError> {
        let len = self.collection.length();
        if index >= len {
            return Err(CollectionError::IndexOutOfRange { index, len });
        }
        if landmark.is_reference_point() {
            return self.move_reference_point(index);
        }

        let alias = self
            .collection
            .landmarks()
            .iter()
            .find(|&(other, &i)| other != landmark && i == index)
            .map(|(other, _)| other.clone());
        self.collection.set_landmark(landmark.clone(), index)?;

        if let Some(existing) = alias {
            debug!(existing = %existing, "landmark shares an index, copying");
            self.for_each_unlocked("landmark copy", |member| {
                let at = member.landmark_index(&existing)?;
                member.set_landmark(landmark.clone(), at as isize)?;
                if landmark.is_vertical() {
                    reorient(member)?;
                }
                Ok(())
            });
        } else if !self.members.is_empty() || self.consensus.is_some() {
            let median = self.median_profile(landmark)?;
            self.update_landmark_to_median_best_fit(landmark, &median);
        }
        info!(index, "landmark updated");
        Ok(())
    }

    fn move_reference_point(&mut self, index: usize) -> Result<(), CollectionError> {
        if index == 0 {
            return Ok(());
        }
        let segments = restart_segments(self.segmented_median()?, index)?;

        self.collection.move_reference_point(index);
        self.collection.set_segments(segments)?;

        if !self.members.is_empty() || self.consensus.is_some() {
            let median = self.median_profile(&REFERENCE_POINT)?;
            self.update_landmark_to_median_best_fit(&REFERENCE_POINT, &median);
            self.apply_scaled_segments(false);
        }
        self.recalculate_aggregates()?;
        info!(index, segments = self.collection.segment_count(), "reference point moved");
        Ok(())
    }

    /// Realign each given landmark from the collection onto the members. The
    /// reference point is never copied.
    ///
    /// # Errors
    ///
    /// As [`ProfileCollection::profile`], if a landmark is missing from the collection.
    pub fn copy_landmarks_to_members(&mut self, landmarks: &[Landmark]) -> Result<(), CollectionError> {
        for landmark in landmarks.iter().filter(|l| !l.is_reference_point()) {
            let median = self.median_profile(landmark)?;
            self.update_landmark_to_median_best_fit(landmark, &median);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Segment boundaries
    // -----------------------------------------------------------------------

    /// Move the start (or end) of median segment `id` to aggregate `index`, then
    /// lay the new segmentation onto every member. Landmarks other than the
    /// reference point that sat on the moved boundary move with it. Moving the
    /// boundary on the reference point moves the reference point itself, via
    /// [`ProfileManager::update_border_tag`].
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::Unsegmented`] | the collection has no segments |
    /// | [`CollectionError::Segment`] | the segment is missing or the move is rejected |
    #[instrument(skip(self))]
    pub fn update_median_segment_index(&mut self, start: bool, id: Uuid, index: usize) -> Result<(), CollectionError> {
        let mut median = self.segmented_median()?;
        let segment = median.segment(id)?.clone();
        let old = if start { segment.start() } else { segment.end() };
        if old == index {
            return Ok(());
        }
        if old == 0 {
            return self.update_border_tag(&REFERENCE_POINT, index);
        }

        let (new_start, new_end) = if start {
            (index, segment.end())
        } else {
            (segment.start(), index)
        };
        median.update(id, new_start, new_end)?;
        self.collection.set_segments(median.segments().to_vec())?;

        let carried: Vec<Landmark> = self
            .collection
            .landmarks()
            .iter()
            .filter(|&(l, &i)| !l.is_reference_point() && i == old)
            .map(|(l, _)| l.clone())
            .collect();
        for landmark in &carried {
            self.collection.set_landmark(landmark.clone(), index)?;
        }

        self.apply_scaled_segments(true);
        if !self.members.is_empty() {
            self.copy_landmarks_to_members(&carried)?;
        }
        info!(%id, old, index, "median segment boundary moved");
        Ok(())
    }

    /// Move the start of segment `segment_id` in one member to `index`, counted
    /// from that member's reference point. Landmarks on the old start move too.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::MissingMember`] | no member has `member_id` |
    /// | [`CollectionError::Segment`] | the segment is missing or the move is rejected |
    pub fn update_member_segment_start(
        &mut self,
        member_id: Uuid,
        segment_id: Uuid,
        index: usize,
    ) -> Result<(), CollectionError> {
        let kind = self.config.realign_type;
        let member = self
            .members
            .iter_mut()
            .find(|m| m.id() == member_id)
            .ok_or(CollectionError::MissingMember { id: member_id })?;

        let mut profile = member.segmented_profile(kind, &REFERENCE_POINT)?;
        let segment = profile.segment(segment_id)?.clone();
        profile.update(segment_id, index, segment.end())?;

        let rp = member.landmark_index(&REFERENCE_POINT)?;
        member.set_segments(profile.segments().to_vec())?;

        let old_raw = member.wrap_index((segment.start() + rp) as isize);
        let new_raw = member.wrap_index((index + rp) as isize);
        let carried: Vec<Landmark> = member
            .landmarks()
            .iter()
            .filter(|&(_, &i)| i == old_raw)
            .map(|(l, _)| l.clone())
            .collect();
        for landmark in carried {
            member.set_landmark(landmark, new_raw as isize)?;
        }
        Ok(())
    }

    /// Lay the collection segments proportionally onto every member and the
    /// consensus. Members whose border is too short are logged and skipped.
    ///
    /// Returns the number of members skipped.
    pub fn apply_median_segments_to_members(&mut self) -> usize {
        self.apply_scaled_segments(true)
    }

    fn apply_scaled_segments(&mut self, include_locked: bool) -> usize {
        let segments = self.collection.segments().to_vec();
        if segments.is_empty() {
            return 0;
        }
        let apply = |member: &mut M| -> Result<(), CollectionError> {
            let scaled = scale_segments(&segments, member.border_len())?;
            member.set_segments(scaled)
        };
        if include_locked {
            self.for_each_member("segment scaling", apply)
        } else {
            self.for_each_unlocked("segment scaling", apply)
        }
    }

    // -----------------------------------------------------------------------
    // Structural edits
    // -----------------------------------------------------------------------

    /// True if `second` directly follows `first` in the median and their shared
    /// boundary carries no core landmark.
    ///
    /// # Errors
    ///
    /// As [`ProfileManager::segmented_median`], plus [`CollectionError::Segment`]
    /// if `first` is missing.
    pub fn test_segments_mergeable(&self, first: Uuid, second: Uuid) -> Result<bool, CollectionError> {
        let median = self.segmented_median()?;
        if median.next_segment(first)?.id() != second {
            return Ok(false);
        }
        let boundary = median.segment(first)?.end();
        Ok(self.core_landmark_at(boundary).is_none())
    }

    fn core_landmark_at(&self, index: usize) -> Option<&Landmark> {
        self.collection
            .landmarks()
            .iter()
            .find(|&(l, &i)| l.is_core() && i == index)
            .map(|(l, _)| l)
    }

    /// Merge two adjacent segments into `new_id` in the median, every member and
    /// the consensus. Nothing changes unless every member can be merged.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::MergeAcrossCore`] | the segments meet on a core landmark |
    /// | [`CollectionError::Segment`] | the median merge is rejected |
    /// | [`CollectionError::Member`] | the merge cannot be replayed on a member |
    #[instrument(skip(self))]
    pub fn merge_segments(&mut self, first: Uuid, second: Uuid, new_id: Uuid) -> Result<(), CollectionError> {
        let mut median = self.segmented_median()?;
        let boundary = if median.next_segment(first)?.id() == second {
            Some(median.segment(first)?.end())
        } else if median.next_segment(second)?.id() == first {
            Some(median.segment(second)?.end())
        } else {
            None
        };
        if let Some(core) = boundary.and_then(|b| self.core_landmark_at(b)) {
            return Err(CollectionError::MergeAcrossCore {
                first,
                second,
                name: core.name().to_owned(),
            });
        }
        median.merge_segments(first, second, new_id)?;

        let kind = self.config.realign_type;
        let plan = self.plan(|member| {
            let mut profile = member.segmented_profile(kind, &REFERENCE_POINT)?;
            profile.merge_segments(first, second, new_id)?;
            Ok(profile.segments().to_vec())
        })?;
        self.commit(median, plan)?;
        info!(%first, %second, %new_id, "segments merged");
        Ok(())
    }

    /// Split segment `id` into `first_id` and `second_id`. The median splits at
    /// the segment midpoint and each member at the same fraction of its own
    /// segment. Nothing changes unless every member can be split.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::Segment`] | the segment is missing or too short to split |
    /// | [`CollectionError::Member`] | a member's segment cannot be split |
    #[instrument(skip(self))]
    pub fn split_segment(&mut self, id: Uuid, first_id: Uuid, second_id: Uuid) -> Result<(), CollectionError> {
        let mut median = self.segmented_median()?;
        let segment = median.segment(id)?.clone();
        let index = segment.midpoint();
        let fraction = segment
            .index_proportion(index)
            .ok_or(SegmentError::NotSplittable { id, index })?;
        median.split_segment(id, index, first_id, second_id)?;

        let kind = self.config.realign_type;
        let plan = self.plan(|member| {
            let mut profile = member.segmented_profile(kind, &REFERENCE_POINT)?;
            let at = profile.segment(id)?.proportional_index(fraction)?;
            if !profile.is_splittable(id, at) {
                return Err(SegmentError::NotSplittable { id, index: at }.into());
            }
            profile.split_segment(id, at, first_id, second_id)?;
            Ok(profile.segments().to_vec())
        })?;
        self.commit(median, plan)?;
        info!(%id, index, "segment split");
        Ok(())
    }

    /// Restore the merge sources of segment `id` in the median, every member and
    /// the consensus. A segment without merge sources is left as it is.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::Segment`] | the segment is missing from the median |
    /// | [`CollectionError::Member`] | the segment is missing from a member |
    #[instrument(skip(self))]
    pub fn unmerge_segment(&mut self, id: Uuid) -> Result<(), CollectionError> {
        let mut median = self.segmented_median()?;
        median.unmerge_segment(id)?;

        let kind = self.config.realign_type;
        let plan = self.plan(|member| {
            let mut profile = member.segmented_profile(kind, &REFERENCE_POINT)?;
            profile.unmerge_segment(id)?;
            Ok(profile.segments().to_vec())
        })?;
        self.commit(median, plan)?;
        info!(%id, "segment unmerged");
        Ok(())
    }

    /// Lock or unlock every segment of the collection, the members and the consensus.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::Member`] if a member rejects its segments.
    pub fn set_lock_on_all_segments(&mut self, locked: bool) -> Result<(), CollectionError> {
        self.set_locks(|_| locked)
    }

    /// As [`ProfileManager::set_lock_on_all_segments`], with segment `id` set to
    /// the opposite state.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::Member`] if a member rejects its segments.
    pub fn set_lock_on_all_segments_except(&mut self, id: Uuid, locked: bool) -> Result<(), CollectionError> {
        self.set_locks(|s| if s == id { !locked } else { locked })
    }

    fn set_locks(&mut self, lock: impl Fn(Uuid) -> bool) -> Result<(), CollectionError> {
        let relock = |mut segments: Vec<Segment>| {
            for segment in &mut segments {
                segment.set_locked(lock(segment.id()));
            }
            segments
        };
        if self.collection.has_segments() {
            let segments = relock(self.collection.segments().to_vec());
            self.collection.set_segments(segments)?;
        }
        for member in self.members.iter_mut().chain(self.consensus.as_deref_mut()) {
            let id = member.id();
            member
                .set_segments(relock(member.segments()))
                .map_err(|e| CollectionError::for_member(id, e))?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Aggregates and copying
    // -----------------------------------------------------------------------

    /// Rebuild the aggregates from the current members at the current length.
    /// Does nothing for a manager without members.
    ///
    /// # Errors
    ///
    /// As [`ProfileCollection::create_aggregate`].
    pub fn recalculate_aggregates(&mut self) -> Result<(), CollectionError> {
        if self.members.is_empty() {
            return Ok(());
        }
        let length = self.collection.length();
        self.collection.create_aggregate(self.members.iter(), length)
    }

    /// Copy landmarks and segments into another collection whose aggregate may
    /// have a different length.
    ///
    /// Landmarks are placed at the same proportion of the destination aggregate
    /// and segments come from the source median interpolated to that length. The
    /// destination's members are then resegmented and realigned.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::InvalidLength`] | the destination has no aggregate |
    /// | [`CollectionError::Segment`] | the median cannot be interpolated to the destination length |
    /// | [`CollectionError::SegmentMismatch`] | the copied ids or locks differ from the source |
    #[instrument(skip(self, dest), fields(from = self.collection.length(), to = dest.collection.length()))]
    pub fn copy_segments_and_landmarks_to<N: Profileable + Send + Sync>(
        &self,
        dest: &mut ProfileManager<'_, N>,
    ) -> Result<(), CollectionError> {
        let length = dest.collection.length();
        if length == 0 {
            return Err(CollectionError::InvalidLength { length });
        }

        let mut copied = Vec::new();
        for (landmark, &index) in self.collection.landmarks() {
            if landmark.is_reference_point() {
                continue;
            }
            let proportion = self.collection.proportion_of_index(index)?;
            let dest_index = dest.collection.index_of_proportion(proportion)?;
            dest.collection.set_landmark(landmark.clone(), dest_index)?;
            copied.push(landmark.clone());
        }

        let median = self.segmented_median()?.interpolate(length)?;
        dest.collection.set_segments(median.segments().to_vec())?;
        dest.apply_median_segments_to_members();
        if !dest.members.is_empty() {
            dest.copy_landmarks_to_members(&copied)?;
        }

        let source: Vec<(Uuid, bool)> = self
            .collection
            .segments()
            .iter()
            .map(|s| (s.id(), s.is_locked()))
            .collect();
        let target: Vec<(Uuid, bool)> = dest
            .collection
            .segments()
            .iter()
            .map(|s| (s.id(), s.is_locked()))
            .collect();
        if source != target {
            return Err(CollectionError::SegmentMismatch {
                reason: format!("expected {source:?}, copied {target:?}"),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Member iteration
    // -----------------------------------------------------------------------

    fn for_each_unlocked<F>(&mut self, what: &str, f: F) -> usize
    where
        F: Fn(&mut M) -> Result<(), CollectionError> + Sync,
    {
        self.run_on_members(what, true, f)
    }

    fn for_each_member<F>(&mut self, what: &str, f: F) -> usize
    where
        F: Fn(&mut M) -> Result<(), CollectionError> + Sync,
    {
        self.run_on_members(what, false, f)
    }

    fn run_on_members<F>(&mut self, what: &str, skip_locked: bool, f: F) -> usize
    where
        F: Fn(&mut M) -> Result<(), CollectionError> + Sync,
    {
        let apply = |member: &mut M| -> bool {
            if skip_locked && member.is_locked() {
                return true;
            }
            match f(member) {
                Ok(()) => true,
                Err(e) => {
                    warn!(member = %member.id(), error = %e, "{what} failed, member skipped");
                    false
                }
            }
        };
        let mut skipped = if self.config.parallel {
            self.members.par_iter_mut().map(&apply).filter(|ok| !ok).count()
        } else {
            self.members.iter_mut().map(&apply).filter(|ok| !ok).count()
        };
        if let Some(consensus) = self.consensus.as_deref_mut() {
            if !apply(consensus) {
                skipped += 1;
            }
        }
        skipped
    }

    /// Compute the new segments of every member and the consensus, failing on
    /// the first member that cannot take the edit.
    fn plan<F>(&self, f: F) -> Result<Plan, CollectionError>
    where
        F: Fn(&M) -> Result<Vec<Segment>, CollectionError> + Sync,
    {
        let run = |member: &M| f(member).map_err(|e| CollectionError::for_member(member.id(), e));
        let members = if self.config.parallel {
            self.members.par_iter().map(&run).collect::<Result<Vec<_>, _>>()?
        } else {
            self.members.iter().map(&run).collect::<Result<Vec<_>, _>>()?
        };
        let consensus = self.consensus.as_deref().map(&run).transpose()?;
        Ok((members, consensus))
    }

    fn commit(&mut self, median: SegmentedProfile, (members, consensus): Plan) -> Result<(), CollectionError> {
        self.collection.set_segments(median.segments().to_vec())?;
        for (member, segments) in self.members.iter_mut().zip(members) {
            let id = member.id();
            member
                .set_segments(segments)
                .map_err(|e| CollectionError::for_member(id, e))?;
        }
        if let (Some(member), Some(segments)) = (self.consensus.as_deref_mut(), consensus) {
            let id = member.id();
            member
                .set_segments(segments)
                .map_err(|e| CollectionError::for_member(id, e))?;
        }
        Ok(())
    }
}

/// Border index at which `member` best matches `template`, searching either the
/// full circle or `window` indices around the member's current landmark index.
fn best_fit_index<M: Profileable>(
    member: &M,
    template: &Profile,
    kind: ProfileType,
    landmark: &Landmark,
    window: Option<usize>,
) -> Result<usize, CollectionError> {
    let raw = member.raw_profile(kind)?;
    let len = raw.len();
    let template = template.interpolate(len)?;
    match (window, member.landmark_index(landmark)) {
        (Some(w), Ok(current)) if 2 * w + 1 < len => {
            let from = current as isize - w as isize;
            let shifted = raw.offset(from);
            let k = template.find_best_fit_offset_in(&shifted, 0, 2 * w + 1)?;
            Ok(wrap_index(from + k as isize, len))
        }
        _ => Ok(template.find_best_fit_offset(raw)),
    }
}

fn reorient<M: Profileable>(member: &mut M) -> Result<(), CollectionError> {
    if let Some(index) = member.orientation_point_below_centroid() {
        member.set_landmark(ORIENTATION_POINT, index as isize)?;
    }
    Ok(())
}

/// Segments of the median restarted at a new reference point `index`. The
/// boundary on the old reference point is moved onto the new one unless a
/// boundary already sits there; segment locks do not block it.
fn restart_segments(mut median: SegmentedProfile, index: usize) -> Result<Vec<Segment>, CollectionError> {
    if let [only] = median.segments() {
        return Ok(vec![only.offset(-(only.start() as isize))]);
    }
    if !median.segments().iter().any(|s| s.start() == index) {
        let anchored = median
            .segments()
            .iter()
            .find(|s| s.start() == 0)
            .cloned()
            .ok_or_else(|| CollectionError::SegmentMismatch {
                reason: "no segment starts at the reference point".to_owned(),
            })?;
        let locks: Vec<(Uuid, bool)> = median
            .segments()
            .iter()
            .map(|s| (s.id(), s.is_locked()))
            .collect();
        median.set_all_locks(false);
        median.update(anchored.id(), index, anchored.end())?;
        for (id, locked) in locks {
            median.set_segment_lock(id, locked)?;
        }
    }
    Ok(median.start_from(index as isize).segments().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::TOP_VERTICAL;
    use crate::member::BorderObject;

    const N: usize = 50;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn base() -> Profile {
        let values = (0..N)
            .map(|i| {
                let t = i as f64 / N as f64 * std::f64::consts::TAU;
                180.0 + 60.0 * t.sin() + 25.0 * (2.0 * t + 1.0).cos() + i as f64 * 0.5
            })
            .collect();
        Profile::new(values).unwrap()
    }

    /// A member whose profile zeroed at its reference point equals `base()`.
    fn member(n: u128, shift: usize) -> BorderObject {
        let mut m = BorderObject::new(id(n), format!("m{n}"), base().offset(-(shift as isize))).unwrap();
        m.set_landmark(REFERENCE_POINT, shift as isize).unwrap();
        m
    }

    fn setup() -> (ProfileCollection, Vec<BorderObject>) {
        let members = vec![member(1, 0), member(2, 4), member(3, 9)];
        let mut collection = ProfileCollection::new();
        collection.create_aggregate(&members, N).unwrap();
        collection
            .set_segments(vec![
                Segment::new(0, 20, N, id(101)).unwrap(),
                Segment::new(20, 35, N, id(102)).unwrap(),
                Segment::new(35, 0, N, id(103)).unwrap(),
            ])
            .unwrap();
        (collection, members)
    }

    fn manager<'a>(
        collection: &'a mut ProfileCollection,
        members: &'a mut [BorderObject],
    ) -> ProfileManager<'a, BorderObject> {
        let mut manager = ProfileManager::new(collection, members)
            .with_config(ManagerConfig::new().with_parallel(false));
        manager.apply_median_segments_to_members();
        manager
    }

    fn ids(segments: &[Segment]) -> Vec<Uuid> {
        segments.iter().map(Segment::id).collect()
    }

    #[test]
    fn members_take_the_median_segments() {
        let (mut collection, mut members) = setup();
        let m = manager(&mut collection, &mut members);
        assert_eq!(m.segment_count(), 3);
        for member in m.members() {
            assert_eq!(ids(&member.segments()), vec![id(101), id(102), id(103)]);
            assert_eq!(member.segments()[1].start(), 20);
        }
    }

    #[test]
    fn merge_replays_on_every_member() {
        let (mut collection, mut members) = setup();
        let mut m = manager(&mut collection, &mut members);
        assert!(m.test_segments_mergeable(id(101), id(102)).unwrap());
        assert!(!m.test_segments_mergeable(id(102), id(101)).unwrap());
        assert!(!m.test_segments_mergeable(id(103), id(101)).unwrap());

        m.merge_segments(id(101), id(102), id(110)).unwrap();
        assert_eq!(m.collection().segment_ids(), vec![id(110), id(103)]);
        for member in m.members() {
            let segments = member.segments();
            assert_eq!(ids(&segments), vec![id(110), id(103)]);
            assert!(segments[0].has_merge_source(id(102)));
        }

        m.unmerge_segment(id(110)).unwrap();
        assert_eq!(m.collection().segment_ids(), vec![id(101), id(102), id(103)]);
    }

    #[test]
    fn merge_across_reference_point_is_refused() {
        let (mut collection, mut members) = setup();
        let mut m = manager(&mut collection, &mut members);
        assert!(matches!(
            m.merge_segments(id(103), id(101), id(110)),
            Err(CollectionError::MergeAcrossCore { .. })
        ));
        assert_eq!(m.segment_count(), 3);
    }

    #[test]
    fn replay_is_all_or_nothing() {
        let (mut collection, mut members) = setup();
        {
            let _ = manager(&mut collection, &mut members);
        }
        members[2]
            .set_segments(vec![Segment::new(0, 0, N, id(200)).unwrap()])
            .unwrap();
        let before = members[0].segments();
        let mut m = ProfileManager::new(&mut collection, &mut members);
        let err = m.merge_segments(id(101), id(102), id(110)).unwrap_err();
        assert!(matches!(err, CollectionError::Member { id: who, .. } if who == id(3)));
        assert_eq!(m.segment_count(), 3);
        assert_eq!(m.members()[0].segments(), before);
    }

    #[test]
    fn split_at_median_midpoint() {
        let (mut collection, mut members) = setup();
        let mut m = manager(&mut collection, &mut members);
        m.split_segment(id(101), id(121), id(122)).unwrap();
        let segments = m.collection().segments();
        assert_eq!(ids(segments), vec![id(121), id(122), id(102), id(103)]);
        assert_eq!(segments[0].end(), 10);
        for member in m.members() {
            assert_eq!(member.segments()[1].start(), 10);
        }
        assert!(m.split_segment(id(999), id(1), id(2)).is_err());
    }

    #[test]
    fn moving_a_boundary_updates_members_and_landmarks() {
        let (mut collection, mut members) = setup();
        collection.set_landmark(TOP_VERTICAL, 20).unwrap();
        let mut m = manager(&mut collection, &mut members);
        m.update_median_segment_index(true, id(102), 24).unwrap();
        assert_eq!(m.collection().segments()[1].start(), 24);
        assert_eq!(m.collection().landmark_index(&TOP_VERTICAL).unwrap(), 24);
        for member in m.members() {
            assert_eq!(member.segments()[1].start(), 24);
        }
        assert!(m.update_median_segment_index(true, id(102), 40).is_err());
    }

    #[test]
    fn locks_follow_the_exception() {
        let (mut collection, mut members) = setup();
        let mut m = manager(&mut collection, &mut members);
        m.set_lock_on_all_segments_except(id(102), true).unwrap();
        let locks: Vec<bool> = m.collection().segments().iter().map(Segment::is_locked).collect();
        assert_eq!(locks, vec![true, false, true]);
        assert!(m.members()[1].segments()[0].is_locked());
        m.set_lock_on_all_segments(false).unwrap();
        assert!(!m.members()[1].segments()[0].is_locked());
    }

    #[test]
    fn member_segment_start_carries_landmarks() {
        let (mut collection, mut members) = setup();
        let mut m = manager(&mut collection, &mut members);
        // member 2 has its reference point at border index 4
        m.update_member_segment_start(id(2), id(102), 22).unwrap();
        let member = &m.members()[1];
        assert_eq!(member.segments()[1].start(), 22);
        assert!(matches!(
            m.update_member_segment_start(id(9), id(102), 22),
            Err(CollectionError::MissingMember { .. })
        ));
    }

    #[test]
    fn extended_landmark_is_realigned_by_best_fit() {
        let (mut collection, mut members) = setup();
        let mut m = manager(&mut collection, &mut members);
        m.update_border_tag(&TOP_VERTICAL, 12).unwrap();
        for (member, shift) in m.members().iter().zip([0, 4, 9]) {
            assert_eq!(member.landmark_index(&TOP_VERTICAL).unwrap(), 12 + shift);
        }
        // a second landmark on the same index is copied rather than searched
        m.update_border_tag(&ORIENTATION_POINT, 12).unwrap();
        for member in m.members() {
            assert_eq!(
                member.landmark_index(&ORIENTATION_POINT).unwrap(),
                member.landmark_index(&TOP_VERTICAL).unwrap()
            );
        }
    }

    #[test]
    fn windowed_best_fit_stays_near_the_current_index() {
        let (mut collection, mut members) = setup();
        let mut m = manager(&mut collection, &mut members);
        m.update_border_tag(&TOP_VERTICAL, 12).unwrap();
        m.config = ManagerConfig::new().with_parallel(false).with_best_fit_window(3);
        m.update_border_tag(&TOP_VERTICAL, 14).unwrap();
        for (member, shift) in m.members().iter().zip([0, 4, 9]) {
            assert_eq!(member.landmark_index(&TOP_VERTICAL).unwrap(), 14 + shift);
        }
    }

    #[test]
    fn moving_the_reference_point_rotates_segments() {
        let (mut collection, mut members) = setup();
        let mut m = manager(&mut collection, &mut members);
        m.update_border_tag(&REFERENCE_POINT, 5).unwrap();
        let segments = m.collection().segments();
        assert_eq!(ids(segments), vec![id(101), id(102), id(103)]);
        assert_eq!((segments[0].start(), segments[0].end()), (0, 15));
        assert_eq!(segments[2].end(), 0);
        for (member, shift) in m.members().iter().zip([0, 4, 9]) {
            assert_eq!(member.landmark_index(&REFERENCE_POINT).unwrap(), shift + 5);
            assert_eq!(member.segments()[0].start(), 0);
        }
        let median = m.median_profile(&REFERENCE_POINT).unwrap();
        for (a, b) in median.as_slice().iter().zip(base().offset(5).as_slice()) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn copies_proportionally_to_another_collection() {
        let (mut collection, mut members) = setup();
        collection.set_landmark(TOP_VERTICAL, 25).unwrap();
        let source = manager(&mut collection, &mut members);

        let mut others = vec![member(4, 0), member(5, 2)];
        let mut target = ProfileCollection::new();
        target.create_aggregate(&others, 100).unwrap();
        let mut dest = ProfileManager::new(&mut target, &mut others)
            .with_config(ManagerConfig::new().with_parallel(false));
        source.copy_segments_and_landmarks_to(&mut dest).unwrap();

        assert_eq!(dest.collection().segment_ids(), vec![id(101), id(102), id(103)]);
        assert_eq!(dest.collection().segments()[1].start(), 40);
        let proportion = 25.0 / 49.0;
        assert_eq!(
            dest.collection().landmark_index(&TOP_VERTICAL).unwrap(),
            (100.0 * proportion) as usize
        );
        assert_eq!(ids(&dest.members()[0].segments()), vec![id(101), id(102), id(103)]);
    }
}
