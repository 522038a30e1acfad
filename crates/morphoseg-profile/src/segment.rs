//! Segments: identity-bearing, possibly wrapping intervals over a circular profile.
//!
//! Segments carry no live links. A list of segments is "linked" when every
//! segment starts where its predecessor ends and positions match list indices;
//! the previous and next segment of position `p` are then `p - 1` and `p + 1`
//! modulo the list length.

use tracing::debug;
use uuid::Uuid;

use crate::error::{SegmentError, UpdateRejected};
use crate::{DEFAULT_SEGMENT_ID, MIN_SEGMENT_LENGTH, wrap_index};

/// Maximum number of merge sources one segment records.
const MAX_MERGE_SOURCES: usize = 2;

/// A contiguous interval `start..=end` over a profile of known length.
///
/// The interval wraps through index 0 when `end <= start`; `start == end` is the
/// single segment covering the whole profile. Adjacent segments share exactly one
/// boundary index.
#[derive(Debug, Clone)]
pub struct Segment {
    id: Uuid,
    start: usize,
    end: usize,
    profile_len: usize,
    locked: bool,
    position: usize,
    sources: Vec<Segment>,
}

impl Segment {
    /// Create a segment over a profile of `profile_len` points.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`SegmentError::InvalidBounds`] | `start` or `end` is `>= profile_len` |
    /// | [`SegmentError::PartialDefault`] | `id` is [`DEFAULT_SEGMENT_ID`] and `start != end` |
    /// | [`SegmentError::TooShort`] | the segment is shorter than [`MIN_SEGMENT_LENGTH`] |
    pub fn new(start: usize, end: usize, profile_len: usize, id: Uuid) -> Result<Self, SegmentError> {
        if start >= profile_len || end >= profile_len {
            return Err(SegmentError::InvalidBounds {
                start,
                end,
                len: profile_len,
            });
        }
        if id == DEFAULT_SEGMENT_ID && start != end {
            return Err(SegmentError::PartialDefault { start, end });
        }
        let length = length_between(start, end, profile_len);
        if length < MIN_SEGMENT_LENGTH {
            return Err(SegmentError::TooShort {
                length,
                min: MIN_SEGMENT_LENGTH,
            });
        }
        Ok(Self {
            id,
            start,
            end,
            profile_len,
            locked: false,
            position: 0,
            sources: Vec::new(),
        })
    }

    /// The default segment spanning a whole profile from index 0.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidBounds`] if `profile_len` is zero.
    pub fn full(profile_len: usize) -> Result<Self, SegmentError> {
        Self::new(0, 0, profile_len, DEFAULT_SEGMENT_ID)
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn start(&self) -> usize {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> usize {
        self.end
    }

    /// Length of the profile this segment lies on.
    #[must_use]
    pub fn profile_len(&self) -> usize {
        self.profile_len
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// Position within the linked list this segment was last linked into.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Display name derived from the position, e.g. `Seg_2`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("Seg_{}", self.position)
    }

    /// Number of indices covered, counting both endpoints.
    #[must_use]
    pub fn length(&self) -> usize {
        length_between(self.start, self.end, self.profile_len)
    }

    /// True if the segment passes through index 0, including the whole-profile case.
    #[must_use]
    pub fn wraps(&self) -> bool {
        self.end <= self.start
    }

    /// True if `index` lies within `start..=end`, accounting for wrapping.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        contains_index(self.start, self.end, index, self.profile_len)
    }

    /// Iterate the covered indices from start to end.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.length()).map(move |i| (self.start + i) % self.profile_len)
    }

    /// Map a fraction of the segment to a profile index:
    /// `round(start + length * fraction)`, wrapped.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::Profile`] unless `0 <= fraction <= 1`.
    pub fn proportional_index(&self, fraction: f64) -> Result<usize, SegmentError> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(crate::ProfileError::FractionOutOfRange { fraction }.into());
        }
        let target = self.start as f64 + self.length() as f64 * fraction;
        Ok(wrap_index(target.round() as isize, self.profile_len))
    }

    /// Fraction of the segment preceding `index`, counted from the start.
    ///
    /// Returns `None` if the index is outside the segment.
    #[must_use]
    pub fn index_proportion(&self, index: usize) -> Option<f64> {
        if !self.contains(index) {
            return None;
        }
        let from_start = wrap_index(index as isize - self.start as isize, self.profile_len);
        Some(from_start as f64 / self.length() as f64)
    }

    /// Index halfway along the segment.
    #[must_use]
    pub fn midpoint(&self) -> usize {
        if self.wraps() {
            let half = self.length() >> 1;
            if self.start + half < self.profile_len {
                return self.start + half;
            }
            return wrap_index(self.end as isize - half as isize, self.profile_len);
        }
        (self.end - self.start) / 2 + self.start
    }

    /// True if either segment contains an endpoint of the other.
    #[must_use]
    pub fn overlaps(&self, other: &Segment) -> bool {
        other.profile_len == self.profile_len
            && (other.contains(self.start)
                || other.contains(self.end)
                || self.contains(other.start)
                || self.contains(other.end))
    }

    /// True if `other` covers any index of this segment besides its endpoints.
    #[must_use]
    pub fn overlaps_beyond_endpoints(&self, other: &Segment) -> bool {
        other.profile_len == self.profile_len
            && self
                .indices()
                .filter(|&i| i != self.start && i != self.end)
                .any(|i| other.contains(i))
    }

    /// A copy shifted by `k` indices, merge sources included. The lock is kept.
    #[must_use]
    pub fn offset(&self, k: isize) -> Self {
        Self {
            id: self.id,
            start: wrap_index(self.start as isize + k, self.profile_len),
            end: wrap_index(self.end as isize + k, self.profile_len),
            profile_len: self.profile_len,
            locked: self.locked,
            position: self.position,
            sources: self.sources.iter().map(|s| s.offset(k)).collect(),
        }
    }

    /// The segment as it would lie on the reversed profile.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let last = self.profile_len - 1;
        Self {
            id: self.id,
            start: last - self.end,
            end: last - self.start,
            profile_len: self.profile_len,
            locked: self.locked,
            position: self.position,
            sources: self.sources.iter().rev().map(Segment::reversed).collect(),
        }
    }

    /// The segments this one was merged from, in profile order.
    #[must_use]
    pub fn merge_sources(&self) -> &[Segment] {
        &self.sources
    }

    #[must_use]
    pub fn has_merge_sources(&self) -> bool {
        !self.sources.is_empty()
    }

    /// True if a direct merge source carries `id`.
    #[must_use]
    pub fn has_merge_source(&self, id: Uuid) -> bool {
        self.sources.iter().any(|s| s.id == id)
    }

    pub fn clear_merge_sources(&mut self) {
        self.sources.clear();
    }

    /// Record `source` as provenance of this segment. The default segment is
    /// silently ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidMergeSource`] if the source shares this
    /// segment's id, duplicates an existing source, lies on a different length
    /// profile, has an endpoint outside this segment, is longer than this segment,
    /// or two sources are already recorded.
    pub fn add_merge_source(&mut self, source: Segment) -> Result<(), SegmentError> {
        if source.id == DEFAULT_SEGMENT_ID {
            return Ok(());
        }
        let reason = if source.id == self.id {
            Some("source has the same id as the parent")
        } else if self.has_merge_source(source.id) {
            Some("source is already recorded")
        } else if source.profile_len != self.profile_len {
            Some("source lies on a different length profile")
        } else if !self.contains(source.start) || !self.contains(source.end) {
            Some("source endpoints lie outside the parent")
        } else if source.length() > self.length() {
            Some("source is longer than the parent")
        } else if self.sources.len() >= MAX_MERGE_SOURCES {
            Some("parent already has two sources")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(SegmentError::InvalidMergeSource {
                id: self.id,
                reason,
            });
        }
        self.sources.push(source);
        Ok(())
    }

    /// Move both boundaries without validation, dragging the outer edges of the
    /// merge-source tree along. Sources that would become invalid are dropped.
    pub(crate) fn set_bounds(&mut self, start: usize, end: usize) {
        self.start = start;
        self.end = end;
        if self.sources.is_empty() {
            return;
        }
        let last = self.sources.len() - 1;
        let first_end = self.sources[0].end;
        let last_start = self.sources[last].start;
        let valid = length_between(start, first_end, self.profile_len) >= MIN_SEGMENT_LENGTH
            && length_between(last_start, end, self.profile_len) >= MIN_SEGMENT_LENGTH
            && self.contains(first_end)
            && self.contains(last_start);
        if !valid {
            debug!(id = %self.id, start, end, "dropping merge sources that no longer fit");
            self.sources.clear();
            return;
        }
        self.sources[0].set_bounds(start, first_end);
        self.sources[last].set_bounds(last_start, end);
    }

    pub(crate) fn set_position(&mut self, position: usize) {
        self.position = position;
    }
}

impl PartialEq for Segment {
    /// Equality ignores list position.
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.start == other.start
            && self.end == other.end
            && self.profile_len == other.profile_len
            && self.locked == other.locked
            && self.sources == other.sources
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} - {} of {} ({})",
            self.name(),
            self.start,
            self.end,
            self.profile_len,
            self.id
        )
    }
}

/// Number of indices in `start..=end` on a circular profile of `len` points.
/// `start == end` covers the whole profile plus the repeated endpoint.
#[must_use]
pub fn length_between(start: usize, end: usize, len: usize) -> usize {
    if end <= start {
        end + len + 1 - start
    } else {
        end - start + 1
    }
}

/// True if `index` lies within the possibly wrapping range `start..=end`.
#[must_use]
pub fn contains_index(start: usize, end: usize, index: usize, len: usize) -> bool {
    if index >= len {
        return false;
    }
    if end <= start {
        index <= end || index >= start
    } else {
        index >= start && index <= end
    }
}

/// Link an ordered list of segments in place.
///
/// Positions are set to list indices, and the first segment's start is moved to
/// the last segment's end if they differ (its merge sources are left alone).
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`SegmentError::EmptyList`] | `segments` is empty |
/// | [`SegmentError::ProfileLengthMismatch`] | segments lie on different length profiles |
/// | [`SegmentError::Discontinuous`] | a segment does not start where its predecessor ends |
pub fn link_segments(segments: &mut [Segment]) -> Result<(), SegmentError> {
    let Some(first) = segments.first() else {
        return Err(SegmentError::EmptyList);
    };
    let len = first.profile_len;
    if let Some(bad) = segments.iter().find(|s| s.profile_len != len) {
        return Err(SegmentError::ProfileLengthMismatch {
            expected: len,
            got: bad.profile_len,
        });
    }
    for i in 1..segments.len() {
        if segments[i].start != segments[i - 1].end {
            return Err(SegmentError::Discontinuous {
                position: i,
                start: segments[i].start,
                end: segments[i - 1].end,
            });
        }
    }
    let last_end = segments[segments.len() - 1].end;
    if segments[0].start != last_end {
        debug!(from = segments[0].start, to = last_end, "repairing first segment start");
        segments[0].start = last_end;
    }
    for (position, segment) in segments.iter_mut().enumerate() {
        segment.position = position;
    }
    Ok(())
}

/// Move the boundaries of the segment at `position` in a linked list, dragging
/// the shared boundaries of its neighbours along.
///
/// Nothing is modified when the move is rejected.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`UpdateRejected::OutOfRange`] | a new boundary is outside the profile |
/// | [`UpdateRejected::Locked`] | the segment, or a neighbour that must move, is locked |
/// | [`UpdateRejected::LoneSegment`] | a single segment would stop spanning the profile |
/// | [`UpdateRejected::TooShort`] | the segment would fall below the minimum length |
/// | [`UpdateRejected::NeighbourTooShort`] | a neighbour would fall below the minimum length |
/// | [`UpdateRejected::Intrudes`] | a boundary would move beyond a neighbour |
/// | [`UpdateRejected::WouldWrap`] | a neighbour would start wrapping through index 0 |
pub fn update_linked(
    segments: &mut [Segment],
    position: usize,
    start: usize,
    end: usize,
) -> Result<(), UpdateRejected> {
    let count = segments.len();
    let seg = &segments[position];
    let len = seg.profile_len;
    for index in [start, end] {
        if index >= len {
            return Err(UpdateRejected::OutOfRange { index, len });
        }
    }
    if seg.locked {
        return Err(UpdateRejected::Locked { id: seg.id });
    }
    if start == seg.start && end == seg.end {
        return Ok(());
    }
    if count == 1 {
        if start != end {
            return Err(UpdateRejected::LoneSegment);
        }
        segments[position].set_bounds(start, end);
        return Ok(());
    }

    let length = length_between(start, end, len);
    if length < MIN_SEGMENT_LENGTH {
        return Err(UpdateRejected::TooShort {
            length,
            min: MIN_SEGMENT_LENGTH,
        });
    }

    let prev = (position + count - 1) % count;
    let next = (position + 1) % count;
    let start_moves = start != seg.start;
    let end_moves = end != seg.end;
    let (prev_seg, next_seg) = (&segments[prev], &segments[next]);

    if start_moves && prev_seg.locked {
        return Err(UpdateRejected::Locked { id: prev_seg.id });
    }
    if end_moves && next_seg.locked {
        return Err(UpdateRejected::Locked { id: next_seg.id });
    }

    // with two segments the neighbour is both predecessor and successor
    let new_prev = if count == 2 {
        (end, start)
    } else {
        (prev_seg.start, start)
    };
    let new_next = if count == 2 {
        (end, start)
    } else {
        (end, next_seg.end)
    };

    for (neighbour, (s, e)) in [(prev_seg, new_prev), (next_seg, new_next)] {
        let neighbour_len = length_between(s, e, len);
        if neighbour_len < MIN_SEGMENT_LENGTH {
            return Err(UpdateRejected::NeighbourTooShort {
                id: neighbour.id,
                length: neighbour_len,
            });
        }
        if !neighbour.wraps() && e <= s {
            return Err(UpdateRejected::WouldWrap { id: neighbour.id });
        }
    }

    // boundaries must stay in circular order between the outer neighbour edges
    let in_order = if count == 2 {
        start != end
    } else {
        let origin = prev_seg.start;
        let rel = |i: usize| wrap_index(i as isize - origin as isize, len);
        let limit = if next_seg.end == origin { len } else { rel(next_seg.end) };
        0 < rel(start) && rel(start) < rel(end) && rel(end) < limit
    };
    if !in_order {
        return Err(UpdateRejected::WouldInvert { start, end });
    }

    if start_moves && !seg.contains(start) && !prev_seg.contains(start) {
        return Err(UpdateRejected::Intrudes {
            index: start,
            id: owner_of(segments, start).unwrap_or(prev_seg.id),
        });
    }
    if end_moves && !seg.contains(end) && !next_seg.contains(end) {
        return Err(UpdateRejected::Intrudes {
            index: end,
            id: owner_of(segments, end).unwrap_or(next_seg.id),
        });
    }

    segments[position].set_bounds(start, end);
    if count == 2 {
        segments[prev].set_bounds(end, start);
    } else {
        if start_moves {
            let prev_start = segments[prev].start;
            segments[prev].set_bounds(prev_start, start);
        }
        if end_moves {
            let next_end = segments[next].end;
            segments[next].set_bounds(end, next_end);
        }
    }
    Ok(())
}

fn owner_of(segments: &[Segment], index: usize) -> Option<Uuid> {
    segments.iter().find(|s| s.contains(index)).map(|s| s.id)
}

/// Lay a linked list of segments out proportionally on a profile of `new_len`
/// points, preserving ids, locks and (where still representable) merge sources.
///
/// Boundaries move to `round(start / old_len * new_len)`. Segments that end up
/// shorter than [`MIN_SEGMENT_LENGTH`] are repaired by nudging boundaries one
/// index at a time, forwards first and then back from the wrapping final
/// segment. The first segment's start is never moved by the repair.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`SegmentError::EmptyList`] | `segments` is empty |
/// | [`SegmentError::CannotFit`] | `new_len` cannot hold every segment at minimum length |
pub fn scale_segments(segments: &[Segment], new_len: usize) -> Result<Vec<Segment>, SegmentError> {
    let Some(first) = segments.first() else {
        return Err(SegmentError::EmptyList);
    };
    let count = segments.len();
    let old_len = first.profile_len;
    let scale = new_len as f64 / old_len as f64;
    let gap = MIN_SEGMENT_LENGTH - 1;
    if new_len < count * gap || new_len < MIN_SEGMENT_LENGTH {
        return Err(SegmentError::CannotFit {
            count,
            len: new_len,
        });
    }

    if count == 1 {
        let start = wrap_index((first.start as f64 * scale).round() as isize, new_len);
        let mut scaled = Segment::new(start, start, new_len, first.id)?;
        scaled.locked = first.locked;
        scaled.sources = rescale_sources(first, start, start, new_len);
        let mut result = vec![scaled];
        link_segments(&mut result)?;
        return Ok(result);
    }

    // unwrapped boundary positions, strictly increasing, with bounds[count]
    // closing the circle at bounds[0] + new_len
    let mut old_bound = first.start;
    let mut bounds = Vec::with_capacity(count + 1);
    for segment in segments {
        bounds.push((old_bound as f64 * scale).round() as usize);
        old_bound += segment.length() - 1;
    }
    bounds.push(bounds[0] + new_len);

    for i in 1..count {
        if bounds[i] < bounds[i - 1] + gap {
            bounds[i] = bounds[i - 1] + gap;
        }
    }
    for i in (1..count).rev() {
        if bounds[i] + gap > bounds[i + 1] {
            bounds[i] = bounds[i + 1] - gap;
        }
    }

    let mut result = Vec::with_capacity(count);
    for (i, segment) in segments.iter().enumerate() {
        let start = bounds[i] % new_len;
        let end = bounds[i + 1] % new_len;
        let mut scaled = Segment::new(start, end, new_len, segment.id)?;
        scaled.locked = segment.locked;
        scaled.sources = rescale_sources(segment, start, end, new_len);
        result.push(scaled);
    }
    link_segments(&mut result)?;
    Ok(result)
}

/// Rebuild the merge-source tree of `old` inside its new bounds, keeping each
/// inner boundary at the same fraction of the parent. Returns an empty list when
/// the tree no longer fits.
fn rescale_sources(old: &Segment, start: usize, end: usize, new_len: usize) -> Vec<Segment> {
    let [a, b] = old.sources.as_slice() else {
        return Vec::new();
    };
    let old_span = (old.length() - 1) as f64;
    let new_span = (length_between(start, end, new_len) - 1) as f64;
    let inner_old = wrap_index(a.end as isize - old.start as isize, old.profile_len) as f64;
    let inner = wrap_index(
        start as isize + (inner_old / old_span * new_span).round() as isize,
        new_len,
    );
    let (Ok(mut new_a), Ok(mut new_b)) = (
        Segment::new(start, inner, new_len, a.id),
        Segment::new(inner, end, new_len, b.id),
    ) else {
        return Vec::new();
    };
    new_a.locked = a.locked;
    new_b.locked = b.locked;
    new_a.sources = rescale_sources(a, start, inner, new_len);
    new_b.sources = rescale_sources(b, inner, end, new_len);
    vec![new_a, new_b]
}
