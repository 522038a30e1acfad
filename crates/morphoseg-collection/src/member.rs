//! The member contract and the concrete profiled border object.

use std::collections::BTreeMap;

use morphoseg_profile::{Profile, Segment, SegmentedProfile, link_segments, wrap_index};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CollectionError;
use crate::kind::ProfileType;
use crate::landmark::{BOTTOM_VERTICAL, Landmark, REFERENCE_POINT, TOP_VERTICAL};

/// Anything that can take part in a profiled collection.
///
/// Landmark indices are in the member's own border indexing. Segments passed to
/// and returned from [`Profileable::set_segments`] and [`Profileable::segments`]
/// are zeroed at the member's reference point.
pub trait Profileable {
    fn id(&self) -> Uuid;

    /// Number of border points, equal to the length of every profile.
    fn border_len(&self) -> usize;

    fn is_locked(&self) -> bool;

    fn set_locked(&mut self, locked: bool);

    fn landmarks(&self) -> &BTreeMap<Landmark, usize>;

    /// Place `landmark` at `index`, wrapping it onto the border.
    ///
    /// # Errors
    ///
    /// Implementations may refuse landmarks they cannot hold.
    fn set_landmark(&mut self, landmark: Landmark, index: isize) -> Result<(), CollectionError>;

    /// The profile of `kind` indexed from the member's border start.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::MissingProfile`] if the member has no such profile.
    fn raw_profile(&self, kind: ProfileType) -> Result<&Profile, CollectionError>;

    fn segments(&self) -> Vec<Segment>;

    /// Replace the segmentation.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::BorderLengthMismatch`] | the segments lie on a different length profile |
    /// | [`CollectionError::Segment`] | the segments do not link |
    fn set_segments(&mut self, segments: Vec<Segment>) -> Result<(), CollectionError>;

    /// Border index directly below the centroid once the shape is rotated so
    /// that its top vertical lies above its bottom vertical. `None` when the
    /// member carries no geometry or lacks either vertical.
    fn orientation_point_below_centroid(&self) -> Option<usize> {
        None
    }

    fn wrap_index(&self, index: isize) -> usize {
        wrap_index(index, self.border_len())
    }

    fn has_landmark(&self, landmark: &Landmark) -> bool {
        self.landmarks().contains_key(landmark)
    }

    /// # Errors
    ///
    /// Returns [`CollectionError::MissingLandmark`] if the landmark is absent.
    fn landmark_index(&self, landmark: &Landmark) -> Result<usize, CollectionError> {
        self.landmarks()
            .get(landmark)
            .copied()
            .ok_or_else(|| CollectionError::MissingLandmark {
                name: landmark.name().to_owned(),
            })
    }

    fn has_profile(&self, kind: ProfileType) -> bool {
        self.raw_profile(kind).is_ok()
    }

    /// The profile of `kind` rotated to start at `landmark`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::MissingProfile`] | no profile of `kind` |
    /// | [`CollectionError::MissingLandmark`] | `landmark` is absent |
    fn profile(&self, kind: ProfileType, landmark: &Landmark) -> Result<Profile, CollectionError> {
        let index = self.landmark_index(landmark)?;
        Ok(self.raw_profile(kind)?.offset(index as isize))
    }

    /// The segmented profile of `kind` rotated to start at `landmark`.
    ///
    /// # Errors
    ///
    /// As [`Profileable::profile`], plus [`CollectionError::Segment`] if the stored
    /// segments do not fit the profile.
    fn segmented_profile(
        &self,
        kind: ProfileType,
        landmark: &Landmark,
    ) -> Result<SegmentedProfile, CollectionError> {
        let rp = self.landmark_index(&REFERENCE_POINT)?;
        let index = self.landmark_index(landmark)?;
        let from_rp = SegmentedProfile::with_segments(
            self.raw_profile(kind)?.offset(rp as isize),
            self.segments(),
        )?;
        Ok(from_rp.start_from(index as isize - rp as isize))
    }

    /// Lock or unlock one segment.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::Segment`] if no segment has `id`.
    fn set_segment_lock(&mut self, id: Uuid, locked: bool) -> Result<(), CollectionError> {
        let mut segments = self.segments();
        let segment = segments
            .iter_mut()
            .find(|s| s.id() == id)
            .ok_or(morphoseg_profile::SegmentError::MissingSegment { id })?;
        segment.set_locked(locked);
        self.set_segments(segments)
    }
}

/// A border coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A profiled object: per-type profiles indexed from its own border start, a
/// landmark table, a segmentation and optionally the border outline itself.
///
/// Segments are held in border indexing so that moving the reference point
/// leaves every boundary on the same border point.
#[derive(Debug, Clone, PartialEq)]
pub struct BorderObject {
    id: Uuid,
    name: String,
    profiles: BTreeMap<ProfileType, Profile>,
    landmarks: BTreeMap<Landmark, usize>,
    segments: Vec<Segment>,
    locked: bool,
    outline: Option<Vec<Point>>,
}

impl BorderObject {
    /// A member with a single angle profile, the reference point at border
    /// index 0 and one default segment.
    ///
    /// # Errors
    ///
    /// Never fails for a validated profile.
    pub fn new(id: Uuid, name: impl Into<String>, angle: Profile) -> Result<Self, CollectionError> {
        let len = angle.len();
        let mut segments = vec![Segment::full(len)?];
        link_segments(&mut segments)?;
        Ok(Self {
            id,
            name: name.into(),
            profiles: BTreeMap::from([(ProfileType::Angle, angle)]),
            landmarks: BTreeMap::from([(REFERENCE_POINT, 0)]),
            segments,
            locked: false,
            outline: None,
        })
    }

    /// A member profiled from an ordered outline. Angles are measured over
    /// `window` points either side of each point.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CollectionError::Profile`] | fewer than three points, a zero window, or degenerate geometry |
    pub fn from_outline(
        id: Uuid,
        name: impl Into<String>,
        outline: Vec<Point>,
        window: usize,
    ) -> Result<Self, CollectionError> {
        let profiles = outline_profiles(&outline, window)?;
        let mut member = Self::new(id, name, profiles[0].clone())?;
        for (kind, profile) in [ProfileType::Diameter, ProfileType::Radius]
            .into_iter()
            .zip(profiles.into_iter().skip(1))
        {
            member.profiles.insert(kind, profile);
        }
        member.outline = Some(outline);
        Ok(member)
    }

    /// Add or replace a profile of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::BorderLengthMismatch`] if the profile length
    /// differs from the border length.
    pub fn with_profile(mut self, kind: ProfileType, profile: Profile) -> Result<Self, CollectionError> {
        if profile.len() != self.border_len() {
            return Err(CollectionError::BorderLengthMismatch {
                id: self.id,
                expected: self.border_len(),
                got: profile.len(),
            });
        }
        self.profiles.insert(kind, profile);
        Ok(self)
    }

    /// Attach outline coordinates, one per border point.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::BorderLengthMismatch`] if the point count
    /// differs from the border length.
    pub fn with_outline(mut self, outline: Vec<Point>) -> Result<Self, CollectionError> {
        if outline.len() != self.border_len() {
            return Err(CollectionError::BorderLengthMismatch {
                id: self.id,
                expected: self.border_len(),
                got: outline.len(),
            });
        }
        self.outline = Some(outline);
        Ok(self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn outline(&self) -> Option<&[Point]> {
        self.outline.as_deref()
    }

    #[must_use]
    pub fn profiles(&self) -> &BTreeMap<ProfileType, Profile> {
        &self.profiles
    }

    /// Segments in the member's own border indexing.
    #[must_use]
    pub fn border_segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Replace the segmentation with segments already in border indexing.
    ///
    /// # Errors
    ///
    /// As [`Profileable::set_segments`].
    pub fn set_border_segments(&mut self, mut segments: Vec<Segment>) -> Result<(), CollectionError> {
        if let Some(bad) = segments.iter().find(|s| s.profile_len() != self.border_len()) {
            return Err(CollectionError::BorderLengthMismatch {
                id: self.id,
                expected: self.border_len(),
                got: bad.profile_len(),
            });
        }
        link_segments(&mut segments)?;
        self.segments = segments;
        Ok(())
    }

    /// Remove a landmark. The reference point cannot be removed.
    pub fn remove_landmark(&mut self, landmark: &Landmark) -> Option<usize> {
        if landmark.is_reference_point() {
            return None;
        }
        self.landmarks.remove(landmark)
    }

    fn rp(&self) -> usize {
        self.landmarks.get(&REFERENCE_POINT).copied().unwrap_or(0)
    }
}

impl Profileable for BorderObject {
    fn id(&self) -> Uuid {
        self.id
    }

    fn border_len(&self) -> usize {
        self.profiles
            .values()
            .next()
            .map_or(0, Profile::len)
    }

    fn is_locked(&self) -> bool {
        self.locked
    }

    fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    fn landmarks(&self) -> &BTreeMap<Landmark, usize> {
        &self.landmarks
    }

    fn set_landmark(&mut self, landmark: Landmark, index: isize) -> Result<(), CollectionError> {
        let index = self.wrap_index(index);
        self.landmarks.insert(landmark, index);
        Ok(())
    }

    fn raw_profile(&self, kind: ProfileType) -> Result<&Profile, CollectionError> {
        self.profiles
            .get(&kind)
            .ok_or(CollectionError::MissingProfile { id: self.id, kind })
    }

    fn segments(&self) -> Vec<Segment> {
        let rp = self.rp() as isize;
        let mut zeroed: Vec<Segment> = self.segments.iter().map(|s| s.offset(-rp)).collect();
        // offsetting keeps the list contiguous, so relinking cannot fail
        let _ = link_segments(&mut zeroed);
        zeroed
    }

    fn set_segments(&mut self, segments: Vec<Segment>) -> Result<(), CollectionError> {
        let rp = self.rp() as isize;
        self.set_border_segments(segments.iter().map(|s| s.offset(rp)).collect())
    }

    fn orientation_point_below_centroid(&self) -> Option<usize> {
        let outline = self.outline.as_ref()?;
        let top = outline[*self.landmarks.get(&TOP_VERTICAL)?];
        let bottom = outline[*self.landmarks.get(&BOTTOM_VERTICAL)?];
        let centroid = centroid(outline);

        // rotate about the centroid so that bottom -> top points along +y
        let angle = (top.y - bottom.y).atan2(top.x - bottom.x);
        let turn = std::f64::consts::FRAC_PI_2 - angle;
        let (sin, cos) = turn.sin_cos();
        let rotated = outline.iter().map(|p| {
            let (dx, dy) = (p.x - centroid.x, p.y - centroid.y);
            Point::new(dx * cos - dy * sin, dx * sin + dy * cos)
        });

        rotated
            .enumerate()
            .filter(|(_, p)| p.y < 0.0)
            .min_by(|(_, a), (_, b)| a.x.abs().total_cmp(&b.x.abs()))
            .map(|(i, _)| i)
    }
}

fn centroid(points: &[Point]) -> Point {
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point::new(sx / n, sy / n)
}

/// Angle, diameter and radius profiles of an ordered outline, in that order.
fn outline_profiles(outline: &[Point], window: usize) -> Result<[Profile; 3], CollectionError> {
    use morphoseg_profile::ProfileError;

    let n = outline.len();
    if n < morphoseg_profile::MIN_PROFILE_LENGTH {
        return Err(ProfileError::TooShort {
            len: n,
            min: morphoseg_profile::MIN_PROFILE_LENGTH,
        }
        .into());
    }
    if window == 0 {
        return Err(ProfileError::InvalidWindow { window }.into());
    }
    let at = |i: isize| outline[wrap_index(i, n)];

    // shoelace sign: positive for counter-clockwise traversal
    let area: f64 = (0..n as isize)
        .map(|i| {
            let (a, b) = (at(i), at(i + 1));
            a.x * b.y - b.x * a.y
        })
        .sum();
    let ccw = area > 0.0;

    let w = window as isize;
    let angles = (0..n as isize)
        .map(|i| {
            let (p, prev, next) = (at(i), at(i - w), at(i + w));
            let (ax, ay) = (prev.x - p.x, prev.y - p.y);
            let (bx, by) = (next.x - p.x, next.y - p.y);
            let turn = (ax * by - ay * bx).atan2(ax * bx + ay * by).to_degrees();
            let turn = turn.rem_euclid(360.0);
            if ccw { 360.0 - turn } else { turn }
        })
        .map(|a| if a >= 360.0 { a - 360.0 } else { a })
        .collect();

    let c = centroid(outline);
    let radii: Vec<f64> = outline.iter().map(|p| p.distance(c)).collect();
    let diameters = outline
        .iter()
        .map(|p| {
            let (ux, uy) = (p.x - c.x, p.y - c.y);
            let opposite = outline
                .iter()
                .min_by(|a, b| {
                    let da = ux * (a.x - c.x) + uy * (a.y - c.y);
                    let db = ux * (b.x - c.x) + uy * (b.y - c.y);
                    let na = da / a.distance(c).max(f64::MIN_POSITIVE);
                    let nb = db / b.distance(c).max(f64::MIN_POSITIVE);
                    na.total_cmp(&nb)
                })
                .copied()
                .unwrap_or(*p);
            p.distance(opposite)
        })
        .collect();

    Ok([
        Profile::new(angles)?,
        Profile::new(diameters)?,
        Profile::new(radii)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::ORIENTATION_POINT;

    fn square(side: usize) -> Vec<Point> {
        // counter-clockwise, `side` points per edge
        let s = side as f64;
        let mut points = Vec::new();
        for i in 0..side {
            points.push(Point::new(i as f64, 0.0));
        }
        for i in 0..side {
            points.push(Point::new(s, i as f64));
        }
        for i in 0..side {
            points.push(Point::new(s - i as f64, s));
        }
        for i in 0..side {
            points.push(Point::new(0.0, s - i as f64));
        }
        points
    }

    fn member(values: Vec<f64>) -> BorderObject {
        BorderObject::new(Uuid::from_u128(1), "m1", Profile::new(values).unwrap()).unwrap()
    }

    #[test]
    fn new_member_has_reference_point_and_default_segment() {
        let m = member(vec![1.0; 12]);
        assert_eq!(m.landmark_index(&REFERENCE_POINT).unwrap(), 0);
        assert_eq!(m.segments().len(), 1);
        assert!(matches!(
            m.raw_profile(ProfileType::Radius),
            Err(CollectionError::MissingProfile { .. })
        ));
    }

    #[test]
    fn profile_rotates_to_landmark() {
        let mut m = member((0..12).map(f64::from).collect());
        m.set_landmark(ORIENTATION_POINT, -2).unwrap();
        assert_eq!(m.landmark_index(&ORIENTATION_POINT).unwrap(), 10);
        let p = m.profile(ProfileType::Angle, &ORIENTATION_POINT).unwrap();
        assert!((p.as_slice()[0] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn segments_follow_the_border_when_rp_moves() {
        let mut m = member((0..12).map(f64::from).collect());
        let segments = vec![
            Segment::new(0, 4, 12, Uuid::from_u128(10)).unwrap(),
            Segment::new(4, 0, 12, Uuid::from_u128(11)).unwrap(),
        ];
        m.set_segments(segments.clone()).unwrap();
        assert_eq!(m.segments(), segments);

        m.set_landmark(REFERENCE_POINT, 2).unwrap();
        let zeroed = m.segments();
        assert_eq!((zeroed[0].start(), zeroed[0].end()), (10, 2));
        assert_eq!(m.border_segments()[0].start(), 0);

        let sp = m.segmented_profile(ProfileType::Angle, &REFERENCE_POINT).unwrap();
        assert!((sp.profile().as_slice()[0] - 2.0).abs() < 1e-12);
        assert_eq!(sp.segment(Uuid::from_u128(11)).unwrap().start(), 2);
    }

    #[test]
    fn segment_locks_round_trip() {
        let mut m = member(vec![1.0; 12]);
        let id = m.segments()[0].id();
        m.set_segment_lock(id, true).unwrap();
        assert!(m.segments()[0].is_locked());
        assert!(m.set_segment_lock(Uuid::from_u128(99), true).is_err());
    }

    #[test]
    fn outline_profiles_of_a_square() {
        let m = BorderObject::from_outline(Uuid::from_u128(1), "sq", square(5), 1).unwrap();
        assert_eq!(m.border_len(), 20);
        let angle = m.raw_profile(ProfileType::Angle).unwrap();
        // corners are 90 degrees, edge points are straight
        assert!((angle.as_slice()[0] - 90.0).abs() < 1e-9);
        assert!((angle.as_slice()[2] - 180.0).abs() < 1e-9);
        let radius = m.raw_profile(ProfileType::Radius).unwrap();
        assert!(radius.as_slice()[0] > radius.as_slice()[2]);
        assert!(m.has_profile(ProfileType::Diameter));
    }

    #[test]
    fn orientation_point_lies_below_centroid() {
        let mut m = BorderObject::from_outline(Uuid::from_u128(1), "sq", square(5), 1).unwrap();
        assert_eq!(m.orientation_point_below_centroid(), None);
        // top vertical at the middle of the top edge, bottom vertical at the bottom edge
        m.set_landmark(TOP_VERTICAL, 12).unwrap();
        m.set_landmark(BOTTOM_VERTICAL, 2).unwrap();
        let op = m.orientation_point_below_centroid().unwrap();
        assert_eq!(m.outline().unwrap()[op], Point::new(2.0, 0.0));
    }
}
