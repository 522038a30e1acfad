//! Serialisable records of a dataset hierarchy.
//!
//! Aggregates are not stored; they are rebuilt from the members on load, so a
//! snapshot holds only members, landmark tables and segmentations. Segments are
//! written as `{id, start, end, locked, mergeSources}` and landmarks as
//! `{name, type, index}`.

use std::collections::BTreeMap;

use morphoseg_collection::{
    BorderObject, CollectionError, Landmark, LandmarkKind, Point, ProfileCollection, ProfileType, Profileable,
    REFERENCE_POINT,
};
use morphoseg_dataset::{ChildDataset, Dataset};
use morphoseg_profile::{Profile, Segment, SegmentError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::IoError;

/// A segment and, recursively, the segments it was merged from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentRecord {
    pub id: Uuid,
    pub start: usize,
    pub end: usize,
    pub locked: bool,
    #[serde(default)]
    pub merge_sources: Vec<SegmentRecord>,
}

impl SegmentRecord {
    #[must_use]
    pub fn from_segment(segment: &Segment) -> Self {
        Self {
            id: segment.id(),
            start: segment.start(),
            end: segment.end(),
            locked: segment.is_locked(),
            merge_sources: segment.merge_sources().iter().map(Self::from_segment).collect(),
        }
    }

    /// Rebuild the segment on a profile of `profile_len` points.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError`] if the bounds or merge sources do not fit.
    pub fn to_segment(&self, profile_len: usize) -> Result<Segment, SegmentError> {
        let mut segment = Segment::new(self.start, self.end, profile_len, self.id)?;
        segment.set_locked(self.locked);
        for source in &self.merge_sources {
            segment.add_merge_source(source.to_segment(profile_len)?)?;
        }
        Ok(segment)
    }
}

/// A landmark at an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: LandmarkKind,
    pub index: usize,
}

impl LandmarkRecord {
    fn from_entry((landmark, &index): (&Landmark, &usize)) -> Self {
        Self {
            name: landmark.name().to_owned(),
            kind: landmark.kind(),
            index,
        }
    }

    fn landmark(&self) -> Landmark {
        Landmark::new(self.name.clone(), self.kind)
    }
}

/// A member in its own border indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub id: Uuid,
    pub name: String,
    pub locked: bool,
    pub landmarks: Vec<LandmarkRecord>,
    pub segments: Vec<SegmentRecord>,
    pub profiles: BTreeMap<ProfileType, Profile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline: Option<Vec<Point>>,
}

impl MemberRecord {
    #[must_use]
    pub fn from_member(member: &BorderObject) -> Self {
        Self {
            id: member.id(),
            name: member.name().to_owned(),
            locked: member.is_locked(),
            landmarks: member.landmarks().iter().map(LandmarkRecord::from_entry).collect(),
            segments: member.border_segments().iter().map(SegmentRecord::from_segment).collect(),
            profiles: member.profiles().clone(),
            outline: member.outline().map(<[Point]>::to_vec),
        }
    }

    /// Rebuild the member. The reference point is placed before the segments,
    /// which are restored in border indexing.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::InvalidSnapshot`] | the member has no angle profile |
    /// | [`IoError::Collection`] | a profile, landmark or segment does not fit the border |
    pub fn into_member(self) -> Result<BorderObject, IoError> {
        let mut profiles = self.profiles;
        let angle = profiles
            .remove(&ProfileType::Angle)
            .ok_or_else(|| IoError::InvalidSnapshot {
                reason: format!("member {} has no angle profile", self.id),
            })?;
        let len = angle.len();
        let mut member = BorderObject::new(self.id, self.name, angle)?;
        for (kind, profile) in profiles {
            member = member.with_profile(kind, profile)?;
        }
        if let Some(outline) = self.outline {
            member = member.with_outline(outline)?;
        }

        let (rp, others): (Vec<_>, Vec<_>) = self
            .landmarks
            .iter()
            .partition(|l| l.landmark().is_reference_point());
        for record in rp.into_iter().chain(others) {
            member.set_landmark(record.landmark(), record.index as isize)?;
        }
        if !self.segments.is_empty() {
            let segments = segments_from(&self.segments, len)?;
            member.set_border_segments(segments)?;
        }
        member.set_locked(self.locked);
        Ok(member)
    }
}

/// A collection without its aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub length: usize,
    pub landmarks: Vec<LandmarkRecord>,
    pub segments: Vec<SegmentRecord>,
}

impl CollectionRecord {
    #[must_use]
    pub fn from_collection(collection: &ProfileCollection) -> Self {
        let mut landmarks = vec![LandmarkRecord {
            name: REFERENCE_POINT.name().to_owned(),
            kind: REFERENCE_POINT.kind(),
            index: 0,
        }];
        landmarks.extend(collection.landmarks().iter().map(LandmarkRecord::from_entry));
        Self {
            length: collection.length(),
            landmarks,
            segments: collection.segments().iter().map(SegmentRecord::from_segment).collect(),
        }
    }

    /// Rebuild the collection and its aggregates from `members`.
    fn into_collection<'m>(
        self,
        members: impl IntoIterator<Item = &'m BorderObject>,
    ) -> Result<ProfileCollection, IoError> {
        let segments = segments_from(&self.segments, self.length)?;
        let landmarks = self.landmarks.iter().map(|l| (l.landmark(), l.index));
        let mut collection = ProfileCollection::from_parts(self.length, landmarks, segments)?;
        collection.create_aggregate(members, self.length)?;
        Ok(collection)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRecord {
    pub name: String,
    pub member_ids: Vec<Uuid>,
    pub collection: CollectionRecord,
}

/// A whole dataset hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    pub name: String,
    pub members: Vec<MemberRecord>,
    pub collection: CollectionRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus: Option<MemberRecord>,
    #[serde(default)]
    pub children: Vec<ChildRecord>,
}

impl DatasetSnapshot {
    #[must_use]
    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self {
            name: dataset.name().to_owned(),
            members: dataset.members().iter().map(MemberRecord::from_member).collect(),
            collection: CollectionRecord::from_collection(dataset.collection()),
            consensus: dataset.consensus().map(MemberRecord::from_member),
            children: dataset
                .children()
                .iter()
                .map(|child| ChildRecord {
                    name: child.name().to_owned(),
                    member_ids: child.member_ids().to_vec(),
                    collection: CollectionRecord::from_collection(child.collection()),
                })
                .collect(),
        }
    }

    /// Rebuild the dataset, recomputing every aggregate from the members.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::InvalidSnapshot`] | a child lists an unknown member, or a member lacks an angle profile |
    /// | [`IoError::Collection`] | segments, landmarks or profiles do not fit |
    pub fn into_dataset(self) -> Result<Dataset, IoError> {
        let members = self
            .members
            .into_iter()
            .map(MemberRecord::into_member)
            .collect::<Result<Vec<_>, _>>()?;
        if members.is_empty() {
            return Err(IoError::InvalidSnapshot {
                reason: format!("dataset '{}' has no members", self.name),
            });
        }
        let collection = self.collection.into_collection(&members)?;

        let mut children = Vec::with_capacity(self.children.len());
        for child in self.children {
            let subset = child
                .member_ids
                .iter()
                .map(|id| {
                    members
                        .iter()
                        .find(|m| m.id() == *id)
                        .ok_or_else(|| IoError::InvalidSnapshot {
                            reason: format!("child '{}' lists unknown member {id}", child.name),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let collection = child.collection.into_collection(subset)?;
            children.push(ChildDataset::from_parts(child.name, child.member_ids, collection));
        }

        let consensus = self.consensus.map(MemberRecord::into_member).transpose()?;
        Ok(Dataset::from_parts(self.name, members, collection, consensus, children))
    }
}

fn segments_from(records: &[SegmentRecord], profile_len: usize) -> Result<Vec<Segment>, CollectionError> {
    let segments = records
        .iter()
        .map(|r| r.to_segment(profile_len))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(segments)
}
