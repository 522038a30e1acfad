//! Root datasets and their derived child datasets.

use morphoseg_collection::{
    BorderObject, CollectionError, ManagerConfig, ProfileCollection, ProfileManager, Profileable,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::DatasetError;

/// A filtered view of a root dataset. It shares the root's members, listed by
/// id, and keeps its own collection whose segmentation tracks the root's
/// proportionally.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildDataset {
    name: String,
    member_ids: Vec<Uuid>,
    collection: ProfileCollection,
}

impl ChildDataset {
    /// Reassemble a child from persisted parts.
    #[must_use]
    pub fn from_parts(name: impl Into<String>, member_ids: Vec<Uuid>, collection: ProfileCollection) -> Self {
        Self {
            name: name.into(),
            member_ids,
            collection,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn member_ids(&self) -> &[Uuid] {
        &self.member_ids
    }

    #[must_use]
    pub fn collection(&self) -> &ProfileCollection {
        &self.collection
    }

    /// A manager editing this child's collection alone.
    pub fn manager<M: Profileable + Send + Sync>(&mut self, config: ManagerConfig) -> ProfileManager<'_, M> {
        ProfileManager::new(&mut self.collection, Default::default()).with_config(config)
    }
}

/// A root dataset: the members, their collection, an optional consensus member
/// and any derived child datasets.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset<M = BorderObject> {
    name: String,
    members: Vec<M>,
    collection: ProfileCollection,
    consensus: Option<M>,
    children: Vec<ChildDataset>,
}

impl<M: Profileable + Send + Sync> Dataset<M> {
    /// Profile `members` into a new root dataset. The aggregate length is the
    /// median border length of the members.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`DatasetError::EmptyDataset`] | `members` is empty |
    /// | [`DatasetError::Collection`] | the aggregate cannot be built |
    #[instrument(skip_all, fields(members = members.len()))]
    pub fn new(name: impl Into<String>, members: Vec<M>) -> Result<Self, DatasetError> {
        let name = name.into();
        let length = median_length(&members).ok_or_else(|| DatasetError::EmptyDataset { name: name.clone() })?;
        let mut collection = ProfileCollection::new();
        collection.create_aggregate(&members, length)?;
        info!(%name, length, "dataset profiled");
        Ok(Self {
            name,
            members,
            collection,
            consensus: None,
            children: Vec::new(),
        })
    }

    /// Reassemble a dataset from persisted parts.
    #[must_use]
    pub fn from_parts(
        name: impl Into<String>,
        members: Vec<M>,
        collection: ProfileCollection,
        consensus: Option<M>,
        children: Vec<ChildDataset>,
    ) -> Self {
        Self {
            name: name.into(),
            members,
            collection,
            consensus,
            children,
        }
    }

    /// Attach a consensus member, segmented like the collection.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Collection`] if the collection segments cannot be
    /// laid onto the consensus.
    pub fn with_consensus(mut self, mut consensus: M) -> Result<Self, DatasetError> {
        if self.collection.has_segments() {
            let scaled = morphoseg_profile::scale_segments(self.collection.segments(), consensus.border_len())
                .map_err(CollectionError::from)?;
            consensus.set_segments(scaled)?;
        }
        self.consensus = Some(consensus);
        Ok(self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn members(&self) -> &[M] {
        &self.members
    }

    /// # Errors
    ///
    /// Returns [`CollectionError::MissingMember`] if no member has `id`.
    pub fn member(&self, id: Uuid) -> Result<&M, DatasetError> {
        self.members
            .iter()
            .find(|m| m.id() == id)
            .ok_or_else(|| CollectionError::MissingMember { id }.into())
    }

    #[must_use]
    pub fn collection(&self) -> &ProfileCollection {
        &self.collection
    }

    #[must_use]
    pub fn consensus(&self) -> Option<&M> {
        self.consensus.as_ref()
    }

    #[must_use]
    pub fn children(&self) -> &[ChildDataset] {
        &self.children
    }

    /// # Errors
    ///
    /// Returns [`DatasetError::MissingChild`] if no child has `name`.
    pub fn child(&self, name: &str) -> Result<&ChildDataset, DatasetError> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| DatasetError::MissingChild { name: name.to_owned() })
    }

    /// Members of a child dataset, in the child's order.
    pub fn child_members<'s>(&'s self, child: &'s ChildDataset) -> impl Iterator<Item = &'s M> + 's {
        child
            .member_ids
            .iter()
            .filter_map(move |id| self.members.iter().find(|m| m.id() == *id))
    }

    /// Succeeds for the root's own name, and refuses child datasets.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`DatasetError::NotRoot`] | `name` is a child dataset |
    /// | [`DatasetError::MissingChild`] | `name` is unknown |
    pub fn check_root(&self, name: &str) -> Result<(), DatasetError> {
        if name == self.name {
            return Ok(());
        }
        if self.children.iter().any(|c| c.name == name) {
            return Err(DatasetError::NotRoot { name: name.to_owned() });
        }
        Err(DatasetError::MissingChild { name: name.to_owned() })
    }

    /// A manager over the root collection, its members and the consensus.
    pub fn manager(&mut self, config: ManagerConfig) -> ProfileManager<'_, M> {
        let manager = ProfileManager::new(&mut self.collection, &mut self.members).with_config(config);
        match self.consensus.as_mut() {
            Some(consensus) => manager.with_consensus(consensus),
            None => manager,
        }
    }

    pub(crate) fn children_mut(&mut self) -> &mut [ChildDataset] {
        &mut self.children
    }

    /// Derive a child dataset from the members with the given ids. Its aggregate
    /// takes the median border length of those members, and the root's
    /// landmarks and segments are copied onto it proportionally.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`DatasetError::DuplicateChild`] | `name` is already taken |
    /// | [`DatasetError::EmptyDataset`] | `member_ids` is empty |
    /// | [`DatasetError::Collection`] | an id is unknown, or the copy fails |
    #[instrument(skip(self, member_ids), fields(members = member_ids.len()))]
    pub fn add_child(&mut self, name: &str, member_ids: Vec<Uuid>) -> Result<&ChildDataset, DatasetError> {
        if name == self.name || self.children.iter().any(|c| c.name == name) {
            return Err(DatasetError::DuplicateChild { name: name.to_owned() });
        }
        let subset = member_ids
            .iter()
            .map(|&id| self.member(id))
            .collect::<Result<Vec<&M>, _>>()?;
        let length = median_length(subset.iter().copied())
            .ok_or_else(|| DatasetError::EmptyDataset { name: name.to_owned() })?;

        let mut collection = ProfileCollection::new();
        collection.create_aggregate(subset, length)?;
        {
            let source = ProfileManager::new(&mut self.collection, &mut self.members);
            let mut dest = ProfileManager::<M>::new(&mut collection, Default::default());
            source.copy_segments_and_landmarks_to(&mut dest)?;
        }
        debug!(name, length, "child dataset derived");
        self.children.push(ChildDataset {
            name: name.to_owned(),
            member_ids,
            collection,
        });
        self.child(name)
    }

    /// Rebuild every child aggregate from the current root members, keeping
    /// each child's length, landmarks and segments.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Collection`] if an aggregate cannot be rebuilt.
    pub fn rebuild_children(&mut self) -> Result<(), DatasetError> {
        let Self { members, children, .. } = self;
        for child in children.iter_mut() {
            let subset = child
                .member_ids
                .iter()
                .filter_map(|id| members.iter().find(|m| m.id() == *id));
            let length = child.collection.length();
            child.collection.create_aggregate(subset, length)?;
        }
        Ok(())
    }
}

/// Median border length, the lower middle for an even count.
fn median_length<'m, M: Profileable + 'm>(members: impl IntoIterator<Item = &'m M>) -> Option<usize> {
    let mut lengths: Vec<usize> = members.into_iter().map(Profileable::border_len).collect();
    if lengths.is_empty() {
        return None;
    }
    lengths.sort_unstable();
    Some(lengths[(lengths.len() - 1) / 2])
}
