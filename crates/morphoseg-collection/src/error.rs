use morphoseg_profile::{ProfileError, SegmentError};
use uuid::Uuid;

use crate::kind::ProfileType;

/// Errors from aggregate profiles, landmark tables and collection-wide edits.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollectionError {
    /// Returned when a landmark is absent from a collection or member.
    #[error("landmark '{name}' is not present")]
    MissingLandmark {
        /// Name of the requested landmark.
        name: String,
    },

    /// Returned when no aggregate has been built for a profile type.
    #[error("no {kind} aggregate has been built")]
    MissingAggregate {
        /// The requested profile type.
        kind: ProfileType,
    },

    /// Returned when a member carries no profile of the requested type.
    #[error("member {id} has no {kind} profile")]
    MissingProfile {
        /// Member id.
        id: Uuid,
        /// The requested profile type.
        kind: ProfileType,
    },

    /// Returned when a member id is not part of the collection.
    #[error("member {id} not found")]
    MissingMember {
        /// The requested id.
        id: Uuid,
    },

    /// Returned when a segmented profile is requested before segments exist.
    #[error("no segments assigned to the profile collection")]
    Unsegmented,

    /// Returned when an aggregate is requested over zero members.
    #[error("cannot aggregate an empty collection")]
    EmptyCollection,

    /// Returned when an aggregate length of zero is requested.
    #[error("aggregate length must be positive, got {length}")]
    InvalidLength {
        /// The rejected length.
        length: usize,
    },

    /// Returned when an index lies outside the aggregate or border.
    #[error("index {index} is outside a profile of length {len}")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Profile length.
        len: usize,
    },

    /// Returned when a proportion lies outside `[0, 1]`.
    #[error("proportion {proportion} must lie within 0-1")]
    ProportionOutOfRange {
        /// The requested proportion.
        proportion: f64,
    },

    /// Returned when a percentile lies outside `[0, 100]`.
    #[error("quartile {quartile} must lie within 0-100")]
    QuartileOutOfRange {
        /// The requested percentile.
        quartile: f64,
    },

    /// Returned when a profile type name cannot be parsed.
    #[error("unknown profile type '{name}'")]
    UnknownProfileType {
        /// The unparsed name.
        name: String,
    },

    /// Returned when profiles or outline points disagree in length.
    #[error("member {id} expects {expected} border points, got {got}")]
    BorderLengthMismatch {
        /// Member id.
        id: Uuid,
        /// Border length of the member.
        expected: usize,
        /// Length supplied.
        got: usize,
    },

    /// Returned when a copied segmentation does not match its source.
    #[error("segments are not consistent with the source: {reason}")]
    SegmentMismatch {
        /// What differed.
        reason: String,
    },

    /// Returned when two segments meet on a core landmark and may not be merged.
    #[error("segments {first} and {second} meet at core landmark '{name}'")]
    MergeAcrossCore {
        /// Leading segment.
        first: Uuid,
        /// Following segment.
        second: Uuid,
        /// The landmark at the shared boundary.
        name: String,
    },

    /// Returned when an edit cannot be replayed onto one member.
    #[error("member {id}: {source}")]
    Member {
        /// Member id.
        id: Uuid,
        /// The underlying failure.
        source: Box<CollectionError>,
    },

    /// Wraps a segment error from a structural edit.
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),

    /// Wraps a profile error from resampling or arithmetic.
    #[error("profile error: {0}")]
    Profile(#[from] ProfileError),
}

impl CollectionError {
    pub(crate) fn for_member(id: Uuid, err: impl Into<CollectionError>) -> Self {
        Self::Member {
            id,
            source: Box::new(err.into()),
        }
    }
}
