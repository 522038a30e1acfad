//! Error types for profile arithmetic and segment structure.

use uuid::Uuid;

/// Errors from profile construction, arithmetic and resampling.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProfileError {
    /// Returned when a profile would hold fewer values than the minimum.
    #[error("profile length {len} is below the minimum of {min}")]
    TooShort {
        /// Requested or supplied length.
        len: usize,
        /// Minimum permitted length.
        min: usize,
    },

    /// Returned when a profile contains NaN or an infinity.
    #[error("profile contains non-finite value at index {index}")]
    NonFiniteValue {
        /// Position of the first non-finite value found.
        index: usize,
    },

    /// Returned when an arithmetic operand is NaN or infinite.
    #[error("cannot apply non-finite operand {value}")]
    NonFiniteOperand {
        /// The rejected operand.
        value: f64,
    },

    /// Returned when two profiles or a profile and a mask differ in length.
    #[error("length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        /// Length of the receiver.
        expected: usize,
        /// Length of the argument.
        got: usize,
    },

    /// Returned when an index lies outside `0..len`.
    #[error("index {index} is outside a profile of length {len}")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Profile length.
        len: usize,
    },

    /// Returned when a fraction lies outside `[0, 1]`.
    #[error("fraction {fraction} must lie within 0-1")]
    FractionOutOfRange {
        /// The requested fraction.
        fraction: f64,
    },

    /// Returned when a smoothing, delta or extrema window is zero.
    #[error("window size must be at least 1, got {window}")]
    InvalidWindow {
        /// The rejected window size.
        window: usize,
    },

    /// Returned when a mask selects no index at all.
    #[error("mask selects no index")]
    EmptyMask,

    /// Returned when a best-fit offset range is empty or exceeds the profile.
    #[error("offset range {min}..{max} is invalid for a profile of length {len}")]
    InvalidOffsetRange {
        /// Inclusive lower bound.
        min: usize,
        /// Exclusive upper bound.
        max: usize,
        /// Profile length.
        len: usize,
    },
}

/// Reasons a segment boundary move is refused.
///
/// These are expected outcomes of an edit (locks, adjacency rules), distinct from
/// the structural corruption reported by [`SegmentError`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateRejected {
    /// The segment, or a neighbour that would have to move, is locked.
    #[error("segment {id} is locked")]
    Locked {
        /// Id of the locked segment.
        id: Uuid,
    },

    /// A requested boundary lies outside the profile.
    #[error("index {index} is outside a profile of length {len}")]
    OutOfRange {
        /// The requested index.
        index: usize,
        /// Profile length.
        len: usize,
    },

    /// The moved segment would fall below the minimum length.
    #[error("segment would shrink to {length}, below the minimum of {min}")]
    TooShort {
        /// Length after the move.
        length: usize,
        /// Minimum permitted length.
        min: usize,
    },

    /// A neighbouring segment would fall below the minimum length.
    #[error("neighbouring segment {id} would shrink to {length}")]
    NeighbourTooShort {
        /// Id of the neighbour.
        id: Uuid,
        /// Neighbour length after the move.
        length: usize,
    },

    /// Start would pass end without the segment spanning index 0.
    #[error("segment would invert ({start} - {end})")]
    WouldInvert {
        /// Proposed start.
        start: usize,
        /// Proposed end.
        end: usize,
    },

    /// A new boundary lies inside a segment other than the target or its neighbours.
    #[error("index {index} intrudes into segment {id}")]
    Intrudes {
        /// Offending boundary index.
        index: usize,
        /// Id of the segment that would be overrun.
        id: Uuid,
    },

    /// A neighbour would start wrapping around index 0.
    #[error("segment {id} would convert to wrapping")]
    WouldWrap {
        /// Id of the neighbour.
        id: Uuid,
    },

    /// A single segment must keep spanning the whole profile.
    #[error("a lone segment must span the whole profile (start == end)")]
    LoneSegment,
}

/// Errors from segment construction, linking and structural edits.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SegmentError {
    /// Returned when a boundary lies outside the profile.
    #[error("segment bounds {start} - {end} are invalid for a profile of length {len}")]
    InvalidBounds {
        /// Start index.
        start: usize,
        /// End index.
        end: usize,
        /// Profile length.
        len: usize,
    },

    /// Returned when a segment would be shorter than the minimum.
    #[error("segment length {length} is below the minimum of {min}")]
    TooShort {
        /// Computed length.
        length: usize,
        /// Minimum permitted length.
        min: usize,
    },

    /// Returned when the reserved default id is used for a partial segment.
    #[error("the default segment must span the whole profile, got {start} - {end}")]
    PartialDefault {
        /// Start index.
        start: usize,
        /// End index.
        end: usize,
    },

    /// Returned when a segment list is empty.
    #[error("segment list is empty")]
    EmptyList,

    /// Returned when segments and profile disagree on length.
    #[error("segment profile length {got} does not fit profile length {expected}")]
    ProfileLengthMismatch {
        /// Length of the profile.
        expected: usize,
        /// Length recorded in the segment.
        got: usize,
    },

    /// Returned when a segment does not start where its predecessor ends.
    #[error("segment at position {position} starts at {start}, but its predecessor ends at {end}")]
    Discontinuous {
        /// Position of the offending segment.
        position: usize,
        /// Its start index.
        start: usize,
        /// End index of the preceding segment.
        end: usize,
    },

    /// Returned when a profile is too short to hold the requested segments.
    #[error("{count} segments cannot fit a profile of length {len}")]
    CannotFit {
        /// Number of segments.
        count: usize,
        /// Target profile length.
        len: usize,
    },

    /// Returned when a segment id is not present.
    #[error("segment {id} not found")]
    MissingSegment {
        /// The requested id.
        id: Uuid,
    },

    /// Returned when two segments to merge are not neighbours.
    #[error("segments {first} and {second} are not adjacent")]
    NotAdjacent {
        /// First requested id.
        first: Uuid,
        /// Second requested id.
        second: Uuid,
    },

    /// Returned when a split index lies outside the segment or leaves a short half.
    #[error("segment {id} cannot be split at index {index}")]
    NotSplittable {
        /// Segment id.
        id: Uuid,
        /// Requested split index.
        index: usize,
    },

    /// Returned when a merge source cannot be recorded.
    #[error("invalid merge source for segment {id}: {reason}")]
    InvalidMergeSource {
        /// Parent segment id.
        id: Uuid,
        /// Why the source was refused.
        reason: &'static str,
    },

    /// Wraps a refused boundary move.
    #[error("segment update rejected: {0}")]
    Rejected(#[from] UpdateRejected),

    /// Wraps a profile error raised while transforming values.
    #[error("profile error: {0}")]
    Profile(#[from] ProfileError),
}
