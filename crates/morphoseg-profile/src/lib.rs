//! Circular border profiles and their segmentation.
//!
//! Pure math library, zero I/O. Provides fixed-length circular profiles with
//! rotation, resampling and best-fit alignment, wrapping segments with merge
//! provenance, and segmented profiles supporting boundary moves, merge, split and
//! unmerge.

mod error;
mod profile;
mod segment;
mod segmented;

pub use error::{ProfileError, SegmentError, UpdateRejected};
pub use profile::Profile;
pub use segment::{
    Segment, contains_index, length_between, link_segments, scale_segments, update_linked,
};
pub use segmented::SegmentedProfile;

use uuid::Uuid;

/// Fewest points a profile may hold.
pub const MIN_PROFILE_LENGTH: usize = 3;

/// Fewest indices a segment may cover, counting both endpoints.
pub const MIN_SEGMENT_LENGTH: usize = 3;

/// Reserved id of the segment spanning a whole unsegmented profile.
pub const DEFAULT_SEGMENT_ID: Uuid = Uuid::from_u128(0x1111_1111_2222_3333_4444_5555_6666_7777);

/// Map any signed index onto `0..len`.
///
/// # Panics
///
/// Panics if `len` is zero.
#[must_use]
pub fn wrap_index(index: isize, len: usize) -> usize {
    index.rem_euclid(len as isize) as usize
}
