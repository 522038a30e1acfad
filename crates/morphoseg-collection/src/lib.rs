//! Aggregate profiles, landmarks and collection-wide segmentation edits.
//!
//! A [`ProfileCollection`] holds per-type aggregates of its members' profiles,
//! a landmark table and the canonical segmentation, all indexed from the
//! reference point. [`ProfileManager`] applies edits to a collection and keeps
//! every [`Profileable`] member and an optional consensus member in step.

mod aggregate;
mod collection;
mod config;
mod error;
mod kind;
mod landmark;
mod manager;
mod member;

pub use aggregate::{ProfileAggregate, percentile};
pub use collection::ProfileCollection;
pub use config::ManagerConfig;
pub use error::CollectionError;
pub use kind::{ProfileType, Quartile};
pub use landmark::{
    BOTTOM_VERTICAL, Landmark, LandmarkKind, ORIENTATION_POINT, REFERENCE_POINT, TOP_VERTICAL,
};
pub use manager::ProfileManager;
pub use member::{BorderObject, Point, Profileable};
