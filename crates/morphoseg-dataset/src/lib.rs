//! Dataset hierarchies and the segmentation edit handler.
//!
//! A [`Dataset`] owns the profiled members, their aggregate collection, an
//! optional consensus member and derived child datasets. User edits go through
//! a [`SegmentationHandler`], which applies them to the root, replays them
//! proportionally on every child and checks the result with a
//! [`DatasetValidator`].

mod config;
mod dataset;
mod error;
mod handler;
mod validator;

pub use config::HandlerConfig;
pub use dataset::{ChildDataset, Dataset};
pub use error::DatasetError;
pub use handler::SegmentationHandler;
pub use validator::{DatasetValidator, ValidationReport};
