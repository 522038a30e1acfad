//! Profile measurement types and aggregate percentiles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CollectionError;

/// The measurement a profile records at each border point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileType {
    /// Interior angle at each border point, in degrees.
    Angle,
    /// Distance across the object through its centroid.
    Diameter,
    /// Distance from the centroid.
    Radius,
}

impl ProfileType {
    /// Every profile type, in a fixed order.
    pub const ALL: [ProfileType; 3] = [Self::Angle, Self::Diameter, Self::Radius];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Angle => "angle",
            Self::Diameter => "diameter",
            Self::Radius => "radius",
        }
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileType {
    type Err = CollectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CollectionError::UnknownProfileType { name: s.to_owned() })
    }
}

/// A percentile in `0..=100` used to pick an aggregate profile.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Quartile(f64);

impl Quartile {
    pub const LOWER: Self = Self(25.0);
    pub const MEDIAN: Self = Self(50.0);
    pub const UPPER: Self = Self(75.0);

    /// # Errors
    ///
    /// Returns [`CollectionError::QuartileOutOfRange`] unless `0 <= percentile <= 100`.
    pub fn new(percentile: f64) -> Result<Self, CollectionError> {
        if !(0.0..=100.0).contains(&percentile) {
            return Err(CollectionError::QuartileOutOfRange {
                quartile: percentile,
            });
        }
        Ok(Self(percentile))
    }

    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    pub(crate) fn key(self) -> u64 {
        self.0.to_bits()
    }
}
