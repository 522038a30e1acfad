//! Named points of interest on a profile.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a landmark anchors segmentation or merely annotates the border.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LandmarkKind {
    /// Anchors segmentation; segment boundaries may not be merged across it.
    Core,
    /// Optional annotation.
    Extended,
}

/// A named index of interest. Equality and ordering use the name, then the kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Landmark {
    name: Cow<'static, str>,
    #[serde(rename = "type")]
    kind: LandmarkKind,
}

/// Always index 0 of an aggregate; every member has one.
pub const REFERENCE_POINT: Landmark = Landmark::fixed("Reference point", LandmarkKind::Core);
pub const ORIENTATION_POINT: Landmark = Landmark::fixed("Orientation point", LandmarkKind::Extended);
pub const TOP_VERTICAL: Landmark = Landmark::fixed("Top vertical", LandmarkKind::Extended);
pub const BOTTOM_VERTICAL: Landmark = Landmark::fixed("Bottom vertical", LandmarkKind::Extended);

impl Landmark {
    pub fn new(name: impl Into<String>, kind: LandmarkKind) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            kind,
        }
    }

    const fn fixed(name: &'static str, kind: LandmarkKind) -> Self {
        Self {
            name: Cow::Borrowed(name),
            kind,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> LandmarkKind {
        self.kind
    }

    #[must_use]
    pub fn is_core(&self) -> bool {
        self.kind == LandmarkKind::Core
    }

    #[must_use]
    pub fn is_reference_point(&self) -> bool {
        *self == REFERENCE_POINT
    }

    /// True for the landmarks that fix a vertical orientation of the shape.
    #[must_use]
    pub fn is_vertical(&self) -> bool {
        *self == TOP_VERTICAL || *self == BOTTOM_VERTICAL
    }

    /// One of the built-in landmarks by name, or a new extended landmark.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        [REFERENCE_POINT, ORIENTATION_POINT, TOP_VERTICAL, BOTTOM_VERTICAL]
            .into_iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
            .unwrap_or_else(|| Self::new(name, LandmarkKind::Extended))
    }
}

impl fmt::Display for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_compare_equal_to_owned_copies() {
        let owned = Landmark::new("Reference point", LandmarkKind::Core);
        assert_eq!(owned, REFERENCE_POINT);
        assert!(owned.is_reference_point());
        assert!(!ORIENTATION_POINT.is_core());
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(Landmark::from_name("top vertical"), TOP_VERTICAL);
        let custom = Landmark::from_name("Tail");
        assert_eq!(custom.kind(), LandmarkKind::Extended);
        assert!(TOP_VERTICAL.is_vertical());
    }

    #[test]
    fn serializes_with_type_field() {
        let json = serde_json::to_string(&REFERENCE_POINT).unwrap();
        assert_eq!(json, r#"{"name":"Reference point","type":"CORE"}"#);
        let back: Landmark = serde_json::from_str(&json).unwrap();
        assert_eq!(back, REFERENCE_POINT);
    }
}
