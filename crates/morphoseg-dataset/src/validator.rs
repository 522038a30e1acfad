//! Consistency checks across a dataset hierarchy.

use std::fmt;

use morphoseg_collection::{ProfileCollection, Profileable, Quartile, REFERENCE_POINT};
use morphoseg_profile::Segment;
use serde::Serialize;
use uuid::Uuid;

use crate::dataset::Dataset;

/// Outcome of validating a dataset: a short summary and one line per problem.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    summary: Vec<String>,
    errors: Vec<String>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn summary(&self) -> &[String] {
        &self.summary
    }

    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    fn error(&mut self, message: String) {
        self.errors.push(message);
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.summary {
            writeln!(f, "{line}")?;
        }
        for line in &self.errors {
            writeln!(f, "  - {line}")?;
        }
        Ok(())
    }
}

/// Checks that members, the consensus and every child dataset agree with the
/// root collection.
///
/// | Check | Applies to |
/// |---|---|
/// | reference point present | members |
/// | every aggregated profile type present | members |
/// | every collection landmark present | members, consensus, children |
/// | segment ids, order and merge sources match the collection | members, consensus |
/// | no overlap beyond shared endpoints | members |
/// | a segment starts at the reference point | members |
/// | median and segmented median available | root, children |
/// | segment ids match the root | children |
#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetValidator;

impl DatasetValidator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Run every check. Never fails; problems are collected in the report.
    #[must_use]
    pub fn validate<M: Profileable + Send + Sync>(&self, dataset: &Dataset<M>) -> ValidationReport {
        let mut report = ValidationReport::default();
        let collection = dataset.collection();

        check_aggregates(&mut report, dataset.name(), collection);
        for child in dataset.children() {
            check_aggregates(&mut report, child.name(), child.collection());
            check_child_segments(&mut report, child.name(), collection, child.collection());
            for landmark in collection.landmarks().keys() {
                if !child.collection().has_landmark(landmark) {
                    report.error(format!("Child dataset '{}' has no {landmark}", child.name()));
                }
            }
        }

        let types = collection.profile_types();
        for member in dataset.members() {
            let who = format!("Member {}", member.id());
            if !member.has_landmark(&REFERENCE_POINT) {
                report.error(format!("{who} has no {REFERENCE_POINT}"));
            }
            for kind in &types {
                if !member.has_profile(*kind) {
                    report.error(format!("{who} has no {kind} profile"));
                }
            }
            check_member(&mut report, &who, member, collection);
            check_overlaps(&mut report, &who, &member.segments());
            if !member.segments().iter().any(|s| s.start() == 0) {
                report.error(format!("{who} has no segment starting at the {REFERENCE_POINT}"));
            }
        }
        if let Some(consensus) = dataset.consensus() {
            check_member(&mut report, "Consensus", consensus, collection);
        }

        report.summary.push(format!(
            "Validated {} members and {} child datasets",
            dataset.members().len(),
            dataset.children().len()
        ));
        report.summary.push(format!(
            "Root has {} segments and {} landmarks",
            collection.segment_count(),
            collection.landmarks().len()
        ));
        report.summary.push(if report.is_valid() {
            "Dataset is valid".to_owned()
        } else {
            format!("Found {} errors", report.errors.len())
        });
        report
    }
}

fn check_aggregates(report: &mut ValidationReport, name: &str, collection: &ProfileCollection) {
    let types = collection.profile_types();
    if types.is_empty() {
        report.error(format!("Dataset '{name}' has no aggregate profiles"));
    }
    for kind in types {
        if let Err(e) = collection.profile(kind, &REFERENCE_POINT, Quartile::MEDIAN) {
            report.error(format!("Dataset '{name}' cannot produce a {kind} median: {e}"));
        }
        if let Err(e) = collection.segmented_profile(kind, &REFERENCE_POINT, Quartile::MEDIAN) {
            report.error(format!("Dataset '{name}' cannot produce a segmented {kind} median: {e}"));
        }
    }
}

fn check_child_segments(
    report: &mut ValidationReport,
    name: &str,
    root: &ProfileCollection,
    child: &ProfileCollection,
) {
    let root_ids = root.segment_ids();
    let child_ids = child.segment_ids();
    let before = report.errors.len();
    for id in root_ids.iter().filter(|id| !child_ids.contains(id)) {
        report.error(format!("Child dataset '{name}' is missing root segment {id}"));
    }
    for id in child_ids.iter().filter(|id| !root_ids.contains(id)) {
        report.error(format!("Child dataset '{name}' has segment {id} not in the root"));
    }
    if report.errors.len() == before && root_ids != child_ids {
        report.error(format!("Child dataset '{name}' orders its segments differently from the root"));
    }
}

fn check_member<M: Profileable>(report: &mut ValidationReport, who: &str, member: &M, collection: &ProfileCollection) {
    for landmark in collection.landmarks().keys() {
        if !member.has_landmark(landmark) {
            report.error(format!("{who} has no {landmark}"));
        }
    }

    let expected = collection.segments();
    let actual = member.segments();
    if expected.len() != actual.len() {
        report.error(format!(
            "{who} has {} segments, the collection has {}",
            actual.len(),
            expected.len()
        ));
        return;
    }
    for (e, a) in expected.iter().zip(&actual) {
        if e.id() != a.id() {
            report.error(format!(
                "{who} has segment {} at position {}, the collection has {}",
                a.id(),
                a.position(),
                e.id()
            ));
            continue;
        }
        if source_ids(e) != source_ids(a) {
            report.error(format!("{who} segment {} has different merge sources", a.id()));
        }
    }
}

fn check_overlaps(report: &mut ValidationReport, who: &str, segments: &[Segment]) {
    for (i, a) in segments.iter().enumerate() {
        for b in &segments[i + 1..] {
            if a.overlaps_beyond_endpoints(b) {
                report.error(format!("{who} segments {} and {} overlap", a.id(), b.id()));
            }
        }
    }
}

/// Merge-source ids in pre-order.
fn source_ids(segment: &Segment) -> Vec<Uuid> {
    let mut ids = Vec::new();
    for source in segment.merge_sources() {
        ids.push(source.id());
        ids.extend(source_ids(source));
    }
    ids
}
