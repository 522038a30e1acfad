//! End-to-end integration tests: CSV -> dataset -> edits -> JSON -> reload.

use std::fs;
use std::path::{Path, PathBuf};

use morphoseg_collection::{
    ManagerConfig, ProfileType, Profileable, Quartile, REFERENCE_POINT, TOP_VERTICAL,
};
use morphoseg_dataset::{Dataset, DatasetValidator, SegmentationHandler};
use morphoseg_io::{
    DatasetSnapshot, ExperimentName, IoError, ProfileReader, SnapshotReader, SnapshotWriter,
};
use morphoseg_profile::Segment;
use tempfile::TempDir;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Path to the test fixture directory.
fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

/// The fixture profiled into a root with three segments and a child holding the
/// two short members.
fn build() -> Dataset {
    let members = ProfileReader::new(&fixture_path("profiles_6.csv"))
        .read()
        .expect("fixture should parse");
    assert_eq!(members.len(), 6);
    let profiled = Dataset::new("root", members).unwrap();
    let length = profiled.collection().length();
    assert_eq!(length, 40);

    let mut collection = profiled.collection().clone();
    collection
        .set_segments(vec![
            Segment::new(0, 10, length, id(101)).unwrap(),
            Segment::new(10, 25, length, id(102)).unwrap(),
            Segment::new(25, 0, length, id(103)).unwrap(),
        ])
        .unwrap();
    let mut dataset = Dataset::from_parts("root", profiled.members().to_vec(), collection, None, Vec::new());
    dataset
        .manager(ManagerConfig::new().with_parallel(false))
        .apply_median_segments_to_members();

    let small: Vec<Uuid> = dataset
        .members()
        .iter()
        .filter(|m| m.name().starts_with("small"))
        .map(Profileable::id)
        .collect();
    dataset.add_child("small", small).unwrap();
    dataset
}

fn save_and_load(dataset: &Dataset, experiment: &str) -> (TempDir, Dataset) {
    let dir = TempDir::new().unwrap();
    let writer = SnapshotWriter::new(dir.path(), ExperimentName::new(experiment.into()).unwrap()).unwrap();
    let path = writer.write_dataset(dataset).unwrap();
    let loaded = SnapshotReader::new(&path).read().unwrap();
    (dir, loaded)
}

fn median(dataset: &Dataset) -> Vec<f64> {
    dataset
        .collection()
        .profile(ProfileType::Angle, &REFERENCE_POINT, Quartile::MEDIAN)
        .unwrap()
        .as_slice()
        .to_vec()
}

fn assert_same_hierarchy(a: &Dataset, b: &Dataset) {
    assert_eq!(a.name(), b.name());
    assert_eq!(a.collection().segments(), b.collection().segments());
    assert_eq!(a.collection().landmarks(), b.collection().landmarks());
    for (x, y) in a.members().iter().zip(b.members()) {
        assert_eq!((x.id(), x.name()), (y.id(), y.name()));
        assert_eq!(x.border_segments(), y.border_segments());
        assert_eq!(x.landmarks(), y.landmarks());
    }
    for (x, y) in a.children().iter().zip(b.children()) {
        assert_eq!(x.name(), y.name());
        assert_eq!(x.member_ids(), y.member_ids());
        assert_eq!(x.collection().segments(), y.collection().segments());
        assert_eq!(x.collection().landmarks(), y.collection().landmarks());
    }
    for (x, y) in median(a).iter().zip(median(b)) {
        assert!((x - y).abs() < 1e-9, "median differs: {x} vs {y}");
    }
}

// ---------------------------------------------------------------------------
// a) round trips
// ---------------------------------------------------------------------------

#[test]
fn csv_members_keep_their_names() {
    let dataset = build();
    let names: Vec<&str> = dataset.members().iter().map(|m| m.name()).collect();
    assert_eq!(names[0], "nucleus-1");
    assert_eq!(dataset.members()[2].id(), Uuid::parse_str(names[2]).unwrap());
    assert_eq!(dataset.child("small").unwrap().collection().length(), 32);
}

#[test]
fn edited_dataset_round_trips() {
    let handler = SegmentationHandler::new(build());
    handler.split_segment("root", id(102)).unwrap();
    handler.set_landmark("root", &TOP_VERTICAL, 20).unwrap();
    let edited = handler.into_inner().unwrap();

    let (_dir, loaded) = save_and_load(&edited, "edited");
    assert_same_hierarchy(&edited, &loaded);
    assert!(DatasetValidator::new().validate(&loaded).is_valid());
}

#[test]
fn merge_sources_survive_reload() {
    let handler = SegmentationHandler::new(build());
    let merged = handler.merge_segments("root", id(101), id(102)).unwrap();
    let (_dir, loaded) = save_and_load(&handler.into_inner().unwrap(), "merged");

    assert!(loaded.collection().segments()[0].has_merge_source(id(101)));
    assert!(loaded.members()[0].segments()[0].has_merge_source(id(102)));

    let handler = SegmentationHandler::new(loaded);
    handler.unmerge_segment("root", merged).unwrap();
    let dataset = handler.into_inner().unwrap();
    let expected = vec![id(101), id(102), id(103)];
    assert_eq!(dataset.collection().segment_ids(), expected);
    assert_eq!(dataset.child("small").unwrap().collection().segment_ids(), expected);
}

// ---------------------------------------------------------------------------
// b) file layout
// ---------------------------------------------------------------------------

#[test]
fn snapshot_json_layout() {
    let dir = TempDir::new().unwrap();
    let writer = SnapshotWriter::new(dir.path(), ExperimentName::new("layout".into()).unwrap()).unwrap();
    let path = writer.write_dataset(&build()).unwrap();
    assert_eq!(path, dir.path().join("layout_dataset.json"));

    let content: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let segment = &content["collection"]["segments"][0];
    let mut keys: Vec<&str> = segment.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["end", "id", "locked", "mergeSources", "start"]);

    let landmark = &content["collection"]["landmarks"][0];
    assert_eq!(landmark["name"], "Reference point");
    assert_eq!(landmark["type"], "CORE");
    assert_eq!(landmark["index"], 0);

    let child = &content["children"][0];
    assert_eq!(child["name"], "small");
    assert_eq!(child["memberIds"].as_array().unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// c) failures
// ---------------------------------------------------------------------------

#[test]
fn unknown_child_member_is_rejected() {
    let mut snapshot = DatasetSnapshot::from_dataset(&build());
    snapshot.children[0].member_ids.push(id(999));
    assert!(matches!(
        snapshot.into_dataset(),
        Err(IoError::InvalidSnapshot { .. })
    ));
}

#[test]
fn missing_snapshot_is_reported() {
    let result = SnapshotReader::new(Path::new("/nonexistent/snapshot.json")).read();
    assert!(matches!(result, Err(IoError::FileNotFound { .. })));
}
