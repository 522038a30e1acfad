//! Handler edits on a root dataset with one shorter child dataset.

use morphoseg_collection::{
    BorderObject, CollectionError, ManagerConfig, Profileable, REFERENCE_POINT, TOP_VERTICAL,
};
use morphoseg_dataset::{Dataset, DatasetError, HandlerConfig, SegmentationHandler};
use morphoseg_profile::{Profile, Segment};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

const ROOT_LEN: usize = 60;
const CHILD_LEN: usize = 48;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn shape(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let t = i as f64 / len as f64 * std::f64::consts::TAU;
            170.0 + 50.0 * t.sin() + 20.0 * (3.0 * t + 0.4).cos()
        })
        .collect()
}

fn noisy_member(n: u128, len: usize, shift: usize, rng: &mut ChaCha8Rng) -> BorderObject {
    let values: Vec<f64> = shape(len).into_iter().map(|v| v + rng.gen_range(-0.5..0.5)).collect();
    let raw = Profile::new(values).unwrap().offset(-(shift as isize));
    let mut member = BorderObject::new(id(n), format!("nucleus-{n}"), raw).unwrap();
    member.set_landmark(REFERENCE_POINT, shift as isize).unwrap();
    member
}

/// Four members at the root length and two shorter ones, segmented at
/// 0, 15 and 40 of the root aggregate.
fn segmented_root() -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let members = vec![
        noisy_member(1, ROOT_LEN, 0, &mut rng),
        noisy_member(2, ROOT_LEN, 4, &mut rng),
        noisy_member(3, ROOT_LEN, 9, &mut rng),
        noisy_member(4, ROOT_LEN, 2, &mut rng),
        noisy_member(5, CHILD_LEN, 3, &mut rng),
        noisy_member(6, CHILD_LEN, 7, &mut rng),
    ];
    let profiled = Dataset::new("root", members).unwrap();
    assert_eq!(profiled.collection().length(), ROOT_LEN);

    let mut collection = profiled.collection().clone();
    collection
        .set_segments(vec![
            Segment::new(0, 15, ROOT_LEN, id(101)).unwrap(),
            Segment::new(15, 40, ROOT_LEN, id(102)).unwrap(),
            Segment::new(40, 0, ROOT_LEN, id(103)).unwrap(),
        ])
        .unwrap();
    let mut dataset = Dataset::from_parts("root", profiled.members().to_vec(), collection, None, Vec::new());
    let skipped = dataset
        .manager(ManagerConfig::new().with_parallel(false))
        .apply_median_segments_to_members();
    assert_eq!(skipped, 0);
    dataset
}

fn handler() -> SegmentationHandler {
    let mut dataset = segmented_root();
    dataset.add_child("small", vec![id(5), id(6)]).unwrap();
    SegmentationHandler::new(dataset)
}

fn snapshot(handler: &SegmentationHandler) -> Dataset {
    handler.read(|dataset| dataset.clone()).unwrap()
}

/// Segment ids of the root, the child and every member.
fn all_segment_ids(dataset: &Dataset) -> Vec<Vec<Uuid>> {
    let mut ids = vec![
        dataset.collection().segment_ids(),
        dataset.child("small").unwrap().collection().segment_ids(),
    ];
    for member in dataset.members() {
        ids.push(member.segments().iter().map(Segment::id).collect());
    }
    ids
}

fn assert_everywhere(dataset: &Dataset, expected: &[Uuid]) {
    for ids in all_segment_ids(dataset) {
        assert_eq!(ids, expected);
    }
}

// ---------------------------------------------------------------------------
// a) structural edits reach every dataset and member
// ---------------------------------------------------------------------------

#[test]
fn child_starts_with_proportional_segments() {
    let dataset = snapshot(&handler());
    let child = dataset.child("small").unwrap().collection();
    assert_eq!(child.length(), CHILD_LEN);
    let starts: Vec<usize> = child.segments().iter().map(Segment::start).collect();
    assert_eq!(starts, vec![0, 12, 32]);
    assert_everywhere(&dataset, &[id(101), id(102), id(103)]);
}

#[test]
fn merge_propagates_to_children() {
    let handler = handler();
    let merged = handler.merge_segments("root", id(101), id(102)).unwrap();

    let dataset = snapshot(&handler);
    assert_everywhere(&dataset, &[merged, id(103)]);
    let child = dataset.child("small").unwrap().collection();
    assert!(child.segments()[0].has_merge_source(id(101)));
    assert!(handler.validate().unwrap().is_valid());
}

#[test]
fn split_merge_unmerge_sequence() {
    let handler = handler();
    let (first, second) = handler.split_segment("root", id(102)).unwrap();
    assert_everywhere(&snapshot(&handler), &[id(101), first, second, id(103)]);

    let root = snapshot(&handler);
    assert_eq!(root.collection().segments()[2].start(), 27);
    assert_eq!(root.child("small").unwrap().collection().segments()[2].start(), 22);

    let merged = handler.merge_segments("root", first, second).unwrap();
    assert_everywhere(&snapshot(&handler), &[id(101), merged, id(103)]);

    handler.unmerge_segment("root", merged).unwrap();
    assert_everywhere(&snapshot(&handler), &[id(101), first, second, id(103)]);
    assert!(handler.validate().unwrap().is_valid());
}

#[test]
fn locks_reach_every_segment() {
    let handler = handler();
    handler.set_lock_on_all_segments("root", true).unwrap();
    let dataset = snapshot(&handler);
    assert!(dataset.collection().segments().iter().all(Segment::is_locked));
    assert!(dataset.child("small").unwrap().collection().segments().iter().all(Segment::is_locked));
    assert!(dataset.members().iter().all(|m| m.segments().iter().all(Segment::is_locked)));

    handler.set_lock_on_all_segments_except("root", id(102), true).unwrap();
    let dataset = snapshot(&handler);
    let locks: Vec<bool> = dataset.child("small").unwrap().collection().segments().iter().map(Segment::is_locked).collect();
    assert_eq!(locks, vec![true, false, true]);
}

// ---------------------------------------------------------------------------
// b) index and landmark moves are replayed proportionally
// ---------------------------------------------------------------------------

#[test]
fn segment_start_moves_proportionally_in_children() {
    let handler = handler();
    handler.update_segment_start("root", id(102), 20).unwrap();

    let dataset = snapshot(&handler);
    let root = dataset.collection().segments();
    assert_eq!((root[1].start(), root[0].end()), (20, 20));
    // 20 / 59 of a 48 point aggregate
    let child = dataset.child("small").unwrap().collection().segments();
    assert_eq!((child[1].start(), child[0].end()), (16, 16));
    assert!(handler.validate().unwrap().is_valid());
}

#[test]
fn landmark_moves_proportionally_in_children() {
    let handler = handler();
    handler.set_landmark("root", &TOP_VERTICAL, 30).unwrap();

    let dataset = snapshot(&handler);
    assert_eq!(dataset.collection().landmark_index(&TOP_VERTICAL).unwrap(), 30);
    let child = dataset.child("small").unwrap().collection();
    assert_eq!(child.landmark_index(&TOP_VERTICAL).unwrap(), 24);
    assert!(dataset.members().iter().all(|m| m.has_landmark(&TOP_VERTICAL)));
    assert!(handler.validate().unwrap().is_valid());
}

// ---------------------------------------------------------------------------
// c) refusals and rollback
// ---------------------------------------------------------------------------

#[test]
fn edits_target_the_root_only() {
    let handler = handler();
    assert!(matches!(
        handler.merge_segments("small", id(101), id(102)),
        Err(DatasetError::NotRoot { .. })
    ));
    assert!(matches!(
        handler.unmerge_segment("elsewhere", id(101)),
        Err(DatasetError::MissingChild { .. })
    ));
}

#[test]
fn failed_edit_restores_the_hierarchy() {
    let handler = handler();
    let before = snapshot(&handler);
    // 102 ends at 40, so its start cannot pass it
    let result = handler.update_segment_start("root", id(102), 45);
    assert!(matches!(result, Err(DatasetError::Collection(_))));
    assert_eq!(snapshot(&handler), before);

    let result = handler.merge_segments("root", id(101), id(999));
    assert!(matches!(
        result,
        Err(DatasetError::Collection(CollectionError::Segment(_)))
    ));
    assert_eq!(snapshot(&handler), before);
}

/// The collection carries a landmark that no member has.
fn inconsistent() -> Dataset {
    let dataset = segmented_root();
    let mut collection = dataset.collection().clone();
    collection.set_landmark(TOP_VERTICAL, 30).unwrap();
    Dataset::from_parts("root", dataset.members().to_vec(), collection, None, Vec::new())
}

#[test]
fn inconsistent_dataset_is_refused() {
    let handler = SegmentationHandler::new(inconsistent());
    match handler.merge_segments("root", id(102), id(103)) {
        Err(DatasetError::Validation(report)) => assert_eq!(report.errors().len(), 6),
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn invalid_result_is_rolled_back() {
    let config = HandlerConfig::new().with_validate_before_edit(false);
    let handler = SegmentationHandler::new(inconsistent()).with_config(config);
    let before = snapshot(&handler);
    assert!(matches!(
        handler.merge_segments("root", id(102), id(103)),
        Err(DatasetError::Validation(_))
    ));
    assert_eq!(snapshot(&handler), before);
}

#[test]
fn invalid_result_is_kept_without_rollback() {
    let config = HandlerConfig::new()
        .with_validate_before_edit(false)
        .with_rollback_on_invalid(false);
    let handler = SegmentationHandler::new(inconsistent()).with_config(config);
    let merged = handler.merge_segments("root", id(102), id(103)).unwrap();
    assert_eq!(snapshot(&handler).collection().segment_ids(), vec![id(101), merged]);
    assert!(!handler.validate().unwrap().is_valid());
}

#[test]
fn poisoned_lock_is_reported() {
    let handler = handler();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        handler.read(|_| panic!("reader failed"))
    }));
    assert!(result.is_err());
    assert!(matches!(
        handler.merge_segments("root", id(101), id(102)),
        Err(DatasetError::Poisoned)
    ));
    assert!(matches!(handler.into_inner(), Err(DatasetError::Poisoned)));
}
