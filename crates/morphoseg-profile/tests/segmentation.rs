//! Behavioural tests for morphoseg-profile segmentation.
//!
//! These exercise whole edit sequences on segmented profiles and check the tiling
//! invariants that must hold after every accepted or rejected edit.

use morphoseg_profile::{
    DEFAULT_SEGMENT_ID, MIN_SEGMENT_LENGTH, Profile, ProfileError, Segment, SegmentError,
    SegmentedProfile,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn valley() -> Profile {
    Profile::new(vec![5.0, 4.0, 3.0, 2.0, 1.0, 1.0, 2.0, 3.0, 4.0, 5.0]).expect("valid profile")
}

fn sine(len: usize) -> Profile {
    let values = (0..len)
        .map(|i| 180.0 + 40.0 * (i as f64 / len as f64 * std::f64::consts::TAU * 2.0).sin())
        .collect();
    Profile::new(values).expect("valid profile")
}

/// Cuts `len` into `bounds.len()` segments with ids 1, 2, ...
fn cut(len: usize, bounds: &[usize]) -> SegmentedProfile {
    let segments = bounds
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = bounds[(i + 1) % bounds.len()];
            Segment::new(start, end, len, id(i as u128 + 1)).expect("valid segment")
        })
        .collect();
    SegmentedProfile::with_segments(sine(len), segments).expect("valid segmentation")
}

fn assert_tiles(sp: &SegmentedProfile) {
    let segments = sp.segments();
    let total: usize = segments.iter().map(Segment::length).sum();
    if segments.len() == 1 {
        assert_eq!(segments[0].start(), segments[0].end());
        return;
    }
    assert_eq!(total, sp.len() + segments.len(), "coverage broken: {sp}");
    for (i, s) in segments.iter().enumerate() {
        let next = &segments[(i + 1) % segments.len()];
        assert_eq!(s.end(), next.start(), "gap after {s}");
        assert!(s.length() >= MIN_SEGMENT_LENGTH, "short segment {s}");
        assert_eq!(s.position(), i);
    }
}

// ---------------------------------------------------------------------------
// a) split a whole-profile segment
// ---------------------------------------------------------------------------

#[test]
fn split_single_segment_and_unmerge() {
    let mut sp = SegmentedProfile::new(valley()).unwrap();
    let parent = sp.segments()[0].id();
    assert_eq!(parent, DEFAULT_SEGMENT_ID);

    // the default id cannot carry merge sources, so give the span its own id
    let full = Segment::new(0, 0, 10, id(100)).unwrap();
    sp.set_segments(vec![full]).unwrap();
    sp.split_segment(id(100), 4, id(1), id(2)).unwrap();

    let x = sp.segment(id(1)).unwrap();
    let y = sp.segment(id(2)).unwrap();
    assert_eq!((x.start(), x.end()), (0, 4));
    assert_eq!((y.start(), y.end()), (4, 0));
    assert!(x.length() >= MIN_SEGMENT_LENGTH);
    assert!(y.length() >= MIN_SEGMENT_LENGTH);
    assert_tiles(&sp);

    sp.merge_segments(id(1), id(2), id(100)).unwrap();
    let restored = sp.segment(id(100)).unwrap();
    assert_eq!((restored.start(), restored.end()), (0, 0));

    sp.unmerge_segment(id(100)).unwrap();
    assert_eq!(sp.segment_ids(), vec![id(1), id(2)]);
}

#[test]
fn interpolating_to_one_point_fails() {
    let sp = SegmentedProfile::new(valley()).unwrap();
    assert!(matches!(
        sp.interpolate(1),
        Err(SegmentError::Profile(ProfileError::TooShort { len: 1, .. }))
    ));
    assert!(valley().interpolate(1).is_err());
}

// ---------------------------------------------------------------------------
// b) invariants under random edit sequences
// ---------------------------------------------------------------------------

#[test]
fn random_updates_keep_tiling() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut sp = cut(100, &[0, 20, 45, 70]);
    let mut accepted = 0;
    for _ in 0..500 {
        let target = id(rng.gen_range(1..=4));
        let seg = sp.segment(target).unwrap().clone();
        let start = (seg.start() as isize + rng.gen_range(-6..=6)).rem_euclid(100) as usize;
        let end = (seg.end() as isize + rng.gen_range(-6..=6)).rem_euclid(100) as usize;
        let before = sp.clone();
        match sp.update(target, start, end) {
            Ok(()) => accepted += 1,
            Err(_) => assert_eq!(sp, before, "rejected update mutated the profile"),
        }
        assert_tiles(&sp);
    }
    assert!(accepted > 0);
}

#[test]
fn rotation_round_trips() {
    let sp = cut(60, &[0, 15, 33, 48]);
    for k in [-61, -7, 0, 1, 29, 59, 120] {
        let rotated = sp.start_from(k);
        assert_tiles(&rotated);
        assert_eq!(rotated.start_from(-k), sp);
    }
}

#[test]
fn interpolation_keeps_tiling_in_both_directions() {
    let sp = cut(100, &[0, 4, 8, 50, 90]);
    for len in [15, 37, 100, 333] {
        let scaled = sp.interpolate(len).unwrap();
        assert_eq!(scaled.len(), len);
        assert_eq!(scaled.segment_ids(), sp.segment_ids());
        assert_eq!(scaled.segments()[0].start(), 0);
        assert_tiles(&scaled);
    }
    assert!(matches!(
        sp.interpolate(9),
        Err(SegmentError::CannotFit { count: 5, len: 9 })
    ));
}

// ---------------------------------------------------------------------------
// c) merge provenance
// ---------------------------------------------------------------------------

#[test]
fn nested_merges_unwind_in_order() {
    let mut sp = cut(60, &[0, 15, 30, 45]);
    let original = sp.clone();

    sp.merge_segments(id(1), id(2), id(10)).unwrap();
    sp.merge_segments(id(10), id(3), id(11)).unwrap();
    assert_eq!(sp.segment_count(), 2);
    let top = sp.segment(id(11)).unwrap();
    assert_eq!((top.start(), top.end()), (0, 45));
    assert!(top.merge_sources()[0].has_merge_source(id(2)));

    sp.unmerge_segment(id(11)).unwrap();
    assert_eq!(sp.segment_ids(), vec![id(10), id(3), id(4)]);
    sp.unmerge_segment(id(10)).unwrap();
    assert_eq!(sp, original);
}

#[test]
fn boundary_moves_follow_into_merge_sources() {
    let mut sp = cut(60, &[0, 15, 30, 45]);
    sp.merge_segments(id(2), id(3), id(10)).unwrap();
    sp.update(id(10), 18, 42).unwrap();

    let merged = sp.segment(id(10)).unwrap();
    let sources = merged.merge_sources();
    assert_eq!(sources[0].start(), 18);
    assert_eq!(sources[1].end(), 42);

    sp.unmerge_segment(id(10)).unwrap();
    assert_eq!(sp.segment(id(1)).unwrap().end(), 18);
    assert_eq!(sp.segment(id(2)).unwrap().start(), 18);
    assert_eq!(sp.segment(id(3)).unwrap().end(), 42);
    assert_tiles(&sp);
}

#[test]
fn locked_segment_blocks_neighbour_moves() {
    let mut sp = cut(60, &[0, 15, 30, 45]);
    sp.set_segment_lock(id(2), true).unwrap();
    assert!(sp.update(id(1), 0, 18).is_err());
    assert!(sp.update(id(3), 30, 40).is_ok());
    sp.set_all_locks(false);
    assert!(sp.update(id(1), 0, 18).is_ok());
}
