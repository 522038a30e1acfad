//! Criterion benchmarks for morphoseg-collection: aggregate rebuild and best-fit realignment.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use morphoseg_collection::{
    BorderObject, ManagerConfig, ProfileCollection, ProfileManager, Profileable, REFERENCE_POINT,
};
use morphoseg_profile::Profile;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

fn make_members(count: usize, len: usize, seed: u64) -> Vec<BorderObject> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let member_len = len + rng.gen_range(0..len / 5);
            let values: Vec<f64> = (0..member_len)
                .map(|j| {
                    let t = j as f64 / member_len as f64 * std::f64::consts::TAU;
                    170.0 + 45.0 * t.sin() + 15.0 * (3.0 * t).cos() + rng.gen_range(-2.0..2.0)
                })
                .collect();
            let mut member =
                BorderObject::new(Uuid::from_u128(i as u128 + 1), format!("m{i}"), Profile::new(values).unwrap())
                    .unwrap();
            let rp = rng.gen_range(0..member_len) as isize;
            member.set_landmark(REFERENCE_POINT, rp).unwrap();
            member
        })
        .collect()
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_aggregate");
    for &count in &[50usize, 200] {
        let members = make_members(count, 300, 42);
        group.bench_with_input(BenchmarkId::from_parameter(count), &members, |b, members| {
            b.iter(|| {
                let mut collection = ProfileCollection::new();
                collection.create_aggregate(members, 300).unwrap();
                collection
            });
        });
    }
    group.finish();
}

fn bench_realign(c: &mut Criterion) {
    let mut group = c.benchmark_group("realign_reference_point");
    for parallel in [false, true] {
        let members = make_members(200, 300, 7);
        let mut collection = ProfileCollection::new();
        collection.create_aggregate(&members, 300).unwrap();
        let median = collection
            .profile(
                morphoseg_collection::ProfileType::Angle,
                &REFERENCE_POINT,
                morphoseg_collection::Quartile::MEDIAN,
            )
            .unwrap();
        group.bench_function(BenchmarkId::new("members_200", parallel), |b| {
            b.iter(|| {
                let mut members = members.clone();
                let mut collection = collection.clone();
                let mut manager = ProfileManager::new(&mut collection, &mut members)
                    .with_config(ManagerConfig::new().with_parallel(parallel));
                manager.update_landmark_to_median_best_fit(&REFERENCE_POINT, &median)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_aggregate, bench_realign);
criterion_main!(benches);
