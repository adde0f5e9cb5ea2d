use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kinetia_core::execution::Execution;
use kinetia_core::geometry::BoxGeometry;
use kinetia_core::neighbor_list::NeighborList;
use kinetia_data::Vec3;

fn lattice(n: usize, edge: f64) -> Vec<(usize, Vec3)> {
    let side = (n as f64).cbrt().ceil() as usize;
    let spacing = edge / side as f64;
    (0..n)
        .map(|i| {
            let (x, y, z) = (i % side, (i / side) % side, i / (side * side));
            let pos = Vec3::new(
                x as f64 * spacing - edge / 2.0,
                y as f64 * spacing - edge / 2.0,
                z as f64 * spacing - edge / 2.0,
            );
            (i, pos)
        })
        .collect()
}

fn bench_neighbor_list_build(c: &mut Criterion) {
    let geometry = BoxGeometry::cube(40.0, true).unwrap();
    let points = lattice(8000, 40.0);

    c.bench_function("neighbor_list_build_8000", |b| {
        b.iter(|| {
            let mut list = NeighborList::new();
            list.rebuild_from(&geometry, 2.5, &points, Execution::Serial);
            black_box(list.pairs().len())
        })
    });
}

fn bench_neighbor_list_build_parallel(c: &mut Criterion) {
    let geometry = BoxGeometry::cube(40.0, true).unwrap();
    let points = lattice(8000, 40.0);
    let pool = rayon::ThreadPoolBuilder::new().build().unwrap();

    c.bench_function("neighbor_list_build_parallel_8000", |b| {
        b.iter(|| {
            let mut list = NeighborList::new();
            list.rebuild_from(&geometry, 2.5, &points, Execution::Parallel(&pool));
            black_box(list.pairs().len())
        })
    });
}

fn bench_neighbor_list_query(c: &mut Criterion) {
    let geometry = BoxGeometry::cube(40.0, true).unwrap();
    let points = lattice(8000, 40.0);
    let mut list = NeighborList::new();
    list.rebuild_from(&geometry, 2.5, &points, Execution::Serial);

    c.bench_function("neighbor_list_query_near_2", |b| {
        b.iter(|| {
            let mut count = 0;
            list.for_each_near(&Vec3::new(0.3, 0.3, 0.3), 2.0, |_, _, _| count += 1);
            black_box(count)
        })
    });
}

criterion_group!(
    benches,
    bench_neighbor_list_build,
    bench_neighbor_list_build_parallel,
    bench_neighbor_list_query
);
criterion_main!(benches);
