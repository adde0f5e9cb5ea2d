use kinetia_core::execution::Execution;
use kinetia_core::geometry::BoxGeometry;
use kinetia_core::neighbor_list::NeighborList;
use kinetia_data::Vec3;
use proptest::prelude::*;
use std::collections::BTreeSet;

prop_compose! {
    fn arb_geometry()(
        x in 4.0f64..20.0,
        y in 4.0f64..20.0,
        z in 4.0f64..20.0,
        periodic in prop::array::uniform3(any::<bool>())
    ) -> BoxGeometry {
        BoxGeometry::new(Vec3::new(x, y, z), periodic).unwrap()
    }
}

prop_compose! {
    fn arb_system()(
        geometry in arb_geometry(),
        points in prop::collection::vec(prop::array::uniform3(-0.5f64..0.5), 0..120),
        cutoff_fraction in 0.05f64..0.5
    ) -> (BoxGeometry, Vec<(usize, Vec3)>, f64) {
        let size = geometry.size();
        let points = points
            .into_iter()
            .enumerate()
            .map(|(i, [u, v, w])| (i, Vec3::new(u * size.x, v * size.y, w * size.z)))
            .collect();
        let shortest = size.x.min(size.y).min(size.z);
        (geometry, points, cutoff_fraction * shortest)
    }
}

fn brute_force(geometry: &BoxGeometry, points: &[(usize, Vec3)], cutoff: f64) -> BTreeSet<(usize, usize)> {
    let mut pairs = BTreeSet::new();
    for (a, &(i, pi)) in points.iter().enumerate() {
        for &(j, pj) in &points[a + 1..] {
            if geometry.distance_squared(&pi, &pj) < cutoff * cutoff {
                pairs.insert((i.min(j), i.max(j)));
            }
        }
    }
    pairs
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_cell_list_matches_brute_force((geometry, points, cutoff) in arb_system()) {
        let mut list = NeighborList::new();
        list.rebuild_from(&geometry, cutoff, &points, Execution::Serial);

        let found: BTreeSet<(usize, usize)> = list.pairs().iter().map(|p| (p.i, p.j)).collect();
        prop_assert_eq!(found.len(), list.pairs().len(), "duplicate pairs");
        prop_assert_eq!(found, brute_force(&geometry, &points, cutoff));
    }

    #[test]
    fn test_pair_displacements_point_from_i_to_j((geometry, points, cutoff) in arb_system()) {
        let mut list = NeighborList::new();
        list.rebuild_from(&geometry, cutoff, &points, Execution::Serial);

        for pair in list.pairs() {
            prop_assert!(pair.i < pair.j);
            let expected = geometry.shortest_difference(&points[pair.i].1, &points[pair.j].1);
            prop_assert!((pair.displacement - expected).norm() < 1e-9);
            prop_assert!((pair.displacement.norm_squared() - pair.distance_squared).abs() < 1e-9);
        }
    }

    #[test]
    fn test_adjacency_is_symmetric((geometry, points, cutoff) in arb_system()) {
        let mut list = NeighborList::new();
        list.rebuild_from(&geometry, cutoff, &points, Execution::Serial);

        for &(i, _) in &points {
            for (j, d) in list.neighbors_of(i) {
                let back: Vec<Vec3> = list
                    .neighbors_of(j)
                    .filter(|&(k, _)| k == i)
                    .map(|(_, d)| d)
                    .collect();
                prop_assert_eq!(back.len(), 1);
                prop_assert!((back[0] + d).norm() < 1e-12);
            }
        }
    }

    #[test]
    fn test_parallel_build_matches_serial((geometry, points, cutoff) in arb_system()) {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(3).build().unwrap();
        let mut serial = NeighborList::new();
        let mut parallel = NeighborList::new();
        serial.rebuild_from(&geometry, cutoff, &points, Execution::Serial);
        parallel.rebuild_from(&geometry, cutoff, &points, Execution::Parallel(&pool));
        prop_assert_eq!(serial.pairs(), parallel.pairs());
    }
}
