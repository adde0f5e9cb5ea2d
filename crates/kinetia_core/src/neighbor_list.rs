use crate::execution::Execution;
use crate::geometry::BoxGeometry;
use crate::store::ParticleStore;
use kinetia_data::Vec3;

/// Finer grids than this per axis buy nothing but memory.
const MAX_CELLS_PER_AXIS: usize = 128;

/// Two particles closer than the cutoff. `i < j` and `displacement = pos(j) - pos(i)`
/// under the minimum image convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborPair {
    pub i: usize,
    pub j: usize,
    pub displacement: Vec3,
    pub distance_squared: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborListOp {
    Init,
    Update,
}

#[derive(Clone, Default)]
/// Cell-list neighbor index over a (possibly periodic) box.
///
/// Uses the offset array layout: `cell_offsets[c]..cell_offsets[c + 1]` selects the
/// entries of cell `c` in `cell_entries`. Every cell has at least the cutoff as edge
/// length, so each true neighbor pair lives in the same or an adjacent cell.
///
/// Entries are labelled with store indices. Labels need not be dense, which lets the
/// domain backend build per-rank lists over owned and ghost particles.
///
/// # Examples
/// ```
/// use kinetia_core::execution::Execution;
/// use kinetia_core::geometry::BoxGeometry;
/// use kinetia_core::neighbor_list::NeighborList;
/// use kinetia_data::Vec3;
///
/// let geometry = BoxGeometry::cube(10.0, true).unwrap();
/// let points = vec![(0, Vec3::new(4.8, 0.0, 0.0)), (1, Vec3::new(-4.8, 0.0, 0.0))];
/// let mut list = NeighborList::new();
/// list.rebuild_from(&geometry, 1.0, &points, Execution::Serial);
/// assert_eq!(list.pairs().len(), 1);
/// ```
pub struct NeighborList {
    cutoff: f64,
    geometry: Option<BoxGeometry>,
    dims: [usize; 3],
    cell_size: Vec3,
    cell_offsets: Vec<usize>,
    cell_entries: Vec<(usize, Vec3)>,
    cell_neighbors: Vec<Vec<usize>>,
    pairs: Vec<NeighborPair>,
    adjacency_offsets: Vec<usize>,
    adjacency: Vec<usize>,
    built_revision: Option<u64>,
}

impl NeighborList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn pairs(&self) -> &[NeighborPair] {
        &self.pairs
    }

    pub fn for_each_pair<F: FnMut(&NeighborPair)>(&self, mut f: F) {
        for pair in &self.pairs {
            f(pair);
        }
    }

    /// True when the store changed since the last [`NeighborList::rebuild`].
    pub fn is_dirty(&self, store: &ParticleStore) -> bool {
        self.built_revision != Some(store.revision())
    }

    pub fn invalidate(&mut self) {
        self.built_revision = None;
    }

    /// Rebuilds over all active particles of `store`.
    pub fn rebuild(
        &mut self,
        store: &ParticleStore,
        geometry: &BoxGeometry,
        cutoff: f64,
        exec: Execution<'_>,
    ) {
        let points: Vec<(usize, Vec3)> = store.iter_active().map(|(i, e)| (i, e.pos)).collect();
        self.rebuild_from(geometry, cutoff, &points, exec);
        self.built_revision = Some(store.revision());
    }

    /// Rebuilds over an explicit set of labelled positions.
    pub fn rebuild_from(
        &mut self,
        geometry: &BoxGeometry,
        cutoff: f64,
        points: &[(usize, Vec3)],
        exec: Execution<'_>,
    ) {
        self.built_revision = None;
        self.configure_grid(geometry, cutoff);

        let cell_count = self.dims[0] * self.dims[1] * self.dims[2];
        let cells: Vec<usize> = exec.map_slice(points, |(_, p)| self.cell_of(p));

        let mut counts = vec![0usize; cell_count];
        for &c in &cells {
            counts[c] += 1;
        }
        self.cell_offsets.clear();
        self.cell_offsets.reserve(cell_count + 1);
        let mut total = 0;
        for &count in &counts {
            self.cell_offsets.push(total);
            total += count;
        }
        self.cell_offsets.push(total);

        self.cell_entries.clear();
        self.cell_entries.resize(points.len(), (0, Vec3::ZERO));
        let mut cursor = self.cell_offsets[..cell_count].to_vec();
        for (point, &c) in points.iter().zip(&cells) {
            self.cell_entries[cursor[c]] = *point;
            cursor[c] += 1;
        }

        let cutoff_squared = cutoff * cutoff;
        let this = &*self;
        let per_point: Vec<Vec<NeighborPair>> = if cutoff > 0.0 {
            exec.map_range(points.len(), |k| {
                let (label, pos) = points[k];
                let mut found = Vec::new();
                for &nc in &this.cell_neighbors[cells[k]] {
                    for &(other, other_pos) in this.cell(nc) {
                        if other <= label {
                            continue;
                        }
                        let d = geometry.shortest_difference(&pos, &other_pos);
                        let r2 = d.norm_squared();
                        if r2 < cutoff_squared {
                            found.push(NeighborPair {
                                i: label,
                                j: other,
                                displacement: d,
                                distance_squared: r2,
                            });
                        }
                    }
                }
                found
            })
        } else {
            Vec::new()
        };
        self.pairs = per_point.into_iter().flatten().collect();
        self.build_adjacency(points);
    }

    /// Partners of `index` together with the displacement from `index` to the partner.
    pub fn neighbors_of(&self, index: usize) -> impl Iterator<Item = (usize, Vec3)> + '_ {
        let range = match (
            self.adjacency_offsets.get(index),
            self.adjacency_offsets.get(index + 1),
        ) {
            (Some(&a), Some(&b)) => a..b,
            _ => 0..0,
        };
        self.adjacency[range].iter().map(move |&k| {
            let pair = &self.pairs[k];
            if pair.i == index {
                (pair.j, pair.displacement)
            } else {
                (pair.i, -pair.displacement)
            }
        })
    }

    /// Visits every indexed label within `radius` of an arbitrary position, using the
    /// positions recorded at the last build. `radius` must not exceed the cutoff.
    pub fn for_each_near<F: FnMut(usize, Vec3, f64)>(&self, pos: &Vec3, radius: f64, mut f: F) {
        let Some(geometry) = self.geometry else {
            return;
        };
        debug_assert!(radius <= self.cutoff + 1e-12);
        let r2_max = radius * radius;
        for &nc in &self.cell_neighbors[self.cell_of(pos)] {
            for &(label, other_pos) in self.cell(nc) {
                let d = geometry.shortest_difference(pos, &other_pos);
                let r2 = d.norm_squared();
                if r2 < r2_max {
                    f(label, d, r2);
                }
            }
        }
    }

    #[inline]
    fn cell(&self, c: usize) -> &[(usize, Vec3)] {
        &self.cell_entries[self.cell_offsets[c]..self.cell_offsets[c + 1]]
    }

    /// Flat cell index of a position. Out-of-box coordinates on closed axes are
    /// clamped into the border cell; non-finite coordinates land in cell 0.
    #[inline]
    fn cell_of(&self, pos: &Vec3) -> usize {
        let Some(geometry) = self.geometry else {
            return 0;
        };
        let lower = geometry.lower();
        let mut idx = [0usize; 3];
        for axis in 0..3 {
            let rel = (pos[axis] - lower[axis]) / self.cell_size[axis];
            let c = if rel.is_finite() { rel.floor() } else { 0.0 };
            let n = self.dims[axis] as f64;
            let c = if geometry.periodic()[axis] {
                c.rem_euclid(n)
            } else {
                c.clamp(0.0, n - 1.0)
            };
            idx[axis] = (c as usize).min(self.dims[axis] - 1);
        }
        self.flat(idx)
    }

    #[inline]
    fn flat(&self, idx: [usize; 3]) -> usize {
        (idx[2] * self.dims[1] + idx[1]) * self.dims[0] + idx[0]
    }

    fn configure_grid(&mut self, geometry: &BoxGeometry, cutoff: f64) {
        let size = geometry.size();
        let mut dims = [1usize; 3];
        for (axis, dim) in dims.iter_mut().enumerate() {
            if cutoff > 0.0 {
                *dim = ((size[axis] / cutoff).floor() as usize).clamp(1, MAX_CELLS_PER_AXIS);
            }
        }
        let unchanged = self.geometry.as_ref() == Some(geometry)
            && self.dims == dims
            && !self.cell_neighbors.is_empty();
        self.cutoff = cutoff;
        self.geometry = Some(*geometry);
        if unchanged {
            return;
        }
        self.dims = dims;
        self.cell_size = Vec3::new(
            size.x / dims[0] as f64,
            size.y / dims[1] as f64,
            size.z / dims[2] as f64,
        );

        let periodic = geometry.periodic();
        let mut neighbors = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
        for z in 0..dims[2] {
            for y in 0..dims[1] {
                for x in 0..dims[0] {
                    let here = [x as i64, y as i64, z as i64];
                    let mut list = Vec::with_capacity(27);
                    for dz in -1..=1i64 {
                        for dy in -1..=1i64 {
                            for dx in -1..=1i64 {
                                let mut idx = [0usize; 3];
                                let mut valid = true;
                                for (axis, delta) in [dx, dy, dz].into_iter().enumerate() {
                                    let n = dims[axis] as i64;
                                    let c = here[axis] + delta;
                                    if periodic[axis] {
                                        idx[axis] = c.rem_euclid(n) as usize;
                                    } else if (0..n).contains(&c) {
                                        idx[axis] = c as usize;
                                    } else {
                                        valid = false;
                                    }
                                }
                                if valid {
                                    list.push(self.flat(idx));
                                }
                            }
                        }
                    }
                    list.sort_unstable();
                    list.dedup();
                    neighbors.push(list);
                }
            }
        }
        self.cell_neighbors = neighbors;
    }

    fn build_adjacency(&mut self, points: &[(usize, Vec3)]) {
        let span = points.iter().map(|(l, _)| l + 1).max().unwrap_or(0);
        let mut counts = vec![0usize; span];
        for pair in &self.pairs {
            counts[pair.i] += 1;
            counts[pair.j] += 1;
        }
        self.adjacency_offsets.clear();
        let mut total = 0;
        for &c in &counts {
            self.adjacency_offsets.push(total);
            total += c;
        }
        self.adjacency_offsets.push(total);
        self.adjacency.clear();
        self.adjacency.resize(total, 0);
        let mut cursor = self.adjacency_offsets[..span].to_vec();
        for (k, pair) in self.pairs.iter().enumerate() {
            self.adjacency[cursor[pair.i]] = k;
            cursor[pair.i] += 1;
            self.adjacency[cursor[pair.j]] = k;
            cursor[pair.j] += 1;
        }
    }
}
