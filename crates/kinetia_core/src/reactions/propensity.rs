/// Binary sum tree over event propensities.
///
/// Leaves hold propensities; every inner node is the sum of its two children, so
/// updates and proportional sampling are both O(log n). Parents are recomputed
/// from their children on every update, which keeps the root free of drift.
#[derive(Debug, Clone)]
pub struct PropensityTree {
    capacity: usize,
    nodes: Vec<f64>,
}

impl Default for PropensityTree {
    fn default() -> Self {
        Self::with_capacity(1)
    }
}

impl PropensityTree {
    pub fn with_capacity(n: usize) -> Self {
        let capacity = n.max(1).next_power_of_two();
        Self {
            capacity,
            nodes: vec![0.0; 2 * capacity],
        }
    }

    pub fn from_values(values: &[f64]) -> Self {
        let mut tree = Self::with_capacity(values.len());
        tree.nodes[tree.capacity..tree.capacity + values.len()].copy_from_slice(values);
        for i in (1..tree.capacity).rev() {
            tree.nodes[i] = tree.nodes[2 * i] + tree.nodes[2 * i + 1];
        }
        tree
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total(&self) -> f64 {
        self.nodes[1]
    }

    pub fn get(&self, slot: usize) -> f64 {
        if slot < self.capacity {
            self.nodes[self.capacity + slot]
        } else {
            0.0
        }
    }

    pub fn set(&mut self, slot: usize, value: f64) {
        if slot >= self.capacity {
            self.grow(slot + 1);
        }
        let mut i = self.capacity + slot;
        self.nodes[i] = value.max(0.0);
        while i > 1 {
            i /= 2;
            self.nodes[i] = self.nodes[2 * i] + self.nodes[2 * i + 1];
        }
    }

    /// Slot whose cumulative range contains `target`, for `target` in `[0, total)`.
    pub fn find(&self, target: f64) -> usize {
        let mut target = target;
        let mut i = 1;
        while i < self.capacity {
            let left = self.nodes[2 * i];
            if target < left || self.nodes[2 * i + 1] <= 0.0 {
                i *= 2;
            } else {
                target -= left;
                i = 2 * i + 1;
            }
        }
        i - self.capacity
    }

    fn grow(&mut self, min_len: usize) {
        let values: Vec<f64> = self.nodes[self.capacity..].to_vec();
        let mut grown = Self::with_capacity(min_len.max(2 * self.capacity));
        grown.nodes[grown.capacity..grown.capacity + values.len()].copy_from_slice(&values);
        for i in (1..grown.capacity).rev() {
            grown.nodes[i] = grown.nodes[2 * i] + grown.nodes[2 * i + 1];
        }
        *self = grown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_tracks_updates() {
        let mut tree = PropensityTree::from_values(&[1.0, 2.0, 3.0]);
        assert_eq!(tree.total(), 6.0);
        tree.set(1, 0.0);
        assert_eq!(tree.total(), 4.0);
        tree.set(9, 1.5);
        assert_eq!(tree.total(), 5.5);
        assert_eq!(tree.get(9), 1.5);
        assert_eq!(tree.get(2), 3.0);
    }

    #[test]
    fn test_find_is_proportional() {
        let tree = PropensityTree::from_values(&[1.0, 0.0, 3.0]);
        assert_eq!(tree.find(0.5), 0);
        assert_eq!(tree.find(1.0), 2);
        assert_eq!(tree.find(3.999), 2);
    }

    #[test]
    fn test_find_skips_empty_right_subtree() {
        let tree = PropensityTree::from_values(&[2.0, 0.0, 0.0, 0.0]);
        // rounding may push target to the total; it must still land on a live slot
        assert_eq!(tree.find(2.0), 0);
    }
}
