use crate::error::{Result, SimError};
use kinetia_data::Vec3;

/// Simulation box centred on the origin, spanning `[-L/2, L/2)` on every axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxGeometry {
    size: Vec3,
    periodic: [bool; 3],
}

impl BoxGeometry {
    pub fn new(size: Vec3, periodic: [bool; 3]) -> Result<Self> {
        for axis in 0..3 {
            if !(size[axis].is_finite() && size[axis] > 0.0) {
                return Err(SimError::config(format!(
                    "box edge {axis} must be positive, got {}",
                    size[axis]
                )));
            }
        }
        Ok(Self { size, periodic })
    }

    pub fn cube(edge: f64, periodic: bool) -> Result<Self> {
        Self::new(Vec3::new(edge, edge, edge), [periodic; 3])
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.size
    }

    #[inline]
    pub fn periodic(&self) -> [bool; 3] {
        self.periodic
    }

    pub fn lower(&self) -> Vec3 {
        self.size * -0.5
    }

    pub fn volume(&self) -> f64 {
        self.size.x * self.size.y * self.size.z
    }

    /// Minimum-image displacement pointing from `a` to `b`.
    #[inline]
    pub fn shortest_difference(&self, a: &Vec3, b: &Vec3) -> Vec3 {
        let mut d = *b - *a;
        for axis in 0..3 {
            if self.periodic[axis] {
                let l = self.size[axis];
                d[axis] -= l * (d[axis] / l).round();
            }
        }
        d
    }

    #[inline]
    pub fn distance_squared(&self, a: &Vec3, b: &Vec3) -> f64 {
        self.shortest_difference(a, b).norm_squared()
    }

    /// Wraps periodic coordinates back into `[-L/2, L/2)`. Non-periodic axes are left alone.
    pub fn fix_position(&self, pos: &mut Vec3) {
        for axis in 0..3 {
            if self.periodic[axis] {
                let l = self.size[axis];
                let half = 0.5 * l;
                let mut v = pos[axis];
                if v < -half || v >= half {
                    v = (v + half).rem_euclid(l) - half;
                    // rem_euclid can round up to exactly l
                    if v >= half {
                        v -= l;
                    }
                }
                pos[axis] = v;
            }
        }
    }

    pub fn contains(&self, pos: &Vec3) -> bool {
        (0..3).all(|axis| {
            let half = 0.5 * self.size[axis];
            pos[axis] >= -half && pos[axis] < half
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortest_difference_wraps_periodic_axes() {
        let geometry = BoxGeometry::new(Vec3::new(10.0, 10.0, 10.0), [true, true, false]).unwrap();
        let a = Vec3::new(-4.5, 4.5, -4.5);
        let b = Vec3::new(4.5, -4.5, 4.5);
        let d = geometry.shortest_difference(&a, &b);
        assert!((d.x - -1.0).abs() < 1e-12);
        assert!((d.y - 1.0).abs() < 1e-12);
        assert!((d.z - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_fix_position_keeps_half_open_interval() {
        let geometry = BoxGeometry::cube(10.0, true).unwrap();
        let mut p = Vec3::new(5.0, -5.5, 17.0);
        geometry.fix_position(&mut p);
        assert!(geometry.contains(&p));
        assert!((p.x - -5.0).abs() < 1e-12);
        assert!((p.y - 4.5).abs() < 1e-12);
        assert!((p.z - -3.0).abs() < 1e-12);
    }

    #[test]
    fn test_fix_position_ignores_closed_axes() {
        let geometry = BoxGeometry::cube(10.0, false).unwrap();
        let mut p = Vec3::new(7.0, 0.0, 0.0);
        geometry.fix_position(&mut p);
        assert_eq!(p.x, 7.0);
    }

    #[test]
    fn test_rejects_degenerate_box() {
        assert!(BoxGeometry::new(Vec3::new(1.0, 0.0, 1.0), [true; 3]).is_err());
        assert!(BoxGeometry::new(Vec3::new(1.0, f64::NAN, 1.0), [true; 3]).is_err());
    }

    proptest::proptest! {
        #[test]
        fn test_fix_position_lands_inside_box(
            edge in 1.0f64..50.0,
            coords in proptest::array::uniform3(-1e4f64..1e4)
        ) {
            let geometry = BoxGeometry::cube(edge, true).unwrap();
            let mut p = Vec3::from(coords);
            geometry.fix_position(&mut p);
            proptest::prop_assert!(geometry.contains(&p), "{:?} outside edge {}", p, edge);
        }

        #[test]
        fn test_minimum_image_is_at_most_half_an_edge(
            edge in 1.0f64..50.0,
            a in proptest::array::uniform3(-25.0f64..25.0),
            b in proptest::array::uniform3(-25.0f64..25.0)
        ) {
            let geometry = BoxGeometry::cube(edge, true).unwrap();
            let d = geometry.shortest_difference(&Vec3::from(a), &Vec3::from(b));
            for axis in 0..3 {
                proptest::prop_assert!(d[axis].abs() <= 0.5 * edge + 1e-9);
            }
        }
    }
}
