/// Asserts that two floats agree within an absolute tolerance.
#[macro_export]
macro_rules! assert_close {
    ($actual:expr, $expected:expr, $tol:expr) => {
        let (actual, expected): (f64, f64) = ($actual, $expected);
        assert!(
            (actual - expected).abs() <= $tol,
            "{} = {} is not within {} of {}",
            stringify!($actual),
            actual,
            $tol,
            expected
        );
    };
}

/// Asserts that two floats agree within a relative tolerance.
#[macro_export]
macro_rules! assert_rel_close {
    ($actual:expr, $expected:expr, $rel:expr) => {
        let (actual, expected): (f64, f64) = ($actual, $expected);
        assert!(
            ((actual - expected) / expected).abs() <= $rel,
            "{} = {} is not within relative {} of {}",
            stringify!($actual),
            actual,
            $rel,
            expected
        );
    };
}

/// Asserts the number of topologies held by a kernel's state.
#[macro_export]
macro_rules! assert_topologies {
    ($kernel:expr, $count:expr) => {
        assert_eq!(
            $kernel.state().n_topologies(),
            $count,
            "Topology count mismatch"
        );
    };
}
