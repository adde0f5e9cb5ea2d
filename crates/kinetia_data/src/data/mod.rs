//! Core data structures for the Kinetia simulation.

pub mod particle;
pub mod potential;
pub mod reaction;
pub mod vector;
