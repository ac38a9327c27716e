//! Train Runtime Library
//!
//! Computes the kinematic motion profile of a single train along a fixed
//! path and, on top of it, an energy-efficient driving plan that matches
//! scheduled halt-to-halt travel times.

pub mod runtime;
