//! Test factories for planting steps and dispatcher rows in arbitrary
//! states, bypassing the creation-time defaults where a scenario needs a
//! specific shape.

#![allow(dead_code)]

pub mod steps;

pub use steps::{DispatcherFactory, StepFactory};
