//! Image enhancement pipeline
//!
//! Runs the fixed sequence of scan-cleanup stages and hands every
//! intermediate raster to a sink as soon as it is produced.

pub mod runner;
pub mod stages;

pub use runner::{Pipeline, Stage, StageSink, StepTiming};
