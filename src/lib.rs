//! Seismicity Rate Model Search - Library
//!
//! This crate searches for spatial seismicity rate models with a
//! generational genetic algorithm: an earthquake catalog is binned onto a
//! geographic grid, candidate models are scored by their joint Poisson
//! log-likelihood against the observed counts, and independent runs append
//! their results to a shared, file-locked log.

pub mod catalog;
pub mod error;
pub mod fitness;
pub mod genetic;
pub mod grid;
pub mod likelihood;
pub mod operators;
pub mod results;
pub mod sweep;

pub use error::{Error, Result};
