//! Command-line capture of knee angle measurements.
//!
//! Reads a photo, estimates the knee angle through the hosted backend and
//! optionally appends the resulting measurement to a local JSON-lines file.

pub mod config;
pub mod session;
pub mod store;
