//! Knee angle estimation client library.
//!
//! Provides the hosted-backend client with its callable-function transport
//! and wire validation, the on-device pose estimator, and the combined
//! estimator that falls back from one to the other.

pub mod api;
pub mod backend;
pub mod client;
pub mod config;
pub mod estimator;
pub mod pose;
pub mod wire;
