//! Core types, configuration, and utilities shared across the crate.

pub mod config;
pub mod error;
pub mod graph;
pub mod progress;
pub mod spatial;
