//! Core types: errors, configuration, signal naming.

pub mod config;
pub mod errors;
pub mod signum;
