//! Domain Layer
//!
//! Traits connecting the generic reconciler to per-kind Cloudian logic.

pub mod ports;

pub use ports::*;
