//! Managed resource control plane
//!
//! External clients for each managed kind plus the generic reconciler that
//! drives them.

pub mod access_key;
pub mod connector;
pub mod diff;
pub mod group;
pub mod metrics;
pub mod quality_of_service;
pub mod reconciler;
pub mod user;

pub use connector::Connector;
pub use metrics::Metrics;
pub use reconciler::{run, Context, ControllerConfig};
