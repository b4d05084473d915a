//! Cloudian HyperStore admin API client
//!
//! A thin async SDK over the admin REST API: groups, users, access keys and
//! QoS limits. Calls never retry; a failed call surfaces as an
//! [`Error`](crate::Error) and the reconciler decides when to try again.

pub mod client;
pub mod credentials;
pub mod datasize;
pub mod group;
pub mod qos;
pub mod secret;
pub mod user;

pub use client::{Client, ClientConfig};
pub use credentials::SecurityInfo;
pub use datasize::{ByteSize, GB, KB, MB, TB};
pub use group::Group;
pub use qos::{QosLimits, QosTarget, QualityOfService};
pub use secret::Secret;
pub use user::{GroupUserId, User, UserType};
