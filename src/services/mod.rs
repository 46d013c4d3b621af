//! Lifecycle management for long-running background workers, ticking on
//! their own interval under SYSTEM.

pub mod registry;
pub mod supervisor;

pub use registry::Registry;
pub use supervisor::{Service, ServiceState, Supervisor};
