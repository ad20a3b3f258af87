//! Domain layer — pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`
//! sockets. All functions are synchronous and take data in, returning data out.

pub mod config;
pub mod error;
pub mod instance;

pub use config::{AccessToken, ConfigOverrides, FileConfig, FleetConfig, FleetTimings};
pub use error::{ConfigError, FleetError};
pub use instance::{
    CommandLogRow, CommandStatus, CreatedInstance, InstanceId, InstanceRequest, InstanceSummary,
};
