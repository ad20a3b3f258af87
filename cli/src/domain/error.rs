//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

use crate::domain::instance::InstanceId;

// ── Fleet errors ──────────────────────────────────────────────────────────────

/// Errors raised while provisioning, tunneling, logging, or tearing down
/// fleet instances.
///
/// Only [`FleetError::LogWriteFailed`] is fatal to the whole process. Every
/// other variant is contained to the flow (or teardown step) that raised it.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("provider rejected instance creation: {0}")]
    ProviderRejected(String),

    #[error("address lookup failed for instance {id}: {reason}")]
    LookupFailed { id: InstanceId, reason: String },

    #[error("tunnel to {address} on local port {port} failed after {attempts} attempt(s): {reason}")]
    TunnelSetupFailed {
        address: String,
        port: u16,
        attempts: u32,
        reason: String,
    },

    #[error("cannot write fleet record log: {0}")]
    LogWriteFailed(String),

    #[error("failed to kill tunnel for instance {id}: {reason}")]
    KillFailed { id: InstanceId, reason: String },

    #[error("failed to destroy instance {id}: {reason}")]
    DestroyFailed { id: InstanceId, reason: String },

    #[error("wait cancelled")]
    Cancelled,

    #[error("fleet is shutting down; instance {0} was not published")]
    FleetClosed(InstanceId),

    #[error("interrupted by operator; fleet torn down")]
    Interrupted,
}

impl FleetError {
    /// Returns `true` for errors that must terminate the whole process.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LogWriteFailed(_))
    }
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to fleet configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("fleet size must be at least 1")]
    EmptyFleet,

    #[error("at least one region is required")]
    NoRegions,

    #[error("{0} must not be empty")]
    MissingValue(&'static str),

    #[error("tunnel attempts must be at least 1")]
    NoAttempts,

    #[error("Environment variable {0} not set.")]
    MissingCredential(&'static str),
}
