//! JSON output helpers for `--json` code paths.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::domain::{ConfigError, FleetError, InstanceSummary};

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Stable machine-readable code for a top-level error.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    if let Some(fleet) = err.downcast_ref::<FleetError>() {
        return match fleet {
            FleetError::ProviderRejected(_) => "PROVIDER_REJECTED",
            FleetError::LookupFailed { .. } => "LOOKUP_FAILED",
            FleetError::TunnelSetupFailed { .. } => "TUNNEL_SETUP_FAILED",
            FleetError::LogWriteFailed(_) => "LOG_WRITE_FAILED",
            FleetError::KillFailed { .. } => "KILL_FAILED",
            FleetError::DestroyFailed { .. } => "DESTROY_FAILED",
            FleetError::Cancelled => "CANCELLED",
            FleetError::FleetClosed(_) => "FLEET_CLOSED",
            FleetError::Interrupted => "INTERRUPTED",
        };
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return "CONFIG_INVALID";
    }
    "ERROR"
}

#[derive(Serialize)]
struct RecordView<'a> {
    #[serde(flatten)]
    record: &'a InstanceSummary,
    proxy: String,
}

/// Format records as a JSON array, each entry carrying its proxy URL.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_records(records: &[InstanceSummary]) -> Result<String> {
    let views: Vec<RecordView<'_>> = records
        .iter()
        .map(|record| RecordView {
            record,
            proxy: record.proxy_url(),
        })
        .collect();
    serde_json::to_string_pretty(&views).context("JSON serialization failed")
}
