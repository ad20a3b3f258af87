//! `proxyfleet version` — print the crate version.

use anyhow::Result;

use crate::app::AppContext;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Print the version, as `{"version": "..."}` in JSON mode.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn run(app: &AppContext) -> Result<()> {
    if app.is_json() {
        let obj = serde_json::json!({ "version": VERSION });
        println!("{}", serde_json::to_string(&obj)?);
    } else {
        println!("proxyfleet {VERSION}");
    }
    Ok(())
}
