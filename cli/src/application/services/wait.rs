//! Timed waits that a cancellation token can cut short.

use std::time::Duration;

use tokio::task::yield_now;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::domain::FleetError;

/// Sleep for `delay`, returning early with [`FleetError::Cancelled`] if
/// `cancel` fires first. Without a token the wait cannot be interrupted.
///
/// # Errors
///
/// Returns [`FleetError::Cancelled`] when the token is (or becomes) cancelled.
pub async fn pause(delay: Duration, cancel: Option<&CancellationToken>) -> Result<(), FleetError> {
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(FleetError::Cancelled);
    }

    if delay.is_zero() {
        yield_now().await;
        return Ok(());
    }

    match cancel {
        Some(token) => tokio::select! {
            () = token.cancelled() => Err(FleetError::Cancelled),
            () = sleep(delay) => Ok(()),
        },
        None => {
            sleep(delay).await;
            Ok(())
        }
    }
}
