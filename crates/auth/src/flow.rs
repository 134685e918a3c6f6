//! Interactive device-flow login driven from the command line.

use ghgate_types::{DeviceAuthorization, GateError, PendingReason, traits::Result};
use std::time::Duration;

use crate::{DeviceFlowService, DeviceFlowStatus};

/// Seconds added to the polling interval on `slow_down` (RFC 8628 §3.5).
pub const SLOW_DOWN_STEP_SECS: u64 = 5;

/// Lower bound on the polling interval, whatever the server sends.
pub const MIN_POLL_INTERVAL_SECS: u64 = 1;

/// Run the full device flow for `credential_id`, polling until the user
/// authorizes, the server denies, or the device code expires.
///
/// `prompt` is called once with the user code and verification URI.
///
/// # Errors
///
/// Propagates errors from [`DeviceFlowService::start`] and
/// [`DeviceFlowService::poll`], and returns [`GateError::Auth`] when the
/// device code expires before authorization.
pub async fn login<F>(service: &DeviceFlowService, credential_id: &str, prompt: F) -> Result<()>
where
    F: FnOnce(&DeviceAuthorization),
{
    let started = service.start(credential_id).await?;
    let authorization = started.authorization;
    prompt(&authorization);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(authorization.expires_in);
    let mut interval = authorization.interval.max(MIN_POLL_INTERVAL_SECS);

    loop {
        tokio::time::sleep(Duration::from_secs(interval)).await;

        match service.poll(credential_id, &authorization.device_code).await? {
            DeviceFlowStatus::Authorized { .. } => return Ok(()),
            DeviceFlowStatus::Pending {
                reason,
                interval: server_interval,
                ..
            } => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(GateError::Auth("device code expired".into()));
                }
                interval = next_interval(interval, reason, server_interval);
            }
        }
    }
}

/// Interval for the next poll. A server-supplied interval wins, but never
/// drops below [`MIN_POLL_INTERVAL_SECS`].
#[must_use]
pub fn next_interval(current: u64, reason: PendingReason, server: Option<u64>) -> u64 {
    let secs = match (reason, server) {
        (_, Some(secs)) => secs,
        (PendingReason::SlowDown, None) => current + SLOW_DOWN_STEP_SECS,
        (PendingReason::AuthorizationPending, None) => current,
    };
    secs.max(MIN_POLL_INTERVAL_SECS)
}
