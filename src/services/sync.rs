use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::RetryPolicy;
use crate::services::calendar::{CalendarSync, SyncOperation};

/// Fire-and-forget calendar push, run after the booking has committed.
/// The handle resolves to whether the push eventually succeeded; callers on
/// the request path drop it.
pub fn dispatch_push(
    calendar: Arc<dyn CalendarSync>,
    policy: RetryPolicy,
    appointment_id: String,
    staff_id: String,
    operation: SyncOperation,
) -> JoinHandle<bool> {
    tokio::spawn(async move {
        push_with_retry(calendar.as_ref(), policy, &appointment_id, &staff_id, operation).await
    })
}

pub async fn push_with_retry(
    calendar: &dyn CalendarSync,
    policy: RetryPolicy,
    appointment_id: &str,
    staff_id: &str,
    operation: SyncOperation,
) -> bool {
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match calendar
            .push_appointment_sync(appointment_id, staff_id, operation)
            .await
        {
            Ok(()) => {
                tracing::debug!(appointment_id, staff_id, attempt, op = operation.as_str(), "calendar push done");
                return true;
            }
            Err(e) if attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    appointment_id,
                    staff_id,
                    attempt,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "calendar push failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(
                    appointment_id,
                    staff_id,
                    attempts = max_attempts,
                    op = operation.as_str(),
                    error = %e,
                    "calendar push abandoned"
                );
            }
        }
    }
    false
}
