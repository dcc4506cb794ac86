use std::time::Duration;

/// Delay before reconnect attempt number `attempt` (1-based).
///
/// Linear backoff: `base * attempt`. Attempt 0 means "connect now".
pub fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}
