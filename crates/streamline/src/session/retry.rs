use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Shortest period the timer runs at. Shorter periods are raised to it.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// A fixed-rate timer whose first tick fires immediately.
///
/// The timer stops when cancelled, when dropped, or when `on_tick` returns
/// `false`.
#[derive(Debug)]
pub struct RetryTimer {
    token: CancellationToken,
}

impl RetryTimer {
    pub fn start<F>(period: Duration, token: CancellationToken, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        if period < MIN_PERIOD {
            tracing::warn!(?period, "Retry period too short, using {MIN_PERIOD:?}");
        }
        let period = period.max(MIN_PERIOD);
        let task_token = token.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = interval.tick() => {
                        if !on_tick() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Retry timer stopped");
        });

        Self { token }
    }

    /// Stops the timer. Cancelling twice is harmless.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
