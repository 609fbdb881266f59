//! Shared application state for Axum handlers.
//!
//! - **Services**: [`MessageService`] wrapping the WhatsApp client
//! - **Rate limiter**: the sliding-window store shared with the middleware
//! - **Auth failures**: brute-force budgets shared with the auth middleware
//! - **Configuration**: immutable, behind an `Arc`
//!
//! # Structured Concurrency
//!
//! The sweep (idle rate limit clients, lifted auth blocks) runs under a `tokio_util::task::TaskTracker` and
//! stops on a `CancellationToken`. Call `shutdown()` to stop it before exit.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middleware::{AuthFailureTracker, SlidingWindowLimiter};
use crate::provider::WhatsAppClient;
use crate::services::MessageService;

/// Shared application state for Axum handlers.
///
/// Cloned for each request; all internal data is behind `Arc`.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(config)?;
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Message sending service
    pub messages: MessageService,
    /// Per-client rate limiter (None = rate limiting disabled)
    pub limiter: Option<Arc<SlidingWindowLimiter>>,
    /// Auth failure budgets and blocks
    pub auth_failures: Arc<AuthFailureTracker>,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Application configuration
    pub config: Arc<Config>,
    /// Tracks spawned background tasks for graceful shutdown
    task_tracker: TaskTracker,
    /// Cancellation token for signaling background tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Build state from configuration.
    ///
    /// Spawns the sweep when `rate_limit_sweep_interval` is non-zero, so this
    /// must run inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the provider client or limiter
    /// cannot be built from `config`.
    pub fn new(config: Config) -> AppResult<Self> {
        let client = WhatsAppClient::new(&config)?;
        let messages = MessageService::new(client, config.default_language_code.as_str());

        let limiter = match NonZeroU32::new(config.rate_limit_max_requests) {
            Some(max) => Some(Arc::new(
                SlidingWindowLimiter::new(max, config.rate_limit_window)
                    .map_err(|e| AppError::ConfigError(e.to_string()))?,
            )),
            None => None,
        };

        let state = Self {
            messages,
            limiter,
            auth_failures: Arc::new(AuthFailureTracker::new()),
            started_at: Instant::now(),
            config: Arc::new(config),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_sweep_task();

        Ok(state)
    }

    /// Spawn the periodic eviction of idle clients and lifted auth blocks.
    ///
    /// Pruning on access keeps each log short but never drops a key; this
    /// task bounds the number of keys.
    fn spawn_sweep_task(&self) {
        let limiter = self.limiter.clone();
        let auth_failures = self.auth_failures.clone();
        let period = self.config.rate_limit_sweep_interval;
        if period.is_zero() {
            debug!("Sweep disabled");
            return;
        }

        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Sweep received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        // Tokio's clock, which tests may pause
                        let now = tokio::time::Instant::now().into_std();
                        if let Some(limiter) = &limiter {
                            sweep(limiter, now);
                        }
                        sweep_auth_failures(&auth_failures, now);
                    }
                }
            }

            debug!("Sweep shutting down");
        });
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// 1. Signals all tasks to stop via cancellation token
    /// 2. Closes the task tracker (prevents new tasks)
    /// 3. Waits for all tasks to complete
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Rate limit window, if rate limiting is on.
    pub fn rate_limit_window(&self) -> Option<Duration> {
        self.limiter.as_ref().map(|l| l.window())
    }
}

/// One eviction pass.
fn sweep(limiter: &SlidingWindowLimiter, now: Instant) -> usize {
    let evicted = limiter.evict_idle(now);
    let remaining = limiter.tracked_identities();

    metrics::record_rate_limit_evictions(evicted as u64);
    metrics::set_tracked_clients(remaining);

    if evicted > 0 {
        debug!(evicted, remaining, "Evicted idle rate limit clients");
    }
    evicted
}

/// Drop lifted auth blocks and refilled failure budgets.
fn sweep_auth_failures(failures: &AuthFailureTracker, now: Instant) -> usize {
    let evicted = failures.evict_expired(now);
    if evicted > 0 {
        debug!(
            evicted,
            blocked = failures.blocked_clients(),
            tracked = failures.tracked_clients(),
            "Evicted lifted auth blocks"
        );
    }
    evicted
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_with_rate_limiting() {
        let state = AppState::new(Config::default()).unwrap();

        assert!(state.limiter.is_some());
        assert_eq!(state.rate_limit_window(), Some(Duration::from_secs(60)));
        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_state_without_rate_limiting() {
        let config = Config {
            rate_limit_max_requests: 0,
            ..Config::default()
        };
        let state = AppState::new(config).unwrap();

        assert!(state.limiter.is_none());
        state.shutdown().await;
    }

    #[test]
    fn test_sweep_evicts_idle_clients() {
        let limiter =
            SlidingWindowLimiter::new(NonZeroU32::new(3).unwrap(), Duration::from_secs(1))
                .unwrap();
        let start = Instant::now();
        limiter.check_and_record("a", start);
        limiter.check_and_record("b", start);

        assert_eq!(sweep(&limiter, start), 0);
        assert_eq!(sweep(&limiter, start + Duration::from_secs(1)), 2);
        assert_eq!(limiter.tracked_identities(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_task_runs_and_stops() {
        let config = Config {
            rate_limit_window: Duration::from_secs(1),
            rate_limit_sweep_interval: Duration::from_secs(5),
            ..Config::default()
        };
        let state = AppState::new(config).unwrap();
        let limiter = state.limiter.clone().unwrap();

        limiter.check_and_record("idle", Instant::now());
        assert_eq!(limiter.tracked_identities(), 1);

        // Paused clock: sleeping auto-advances past one sweep period
        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        state.shutdown().await;
        assert_eq!(limiter.tracked_identities(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_task_drops_lifted_auth_blocks() {
        let config = Config {
            rate_limit_sweep_interval: Duration::from_secs(10),
            ..Config::default()
        };
        let state = AppState::new(config).unwrap();

        // Burst of 5, so the sixth failure blocks for one refill (6s)
        for _ in 0..6 {
            state.auth_failures.record_failure("198.51.100.9".to_string());
        }
        assert_eq!(state.auth_failures.blocked_clients(), 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;

        state.shutdown().await;
        assert_eq!(state.auth_failures.blocked_clients(), 0);
    }

    #[tokio::test]
    async fn test_sweep_runs_without_rate_limiting() {
        let config = Config {
            rate_limit_max_requests: 0,
            rate_limit_sweep_interval: Duration::from_secs(1),
            ..Config::default()
        };
        let state = AppState::new(config).unwrap();

        assert!(state.limiter.is_none());
        assert_eq!(sweep_auth_failures(&state.auth_failures, Instant::now()), 0);
        state.shutdown().await;
    }
}
