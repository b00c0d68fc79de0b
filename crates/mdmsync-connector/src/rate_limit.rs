//! Sliding-window rate limiting for outbound requests.
//!
//! - [`RateLimiter`]: at most `max_requests` inside any `time_window`
//! - [`AdaptiveRateLimiter`]: shrinks the limit on errors and grows it back
//!   after a streak of successes
//! - [`BurstRateLimiter`]: a sustained window combined with a short burst window
//!
//! All limiters are safe to share between tasks; the prune-check-record
//! sequence runs under one async mutex.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

/// Sliding-window rate limiter.
pub struct RateLimiter {
    /// Effective limit. Adjusted at runtime by [`AdaptiveRateLimiter`].
    max_requests: AtomicU32,
    time_window: Duration,
    /// Timestamps of the requests recorded inside the current window, oldest first.
    window: Mutex<VecDeque<Instant>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests())
            .field("time_window", &self.time_window)
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests` per `time_window`.
    ///
    /// A limit of zero is raised to one.
    #[must_use]
    pub fn new(max_requests: u32, time_window: Duration) -> Self {
        Self {
            max_requests: AtomicU32::new(max_requests.max(1)),
            time_window,
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Create a limiter for N requests per minute.
    #[must_use]
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self::new(requests_per_minute, Duration::from_secs(60))
    }

    /// Current effective limit.
    #[must_use]
    pub fn max_requests(&self) -> u32 {
        self.max_requests.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn time_window(&self) -> Duration {
        self.time_window
    }

    fn set_max_requests(&self, max_requests: u32) {
        self.max_requests.store(max_requests.max(1), Ordering::Release);
    }

    /// Wait until one more request fits in the window, then record it.
    ///
    /// Waiters are served in the order they reached the internal lock.
    pub async fn acquire(&self) {
        let mut window = self.window.lock().await;

        loop {
            let now = Instant::now();
            prune(&mut window, now, self.time_window);

            let wait = wait_needed(&window, now, self.time_window, self.max_requests());
            if wait.is_zero() {
                window.push_back(now);
                return;
            }

            trace!(
                wait_ms = wait.as_millis() as u64,
                in_window = window.len(),
                "Rate limit reached, waiting for window to slide"
            );
            sleep(wait).await;
        }
    }

    /// Whether a request could be issued right now without waiting.
    pub async fn can_proceed(&self) -> bool {
        let mut window = self.window.lock().await;
        prune(&mut window, Instant::now(), self.time_window);
        window.len() < self.max_requests() as usize
    }

    /// How long a caller would currently have to wait. Zero when it can proceed.
    pub async fn wait_time(&self) -> Duration {
        let mut window = self.window.lock().await;
        let now = Instant::now();
        prune(&mut window, now, self.time_window);
        wait_needed(&window, now, self.time_window, self.max_requests())
    }

    /// Number of requests recorded in the current window.
    pub async fn current_usage(&self) -> usize {
        let mut window = self.window.lock().await;
        prune(&mut window, Instant::now(), self.time_window);
        window.len()
    }

    /// Usage of the current window as a percentage of the effective limit.
    pub async fn usage_percentage(&self) -> f64 {
        let usage = self.current_usage().await;
        usage as f64 / f64::from(self.max_requests()) * 100.0
    }

    /// Forget every recorded request.
    pub async fn reset(&self) {
        self.window.lock().await.clear();
    }
}

/// Drop timestamps that have left the window.
fn prune(window: &mut VecDeque<Instant>, now: Instant, time_window: Duration) {
    while let Some(oldest) = window.front() {
        if now.duration_since(*oldest) >= time_window {
            window.pop_front();
        } else {
            break;
        }
    }
}

/// Time until the window has room for one more request.
fn wait_needed(
    window: &VecDeque<Instant>,
    now: Instant,
    time_window: Duration,
    max_requests: u32,
) -> Duration {
    let max = max_requests as usize;
    if window.len() < max {
        return Duration::ZERO;
    }
    // After a backoff the window can hold more than `max`; the entry that has
    // to expire is the one that would leave exactly `max - 1` behind it.
    let blocking = window[window.len() - max];
    time_window.saturating_sub(now.duration_since(blocking))
}

/// Consecutive outcome counters for [`AdaptiveRateLimiter`].
#[derive(Debug, Default)]
struct Streaks {
    consecutive_errors: u32,
    consecutive_successes: u32,
}

/// Rate limiter that slows down when the remote side struggles.
///
/// `report_error` multiplies the limit by `backoff_factor` (floored at 1);
/// every `recovery_threshold` consecutive `report_success` calls multiply it
/// by `recovery_factor`, capped at the configured limit.
pub struct AdaptiveRateLimiter {
    limiter: RateLimiter,
    original_max: u32,
    backoff_factor: f64,
    recovery_factor: f64,
    recovery_threshold: u32,
    streaks: StdMutex<Streaks>,
}

impl std::fmt::Debug for AdaptiveRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveRateLimiter")
            .field("limiter", &self.limiter)
            .field("original_max", &self.original_max)
            .field("backoff_factor", &self.backoff_factor)
            .field("recovery_factor", &self.recovery_factor)
            .finish()
    }
}

/// Default multiplier applied on error.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 0.5;
/// Default multiplier applied after a success streak.
pub const DEFAULT_RECOVERY_FACTOR: f64 = 1.1;
/// Consecutive successes required before recovering.
pub const DEFAULT_RECOVERY_THRESHOLD: u32 = 5;

impl AdaptiveRateLimiter {
    /// Create an adaptive limiter with the default factors (0.5 / 1.1 / 5).
    #[must_use]
    pub fn new(max_requests: u32, time_window: Duration) -> Self {
        Self::with_factors(
            max_requests,
            time_window,
            DEFAULT_BACKOFF_FACTOR,
            DEFAULT_RECOVERY_FACTOR,
        )
    }

    /// Create an adaptive limiter with custom factors.
    ///
    /// `backoff_factor` is clamped into `(0, 1)` and `recovery_factor` to `> 1`.
    #[must_use]
    pub fn with_factors(
        max_requests: u32,
        time_window: Duration,
        backoff_factor: f64,
        recovery_factor: f64,
    ) -> Self {
        let limiter = RateLimiter::new(max_requests, time_window);
        let original_max = limiter.max_requests();
        Self {
            limiter,
            original_max,
            backoff_factor: backoff_factor.clamp(0.01, 0.99),
            recovery_factor: recovery_factor.max(1.01),
            recovery_threshold: DEFAULT_RECOVERY_THRESHOLD,
            streaks: StdMutex::new(Streaks::default()),
        }
    }

    /// Underlying sliding window.
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub async fn acquire(&self) {
        self.limiter.acquire().await;
    }

    pub async fn can_proceed(&self) -> bool {
        self.limiter.can_proceed().await
    }

    pub async fn wait_time(&self) -> Duration {
        self.limiter.wait_time().await
    }

    /// Current effective limit.
    #[must_use]
    pub fn max_requests(&self) -> u32 {
        self.limiter.max_requests()
    }

    /// Configured limit the limiter recovers towards.
    #[must_use]
    pub fn original_max_requests(&self) -> u32 {
        self.original_max
    }

    #[must_use]
    pub fn consecutive_errors(&self) -> u32 {
        self.streaks().consecutive_errors
    }

    #[must_use]
    pub fn consecutive_successes(&self) -> u32 {
        self.streaks().consecutive_successes
    }

    /// Record a failed call and shrink the limit.
    pub fn report_error(&self) {
        let mut streaks = self.streaks();
        streaks.consecutive_errors = streaks.consecutive_errors.saturating_add(1);
        streaks.consecutive_successes = 0;

        let previous = self.limiter.max_requests();
        let reduced = (f64::from(previous) * self.backoff_factor).floor() as u32;
        let next = reduced.max(1);
        self.limiter.set_max_requests(next);

        debug!(
            previous,
            next,
            consecutive_errors = streaks.consecutive_errors,
            "Rate limit reduced after error"
        );
    }

    /// Record a successful call; grows the limit after a streak.
    pub fn report_success(&self) {
        let mut streaks = self.streaks();
        streaks.consecutive_successes = streaks.consecutive_successes.saturating_add(1);
        streaks.consecutive_errors = 0;

        if streaks.consecutive_successes < self.recovery_threshold {
            return;
        }
        streaks.consecutive_successes = 0;

        let previous = self.limiter.max_requests();
        if previous >= self.original_max {
            return;
        }
        let grown = (f64::from(previous) * self.recovery_factor).floor() as u32;
        let next = grown.min(self.original_max).max(1);
        if next == previous {
            return;
        }
        self.limiter.set_max_requests(next);

        debug!(previous, next, "Rate limit recovered after success streak");
    }

    /// Restore the configured limit, clear the streaks and the window.
    pub async fn reset_to_original(&self) {
        {
            let mut streaks = self.streaks();
            *streaks = Streaks::default();
        }
        self.limiter.set_max_requests(self.original_max);
        self.limiter.reset().await;
    }

    fn streaks(&self) -> std::sync::MutexGuard<'_, Streaks> {
        self.streaks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Limiter that enforces a sustained rate and a short-term burst rate at once.
#[derive(Debug)]
pub struct BurstRateLimiter {
    sustained: RateLimiter,
    burst: RateLimiter,
    gate: Mutex<()>,
}

/// Usage of both windows of a [`BurstRateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstUsage {
    pub sustained: usize,
    pub burst: usize,
}

impl BurstRateLimiter {
    /// `sustained_rate` per `time_window`, and at most `burst_rate` per `burst_duration`.
    #[must_use]
    pub fn new(
        sustained_rate: u32,
        time_window: Duration,
        burst_rate: u32,
        burst_duration: Duration,
    ) -> Self {
        Self {
            sustained: RateLimiter::new(sustained_rate, time_window),
            burst: RateLimiter::new(burst_rate, burst_duration),
            gate: Mutex::new(()),
        }
    }

    pub async fn acquire(&self) {
        let _gate = self.gate.lock().await;
        self.sustained.acquire().await;
        self.burst.acquire().await;
    }

    pub async fn can_proceed(&self) -> bool {
        self.sustained.can_proceed().await && self.burst.can_proceed().await
    }

    pub async fn wait_time(&self) -> Duration {
        let sustained = self.sustained.wait_time().await;
        let burst = self.burst.wait_time().await;
        sustained.max(burst)
    }

    pub async fn current_usage(&self) -> BurstUsage {
        BurstUsage {
            sustained: self.sustained.current_usage().await,
            burst: self.burst.current_usage().await,
        }
    }

    pub async fn reset(&self) {
        self.sustained.reset().await;
        self.burst.reset().await;
    }
}
