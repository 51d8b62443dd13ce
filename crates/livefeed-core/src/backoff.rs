//! Reconnect backoff policy and the single-slot retry timer.
//!
//! [`BackoffPolicy`] computes the delay before the Nth reconnect attempt
//! as `min(base * multiplier^attempt, max)` with optional jitter.
//! [`RetryTimer`] is the cancellable deferred-task primitive the
//! supervisor arms with that delay; arming implicitly cancels any prior
//! slot, so at most one retry is ever pending per subscription.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// BackoffPolicy
// ---------------------------------------------------------------------------

/// Bounded exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Maximum reconnect attempts before the subscription is exhausted.
    pub max_attempts: u32,
    /// Delay before the first retry (attempt index 0).
    pub base_delay: Duration,
    /// Upper bound on any computed delay.
    pub max_delay: Duration,
    /// Backoff multiplier applied per attempt.
    pub multiplier: f64,
    /// Jitter factor (0.0-1.0) to spread reconnects; 0 disables jitter.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }
}

impl BackoffPolicy {
    /// Creates a policy with the given attempt cap and bounds, doubling
    /// per attempt and no jitter.
    #[must_use]
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    /// Sets the jitter factor, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Computes the delay before the given reconnect attempt (0-indexed:
    /// attempt 0 is the first retry after the first failure).
    ///
    /// Without jitter the delay is exactly
    /// `min(base * multiplier^attempt, max)` and therefore non-decreasing
    /// in `attempt`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // attempt count stays far below i32::MAX
    #[allow(clippy::cast_possible_wrap)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = if self.jitter > 0.0 {
            // Deterministic spread based on the attempt index; a proper
            // RNG is overkill for reconnect pacing.
            let pseudo = ((f64::from(attempt) * 0.618_033_988_749_895) % 1.0).mul_add(2.0, -1.0);
            capped + capped * self.jitter * pseudo
        } else {
            capped
        };

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

// ---------------------------------------------------------------------------
// RetryTimer
// ---------------------------------------------------------------------------

/// A single-slot, cancellable retry timer.
///
/// The slot holds at most one pending sleep task. [`arm`](Self::arm)
/// aborts whatever was pending before spawning the new sleep, so a
/// failure streak never accumulates more than one scheduled retry.
/// Dropping the timer cancels the slot.
///
/// Aborting a sleep task cannot unsend a fire message it already queued,
/// so every fire carries a generation number and consumers check it with
/// [`is_current`](Self::is_current); arming or cancelling bumps the
/// generation, invalidating any in-flight fire from a superseded slot.
#[derive(Debug, Default)]
pub struct RetryTimer {
    slot: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
}

impl RetryTimer {
    /// Creates an empty timer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the timer: after `delay`, the slot's generation number is
    /// sent on `fire`. Any previously armed slot is cancelled first.
    ///
    /// Must be called within a tokio runtime.
    pub fn arm(&self, delay: Duration, fire: mpsc::UnboundedSender<u64>) {
        let mut slot = self.slot.lock();
        if let Some(prior) = slot.take() {
            prior.abort();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the subscription is tearing down.
            let _ = fire.send(generation);
        }));
    }

    /// Cancels the pending slot, if any. Idempotent. Also invalidates a
    /// fire the slot managed to queue before the abort landed.
    pub fn cancel(&self) {
        let mut slot = self.slot.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(prior) = slot.take() {
            prior.abort();
        }
    }

    /// Returns `true` if `generation` belongs to the live slot rather
    /// than one that was re-armed or cancelled after firing.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Returns `true` if a retry is currently scheduled.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.slot.lock().as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
