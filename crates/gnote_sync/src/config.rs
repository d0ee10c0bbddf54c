//! Sync engine configuration: debounce, retry backoff and request
//! timeout knobs. Hosts build this from whatever config layer they have;
//! this crate never reads it from the environment.

use serde::{Deserialize, Serialize};

/// Retry/backoff policy shared by the Sync Engine's op retries and (via
/// `gnote_collab`) the collaboration peer provider's reconnect loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Base delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on the computed delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Symmetric jitter fraction applied to the computed delay (0.25 == ±25%).
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_fraction: 0.25,
        }
    }
}

impl RetryConfig {
    /// Compute the backoff delay for the given 1-indexed attempt number,
    /// before jitter: `min(base * 2^(attempt-1), max)`.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> u64 {
        let attempt = attempt.max(1);
        let shift = attempt.saturating_sub(1).min(32);
        let scaled = self.base_delay_ms.saturating_mul(1u64 << shift);
        scaled.min(self.max_delay_ms)
    }

    /// Compute the jittered delay for the given attempt, using `jitter`
    /// (a caller-supplied value in `[-1.0, 1.0]`, typically drawn from a
    /// uniform distribution) to perturb the base delay by up to
    /// `jitter_fraction`.
    pub fn delay_for_attempt(&self, attempt: u32, jitter: f64) -> std::time::Duration {
        let base = self.base_delay_for_attempt(attempt) as f64;
        let jitter = jitter.clamp(-1.0, 1.0);
        let perturbed = base * (1.0 + jitter * self.jitter_fraction);
        std::time::Duration::from_millis(perturbed.max(0.0) as u64)
    }
}

/// Top-level Sync Engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncEngineConfig {
    /// How long after a "dirty mark" (autosave → queue) before a cycle
    /// is triggered, in milliseconds.
    pub sync_debounce_ms: u64,
    /// Default timeout for any single remote call, in milliseconds.
    pub request_timeout_ms: u64,
    /// Retry/backoff policy for retryable op failures.
    pub retry: RetryConfig,
    /// Consecutive reconcile failures for the same note, past which the
    /// health tracker escalates from skipping that note for the cycle to
    /// discarding its shadow so the next cycle re-pulls it from scratch.
    pub reconcile_failure_threshold: u32,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        SyncEngineConfig {
            sync_debounce_ms: 1_000,
            request_timeout_ms: 30_000,
            retry: RetryConfig::default(),
            reconcile_failure_threshold: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let retry = RetryConfig::default();
        assert_eq!(retry.base_delay_for_attempt(1), 500);
        assert_eq!(retry.base_delay_for_attempt(2), 1_000);
        assert_eq!(retry.base_delay_for_attempt(3), 2_000);
        assert_eq!(retry.base_delay_for_attempt(4), 4_000);
        assert_eq!(retry.base_delay_for_attempt(10), 30_000);
        assert_eq!(retry.base_delay_for_attempt(100), 30_000);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let retry = RetryConfig::default();
        let base = retry.base_delay_for_attempt(3) as f64;
        let high = retry.delay_for_attempt(3, 1.0).as_millis() as f64;
        let low = retry.delay_for_attempt(3, -1.0).as_millis() as f64;
        assert!(high <= base * 1.25 + 1.0);
        assert!(low >= base * 0.75 - 1.0);
    }
}
