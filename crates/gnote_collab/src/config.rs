//! Collaboration session configuration: peer reconnect backoff and the
//! periodic crash-safety snapshot interval. Hosts build this from
//! whatever config layer they have; this crate never reads the
//! environment or a file itself.

use serde::{Deserialize, Serialize};

/// Reconnect backoff for the peer transport. Mirrors
/// `gnote_sync::config::RetryConfig`'s shape (same base/cap/jitter
/// formula) — duplicated rather than shared so this crate stays
/// decoupled from `gnote_sync`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Whether to automatically reconnect on an unexpected disconnect.
    pub enabled: bool,
    /// Base delay before the first reconnect attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on the computed delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Symmetric jitter fraction applied to the computed delay.
    pub jitter_fraction: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            enabled: true,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_fraction: 0.25,
        }
    }
}

impl ReconnectConfig {
    /// Compute the backoff delay for the given 1-indexed attempt number,
    /// before jitter.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> u64 {
        let attempt = attempt.max(1);
        let shift = attempt.saturating_sub(1).min(32);
        let scaled = self.base_delay_ms.saturating_mul(1u64 << shift);
        scaled.min(self.max_delay_ms)
    }

    /// Compute the jittered delay for the given attempt.
    pub fn delay_for_attempt(&self, attempt: u32, jitter: f64) -> std::time::Duration {
        let base = self.base_delay_for_attempt(attempt) as f64;
        let jitter = jitter.clamp(-1.0, 1.0);
        let perturbed = base * (1.0 + jitter * self.jitter_fraction);
        std::time::Duration::from_millis(perturbed.max(0.0) as u64)
    }
}

/// Top-level collaboration session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollabConfig {
    /// Peer transport reconnect policy.
    pub reconnect: ReconnectConfig,
    /// Conservative interval at which the host projects and persists a
    /// periodic snapshot for crash safety, even while the session stays
    /// open, in milliseconds.
    pub periodic_snapshot_ms: u64,
}

impl Default for CollabConfig {
    fn default() -> Self {
        CollabConfig {
            reconnect: ReconnectConfig::default(),
            periodic_snapshot_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let retry = ReconnectConfig::default();
        assert_eq!(retry.base_delay_for_attempt(1), 500);
        assert_eq!(retry.base_delay_for_attempt(4), 4_000);
        assert_eq!(retry.base_delay_for_attempt(100), 30_000);
    }
}
