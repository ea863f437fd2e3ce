//! Retry timing and per-host circuit breaking for the fetcher

use crate::config::NetworkConfig;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Jitter as a fraction of the delay (0.0 - 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&NetworkConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            backoff_multiplier: 2.0,
            jitter_factor: config.jitter,
        }
    }

    /// Calculates the delay after failed attempt number `attempt` (1-based)
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());

        let jitter_range = capped * self.jitter_factor;
        let final_backoff = if jitter_range > 0.0 {
            let jitter = rand::random_range(-jitter_range..jitter_range);
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(final_backoff)
    }

    /// Whether another attempt is allowed after `attempt` attempts
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[derive(Debug, Default)]
struct HostCircuit {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Stops requests to a host after repeated transport failures
///
/// After `threshold` consecutive failures the host's circuit opens for
/// `cooldown`; requests made while it is open fail without touching the
/// network. The first success closes it again.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    hosts: Mutex<HashMap<String, HostCircuit>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(
            config.breaker_threshold,
            Duration::from_secs(config.breaker_cooldown_secs),
        )
    }

    /// Returns the remaining open time if requests to `host` are blocked
    pub fn check(&self, host: &str) -> Option<Duration> {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        let circuit = hosts.get_mut(host)?;
        let open_until = circuit.open_until?;

        let now = Instant::now();
        if now < open_until {
            Some(open_until - now)
        } else {
            // Half-open: the next request tries the host again
            circuit.open_until = None;
            None
        }
    }

    pub fn record_success(&self, host: &str) {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts.remove(host);
    }

    /// Records a failure; returns true if this failure opened the circuit
    pub fn record_failure(&self, host: &str) -> bool {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        let circuit = hosts.entry(host.to_string()).or_default();
        circuit.consecutive_failures += 1;

        if circuit.consecutive_failures >= self.threshold && circuit.open_until.is_none() {
            circuit.open_until = Some(Instant::now() + self.cooldown);
            circuit.consecutive_failures = 0;
            tracing::warn!(
                "Circuit opened for {} for {:?} after {} failures",
                host,
                self.cooldown,
                self.threshold
            );
            return true;
        }

        false
    }
}
