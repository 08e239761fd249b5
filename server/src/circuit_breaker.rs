//! Stops hammering the identity provider while it is failing.

use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    tripped: bool,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

pub struct CircuitBreaker {
    state: RwLock<BreakerState>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(BreakerState {
                tripped: false,
                consecutive_failures: 0,
                last_failure: None,
            }),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
        }
    }

    /// Open turns into half-open once the recovery timeout has passed since
    /// the last failure, letting a probe request through.
    pub async fn state(&self) -> CircuitState {
        let state = self.state.read().await;
        if !state.tripped {
            return CircuitState::Closed;
        }
        match state.last_failure {
            Some(at) if at.elapsed() >= self.recovery_timeout => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }

    pub async fn allow_request(&self) -> bool {
        self.state().await != CircuitState::Open
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        if state.tripped {
            tracing::info!("Identity verifier recovered, circuit closed");
        }
        state.tripped = false;
        state.consecutive_failures = 0;
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure = Some(Instant::now());

        if !state.tripped && state.consecutive_failures >= self.failure_threshold {
            state.tripped = true;
            tracing::warn!(
                failures = state.consecutive_failures,
                threshold = self.failure_threshold,
                "Identity verifier failing, circuit opened"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_closed() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(30));
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.allow_request().await);
    }

    #[tokio::test]
    async fn opens_after_threshold() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(30));

        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.allow_request().await);
    }

    #[tokio::test]
    async fn success_resets_failure_streak() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(30));

        cb.record_failure().await;
        cb.record_failure().await;
        cb.record_success().await;
        cb.record_failure().await;
        cb.record_failure().await;

        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_after_recovery_timeout() {
        let cb = CircuitBreaker::new(2, Duration::from_millis(10));

        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        assert!(cb.allow_request().await);

        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn failed_probe_reopens() {
        let cb = CircuitBreaker::new(2, Duration::from_millis(10));

        cb.record_failure().await;
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }
}
