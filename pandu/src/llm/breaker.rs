//! Per-model circuit breaker: closed → open → half-open state machine.
//!
//! Opens after N consecutive failures, waits out a timeout, then admits
//! probe calls in half-open; M successes close it again, one failure
//! reopens. All transitions happen under the caller's lock.

use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    success_threshold: u32,
    open_timeout: Duration,
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, success_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            success_threshold,
            open_timeout,
            state: BreakerState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            opened_at: None,
        }
    }

    /// Current state after applying the open→half-open timeout transition.
    pub fn state(&mut self) -> BreakerState {
        if self.state == BreakerState::Open {
            let elapsed = self.opened_at.map(|t| t.elapsed()).unwrap_or_default();
            if elapsed >= self.open_timeout {
                self.state = BreakerState::HalfOpen;
                self.half_open_successes = 0;
            }
        }
        self.state
    }

    /// True when calls must be skipped.
    pub fn is_open(&mut self) -> bool {
        self.state() == BreakerState::Open
    }

    pub fn record_success(&mut self) {
        match self.state() {
            BreakerState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= self.success_threshold {
                    self.state = BreakerState::Closed;
                    self.consecutive_failures = 0;
                    self.opened_at = None;
                }
            }
            _ => {
                self.consecutive_failures = 0;
            }
        }
    }

    pub fn record_failure(&mut self) {
        match self.state() {
            BreakerState::HalfOpen => self.trip(),
            BreakerState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    self.trip();
                }
            }
            BreakerState::Open => {}
        }
    }

    fn trip(&mut self) {
        self.state = BreakerState::Open;
        self.opened_at = Some(Instant::now());
        self.half_open_successes = 0;
    }

    /// Forces the open→half-open transition, for tests.
    #[cfg(test)]
    fn force_half_open(&mut self) {
        self.opened_at = Some(Instant::now() - self.open_timeout);
    }
}
