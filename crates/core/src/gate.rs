//! Adaptive admission gate for a rate-limited downstream dependency.
//!
//! [`AdaptiveGate`] bounds how many calls may be in flight at once. The
//! bound itself moves: a congestion signal from downstream shrinks it
//! immediately ([`tighten`](AdaptiveGate::tighten)), while a streak of
//! successes grows it back one slot at a time
//! ([`mark_success`](AdaptiveGate::mark_success)) -- fast decrease, slow
//! additive recovery, applied to call admission.
//!
//! The gate is deliberately decoupled from any worker-pool size: the pool
//! bounds how many jobs run, the gate reacts to conditions only the
//! downstream dependency can signal.
//!
//! Internally a std mutex guards the counters and a `tokio::sync::watch`
//! channel provides the wake-up: every state change that could admit a
//! waiter bumps the channel, waking all waiters at once (a limit increase
//! can admit more than one). The handle is cheap to clone; clones share
//! one gate.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::error::CoreError;

/// Tunable bounds for an [`AdaptiveGate`].
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Floor for the admission limit.
    pub min_limit: usize,
    /// Ceiling for the admission limit.
    pub max_limit: usize,
    /// Limit at construction. Must lie within `[min_limit, max_limit]`.
    pub initial_limit: usize,
    /// Consecutive successes required before the limit grows by one.
    pub relax_threshold: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_limit: 1,
            max_limit: 8,
            initial_limit: 4,
            relax_threshold: 10,
        }
    }
}

struct GateState {
    limit: usize,
    active: usize,
    success_streak: u32,
}

struct Inner {
    config: GateConfig,
    state: Mutex<GateState>,
    wake_tx: watch::Sender<u64>,
}

/// Congestion-adaptive concurrency gate.
#[derive(Clone)]
pub struct AdaptiveGate {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AdaptiveGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveGate").finish_non_exhaustive()
    }
}

/// An admitted call. Dropping the permit releases the slot and wakes all
/// waiters.
pub struct GatePermit {
    gate: AdaptiveGate,
}

impl AdaptiveGate {
    /// Create a gate, validating `min <= initial <= max` and a non-zero floor.
    pub fn new(config: GateConfig) -> Result<Self, CoreError> {
        if config.min_limit == 0 {
            return Err(CoreError::Validation(
                "Gate min_limit must be at least 1".to_string(),
            ));
        }
        if config.min_limit > config.max_limit {
            return Err(CoreError::Validation(format!(
                "Gate min_limit {} exceeds max_limit {}",
                config.min_limit, config.max_limit
            )));
        }
        if config.initial_limit < config.min_limit || config.initial_limit > config.max_limit {
            return Err(CoreError::Validation(format!(
                "Gate initial_limit {} outside [{}, {}]",
                config.initial_limit, config.min_limit, config.max_limit
            )));
        }

        let (wake_tx, _) = watch::channel(0u64);
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(GateState {
                    limit: config.initial_limit,
                    active: 0,
                    success_streak: 0,
                }),
                config,
                wake_tx,
            }),
        })
    }

    /// Wait until a slot is free, then occupy it.
    ///
    /// Admission is strict: a call is admitted only while
    /// `active < current_limit`. Wake order among waiters is unspecified.
    pub async fn acquire(&self) -> GatePermit {
        let mut wake_rx = self.inner.wake_tx.subscribe();
        loop {
            {
                let mut state = self.inner.state.lock().expect("gate mutex poisoned");
                if state.active < state.limit {
                    state.active += 1;
                    return GatePermit { gate: self.clone() };
                }
            }
            // The subscription saw the current version before the check
            // above, so a release between check and await still resolves
            // immediately -- no missed wake-up.
            if wake_rx.changed().await.is_err() {
                // The sender lives inside `self.inner`; unreachable while
                // the gate exists.
                unreachable!("gate wake channel closed");
            }
        }
    }

    /// React to a congestion/overload signal: shrink the limit by `step`,
    /// floored at `min_limit`, and reset the success streak.
    pub fn tighten(&self, step: usize) {
        let mut state = self.inner.state.lock().expect("gate mutex poisoned");
        let new_limit = state
            .limit
            .saturating_sub(step)
            .max(self.inner.config.min_limit);
        if new_limit != state.limit {
            tracing::debug!(from = state.limit, to = new_limit, "Gate tightened");
        }
        state.limit = new_limit;
        state.success_streak = 0;
    }

    /// Record one successful downstream call. Every `relax_threshold`
    /// consecutive successes grow the limit by one, capped at `max_limit`.
    pub fn mark_success(&self) {
        let mut state = self.inner.state.lock().expect("gate mutex poisoned");
        state.success_streak += 1;
        if state.success_streak < self.inner.config.relax_threshold {
            return;
        }
        state.success_streak = 0;
        if state.limit < self.inner.config.max_limit {
            state.limit += 1;
            tracing::debug!(limit = state.limit, "Gate relaxed");
            drop(state);
            self.wake_all();
        }
    }

    /// The current admission limit.
    pub fn current_limit(&self) -> usize {
        self.inner.state.lock().expect("gate mutex poisoned").limit
    }

    /// How many calls currently hold a permit.
    pub fn active_count(&self) -> usize {
        self.inner.state.lock().expect("gate mutex poisoned").active
    }

    fn wake_all(&self) {
        self.inner
            .wake_tx
            .send_modify(|version| *version = version.wrapping_add(1));
    }

    fn release(&self) {
        {
            let mut state = self.inner.state.lock().expect("gate mutex poisoned");
            state.active = state.active.saturating_sub(1);
        }
        self.wake_all();
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}
