//! Per-target health state.
//!
//! [`HealthStateStore`] tracks consecutive failures and the two suppression
//! policies used by the engine:
//!
//! - a silence window, set once when an alert fires (`mark_down`)
//! - a cooldown, measured from the last successful DNS switch (`mark_switched`)
//!
//! The store only records suppression; callers decide whether it gates
//! probing or escalation. All operations are in-memory and take a single lock
//! over the whole map.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Health state of one monitored target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthState {
    /// Consecutive failures since the last success or reset
    pub failure_count: u32,
    /// Set when an alert fired for this target
    pub is_down: bool,
    /// Escalation is suppressed until this instant
    pub silence_until: Option<Instant>,
    /// Time of the last successful DNS switch
    pub last_switch: Option<Instant>,
}

/// Point-in-time view of a target, for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetStatus {
    pub target: String,
    pub failure_count: u32,
    pub is_down: bool,
    pub silence_remaining_secs: u64,
    pub cooldown_remaining_minutes: u64,
}

/// Thread-safe store of [`HealthState`] keyed by target string.
///
/// The key is the bare target string, so the same string monitored under two
/// probe kinds shares one state.
#[derive(Debug)]
pub struct HealthStateStore {
    states: RwLock<HashMap<String, HealthState>>,
    cooldown: Duration,
}

impl HealthStateStore {
    /// Create a store whose cooldown window is `cooldown`
    pub fn new(cooldown: Duration) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Zeroed state for `target`, replacing any prior state
    pub fn init(&self, target: &str) {
        self.states
            .write()
            .insert(target.to_string(), HealthState::default());
    }

    /// Increment the failure count and return the new value.
    /// Unknown targets start at 1.
    pub fn increment_failure(&self, target: &str) -> u32 {
        let mut states = self.states.write();
        let state = states.entry(target.to_string()).or_default();
        state.failure_count = state.failure_count.saturating_add(1);
        state.failure_count
    }

    /// Increment the failure count of a tracked target.
    /// Returns `None` and leaves the store untouched for unknown targets.
    pub fn record_failure(&self, target: &str) -> Option<u32> {
        let mut states = self.states.write();
        let state = states.get_mut(target)?;
        state.failure_count = state.failure_count.saturating_add(1);
        Some(state.failure_count)
    }

    /// Clear the failure count and the down flag
    pub fn reset_failure(&self, target: &str) {
        if let Some(state) = self.states.write().get_mut(target) {
            state.failure_count = 0;
            state.is_down = false;
        }
    }

    /// Flag the target down and silence escalation for `silence`.
    /// Unknown targets are ignored.
    pub fn mark_down(&self, target: &str, silence: Duration) {
        if let Some(state) = self.states.write().get_mut(target) {
            state.is_down = true;
            state.silence_until = Some(Instant::now() + silence);
        }
    }

    pub fn is_silenced(&self, target: &str) -> bool {
        self.states
            .read()
            .get(target)
            .and_then(|s| s.silence_until)
            .is_some_and(|until| Instant::now() < until)
    }

    /// Time left in the silence window, zero when not silenced
    pub fn silence_remaining(&self, target: &str) -> Duration {
        self.states
            .read()
            .get(target)
            .and_then(|s| s.silence_until)
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    pub fn clear_silence(&self, target: &str) {
        if let Some(state) = self.states.write().get_mut(target) {
            state.silence_until = None;
        }
    }

    /// Record a successful switch: start the cooldown and clear failures.
    /// Unknown targets are ignored.
    pub fn mark_switched(&self, target: &str) {
        if let Some(state) = self.states.write().get_mut(target) {
            state.last_switch = Some(Instant::now());
            state.failure_count = 0;
        }
    }

    pub fn is_in_cooldown(&self, target: &str) -> bool {
        self.states
            .read()
            .get(target)
            .and_then(|s| s.last_switch)
            .is_some_and(|at| at.elapsed() < self.cooldown)
    }

    /// Time left in the cooldown, zero when not cooling down
    pub fn cooldown_remaining(&self, target: &str) -> Duration {
        self.states
            .read()
            .get(target)
            .and_then(|s| s.last_switch)
            .map(|at| self.cooldown.saturating_sub(at.elapsed()))
            .unwrap_or(Duration::ZERO)
    }

    /// Whether the target is currently flagged down
    pub fn is_down(&self, target: &str) -> bool {
        self.states.read().get(target).is_some_and(|s| s.is_down)
    }

    pub fn get(&self, target: &str) -> Option<HealthState> {
        self.states.read().get(target).cloned()
    }

    pub fn contains(&self, target: &str) -> bool {
        self.states.read().contains_key(target)
    }

    /// Delete all state for `target`
    pub fn remove(&self, target: &str) {
        self.states.write().remove(target);
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    /// Copy of every state
    pub fn snapshot_all(&self) -> HashMap<String, HealthState> {
        self.states.read().clone()
    }

    /// Status of every target, sorted by target
    pub fn statuses(&self) -> Vec<TargetStatus> {
        let now = Instant::now();
        let states = self.states.read();
        let mut statuses: Vec<_> = states
            .iter()
            .map(|(target, state)| {
                let silence = state
                    .silence_until
                    .map(|until| until.saturating_duration_since(now))
                    .unwrap_or(Duration::ZERO);
                let cooldown = state
                    .last_switch
                    .map(|at| self.cooldown.saturating_sub(now.saturating_duration_since(at)))
                    .unwrap_or(Duration::ZERO);
                TargetStatus {
                    target: target.clone(),
                    failure_count: state.failure_count,
                    is_down: state.is_down,
                    silence_remaining_secs: silence.as_secs(),
                    cooldown_remaining_minutes: cooldown.as_secs().div_ceil(60),
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.target.cmp(&b.target));
        statuses
    }
}

impl Default for HealthStateStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}
