//! Recurring cron triggers for scheduled tasks.

use crate::error::TaskError;
use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Callback invoked on every fire
pub type TriggerCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Wall-clock source used to compute fire times
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Identifies a registration in a [`CronScheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerHandle(u64);

/// Accepts 5-field expressions (minute precision) by prepending a `0`
/// seconds field. 6 and 7 field expressions pass through.
pub fn normalize_expression(expression: &str) -> Result<String, TaskError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!("0 {}", fields.join(" "))),
        6 | 7 => Ok(fields.join(" ")),
        n => Err(TaskError::InvalidCron {
            expression: expression.to_string(),
            reason: format!("expected 5, 6 or 7 fields, got {}", n),
        }),
    }
}

pub fn parse_schedule(expression: &str) -> Result<Schedule, TaskError> {
    let normalized = normalize_expression(expression)?;
    Schedule::from_str(&normalized).map_err(|e| TaskError::InvalidCron {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Next fire strictly after both `last` and `now`
fn next_fire(
    schedule: &Schedule,
    last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let from = match last {
        Some(last) if last > now => last,
        _ => now,
    };
    schedule.after(&from).next()
}

/// One timer task per registration. Fires while stopped are dropped; each
/// fire runs its callback in a separate task.
pub struct CronScheduler {
    clock: Clock,
    active: Arc<AtomicBool>,
    next_id: AtomicU64,
    timers: Mutex<HashMap<TriggerHandle, JoinHandle<()>>>,
}

impl CronScheduler {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    /// Scheduler reading the time from `clock` instead of the system clock
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            clock,
            active: Arc::new(AtomicBool::new(false)),
            next_id: AtomicU64::new(1),
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Register `callback` to run on `expression`. Must be called from
    /// within a tokio runtime.
    pub fn register(
        &self,
        expression: &str,
        callback: TriggerCallback,
    ) -> Result<TriggerHandle, TaskError> {
        let schedule = parse_schedule(expression)?;
        let handle = TriggerHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let active = self.active.clone();
        let clock = self.clock.clone();
        let expression = expression.to_string();

        let timer = tokio::spawn(async move {
            let mut last = None;
            while let Some(next) = next_fire(&schedule, last, clock()) {
                let wait = (next - clock()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;
                last = Some(next);

                if !active.load(Ordering::SeqCst) {
                    debug!(cron = %expression, "Scheduler stopped, skipping fire");
                    continue;
                }
                tokio::spawn((callback)());
            }
            warn!(cron = %expression, "Cron schedule has no further fire times");
        });

        self.timers.lock().insert(handle, timer);
        Ok(handle)
    }

    /// Remove a registration. Returns false if it was not registered.
    pub fn unregister(&self, handle: TriggerHandle) -> bool {
        match self.timers.lock().remove(&handle) {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }

    pub fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.timers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.lock().is_empty()
    }
}

impl Default for CronScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CronScheduler {
    fn drop(&mut self) {
        for (_, timer) in self.timers.lock().drain() {
            timer.abort();
        }
    }
}
