//! Global pause and time-scale control.
//!
//! Time stops while any stop key is held and resumes at whatever scale was in
//! effect before the first stop. The scale itself has one holder at a time;
//! a request only replaces the holder when it outranks it.

use serde::{Deserialize, Serialize};

use crate::locker::{LockKey, Locker};

/// Rank of a time-scale request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimePriority {
    Never,
    Low,
    Medium,
    High,
    /// Always replaces the current holder.
    Always,
}

#[derive(Debug, Clone, Copy)]
struct ScaleHolder {
    key: LockKey,
    priority: TimePriority,
    /// Seconds until the scale reverts, for timed requests.
    remaining: Option<f32>,
}

/// Global time stop and prioritized time scale.
#[derive(Debug, Clone)]
pub struct TimeControl {
    default_scale: f32,
    /// Scale in effect while running; kept across stops.
    scale: f32,
    stop_locks: Locker,
    holder: Option<ScaleHolder>,
}

impl Default for TimeControl {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl TimeControl {
    /// Runs at `default_scale` until a request overrides it.
    pub fn new(default_scale: f32) -> Self {
        Self {
            default_scale,
            scale: default_scale,
            stop_locks: Locker::new(),
            holder: None,
        }
    }

    /// Stops time under `key`.
    pub fn stop_time(&mut self, key: LockKey) {
        if !self.is_stopped() {
            tracing::debug!("[time] stopped by {:?}", key);
        }
        self.stop_locks.set_locker(key);
    }

    /// Releases `key`; time resumes once no stop key remains.
    pub fn start_time(&mut self, key: LockKey) {
        if self.stop_locks.remove_locker(&key) && !self.is_stopped() {
            tracing::debug!("[time] resumed at scale {}", self.scale);
        }
    }

    /// Any stop key is held.
    pub fn is_stopped(&self) -> bool {
        self.stop_locks.is_locked()
    }

    /// Effective scale: zero while stopped.
    pub fn time_scale(&self) -> f32 {
        if self.is_stopped() { 0.0 } else { self.scale }
    }

    /// Whether a request at `priority` under `key` would take the scale.
    pub fn is_overridable(&self, key: LockKey, priority: TimePriority) -> bool {
        match self.holder {
            None => true,
            Some(_) if priority == TimePriority::Always => true,
            Some(holder) => holder.key == key || holder.priority < priority,
        }
    }

    /// Sets the scale if the request outranks the current holder.
    pub fn set_time_scale(&mut self, scale: f32, key: LockKey, priority: TimePriority) -> bool {
        self.claim(scale, key, priority, None)
    }

    /// Like [`set_time_scale`](Self::set_time_scale), reverting to the default
    /// after `seconds` of running time.
    pub fn set_timed_time_scale(
        &mut self,
        scale: f32,
        seconds: f32,
        key: LockKey,
        priority: TimePriority,
    ) -> bool {
        self.claim(scale, key, priority, Some(seconds))
    }

    fn claim(
        &mut self,
        scale: f32,
        key: LockKey,
        priority: TimePriority,
        remaining: Option<f32>,
    ) -> bool {
        if !self.is_overridable(key, priority) {
            tracing::trace!("[time] scale request by {:?} refused", key);
            return false;
        }
        self.scale = scale.max(0.0);
        self.holder = Some(ScaleHolder {
            key,
            priority,
            remaining,
        });
        true
    }

    /// Drops `key`'s scale, if it still holds it.
    pub fn restore_default(&mut self, key: LockKey) -> bool {
        match self.holder {
            Some(holder) if holder.key == key => {
                self.holder = None;
                self.scale = self.default_scale;
                true
            }
            _ => false,
        }
    }

    /// Advances the timed scale by unscaled `dt`; paused while stopped.
    pub fn update(&mut self, dt: f32) {
        if self.is_stopped() {
            return;
        }
        let Some(holder) = self.holder.as_mut() else {
            return;
        };
        let Some(remaining) = holder.remaining.as_mut() else {
            return;
        };
        *remaining -= dt;
        if *remaining <= 0.0 {
            let key = holder.key;
            self.restore_default(key);
        }
    }

    /// Length of the next physics step.
    pub fn scaled_dt(&self, fixed_dt: f32) -> f32 {
        fixed_dt * self.time_scale()
    }
}
