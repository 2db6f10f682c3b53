//! Deferred requests from listeners.
//!
//! Listeners only get shared access while events are dispatched, so anything
//! that mutates engine state is pushed here and applied after the tick.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::capability::Capability;
use crate::locker::LockKey;
use crate::time::TimePriority;
use crate::world::{EntityId, ShapeId};

/// Commands applied by the simulation between ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayCommand {
    /// Suppress collision between two shapes.
    DisablePair { a: ShapeId, b: ShapeId, key: LockKey },
    /// Release a pair suppression.
    EnablePair { a: ShapeId, b: ShapeId, key: LockKey },
    /// Suppress a pair for a fixed duration.
    DisablePairFor {
        a: ShapeId,
        b: ShapeId,
        key: LockKey,
        seconds: f32,
    },
    /// Suppress every shape pair between two entities.
    DisableEntityPair { e1: EntityId, e2: EntityId, key: LockKey },
    EnableEntityPair { e1: EntityId, e2: EntityId, key: LockKey },
    StopTime { key: LockKey },
    StartTime { key: LockKey },
    SetTimeScale {
        scale: f32,
        key: LockKey,
        priority: TimePriority,
    },
    RestoreTimeScale { key: LockKey },
    AddCapability { entity: EntityId, capability: Capability },
    RemoveCapability { entity: EntityId, capability: Capability },
    /// Despawn an entity after the tick.
    Destroy { entity: EntityId },
}

impl RelayCommand {
    /// Returns true if this command changes the time state.
    pub fn is_time_command(&self) -> bool {
        matches!(
            self,
            Self::StopTime { .. }
                | Self::StartTime { .. }
                | Self::SetTimeScale { .. }
                | Self::RestoreTimeScale { .. }
        )
    }
}

/// Thread-safe command queue.
///
/// Cloning yields another handle to the same queue, so listeners can hold one
/// while the simulation drains it.
#[derive(Clone, Default)]
pub struct CommandQueue {
    inner: Arc<Mutex<VecDeque<RelayCommand>>>,
}

impl CommandQueue {
    /// Empty queue; clone it to hand out producers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a command to be processed after the current tick.
    pub fn push(&self, command: RelayCommand) {
        self.inner.lock().push_back(command);
    }

    /// Drain all pending commands in push order.
    pub fn drain(&self) -> Vec<RelayCommand> {
        self.inner.lock().drain(..).collect()
    }

    /// Commands waiting for the next drain.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_queue() {
        let queue = CommandQueue::new();
        let handle = queue.clone();

        handle.push(RelayCommand::StopTime {
            key: LockKey::named("pause"),
        });
        handle.push(RelayCommand::Destroy {
            entity: EntityId(4),
        });
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert!(drained[0].is_time_command());
        assert!(!drained[1].is_time_command());
        assert!(handle.is_empty());
    }

    #[test]
    fn test_push_from_another_thread() {
        let queue = CommandQueue::new();
        let handle = queue.clone();
        std::thread::spawn(move || {
            handle.push(RelayCommand::StartTime {
                key: LockKey::named("pause"),
            });
        })
        .join()
        .unwrap();

        assert_eq!(
            queue.drain(),
            vec![RelayCommand::StartTime {
                key: LockKey::named("pause")
            }]
        );
    }
}
