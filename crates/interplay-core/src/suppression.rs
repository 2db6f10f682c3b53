//! Reference-counted collision suppression between shape pairs.
//!
//! Several gameplay systems may want two shapes to pass through each other at
//! the same time. Each one disables the pair under its own [`LockKey`]; the
//! physics backend is only told to restore the collision response once every
//! key has been released.

use std::collections::{BTreeMap, BTreeSet};

use crate::locker::{LockKey, Locker};
use crate::physics::PhysicsBackend;
use crate::world::{EntityId, ShapeId, ShapeKind, World};

/// Unordered shape pair, stored smallest id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapePair(ShapeId, ShapeId);

impl ShapePair {
    /// Same pair for `(a, b)` and `(b, a)`.
    pub fn new(a: ShapeId, b: ShapeId) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }

    /// Both shapes, smallest id first.
    pub fn shapes(self) -> (ShapeId, ShapeId) {
        (self.0, self.1)
    }
}

struct Suppression {
    locker: Locker,
    owners: (EntityId, EntityId),
}

/// Reference-counted collision suppression between shape pairs.
#[derive(Default)]
pub struct SuppressedPairs {
    pairs: BTreeMap<ShapePair, Suppression>,
    /// Entity → pairs touching one of its shapes.
    watched: BTreeMap<EntityId, BTreeSet<ShapePair>>,
}

impl SuppressedPairs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables collision between `a` and `b` under `key`.
    ///
    /// Triggers and unknown shapes are ignored. Returns whether the pair is
    /// suppressed afterwards.
    pub fn disable_collider_pair(
        &mut self,
        a: ShapeId,
        b: ShapeId,
        key: LockKey,
        world: &World,
        physics: &mut dyn PhysicsBackend,
    ) -> bool {
        self.acquire(a, b, world, physics, |locker| locker.set_locker(key))
    }

    /// Like [`disable_collider_pair`](Self::disable_collider_pair), released
    /// automatically after `seconds` of [`update`](Self::update).
    pub fn disable_collider_pair_for(
        &mut self,
        a: ShapeId,
        b: ShapeId,
        key: LockKey,
        seconds: f32,
        world: &World,
        physics: &mut dyn PhysicsBackend,
    ) -> bool {
        self.acquire(a, b, world, physics, |locker| {
            locker.set_timed_locker(key, seconds);
        })
    }

    fn acquire(
        &mut self,
        a: ShapeId,
        b: ShapeId,
        world: &World,
        physics: &mut dyn PhysicsBackend,
        lock: impl FnOnce(&mut Locker),
    ) -> bool {
        let (Some(info_a), Some(info_b)) = (world.shape(a), world.shape(b)) else {
            tracing::trace!("[suppress] unknown shape in {:?}/{:?}", a, b);
            return false;
        };
        if info_a.kind == ShapeKind::Trigger || info_b.kind == ShapeKind::Trigger {
            return false;
        }

        let pair = ShapePair::new(a, b);
        let entry = self.pairs.entry(pair).or_insert_with(|| {
            physics.ignore_collision(a, b, true);
            Suppression {
                locker: Locker::new(),
                owners: (info_a.owner, info_b.owner),
            }
        });
        lock(&mut entry.locker);

        self.watched.entry(info_a.owner).or_default().insert(pair);
        self.watched.entry(info_b.owner).or_default().insert(pair);
        true
    }

    /// Releases `key`; restores the collision when no key remains.
    pub fn enable_collider_pair(
        &mut self,
        a: ShapeId,
        b: ShapeId,
        key: LockKey,
        physics: &mut dyn PhysicsBackend,
    ) {
        let pair = ShapePair::new(a, b);
        let Some(entry) = self.pairs.get_mut(&pair) else {
            return;
        };

        entry.locker.remove_locker(&key);
        entry.locker.remove_timed_locker(&key);
        if !entry.locker.is_locked() {
            self.release(pair, physics);
        }
    }

    fn release(&mut self, pair: ShapePair, physics: &mut dyn PhysicsBackend) {
        let Some(entry) = self.pairs.remove(&pair) else {
            return;
        };
        let (a, b) = pair.shapes();
        physics.ignore_collision(a, b, false);

        for owner in [entry.owners.0, entry.owners.1] {
            if let Some(set) = self.watched.get_mut(&owner) {
                set.remove(&pair);
                if set.is_empty() {
                    self.watched.remove(&owner);
                }
            }
        }
    }

    /// Disables every solid shape of `e1` against every solid shape of `e2`.
    pub fn disable_entity_pair(
        &mut self,
        e1: EntityId,
        e2: EntityId,
        key: LockKey,
        world: &World,
        physics: &mut dyn PhysicsBackend,
    ) {
        for a in world.shapes_of(e1) {
            self.disable_entity_with_shape(e2, a, key, world, physics);
        }
    }

    /// Releases `key` on every shape pair between the two entities.
    pub fn enable_entity_pair(
        &mut self,
        e1: EntityId,
        e2: EntityId,
        key: LockKey,
        world: &World,
        physics: &mut dyn PhysicsBackend,
    ) {
        for a in world.shapes_of(e1) {
            self.enable_entity_with_shape(e2, a, key, world, physics);
        }
    }

    /// Disables every shape of `entity` against `shape`.
    pub fn disable_entity_with_shape(
        &mut self,
        entity: EntityId,
        shape: ShapeId,
        key: LockKey,
        world: &World,
        physics: &mut dyn PhysicsBackend,
    ) {
        for b in world.shapes_of(entity) {
            self.disable_collider_pair(shape, b, key, world, physics);
        }
    }

    /// Releases `key` on every pair between `entity` and `shape`.
    pub fn enable_entity_with_shape(
        &mut self,
        entity: EntityId,
        shape: ShapeId,
        key: LockKey,
        world: &World,
        physics: &mut dyn PhysicsBackend,
    ) {
        for b in world.shapes_of(entity) {
            self.enable_collider_pair(shape, b, key, physics);
        }
    }

    /// Sets the ignore flag on every solid shape pair directly.
    ///
    /// Bypasses reference counting: nothing is recorded, and a later release
    /// of a counted lock on the same pair will override it.
    pub fn force_entity_pair(
        e1: EntityId,
        e2: EntityId,
        ignore: bool,
        world: &World,
        physics: &mut dyn PhysicsBackend,
    ) {
        let solid = |id: &ShapeId| world.shape(*id).is_some_and(|s| s.kind == ShapeKind::Solid);
        let second: Vec<ShapeId> = world.shapes_of(e2).into_iter().filter(solid).collect();
        for a in world.shapes_of(e1).into_iter().filter(solid) {
            for b in &second {
                physics.ignore_collision(a, *b, ignore);
            }
        }
    }

    /// Counts down timed suppressions, restoring pairs whose last key expired.
    pub fn update(&mut self, dt: f32, physics: &mut dyn PhysicsBackend) {
        let mut released = Vec::new();
        for (pair, entry) in &mut self.pairs {
            if entry.locker.update(dt).is_empty() {
                continue;
            }
            if !entry.locker.is_locked() {
                released.push(*pair);
            }
        }
        for pair in released {
            tracing::debug!("[suppress] timed suppression of {:?} expired", pair);
            self.release(pair, physics);
        }
    }

    /// Drops every pair touching `entity`, restoring collisions best-effort.
    pub fn on_entity_destroyed(&mut self, entity: EntityId, physics: &mut dyn PhysicsBackend) {
        let Some(pairs) = self.watched.remove(&entity) else {
            return;
        };
        for pair in pairs {
            self.release(pair, physics);
        }
    }

    /// Keys currently holding the pair, zero if it is not suppressed.
    pub fn lock_count(&self, a: ShapeId, b: ShapeId) -> usize {
        self.pairs
            .get(&ShapePair::new(a, b))
            .map_or(0, |e| e.locker.num_locks())
    }

    /// Whether any key holds the pair, in either order.
    pub fn is_suppressed(&self, a: ShapeId, b: ShapeId) -> bool {
        self.pairs.contains_key(&ShapePair::new(a, b))
    }

    /// Number of suppressed pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
