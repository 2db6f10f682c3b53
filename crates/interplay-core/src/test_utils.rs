//! Test utilities: a scripted physics backend and recording listeners.
//!
//! `MockPhysics` replays queued notifications on `step` and records every
//! `ignore_collision` call, so reconciliation and suppression can be tested
//! without a real integrator.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};

use glam::Vec2;

use crate::contact::RawNotification;
use crate::controller::{DynamicImpact, RigidBodyCollisions, StaticCollisions, StaticImpact};
use crate::physics::PhysicsBackend;
use crate::world::{EntityId, Kinematics, ShapeId};

/// A physics backend driven by the test.
#[derive(Default)]
pub(crate) struct MockPhysics {
    /// Notifications returned by successive `step` calls.
    script: VecDeque<Vec<RawNotification>>,
    kinematics: HashMap<EntityId, Kinematics>,
    ignored: HashSet<(ShapeId, ShapeId)>,
    calls: Vec<(ShapeId, ShapeId, bool)>,
    steps: Vec<f32>,
    touching: HashMap<EntityId, Vec<RawNotification>>,
    removed: Vec<EntityId>,
}

impl MockPhysics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues what the next unscripted `step` will report.
    pub fn push_step(&mut self, notes: Vec<RawNotification>) {
        self.script.push_back(notes);
    }

    pub fn set_kinematics(&mut self, entity: EntityId, kinematics: Kinematics) {
        self.kinematics.insert(entity, kinematics);
    }

    pub fn ignore_calls(&self) -> Vec<(ShapeId, ShapeId, bool)> {
        self.calls.clone()
    }

    pub fn is_ignored(&self, a: ShapeId, b: ShapeId) -> bool {
        self.ignored.contains(&Self::key(a, b))
    }

    /// What `touching(entity)` reports until the entity is removed.
    pub fn set_touching(&mut self, entity: EntityId, notes: Vec<RawNotification>) {
        self.touching.insert(entity, notes);
    }

    pub fn removed(&self) -> &[EntityId] {
        &self.removed
    }

    /// `dt` of every step taken so far.
    pub fn steps(&self) -> &[f32] {
        &self.steps
    }

    fn key(a: ShapeId, b: ShapeId) -> (ShapeId, ShapeId) {
        if a <= b { (a, b) } else { (b, a) }
    }
}

impl PhysicsBackend for MockPhysics {
    fn step(&mut self, dt: f32) -> Vec<RawNotification> {
        self.steps.push(dt);
        self.script.pop_front().unwrap_or_default()
    }

    fn ignore_collision(&mut self, a: ShapeId, b: ShapeId, ignore: bool) {
        self.calls.push((a, b, ignore));
        if ignore {
            self.ignored.insert(Self::key(a, b));
        } else {
            self.ignored.remove(&Self::key(a, b));
        }
    }

    fn kinematics(&self, entity: EntityId) -> Option<Kinematics> {
        self.kinematics.get(&entity).copied()
    }

    fn remove_entity(&mut self, entity: EntityId) {
        self.kinematics.remove(&entity);
        self.touching.remove(&entity);
        self.removed.push(entity);
    }

    fn touching(&self, entity: EntityId) -> Vec<RawNotification> {
        self.touching
            .get(&entity)
            .map(|notes| notes.iter().cloned().map(RawNotification::checked_on_enable).collect())
            .unwrap_or_default()
    }
}

/// What a listener was told about one dynamic impact.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DynamicHit {
    pub other: EntityId,
    pub my_shape: ShapeId,
    pub their_shape: ShapeId,
    pub my_momentum: f32,
    pub their_momentum: f32,
    pub impact_point: Vec2,
    /// Our side was synthesized.
    pub mirrored: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StaticHit {
    pub other: EntityId,
    pub my_shape: ShapeId,
    pub momentum: f32,
    pub impact_point: Vec2,
}

impl StaticHit {
    fn from_impact(impact: &StaticImpact<'_>) -> Self {
        Self {
            other: impact.other,
            my_shape: impact.event.mine().shape,
            momentum: impact.momentum,
            impact_point: impact.impact_point,
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingRigidBody {
    pub dynamic: RefCell<Vec<DynamicHit>>,
    pub statics: RefCell<Vec<StaticHit>>,
}

impl RigidBodyCollisions for RecordingRigidBody {
    fn dynamic_collision(&self, impact: &DynamicImpact<'_>) {
        self.dynamic.borrow_mut().push(DynamicHit {
            other: impact.other,
            my_shape: impact.event.mine().shape,
            their_shape: impact.event.theirs().shape,
            my_momentum: impact.my_momentum,
            their_momentum: impact.their_momentum,
            impact_point: impact.impact_point,
            mirrored: impact.event.mine().mirrored,
        });
    }

    fn static_collision(&self, impact: &StaticImpact<'_>) {
        self.statics.borrow_mut().push(StaticHit::from_impact(impact));
    }
}

#[derive(Default)]
pub(crate) struct RecordingStatic {
    pub collisions: RefCell<Vec<StaticHit>>,
}

impl StaticCollisions for RecordingStatic {
    fn collision(&self, impact: &StaticImpact<'_>) {
        self.collisions.borrow_mut().push(StaticHit::from_impact(impact));
    }
}
