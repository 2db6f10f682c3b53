//! Fixed-step driver tying physics, reconciliation and time control together.

use crate::capability::Capability;
use crate::command::{CommandQueue, RelayCommand};
use crate::config::{ConfigError, RelayConfig};
use crate::contact::RawNotification;
use crate::controller::Interactor;
use crate::groups::CapabilityGroups;
use crate::physics::PhysicsBackend;
use crate::reconcile::{Reconciler, TickStats};
use crate::suppression::SuppressedPairs;
use crate::time::TimeControl;
use crate::world::{EntityId, ShapeId, ShapeKind, World};

/// Owns one of everything and advances it one tick at a time.
///
/// A tick samples kinematics, steps the backend, reconciles and dispatches
/// the resulting notifications, advances timers and finally applies the
/// commands listeners queued during dispatch.
pub struct Simulation<P: PhysicsBackend> {
    config: RelayConfig,
    world: World,
    groups: CapabilityGroups,
    reconciler: Reconciler,
    suppression: SuppressedPairs,
    time: TimeControl,
    commands: CommandQueue,
    physics: P,
    tick: u64,
}

impl<P: PhysicsBackend> Simulation<P> {
    /// Validates `config` and builds empty state around `physics`.
    pub fn new(config: RelayConfig, physics: P) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            world: World::new(config.same_team_divisor),
            groups: CapabilityGroups::new(),
            reconciler: Reconciler::new(&config),
            suppression: SuppressedPairs::new(),
            time: TimeControl::default(),
            commands: CommandQueue::new(),
            physics,
            tick: 0,
            config,
        })
    }

    /// Runs one fixed tick.
    ///
    /// While time is stopped the backend is not stepped and nothing is
    /// dispatched, but queued commands are still applied.
    pub fn tick(&mut self) -> TickStats {
        let dt = self.time.scaled_dt(self.config.fixed_dt);

        let stats = if dt > 0.0 {
            self.world.sample_kinematics(&self.physics);
            for note in self.physics.step(dt) {
                self.reconciler.notify(note, &self.world);
            }
            let stats = self.reconciler.finish_tick(&self.world);
            self.suppression.update(dt, &mut self.physics);
            stats
        } else {
            TickStats::default()
        };

        self.time.update(self.config.fixed_dt);
        for command in self.commands.drain() {
            self.apply(command);
        }
        self.tick += 1;
        stats
    }

    /// Reports an interaction the backend did not see, e.g. an overlap found
    /// when a trigger is enabled. Reconciled with the next tick.
    pub fn notify(&mut self, note: RawNotification) {
        self.reconciler.notify(note, &self.world);
    }

    /// Applies a command immediately.
    pub fn apply(&mut self, command: RelayCommand) {
        tracing::trace!("[simulation] {:?}", command);
        let world = &self.world;
        let physics = &mut self.physics;
        match command {
            RelayCommand::DisablePair { a, b, key } => {
                self.suppression
                    .disable_collider_pair(a, b, key, world, physics);
            }
            RelayCommand::EnablePair { a, b, key } => {
                self.suppression.enable_collider_pair(a, b, key, physics);
            }
            RelayCommand::DisablePairFor { a, b, key, seconds } => {
                self.suppression
                    .disable_collider_pair_for(a, b, key, seconds, world, physics);
            }
            RelayCommand::DisableEntityPair { e1, e2, key } => {
                self.suppression
                    .disable_entity_pair(e1, e2, key, world, physics);
            }
            RelayCommand::EnableEntityPair { e1, e2, key } => {
                self.suppression
                    .enable_entity_pair(e1, e2, key, world, physics);
            }
            RelayCommand::StopTime { key } => self.time.stop_time(key),
            RelayCommand::StartTime { key } => self.time.start_time(key),
            RelayCommand::SetTimeScale {
                scale,
                key,
                priority,
            } => {
                self.time.set_time_scale(scale, key, priority);
            }
            RelayCommand::RestoreTimeScale { key } => {
                self.time.restore_default(key);
            }
            RelayCommand::AddCapability { entity, capability } => {
                self.add_capability(entity, capability);
            }
            RelayCommand::RemoveCapability { entity, capability } => {
                self.remove_capability(entity, capability);
            }
            RelayCommand::Destroy { entity } => {
                self.destroy(entity);
            }
        }
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// New enabled interactor on `team`.
    pub fn spawn(&mut self, team: i32) -> EntityId {
        self.world.spawn(team)
    }

    /// Removes `entity`, its suppressions, its group memberships and its
    /// bodies in the backend.
    pub fn destroy(&mut self, entity: EntityId) -> Option<Interactor> {
        self.suppression
            .on_entity_destroyed(entity, &mut self.physics);
        self.physics.remove_entity(entity);
        self.reconciler.on_entity_destroyed(entity);
        self.world.despawn(entity, &mut self.groups)
    }

    /// Records `owner` as the owner of `shape`.
    pub fn attach_shape(&mut self, owner: EntityId, shape: ShapeId, kind: ShapeKind) -> bool {
        self.world.attach_shape(owner, shape, kind)
    }

    /// Returns `false` for unknown entities.
    pub fn add_capability(&mut self, entity: EntityId, capability: Capability) -> bool {
        let Some(interactor) = self.world.get_mut(entity) else {
            return false;
        };
        interactor.add_support_for_interaction(capability, &mut self.groups);
        true
    }

    pub fn remove_capability(&mut self, entity: EntityId, capability: Capability) -> bool {
        let Some(interactor) = self.world.get_mut(entity) else {
            return false;
        };
        interactor.stop_supporting_interaction(capability, &mut self.groups);
        true
    }

    /// Enabling a disabled entity reports everything it already touches as
    /// enter events, reconciled with the next tick.
    pub fn set_enabled(&mut self, entity: EntityId, enabled: bool) -> bool {
        let Some(interactor) = self.world.get_mut(entity) else {
            return false;
        };
        let was_enabled = interactor.is_enabled();
        if enabled {
            interactor.enable(&mut self.groups);
        } else {
            interactor.disable(&mut self.groups);
        }

        if enabled && !was_enabled {
            let notes = self.physics.touching(entity);
            tracing::trace!("[simulation] {:?} enabled touching {}", entity, notes.len());
            for note in notes {
                self.reconciler.notify(note, &self.world);
            }
        }
        true
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn world(&self) -> &World {
        &self.world
    }

    /// For registering listeners and changing teams.
    pub fn interactor_mut(&mut self, entity: EntityId) -> Option<&mut Interactor> {
        self.world.get_mut(entity)
    }

    pub fn groups(&self) -> &CapabilityGroups {
        &self.groups
    }

    /// For registering group listeners.
    pub fn groups_mut(&mut self) -> &mut CapabilityGroups {
        &mut self.groups
    }

    pub fn suppression(&self) -> &SuppressedPairs {
        &self.suppression
    }

    pub fn time(&self) -> &TimeControl {
        &self.time
    }

    pub fn time_mut(&mut self) -> &mut TimeControl {
        &mut self.time
    }

    /// Handle for queueing commands from listeners.
    pub fn commands(&self) -> CommandQueue {
        self.commands.clone()
    }

    pub fn physics(&self) -> &P {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut P {
        &mut self.physics
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Ticks run so far, including stopped ones.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use std::cell::Cell;

    use glam::Vec2;
    use rapier2d::prelude::{ColliderBuilder, RigidBodyBuilder, Vector};

    use super::*;
    use crate::contact::{ContactPoint, EventKind};
    use crate::event::event_callback;
    use crate::physics::PhysicsWorld;
    use crate::controller::{DynamicImpact, RigidBodyCollisions, StaticImpact};
    use crate::locker::LockKey;
    use crate::test_utils::{MockPhysics, RecordingRigidBody};
    use crate::world::Kinematics;

    const GHOST: LockKey = LockKey::named("ghost");
    const PAUSE: LockKey = LockKey::named("pause");

    /// Phases through whatever it hits by queueing a suppression.
    struct Ghost {
        commands: CommandQueue,
    }

    impl RigidBodyCollisions for Ghost {
        fn dynamic_collision(&self, impact: &DynamicImpact<'_>) {
            self.commands.push(RelayCommand::DisablePair {
                a: impact.event.mine().shape,
                b: impact.event.theirs().shape,
                key: GHOST,
            });
        }

        fn static_collision(&self, _impact: &StaticImpact<'_>) {}
    }

    fn setup() -> (Simulation<MockPhysics>, EntityId, EntityId) {
        let mut sim = Simulation::new(RelayConfig::default(), MockPhysics::new()).unwrap();
        let a = sim.spawn(0);
        let b = sim.spawn(1);
        sim.attach_shape(a, ShapeId(1), ShapeKind::Solid);
        sim.attach_shape(b, ShapeId(2), ShapeKind::Solid);
        sim.physics_mut().set_kinematics(
            a,
            Kinematics {
                linvel: Vec2::new(3.0, 0.0),
                mass: 1.0,
                ..Kinematics::default()
            },
        );
        (sim, a, b)
    }

    fn collision(a: EntityId, b: EntityId) -> RawNotification {
        RawNotification::new(EventKind::CollisionEnter, a, ShapeId(1), b, ShapeId(2))
            .with_contacts([ContactPoint::new(Vec2::ZERO, -Vec2::X)])
            .require_momentum()
    }

    #[test]
    fn test_tick_dispatches_backend_notifications() {
        let (mut sim, a, b) = setup();
        let log = Rc::new(RecordingRigidBody::default());
        sim.interactor_mut(b).unwrap().add_rigid_body_listener(log.clone());
        sim.physics_mut().push_step(vec![collision(a, b)]);

        let stats = sim.tick();
        assert_eq!(stats.synthesized, 1);
        assert_eq!(sim.current_tick(), 1);

        let seen = log.dynamic.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].other, a);
        // Kinematics were sampled before the step
        assert!((seen[0].their_momentum - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_listener_commands_apply_after_dispatch() {
        let (mut sim, a, b) = setup();
        let ghost = Rc::new(Ghost {
            commands: sim.commands(),
        });
        sim.interactor_mut(a).unwrap().add_rigid_body_listener(ghost);
        sim.physics_mut().push_step(vec![collision(a, b)]);

        sim.tick();
        assert!(sim.suppression().is_suppressed(ShapeId(1), ShapeId(2)));
        assert!(sim.physics().is_ignored(ShapeId(1), ShapeId(2)));

        sim.apply(RelayCommand::EnablePair {
            a: ShapeId(2),
            b: ShapeId(1),
            key: GHOST,
        });
        assert!(!sim.physics().is_ignored(ShapeId(1), ShapeId(2)));
    }

    #[test]
    fn test_stopped_time_skips_physics() {
        let (mut sim, _, _) = setup();
        sim.commands().push(RelayCommand::StopTime { key: PAUSE });

        sim.tick();
        sim.tick();
        assert_eq!(sim.physics().steps().len(), 1);
        assert!(sim.time().is_stopped());

        sim.commands().push(RelayCommand::StartTime { key: PAUSE });
        sim.tick();
        sim.tick();
        assert_eq!(sim.physics().steps().len(), 2);
    }

    #[test]
    fn test_time_scale_shortens_step() {
        let (mut sim, _, _) = setup();
        sim.time_mut()
            .set_time_scale(0.5, PAUSE, crate::time::TimePriority::Low);
        sim.tick();
        let dt = sim.config().fixed_dt;
        assert!((sim.physics().steps()[0] - dt * 0.5).abs() < 1e-7);
    }

    #[test]
    fn test_timed_suppression_expires_over_ticks() {
        let (mut sim, a, b) = setup();
        sim.apply(RelayCommand::DisablePairFor {
            a: ShapeId(1),
            b: ShapeId(2),
            key: GHOST,
            seconds: 0.04,
        });
        assert!(sim.physics().is_ignored(ShapeId(1), ShapeId(2)));

        // Three 1/60 s ticks exceed 0.04 s
        for _ in 0..3 {
            sim.tick();
        }
        assert!(!sim.physics().is_ignored(ShapeId(1), ShapeId(2)));
        assert!(sim.world().contains(a) && sim.world().contains(b));
    }

    #[test]
    fn test_destroy_clears_suppression_and_groups() {
        let (mut sim, a, b) = setup();
        sim.add_capability(b, Capability::AiTarget);
        sim.apply(RelayCommand::DisableEntityPair { e1: a, e2: b, key: GHOST });
        assert_eq!(sim.groups().members(Capability::AiTarget), &[b]);

        sim.commands().push(RelayCommand::Destroy { entity: b });
        sim.tick();

        assert!(!sim.world().contains(b));
        assert_eq!(sim.physics().removed(), &[b]);
        assert!(sim.suppression().is_empty());
        assert!(!sim.physics().is_ignored(ShapeId(1), ShapeId(2)));
        assert!(sim.groups().members(Capability::AiTarget).is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RelayConfig {
            fixed_dt: -1.0,
            ..RelayConfig::default()
        };
        assert!(Simulation::new(config, MockPhysics::new()).is_err());
    }

    #[test]
    fn test_disabled_entity_leaves_groups() {
        let (mut sim, a, _) = setup();
        sim.add_capability(a, Capability::AffectedByShockwave);
        sim.set_enabled(a, false);
        assert!(sim.groups().members(Capability::AffectedByShockwave).is_empty());
        sim.set_enabled(a, true);
        assert_eq!(sim.groups().members(Capability::AffectedByShockwave), &[a]);
    }

    #[test]
    fn test_destroy_removes_rapier_body() {
        let config = RelayConfig::default();
        let physics = PhysicsWorld::new(&config);
        let mut sim = Simulation::new(config, physics).unwrap();
        let entity = sim.spawn(0);
        let handle = sim
            .physics_mut()
            .add_rigid_body(entity, RigidBodyBuilder::dynamic().build());
        let shape = sim
            .physics_mut()
            .add_collider(ColliderBuilder::ball(0.5).build(), handle);
        sim.attach_shape(entity, shape, ShapeKind::Solid);
        assert_eq!(sim.physics().rigid_body_set.len(), 1);

        sim.destroy(entity);
        assert!(!sim.world().contains(entity));
        assert!(sim.physics().body_of(entity).is_none());
        assert_eq!(sim.physics().rigid_body_set.len(), 0);
        assert_eq!(sim.physics().collider_set.len(), 0);

        let floor = sim.spawn(-1);
        sim.physics_mut().add_static_collider(
            floor,
            ColliderBuilder::cuboid(4.0, 0.5)
                .translation(Vector::new(0.0, -3.0))
                .build(),
        );
        sim.destroy(floor);
        assert_eq!(sim.physics().collider_set.len(), 0);
    }

    #[test]
    fn test_enabling_reports_existing_overlaps() {
        let (mut sim, a, b) = setup();
        let checked = Rc::new(Cell::new(false));
        let flag = {
            let checked = checked.clone();
            event_callback(move |event, _| checked.set(event.mine().checked_on_enable))
        };
        let overlap = RawNotification::new(EventKind::TriggerEnter, a, ShapeId(1), b, ShapeId(2))
            .with_callback(flag);
        sim.physics_mut().set_touching(a, vec![overlap]);

        // Already enabled: no check
        sim.set_enabled(a, true);
        sim.tick();
        assert!(!checked.get());

        sim.set_enabled(a, false);
        sim.set_enabled(a, true);
        let stats = sim.tick();
        assert_eq!(stats.synthesized, 1);
        assert!(checked.get());
    }
}
