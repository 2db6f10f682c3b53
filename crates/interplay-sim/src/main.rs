//! Interplay headless demo
//!
//! Drops a handful of balls onto a static floor and logs every impact the
//! interaction layer reports. Pass a JSON config path to override the
//! defaults; set `RUST_LOG=debug` to see per-tick reconciliation counters.

use std::rc::Rc;

use anyhow::Context;
use glam::Vec2;
use interplay_core::{
    Capability, CommandQueue, DynamicImpact, EntityId, GroupListener, LockKey, PhysicsWorld,
    RelayCommand, RelayConfig, RigidBodyCollisions, ShapeKind, Simulation, StaticCollisions,
    StaticImpact,
};
use rapier2d::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TICKS: u64 = 600;

/// Momentum above which a fragile ball breaks.
const BREAK_MOMENTUM: f32 = 6.0;

/// Logs every impact on the entity it is attached to.
struct ImpactLogger {
    name: &'static str,
}

impl RigidBodyCollisions for ImpactLogger {
    fn dynamic_collision(&self, impact: &DynamicImpact<'_>) {
        tracing::info!(
            "[impact] {} hit {:?}: mine={:.2} theirs={:.2} at ({:.2}, {:.2})",
            self.name,
            impact.other,
            impact.my_momentum,
            impact.their_momentum,
            impact.impact_point.x,
            impact.impact_point.y,
        );
    }

    fn static_collision(&self, impact: &StaticImpact<'_>) {
        tracing::info!(
            "[impact] {} landed on {:?}: momentum={:.2}",
            self.name,
            impact.other,
            impact.momentum,
        );
    }
}

impl StaticCollisions for ImpactLogger {
    fn collision(&self, impact: &StaticImpact<'_>) {
        tracing::info!(
            "[impact] {} was hit by {:?}: momentum={:.2}",
            self.name,
            impact.other,
            impact.momentum,
        );
    }
}

/// Destroys its entity after a hard landing.
struct Fragile {
    entity: EntityId,
    commands: CommandQueue,
}

impl RigidBodyCollisions for Fragile {
    fn dynamic_collision(&self, _impact: &DynamicImpact<'_>) {}

    fn static_collision(&self, impact: &StaticImpact<'_>) {
        if impact.momentum > BREAK_MOMENTUM {
            tracing::info!("[fragile] {:?} shattered", self.entity);
            self.commands.push(RelayCommand::Destroy {
                entity: self.entity,
            });
        }
    }
}

struct TargetWatcher;

impl GroupListener for TargetWatcher {
    fn member_added(&self, capability: Capability, entity: EntityId) {
        tracing::info!("[groups] {:?} joined {:?}", entity, capability);
    }

    fn member_removed(&self, capability: Capability, entity: EntityId) {
        tracing::info!("[groups] {:?} left {:?}", entity, capability);
    }
}

fn spawn_ball(
    sim: &mut Simulation<PhysicsWorld>,
    team: i32,
    position: Vec2,
    velocity: Vec2,
) -> anyhow::Result<(EntityId, interplay_core::ShapeId)> {
    let entity = sim.spawn(team);
    let body = RigidBodyBuilder::dynamic()
        .translation(Vector::new(position.x, position.y))
        .linvel(Vector::new(velocity.x, velocity.y))
        .build();
    let physics = sim.physics_mut();
    let handle = physics.add_rigid_body(entity, body);
    let shape = physics.add_collider(ColliderBuilder::ball(0.5).restitution(0.4).build(), handle);
    anyhow::ensure!(
        sim.attach_shape(entity, shape, ShapeKind::Solid),
        "entity {entity:?} vanished while spawning"
    );
    sim.add_capability(entity, Capability::AiTarget);
    Ok((entity, shape))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => RelayConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => RelayConfig::default(),
    };
    tracing::info!("[sim] config: {:?}", config);

    let physics = PhysicsWorld::new(&config);
    let mut sim = Simulation::new(config, physics)?;
    sim.groups_mut()
        .register_listener(Capability::AiTarget, Rc::new(TargetWatcher));

    // Floor
    let floor = sim.spawn(-1);
    let floor_shape = sim
        .physics_mut()
        .add_static_collider(floor, ColliderBuilder::cuboid(20.0, 0.5).build());
    sim.attach_shape(floor, floor_shape, ShapeKind::Solid);
    sim.add_capability(floor, Capability::CollIsStatic);
    if let Some(interactor) = sim.interactor_mut(floor) {
        interactor.add_static_listener(Rc::new(ImpactLogger { name: "floor" }));
    }

    // Two teammates on a collision course
    let (left, _) = spawn_ball(&mut sim, 0, Vec2::new(-4.0, 3.0), Vec2::new(6.0, 0.0))?;
    let (right, _) = spawn_ball(&mut sim, 0, Vec2::new(4.0, 3.0), Vec2::new(-6.0, 0.0))?;
    for (entity, name) in [(left, "left"), (right, "right")] {
        if let Some(interactor) = sim.interactor_mut(entity) {
            interactor.add_rigid_body_listener(Rc::new(ImpactLogger { name }));
        }
    }

    // Falls straight through the left ball
    let (ghost, _) = spawn_ball(&mut sim, 1, Vec2::new(-4.0, 6.0), Vec2::ZERO)?;
    sim.apply(RelayCommand::DisableEntityPair {
        e1: ghost,
        e2: left,
        key: LockKey::named("demo-ghost"),
    });

    // Dropped from high enough to break
    let (fragile, _) = spawn_ball(&mut sim, 2, Vec2::new(8.0, 12.0), Vec2::ZERO)?;
    let commands = sim.commands();
    if let Some(interactor) = sim.interactor_mut(fragile) {
        interactor.add_rigid_body_listener(Rc::new(Fragile {
            entity: fragile,
            commands,
        }));
    }

    let mut totals = interplay_core::TickStats::default();
    for _ in 0..TICKS {
        let stats = sim.tick();
        totals.matched += stats.matched;
        totals.synthesized += stats.synthesized;
        totals.dropped += stats.dropped;
        totals.dispatched += stats.dispatched;
    }

    if let (Some(a), Some(b)) = (sim.world().get(left), sim.world().get(right)) {
        tracing::info!(
            "[sim] teammate damage scaling: 9.0 -> {:.2}",
            a.adjusted_team_value(b, 9.0)
        );
    }

    tracing::info!(
        "[sim] {} ticks: matched={} synthesized={} dropped={} dispatched={} ai_targets={}",
        sim.current_tick(),
        totals.matched,
        totals.synthesized,
        totals.dropped,
        totals.dispatched,
        sim.groups().members(Capability::AiTarget).len(),
    );
    Ok(())
}
