//! Physics integration.
//!
//! [`PhysicsBackend`] is the seam between the reconciler and whatever steps
//! the bodies. [`PhysicsWorld`] implements it on `Rapier2D`: the entity id of
//! every body lives in its `user_data`, pair suppression goes through a
//! contact-filter hook, and the one-sided notifications are built from rapier
//! collision events plus synthesized stay events for pairs still touching.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use glam::Vec2;
use parking_lot::Mutex;
use rapier2d::prelude::*;

use crate::config::RelayConfig;
use crate::contact::{ContactPoint, EventKind, RawNotification};
use crate::world::{EntityId, Kinematics, ShapeId};

/// What the reconciler needs from a physics integrator.
pub trait PhysicsBackend {
    /// Advances by `dt` seconds and reports what each participant saw.
    fn step(&mut self, dt: f32) -> Vec<RawNotification>;

    /// Enables or disables the collision response between two shapes.
    fn ignore_collision(&mut self, a: ShapeId, b: ShapeId, ignore: bool);

    fn kinematics(&self, entity: EntityId) -> Option<Kinematics>;

    /// Drops every body and shape owned by `entity`.
    fn remove_entity(&mut self, entity: EntityId);

    /// Enter notifications, from `entity`'s side, for everything its shapes
    /// touch right now.
    fn touching(&self, entity: EntityId) -> Vec<RawNotification>;
}

impl From<ColliderHandle> for ShapeId {
    fn from(handle: ColliderHandle) -> Self {
        let (index, generation) = handle.into_raw_parts();
        ShapeId::from_parts(index, generation)
    }
}

impl From<ShapeId> for ColliderHandle {
    fn from(id: ShapeId) -> Self {
        let (index, generation) = id.parts();
        ColliderHandle::from_raw_parts(index, generation)
    }
}

fn to_vec2(x: f32, y: f32) -> Vec2 {
    Vec2::new(x, y)
}

// ============================================================================
// Hooks and event collection
// ============================================================================

/// Drops the contact response for suppressed shape pairs.
#[derive(Default)]
struct SuppressionHook {
    ignored: HashSet<(ShapeId, ShapeId)>,
}

impl SuppressionHook {
    fn key(a: ShapeId, b: ShapeId) -> (ShapeId, ShapeId) {
        if a <= b { (a, b) } else { (b, a) }
    }
}

impl PhysicsHooks for SuppressionHook {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        let key = Self::key(context.collider1.into(), context.collider2.into());
        if self.ignored.contains(&key) {
            None
        } else {
            Some(SolverFlags::COMPUTE_IMPULSES)
        }
    }
}

/// Contact set of a pair at the time rapier reported it.
#[derive(Debug, Clone)]
struct Touch {
    collider1: ShapeId,
    collider2: ShapeId,
    sensor: bool,
    /// Normal points out of collider1.
    normal: Vec2,
    points: Vec<Vec2>,
}

#[derive(Debug, Clone)]
enum Collected {
    Started(Touch),
    Stopped(Touch),
}

/// Buffers rapier events during a step. Rapier requires `Sync`.
#[derive(Default)]
struct EventCollector {
    events: Mutex<Vec<Collected>>,
}

fn touch_from_pair(
    collider1: ColliderHandle,
    collider2: ColliderHandle,
    sensor: bool,
    contact_pair: Option<&ContactPair>,
) -> Touch {
    let mut touch = Touch {
        collider1: collider1.into(),
        collider2: collider2.into(),
        sensor,
        normal: Vec2::ZERO,
        points: Vec::new(),
    };
    if let Some(pair) = contact_pair
        && let Some(manifold) = pair
            .manifolds
            .iter()
            .find(|m| !m.data.solver_contacts.is_empty())
    {
        let n = manifold.data.normal;
        touch.normal = to_vec2(n.x, n.y);
        touch.points = manifold
            .data
            .solver_contacts
            .iter()
            .map(|c| to_vec2(c.point.x, c.point.y))
            .collect();
    }
    touch
}

impl EventHandler for EventCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        contact_pair: Option<&ContactPair>,
    ) {
        let collected = match event {
            CollisionEvent::Started(h1, h2, flags) => Collected::Started(touch_from_pair(
                h1,
                h2,
                flags.contains(CollisionEventFlags::SENSOR),
                contact_pair,
            )),
            CollisionEvent::Stopped(h1, h2, flags) => Collected::Stopped(touch_from_pair(
                h1,
                h2,
                flags.contains(CollisionEventFlags::SENSOR),
                None,
            )),
        };
        self.events.lock().push(collected);
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

// ============================================================================
// PhysicsWorld
// ============================================================================

/// `Rapier2D` world that reports one-sided notifications for both colliders
/// of every pair.
pub struct PhysicsWorld {
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub integration_parameters: IntegrationParameters,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    pub gravity: Vector,
    hooks: SuppressionHook,
    collector: EventCollector,
    bodies: HashMap<EntityId, RigidBodyHandle>,
    /// Touching pairs, keyed (collider1, collider2) as rapier reported them.
    active: BTreeMap<(ShapeId, ShapeId), bool>,
    frame: u64,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(&RelayConfig::default())
    }
}

impl fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("frame", &self.frame)
            .field("rigid_body_count", &self.rigid_body_set.len())
            .field("collider_count", &self.collider_set.len())
            .field("active_pairs", &self.active.len())
            .field("ignored_pairs", &self.hooks.ignored.len())
            .finish_non_exhaustive()
    }
}

impl PhysicsWorld {
    /// Empty world using the configured gravity and step.
    pub fn new(config: &RelayConfig) -> Self {
        let integration_parameters = IntegrationParameters {
            dt: config.fixed_dt,
            ..Default::default()
        };

        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity: Vector::new(config.gravity[0], config.gravity[1]),
            hooks: SuppressionHook::default(),
            collector: EventCollector::default(),
            bodies: HashMap::new(),
            active: BTreeMap::new(),
            frame: 0,
        }
    }

    /// Adds a body owned by `entity`.
    pub fn add_rigid_body(&mut self, entity: EntityId, mut rigid_body: RigidBody) -> RigidBodyHandle {
        rigid_body.user_data = u128::from(entity.0);
        let handle = self.rigid_body_set.insert(rigid_body);
        self.bodies.insert(entity, handle);
        handle
    }

    /// Attaches a collider to a body and enables events and pair filtering.
    pub fn add_collider(&mut self, collider: Collider, parent: RigidBodyHandle) -> ShapeId {
        let collider = Self::prepare(collider);
        self.collider_set
            .insert_with_parent(collider, parent, &mut self.rigid_body_set)
            .into()
    }

    /// Adds a body-less collider owned by `entity`.
    pub fn add_static_collider(&mut self, entity: EntityId, mut collider: Collider) -> ShapeId {
        collider.user_data = u128::from(entity.0);
        self.collider_set.insert(Self::prepare(collider)).into()
    }

    fn prepare(mut collider: Collider) -> Collider {
        collider.set_active_events(collider.active_events() | ActiveEvents::COLLISION_EVENTS);
        collider.set_active_hooks(collider.active_hooks() | ActiveHooks::FILTER_CONTACT_PAIRS);
        collider
    }

    /// Colliders owned by `entity`, through its body or directly.
    fn colliders_of(&self, entity: EntityId) -> Vec<ColliderHandle> {
        if let Some(body) = self.body_of(entity) {
            return body.colliders().to_vec();
        }
        self.collider_set
            .iter()
            .filter(|(_, c)| c.parent().is_none() && c.user_data == u128::from(entity.0))
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Body registered for `entity` through `add_rigid_body`.
    pub fn body_of(&self, entity: EntityId) -> Option<&RigidBody> {
        self.rigid_body_set.get(*self.bodies.get(&entity)?)
    }

    pub fn body_of_mut(&mut self, entity: EntityId) -> Option<&mut RigidBody> {
        self.rigid_body_set.get_mut(*self.bodies.get(&entity)?)
    }

    /// `None` for unknown shapes.
    pub fn is_sensor(&self, shape: ShapeId) -> Option<bool> {
        self.collider_set
            .get(ColliderHandle::from(shape))
            .map(Collider::is_sensor)
    }

    /// Steps taken so far.
    pub fn current_frame(&self) -> u64 {
        self.frame
    }

    /// Owner of a collider through its parent body or its own `user_data`.
    fn owner_of(&self, shape: ShapeId) -> Option<EntityId> {
        let collider = self.collider_set.get(ColliderHandle::from(shape))?;
        let user_data = match collider.parent() {
            Some(parent) => self.rigid_body_set.get(parent)?.user_data,
            None => collider.user_data,
        };
        if user_data == 0 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        let id = user_data as u64;
        Some(EntityId(id))
    }

    fn velocity_of(&self, entity: EntityId) -> Vec2 {
        self.body_of(entity).map_or(Vec2::ZERO, |b| {
            let v = b.linvel();
            to_vec2(v.x, v.y)
        })
    }

    /// Both one-sided notifications for a touch.
    fn notify_both(&self, kind: EventKind, touch: &Touch, out: &mut Vec<RawNotification>) {
        let (Some(e1), Some(e2)) = (self.owner_of(touch.collider1), self.owner_of(touch.collider2))
        else {
            return;
        };
        let v1 = self.velocity_of(e1);
        let v2 = self.velocity_of(e2);

        let contacts1: Vec<ContactPoint> = touch
            .points
            .iter()
            .map(|p| ContactPoint::new(*p, -touch.normal))
            .collect();

        for (source, shape, other, other_shape, velocity, contacts) in [
            (e1, touch.collider1, e2, touch.collider2, v1 - v2, contacts1.clone()),
            (
                e2,
                touch.collider2,
                e1,
                touch.collider1,
                v2 - v1,
                contacts1.iter().map(|c| c.flipped()).collect(),
            ),
        ] {
            let mut note = RawNotification::new(kind, source, shape, other, other_shape)
                .with_relative_velocity(velocity);
            if !kind.is_trigger() {
                note = note.with_contacts(contacts);
            }
            if kind == EventKind::CollisionEnter {
                note = note.require_momentum();
            }
            out.push(note);
        }
    }

    fn stay_touch(&self, key: (ShapeId, ShapeId), sensor: bool) -> Option<Touch> {
        let (h1, h2) = (ColliderHandle::from(key.0), ColliderHandle::from(key.1));
        if sensor {
            return self
                .narrow_phase
                .intersection_pair(h1, h2)
                .filter(|hit| *hit)
                .map(|_| touch_from_pair(h1, h2, true, None));
        }
        let pair = self.narrow_phase.contact_pair(h1, h2)?;
        let touching = pair
            .manifolds
            .iter()
            .any(|m| !m.data.solver_contacts.is_empty());
        touching.then(|| touch_from_pair(h1, h2, false, Some(pair)))
    }
}

impl PhysicsBackend for PhysicsWorld {
    fn step(&mut self, dt: f32) -> Vec<RawNotification> {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            &self.hooks,
            &self.collector,
        );
        self.frame += 1;

        let collected = std::mem::take(&mut *self.collector.events.lock());
        let mut out = Vec::new();
        let mut fresh = BTreeSet::new();

        for event in &collected {
            match event {
                Collected::Started(touch) => {
                    let kind = if touch.sensor {
                        EventKind::TriggerEnter
                    } else {
                        EventKind::CollisionEnter
                    };
                    self.notify_both(kind, touch, &mut out);
                    self.active
                        .insert((touch.collider1, touch.collider2), touch.sensor);
                    fresh.insert((touch.collider1, touch.collider2));
                }
                Collected::Stopped(touch) => {
                    let kind = if touch.sensor {
                        EventKind::TriggerExit
                    } else {
                        EventKind::CollisionExit
                    };
                    self.notify_both(kind, touch, &mut out);
                    self.active.remove(&(touch.collider1, touch.collider2));
                }
            }
        }

        let staying: Vec<((ShapeId, ShapeId), bool)> = self
            .active
            .iter()
            .filter(|(key, _)| !fresh.contains(*key))
            .map(|(key, sensor)| (*key, *sensor))
            .collect();
        for (key, sensor) in staying {
            let Some(touch) = self.stay_touch(key, sensor) else {
                continue;
            };
            let kind = if sensor {
                EventKind::TriggerStay
            } else {
                EventKind::CollisionStay
            };
            self.notify_both(kind, &touch, &mut out);
        }

        tracing::trace!(
            frame = self.frame,
            notifications = out.len(),
            "[physics] step"
        );
        out
    }

    fn ignore_collision(&mut self, a: ShapeId, b: ShapeId, ignore: bool) {
        let key = SuppressionHook::key(a, b);
        if ignore {
            self.hooks.ignored.insert(key);
        } else {
            self.hooks.ignored.remove(&key);
        }
    }

    fn remove_entity(&mut self, entity: EntityId) {
        let colliders = self.colliders_of(entity);
        let shapes: Vec<ShapeId> = colliders.iter().map(|h| ShapeId::from(*h)).collect();
        self.active
            .retain(|(a, b), _| !shapes.contains(a) && !shapes.contains(b));

        if let Some(handle) = self.bodies.remove(&entity) {
            self.rigid_body_set.remove(
                handle,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            );
        } else {
            for handle in colliders {
                self.collider_set.remove(
                    handle,
                    &mut self.island_manager,
                    &mut self.rigid_body_set,
                    true,
                );
            }
        }
        tracing::trace!("[physics] removed {:?} ({} shapes)", entity, shapes.len());
    }

    fn touching(&self, entity: EntityId) -> Vec<RawNotification> {
        let mut both = Vec::new();
        for handle in self.colliders_of(entity) {
            for (h1, h2, intersecting) in self.narrow_phase.intersection_pairs_with(handle) {
                if intersecting {
                    let touch = touch_from_pair(h1, h2, true, None);
                    self.notify_both(EventKind::TriggerEnter, &touch, &mut both);
                }
            }
            for pair in self.narrow_phase.contact_pairs_with(handle) {
                let touching = pair
                    .manifolds
                    .iter()
                    .any(|m| !m.data.solver_contacts.is_empty());
                if touching {
                    let touch = touch_from_pair(pair.collider1, pair.collider2, false, Some(pair));
                    self.notify_both(EventKind::CollisionEnter, &touch, &mut both);
                }
            }
        }
        both
            .into_iter()
            .filter(|note| note.source == entity)
            .map(RawNotification::checked_on_enable)
            .collect()
    }

    fn kinematics(&self, entity: EntityId) -> Option<Kinematics> {
        let body = self.body_of(entity)?;
        let linvel = body.linvel();
        let com = body.center_of_mass();
        Some(Kinematics {
            linvel: to_vec2(linvel.x, linvel.y),
            angvel: body.angvel(),
            mass: body.mass(),
            center_of_mass: to_vec2(com.x, com.y),
        })
    }
}
