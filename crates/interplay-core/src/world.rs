//! Entity table: interactors, their shapes and last-known kinematics.
//!
//! Everything outside this module refers to entities and shapes through the
//! copyable [`EntityId`] / [`ShapeId`] handles and resolves them here, so a
//! handle to something that has been despawned simply fails to resolve.

use std::collections::{BTreeMap, HashMap};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::controller::Interactor;
use crate::groups::CapabilityGroups;
use crate::physics::PhysicsBackend;

/// Stable entity handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

/// Stable handle of one collision shape owned by an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeId(pub u64);

impl ShapeId {
    /// Packs an arena index and generation into one id.
    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | index as u64)
    }

    pub const fn parts(self) -> (u32, u32) {
        (self.0 as u32, (self.0 >> 32) as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeKind {
    /// Produces contacts and a collision response.
    Solid,
    /// Overlap-only volume.
    Trigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeInfo {
    pub owner: EntityId,
    pub kind: ShapeKind,
}

/// Rigid-body state sampled before a physics step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Kinematics {
    pub linvel: Vec2,
    /// Radians per second, counter-clockwise positive.
    pub angvel: f32,
    pub mass: f32,
    /// World-space centre of mass.
    pub center_of_mass: Vec2,
}

/// Owns every [`Interactor`] plus the shape and kinematics tables.
pub struct World {
    interactors: BTreeMap<EntityId, Interactor>,
    shapes: BTreeMap<ShapeId, ShapeInfo>,
    kinematics: HashMap<EntityId, Kinematics>,
    next_entity: u64,
    same_team_divisor: f32,
}

impl Default for World {
    fn default() -> Self {
        Self::new(3.0)
    }
}

impl World {
    /// Empty world; ids start at 1.
    pub fn new(same_team_divisor: f32) -> Self {
        Self {
            interactors: BTreeMap::new(),
            shapes: BTreeMap::new(),
            kinematics: HashMap::new(),
            next_entity: 1,
            same_team_divisor,
        }
    }

    /// Creates an enabled interactor with no capabilities.
    pub fn spawn(&mut self, team: i32) -> EntityId {
        let id = EntityId(self.next_entity);
        self.next_entity += 1;
        self.interactors
            .insert(id, Interactor::new(id, team, self.same_team_divisor));
        id
    }

    /// Removes an entity, its group memberships and every shape it owns.
    pub fn despawn(&mut self, id: EntityId, groups: &mut CapabilityGroups) -> Option<Interactor> {
        let mut interactor = self.interactors.remove(&id)?;
        interactor.disable(groups);
        self.shapes.retain(|_, info| info.owner != id);
        self.kinematics.remove(&id);
        Some(interactor)
    }

    /// Whether `id` is spawned and not yet despawned.
    pub fn contains(&self, id: EntityId) -> bool {
        self.interactors.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Interactor> {
        self.interactors.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Interactor> {
        self.interactors.get_mut(&id)
    }

    /// Interactors in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Interactor)> {
        self.interactors.iter().map(|(id, i)| (*id, i))
    }

    pub fn len(&self) -> usize {
        self.interactors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactors.is_empty()
    }

    /// Records `shape` as owned by `owner`. Fails if the owner is unknown.
    pub fn attach_shape(&mut self, owner: EntityId, shape: ShapeId, kind: ShapeKind) -> bool {
        if !self.contains(owner) {
            return false;
        }
        self.shapes.insert(shape, ShapeInfo { owner, kind });
        true
    }

    /// Forgets `shape`, returning what was known about it.
    pub fn detach_shape(&mut self, shape: ShapeId) -> Option<ShapeInfo> {
        self.shapes.remove(&shape)
    }

    pub fn shape(&self, shape: ShapeId) -> Option<ShapeInfo> {
        self.shapes.get(&shape).copied()
    }

    /// Shapes owned by `owner` in ascending id order.
    pub fn shapes_of(&self, owner: EntityId) -> Vec<ShapeId> {
        self.shapes
            .iter()
            .filter(|(_, info)| info.owner == owner)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Stores the sample used for momentum until the next `sample_kinematics`.
    pub fn set_kinematics(&mut self, id: EntityId, kinematics: Kinematics) {
        if self.contains(id) {
            self.kinematics.insert(id, kinematics);
        }
    }

    /// Last kinematics sampled for `id`, used for momentum after the step.
    pub fn last_kinematics(&self, id: EntityId) -> Option<Kinematics> {
        self.kinematics.get(&id).copied()
    }

    /// Samples every live entity's kinematics from the backend.
    pub fn sample_kinematics(&mut self, physics: &dyn PhysicsBackend) {
        for id in self.interactors.keys() {
            if let Some(k) = physics.kinematics(*id) {
                self.kinematics.insert(*id, k);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;

    #[test]
    fn test_spawn_and_despawn() {
        let mut world = World::default();
        let mut groups = CapabilityGroups::new();

        let a = world.spawn(0);
        let b = world.spawn(1);
        assert_ne!(a, b);
        assert_eq!(world.len(), 2);

        world
            .get_mut(a)
            .unwrap()
            .add_support_for_interaction(Capability::AiTarget, &mut groups);
        world.attach_shape(a, ShapeId(10), ShapeKind::Solid);
        world.attach_shape(a, ShapeId(11), ShapeKind::Trigger);
        world.set_kinematics(a, Kinematics::default());

        assert_eq!(world.shapes_of(a), vec![ShapeId(10), ShapeId(11)]);
        assert_eq!(groups.members(Capability::AiTarget), &[a]);

        assert!(world.despawn(a, &mut groups).is_some());
        assert!(!world.contains(a));
        assert!(world.shape(ShapeId(10)).is_none());
        assert!(world.last_kinematics(a).is_none());
        assert!(groups.members(Capability::AiTarget).is_empty());
        assert!(world.despawn(a, &mut groups).is_none());
    }

    #[test]
    fn test_attach_shape_requires_owner() {
        let mut world = World::default();
        assert!(!world.attach_shape(EntityId(99), ShapeId(1), ShapeKind::Solid));
        assert!(world.shape(ShapeId(1)).is_none());
    }

    #[test]
    fn test_shape_id_parts() {
        let id = ShapeId::from_parts(7, 3);
        assert_eq!(id.parts(), (7, 3));
    }
}
