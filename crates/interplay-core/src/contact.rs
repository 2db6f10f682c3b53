//! One-sided notifications as reported by the physics integrator.

use std::fmt;

use glam::Vec2;

use crate::event::EventCallback;
use crate::world::{EntityId, Kinematics, ShapeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    TriggerEnter,
    TriggerStay,
    TriggerExit,
    CollisionEnter,
    CollisionStay,
    CollisionExit,
}

impl EventKind {
    pub const COUNT: usize = 6;

    /// Callback order: triggers first, then collisions.
    pub const ALL: [EventKind; Self::COUNT] = [
        Self::TriggerEnter,
        Self::TriggerStay,
        Self::TriggerExit,
        Self::CollisionEnter,
        Self::CollisionStay,
        Self::CollisionExit,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn is_trigger(self) -> bool {
        matches!(
            self,
            Self::TriggerEnter | Self::TriggerStay | Self::TriggerExit
        )
    }
}

/// A single contact point, normal pointing from the other shape into ours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub point: Vec2,
    pub normal: Vec2,
}

impl ContactPoint {
    /// `normal` points from the other shape into ours.
    pub fn new(point: Vec2, normal: Vec2) -> Self {
        Self { point, normal }
    }

    /// Same point seen from the other shape.
    pub fn flipped(self) -> Self {
        Self {
            point: self.point,
            normal: -self.normal,
        }
    }
}

/// What one participant reported about an interaction.
#[derive(Clone)]
pub struct RawNotification {
    pub kind: EventKind,
    pub source: EntityId,
    pub shape: ShapeId,
    pub other: Option<EntityId>,
    pub other_shape: Option<ShapeId>,
    pub contacts: Vec<ContactPoint>,
    pub relative_velocity: Vec2,
    /// Whether the collision momentum should be computed on merge.
    pub momentum_required: bool,
    /// Invoked once for the source side when the event is dispatched.
    pub callback: Option<EventCallback>,
    /// Synthesized from the opposite side's report.
    pub mirrored: bool,
    /// Enter reported by the overlap check run when an interactor is enabled,
    /// rather than by a physics step.
    pub checked_on_enable: bool,
}

impl RawNotification {
    /// Report by `source`, with no contacts, momentum or callback yet.
    pub fn new(
        kind: EventKind,
        source: EntityId,
        shape: ShapeId,
        other: EntityId,
        other_shape: ShapeId,
    ) -> Self {
        Self {
            kind,
            source,
            shape,
            other: Some(other),
            other_shape: Some(other_shape),
            contacts: Vec::new(),
            relative_velocity: Vec2::ZERO,
            momentum_required: false,
            callback: None,
            mirrored: false,
            checked_on_enable: false,
        }
    }

    /// Replaces the contact points.
    pub fn with_contacts(mut self, contacts: impl IntoIterator<Item = ContactPoint>) -> Self {
        self.contacts = contacts.into_iter().collect();
        self
    }

    /// Our velocity minus theirs.
    pub fn with_relative_velocity(mut self, velocity: Vec2) -> Self {
        self.relative_velocity = velocity;
        self
    }

    /// Callback run once when our side is dispatched.
    pub fn with_callback(mut self, callback: EventCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Asks the reconciler to compute collision momentum on merge.
    pub fn require_momentum(mut self) -> Self {
        self.momentum_required = true;
        self
    }

    /// Marks the report as coming from the overlap check on enable.
    pub fn checked_on_enable(mut self) -> Self {
        self.checked_on_enable = true;
        self
    }

    /// Whether `other` is the opposite side of the same interaction.
    pub fn complements(&self, other: &RawNotification) -> bool {
        self.kind == other.kind
            && self.other == Some(other.source)
            && other.other == Some(self.source)
            && self.other_shape == Some(other.shape)
            && other.other_shape == Some(self.shape)
    }

    /// Report the other participant would have sent. `None` without one.
    pub fn mirrored(&self) -> Option<RawNotification> {
        let other = self.other?;
        let other_shape = self.other_shape?;

        Some(RawNotification {
            kind: self.kind,
            source: other,
            shape: other_shape,
            other: Some(self.source),
            other_shape: Some(self.shape),
            contacts: self.contacts.iter().map(|c| c.flipped()).collect(),
            relative_velocity: -self.relative_velocity,
            momentum_required: self.momentum_required,
            callback: None,
            mirrored: true,
            checked_on_enable: self.checked_on_enable,
        })
    }
}

impl fmt::Debug for RawNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawNotification")
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("shape", &self.shape)
            .field("other", &self.other)
            .field("other_shape", &self.other_shape)
            .field("contacts", &self.contacts.len())
            .field("callback", &self.callback.is_some())
            .field("mirrored", &self.mirrored)
            .finish_non_exhaustive()
    }
}

/// Momentum one body carried into a collision.
///
/// Per contact point: the linear part is the velocity component along the
/// inverted normal; the angular part is the tangential velocity at the point
/// along the same direction, weighted by `angular_weight` and counted only
/// when it drives into the contact. Both are averaged over the points,
/// summed and scaled by mass. Returns `None` without contact points.
pub fn collision_momentum(
    contacts: &[ContactPoint],
    kinematics: &Kinematics,
    angular_weight: f32,
) -> Option<f32> {
    if contacts.is_empty() {
        return None;
    }

    let mut linear = 0.0;
    let mut angular = 0.0;
    for contact in contacts {
        let inward = -contact.normal;
        linear += inward.dot(kinematics.linvel);

        let arm = contact.point - kinematics.center_of_mass;
        let tangential = arm.perp().normalize_or_zero() * kinematics.angvel * arm.length();
        let rotational = inward.dot(tangential) * angular_weight;
        if rotational > 0.0 {
            angular += rotational;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let n = contacts.len() as f32;
    Some((linear / n + angular / n) * kinematics.mass)
}
