//! Interplay Core Library
//!
//! Symmetric physics-event reconciliation and capability-based interaction
//! dispatch for fixed-step 2D games.
//!
//! The physics integrator reports each interaction from one participant's
//! point of view. This crate pairs those reports into canonical two-sided
//! events, fills in whichever side is missing, ranks collision impacts by
//! momentum and hands every entity a per-tick bundle through its
//! [`Interactor`]. Around that core it provides:
//! - Capability bit-vectors with a group registry for bulk queries
//! - Reference-counted collision suppression between shape pairs
//! - Global time stop and prioritized time scaling
//! - A `Rapier2D` backend (`PhysicsWorld`) and a [`Simulation`] driver

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod bitset;
pub mod capability;
pub mod command;
pub mod config;
pub mod contact;
pub mod controller;
pub mod event;
pub mod groups;
pub mod locker;
pub mod physics;
pub mod reconcile;
pub mod simulation;
pub mod suppression;
pub mod time;
pub mod world;

#[cfg(test)]
pub(crate) mod test_utils;

pub use bitset::BitSet;
pub use capability::{Capability, CapabilityError};
pub use command::{CommandQueue, RelayCommand};
pub use config::{ConfigError, RelayConfig};
pub use contact::{ContactPoint, EventKind, RawNotification, collision_momentum};
pub use controller::{
    DynamicImpact, Interactor, RigidBodyCollisions, StaticCollisions, StaticImpact,
    select_strongest,
};
pub use event::{BundleView, CanonicalEvent, EventCallback, event_callback};
pub use groups::{CapabilityGroups, GroupListener};
pub use locker::{LockKey, Locker};
pub use physics::{PhysicsBackend, PhysicsWorld};
pub use reconcile::{Reconciler, TickStats};
pub use simulation::Simulation;
pub use suppression::SuppressedPairs;
pub use time::{TimeControl, TimePriority};
pub use world::{EntityId, Kinematics, ShapeId, ShapeKind, World};
