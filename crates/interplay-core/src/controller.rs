//! Per-entity interaction controller.
//!
//! An [`Interactor`] owns the entity's capability bits, team id and the
//! listener sets that receive collision impacts. Once per tick the reconciler
//! hands it a [`BundleView`] of everything it touched; the controller picks
//! the strongest collision per partner and forwards it to the right listener
//! kind, then runs per-event callbacks.

use std::rc::Rc;

use glam::Vec2;

use crate::bitset::BitSet;
use crate::capability::Capability;
use crate::contact::EventKind;
use crate::event::{BundleView, CanonicalEvent};
use crate::groups::CapabilityGroups;
use crate::world::{EntityId, World};

/// Collision between two bodies that both carry momentum.
#[derive(Clone, Copy)]
pub struct DynamicImpact<'a> {
    pub event: CanonicalEvent<'a>,
    pub other: EntityId,
    /// Peak momentum on this side across the tick's enter events.
    pub my_momentum: f32,
    pub their_momentum: f32,
    pub impact_point: Vec2,
    pub bundle: BundleView<'a>,
}

/// Collision where one participant is static.
#[derive(Clone, Copy)]
pub struct StaticImpact<'a> {
    pub event: CanonicalEvent<'a>,
    pub other: EntityId,
    /// Peak momentum of the dynamic side.
    pub momentum: f32,
    pub impact_point: Vec2,
    pub bundle: BundleView<'a>,
}

/// Listener on a dynamic body.
pub trait RigidBodyCollisions {
    /// Hit another dynamic body.
    fn dynamic_collision(&self, impact: &DynamicImpact<'_>);
    /// Hit something static.
    fn static_collision(&self, impact: &StaticImpact<'_>);
}

/// Listener on a static body.
pub trait StaticCollisions {
    /// A dynamic body hit us.
    fn collision(&self, impact: &StaticImpact<'_>);
}

/// Which side's momentum ranks the candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weighing {
    /// Both dynamic: rank by combined momentum.
    Total,
    /// The other side is static: rank by ours.
    Mine,
    /// We are static: rank by theirs.
    Theirs,
}

/// The per-event numbers [`select_strongest`] looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactCandidate {
    pub my_momentum: f32,
    pub their_momentum: f32,
    pub my_point: Option<Vec2>,
    pub their_point: Option<Vec2>,
}

impl ImpactCandidate {
    pub fn from_event(event: &CanonicalEvent<'_>) -> Self {
        Self {
            my_momentum: event.mine().momentum,
            their_momentum: event.theirs().momentum,
            my_point: event.mine().first_point(),
            their_point: event.theirs().first_point(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Strongest {
    /// Index into the candidate slice.
    pub index: usize,
    pub my_peak: f32,
    pub their_peak: f32,
    pub impact_point: Vec2,
}

/// Picks the enter event to report for one partner.
///
/// Candidates without contact points on our side are ignored. A candidate has
/// to beat the running maximum, which starts at zero, so a set of
/// zero-momentum contacts yields `None`. Peaks are taken over every candidate
/// that has contacts.
pub fn select_strongest(candidates: &[ImpactCandidate], weighing: Weighing) -> Option<Strongest> {
    let mut best: Option<(usize, f32)> = None;
    let mut my_peak = 0.0_f32;
    let mut their_peak = 0.0_f32;

    for (i, c) in candidates.iter().enumerate() {
        if c.my_point.is_none() {
            continue;
        }
        my_peak = my_peak.max(c.my_momentum);
        their_peak = their_peak.max(c.their_momentum);

        let score = match weighing {
            Weighing::Total => c.my_momentum + c.their_momentum,
            Weighing::Mine => c.my_momentum,
            Weighing::Theirs => c.their_momentum,
        };
        if score > best.map_or(0.0, |(_, s)| s) {
            best = Some((i, score));
        }
    }

    let (index, _) = best?;
    let chosen = &candidates[index];
    let impact_point = match weighing {
        Weighing::Theirs => chosen.their_point.or(chosen.my_point),
        Weighing::Total | Weighing::Mine => chosen.my_point,
    }?;

    Some(Strongest {
        index,
        my_peak,
        their_peak,
        impact_point,
    })
}

/// Capability bits, team and listeners of one entity.
pub struct Interactor {
    id: EntityId,
    capabilities: BitSet,
    team: i32,
    enabled: bool,
    same_team_divisor: f32,
    rigid_listeners: Vec<Rc<dyn RigidBodyCollisions>>,
    static_listeners: Vec<Rc<dyn StaticCollisions>>,
}

impl Interactor {
    /// Enabled, with no capabilities or listeners.
    pub fn new(id: EntityId, team: i32, same_team_divisor: f32) -> Self {
        Self {
            id,
            capabilities: BitSet::new(),
            team,
            enabled: true,
            same_team_divisor,
            rigid_listeners: Vec::new(),
            static_listeners: Vec::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Declared capability bits, by ordinal.
    pub fn capabilities(&self) -> &BitSet {
        &self.capabilities
    }

    // ========================================================================
    // Capabilities
    // ========================================================================

    /// Declares `cap`; group-tracked capabilities join their group while enabled.
    pub fn add_support_for_interaction(&mut self, cap: Capability, groups: &mut CapabilityGroups) {
        self.capabilities.set_bit(cap.ordinal());
        if self.enabled && cap.is_group_tracked() {
            groups.register_with_group(cap, self.id);
        }
    }

    /// Withdraws `cap` and leaves its group.
    pub fn stop_supporting_interaction(&mut self, cap: Capability, groups: &mut CapabilityGroups) {
        self.capabilities.clear_bit(cap.ordinal());
        if self.enabled && cap.is_group_tracked() {
            groups.unregister_with_group(cap, self.id);
        }
    }

    pub fn supports_interaction(&self, cap: Capability) -> bool {
        self.capabilities.is_set(cap.ordinal())
    }

    /// True iff every bit in `required` is supported.
    pub fn supports_interactions(&self, required: &BitSet) -> bool {
        required.is_subset_of(&self.capabilities)
    }

    /// Static interactors contribute no momentum.
    pub fn is_static(&self) -> bool {
        self.supports_interaction(Capability::CollIsStatic)
    }

    // ========================================================================
    // Teams
    // ========================================================================

    pub fn team(&self) -> i32 {
        self.team
    }

    pub fn set_team(&mut self, team: i32) {
        self.team = team;
    }

    /// Negative team ids never match.
    pub fn on_same_team_id(&self, team: i32) -> bool {
        self.team >= 0 && self.team == team
    }

    /// Both on the same non-negative team.
    pub fn on_same_team(&self, other: &Interactor) -> bool {
        self.on_same_team_id(other.team)
    }

    /// Scales `value` down when `other` is a teammate.
    pub fn adjusted_team_value(&self, other: &Interactor, value: f32) -> f32 {
        if self.on_same_team(other) {
            value / self.same_team_divisor
        } else {
            value
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Re-registers every group-tracked capability.
    pub fn enable(&mut self, groups: &mut CapabilityGroups) {
        if self.enabled {
            return;
        }
        self.enabled = true;
        for cap in self.tracked_capabilities() {
            groups.register_with_group(cap, self.id);
        }
    }

    /// Leaves every group; no dispatch reaches a disabled interactor.
    pub fn disable(&mut self, groups: &mut CapabilityGroups) {
        if !self.enabled {
            return;
        }
        self.enabled = false;
        for cap in self.tracked_capabilities() {
            groups.unregister_with_group(cap, self.id);
        }
    }

    fn tracked_capabilities(&self) -> Vec<Capability> {
        self.capabilities
            .set_bits()
            .filter_map(|bit| Capability::try_from(bit).ok())
            .filter(|cap| cap.is_group_tracked())
            .collect()
    }

    /// Drops every collision listener.
    pub fn reset(&mut self) {
        self.rigid_listeners.clear();
        self.static_listeners.clear();
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// No-op if `listener` is already registered.
    pub fn add_rigid_body_listener(&mut self, listener: Rc<dyn RigidBodyCollisions>) {
        if !self.rigid_listeners.iter().any(|l| Rc::ptr_eq(l, &listener)) {
            self.rigid_listeners.push(listener);
        }
    }

    pub fn remove_rigid_body_listener(&mut self, listener: &Rc<dyn RigidBodyCollisions>) {
        self.rigid_listeners.retain(|l| !Rc::ptr_eq(l, listener));
    }

    /// No-op if `listener` is already registered.
    pub fn add_static_listener(&mut self, listener: Rc<dyn StaticCollisions>) {
        if !self.static_listeners.iter().any(|l| Rc::ptr_eq(l, &listener)) {
            self.static_listeners.push(listener);
        }
    }

    pub fn remove_static_listener(&mut self, listener: &Rc<dyn StaticCollisions>) {
        self.static_listeners.retain(|l| !Rc::ptr_eq(l, listener));
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Reports this tick's interactions to listeners and callbacks.
    ///
    /// Partners that no longer exist in `world` are skipped.
    pub fn on_collision_and_trigger_events(&self, view: BundleView<'_>, world: &World) {
        for other in view.others() {
            let Some(partner) = world.get(other) else {
                tracing::trace!("[dispatch] {:?}: partner {:?} is gone", self.id, other);
                continue;
            };
            self.dispatch_impact(view, other, self.is_static(), partner.is_static());
        }

        self.send_event_callbacks(view);
    }

    fn dispatch_impact(
        &self,
        view: BundleView<'_>,
        other: EntityId,
        me_static: bool,
        they_static: bool,
    ) {
        let weighing = match (me_static, they_static) {
            (false, false) if !self.rigid_listeners.is_empty() => Weighing::Total,
            (false, true) if !self.rigid_listeners.is_empty() => Weighing::Mine,
            (true, false) if !self.static_listeners.is_empty() => Weighing::Theirs,
            _ => return,
        };

        let events: Vec<CanonicalEvent<'_>> = view
            .events_with(other, EventKind::CollisionEnter)
            .collect();
        if events.is_empty() {
            return;
        }
        let candidates: Vec<ImpactCandidate> =
            events.iter().map(ImpactCandidate::from_event).collect();
        let Some(strongest) = select_strongest(&candidates, weighing) else {
            return;
        };
        let event = events[strongest.index];

        match weighing {
            Weighing::Total => {
                let impact = DynamicImpact {
                    event,
                    other,
                    my_momentum: strongest.my_peak,
                    their_momentum: strongest.their_peak,
                    impact_point: strongest.impact_point,
                    bundle: view,
                };
                for listener in &self.rigid_listeners {
                    listener.dynamic_collision(&impact);
                }
            }
            Weighing::Mine => {
                let impact = StaticImpact {
                    event,
                    other,
                    momentum: strongest.my_peak,
                    impact_point: strongest.impact_point,
                    bundle: view,
                };
                for listener in &self.rigid_listeners {
                    listener.static_collision(&impact);
                }
            }
            Weighing::Theirs => {
                let impact = StaticImpact {
                    event,
                    other,
                    momentum: strongest.their_peak,
                    impact_point: strongest.impact_point,
                    bundle: view,
                };
                for listener in &self.static_listeners {
                    listener.collision(&impact);
                }
            }
        }
    }

    /// Runs the callback attached to our side of each event, triggers first.
    fn send_event_callbacks(&self, view: BundleView<'_>) {
        for kind in EventKind::ALL {
            for event in view.events(kind) {
                if let Some(callback) = &event.mine().callback {
                    callback(&event, &view);
                    event.set_processed();
                }
            }
        }
    }
}
