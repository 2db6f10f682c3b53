//! Symmetric event reconciliation.
//!
//! The physics integrator reports every interaction from each participant's
//! point of view, but either report may be missing: one shape may have been
//! filtered, or one participant may not listen for events at all. The
//! [`Reconciler`] pairs complementary reports into one [`PairRecord`],
//! synthesizes the missing side for unpaired ones, and only then hands each
//! entity a view of everything it took part in.
//!
//! Per tick:
//! 1. Gather: [`Reconciler::notify`] for every raw notification.
//! 2. Complete: mirror what is still unpaired.
//! 3. Dispatch: one [`BundleView`] per live, enabled entity.
//! 4. Clear.
//!
//! [`Reconciler::finish_tick`] runs steps 2-4 in order.

use std::collections::{BTreeMap, HashSet};

use crate::capability::Capability;
use crate::config::RelayConfig;
use crate::contact::{EventKind, RawNotification, collision_momentum};
use crate::event::{BundleView, EventRef, InteractionBundle, PairRecord, Side};
use crate::world::{EntityId, World};

/// Counters for one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    /// Records built from two real reports.
    pub matched: usize,
    /// Records completed with a mirrored side.
    pub synthesized: usize,
    /// Notifications dropped for a missing participant.
    pub dropped: usize,
    /// Entities that received a bundle.
    pub dispatched: usize,
}

type Buckets = BTreeMap<EntityId, Vec<RawNotification>>;

/// Pairs one-sided notifications into canonical events once per tick.
pub struct Reconciler {
    max_contact_points: usize,
    angular_weight: f32,
    /// Unpaired notifications per kind, bucketed by source entity.
    pending: [Buckets; EventKind::COUNT],
    records: Vec<PairRecord>,
    bundles: BTreeMap<EntityId, InteractionBundle>,
    /// Entities signalled as destroyed but possibly still in the world.
    destroyed: HashSet<EntityId>,
    stats: TickStats,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(&RelayConfig::default())
    }
}

impl Reconciler {
    /// Takes the contact cap and angular weight from `config`.
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            max_contact_points: config.max_contact_points,
            angular_weight: config.angular_weight,
            pending: Default::default(),
            records: Vec::new(),
            bundles: BTreeMap::new(),
            destroyed: HashSet::new(),
            stats: TickStats::default(),
        }
    }

    fn is_alive(&self, entity: EntityId, world: &World) -> bool {
        world.contains(entity) && !self.destroyed.contains(&entity)
    }

    /// Marks `entity` as gone for the rest of the tick.
    pub fn on_entity_destroyed(&mut self, entity: EntityId) {
        self.destroyed.insert(entity);
    }

    // ========================================================================
    // Gather
    // ========================================================================

    /// Accepts one side's report of an interaction.
    pub fn notify(&mut self, mut note: RawNotification, world: &World) {
        let Some(other) = note.other else {
            tracing::trace!("[reconcile] {:?} has no other participant", note);
            self.stats.dropped += 1;
            return;
        };
        if !self.is_alive(note.source, world) {
            tracing::trace!("[reconcile] source {:?} is gone", note.source);
            self.stats.dropped += 1;
            return;
        }
        note.contacts.truncate(self.max_contact_points);

        let slot = note.kind.index();
        let matched = self.pending[slot].get_mut(&other).and_then(|bucket| {
            let pos = bucket.iter().position(|p| p.complements(&note))?;
            Some(bucket.remove(pos))
        });

        match matched {
            Some(partner) => {
                self.stats.matched += 1;
                self.merge(partner, note, world);
            }
            None => self.pending[slot].entry(note.source).or_default().push(note),
        }
    }

    // ========================================================================
    // Complete
    // ========================================================================

    /// Mirrors every unpaired notification whose other side is still alive.
    pub(crate) fn complete(&mut self, world: &World) {
        for slot in 0..EventKind::COUNT {
            let buckets = std::mem::take(&mut self.pending[slot]);
            for note in buckets.into_values().flatten() {
                let alive = note.other.is_some_and(|other| self.is_alive(other, world));
                let mirror = if alive { note.mirrored() } else { None };
                match mirror {
                    Some(mirror) => {
                        self.stats.synthesized += 1;
                        self.merge(note, mirror, world);
                    }
                    None => {
                        tracing::trace!("[reconcile] dropped unpaired {:?}", note);
                        self.stats.dropped += 1;
                    }
                }
            }
        }
    }

    fn merge(&mut self, first: RawNotification, second: RawNotification, world: &World) {
        let kind = first.kind;
        let wants_momentum = first.momentum_required || second.momentum_required;
        let mut record = PairRecord::new(kind, Side::from(first), Side::from(second));

        if kind == EventKind::CollisionEnter && wants_momentum {
            for index in 0..2 {
                let side = record.side_mut(index);
                side.momentum = self.side_momentum(side, world);
            }
        }

        let id = self.records.len();
        for side in 0..2 {
            let me = record.side(side).entity;
            let other = record.side(1 - side).entity;
            self.bundles
                .entry(me)
                .or_insert_with(|| InteractionBundle::new(me))
                .push(other, kind, EventRef { record: id, side });
        }
        self.records.push(record);
    }

    /// Static sides and sides without sampled kinematics contribute nothing.
    fn side_momentum(&self, side: &Side, world: &World) -> f32 {
        let is_static = world
            .get(side.entity)
            .is_none_or(|i| i.supports_interaction(Capability::CollIsStatic));
        if is_static {
            return 0.0;
        }
        world
            .last_kinematics(side.entity)
            .and_then(|k| collision_momentum(&side.contacts, &k, self.angular_weight))
            .unwrap_or(0.0)
    }

    // ========================================================================
    // Dispatch / Clear
    // ========================================================================

    /// Hands every live, enabled entity its bundle in ascending id order.
    ///
    /// Events whose partner is gone are removed first, so neither impacts
    /// nor callbacks ever reference a destroyed entity.
    pub(crate) fn dispatch(&mut self, world: &World) {
        let destroyed = &self.destroyed;
        let records = &self.records;
        for bundle in self.bundles.values_mut() {
            bundle.retain_partners(records, |other| {
                world.contains(other) && !destroyed.contains(&other)
            });
        }

        for (entity, bundle) in &self.bundles {
            if bundle.is_empty() || !self.is_alive(*entity, world) {
                continue;
            }
            let Some(interactor) = world.get(*entity) else {
                continue;
            };
            if !interactor.is_enabled() {
                continue;
            }
            let view = BundleView::new(bundle, &self.records);
            interactor.on_collision_and_trigger_events(view, world);
            self.stats.dispatched += 1;
        }
    }

    pub(crate) fn clear(&mut self) -> TickStats {
        for buckets in &mut self.pending {
            buckets.clear();
        }
        self.records.clear();
        self.bundles.clear();
        self.destroyed.clear();
        std::mem::take(&mut self.stats)
    }

    /// Completes, dispatches and clears the current tick.
    pub fn finish_tick(&mut self, world: &World) -> TickStats {
        self.complete(world);
        self.dispatch(world);
        let stats = self.clear();
        if stats != TickStats::default() {
            tracing::debug!(
                matched = stats.matched,
                synthesized = stats.synthesized,
                dropped = stats.dropped,
                dispatched = stats.dispatched,
                "[reconcile] tick"
            );
        }
        stats
    }

    /// Notifications still waiting for their other side.
    pub fn pending_count(&self) -> usize {
        self.pending
            .iter()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    #[cfg(test)]
    pub(crate) fn records(&self) -> &[PairRecord] {
        &self.records
    }
}
