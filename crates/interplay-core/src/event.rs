//! Canonical two-sided events and the per-entity bundles built from them.
//!
//! A [`PairRecord`] is stored once per reconciled interaction; each
//! participant sees it through a [`CanonicalEvent`] whose `mine` side is its
//! own. Bundles only hold [`EventRef`]s into the tick's record arena.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use glam::Vec2;

use crate::contact::{ContactPoint, EventKind, RawNotification};
use crate::world::{EntityId, ShapeId};

/// Per-event callback, run once for the side that registered it.
pub type EventCallback = Rc<dyn Fn(&CanonicalEvent<'_>, &BundleView<'_>)>;

/// Wraps a closure as an [`EventCallback`].
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(&CanonicalEvent<'_>, &BundleView<'_>) + 'static,
{
    Rc::new(f)
}

/// One participant's half of a reconciled interaction.
#[derive(Clone)]
pub struct Side {
    pub entity: EntityId,
    pub shape: ShapeId,
    pub contacts: Vec<ContactPoint>,
    pub relative_velocity: Vec2,
    /// Zero unless computed on merge.
    pub momentum: f32,
    pub callback: Option<EventCallback>,
    pub mirrored: bool,
    pub checked_on_enable: bool,
}

impl Side {
    /// Impact location as seen from this side.
    pub fn first_point(&self) -> Option<Vec2> {
        self.contacts.first().map(|c| c.point)
    }
}

impl From<RawNotification> for Side {
    fn from(note: RawNotification) -> Self {
        Self {
            entity: note.source,
            shape: note.shape,
            contacts: note.contacts,
            relative_velocity: note.relative_velocity,
            momentum: 0.0,
            callback: note.callback,
            mirrored: note.mirrored,
            checked_on_enable: note.checked_on_enable,
        }
    }
}

/// Both halves of one interaction plus the shared processed flag.
pub struct PairRecord {
    kind: EventKind,
    sides: [Side; 2],
    processed: Cell<bool>,
}

impl PairRecord {
    pub fn new(kind: EventKind, first: Side, second: Side) -> Self {
        Self {
            kind,
            sides: [first, second],
            processed: Cell::new(false),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// `index` is 0 or 1.
    pub fn side(&self, index: usize) -> &Side {
        &self.sides[index]
    }

    pub(crate) fn side_mut(&mut self, index: usize) -> &mut Side {
        &mut self.sides[index]
    }

    /// Index of the side belonging to `entity`.
    pub fn side_of(&self, entity: EntityId) -> Option<usize> {
        self.sides.iter().position(|s| s.entity == entity)
    }
}

/// Index of a record plus which side is "mine".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRef {
    pub record: usize,
    pub side: usize,
}

/// A [`PairRecord`] seen from one participant.
#[derive(Clone, Copy)]
pub struct CanonicalEvent<'a> {
    record: &'a PairRecord,
    mine: usize,
}

impl<'a> CanonicalEvent<'a> {
    pub fn new(record: &'a PairRecord, mine: usize) -> Self {
        debug_assert!(mine < 2);
        Self { record, mine }
    }

    pub fn kind(&self) -> EventKind {
        self.record.kind
    }

    /// The viewing participant's side.
    pub fn mine(&self) -> &'a Side {
        &self.record.sides[self.mine]
    }

    /// The partner's side.
    pub fn theirs(&self) -> &'a Side {
        &self.record.sides[1 - self.mine]
    }

    pub fn other_entity(&self) -> EntityId {
        self.theirs().entity
    }

    /// Sum of both sides' momentum.
    pub fn total_momentum(&self) -> f32 {
        self.mine().momentum + self.theirs().momentum
    }

    /// Difference between the two momenta relative to the larger one, zero
    /// when both are zero.
    pub fn momentum_percent_diff(&self) -> f32 {
        let mine = self.mine().momentum;
        let theirs = self.theirs().momentum;
        let larger = mine.max(theirs);
        if larger == 0.0 {
            return 0.0;
        }
        (mine - theirs).abs() / larger
    }

    pub fn is_processed(&self) -> bool {
        self.record.processed.get()
    }

    /// Shared by both sides of the record.
    pub fn set_processed(&self) {
        self.record.processed.set(true);
    }
}

/// Event references for one kind-indexed slot set.
#[derive(Debug, Default, Clone)]
pub struct EventLists {
    lists: [Vec<EventRef>; EventKind::COUNT],
}

impl EventLists {
    /// References of `kind`, in arrival order.
    pub fn of(&self, kind: EventKind) -> &[EventRef] {
        &self.lists[kind.index()]
    }

    pub fn push(&mut self, kind: EventKind, event: EventRef) {
        self.lists[kind.index()].push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(Vec::is_empty)
    }
}

/// All events one entity took part in this tick.
#[derive(Debug, Clone)]
pub struct InteractionBundle {
    entity: EntityId,
    by_other: BTreeMap<EntityId, EventLists>,
    all: EventLists,
}

impl InteractionBundle {
    pub fn new(entity: EntityId) -> Self {
        Self {
            entity,
            by_other: BTreeMap::new(),
            all: EventLists::default(),
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Files `event` under `other` and under the kind-wide list.
    pub fn push(&mut self, other: EntityId, kind: EventKind, event: EventRef) {
        self.by_other.entry(other).or_default().push(kind, event);
        self.all.push(kind, event);
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Drops every event shared with a partner `keep` rejects.
    pub fn retain_partners(
        &mut self,
        records: &[PairRecord],
        mut keep: impl FnMut(EntityId) -> bool,
    ) {
        self.by_other.retain(|other, _| keep(*other));
        let by_other = &self.by_other;
        for list in &mut self.all.lists {
            list.retain(|r| {
                records
                    .get(r.record)
                    .is_some_and(|record| by_other.contains_key(&record.side(1 - r.side).entity))
            });
        }
    }
}

/// Read-only access to a bundle and the records it points into.
#[derive(Clone, Copy)]
pub struct BundleView<'a> {
    bundle: &'a InteractionBundle,
    records: &'a [PairRecord],
}

impl<'a> BundleView<'a> {
    pub fn new(bundle: &'a InteractionBundle, records: &'a [PairRecord]) -> Self {
        Self { bundle, records }
    }

    pub fn entity(self) -> EntityId {
        self.bundle.entity
    }

    /// Entities this one interacted with, ascending.
    pub fn others(self) -> impl Iterator<Item = EntityId> + 'a {
        self.bundle.by_other.keys().copied()
    }

    /// Looks `event` up in the tick's records.
    pub fn resolve(self, event: EventRef) -> Option<CanonicalEvent<'a>> {
        self.records
            .get(event.record)
            .map(|record| CanonicalEvent::new(record, event.side))
    }

    /// Events of `kind` shared with `other`, in arrival order.
    pub fn events_with(
        self,
        other: EntityId,
        kind: EventKind,
    ) -> impl Iterator<Item = CanonicalEvent<'a>> + 'a {
        let refs = self
            .bundle
            .by_other
            .get(&other)
            .map_or(&[][..], |lists| lists.of(kind));
        self.resolve_all(refs)
    }

    /// Every event of `kind`, in arrival order.
    pub fn events(self, kind: EventKind) -> impl Iterator<Item = CanonicalEvent<'a>> + 'a {
        self.resolve_all(self.bundle.all.of(kind))
    }

    fn resolve_all(self, refs: &'a [EventRef]) -> impl Iterator<Item = CanonicalEvent<'a>> + 'a {
        let records = self.records;
        refs.iter().filter_map(move |r| {
            records
                .get(r.record)
                .map(|record| CanonicalEvent::new(record, r.side))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(entity: u64, shape: u64, momentum: f32) -> Side {
        let mut side = Side::from(
            RawNotification::new(
                EventKind::CollisionEnter,
                EntityId(entity),
                ShapeId(shape),
                EntityId(0),
                ShapeId(0),
            )
            .with_contacts([ContactPoint::new(Vec2::new(entity as f32, 0.0), Vec2::Y)]),
        );
        side.momentum = momentum;
        side
    }

    #[test]
    fn test_sides_swap_between_views() {
        let record = PairRecord::new(EventKind::CollisionEnter, side(1, 10, 3.0), side(2, 20, 1.0));

        let from_a = CanonicalEvent::new(&record, 0);
        let from_b = CanonicalEvent::new(&record, 1);

        assert_eq!(from_a.mine().entity, EntityId(1));
        assert_eq!(from_a.other_entity(), EntityId(2));
        assert_eq!(from_b.mine().entity, EntityId(2));
        assert_eq!(from_b.theirs().shape, ShapeId(10));
        assert!((from_a.total_momentum() - 4.0).abs() < f32::EPSILON);
        // |1 - 3| / 3
        assert!((from_b.momentum_percent_diff() - 2.0 / 3.0).abs() < 1e-6);
        assert!((from_a.momentum_percent_diff() - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(record.side_of(EntityId(2)), Some(1));
    }

    #[test]
    fn test_processed_is_shared() {
        let record = PairRecord::new(EventKind::CollisionEnter, side(1, 10, 0.0), side(2, 20, 0.0));
        let from_a = CanonicalEvent::new(&record, 0);
        let from_b = CanonicalEvent::new(&record, 1);

        assert!(!from_b.is_processed());
        from_a.set_processed();
        assert!(from_b.is_processed());
        assert_eq!(from_a.momentum_percent_diff(), 0.0);
    }

    #[test]
    fn test_bundle_view_lookup() {
        let records = vec![
            PairRecord::new(EventKind::CollisionEnter, side(1, 10, 0.0), side(2, 20, 0.0)),
            PairRecord::new(EventKind::TriggerStay, side(3, 30, 0.0), side(1, 11, 0.0)),
        ];
        let mut bundle = InteractionBundle::new(EntityId(1));
        bundle.push(EntityId(2), EventKind::CollisionEnter, EventRef { record: 0, side: 0 });
        bundle.push(EntityId(3), EventKind::TriggerStay, EventRef { record: 1, side: 1 });

        let view = BundleView::new(&bundle, &records);
        assert_eq!(view.others().collect::<Vec<_>>(), vec![EntityId(2), EntityId(3)]);
        assert_eq!(view.events_with(EntityId(2), EventKind::CollisionEnter).count(), 1);
        assert_eq!(view.events_with(EntityId(2), EventKind::TriggerStay).count(), 0);
        assert_eq!(view.events_with(EntityId(9), EventKind::CollisionEnter).count(), 0);

        let stay: Vec<_> = view.events(EventKind::TriggerStay).collect();
        assert_eq!(stay.len(), 1);
        assert_eq!(stay[0].mine().shape, ShapeId(11));
        assert_eq!(stay[0].other_entity(), EntityId(3));
    }

    #[test]
    fn test_retain_partners_drops_every_list() {
        let records = vec![
            PairRecord::new(EventKind::CollisionEnter, side(1, 10, 0.0), side(2, 20, 0.0)),
            PairRecord::new(EventKind::TriggerStay, side(3, 30, 0.0), side(1, 11, 0.0)),
        ];
        let mut bundle = InteractionBundle::new(EntityId(1));
        bundle.push(EntityId(2), EventKind::CollisionEnter, EventRef { record: 0, side: 0 });
        bundle.push(EntityId(3), EventKind::TriggerStay, EventRef { record: 1, side: 1 });

        bundle.retain_partners(&records, |other| other != EntityId(2));
        let view = BundleView::new(&bundle, &records);
        assert_eq!(view.others().collect::<Vec<_>>(), vec![EntityId(3)]);
        assert_eq!(view.events(EventKind::CollisionEnter).count(), 0);
        assert_eq!(view.events(EventKind::TriggerStay).count(), 1);

        bundle.retain_partners(&records, |_| false);
        assert!(bundle.is_empty());
    }
}
