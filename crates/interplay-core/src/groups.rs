//! Capability group registry.
//!
//! Mirrors membership of the group-tracked capabilities so collaborators such
//! as a targeting system can ask for "every entity affected by shockwaves"
//! without scanning the whole world.

use std::collections::HashMap;
use std::rc::Rc;

use crate::capability::Capability;
use crate::world::EntityId;

/// Receives membership changes for the capabilities it subscribed to.
pub trait GroupListener {
    fn member_added(&self, capability: Capability, entity: EntityId);
    fn member_removed(&self, capability: Capability, entity: EntityId);
}

#[derive(Default)]
struct Group {
    members: Vec<EntityId>,
    listeners: Vec<Rc<dyn GroupListener>>,
}

/// Capability → members + membership listeners.
#[derive(Default)]
pub struct CapabilityGroups {
    groups: HashMap<Capability, Group>,
}

impl CapabilityGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `entity` to the group, notifying listeners if it was not a member.
    pub fn register_with_group(&mut self, capability: Capability, entity: EntityId) -> bool {
        let group = self.groups.entry(capability).or_default();
        if group.members.contains(&entity) {
            return false;
        }

        group.members.push(entity);
        tracing::trace!("[groups] {:?} += {:?}", capability, entity);
        for listener in &group.listeners {
            listener.member_added(capability, entity);
        }
        true
    }

    /// Removes `entity` from the group, notifying listeners if it was a member.
    pub fn unregister_with_group(&mut self, capability: Capability, entity: EntityId) -> bool {
        let Some(group) = self.groups.get_mut(&capability) else {
            return false;
        };
        let Some(pos) = group.members.iter().position(|m| *m == entity) else {
            return false;
        };

        group.members.remove(pos);
        tracing::trace!("[groups] {:?} -= {:?}", capability, entity);
        for listener in &group.listeners {
            listener.member_removed(capability, entity);
        }
        true
    }

    /// Idempotent by pointer identity.
    pub fn register_listener(&mut self, capability: Capability, listener: Rc<dyn GroupListener>) {
        let group = self.groups.entry(capability).or_default();
        if !group.listeners.iter().any(|l| Rc::ptr_eq(l, &listener)) {
            group.listeners.push(listener);
        }
    }

    /// Removes `listener` by pointer identity.
    pub fn unregister_listener(&mut self, capability: Capability, listener: &Rc<dyn GroupListener>) {
        if let Some(group) = self.groups.get_mut(&capability) {
            group.listeners.retain(|l| !Rc::ptr_eq(l, listener));
        }
    }

    /// Live member list in registration order.
    pub fn members(&self, capability: Capability) -> &[EntityId] {
        self.groups
            .get(&capability)
            .map_or(&[], |g| g.members.as_slice())
    }

    pub fn contains(&self, capability: Capability, entity: EntityId) -> bool {
        self.members(capability).contains(&entity)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        log: RefCell<Vec<(Capability, EntityId, bool)>>,
    }

    impl GroupListener for Recorder {
        fn member_added(&self, capability: Capability, entity: EntityId) {
            self.log.borrow_mut().push((capability, entity, true));
        }

        fn member_removed(&self, capability: Capability, entity: EntityId) {
            self.log.borrow_mut().push((capability, entity, false));
        }
    }

    #[test]
    fn test_members_add_and_remove() {
        let mut groups = CapabilityGroups::new();
        let a = EntityId(1);

        assert!(groups.members(Capability::AiTarget).is_empty());

        groups.register_with_group(Capability::AiTarget, a);
        assert_eq!(groups.members(Capability::AiTarget), &[a]);

        groups.unregister_with_group(Capability::AiTarget, a);
        assert!(groups.members(Capability::AiTarget).is_empty());
    }

    #[test]
    fn test_no_duplicates() {
        let mut groups = CapabilityGroups::new();
        assert!(groups.register_with_group(Capability::GrappleLockOn, EntityId(3)));
        assert!(!groups.register_with_group(Capability::GrappleLockOn, EntityId(3)));
        assert_eq!(groups.members(Capability::GrappleLockOn).len(), 1);
    }

    #[test]
    fn test_listeners_notified_once_per_change() {
        let mut groups = CapabilityGroups::new();
        let recorder = Rc::new(Recorder::default());
        let listener: Rc<dyn GroupListener> = recorder.clone();

        groups.register_listener(Capability::AffectedByShockwave, listener.clone());
        groups.register_listener(Capability::AffectedByShockwave, listener.clone());

        groups.register_with_group(Capability::AffectedByShockwave, EntityId(7));
        groups.register_with_group(Capability::AffectedByShockwave, EntityId(7));
        groups.unregister_with_group(Capability::AffectedByShockwave, EntityId(7));
        groups.unregister_with_group(Capability::AffectedByShockwave, EntityId(7));
        // Other capability: not subscribed
        groups.register_with_group(Capability::AiTarget, EntityId(7));

        assert_eq!(
            *recorder.log.borrow(),
            vec![
                (Capability::AffectedByShockwave, EntityId(7), true),
                (Capability::AffectedByShockwave, EntityId(7), false),
            ]
        );

        groups.unregister_listener(Capability::AffectedByShockwave, &listener);
        groups.register_with_group(Capability::AffectedByShockwave, EntityId(8));
        assert_eq!(recorder.log.borrow().len(), 2);
    }
}
