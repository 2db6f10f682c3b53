//! Reference-counted named locks.
//!
//! A [`Locker`] stays locked while at least one key is held. Every caller
//! acquires under its own key and must release with the same key; a resource
//! guarded by a locker only becomes active again once the last key is gone.
//! Releasing a key that was never acquired is a no-op.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// Interned lock identifier.
///
/// Keys are derived from a name at compile time so comparisons are plain
/// integer equality:
///
/// ```
/// use interplay_core::locker::LockKey;
///
/// const GRAPPLE: LockKey = LockKey::named("grapple");
/// assert_eq!(GRAPPLE, LockKey::named("grapple"));
/// assert_ne!(GRAPPLE, LockKey::named("thorns"));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey(u64);

impl LockKey {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    /// Interns `name` with 64-bit FNV-1a.
    pub const fn named(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Key from a raw id, e.g. an entity or ability instance number.
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<&str> for LockKey {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl fmt::Debug for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockKey({:#018x})", self.0)
    }
}

/// Set of named locks plus named locks that expire on their own.
#[derive(Clone)]
pub struct Locker<K = LockKey> {
    lockers: HashSet<K>,
    timed: HashMap<K, f32>,
}

impl<K> Default for Locker<K> {
    fn default() -> Self {
        Self {
            lockers: HashSet::new(),
            timed: HashMap::new(),
        }
    }
}

impl<K: Hash + Eq + Clone> Locker<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires `key`. Acquiring an already-held key has no extra effect.
    pub fn set_locker(&mut self, key: K) {
        self.lockers.insert(key);
    }

    /// Releases `key`, returning whether it was held.
    pub fn remove_locker(&mut self, key: &K) -> bool {
        self.lockers.remove(key)
    }

    /// Acquires `key` for `duration` seconds, restarting any running countdown.
    pub fn set_timed_locker(&mut self, key: K, duration: f32) {
        self.timed.insert(key, duration.max(0.0));
    }

    /// Cancels a timed lock before it expires.
    pub fn remove_timed_locker(&mut self, key: &K) -> bool {
        self.timed.remove(key).is_some()
    }

    /// Advances every countdown by `dt` and drops the ones that ran out.
    ///
    /// Returns the keys that expired during this call.
    pub fn update(&mut self, dt: f32) -> Vec<K> {
        if self.timed.is_empty() {
            return Vec::new();
        }

        let mut expired = Vec::new();
        for (key, remaining) in &mut self.timed {
            *remaining -= dt;
            if *remaining <= 0.0 {
                expired.push(key.clone());
            }
        }
        for key in &expired {
            self.timed.remove(key);
        }
        expired
    }

    /// Any named or timed lock is held.
    pub fn is_locked(&self) -> bool {
        !self.lockers.is_empty() || !self.timed.is_empty()
    }

    /// Named plus timed locks.
    pub fn num_locks(&self) -> usize {
        self.lockers.len() + self.timed.len()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lockers.contains(key)
    }

    pub fn contains_timed(&self, key: &K) -> bool {
        self.timed.contains_key(key)
    }

    /// Seconds left on a timed key.
    pub fn remaining(&self, key: &K) -> Option<f32> {
        self.timed.get(key).copied()
    }

    /// Drops every key, timed or not.
    pub fn clear(&mut self) {
        self.lockers.clear();
        self.timed.clear();
    }

    /// Untimed keys currently held.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.lockers.iter()
    }
}

impl<K: fmt::Debug> fmt::Debug for Locker<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locker")
            .field("lockers", &self.lockers)
            .field("timed", &self.timed)
            .finish()
    }
}
