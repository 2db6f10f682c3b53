//! Declared gameplay capabilities.
//!
//! Every entity carries a [`BitSet`](crate::bitset::BitSet) indexed by
//! [`Capability::ordinal`]. A handful of capabilities are *group-tracked*:
//! their membership is mirrored into the
//! [`CapabilityGroups`](crate::groups::CapabilityGroups) registry so other
//! systems can query "everything with capability X" in bulk.

use serde::{Deserialize, Serialize};

use crate::bitset::BitSet;

/// Error type for capability lookups.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("unknown capability ordinal: {0}")]
    UnknownOrdinal(usize),
}

/// A named boolean trait an entity may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Capability {
    /// Can enter a pass-through portal.
    CanPassThrough,
    /// Colliding with a passing body cancels its pass-through.
    CollCancelsPassThrough,
    /// Ends a pass-through after being launched by it.
    EndsPassThrough,
    AffectedByShockwave,
    AffectedByForceSlam,
    CanBeGrappled,
    /// Can be locked on to by a grappling hook.
    GrappleLockOn,
    LanceLockOn,
    AffectedByGrappleChain,
    CollCancelsWarp,
    CollActivatesWarpOverride,
    PulledByWarpLine,
    GrabbedByThorns,
    DeathZone,
    ZappedByTeslaCoil,
    PushedByTeslaCoil,
    CollCanStunShip,
    /// Static body: contributes no momentum to a collision.
    CollIsStatic,
    CollKillsAtMaxDamage,
    /// Valid target for enemy AI.
    AiTarget,
    CanPickupHealth,
    CanPickupAbilityPoints,
    CanBeLaunchedByCannon,
    KnocksOffRails,
    KillsOnContact,
    CanBeCriticallyHitByColl,
    TriggersThornGrabTimer,
}

impl Capability {
    /// All capabilities in ordinal order.
    pub const ALL: [Capability; 27] = [
        Self::CanPassThrough,
        Self::CollCancelsPassThrough,
        Self::EndsPassThrough,
        Self::AffectedByShockwave,
        Self::AffectedByForceSlam,
        Self::CanBeGrappled,
        Self::GrappleLockOn,
        Self::LanceLockOn,
        Self::AffectedByGrappleChain,
        Self::CollCancelsWarp,
        Self::CollActivatesWarpOverride,
        Self::PulledByWarpLine,
        Self::GrabbedByThorns,
        Self::DeathZone,
        Self::ZappedByTeslaCoil,
        Self::PushedByTeslaCoil,
        Self::CollCanStunShip,
        Self::CollIsStatic,
        Self::CollKillsAtMaxDamage,
        Self::AiTarget,
        Self::CanPickupHealth,
        Self::CanPickupAbilityPoints,
        Self::CanBeLaunchedByCannon,
        Self::KnocksOffRails,
        Self::KillsOnContact,
        Self::CanBeCriticallyHitByColl,
        Self::TriggersThornGrabTimer,
    ];

    /// Bit index of this capability.
    #[inline]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// Whether membership is mirrored into the group registry.
    ///
    /// Only capabilities somebody queries in bulk are tracked; everything else
    /// is a plain bit with no registry side effects.
    pub const fn is_group_tracked(self) -> bool {
        matches!(
            self,
            Self::AffectedByShockwave
                | Self::AffectedByForceSlam
                | Self::AiTarget
                | Self::PulledByWarpLine
                | Self::GrappleLockOn
                | Self::CanPassThrough
        )
    }

    /// Builds a bit-vector from a list of capabilities.
    pub fn set_of(capabilities: &[Capability]) -> BitSet {
        capabilities.iter().map(|c| c.ordinal()).collect()
    }
}

impl TryFrom<usize> for Capability {
    type Error = CapabilityError;

    fn try_from(ordinal: usize) -> Result<Self, Self::Error> {
        Self::ALL
            .get(ordinal)
            .copied()
            .ok_or(CapabilityError::UnknownOrdinal(ordinal))
    }
}
