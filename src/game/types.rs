//! Identity and pose types shared across the AI tier.

use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::util::math::heading_or_default;

/// Stable identity of a ship, assigned by the host.
/// The AI tier never holds host objects, only these ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShipId(pub u64);

impl fmt::Display for ShipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ship#{}", self.0)
    }
}

/// Ambient group identity
pub type GroupId = uuid::Uuid;

/// Ship class, which selects the base profile and engagement tactics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipClass {
    Scout,
    LightFighter,
    HeavyFighter,
    Carrier,
    Freighter,
    HeavyFreighter,
}

impl ShipClass {
    pub const ALL: [ShipClass; 6] = [
        ShipClass::Scout,
        ShipClass::LightFighter,
        ShipClass::HeavyFighter,
        ShipClass::Carrier,
        ShipClass::Freighter,
        ShipClass::HeavyFreighter,
    ];

    /// Tag used by the host's ship definitions
    pub fn tag(&self) -> &'static str {
        match self {
            ShipClass::Scout => "scout",
            ShipClass::LightFighter => "light_fighter",
            ShipClass::HeavyFighter => "heavy_fighter",
            ShipClass::Carrier => "carrier",
            ShipClass::Freighter => "freighter",
            ShipClass::HeavyFreighter => "heavy_freighter",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.tag() == tag)
    }

    pub fn is_fighter(&self) -> bool {
        matches!(self, ShipClass::LightFighter | ShipClass::HeavyFighter)
    }

    pub fn is_freighter(&self) -> bool {
        matches!(self, ShipClass::Freighter | ShipClass::HeavyFreighter)
    }
}

/// Position plus unit heading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub forward: Vec3,
}

impl Pose {
    pub fn new(position: Vec3, forward: Vec3) -> Self {
        Self {
            position,
            forward: heading_or_default(forward),
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::Z,
        }
    }
}
