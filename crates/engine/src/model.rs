//! Records held by the world and their durable JSON shape.

use hamlet_protocol::Point;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub mod defaults {
    pub const FOUNDATION_WIDTH: u32 = 100;
    pub const FOUNDATION_HEIGHT: u32 = 20;
    pub const WHEEL_RADIUS: u32 = 10;
    pub const HOUSE_WIDTH: u32 = 50;
    pub const HOUSE_HEIGHT: u32 = 50;
    pub const COMPANY_WIDTH: u32 = 100;
    pub const COMPANY_HEIGHT: u32 = 100;
    pub const COMPANY_NAME: &str = "Company";
    pub const ROAD_LENGTH: u32 = 100;
    pub const CAR_WIDTH: u32 = 30;
    pub const CAR_HEIGHT: u32 = 15;
    pub const CAR_SPEED: u32 = 2;
    pub const RESIDENT_NAME: &str = "Resident";
}

/// A placed object. The variant is fixed once the record exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PlacedObject {
    Foundation {
        x: f64,
        y: f64,
        width: u32,
        height: u32,
    },
    Wheel {
        x: f64,
        y: f64,
        radius: u32,
    },
    House {
        x: f64,
        y: f64,
        width: u32,
        height: u32,
    },
    Company {
        x: f64,
        y: f64,
        width: u32,
        height: u32,
        name: String,
    },
    /// A polyline through `points`; a straight road is just two points.
    Road {
        points: Vec<Point>,
        #[serde(default)]
        highway: bool,
    },
    Car {
        x: f64,
        y: f64,
        width: u32,
        height: u32,
        speed: u32,
    },
}

impl PlacedObject {
    pub fn kind(&self) -> &'static str {
        match self {
            PlacedObject::Foundation { .. } => "foundation",
            PlacedObject::Wheel { .. } => "wheel",
            PlacedObject::House { .. } => "house",
            PlacedObject::Company { .. } => "company",
            PlacedObject::Road { .. } => "road",
            PlacedObject::Car { .. } => "car",
        }
    }

    /// Anchor point. Roads are anchored at their first waypoint.
    pub fn position(&self) -> Point {
        match self {
            PlacedObject::Foundation { x, y, .. }
            | PlacedObject::Wheel { x, y, .. }
            | PlacedObject::House { x, y, .. }
            | PlacedObject::Company { x, y, .. }
            | PlacedObject::Car { x, y, .. } => Point::new(*x, *y),
            PlacedObject::Road { points, .. } => {
                points.first().copied().unwrap_or(Point::new(0.0, 0.0))
            }
        }
    }

    pub fn is_house(&self) -> bool {
        matches!(self, PlacedObject::House { .. })
    }
}

/// Content address of a resident bitmap (SHA-256 prefix of the raw bytes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn of(bytes: &[u8]) -> Self {
        let digest = format!("{:x}", Sha256::digest(bytes));
        Self(digest[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ImageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Wander,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resident {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub image: ImageId,
    /// Index into the object list. Only honoured while it still names a house.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_house: Option<usize>,
    #[serde(default)]
    pub action: Action,
}

impl Resident {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// The whole durable state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub objects: Vec<PlacedObject>,
    #[serde(default)]
    pub residents: Vec<Resident>,
}
