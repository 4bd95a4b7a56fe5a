use serde::{Deserialize, Serialize};

use crate::entities::GeoPoint;

/// How the user picked a waypoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum WaypointSource {
    TypedAddress,
    Suggestion { place_id: String },
    MapTap,
    Favorite { favorite_id: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedWaypoint {
    pub address: String,
    pub point: Option<GeoPoint>,
    pub source: Option<WaypointSource>,
}

impl NamedWaypoint {
    pub fn empty() -> Self {
        Self {
            address: "".into(),
            point: None,
            source: None,
        }
    }

    pub fn new(address: String, point: GeoPoint, source: WaypointSource) -> Self {
        Self {
            address,
            point: Some(point),
            source: Some(source),
        }
    }
}

impl Default for NamedWaypoint {
    fn default() -> Self {
        Self::empty()
    }
}
