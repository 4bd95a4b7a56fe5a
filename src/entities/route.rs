use geo_types::LineString;
use serde::{Deserialize, Serialize};

use crate::entities::GeoPoint;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    DriverToPickup,
    PickupToDestination,
}

impl Leg {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DriverToPickup => "driver_to_pickup",
            Self::PickupToDestination => "pickup_to_destination",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub legs: Vec<GeoPoint>,
    pub distance_meters: i64,
    pub duration_seconds: i64,
}

impl RouteResult {
    pub fn new(legs: Vec<GeoPoint>, distance_meters: i64, duration_seconds: i64) -> Self {
        Self {
            legs,
            distance_meters,
            duration_seconds,
        }
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_meters as f64 / 1000.0
    }

    pub fn line_string(&self) -> LineString<f64> {
        self.legs
            .iter()
            .map(|point| (point.longitude, point.latitude))
            .collect::<Vec<_>>()
            .into()
    }
}

/// A directions query the caller must run and report back with its token.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub leg: Leg,
    pub token: u64,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
}

#[test]
fn route_line_string_uses_lng_lat() {
    let route = RouteResult::new(
        vec![GeoPoint::new(1.0, -77.0), GeoPoint::new(1.1, -77.1)],
        1200,
        180,
    );

    let line = route.line_string();
    assert_eq!(line.0.len(), 2);
    assert_eq!(line.0[0].x, -77.0);
    assert_eq!(line.0[1].y, 1.1);
    assert_eq!(route.distance_km(), 1.2);
}
