use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::GeoPoint;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriverLocation {
    pub point: GeoPoint,
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
}

impl DriverLocation {
    pub fn new(point: GeoPoint, sequence: u64) -> Self {
        Self {
            point,
            sequence,
            recorded_at: Utc::now(),
        }
    }

    pub fn recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = recorded_at;
        self
    }
}
