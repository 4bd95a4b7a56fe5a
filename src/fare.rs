use serde::{Deserialize, Serialize};

use crate::entities::RouteResult;

/// Minimum fare plus a per-kilometre rate, as drivers quote it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FareSchedule {
    pub base_fare: f64,
    pub rate_per_km: f64,
}

impl FareSchedule {
    pub fn new(base_fare: f64, rate_per_km: f64) -> Self {
        Self {
            base_fare,
            rate_per_km,
        }
    }

    pub fn estimate(&self, route: &RouteResult) -> f64 {
        self.base_fare.max(self.rate_per_km * route.distance_km())
    }
}

#[test]
fn fare_never_below_base() {
    let schedule = FareSchedule::new(4000.0, 1500.0);

    let short = RouteResult::new(vec![], 800, 120);
    assert_eq!(schedule.estimate(&short), 4000.0);

    let long = RouteResult::new(vec![], 3200, 480);
    assert_eq!(schedule.estimate(&long), 4800.0);
}
