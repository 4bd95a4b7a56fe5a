use crate::entities::{GeoPoint, Leg, RouteRequest, RouteResult};
use crate::error::Error;
use crate::geo::has_moved;

#[derive(Debug, Default)]
struct LegState {
    previous: Option<(GeoPoint, GeoPoint)>,
    issued: u64,
    pending: Option<u64>,
    result: Option<RouteResult>,
    last_error: Option<Error>,
}

impl LegState {
    fn reset(&mut self) {
        self.previous = None;
        self.pending = None;
        self.result = None;
        self.last_error = None;
    }
}

/// Keeps at most one fresh route per leg.
///
/// Each issued request carries a per-leg token that only ever grows; a
/// completion is committed only if its token is the one still pending.
#[derive(Debug)]
pub struct RouteCoordinator {
    epsilon: f64,
    driver_to_pickup: LegState,
    pickup_to_destination: LegState,
}

impl RouteCoordinator {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            driver_to_pickup: LegState::default(),
            pickup_to_destination: LegState::default(),
        }
    }

    fn leg(&self, leg: Leg) -> &LegState {
        match leg {
            Leg::DriverToPickup => &self.driver_to_pickup,
            Leg::PickupToDestination => &self.pickup_to_destination,
        }
    }

    fn leg_mut(&mut self, leg: Leg) -> &mut LegState {
        match leg {
            Leg::DriverToPickup => &mut self.driver_to_pickup,
            Leg::PickupToDestination => &mut self.pickup_to_destination,
        }
    }

    pub fn on_driver_or_pickup_changed(
        &mut self,
        driver: Option<GeoPoint>,
        pickup: Option<GeoPoint>,
    ) -> Option<RouteRequest> {
        self.on_endpoints_changed(Leg::DriverToPickup, driver, pickup)
    }

    pub fn on_pickup_or_destination_changed(
        &mut self,
        pickup: Option<GeoPoint>,
        destination: Option<GeoPoint>,
    ) -> Option<RouteRequest> {
        self.on_endpoints_changed(Leg::PickupToDestination, pickup, destination)
    }

    #[tracing::instrument(skip(self))]
    fn on_endpoints_changed(
        &mut self,
        leg: Leg,
        origin: Option<GeoPoint>,
        destination: Option<GeoPoint>,
    ) -> Option<RouteRequest> {
        let epsilon = self.epsilon;
        let state = self.leg_mut(leg);

        let (origin, destination) = match (origin, destination) {
            (Some(origin), Some(destination)) => (origin, destination),
            _ => {
                if state.previous.is_some() || state.result.is_some() || state.pending.is_some() {
                    tracing::info!(leg = leg.name(), "endpoint absent, clearing route");
                }
                state.reset();
                return None;
            }
        };

        let (previous_origin, previous_destination) = match state.previous {
            Some((o, d)) => (Some(o), Some(d)),
            None => (None, None),
        };

        if !has_moved(previous_origin, Some(origin), epsilon)
            && !has_moved(previous_destination, Some(destination), epsilon)
        {
            tracing::debug!(leg = leg.name(), "endpoints within epsilon, keeping route");
            return None;
        }

        // recorded before the request resolves so jitter during flight is absorbed
        state.previous = Some((origin, destination));
        state.issued += 1;
        state.pending = Some(state.issued);
        state.result = None;

        tracing::info!(leg = leg.name(), token = state.issued, "issuing directions request");

        Some(RouteRequest {
            leg,
            token: state.issued,
            origin,
            destination,
        })
    }

    /// Applies a directions outcome. Returns whether a new route was committed.
    #[tracing::instrument(skip(self, outcome))]
    pub fn complete(
        &mut self,
        leg: Leg,
        token: u64,
        outcome: Result<RouteResult, Error>,
    ) -> bool {
        let state = self.leg_mut(leg);

        if state.pending != Some(token) {
            tracing::debug!(
                leg = leg.name(),
                token,
                latest = state.issued,
                "discarding superseded directions response"
            );
            return false;
        }

        state.pending = None;

        match outcome {
            Ok(route) => {
                tracing::info!(
                    leg = leg.name(),
                    token,
                    distance_meters = route.distance_meters,
                    "route committed"
                );
                state.result = Some(route);
                state.last_error = None;
                true
            }
            Err(err) => {
                tracing::warn!(leg = leg.name(), token, ?err, "directions request failed");
                state.last_error = Some(err);
                false
            }
        }
    }

    pub fn route(&self, leg: Leg) -> Option<&RouteResult> {
        self.leg(leg).result.as_ref()
    }

    pub fn last_error(&self, leg: Leg) -> Option<&Error> {
        self.leg(leg).last_error.as_ref()
    }

    pub fn is_pending(&self, leg: Leg) -> bool {
        self.leg(leg).pending.is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.driver_to_pickup.pending.is_some() || self.pickup_to_destination.pending.is_some()
    }

    pub fn clear(&mut self) {
        self.driver_to_pickup.reset();
        self.pickup_to_destination.reset();
    }
}

#[cfg(test)]
fn sample_route(distance_meters: i64) -> RouteResult {
    RouteResult::new(
        vec![GeoPoint::new(1.0, -77.0), GeoPoint::new(1.01, -77.01)],
        distance_meters,
        distance_meters / 8,
    )
}

#[test]
fn same_pair_twice_issues_one_request() {
    let mut coordinator = RouteCoordinator::new(0.0001);
    let driver = Some(GeoPoint::new(1.15, -77.06));
    let pickup = Some(GeoPoint::new(1.1556, -77.0625));

    assert!(coordinator.on_driver_or_pickup_changed(driver, pickup).is_some());
    assert!(coordinator.on_driver_or_pickup_changed(driver, pickup).is_none());
}

#[test]
fn jitter_during_flight_does_not_reissue() {
    let mut coordinator = RouteCoordinator::new(0.0001);
    let pickup = Some(GeoPoint::new(1.1556, -77.0625));

    let request = coordinator
        .on_driver_or_pickup_changed(Some(GeoPoint::new(1.15, -77.06)), pickup)
        .unwrap();
    assert!(coordinator
        .on_driver_or_pickup_changed(Some(GeoPoint::new(1.15004, -77.06003)), pickup)
        .is_none());
    assert!(coordinator.is_pending(Leg::DriverToPickup));

    assert!(coordinator.complete(request.leg, request.token, Ok(sample_route(900))));
    assert!(!coordinator.is_pending(Leg::DriverToPickup));
}

#[test]
fn latest_request_wins_when_older_resolves_last() {
    let mut coordinator = RouteCoordinator::new(0.0001);
    let pickup = Some(GeoPoint::new(1.1556, -77.0625));

    let a = coordinator
        .on_pickup_or_destination_changed(pickup, Some(GeoPoint::new(1.1483, -77.0811)))
        .unwrap();
    let b = coordinator
        .on_pickup_or_destination_changed(pickup, Some(GeoPoint::new(1.17, -77.0)))
        .unwrap();
    assert!(b.token > a.token);

    assert!(coordinator.complete(b.leg, b.token, Ok(sample_route(5000))));
    assert!(!coordinator.complete(a.leg, a.token, Ok(sample_route(2700))));

    let route = coordinator.route(Leg::PickupToDestination).unwrap();
    assert_eq!(route.distance_meters, 5000);
}

#[test]
fn older_response_arriving_first_is_discarded() {
    let mut coordinator = RouteCoordinator::new(0.0001);
    let pickup = Some(GeoPoint::new(1.1556, -77.0625));

    let a = coordinator
        .on_pickup_or_destination_changed(pickup, Some(GeoPoint::new(1.1483, -77.0811)))
        .unwrap();
    let b = coordinator
        .on_pickup_or_destination_changed(pickup, Some(GeoPoint::new(1.17, -77.0)))
        .unwrap();

    assert!(!coordinator.complete(a.leg, a.token, Ok(sample_route(2700))));
    assert!(coordinator.route(Leg::PickupToDestination).is_none());
    assert!(coordinator.is_pending(Leg::PickupToDestination));

    assert!(coordinator.complete(b.leg, b.token, Ok(sample_route(5000))));
}

#[test]
fn failure_keeps_result_absent_and_records_error() {
    use crate::error::directions_error;

    let mut coordinator = RouteCoordinator::new(0.0001);
    let request = coordinator
        .on_pickup_or_destination_changed(
            Some(GeoPoint::new(1.1556, -77.0625)),
            Some(GeoPoint::new(1.1483, -77.0811)),
        )
        .unwrap();

    assert!(!coordinator.complete(
        request.leg,
        request.token,
        Err(directions_error("ZERO_RESULTS"))
    ));
    assert!(coordinator.route(Leg::PickupToDestination).is_none());
    assert_eq!(
        coordinator.last_error(Leg::PickupToDestination).unwrap().code,
        6
    );
    assert!(!coordinator.has_pending());
}

#[test]
fn absent_endpoint_clears_leg_and_rejects_in_flight_result() {
    let mut coordinator = RouteCoordinator::new(0.0001);
    let driver = Some(GeoPoint::new(1.15, -77.06));
    let pickup = Some(GeoPoint::new(1.1556, -77.0625));

    let first = coordinator.on_driver_or_pickup_changed(driver, pickup).unwrap();
    assert!(coordinator.complete(first.leg, first.token, Ok(sample_route(900))));

    let second = coordinator
        .on_driver_or_pickup_changed(Some(GeoPoint::new(1.14, -77.05)), pickup)
        .unwrap();
    assert!(coordinator.route(Leg::DriverToPickup).is_none());

    assert!(coordinator.on_driver_or_pickup_changed(None, pickup).is_none());
    assert!(!coordinator.complete(second.leg, second.token, Ok(sample_route(1200))));
    assert!(coordinator.route(Leg::DriverToPickup).is_none());

    // previous values were reset, so the same pair is requested again
    assert!(coordinator.on_driver_or_pickup_changed(driver, pickup).is_some());
}

#[test]
fn legs_are_independent() {
    let mut coordinator = RouteCoordinator::new(0.0001);
    let driver = Some(GeoPoint::new(1.15, -77.06));
    let pickup = Some(GeoPoint::new(1.1556, -77.0625));
    let destination = Some(GeoPoint::new(1.1483, -77.0811));

    let to_pickup = coordinator.on_driver_or_pickup_changed(driver, pickup).unwrap();
    let to_destination = coordinator
        .on_pickup_or_destination_changed(pickup, destination)
        .unwrap();
    assert_eq!(to_pickup.token, 1);
    assert_eq!(to_destination.token, 1);

    assert!(coordinator.complete(to_destination.leg, to_destination.token, Ok(sample_route(2700))));
    assert!(coordinator.is_pending(Leg::DriverToPickup));
    assert!(coordinator.route(Leg::DriverToPickup).is_none());
}
