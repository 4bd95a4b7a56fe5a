use chrono::{DateTime, Utc};
use geo_types::Rect;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::reconciler::{MarkerLayer, RenderedMarker};
use super::route_coordinator::RouteCoordinator;
use super::viewport::ViewportFitController;
use crate::api::Camera;
use crate::config::Config;
use crate::entities::{
    parse_markers, DriverLocation, GeoPoint, Leg, NamedWaypoint, NearbyDriverMarker,
    RequestingPassengerMarker, RouteRequest, RouteResult,
};
use crate::error::{invalid_state_error, Error};
use crate::geo::has_moved;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapState {
    Idle,
    PickupSet,
    RouteToDestinationPending,
    RoutesReady,
    TripRequested,
}

impl MapState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PickupSet => "pickup_set",
            Self::RouteToDestinationPending => "route_to_destination_pending",
            Self::RoutesReady => "routes_ready",
            Self::TripRequested => "trip_requested",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    NearbyDriver,
    RequestingPassenger,
}

/// What the caller has to do after an input was applied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Effects {
    pub route_requests: Vec<RouteRequest>,
    pub fitted: Option<Rect<f64>>,
    pub rerender: bool,
}

impl Effects {
    fn rerender() -> Self {
        Self {
            rerender: true,
            ..Self::default()
        }
    }
}

/// Everything the presentation surface needs to draw the map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderState {
    pub state: MapState,
    pub center: GeoPoint,
    pub user_location: Option<GeoPoint>,
    pub pickup: NamedWaypoint,
    pub destination: NamedWaypoint,
    pub driver: Option<GeoPoint>,
    pub driver_route: Option<RouteResult>,
    pub trip_route: Option<RouteResult>,
    pub fare_estimate: Option<f64>,
    pub nearby_drivers: Vec<RenderedMarker<NearbyDriverMarker>>,
    pub requesting_passengers: Vec<RenderedMarker<RequestingPassengerMarker>>,
    pub selected_driver: Option<String>,
    pub selected_passenger: Option<String>,
}

pub struct TripMap<C: Camera> {
    config: Config,
    pickup: NamedWaypoint,
    destination: NamedWaypoint,
    driver: Option<DriverLocation>,
    last_driver_sequence: Option<u64>,
    rendered_driver: Option<GeoPoint>,
    user_location: Option<GeoPoint>,
    center: GeoPoint,
    routes: RouteCoordinator,
    viewport: ViewportFitController<C>,
    nearby_drivers: MarkerLayer<NearbyDriverMarker>,
    requesting_passengers: MarkerLayer<RequestingPassengerMarker>,
    trip_requested: bool,
}

impl<C: Camera> TripMap<C> {
    pub fn new(config: Config, camera: C) -> Self {
        let viewport = ViewportFitController::new(
            camera,
            config.route_epsilon_degrees,
            config.fit_padding_px,
            config.auto_fit_disabled,
        );

        Self {
            pickup: NamedWaypoint::empty(),
            destination: NamedWaypoint::empty(),
            driver: None,
            last_driver_sequence: None,
            rendered_driver: None,
            user_location: None,
            center: config.default_center,
            routes: RouteCoordinator::new(config.route_epsilon_degrees),
            viewport,
            nearby_drivers: MarkerLayer::new(config.route_epsilon_degrees),
            requesting_passengers: MarkerLayer::new(config.route_epsilon_degrees),
            trip_requested: false,
            config,
        }
    }

    pub fn state(&self) -> MapState {
        if self.trip_requested {
            return MapState::TripRequested;
        }

        match (self.pickup.point, self.destination.point) {
            (Some(_), Some(_)) if self.routes.has_pending() => MapState::RouteToDestinationPending,
            (Some(_), Some(_)) => MapState::RoutesReady,
            (Some(_), None) => MapState::PickupSet,
            // a destination alone cannot be routed yet
            (None, _) => MapState::Idle,
        }
    }

    pub fn camera(&self) -> &C {
        self.viewport.camera()
    }

    pub fn route(&self, leg: Leg) -> Option<&RouteResult> {
        self.routes.route(leg)
    }

    pub fn route_error(&self, leg: Leg) -> Option<&Error> {
        self.routes.last_error(leg)
    }

    pub fn has_pending_routes(&self) -> bool {
        self.routes.has_pending()
    }

    fn driver_point(&self) -> Option<GeoPoint> {
        self.driver.map(|d| d.point)
    }

    fn sync_routes(&mut self, effects: &mut Effects) {
        let driver = self.driver_point();
        let pickup = self.pickup.point;
        let destination = self.destination.point;

        let had_driver_route = self.routes.route(Leg::DriverToPickup).is_some();
        let had_trip_route = self.routes.route(Leg::PickupToDestination).is_some();

        effects
            .route_requests
            .extend(self.routes.on_driver_or_pickup_changed(driver, pickup));
        effects
            .route_requests
            .extend(self.routes.on_pickup_or_destination_changed(pickup, destination));

        let dropped_route = (had_driver_route && self.routes.route(Leg::DriverToPickup).is_none())
            || (had_trip_route && self.routes.route(Leg::PickupToDestination).is_none());
        if dropped_route || !effects.route_requests.is_empty() {
            effects.rerender = true;
        }
    }

    fn sync_viewport(&mut self, effects: &mut Effects) {
        effects.fitted =
            self.viewport
                .on_waypoints_changed(self.pickup.point, self.destination.point, self.driver_point());
    }

    fn on_waypoint_changed(&mut self) -> Effects {
        let mut effects = Effects::rerender();
        self.sync_routes(&mut effects);
        self.sync_viewport(&mut effects);

        tracing::info!(state = self.state().name(), "waypoints changed");
        effects
    }

    fn accepts_waypoint_changes(&self) -> bool {
        if self.trip_requested {
            tracing::warn!("trip already requested, ignoring waypoint change");
            return false;
        }
        true
    }

    fn sanitize(waypoint: NamedWaypoint) -> NamedWaypoint {
        match waypoint.point {
            Some(point) if !point.is_valid() => {
                tracing::warn!(?point, "dropping invalid waypoint coordinates");
                NamedWaypoint {
                    point: None,
                    ..waypoint
                }
            }
            _ => waypoint,
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn set_pickup(&mut self, pickup: NamedWaypoint) -> Effects {
        if !self.accepts_waypoint_changes() {
            return Effects::default();
        }

        self.pickup = Self::sanitize(pickup);
        self.on_waypoint_changed()
    }

    #[tracing::instrument(skip(self))]
    pub fn set_destination(&mut self, destination: NamedWaypoint) -> Effects {
        if !self.accepts_waypoint_changes() {
            return Effects::default();
        }

        self.destination = Self::sanitize(destination);
        self.on_waypoint_changed()
    }

    pub fn clear_pickup(&mut self) -> Effects {
        self.set_pickup(NamedWaypoint::empty())
    }

    pub fn clear_destination(&mut self) -> Effects {
        self.set_destination(NamedWaypoint::empty())
    }

    /// Back to an empty planning view. Feeds (driver, markers, geolocation)
    /// are kept, but the driver sequence starts over and marker selections
    /// are dropped.
    #[tracing::instrument(skip(self))]
    pub fn reset(&mut self) -> Effects {
        self.pickup = NamedWaypoint::empty();
        self.destination = NamedWaypoint::empty();
        self.trip_requested = false;
        self.last_driver_sequence = None;
        self.routes.clear();
        self.viewport.reset();
        self.nearby_drivers.clear_selection();
        self.requesting_passengers.clear_selection();

        tracing::info!("trip map reset");
        Effects::rerender()
    }

    #[tracing::instrument(skip(self))]
    pub fn update_driver_location(&mut self, location: DriverLocation) -> Effects {
        if let Some(last) = self.last_driver_sequence {
            if location.sequence <= last {
                tracing::debug!(sequence = location.sequence, last, "out of order driver tick");
                return Effects::default();
            }
        }

        if !location.point.is_valid() {
            tracing::warn!(point = ?location.point, "dropping invalid driver location");
            return Effects::default();
        }

        self.last_driver_sequence = Some(location.sequence);
        self.driver = Some(location);

        let mut effects = Effects::default();
        self.sync_routes(&mut effects);

        if has_moved(
            self.rendered_driver,
            Some(location.point),
            self.config.marker_epsilon_degrees,
        ) {
            self.rendered_driver = Some(location.point);
            effects.rerender = true;
        }

        effects
    }

    /// The location feed stopped or failed; hide the driver. A restarted
    /// feed may number its ticks from scratch.
    #[tracing::instrument(skip(self))]
    pub fn clear_driver_location(&mut self) -> Effects {
        self.last_driver_sequence = None;

        if self.driver.is_none() {
            return Effects::default();
        }

        self.driver = None;
        self.rendered_driver = None;

        let mut effects = Effects::rerender();
        self.sync_routes(&mut effects);
        effects
    }

    /// Hides a driver whose last tick is older than the configured TTL.
    pub fn expire_driver_location(&mut self, now: DateTime<Utc>) -> Effects {
        match self.driver {
            Some(driver) if now - driver.recorded_at > self.config.driver_location_ttl => {
                tracing::info!(sequence = driver.sequence, "driver location expired");
                self.clear_driver_location()
            }
            _ => Effects::default(),
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn on_geolocation(&mut self, reading: Result<GeoPoint, Error>) -> Effects {
        let previous = (self.user_location, self.center);

        match reading {
            Ok(point) if point.is_valid() => {
                if self.user_location.is_none() {
                    self.center = point;
                }
                if has_moved(
                    self.user_location,
                    Some(point),
                    self.config.marker_epsilon_degrees,
                ) {
                    self.user_location = Some(point);
                }
            }
            Ok(point) => {
                tracing::warn!(?point, "invalid geolocation reading, using default center");
                self.user_location = None;
                self.center = self.config.default_center;
            }
            Err(err) => {
                tracing::warn!(?err, "geolocation failed, using default center");
                self.user_location = None;
                self.center = self.config.default_center;
            }
        }

        if previous != (self.user_location, self.center) {
            return Effects::rerender();
        }
        Effects::default()
    }

    pub fn set_nearby_drivers(&mut self, markers: Vec<NearbyDriverMarker>) -> Effects {
        Effects {
            rerender: self.nearby_drivers.reconcile(markers).is_some(),
            ..Effects::default()
        }
    }

    pub fn set_requesting_passengers(&mut self, markers: Vec<RequestingPassengerMarker>) -> Effects {
        Effects {
            rerender: self.requesting_passengers.reconcile(markers).is_some(),
            ..Effects::default()
        }
    }

    pub fn on_nearby_drivers_polled(&mut self, payloads: Vec<Value>) -> Effects {
        self.set_nearby_drivers(parse_markers(payloads))
    }

    pub fn on_requesting_passengers_polled(&mut self, payloads: Vec<Value>) -> Effects {
        self.set_requesting_passengers(parse_markers(payloads))
    }

    pub fn click_marker(&mut self, kind: MarkerKind, id: &str) -> Effects {
        let selected = match kind {
            MarkerKind::NearbyDriver => self.nearby_drivers.click(id).is_some(),
            MarkerKind::RequestingPassenger => self.requesting_passengers.click(id).is_some(),
        };

        Effects {
            rerender: selected,
            ..Effects::default()
        }
    }

    pub fn selected_nearby_driver(&self) -> Option<&NearbyDriverMarker> {
        self.nearby_drivers.selected()
    }

    pub fn selected_requesting_passenger(&self) -> Option<&RequestingPassengerMarker> {
        self.requesting_passengers.selected()
    }

    /// Feeds back a directions outcome for a request issued earlier.
    pub fn complete_route(
        &mut self,
        request: &RouteRequest,
        outcome: Result<RouteResult, Error>,
    ) -> Effects {
        let before = self.state();
        let committed = self.routes.complete(request.leg, request.token, outcome);

        Effects {
            rerender: committed || before != self.state(),
            ..Effects::default()
        }
    }

    pub fn set_auto_fit_disabled(&mut self, disabled: bool) {
        self.viewport.set_auto_fit_disabled(disabled);
    }

    /// Hands the planned trip over to the trip API.
    #[tracing::instrument(skip(self))]
    pub fn request_trip(&mut self) -> Result<(), Error> {
        let state = self.state();
        if state != MapState::RoutesReady {
            tracing::warn!(state = state.name(), "trip requested before routes were ready");
            return Err(invalid_state_error());
        }

        self.trip_requested = true;
        tracing::info!("trip requested");
        Ok(())
    }

    pub fn fare_estimate(&self) -> Option<f64> {
        self.routes
            .route(Leg::PickupToDestination)
            .map(|route| self.config.fare.estimate(route))
    }

    pub fn render_state(&self) -> RenderState {
        RenderState {
            state: self.state(),
            center: self.center,
            user_location: self.user_location,
            pickup: self.pickup.clone(),
            destination: self.destination.clone(),
            driver: self.driver_point(),
            driver_route: self.routes.route(Leg::DriverToPickup).cloned(),
            trip_route: self.routes.route(Leg::PickupToDestination).cloned(),
            fare_estimate: self.fare_estimate(),
            nearby_drivers: self.nearby_drivers.markers().to_vec(),
            requesting_passengers: self.requesting_passengers.markers().to_vec(),
            selected_driver: self.nearby_drivers.selected().map(|m| m.id.clone()),
            selected_passenger: self.requesting_passengers.selected().map(|m| m.id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::WaypointSource;
    use crate::error::{directions_error, geolocation_error};

    #[derive(Default)]
    struct CountingCamera {
        fits: usize,
    }

    impl Camera for CountingCamera {
        fn fit_bounds(&mut self, _: Rect<f64>, _: u32) {
            self.fits += 1;
        }
    }

    fn sibundoy() -> NamedWaypoint {
        NamedWaypoint::new(
            "Parque principal, Sibundoy".into(),
            GeoPoint::new(1.1556, -77.0625),
            WaypointSource::MapTap,
        )
    }

    fn santiago() -> NamedWaypoint {
        NamedWaypoint::new(
            "Santiago, Putumayo".into(),
            GeoPoint::new(1.1483, -77.0811),
            WaypointSource::TypedAddress,
        )
    }

    fn route(distance_meters: i64) -> RouteResult {
        RouteResult::new(
            vec![GeoPoint::new(1.1556, -77.0625), GeoPoint::new(1.1483, -77.0811)],
            distance_meters,
            distance_meters / 10,
        )
    }

    fn new_map() -> TripMap<CountingCamera> {
        TripMap::new(Config::default(), CountingCamera::default())
    }

    #[test]
    fn walks_through_planning_states() {
        let mut map = new_map();
        assert_eq!(map.state(), MapState::Idle);

        let effects = map.set_pickup(sibundoy());
        assert_eq!(map.state(), MapState::PickupSet);
        assert!(effects.route_requests.is_empty());
        assert!(effects.fitted.is_some());

        let effects = map.set_destination(santiago());
        assert_eq!(map.state(), MapState::RouteToDestinationPending);
        assert_eq!(effects.route_requests.len(), 1);
        let request = effects.route_requests[0];
        assert_eq!(request.leg, Leg::PickupToDestination);

        let effects = map.complete_route(&request, Ok(route(3100)));
        assert!(effects.rerender);
        assert_eq!(map.state(), MapState::RoutesReady);
        assert_eq!(map.fare_estimate(), Some(4650.0));

        map.request_trip().unwrap();
        assert_eq!(map.state(), MapState::TripRequested);

        let effects = map.set_pickup(santiago());
        assert_eq!(effects, Effects::default());
        assert_eq!(map.render_state().pickup, sibundoy());

        map.reset();
        assert_eq!(map.state(), MapState::Idle);
        assert!(map.render_state().trip_route.is_none());
    }

    #[test]
    fn request_trip_needs_ready_routes() {
        let mut map = new_map();
        assert_eq!(map.request_trip().unwrap_err().code, 100);

        map.set_pickup(sibundoy());
        map.set_destination(santiago());
        assert!(map.request_trip().is_err());
    }

    #[test]
    fn failed_directions_still_reach_routes_ready() {
        let mut map = new_map();
        map.set_pickup(sibundoy());
        let request = map.set_destination(santiago()).route_requests[0];

        let effects = map.complete_route(&request, Err(directions_error("ZERO_RESULTS")));
        assert!(effects.rerender);
        assert_eq!(map.state(), MapState::RoutesReady);
        assert!(map.render_state().trip_route.is_none());
        assert!(map.route_error(Leg::PickupToDestination).is_some());
        assert!(map.fare_estimate().is_none());
    }

    #[test]
    fn driver_ticks_route_but_never_refit() {
        let mut map = new_map();
        map.set_pickup(sibundoy());
        map.set_destination(santiago());
        let fits = map.camera().fits;

        let effects =
            map.update_driver_location(DriverLocation::new(GeoPoint::new(1.17, -77.05), 1));
        assert_eq!(effects.route_requests.len(), 1);
        assert_eq!(effects.route_requests[0].leg, Leg::DriverToPickup);
        assert!(effects.fitted.is_none());

        // GPS jitter
        let effects =
            map.update_driver_location(DriverLocation::new(GeoPoint::new(1.17002, -77.05001), 2));
        assert!(effects.route_requests.is_empty());
        assert!(effects.rerender);

        let effects =
            map.update_driver_location(DriverLocation::new(GeoPoint::new(1.16, -77.05), 3));
        assert_eq!(effects.route_requests.len(), 1);

        assert_eq!(map.camera().fits, fits);
    }

    #[test]
    fn out_of_order_driver_ticks_are_ignored() {
        let mut map = new_map();
        map.set_pickup(sibundoy());

        map.update_driver_location(DriverLocation::new(GeoPoint::new(1.17, -77.05), 5));
        let effects =
            map.update_driver_location(DriverLocation::new(GeoPoint::new(1.10, -77.00), 4));

        assert_eq!(effects, Effects::default());
        assert_eq!(map.render_state().driver, Some(GeoPoint::new(1.17, -77.05)));
    }

    #[test]
    fn stale_driver_location_expires_and_drops_route() {
        use chrono::Duration;

        let mut map = new_map();
        map.set_pickup(sibundoy());

        let recorded_at = Utc::now();
        let location =
            DriverLocation::new(GeoPoint::new(1.17, -77.05), 1).recorded_at(recorded_at);
        let request = map.update_driver_location(location).route_requests[0];
        map.complete_route(&request, Ok(route(2000)));
        assert!(map.route(Leg::DriverToPickup).is_some());

        let effects = map.expire_driver_location(recorded_at + Duration::seconds(30));
        assert_eq!(effects, Effects::default());

        let effects = map.expire_driver_location(recorded_at + Duration::seconds(61));
        assert!(effects.rerender);
        assert!(map.render_state().driver.is_none());
        assert!(map.route(Leg::DriverToPickup).is_none());
    }

    #[test]
    fn restarted_driver_feed_is_accepted() {
        let mut map = new_map();
        map.set_pickup(sibundoy());

        map.update_driver_location(DriverLocation::new(GeoPoint::new(1.17, -77.05), 40));
        map.clear_driver_location();
        assert!(map.render_state().driver.is_none());

        let effects =
            map.update_driver_location(DriverLocation::new(GeoPoint::new(1.16, -77.05), 1));
        assert!(effects.rerender);
        assert_eq!(effects.route_requests.len(), 1);
        assert_eq!(map.render_state().driver, Some(GeoPoint::new(1.16, -77.05)));
    }

    #[test]
    fn reset_restarts_driver_sequence_and_drops_selection() {
        use serde_json::json;

        let mut map = new_map();
        map.on_nearby_drivers_polled(vec![json!({"id": "d1", "lat": 1.0, "lng": -77.0})]);
        map.click_marker(MarkerKind::NearbyDriver, "d1");
        map.update_driver_location(DriverLocation::new(GeoPoint::new(1.17, -77.05), 40));

        map.reset();
        assert!(map.render_state().selected_driver.is_none());
        assert_eq!(map.render_state().nearby_drivers.len(), 1);

        let effects =
            map.update_driver_location(DriverLocation::new(GeoPoint::new(1.15, -77.06), 1));
        assert!(effects.rerender);
        assert_eq!(map.render_state().driver, Some(GeoPoint::new(1.15, -77.06)));
    }

    #[test]
    fn invalid_waypoint_coordinates_are_dropped() {
        let mut map = new_map();
        let mut pickup = sibundoy();
        pickup.point = Some(GeoPoint::new(f64::NAN, -77.0));

        let effects = map.set_pickup(pickup);
        assert!(effects.fitted.is_none());
        assert_eq!(map.state(), MapState::Idle);
        assert_eq!(map.render_state().pickup.address, "Parque principal, Sibundoy");
    }

    #[test]
    fn geolocation_failure_falls_back_to_default_center() {
        let mut map = new_map();
        let here = GeoPoint::new(1.16, -77.07);

        assert!(map.on_geolocation(Ok(here)).rerender);
        assert_eq!(map.render_state().center, here);
        assert_eq!(map.render_state().user_location, Some(here));

        assert!(map.on_geolocation(Err(geolocation_error("permission denied"))).rerender);
        let state = map.render_state();
        assert!(state.user_location.is_none());
        assert_eq!(state.center, Config::default().default_center);

        assert!(!map.on_geolocation(Err(geolocation_error("timeout"))).rerender);
    }

    #[test]
    fn marker_polls_rerender_only_on_change() {
        use serde_json::json;

        let mut map = new_map();
        let poll = || {
            vec![
                json!({"id": "d1", "lat": 1.0, "lng": -77.0}),
                json!({"id": "d2", "lat": 1.1, "lng": -77.1}),
                json!({"lat": 1.2}),
            ]
        };

        assert!(map.on_nearby_drivers_polled(poll()).rerender);
        assert!(!map.on_nearby_drivers_polled(poll()).rerender);
        assert_eq!(map.render_state().nearby_drivers.len(), 2);

        assert!(map.click_marker(MarkerKind::NearbyDriver, "d2").rerender);
        assert_eq!(map.render_state().selected_driver.as_deref(), Some("d2"));
        assert!(!map.click_marker(MarkerKind::RequestingPassenger, "d2").rerender);

        assert!(map
            .on_requesting_passengers_polled(vec![json!({"id": "p1", "lat": 1.0, "lng": -77.0})])
            .rerender);
        assert_eq!(map.render_state().requesting_passengers.len(), 1);
    }
}
