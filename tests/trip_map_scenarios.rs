use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geo_types::Rect;
use serde_json::json;

use tripmap::api::{Camera, DirectionsAPI, Presenter};
use tripmap::config::Config;
use tripmap::engine::{Event, MapSession, MapState, RenderState, TripMap};
use tripmap::entities::{DriverLocation, GeoPoint, Leg, NamedWaypoint, RouteResult, WaypointSource};
use tripmap::error::{directions_error, Error};
use tripmap::geo::haversine_km;
use tripmap::simulation::Executor;

/// Interpolated road with a 30% detour over the straight line. Requests
/// towards `slow_destination` take longer than the rest.
#[derive(Default)]
struct FakeDirections {
    calls: AtomicUsize,
    slow_destination: Option<GeoPoint>,
    failing: bool,
}

#[async_trait]
impl DirectionsAPI for FakeDirections {
    async fn request_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteResult, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = if Some(destination) == self.slow_destination {
            Duration::from_millis(120)
        } else {
            Duration::from_millis(5)
        };
        tokio::time::sleep(delay).await;

        if self.failing {
            return Err(directions_error("ZERO_RESULTS"));
        }

        let legs = (0..=10)
            .map(|i| {
                let t = i as f64 / 10.0;
                GeoPoint::new(
                    origin.latitude + (destination.latitude - origin.latitude) * t,
                    origin.longitude + (destination.longitude - origin.longitude) * t,
                )
            })
            .collect();

        let km = haversine_km(origin, destination) * 1.3;
        Ok(RouteResult::new(
            legs,
            (km * 1000.0).round() as i64,
            (km * 120.0).round() as i64,
        ))
    }
}

struct PanickingDirections;

#[async_trait]
impl DirectionsAPI for PanickingDirections {
    async fn request_route(&self, _: GeoPoint, _: GeoPoint) -> Result<RouteResult, Error> {
        panic!("directions adapter blew up");
    }
}

#[derive(Default)]
struct RecordingCamera {
    fits: Vec<Rect<f64>>,
}

impl Camera for RecordingCamera {
    fn fit_bounds(&mut self, bounds: Rect<f64>, _: u32) {
        self.fits.push(bounds);
    }
}

#[derive(Default)]
struct RecordingPresenter {
    renders: Vec<RenderState>,
}

impl Presenter for RecordingPresenter {
    fn render(&mut self, state: &RenderState) {
        self.renders.push(state.clone());
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
        WaypointSource::Favorite {
            favorite_id: "home".into(),
        },
    )
}

fn new_session(
    directions: Arc<FakeDirections>,
) -> MapSession<RecordingCamera, RecordingPresenter> {
    let map = TripMap::new(Config::default(), RecordingCamera::default());
    MapSession::new(map, directions, RecordingPresenter::default())
}

#[tokio::test]
async fn sibundoy_to_santiago_route() {
    let directions = Arc::new(FakeDirections::default());
    let mut session = new_session(directions.clone());
    let sender = session.sender();

    sender.send(Event::PickupSelected(sibundoy())).await.unwrap();
    sender.send(Event::DestinationSelected(santiago())).await.unwrap();
    sender.send(Event::Shutdown).await.unwrap();

    session.run().await;

    let state = session.map().render_state();
    assert_eq!(state.state, MapState::RoutesReady);

    let route = state.trip_route.unwrap();
    assert!(!route.legs.is_empty());

    let straight_km = haversine_km(sibundoy().point.unwrap(), santiago().point.unwrap());
    let road_km = route.distance_meters as f64 / 1000.0;
    assert!(road_km >= straight_km && road_km < straight_km * 2.0);
    assert!(state.fare_estimate.is_some());

    assert_eq!(directions.calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.map().camera().fits.len(), 2);
}

#[tokio::test]
async fn superseded_route_is_never_committed() {
    let first = GeoPoint::new(1.1483, -77.0811);
    let second = GeoPoint::new(1.17, -77.04);

    let directions = Arc::new(FakeDirections {
        slow_destination: Some(first),
        ..FakeDirections::default()
    });
    let mut session = new_session(directions.clone());
    let sender = session.sender();

    let feed = async {
        sender.send(Event::PickupSelected(sibundoy())).await.unwrap();
        sender
            .send(Event::DestinationSelected(NamedWaypoint::new(
                "Santiago".into(),
                first,
                WaypointSource::TypedAddress,
            )))
            .await
            .unwrap();
        sender
            .send(Event::DestinationSelected(NamedWaypoint::new(
                "Colón".into(),
                second,
                WaypointSource::TypedAddress,
            )))
            .await
            .unwrap();

        // let the slow, superseded response arrive last
        tokio::time::sleep(Duration::from_millis(250)).await;
        sender.send(Event::Shutdown).await.unwrap();
    };

    tokio::join!(session.run(), feed);

    assert_eq!(directions.calls.load(Ordering::SeqCst), 2);

    let route = session.map().route(Leg::PickupToDestination).unwrap();
    assert_eq!(*route.legs.last().unwrap(), second);

    // no render ever showed a route ending at the superseded destination
    for state in &session.presenter().renders {
        if let Some(route) = &state.trip_route {
            assert_eq!(*route.legs.last().unwrap(), second);
        }
    }
}

#[tokio::test]
async fn driver_jitter_issues_no_extra_requests_or_fits() {
    let directions = Arc::new(FakeDirections::default());
    let mut session = new_session(directions.clone());
    let sender = session.sender();

    sender.send(Event::PickupSelected(sibundoy())).await.unwrap();
    sender.send(Event::DestinationSelected(santiago())).await.unwrap();
    for sequence in 1..=10u64 {
        let wobble = if sequence % 2 == 0 { 0.00003 } else { -0.00003 };
        let location = DriverLocation::new(GeoPoint::new(1.17 + wobble, -77.05), sequence);
        sender.send(Event::DriverLocation(location)).await.unwrap();
    }
    sender.send(Event::Shutdown).await.unwrap();

    session.run().await;

    // one per leg
    assert_eq!(directions.calls.load(Ordering::SeqCst), 2);
    assert_eq!(session.map().camera().fits.len(), 2);
    assert!(session.map().route(Leg::DriverToPickup).is_some());
}

#[tokio::test]
async fn failed_directions_leave_map_renderable() {
    let directions = Arc::new(FakeDirections {
        failing: true,
        ..FakeDirections::default()
    });
    let mut session = new_session(directions);
    let sender = session.sender();

    sender.send(Event::PickupSelected(sibundoy())).await.unwrap();
    sender.send(Event::DestinationSelected(santiago())).await.unwrap();
    sender
        .send(Event::NearbyDriversPolled(vec![
            json!({"id": "d1", "lat": 1.15, "lng": -77.06}),
        ]))
        .await
        .unwrap();
    sender.send(Event::Shutdown).await.unwrap();

    session.run().await;

    let state = session.map().render_state();
    assert_eq!(state.state, MapState::RoutesReady);
    assert!(state.trip_route.is_none());
    assert_eq!(state.nearby_drivers.len(), 1);
    assert!(session.map().route_error(Leg::PickupToDestination).is_some());
}

#[tokio::test]
async fn panicking_directions_still_resolve_the_leg() {
    let map = TripMap::new(Config::default(), RecordingCamera::default());
    let mut session = MapSession::new(
        map,
        Arc::new(PanickingDirections),
        RecordingPresenter::default(),
    );
    let sender = session.sender();

    sender.send(Event::PickupSelected(sibundoy())).await.unwrap();
    sender.send(Event::DestinationSelected(santiago())).await.unwrap();
    sender.send(Event::Shutdown).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), session.run())
        .await
        .unwrap();

    assert_eq!(session.map().state(), MapState::RoutesReady);
    assert!(session.map().render_state().trip_route.is_none());
    assert_eq!(
        session.map().route_error(Leg::PickupToDestination).unwrap().code,
        5
    );
}

#[tokio::test]
async fn emptied_marker_poll_clears_layer() {
    let directions = Arc::new(FakeDirections::default());
    let mut session = new_session(directions);
    let sender = session.sender();

    sender
        .send(Event::NearbyDriversPolled(vec![
            json!({"id": "d1", "lat": 1.15, "lng": -77.06}),
            json!({"id": "d2", "lat": 1.16, "lng": -77.07}),
            json!({"id": "d3", "lat": 1.17, "lng": -77.08}),
        ]))
        .await
        .unwrap();
    sender
        .send(Event::MarkerClicked {
            kind: tripmap::engine::MarkerKind::NearbyDriver,
            id: "d2".into(),
        })
        .await
        .unwrap();
    sender.send(Event::NearbyDriversPolled(vec![])).await.unwrap();
    sender.send(Event::Shutdown).await.unwrap();

    session.run().await;

    let renders = &session.presenter().renders;
    // initial, first poll, click, emptied poll
    assert_eq!(renders.len(), 4);
    assert_eq!(renders[1].nearby_drivers.len(), 3);
    assert_eq!(renders[2].selected_driver.as_deref(), Some("d2"));
    assert!(renders[3].nearby_drivers.is_empty());
    assert!(renders[3].selected_driver.is_none());
}

#[tokio::test]
async fn trip_request_is_terminal_until_reset() {
    let directions = Arc::new(FakeDirections::default());
    let mut session = new_session(directions);
    let sender = session.sender();

    let feed = async {
        sender.send(Event::PickupSelected(sibundoy())).await.unwrap();
        sender.send(Event::DestinationSelected(santiago())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        sender.send(Event::TripRequested).await.unwrap();
        sender.send(Event::DestinationCleared).await.unwrap();
        sender.send(Event::Shutdown).await.unwrap();
    };

    tokio::join!(session.run(), feed);

    let state = session.map().render_state();
    assert_eq!(state.state, MapState::TripRequested);
    assert_eq!(state.destination, santiago());

    let effects = session.apply(Event::Reset);
    assert!(effects.rerender);
    assert_eq!(session.map().state(), MapState::Idle);
}

#[tokio::test]
async fn simulation_runs_to_completion() {
    let directions = Arc::new(FakeDirections::default());

    let presenter = Executor::new(Config::default(), directions.clone(), sibundoy(), santiago())
        .ticks(6, Duration::from_millis(10))
        .run()
        .await
        .unwrap();

    assert!(presenter.renders > 0);
    let last = presenter.last.unwrap();
    assert!(last.trip_route.is_some());
    assert!(last.nearby_drivers.is_empty());
    assert!(directions.calls.load(Ordering::SeqCst) >= 2);
}
