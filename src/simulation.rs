use async_channel::Sender;
use async_trait::async_trait;
use geo_types::Rect;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::api::{Camera, DynDirectionsAPI, GeolocationAPI, NearbyEntitiesAPI, Presenter};
use crate::config::Config;
use crate::engine::{spawn_expiry_ticker, Event, MapSession, RenderState, TripMap};
use crate::entities::{DriverLocation, GeoPoint, NamedWaypoint};
use crate::error::{invalid_config_error, unexpected_error, Error};

/// Camera that only reports where it would move.
pub struct LoggingCamera;

impl Camera for LoggingCamera {
    fn fit_bounds(&mut self, bounds: Rect<f64>, padding_px: u32) {
        tracing::info!(?bounds, padding_px, "camera fit");
    }
}

#[derive(Default)]
pub struct LoggingPresenter {
    pub renders: usize,
    pub last: Option<RenderState>,
}

impl Presenter for LoggingPresenter {
    fn render(&mut self, state: &RenderState) {
        self.renders += 1;

        tracing::info!(
            state = state.state.name(),
            driver = ?state.driver,
            trip_route_points = ?state.trip_route.as_ref().map(|r| r.legs.len()),
            driver_route_points = ?state.driver_route.as_ref().map(|r| r.legs.len()),
            nearby_drivers = state.nearby_drivers.len(),
            fare_estimate = ?state.fare_estimate,
            "render"
        );

        self.last = Some(state.clone());
    }
}

/// Noisy GPS around a point moving linearly from `start` to `end`.
struct DriverPath {
    start: GeoPoint,
    end: GeoPoint,
    jitter: Normal<f64>,
}

impl DriverPath {
    fn new(start: GeoPoint, end: GeoPoint, jitter_degrees: f64) -> Result<Self, Error> {
        let jitter = Normal::new(0.0, jitter_degrees)
            .map_err(|_| invalid_config_error("jitter_degrees"))?;

        Ok(Self { start, end, jitter })
    }

    fn sample(&self, progress: f64) -> GeoPoint {
        let mut rng = rand::thread_rng();

        GeoPoint::new(
            self.start.latitude
                + (self.end.latitude - self.start.latitude) * progress
                + self.jitter.sample(&mut rng),
            self.start.longitude
                + (self.end.longitude - self.start.longitude) * progress
                + self.jitter.sample(&mut rng),
        )
    }
}

/// Fake surroundings: drivers and requesting passengers scattered around a
/// centre, plus a device position with GPS noise.
pub struct SimulatedArea {
    center: GeoPoint,
    drivers: AtomicUsize,
    passengers: AtomicUsize,
    gps_noise: Normal<f64>,
}

impl SimulatedArea {
    pub fn new(center: GeoPoint, drivers: usize, passengers: usize) -> Result<Self, Error> {
        let gps_noise =
            Normal::new(0.0, 0.00002).map_err(|_| invalid_config_error("gps_noise"))?;

        Ok(Self {
            center,
            drivers: AtomicUsize::new(drivers),
            passengers: AtomicUsize::new(passengers),
            gps_noise,
        })
    }

    pub fn set_driver_count(&self, count: usize) {
        self.drivers.store(count, Ordering::SeqCst);
    }

    fn scatter<F>(around: GeoPoint, count: usize, entry: F) -> Vec<Value>
    where
        F: Fn(usize, f64, f64) -> Value,
    {
        let mut rng = rand::thread_rng();

        let mut payloads: Vec<Value> = (0..count)
            .map(|i| {
                entry(
                    i,
                    around.latitude + rng.gen_range(-0.01..0.01),
                    around.longitude + rng.gen_range(-0.01..0.01),
                )
            })
            .collect();

        // the feed occasionally sends entries without coordinates
        if count > 0 && rng.gen_bool(0.2) {
            payloads.push(json!({"id": "broken"}));
        }

        payloads
    }
}

#[async_trait]
impl NearbyEntitiesAPI for SimulatedArea {
    async fn poll_nearby_drivers(&self, around: GeoPoint) -> Result<Vec<Value>, Error> {
        let count = self.drivers.load(Ordering::SeqCst);
        let rating = rand::thread_rng().gen_range(3.5..5.0);

        Ok(Self::scatter(around, count, |i, lat, lng| {
            json!({
                "id": format!("d{}", i + 1),
                "lat": lat,
                "lng": lng,
                "name": format!("Driver {}", i + 1),
                "vehicle": "Chevrolet Spark",
                "rating": rating,
            })
        }))
    }

    async fn poll_requesting_passengers(&self, around: GeoPoint) -> Result<Vec<Value>, Error> {
        let count = self.passengers.load(Ordering::SeqCst);

        Ok(Self::scatter(around, count, |i, lat, lng| {
            json!({
                "id": format!("p{}", i + 1),
                "lat": lat,
                "lng": lng,
                "name": format!("Passenger {}", i + 1),
                "gender": "unknown",
                "pickupAddress": "Parque principal",
                "dropoffAddress": "Terminal",
                "distanceKm": 1.2,
            })
        }))
    }
}

#[async_trait]
impl GeolocationAPI for SimulatedArea {
    async fn current_position(&self) -> Result<GeoPoint, Error> {
        let mut rng = rand::thread_rng();

        Ok(GeoPoint::new(
            self.center.latitude + self.gps_noise.sample(&mut rng),
            self.center.longitude + self.gps_noise.sample(&mut rng),
        ))
    }
}

async fn drive_driver(
    sender: Sender<Event>,
    path: DriverPath,
    ticks: u32,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);

    for tick in 0..ticks {
        interval.tick().await;

        let point = path.sample(tick as f64 / ticks.max(1) as f64);
        let location = DriverLocation::new(point, tick as u64 + 1);

        if sender.send(Event::DriverLocation(location)).await.is_err() {
            break;
        }
    }
}

async fn poll_nearby(
    sender: Sender<Event>,
    area: Arc<SimulatedArea>,
    around: GeoPoint,
    polls: u32,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);

    for poll in 0..polls {
        interval.tick().await;

        // drivers have all left by the last poll
        if poll + 1 == polls {
            area.set_driver_count(0);
        }

        let events = [
            area.poll_nearby_drivers(around)
                .await
                .map(Event::NearbyDriversPolled),
            area.poll_requesting_passengers(around)
                .await
                .map(Event::RequestingPassengersPolled),
        ];

        for event in events {
            match event {
                Ok(event) => {
                    if sender.send(event).await.is_err() {
                        return;
                    }
                }
                Err(err) => tracing::warn!(?err, "nearby poll failed"),
            }
        }
    }
}

pub struct Executor {
    config: Config,
    directions: DynDirectionsAPI,
    pickup: NamedWaypoint,
    destination: NamedWaypoint,
    ticks: u32,
    period: Duration,
}

impl Executor {
    pub fn new(
        config: Config,
        directions: DynDirectionsAPI,
        pickup: NamedWaypoint,
        destination: NamedWaypoint,
    ) -> Self {
        Self {
            config,
            directions,
            pickup,
            destination,
            ticks: 30,
            period: Duration::from_secs(1),
        }
    }

    pub fn ticks(mut self, ticks: u32, period: Duration) -> Self {
        self.ticks = ticks;
        self.period = period;
        self
    }

    #[tracing::instrument(name = "Executor::run", skip(self))]
    pub async fn run(self) -> Result<LoggingPresenter, Error> {
        let pickup = self.pickup.point.ok_or_else(|| invalid_config_error("pickup"))?;
        let driver_start = GeoPoint::new(pickup.latitude + 0.01, pickup.longitude + 0.008);
        let path = DriverPath::new(driver_start, pickup, 0.00002)?;

        let map = TripMap::new(self.config.clone(), LoggingCamera);
        let mut session = MapSession::new(map, self.directions.clone(), LoggingPresenter::default());
        let sender = session.sender();

        spawn_expiry_ticker(sender.clone(), self.period * 5);

        let area = Arc::new(SimulatedArea::new(pickup, 3, 2)?);

        sender
            .send(Event::Geolocation(area.current_position().await))
            .await
            .map_err(|_| unexpected_error())?;
        sender
            .send(Event::PickupSelected(self.pickup.clone()))
            .await
            .map_err(|_| unexpected_error())?;
        sender
            .send(Event::DestinationSelected(self.destination.clone()))
            .await
            .map_err(|_| unexpected_error())?;

        let feeds = vec![
            tokio::spawn(drive_driver(sender.clone(), path, self.ticks, self.period)),
            tokio::spawn(poll_nearby(
                sender.clone(),
                area.clone(),
                pickup,
                (self.ticks / 3).max(2),
                self.period * 3,
            )),
        ];

        let control = tokio::spawn(async move {
            for result in futures::future::join_all(feeds).await {
                if let Err(err) = result {
                    tracing::warn!(?err, "feed task failed");
                }
            }

            tracing::info!("feeds finished, requesting trip");

            let _ = sender.send(Event::TripRequested).await;
            let _ = sender.send(Event::Shutdown).await;
        });

        session.run().await;

        if let Err(err) = control.await {
            tracing::warn!(?err, "simulation control task failed");
        }

        Ok(session.into_presenter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{parse_markers, NearbyDriverMarker};
    use tokio_test::block_on;

    #[test]
    fn simulated_area_scatters_around_center() {
        let center = GeoPoint::new(1.1556, -77.0625);
        let area = SimulatedArea::new(center, 3, 0).unwrap();

        let payloads = block_on(area.poll_nearby_drivers(center)).unwrap();
        let markers: Vec<NearbyDriverMarker> = parse_markers(payloads);
        assert_eq!(markers.len(), 3);
        assert!(markers
            .iter()
            .all(|m| (m.point.latitude - center.latitude).abs() < 0.01));

        assert!(block_on(area.poll_requesting_passengers(center))
            .unwrap()
            .is_empty());

        area.set_driver_count(0);
        assert!(block_on(area.poll_nearby_drivers(center)).unwrap().is_empty());
    }

    #[test]
    fn simulated_position_stays_near_center() {
        let center = GeoPoint::new(1.1556, -77.0625);
        let area = SimulatedArea::new(center, 0, 0).unwrap();

        let position = block_on(area.current_position()).unwrap();
        assert!(crate::geo::is_near(position, center, 0.001));
    }
}
