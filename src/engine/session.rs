use async_channel::{Receiver, Sender};
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::trip_map::{Effects, MarkerKind, TripMap};
use crate::api::{Camera, DynDirectionsAPI, Presenter};
use crate::entities::{DriverLocation, GeoPoint, NamedWaypoint, RouteRequest, RouteResult};
use crate::error::{unexpected_error, Error};

#[derive(Debug)]
pub enum Event {
    PickupSelected(NamedWaypoint),
    DestinationSelected(NamedWaypoint),
    PickupCleared,
    DestinationCleared,
    Reset,
    DriverLocation(DriverLocation),
    DriverLocationLost,
    Geolocation(Result<GeoPoint, Error>),
    NearbyDriversPolled(Vec<Value>),
    RequestingPassengersPolled(Vec<Value>),
    MarkerClicked { kind: MarkerKind, id: String },
    AutoFitDisabled(bool),
    RouteResolved {
        request: RouteRequest,
        outcome: Result<RouteResult, Error>,
    },
    ExpiryTick(DateTime<Utc>),
    TripRequested,
    Shutdown,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Self::PickupSelected(_) => "pickup_selected",
            Self::DestinationSelected(_) => "destination_selected",
            Self::PickupCleared => "pickup_cleared",
            Self::DestinationCleared => "destination_cleared",
            Self::Reset => "reset",
            Self::DriverLocation(_) => "driver_location",
            Self::DriverLocationLost => "driver_location_lost",
            Self::Geolocation(_) => "geolocation",
            Self::NearbyDriversPolled(_) => "nearby_drivers_polled",
            Self::RequestingPassengersPolled(_) => "requesting_passengers_polled",
            Self::MarkerClicked { .. } => "marker_clicked",
            Self::AutoFitDisabled(_) => "auto_fit_disabled",
            Self::RouteResolved { .. } => "route_resolved",
            Self::ExpiryTick(_) => "expiry_tick",
            Self::TripRequested => "trip_requested",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Owns the trip map and applies events to it one at a time.
///
/// Directions requests run as separate tasks and come back through the same
/// queue as `Event::RouteResolved`, so the map is never mutated concurrently.
pub struct MapSession<C: Camera, P: Presenter> {
    map: TripMap<C>,
    directions: DynDirectionsAPI,
    presenter: P,
    sender: Sender<Event>,
    receiver: Receiver<Event>,
}

impl<C: Camera, P: Presenter> MapSession<C, P> {
    pub fn new(map: TripMap<C>, directions: DynDirectionsAPI, presenter: P) -> Self {
        let (sender, receiver) = async_channel::unbounded();

        Self {
            map,
            directions,
            presenter,
            sender,
            receiver,
        }
    }

    pub fn sender(&self) -> Sender<Event> {
        self.sender.clone()
    }

    pub fn map(&self) -> &TripMap<C> {
        &self.map
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn into_presenter(self) -> P {
        self.presenter
    }

    /// Applies one event to the map. Never fails: errors are logged and the
    /// map stays renderable.
    pub fn apply(&mut self, event: Event) -> Effects {
        tracing::debug!(event = event.name(), "applying event");

        match event {
            Event::PickupSelected(pickup) => self.map.set_pickup(pickup),
            Event::DestinationSelected(destination) => self.map.set_destination(destination),
            Event::PickupCleared => self.map.clear_pickup(),
            Event::DestinationCleared => self.map.clear_destination(),
            Event::Reset => self.map.reset(),
            Event::DriverLocation(location) => self.map.update_driver_location(location),
            Event::DriverLocationLost => self.map.clear_driver_location(),
            Event::Geolocation(reading) => self.map.on_geolocation(reading),
            Event::NearbyDriversPolled(payloads) => self.map.on_nearby_drivers_polled(payloads),
            Event::RequestingPassengersPolled(payloads) => {
                self.map.on_requesting_passengers_polled(payloads)
            }
            Event::MarkerClicked { kind, id } => self.map.click_marker(kind, &id),
            Event::AutoFitDisabled(disabled) => {
                self.map.set_auto_fit_disabled(disabled);
                Effects::default()
            }
            Event::RouteResolved { request, outcome } => self.map.complete_route(&request, outcome),
            Event::ExpiryTick(now) => self.map.expire_driver_location(now),
            Event::TripRequested => match self.map.request_trip() {
                Ok(()) => Effects {
                    rerender: true,
                    ..Effects::default()
                },
                Err(err) => {
                    tracing::warn!(?err, "trip request rejected");
                    Effects::default()
                }
            },
            Event::Shutdown => Effects::default(),
        }
    }

    fn spawn_route_request(&self, request: RouteRequest) {
        let directions = self.directions.clone();
        let sender = self.sender.clone();

        tokio::spawn(async move {
            let lookup = tokio::spawn(async move {
                directions
                    .request_route(request.origin, request.destination)
                    .await
            });

            // a panicking adapter still has to resolve the pending leg
            let outcome = match lookup.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(leg = request.leg.name(), ?err, "directions task failed");
                    Err(unexpected_error())
                }
            };

            if sender
                .send(Event::RouteResolved { request, outcome })
                .await
                .is_err()
            {
                tracing::debug!(leg = request.leg.name(), "session closed before route resolved");
            }
        });
    }

    fn execute(&mut self, effects: Effects) {
        for request in effects.route_requests {
            self.spawn_route_request(request);
        }

        if effects.rerender {
            self.presenter.render(&self.map.render_state());
        }
    }

    /// Processes events until `Event::Shutdown`, then drains the directions
    /// requests still pending before returning.
    #[tracing::instrument(name = "MapSession::run", skip_all)]
    pub async fn run(&mut self) {
        self.presenter.render(&self.map.render_state());

        let mut closing = false;

        while let Ok(event) = self.receiver.recv().await {
            if let Event::Shutdown = event {
                tracing::info!("shutting down map session");
                closing = true;
            }

            let effects = self.apply(event);
            self.execute(effects);

            if closing && !self.map.has_pending_routes() {
                break;
            }
        }
    }
}

/// Posts `Event::ExpiryTick` every `period` until the session goes away.
pub fn spawn_expiry_ticker(sender: Sender<Event>, period: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;
            if sender.send(Event::ExpiryTick(Utc::now())).await.is_err() {
                break;
            }
        }
    });
}
