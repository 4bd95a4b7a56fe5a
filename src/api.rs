use std::sync::Arc;

use async_trait::async_trait;
use geo_types::Rect;
use serde_json::Value;

use crate::engine::RenderState;
use crate::entities::{GeoPoint, RouteResult};
use crate::error::Error;

#[async_trait]
pub trait DirectionsAPI {
    async fn request_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteResult, Error>;
}

#[async_trait]
pub trait GeolocationAPI {
    async fn current_position(&self) -> Result<GeoPoint, Error>;
}

/// Raw poll payloads; entries are validated one by one downstream.
#[async_trait]
pub trait NearbyEntitiesAPI {
    async fn poll_nearby_drivers(&self, around: GeoPoint) -> Result<Vec<Value>, Error>;
    async fn poll_requesting_passengers(&self, around: GeoPoint) -> Result<Vec<Value>, Error>;
}

/// The map surface's camera.
pub trait Camera {
    fn fit_bounds(&mut self, bounds: Rect<f64>, padding_px: u32);
}

pub trait Presenter {
    fn render(&mut self, state: &RenderState);
}

pub type DynDirectionsAPI = Arc<dyn DirectionsAPI + Send + Sync>;
