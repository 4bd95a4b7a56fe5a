use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;

use crate::{
    api::DirectionsAPI,
    entities::{GeoPoint, NamedWaypoint, RouteResult, WaypointSource},
    error::{directions_error, invalid_input_error, upstream_error, Error},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Place {
    pub place_id: String,
    pub formatted_address: String,
    pub geometry: Geometry,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Geometry {
    pub location: GeoPoint,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Response<T> {
    status: String,
    result: Option<T>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct DirectionsRoute {
    overview_polyline: Polyline,
    #[serde(default)]
    legs: Vec<DirectionsLeg>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Polyline {
    points: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct DirectionsLeg {
    distance: Measure,
    duration: Measure,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Measure {
    value: i64,
}

/// Decodes Google's encoded polyline format (1e5 precision).
pub fn decode_polyline(encoded: &str) -> Result<Vec<GeoPoint>, Error> {
    let bytes = encoded.as_bytes();
    let mut index = 0;
    let mut latitude: i64 = 0;
    let mut longitude: i64 = 0;
    let mut points = vec![];

    let next_delta = |index: &mut usize| -> Result<i64, Error> {
        let mut result: i64 = 0;
        let mut shift = 0;

        loop {
            let byte = *bytes.get(*index).ok_or_else(|| upstream_error())? as i64 - 63;
            *index += 1;

            if !(0..64).contains(&byte) || shift > 60 {
                return Err(upstream_error());
            }

            result |= (byte & 0x1f) << shift;
            shift += 5;

            if byte < 0x20 {
                break;
            }
        }

        Ok(if result & 1 != 0 {
            !(result >> 1)
        } else {
            result >> 1
        })
    };

    while index < bytes.len() {
        latitude = latitude
            .checked_add(next_delta(&mut index)?)
            .ok_or_else(upstream_error)?;
        longitude = longitude
            .checked_add(next_delta(&mut index)?)
            .ok_or_else(upstream_error)?;

        let point = GeoPoint::new(latitude as f64 / 1e5, longitude as f64 / 1e5);
        if !point.is_valid() {
            return Err(upstream_error());
        }

        points.push(point);
    }

    Ok(points)
}

fn route_from_response(data: DirectionsResponse) -> Result<RouteResult, Error> {
    match data.status.as_str() {
        "OK" => {}
        "ZERO_RESULTS" | "NOT_FOUND" => return Err(directions_error(&data.status)),
        "INVALID_REQUEST" => return Err(invalid_input_error()),
        _ => return Err(upstream_error()),
    }

    let route = data
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| directions_error("ZERO_RESULTS"))?;

    let legs = decode_polyline(&route.overview_polyline.points)?;
    if legs.is_empty() {
        return Err(upstream_error());
    }

    let distance_meters = route.legs.iter().map(|l| l.distance.value).sum();
    let duration_seconds = route.legs.iter().map(|l| l.duration.value).sum();

    Ok(RouteResult::new(legs, distance_meters, duration_seconds))
}

#[derive(Clone, Debug)]
pub struct GoogleMaps {
    client: reqwest::Client,
    api_base: String,
    key: String,
}

impl GoogleMaps {
    pub fn new(api_base: String, key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base,
            key,
        }
    }

    pub fn from_env() -> Result<Self, Error> {
        let api_base =
            env::var("GOOGLE_MAPS_API_BASE").unwrap_or_else(|_| "maps.googleapis.com".into());
        let key = env::var("GOOGLE_MAPS_API_KEY")?;

        Ok(Self::new(api_base, key))
    }

    /// Resolves a tapped autocomplete suggestion into a waypoint.
    #[tracing::instrument(skip(self))]
    pub async fn find_place(&self, id: String, session_token: String) -> Result<NamedWaypoint, Error> {
        let url = format!("https://{}/maps/api/place/details/json", self.api_base);

        let res = self
            .client
            .get(url)
            .query(&[("key", &self.key)])
            .query(&[("sessiontoken", &session_token)])
            .query(&[("place_id", &id)])
            .query(&[("fields", "place_id,formatted_address,geometry")])
            .send()
            .await?;

        let status_code = res.status().as_u16();

        if status_code >= 400 && status_code < 500 {
            return Err(invalid_input_error());
        } else if status_code != 200 {
            return Err(upstream_error());
        }

        let data: Response<Place> = res.json().await?;

        if data.status != "OK" {
            return Err(upstream_error());
        }

        let place = data.result.ok_or_else(|| upstream_error())?;

        Ok(NamedWaypoint::new(
            place.formatted_address,
            place.geometry.location,
            WaypointSource::Suggestion {
                place_id: place.place_id,
            },
        ))
    }
}

#[async_trait]
impl DirectionsAPI for GoogleMaps {
    #[tracing::instrument(skip(self))]
    async fn request_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteResult, Error> {
        let url = format!("https://{}/maps/api/directions/json", self.api_base);
        let origin: String = origin.into();
        let destination: String = destination.into();

        let res = self
            .client
            .get(url)
            .query(&[("key", &self.key)])
            .query(&[("origin", &origin)])
            .query(&[("destination", &destination)])
            .query(&[("mode", "driving")])
            .send()
            .await?;

        let status_code = res.status().as_u16();

        if status_code >= 400 && status_code < 500 {
            return Err(invalid_input_error());
        } else if status_code != 200 {
            return Err(upstream_error());
        }

        let data: DirectionsResponse = res.json().await?;

        route_from_response(data)
    }
}

#[test]
fn decodes_reference_polyline() {
    let points = decode_polyline("_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();

    assert_eq!(
        points,
        vec![
            GeoPoint::new(38.5, -120.2),
            GeoPoint::new(40.7, -120.95),
            GeoPoint::new(43.252, -126.453),
        ]
    );
}

#[test]
fn truncated_polyline_is_rejected() {
    assert!(decode_polyline("_p~iF~ps|").is_err());
    assert!(decode_polyline("").unwrap().is_empty());
}

#[test]
fn polyline_with_huge_deltas_is_rejected() {
    let encoded = ("~".repeat(12) + "F").repeat(6);
    assert_eq!(decode_polyline(&encoded).unwrap_err().code, 4);

    // single point at latitude 100
    assert!(decode_polyline("_gjaR?").is_err());
}

#[test]
fn directions_response_sums_legs() {
    let data: DirectionsResponse = serde_json::from_value(serde_json::json!({
        "status": "OK",
        "routes": [{
            "overview_polyline": {"points": "_p~iF~ps|U_ulLnnqC"},
            "legs": [
                {"distance": {"value": 2100}, "duration": {"value": 300}},
                {"distance": {"value": 900}, "duration": {"value": 120}}
            ]
        }]
    }))
    .unwrap();

    let route = route_from_response(data).unwrap();
    assert_eq!(route.legs.len(), 2);
    assert_eq!(route.distance_meters, 3000);
    assert_eq!(route.duration_seconds, 420);
}

#[test]
fn directions_zero_results_is_recoverable() {
    let data: DirectionsResponse =
        serde_json::from_value(serde_json::json!({"status": "ZERO_RESULTS", "routes": []}))
            .unwrap();

    let err = route_from_response(data).unwrap_err();
    assert_eq!(err.code, 6);
}
