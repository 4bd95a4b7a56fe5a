use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::GeoPoint;
use crate::error::{invalid_input_error, Error};

/// A map marker keyed by a stable id.
pub trait Marker: Clone {
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn point(&self) -> GeoPoint;
    fn from_payload(value: Value) -> Result<Self, Error>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NearbyDriverMarker {
    pub id: String,
    pub point: GeoPoint,
    pub display_name: String,
    pub vehicle_description: String,
    pub rating: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderTag {
    Male,
    Female,
    Other,
    #[serde(other)]
    Unknown,
}

impl Default for GenderTag {
    fn default() -> Self {
        Self::Unknown
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestingPassengerMarker {
    pub id: String,
    pub point: GeoPoint,
    pub display_name: String,
    pub gender_tag: GenderTag,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub distance_km: f64,
}

#[derive(Deserialize)]
struct RawNearbyDriver {
    id: Option<Value>,
    #[serde(alias = "lat")]
    latitude: Option<f64>,
    #[serde(alias = "lng")]
    longitude: Option<f64>,
    #[serde(default, alias = "name", alias = "displayName")]
    display_name: Option<String>,
    #[serde(default, alias = "vehicle", alias = "vehicleDescription")]
    vehicle_description: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
}

#[derive(Deserialize)]
struct RawRequestingPassenger {
    id: Option<Value>,
    #[serde(alias = "lat")]
    latitude: Option<f64>,
    #[serde(alias = "lng")]
    longitude: Option<f64>,
    #[serde(default, alias = "name", alias = "displayName")]
    display_name: Option<String>,
    #[serde(default, alias = "gender", alias = "genderTag")]
    gender_tag: Option<GenderTag>,
    #[serde(default, alias = "pickupAddress")]
    pickup_address: Option<String>,
    #[serde(default, alias = "dropoffAddress")]
    dropoff_address: Option<String>,
    #[serde(default, alias = "distanceKm")]
    distance_km: Option<f64>,
}

fn payload_id(id: Option<Value>) -> Result<String, Error> {
    let id = match id {
        Some(Value::String(id)) => id,
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(invalid_input_error()),
    };

    if id.trim().is_empty() {
        return Err(invalid_input_error());
    }

    Ok(id)
}

fn payload_point(latitude: Option<f64>, longitude: Option<f64>) -> Result<GeoPoint, Error> {
    let point = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => GeoPoint::new(latitude, longitude),
        _ => return Err(invalid_input_error()),
    };

    if !point.is_valid() {
        return Err(invalid_input_error());
    }

    Ok(point)
}

impl Marker for NearbyDriverMarker {
    const KIND: &'static str = "nearby_driver";

    fn id(&self) -> &str {
        &self.id
    }

    fn point(&self) -> GeoPoint {
        self.point
    }

    fn from_payload(value: Value) -> Result<Self, Error> {
        let raw: RawNearbyDriver = serde_json::from_value(value)?;

        Ok(Self {
            id: payload_id(raw.id)?,
            point: payload_point(raw.latitude, raw.longitude)?,
            display_name: raw.display_name.unwrap_or_default(),
            vehicle_description: raw.vehicle_description.unwrap_or_default(),
            rating: raw.rating.filter(|r| r.is_finite()).unwrap_or(0.0),
        })
    }
}

impl Marker for RequestingPassengerMarker {
    const KIND: &'static str = "requesting_passenger";

    fn id(&self) -> &str {
        &self.id
    }

    fn point(&self) -> GeoPoint {
        self.point
    }

    fn from_payload(value: Value) -> Result<Self, Error> {
        let raw: RawRequestingPassenger = serde_json::from_value(value)?;

        Ok(Self {
            id: payload_id(raw.id)?,
            point: payload_point(raw.latitude, raw.longitude)?,
            display_name: raw.display_name.unwrap_or_default(),
            gender_tag: raw.gender_tag.unwrap_or_default(),
            pickup_address: raw.pickup_address.unwrap_or_default(),
            dropoff_address: raw.dropoff_address.unwrap_or_default(),
            distance_km: raw.distance_km.filter(|d| d.is_finite()).unwrap_or(0.0),
        })
    }
}

/// Parses a poll response, dropping malformed entries and repeated ids.
pub fn parse_markers<M: Marker>(payloads: Vec<Value>) -> Vec<M> {
    let mut markers: Vec<M> = Vec::with_capacity(payloads.len());

    for (index, payload) in payloads.into_iter().enumerate() {
        match M::from_payload(payload) {
            Ok(marker) => {
                if markers.iter().any(|m| m.id() == marker.id()) {
                    tracing::warn!(kind = M::KIND, id = marker.id(), "dropping duplicate marker");
                    continue;
                }
                markers.push(marker);
            }
            Err(err) => {
                tracing::warn!(kind = M::KIND, index, ?err, "dropping malformed marker");
            }
        }
    }

    markers
}

#[test]
fn parse_nearby_drivers_drops_malformed_entries() {
    use serde_json::json;

    let payloads = vec![
        json!({"id": "d1", "latitude": 1.0, "longitude": -77.0, "name": "Ana", "vehicle": "Renault Logan", "rating": 4.8}),
        json!({"latitude": 1.0, "longitude": -77.0}),
        json!({"id": "d3", "latitude": 1.0}),
        json!({"id": "", "lat": 1.0, "lng": -77.0}),
        json!({"id": 42, "lat": 1.01, "lng": -77.01}),
        json!({"id": "d5", "lat": 200.0, "lng": -77.01}),
        json!("not an object"),
    ];

    let markers: Vec<NearbyDriverMarker> = parse_markers(payloads);

    assert_eq!(markers.len(), 2);
    assert_eq!(markers[0].id, "d1");
    assert_eq!(markers[0].display_name, "Ana");
    assert_eq!(markers[0].vehicle_description, "Renault Logan");
    assert_eq!(markers[1].id, "42");
    assert_eq!(markers[1].rating, 0.0);
}

#[test]
fn parse_passengers_defaults_unknown_gender() {
    use serde_json::json;

    let payloads = vec![
        json!({"id": "p1", "lat": 1.15, "lng": -77.06, "gender": "female", "pickupAddress": "Parque", "dropoffAddress": "Terminal", "distanceKm": 1.4}),
        json!({"id": "p2", "lat": 1.15, "lng": -77.06, "gender": "not-listed"}),
        json!({"id": "p1", "lat": 1.16, "lng": -77.07}),
    ];

    let markers: Vec<RequestingPassengerMarker> = parse_markers(payloads);

    assert_eq!(markers.len(), 2);
    assert_eq!(markers[0].gender_tag, GenderTag::Female);
    assert_eq!(markers[0].pickup_address, "Parque");
    assert_eq!(markers[0].distance_km, 1.4);
    assert_eq!(markers[1].gender_tag, GenderTag::Unknown);
}
