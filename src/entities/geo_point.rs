use geo_types::Point;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lng")]
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite and within the WGS84 coordinate ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl From<GeoPoint> for Point<f64> {
    fn from(point: GeoPoint) -> Self {
        Point::new(point.longitude, point.latitude)
    }
}

impl From<Point<f64>> for GeoPoint {
    fn from(point: Point<f64>) -> Self {
        GeoPoint::new(point.y(), point.x())
    }
}

impl From<GeoPoint> for String {
    fn from(point: GeoPoint) -> Self {
        format!("{},{}", point.latitude, point.longitude)
    }
}

#[test]
fn geo_point_axis_order() {
    let point: Point<f64> = GeoPoint::new(1.1556, -77.0625).into();
    assert_eq!(point.x(), -77.0625);
    assert_eq!(point.y(), 1.1556);

    let back: GeoPoint = point.into();
    assert_eq!(back, GeoPoint::new(1.1556, -77.0625));
}

#[test]
fn geo_point_accepts_short_keys() {
    let point: GeoPoint = serde_json::from_str(r#"{"lat": 1.0, "lng": -77.0}"#).unwrap();
    assert_eq!(point, GeoPoint::new(1.0, -77.0));
}

#[test]
fn geo_point_validity() {
    assert!(GeoPoint::new(1.0, -77.0).is_valid());
    assert!(!GeoPoint::new(f64::NAN, -77.0).is_valid());
    assert!(!GeoPoint::new(91.0, 0.0).is_valid());
    assert!(!GeoPoint::new(0.0, f64::INFINITY).is_valid());
}
