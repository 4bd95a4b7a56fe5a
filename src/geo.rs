use crate::entities::GeoPoint;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// About 11 m at the equator.
pub const DEFAULT_EPSILON_DEGREES: f64 = 0.0001;

/// Great-circle distance in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lng = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    // rounding can push h just above 1 near antipodes
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

/// Cheap coordinate-delta test. NaN is never near anything.
pub fn is_near(a: GeoPoint, b: GeoPoint, epsilon_degrees: f64) -> bool {
    (a.latitude - b.latitude).abs() < epsilon_degrees
        && (a.longitude - b.longitude).abs() < epsilon_degrees
}

/// Whether `current` differs from `previous` enough to act on.
///
/// An appearance or disappearance always counts as movement; two absent
/// values never do.
pub fn has_moved(previous: Option<GeoPoint>, current: Option<GeoPoint>, epsilon: f64) -> bool {
    match (previous, current) {
        (None, None) => false,
        (Some(previous), Some(current)) => !is_near(previous, current, epsilon),
        _ => true,
    }
}

#[test]
fn haversine_one_degree_of_longitude_at_equator() {
    let distance = haversine_km(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0));
    assert!((distance - 111.19).abs() / 111.19 < 0.005);
}

#[test]
fn haversine_sibundoy_to_santiago() {
    let sibundoy = GeoPoint::new(1.1556, -77.0625);
    let santiago = GeoPoint::new(1.1483, -77.0811);

    let distance = haversine_km(sibundoy, santiago);
    assert!(distance > 2.0 && distance < 2.8, "got {}", distance);
    assert_eq!(haversine_km(sibundoy, sibundoy), 0.0);
}

#[test]
fn haversine_antipodes_is_half_circumference() {
    let distance = haversine_km(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 180.0));
    assert!(distance.is_finite());
    assert!((distance - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);

    let distance = haversine_km(GeoPoint::new(45.0, -77.0), GeoPoint::new(-45.0, 103.0));
    assert!(distance.is_finite());
}

#[test]
fn is_near_uses_epsilon_per_axis() {
    let a = GeoPoint::new(1.0, -77.0);

    assert!(is_near(a, GeoPoint::new(1.00005, -77.00005), DEFAULT_EPSILON_DEGREES));
    assert!(!is_near(a, GeoPoint::new(1.0002, -77.0), DEFAULT_EPSILON_DEGREES));
    assert!(!is_near(a, GeoPoint::new(1.0, -77.0002), DEFAULT_EPSILON_DEGREES));
    assert!(!is_near(a, GeoPoint::new(f64::NAN, -77.0), DEFAULT_EPSILON_DEGREES));
}

#[test]
fn has_moved_transitions() {
    let a = GeoPoint::new(1.0, -77.0);
    let jitter = GeoPoint::new(1.00003, -77.00002);
    let far = GeoPoint::new(1.001, -77.0);

    assert!(!has_moved(None, None, DEFAULT_EPSILON_DEGREES));
    assert!(has_moved(None, Some(a), DEFAULT_EPSILON_DEGREES));
    assert!(has_moved(Some(a), None, DEFAULT_EPSILON_DEGREES));
    assert!(!has_moved(Some(a), Some(jitter), DEFAULT_EPSILON_DEGREES));
    assert!(has_moved(Some(a), Some(far), DEFAULT_EPSILON_DEGREES));
}
