mod driver_location;
mod geo_point;
mod marker;
mod route;
mod waypoint;

pub use driver_location::DriverLocation;
pub use geo_point::GeoPoint;
pub use marker::{
    parse_markers, GenderTag, Marker, NearbyDriverMarker, RequestingPassengerMarker,
};
pub use route::{Leg, RouteRequest, RouteResult};
pub use waypoint::{NamedWaypoint, WaypointSource};
