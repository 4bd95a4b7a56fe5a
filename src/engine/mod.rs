mod reconciler;
mod route_coordinator;
mod session;
mod trip_map;
mod viewport;

pub use reconciler::{should_update, MarkerChanges, MarkerLayer, RenderedMarker};
pub use route_coordinator::RouteCoordinator;
pub use session::{spawn_expiry_ticker, Event, MapSession};
pub use trip_map::{Effects, MapState, MarkerKind, RenderState, TripMap};
pub use viewport::{bounds_of, ViewportFitController};
