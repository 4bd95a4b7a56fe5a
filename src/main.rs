use std::env;
use std::process;
use std::sync::Arc;

use tripmap::config::Config;
use tripmap::entities::{GeoPoint, NamedWaypoint, WaypointSource};
use tripmap::external::google_maps::GoogleMaps;
use tripmap::simulation::Executor;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env().unwrap_or_else(|err| {
        tracing::error!(?err, "invalid configuration");
        process::exit(1);
    });

    let google = GoogleMaps::from_env().unwrap_or_else(|err| {
        tracing::error!(?err, "GOOGLE_MAPS_API_KEY is required");
        process::exit(1);
    });

    let pickup = NamedWaypoint::new(
        "Parque principal, Sibundoy".into(),
        config.default_center,
        WaypointSource::MapTap,
    );

    let destination = match env::var("TRIPMAP_SIM_DESTINATION_PLACE_ID") {
        Ok(place_id) => google
            .find_place(place_id, uuid::Uuid::new_v4().to_string())
            .await
            .unwrap_or_else(|err| {
                tracing::error!(?err, "could not resolve destination place");
                process::exit(1);
            }),
        Err(_) => NamedWaypoint::new(
            "Santiago, Putumayo".into(),
            GeoPoint::new(1.1483, -77.0811),
            WaypointSource::TypedAddress,
        ),
    };

    match Executor::new(config, Arc::new(google), pickup, destination)
        .run()
        .await
    {
        Ok(presenter) => {
            tracing::info!(renders = presenter.renders, "simulation finished");
            if let Some(last) = presenter.last {
                tracing::info!(
                    state = last.state.name(),
                    fare_estimate = ?last.fare_estimate,
                    "final map state"
                );
            }
        }
        Err(err) => {
            tracing::error!(?err, "simulation failed");
            process::exit(1);
        }
    }
}
