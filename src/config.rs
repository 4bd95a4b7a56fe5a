use std::env;
use std::str::FromStr;

use chrono::Duration;

use crate::entities::GeoPoint;
use crate::error::{invalid_config_error, Error};
use crate::fare::FareSchedule;
use crate::geo::DEFAULT_EPSILON_DEGREES;

#[derive(Clone, Debug)]
pub struct Config {
    /// Threshold for route recomputation, viewport refits and marker identity.
    pub route_epsilon_degrees: f64,
    /// Finer threshold for re-rendering the driver marker.
    pub marker_epsilon_degrees: f64,
    pub fit_padding_px: u32,
    pub auto_fit_disabled: bool,
    pub default_center: GeoPoint,
    pub driver_location_ttl: Duration,
    pub fare: FareSchedule,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            route_epsilon_degrees: DEFAULT_EPSILON_DEGREES,
            marker_epsilon_degrees: 0.00001,
            fit_padding_px: 60,
            auto_fit_disabled: false,
            // Sibundoy, Putumayo
            default_center: GeoPoint::new(1.1556, -77.0625),
            driver_location_ttl: Duration::seconds(60),
            fare: FareSchedule::new(4000.0, 1500.0),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, Error> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| invalid_config_error(key)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err.into()),
    }
}

impl Config {
    #[tracing::instrument(name = "Config::from_env")]
    pub fn from_env() -> Result<Self, Error> {
        let defaults = Self::default();

        let route_epsilon_degrees =
            env_or("TRIPMAP_ROUTE_EPSILON_DEGREES", defaults.route_epsilon_degrees)?;
        let marker_epsilon_degrees =
            env_or("TRIPMAP_MARKER_EPSILON_DEGREES", defaults.marker_epsilon_degrees)?;

        for (key, value) in [
            ("TRIPMAP_ROUTE_EPSILON_DEGREES", route_epsilon_degrees),
            ("TRIPMAP_MARKER_EPSILON_DEGREES", marker_epsilon_degrees),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid_config_error(key));
            }
        }

        let default_center = GeoPoint::new(
            env_or("TRIPMAP_DEFAULT_CENTER_LAT", defaults.default_center.latitude)?,
            env_or("TRIPMAP_DEFAULT_CENTER_LNG", defaults.default_center.longitude)?,
        );
        if !default_center.is_valid() {
            return Err(invalid_config_error("TRIPMAP_DEFAULT_CENTER_LAT"));
        }

        let ttl_secs: i64 = env_or(
            "TRIPMAP_DRIVER_LOCATION_TTL_SECS",
            defaults.driver_location_ttl.num_seconds(),
        )?;
        let driver_location_ttl = Some(ttl_secs)
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .ok_or_else(|| invalid_config_error("TRIPMAP_DRIVER_LOCATION_TTL_SECS"))?;

        let base_fare = env_or("TRIPMAP_BASE_FARE", defaults.fare.base_fare)?;
        let rate_per_km = env_or("TRIPMAP_RATE_PER_KM", defaults.fare.rate_per_km)?;

        for (key, value) in [
            ("TRIPMAP_BASE_FARE", base_fare),
            ("TRIPMAP_RATE_PER_KM", rate_per_km),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid_config_error(key));
            }
        }

        Ok(Self {
            route_epsilon_degrees,
            marker_epsilon_degrees,
            fit_padding_px: env_or("TRIPMAP_FIT_PADDING_PX", defaults.fit_padding_px)?,
            auto_fit_disabled: env_or("TRIPMAP_AUTO_FIT_DISABLED", defaults.auto_fit_disabled)?,
            default_center,
            driver_location_ttl,
            fare: FareSchedule::new(base_fare, rate_per_km),
        })
    }
}

#[test]
fn config_from_env_overrides_and_validates() {
    // the only test touching these variables
    env::set_var("TRIPMAP_FIT_PADDING_PX", "24");
    env::set_var("TRIPMAP_AUTO_FIT_DISABLED", "true");
    let config = Config::from_env().unwrap();
    assert_eq!(config.fit_padding_px, 24);
    assert!(config.auto_fit_disabled);
    assert_eq!(config.route_epsilon_degrees, DEFAULT_EPSILON_DEGREES);

    env::set_var("TRIPMAP_FIT_PADDING_PX", "wide");
    let err = Config::from_env().unwrap_err();
    assert_eq!(err.code, 103);

    env::set_var("TRIPMAP_FIT_PADDING_PX", "24");
    env::set_var("TRIPMAP_ROUTE_EPSILON_DEGREES", "-1");
    assert!(Config::from_env().is_err());
    env::remove_var("TRIPMAP_ROUTE_EPSILON_DEGREES");

    env::set_var("TRIPMAP_DRIVER_LOCATION_TTL_SECS", "90");
    assert_eq!(
        Config::from_env().unwrap().driver_location_ttl,
        Duration::seconds(90)
    );

    for ttl in ["9223372036854775807", "0", "-5"] {
        env::set_var("TRIPMAP_DRIVER_LOCATION_TTL_SECS", ttl);
        let err = Config::from_env().unwrap_err();
        assert_eq!(err.code, 103, "ttl {}", ttl);
    }
    env::remove_var("TRIPMAP_DRIVER_LOCATION_TTL_SECS");

    env::set_var("TRIPMAP_BASE_FARE", "-4000");
    assert_eq!(Config::from_env().unwrap_err().code, 103);
    env::set_var("TRIPMAP_BASE_FARE", "0");
    env::set_var("TRIPMAP_RATE_PER_KM", "NaN");
    assert_eq!(Config::from_env().unwrap_err().code, 103);
    env::set_var("TRIPMAP_RATE_PER_KM", "1200");
    assert_eq!(Config::from_env().unwrap().fare, FareSchedule::new(0.0, 1200.0));

    env::remove_var("TRIPMAP_BASE_FARE");
    env::remove_var("TRIPMAP_RATE_PER_KM");
    env::remove_var("TRIPMAP_FIT_PADDING_PX");
    env::remove_var("TRIPMAP_AUTO_FIT_DISABLED");
}
