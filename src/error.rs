use std::env;
use std::fmt::{self, Debug, Display};

#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    pub code: i32,
    pub message: String,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for Error {}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        env_var_error(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        reqwest_error(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        malformed_payload_error(err)
    }
}

impl Error {
    /// Infrastructure failures use codes below 100, caller errors 100 and up.
    pub fn is_internal(&self) -> bool {
        matches!(self.code, 1..=99)
    }
}

pub fn invalid_state_error() -> Error {
    Error {
        code: 100,
        message: "invalid state".into(),
    }
}

pub fn invalid_input_error() -> Error {
    Error {
        code: 101,
        message: "invalid input".into(),
    }
}

pub fn malformed_payload_error<T: Debug>(err: T) -> Error {
    Error {
        code: 102,
        message: format!("malformed payload: {:?}", err),
    }
}

pub fn invalid_config_error(key: &str) -> Error {
    Error {
        code: 103,
        message: format!("invalid configuration value for {}", key),
    }
}

pub fn env_var_error(_: env::VarError) -> Error {
    Error {
        code: 1,
        message: "environment variable error".into(),
    }
}

pub fn reqwest_error(_: reqwest::Error) -> Error {
    Error {
        code: 3,
        message: "reqwest error".into(),
    }
}

pub fn upstream_error() -> Error {
    Error {
        code: 4,
        message: "upstream error".into(),
    }
}

pub fn unexpected_error() -> Error {
    Error {
        code: 5,
        message: "unexpected error".into(),
    }
}

pub fn directions_error(status: &str) -> Error {
    Error {
        code: 6,
        message: format!("directions unavailable: {}", status),
    }
}

pub fn geolocation_error(reason: &str) -> Error {
    Error {
        code: 7,
        message: format!("geolocation unavailable: {}", reason),
    }
}

#[test]
fn error_code_ranges() {
    assert!(upstream_error().is_internal());
    assert!(directions_error("ZERO_RESULTS").is_internal());
    assert!(!invalid_input_error().is_internal());
    assert!(!invalid_config_error("TRIPMAP_FIT_PADDING_PX").is_internal());
}

#[test]
fn serde_errors_become_malformed_payloads() {
    let err: Error = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
    assert_eq!(err.code, 102);
}
