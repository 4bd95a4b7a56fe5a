pub mod api;
pub mod config;
pub mod engine;
pub mod entities;
pub mod error;
pub mod external;
pub mod fare;
pub mod geo;

pub mod simulation;
