pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod integration;
pub mod metrics;
pub mod models;
pub mod request_metrics;
pub mod security_middleware;
pub mod services;

pub use config::Config;
pub use errors::{Result, ShipmentEngineError};
pub use services::ShipmentService;
