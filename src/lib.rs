//! City registry with geocoded registration and cached nearest-city lookup.

pub mod cache;
pub mod config;
pub mod distance;
pub mod error;
pub mod geocode;
pub mod server;
pub mod service;
pub mod store;

pub use error::ServiceError;
pub use service::CityService;
