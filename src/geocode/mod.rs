//! Geocoding subsystem: turns a free-text city name into coordinates.
//!
//! Provides the `GeocodeResolver` seam, the Geoapify HTTPS provider, and a
//! built-in offline dataset.

pub mod providers;
pub mod types;

use async_trait::async_trait;

pub use providers::{
    BuiltinResolver, GeoapifyResolver, DEFAULT_GEOCODE_TIMEOUT, DEFAULT_GEOCODE_URL,
};
pub use types::{Coordinates, GeocodeError};

/// Resolves a city name to coordinates with one outbound lookup.
///
/// Implementations do not retry. No match is `GeocodeError::NotFound`; any
/// other failure is `GeocodeError::ResolutionFailed`.
#[async_trait]
pub trait GeocodeResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Coordinates, GeocodeError>;
}
