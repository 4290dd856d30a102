//! Service error taxonomy and its HTTP status mapping.

use axum::http::StatusCode;
use thiserror::Error;

use crate::cache::CacheError;
use crate::geocode::GeocodeError;
use crate::store::StoreError;

/// Every failure a `CityService` operation can report.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The geocoder had no match for the name.
    #[error("{0}")]
    NotFound(String),

    /// The geocoder failed: transport, status, payload, or timeout.
    #[error("{0}")]
    ResolutionFailed(String),

    /// The city store failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The request was malformed or out of range.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::ResolutionFailed(_) | Self::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Persistence(_) | Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Server-side faults, as opposed to problems with the request.
    pub fn is_server_fault(&self) -> bool {
        self.status().is_server_error()
    }
}

impl From<GeocodeError> for ServiceError {
    fn from(e: GeocodeError) -> Self {
        match e {
            GeocodeError::NotFound(_) => Self::NotFound(e.to_string()),
            GeocodeError::ResolutionFailed(_) => Self::ResolutionFailed(e.to_string()),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<CacheError> for ServiceError {
    fn from(e: CacheError) -> Self {
        Self::Unexpected(e.to_string())
    }
}
