//! Core types for the geocoding subsystem.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A resolved point, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Geocoding failures.
///
/// `NotFound` means the provider answered but had no match; everything else
/// (transport, status, payload, timeout) is `ResolutionFailed`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeocodeError {
    #[error("No city found for '{0}'")]
    NotFound(String),

    #[error("Error getting coordinates: {0}")]
    ResolutionFailed(String),
}
