//! Error taxonomy shared by the optimizer, the geofence processor and their
//! collaborators.

use thiserror::Error;

/// Message used when every candidate route failed.
pub const NO_VIABLE_ROUTE: &str = "no viable candidate route";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TourError {
    /// Mapping oracle or notification provider unreachable, timed out, or malformed.
    #[error("external service error: {0}")]
    ExternalService(String),
    /// Read/write failure against the remote store or the local state cache.
    #[error("persistence error: {0}")]
    Persistence(String),
    /// No valid candidate route, or a required relation is missing.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),
}

impl TourError {
    pub fn external(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }

    /// Whether the initiating flow may offer "try again".
    ///
    /// A route that could not be computed because every oracle call failed is
    /// retryable; structural problems with the tour data are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TourError::ExternalService(_) => true,
            TourError::DataIntegrity(msg) => msg.starts_with(NO_VIABLE_ROUTE),
            TourError::Persistence(_) => false,
        }
    }
}
