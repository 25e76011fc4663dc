//! Seams between the core logic and its external collaborators.
//!
//! The server holds these as `Arc<dyn …>` so the HTTP clients, the SQLite store
//! and the on-device cache can be swapped for in-process fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TourError;
use crate::models::{
    Coordinates, NotificationRequest, StopFlagsUpdate, StopOrder, Tour, TourStatus, TourStop,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionsRequest {
    pub origin: Coordinates,
    pub destination: Coordinates,
    pub waypoints: Vec<Coordinates>,
    pub optimize_waypoints: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionsLeg {
    pub distance_m: u64,
    pub duration_s: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionsResponse {
    pub legs: Vec<DirectionsLeg>,
    /// Visiting order as indices into the request's `waypoints`.
    pub waypoint_order: Vec<usize>,
}

/// Opaque directions service able to reorder waypoints between a fixed origin
/// and destination.
#[async_trait]
pub trait MappingOracle: Send + Sync {
    async fn optimize_waypoints(
        &self,
        request: &DirectionsRequest,
    ) -> Result<DirectionsResponse, TourError>;
}

/// Push/SMS/email delivery. Each call is independent of any other.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, request: &NotificationRequest) -> Result<(), TourError>;
}

/// Remote store for tours and their stops.
#[async_trait]
pub trait StopRepository: Send + Sync {
    async fn load_tour(&self, tour_id: &str) -> Result<Option<Tour>, TourError>;

    /// Stops of a tour sorted by `order`.
    async fn load_tour_stops(&self, tour_id: &str) -> Result<Vec<TourStop>, TourError>;

    async fn get_stop(&self, stop_id: &str) -> Result<Option<TourStop>, TourError>;

    /// Raise idempotency flags in a single write.
    async fn update_stop_flags(
        &self,
        stop_id: &str,
        update: &StopFlagsUpdate,
    ) -> Result<(), TourError>;

    /// Write the full ordering of a tour. All-or-nothing.
    async fn update_stop_orders(&self, tour_id: &str, orders: &[StopOrder])
        -> Result<(), TourError>;

    async fn set_tour_status(&self, tour_id: &str, status: TourStatus) -> Result<(), TourError>;
}

/// Best-effort key-value storage on the device.
///
/// Writes are at-least-once and last-write-wins. There is no atomic
/// read-modify-write across process restarts, and a write interrupted by a
/// process kill may be lost.
#[async_trait]
pub trait LocalStateCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, TourError>;

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), TourError>;
}
