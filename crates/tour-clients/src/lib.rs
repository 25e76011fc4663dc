//! Tour Clients - HTTP adapters for external collaborators
//!
//! Talks to the directions API (waypoint optimization) and to the
//! notification provider (push/SMS/email).

pub mod directions;
pub mod notify;

pub use directions::{DirectionsClient, DirectionsConfig};
pub use notify::{NotifyClient, NotifyConfig};
