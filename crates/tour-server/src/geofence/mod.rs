//! Geofence-triggered notifications during a live tour.

pub mod notify;
pub mod processor;

pub use notify::{Notifier, NotifyOutcome, SkipReason};
pub use processor::{GeofenceProcessor, ProcessOutcome, SideEffects};
