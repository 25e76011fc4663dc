//! Core data models for tours, stops and geofence deliveries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

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

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}

/// A user the notification dispatcher can reach. `id` is the dispatcher's user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Listing linked from a tour stop. Both relations are optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyListing {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub listing_agent: Option<Contact>,
    #[serde(default)]
    pub seller: Option<Contact>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TourStatus {
    #[default]
    NotStarted,
    InProgress,
    Complete,
}

impl TourStatus {
    /// Lifecycle only moves forward.
    pub fn can_transition_to(self, next: TourStatus) -> bool {
        matches!(
            (self, next),
            (TourStatus::NotStarted, TourStatus::InProgress)
                | (TourStatus::InProgress, TourStatus::Complete)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TourStatus::NotStarted => "not_started",
            TourStatus::InProgress => "in_progress",
            TourStatus::Complete => "complete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not_started" => Some(TourStatus::NotStarted),
            "in_progress" => Some(TourStatus::InProgress),
            "complete" => Some(TourStatus::Complete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tour {
    pub id: String,
    pub agent_id: String,
    pub client_name: String,
    pub status: TourStatus,
    #[serde(default)]
    pub current_stop_id: Option<String>,
}

/// A single property visit within a tour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourStop {
    pub id: String,
    pub tour_id: String,
    /// 1-based position, unique and contiguous within the tour.
    pub order: i64,
    pub address: String,
    pub location: Coordinates,
    #[serde(default)]
    pub listing: Option<PropertyListing>,
    #[serde(default)]
    pub notify_before: bool,
    #[serde(default)]
    pub notify_after: bool,
    #[serde(default)]
    pub notify_listing_agent: bool,
    #[serde(default)]
    pub notify_seller: bool,
    #[serde(default)]
    pub next_up_sent: bool,
    #[serde(default)]
    pub next_up_sent_by: Option<String>,
    #[serde(default)]
    pub have_left_sent: bool,
    #[serde(default)]
    pub have_left_sent_by: Option<String>,
    /// Custom stops have no agent/seller relation and never notify.
    #[serde(default)]
    pub is_custom_listing: bool,
}

impl TourStop {
    pub fn seller(&self) -> Option<&Contact> {
        if self.is_custom_listing {
            return None;
        }
        self.listing.as_ref().and_then(|l| l.seller.as_ref())
    }

    pub fn listing_agent(&self) -> Option<&Contact> {
        if self.is_custom_listing {
            return None;
        }
        self.listing.as_ref().and_then(|l| l.listing_agent.as_ref())
    }

    /// Apply a flag update to an in-memory copy, mirroring what the store does.
    pub fn apply_flags(&mut self, update: &StopFlagsUpdate) {
        if let Some(source) = update.next_up_sent_by {
            self.next_up_sent = true;
            self.next_up_sent_by = Some(source.to_string());
        }
        if let Some(source) = update.have_left_sent_by {
            self.have_left_sent = true;
            self.have_left_sent_by = Some(source.to_string());
        }
    }
}

/// Audit source stored next to an idempotency flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSource {
    GeofenceTrigger,
    Manual,
}

impl TriggerSource {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerSource::GeofenceTrigger => "Geo-fence Trigger",
            TriggerSource::Manual => "Agent",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial write of idempotency flags.
///
/// Flags can only be raised; there is no representation for clearing one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopFlagsUpdate {
    pub next_up_sent_by: Option<TriggerSource>,
    pub have_left_sent_by: Option<TriggerSource>,
}

impl StopFlagsUpdate {
    pub fn next_up(source: TriggerSource) -> Self {
        Self {
            next_up_sent_by: Some(source),
            have_left_sent_by: None,
        }
    }

    pub fn have_left(source: TriggerSource) -> Self {
        Self {
            next_up_sent_by: None,
            have_left_sent_by: Some(source),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.next_up_sent_by.is_none() && self.have_left_sent_by.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopOrder {
    pub stop_id: String,
    pub order: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeofenceEventType {
    Enter,
    Exit,
}

impl fmt::Display for GeofenceEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeofenceEventType::Enter => f.write_str("enter"),
            GeofenceEventType::Exit => f.write_str("exit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRef {
    pub identifier: String,
}

/// What the host geofencing facility hands to the background handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeofenceDelivery {
    Event {
        #[serde(rename = "eventType")]
        event_type: GeofenceEventType,
        region: RegionRef,
    },
    Error {
        error: String,
    },
}

impl GeofenceDelivery {
    pub fn event(event_type: GeofenceEventType, identifier: impl Into<String>) -> Self {
        GeofenceDelivery::Event {
            event_type,
            region: RegionRef {
                identifier: identifier.into(),
            },
        }
    }
}

/// One evaluated "furthest stop" assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteCandidate {
    pub index: usize,
    pub end_stop_id: String,
    pub total_time_s: u64,
    pub total_distance_m: u64,
    pub stop_order: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizedRoute {
    pub stop_order: Vec<String>,
    pub total_time_s: u64,
    pub total_distance_m: u64,
    pub candidates_evaluated: usize,
    pub candidates_failed: usize,
    pub computed_at: DateTime<Utc>,
}

impl OptimizedRoute {
    /// `order = 1..N` in visiting order.
    pub fn stop_orders(&self) -> Vec<StopOrder> {
        self.stop_order
            .iter()
            .enumerate()
            .map(|(idx, stop_id)| StopOrder {
                stop_id: stop_id.clone(),
                order: idx as i64 + 1,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "pushMessage", skip_serializing_if = "Option::is_none")]
    pub push: Option<PushMessage>,
    #[serde(rename = "smsMessage", skip_serializing_if = "Option::is_none")]
    pub sms: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_parses_event_and_error_shapes() {
        let event: GeofenceDelivery =
            serde_json::from_str(r#"{"eventType":"Exit","region":{"identifier":"42"}}"#)
                .unwrap();
        assert_eq!(event, GeofenceDelivery::event(GeofenceEventType::Exit, "42"));

        let error: GeofenceDelivery =
            serde_json::from_str(r#"{"error":"location services disabled"}"#).unwrap();
        assert!(matches!(error, GeofenceDelivery::Error { .. }));
    }

    #[test]
    fn status_only_moves_forward() {
        assert!(TourStatus::NotStarted.can_transition_to(TourStatus::InProgress));
        assert!(TourStatus::InProgress.can_transition_to(TourStatus::Complete));
        assert!(!TourStatus::Complete.can_transition_to(TourStatus::InProgress));
        assert!(!TourStatus::NotStarted.can_transition_to(TourStatus::Complete));
    }

    #[test]
    fn custom_listing_hides_relations() {
        let stop = TourStop {
            id: "1".into(),
            tour_id: "t".into(),
            order: 1,
            address: "1 Main St".into(),
            location: Coordinates::new(0.0, 0.0),
            listing: Some(PropertyListing {
                id: "l".into(),
                address: "1 Main St".into(),
                listing_agent: None,
                seller: Some(Contact {
                    id: "s".into(),
                    name: "Sam".into(),
                    phone: None,
                    email: None,
                }),
            }),
            notify_before: false,
            notify_after: false,
            notify_listing_agent: false,
            notify_seller: true,
            next_up_sent: false,
            next_up_sent_by: None,
            have_left_sent: false,
            have_left_sent_by: None,
            is_custom_listing: true,
        };
        assert!(stop.seller().is_none());
    }
}
