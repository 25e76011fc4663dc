//! Shared fakes for tour-server integration tests.
//!
//! In-process stand-ins for the directions service, the notification
//! provider, the remote store and a cache that always fails.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use tour_core::{
    Contact, Coordinates, DirectionsLeg, DirectionsRequest, DirectionsResponse, LocalStateCache,
    MappingOracle, NotificationDispatcher, NotificationRequest, PropertyListing, StopFlagsUpdate,
    StopOrder, StopRepository, Tour, TourError, TourStatus, TourStop,
};
use tour_server::state_cache::{MemoryStateCache, REGION_STATES_KEY};

pub fn contact(id: &str) -> Contact {
    Contact {
        id: id.to_string(),
        name: format!("User {}", id),
        phone: Some("+15550100".to_string()),
        email: None,
    }
}

pub fn stop(id: &str, order: i64) -> TourStop {
    TourStop {
        id: id.to_string(),
        tour_id: "tour-1".to_string(),
        order,
        address: format!("{} Desert Inn Rd", order * 100),
        location: Coordinates::new(36.10 + order as f64 / 100.0, -115.15),
        listing: None,
        notify_before: false,
        notify_after: false,
        notify_listing_agent: false,
        notify_seller: false,
        next_up_sent: false,
        next_up_sent_by: None,
        have_left_sent: false,
        have_left_sent_by: None,
        is_custom_listing: false,
    }
}

/// Attach a listing with the given agent and seller user ids.
pub fn with_listing(mut stop: TourStop, agent: Option<&str>, seller: Option<&str>) -> TourStop {
    stop.listing = Some(PropertyListing {
        id: format!("listing-{}", stop.id),
        address: stop.address.clone(),
        listing_agent: agent.map(contact),
        seller: seller.map(contact),
    });
    stop
}

pub fn tour(status: TourStatus) -> Tour {
    Tour {
        id: "tour-1".to_string(),
        agent_id: "agent-1".to_string(),
        client_name: "Jordan".to_string(),
        status,
        current_stop_id: None,
    }
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Route {
        time_s: u64,
        distance_m: u64,
        /// Waypoint order to return; identity when `None`.
        order: Option<Vec<usize>>,
    },
    Fail,
    /// Answer with a single leg regardless of how many waypoints were sent.
    Truncated { time_s: u64 },
    /// Fail this many times, then answer like `Route` with identity order.
    FlakyThenRoute {
        failures: usize,
        time_s: u64,
        distance_m: u64,
    },
}

/// Directions fake keyed by the request's destination.
#[derive(Default)]
pub struct ScriptedOracle {
    scripts: HashMap<String, Scripted>,
    attempts: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, destination: &TourStop, script: Scripted) -> Self {
        self.scripts.insert(destination.location.to_string(), script);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn route_response(request: &DirectionsRequest, time_s: u64, distance_m: u64, order: Vec<usize>) -> DirectionsResponse {
    let mut legs = vec![
        DirectionsLeg {
            distance_m: 0,
            duration_s: 0,
        };
        request.waypoints.len() + 1
    ];
    legs[0] = DirectionsLeg {
        distance_m,
        duration_s: time_s,
    };
    DirectionsResponse {
        legs,
        waypoint_order: order,
    }
}

#[async_trait]
impl MappingOracle for ScriptedOracle {
    async fn optimize_waypoints(
        &self,
        request: &DirectionsRequest,
    ) -> Result<DirectionsResponse, TourError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = request.destination.to_string();
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let entry = attempts.entry(key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        let identity: Vec<usize> = (0..request.waypoints.len()).collect();

        match self.scripts.get(&key) {
            Some(Scripted::Route {
                time_s,
                distance_m,
                order,
            }) => Ok(route_response(
                request,
                *time_s,
                *distance_m,
                order.clone().unwrap_or(identity),
            )),
            Some(Scripted::FlakyThenRoute {
                failures,
                time_s,
                distance_m,
            }) => {
                if attempt <= *failures {
                    Err(TourError::external("503 service unavailable"))
                } else {
                    Ok(route_response(request, *time_s, *distance_m, identity))
                }
            }
            Some(Scripted::Truncated { time_s }) => Ok(DirectionsResponse {
                legs: vec![DirectionsLeg {
                    distance_m: 0,
                    duration_s: *time_s,
                }],
                waypoint_order: identity,
            }),
            Some(Scripted::Fail) | None => Err(TourError::external("connection refused")),
        }
    }
}

/// Records every dispatch; fails for user ids listed in `failing`.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<NotificationRequest>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, user_id: &str) {
        self.failing.lock().unwrap().push(user_id.to_string());
    }

    pub fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sent().into_iter().map(|r| r.user_id).collect()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, request: &NotificationRequest) -> Result<(), TourError> {
        if self.failing.lock().unwrap().contains(&request.user_id) {
            return Err(TourError::external("push provider rejected request"));
        }
        self.sent.lock().unwrap().push(request.clone());
        Ok(())
    }
}

/// Remote store fake with call counters and failure switches.
#[derive(Default)]
pub struct FakeRepository {
    tours: Mutex<HashMap<String, Tour>>,
    stops: Mutex<HashMap<String, TourStop>>,
    pub get_calls: AtomicUsize,
    pub flag_writes: Mutex<Vec<(String, StopFlagsUpdate)>>,
    pub order_writes: Mutex<Vec<Vec<StopOrder>>>,
    pub fail_get: Mutex<bool>,
    pub fail_flags: Mutex<bool>,
    pub fail_orders: Mutex<bool>,
}

impl FakeRepository {
    pub fn new(tour: Tour, stops: &[TourStop]) -> Self {
        let repo = Self::default();
        repo.tours.lock().unwrap().insert(tour.id.clone(), tour);
        for stop in stops {
            repo.put_stop(stop.clone());
        }
        repo
    }

    pub fn put_stop(&self, stop: TourStop) {
        self.stops.lock().unwrap().insert(stop.id.clone(), stop);
    }

    pub fn stop(&self, id: &str) -> TourStop {
        self.stops.lock().unwrap()[id].clone()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn flag_writes(&self) -> Vec<(String, StopFlagsUpdate)> {
        self.flag_writes.lock().unwrap().clone()
    }

    pub fn order_writes(&self) -> usize {
        self.order_writes.lock().unwrap().len()
    }
}

#[async_trait]
impl StopRepository for FakeRepository {
    async fn load_tour(&self, tour_id: &str) -> Result<Option<Tour>, TourError> {
        Ok(self.tours.lock().unwrap().get(tour_id).cloned())
    }

    async fn load_tour_stops(&self, tour_id: &str) -> Result<Vec<TourStop>, TourError> {
        let mut stops: Vec<TourStop> = self
            .stops
            .lock()
            .unwrap()
            .values()
            .filter(|stop| stop.tour_id == tour_id)
            .cloned()
            .collect();
        stops.sort_by_key(|stop| stop.order);
        Ok(stops)
    }

    async fn get_stop(&self, stop_id: &str) -> Result<Option<TourStop>, TourError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_get.lock().unwrap() {
            return Err(TourError::persistence("network unreachable"));
        }
        Ok(self.stops.lock().unwrap().get(stop_id).cloned())
    }

    async fn update_stop_flags(
        &self,
        stop_id: &str,
        update: &StopFlagsUpdate,
    ) -> Result<(), TourError> {
        if *self.fail_flags.lock().unwrap() {
            return Err(TourError::persistence("write rejected"));
        }
        self.flag_writes
            .lock()
            .unwrap()
            .push((stop_id.to_string(), *update));
        if let Some(stop) = self.stops.lock().unwrap().get_mut(stop_id) {
            stop.apply_flags(update);
        }
        Ok(())
    }

    async fn update_stop_orders(
        &self,
        _tour_id: &str,
        orders: &[StopOrder],
    ) -> Result<(), TourError> {
        if *self.fail_orders.lock().unwrap() {
            return Err(TourError::persistence("transaction aborted"));
        }
        let mut stops = self.stops.lock().unwrap();
        for entry in orders {
            if let Some(stop) = stops.get_mut(&entry.stop_id) {
                stop.order = entry.order;
            }
        }
        self.order_writes.lock().unwrap().push(orders.to_vec());
        Ok(())
    }

    async fn set_tour_status(&self, tour_id: &str, status: TourStatus) -> Result<(), TourError> {
        match self.tours.lock().unwrap().get_mut(tour_id) {
            Some(tour) => {
                tour.status = status;
                Ok(())
            }
            None => Err(TourError::integrity("tour not found")),
        }
    }
}

/// A cache whose every read and write fails.
pub struct BrokenCache;

#[async_trait]
impl LocalStateCache for BrokenCache {
    async fn get(&self, _key: &str) -> Result<Option<Value>, TourError> {
        Err(TourError::persistence("storage unavailable"))
    }

    async fn set(&self, _key: &str, _value: Value) -> Result<(), TourError> {
        Err(TourError::persistence("storage unavailable"))
    }
}

/// In-memory cache whose next region-state read can be made to fail.
#[derive(Default)]
pub struct FlakyRegionCache {
    inner: MemoryStateCache,
    fail_next_region_read: AtomicBool,
}

impl FlakyRegionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_region_read(&self) {
        self.fail_next_region_read.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocalStateCache for FlakyRegionCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, TourError> {
        if key == REGION_STATES_KEY && self.fail_next_region_read.swap(false, Ordering::SeqCst) {
            return Err(TourError::persistence("storage busy"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), TourError> {
        self.inner.set(key, value).await
    }
}
