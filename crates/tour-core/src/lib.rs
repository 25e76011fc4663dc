pub mod error;
pub mod geofence;
pub mod messages;
pub mod models;
pub mod route_selection;
pub mod traits;

pub use error::TourError;
pub use geofence::{regions_for_stops, GeofenceRegion, Observation, RegionStates};
pub use models::{
    Contact, Coordinates, GeofenceDelivery, GeofenceEventType, NotificationRequest,
    OptimizedRoute, PropertyListing, RegionRef, RouteCandidate, StopFlagsUpdate, StopOrder,
    Tour, TourStatus, TourStop, TriggerSource,
};
pub use route_selection::{
    build_candidates, candidate_from_response, select_best, split_start, CandidatePlan,
};
pub use traits::{
    DirectionsLeg, DirectionsRequest, DirectionsResponse, LocalStateCache, MappingOracle,
    NotificationDispatcher, StopRepository,
};
