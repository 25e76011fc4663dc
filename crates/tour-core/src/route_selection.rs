//! Candidate construction and selection for tour ordering.
//!
//! The lowest-ordered stop is the fixed start. Every other stop takes a turn as
//! the fixed end while the rest become waypoints the mapping oracle is free to
//! reorder. The cheapest complete ordering wins.

use std::cmp::Ordering;

use crate::error::{TourError, NO_VIABLE_ROUTE};
use crate::models::{RouteCandidate, TourStop};
use crate::traits::{DirectionsRequest, DirectionsResponse};

/// One oracle query: fixed start, fixed end, unordered waypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePlan {
    pub index: usize,
    pub start_id: String,
    pub end_id: String,
    /// Stop ids, positionally aligned with `request.waypoints`.
    pub waypoint_ids: Vec<String>,
    pub request: DirectionsRequest,
}

/// Split off the start stop (lowest `order`) from the candidate pool.
pub fn split_start(stops: &[TourStop]) -> Result<(&TourStop, Vec<&TourStop>), TourError> {
    let start = stops
        .iter()
        .min_by_key(|stop| stop.order)
        .ok_or_else(|| TourError::integrity("tour has no stops"))?;

    let pool = stops.iter().filter(|stop| stop.id != start.id).collect();
    Ok((start, pool))
}

pub fn build_candidates(start: &TourStop, pool: &[&TourStop]) -> Vec<CandidatePlan> {
    pool.iter()
        .enumerate()
        .map(|(index, end)| {
            let waypoints: Vec<&TourStop> = pool
                .iter()
                .filter(|stop| stop.id != end.id)
                .copied()
                .collect();

            CandidatePlan {
                index,
                start_id: start.id.clone(),
                end_id: end.id.clone(),
                waypoint_ids: waypoints.iter().map(|stop| stop.id.clone()).collect(),
                request: DirectionsRequest {
                    origin: start.location,
                    destination: end.location,
                    waypoints: waypoints.iter().map(|stop| stop.location).collect(),
                    optimize_waypoints: true,
                },
            }
        })
        .collect()
}

/// Turn an oracle response into a scored candidate.
///
/// Rejects responses whose waypoint order is not a permutation of the request's
/// waypoint indices, or whose leg count does not cover the whole route.
pub fn candidate_from_response(
    plan: &CandidatePlan,
    response: &DirectionsResponse,
) -> Result<RouteCandidate, TourError> {
    let waypoint_count = plan.waypoint_ids.len();
    // start -> each waypoint -> end
    let expected_legs = waypoint_count + 1;
    if response.legs.len() != expected_legs {
        return Err(TourError::external(format!(
            "directions for candidate {} returned {} legs, expected {}",
            plan.end_id,
            response.legs.len(),
            expected_legs
        )));
    }

    if response.waypoint_order.len() != waypoint_count {
        return Err(TourError::external(format!(
            "directions for candidate {} returned {} waypoint indices, expected {}",
            plan.end_id,
            response.waypoint_order.len(),
            waypoint_count
        )));
    }

    let mut seen = vec![false; waypoint_count];
    let mut stop_order = Vec::with_capacity(waypoint_count + 2);
    stop_order.push(plan.start_id.clone());
    for &idx in &response.waypoint_order {
        match seen.get_mut(idx) {
            Some(slot) if !*slot => {
                *slot = true;
                stop_order.push(plan.waypoint_ids[idx].clone());
            }
            _ => {
                return Err(TourError::external(format!(
                    "directions for candidate {} returned invalid waypoint index {}",
                    plan.end_id, idx
                )));
            }
        }
    }
    stop_order.push(plan.end_id.clone());

    let (total_time_s, total_distance_m) = response
        .legs
        .iter()
        .fold((0u64, 0u64), |(time, dist), leg| {
            (
                time.saturating_add(leg.duration_s),
                dist.saturating_add(leg.distance_m),
            )
        });

    Ok(RouteCandidate {
        index: plan.index,
        end_stop_id: plan.end_id.clone(),
        total_time_s,
        total_distance_m,
        stop_order,
    })
}

fn compare_candidates(a: &RouteCandidate, b: &RouteCandidate) -> Ordering {
    a.total_time_s
        .cmp(&b.total_time_s)
        .then(a.total_distance_m.cmp(&b.total_distance_m))
        .then(a.index.cmp(&b.index))
}

/// Minimum total time, then minimum total distance, then lowest candidate index.
pub fn select_best(candidates: Vec<RouteCandidate>) -> Result<RouteCandidate, TourError> {
    candidates
        .into_iter()
        .min_by(compare_candidates)
        .ok_or_else(|| TourError::integrity(NO_VIABLE_ROUTE))
}
