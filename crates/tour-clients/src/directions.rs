//! Directions API client with waypoint optimization.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use tour_core::{
    Coordinates, DirectionsLeg, DirectionsRequest, DirectionsResponse, MappingOracle, TourError,
};

#[derive(Debug, Clone)]
pub struct DirectionsConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for DirectionsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://maps.googleapis.com".to_string(),
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

/// HTTP client for the directions service.
#[derive(Debug, Clone)]
pub struct DirectionsClient {
    config: DirectionsConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<ApiRoute>,
}

#[derive(Debug, Deserialize)]
struct ApiRoute {
    #[serde(default)]
    legs: Vec<ApiLeg>,
    #[serde(default)]
    waypoint_order: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct ApiLeg {
    distance: ApiValue,
    duration: ApiValue,
}

#[derive(Debug, Deserialize)]
struct ApiValue {
    value: u64,
}

impl DirectionsClient {
    pub fn new(config: DirectionsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create directions HTTP client")?;

        Ok(Self { config, client })
    }

    async fn fetch(&self, request: &DirectionsRequest) -> Result<DirectionsResponse> {
        let url = format!(
            "{}/maps/api/directions/json",
            self.config.base_url.trim_end_matches('/')
        );

        let mut query = vec![
            ("origin", request.origin.to_string()),
            ("destination", request.destination.to_string()),
        ];
        if !request.waypoints.is_empty() {
            query.push((
                "waypoints",
                waypoints_param(&request.waypoints, request.optimize_waypoints),
            ));
        }
        if !self.config.api_key.is_empty() {
            query.push(("key", self.config.api_key.clone()));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .context("Failed to request directions")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Directions request failed: {} {}",
                status,
                body
            ));
        }

        let payload = response
            .json::<ApiResponse>()
            .await
            .context("Failed to parse directions response")?;

        into_directions(payload)
    }
}

#[async_trait]
impl MappingOracle for DirectionsClient {
    async fn optimize_waypoints(
        &self,
        request: &DirectionsRequest,
    ) -> Result<DirectionsResponse, TourError> {
        self.fetch(request)
            .await
            .map_err(|err| TourError::external(format!("{:#}", err)))
    }
}

fn waypoints_param(waypoints: &[Coordinates], optimize: bool) -> String {
    let points = waypoints
        .iter()
        .map(|point| point.to_string())
        .collect::<Vec<_>>()
        .join("|");
    if optimize {
        format!("optimize:true|{}", points)
    } else {
        points
    }
}

fn into_directions(payload: ApiResponse) -> Result<DirectionsResponse> {
    if payload.status != "OK" {
        return Err(anyhow::anyhow!(
            "Directions status {}: {}",
            payload.status,
            payload.error_message.unwrap_or_default()
        ));
    }

    let route = payload
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Directions response contained no routes"))?;

    Ok(DirectionsResponse {
        legs: route
            .legs
            .into_iter()
            .map(|leg| DirectionsLeg {
                distance_m: leg.distance.value,
                duration_s: leg.duration.value,
            })
            .collect(),
        waypoint_order: route.waypoint_order,
    })
}
