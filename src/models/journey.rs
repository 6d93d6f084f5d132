use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::SimulationError;

// ─── Route ───────────────────────────────────────────────────────────────────

/// A single WGS84 vertex of the drawn route, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl Waypoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Ordered, validated sequence of waypoints. Order defines travel direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    waypoints: Vec<Waypoint>,
}

impl Route {
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self, SimulationError> {
        if waypoints.len() < 2 {
            return Err(SimulationError::InvalidRoute(format!(
                "a route needs at least 2 waypoints, got {}",
                waypoints.len()
            )));
        }
        for (i, w) in waypoints.iter().enumerate() {
            if !w.latitude.is_finite() || !w.longitude.is_finite() {
                return Err(SimulationError::InvalidRoute(format!(
                    "waypoint {i} has a non-finite coordinate"
                )));
            }
            // Longitudes past ±180 come from maps panned across the
            // antimeridian and are kept unwrapped
            if w.latitude.abs() > 90.0 {
                return Err(SimulationError::InvalidRoute(format!(
                    "waypoint {i} latitude out of range: {}",
                    w.latitude
                )));
            }
        }
        Ok(Self { waypoints })
    }

    /// Builds a route from the drawing surface's GeoJSON output.
    ///
    /// Only the first feature is used; its geometry must be a `LineString`
    /// with `[lon, lat]` (optionally `[lon, lat, alt]`) positions.
    pub fn from_geojson(value: &serde_json::Value) -> Result<Self, SimulationError> {
        let collection: FeatureCollection = serde_json::from_value(value.clone())
            .map_err(|e| SimulationError::InvalidRoute(format!("unreadable GeoJSON: {e}")))?;

        let geometry = collection
            .features
            .into_iter()
            .next()
            .and_then(|f| f.geometry)
            .ok_or_else(|| SimulationError::InvalidRoute("no route drawn".to_string()))?;

        if geometry.kind != "LineString" {
            return Err(SimulationError::InvalidRoute(format!(
                "expected a LineString, got {}",
                geometry.kind
            )));
        }

        let waypoints = geometry
            .coordinates
            .iter()
            .map(|position| match position.as_slice() {
                [lon, lat, ..] => Ok(Waypoint::new(*lat, *lon)),
                _ => Err(SimulationError::InvalidRoute(
                    "position with fewer than 2 coordinates".to_string(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(waypoints)
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Consecutive (start, end) legs in travel order.
    pub fn legs(&self) -> impl Iterator<Item = (Waypoint, Waypoint)> + '_ {
        self.waypoints.windows(2).map(|w| (w[0], w[1]))
    }
}

// ─── GeoJSON wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Vec<Vec<f64>>,
}

// ─── Simulation parameters & output ──────────────────────────────────────────

/// Panel and voyage parameters for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Panel surface area (m²)
    pub surface_area_m2: f64,
    /// Production at full irradiance (kW per m²)
    pub yield_kw_per_m2: f64,
    /// Constant vessel speed (km/h)
    pub vessel_speed_kmh: f64,
    pub start: DateTime<Utc>,
    pub cloud_attenuation: bool,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(SimulationError::InvalidConfig(format!(
                    "{name} must be a positive number, got {v}"
                )))
            }
        };
        positive("surface area", self.surface_area_m2)?;
        positive("yield coefficient", self.yield_kw_per_m2)?;
        positive("vessel speed", self.vessel_speed_kmh)
    }
}

/// One evaluated daylight point of the journey.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub solar_elevation_deg: f64,
    /// Cloud attenuation factor [0..1], 1 = no loss
    pub attenuation: f64,
    pub power_kw: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    /// Daylight samples in timestamp order
    pub samples: Vec<Sample>,
    pub total_energy_kwh: f64,
    /// Dates whose cloud-cover lookup failed and fell back to no attenuation
    pub provider_failures: Vec<NaiveDate>,
}

impl SimulationResult {
    pub fn summary(&self) -> String {
        format!("Total Output: {:.2} kWh", self.total_energy_kwh)
    }
}

// ─── NASA POWER wire types ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PowerDailyResponse {
    pub properties: PowerProperties,
}

#[derive(Debug, Deserialize)]
pub struct PowerProperties {
    /// parameter name → (YYYYMMDD → value)
    pub parameter: HashMap<String, HashMap<String, f64>>,
}

// ─── REST API types ──────────────────────────────────────────────────────────

/// Body of `POST /api/simulate`. Omitted numeric fields fall back to the
/// configured form defaults.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SimulateRequest {
    /// FeatureCollection drawn on the map, positions as `[lon, lat]`
    #[schema(value_type = Option<Object>)]
    pub geojson: Option<serde_json::Value>,
    /// Alternative to `geojson`
    pub waypoints: Option<Vec<Waypoint>>,
    pub surface_area_m2: Option<f64>,
    pub yield_kw_per_m2: Option<f64>,
    pub vessel_speed_kmh: Option<f64>,
    /// `YYYY-MM-DD HH:MM` (UTC) or RFC 3339
    pub start_date: Option<String>,
    #[serde(default)]
    pub cloud_attenuation: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SimulateResponse {
    pub points: Vec<Sample>,
    pub total_energy_kwh: f64,
    pub summary: String,
    pub provider_failures: Vec<NaiveDate>,
}

impl From<SimulationResult> for SimulateResponse {
    fn from(result: SimulationResult) -> Self {
        let summary = result.summary();
        Self {
            points: result.samples,
            total_energy_kwh: result.total_energy_kwh,
            summary,
            provider_failures: result.provider_failures,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub summary: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FormDefaults {
    pub surface_area_m2: f64,
    pub yield_kw_per_m2: f64,
    pub vessel_speed_kmh: f64,
    pub start_date: String,
    pub cloud_attenuation: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OfflineModeSetting {
    pub offline_mode: bool,
}
