use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{error, info, warn};

use crate::config::{CloudProviderConfig, SimulationDefaults};
use crate::error::SimulationError;
use crate::models::journey::{
    ErrorResponse, FormDefaults, OfflineModeSetting, Route, SimulateRequest, SimulateResponse,
    SimulationConfig, SimulationResult,
};
use crate::services::cloud_cover::{CacheKeyPolicy, ClimatologyCloudCover, CloudCoverProvider, NasaPowerClient};
use crate::services::ephemeris::SpencerEphemeris;
use crate::services::journey_simulator::JourneySimulator;
use crate::shared_state::AppState;

const FORM_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// POST /api/simulate
/// Simulate solar production along a drawn route
///
/// Samples the route every 10 minutes of travel, evaluates panel output from
/// the sun's elevation (and optionally daily cloud cover) and integrates it
/// into a total energy figure. Night-time samples are omitted from `points`.
#[utoipa::path(
    post,
    path = "/api/simulate",
    request_body = SimulateRequest,
    responses(
        (status = 200, description = "Production series and total", body = SimulateResponse),
        (status = 422, description = "Invalid route or inputs", body = ErrorResponse),
        (status = 500, description = "Solar position unavailable", body = ErrorResponse),
        (status = 504, description = "Simulation exceeded the run deadline", body = ErrorResponse)
    )
)]
pub async fn simulate(State(state): State<AppState>, Json(req): Json<SimulateRequest>) -> Response {
    let defaults = &state.config.simulation;
    let (route, config) = match build_run(req, defaults, Utc::now()) {
        Ok(run) => run,
        Err(e) => return error_response(&e),
    };

    info!(
        waypoints = route.waypoints().len(),
        start = %config.start,
        cloud_attenuation = config.cloud_attenuation,
        offline = state.is_offline(),
        "simulation requested"
    );

    let provider_cfg = state.config.cloud_provider.clone();
    let offline = state.is_offline();
    let policy = defaults.cache_policy();
    let budget = Duration::from_secs(defaults.run_timeout_s);
    let deadline = Instant::now() + budget;
    // The run stops itself at `deadline`; the outer timeout only covers a
    // provider request still in flight at that moment.
    let guard = budget + Duration::from_secs(provider_cfg.timeout_s.saturating_add(1));

    let task = tokio::task::spawn_blocking(move || {
        run_blocking(&route, config, &provider_cfg, offline, policy, deadline)
    });

    match tokio::time::timeout(guard, task).await {
        Ok(Ok(Ok(result))) => (StatusCode::OK, Json(SimulateResponse::from(result))).into_response(),
        Ok(Ok(Err(e))) => error_response(&e),
        Ok(Err(join_err)) => {
            error!(error = %join_err, "simulation task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "simulation task failed".to_string(),
                    summary: "Total Output: Unavailable".to_string(),
                }),
            )
                .into_response()
        }
        Err(_) => {
            warn!(timeout_s = budget.as_secs(), "simulation timed out");
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(ErrorResponse {
                    error: format!("simulation exceeded {} s", budget.as_secs()),
                    summary: "Total Output: Unavailable".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /api/defaults
/// Get the input form defaults
///
/// Start date is the current UTC time in `YYYY-MM-DD HH:MM` form.
#[utoipa::path(
    get,
    path = "/api/defaults",
    responses(
        (status = 200, description = "Form defaults", body = FormDefaults)
    )
)]
pub async fn get_defaults(State(state): State<AppState>) -> impl IntoResponse {
    Json(form_defaults(&state.config.simulation, Utc::now()))
}

/// GET /api/settings/offline-mode
#[utoipa::path(
    get,
    path = "/api/settings/offline-mode",
    responses(
        (status = 200, description = "Current offline mode", body = OfflineModeSetting)
    )
)]
pub async fn get_offline_mode(State(state): State<AppState>) -> impl IntoResponse {
    Json(OfflineModeSetting { offline_mode: state.is_offline() })
}

/// POST /api/settings/offline-mode
/// Switch cloud cover between NASA POWER and the offline climatology model
#[utoipa::path(
    post,
    path = "/api/settings/offline-mode",
    request_body = OfflineModeSetting,
    responses(
        (status = 200, description = "Offline mode updated", body = OfflineModeSetting)
    )
)]
pub async fn set_offline_mode(
    State(state): State<AppState>,
    Json(setting): Json<OfflineModeSetting>,
) -> impl IntoResponse {
    state.set_offline(setting.offline_mode);
    info!(offline_mode = setting.offline_mode, "offline mode changed");
    Json(OfflineModeSetting { offline_mode: state.is_offline() })
}

// ─── Request handling helpers ────────────────────────────────

/// Turns a request into a validated route and run configuration, filling
/// omitted fields from the form defaults.
pub fn build_run(
    req: SimulateRequest,
    defaults: &SimulationDefaults,
    now: DateTime<Utc>,
) -> Result<(Route, SimulationConfig), SimulationError> {
    let route = match (req.geojson, req.waypoints) {
        (Some(geojson), _) => Route::from_geojson(&geojson)?,
        (None, Some(waypoints)) => Route::new(waypoints)?,
        (None, None) => return Err(SimulationError::InvalidRoute("no route drawn".to_string())),
    };

    let start = match req.start_date.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => parse_start_date(s)?,
        _ => now,
    };

    let config = SimulationConfig {
        surface_area_m2: req.surface_area_m2.unwrap_or(defaults.surface_area_m2),
        yield_kw_per_m2: req.yield_kw_per_m2.unwrap_or(defaults.yield_kw_per_m2),
        vessel_speed_kmh: req.vessel_speed_kmh.unwrap_or(defaults.vessel_speed_kmh),
        start,
        cloud_attenuation: req.cloud_attenuation,
    };
    config.validate()?;
    Ok((route, config))
}

/// Accepts the form's `YYYY-MM-DD HH:MM` (UTC) or an RFC 3339 timestamp.
pub fn parse_start_date(s: &str) -> Result<DateTime<Utc>, SimulationError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, FORM_DATE_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| SimulationError::InvalidConfig(format!("start date '{s}' is not YYYY-MM-DD HH:MM")))
}

pub fn form_defaults(defaults: &SimulationDefaults, now: DateTime<Utc>) -> FormDefaults {
    FormDefaults {
        surface_area_m2: defaults.surface_area_m2,
        yield_kw_per_m2: defaults.yield_kw_per_m2,
        vessel_speed_kmh: defaults.vessel_speed_kmh,
        start_date: now.format(FORM_DATE_FORMAT).to_string(),
        cloud_attenuation: false,
    }
}

/// Runs one simulation on the current (blocking) thread, giving up at
/// `deadline`. The cloud provider is only built when attenuation is requested.
fn run_blocking(
    route: &Route,
    mut config: SimulationConfig,
    provider_cfg: &CloudProviderConfig,
    offline: bool,
    policy: CacheKeyPolicy,
    deadline: Instant,
) -> Result<SimulationResult, SimulationError> {
    let climatology = ClimatologyCloudCover;
    let nasa = if config.cloud_attenuation && !offline {
        match NasaPowerClient::new(provider_cfg) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "cloud provider unavailable, running without attenuation");
                config.cloud_attenuation = false;
                None
            }
        }
    } else {
        None
    };
    let clouds: &dyn CloudCoverProvider = match &nasa {
        Some(client) => client,
        None => &climatology,
    };

    JourneySimulator::new(&SpencerEphemeris, clouds)
        .with_cache_policy(policy)
        .with_deadline(deadline)
        .simulate(route, &config)
}

fn error_response(e: &SimulationError) -> Response {
    let (status, summary) = match e {
        SimulationError::InvalidRoute(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Total Output: Invalid Route"),
        SimulationError::InvalidConfig(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Total Output: Invalid Inputs"),
        SimulationError::Ephemeris(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Total Output: Unavailable"),
        SimulationError::DeadlineExceeded { .. } => (StatusCode::GATEWAY_TIMEOUT, "Total Output: Unavailable"),
    };
    if status.is_server_error() {
        error!(error = %e, "simulation failed");
    } else {
        warn!(error = %e, "simulation rejected");
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            summary: summary.to_string(),
        }),
    )
        .into_response()
}
