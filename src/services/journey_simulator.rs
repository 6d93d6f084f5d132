/// ============================================================
///  Journey solar-production simulator
///
///  Pipeline, strictly in waypoint order:
///   1. Segmentation  – each leg sampled every 10 min (geodesy)
///   2. Clock         – sample j at leg start + j·10 min; the clock
///                      then jumps by the full leg duration
///   3. Attenuation   – per-date cloud factor, only when enabled
///   4. Evaluation    – P = A × k × sin(elevation) × attenuation,
///                      below-horizon samples dropped
///   5. Accumulation  – E += P × 10/60 h (rectangle rule)
///
///  All legs are planned before the first provider call, so a
///  journey too long to sample is rejected up front.
/// ============================================================

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::error::SimulationError;
use crate::models::journey::{Route, Sample, SimulationConfig, SimulationResult, Waypoint};
use crate::services::cloud_cover::{AttenuationCache, CacheKeyPolicy, CloudCoverProvider};
use crate::services::ephemeris::SolarEphemeris;
use crate::services::geodesy::{self, SAMPLE_INTERVAL_MINUTES, Segment};

/// Energy weight of one retained sample (hours).
const STEP_HOURS: f64 = SAMPLE_INTERVAL_MINUTES as f64 / 60.0;

/// Upper bound on evaluated samples per run, about 3.8 years of travel.
pub const MAX_SAMPLES: usize = 200_000;

/// Running UTC clock of the vessel.
#[derive(Debug, Clone, Copy)]
struct JourneyClock {
    now: DateTime<Utc>,
}

impl JourneyClock {
    fn starting_at(start: DateTime<Utc>) -> Self {
        Self { now: start }
    }

    /// Timestamp of sample `index` within the current leg.
    fn sample_time(&self, index: usize) -> Result<DateTime<Utc>, SimulationError> {
        i64::try_from(index)
            .ok()
            .and_then(|i| i.checked_mul(SAMPLE_INTERVAL_MINUTES))
            .and_then(Duration::try_minutes)
            .and_then(|offset| self.now.checked_add_signed(offset))
            .ok_or_else(out_of_time_range)
    }

    fn advance(&mut self, leg: &Segment) -> Result<(), SimulationError> {
        self.now = leg
            .duration()
            .and_then(|d| self.now.checked_add_signed(d))
            .ok_or_else(out_of_time_range)?;
        Ok(())
    }
}

fn out_of_time_range() -> SimulationError {
    SimulationError::InvalidConfig("journey ends outside the representable time range".to_string())
}

/// Segments every leg and checks the whole journey fits the sample budget
/// and the calendar. Nothing is sampled yet.
fn plan_journey(route: &Route, config: &SimulationConfig) -> Result<Vec<Segment>, SimulationError> {
    let legs: Vec<Segment> = route
        .legs()
        .map(|(from, to)| geodesy::segment(from, to, config.vessel_speed_kmh))
        .collect();

    let total = legs.iter().fold(0usize, |n, leg| n.saturating_add(leg.sample_count));
    if total > MAX_SAMPLES {
        return Err(SimulationError::InvalidConfig(format!(
            "journey needs {total} samples at {} km/h, the limit is {MAX_SAMPLES}",
            config.vessel_speed_kmh
        )));
    }

    let mut clock = JourneyClock::starting_at(config.start);
    for leg in &legs {
        clock.sample_time(leg.sample_count - 1)?;
        clock.advance(leg)?;
    }
    Ok(legs)
}

/// Folds evaluated samples into the output series and total energy.
#[derive(Debug, Default)]
struct ProductionAccumulator {
    samples: Vec<Sample>,
    total_energy_kwh: f64,
}

impl ProductionAccumulator {
    fn push(&mut self, sample: Sample) {
        self.total_energy_kwh += sample.power_kw * STEP_HOURS;
        self.samples.push(sample);
    }
}

/// Instantaneous panel output (kW), or `None` when the sun is at or below
/// the horizon.
pub fn evaluate_power(elevation_deg: f64, attenuation: f64, config: &SimulationConfig) -> Option<f64> {
    if elevation_deg <= 0.0 {
        return None;
    }
    let irradiance_factor = elevation_deg.to_radians().sin();
    Some(config.surface_area_m2 * config.yield_kw_per_m2 * irradiance_factor * attenuation)
}

/// Simulator bound to its external capabilities. Holds no per-run state:
/// the cache and the clock are created inside every `simulate` call.
pub struct JourneySimulator<'a> {
    ephemeris: &'a dyn SolarEphemeris,
    clouds: &'a dyn CloudCoverProvider,
    cache_policy: CacheKeyPolicy,
    deadline: Option<Instant>,
}

impl<'a> JourneySimulator<'a> {
    pub fn new(ephemeris: &'a dyn SolarEphemeris, clouds: &'a dyn CloudCoverProvider) -> Self {
        Self {
            ephemeris,
            clouds,
            cache_policy: CacheKeyPolicy::default(),
            deadline: None,
        }
    }

    pub fn with_cache_policy(mut self, policy: CacheKeyPolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Abort the run with `DeadlineExceeded` once `deadline` has passed.
    /// Checked before every sample, so a provider call already in flight
    /// finishes but no further one is started.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn check_deadline(&self, evaluated: usize) -> Result<(), SimulationError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                warn!(samples = evaluated, "run deadline exceeded, aborting");
                Err(SimulationError::DeadlineExceeded { samples: evaluated })
            }
            _ => Ok(()),
        }
    }

    pub fn simulate(&self, route: &Route, config: &SimulationConfig) -> Result<SimulationResult, SimulationError> {
        config.validate()?;
        let legs = plan_journey(route, config)?;

        let mut clock = JourneyClock::starting_at(config.start);
        let mut cache = AttenuationCache::new(self.clouds, self.cache_policy);
        let mut acc = ProductionAccumulator::default();
        let mut evaluated = 0usize;

        for leg in &legs {
            debug!(
                distance_km = leg.distance_km,
                samples = leg.sample_count,
                start = %clock.now,
                "leg segmented"
            );

            for (j, Waypoint { latitude, longitude }) in leg.points().enumerate() {
                self.check_deadline(evaluated)?;
                evaluated += 1;

                let timestamp = clock.sample_time(j)?;
                let attenuation = if config.cloud_attenuation {
                    cache.get_attenuation(timestamp.date_naive(), latitude, longitude)
                } else {
                    1.0
                };

                let elevation = self.ephemeris.elevation(timestamp, latitude, longitude)?;
                let Some(power_kw) = evaluate_power(elevation, attenuation, config) else {
                    continue;
                };

                #[cfg(feature = "verbose_log")]
                tracing::trace!(%timestamp, latitude, longitude, elevation, attenuation, power_kw, "sample");

                acc.push(Sample {
                    timestamp,
                    latitude,
                    longitude,
                    solar_elevation_deg: elevation,
                    attenuation,
                    power_kw,
                });
            }

            clock.advance(leg)?;
        }

        let provider_failures = cache.into_failures();
        info!(
            samples = acc.samples.len(),
            total_energy_kwh = acc.total_energy_kwh,
            provider_failures = provider_failures.len(),
            "journey simulated"
        );

        Ok(SimulationResult {
            samples: acc.samples,
            total_energy_kwh: acc.total_energy_kwh,
            provider_failures,
        })
    }
}
