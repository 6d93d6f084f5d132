/// ============================================================
///  Solar ephemeris
///
///   1. Fractional year  – day of year + UTC hour
///   2. Declination      – Spencer (1971) Fourier series
///   3. Equation of time – Spencer (1971), minutes
///   4. Hour angle       – true solar time from UTC + longitude + EoT
///   5. Elevation        – geometric, then Bennett refraction → apparent
/// ============================================================

use chrono::{DateTime, Datelike, Timelike, Utc};
use std::f64::consts::PI;

use crate::error::SimulationError;

/// Apparent solar elevation for a UTC instant at a WGS84 position.
pub trait SolarEphemeris {
    /// Degrees above the horizon; negative below it.
    fn elevation(&self, at: DateTime<Utc>, lat_deg: f64, lon_deg: f64) -> Result<f64, SimulationError>;
}

/// Closed-form solar position, accurate to a few tenths of a degree.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpencerEphemeris;

impl SolarEphemeris for SpencerEphemeris {
    fn elevation(&self, at: DateTime<Utc>, lat_deg: f64, lon_deg: f64) -> Result<f64, SimulationError> {
        if !lat_deg.is_finite() || !lon_deg.is_finite() || lat_deg.abs() > 90.0 {
            return Err(SimulationError::Ephemeris(format!(
                "position out of domain: ({lat_deg}, {lon_deg})"
            )));
        }
        let geometric = geometric_elevation_deg(at, lat_deg, lon_deg);
        Ok(geometric + refraction_deg(geometric))
    }
}

/// Sun elevation without atmospheric refraction (degrees).
pub fn geometric_elevation_deg(at: DateTime<Utc>, lat_deg: f64, lon_deg: f64) -> f64 {
    let ut_h = at.hour() as f64
        + at.minute() as f64 / 60.0
        + (at.second() as f64 + at.nanosecond() as f64 * 1e-9) / 3600.0;

    let year_days = if chrono::NaiveDate::from_ymd_opt(at.year(), 12, 31)
        .map(|d| d.ordinal() == 366)
        .unwrap_or(false)
    {
        366.0
    } else {
        365.0
    };
    let gamma = 2.0 * PI / year_days * (at.ordinal() as f64 - 1.0 + (ut_h - 12.0) / 24.0);

    let decl = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin();

    let eot_min = 229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin());

    // True solar time (hours), hour angle negative in the morning
    let solar_time_h = ut_h + lon_deg / 15.0 + eot_min / 60.0;
    let omega = (15.0 * (solar_time_h - 12.0)).to_radians();

    let lat = lat_deg.to_radians();
    let sin_alpha = lat.sin() * decl.sin() + lat.cos() * decl.cos() * omega.cos();
    sin_alpha.clamp(-1.0, 1.0).asin().to_degrees()
}

/// Bennett (1982) refraction for standard atmosphere, degrees.
/// Zero once the sun is well below the horizon.
fn refraction_deg(elevation_deg: f64) -> f64 {
    if elevation_deg < -1.0 {
        return 0.0;
    }
    let arg = (elevation_deg + 7.31 / (elevation_deg + 4.4)).to_radians();
    (1.0 / arg.tan()) / 60.0
}
