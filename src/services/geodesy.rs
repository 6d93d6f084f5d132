/// ============================================================
///  Geodesic segmentation of a journey leg
///
///   1. Distance   – Vincenty inverse on the WGS84 ellipsoid,
///                   haversine fallback for near-antipodal legs
///   2. Duration   – distance / constant vessel speed
///   3. Sampling   – max(2, ⌊duration / 10 min⌋) points, lat/lon
///                   interpolated linearly, endpoints included,
///                   produced lazily
/// ============================================================

use chrono::Duration;

use crate::models::journey::Waypoint;

// ─── WGS84 ───────────────────────────────────────────────────
const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);
const MEAN_EARTH_RADIUS_KM: f64 = 6371.0088;

const VINCENTY_TOLERANCE: f64 = 1e-12;
const VINCENTY_MAX_ITER: usize = 200;

/// Fixed temporal resolution of the journey sampling.
pub const SAMPLE_INTERVAL_MINUTES: i64 = 10;
const SAMPLE_INTERVAL_SECONDS: f64 = (SAMPLE_INTERVAL_MINUTES * 60) as f64;

/// Ellipsoidal distance between two waypoints in kilometres.
pub fn geodesic_distance_km(from: Waypoint, to: Waypoint) -> f64 {
    vincenty_inverse_m(from, to)
        .map(|m| m / 1000.0)
        .unwrap_or_else(|| haversine_km(from, to))
}

/// Vincenty (1975) inverse formula. `None` when the iteration does not
/// converge, which only happens for nearly antipodal points.
fn vincenty_inverse_m(from: Waypoint, to: Waypoint) -> Option<f64> {
    let l = normalize_longitude(to.longitude - from.longitude).to_radians();
    let u1 = ((1.0 - WGS84_F) * from.latitude.to_radians().tan()).atan();
    let u2 = ((1.0 - WGS84_F) * to.latitude.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    for _ in 0..VINCENTY_MAX_ITER {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        if sin_sigma == 0.0 {
            // coincident, or antipodal along the equator
            return (cos_sigma > 0.0).then_some(0.0);
        }
        let sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // Equatorial line: cos²α = 0
        let cos_2sigma_m = if cos_sq_alpha != 0.0 {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        } else {
            0.0
        };
        let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));
        let lambda_prev = lambda;
        lambda = l
            + (1.0 - c)
                * WGS84_F
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))));

        if (lambda - lambda_prev).abs() < VINCENTY_TOLERANCE {
            let u_sq = cos_sq_alpha * (WGS84_A.powi(2) - WGS84_B.powi(2)) / WGS84_B.powi(2);
            let a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
            let b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
            let delta_sigma = b
                * sin_sigma
                * (cos_2sigma_m
                    + b / 4.0
                        * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))
                            - b / 6.0
                                * cos_2sigma_m
                                * (-3.0 + 4.0 * sin_sigma.powi(2))
                                * (-3.0 + 4.0 * cos_2sigma_m.powi(2))));
            return Some(WGS84_B * a * (sigma - delta_sigma));
        }
    }
    None
}

fn haversine_km(from: Waypoint, to: Waypoint) -> f64 {
    let phi1 = from.latitude.to_radians();
    let phi2 = to.latitude.to_radians();
    let d_phi = phi2 - phi1;
    let d_lambda = normalize_longitude(to.longitude - from.longitude).to_radians();
    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * MEAN_EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

// ─── Segmentation ────────────────────────────────────────────

/// One leg of the journey, sampled at the fixed interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub from: Waypoint,
    pub to: Waypoint,
    pub distance_km: f64,
    /// Full traversal time at the configured speed, seconds
    pub duration_s: f64,
    /// Number of sample points, both endpoints included
    pub sample_count: usize,
}

impl Segment {
    /// Full traversal time at microsecond resolution, `None` when it does
    /// not fit a `chrono::Duration`.
    pub fn duration(&self) -> Option<Duration> {
        let micros = (self.duration_s * 1e6).round();
        if micros.is_finite() && micros.abs() < i64::MAX as f64 {
            Some(Duration::microseconds(micros as i64))
        } else {
            None
        }
    }

    /// Evenly spaced points, lat/lon interpolated independently.
    pub fn points(&self) -> impl Iterator<Item = Waypoint> + '_ {
        let last = (self.sample_count - 1) as f64;
        (0..self.sample_count).map(move |i| {
            let t = i as f64 / last;
            Waypoint::new(
                self.from.latitude + (self.to.latitude - self.from.latitude) * t,
                self.from.longitude + (self.to.longitude - self.from.longitude) * t,
            )
        })
    }
}

/// Plans the leg `from → to` for a vessel moving at `speed_kmh` (must be
/// > 0). No points are materialised here.
pub fn segment(from: Waypoint, to: Waypoint, speed_kmh: f64) -> Segment {
    let distance_km = geodesic_distance_km(from, to);
    let duration_s = distance_km / speed_kmh * 3600.0;

    Segment {
        from,
        to,
        distance_km,
        duration_s,
        sample_count: sample_count(duration_s),
    }
}

/// max(2, ⌊duration / interval⌋), saturating at `usize::MAX`.
pub fn sample_count(duration_s: f64) -> usize {
    ((duration_s / SAMPLE_INTERVAL_SECONDS).floor() as usize).max(2)
}

/// Wraps a longitude into [-180, 180).
pub fn normalize_longitude(lon_deg: f64) -> f64 {
    (lon_deg + 180.0).rem_euclid(360.0) - 180.0
}
