use std::collections::HashMap;
use std::f64::consts::PI;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, info, warn};

use crate::config::CloudProviderConfig;
use crate::error::ProviderError;
use crate::models::journey::PowerDailyResponse;
use crate::services::geodesy::normalize_longitude;

const CLOUD_PARAMETER: &str = "CLOUD_AMT";
/// Bytes of an error body kept for logs.
const MAX_ERROR_BODY: usize = 256;

/// Daily cloud fraction at a point, in [0, 1].
pub trait CloudCoverProvider {
    fn cloud_fraction(&self, lat: f64, lon: f64, date: NaiveDate) -> Result<f64, ProviderError>;
}

// ─── NASA POWER ──────────────────────────────────────────────

/// Blocking client for the NASA POWER daily point API.
pub struct NasaPowerClient {
    http: reqwest::blocking::Client,
    base_url: String,
    community: String,
}

impl NasaPowerClient {
    pub fn new(cfg: &CloudProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_s))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.clone(),
            community: cfg.community.clone(),
        })
    }
}

impl CloudCoverProvider for NasaPowerClient {
    fn cloud_fraction(&self, lat: f64, lon: f64, date: NaiveDate) -> Result<f64, ProviderError> {
        let day = date.format("%Y%m%d").to_string();
        let lon = normalize_longitude(lon);
        let (lat_s, lon_s) = (lat.to_string(), lon.to_string());
        info!(%date, lat, lon, "fetching cloud cover");

        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("parameters", CLOUD_PARAMETER),
                ("community", self.community.as_str()),
                ("longitude", lon_s.as_str()),
                ("latitude", lat_s.as_str()),
                ("start", day.as_str()),
                ("end", day.as_str()),
                ("format", "JSON"),
            ])
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate_body(&body, MAX_ERROR_BODY),
            });
        }
        cloud_fraction_from_payload(&body, date)
    }
}

/// Cuts `body` to at most `max` bytes on a char boundary, marking the cut.
fn truncate_body(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}… ({} bytes total)", &body[..end], body.len())
}

/// Extracts the `CLOUD_AMT` percentage for `date` and converts it to a
/// fraction. Negative values are the API's no-data fill value.
pub fn cloud_fraction_from_payload(body: &str, date: NaiveDate) -> Result<f64, ProviderError> {
    let payload: PowerDailyResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let missing = || ProviderError::MissingParameter {
        parameter: CLOUD_PARAMETER.to_string(),
        date,
    };
    let percent = *payload
        .properties
        .parameter
        .get(CLOUD_PARAMETER)
        .ok_or_else(missing)?
        .get(&date.format("%Y%m%d").to_string())
        .ok_or_else(missing)?;

    if percent < 0.0 {
        return Err(ProviderError::NoData(date));
    }
    debug!(%date, percent, "cloud cover received");
    Ok((percent / 100.0).clamp(0.0, 1.0))
}

// ─── Offline climatology ─────────────────────────────────────

/// Deterministic climatological cloud fraction, used when the service runs
/// without network access.
///
/// Layers a latitude-band/season clearness baseline with a pseudo-random
/// day-to-day scatter seeded from position and day of year.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClimatologyCloudCover;

impl CloudCoverProvider for ClimatologyCloudCover {
    fn cloud_fraction(&self, lat: f64, lon: f64, date: NaiveDate) -> Result<f64, ProviderError> {
        let doy = date.ordinal() as f64;

        let season_phase = if lat >= 0.0 {
            // NH: clearest mid-June
            (2.0 * PI * (doy - 180.0) / 365.0).cos()
        } else {
            (2.0 * PI * (doy - 365.0) / 365.0).cos()
        };

        let abs_lat = lat.abs();
        let clearness = if abs_lat < 15.0 {
            0.55 + 0.05 * season_phase
        } else if abs_lat < 35.0 {
            0.70 + 0.10 * season_phase
        } else if abs_lat < 55.0 {
            0.62 + 0.12 * season_phase
        } else if abs_lat < 65.0 {
            0.52 + 0.10 * season_phase
        } else {
            0.45 + 0.10 * season_phase
        };

        let seed = ((lat * 100.0) as i64).wrapping_mul(397)
            ^ ((lon * 100.0) as i64).wrapping_mul(631)
            ^ (doy as i64).wrapping_mul(1013);
        let daily_noise = ((seed % 1000) as f64 / 1000.0 - 0.5) * 2.0;

        let clearness = (clearness + daily_noise * 0.12).clamp(0.15, 1.0);
        Ok(1.0 - clearness)
    }
}

// ─── Attenuation cache ───────────────────────────────────────

/// How cached attenuation factors are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CacheKeyPolicy {
    /// One factor per UTC calendar date for the whole route
    #[default]
    Date,
    /// One factor per date and per grid cell of the given size (degrees)
    DateAndGrid { cell_deg: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    date: NaiveDate,
    cell: Option<(i64, i64)>,
}

/// Per-run memo of attenuation factors. Create a fresh one for every run.
pub struct AttenuationCache<'a> {
    provider: &'a dyn CloudCoverProvider,
    policy: CacheKeyPolicy,
    entries: HashMap<CacheKey, f64>,
    failures: Vec<NaiveDate>,
}

impl<'a> AttenuationCache<'a> {
    pub fn new(provider: &'a dyn CloudCoverProvider, policy: CacheKeyPolicy) -> Self {
        Self {
            provider,
            policy,
            entries: HashMap::new(),
            failures: Vec::new(),
        }
    }

    /// Attenuation factor in [0, 1] for `date`. The first position seen for a
    /// key is the one sent to the provider; failures degrade to 1.
    pub fn get_attenuation(&mut self, date: NaiveDate, lat: f64, lon: f64) -> f64 {
        let lon = normalize_longitude(lon);
        let key = CacheKey {
            date,
            cell: match self.policy {
                CacheKeyPolicy::Date => None,
                CacheKeyPolicy::DateAndGrid { cell_deg } => Some((
                    (lat / cell_deg).floor() as i64,
                    (lon / cell_deg).floor() as i64,
                )),
            },
        };

        if let Some(&factor) = self.entries.get(&key) {
            return factor;
        }

        let factor = match self.provider.cloud_fraction(lat, lon, date) {
            Ok(fraction) => 1.0 - fraction.clamp(0.0, 1.0),
            Err(e) => {
                warn!(%date, lat, lon, error = %e, "cloud cover unavailable, assuming clear sky");
                if !self.failures.contains(&date) {
                    self.failures.push(date);
                }
                1.0
            }
        };
        self.entries.insert(key, factor);
        factor
    }

    /// Dates whose lookup failed, in first-seen order.
    pub fn into_failures(self) -> Vec<NaiveDate> {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Scripted {
        calls: RefCell<Vec<(f64, f64, NaiveDate)>>,
        fail_on: Option<NaiveDate>,
    }

    impl Scripted {
        fn new(fail_on: Option<NaiveDate>) -> Self {
            Self { calls: RefCell::new(Vec::new()), fail_on }
        }
    }

    impl CloudCoverProvider for Scripted {
        fn cloud_fraction(&self, lat: f64, lon: f64, date: NaiveDate) -> Result<f64, ProviderError> {
            self.calls.borrow_mut().push((lat, lon, date));
            if Some(date) == self.fail_on {
                Err(ProviderError::Status { status: 500, body: String::new() })
            } else {
                Ok(0.25)
            }
        }
    }

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    #[test]
    fn test_one_query_per_date_first_position_wins() {
        let provider = Scripted::new(None);
        let mut cache = AttenuationCache::new(&provider, CacheKeyPolicy::Date);
        assert_eq!(cache.get_attenuation(d(3, 20), 1.0, 2.0), 0.75);
        assert_eq!(cache.get_attenuation(d(3, 20), 50.0, 60.0), 0.75);
        assert_eq!(cache.get_attenuation(d(3, 21), 3.0, 4.0), 0.75);
        assert_eq!(
            *provider.calls.borrow(),
            vec![(1.0, 2.0, d(3, 20)), (3.0, 4.0, d(3, 21))]
        );
    }

    #[test]
    fn test_failure_degrades_to_one_and_is_cached() {
        let provider = Scripted::new(Some(d(3, 21)));
        let mut cache = AttenuationCache::new(&provider, CacheKeyPolicy::Date);
        assert_eq!(cache.get_attenuation(d(3, 21), 0.0, 0.0), 1.0);
        assert_eq!(cache.get_attenuation(d(3, 21), 0.0, 0.1), 1.0);
        assert_eq!(provider.calls.borrow().len(), 1);
        assert_eq!(cache.into_failures(), vec![d(3, 21)]);
    }

    #[test]
    fn test_grid_policy_splits_distant_points() {
        let provider = Scripted::new(None);
        let mut cache = AttenuationCache::new(&provider, CacheKeyPolicy::DateAndGrid { cell_deg: 5.0 });
        cache.get_attenuation(d(6, 1), 1.0, 1.0);
        cache.get_attenuation(d(6, 1), 2.0, 3.0);
        cache.get_attenuation(d(6, 1), 1.0, 12.0);
        assert_eq!(provider.calls.borrow().len(), 2);
    }

    #[test]
    fn test_payload_percent_to_fraction() {
        let body = r#"{"type":"Feature","properties":{"parameter":{"CLOUD_AMT":{"20240320":42.5}}}}"#;
        let f = cloud_fraction_from_payload(body, d(3, 20)).unwrap();
        assert!((f - 0.425).abs() < 1e-12, "got {f}");
    }

    #[test]
    fn test_payload_fill_value() {
        let body = r#"{"properties":{"parameter":{"CLOUD_AMT":{"20240320":-999.0}}}}"#;
        assert!(matches!(cloud_fraction_from_payload(body, d(3, 20)), Err(ProviderError::NoData(_))));
    }

    #[test]
    fn test_payload_missing_parameter_or_date() {
        let body = r#"{"properties":{"parameter":{"T2M":{"20240320":20.0}}}}"#;
        assert!(matches!(
            cloud_fraction_from_payload(body, d(3, 20)),
            Err(ProviderError::MissingParameter { .. })
        ));
        let body = r#"{"properties":{"parameter":{"CLOUD_AMT":{"20240319":20.0}}}}"#;
        assert!(matches!(
            cloud_fraction_from_payload(body, d(3, 20)),
            Err(ProviderError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_payload_malformed() {
        assert!(matches!(cloud_fraction_from_payload("<html>", d(3, 20)), Err(ProviderError::Malformed(_))));
        assert!(matches!(
            cloud_fraction_from_payload(r#"{"messages":[]}"#, d(3, 20)),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn test_climatology_in_range() {
        for lat in [-80.0, -40.0, -10.0, 0.0, 20.0, 45.0, 60.0, 75.0] {
            for day in 1..=28 {
                let f = ClimatologyCloudCover.cloud_fraction(lat, 13.0, d(1, day)).unwrap();
                assert!((0.0..=0.85).contains(&f), "lat {lat} day {day}: {f}");
            }
        }
    }

    #[test]
    fn test_error_body_truncated() {
        let short = "service unavailable";
        assert_eq!(truncate_body(short, MAX_ERROR_BODY), short);

        let page = "<html>".repeat(1000);
        let cut = truncate_body(&page, MAX_ERROR_BODY);
        assert!(cut.len() < MAX_ERROR_BODY + 32, "kept {} bytes", cut.len());
        assert!(cut.ends_with("(6000 bytes total)"));

        // never splits a multi-byte char
        let accents = "é".repeat(200);
        let cut = truncate_body(&accents, 255);
        assert!(cut.starts_with(&"é".repeat(127)));
    }

    #[test]
    fn test_grid_key_wraps_longitude() {
        let provider = Scripted::new(None);
        let mut cache = AttenuationCache::new(&provider, CacheKeyPolicy::DateAndGrid { cell_deg: 1.0 });
        cache.get_attenuation(d(3, 20), 0.0, 180.5);
        cache.get_attenuation(d(3, 20), 0.0, -179.5);
        let calls = provider.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, -179.5);
    }
}
