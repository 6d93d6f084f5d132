use std::path::Path;

use serde::Deserialize;

use crate::services::cloud_cover::CacheKeyPolicy;

fn default_offline_mode() -> bool { false }
fn default_static_dir() -> String { "static".to_string() }
fn default_port() -> u16 { 3000 }
fn default_base_url() -> String { "https://power.larc.nasa.gov/api/temporal/daily/point".to_string() }
fn default_community() -> String { "RE".to_string() }
fn default_provider_timeout_s() -> u64 { 30 }
fn default_surface_area() -> f64 { 10.0 }
fn default_yield() -> f64 { 0.2 }
fn default_speed() -> f64 { 20.0 }
fn default_run_timeout_s() -> u64 { 120 }

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_offline_mode")]
    pub offline_mode: bool,
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    #[serde(default)]
    pub cloud_provider: CloudProviderConfig,
    #[serde(default)]
    pub simulation: SimulationDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            offline_mode: default_offline_mode(),
            static_dir: default_static_dir(),
            cloud_provider: CloudProviderConfig::default(),
            simulation: SimulationDefaults::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

/// NASA POWER daily point endpoint settings.
#[derive(Debug, Deserialize, Clone)]
pub struct CloudProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_community")]
    pub community: String,
    #[serde(default = "default_provider_timeout_s")]
    pub timeout_s: u64,
}

impl Default for CloudProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            community: default_community(),
            timeout_s: default_provider_timeout_s(),
        }
    }
}

/// Form defaults and run limits.
#[derive(Debug, Deserialize, Clone)]
pub struct SimulationDefaults {
    #[serde(default = "default_surface_area")]
    pub surface_area_m2: f64,
    #[serde(default = "default_yield")]
    pub yield_kw_per_m2: f64,
    #[serde(default = "default_speed")]
    pub vessel_speed_kmh: f64,
    /// Whole-run deadline for one HTTP simulation
    #[serde(default = "default_run_timeout_s")]
    pub run_timeout_s: u64,
    /// Key the cloud cache by date and grid cell of this size (degrees)
    /// instead of date alone
    #[serde(default)]
    pub cache_grid_deg: Option<f64>,
}

impl Default for SimulationDefaults {
    fn default() -> Self {
        Self {
            surface_area_m2: default_surface_area(),
            yield_kw_per_m2: default_yield(),
            vessel_speed_kmh: default_speed(),
            run_timeout_s: default_run_timeout_s(),
            cache_grid_deg: None,
        }
    }
}

impl SimulationDefaults {
    pub fn cache_policy(&self) -> CacheKeyPolicy {
        match self.cache_grid_deg {
            Some(cell_deg) if cell_deg.is_finite() && cell_deg > 0.0 => CacheKeyPolicy::DateAndGrid { cell_deg },
            _ => CacheKeyPolicy::Date,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the built-in defaults.
    pub fn load_or_default(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            tracing::warn!(path, "config file not found, using defaults");
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_gives_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.server.port, 3000);
        assert!(!cfg.offline_mode);
        assert_eq!(cfg.cloud_provider.community, "RE");
        assert_eq!(cfg.simulation.surface_area_m2, 10.0);
        assert_eq!(cfg.simulation.cache_policy(), CacheKeyPolicy::Date);
    }

    #[test]
    fn test_partial_sections() {
        let cfg: Config = serde_json::from_str(
            r#"{"server":{"port":8080},"offline_mode":true,"simulation":{"vessel_speed_kmh":12.5,"cache_grid_deg":2.0}}"#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.offline_mode);
        assert_eq!(cfg.simulation.vessel_speed_kmh, 12.5);
        assert_eq!(cfg.simulation.yield_kw_per_m2, 0.2);
        assert_eq!(cfg.simulation.cache_policy(), CacheKeyPolicy::DateAndGrid { cell_deg: 2.0 });
    }

    #[test]
    fn test_missing_file_falls_back() {
        let cfg = Config::load_or_default("/nonexistent/journey-config.json").unwrap();
        assert_eq!(cfg.static_dir, "static");
    }
}
