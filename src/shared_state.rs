use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Config;

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Offline mode flag — toggled at runtime via API. When set, cloud cover
    /// comes from the climatology model instead of NASA POWER.
    pub offline_mode: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let offline_mode_default = config.offline_mode;
        Self {
            config: Arc::new(config),
            offline_mode: Arc::new(AtomicBool::new(offline_mode_default)),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.offline_mode.load(Ordering::Relaxed)
    }

    pub fn set_offline(&self, value: bool) {
        self.offline_mode.store(value, Ordering::Relaxed);
    }
}
