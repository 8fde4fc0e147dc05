use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_version")]
    version: u32,

    #[serde(default = "default_skip_budget")]
    pub skip_budget: u32,

    #[serde(default = "default_batch_size")]
    pub prefetch_batch_size: usize,

    /// Refill once this many (or fewer) buffered rounds remain.
    #[serde(default = "default_refill_threshold")]
    pub refill_threshold: usize,

    #[serde(default = "default_reveal_delay")]
    pub reveal_delay_ms: u64,

    #[serde(default = "default_result_delay")]
    pub result_delay_ms: u64,

    /// `None` leaves finished infinite rounds on screen until the host
    /// advances them.
    #[serde(default = "default_auto_advance")]
    pub auto_advance_ms: Option<u64>,

    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

// Helper functions for default values
fn default_version() -> u32 {
    2
}
fn default_skip_budget() -> u32 {
    3
}
fn default_batch_size() -> usize {
    10
}
fn default_refill_threshold() -> usize {
    2
}
fn default_reveal_delay() -> u64 {
    450
}
fn default_result_delay() -> u64 {
    1500
}
fn default_auto_advance() -> Option<u64> {
    Some(2200)
}
fn default_tick_interval() -> u64 {
    1000
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            version: default_version(),
            skip_budget: default_skip_budget(),
            prefetch_batch_size: default_batch_size(),
            refill_threshold: default_refill_threshold(),
            reveal_delay_ms: default_reveal_delay(),
            result_delay_ms: default_result_delay(),
            auto_advance_ms: default_auto_advance(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

impl Settings {
    /// Reads settings from `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Settings>(&contents) {
                Ok(mut settings) => {
                    settings.migrate();
                    settings
                }
                Err(err) => {
                    warn!(target: "session", "Ignoring unreadable settings {:?}: {}", path, err);
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)
    }

    fn migrate(&mut self) {
        if self.version < 2 {
            // v1 counted the refill threshold from the end of the batch, not the cursor
            self.refill_threshold = default_refill_threshold();
            self.version = 2;
        }
        if self.prefetch_batch_size == 0 {
            self.prefetch_batch_size = default_batch_size();
        }
    }

    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_delay_ms)
    }

    pub fn result_delay(&self) -> Duration {
        Duration::from_millis(self.result_delay_ms)
    }

    pub fn auto_advance(&self) -> Option<Duration> {
        self.auto_advance_ms.map(Duration::from_millis)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn data_dir_from_env() -> PathBuf {
        std::env::var("PIXIDOL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".pixidol"))
    }

    pub fn settings_path_from_env() -> PathBuf {
        std::env::var("PIXIDOL_SETTINGS")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::data_dir_from_env().join("settings.json"))
    }
}
