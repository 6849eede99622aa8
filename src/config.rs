use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::app_dirs::AppDirs;
use crate::error::KrResult;
use crate::scoring::ScoringMode;
use crate::session::{
    ColumnLayout, SessionConfig, TimeBudget, AUTHENTIC_COLUMNS, AUTHENTIC_COLUMN_LENGTH,
    AUTHENTIC_SECONDS_PER_COLUMN, SECTION_INTERVAL_SECS, SIMPLIFIED_WINDOW,
};

/// Persisted user preferences. Missing fields fall back to the authentic test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub duration_minutes: f64,
    pub number_of_columns: usize,
    pub column_length: usize,
    pub seconds_per_column: u32,
    pub simplified: bool,
    pub window_capacity: usize,
    /// None picks the format's own rule.
    pub scoring: Option<ScoringMode>,
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            duration_minutes: (AUTHENTIC_COLUMNS as f64 * AUTHENTIC_SECONDS_PER_COLUMN as f64)
                / 60.0,
            number_of_columns: AUTHENTIC_COLUMNS,
            column_length: AUTHENTIC_COLUMN_LENGTH,
            seconds_per_column: AUTHENTIC_SECONDS_PER_COLUMN,
            simplified: false,
            window_capacity: SIMPLIFIED_WINDOW,
            scoring: None,
            seed: None,
        }
    }
}

impl Config {
    /// Sets the test length; in the authentic format this resizes the sheet to fill it.
    pub fn with_duration(mut self, minutes: f64) -> Self {
        self.duration_minutes = minutes;
        if !self.simplified {
            let seconds = (minutes.max(0.0) * 60.0).ceil() as usize;
            let per_column = self.seconds_per_column.max(1) as usize;
            self.number_of_columns = seconds.div_ceil(per_column).max(1);
        }
        self
    }

    pub fn session_config(&self) -> SessionConfig {
        if self.simplified {
            let mut config = SessionConfig::simplified(self.duration_minutes);
            config.layout = ColumnLayout::Sliding {
                capacity: self.window_capacity,
            };
            if let Some(scoring) = self.scoring {
                config.scoring = scoring;
            }
            config
        } else {
            SessionConfig {
                duration_minutes: (self.number_of_columns as f64
                    * self.seconds_per_column as f64)
                    / 60.0,
                column_length: self.column_length,
                column_limit: Some(self.number_of_columns),
                budget: TimeBudget::PerColumn {
                    seconds: self.seconds_per_column,
                },
                scoring: self.scoring.unwrap_or_default(),
                layout: ColumnLayout::Fixed,
                section_interval_secs: SECTION_INTERVAL_SECS,
            }
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> KrResult<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("kraepelin_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return Config::default(),
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "ignoring unreadable config");
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> KrResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}
