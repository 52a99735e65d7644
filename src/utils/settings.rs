use std::{fs, io::ErrorKind, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::tracking::TrackingConfig;

pub const SETTINGS_FILE: &str = "settings.json";

/// User settings stored as `settings.json` in the application directory.
/// Missing fields fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub currency: String,
    pub hourly_rate: Option<f64>,
    pub tick_interval_ms: u64,
    pub flush_every_ticks: u32,
}

impl Default for Settings {
    fn default() -> Self {
        let tracking = TrackingConfig::default();
        Self {
            currency: "$".into(),
            hourly_rate: None,
            tick_interval_ms: tracking.tick_interval.as_millis() as u64,
            flush_every_ticks: tracking.flush_every_ticks,
        }
    }
}

impl Settings {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SETTINGS_FILE);
        match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Malformed settings in {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read settings from {}", path.display()))
            }
        }
    }

    pub fn tracking_config(&self) -> TrackingConfig {
        TrackingConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            flush_every_ticks: self.flush_every_ticks.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use tempfile::tempdir;

    use super::{Settings, SETTINGS_FILE};

    #[test]
    fn test_missing_settings_use_defaults() -> Result<()> {
        let dir = tempdir()?;
        let settings = Settings::load(dir.path())?;
        assert_eq!(settings, Settings::default());
        let config = settings.tracking_config();
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.flush_every_ticks, 5);
        Ok(())
    }

    #[test]
    fn test_partial_settings() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{ "hourly_rate": 42.5, "flush_every_ticks": 0 }"#,
        )?;
        let settings = Settings::load(dir.path())?;
        assert_eq!(settings.hourly_rate, Some(42.5));
        assert_eq!(settings.currency, "$");
        assert_eq!(settings.tracking_config().flush_every_ticks, 1);
        Ok(())
    }

    #[test]
    fn test_malformed_settings_fail() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join(SETTINGS_FILE), "{ nope")?;
        assert!(Settings::load(dir.path()).is_err());
        Ok(())
    }
}
