use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::catalog::{LanguageFilter, Mode};
use crate::clock::TimeBudget;

/// Persisted user preferences. Codes are stored raw and normalized when a session starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub timer: String,
    pub language: String,
    pub mode: String,
    pub user: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timer: "60".to_string(),
            language: "mixed".to_string(),
            mode: "normal".to_string(),
            user: "guest".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn budget(&self) -> TimeBudget {
        TimeBudget::normalize(&self.timer)
    }

    pub fn language_filter(&self) -> LanguageFilter {
        LanguageFilter::normalize(&self.language)
    }

    pub fn mode(&self) -> Mode {
        Mode::normalize(&self.mode)
    }

    /// Rewrites every code in its canonical form, replacing unknown ones with defaults.
    pub fn normalized(&self) -> Self {
        Self {
            timer: self.budget().code(),
            language: self.language_filter().code().to_string(),
            mode: self.mode().as_str().to_string(),
            user: if self.user.trim().is_empty() {
                Config::default().user
            } else {
                self.user.trim().to_string()
            },
            log_level: self.log_level.clone(),
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("typepro_config.json"));
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
        if let Ok(bytes) = fs::read(&self.path) {
            if let Ok(cfg) = serde_json::from_slice::<Config>(&bytes) {
                return cfg;
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).map_err(std::io::Error::other)?;
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Language;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("config.json"));
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        assert_eq!(cfg, store.load());
    }

    #[test]
    fn missing_or_corrupt_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        assert_eq!(store.load(), Config::default());

        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{"mode":"expert","user":"ada"}"#).unwrap();
        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.mode(), Mode::Expert);
        assert_eq!(cfg.user, "ada");
        assert_eq!(cfg.timer, "60");
    }

    #[test]
    fn unknown_codes_normalize_to_defaults() {
        let cfg = Config {
            timer: "45".into(),
            language: "rust".into(),
            mode: "godlike".into(),
            user: "  ".into(),
            log_level: "debug".into(),
        };
        assert_eq!(cfg.budget(), TimeBudget::Bounded(Duration::from_secs(60)));
        assert_eq!(cfg.language_filter(), LanguageFilter::Mixed);
        assert_eq!(cfg.mode(), Mode::Normal);

        let normalized = cfg.normalized();
        assert_eq!(normalized.timer, "60");
        assert_eq!(normalized.language, "mixed");
        assert_eq!(normalized.mode, "normal");
        assert_eq!(normalized.user, "guest");
        assert_eq!(normalized.log_level, "debug");
    }

    #[test]
    fn known_codes_survive_normalization() {
        let cfg = Config {
            timer: "full".into(),
            language: "python".into(),
            mode: "pro".into(),
            ..Config::default()
        };
        assert_eq!(cfg.budget(), TimeBudget::Unbounded);
        assert_eq!(cfg.language_filter(), LanguageFilter::Only(Language::Python));
        assert_eq!(cfg.normalized(), cfg);
    }
}
