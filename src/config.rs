//! Configuration loading and persistence.
//!
//! A small JSON file under the platform config directory; every field has a
//! default so a missing or partial file still yields a working client. CLI
//! flags override loaded values in `main`.

use std::path::PathBuf;
use std::{env, fs};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::mux::Options;

/// Configuration for the muxlink CLI.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Multiplexer binary to spawn in control mode.
    pub tmux_bin: String,
    /// Server socket name (`-L`), if not the default.
    pub socket_name: Option<String>,
    /// Session to attach when none is given on the command line.
    pub default_target: Option<String>,
    /// Scrollback limit for mirrored panes.
    pub history_limit: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tmux_bin: "tmux".to_string(),
            socket_name: None,
            default_target: None,
            history_limit: crate::mux::options::DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl Config {
    /// Configuration directory, creating it if necessary.
    ///
    /// `MUXLINK_CONFIG_DIR` overrides the platform default for tests and
    /// scripted setups.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = match env::var("MUXLINK_CONFIG_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::config_dir()
                .context("could not determine platform config directory")?
                .join("muxlink"),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create config directory {}", dir.display()))?;
        Ok(dir)
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load the config file, or defaults when none exists.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("could not parse {}", path.display()))
    }

    /// Persist the config file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn save_to(&self, path: &PathBuf) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("could not serialize config")?;
        fs::write(path, text).with_context(|| format!("could not write {}", path.display()))?;
        Ok(())
    }

    /// Global server options derived from this config.
    pub fn options(&self) -> Options {
        let mut options = Options::global();
        options.set_number("history-limit", self.history_limit);
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.tmux_bin, "tmux");
        assert!(config.default_target.is_none());
        assert!(config.history_limit > 0);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.default_target = Some("main".to_string());
        config.history_limit = 9_000;
        config.save_to(&path).expect("save");

        let loaded = Config::load_from(&path).expect("load");
        assert_eq!(loaded.default_target.as_deref(), Some("main"));
        assert_eq!(loaded.history_limit, 9_000);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = Config::load_from(&dir.path().join("absent.json")).expect("load");
        assert_eq!(loaded.tmux_bin, "tmux");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"default_target":"work"}"#).expect("write");

        let loaded = Config::load_from(&path).expect("load");
        assert_eq!(loaded.default_target.as_deref(), Some("work"));
        assert_eq!(loaded.tmux_bin, "tmux");
    }

    #[test]
    fn options_carry_history_limit() {
        let mut config = Config::default();
        config.history_limit = 1_234;
        assert_eq!(config.options().history_limit(), 1_234);
    }
}
