//! Configuration file management for mealprep.
//!
//! Provides a TOML-based config file at `~/.config/mealprep/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use mealprep_core::agent::GeminiConfig;
use mealprep_core::config::{
    ConfigError, DEFAULT_REDIRECTOR_MARKER, ValidatorConfig, parse_time_zone,
};
use mealprep_core::PlannerConfig;

/// Origins every server accepts, in addition to configured ones.
pub const DEFAULT_ORIGINS: [&str; 2] = ["http://localhost:4200", "http://localhost:8000"];

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub planner: PlannerSection,
    pub gemini: GeminiSection,
    pub server: ServerSection,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSection {
    /// IANA time zone, e.g. `America/New_York`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    pub ideas_per_meal: u32,
    pub max_repeats: u32,
    pub schedule_attempts: u32,
    pub repair_budget: u32,
    pub validation_concurrency: usize,
    pub validation_timeout_secs: u64,
    pub round_timeout_secs: u64,
    pub redirector_marker: String,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            time_zone: None,
            ideas_per_meal: 7,
            max_repeats: 3,
            schedule_attempts: 2,
            repair_budget: 2,
            validation_concurrency: 8,
            validation_timeout_secs: 5,
            round_timeout_secs: 60,
            redirector_marker: DEFAULT_REDIRECTOR_MARKER.to_string(),
        }
    }
}

impl PlannerSection {
    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            timeout: Duration::from_secs(self.validation_timeout_secs),
            redirector_marker: self.redirector_marker.to_lowercase(),
            ..ValidatorConfig::default()
        }
    }

    fn apply(&self, config: &mut PlannerConfig) {
        config.ideas_per_meal = self.ideas_per_meal;
        config.max_repeats = self.max_repeats;
        config.schedule_attempts = self.schedule_attempts;
        config.repair.budget = self.repair_budget;
        config.repair.concurrency = self.validation_concurrency;
        config.repair.round_timeout = Duration::from_secs(self.round_timeout_secs);
        config.validator = self.validator_config();
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,
    /// Origins allowed on top of [`DEFAULT_ORIGINS`].
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            allowed_origins: Vec::new(),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the mealprep config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/mealprep` or
/// `~/.config/mealprep`, also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("mealprep");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("mealprep")
}

/// Return the path to the mealprep config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse a config file. Returns an error if it does not exist.
pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Load the config file if there is one. A file that exists but does not
/// parse is an error, not a silent fallback to defaults.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    load_config_from(&path)
}

/// Serialize and write a config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix, since it may hold an API key.
pub fn save_config_to(config: &ConfigFile, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Env helpers
// -----------------------------------------------------------------------

/// First non-empty value among `keys`.
fn env_var(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Time zone: `cli` > `MEALPREP_TIME_ZONE` > `TIME_ZONE` > `planner.time_zone`.
pub fn resolve_time_zone_id(cli: Option<&str>, file: &ConfigFile) -> Option<String> {
    cli.map(str::to_string)
        .or_else(|| env_var(&["MEALPREP_TIME_ZONE", "TIME_ZONE"]))
        .or_else(|| file.planner.time_zone.clone())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Command-line values that take precedence over everything else.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub time_zone: Option<String>,
    pub bind: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Defaults first, then configured origins, without duplicates.
    pub allowed_origins: Vec<String>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct MealprepConfig {
    pub planner: PlannerConfig,
    /// `None` when no API key is configured anywhere.
    pub gemini: Option<GeminiConfig>,
    pub server: ServerConfig,
}

impl MealprepConfig {
    /// Resolve configuration from the config file on disk plus env and flags.
    pub fn resolve(overrides: &Overrides) -> Result<Self> {
        let file = load_config()?;
        Self::resolve_with(&file, overrides)
    }

    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Time zone: see [`resolve_time_zone_id`]; required.
    /// - API key: `GEMINI_API_KEY` > `GOOGLE_API_KEY` > `gemini.api_key`
    /// - Model: `MEALPREP_MODEL` > `gemini.model` > client default
    /// - Base URL: `MEALPREP_GEMINI_BASE_URL` > `gemini.base_url` > client default
    /// - Bind: `--bind` > `MEALPREP_BIND` > `server.bind` > `127.0.0.1`
    /// - Port: `--port` > `PORT` > `server.port` > `8000`
    /// - Extra origins: `MEALPREP_ALLOWED_ORIGINS` (comma separated) > `server.allowed_origins`
    pub fn resolve_with(file: &ConfigFile, overrides: &Overrides) -> Result<Self> {
        let tz_id = resolve_time_zone_id(overrides.time_zone.as_deref(), file);
        let tz = parse_time_zone(tz_id.as_deref())?;

        let mut planner = PlannerConfig::new(tz);
        file.planner.apply(&mut planner);
        planner.validate()?;

        let gemini = env_var(&["GEMINI_API_KEY", "GOOGLE_API_KEY"])
            .or_else(|| file.gemini.api_key.clone())
            .map(|key| {
                let mut config = GeminiConfig::new(key);
                if let Some(model) = env_var(&["MEALPREP_MODEL"]).or_else(|| file.gemini.model.clone())
                {
                    config = config.with_model(model);
                }
                if let Some(url) = env_var(&["MEALPREP_GEMINI_BASE_URL"])
                    .or_else(|| file.gemini.base_url.clone())
                {
                    config = config.with_base_url(url);
                }
                config
            });

        let bind = overrides
            .bind
            .clone()
            .or_else(|| env_var(&["MEALPREP_BIND"]))
            .unwrap_or_else(|| file.server.bind.clone());

        let port = match overrides.port {
            Some(port) => port,
            None => match env_var(&["PORT"]) {
                Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                    key: "PORT",
                    reason: format!("{raw:?} is not a port number"),
                })?,
                None => file.server.port,
            },
        };

        let configured = match env_var(&["MEALPREP_ALLOWED_ORIGINS"]) {
            Some(raw) => raw
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            None => file.server.allowed_origins.clone(),
        };
        let mut allowed_origins: Vec<String> =
            DEFAULT_ORIGINS.iter().map(|o| o.to_string()).collect();
        for origin in configured {
            let origin = origin.trim_end_matches('/').to_string();
            if !allowed_origins.contains(&origin) {
                allowed_origins.push(origin);
            }
        }

        Ok(Self {
            planner,
            gemini,
            server: ServerConfig {
                bind,
                port,
                allowed_origins,
            },
        })
    }

    /// The Gemini settings, or a configuration error naming the missing key.
    pub fn require_gemini(&self) -> Result<GeminiConfig, ConfigError> {
        self.gemini
            .clone()
            .ok_or(ConfigError::Missing("GEMINI_API_KEY (or gemini.api_key)"))
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
