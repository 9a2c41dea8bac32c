//! Configuration file management for lifeplan.
//!
//! Provides a TOML-based config file at `~/.config/lifeplan/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use lifeplan_core::ServicesConfig;
use lifeplan_core::model::ChainBudget;
use lifeplan_db::config::DbConfig;

pub const ENV_MODEL_API_KEY: &str = "GROQ_API_KEY";
pub const ENV_MODEL_BASE_URL: &str = "LIFEPLAN_MODEL_BASE_URL";
pub const ENV_PRIMARY_MODEL: &str = "LIFEPLAN_PRIMARY_MODEL";
pub const ENV_FALLBACK_MODEL: &str = "LIFEPLAN_FALLBACK_MODEL";
pub const ENV_NUTRITION_API_KEY: &str = "NUTRITION_API_KEY";
pub const ENV_TIMEZONE: &str = "LIFEPLAN_TIMEZONE";
pub const ENV_ENRICHMENT_URL: &str = "LIFEPLAN_ENRICHMENT_URL";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub nutrition: NutritionSection,
    #[serde(default)]
    pub agent: AgentSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    /// Empty string disables the fallback tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hop_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NutritionSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AgentSection {
    /// IANA zone name, e.g. `Asia/Kolkata`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_url: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the lifeplan config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/lifeplan` or `~/.config/lifeplan`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("lifeplan");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("lifeplan")
}

/// Return the path to the lifeplan config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    // The file may hold API keys.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct LifeplanConfig {
    pub db_config: DbConfig,
    pub services: ServicesConfig,
}

impl LifeplanConfig {
    /// Resolve configuration from the process environment and the config
    /// file, with `cli_db_url` taking precedence for the database.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        Self::resolve_from(cli_db_url, load_config().ok(), |key| {
            std::env::var(key).ok()
        })
    }

    /// Resolve against an explicit config file and environment lookup.
    ///
    /// Every setting follows env var > config file > default; the model API
    /// key has no default and is checked when the services are built.
    pub fn resolve_from(
        cli_db_url: Option<&str>,
        file: Option<ConfigFile>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let file = file.unwrap_or_default();
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let defaults = ServicesConfig::default();

        let db_url = cli_db_url
            .map(str::to_owned)
            .or_else(|| env(DbConfig::ENV_VAR))
            .or_else(|| Some(file.database.url.clone()).filter(|u| !u.is_empty()))
            .unwrap_or_else(|| DbConfig::DEFAULT_URL.to_owned());

        let timezone = match env(ENV_TIMEZONE).or(file.agent.timezone) {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|e| anyhow::anyhow!("invalid timezone {name:?}: {e}"))?,
            None => defaults.timezone,
        };

        let fallback_model = match env(ENV_FALLBACK_MODEL).or(file.model.fallback) {
            Some(name) if name.trim().is_empty() => None,
            Some(name) => Some(name),
            None => defaults.fallback_model,
        };

        let default_budget = ChainBudget::default();
        let budget = ChainBudget {
            deadline: file
                .model
                .deadline_secs
                .map_or(default_budget.deadline, Duration::from_secs),
            hop_timeout: file
                .model
                .hop_timeout_secs
                .map_or(default_budget.hop_timeout, Duration::from_secs),
        };

        let services = ServicesConfig {
            timezone,
            model_base_url: env(ENV_MODEL_BASE_URL)
                .or(file.model.base_url)
                .unwrap_or(defaults.model_base_url),
            model_api_key: env(ENV_MODEL_API_KEY).or(file.model.api_key),
            primary_model: env(ENV_PRIMARY_MODEL)
                .or(file.model.primary)
                .unwrap_or(defaults.primary_model),
            fallback_model,
            budget,
            nutrition_base_url: file
                .nutrition
                .base_url
                .unwrap_or(defaults.nutrition_base_url),
            nutrition_api_key: env(ENV_NUTRITION_API_KEY).or(file.nutrition.api_key),
            enrichment_url: env(ENV_ENRICHMENT_URL).or(file.agent.enrichment_url),
            enrichment_timeout: defaults.enrichment_timeout,
        };

        Ok(Self {
            db_config: DbConfig::new(db_url),
            services,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
