//! Server configuration.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Directory holding `users.json` and `recipes.json`.
    pub data_dir: PathBuf,
    /// Directory uploaded images are written below.
    pub media_root: PathBuf,
    /// URL prefix the media root is served under.
    pub media_url: String,
    pub log_level: String,
    pub bcrypt_cost: u32,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            data_dir: PathBuf::from("data"),
            media_root: PathBuf::from("media"),
            media_url: "/media".to_string(),
            log_level: "info".to_string(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// [`Config::default`] for anything unset.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            host: env::var("RECIPE_HOST").unwrap_or(defaults.host),
            port: parsed("RECIPE_PORT", defaults.port)?,
            data_dir: env::var("RECIPE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            media_root: env::var("RECIPE_MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_root),
            media_url: env::var("RECIPE_MEDIA_URL").unwrap_or(defaults.media_url),
            log_level: env::var("RECIPE_LOG_LEVEL").unwrap_or(defaults.log_level),
            bcrypt_cost: parsed("RECIPE_BCRYPT_COST", defaults.bcrypt_cost)?,
            max_upload_bytes: parsed("RECIPE_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }

    pub fn recipes_path(&self) -> PathBuf {
        self.data_dir.join("recipes.json")
    }
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Invalid {key} value {raw:?}")),
        Err(_) => Ok(default),
    }
}
