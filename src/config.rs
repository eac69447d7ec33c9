//! Runtime configuration resolved from `PROPERTYPAL_*` environment variables.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;

use crate::time::SystemClock;

pub const ENV_DATA_DIR: &str = "PROPERTYPAL_DATA_DIR";
pub const ENV_DB: &str = "PROPERTYPAL_DB";
pub const ENV_SESSION_FILE: &str = "PROPERTYPAL_SESSION_FILE";
pub const ENV_TZ: &str = "PROPERTYPAL_TZ";
pub const ENV_LOG: &str = "PROPERTYPAL_LOG";
pub const ENV_LOG_DIR: &str = "PROPERTYPAL_LOG_DIR";

pub const DEFAULT_LOG_FILTER: &str = "propertypal=info,sqlx=warn";
const APP_DIR: &str = "propertypal";
const DB_FILE: &str = "propertypal.sqlite3";
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub session_file: PathBuf,
    pub tz: Tz,
    pub log_filter: String,
    /// Daily log files are written here when set.
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves configuration through `lookup`, treating empty values as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let data_dir = match get(ENV_DATA_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .ok_or_else(|| anyhow!("could not determine a data directory; set {ENV_DATA_DIR}"))?
                .join(APP_DIR),
        };
        let db_path = get(ENV_DB)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(DB_FILE));
        let session_file = get(ENV_SESSION_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(SESSION_FILE));
        let tz = match get(ENV_TZ) {
            Some(name) => name
                .trim()
                .parse::<Tz>()
                .map_err(|err| anyhow!(err))
                .with_context(|| format!("invalid {ENV_TZ} value `{name}`"))?,
            None => SystemClock::local().zone(),
        };

        Ok(Self {
            data_dir,
            db_path,
            session_file,
            tz,
            log_filter: get(ENV_LOG).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            log_dir: get(ENV_LOG_DIR).map(PathBuf::from),
        })
    }

    pub fn clock(&self) -> SystemClock {
        SystemClock::new(self.tz)
    }
}
