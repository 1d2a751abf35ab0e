use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;

/// Sizing of the per-channel scratch buffer pools.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterConfig {
    pub pool_max_retained: usize,
    pub pool_initial_capacity: usize,
    pub pool_max_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            pool_max_retained: 8,
            pool_initial_capacity: 16,
            pool_max_capacity: 1024,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub router: RouterConfig,
    pub logs_path: PathBuf,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            logs_path: PathBuf::from("logs"),
            log_filter: "weakbus=info,dispatch_demo=info".to_string(),
        }
    }
}

impl Config {
    /// Reads the configuration from `WEAKBUS_*` environment variables,
    /// falling back to defaults for unset keys.
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();
        Ok(Self {
            router: RouterConfig {
                pool_max_retained: parse_var(
                    "WEAKBUS_POOL_MAX_RETAINED",
                    defaults.router.pool_max_retained,
                )?,
                pool_initial_capacity: parse_var(
                    "WEAKBUS_POOL_INITIAL_CAPACITY",
                    defaults.router.pool_initial_capacity,
                )?,
                pool_max_capacity: parse_var(
                    "WEAKBUS_POOL_MAX_CAPACITY",
                    defaults.router.pool_max_capacity,
                )?,
            },
            logs_path: std::env::var("WEAKBUS_LOGS_PATH")
                .map_or(defaults.logs_path, PathBuf::from),
            log_filter: std::env::var("WEAKBUS_LOG_FILTER").unwrap_or(defaults.log_filter),
        })
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::InvalidConfig {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(default),
    }
}
