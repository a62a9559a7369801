use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Upper bound for `RETRY_COUNT`.
pub const MAX_RETRIES: u32 = 10;
/// Upper bound for the `*_TIMEOUT_SECS` variables.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    /// Extra attempts after the first one.
    pub retries: u32,
    pub retry_delay: Duration,
    pub attempt_timeout: Duration,
    pub http_timeout: Duration,
    pub user_agent: String,
    pub browser_fallback: bool,
    pub chrome_path: Option<PathBuf>,
    pub browser_max_pages: usize,
    pub browser_wait: Duration,
    pub registry_dir: PathBuf,
    pub admin_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            retries: 2,
            retry_delay: Duration::from_millis(2000),
            attempt_timeout: Duration::from_secs(45),
            http_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            browser_fallback: true,
            chrome_path: None,
            browser_max_pages: 2,
            browser_wait: Duration::from_millis(1500),
            registry_dir: PathBuf::from("endpoints"),
            admin_token: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source; unset or empty
    /// variables fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let host = get("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let ip = IpAddr::from_str(&host)
            .map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;
        let port = match get("PORT") {
            Some(port) => parse_var::<u16>("PORT", &port)?,
            None => defaults.server_addr.port(),
        };

        let retries = match get("RETRY_COUNT") {
            Some(v) => parse_var("RETRY_COUNT", &v)?,
            None => defaults.retries,
        };
        if retries > MAX_RETRIES {
            return Err(AppError::ConfigError(format!(
                "RETRY_COUNT must be at most {}",
                MAX_RETRIES
            )));
        }
        let retry_delay = match get("RETRY_DELAY_MS") {
            Some(v) => Duration::from_millis(parse_var("RETRY_DELAY_MS", &v)?),
            None => defaults.retry_delay,
        };
        let attempt_timeout = match get("ATTEMPT_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_timeout("ATTEMPT_TIMEOUT_SECS", &v)?),
            None => defaults.attempt_timeout,
        };
        let http_timeout = match get("HTTP_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_timeout("HTTP_TIMEOUT_SECS", &v)?),
            None => defaults.http_timeout,
        };
        let browser_fallback = match get("BROWSER_FALLBACK") {
            Some(v) => parse_bool("BROWSER_FALLBACK", &v)?,
            None => defaults.browser_fallback,
        };
        let browser_max_pages = match get("BROWSER_MAX_PAGES") {
            Some(v) => parse_var::<usize>("BROWSER_MAX_PAGES", &v)?,
            None => defaults.browser_max_pages,
        };
        if browser_max_pages == 0 {
            return Err(AppError::ConfigError(
                "BROWSER_MAX_PAGES must be at least 1".to_string(),
            ));
        }
        let browser_wait = match get("BROWSER_WAIT_MS") {
            Some(v) => Duration::from_millis(parse_var("BROWSER_WAIT_MS", &v)?),
            None => defaults.browser_wait,
        };

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            retries,
            retry_delay,
            attempt_timeout,
            http_timeout,
            user_agent: get("USER_AGENT").unwrap_or(defaults.user_agent),
            browser_fallback,
            chrome_path: get("CHROME_PATH").map(PathBuf::from),
            browser_max_pages,
            browser_wait,
            registry_dir: get("REGISTRY_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.registry_dir),
            admin_token: get("ADMIN_TOKEN"),
        })
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| AppError::ConfigError(format!("Invalid {}: {}", key, e)))
}

fn parse_timeout(key: &str, value: &str) -> Result<u64> {
    match parse_var::<u64>(key, value)? {
        0 => Err(AppError::ConfigError(format!("{} must be at least 1", key))),
        secs if secs > MAX_TIMEOUT_SECS => Err(AppError::ConfigError(format!(
            "{} must be at most {}",
            key, MAX_TIMEOUT_SECS
        ))),
        secs => Ok(secs),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::ConfigError(format!("Invalid {}: {}", key, other))),
    }
}
