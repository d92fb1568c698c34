//! Process-wide settings, read once at startup and passed by value.

use crate::error::WebDriverError;
use crate::platform::Platform;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(24 * 60 * 60);
const INSTALL_DIR_NAME: &str = ".webdrivers";

/// Upstream HTTP proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl ProxySettings {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub install_dir: PathBuf,
    /// How long a resolved version stays valid. `None` or zero disables the cache.
    pub cache_time: Option<Duration>,
    pub proxy: Option<ProxySettings>,
    /// Overall deadline per HTTP request.
    pub timeout: Option<Duration>,
    /// Browser executable to probe instead of searching standard locations.
    pub browser_path: Option<PathBuf>,
    pub platform: Platform,
}

impl Settings {
    pub fn new(install_dir: impl Into<PathBuf>, platform: Platform) -> Self {
        Settings {
            install_dir: install_dir.into(),
            cache_time: Some(DEFAULT_CACHE_TIME),
            proxy: None,
            timeout: None,
            browser_path: None,
            platform,
        }
    }

    /// Builds settings for the host from the `WD_*` environment variables.
    pub fn from_env() -> Result<Self, WebDriverError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WebDriverError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let install_dir = match var("WD_INSTALL_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_install_dir()?,
        };
        let mut settings = Settings::new(install_dir, Platform::detect()?);

        if let Some(secs) = var("WD_CACHE_TIME") {
            settings.cache_time = Some(parse_seconds("WD_CACHE_TIME", &secs)?);
        }
        if let Some(secs) = var("WD_TIMEOUT") {
            settings.timeout = Some(parse_seconds("WD_TIMEOUT", &secs)?);
        }
        settings.browser_path = var("WD_BROWSER_PATH").map(PathBuf::from);

        settings.proxy = match (var("WD_PROXY_ADDR"), var("WD_PROXY_PORT")) {
            (Some(host), Some(port)) => Some(ProxySettings {
                host,
                port: port.trim().parse().map_err(|_| {
                    WebDriverError::Config(format!("WD_PROXY_PORT is not a port number: '{port}'"))
                })?,
                user: var("WD_PROXY_USER"),
                password: var("WD_PROXY_PASS"),
            }),
            (Some(_), None) | (None, Some(_)) => {
                return Err(WebDriverError::Config(
                    "WD_PROXY_ADDR and WD_PROXY_PORT must be set together".to_string(),
                ));
            }
            (None, None) => None,
        };

        Ok(settings)
    }
}

/// `~/.webdrivers`
pub fn default_install_dir() -> Result<PathBuf, WebDriverError> {
    dirs::home_dir()
        .map(|home| home.join(INSTALL_DIR_NAME))
        .ok_or_else(|| {
            WebDriverError::Config("cannot determine the home directory; set WD_INSTALL_DIR".to_string())
        })
}

pub(crate) fn parse_seconds(name: &str, value: &str) -> Result<Duration, WebDriverError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| WebDriverError::Config(format!("{name} must be a number of seconds, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> Result<Settings, WebDriverError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = from_map(&[("WD_INSTALL_DIR", "/tmp/drivers")]).unwrap();
        assert_eq!(settings.install_dir, PathBuf::from("/tmp/drivers"));
        assert_eq!(settings.cache_time, Some(DEFAULT_CACHE_TIME));
        assert!(settings.proxy.is_none());
        assert!(settings.timeout.is_none());
    }

    #[test]
    fn test_default_install_dir_is_under_home() {
        if let Ok(dir) = default_install_dir() {
            assert!(dir.ends_with(".webdrivers"));
        }
    }

    #[test]
    fn test_cache_time_from_env() {
        let settings = from_map(&[("WD_INSTALL_DIR", "d"), ("WD_CACHE_TIME", "999")]).unwrap();
        assert_eq!(settings.cache_time, Some(Duration::from_secs(999)));

        let disabled = from_map(&[("WD_INSTALL_DIR", "d"), ("WD_CACHE_TIME", "0")]).unwrap();
        assert_eq!(disabled.cache_time, Some(Duration::ZERO));

        assert!(matches!(
            from_map(&[("WD_INSTALL_DIR", "d"), ("WD_CACHE_TIME", "soon")]),
            Err(WebDriverError::Config(_))
        ));
    }

    #[test]
    fn test_proxy_from_env() {
        let settings = from_map(&[
            ("WD_INSTALL_DIR", "d"),
            ("WD_PROXY_ADDR", "proxy.local"),
            ("WD_PROXY_PORT", "3128"),
            ("WD_PROXY_USER", "alice"),
        ])
        .unwrap();
        let proxy = settings.proxy.unwrap();
        assert_eq!(proxy.url(), "http://proxy.local:3128");
        assert_eq!(proxy.user.as_deref(), Some("alice"));
        assert!(proxy.password.is_none());
    }

    #[test]
    fn test_incomplete_proxy_is_rejected() {
        assert!(from_map(&[("WD_INSTALL_DIR", "d"), ("WD_PROXY_ADDR", "proxy.local")]).is_err());
        assert!(from_map(&[
            ("WD_INSTALL_DIR", "d"),
            ("WD_PROXY_ADDR", "proxy.local"),
            ("WD_PROXY_PORT", "http"),
        ])
        .is_err());
    }
}
