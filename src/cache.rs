//! TTL-bounded memo of the last resolved driver version.
//!
//! One plain-text file per driver, `<install_dir>/<file_name without .exe>.version`,
//! whose modification time is the resolution time.

use crate::error::WebDriverError;
use crate::version::Version;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

static DISABLED_ADVISORY: Once = Once::new();

#[derive(Debug, Clone)]
pub struct VersionCache {
    dir: PathBuf,
    ttl: Option<Duration>,
}

impl VersionCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Option<Duration>) -> Self {
        VersionCache {
            dir: dir.into(),
            ttl: ttl.filter(|t| !t.is_zero()),
        }
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(format!("{}.version", stem(file_name)))
    }

    /// Record of the version actually installed, for drivers that cannot
    /// report their own version.
    pub fn installed_path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(format!("{}.installed", stem(file_name)))
    }

    /// The cached version, if one was written less than the TTL ago.
    pub fn read(&self, file_name: &str) -> Option<Version> {
        self.read_at(file_name, SystemTime::now())
    }

    pub fn read_at(&self, file_name: &str, now: SystemTime) -> Option<Version> {
        let Some(ttl) = self.ttl else {
            DISABLED_ADVISORY.call_once(|| {
                warn!(
                    "Driver version caching is disabled; \
                     set WD_CACHE_TIME (seconds) to avoid a network lookup on every run"
                );
            });
            return None;
        };

        let path = self.path_for(file_name);
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age >= ttl {
            debug!("Cached version at {} expired {:?} ago", path.display(), age - ttl);
            return None;
        }

        let version = Version::parse(&std::fs::read_to_string(&path).ok()?);
        if version.is_empty() {
            return None;
        }
        debug!("Using cached version {} from {}", version, path.display());
        Some(version)
    }

    /// The version recorded by [`VersionCache::record_installed`], regardless of age.
    pub fn installed(&self, file_name: &str) -> Option<Version> {
        let text = std::fs::read_to_string(self.installed_path_for(file_name)).ok()?;
        Some(Version::parse(&text)).filter(|v| !v.is_empty())
    }

    pub fn record_installed(&self, file_name: &str, version: &Version) -> Result<(), WebDriverError> {
        let path = self.installed_path_for(file_name);
        std::fs::write(&path, version.to_string()).map_err(|e| WebDriverError::io(&path, e))?;
        debug!("Recorded installed version {} in {}", version, path.display());
        Ok(())
    }

    pub fn write(&self, file_name: &str, version: &Version) -> Result<(), WebDriverError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| WebDriverError::io(&self.dir, e))?;
        let path = self.path_for(file_name);
        std::fs::write(&path, version.to_string()).map_err(|e| WebDriverError::io(&path, e))?;
        debug!("Cached version {} in {}", version, path.display());
        Ok(())
    }

    /// Removes both the resolved and the installed record.
    pub fn clear(&self, file_name: &str) -> Result<(), WebDriverError> {
        remove_if_present(&self.path_for(file_name))?;
        remove_if_present(&self.installed_path_for(file_name))
    }
}

fn stem(file_name: &str) -> &str {
    file_name.strip_suffix(".exe").unwrap_or(file_name)
}

fn remove_if_present(path: &Path) -> Result<(), WebDriverError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WebDriverError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_file_name_strips_exe() {
        let cache = VersionCache::new("/opt/drivers", Some(TTL));
        assert_eq!(cache.path_for("chromedriver.exe"), PathBuf::from("/opt/drivers/chromedriver.version"));
        assert_eq!(cache.path_for("geckodriver"), PathBuf::from("/opt/drivers/geckodriver.version"));
    }

    #[test]
    fn test_write_creates_install_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("drivers");
        let cache = VersionCache::new(&dir, Some(TTL));

        cache.write("geckodriver", &Version::parse("0.34.0")).unwrap();

        assert_eq!(std::fs::read_to_string(dir.join("geckodriver.version")).unwrap(), "0.34.0");
        assert_eq!(cache.read("geckodriver"), Some(Version::parse("0.34.0")));
    }

    #[test]
    fn test_ttl_boundary() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = VersionCache::new(tmp.path(), Some(TTL));
        cache.write("chromedriver", &Version::parse("115.0.5790.170")).unwrap();

        let written = std::fs::metadata(cache.path_for("chromedriver"))
            .unwrap()
            .modified()
            .unwrap();
        let epsilon = Duration::from_millis(1);

        assert!(cache.read_at("chromedriver", written + TTL - epsilon).is_some());
        assert!(cache.read_at("chromedriver", written + TTL + epsilon).is_none());
    }

    #[test]
    fn test_absent_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = VersionCache::new(tmp.path(), Some(TTL));
        assert!(cache.read("chromedriver").is_none());
        assert!(cache.installed("chromedriver").is_none());
        cache.clear("chromedriver").unwrap();
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = VersionCache::new(tmp.path(), Some(Duration::ZERO));

        cache.write("IEDriverServer.exe", &Version::parse("3.150.1")).unwrap();
        assert!(cache.read("IEDriverServer.exe").is_none());
    }

    #[test]
    fn test_installed_record_is_separate_from_resolved_version() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = VersionCache::new(tmp.path(), Some(TTL));

        cache.write("MicrosoftWebDriver.exe", &Version::parse("17134")).unwrap();
        assert_eq!(cache.installed("MicrosoftWebDriver.exe"), None);

        cache.record_installed("MicrosoftWebDriver.exe", &Version::parse("16299")).unwrap();
        assert_eq!(cache.installed("MicrosoftWebDriver.exe"), Some(Version::parse("16299")));
        assert_eq!(cache.read("MicrosoftWebDriver.exe"), Some(Version::parse("17134")));
        assert!(tmp.path().join("MicrosoftWebDriver.installed").is_file());

        cache.clear("MicrosoftWebDriver.exe").unwrap();
        assert_eq!(cache.installed("MicrosoftWebDriver.exe"), None);
    }

    #[test]
    fn test_clear_removes_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = VersionCache::new(tmp.path(), Some(TTL));
        cache.write("msedgedriver", &Version::parse("120.0.2210.91")).unwrap();
        cache.clear("msedgedriver").unwrap();
        assert!(!cache.path_for("msedgedriver").exists());
    }
}
