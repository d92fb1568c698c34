//! Acquisition engine: decides whether the installed driver can stay, and
//! replaces it when it cannot.

use crate::cache::VersionCache;
use crate::config::Settings;
use crate::downloader;
use crate::drivers::{Family, ReleaseIndex};
use crate::error::WebDriverError;
use crate::network::Network;
use crate::version::Version;
use crate::WebDriverManager;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How a [`Updater::sync`] call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The installed binary already satisfies the resolved version.
    UpToDate { path: PathBuf, version: Version },
    /// The feed was unreachable and the installed binary was kept.
    Offline { path: PathBuf },
    /// A new binary was downloaded and installed.
    Installed { path: PathBuf, version: Version },
}

impl Outcome {
    pub fn path(&self) -> &Path {
        match self {
            Outcome::UpToDate { path, .. } | Outcome::Offline { path } | Outcome::Installed { path, .. } => path,
        }
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            Outcome::UpToDate { path, .. } | Outcome::Offline { path } | Outcome::Installed { path, .. } => path,
        }
    }
}

/// Keeps one driver family's binary at `<install_dir>/<file_name>` current.
pub struct Updater {
    driver: Box<dyn WebDriverManager>,
    settings: Settings,
    cache: VersionCache,
    network: Network,
    required_version: Version,
}

impl Updater {
    pub fn new(driver: Box<dyn WebDriverManager>, settings: Settings, network: Network) -> Self {
        let cache = VersionCache::new(&settings.install_dir, settings.cache_time);
        Updater {
            driver,
            settings,
            cache,
            network,
            required_version: Version::EMPTY,
        }
    }

    /// Builds the updater for a built-in family.
    pub fn for_family(family: Family, settings: Settings) -> Result<Self, WebDriverError> {
        let network = Network::new(&settings)?;
        let driver = family.manager(&settings, &network);
        Ok(Self::new(driver, settings, network))
    }

    /// Pins the driver version, bypassing latest-release resolution.
    pub fn with_required_version(mut self, version: Version) -> Self {
        self.required_version = version;
        self
    }

    pub fn driver(&self) -> &dyn WebDriverManager {
        self.driver.as_ref()
    }

    pub fn binary_path(&self) -> PathBuf {
        self.settings.install_dir.join(self.driver.file_name())
    }

    /// Version of the installed binary, `None` when it is absent or does not answer.
    pub async fn current_version(&self) -> Option<Version> {
        let binary = self.binary_path();
        if !binary.is_file() {
            debug!("No {} installed at {}", self.driver.driver_name(), binary.display());
            return None;
        }
        self.driver.current_version(&binary).await
    }

    /// The version that should be installed.
    ///
    /// A pinned version goes straight to the family, which may still need a
    /// per-version lookup. Otherwise a fresh cache entry answers without
    /// touching the network, and a network resolution refreshes the entry.
    pub async fn latest_version(&self) -> Result<Version, WebDriverError> {
        if !self.required_version.is_empty() {
            debug!("Using pinned {} version {}", self.driver.driver_name(), self.required_version);
            return self.driver.required_version(&self.required_version).await;
        }

        let file_name = self.driver.file_name();
        if let Some(cached) = self.cache.read(&file_name) {
            return Ok(cached);
        }

        let version = self.driver.required_version(&Version::EMPTY).await?;
        self.cache.write(&file_name, &version)?;
        Ok(version)
    }

    pub async fn releases(&self) -> Result<ReleaseIndex, WebDriverError> {
        self.driver.list_releases().await
    }

    /// Brings the installed binary in line with the required version.
    pub async fn sync(&self) -> Result<Outcome, WebDriverError> {
        let binary = self.binary_path();
        let current = self.current_version().await;
        let installed = binary.is_file();

        let target = match self.latest_version().await {
            Ok(target) => target,
            Err(e) if e.is_network_unreachable() => return self.offline(binary, installed, current, e).await,
            Err(e) => return Err(e),
        };
        debug!(
            "{}: installed {}, required {}",
            self.driver.driver_name(),
            current.as_ref().map_or_else(|| "none".to_string(), ToString::to_string),
            target
        );

        if let Some(current) = current.filter(|current| installed && current.matches(&target)) {
            debug!("{} {} is up to date", self.driver.driver_name(), current);
            return Ok(Outcome::UpToDate { path: binary, version: current });
        }

        let path = self
            .install(&target, &binary)
            .await
            .map_err(|e| self.unknown_pin(&target, e))?;
        self.driver.installed(&path, &target).await?;

        match self.driver.current_version(&path).await {
            Some(reported) if reported.matches(&target) => {}
            Some(reported) => warn!(
                "Installed {} reports version {} but {} was requested",
                self.driver.driver_name(),
                reported,
                target
            ),
            None => warn!("Installed {} did not report its version", path.display()),
        }
        Ok(Outcome::Installed { path, version: target })
    }

    /// Path of an installed, correct binary, downloading it when needed.
    pub async fn update(&self) -> Result<PathBuf, WebDriverError> {
        Ok(self.sync().await?.into_path())
    }

    async fn install(&self, target: &Version, binary: &Path) -> Result<PathBuf, WebDriverError> {
        let url = self.driver.download_url(target).await?;
        debug!("Installing {} {} from {}", self.driver.driver_name(), target, url);
        downloader::download_and_install(&self.network, &url, binary).await
    }

    /// A pinned version with no artifact is a resolution failure, not a
    /// download failure.
    fn unknown_pin(&self, target: &Version, err: WebDriverError) -> WebDriverError {
        if self.required_version.is_empty() {
            return err;
        }
        match err {
            WebDriverError::DriverUrlNotFound { .. } | WebDriverError::HttpStatus { status: 404, .. } => {
                WebDriverError::VersionResolution(format!(
                    "Unable to find {} version {target} ({err}). Please pin a known {} version \
                     with `--required-version <version>`: {}",
                    self.driver.driver_name(),
                    self.driver.driver_name(),
                    self.driver.feed_url()
                ))
            }
            other => other,
        }
    }

    /// Deletes the installed binary and its cache entry.
    pub async fn remove(&self) -> Result<(), WebDriverError> {
        let binary = self.binary_path();
        downloader::delete_with_retry(&binary).await?;
        self.cache.clear(&self.driver.file_name())?;
        debug!("Removed {}", binary.display());
        Ok(())
    }

    async fn offline(
        &self,
        binary: PathBuf,
        installed: bool,
        current: Option<Version>,
        cause: WebDriverError,
    ) -> Result<Outcome, WebDriverError> {
        if installed && self.driver.is_sufficient(current.as_ref()).await {
            warn!("{}; keeping {}", cause, binary.display());
            return Ok(Outcome::Offline { path: binary });
        }

        let (url, reason) = match cause {
            WebDriverError::NetworkUnreachable { url, reason } => (url, reason),
            other => (self.driver.feed_url().to_string(), other.to_string()),
        };
        Err(WebDriverError::NetworkUnreachable {
            url,
            reason: format!(
                "{reason}; download {} manually from {} and place it in {}",
                self.driver.file_name(),
                self.driver.feed_url(),
                self.settings.install_dir.display()
            ),
        })
    }
}
