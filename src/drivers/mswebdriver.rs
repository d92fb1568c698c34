//! MicrosoftWebDriver for legacy (EdgeHTML) Microsoft Edge.
//!
//! There is no queryable feed: each Windows 10 build has one historical
//! download, and from build 17763 the driver ships as a Windows feature.

use crate::browser::legacy_edge_version;
use crate::cache::VersionCache;
use crate::config::Settings;
use crate::drivers::ReleaseIndex;
use crate::error::WebDriverError;
use crate::version::Version;
use crate::WebDriverManager;
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

const FEED_URL: &str = "https://developer.microsoft.com/en-us/microsoft-edge/tools/webdriver/";
const FEATURE_ON_DEMAND_BUILD: u64 = 17763;
const LAST_EDGEHTML_MAJOR: u64 = 44;

/// Windows build -> MicrosoftWebDriver.exe for that build.
const DOWNLOADS: [(u64, &str); 6] = [
    (17134, "https://download.microsoft.com/download/F/8/A/F8AF50AB-3C3A-4BC4-8773-DC27B32988DD/MicrosoftWebDriver.exe"),
    (16299, "https://download.microsoft.com/download/D/4/1/D417998A-58EE-4EFE-A7CC-39EF9E020768/MicrosoftWebDriver.exe"),
    (15063, "https://download.microsoft.com/download/3/4/2/342316D7-EBE0-4F10-ABA2-AE8E0CDF36DD/MicrosoftWebDriver.exe"),
    (14393, "https://download.microsoft.com/download/3/2/D/32D3E464-F2EF-490F-841B-05D53C848D15/MicrosoftWebDriver.exe"),
    (10586, "https://download.microsoft.com/download/C/0/7/C07EBF21-5305-4EC8-83B1-A6FCC8F93F45/MicrosoftWebDriver.exe"),
    (10240, "https://download.microsoft.com/download/8/D/0/8D0D08CF-790D-4586-B726-C6469A9ED49C/MicrosoftWebDriver.exe"),
];

pub struct MsWebDriver {
    cache: VersionCache,
    edge_version: Option<Version>,
}

impl MsWebDriver {
    pub fn new(settings: &Settings) -> Self {
        MsWebDriver {
            cache: VersionCache::new(&settings.install_dir, settings.cache_time),
            edge_version: None,
        }
    }

    /// Uses a known legacy Edge package version (e.g. `42.17134.1.0`).
    pub fn with_edge_version(mut self, version: Version) -> Self {
        self.edge_version = Some(version);
        self
    }

    async fn edge_version(&self) -> Result<Version, WebDriverError> {
        match &self.edge_version {
            Some(version) => Ok(version.clone()),
            None => legacy_edge_version().await,
        }
    }

    fn download_for(build: &Version) -> Option<&'static str> {
        DOWNLOADS
            .iter()
            .find(|(known, _)| Version::from_segments([*known]) == *build)
            .map(|(_, url)| *url)
    }
}

#[async_trait]
impl WebDriverManager for MsWebDriver {
    fn driver_name(&self) -> &str {
        "MicrosoftWebDriver"
    }

    fn file_name(&self) -> String {
        "MicrosoftWebDriver.exe".to_string()
    }

    fn feed_url(&self) -> &str {
        FEED_URL
    }

    async fn list_releases(&self) -> Result<ReleaseIndex, WebDriverError> {
        Ok(DOWNLOADS
            .iter()
            .map(|(build, url)| (Version::from_segments([*build]), url.to_string()))
            .collect())
    }

    async fn required_version(&self, pinned: &Version) -> Result<Version, WebDriverError> {
        if !pinned.is_empty() {
            return Ok(pinned.clone());
        }

        let edge = self.edge_version().await?;
        let build = edge.segments().get(1).copied().unwrap_or_default();
        debug!("Legacy Edge {} runs on Windows build {}", edge, build);

        if build >= FEATURE_ON_DEMAND_BUILD || edge.major().unwrap_or_default() > LAST_EDGEHTML_MAJOR {
            return Err(WebDriverError::VersionResolution(format!(
                "Microsoft Edge {edge} ships MicrosoftWebDriver as a Windows feature. Install it with \
                 `DISM.exe /Online /Add-Capability /CapabilityName:Microsoft.WebDriver~~~~0.0.1.0` \
                 instead of downloading it: {FEED_URL}"
            )));
        }

        let version = Version::from_segments([build]);
        if Self::download_for(&version).is_none() {
            return Err(WebDriverError::VersionResolution(format!(
                "No MicrosoftWebDriver is published for Windows build {build}. \
                 Please pin a known build with `--required-version <build>`: {FEED_URL}"
            )));
        }
        Ok(version)
    }

    fn artifact_suffix(&self, _version: &Version) -> Result<String, WebDriverError> {
        Ok("exe".to_string())
    }

    async fn download_url(&self, version: &Version) -> Result<String, WebDriverError> {
        Self::download_for(version)
            .map(str::to_string)
            .ok_or_else(|| WebDriverError::DriverUrlNotFound {
                driver_version: version.to_string(),
                platform: "windows".to_string(),
            })
    }

    /// The driver cannot report its version; it is recorded after each install.
    async fn current_version(&self, binary: &Path) -> Option<Version> {
        if !binary.is_file() {
            return None;
        }
        self.cache.installed(&self.file_name())
    }

    async fn installed(&self, _binary: &Path, version: &Version) -> Result<(), WebDriverError> {
        self.cache.record_installed(&self.file_name(), version)
    }
}
