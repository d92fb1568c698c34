//! chromedriver, coupled to the installed Chrome/Chromium.
//!
//! Chrome 115 and later publish drivers through the Chrome for Testing JSON
//! endpoints. Older builds use the legacy storage bucket, which has a
//! `LATEST_RELEASE_<build>` file per browser build.

use crate::browser::{browser_version, Browser};
use crate::config::Settings;
use crate::drivers::{missing_point_release, ReleaseIndex};
use crate::error::WebDriverError;
use crate::network::Network;
use crate::platform::{Arch, Os, Platform};
use crate::version::Version;
use crate::WebDriverManager;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

const STORAGE_URL: &str = "https://chromedriver.storage.googleapis.com";
const TESTING_URL: &str = "https://googlechromelabs.github.io/chrome-for-testing";
const PATCH_VERSIONS: &str = "latest-patch-versions-per-build.json";
const KNOWN_GOOD_VERSIONS: &str = "known-good-versions-with-downloads.json";

/// First Chrome major published through Chrome for Testing.
const FIRST_TESTING_MAJOR: u64 = 115;
/// Builds before this have no `LATEST_RELEASE_<build>` file.
const FIRST_POINT_RELEASE_BUILD: &str = "70.0.3538";
const LAST_UNCOUPLED_RELEASE: &str = "2.46";
const MAC_M1_SINCE: &str = "87.0.4280.88";
const MAC_ARM64_SINCE: &str = "106.0.5249.61";

/// Public struct for managing Chromedriver.
pub struct ChromeDriver {
    network: Network,
    platform: Platform,
    browser_path: Option<PathBuf>,
    browser_version: Option<Version>,
    storage_url: String,
    testing_url: String,
}

impl ChromeDriver {
    pub fn new(settings: &Settings, network: Network) -> Self {
        ChromeDriver {
            network,
            platform: settings.platform,
            browser_path: settings.browser_path.clone(),
            browser_version: None,
            storage_url: STORAGE_URL.to_string(),
            testing_url: TESTING_URL.to_string(),
        }
    }

    /// Points the family at other hosts (mirrors, tests).
    pub fn with_endpoints(mut self, storage_url: &str, testing_url: &str) -> Self {
        self.storage_url = storage_url.trim_end_matches('/').to_string();
        self.testing_url = testing_url.trim_end_matches('/').to_string();
        self
    }

    /// Uses a known browser version instead of probing the installed browser.
    pub fn with_browser_version(mut self, version: Version) -> Self {
        self.browser_version = Some(version);
        self
    }

    async fn chrome_version(&self) -> Result<Version, WebDriverError> {
        match &self.browser_version {
            Some(version) => Ok(version.clone()),
            None => browser_version(Browser::Chrome, self.browser_path.as_deref()).await,
        }
    }

    /// Release version from the installed Chrome, e.g. 73.0.3683.75 -> 73.0.3683
    async fn release_version(&self) -> Result<Version, WebDriverError> {
        Ok(self.chrome_version().await?.truncate(3))
    }

    async fn legacy_point_release(&self, build: &Version) -> Result<Version, WebDriverError> {
        let url = format!("{}/LATEST_RELEASE_{}", self.storage_url, build);
        match self.network.get_text(&url).await {
            Ok(text) => non_empty(Version::parse(&text), &url),
            Err(WebDriverError::HttpStatus { .. }) => {
                let latest_url = format!("{}/LATEST_RELEASE", self.storage_url);
                let latest = self
                    .network
                    .get_text(&latest_url)
                    .await
                    .and_then(|text| non_empty(Version::parse(&text), &latest_url));
                Err(missing_point_release(
                    self.driver_name(),
                    "Chrome",
                    build,
                    latest,
                    &format!("{}/index.html", self.storage_url),
                ))
            }
            Err(e) => Err(e),
        }
    }

    async fn testing_point_release(&self, build: &Version) -> Result<Version, WebDriverError> {
        let url = format!("{}/{}", self.testing_url, PATCH_VERSIONS);
        let patches: PatchVersions = self.network.get_json(&url).await?;

        if let Some(entry) = patches.builds.get(&build.to_string()) {
            return non_empty(Version::parse(&entry.version), &url);
        }

        let latest = patches
            .builds
            .values()
            .map(|entry| Version::parse(&entry.version))
            .max()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| WebDriverError::FeedParse {
                url: url.clone(),
                reason: "no builds listed".to_string(),
            });
        Err(missing_point_release(
            self.driver_name(),
            "Chrome",
            build,
            latest,
            &format!("{}/{}", self.testing_url, KNOWN_GOOD_VERSIONS),
        ))
    }

    fn legacy_suffix(&self, version: &Version) -> Result<&'static str, WebDriverError> {
        match (self.platform.os, self.platform.arch) {
            (Os::Linux, Arch::X86_64) => Ok("linux64"),
            (Os::Linux, Arch::X86) => Ok("linux32"),
            (Os::Mac, Arch::Aarch64) if *version >= Version::parse(MAC_ARM64_SINCE) => Ok("mac_arm64"),
            (Os::Mac, Arch::Aarch64) if *version >= Version::parse(MAC_M1_SINCE) => Ok("mac64_m1"),
            (Os::Mac, _) => Ok("mac64"),
            (Os::Windows, _) => Ok("win32"),
            _ => Err(WebDriverError::UnsupportedPlatform(format!(
                "chromedriver {} is not published for {}",
                version, self.platform
            ))),
        }
    }

    fn testing_suffix(&self, version: &Version) -> Result<&'static str, WebDriverError> {
        match (self.platform.os, self.platform.arch) {
            (Os::Linux, Arch::X86_64) => Ok("linux64"),
            (Os::Mac, Arch::Aarch64) => Ok("mac-arm64"),
            (Os::Mac, _) => Ok("mac-x64"),
            (Os::Windows, Arch::X86) => Ok("win32"),
            (Os::Windows, _) => Ok("win64"),
            _ => Err(WebDriverError::UnsupportedPlatform(format!(
                "chromedriver {} is not published for {}",
                version, self.platform
            ))),
        }
    }
}

fn uses_testing_endpoints(version: &Version) -> bool {
    version.major().is_some_and(|major| major >= FIRST_TESTING_MAJOR)
}

fn non_empty(version: Version, url: &str) -> Result<Version, WebDriverError> {
    if version.is_empty() {
        Err(WebDriverError::FeedParse {
            url: url.to_string(),
            reason: "no version found".to_string(),
        })
    } else {
        Ok(version)
    }
}

#[async_trait]
impl WebDriverManager for ChromeDriver {
    fn driver_name(&self) -> &str {
        "chromedriver"
    }

    fn file_name(&self) -> String {
        self.platform.executable("chromedriver")
    }

    fn feed_url(&self) -> &str {
        &self.testing_url
    }

    async fn list_releases(&self) -> Result<ReleaseIndex, WebDriverError> {
        let url = format!("{}/{}", self.testing_url, KNOWN_GOOD_VERSIONS);
        let response: KnownGoodVersions = self.network.get_json(&url).await?;

        let index: ReleaseIndex = response
            .versions
            .into_iter()
            .filter_map(|known| {
                let version = Version::parse(&known.version);
                let platform = self.testing_suffix(&version).ok()?;
                // must be optional, some versions have no key 'chromedriver'
                let download = known
                    .downloads
                    .chromedriver?
                    .into_iter()
                    .find(|d| d.platform == platform)?;
                Some((version, download.url))
            })
            .collect();
        debug!("Versions now located on downloads site: {}", index.len());
        Ok(index)
    }

    async fn required_version(&self, pinned: &Version) -> Result<Version, WebDriverError> {
        if !pinned.is_empty() {
            return Ok(pinned.clone());
        }

        let build = self.release_version().await?;
        let version = if build < Version::parse(FIRST_POINT_RELEASE_BUILD) {
            Version::parse(LAST_UNCOUPLED_RELEASE)
        } else if uses_testing_endpoints(&build) {
            self.testing_point_release(&build).await?
        } else {
            self.legacy_point_release(&build).await?
        };
        debug!("Latest version available: {}", version);
        Ok(version)
    }

    fn artifact_suffix(&self, version: &Version) -> Result<String, WebDriverError> {
        if uses_testing_endpoints(version) {
            self.testing_suffix(version).map(str::to_string)
        } else {
            self.legacy_suffix(version).map(str::to_string)
        }
    }

    async fn download_url(&self, version: &Version) -> Result<String, WebDriverError> {
        if !uses_testing_endpoints(version) {
            let url = format!(
                "{}/{}/chromedriver_{}.zip",
                self.storage_url,
                version,
                self.artifact_suffix(version)?
            );
            debug!("chromedriver URL: {}", url);
            return Ok(url);
        }

        // Chrome for Testing URLs are not templated; look the artifact up.
        let index = self.list_releases().await?;
        let url = index
            .iter()
            .rev()
            .find(|(known, _)| known.matches(version))
            .map(|(_, url)| url.clone())
            .ok_or_else(|| WebDriverError::DriverUrlNotFound {
                driver_version: version.to_string(),
                platform: self.platform.to_string(),
            })?;
        debug!("chromedriver URL: {}", url);
        Ok(url)
    }

    async fn is_sufficient(&self, current: Option<&Version>) -> bool {
        let Some(current) = current else {
            return false;
        };
        match self.chrome_version().await {
            Ok(chrome) => current.major() == chrome.major(),
            Err(e) => {
                debug!("Unable to compare with the installed Chrome: {}", e);
                false
            }
        }
    }
}

/// Represents a single download URL for a specific platform.
#[derive(Debug, Deserialize)]
struct Download {
    platform: String,
    url: String,
}

/// Represents the available downloads for a specific Chromedriver version.
#[derive(Debug, Deserialize)]
struct VersionDownloads {
    chromedriver: Option<Vec<Download>>,
}

/// Represents a single version entry in the known-good versions document.
#[derive(Debug, Deserialize)]
struct KnownGoodVersion {
    version: String,
    downloads: VersionDownloads,
}

/// The top-level structure of the known-good versions document.
#[derive(Debug, Deserialize)]
struct KnownGoodVersions {
    versions: Vec<KnownGoodVersion>,
}

#[derive(Debug, Deserialize)]
struct PatchVersions {
    builds: HashMap<String, PatchVersion>,
}

#[derive(Debug, Deserialize)]
struct PatchVersion {
    version: String,
}

// --- Tests ---
