//! Keeps browser automation drivers (chromedriver, msedgedriver, geckodriver,
//! IEDriverServer, MicrosoftWebDriver) in sync with the installed browsers.
//!
//! ```no_run
//! use webdrivers::{Family, Settings, Updater};
//!
//! # async fn run() -> Result<(), webdrivers::WebDriverError> {
//! let settings = Settings::from_env()?;
//! let updater = Updater::for_family(Family::Chromedriver, settings)?;
//! let chromedriver = updater.update().await?;
//! println!("{}", chromedriver.display());
//! # Ok(())
//! # }
//! ```

// Top-level public modules
pub mod browser;
pub mod cache;
pub mod config;
pub mod downloader;
pub mod drivers;
pub mod error;
pub mod network;
pub mod platform;
pub mod updater;
pub mod version;

pub use config::{ProxySettings, Settings};
pub use drivers::{Family, ReleaseIndex};
pub use error::WebDriverError;
pub use network::Network;
pub use platform::Platform;
pub use updater::{Outcome, Updater};
pub use version::Version;

// Main public trait
use async_trait::async_trait;
use std::path::Path;

/// One driver family's publishing quirks: where its releases live, which one
/// the current environment needs, and how to download it.
#[async_trait]
pub trait WebDriverManager: Send + Sync {
    /// Gets the name of the driver (e.g., "chromedriver").
    fn driver_name(&self) -> &str;

    /// Executable name on the current platform (e.g., "chromedriver.exe").
    fn file_name(&self) -> String;

    /// Human-facing location of the family's releases, used in error messages.
    fn feed_url(&self) -> &str;

    /// Fetches the releases available for the current platform.
    async fn list_releases(&self) -> Result<ReleaseIndex, WebDriverError>;

    /// The version that should be installed. A non-empty `pinned` version is
    /// the requirement as-is; otherwise it is computed from the feed and,
    /// for browser-coupled families, the installed browser.
    async fn required_version(&self, pinned: &Version) -> Result<Version, WebDriverError>;

    /// Platform-specific part of the artifact name for `version`.
    fn artifact_suffix(&self, version: &Version) -> Result<String, WebDriverError>;

    /// Gets the download URL for the specified driver version.
    async fn download_url(&self, version: &Version) -> Result<String, WebDriverError>;

    /// Version reported by the installed binary, `None` when it cannot be determined.
    async fn current_version(&self, binary: &Path) -> Option<Version> {
        let output = drivers::probe_version_output(binary).await?;
        Some(self.parse_version_output(&output)).filter(|v| !v.is_empty())
    }

    /// Extracts the version from the output of `<driver> --version`.
    fn parse_version_output(&self, output: &str) -> Version {
        drivers::first_dotted_version(output)
    }

    /// Called once a new binary is in place at `binary`.
    async fn installed(&self, _binary: &Path, _version: &Version) -> Result<(), WebDriverError> {
        Ok(())
    }

    /// Whether an installed binary may be kept when the feed is unreachable.
    async fn is_sufficient(&self, _current: Option<&Version>) -> bool {
        true
    }
}
