//! IEDriverServer, published in the Selenium release bucket.

use crate::config::Settings;
use crate::drivers::{latest_release, xml_elements, ReleaseIndex};
use crate::error::WebDriverError;
use crate::network::Network;
use crate::platform::{Arch, Platform};
use crate::version::Version;
use crate::WebDriverManager;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

const BUCKET_URL: &str = "https://selenium-release.storage.googleapis.com/";

static KEY_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_([\d.]+)\.zip$").expect("valid regex"));
static DRIVER_OUTPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"IEDriverServer\.exe (\d+\.\d+\.\d+)").expect("valid regex"));

pub struct IeDriver {
    network: Network,
    platform: Platform,
    bucket_url: String,
}

impl IeDriver {
    pub fn new(settings: &Settings, network: Network) -> Self {
        IeDriver {
            network,
            platform: settings.platform,
            bucket_url: BUCKET_URL.to_string(),
        }
    }

    pub fn with_bucket_url(mut self, bucket_url: &str) -> Self {
        self.bucket_url = format!("{}/", bucket_url.trim_end_matches('/'));
        self
    }

    fn arch_name(&self) -> &'static str {
        // 64-bit Windows runs the x64 server; ARM hosts fall back to emulated Win32.
        match self.platform.arch {
            Arch::X86_64 => "x64",
            Arch::X86 | Arch::Aarch64 => "Win32",
        }
    }
}

#[async_trait]
impl WebDriverManager for IeDriver {
    fn driver_name(&self) -> &str {
        "IEDriverServer"
    }

    fn file_name(&self) -> String {
        // Internet Explorer only exists on Windows.
        "IEDriverServer.exe".to_string()
    }

    fn feed_url(&self) -> &str {
        &self.bucket_url
    }

    async fn list_releases(&self) -> Result<ReleaseIndex, WebDriverError> {
        let xml = self.network.get_text(&self.bucket_url).await?;
        let prefix = format!("IEDriverServer_{}_", self.arch_name());

        let index: ReleaseIndex = xml_elements(&xml, "Key")
            .into_iter()
            .filter(|key| key.contains(&prefix))
            .filter_map(|key| {
                let version = KEY_VERSION.captures(&key).map(|c| Version::parse(&c[1]))?;
                Some((version, format!("{}{}", self.bucket_url, key)))
            })
            .filter(|(version, _)| !version.is_empty())
            .collect();
        debug!("Versions now located on downloads site: {}", index.len());
        Ok(index)
    }

    async fn required_version(&self, pinned: &Version) -> Result<Version, WebDriverError> {
        if !pinned.is_empty() {
            return Ok(pinned.clone());
        }
        let index = self.list_releases().await?;
        latest_release(&index, self.driver_name(), &self.bucket_url, self.platform.tag())
    }

    fn artifact_suffix(&self, _version: &Version) -> Result<String, WebDriverError> {
        Ok(self.arch_name().to_string())
    }

    async fn download_url(&self, version: &Version) -> Result<String, WebDriverError> {
        // The bucket groups releases by major.minor: 3.150/IEDriverServer_x64_3.150.1.zip
        let folder = version.truncate(2);
        let url = format!(
            "{}{}/IEDriverServer_{}_{}.zip",
            self.bucket_url,
            folder,
            self.artifact_suffix(version)?,
            version
        );
        debug!("IEDriverServer URL: {}", url);
        Ok(url)
    }

    fn parse_version_output(&self, output: &str) -> Version {
        DRIVER_OUTPUT
            .captures(output)
            .map(|c| Version::parse(&c[1]))
            .unwrap_or_default()
    }
}
