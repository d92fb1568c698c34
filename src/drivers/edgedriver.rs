//! msedgedriver, coupled to the installed Chromium-based Microsoft Edge.
//!
//! Microsoft publishes a `LATEST_RELEASE_<major>_<OS>` file per browser major
//! (UTF-16 encoded) and lists every artifact in an XML blob container.

use crate::browser::{browser_version, Browser};
use crate::config::Settings;
use crate::drivers::{missing_point_release, xml_elements, ReleaseIndex};
use crate::error::WebDriverError;
use crate::network::Network;
use crate::platform::{Arch, Os, Platform};
use crate::version::Version;
use crate::WebDriverManager;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

const BASE_URL: &str = "https://msedgedriver.microsoft.com";
const STORAGE_URL: &str = "https://msedgewebdriverstorage.blob.core.windows.net/edgewebdriver";
const MAC_M1_SINCE: &str = "87.0.669.0";

pub struct EdgeDriver {
    network: Network,
    platform: Platform,
    browser_path: Option<PathBuf>,
    browser_version: Option<Version>,
    base_url: String,
    storage_url: String,
}

impl EdgeDriver {
    pub fn new(settings: &Settings, network: Network) -> Self {
        EdgeDriver {
            network,
            platform: settings.platform,
            browser_path: settings.browser_path.clone(),
            browser_version: None,
            base_url: BASE_URL.to_string(),
            storage_url: STORAGE_URL.to_string(),
        }
    }

    pub fn with_endpoints(mut self, base_url: &str, storage_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self.storage_url = storage_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_browser_version(mut self, version: Version) -> Self {
        self.browser_version = Some(version);
        self
    }

    async fn edge_version(&self) -> Result<Version, WebDriverError> {
        match &self.browser_version {
            Some(version) => Ok(version.clone()),
            None => browser_version(Browser::Edge, self.browser_path.as_deref()).await,
        }
    }

    fn os_name(&self) -> &'static str {
        match self.platform.os {
            Os::Windows => "WINDOWS",
            Os::Mac => "MACOS",
            Os::Linux => "LINUX",
        }
    }

    async fn fetch_version(&self, url: &str) -> Result<Version, WebDriverError> {
        let version = Version::parse(&self.network.get_text(url).await?);
        if version.is_empty() {
            return Err(WebDriverError::FeedParse {
                url: url.to_string(),
                reason: "no version found".to_string(),
            });
        }
        Ok(version)
    }

    /// Microsoft only publishes LATEST_RELEASE_<major>, so the answer must
    /// also be at least the browser's build.
    async fn latest_point_release(&self, build: &Version) -> Result<Version, WebDriverError> {
        let major = build.major().unwrap_or_default();
        let url = format!("{}/LATEST_RELEASE_{}_{}", self.base_url, major, self.os_name());

        match self.fetch_version(&url).await {
            Ok(version) if version >= *build => Ok(version),
            Ok(_) | Err(WebDriverError::HttpStatus { .. }) => {
                let latest = self
                    .fetch_version(&format!("{}/LATEST_STABLE", self.base_url))
                    .await;
                Err(missing_point_release(
                    self.driver_name(),
                    "Edge",
                    build,
                    latest,
                    &self.base_url,
                ))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl WebDriverManager for EdgeDriver {
    fn driver_name(&self) -> &str {
        "msedgedriver"
    }

    fn file_name(&self) -> String {
        self.platform.executable("msedgedriver")
    }

    fn feed_url(&self) -> &str {
        &self.base_url
    }

    async fn list_releases(&self) -> Result<ReleaseIndex, WebDriverError> {
        let listing_url = format!("{}?restype=container&comp=list", self.storage_url);
        let xml = self.network.get_text(&listing_url).await?;

        let mut index = ReleaseIndex::new();
        for name in xml_elements(&xml, "Name") {
            let Some((version, artifact)) = name.split_once('/') else {
                continue;
            };
            let version = Version::parse(version);
            if version.is_empty() {
                continue;
            }
            let Ok(suffix) = self.artifact_suffix(&version) else {
                continue;
            };
            if artifact == format!("edgedriver_{suffix}.zip") {
                index.insert(version, format!("{}/{}", self.base_url, name));
            }
        }
        debug!("Versions now located on downloads site: {}", index.len());
        Ok(index)
    }

    async fn required_version(&self, pinned: &Version) -> Result<Version, WebDriverError> {
        if !pinned.is_empty() {
            return Ok(pinned.clone());
        }

        let build = self.edge_version().await?.truncate(3);
        let version = self.latest_point_release(&build).await?;
        debug!("Latest version available: {}", version);
        Ok(version)
    }

    fn artifact_suffix(&self, version: &Version) -> Result<String, WebDriverError> {
        let suffix = match (self.platform.os, self.platform.arch) {
            (Os::Windows, Arch::X86) => "win32",
            (Os::Windows, Arch::X86_64) => "win64",
            (Os::Windows, Arch::Aarch64) => "arm64",
            (Os::Mac, Arch::Aarch64) if *version >= Version::parse(MAC_M1_SINCE) => "mac64_m1",
            (Os::Mac, _) => "mac64",
            (Os::Linux, Arch::X86_64) => "linux64",
            (Os::Linux, _) => {
                return Err(WebDriverError::UnsupportedPlatform(format!(
                    "msedgedriver is not published for {}",
                    self.platform
                )));
            }
        };
        Ok(suffix.to_string())
    }

    async fn download_url(&self, version: &Version) -> Result<String, WebDriverError> {
        let url = format!(
            "{}/{}/edgedriver_{}.zip",
            self.base_url,
            version,
            self.artifact_suffix(version)?
        );
        debug!("msedgedriver URL: {}", url);
        Ok(url)
    }

    fn parse_version_output(&self, output: &str) -> Version {
        // Microsoft Edge WebDriver 120.0.2210.91 (6f5d6b1...)
        crate::browser::parse_browser_version(output).unwrap_or_default()
    }

    async fn is_sufficient(&self, current: Option<&Version>) -> bool {
        let Some(current) = current else {
            return false;
        };
        match self.edge_version().await {
            Ok(edge) => current.major() == edge.major(),
            Err(e) => {
                debug!("Unable to compare with the installed Edge: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn utf16(text: &str) -> Vec<u8> {
        let mut body = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            body.extend_from_slice(&unit.to_le_bytes());
        }
        body
    }

    fn driver(server: &MockServer, platform: Platform, edge: &str) -> EdgeDriver {
        let settings = Settings::new("unused", platform);
        EdgeDriver::new(&settings, Network::new(&settings).unwrap())
            .with_endpoints(&server.uri(), &format!("{}/edgewebdriver", server.uri()))
            .with_browser_version(Version::parse(edge))
    }

    async fn mount_utf16(server: &MockServer, at: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(status).set_body_bytes(utf16(body)))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_point_release_from_major_endpoint() {
        let server = MockServer::start().await;
        mount_utf16(&server, "/LATEST_RELEASE_120_LINUX", 200, "120.0.2210.91\r\n").await;
        let edgedriver = driver(&server, Platform::new(Os::Linux, Arch::X86_64), "120.0.2210.77");

        let version = edgedriver.required_version(&Version::EMPTY).await.unwrap();
        assert_eq!(version, Version::parse("120.0.2210.91"));
        assert_eq!(
            edgedriver.download_url(&version).await.unwrap(),
            format!("{}/120.0.2210.91/edgedriver_linux64.zip", server.uri())
        );
    }

    #[tokio::test]
    async fn test_published_driver_older_than_browser() {
        let server = MockServer::start().await;
        mount_utf16(&server, "/LATEST_RELEASE_121_WINDOWS", 200, "121.0.2277.83").await;
        mount_utf16(&server, "/LATEST_STABLE", 200, "121.0.2277.83").await;
        let edgedriver = driver(&server, Platform::new(Os::Windows, Arch::X86_64), "121.0.2300.5");

        let msg = edgedriver.required_version(&Version::EMPTY).await.unwrap_err().to_string();
        assert!(msg.contains("non-production version of Edge"), "{msg}");
    }

    #[tokio::test]
    async fn test_missing_major_with_unreachable_latest() {
        let server = MockServer::start().await;
        mount_utf16(&server, "/LATEST_RELEASE_130_MACOS", 404, "").await;
        let settings = Settings::new("unused", Platform::new(Os::Mac, Arch::X86_64));
        let edgedriver = EdgeDriver::new(&settings, Network::new(&settings).unwrap())
            .with_browser_version(Version::parse("130.0.1.2"))
            .with_endpoints(&server.uri(), "unused");
        // LATEST_STABLE is not mounted, so it answers 404 rather than being unreachable.
        let msg = edgedriver.required_version(&Version::EMPTY).await.unwrap_err().to_string();
        assert!(msg.starts_with("Unable to find latest point release version for 130.0.1."));
    }

    #[tokio::test]
    async fn test_list_releases_from_blob_listing() {
        let server = MockServer::start().await;
        let xml = "<?xml version=\"1.0\" encoding=\"utf-8\"?><EnumerationResults><Blobs>\
            <Blob><Name>120.0.2210.91/edgedriver_linux64.zip</Name></Blob>\
            <Blob><Name>120.0.2210.91/edgedriver_win64.zip</Name></Blob>\
            <Blob><Name>121.0.2277.83/edgedriver_linux64.zip</Name></Blob>\
            <Blob><Name>LATEST_STABLE</Name></Blob>\
            </Blobs></EnumerationResults>";
        Mock::given(method("GET"))
            .and(path("/edgewebdriver"))
            .and(query_param("comp", "list"))
            .respond_with(ResponseTemplate::new(200).set_body_string(xml))
            .mount(&server)
            .await;
        let edgedriver = driver(&server, Platform::new(Os::Linux, Arch::X86_64), "121.0.2277.83");

        let index = edgedriver.list_releases().await.unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(
            index[&Version::parse("121.0.2277.83")],
            format!("{}/121.0.2277.83/edgedriver_linux64.zip", server.uri())
        );
    }

    #[test]
    fn test_mac_suffixes() {
        let settings = Settings::new("unused", Platform::new(Os::Mac, Arch::Aarch64));
        let edgedriver = EdgeDriver::new(&settings, Network::new(&settings).unwrap());
        assert_eq!(edgedriver.artifact_suffix(&Version::parse("86.0.622.69")).unwrap(), "mac64");
        assert_eq!(edgedriver.artifact_suffix(&Version::parse("87.0.669.0")).unwrap(), "mac64_m1");
    }

    #[test]
    fn test_parse_driver_output() {
        let settings = Settings::new("unused", Platform::new(Os::Linux, Arch::X86_64));
        let edgedriver = EdgeDriver::new(&settings, Network::new(&settings).unwrap());
        assert_eq!(
            edgedriver.parse_version_output("Microsoft Edge WebDriver 120.0.2210.91 (abc)"),
            Version::parse("120.0.2210.91")
        );
    }
}
