//! geckodriver, released independently of Firefox on GitHub.

use crate::config::Settings;
use crate::drivers::{latest_release, ReleaseIndex};
use crate::error::WebDriverError;
use crate::network::Network;
use crate::platform::{Arch, Os, Platform};
use crate::version::Version;
use crate::WebDriverManager;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

const RELEASES_URL: &str = "https://github.com/mozilla/geckodriver/releases";
const MAC_AARCH64_SINCE: &str = "0.29.1";
const LINUX_AARCH64_SINCE: &str = "0.32.0";

static TAG_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/v(\d+\.\d+\.\d+)/").expect("valid regex"));
static LATEST_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/tag/v?(\d+\.\d+\.\d+)/?$").expect("valid regex"));
static DRIVER_OUTPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"geckodriver (\d+\.\d+\.\d+)").expect("valid regex"));

pub struct GeckoDriver {
    network: Network,
    platform: Platform,
    releases_url: String,
}

impl GeckoDriver {
    pub fn new(settings: &Settings, network: Network) -> Self {
        GeckoDriver {
            network,
            platform: settings.platform,
            releases_url: RELEASES_URL.to_string(),
        }
    }

    pub fn with_releases_url(mut self, releases_url: &str) -> Self {
        self.releases_url = releases_url.trim_end_matches('/').to_string();
        self
    }

    /// Release artifacts linked from the releases page, keyed by tag version.
    fn parse_release_page(&self, html: &str) -> Result<ReleaseIndex, WebDriverError> {
        let page_url = Url::parse(&self.releases_url).map_err(|e| WebDriverError::FeedParse {
            url: self.releases_url.clone(),
            reason: e.to_string(),
        })?;
        let anchors = Selector::parse("a[href]").map_err(|e| WebDriverError::FeedParse {
            url: self.releases_url.clone(),
            reason: e.to_string(),
        })?;

        let document = Html::parse_document(html);
        let mut index = ReleaseIndex::new();
        for href in document.select(&anchors).filter_map(|a| a.value().attr("href")) {
            if !href.contains("/releases/download/") || href.contains("archive") {
                continue;
            }
            let Some(version) = TAG_VERSION.captures(href).map(|c| Version::parse(&c[1])) else {
                continue;
            };
            let Ok(ext) = self.artifact_suffix(&version) else {
                continue;
            };
            if !href.ends_with(&format!("-{ext}")) {
                continue;
            }
            match page_url.join(href) {
                Ok(url) => {
                    index.insert(version, url.to_string());
                }
                Err(e) => debug!("Skipping unresolvable link {}: {}", href, e),
            }
        }
        Ok(index)
    }
}

#[async_trait]
impl WebDriverManager for GeckoDriver {
    fn driver_name(&self) -> &str {
        "geckodriver"
    }

    fn file_name(&self) -> String {
        self.platform.executable("geckodriver")
    }

    fn feed_url(&self) -> &str {
        &self.releases_url
    }

    async fn list_releases(&self) -> Result<ReleaseIndex, WebDriverError> {
        let html = self.network.get_text(&self.releases_url).await?;
        let index = self.parse_release_page(&html)?;
        debug!("Versions now located on downloads site: {}", index.len());
        Ok(index)
    }

    async fn required_version(&self, pinned: &Version) -> Result<Version, WebDriverError> {
        if !pinned.is_empty() {
            return Ok(pinned.clone());
        }

        // /releases/latest redirects to the newest tag's page.
        let tag_url = self.network.get_final_url(&format!("{}/latest", self.releases_url)).await?;
        if let Some(version) = LATEST_TAG.captures(&tag_url).map(|c| Version::parse(&c[1])) {
            debug!("Latest version available: {}", version);
            return Ok(version);
        }

        debug!("No release tag in {}; reading the releases page", tag_url);
        let index = self.list_releases().await?;
        latest_release(&index, self.driver_name(), &self.releases_url, self.platform.tag())
    }

    fn artifact_suffix(&self, version: &Version) -> Result<String, WebDriverError> {
        let ext = match (self.platform.os, self.platform.arch) {
            (Os::Linux, Arch::X86_64) => "linux64.tar.gz",
            (Os::Linux, Arch::X86) => "linux32.tar.gz",
            (Os::Linux, Arch::Aarch64) if *version >= Version::parse(LINUX_AARCH64_SINCE) => {
                "linux-aarch64.tar.gz"
            }
            (Os::Mac, Arch::Aarch64) if *version >= Version::parse(MAC_AARCH64_SINCE) => {
                "macos-aarch64.tar.gz"
            }
            (Os::Mac, _) => "macos.tar.gz",
            (Os::Windows, Arch::X86_64) => "win64.zip",
            (Os::Windows, Arch::X86) => "win32.zip",
            (Os::Windows, Arch::Aarch64) => "win-aarch64.zip",
            (Os::Linux, Arch::Aarch64) => {
                return Err(WebDriverError::UnsupportedPlatform(format!(
                    "geckodriver {version} is not published for {}",
                    self.platform
                )));
            }
        };
        Ok(ext.to_string())
    }

    async fn download_url(&self, version: &Version) -> Result<String, WebDriverError> {
        let url = format!(
            "{}/download/v{version}/geckodriver-v{version}-{}",
            self.releases_url,
            self.artifact_suffix(version)?
        );
        debug!("geckodriver URL: {}", url);
        Ok(url)
    }

    fn parse_version_output(&self, output: &str) -> Version {
        DRIVER_OUTPUT
            .captures(output)
            .map(|c| Version::parse(&c[1]))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><body>
        <a href="/mozilla/geckodriver/releases/download/v0.33.0/geckodriver-v0.33.0-linux64.tar.gz">linux64</a>
        <a href="/mozilla/geckodriver/releases/download/v0.33.0/geckodriver-v0.33.0-linux64.tar.gz.asc">sig</a>
        <a href="/mozilla/geckodriver/releases/download/v0.33.0/geckodriver-v0.33.0-win64.zip">win64</a>
        <a href="/mozilla/geckodriver/releases/download/v0.9.0/geckodriver-v0.9.0-linux64.tar.gz">old</a>
        <a href="/mozilla/geckodriver/releases/download/v0.34.0/geckodriver-v0.34.0-linux64.tar.gz">linux64</a>
        <a href="/mozilla/geckodriver/archive/refs/tags/v0.34.0.tar.gz">source</a>
        <a href="https://example.com/elsewhere">elsewhere</a>
    </body></html>"#;

    fn driver(platform: Platform, releases_url: &str) -> GeckoDriver {
        let settings = Settings::new("unused", platform);
        GeckoDriver::new(&settings, Network::new(&settings).unwrap()).with_releases_url(releases_url)
    }

    #[tokio::test]
    async fn test_release_page_index() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mozilla/geckodriver/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;
        let releases = format!("{}/mozilla/geckodriver/releases", server.uri());
        let geckodriver = driver(Platform::new(Os::Linux, Arch::X86_64), &releases);

        let index = geckodriver.list_releases().await.unwrap();
        assert_eq!(
            index.keys().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["0.9.0", "0.33.0", "0.34.0"]
        );
        assert_eq!(
            index[&Version::parse("0.34.0")],
            format!("{releases}/download/v0.34.0/geckodriver-v0.34.0-linux64.tar.gz")
        );
        // Without a /latest page there is no fallback to the index.
        assert!(matches!(
            geckodriver.required_version(&Version::EMPTY).await,
            Err(WebDriverError::HttpStatus { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_latest_follows_latest_release_redirect() {
        let server = MockServer::start().await;
        let releases = format!("{}/mozilla/geckodriver/releases", server.uri());
        Mock::given(method("GET"))
            .and(path("/mozilla/geckodriver/releases/latest"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", format!("{releases}/tag/v0.35.0")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mozilla/geckodriver/releases/tag/v0.35.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;
        let geckodriver = driver(Platform::new(Os::Linux, Arch::X86_64), &releases);

        let version = geckodriver.required_version(&Version::EMPTY).await.unwrap();
        assert_eq!(version, Version::parse("0.35.0"));
        assert_eq!(
            geckodriver.download_url(&version).await.unwrap(),
            format!("{releases}/download/v0.35.0/geckodriver-v0.35.0-linux64.tar.gz")
        );
    }

    #[tokio::test]
    async fn test_latest_without_tag_falls_back_to_release_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mozilla/geckodriver/releases/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mozilla/geckodriver/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;
        let releases = format!("{}/mozilla/geckodriver/releases", server.uri());
        let geckodriver = driver(Platform::new(Os::Linux, Arch::X86_64), &releases);

        assert_eq!(
            geckodriver.required_version(&Version::EMPTY).await.unwrap(),
            Version::parse("0.34.0")
        );
    }

    #[tokio::test]
    async fn test_pinned_version_skips_the_release_page() {
        let geckodriver = driver(Platform::new(Os::Windows, Arch::X86_64), "http://127.0.0.1:1/releases");
        let pinned = Version::parse("0.26.0");

        assert_eq!(geckodriver.required_version(&pinned).await.unwrap(), pinned);
        assert_eq!(
            geckodriver.download_url(&pinned).await.unwrap(),
            "http://127.0.0.1:1/releases/download/v0.26.0/geckodriver-v0.26.0-win64.zip"
        );
    }

    #[tokio::test]
    async fn test_offline_release_page() {
        let geckodriver = driver(Platform::new(Os::Linux, Arch::X86_64), "http://127.0.0.1:1/releases");
        let err = geckodriver.required_version(&Version::EMPTY).await.unwrap_err();
        assert!(err.is_network_unreachable());
    }

    #[test]
    fn test_arm_thresholds() {
        let mac = driver(Platform::new(Os::Mac, Arch::Aarch64), RELEASES_URL);
        assert_eq!(mac.artifact_suffix(&Version::parse("0.29.0")).unwrap(), "macos.tar.gz");
        assert_eq!(mac.artifact_suffix(&Version::parse("0.29.1")).unwrap(), "macos-aarch64.tar.gz");

        let linux = driver(Platform::new(Os::Linux, Arch::Aarch64), RELEASES_URL);
        assert!(linux.artifact_suffix(&Version::parse("0.31.0")).is_err());
        assert_eq!(linux.artifact_suffix(&Version::parse("0.32.0")).unwrap(), "linux-aarch64.tar.gz");
    }

    #[test]
    fn test_parse_driver_output() {
        let geckodriver = driver(Platform::new(Os::Linux, Arch::X86_64), RELEASES_URL);
        let output = "geckodriver 0.34.0 (c44f0d09630a 2024-01-02 15:36 +0000)\n\nThe source code...";
        assert_eq!(geckodriver.parse_version_output(output), Version::parse("0.34.0"));
        assert!(geckodriver.parse_version_output("firefox 120").is_empty());
    }
}
