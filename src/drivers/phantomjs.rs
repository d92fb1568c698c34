//! PhantomJS, the headless WebKit browser used as its own driver.
//!
//! Releases are files on the Bitbucket downloads page. The executable sits in
//! `phantomjs-<version>-<platform>/bin/` inside the archive.

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

const DOWNLOADS_URL: &str = "https://bitbucket.org/ariya/phantomjs/downloads";

static ARTIFACT_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"phantomjs-(\d+\.\d+\.\d+)-").expect("valid regex"));

pub struct PhantomJs {
    network: Network,
    platform: Platform,
    downloads_url: String,
}

impl PhantomJs {
    pub fn new(settings: &Settings, network: Network) -> Self {
        PhantomJs {
            network,
            platform: settings.platform,
            downloads_url: DOWNLOADS_URL.to_string(),
        }
    }

    pub fn with_downloads_url(mut self, downloads_url: &str) -> Self {
        self.downloads_url = downloads_url.trim_end_matches('/').to_string();
        self
    }

    fn parse_downloads_page(&self, html: &str) -> Result<ReleaseIndex, WebDriverError> {
        let feed_error = |reason: String| WebDriverError::FeedParse {
            url: self.downloads_url.clone(),
            reason,
        };
        let page_url = Url::parse(&self.downloads_url).map_err(|e| feed_error(e.to_string()))?;
        let anchors = Selector::parse("a[href]").map_err(|e| feed_error(e.to_string()))?;
        let suffix = self.artifact_suffix(&Version::EMPTY)?;

        let document = Html::parse_document(html);
        let mut index = ReleaseIndex::new();
        for href in document.select(&anchors).filter_map(|a| a.value().attr("href")) {
            if !href.ends_with(&format!("-{suffix}")) {
                continue;
            }
            let Some(version) = ARTIFACT_VERSION.captures(href).map(|c| Version::parse(&c[1])) else {
                continue;
            };
            if let Ok(url) = page_url.join(href) {
                index.insert(version, url.to_string());
            }
        }
        Ok(index)
    }
}

#[async_trait]
impl WebDriverManager for PhantomJs {
    fn driver_name(&self) -> &str {
        "phantomjs"
    }

    fn file_name(&self) -> String {
        self.platform.executable("phantomjs")
    }

    fn feed_url(&self) -> &str {
        &self.downloads_url
    }

    async fn list_releases(&self) -> Result<ReleaseIndex, WebDriverError> {
        let html = self.network.get_text(&self.downloads_url).await?;
        let index = self.parse_downloads_page(&html)?;
        debug!("Versions now located on downloads site: {}", index.len());
        Ok(index)
    }

    async fn required_version(&self, pinned: &Version) -> Result<Version, WebDriverError> {
        if !pinned.is_empty() {
            return Ok(pinned.clone());
        }
        let index = self.list_releases().await?;
        latest_release(&index, self.driver_name(), &self.downloads_url, self.platform.tag())
    }

    fn artifact_suffix(&self, _version: &Version) -> Result<String, WebDriverError> {
        let suffix = match (self.platform.os, self.platform.arch) {
            (Os::Linux, Arch::X86_64) => "linux-x86_64.tar.bz2",
            (Os::Linux, Arch::X86) => "linux-i686.tar.bz2",
            (Os::Mac, _) => "macosx.zip",
            (Os::Windows, _) => "windows.zip",
            (Os::Linux, Arch::Aarch64) => {
                return Err(WebDriverError::UnsupportedPlatform(format!(
                    "phantomjs is not published for {}",
                    self.platform
                )));
            }
        };
        Ok(suffix.to_string())
    }

    async fn download_url(&self, version: &Version) -> Result<String, WebDriverError> {
        let url = format!(
            "{}/phantomjs-{version}-{}",
            self.downloads_url,
            self.artifact_suffix(version)?
        );
        debug!("phantomjs URL: {}", url);
        Ok(url)
    }
}
