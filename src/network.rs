//! The single point of HTTP access.
//!
//! Every feed and artifact request goes through [`Network`], so that "offline"
//! surfaces uniformly as [`WebDriverError::NetworkUnreachable`] no matter
//! which driver family asked.

use crate::config::Settings;
use crate::error::WebDriverError;
use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

pub const MAX_REDIRECTS: usize = 10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Network {
    client: reqwest::Client,
}

impl Network {
    pub fn new(settings: &Settings) -> Result<Self, WebDriverError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("webdrivers/", env!("CARGO_PKG_VERSION")))
            .redirect(Policy::limited(MAX_REDIRECTS))
            .connect_timeout(CONNECT_TIMEOUT);

        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(proxy_settings) = &settings.proxy {
            let proxy_url = proxy_settings.url();
            let misconfigured = |e: reqwest::Error| WebDriverError::NetworkUnreachable {
                url: proxy_url.clone(),
                reason: format!("invalid proxy configuration: {e}"),
            };
            let mut proxy = reqwest::Proxy::all(&proxy_url).map_err(misconfigured)?;
            if let Some(user) = &proxy_settings.user {
                proxy = proxy.basic_auth(user, proxy_settings.password.as_deref().unwrap_or_default());
            }
            debug!("Using proxy {}", proxy_url);
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| WebDriverError::NetworkUnreachable {
            url: String::new(),
            reason: format!("failed to initialise HTTP client: {e}"),
        })?;
        Ok(Network { client })
    }

    /// GET `url`, following up to [`MAX_REDIRECTS`] redirects.
    pub async fn get(&self, url: &str) -> Result<Vec<u8>, WebDriverError> {
        let response = self.send(url).await?;
        let body = response.bytes().await.map_err(|e| classify(url, e))?;
        Ok(body.to_vec())
    }

    /// Where `url` ends up after redirects, e.g. a `/releases/latest` link
    /// resolving to `/releases/tag/v0.34.0`.
    pub async fn get_final_url(&self, url: &str) -> Result<String, WebDriverError> {
        let response = self.send(url).await?;
        Ok(response.url().to_string())
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, WebDriverError> {
        debug!("Getting URL: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        if response.url().as_str() != url {
            debug!("Redirected to URL: {}", response.url());
        }

        let status = response.status();
        if !status.is_success() {
            debug!("Get response: {} from {}", status, url);
            return Err(WebDriverError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    pub async fn get_text(&self, url: &str) -> Result<String, WebDriverError> {
        self.get(url).await.map(|body| decode_text(&body))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, WebDriverError> {
        let body = self.get(url).await?;
        serde_json::from_slice(&body).map_err(|e| WebDriverError::JsonParseError {
            url: url.to_string(),
            source: e,
        })
    }
}

fn classify(url: &str, err: reqwest::Error) -> WebDriverError {
    let reason = if err.is_redirect() {
        "Too many HTTP redirects".to_string()
    } else if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    WebDriverError::NetworkUnreachable {
        url: url.to_string(),
        reason,
    }
}

/// Decodes a text feed. Some feeds (msedgedriver's `LATEST_*` files) are
/// UTF-16 with a byte order mark.
pub fn decode_text(body: &[u8]) -> String {
    let utf16 = |bytes: &[u8], from: fn([u8; 2]) -> u16| {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| from([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    };

    match body {
        [0xFF, 0xFE, rest @ ..] => utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => utf16(rest, u16::from_be_bytes),
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        _ => String::from_utf8_lossy(body).into_owned(),
    }
}
