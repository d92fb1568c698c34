use thiserror::Error;
use std::path::PathBuf;

/// Error type for all possible failures in the library.
#[derive(Error, Debug)]
pub enum WebDriverError {
    #[error("Can not reach {url}: {reason}")]
    NetworkUnreachable {
        url: String,
        reason: String,
    },

    #[error("Request to {url} failed with HTTP status {status}")]
    HttpStatus {
        url: String,
        status: u16,
    },

    #[error("{0}")]
    VersionResolution(String),

    #[error("Failed to execute command '{command}': {source}")]
    CommandExecutionError {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Browser not found. Please specify the path manually or ensure it's in a standard location.")]
    BrowserNotFound,

    #[error("Failed to parse browser version from output: '{output}'")]
    BrowserVersionParsingError {
        output: String,
    },

    #[error("Failed to parse JSON response from '{url}': {source}")]
    JsonParseError {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected content at '{url}': {reason}")]
    FeedParse {
        url: String,
        reason: String,
    },

    #[error("Could not find a download URL for driver version {driver_version} on platform {platform}")]
    DriverUrlNotFound {
        driver_version: String,
        platform: String,
    },

    #[error("I/O error accessing path '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decompress zip file '{path}': {source}")]
    ZipError {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Driver executable not found in the downloaded archive at '{path}'")]
    DriverExecutableNotFound {
        path: PathBuf,
    },

    #[error("Failed to install driver at '{path}': {reason}")]
    Install {
        path: PathBuf,
        reason: String,
    },

    #[error("Unable to delete '{path}' after {attempts} attempts; is the driver still running? {source}")]
    DeleteLocked {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl WebDriverError {
    /// True when the failure means "offline", as opposed to a reachable feed
    /// that answered with something unusable.
    pub fn is_network_unreachable(&self) -> bool {
        matches!(self, WebDriverError::NetworkUnreachable { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WebDriverError::IoError {
            path: path.into(),
            source,
        }
    }
}
