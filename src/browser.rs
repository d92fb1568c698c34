//! Installed browser discovery and version probing.
//!
//! Browser-coupled driver families need the version of the browser the driver
//! will talk to. The browser is located in standard system locations unless a
//! path is configured, then asked for its version: `--product-version` on
//! Linux, `--version` on macOS and the file's ProductVersion via PowerShell on
//! Windows.

use crate::error::WebDriverError;
use crate::version::Version;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::debug;

static FULL_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\d+\.\d+\.\d+").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Chrome,
    Edge,
}

impl Browser {
    pub fn name(&self) -> &'static str {
        match self {
            Browser::Chrome => "Chrome",
            Browser::Edge => "Edge",
        }
    }
}

/// Gets the version of the specified browser.
///
/// If `path_override` is provided, it is used directly. Otherwise the browser
/// is searched for in standard system locations.
pub async fn browser_version(
    browser: Browser,
    path_override: Option<&Path>,
) -> Result<Version, WebDriverError> {
    let path = match path_override {
        Some(p) => p.to_path_buf(),
        None => find_browser_path(browser).ok_or(WebDriverError::BrowserNotFound)?,
    };
    debug!("{} executable: '{}'", browser.name(), path.display());

    let output = query_version(&path).await?;
    let version = parse_browser_version(&output)?;
    debug!("Current version of {} is {}", browser.name(), version);
    Ok(version)
}

/// Extracts a four-part version, e.g. `Google Chrome 73.0.3683.75` -> `73.0.3683.75`.
pub fn parse_browser_version(output: &str) -> Result<Version, WebDriverError> {
    FULL_VERSION
        .find(output)
        .map(|m| Version::parse(m.as_str()))
        .ok_or_else(|| WebDriverError::BrowserVersionParsingError {
            output: output.trim().to_string(),
        })
}

/// Version of the legacy (EdgeHTML) Microsoft Edge AppX package, e.g.
/// `44.17763.1.0`. Only meaningful on Windows.
pub async fn legacy_edge_version() -> Result<Version, WebDriverError> {
    if !cfg!(target_os = "windows") {
        return Err(WebDriverError::UnsupportedPlatform(
            "legacy Microsoft Edge only exists on Windows".to_string(),
        ));
    }

    let script = "(Get-AppxPackage -Name Microsoft.MicrosoftEdge).Version";
    let output = run(Command::new("powershell").args(["-Command", script]), script).await?;
    let version = Version::parse(&output);
    if version.is_empty() {
        return Err(WebDriverError::VersionResolution(
            "Failed to check Microsoft Edge version".to_string(),
        ));
    }
    debug!("Current version of Microsoft Edge is {}", version);
    Ok(version)
}

async fn run(command: &mut Command, display: &str) -> Result<String, WebDriverError> {
    let output = command
        .output()
        .await
        .map_err(|e| WebDriverError::CommandExecutionError {
            command: display.to_string(),
            source: e,
        })?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn find_browser_path(browser: Browser) -> Option<PathBuf> {
    find_browser_path_system(browser).map(|path| dunce::canonicalize(&path).unwrap_or(path))
}

// --- Platform-Specific Implementations ---

#[cfg(target_os = "windows")]
fn find_browser_path_system(browser: Browser) -> Option<PathBuf> {
    let (sub_paths, exe_name): (&[&str], &str) = match browser {
        Browser::Chrome => (&["Google\\Chrome\\Application", "Chromium\\Application"], "chrome.exe"),
        Browser::Edge => (
            &[
                "Microsoft\\Edge\\Application",
                "Microsoft\\Edge SxS\\Application",
                "Microsoft\\Edge Dev\\Application",
            ],
            "msedge.exe",
        ),
    };
    let roots: Vec<String> = ["LOCALAPPDATA", "ProgramFiles", "ProgramFiles(x86)"]
        .into_iter()
        .filter_map(|var| std::env::var(var).ok())
        .collect();

    sub_paths.iter().find_map(|sub_path| {
        roots
            .iter()
            .map(|root| Path::new(root).join(sub_path).join(exe_name))
            .find(|path| path.exists())
    })
}

#[cfg(target_os = "macos")]
fn find_browser_path_system(browser: Browser) -> Option<PathBuf> {
    let apps: &[&str] = match browser {
        Browser::Chrome => &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ],
        Browser::Edge => &[
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
            "/Applications/Microsoft Edge Dev.app/Contents/MacOS/Microsoft Edge Dev",
            "/Applications/Microsoft Edge Canary.app/Contents/MacOS/Microsoft Edge Canary",
        ],
    };
    let home = dirs::home_dir();

    apps.iter().find_map(|app| {
        let system = PathBuf::from(app);
        let user = home.as_ref().map(|h| h.join(app.trim_start_matches('/')));
        std::iter::once(system)
            .chain(user)
            .find(|path| path.exists())
    })
}

#[cfg(target_os = "linux")]
fn find_browser_path_system(browser: Browser) -> Option<PathBuf> {
    let candidates: &[&str] = match browser {
        Browser::Chrome => &[
            "google-chrome",
            "google-chrome-stable",
            "chrome",
            "chromium",
            "chromium-browser",
        ],
        Browser::Edge => &["microsoft-edge", "microsoft-edge-stable", "microsoft-edge-beta"],
    };
    let directories = [
        "/usr/local/sbin",
        "/usr/local/bin",
        "/usr/sbin",
        "/usr/bin",
        "/sbin",
        "/bin",
        "/opt/google/chrome",
    ];

    candidates
        .iter()
        .find_map(|name| {
            directories
                .iter()
                .map(|dir| Path::new(dir).join(name))
                .find(|path| path.exists())
        })
        .or_else(|| candidates.iter().find_map(|name| which::which(name).ok()))
}

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
fn find_browser_path_system(_browser: Browser) -> Option<PathBuf> {
    None
}

#[cfg(target_os = "windows")]
async fn query_version(path: &Path) -> Result<String, WebDriverError> {
    let script = format!(
        "(Get-ItemProperty '{}').VersionInfo.ProductVersion",
        path.to_string_lossy()
    );
    run(Command::new("powershell").args(["-Command", &script]), &script).await
}

#[cfg(not(target_os = "windows"))]
async fn query_version(path: &Path) -> Result<String, WebDriverError> {
    let flag = if cfg!(target_os = "linux") {
        "--product-version"
    } else {
        "--version"
    };
    run(
        Command::new(path).arg(flag),
        &format!("'{}' {}", path.to_string_lossy(), flag),
    )
    .await
}
