//! Driver families and the registry that maps a family name to its strategy.

pub mod chromedriver;
pub mod edgedriver;
pub mod geckodriver;
pub mod iedriver;
pub mod mswebdriver;
pub mod phantomjs;

use crate::config::Settings;
use crate::error::WebDriverError;
use crate::network::Network;
use crate::version::Version;
use crate::WebDriverManager;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

pub use chromedriver::ChromeDriver;
pub use edgedriver::EdgeDriver;
pub use geckodriver::GeckoDriver;
pub use iedriver::IeDriver;
pub use mswebdriver::MsWebDriver;
pub use phantomjs::PhantomJs;

/// Available releases of one family for the current platform, version -> artifact URL.
pub type ReleaseIndex = BTreeMap<Version, String>;

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

static DOTTED_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\d+(\.\d+)?(\.\d+)?").expect("valid regex"));

/// The closed set of supported driver families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Chromedriver,
    Edgedriver,
    Geckodriver,
    Iedriver,
    Mswebdriver,
    Phantomjs,
}

impl Family {
    pub const ALL: [Family; 6] = [
        Family::Chromedriver,
        Family::Edgedriver,
        Family::Geckodriver,
        Family::Iedriver,
        Family::Mswebdriver,
        Family::Phantomjs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Family::Chromedriver => "chromedriver",
            Family::Edgedriver => "msedgedriver",
            Family::Geckodriver => "geckodriver",
            Family::Iedriver => "iedriver",
            Family::Mswebdriver => "mswebdriver",
            Family::Phantomjs => "phantomjs",
        }
    }

    /// Builds the strategy for this family.
    pub fn manager(self, settings: &Settings, network: &Network) -> Box<dyn WebDriverManager> {
        let network = network.clone();
        match self {
            Family::Chromedriver => Box::new(ChromeDriver::new(settings, network)),
            Family::Edgedriver => Box::new(EdgeDriver::new(settings, network)),
            Family::Geckodriver => Box::new(GeckoDriver::new(settings, network)),
            Family::Iedriver => Box::new(IeDriver::new(settings, network)),
            Family::Mswebdriver => Box::new(MsWebDriver::new(settings)),
            Family::Phantomjs => Box::new(PhantomJs::new(settings, network)),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Family {
    type Err = WebDriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromedriver" => Ok(Family::Chromedriver),
            "edge" | "edgedriver" | "msedgedriver" => Ok(Family::Edgedriver),
            "firefox" | "gecko" | "geckodriver" => Ok(Family::Geckodriver),
            "ie" | "iedriver" | "iedriverserver" => Ok(Family::Iedriver),
            "mswebdriver" | "microsoftwebdriver" => Ok(Family::Mswebdriver),
            "phantomjs" | "phantom" => Ok(Family::Phantomjs),
            other => Err(WebDriverError::Config(format!(
                "unknown driver '{other}'; expected one of: {}",
                Family::ALL.map(|f| f.name()).join(", ")
            ))),
        }
    }
}

/// Runs `binary --version` and returns its stdout, or `None` when the binary
/// is missing, fails, or hangs.
pub(crate) async fn probe_version_output(binary: &Path) -> Option<String> {
    let mut command = tokio::process::Command::new(binary);
    command.arg("--version").kill_on_drop(true);

    let output = match tokio::time::timeout(VERSION_PROBE_TIMEOUT, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!("Failed to run {} --version: {}", binary.display(), e);
            return None;
        }
        Err(_) => {
            debug!("{} --version did not answer in {:?}", binary.display(), VERSION_PROBE_TIMEOUT);
            return None;
        }
    };
    if !output.status.success() {
        debug!("{} --version exited with {}", binary.display(), output.status);
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    debug!("Current {} version: {}", binary.display(), stdout.trim());
    Some(stdout)
}

/// First dotted version in `output`: matches 2.46, 2.46.628411 and 73.0.3683.75.
pub(crate) fn first_dotted_version(output: &str) -> Version {
    DOTTED_VERSION
        .find(output)
        .map(|m| Version::parse(m.as_str()))
        .unwrap_or_default()
}

/// Text of every `<tag>...</tag>` element of an XML bucket listing.
pub(crate) fn xml_elements(xml: &str, tag: &str) -> Vec<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut values = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else { break };
        values.push(decode_entities(after[..end].trim()));
        rest = &after[end + close.len()..];
    }
    values
}

/// Replaces the predefined XML entities (`&amp;`, `&lt;`, `&gt;`, `&quot;`, `&apos;`).
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    // &amp; last, so "&amp;lt;" stays "&lt;"
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Highest version of a release index, the "latest" of max-of-index families.
pub(crate) fn latest_release(
    index: &ReleaseIndex,
    driver: &str,
    feed_url: &str,
    platform: &str,
) -> Result<Version, WebDriverError> {
    index.keys().next_back().cloned().ok_or_else(|| {
        WebDriverError::VersionResolution(format!(
            "No {driver} releases for platform {platform} were found at {feed_url}; \
             pin a known version with `--required-version <version>`"
        ))
    })
}

/// The error raised by browser-coupled families when no driver is published
/// for the browser's build. `latest` is the family's newest release, looked up
/// to tell a pre-release browser apart from an unknown version.
pub(crate) fn missing_point_release(
    driver: &str,
    browser: &str,
    build: &Version,
    latest: Result<Version, WebDriverError>,
    index_url: &str,
) -> WebDriverError {
    let mut msg = format!("Unable to find latest point release version for {build}.");
    match latest {
        Ok(latest) if *build > latest => {
            msg.push_str(&format!(" You appear to be using a non-production version of {browser}."));
        }
        Ok(_) => {}
        Err(e) if e.is_network_unreachable() => {
            msg.push_str(&format!(
                " A network issue is preventing determination of latest {driver} release."
            ));
        }
        Err(e) => {
            debug!("Failed to look up latest {} release: {}", driver, e);
        }
    }
    msg.push_str(&format!(
        " Please pin a known {driver} version with `--required-version <version>` \
         (or `Updater::with_required_version`): {index_url}"
    ));
    debug!("{}", msg);
    WebDriverError::VersionResolution(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_names_round_trip() {
        for family in Family::ALL {
            assert_eq!(family.name().parse::<Family>().unwrap(), family);
        }
        assert_eq!("Chrome".parse::<Family>().unwrap(), Family::Chromedriver);
        assert_eq!("edgedriver".parse::<Family>().unwrap(), Family::Edgedriver);
        assert!(matches!("phantomjs".parse::<Family>(), Err(WebDriverError::Config(_))));
    }

    #[test]
    fn test_xml_elements() {
        let xml = "<ListBucketResult><Contents><Key>2.9/IEDriverServer_Win32_2.9.0.zip</Key></Contents>\
                   <Contents><Key> 3.4/IEDriverServer_x64_3.4.0.zip </Key></Contents><Key>unterminated";
        assert_eq!(
            xml_elements(xml, "Key"),
            vec!["2.9/IEDriverServer_Win32_2.9.0.zip", "3.4/IEDriverServer_x64_3.4.0.zip"]
        );
        assert!(xml_elements(xml, "Name").is_empty());
    }

    #[test]
    fn test_xml_elements_decode_entities() {
        let xml = "<Key>3.150/IEDriverServer_x64_3.150.1.zip?a=1&amp;b=2</Key>\
                   <Key>&lt;odd&gt; &quot;name&quot; &apos;q&apos; &amp;lt;</Key>";
        assert_eq!(
            xml_elements(xml, "Key"),
            vec!["3.150/IEDriverServer_x64_3.150.1.zip?a=1&b=2", "<odd> \"name\" 'q' &lt;"]
        );
    }

    #[test]
    fn test_first_dotted_version() {
        assert_eq!(
            first_dotted_version("ChromeDriver 2.46.628411 (3324f4c8be9ff2f70a05a30ebc72ffb013e1a71e)"),
            Version::parse("2.46.628411")
        );
        assert_eq!(first_dotted_version("ChromeDriver 73.0.3683.75 (abc)"), Version::parse("73.0.3683.75"));
        assert!(first_dotted_version("no version").is_empty());
    }

    #[test]
    fn test_latest_release_is_max_key() {
        let index: ReleaseIndex = [("1.0", "urlA"), ("1.10", "urlC"), ("1.9", "urlB")]
            .into_iter()
            .map(|(v, u)| (Version::parse(v), u.to_string()))
            .collect();
        assert_eq!(latest_release(&index, "d", "f", "p").unwrap(), Version::parse("1.10"));
        assert!(latest_release(&ReleaseIndex::new(), "d", "f", "p").is_err());
    }

    #[test]
    fn test_missing_point_release_messages() {
        let build = Version::parse("100.0.0");
        let pre = missing_point_release("chromedriver", "Chrome", &build, Ok(Version::parse("99.0.1")), "url");
        assert!(pre.to_string().contains("non-production version of Chrome"));

        let unknown = missing_point_release(
            "chromedriver",
            "Chrome",
            &Version::parse("72.0.9999"),
            Ok(Version::parse("99.0.1")),
            "url",
        );
        assert!(!unknown.to_string().contains("non-production"));
        assert!(unknown.to_string().contains("--required-version"));

        let offline = missing_point_release(
            "msedgedriver",
            "Edge",
            &build,
            Err(WebDriverError::NetworkUnreachable { url: "u".into(), reason: "r".into() }),
            "url",
        );
        assert!(offline.to_string().contains("network issue"));
    }
}
