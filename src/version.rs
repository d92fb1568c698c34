//! Dotted version values with numeric, segment-wise ordering.
//!
//! Every version string crossing a boundary (a pin, a feed entry, the output
//! of `chromedriver --version`) is turned into a [`Version`] right away. Parsing
//! never fails: text that is not a dotted list of integers becomes the empty
//! version, which sorts below every concrete version.

use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// An immutable dotted version such as `115.0.5790.170`.
///
/// Missing trailing segments compare as zero, so `2.0 == 2` and `2.9 < 2.10`.
#[derive(Debug, Clone, Default)]
pub struct Version {
    segments: Vec<u64>,
}

impl Version {
    /// The "unset" version. As a requirement it means "take the latest".
    pub const EMPTY: Version = Version {
        segments: Vec::new(),
    };

    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Self::EMPTY;
        }

        trimmed
            .split('.')
            .map(|segment| {
                if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                    None
                } else {
                    segment.parse::<u64>().ok()
                }
            })
            .collect::<Option<Vec<_>>>()
            .map(|segments| Version { segments })
            .unwrap_or_default()
    }

    pub fn from_segments(segments: impl IntoIterator<Item = u64>) -> Self {
        Version {
            segments: segments.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    pub fn major(&self) -> Option<u64> {
        self.segments.first().copied()
    }

    /// Keeps the first `count` segments, e.g. the build version
    /// `73.0.3683` of browser `73.0.3683.75`.
    pub fn truncate(&self, count: usize) -> Version {
        Version {
            segments: self.segments.iter().take(count).copied().collect(),
        }
    }

    /// Whether this version satisfies `requirement`: every segment the
    /// requirement spells out is equal here. An empty requirement matches
    /// anything.
    pub fn matches(&self, requirement: &Version) -> bool {
        if requirement.is_empty() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        requirement
            .segments
            .iter()
            .enumerate()
            .all(|(i, wanted)| self.segment(i) == *wanted)
    }

    fn segment(&self, index: usize) -> u64 {
        self.segments.get(index).copied().unwrap_or(0)
    }

    fn significant(&self) -> &[u64] {
        let len = self
            .segments
            .iter()
            .rposition(|s| *s != 0)
            .map_or(0, |i| i + 1);
        &self.segments[..len]
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => {
                let len = self.segments.len().max(other.segments.len());
                (0..len)
                    .map(|i| self.segment(i).cmp(&other.segment(i)))
                    .find(|ord| ord.is_ne())
                    .unwrap_or(Ordering::Equal)
            }
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.is_empty().hash(state);
        self.significant().hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Version::parse(s))
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Version::parse(s)
    }
}
