//! Host OS and CPU identification used to pick the right artifact out of a
//! family's published variants.

use crate::error::WebDriverError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Mac,
    Windows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    X86_64,
    Aarch64,
}

/// OS and CPU of the host, computed once and passed around by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Platform { os, arch }
    }

    /// Determines the platform the crate was compiled for.
    pub fn detect() -> Result<Self, WebDriverError> {
        Self::from_consts(std::env::consts::OS, std::env::consts::ARCH)
    }

    fn from_consts(os: &str, arch: &str) -> Result<Self, WebDriverError> {
        let unsupported = || WebDriverError::UnsupportedPlatform(format!("{os}-{arch}"));

        let os = match os {
            "linux" => Os::Linux,
            "macos" => Os::Mac,
            "windows" => Os::Windows,
            _ => return Err(unsupported()),
        };
        let arch = match arch {
            "x86" => Arch::X86,
            "x86_64" => Arch::X86_64,
            "aarch64" => Arch::Aarch64,
            _ => return Err(unsupported()),
        };
        Ok(Platform { os, arch })
    }

    pub fn is_windows(&self) -> bool {
        self.os == Os::Windows
    }

    /// Normalized tag, e.g. `linux64`, `mac-arm64` or `win32`.
    pub fn tag(&self) -> &'static str {
        match (self.os, self.arch) {
            (Os::Linux, Arch::X86) => "linux32",
            (Os::Linux, Arch::X86_64) => "linux64",
            (Os::Linux, Arch::Aarch64) => "linux-arm64",
            (Os::Mac, Arch::Aarch64) => "mac-arm64",
            (Os::Mac, _) => "mac-x64",
            (Os::Windows, Arch::X86) => "win32",
            (Os::Windows, Arch::X86_64) => "win64",
            (Os::Windows, Arch::Aarch64) => "win-arm64",
        }
    }

    /// Executable name for `stem` on this platform.
    pub fn executable(&self, stem: &str) -> String {
        if self.is_windows() {
            format!("{stem}.exe")
        } else {
            stem.to_string()
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
