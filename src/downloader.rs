//! Artifact download, decompression and installation.
//!
//! The archive is always fully downloaded and extracted into a temporary
//! directory next to the final binary before the old binary is touched, so a
//! failed download never leaves the install directory without a driver.

use crate::error::WebDriverError;
use crate::network::Network;
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// Retries after the first failed delete of a locked binary.
pub const DELETE_RETRIES: u32 = 3;
const DELETE_DELAY: Duration = Duration::from_millis(500);

/// Container shapes a driver artifact is published in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    TarBz2,
    /// An uncompressed executable, installed as-is.
    Raw,
}

impl ArchiveFormat {
    /// Detects the format from the artifact name, falling back to magic bytes.
    pub fn detect(name: &str, head: &[u8]) -> Self {
        let name = name.to_ascii_lowercase();
        if name.ends_with(".zip") {
            ArchiveFormat::Zip
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            ArchiveFormat::TarGz
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            ArchiveFormat::TarBz2
        } else if head.starts_with(b"PK\x03\x04") {
            ArchiveFormat::Zip
        } else if head.starts_with(&[0x1f, 0x8b]) {
            ArchiveFormat::TarGz
        } else if head.starts_with(b"BZh") {
            ArchiveFormat::TarBz2
        } else {
            ArchiveFormat::Raw
        }
    }
}

/// Downloads the artifact at `url` and installs the executable it contains
/// as `binary`, replacing whatever was there. Returns `binary`.
pub async fn download_and_install(
    network: &Network,
    url: &str,
    binary: &Path,
) -> Result<PathBuf, WebDriverError> {
    let install_dir = binary.parent().ok_or_else(|| WebDriverError::Install {
        path: binary.to_path_buf(),
        reason: "binary path has no parent directory".to_string(),
    })?;
    let exe_name = binary
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| WebDriverError::Install {
            path: binary.to_path_buf(),
            reason: "binary path has no file name".to_string(),
        })?;

    fs::create_dir_all(install_dir)
        .await
        .map_err(|e| WebDriverError::io(install_dir, e))?;

    // --- 1. Create a temporary directory for the download on the same filesystem.
    let temp_dir = tempfile::Builder::new()
        .prefix(".webdrivers-")
        .tempdir_in(install_dir)
        .map_err(|e| WebDriverError::io(install_dir, e))?;
    let artifact_name = artifact_name(url);
    let archive_path = temp_dir.path().join(&artifact_name);

    // --- 2. Download the artifact to the temporary directory.
    download_file(network, url, &archive_path).await?;
    debug!("Successfully downloaded {}", archive_path.display());

    // --- 3. Decompress it next to the archive.
    let head = read_head(&archive_path).await?;
    let format = ArchiveFormat::detect(&artifact_name, &head);
    let extract_to = temp_dir.path().join("extracted");
    let extracted = extract(&archive_path, format, &extract_to, exe_name).await?;
    debug!("Decompression complete: {}", extracted.display());

    // --- 4. Swap it in.
    install(&extracted, binary).await?;
    debug!("Completed download and processing of {}", binary.display());
    Ok(binary.to_path_buf())
}

/// Downloads a file from a given URL and saves it to a destination path.
pub async fn download_file(network: &Network, url: &str, dest_path: &Path) -> Result<(), WebDriverError> {
    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| WebDriverError::io(parent, e))?;
    }

    let content = network.get(url).await?;
    fs::write(dest_path, &content)
        .await
        .map_err(|e| WebDriverError::io(dest_path, e))
}

/// Extracts `archive` into `extract_to` and returns the path of the
/// executable named `exe_name` inside it.
///
/// The zip, tar and bzip2 readers are synchronous, so the work is wrapped in
/// `spawn_blocking` to avoid blocking the Tokio runtime.
pub async fn extract(
    archive: &Path,
    format: ArchiveFormat,
    extract_to: &Path,
    exe_name: &str,
) -> Result<PathBuf, WebDriverError> {
    debug!("Decompressing {} as {:?}", archive.display(), format);
    if format == ArchiveFormat::Raw {
        debug!("No decompression needed");
        return Ok(archive.to_path_buf());
    }

    let archive_buf = archive.to_path_buf();
    let extract_to_buf = extract_to.to_path_buf();
    let exe_name = exe_name.to_string();

    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&extract_to_buf).map_err(|e| WebDriverError::io(&extract_to_buf, e))?;
        match format {
            ArchiveFormat::Zip => unzip_file(&archive_buf, &extract_to_buf)?,
            ArchiveFormat::TarGz => {
                let file = open(&archive_buf)?;
                untar(GzDecoder::new(file), &archive_buf, &extract_to_buf)?
            }
            ArchiveFormat::TarBz2 => {
                let file = open(&archive_buf)?;
                untar(bzip2::read::BzDecoder::new(file), &archive_buf, &extract_to_buf)?
            }
            ArchiveFormat::Raw => {}
        }
        find_driver_executable(&extract_to_buf, &exe_name)
    })
    .await
    .map_err(|e| WebDriverError::Install {
        path: archive.to_path_buf(),
        reason: format!("extraction task failed: {e}"),
    })?
}

/// Makes `extracted` executable and moves it to `binary`, deleting the
/// previous binary first.
pub async fn install(extracted: &Path, binary: &Path) -> Result<(), WebDriverError> {
    make_executable(extracted).await?;
    delete_with_retry(binary).await?;

    fs::rename(extracted, binary).await.map_err(|e| WebDriverError::Install {
        path: binary.to_path_buf(),
        reason: format!("failed to move {} into place: {e}", extracted.display()),
    })
}

/// Deletes `path`, retrying while the OS reports it as locked (typically a
/// driver process still running on Windows). A missing file is not an error.
pub async fn delete_with_retry(path: &Path) -> Result<(), WebDriverError> {
    delete_retrying(path, |p| std::fs::remove_file(p)).await
}

async fn delete_retrying(
    path: &Path,
    mut remove: impl FnMut(&Path) -> std::io::Result<()>,
) -> Result<(), WebDriverError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        debug!("Deleting {} (attempt {})", path.display(), attempts);
        match remove(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                if attempts > DELETE_RETRIES {
                    return Err(WebDriverError::DeleteLocked {
                        path: path.to_path_buf(),
                        attempts,
                        source: e,
                    });
                }
                tokio::time::sleep(DELETE_DELAY).await;
            }
            Err(e) => return Err(WebDriverError::io(path, e)),
        }
    }
}

fn artifact_name(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("driver-artifact")
        .to_string()
}

async fn read_head(path: &Path) -> Result<Vec<u8>, WebDriverError> {
    use tokio::io::AsyncReadExt;

    let mut file = fs::File::open(path).await.map_err(|e| WebDriverError::io(path, e))?;
    let mut head = vec![0; 4];
    let n = file.read(&mut head).await.map_err(|e| WebDriverError::io(path, e))?;
    head.truncate(n);
    Ok(head)
}

fn open(path: &Path) -> Result<std::fs::File, WebDriverError> {
    std::fs::File::open(path).map_err(|e| WebDriverError::io(path, e))
}

/// Decompresses a .zip archive to a specified directory.
fn unzip_file(archive_path: &Path, extract_to: &Path) -> Result<(), WebDriverError> {
    let zip_error = |e| WebDriverError::ZipError {
        path: archive_path.to_path_buf(),
        source: e,
    };
    let mut archive = zip::ZipArchive::new(open(archive_path)?).map_err(zip_error)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(zip_error)?;

        let outpath = match file.enclosed_name() {
            Some(path) => extract_to.join(path),
            None => continue,
        };

        if file.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| WebDriverError::io(&outpath, e))?;
            continue;
        }

        if let Some(p) = outpath.parent() {
            std::fs::create_dir_all(p).map_err(|e| WebDriverError::io(p, e))?;
        }
        let mut outfile = std::fs::File::create(&outpath).map_err(|e| WebDriverError::io(&outpath, e))?;
        std::io::copy(&mut file, &mut outfile).map_err(|e| WebDriverError::io(&outpath, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))
                    .map_err(|e| WebDriverError::io(&outpath, e))?;
            }
        }
    }
    Ok(())
}

fn untar(reader: impl Read, archive_path: &Path, extract_to: &Path) -> Result<(), WebDriverError> {
    let mut archive = tar::Archive::new(reader);
    archive.unpack(extract_to).map_err(|e| WebDriverError::Install {
        path: archive_path.to_path_buf(),
        reason: format!("corrupt tar archive: {e}"),
    })
}

/// Searches a directory for the driver executable file.
fn find_driver_executable(search_path: &Path, exe_name: &str) -> Result<PathBuf, WebDriverError> {
    WalkDir::new(search_path)
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| entry.file_type().is_file() && entry.file_name().to_str() == Some(exe_name))
        .map(|entry| entry.into_path())
        .ok_or_else(|| WebDriverError::DriverExecutableNotFound {
            path: search_path.to_path_buf(),
        })
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<(), WebDriverError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).await.map_err(|e| WebDriverError::io(path, e))?;
    let mut permissions = metadata.permissions();
    // ugo+rx
    permissions.set_mode(permissions.mode() | 0o555);
    fs::set_permissions(path, permissions)
        .await
        .map_err(|e| WebDriverError::io(path, e))
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<(), WebDriverError> {
    Ok(())
}
