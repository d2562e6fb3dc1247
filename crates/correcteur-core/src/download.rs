use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::feed::ReleaseRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
}

impl DownloadProgress {
    /// Completion percentage, or `None` when the size is unknown.
    #[must_use]
    pub fn percent(&self) -> Option<u8> {
        let total = self.total.filter(|total| *total > 0)?;
        let percent = self.downloaded.saturating_mul(100) / total;
        Some(u8::try_from(percent.min(100)).unwrap_or(100))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    RestartRequired,
    ExitForInstaller,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("download failed with HTTP {status}")]
    Status { status: reqwest::StatusCode },
    #[error("release {tag} has no installer for this platform")]
    NoInstaller { tag: String },
    #[error("checksum mismatch for {asset}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        asset: String,
        expected: String,
        actual: String,
    },
    #[error("{context}: {details}")]
    Platform {
        context: &'static str,
        details: String,
    },
}

impl DownloadError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    fn http(context: &'static str, source: reqwest::Error) -> Self {
        Self::Http { context, source }
    }

    fn platform(context: &'static str, details: impl Into<String>) -> Self {
        Self::Platform {
            context,
            details: details.into(),
        }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }
}

/// Fetches the packaged installer of a release, reporting progress on `progress`.
#[async_trait]
pub trait ArtifactDownloader: Send + Sync {
    async fn download(
        &self,
        release: &ReleaseRecord,
        progress: mpsc::Sender<DownloadProgress>,
    ) -> Result<PathBuf, DownloadError>;
}

/// Hands a downloaded installer over to the operating system.
pub trait Installer: Send + Sync {
    /// # Errors
    /// Returns an error when the installer cannot be launched or applied.
    fn install(&self, artifact: &Path) -> Result<ApplyResult, DownloadError>;
}

pub struct HttpArtifactDownloader {
    client: reqwest::Client,
    download_dir: PathBuf,
}

impl HttpArtifactDownloader {
    #[must_use]
    pub fn new(client: reqwest::Client, download_dir: PathBuf) -> Self {
        Self {
            client,
            download_dir,
        }
    }
}

#[async_trait]
impl ArtifactDownloader for HttpArtifactDownloader {
    async fn download(
        &self,
        release: &ReleaseRecord,
        progress: mpsc::Sender<DownloadProgress>,
    ) -> Result<PathBuf, DownloadError> {
        let asset = release.asset.as_ref().ok_or_else(|| DownloadError::NoInstaller {
            tag: release.tag.clone(),
        })?;

        std::fs::create_dir_all(&self.download_dir)
            .map_err(|error| DownloadError::io("failed to create download directory", error))?;
        let temp_dir = tempfile::tempdir_in(&self.download_dir)
            .map_err(|error| DownloadError::io("failed to create temp directory", error))?;

        let file_name = sanitized_file_name(&asset.name);
        let staging_path = temp_dir.path().join(file_name);

        info!("Downloading update {} from {}", release.tag, asset.url);
        download_file(&self.client, &asset.url, &staging_path, &progress).await?;

        match &asset.sha256 {
            Some(expected) => verify_checksum(&staging_path, &asset.name, expected)?,
            None => warn!("Release {} publishes no digest for {}", release.tag, asset.name),
        }

        let final_path = self.download_dir.join(file_name);
        if final_path.exists() {
            std::fs::remove_file(&final_path).map_err(|error| {
                DownloadError::io_with_path("failed to remove previous download", &final_path, &error)
            })?;
        }
        std::fs::rename(&staging_path, &final_path).map_err(|error| {
            DownloadError::io_with_path("failed to move download into place", &final_path, &error)
        })?;

        Ok(final_path)
    }
}

fn sanitized_file_name(raw: &str) -> &str {
    let raw_name = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    Path::new(raw_name)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && !name.contains(".."))
        .unwrap_or("update-download")
}

async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    progress: &mpsc::Sender<DownloadProgress>,
) -> Result<(), DownloadError> {
    use futures_util::StreamExt;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|error| DownloadError::http("download request failed", error))?;

    if !response.status().is_success() {
        return Err(DownloadError::Status {
            status: response.status(),
        });
    }

    let total = response.content_length();
    let mut downloaded: u64 = 0;

    let mut file = tokio::fs::File::create(dest).await.map_err(|error| {
        DownloadError::io_with_path("failed to create download file", dest, &error)
    })?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| DownloadError::http("download stream error", error))?;
        file.write_all(&chunk).await.map_err(|error| {
            DownloadError::io_with_path("failed to write download data", dest, &error)
        })?;
        downloaded += chunk.len() as u64;
        let _ = progress.send(DownloadProgress { downloaded, total }).await;
    }

    file.flush().await.map_err(|error| {
        DownloadError::io_with_path("failed to flush download file", dest, &error)
    })?;

    info!("Download complete: {downloaded} bytes");
    Ok(())
}

fn verify_checksum(path: &Path, asset_name: &str, expected: &str) -> Result<(), DownloadError> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        info!("Update checksum verified for {asset_name}");
        Ok(())
    } else {
        Err(DownloadError::ChecksumMismatch {
            asset: asset_name.to_string(),
            expected: expected.to_ascii_lowercase(),
            actual,
        })
    }
}

fn sha256_file(path: &Path) -> Result<String, DownloadError> {
    let mut file = std::fs::File::open(path).map_err(|error| {
        DownloadError::io_with_path("failed to open file for checksum", path, &error)
    })?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file.read(&mut buffer).map_err(|error| {
            DownloadError::io_with_path("failed to read file for checksum", path, &error)
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformInstaller;

impl Installer for PlatformInstaller {
    fn install(&self, artifact: &Path) -> Result<ApplyResult, DownloadError> {
        let extension = artifact
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        info!("Installing update from {}", artifact.display());
        match extension.as_str() {
            "msi" => apply_msi(artifact),
            "exe" => launch_executable(artifact),
            "appimage" => replace_appimage(artifact),
            _ => {
                open::that(artifact)
                    .map_err(|error| DownloadError::io("failed to open installer", error))?;
                Ok(ApplyResult::ExitForInstaller)
            }
        }
    }
}

#[cfg(target_os = "windows")]
fn apply_msi(msi_path: &Path) -> Result<ApplyResult, DownloadError> {
    info!("Launching MSI installer: {}", msi_path.display());
    std::process::Command::new("msiexec")
        .args(["/i", &msi_path.to_string_lossy(), "/passive"])
        .spawn()
        .map_err(|error| DownloadError::io("failed to launch MSI installer", error))?;

    Ok(ApplyResult::ExitForInstaller)
}

#[cfg(not(target_os = "windows"))]
fn apply_msi(_msi_path: &Path) -> Result<ApplyResult, DownloadError> {
    Err(DownloadError::platform(
        "unsupported installer",
        "MSI installation is only supported on Windows",
    ))
}

#[cfg(target_os = "windows")]
fn launch_executable(installer: &Path) -> Result<ApplyResult, DownloadError> {
    std::process::Command::new(installer)
        .spawn()
        .map_err(|error| DownloadError::io("failed to launch installer", error))?;
    Ok(ApplyResult::ExitForInstaller)
}

#[cfg(not(target_os = "windows"))]
fn launch_executable(_installer: &Path) -> Result<ApplyResult, DownloadError> {
    Err(DownloadError::platform(
        "unsupported installer",
        "EXE installers are only supported on Windows",
    ))
}

#[cfg(target_os = "linux")]
fn replace_appimage(new_image: &Path) -> Result<ApplyResult, DownloadError> {
    use std::os::unix::fs::PermissionsExt;

    // A running AppImage executes from a read-only mount; the file to replace
    // is the one named by $APPIMAGE.
    if let Some(target) = std::env::var_os("APPIMAGE").map(PathBuf::from) {
        let staged = target.with_extension("new");
        std::fs::copy(new_image, &staged).map_err(|error| {
            DownloadError::io_with_path("failed to stage new AppImage", &staged, &error)
        })?;
        std::fs::set_permissions(&staged, std::fs::Permissions::from_mode(0o755)).map_err(
            |error| DownloadError::io_with_path("failed to mark AppImage executable", &staged, &error),
        )?;
        std::fs::rename(&staged, &target).map_err(|error| {
            DownloadError::io_with_path("failed to replace AppImage", &target, &error)
        })?;
        info!("AppImage replaced at {}", target.display());
        return Ok(ApplyResult::RestartRequired);
    }

    let _ = std::fs::set_permissions(new_image, std::fs::Permissions::from_mode(0o755));
    info!("Replacing binary via self-replace");
    self_replace::self_replace(new_image)
        .map_err(|error| DownloadError::io("failed to replace binary", error))?;
    Ok(ApplyResult::RestartRequired)
}

#[cfg(not(target_os = "linux"))]
fn replace_appimage(_new_image: &Path) -> Result<ApplyResult, DownloadError> {
    Err(DownloadError::platform(
        "unsupported installer",
        "AppImage updates are only supported on Linux",
    ))
}

/// Relaunch the running application with `args` after an in-place update.
///
/// # Errors
/// Returns an error if the executable path cannot be resolved or a new
/// process cannot be spawned.
pub fn restart_app<I, S>(args: I) -> Result<(), DownloadError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    #[cfg(target_os = "linux")]
    if let Some(appimage) = std::env::var_os("APPIMAGE") {
        info!("Restarting AppImage: {}", appimage.to_string_lossy());
        std::process::Command::new(appimage)
            .args(args)
            .spawn()
            .map_err(|error| DownloadError::io("failed to restart app", error))?;
        return Ok(());
    }

    let exe = std::env::current_exe()
        .map_err(|error| DownloadError::io("failed to get current executable", error))?;

    // After self_replace, /proc/self/exe points at the deleted inode.
    #[cfg(target_os = "linux")]
    let exe = {
        let path_str = exe.to_string_lossy();
        if path_str.ends_with(" (deleted)") {
            let fixed = PathBuf::from(path_str.trim_end_matches(" (deleted)"));
            info!("Adjusted exe path from deleted inode: {}", fixed.display());
            fixed
        } else {
            exe
        }
    };

    info!("Restarting from: {}", exe.display());
    std::process::Command::new(&exe)
        .args(args)
        .spawn()
        .map_err(|error| DownloadError::io("failed to restart app", error))?;
    Ok(())
}

/// Remove temp directories left behind by interrupted downloads.
pub fn cleanup_stale_downloads(download_dir: &Path) {
    let Ok(entries) = std::fs::read_dir(download_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() && entry.file_name().to_string_lossy().starts_with(".tmp") {
            debug!("Cleaning up update temp dir: {}", path.display());
            let _ = std::fs::remove_dir_all(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_clamped_and_unknown_without_total() {
        let progress = |downloaded, total| DownloadProgress { downloaded, total };

        assert_eq!(progress(50, Some(200)).percent(), Some(25));
        assert_eq!(progress(200, Some(200)).percent(), Some(100));
        assert_eq!(progress(300, Some(200)).percent(), Some(100));
        assert_eq!(progress(10, None).percent(), None);
        assert_eq!(progress(10, Some(0)).percent(), None);
    }

    #[test]
    fn sha256_file_returns_known_digest() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let file_path = temp.path().join("payload.bin");
        std::fs::write(&file_path, b"abc").expect("payload file should be written");

        let digest = sha256_file(&file_path).expect("checksum should be computed");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn verify_checksum_rejects_mismatch() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let file_path = temp.path().join("Correcteur-1.3.0.AppImage");
        std::fs::write(&file_path, b"abc").expect("payload file should be written");

        assert!(
            verify_checksum(
                &file_path,
                "Correcteur-1.3.0.AppImage",
                "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"
            )
            .is_ok()
        );
        let result = verify_checksum(
            &file_path,
            "Correcteur-1.3.0.AppImage",
            "0000000000000000000000000000000000000000000000000000000000000000",
        );
        assert!(matches!(result, Err(DownloadError::ChecksumMismatch { .. })));
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitized_file_name("Correcteur-Setup.exe"), "Correcteur-Setup.exe");
        assert_eq!(sanitized_file_name("nested/dir/app.dmg"), "app.dmg");
        assert_eq!(sanitized_file_name(".."), "update-download");
        assert_eq!(sanitized_file_name(""), "update-download");
    }

    #[test]
    fn cleanup_removes_only_temp_dirs() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let stale = temp.path().join(".tmpAbC123");
        let keep = temp.path().join("Correcteur-1.3.0.AppImage");
        std::fs::create_dir_all(&stale).expect("stale dir should be created");
        std::fs::write(&keep, b"image").expect("download should be written");

        cleanup_stale_downloads(temp.path());

        assert!(!stale.exists());
        assert!(keep.exists());
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn windows_installers_report_unsupported_elsewhere() {
        let result = PlatformInstaller.install(Path::new("/tmp/update.msi"));
        assert!(matches!(
            result,
            Err(DownloadError::Platform { ref details, .. })
                if details == "MSI installation is only supported on Windows"
        ));
        let result = PlatformInstaller.install(Path::new("/tmp/Correcteur-Setup.EXE"));
        assert!(matches!(result, Err(DownloadError::Platform { .. })));
    }

    #[tokio::test]
    async fn release_without_installer_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let downloader =
            HttpArtifactDownloader::new(reqwest::Client::new(), temp.path().to_path_buf());
        let release = ReleaseRecord {
            tag: "v1.3.0".to_string(),
            name: "v1.3.0".to_string(),
            published_at: None,
            prerelease: false,
            notes: String::new(),
            html_url: "https://github.com/acme/correcteur/releases/v1.3.0".to_string(),
            download_url: "https://github.com/acme/correcteur/releases/v1.3.0".to_string(),
            asset: None,
        };
        let (tx, _rx) = mpsc::channel(1);

        let result = downloader.download(&release, tx).await;

        assert!(matches!(result, Err(DownloadError::NoInstaller { ref tag }) if tag == "v1.3.0"));
    }
}
