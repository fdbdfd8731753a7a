//! Boot files in the TFTP root.
//!
//! Rendered configurations are written per MAC address under the
//! bootloader's config directory, using the pxelinux naming scheme
//! (`<root>/<configPath>/01-aa-bb-cc-dd-ee-ff`). Serving the files over TFTP
//! is left to the TFTP daemon.

use crate::error::BootFileError;
use async_trait::async_trait;
use models::{Bootloader, MacAddress};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Writes and removes per-host boot files.
#[async_trait]
pub trait BootFiles: Send + Sync {
    /// Writes `content` as the boot file of every MAC. On error every file
    /// keeps its previous content.
    async fn write(
        &self,
        bootloader: &Bootloader,
        macs: &[MacAddress],
        content: &str,
    ) -> Result<(), BootFileError>;

    /// Removes the boot files of every MAC. Missing files are not an error.
    async fn clear(&self, bootloader: &Bootloader, macs: &[MacAddress])
    -> Result<(), BootFileError>;
}

/// Boot files stored under a TFTP root directory.
#[derive(Debug, Clone)]
pub struct TftpBootFiles {
    root: PathBuf,
}

impl TftpBootFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a MAC's boot file.
    pub fn path_for(&self, bootloader: &Bootloader, mac: &MacAddress) -> PathBuf {
        self.root
            .join(&bootloader.config_path)
            .join(mac.pxelinux_file_name())
    }
}

fn boot_file_error(path: &Path, source: std::io::Error) -> BootFileError {
    BootFileError {
        path: path.display().to_string(),
        source,
    }
}

/// A boot file written aside, waiting to replace `path`.
struct Staged {
    staging: PathBuf,
    path: PathBuf,
    previous: Option<Vec<u8>>,
}

impl Staged {
    async fn write(path: PathBuf, content: &str) -> Result<Self, BootFileError> {
        let previous = match tokio::fs::read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(boot_file_error(&path, e)),
        };
        let staging = path.with_extension("tmp");
        if let Err(e) = tokio::fs::write(&staging, content).await {
            discard(&staging).await;
            return Err(boot_file_error(&staging, e));
        }
        Ok(Self {
            staging,
            path,
            previous,
        })
    }

    /// Puts back what `path` held before it was replaced.
    async fn restore(&self) {
        let result = match &self.previous {
            Some(bytes) => tokio::fs::write(&self.path, bytes).await,
            None => tokio::fs::remove_file(&self.path).await,
        };
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Failed to restore boot file");
        }
    }
}

async fn discard(staging: &Path) {
    match tokio::fs::remove_file(staging).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %staging.display(), error = %e, "Failed to remove staged boot file"),
    }
}

#[async_trait]
impl BootFiles for TftpBootFiles {
    async fn write(
        &self,
        bootloader: &Bootloader,
        macs: &[MacAddress],
        content: &str,
    ) -> Result<(), BootFileError> {
        let directory = self.root.join(&bootloader.config_path);
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| boot_file_error(&directory, e))?;

        // Every file is staged before any is replaced; renames keep the TFTP
        // daemon from serving half a file
        let mut staged = Vec::with_capacity(macs.len());
        for mac in macs {
            match Staged::write(self.path_for(bootloader, mac), content).await {
                Ok(file) => staged.push(file),
                Err(e) => {
                    for file in &staged {
                        discard(&file.staging).await;
                    }
                    return Err(e);
                }
            }
        }

        for (index, file) in staged.iter().enumerate() {
            if let Err(e) = tokio::fs::rename(&file.staging, &file.path).await {
                for done in &staged[..index] {
                    done.restore().await;
                }
                for pending in &staged[index..] {
                    discard(&pending.staging).await;
                }
                return Err(boot_file_error(&file.path, e));
            }
            debug!(path = %file.path.display(), "Boot file written");
        }
        Ok(())
    }

    async fn clear(
        &self,
        bootloader: &Bootloader,
        macs: &[MacAddress],
    ) -> Result<(), BootFileError> {
        for mac in macs {
            let path = self.path_for(bootloader, mac);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(mac = %mac, path = %path.display(), "Boot file removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(boot_file_error(&path, e)),
            }
        }
        Ok(())
    }
}

/// Used when no TFTP root is configured: assignments only live in the
/// registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBootFiles;

#[async_trait]
impl BootFiles for NoBootFiles {
    async fn write(
        &self,
        _bootloader: &Bootloader,
        _macs: &[MacAddress],
        _content: &str,
    ) -> Result<(), BootFileError> {
        Ok(())
    }

    async fn clear(
        &self,
        _bootloader: &Bootloader,
        _macs: &[MacAddress],
    ) -> Result<(), BootFileError> {
        Ok(())
    }
}
