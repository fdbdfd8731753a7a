//! Background watchers.
//!
//! Reloads the configuration file when SIGHUP arrives and refreshes cached
//! power states on a fixed interval.

use crate::error::ControllerError;
use pxe_server::{AppConfig, PxeServer, ReloadSummary};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub struct Watcher {
    server: Arc<PxeServer>,
    config_path: PathBuf,
}

impl Watcher {
    pub fn new(server: Arc<PxeServer>, config_path: PathBuf) -> Self {
        Self {
            server,
            config_path,
        }
    }

    /// Re-reads the configuration file and applies it.
    pub async fn reload(&self) -> Result<ReloadSummary, ControllerError> {
        let config = AppConfig::load(&self.config_path).await?;
        Ok(self.server.reload(config).await?)
    }

    /// Reloads on every SIGHUP. A failed reload keeps the running
    /// configuration.
    #[cfg(unix)]
    pub async fn watch_reload_signal(&self) -> Result<(), ControllerError> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut hangup = signal(SignalKind::hangup())?;
        info!("Starting reload watcher");
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading {}", self.config_path.display());
            match self.reload().await {
                Ok(summary) if !summary.rejected.is_empty() => {
                    warn!("Reload rejected hosts: {:?}", summary.rejected);
                }
                Ok(_) => {}
                Err(e) => error!("Reload failed, keeping the running configuration: {}", e),
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub async fn watch_reload_signal(&self) -> Result<(), ControllerError> {
        std::future::pending::<()>().await;
        Ok(())
    }

    /// Refreshes power states every `period`, starting immediately.
    pub async fn refresh_periodically(&self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = self.server.refresh_all().await;
            debug!(
                refreshed = report.refreshed.len(),
                failed = report.failed.len(),
                "Periodic refresh done"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INITIAL: &str = r#"
bootloaders:
  - { name: pxelinux, file: pxelinux.0, configPath: pxelinux.cfg }
configurations:
  - { name: prod, bootloader: pxelinux, file: prod.cfg }
  - { name: rescue, bootloader: pxelinux, content: "DEFAULT rescue" }
hosts:
  - { name: node1, macAddresses: ["aa:bb:cc:dd:ee:01"] }
"#;

    const UPDATED: &str = r#"
bootloaders:
  - { name: pxelinux, file: pxelinux.0, configPath: pxelinux.cfg }
configurations:
  - { name: prod, bootloader: pxelinux, file: prod.cfg }
hosts:
  - { name: node1, macAddresses: ["aa:bb:cc:dd:ee:01"] }
  - { name: node2, macAddresses: ["aa:bb:cc:dd:ee:02"] }
"#;

    async fn watcher(dir: &tempfile::TempDir) -> Watcher {
        std::fs::write(dir.path().join("prod.cfg"), "DEFAULT prod").unwrap();
        let path = dir.path().join("pxe-pilot.yml");
        std::fs::write(&path, INITIAL).unwrap();
        let config = AppConfig::load(&path).await.unwrap();
        let server = Arc::new(PxeServer::from_config(config).await.unwrap());
        Watcher::new(server, path)
    }

    #[tokio::test]
    async fn test_reload_applies_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = watcher(&dir).await;
        watcher
            .server
            .registry()
            .set_configuration("node1", Some("rescue".to_string()))
            .await
            .unwrap();

        std::fs::write(&watcher.config_path, UPDATED).unwrap();
        let summary = watcher.reload().await.unwrap();

        assert_eq!(summary.unassigned, ["node1"]);
        assert_eq!(summary.hosts, 2);
        assert_eq!(watcher.server.registry().names().await, ["node1", "node2"]);
    }

    #[tokio::test]
    async fn test_broken_file_keeps_running_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = watcher(&dir).await;

        std::fs::write(&watcher.config_path, "configurations: [").unwrap();
        assert!(watcher.reload().await.is_err());

        let catalog = watcher.server.orchestrator().catalog().snapshot();
        assert!(catalog.resolve("rescue").is_some());
    }
}
