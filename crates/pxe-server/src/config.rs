//! Daemon configuration file.
//!
//! A single YAML document declares the server settings, the boot catalog and
//! the statically known hosts. Relative paths are resolved against the
//! directory holding the file.

use crate::catalog::Catalog;
use crate::error::PxeError;
use models::{Bootloader, Configuration, HostIdentity, MacAddress, ManagementEndpoint};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_PORT: u16 = 3478;
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tftp: Option<TftpConfig>,
    #[serde(default)]
    pub configuration: ConfigurationSource,
    #[serde(default)]
    pub bootloaders: Vec<Bootloader>,
    #[serde(default)]
    pub configurations: Vec<ConfigurationEntry>,
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub port: u16,
    /// Required in the `x-api-key` header when set
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Upper bound on concurrent backend calls
    pub max_concurrency: usize,
    pub backend_timeout_secs: u64,
    /// Periodic power state refresh; disabled when unset
    pub refresh_interval_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            api_key: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            backend_timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
            refresh_interval_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TftpConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationSource {
    /// Directory holding the configuration files
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// A configuration whose content is either inline or read from a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationEntry {
    pub name: String,
    pub bootloader: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostEntry {
    pub name: String,
    pub mac_addresses: Vec<String>,
    #[serde(default)]
    pub ipmi: Option<IpmiEntry>,
    #[serde(default)]
    pub management: Option<AgentEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpmiEntry {
    pub mac_address: String,
    pub hostname: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub interface: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEntry {
    pub mac_address: String,
    pub ip_address: String,
}

impl HostEntry {
    /// Identity and management endpoint of the declared host.
    pub fn to_parts(&self) -> Result<(HostIdentity, ManagementEndpoint), PxeError> {
        let macs = self
            .mac_addresses
            .iter()
            .map(|m| MacAddress::parse(m))
            .collect::<Result<Vec<_>, _>>()?;
        let identity = HostIdentity::new(&self.name, macs)?;

        let management = match (&self.ipmi, &self.management) {
            (Some(_), Some(_)) => {
                return Err(PxeError::Configuration(format!(
                    "host {} declares both ipmi and management",
                    self.name
                )));
            }
            (Some(ipmi), None) => ManagementEndpoint::VendorRemote {
                mac_address: MacAddress::parse(&ipmi.mac_address)?,
                address: ipmi.hostname.clone(),
                username: ipmi.username.clone(),
                password: ipmi.password.clone(),
                interface: ipmi.interface.clone(),
            },
            (None, Some(agent)) => ManagementEndpoint::GenericAgent {
                mac_address: MacAddress::parse(&agent.mac_address)?,
                address: agent.ip_address.clone(),
            },
            (None, None) => ManagementEndpoint::None,
        };

        Ok((identity, management))
    }
}

impl AppConfig {
    /// Parses and validates a configuration document.
    pub fn from_yaml(text: &str) -> Result<Self, PxeError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the file at `path`, resolving relative paths against its
    /// directory.
    pub async fn load(path: &Path) -> Result<Self, PxeError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            PxeError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_yaml(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_relative(base);
        }
        debug!(path = %path.display(), hosts = config.hosts.len(), "Configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<(), PxeError> {
        if self.server.max_concurrency == 0 {
            return Err(PxeError::Configuration(
                "server.maxConcurrency must be at least 1".to_string(),
            ));
        }
        if self.server.backend_timeout_secs == 0 {
            return Err(PxeError::Configuration(
                "server.backendTimeoutSecs must be at least 1".to_string(),
            ));
        }
        if self.server.refresh_interval_secs == Some(0) {
            return Err(PxeError::Configuration(
                "server.refreshIntervalSecs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Makes the configuration directory and TFTP root absolute. Without a
    /// configuration directory, configuration files are looked up in `base`.
    pub fn resolve_relative(&mut self, base: &Path) {
        match self.configuration.directory.as_mut() {
            Some(directory) if directory.is_relative() => *directory = base.join(&*directory),
            Some(_) => {}
            None => self.configuration.directory = Some(base.to_path_buf()),
        }
        if let Some(tftp) = self.tftp.as_mut() {
            if tftp.root.is_relative() {
                tftp.root = base.join(&tftp.root);
            }
        }
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.server.backend_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.server.refresh_interval_secs.map(Duration::from_secs)
    }

    /// Identities and endpoints of every declared host, rejecting MAC
    /// addresses declared by two entries.
    pub fn host_parts(
        &self,
    ) -> Result<Vec<(String, HostIdentity, ManagementEndpoint)>, PxeError> {
        let mut parts: Vec<(String, HostIdentity, ManagementEndpoint)> =
            Vec::with_capacity(self.hosts.len());
        for entry in &self.hosts {
            let (identity, management) = entry.to_parts()?;
            if let Some((other, _, _)) = parts.iter().find(|(_, i, _)| i.overlaps(&identity)) {
                return Err(PxeError::Configuration(format!(
                    "hosts {other} and {} share a MAC address",
                    entry.name
                )));
            }
            parts.push((entry.name.clone(), identity, management));
        }
        Ok(parts)
    }

    /// Builds the boot catalog, reading file-backed configurations.
    pub async fn build_catalog(&self) -> Result<Catalog, PxeError> {
        let mut configurations = Vec::with_capacity(self.configurations.len());
        for entry in &self.configurations {
            let content = match (&entry.content, &entry.file) {
                (Some(content), None) => content.clone(),
                (None, Some(file)) => {
                    let path = match &self.configuration.directory {
                        Some(directory) => directory.join(file),
                        None => file.clone(),
                    };
                    tokio::fs::read_to_string(&path).await.map_err(|e| {
                        PxeError::Configuration(format!(
                            "configuration {}: failed to read {}: {e}",
                            entry.name,
                            path.display()
                        ))
                    })?
                }
                _ => {
                    return Err(PxeError::Configuration(format!(
                        "configuration {} needs exactly one of file or content",
                        entry.name
                    )));
                }
            };
            configurations.push(Configuration {
                name: entry.name.clone(),
                bootloader: entry.bootloader.clone(),
                content,
            });
        }

        Ok(Catalog::new(self.bootloaders.clone(), configurations)?)
    }
}
