//! Host registry.
//!
//! Each host lives in its own slot guarded by an async mutex. The index
//! mapping names and MAC addresses to slots is only locked to find a slot or
//! to change the set of hosts, never while a host is being mutated, so
//! updates to different hosts do not serialize.

use crate::error::RegistryError;
use chrono::Utc;
use models::{Host, HostIdentity, MacAddress, ManagementEndpoint, PowerState};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

type Slot = Arc<Mutex<Host>>;

#[derive(Default)]
struct Index {
    by_name: BTreeMap<String, Slot>,
    by_mac: HashMap<MacAddress, String>,
}

/// Result of a discovery upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

/// Exclusive access to one host record.
///
/// Only the fields the registry does not index can be changed through it.
pub struct HostGuard(OwnedMutexGuard<Host>);

impl HostGuard {
    pub fn set_configuration(&mut self, configuration: Option<String>) {
        self.0.configuration = configuration;
    }

    /// Records an observed power state.
    pub fn set_power_state(&mut self, state: PowerState) {
        self.0.power_state = state;
        self.0.power_state_observed_at = Some(Utc::now());
    }
}

impl Deref for HostGuard {
    type Target = Host;

    fn deref(&self) -> &Host {
        &self.0
    }
}

/// Catalog of hosts, keyed by MAC identity and addressable by name.
#[derive(Default)]
pub struct Registry {
    index: RwLock<Index>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, name: &str) -> Option<Slot> {
        self.index.read().await.by_name.get(name).cloned()
    }

    /// Snapshot of one host.
    pub async fn lookup(&self, name: &str) -> Option<Host> {
        let slot = self.slot(name).await?;
        let host = slot.lock().await;
        Some(host.clone())
    }

    /// Snapshot of every host, ordered by name.
    pub async fn list(&self) -> Vec<Host> {
        let slots: Vec<Slot> = self.index.read().await.by_name.values().cloned().collect();
        let mut hosts = Vec::with_capacity(slots.len());
        for slot in slots {
            hosts.push(slot.lock().await.clone());
        }
        hosts
    }

    /// Host names, ordered.
    pub async fn names(&self) -> Vec<String> {
        self.index.read().await.by_name.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.by_name.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Takes the host's mutation lock. Concurrent callers for the same host
    /// wait; other hosts are unaffected.
    pub async fn lock(&self, name: &str) -> Option<HostGuard> {
        let slot = self.slot(name).await?;
        Some(HostGuard(slot.lock_owned().await))
    }

    /// Assigns or clears a host's configuration.
    pub async fn set_configuration(
        &self,
        name: &str,
        configuration: Option<String>,
    ) -> Result<(), RegistryError> {
        let mut host = self
            .lock(name)
            .await
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        host.set_configuration(configuration);
        Ok(())
    }

    /// Records an observed power state for a host.
    pub async fn set_power_state(&self, name: &str, state: PowerState) -> Result<(), RegistryError> {
        let mut host = self
            .lock(name)
            .await
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        host.set_power_state(state);
        Ok(())
    }

    /// Registers or updates a host by identity.
    ///
    /// The record owning any of the MACs is updated (renamed, MAC set and
    /// endpoint replaced, configuration and power state kept); otherwise a
    /// new record is created.
    pub async fn upsert(
        &self,
        name: &str,
        identity: HostIdentity,
        management: ManagementEndpoint,
    ) -> Result<Upsert, RegistryError> {
        loop {
            let mut index = self.index.write().await;
            let Some(previous_name) = Self::owner(&index, name, &identity)? else {
                for mac in identity.macs() {
                    index.by_mac.insert(mac.clone(), name.to_string());
                }
                let host = Host::new(name, identity, management);
                index
                    .by_name
                    .insert(name.to_string(), Arc::new(Mutex::new(host)));
                info!(host = %name, "Host registered");
                return Ok(Upsert::Created);
            };

            let Some(slot) = index.by_name.get(&previous_name).cloned() else {
                return Err(RegistryError::NotFound(previous_name));
            };
            // A busy host is waited for with the index released, then the
            // checks run again
            let Ok(mut host) = Arc::clone(&slot).try_lock_owned() else {
                drop(index);
                drop(slot.lock().await);
                continue;
            };

            index.by_name.remove(&previous_name);
            for mac in host.mac_addresses.macs() {
                index.by_mac.remove(mac);
            }
            host.name = name.to_string();
            host.mac_addresses = identity;
            host.management = management;
            for mac in host.mac_addresses.macs() {
                index.by_mac.insert(mac.clone(), name.to_string());
            }
            drop(host);
            index.by_name.insert(name.to_string(), slot);

            if previous_name == name {
                debug!(host = %name, "Host updated");
            } else {
                info!(host = %name, previous = %previous_name, "Host renamed");
            }
            return Ok(Upsert::Updated);
        }
    }

    /// The record an upsert applies to, if any.
    fn owner(
        index: &Index,
        name: &str,
        identity: &HostIdentity,
    ) -> Result<Option<String>, RegistryError> {
        let mut owners = BTreeSet::new();
        for mac in identity.macs() {
            if let Some(owner) = index.by_mac.get(mac) {
                owners.insert(owner.clone());
                if owners.len() > 1 {
                    return Err(RegistryError::MacConflict {
                        mac: mac.clone(),
                        owner: owner.clone(),
                    });
                }
            }
        }
        let existing = owners.into_iter().next();

        if index.by_name.contains_key(name) && existing.as_deref() != Some(name) {
            return Err(RegistryError::NameConflict(name.to_string()));
        }
        Ok(existing)
    }

    /// Removes a host, waiting for it to be released if it is locked.
    pub async fn remove(&self, name: &str) -> Option<Host> {
        loop {
            let mut index = self.index.write().await;
            let slot = index.by_name.get(name).cloned()?;
            let Ok(host) = Arc::clone(&slot).try_lock_owned() else {
                drop(index);
                drop(slot.lock().await);
                continue;
            };

            index.by_name.remove(name);
            for mac in host.mac_addresses.macs() {
                index.by_mac.remove(mac);
            }
            info!(host = %name, "Host removed");
            return Some(Host::clone(&host));
        }
    }

    /// Name of the host owning a MAC address.
    pub async fn find_by_mac(&self, mac: &MacAddress) -> Option<String> {
        self.index.read().await.by_mac.get(mac).cloned()
    }
}
