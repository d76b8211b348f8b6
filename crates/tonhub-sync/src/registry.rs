//! One driver per watched address
//!
//! Views call [`SyncRegistry::watch`] and keep the returned
//! [`Subscription`]; the driver of an address runs while at least one
//! subscription to it is alive.

use crate::client::AccountSource;
use crate::events::SyncEventRecord;
use crate::sync::{AccountSync, SyncConfig, SyncHandle};
use crate::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tonhub_storage::{AccountAddress, AccountRepository, AccountStatus};
use tracing::{debug, info};

struct Entry {
    id: u64,
    subscribers: usize,
    handle: SyncHandle,
}

#[derive(Default)]
struct Entries {
    next_id: u64,
    by_address: HashMap<AccountAddress, Entry>,
    // Cancelled drivers that may still be finishing a write
    stopping: HashMap<AccountAddress, SyncHandle>,
}

/// Registry of running account drivers
pub struct SyncRegistry {
    source: Arc<dyn AccountSource>,
    repository: AccountRepository,
    config: SyncConfig,
    entries: Arc<Mutex<Entries>>,
}

impl SyncRegistry {
    /// Create an empty registry sharing one source and store
    pub fn new(source: Arc<dyn AccountSource>, repository: AccountRepository, config: SyncConfig) -> Self {
        Self {
            source,
            repository,
            config,
            entries: Arc::new(Mutex::new(Entries::default())),
        }
    }

    /// Subscribe to `address`, starting its driver if needed
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch(&self, address: AccountAddress) -> Result<Subscription> {
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.by_address.get_mut(&address) {
            entry.subscribers += 1;
            debug!("{} now has {} subscribers", address, entry.subscribers);
            return Ok(Subscription {
                id: entry.id,
                status_rx: entry.handle.subscribe(),
                address,
                entries: self.entries.clone(),
            });
        }

        entries.stopping.retain(|_, handle| !handle.is_finished());
        let driver = AccountSync::new(
            address.clone(),
            self.source.clone(),
            self.repository.clone(),
            self.config.clone(),
        )?;
        let previous = entries.stopping.remove(&address);
        if previous.is_some() {
            debug!("{} restarts after its previous driver exits", address);
        }
        let handle = driver.spawn_after(previous);
        let status_rx = handle.subscribe();

        entries.next_id += 1;
        let id = entries.next_id;
        entries.by_address.insert(
            address.clone(),
            Entry {
                id,
                subscribers: 1,
                handle,
            },
        );
        info!("Started account sync for {}", address);

        Ok(Subscription {
            id,
            status_rx,
            address,
            entries: self.entries.clone(),
        })
    }

    /// Addresses with a running driver
    pub fn watched(&self) -> Vec<AccountAddress> {
        let mut addresses: Vec<_> = self.entries.lock().by_address.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Live subscriptions for `address`
    pub fn subscribers(&self, address: &AccountAddress) -> usize {
        self.entries
            .lock()
            .by_address
            .get(address)
            .map_or(0, |e| e.subscribers)
    }

    /// Retained sync events of `address`
    pub fn events(&self, address: &AccountAddress) -> Vec<SyncEventRecord> {
        self.entries
            .lock()
            .by_address
            .get(address)
            .map(|e| e.handle.events())
            .unwrap_or_default()
    }

    /// Stop every driver and wait for their tasks to exit
    ///
    /// Outstanding subscriptions stay valid but receive no more updates.
    pub async fn shutdown(&self) {
        let handles: Vec<SyncHandle> = {
            let mut entries = self.entries.lock();
            let running: Vec<SyncHandle> = entries.by_address.drain().map(|(_, entry)| entry.handle).collect();
            running.into_iter().chain(entries.stopping.drain().map(|(_, handle)| handle)).collect()
        };
        for handle in handles {
            handle.stop().await;
        }
        info!("Account sync registry shut down");
    }
}

/// Live interest in one address
///
/// Dropping the last subscription of an address stops its driver.
pub struct Subscription {
    id: u64,
    address: AccountAddress,
    status_rx: watch::Receiver<Option<AccountStatus>>,
    entries: Arc<Mutex<Entries>>,
}

impl Subscription {
    /// Subscribed address
    pub fn address(&self) -> &AccountAddress {
        &self.address
    }

    /// Last published status
    pub fn status(&self) -> Option<AccountStatus> {
        self.status_rx.borrow().clone()
    }

    /// A receiver for awaiting status changes
    pub fn receiver(&self) -> watch::Receiver<Option<AccountStatus>> {
        self.status_rx.clone()
    }

    /// Explicitly release this subscription
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.by_address.get_mut(&self.address) else {
            return;
        };
        // The driver may have been restarted since this subscription was taken
        if entry.id != self.id {
            return;
        }
        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers == 0 {
            if let Some(entry) = entries.by_address.remove(&self.address) {
                entry.handle.cancel();
                // A later watch of this address waits for the task to exit
                entries.stopping.insert(self.address.clone(), entry.handle);
            }
            info!("Stopped account sync for {}", self.address);
        }
    }
}
