//! Collaborators consumed by command handlers besides the channel itself:
//! the key-value store, the dialplan application registry and the
//! directory of live channels.

use crate::{
    channel::Channel,
    error::{GiError, GiResult},
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

/// Persistent family/key/value store.
///
/// Implementations serialize concurrent access internally; the GI engine
/// calls them synchronously from many sessions at once.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, family: &str, key: &str) -> GiResult<Option<String>>;

    fn put(&self, family: &str, key: &str, value: &str) -> GiResult<()>;

    /// Delete one key, `Ok(false)` if it did not exist
    fn del(&self, family: &str, key: &str) -> GiResult<bool>;

    /// Delete a family, or only keys under `keytree` within it.
    /// Returns the number of entries removed.
    fn deltree(&self, family: &str, keytree: Option<&str>) -> GiResult<usize>;
}

/// In-memory [`KeyValueStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn path(family: &str, key: &str) -> String {
        format!("/{}/{}", family, key)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, family: &str, key: &str) -> GiResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .get(&Self::path(family, key))
            .cloned())
    }

    fn put(&self, family: &str, key: &str, value: &str) -> GiResult<()> {
        if family.is_empty() || key.is_empty() {
            return Err(GiError::store("family and key must not be empty"));
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Self::path(family, key), value.to_string());
        Ok(())
    }

    fn del(&self, family: &str, key: &str) -> GiResult<bool> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&Self::path(family, key))
            .is_some())
    }

    fn deltree(&self, family: &str, keytree: Option<&str>) -> GiResult<usize> {
        let prefix = match keytree.filter(|tree| !tree.is_empty()) {
            Some(tree) => format!("/{}/{}", family, tree.trim_end_matches('/')),
            None => format!("/{}", family),
        };
        let subtree = format!("{}/", prefix);
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|path, _| *path != prefix && !path.starts_with(&subtree));
        let removed = before - entries.len();
        debug!("deltree {} removed {} entries", prefix, removed);
        Ok(removed)
    }
}

/// Result of running a dialplan application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppOutcome {
    /// Application returned; negative means the channel is gone
    Completed(i32),
    /// Application wants the call leg to stay alive in keep-alive mode
    KeepAlive,
}

/// Registry of named dialplan applications (EXEC)
#[async_trait]
pub trait ApplicationRegistry: Send + Sync {
    /// Run `name` on `channel`; `None` if no such application exists
    async fn execute(
        &self,
        channel: &mut dyn Channel,
        name: &str,
        args: &str,
    ) -> Option<AppOutcome>;
}

/// [`ApplicationRegistry`] with no applications
#[derive(Debug, Default, Clone, Copy)]
pub struct NoApplications;

#[async_trait]
impl ApplicationRegistry for NoApplications {
    async fn execute(
        &self,
        _channel: &mut dyn Channel,
        _name: &str,
        _args: &str,
    ) -> Option<AppOutcome> {
        None
    }
}

/// A channel shared between its own call thread and cross-channel lookups
pub type SharedChannel = Arc<tokio::sync::Mutex<dyn Channel>>;

/// Exclusive access to another channel, released when dropped
pub type ChannelGuard = OwnedMutexGuard<dyn Channel>;

/// Lookup of live channels by name
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// Lock the named channel for exclusive use, `None` if unknown
    async fn lock_by_name(&self, name: &str) -> Option<ChannelGuard>;
}

/// Name-keyed [`ChannelDirectory`]; names compare case-insensitively
#[derive(Default)]
pub struct ChannelTable {
    channels: Mutex<HashMap<String, SharedChannel>>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, channel: SharedChannel) {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_ascii_lowercase(), channel);
    }

    pub fn remove(&self, name: &str) -> Option<SharedChannel> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&name.to_ascii_lowercase())
    }
}

#[async_trait]
impl ChannelDirectory for ChannelTable {
    async fn lock_by_name(&self, name: &str) -> Option<ChannelGuard> {
        let shared = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name.to_ascii_lowercase())
            .cloned()?;
        Some(
            shared
                .lock_owned()
                .await,
        )
    }
}

/// Collaborators shared by every session
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn KeyValueStore>,
    pub applications: Arc<dyn ApplicationRegistry>,
    pub channels: Arc<dyn ChannelDirectory>,
}

impl Services {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        applications: Arc<dyn ApplicationRegistry>,
        channels: Arc<dyn ChannelDirectory>,
    ) -> Self {
        Self {
            store,
            applications,
            channels,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_applications(mut self, applications: Arc<dyn ApplicationRegistry>) -> Self {
        self.applications = applications;
        self
    }

    pub fn with_channels(mut self, channels: Arc<dyn ChannelDirectory>) -> Self {
        self.channels = channels;
        self
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(NoApplications),
            Arc::new(ChannelTable::new()),
        )
    }
}
