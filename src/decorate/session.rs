//! Session-scoped memory of the identifier with lazy expiry.
//!
//! Two storage keys are used: one for the value and one for its expiry as
//! epoch milliseconds written as text. Expiry is only checked on read; an
//! expired or unreadable record is removed at that point.

use crate::base::config::TrackingConfig;
use crate::base::identifier::TrackingIdentifier;
use dashmap::DashMap;
use std::sync::Arc;
use time::OffsetDateTime;

/// Web Storage style key/value store scoped to a browsing session.
pub trait SessionStorage {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str);
    fn remove_item(&self, key: &str);
}

/// Thread-safe in-memory [`SessionStorage`]. Clones share the same items.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStorage {
    items: Arc<DashMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).map(|v| v.value().clone())
    }

    fn set_item(&self, key: &str, value: &str) {
        self.items.insert(key.to_string(), value.to_string());
    }

    fn remove_item(&self, key: &str) {
        self.items.remove(key);
    }
}

impl<S: SessionStorage + ?Sized> SessionStorage for Arc<S> {
    fn get_item(&self, key: &str) -> Option<String> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) {
        (**self).remove_item(key)
    }
}

/// The identifier slot in session storage.
#[derive(Debug, Clone)]
pub struct SessionMemory<S> {
    storage: S,
    config: Arc<TrackingConfig>,
}

impl<S: SessionStorage> SessionMemory<S> {
    pub fn new(storage: S, config: Arc<TrackingConfig>) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Overwrite the slot with `identifier`, expiring `expiry_hours` from `now`.
    pub fn store(&self, identifier: &TrackingIdentifier, now: OffsetDateTime) {
        let expiry = epoch_millis(now + self.config.session_ttl());
        self.storage
            .set_item(&self.config.storage_key, identifier.as_str());
        self.storage
            .set_item(&self.config.storage_expiry_key, &expiry.to_string());
        tracing::debug!(identifier = %identifier, expiry, "stored tracking identifier");
    }

    /// Read the slot. Past its expiry the slot is cleared and `None` returned.
    pub fn load(&self, now: OffsetDateTime) -> Option<TrackingIdentifier> {
        let value = self.storage.get_item(&self.config.storage_key)?;
        let expiry = self.storage.get_item(&self.config.storage_expiry_key)?;

        let Ok(expiry) = expiry.trim().parse::<i64>() else {
            tracing::debug!(expiry = %expiry, "unreadable tracking expiry, clearing");
            self.clear();
            return None;
        };
        if epoch_millis(now) > expiry {
            tracing::debug!(expiry, "stored tracking identifier expired");
            self.clear();
            return None;
        }

        TrackingIdentifier::new(value)
    }

    pub fn clear(&self) {
        self.storage.remove_item(&self.config.storage_key);
        self.storage.remove_item(&self.config.storage_expiry_key);
    }
}

fn epoch_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}
