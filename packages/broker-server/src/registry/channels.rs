//! The channel registry: named pub/sub groups with an owner and a subscriber set.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use hubline_core::{ChannelGuid, ClientGuid};
use parking_lot::RwLock;

use crate::error::RegistryError;

/// A channel's identity, owner, and live subscriber set.
pub struct ChannelEntry {
    pub guid: ChannelGuid,
    pub name: String,
    pub owner: ClientGuid,
    pub private: bool,
    subscribers: RwLock<HashSet<ClientGuid>>,
}

impl ChannelEntry {
    #[must_use]
    pub fn subscribers(&self) -> Vec<ClientGuid> {
        self.subscribers.read().iter().copied().collect()
    }

    #[must_use]
    pub fn is_subscriber(&self, client: ClientGuid) -> bool {
        self.subscribers.read().contains(&client)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

/// Thread-safe registry of all live channels, keyed by `ChannelGuid`, with a
/// case-insensitive name index for lookup and uniqueness enforcement.
///
/// Every mutating method returns before the caller dispatches any
/// notification, so no method here ever calls another while holding a lock.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: DashMap<ChannelGuid, Arc<ChannelEntry>>,
    names: DashMap<String, ChannelGuid>,
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}

impl ChannelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a channel, subscribing its owner immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ChannelNameTaken`] if a channel with this
    /// name (case-insensitively) already exists.
    pub fn add_channel(
        &self,
        name: String,
        owner: ClientGuid,
        private: bool,
    ) -> Result<Arc<ChannelEntry>, RegistryError> {
        let key = fold(&name);
        if self.names.contains_key(&key) {
            return Err(RegistryError::ChannelNameTaken);
        }

        let guid = ChannelGuid::new();
        let mut subscribers = HashSet::new();
        subscribers.insert(owner);
        let entry = Arc::new(ChannelEntry {
            guid,
            name,
            owner,
            private,
            subscribers: RwLock::new(subscribers),
        });

        self.names.insert(key, guid);
        self.channels.insert(guid, Arc::clone(&entry));
        Ok(entry)
    }

    /// Removes a channel. Only the owner may delete it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ChannelNotFound`] if the channel does not
    /// exist. Non-owner deletion is rejected by the caller before reaching
    /// here (see the message processor); this method trusts its caller.
    pub fn remove_channel(&self, guid: ChannelGuid) -> Result<Arc<ChannelEntry>, RegistryError> {
        let (_, entry) = self
            .channels
            .remove(&guid)
            .ok_or(RegistryError::ChannelNotFound)?;
        self.names.remove(&fold(&entry.name));
        Ok(entry)
    }

    #[must_use]
    pub fn get_by_guid(&self, guid: ChannelGuid) -> Option<Arc<ChannelEntry>> {
        self.channels.get(&guid).map(|r| Arc::clone(r.value()))
    }

    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<Arc<ChannelEntry>> {
        let guid = *self.names.get(&fold(name))?;
        self.get_by_guid(guid)
    }

    #[must_use]
    pub fn all_channels(&self) -> Vec<Arc<ChannelEntry>> {
        self.channels.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Adds a subscriber to a channel. Idempotent: returns `Ok(false)` if the
    /// client was already subscribed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ChannelNotFound`] if the channel does not exist.
    pub fn add_subscriber(
        &self,
        guid: ChannelGuid,
        client: ClientGuid,
    ) -> Result<bool, RegistryError> {
        let entry = self.get_by_guid(guid).ok_or(RegistryError::ChannelNotFound)?;
        Ok(entry.subscribers.write().insert(client))
    }

    /// Removes a subscriber from a channel. Idempotent: returns `Ok(false)`
    /// if the client was not subscribed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ChannelNotFound`] if the channel does not exist.
    pub fn remove_subscriber(
        &self,
        guid: ChannelGuid,
        client: ClientGuid,
    ) -> Result<bool, RegistryError> {
        let entry = self.get_by_guid(guid).ok_or(RegistryError::ChannelNotFound)?;
        Ok(entry.subscribers.write().remove(&client))
    }

    /// Removes a disconnecting client from every channel it subscribes to,
    /// returning the channels it left (for event publishing).
    pub fn remove_client_everywhere(&self, client: ClientGuid) -> Vec<Arc<ChannelEntry>> {
        let mut left = Vec::new();
        for entry in &self.channels {
            if entry.value().subscribers.write().remove(&client) {
                left.push(Arc::clone(entry.value()));
            }
        }
        left
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_is_subscribed_on_creation() {
        let registry = ChannelRegistry::new();
        let owner = ClientGuid::new();
        let entry = registry.add_channel("general".to_string(), owner, false).unwrap();
        assert!(entry.is_subscriber(owner));
        assert_eq!(entry.subscriber_count(), 1);
    }

    #[test]
    fn duplicate_name_is_case_insensitively_rejected() {
        let registry = ChannelRegistry::new();
        registry.add_channel("General".to_string(), ClientGuid::new(), false).unwrap();
        let err = registry
            .add_channel("GENERAL".to_string(), ClientGuid::new(), false)
            .unwrap_err();
        assert_eq!(err, RegistryError::ChannelNameTaken);
    }

    #[test]
    fn get_by_name_is_case_insensitive() {
        let registry = ChannelRegistry::new();
        let entry = registry.add_channel("General".to_string(), ClientGuid::new(), false).unwrap();
        let found = registry.get_by_name("GeNeRaL").unwrap();
        assert_eq!(found.guid, entry.guid);
    }

    #[test]
    fn remove_channel_frees_the_name() {
        let registry = ChannelRegistry::new();
        let entry = registry.add_channel("general".to_string(), ClientGuid::new(), false).unwrap();
        registry.remove_channel(entry.guid).unwrap();

        assert!(registry.get_by_name("general").is_none());
        registry.add_channel("general".to_string(), ClientGuid::new(), false).unwrap();
    }

    #[test]
    fn remove_channel_not_found() {
        let registry = ChannelRegistry::new();
        let err = registry.remove_channel(ChannelGuid::new()).unwrap_err();
        assert_eq!(err, RegistryError::ChannelNotFound);
    }

    #[test]
    fn subscriber_add_is_idempotent() {
        let registry = ChannelRegistry::new();
        let owner = ClientGuid::new();
        let entry = registry.add_channel("general".to_string(), owner, false).unwrap();
        let other = ClientGuid::new();

        assert!(registry.add_subscriber(entry.guid, other).unwrap());
        assert!(!registry.add_subscriber(entry.guid, other).unwrap());
        assert_eq!(entry.subscriber_count(), 2);
    }

    #[test]
    fn subscriber_remove_is_idempotent() {
        let registry = ChannelRegistry::new();
        let owner = ClientGuid::new();
        let entry = registry.add_channel("general".to_string(), owner, false).unwrap();
        let other = ClientGuid::new();
        registry.add_subscriber(entry.guid, other).unwrap();

        assert!(registry.remove_subscriber(entry.guid, other).unwrap());
        assert!(!registry.remove_subscriber(entry.guid, other).unwrap());
    }

    #[test]
    fn remove_client_everywhere_reports_every_channel_left() {
        let registry = ChannelRegistry::new();
        let owner = ClientGuid::new();
        let member = ClientGuid::new();

        let c1 = registry.add_channel("one".to_string(), owner, false).unwrap();
        let c2 = registry.add_channel("two".to_string(), owner, false).unwrap();
        registry.add_subscriber(c1.guid, member).unwrap();
        registry.add_subscriber(c2.guid, member).unwrap();

        let left = registry.remove_client_everywhere(member);
        assert_eq!(left.len(), 2);
        assert!(!c1.is_subscriber(member));
        assert!(!c2.is_subscriber(member));
        // Owner is untouched.
        assert!(c1.is_subscriber(owner));
    }

    #[test]
    fn private_flag_is_recorded() {
        let registry = ChannelRegistry::new();
        let owner = ClientGuid::new();
        let entry = registry.add_channel("secret".to_string(), owner, true).unwrap();
        assert!(entry.private);
    }
}
