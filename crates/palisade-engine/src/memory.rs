use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use palisade_core::{ChannelOverride, PositionUpdate, Role};

use crate::{
    error::StoreError,
    store::{ChannelLookup, ChannelRef, OverrideStore, RoleLookup, RoleStore},
};

/// In-memory backing store, used by tests and single-node deployments
/// without a database.
///
/// Deleting a role cascades into its user assignments and channel
/// overrides, matching what a relational backend does with foreign keys.
#[derive(Default)]
pub struct InMemoryStore {
    roles: RwLock<HashMap<String, Role>>,
    assignments: RwLock<HashMap<String, HashSet<String>>>,
    overrides: RwLock<HashMap<(String, String), ChannelOverride>>,
    channels: RwLock<HashMap<String, ChannelRef>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_channel(&self, channel_id: &str, server_id: &str) {
        self.channels.write().await.insert(
            channel_id.to_owned(),
            ChannelRef {
                id: channel_id.to_owned(),
                server_id: server_id.to_owned(),
            },
        );
    }

    pub async fn add_role(&self, role: Role) {
        self.roles.write().await.insert(role.id.clone(), role);
    }

    pub async fn assign(&self, user_id: &str, role_id: &str) {
        self.assignments
            .write()
            .await
            .entry(user_id.to_owned())
            .or_default()
            .insert(role_id.to_owned());
    }
}

impl RoleLookup for InMemoryStore {
    async fn roles_by_user_and_server(
        &self,
        user_id: &str,
        server_id: &str,
    ) -> Result<Vec<Role>, StoreError> {
        let assignments = self.assignments.read().await;
        let Some(role_ids) = assignments.get(user_id) else {
            return Ok(Vec::new());
        };
        let roles = self.roles.read().await;
        Ok(role_ids
            .iter()
            .filter_map(|id| roles.get(id))
            .filter(|role| role.server_id == server_id)
            .cloned()
            .collect())
    }

    async fn role_by_id(&self, role_id: &str) -> Result<Role, StoreError> {
        self.roles
            .read()
            .await
            .get(role_id)
            .cloned()
            .ok_or(StoreError::NotFound("role"))
    }

    async fn all_roles_by_server(&self, server_id: &str) -> Result<Vec<Role>, StoreError> {
        Ok(self
            .roles
            .read()
            .await
            .values()
            .filter(|role| role.server_id == server_id)
            .cloned()
            .collect())
    }
}

impl RoleStore for InMemoryStore {
    async fn create_role(&self, role: &Role) -> Result<(), StoreError> {
        self.roles
            .write()
            .await
            .insert(role.id.clone(), role.clone());
        Ok(())
    }

    async fn update_role(&self, role: &Role) -> Result<(), StoreError> {
        let mut roles = self.roles.write().await;
        if !roles.contains_key(&role.id) {
            return Err(StoreError::NotFound("role"));
        }
        roles.insert(role.id.clone(), role.clone());
        Ok(())
    }

    async fn delete_role(&self, role_id: &str) -> Result<(), StoreError> {
        if self.roles.write().await.remove(role_id).is_none() {
            return Err(StoreError::NotFound("role"));
        }
        for role_ids in self.assignments.write().await.values_mut() {
            role_ids.remove(role_id);
        }
        self.overrides
            .write()
            .await
            .retain(|(_, override_role_id), _| override_role_id != role_id);
        Ok(())
    }

    async fn update_positions(&self, items: &[PositionUpdate]) -> Result<(), StoreError> {
        let mut roles = self.roles.write().await;
        // all-or-nothing: verify every target exists before touching any
        if items.iter().any(|item| !roles.contains_key(&item.id)) {
            return Err(StoreError::NotFound("role"));
        }
        for item in items {
            if let Some(role) = roles.get_mut(&item.id) {
                role.position = item.position;
            }
        }
        Ok(())
    }

    async fn assign_to_user(
        &self,
        user_id: &str,
        role_id: &str,
        _server_id: &str,
    ) -> Result<(), StoreError> {
        if !self.roles.read().await.contains_key(role_id) {
            return Err(StoreError::NotFound("role"));
        }
        self.assignments
            .write()
            .await
            .entry(user_id.to_owned())
            .or_default()
            .insert(role_id.to_owned());
        Ok(())
    }

    async fn remove_from_user(&self, user_id: &str, role_id: &str) -> Result<(), StoreError> {
        if let Some(role_ids) = self.assignments.write().await.get_mut(user_id) {
            role_ids.remove(role_id);
        }
        Ok(())
    }
}

impl OverrideStore for InMemoryStore {
    async fn overrides_by_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<ChannelOverride>, StoreError> {
        Ok(self
            .overrides
            .read()
            .await
            .values()
            .filter(|entry| entry.channel_id == channel_id)
            .cloned()
            .collect())
    }

    async fn overrides_by_channel_and_roles(
        &self,
        channel_id: &str,
        role_ids: &[String],
    ) -> Result<Vec<ChannelOverride>, StoreError> {
        let wanted: HashSet<&str> = role_ids.iter().map(String::as_str).collect();
        Ok(self
            .overrides
            .read()
            .await
            .values()
            .filter(|entry| entry.channel_id == channel_id && wanted.contains(entry.role_id.as_str()))
            .cloned()
            .collect())
    }

    async fn overrides_by_roles(
        &self,
        role_ids: &[String],
    ) -> Result<Vec<ChannelOverride>, StoreError> {
        let wanted: HashSet<&str> = role_ids.iter().map(String::as_str).collect();
        Ok(self
            .overrides
            .read()
            .await
            .values()
            .filter(|entry| wanted.contains(entry.role_id.as_str()))
            .cloned()
            .collect())
    }

    async fn upsert(&self, entry: &ChannelOverride) -> Result<(), StoreError> {
        self.overrides.write().await.insert(
            (entry.channel_id.clone(), entry.role_id.clone()),
            entry.clone(),
        );
        Ok(())
    }

    async fn delete(&self, channel_id: &str, role_id: &str) -> Result<(), StoreError> {
        self.overrides
            .write()
            .await
            .remove(&(channel_id.to_owned(), role_id.to_owned()))
            .map(|_| ())
            .ok_or(StoreError::NotFound("override"))
    }
}

impl ChannelLookup for InMemoryStore {
    async fn channel_by_id(&self, channel_id: &str) -> Result<ChannelRef, StoreError> {
        self.channels
            .read()
            .await
            .get(channel_id)
            .cloned()
            .ok_or(StoreError::NotFound("channel"))
    }
}
