use palisade_core::{ChannelOverride, PositionUpdate, Role};

use crate::error::StoreError;

/// The slice of a channel this engine consumes: only the owning server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub id: String,
    pub server_id: String,
}

/// Read-only role lookups. Resolution and the visibility filter depend on
/// nothing more than this.
pub trait RoleLookup {
    async fn roles_by_user_and_server(
        &self,
        user_id: &str,
        server_id: &str,
    ) -> Result<Vec<Role>, StoreError>;

    async fn role_by_id(&self, role_id: &str) -> Result<Role, StoreError>;

    async fn all_roles_by_server(&self, server_id: &str) -> Result<Vec<Role>, StoreError>;
}

/// Full role persistence, consumed by role management and member
/// moderation only.
pub trait RoleStore: RoleLookup {
    async fn create_role(&self, role: &Role) -> Result<(), StoreError>;

    async fn update_role(&self, role: &Role) -> Result<(), StoreError>;

    async fn delete_role(&self, role_id: &str) -> Result<(), StoreError>;

    /// Applies every position change or none of them.
    async fn update_positions(&self, items: &[PositionUpdate]) -> Result<(), StoreError>;

    async fn assign_to_user(
        &self,
        user_id: &str,
        role_id: &str,
        server_id: &str,
    ) -> Result<(), StoreError>;

    async fn remove_from_user(&self, user_id: &str, role_id: &str) -> Result<(), StoreError>;
}

/// Channel override persistence.
pub trait OverrideStore {
    /// Every override on one channel, for management listings.
    async fn overrides_by_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<ChannelOverride>, StoreError>;

    /// Overrides on one channel restricted to a role id set; the
    /// resolution path.
    async fn overrides_by_channel_and_roles(
        &self,
        channel_id: &str,
        role_ids: &[String],
    ) -> Result<Vec<ChannelOverride>, StoreError>;

    /// Overrides for a role set across every channel; the visibility
    /// filter's one batch query.
    async fn overrides_by_roles(
        &self,
        role_ids: &[String],
    ) -> Result<Vec<ChannelOverride>, StoreError>;

    async fn upsert(&self, entry: &ChannelOverride) -> Result<(), StoreError>;

    async fn delete(&self, channel_id: &str, role_id: &str) -> Result<(), StoreError>;
}

/// Channel to owning-server lookup.
pub trait ChannelLookup {
    async fn channel_by_id(&self, channel_id: &str) -> Result<ChannelRef, StoreError>;
}
