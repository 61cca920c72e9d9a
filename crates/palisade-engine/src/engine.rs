use std::sync::Arc;

use tracing::warn;

use palisade_core::{
    apply_overrides, base_permissions, validate_override_masks, ChannelOverride, Permission,
    PermissionSet,
};

use crate::{
    cache::PermissionCache,
    error::{AccessError, StoreError},
    events::AccessEvent,
    store::{ChannelLookup, OverrideStore, RoleLookup},
    visibility::VisibilityFilter,
};

/// Computes effective permissions per (user, channel) pair and manages
/// the channel overrides feeding that computation.
///
/// Resolution only computes a value; it never raises "permission
/// denied" — callers decide how to react to a missing bit.
pub struct PermissionEngine<S> {
    store: Arc<S>,
    cache: Arc<PermissionCache>,
}

impl<S> PermissionEngine<S>
where
    S: RoleLookup + OverrideStore + ChannelLookup,
{
    pub fn new(store: Arc<S>, cache: Arc<PermissionCache>) -> Self {
        Self { store, cache }
    }

    /// Effective permissions of `user_id` on `channel_id`.
    ///
    /// Base permissions are the OR of the user's role masks in the
    /// channel's server. Admins short-circuit to the full set without an
    /// override lookup. Otherwise the channel's overrides restricted to
    /// the user's roles are OR-combined and applied as
    /// `(base & !deny) | allow`.
    ///
    /// # Errors
    /// `NotFound` when the channel does not exist; `Store` when a role
    /// or override fetch fails.
    pub async fn resolve(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> Result<PermissionSet, AccessError> {
        if let Some(cached) = self.cache.get(user_id, channel_id).await {
            return Ok(cached);
        }

        let channel = self
            .store
            .channel_by_id(channel_id)
            .await
            .map_err(AccessError::wrap("resolving channel"))?;

        let roles = self
            .store
            .roles_by_user_and_server(user_id, &channel.server_id)
            .await
            .map_err(AccessError::wrap("fetching user roles"))?;
        let base = base_permissions(&roles);

        if base.contains(Permission::Admin) {
            let all = PermissionSet::all();
            self.cache.insert(user_id, channel_id, all).await;
            return Ok(all);
        }

        let role_ids: Vec<String> = roles.iter().map(|role| role.id.clone()).collect();
        let overrides = self
            .store
            .overrides_by_channel_and_roles(channel_id, &role_ids)
            .await
            .map_err(AccessError::wrap("fetching channel overrides"))?;
        let effective = apply_overrides(base, &overrides);

        self.cache.insert(user_id, channel_id, effective).await;
        Ok(effective)
    }

    /// Every override on a channel, for management listings.
    ///
    /// # Errors
    /// `Store` when the fetch fails.
    pub async fn overrides_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<ChannelOverride>, AccessError> {
        self.store
            .overrides_by_channel(channel_id)
            .await
            .map_err(AccessError::wrap("fetching channel overrides"))
    }

    /// Creates or replaces the override for `(channel_id, role_id)`.
    ///
    /// Both masks zero means "no override": the row is removed instead,
    /// idempotently — a missing row is logged, not surfaced. Every
    /// successful mutation drops the channel's cache footprint before
    /// returning, and the returned event is the caller's to broadcast.
    ///
    /// # Errors
    /// `BadRequest` when a mask carries non-overridable bits; `Store`
    /// when the write fails.
    pub async fn set_override(
        &self,
        channel_id: &str,
        role_id: &str,
        allow: PermissionSet,
        deny: PermissionSet,
    ) -> Result<AccessEvent, AccessError> {
        validate_override_masks(allow, deny)?;

        if allow.is_empty() && deny.is_empty() {
            match self.store.delete(channel_id, role_id).await {
                Ok(()) => {}
                Err(StoreError::NotFound(_)) => {
                    warn!(channel_id, role_id, "override removal found no existing row");
                }
                Err(source) => {
                    return Err(AccessError::Store {
                        context: "deleting channel override",
                        source,
                    })
                }
            }
            self.cache.invalidate_channel(channel_id).await;
            return Ok(AccessEvent::OverrideRemoved {
                channel_id: channel_id.to_owned(),
                role_id: role_id.to_owned(),
            });
        }

        let entry = ChannelOverride {
            channel_id: channel_id.to_owned(),
            role_id: role_id.to_owned(),
            allow,
            deny,
        };
        self.store
            .upsert(&entry)
            .await
            .map_err(AccessError::wrap("setting channel override"))?;
        self.cache.invalidate_channel(channel_id).await;
        Ok(AccessEvent::OverrideSet { entry })
    }

    /// Removes the override for `(channel_id, role_id)`.
    ///
    /// Unlike the zero-mask path of [`Self::set_override`], an explicit
    /// delete of a missing row is a `NotFound` error.
    ///
    /// # Errors
    /// `NotFound` when no such override exists; `Store` when the delete
    /// fails.
    pub async fn delete_override(
        &self,
        channel_id: &str,
        role_id: &str,
    ) -> Result<AccessEvent, AccessError> {
        self.store
            .delete(channel_id, role_id)
            .await
            .map_err(AccessError::wrap("deleting channel override"))?;
        self.cache.invalidate_channel(channel_id).await;
        Ok(AccessEvent::OverrideRemoved {
            channel_id: channel_id.to_owned(),
            role_id: role_id.to_owned(),
        })
    }

    /// Builds the bulk channel-visibility decision structure for one
    /// user in one server: one role fetch, an Admin fast path, and one
    /// server-wide override batch query.
    ///
    /// # Errors
    /// `Store` when a role or override fetch fails.
    pub async fn build_visibility_filter(
        &self,
        user_id: &str,
        server_id: &str,
    ) -> Result<VisibilityFilter, AccessError> {
        let roles = self
            .store
            .roles_by_user_and_server(user_id, server_id)
            .await
            .map_err(AccessError::wrap("fetching user roles"))?;
        let base = base_permissions(&roles);

        if base.contains(Permission::Admin) {
            return Ok(VisibilityFilter::admin());
        }

        let role_ids: Vec<String> = roles.iter().map(|role| role.id.clone()).collect();
        let overrides = self
            .store
            .overrides_by_roles(&role_ids)
            .await
            .map_err(AccessError::wrap("fetching role overrides"))?;
        Ok(VisibilityFilter::classify(base, overrides))
    }
}
