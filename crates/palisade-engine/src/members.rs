use std::{collections::HashSet, sync::Arc};

use palisade_core::{has_owner_role, highest_position, OWNER_ROLE_ID};

use crate::{
    cache::PermissionCache,
    error::AccessError,
    events::AccessEvent,
    store::RoleStore,
};

/// Rank checks for member management: kick/ban gating and role
/// assignment.
///
/// This is not a permission check — capability bits are the caller's
/// concern. It only answers whether the actor outranks the target, with
/// the owner checked by identity before any position math.
pub struct MemberAuthority<S> {
    store: Arc<S>,
    cache: Arc<PermissionCache>,
}

impl<S: RoleStore> MemberAuthority<S> {
    pub fn new(store: Arc<S>, cache: Arc<PermissionCache>) -> Self {
        Self { store, cache }
    }

    /// The kick/ban guard: the target must not hold the owner role and
    /// must rank strictly below the actor.
    ///
    /// # Errors
    /// `Forbidden` on owner targets or insufficient hierarchy; `Store`
    /// when a role fetch fails.
    pub async fn ensure_can_moderate(
        &self,
        actor_id: &str,
        server_id: &str,
        target_id: &str,
    ) -> Result<(), AccessError> {
        let target_roles = self
            .store
            .roles_by_user_and_server(target_id, server_id)
            .await
            .map_err(AccessError::wrap("fetching target roles"))?;
        if has_owner_role(&target_roles) {
            return Err(AccessError::Forbidden(
                "the server owner cannot be kicked or banned",
            ));
        }

        let actor_roles = self
            .store
            .roles_by_user_and_server(actor_id, server_id)
            .await
            .map_err(AccessError::wrap("fetching actor roles"))?;
        if highest_position(&actor_roles) <= highest_position(&target_roles) {
            return Err(AccessError::Forbidden("insufficient role hierarchy"));
        }
        Ok(())
    }

    /// Replaces the target's role set with `role_ids`, diffing against
    /// the current assignment.
    ///
    /// The default role is implicit membership and exempt from the diff:
    /// it is never added or removed here. Every assigned role must sit
    /// strictly below the actor, as must the target.
    ///
    /// # Errors
    /// `BadRequest` on an empty role list; `Forbidden` on owner targets,
    /// owner-role assignment, or hierarchy violations; `NotFound` for
    /// unknown or foreign-server roles; `Store` on persistence failure.
    pub async fn modify_roles(
        &self,
        actor_id: &str,
        server_id: &str,
        target_id: &str,
        role_ids: &[String],
    ) -> Result<AccessEvent, AccessError> {
        if role_ids.is_empty() {
            return Err(AccessError::BadRequest(String::from(
                "at least one role is required",
            )));
        }

        let actor_roles = self
            .store
            .roles_by_user_and_server(actor_id, server_id)
            .await
            .map_err(AccessError::wrap("fetching actor roles"))?;
        let actor_highest = highest_position(&actor_roles);

        let target_roles = self
            .store
            .roles_by_user_and_server(target_id, server_id)
            .await
            .map_err(AccessError::wrap("fetching target roles"))?;
        if has_owner_role(&target_roles) {
            return Err(AccessError::Forbidden(
                "cannot modify the server owner's roles",
            ));
        }
        if highest_position(&target_roles) >= actor_highest {
            return Err(AccessError::Forbidden(
                "cannot modify roles of a user with equal or higher role",
            ));
        }

        let mut wanted: HashSet<String> = HashSet::new();
        for role_id in role_ids {
            if role_id == OWNER_ROLE_ID {
                return Err(AccessError::Forbidden("the owner role cannot be assigned"));
            }
            let role = self
                .store
                .role_by_id(role_id)
                .await
                .map_err(AccessError::wrap("fetching role"))?;
            if role.server_id != server_id {
                return Err(AccessError::NotFound("role"));
            }
            if role.is_default {
                continue;
            }
            if role.position >= actor_highest {
                return Err(AccessError::Forbidden(
                    "cannot assign a role with equal or higher position",
                ));
            }
            wanted.insert(role.id);
        }

        let current: HashSet<String> = target_roles
            .iter()
            .filter(|role| !role.is_default)
            .map(|role| role.id.clone())
            .collect();

        for role_id in wanted.difference(&current) {
            self.store
                .assign_to_user(target_id, role_id, server_id)
                .await
                .map_err(AccessError::wrap("assigning role"))?;
        }
        for role_id in current.difference(&wanted) {
            self.store
                .remove_from_user(target_id, role_id)
                .await
                .map_err(AccessError::wrap("removing role"))?;
        }

        // the target's resolutions on every channel may have changed
        self.cache.invalidate_user(target_id).await;

        let roles = self
            .store
            .roles_by_user_and_server(target_id, server_id)
            .await
            .map_err(AccessError::wrap("fetching target roles"))?;
        Ok(AccessEvent::MemberRolesModified {
            user_id: target_id.to_owned(),
            roles,
        })
    }
}
