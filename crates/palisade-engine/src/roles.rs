use std::{sync::Arc, time::UNIX_EPOCH};

use serde::Deserialize;
use ulid::Ulid;

use palisade_core::{
    base_permissions, grants_beyond, highest_position, validate_role_permissions, PermissionSet,
    PositionUpdate, Role, RoleColor, RoleName, OWNER_ROLE_ID,
};

use crate::{
    cache::PermissionCache,
    error::AccessError,
    events::AccessEvent,
    store::RoleStore,
};

/// Payload for role creation. Position is never client-controlled; the
/// new role slots in directly below the actor.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub color: String,
    pub permissions: PermissionSet,
}

/// Partial role update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
    pub permissions: Option<PermissionSet>,
}

/// Role lifecycle management under hierarchy enforcement.
///
/// Every mutation compares positions strictly: an actor can only touch
/// roles below their own highest position, and ties always fail. The
/// owner role is identity-checked before any position math and can never
/// be mutated.
pub struct RoleService<S> {
    store: Arc<S>,
    cache: Arc<PermissionCache>,
}

impl<S: RoleStore> RoleService<S> {
    pub fn new(store: Arc<S>, cache: Arc<PermissionCache>) -> Self {
        Self { store, cache }
    }

    /// All roles of a server, highest position first.
    ///
    /// # Errors
    /// `Store` when the fetch fails.
    pub async fn roles(&self, server_id: &str) -> Result<Vec<Role>, AccessError> {
        let mut roles = self
            .store
            .all_roles_by_server(server_id)
            .await
            .map_err(AccessError::wrap("listing roles"))?;
        roles.sort_by(|a, b| b.position.cmp(&a.position));
        Ok(roles)
    }

    /// Creates a role directly below the actor's highest position.
    ///
    /// # Errors
    /// `BadRequest` on invalid name, color, or unknown permission bits;
    /// `Forbidden` when the mask escalates beyond the actor's own
    /// permissions; `Store` on persistence failure.
    pub async fn create_role(
        &self,
        actor_id: &str,
        server_id: &str,
        req: NewRole,
    ) -> Result<AccessEvent, AccessError> {
        let name = RoleName::try_from(req.name)?;
        let color = RoleColor::try_from(req.color)?;
        validate_role_permissions(req.permissions)?;

        let (actor_highest, actor_permissions) = self.actor_context(actor_id, server_id).await?;
        if grants_beyond(actor_permissions, req.permissions) {
            return Err(AccessError::Forbidden(
                "cannot grant permissions you do not have",
            ));
        }

        let position = self.new_role_position(server_id, actor_highest).await?;
        let role = Role {
            id: Ulid::new().to_string(),
            server_id: server_id.to_owned(),
            name: name.into_string(),
            color: color.into_string(),
            position,
            permissions: req.permissions,
            is_default: false,
            created_at_unix: unix_now(),
        };
        self.store
            .create_role(&role)
            .await
            .map_err(AccessError::wrap("creating role"))?;
        // nobody holds the new role yet, so no cached resolution changed
        Ok(AccessEvent::RoleCreated { role })
    }

    /// Partially updates a role below the actor.
    ///
    /// # Errors
    /// `NotFound` for an unknown or foreign-server role; `Forbidden` on
    /// owner-role mutation, hierarchy violation, or escalation;
    /// `BadRequest` on invalid fields; `Store` on persistence failure.
    pub async fn update_role(
        &self,
        actor_id: &str,
        server_id: &str,
        role_id: &str,
        update: RoleUpdate,
    ) -> Result<AccessEvent, AccessError> {
        let mut role = self.server_role(server_id, role_id).await?;
        if role.id == OWNER_ROLE_ID {
            return Err(AccessError::Forbidden("the owner role cannot be modified"));
        }

        let (actor_highest, actor_permissions) = self.actor_context(actor_id, server_id).await?;
        if role.position >= actor_highest {
            return Err(AccessError::Forbidden(
                "cannot modify a role with equal or higher position",
            ));
        }

        if let Some(mask) = update.permissions {
            validate_role_permissions(mask)?;
            if grants_beyond(actor_permissions, mask) {
                return Err(AccessError::Forbidden(
                    "cannot grant permissions you do not have",
                ));
            }
        }

        if let Some(name) = update.name {
            role.name = RoleName::try_from(name)?.into_string();
        }
        if let Some(color) = update.color {
            role.color = RoleColor::try_from(color)?.into_string();
        }
        let permissions_changed = update
            .permissions
            .is_some_and(|mask| mask != role.permissions);
        if let Some(mask) = update.permissions {
            role.permissions = mask;
        }

        self.store
            .update_role(&role)
            .await
            .map_err(AccessError::wrap("updating role"))?;

        if permissions_changed {
            // a mask write can change the resolution of every member
            // holding the role on every channel; drop everything
            self.cache.clear().await;
        }
        Ok(AccessEvent::RoleUpdated { role })
    }

    /// Deletes a role below the actor. The default role and the owner
    /// role are protected.
    ///
    /// # Errors
    /// `NotFound`, `Forbidden`, `BadRequest` (default role), or `Store`.
    pub async fn delete_role(
        &self,
        actor_id: &str,
        server_id: &str,
        role_id: &str,
    ) -> Result<AccessEvent, AccessError> {
        let role = self.server_role(server_id, role_id).await?;
        if role.id == OWNER_ROLE_ID {
            return Err(AccessError::Forbidden("the owner role cannot be deleted"));
        }
        if role.is_default {
            return Err(AccessError::BadRequest(String::from(
                "cannot delete the default role",
            )));
        }

        let (actor_highest, _) = self.actor_context(actor_id, server_id).await?;
        if role.position >= actor_highest {
            return Err(AccessError::Forbidden(
                "cannot delete a role with equal or higher position",
            ));
        }

        self.store
            .delete_role(role_id)
            .await
            .map_err(AccessError::wrap("deleting role"))?;
        self.cache.clear().await;
        Ok(AccessEvent::RoleDeleted {
            role_id: role_id.to_owned(),
        })
    }

    /// Bulk position update. Every touched role must sit below the actor
    /// both at its current and its requested position.
    ///
    /// Positions never feed permission computation, so no cache entries
    /// are invalidated here.
    ///
    /// # Errors
    /// `BadRequest` on an empty batch or a default-role entry;
    /// `Forbidden` on owner-role entries and hierarchy violations;
    /// `NotFound`/`Store` from the store.
    pub async fn reorder_roles(
        &self,
        actor_id: &str,
        server_id: &str,
        items: &[PositionUpdate],
    ) -> Result<AccessEvent, AccessError> {
        if items.is_empty() {
            return Err(AccessError::BadRequest(String::from(
                "items cannot be empty",
            )));
        }

        let (actor_highest, _) = self.actor_context(actor_id, server_id).await?;
        for item in items {
            let role = self.server_role(server_id, &item.id).await?;
            if role.id == OWNER_ROLE_ID {
                return Err(AccessError::Forbidden("the owner role cannot be reordered"));
            }
            if role.is_default {
                return Err(AccessError::BadRequest(String::from(
                    "cannot reorder the default role",
                )));
            }
            if role.position >= actor_highest {
                return Err(AccessError::Forbidden(
                    "cannot reorder a role with equal or higher position",
                ));
            }
            if item.position >= actor_highest {
                return Err(AccessError::Forbidden(
                    "cannot move a role to equal or higher position than your own",
                ));
            }
        }

        self.store
            .update_positions(items)
            .await
            .map_err(AccessError::wrap("updating role positions"))?;

        let roles = self.roles(server_id).await?;
        Ok(AccessEvent::RolesReordered { roles })
    }

    async fn actor_context(
        &self,
        actor_id: &str,
        server_id: &str,
    ) -> Result<(i32, PermissionSet), AccessError> {
        let roles = self
            .store
            .roles_by_user_and_server(actor_id, server_id)
            .await
            .map_err(AccessError::wrap("fetching actor roles"))?;
        Ok((highest_position(&roles), base_permissions(&roles)))
    }

    async fn server_role(&self, server_id: &str, role_id: &str) -> Result<Role, AccessError> {
        let role = self
            .store
            .role_by_id(role_id)
            .await
            .map_err(AccessError::wrap("fetching role"))?;
        if role.server_id != server_id {
            return Err(AccessError::NotFound("role"));
        }
        Ok(role)
    }

    async fn new_role_position(
        &self,
        server_id: &str,
        actor_highest: i32,
    ) -> Result<i32, AccessError> {
        // owner actors are position-exempt; their roles go on top of the
        // existing stack rather than below i32::MAX
        if actor_highest == i32::MAX {
            let roles = self
                .store
                .all_roles_by_server(server_id)
                .await
                .map_err(AccessError::wrap("listing roles"))?;
            let top = roles
                .iter()
                .filter(|role| role.id != OWNER_ROLE_ID)
                .map(|role| role.position)
                .max()
                .unwrap_or(0);
            return Ok(top.saturating_add(1));
        }
        Ok(actor_highest.saturating_sub(1).max(1))
    }
}

fn unix_now() -> i64 {
    UNIX_EPOCH
        .elapsed()
        .ok()
        .and_then(|elapsed| i64::try_from(elapsed.as_secs()).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use palisade_core::{Permission, PermissionSet, PositionUpdate, Role, OWNER_ROLE_ID};

    use super::{NewRole, RoleService, RoleUpdate};
    use crate::{
        cache::{CacheConfig, PermissionCache},
        error::AccessError,
        events::AccessEvent,
        memory::InMemoryStore,
    };

    fn set(permissions: &[Permission]) -> PermissionSet {
        let mut mask = PermissionSet::empty();
        for permission in permissions {
            mask.insert(*permission);
        }
        mask
    }

    fn role(id: &str, position: i32, permissions: PermissionSet, is_default: bool) -> Role {
        Role {
            id: id.to_owned(),
            server_id: String::from("s1"),
            name: id.to_owned(),
            color: String::from("#99aab5"),
            position,
            permissions,
            is_default,
            created_at_unix: 0,
        }
    }

    async fn fixture() -> (Arc<InMemoryStore>, Arc<PermissionCache>, RoleService<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(PermissionCache::new(&CacheConfig::default()));

        store
            .add_role(role(OWNER_ROLE_ID, 100, PermissionSet::all(), false))
            .await;
        store
            .add_role(role(
                "mod",
                5,
                set(&[
                    Permission::ManageRoles,
                    Permission::ManageMessages,
                    Permission::SendMessages,
                    Permission::ViewChannel,
                ]),
                false,
            ))
            .await;
        store
            .add_role(role(
                "member",
                1,
                set(&[Permission::ViewChannel, Permission::SendMessages]),
                true,
            ))
            .await;
        store.assign("owner_user", OWNER_ROLE_ID).await;
        store.assign("mod_user", "mod").await;

        let service = RoleService::new(Arc::clone(&store), Arc::clone(&cache));
        (store, cache, service)
    }

    fn new_role(permissions: PermissionSet) -> NewRole {
        NewRole {
            name: String::from("Helpers"),
            color: String::from("2ecc71"),
            permissions,
        }
    }

    #[tokio::test]
    async fn created_roles_slot_in_below_the_actor() {
        let (_store, _cache, service) = fixture().await;
        let event = service
            .create_role("mod_user", "s1", new_role(set(&[Permission::SendMessages])))
            .await
            .unwrap();
        let AccessEvent::RoleCreated { role } = event else {
            panic!("expected role_created event");
        };
        assert_eq!(role.position, 4);
        assert_eq!(role.color, "#2ecc71");
        assert!(!role.is_default);
    }

    #[tokio::test]
    async fn owner_actors_create_roles_on_top_of_the_stack() {
        let (_store, _cache, service) = fixture().await;
        let event = service
            .create_role("owner_user", "s1", new_role(set(&[Permission::SendMessages])))
            .await
            .unwrap();
        let AccessEvent::RoleCreated { role } = event else {
            panic!("expected role_created event");
        };
        assert_eq!(role.position, 6);
    }

    #[tokio::test]
    async fn escalation_is_blocked_for_non_admin_actors() {
        let (_store, _cache, service) = fixture().await;
        let err = service
            .create_role("mod_user", "s1", new_role(set(&[Permission::BanMembers])))
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Forbidden(_)));

        // admins grant freely: the owner role carries the Admin bit
        service
            .create_role("owner_user", "s1", new_role(set(&[Permission::BanMembers])))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invalid_payloads_are_bad_requests() {
        let (_store, _cache, service) = fixture().await;

        let mut req = new_role(set(&[Permission::SendMessages]));
        req.name = String::from("   ");
        assert!(matches!(
            service.create_role("mod_user", "s1", req).await.unwrap_err(),
            AccessError::BadRequest(_)
        ));

        let mut req = new_role(set(&[Permission::SendMessages]));
        req.color = String::from("not-a-color");
        assert!(matches!(
            service.create_role("mod_user", "s1", req).await.unwrap_err(),
            AccessError::BadRequest(_)
        ));

        let req = new_role(PermissionSet::from_bits(1 << 50));
        assert!(matches!(
            service.create_role("owner_user", "s1", req).await.unwrap_err(),
            AccessError::BadRequest(_)
        ));
    }

    #[tokio::test]
    async fn hierarchy_comparisons_fail_on_ties() {
        let (store, _cache, service) = fixture().await;
        store
            .add_role(role("peer", 5, set(&[Permission::SendMessages]), false))
            .await;

        // mod_user's highest position is 5; a position 5 role is out of
        // reach, a position 4 role is not
        let err = service
            .update_role("mod_user", "s1", "peer", RoleUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Forbidden(_)));

        store
            .add_role(role("junior", 4, set(&[Permission::SendMessages]), false))
            .await;
        service
            .update_role(
                "mod_user",
                "s1",
                "junior",
                RoleUpdate {
                    name: Some(String::from("Juniors")),
                    ..RoleUpdate::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn the_owner_role_is_immune_to_every_mutation() {
        let (_store, _cache, service) = fixture().await;

        assert!(matches!(
            service
                .update_role("owner_user", "s1", OWNER_ROLE_ID, RoleUpdate::default())
                .await
                .unwrap_err(),
            AccessError::Forbidden(_)
        ));
        assert!(matches!(
            service
                .delete_role("owner_user", "s1", OWNER_ROLE_ID)
                .await
                .unwrap_err(),
            AccessError::Forbidden(_)
        ));
        assert!(matches!(
            service
                .reorder_roles(
                    "owner_user",
                    "s1",
                    &[PositionUpdate {
                        id: OWNER_ROLE_ID.to_owned(),
                        position: 1,
                    }],
                )
                .await
                .unwrap_err(),
            AccessError::Forbidden(_)
        ));
    }

    #[tokio::test]
    async fn the_default_role_cannot_be_deleted_or_reordered() {
        let (_store, _cache, service) = fixture().await;
        assert!(matches!(
            service
                .delete_role("owner_user", "s1", "member")
                .await
                .unwrap_err(),
            AccessError::BadRequest(_)
        ));
        assert!(matches!(
            service
                .reorder_roles(
                    "owner_user",
                    "s1",
                    &[PositionUpdate {
                        id: String::from("member"),
                        position: 3,
                    }],
                )
                .await
                .unwrap_err(),
            AccessError::BadRequest(_)
        ));
    }

    #[tokio::test]
    async fn permission_updates_clear_the_cache_but_cosmetic_updates_do_not() {
        let (store, cache, service) = fixture().await;
        store
            .add_role(role("junior", 2, set(&[Permission::SendMessages]), false))
            .await;
        cache
            .insert("someone", "somewhere", set(&[Permission::SendMessages]))
            .await;

        service
            .update_role(
                "mod_user",
                "s1",
                "junior",
                RoleUpdate {
                    name: Some(String::from("Renamed")),
                    ..RoleUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cache.len().await, 1);

        service
            .update_role(
                "mod_user",
                "s1",
                "junior",
                RoleUpdate {
                    permissions: Some(set(&[Permission::ViewChannel])),
                    ..RoleUpdate::default()
                },
            )
            .await
            .unwrap();
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn deleting_a_role_clears_the_cache() {
        let (store, cache, service) = fixture().await;
        store
            .add_role(role("junior", 2, set(&[Permission::SendMessages]), false))
            .await;
        cache
            .insert("someone", "somewhere", set(&[Permission::SendMessages]))
            .await;

        service
            .delete_role("mod_user", "s1", "junior")
            .await
            .unwrap();
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn reorders_are_bounded_by_the_actor_in_both_directions() {
        let (store, _cache, service) = fixture().await;
        store
            .add_role(role("junior", 2, set(&[Permission::SendMessages]), false))
            .await;

        assert!(matches!(
            service.reorder_roles("mod_user", "s1", &[]).await.unwrap_err(),
            AccessError::BadRequest(_)
        ));

        // the target role is reachable, the requested position is not
        let err = service
            .reorder_roles(
                "mod_user",
                "s1",
                &[PositionUpdate {
                    id: String::from("junior"),
                    position: 5,
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Forbidden(_)));

        let event = service
            .reorder_roles(
                "mod_user",
                "s1",
                &[PositionUpdate {
                    id: String::from("junior"),
                    position: 3,
                }],
            )
            .await
            .unwrap();
        let AccessEvent::RolesReordered { roles } = event else {
            panic!("expected roles_reordered event");
        };
        let junior = roles.iter().find(|r| r.id == "junior").unwrap();
        assert_eq!(junior.position, 3);
        // listing comes back highest first
        assert!(roles.windows(2).all(|w| w[0].position >= w[1].position));
    }

    #[tokio::test]
    async fn roles_from_other_servers_are_invisible() {
        let (store, _cache, service) = fixture().await;
        let mut foreign = role("foreign", 1, set(&[Permission::SendMessages]), false);
        foreign.server_id = String::from("s2");
        store.add_role(foreign).await;

        let err = service
            .update_role("owner_user", "s1", "foreign", RoleUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::NotFound("role")));
    }
}
