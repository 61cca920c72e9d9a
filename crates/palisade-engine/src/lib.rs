#![forbid(unsafe_code)]
// store traits are consumed through generics, never as trait objects;
// callers own any Send bounds they need
#![allow(async_fn_in_trait)]

//! Channel-scoped access control engine.
//!
//! Computes the effective permission set for any (user, channel) pair
//! from server-scoped roles and per-channel allow/deny overrides, with a
//! TTL cache over the hot path, a bulk visibility filter for channel
//! listings, and hierarchy-enforced role and member management.
//!
//! The engine is a library consumed in-process: persistence lives behind
//! the narrow store traits in [`store`], and mutations hand back an
//! [`AccessEvent`] for the embedding service to broadcast.

mod cache;
mod engine;
mod error;
mod events;
mod members;
mod memory;
mod roles;
mod store;
mod visibility;

pub use cache::{
    CacheConfig, CacheSweeper, PermissionCache, DEFAULT_CACHE_SWEEP_INTERVAL_SECS,
    DEFAULT_PERMISSION_CACHE_TTL_SECS,
};
pub use engine::PermissionEngine;
pub use error::{AccessError, StoreError};
pub use events::AccessEvent;
pub use members::MemberAuthority;
pub use memory::InMemoryStore;
pub use roles::{NewRole, RoleService, RoleUpdate};
pub use store::{ChannelLookup, ChannelRef, OverrideStore, RoleLookup, RoleStore};
pub use visibility::VisibilityFilter;
