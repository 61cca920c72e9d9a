#![forbid(unsafe_code)]

//! Domain model for channel-scoped access control: the permission bitmask,
//! roles and their hierarchy math, channel overrides and the algebra that
//! combines them into effective permissions.

use serde::{Deserialize, Serialize};

/// Returns the project code name.
#[must_use]
pub const fn project_name() -> &'static str {
    "palisade"
}

/// Sentinel id of the server owner role.
///
/// The owner role is exempt from all position math: it can never be edited,
/// deleted, or reordered, and a member holding it can never be the target of
/// kick, ban, or role modification.
pub const OWNER_ROLE_ID: &str = "owner";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("role name must be between 1 and 32 characters")]
    InvalidRoleName,
    #[error("color must be a six digit hex code")]
    InvalidRoleColor,
    #[error("permission mask contains unknown bits")]
    UnknownPermissionBits,
    #[error("override mask contains bits that cannot be overridden per channel")]
    NonOverridableBits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageChannels,
    ManageRoles,
    KickMembers,
    BanMembers,
    ManageMessages,
    SendMessages,
    ConnectVoice,
    Speak,
    Stream,
    Admin,
    ManageInvites,
    ReadMessages,
    ViewChannel,
    MuteMembers,
    DeafenMembers,
    MoveMembers,
}

const fn permission_mask(permission: Permission) -> u64 {
    match permission {
        Permission::ManageChannels => 1 << 0,
        Permission::ManageRoles => 1 << 1,
        Permission::KickMembers => 1 << 2,
        Permission::BanMembers => 1 << 3,
        Permission::ManageMessages => 1 << 4,
        Permission::SendMessages => 1 << 5,
        Permission::ConnectVoice => 1 << 6,
        Permission::Speak => 1 << 7,
        Permission::Stream => 1 << 8,
        Permission::Admin => 1 << 9,
        Permission::ManageInvites => 1 << 10,
        Permission::ReadMessages => 1 << 11,
        Permission::ViewChannel => 1 << 12,
        Permission::MuteMembers => 1 << 13,
        Permission::DeafenMembers => 1 << 14,
        Permission::MoveMembers => 1 << 15,
    }
}

const ALL_BITS: u64 = (1 << 16) - 1;

/// Bits that may appear in a channel override.
///
/// Server governance bits (ManageChannels, ManageRoles, KickMembers,
/// BanMembers, Admin, ManageInvites) stay global and are rejected by
/// [`validate_override_masks`].
pub const CHANNEL_OVERRIDABLE: PermissionSet = PermissionSet(
    permission_mask(Permission::ViewChannel)
        | permission_mask(Permission::ReadMessages)
        | permission_mask(Permission::SendMessages)
        | permission_mask(Permission::ManageMessages)
        | permission_mask(Permission::ConnectVoice)
        | permission_mask(Permission::Speak)
        | permission_mask(Permission::Stream)
        | permission_mask(Permission::MuteMembers)
        | permission_mask(Permission::DeafenMembers)
        | permission_mask(Permission::MoveMembers),
);

/// A set of permissions packed into a single `u64`.
///
/// The mask is the single source of truth; `Permission` values only name the
/// individual bits. `has`/`has_any`/`has_all` honor the Admin bypass, the
/// raw accessors (`contains`, `bits`) do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(u64);

impl PermissionSet {
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every known permission bit set. This is what an Admin resolves to.
    #[must_use]
    pub const fn all() -> Self {
        Self(ALL_BITS)
    }

    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw bit test without the Admin bypass.
    #[must_use]
    pub const fn contains(self, permission: Permission) -> bool {
        self.0 & permission_mask(permission) != 0
    }

    /// Capability check. Admin grants everything, so that bit is tested
    /// before the requested one.
    #[must_use]
    pub const fn has(self, permission: Permission) -> bool {
        if self.contains(Permission::Admin) {
            return true;
        }
        self.contains(permission)
    }

    /// True if any bit of `other` is held (or Admin).
    #[must_use]
    pub const fn has_any(self, other: Self) -> bool {
        if self.contains(Permission::Admin) {
            return true;
        }
        self.0 & other.0 != 0
    }

    /// True if every bit of `other` is held (or Admin).
    #[must_use]
    pub const fn has_all(self, other: Self) -> bool {
        if self.contains(Permission::Admin) {
            return true;
        }
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, permission: Permission) {
        self.0 |= permission_mask(permission);
    }

    pub fn remove(&mut self, permission: Permission) {
        self.0 &= !permission_mask(permission);
    }

    /// Bits present in this mask that name no known permission.
    #[must_use]
    pub const fn unknown_bits(self) -> u64 {
        self.0 & !ALL_BITS
    }
}

impl From<Permission> for PermissionSet {
    fn from(permission: Permission) -> Self {
        Self(permission_mask(permission))
    }
}

/// A role within one server. Positions rank authority (higher wins); ties
/// are insufficient for every hierarchy comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub server_id: String,
    pub name: String,
    pub color: String,
    pub position: i32,
    pub permissions: PermissionSet,
    pub is_default: bool,
    pub created_at_unix: i64,
}

/// Per-channel, per-role allow/deny masks adjusting base permissions for
/// that channel only. Overlapping bits are legal; allow wins ties through
/// the combination formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOverride {
    pub channel_id: String,
    pub role_id: String,
    pub allow: PermissionSet,
    pub deny: PermissionSet,
}

/// One entry of a bulk role reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: String,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleName(String);

impl RoleName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for RoleName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if !(1..=32).contains(&trimmed.chars().count()) {
            return Err(DomainError::InvalidRoleName);
        }
        Ok(Self(trimmed.to_owned()))
    }
}

/// A display color, normalized to a leading `#`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleColor(String);

impl RoleColor {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for RoleColor {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidRoleColor);
        }
        Ok(Self(format!("#{digits}")))
    }
}

/// OR of all role permission masks, ignoring channel overrides.
#[must_use]
pub fn base_permissions(roles: &[Role]) -> PermissionSet {
    PermissionSet::from_bits(
        roles
            .iter()
            .fold(0_u64, |bits, role| bits | role.permissions.bits()),
    )
}

/// The override formula: `(base & !deny) | allow`.
///
/// Deny strips bits from base first; allow re-adds its bits afterwards, so
/// an allow always beats a deny on the same bit.
#[must_use]
pub const fn apply_override_masks(
    base: PermissionSet,
    allow: PermissionSet,
    deny: PermissionSet,
) -> PermissionSet {
    PermissionSet::from_bits((base.bits() & !deny.bits()) | allow.bits())
}

/// Combines every override a user's roles hold on one channel into the
/// effective permission set.
///
/// All allow masks are ORed together, all deny masks likewise, and the two
/// aggregates go through [`apply_override_masks`] once. There is no
/// per-role sequencing: a deny contributed by one role strips the bit even
/// when another role granted it in base.
#[must_use]
pub fn apply_overrides(base: PermissionSet, overrides: &[ChannelOverride]) -> PermissionSet {
    let mut allow = 0_u64;
    let mut deny = 0_u64;
    for entry in overrides {
        allow |= entry.allow.bits();
        deny |= entry.deny.bits();
    }
    apply_override_masks(
        base,
        PermissionSet::from_bits(allow),
        PermissionSet::from_bits(deny),
    )
}

#[must_use]
pub fn has_owner_role(roles: &[Role]) -> bool {
    roles.iter().any(|role| role.id == OWNER_ROLE_ID)
}

/// Highest position across a role list; 0 when empty.
///
/// The owner role is not subject to position math and ranks above any
/// possible position value.
#[must_use]
pub fn highest_position(roles: &[Role]) -> i32 {
    if has_owner_role(roles) {
        return i32::MAX;
    }
    roles.iter().map(|role| role.position).max().unwrap_or(0)
}

/// Escalation guard: true when `requested` carries a bit the actor does
/// not hold. Admin actors may grant anything.
#[must_use]
pub const fn grants_beyond(actor: PermissionSet, requested: PermissionSet) -> bool {
    if actor.contains(Permission::Admin) {
        return false;
    }
    requested.bits() & !actor.bits() != 0
}

/// Rejects permission masks with bits outside the known layout.
///
/// # Errors
/// Returns [`DomainError::UnknownPermissionBits`] on any unnamed bit.
pub const fn validate_role_permissions(mask: PermissionSet) -> Result<(), DomainError> {
    if mask.unknown_bits() != 0 {
        return Err(DomainError::UnknownPermissionBits);
    }
    Ok(())
}

/// Validates an override payload's shape.
///
/// Only channel-activity bits may be overridden. Overlapping allow/deny
/// bits are accepted; the combination formula resolves them in favor of
/// allow.
///
/// # Errors
/// Returns [`DomainError::NonOverridableBits`] when either mask carries a
/// bit outside [`CHANNEL_OVERRIDABLE`].
pub const fn validate_override_masks(
    allow: PermissionSet,
    deny: PermissionSet,
) -> Result<(), DomainError> {
    if allow.bits() & !CHANNEL_OVERRIDABLE.bits() != 0 {
        return Err(DomainError::NonOverridableBits);
    }
    if deny.bits() & !CHANNEL_OVERRIDABLE.bits() != 0 {
        return Err(DomainError::NonOverridableBits);
    }
    Ok(())
}
