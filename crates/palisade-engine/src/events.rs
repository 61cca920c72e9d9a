use serde::Serialize;

use palisade_core::{ChannelOverride, Role};

/// Domain event produced by a successful mutation.
///
/// The engine only returns these; broadcasting them to connected clients
/// is the caller's responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AccessEvent {
    OverrideSet {
        entry: ChannelOverride,
    },
    OverrideRemoved {
        channel_id: String,
        role_id: String,
    },
    RoleCreated {
        role: Role,
    },
    RoleUpdated {
        role: Role,
    },
    RoleDeleted {
        role_id: String,
    },
    RolesReordered {
        roles: Vec<Role>,
    },
    MemberRolesModified {
        user_id: String,
        roles: Vec<Role>,
    },
}

#[cfg(test)]
mod tests {
    use palisade_core::{ChannelOverride, Permission, PermissionSet};
    use serde_json::json;

    use super::AccessEvent;

    #[test]
    fn override_events_serialize_with_snake_case_tags() {
        let set = AccessEvent::OverrideSet {
            entry: ChannelOverride {
                channel_id: String::from("c1"),
                role_id: String::from("r1"),
                allow: PermissionSet::from(Permission::SendMessages),
                deny: PermissionSet::empty(),
            },
        };
        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(value["event"], "override_set");
        assert_eq!(value["entry"]["channel_id"], "c1");
        assert_eq!(value["entry"]["allow"], json!(1_u64 << 5));

        let removed = AccessEvent::OverrideRemoved {
            channel_id: String::from("c1"),
            role_id: String::from("r1"),
        };
        let value = serde_json::to_value(&removed).unwrap();
        assert_eq!(value["event"], "override_removed");
        assert_eq!(value["role_id"], "r1");
    }

    #[test]
    fn role_events_carry_their_payload_inline() {
        let deleted = AccessEvent::RoleDeleted {
            role_id: String::from("r9"),
        };
        let value = serde_json::to_value(&deleted).unwrap();
        assert_eq!(value["event"], "role_deleted");
        assert_eq!(value["role_id"], "r9");
    }
}
