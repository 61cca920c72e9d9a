use std::collections::{HashMap, HashSet};

use palisade_core::{apply_override_masks, ChannelOverride, Permission, PermissionSet};

/// Per-user channel visibility decisions for one server, computed once
/// per listing request and queried per channel in O(1).
///
/// Channels fall into exactly one bucket: hidden (base had ViewChannel,
/// an override removed it), granted (base lacked it, an override added
/// it), or default (follow the base bit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityFilter {
    is_admin: bool,
    has_base_view: bool,
    hidden_channels: HashSet<String>,
    granted_channels: HashSet<String>,
}

impl VisibilityFilter {
    pub(crate) fn admin() -> Self {
        Self {
            is_admin: true,
            has_base_view: true,
            hidden_channels: HashSet::new(),
            granted_channels: HashSet::new(),
        }
    }

    /// Groups the user's overrides by channel, ORs each channel's masks,
    /// and classifies the channel against the base ViewChannel bit using
    /// the same formula resolution uses.
    pub(crate) fn classify(base: PermissionSet, overrides: Vec<ChannelOverride>) -> Self {
        let has_base_view = base.has(Permission::ViewChannel);

        let mut by_channel: HashMap<String, (u64, u64)> = HashMap::new();
        for entry in overrides {
            let masks = by_channel.entry(entry.channel_id).or_insert((0, 0));
            masks.0 |= entry.allow.bits();
            masks.1 |= entry.deny.bits();
        }

        let mut hidden_channels = HashSet::new();
        let mut granted_channels = HashSet::new();
        for (channel_id, (allow, deny)) in by_channel {
            let effective = apply_override_masks(
                base,
                PermissionSet::from_bits(allow),
                PermissionSet::from_bits(deny),
            );
            let has_view = effective.has(Permission::ViewChannel);
            if has_base_view && !has_view {
                hidden_channels.insert(channel_id);
            } else if !has_base_view && has_view {
                granted_channels.insert(channel_id);
            }
        }

        Self {
            is_admin: false,
            has_base_view,
            hidden_channels,
            granted_channels,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    #[must_use]
    pub fn can_see(&self, channel_id: &str) -> bool {
        if self.is_admin {
            return true;
        }
        if self.hidden_channels.contains(channel_id) {
            return false;
        }
        if self.granted_channels.contains(channel_id) {
            return true;
        }
        self.has_base_view
    }
}
