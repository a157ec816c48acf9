// Platform-neutral values exchanged with the chat-platform client.

use serde::{Deserialize, Serialize};
use twilight_model::id::marker::{GuildMarker, RoleMarker, UserMarker};
use twilight_model::id::Id;

use crate::models::controls::ControlSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Visible,
    Hidden,
}

impl Visibility {
    pub fn from_visible(visible: bool) -> Self {
        if visible { Visibility::Visible } else { Visibility::Hidden }
    }
}

/// Result of probing whether a remote object still exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Presence {
    Present,
    /// The platform confirmed the object is gone.
    Missing,
    /// The probe failed for another reason (forbidden, network).
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: String,
    pub controls: Option<ControlSet>,
    pub attachment: Option<Attachment>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_controls(mut self, controls: ControlSet) -> Self {
        self.controls = Some(controls);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Request for a fresh ticket channel: default role denied, requester and staff allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicketChannel {
    pub guild_id: Id<GuildMarker>,
    pub name: String,
    pub requester: Id<UserMarker>,
    pub staff_role: Id<RoleMarker>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub user_id: Id<UserMarker>,
    pub display_name: String,
    pub roles: Vec<Id<RoleMarker>>,
    pub bot: bool,
}

impl MemberInfo {
    pub fn mention(&self) -> String {
        format!("<@{}>", self.user_id)
    }
}
