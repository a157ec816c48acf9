use serde::{Deserialize, Serialize};
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker};
use twilight_model::id::Id;

/// Locator of the "open a ticket" message of one guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PanelMessage {
    pub guild_id: Id<GuildMarker>,
    pub channel_id: Id<ChannelMarker>,
    pub message_id: Id<MessageMarker>,
}

impl PanelMessage {
    pub fn jump_url(&self) -> String {
        format!(
            "https://discord.com/channels/{}/{}/{}",
            self.guild_id, self.channel_id, self.message_id
        )
    }

    /// True when every provided field equals ours. `None` matches anything.
    pub fn matches(
        &self,
        guild_id: Option<Id<GuildMarker>>,
        channel_id: Option<Id<ChannelMarker>>,
        message_id: Option<Id<MessageMarker>>,
    ) -> bool {
        guild_id.is_none_or(|g| g == self.guild_id)
            && channel_id.is_none_or(|c| c == self.channel_id)
            && message_id.is_none_or(|m| m == self.message_id)
    }
}
