// File: src/cache/panel_cache.rs

use dashmap::DashMap;
use dragonbot_common::models::PanelMessage;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker};
use twilight_model::id::Id;

/// The live panel of each guild.
#[derive(Debug, Default)]
pub struct PanelCache {
    panels: DashMap<Id<GuildMarker>, PanelMessage>,
}

impl PanelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, panel: PanelMessage) {
        self.panels.insert(panel.guild_id, panel);
    }

    pub fn get(&self, guild_id: Id<GuildMarker>) -> Option<PanelMessage> {
        self.panels.get(&guild_id).map(|p| *p)
    }

    pub fn find(
        &self,
        guild_id: Option<Id<GuildMarker>>,
        channel_id: Option<Id<ChannelMarker>>,
        message_id: Option<Id<MessageMarker>>,
    ) -> Option<PanelMessage> {
        if let Some(g) = guild_id {
            return self.get(g).filter(|p| p.matches(None, channel_id, message_id));
        }
        self.panels
            .iter()
            .find(|entry| entry.matches(None, channel_id, message_id))
            .map(|entry| *entry.value())
    }

    pub fn remove(&self, guild_id: Id<GuildMarker>) -> Option<PanelMessage> {
        self.panels.remove(&guild_id).map(|(_, p)| p)
    }

    /// Drops every panel matching the given locator parts and returns them.
    pub fn remove_matching(
        &self,
        guild_id: Option<Id<GuildMarker>>,
        channel_id: Option<Id<ChannelMarker>>,
        message_id: Option<Id<MessageMarker>>,
    ) -> Vec<PanelMessage> {
        let mut removed = Vec::new();
        self.panels.retain(|_, panel| {
            if panel.matches(guild_id, channel_id, message_id) {
                removed.push(*panel);
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }
}
