// File: dragonbot-core/src/services/tickets/panel_manager.rs
//
// One live "open a ticket" panel per guild.

use std::sync::Arc;

use tracing::{debug, info, warn};
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker};
use twilight_model::id::Id;

use dragonbot_common::error::{Error, InvariantViolation};
use dragonbot_common::models::{ControlSet, OutgoingMessage, PanelMessage, Presence};
use dragonbot_common::traits::platform_traits::{presence_of, TicketPlatform};

use crate::cache::PanelCache;
use crate::db::TableStore;
use crate::repositories::panels::locator_criteria;
use crate::repositories::PanelRepository;
use crate::services::tickets::reconcile::{reconcile_panels, PanelAction, PanelProbe};

const PANEL_TEXT: &str = "**Need help?**\nPick the kind of question below and a private ticket channel will be opened for you.";

pub struct TicketPanelManager {
    repo: PanelRepository,
    cache: Arc<PanelCache>,
    platform: Arc<dyn TicketPlatform>,
}

impl TicketPanelManager {
    pub fn new(store: Arc<dyn TableStore>, platform: Arc<dyn TicketPlatform>) -> Self {
        Self {
            repo: PanelRepository::new(store),
            cache: Arc::new(PanelCache::new()),
            platform,
        }
    }

    pub fn with_cache(mut self, cache: Arc<PanelCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<PanelCache> {
        &self.cache
    }

    /// Posts a panel in `channel_id` unless the guild already has a live one.
    ///
    /// A recorded panel whose message is confirmed gone is deleted first. If the probe
    /// itself fails the error is returned and nothing is written.
    pub async fn request_panel(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
    ) -> Result<PanelMessage, Error> {
        if let Some(existing) = self.get_panel(Some(guild_id), None, None).await? {
            match self.platform.fetch_message(existing.channel_id, existing.message_id).await {
                Ok(()) => {
                    return Err(InvariantViolation::PanelExists {
                        guild_id: guild_id.get(),
                        channel_id: existing.channel_id.get(),
                        message_id: existing.message_id.get(),
                    }
                    .into());
                }
                Err(e) if e.is_not_found() => {
                    info!(%guild_id, "Recorded panel is gone, replacing it");
                    self.delete_panel_by_guild(guild_id).await?;
                }
                Err(e) => return Err(e),
            }
        }

        let message = OutgoingMessage::text(PANEL_TEXT).with_controls(ControlSet::ticket_creation());
        let message_id = self.platform.send_message(channel_id, message).await?;
        let panel = PanelMessage {
            guild_id,
            channel_id,
            message_id,
        };
        self.insert_or_update_panel(panel).await?;
        info!(%guild_id, %channel_id, %message_id, "Ticket panel created");
        Ok(panel)
    }

    /// Cache first, then the store. With no locator parts at all there is nothing to find.
    pub async fn get_panel(
        &self,
        guild_id: Option<Id<GuildMarker>>,
        channel_id: Option<Id<ChannelMarker>>,
        message_id: Option<Id<MessageMarker>>,
    ) -> Result<Option<PanelMessage>, Error> {
        if guild_id.is_none() && channel_id.is_none() && message_id.is_none() {
            return Ok(None);
        }
        if let Some(panel) = self.cache.find(guild_id, channel_id, message_id) {
            return Ok(Some(panel));
        }
        let found = self
            .repo
            .find(&locator_criteria(guild_id, channel_id, message_id))
            .await?;
        if let Some(panel) = found {
            self.cache.insert(panel);
        }
        Ok(found)
    }

    pub async fn insert_or_update_panel(&self, panel: PanelMessage) -> Result<(), Error> {
        self.cache.insert(panel);
        let exists = self
            .repo
            .find(&locator_criteria(Some(panel.guild_id), None, None))
            .await?
            .is_some();
        if exists {
            self.repo.update(&panel).await?;
        } else {
            self.repo.insert(&panel).await?;
        }
        Ok(())
    }

    /// Deletes every panel matching the locator parts. At least one part is required.
    pub async fn delete_panel(
        &self,
        guild_id: Option<Id<GuildMarker>>,
        channel_id: Option<Id<ChannelMarker>>,
        message_id: Option<Id<MessageMarker>>,
    ) -> Result<u64, Error> {
        let criteria = locator_criteria(guild_id, channel_id, message_id);
        if criteria.is_empty() {
            return Err(Error::EmptyCriteria {
                operation: "delete",
                table: crate::repositories::panels::PANELS_TABLE.to_string(),
            });
        }
        let dropped = self.cache.remove_matching(guild_id, channel_id, message_id);
        let deleted = self.repo.delete(&criteria).await?;
        debug!(cached = dropped.len(), deleted, "Deleted ticket panel records");
        Ok(deleted)
    }

    pub async fn delete_panel_by_guild(&self, guild_id: Id<GuildMarker>) -> Result<u64, Error> {
        self.delete_panel(Some(guild_id), None, None).await
    }

    /// Gateway hook: a channel was deleted. Returns whether it held a panel.
    pub async fn handle_channel_deleted(
        &self,
        guild_id: Option<Id<GuildMarker>>,
        channel_id: Id<ChannelMarker>,
    ) -> Result<bool, Error> {
        if self.get_panel(guild_id, Some(channel_id), None).await?.is_none() {
            return Ok(false);
        }
        info!(%channel_id, "Panel channel deleted, forgetting panel");
        Ok(self.delete_panel(guild_id, Some(channel_id), None).await? > 0)
    }

    /// Gateway hook: a message was deleted. Returns whether it was a panel.
    pub async fn handle_message_deleted(
        &self,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
    ) -> Result<bool, Error> {
        if self.get_panel(None, Some(channel_id), Some(message_id)).await?.is_none() {
            return Ok(false);
        }
        info!(%message_id, "Panel message deleted, forgetting panel");
        Ok(self.delete_panel(None, None, Some(message_id)).await? > 0)
    }

    async fn probe(&self, panel: PanelMessage) -> PanelProbe {
        let guild = presence_of(&self.platform.resolve_guild(panel.guild_id).await);
        let channel = if guild == Presence::Present {
            presence_of(&self.platform.resolve_channel(panel.channel_id).await)
        } else {
            Presence::Unknown
        };
        let message = if channel == Presence::Present {
            presence_of(&self.platform.fetch_message(panel.channel_id, panel.message_id).await)
        } else {
            Presence::Unknown
        };
        PanelProbe {
            panel,
            guild,
            channel,
            message,
        }
    }

    /// Startup: keeps the panels that still resolve (controls reattached, cached) and
    /// deletes the rest. Returns the kept panels.
    pub async fn load_ticket_panel_messages(&self) -> Result<Vec<PanelMessage>, Error> {
        let panels = self.repo.load_all().await?;
        let mut probes = Vec::with_capacity(panels.len());
        for panel in panels {
            probes.push(self.probe(panel).await);
        }

        let mut kept = Vec::new();
        for action in reconcile_panels(&probes) {
            match action {
                PanelAction::Keep(panel) => {
                    if let Err(e) = self
                        .platform
                        .set_message_controls(panel.channel_id, panel.message_id, Some(ControlSet::ticket_creation()))
                        .await
                    {
                        warn!(guild_id = %panel.guild_id, "Could not reattach panel controls: {}", e);
                    }
                    self.cache.insert(panel);
                    kept.push(panel);
                }
                PanelAction::Delete(panel) => {
                    warn!(guild_id = %panel.guild_id, "Panel no longer resolves, deleting record");
                    self.cache.remove(panel.guild_id);
                    if let Err(e) = self.repo.delete(&locator_criteria(Some(panel.guild_id), None, None)).await {
                        warn!(guild_id = %panel.guild_id, "Could not delete stale panel: {}", e);
                    }
                }
            }
        }
        info!("Loaded {} ticket panels.", kept.len());
        Ok(kept)
    }
}
