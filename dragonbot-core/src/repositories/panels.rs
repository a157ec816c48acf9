// dragonbot-core/src/repositories/panels.rs

use std::sync::Arc;

use dragonbot_common::error::Error;
use dragonbot_common::models::PanelMessage;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker};
use twilight_model::id::Id;

use crate::db::{Criteria, Record, TableStore};

pub const PANELS_TABLE: &str = "ticket_panels";

fn panel_from_record(row: &Record) -> Result<PanelMessage, Error> {
    Ok(PanelMessage {
        guild_id: row.id("guild_id")?,
        channel_id: row.id("channel_id")?,
        message_id: row.id("message_id")?,
    })
}

/// Builds criteria from whichever locator parts are known.
pub fn locator_criteria(
    guild_id: Option<Id<GuildMarker>>,
    channel_id: Option<Id<ChannelMarker>>,
    message_id: Option<Id<MessageMarker>>,
) -> Criteria {
    let mut criteria = Criteria::new();
    if let Some(g) = guild_id {
        criteria = criteria.eq("guild_id", g);
    }
    if let Some(c) = channel_id {
        criteria = criteria.eq("channel_id", c);
    }
    if let Some(m) = message_id {
        criteria = criteria.eq("message_id", m);
    }
    criteria
}

#[derive(Clone)]
pub struct PanelRepository {
    store: Arc<dyn TableStore>,
}

impl PanelRepository {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    pub async fn load_all(&self) -> Result<Vec<PanelMessage>, Error> {
        let rows = self.store.select_all(PANELS_TABLE, &Criteria::new()).await?;
        rows.iter().map(panel_from_record).collect()
    }

    pub async fn find(&self, criteria: &Criteria) -> Result<Option<PanelMessage>, Error> {
        self.store
            .select_one(PANELS_TABLE, criteria)
            .await?
            .as_ref()
            .map(panel_from_record)
            .transpose()
    }

    pub async fn insert(&self, panel: &PanelMessage) -> Result<(), Error> {
        let data = Record::new()
            .with("guild_id", panel.guild_id)
            .with("channel_id", panel.channel_id)
            .with("message_id", panel.message_id);
        self.store.insert(PANELS_TABLE, &data, "guild_id").await?;
        Ok(())
    }

    pub async fn update(&self, panel: &PanelMessage) -> Result<u64, Error> {
        let data = Record::new()
            .with("channel_id", panel.channel_id)
            .with("message_id", panel.message_id);
        self.store
            .update(PANELS_TABLE, &data, &Criteria::new().eq("guild_id", panel.guild_id))
            .await
    }

    pub async fn delete(&self, criteria: &Criteria) -> Result<u64, Error> {
        self.store.delete(PANELS_TABLE, criteria).await
    }
}
