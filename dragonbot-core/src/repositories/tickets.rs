// dragonbot-core/src/repositories/tickets.rs
//
// Maps `Ticket` to and from the `tickets` and `ticket_participants` tables.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dragonbot_common::error::Error;
use dragonbot_common::models::{CloseMessageKind, Ticket, TicketStatus, TicketType};
use tracing::warn;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker, UserMarker};
use twilight_model::id::Id;

use crate::db::{Criteria, Record, SqlValue, TableStore};

pub const TICKETS_TABLE: &str = "tickets";
pub const PARTICIPANTS_TABLE: &str = "ticket_participants";

/// Column values of a ticket that has not been assigned an id yet.
#[derive(Debug, Clone)]
pub struct NewTicketRow {
    pub channel_id: Id<ChannelMarker>,
    pub guild_id: Id<GuildMarker>,
    pub ticket_type: TicketType,
    pub status: TicketStatus,
    pub close_message_id: Option<Id<MessageMarker>>,
    pub close_message_kind: Option<CloseMessageKind>,
    pub auto_timeout: i32,
}

impl NewTicketRow {
    fn to_record(&self) -> Record {
        Record::new()
            .with("channel_id", self.channel_id)
            .with("guild_id", self.guild_id)
            .with("ticket_type", self.ticket_type.as_str())
            .with("status", self.status.as_i16())
            .with("close_msg_id", self.close_message_id)
            .with("close_msg_type", self.close_message_kind.map(CloseMessageKind::as_i16))
            .with("auto_timeout", self.auto_timeout)
            .with("timed_out", false)
    }
}

fn small_int(row: &Record, column: &str) -> Result<i16, Error> {
    let raw = row.int(column)?;
    i16::try_from(raw).map_err(|_| Error::Parse(format!("column {column}: {raw} out of range")))
}

fn ticket_from_record(row: &Record, participants: BTreeSet<Id<UserMarker>>) -> Result<Ticket, Error> {
    let ticket_type = TicketType::parse(row.text("ticket_type")?)
        .ok_or_else(|| Error::Parse(format!("unknown ticket type {:?}", row.get("ticket_type"))))?;
    let status = TicketStatus::from_i16(small_int(row, "status")?)
        .ok_or_else(|| Error::Parse(format!("unknown ticket status {:?}", row.get("status"))))?;
    let close_message_kind = match row.opt_int("close_msg_type")? {
        None => None,
        Some(raw) => Some(
            i16::try_from(raw)
                .ok()
                .and_then(CloseMessageKind::from_i16)
                .ok_or_else(|| Error::Parse(format!("unknown close message type {raw}")))?,
        ),
    };
    let auto_timeout = i32::try_from(row.int("auto_timeout")?)
        .map_err(|_| Error::Parse("auto_timeout out of range".into()))?;

    Ok(Ticket {
        id: row.int("id")?,
        channel_id: row.id("channel_id")?,
        guild_id: row.id("guild_id")?,
        ticket_type,
        status,
        close_message_id: row.opt_id("close_msg_id")?,
        close_message_kind,
        auto_timeout,
        timed_out: row.bool("timed_out")?,
        participants,
    })
}

#[derive(Clone)]
pub struct TicketRepository {
    store: Arc<dyn TableStore>,
}

impl TicketRepository {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    /// Every readable ticket with its participants, in two queries. Rows that do not
    /// parse are logged and left out.
    pub async fn load_all(&self) -> Result<Vec<Ticket>, Error> {
        let rows = self.store.select_all(TICKETS_TABLE, &Criteria::new()).await?;
        let links = self.store.select_all(PARTICIPANTS_TABLE, &Criteria::new()).await?;

        let mut by_ticket: BTreeMap<i64, BTreeSet<Id<UserMarker>>> = BTreeMap::new();
        for link in &links {
            match (link.int("ticket_id"), link.id("participant_id")) {
                (Ok(ticket_id), Ok(user_id)) => {
                    by_ticket.entry(ticket_id).or_default().insert(user_id);
                }
                (Err(e), _) | (_, Err(e)) => warn!("Skipping unreadable participant row: {}", e),
            }
        }

        let mut tickets = Vec::with_capacity(rows.len());
        for row in &rows {
            let parsed = row.int("id").and_then(|id| {
                let participants = by_ticket.remove(&id).unwrap_or_default();
                ticket_from_record(row, participants)
            });
            match parsed {
                Ok(ticket) => tickets.push(ticket),
                Err(e) => warn!(id = ?row.get("id"), "Skipping unreadable ticket row: {}", e),
            }
        }
        Ok(tickets)
    }

    pub async fn find_by_id(&self, ticket_id: i64) -> Result<Option<Ticket>, Error> {
        self.find(Criteria::new().eq("id", ticket_id)).await
    }

    pub async fn find_by_channel(&self, channel_id: Id<ChannelMarker>) -> Result<Option<Ticket>, Error> {
        self.find(Criteria::new().eq("channel_id", channel_id)).await
    }

    async fn find(&self, criteria: Criteria) -> Result<Option<Ticket>, Error> {
        let Some(row) = self.store.select_one(TICKETS_TABLE, &criteria).await? else {
            return Ok(None);
        };
        let participants = self.load_participants(row.int("id")?).await?;
        ticket_from_record(&row, participants).map(Some)
    }

    pub async fn load_participants(&self, ticket_id: i64) -> Result<BTreeSet<Id<UserMarker>>, Error> {
        let links = self
            .store
            .select_all(PARTICIPANTS_TABLE, &Criteria::new().eq("ticket_id", ticket_id))
            .await?;
        links.iter().map(|l| l.id("participant_id")).collect()
    }

    /// Inserts the row and returns the id the store assigned.
    pub async fn insert(&self, row: &NewTicketRow) -> Result<i64, Error> {
        match self.store.insert(TICKETS_TABLE, &row.to_record(), "id").await? {
            SqlValue::Int(id) => Ok(id),
            other => Err(Error::Parse(format!("ticket insert returned {other:?} as id"))),
        }
    }

    pub async fn set_status(&self, ticket_id: i64, status: TicketStatus) -> Result<u64, Error> {
        let data = Record::new().with("status", status.as_i16());
        self.store
            .update(TICKETS_TABLE, &data, &Criteria::new().eq("id", ticket_id))
            .await
    }

    pub async fn set_close_message(
        &self,
        ticket_id: i64,
        message_id: Id<MessageMarker>,
        kind: CloseMessageKind,
    ) -> Result<u64, Error> {
        let data = Record::new()
            .with("close_msg_id", message_id)
            .with("close_msg_type", kind.as_i16());
        self.store
            .update(TICKETS_TABLE, &data, &Criteria::new().eq("id", ticket_id))
            .await
    }

    /// Removes the ticket and its participant links.
    pub async fn delete(&self, ticket_id: i64) -> Result<u64, Error> {
        self.store
            .delete(PARTICIPANTS_TABLE, &Criteria::new().eq("ticket_id", ticket_id))
            .await?;
        self.store
            .delete(TICKETS_TABLE, &Criteria::new().eq("id", ticket_id))
            .await
    }

    pub async fn add_participants(&self, ticket_id: i64, users: &[Id<UserMarker>]) -> Result<u64, Error> {
        if users.is_empty() {
            return Ok(0);
        }
        let rows: Vec<Record> = users
            .iter()
            .map(|u| Record::new().with("ticket_id", ticket_id).with("participant_id", *u))
            .collect();
        self.store.insert_many(PARTICIPANTS_TABLE, &rows).await
    }

    pub async fn remove_participants(&self, ticket_id: i64, users: &[Id<UserMarker>]) -> Result<u64, Error> {
        if users.is_empty() {
            return Ok(0);
        }
        let criteria = Criteria::new()
            .eq("ticket_id", ticket_id)
            .any_of("participant_id", users.iter().copied());
        self.store.delete(PARTICIPANTS_TABLE, &criteria).await
    }
}
