// File: src/cache/ticket_cache.rs

use dashmap::DashMap;
use dragonbot_common::models::Ticket;
use twilight_model::id::marker::ChannelMarker;
use twilight_model::id::Id;

/// Tickets keyed by id. Entries are handed out as clones; no reference into the map
/// survives a call, so callers may hold results across `.await`.
#[derive(Debug, Default)]
pub struct TicketCache {
    tickets: DashMap<i64, Ticket>,
}

impl TicketCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ticket: Ticket) {
        self.tickets.insert(ticket.id, ticket);
    }

    /// Replaces the whole content with `tickets`.
    pub fn replace_all(&self, tickets: impl IntoIterator<Item = Ticket>) {
        self.tickets.clear();
        for t in tickets {
            self.insert(t);
        }
    }

    pub fn get(&self, ticket_id: i64) -> Option<Ticket> {
        self.tickets.get(&ticket_id).map(|t| t.clone())
    }

    /// Linear scan; there is no secondary index on channel.
    pub fn find_by_channel(&self, channel_id: Id<ChannelMarker>) -> Option<Ticket> {
        self.tickets
            .iter()
            .find(|entry| entry.channel_id == channel_id)
            .map(|entry| entry.value().clone())
    }

    /// Applies `f` to the cached ticket while holding its shard lock.
    pub fn update<R>(&self, ticket_id: i64, f: impl FnOnce(&mut Ticket) -> R) -> Option<R> {
        self.tickets.get_mut(&ticket_id).map(|mut t| f(&mut t))
    }

    pub fn remove(&self, ticket_id: i64) -> Option<Ticket> {
        self.tickets.remove(&ticket_id).map(|(_, t)| t)
    }

    pub fn all(&self) -> Vec<Ticket> {
        self.tickets.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}
