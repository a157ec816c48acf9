use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker, UserMarker};
use twilight_model::id::Id;

use crate::models::controls::CloseMessageKind;

/// Lifecycle state of a ticket. The discriminants are what the `status` column stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketStatus {
    Open = 0,
    InProgress = 1,
    Resolved = 2,
    Closed = 3,
}

impl TicketStatus {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(TicketStatus::Open),
            1 => Some(TicketStatus::InProgress),
            2 => Some(TicketStatus::Resolved),
            3 => Some(TicketStatus::Closed),
            _ => None,
        }
    }

    /// Upper-case label used in channel names.
    pub fn label(self) -> &'static str {
        match self {
            TicketStatus::Open => "OPEN",
            TicketStatus::InProgress => "IN_PROGRESS",
            TicketStatus::Resolved => "RESOLVED",
            TicketStatus::Closed => "CLOSED",
        }
    }

    /// Whether moving from `self` to `next` is allowed. Staying put is always allowed
    /// (callers treat it as a no-op).
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        match (self, next) {
            (a, b) if a == b => true,
            (Closed, Open) => true,
            (Closed, _) => false,
            (_, Closed) => true,
            (Open, InProgress) | (Open, Resolved) | (InProgress, Resolved) => true,
            _ => false,
        }
    }

    /// Participants can see the channel in every state except CLOSED.
    pub fn grants_visibility(self) -> bool {
        self != TicketStatus::Closed
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Category picked on the panel when the ticket is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketType {
    Purchase,
    Group,
    Other,
}

impl TicketType {
    pub const ALL: [TicketType; 3] = [TicketType::Purchase, TicketType::Group, TicketType::Other];

    pub fn as_str(self) -> &'static str {
        match self {
            TicketType::Purchase => "purchase",
            TicketType::Group => "group",
            TicketType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "purchase" => Some(TicketType::Purchase),
            "group" => Some(TicketType::Group),
            "other" => Some(TicketType::Other),
            _ => None,
        }
    }

    /// Button label on the panel.
    pub fn button_label(self) -> &'static str {
        match self {
            TicketType::Purchase => "Purchase question",
            TicketType::Group => "Server question",
            TicketType::Other => "Other question",
        }
    }
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub channel_id: Id<ChannelMarker>,
    pub guild_id: Id<GuildMarker>,
    pub ticket_type: TicketType,
    pub status: TicketStatus,
    pub close_message_id: Option<Id<MessageMarker>>,
    pub close_message_kind: Option<CloseMessageKind>,
    /// Hours of silence before the external auto-closer may act.
    pub auto_timeout: i32,
    pub timed_out: bool,
    pub participants: BTreeSet<Id<UserMarker>>,
}

impl Ticket {
    /// `{type}-{id:04}-{STATUS}`, e.g. `purchase-0007-OPEN`.
    pub fn channel_name(&self) -> String {
        format!("{}-{:04}-{}", self.ticket_type.as_str(), self.id, self.status.label())
    }

    pub fn is_closed(&self) -> bool {
        self.status == TicketStatus::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(id: i64, status: TicketStatus) -> Ticket {
        Ticket {
            id,
            channel_id: Id::new(10),
            guild_id: Id::new(20),
            ticket_type: TicketType::Purchase,
            status,
            close_message_id: None,
            close_message_kind: None,
            auto_timeout: 48,
            timed_out: false,
            participants: BTreeSet::new(),
        }
    }

    #[test]
    fn channel_name_pads_id() {
        assert_eq!(ticket(7, TicketStatus::Open).channel_name(), "purchase-0007-OPEN");
        assert_eq!(ticket(12345, TicketStatus::InProgress).channel_name(), "purchase-12345-IN_PROGRESS");
    }

    #[test]
    fn transitions_follow_lifecycle() {
        use TicketStatus::*;
        assert!(Open.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Resolved));
        assert!(Resolved.can_transition_to(Closed));
        assert!(Open.can_transition_to(Closed));
        assert!(Closed.can_transition_to(Open));
        assert!(Resolved.can_transition_to(Resolved));

        assert!(!Resolved.can_transition_to(InProgress));
        assert!(!InProgress.can_transition_to(Open));
        assert!(!Closed.can_transition_to(Resolved));
    }

    #[test]
    fn status_round_trips_through_column_value() {
        for status in [TicketStatus::Open, TicketStatus::InProgress, TicketStatus::Resolved, TicketStatus::Closed] {
            assert_eq!(TicketStatus::from_i16(status.as_i16()), Some(status));
        }
        assert_eq!(TicketStatus::from_i16(9), None);
    }
}
