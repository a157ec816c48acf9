// ================================================================
// File: dragonbot-common/src/error.rs
// ================================================================

use std::fmt;

use thiserror::Error;

/// Which kind of remote or persisted object a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Guild,
    Channel,
    Message,
    Member,
    Role,
    Ticket,
    Panel,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resource::Guild => "guild",
            Resource::Channel => "channel",
            Resource::Message => "message",
            Resource::Member => "member",
            Resource::Role => "role",
            Resource::Ticket => "ticket",
            Resource::Panel => "panel",
        };
        f.write_str(s)
    }
}

/// Rule breaks that are rejected before anything is mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("cannot remove the last participant of ticket {ticket_id}")]
    LastParticipant { ticket_id: i64 },

    #[error("guild {guild_id} already has a panel (channel {channel_id}, message {message_id})")]
    PanelExists {
        guild_id: u64,
        channel_id: u64,
        message_id: u64,
    },

    #[error("ticket {ticket_id} cannot move from {from} to {to}")]
    InvalidTransition {
        ticket_id: i64,
        from: &'static str,
        to: &'static str,
    },

    #[error("ticket {ticket_id} must be closed first")]
    NotClosed { ticket_id: i64 },
}

/// Failures of the out-of-process transcript exporter.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("transcript exporter not found at {0}")]
    ExporterMissing(String),

    #[error("transcript exporter exited with {status}: {stderr}")]
    ExporterFailed { status: String, stderr: String },

    #[error("could not read exported transcript: {0}")]
    Output(#[source] std::io::Error),

    #[error("transcript exporter did not finish within {0:?}")]
    TimedOut(std::time::Duration),

    #[error("transcript worker stopped: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{resource} {id} not found")]
    NotFound { resource: Resource, id: u64 },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("Channel {0} is not a ticket channel")]
    ChannelNotTicket(u64),

    #[error("Ticket {ticket_id} lost its channel {channel_id}")]
    OrphanedTicket { ticket_id: i64, channel_id: u64 },

    #[error("Refusing to {operation} every row of {table}: empty criteria")]
    EmptyCriteria {
        operation: &'static str,
        table: String,
    },

    #[error("Invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl Error {
    pub fn not_found(resource: Resource, id: u64) -> Self {
        Error::NotFound { resource, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Error::Forbidden(_))
    }

    /// Short text shown back to whoever triggered the failing action.
    pub fn user_message(&self) -> String {
        match self {
            Error::Invariant(InvariantViolation::LastParticipant { .. }) => {
                "This ticket has no other customers left; the last one cannot be removed.".into()
            }
            Error::Invariant(InvariantViolation::PanelExists {
                guild_id,
                channel_id,
                message_id,
            }) => format!(
                "There can only be one ticket panel per server: https://discord.com/channels/{guild_id}/{channel_id}/{message_id}"
            ),
            Error::Invariant(InvariantViolation::NotClosed { .. }) => {
                "Close the ticket before deleting it.".into()
            }
            Error::Invariant(InvariantViolation::InvalidTransition { from, to, .. }) => {
                format!("A ticket cannot go from {from} to {to}.")
            }
            Error::ChannelNotTicket(_) => "This is not a ticket channel!".into(),
            Error::Archive(_) => "Transcript generation failed.".into(),
            Error::Forbidden(_) => "I am not allowed to do that here.".into(),
            _ => "Something went wrong, please try again.".into(),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}
