use async_trait::async_trait;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker, UserMarker};
use twilight_model::id::Id;

use crate::error::Error;
use crate::models::controls::ControlSet;
use crate::models::platform::{MemberInfo, NewTicketChannel, OutgoingMessage, Presence, Visibility};

/// The slice of the chat platform the ticket core drives.
///
/// Implementations must report a vanished object as `Error::NotFound` and a refused
/// action as `Error::Forbidden`; the managers self-heal on the former and skip on the
/// latter. Resolution methods try the local cache before asking the API.
#[async_trait]
pub trait TicketPlatform: Send + Sync {
    async fn create_ticket_channel(&self, request: &NewTicketChannel) -> Result<Id<ChannelMarker>, Error>;
    async fn rename_channel(&self, channel_id: Id<ChannelMarker>, name: &str) -> Result<(), Error>;
    async fn delete_channel(&self, channel_id: Id<ChannelMarker>) -> Result<(), Error>;

    /// Sets the member-level overwrite of `user_id` on `channel_id`.
    async fn set_member_visibility(
        &self,
        channel_id: Id<ChannelMarker>,
        user_id: Id<UserMarker>,
        visibility: Visibility,
    ) -> Result<(), Error>;

    async fn send_message(&self, channel_id: Id<ChannelMarker>, message: OutgoingMessage)
        -> Result<Id<MessageMarker>, Error>;
    async fn send_direct_message(&self, user_id: Id<UserMarker>, message: OutgoingMessage)
        -> Result<Id<MessageMarker>, Error>;

    /// Replaces the controls of an existing message; `None` strips them.
    async fn set_message_controls(
        &self,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
        controls: Option<ControlSet>,
    ) -> Result<(), Error>;

    async fn fetch_message(&self, channel_id: Id<ChannelMarker>, message_id: Id<MessageMarker>) -> Result<(), Error>;
    async fn resolve_guild(&self, guild_id: Id<GuildMarker>) -> Result<(), Error>;
    async fn resolve_channel(&self, channel_id: Id<ChannelMarker>) -> Result<(), Error>;
    async fn resolve_member(&self, guild_id: Id<GuildMarker>, user_id: Id<UserMarker>) -> Result<MemberInfo, Error>;
}

/// Collapses a resolution result into what it says about the object's existence.
pub fn presence_of<T>(result: &Result<T, Error>) -> Presence {
    match result {
        Ok(_) => Presence::Present,
        Err(e) if e.is_not_found() => Presence::Missing,
        Err(_) => Presence::Unknown,
    }
}
