// File: dragonbot-core/src/platforms/discord/client.rs
//
// `TicketPlatform` over the Twilight HTTP client. Resolution tries the gateway cache
// before spending a request.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};
use twilight_cache_inmemory::InMemoryCache;
use twilight_http::error::ErrorType;
use twilight_http::Client as HttpClient;
use twilight_model::channel::permission_overwrite::{
    PermissionOverwrite as ChannelOverwrite, PermissionOverwriteType as ChannelOverwriteType,
};
use twilight_model::channel::ChannelType;
use twilight_model::guild::Permissions;
use twilight_model::http::attachment::Attachment as HttpAttachment;
use twilight_model::http::permission_overwrite::{PermissionOverwrite, PermissionOverwriteType};
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker, UserMarker};
use twilight_model::id::Id;

use dragonbot_common::error::{Error, Resource};
use dragonbot_common::models::{ControlSet, MemberInfo, NewTicketChannel, OutgoingMessage, Visibility};
use dragonbot_common::traits::platform_traits::TicketPlatform;

use super::components::action_rows;

fn participant_allow() -> Permissions {
    Permissions::VIEW_CHANNEL
        | Permissions::SEND_MESSAGES
        | Permissions::READ_MESSAGE_HISTORY
        | Permissions::ATTACH_FILES
        | Permissions::EMBED_LINKS
}

/// Overwrites a new ticket channel starts with: hidden from everyone, open to staff, the
/// requester and the bot.
fn creation_overwrites(request: &NewTicketChannel, bot_user_id: Option<Id<UserMarker>>) -> Vec<ChannelOverwrite> {
    let mut overwrites = vec![
        ChannelOverwrite {
            id: request.guild_id.cast(),
            kind: ChannelOverwriteType::Role,
            allow: Permissions::empty(),
            deny: Permissions::VIEW_CHANNEL,
        },
        ChannelOverwrite {
            id: request.staff_role.cast(),
            kind: ChannelOverwriteType::Role,
            allow: participant_allow(),
            deny: Permissions::empty(),
        },
        ChannelOverwrite {
            id: request.requester.cast(),
            kind: ChannelOverwriteType::Member,
            allow: participant_allow(),
            deny: Permissions::empty(),
        },
    ];
    if let Some(bot) = bot_user_id {
        overwrites.push(ChannelOverwrite {
            id: bot.cast(),
            kind: ChannelOverwriteType::Member,
            allow: participant_allow() | Permissions::MANAGE_CHANNELS | Permissions::MANAGE_ROLES,
            deny: Permissions::empty(),
        });
    }
    overwrites
}

/// Maps an HTTP failure onto the error kinds the managers act on.
fn map_http_error(resource: Resource, id: u64, err: twilight_http::Error) -> Error {
    if let ErrorType::Response { status, .. } = err.kind() {
        match status.get() {
            404 => return Error::not_found(resource, id),
            403 => return Error::Forbidden(format!("{resource} {id}: {err}")),
            _ => {}
        }
    }
    Error::Platform(format!("{resource} {id}: {err}"))
}

pub struct DiscordTicketPlatform {
    http: Arc<HttpClient>,
    cache: Option<Arc<InMemoryCache>>,
    bot_user_id: Option<Id<UserMarker>>,
}

impl DiscordTicketPlatform {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            cache: None,
            bot_user_id: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<InMemoryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The bot is given its own overwrite on every ticket channel it creates.
    pub fn with_bot_user(mut self, user_id: Id<UserMarker>) -> Self {
        self.bot_user_id = Some(user_id);
        self
    }

    pub fn http(&self) -> &Arc<HttpClient> {
        &self.http
    }
}

#[async_trait]
impl TicketPlatform for DiscordTicketPlatform {
    async fn create_ticket_channel(&self, request: &NewTicketChannel) -> Result<Id<ChannelMarker>, Error> {
        let overwrites = creation_overwrites(request, self.bot_user_id);
        let channel = self
            .http
            .create_guild_channel(request.guild_id, &request.name)
            .kind(ChannelType::GuildText)
            .permission_overwrites(&overwrites)
            .await
            .map_err(|e| map_http_error(Resource::Guild, request.guild_id.get(), e))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("Error parsing created channel: {e}")))?;

        debug!(channel_id = %channel.id, name = %request.name, "Created guild channel");
        Ok(channel.id)
    }

    async fn rename_channel(&self, channel_id: Id<ChannelMarker>, name: &str) -> Result<(), Error> {
        self.http
            .update_channel(channel_id)
            .name(name)
            .await
            .map_err(|e| map_http_error(Resource::Channel, channel_id.get(), e))?;
        Ok(())
    }

    async fn delete_channel(&self, channel_id: Id<ChannelMarker>) -> Result<(), Error> {
        self.http
            .delete_channel(channel_id)
            .await
            .map_err(|e| map_http_error(Resource::Channel, channel_id.get(), e))?;
        Ok(())
    }

    async fn set_member_visibility(
        &self,
        channel_id: Id<ChannelMarker>,
        user_id: Id<UserMarker>,
        visibility: Visibility,
    ) -> Result<(), Error> {
        let (allow, deny) = match visibility {
            Visibility::Visible => (Some(participant_allow()), None),
            Visibility::Hidden => (None, Some(Permissions::VIEW_CHANNEL)),
        };
        let overwrite = PermissionOverwrite {
            id: user_id.cast(),
            kind: PermissionOverwriteType::Member,
            allow,
            deny,
        };
        self.http
            .update_channel_permission(channel_id, &overwrite)
            .await
            .map_err(|e| map_http_error(Resource::Member, user_id.get(), e))?;
        trace!(%channel_id, %user_id, ?visibility, "Updated member overwrite");
        Ok(())
    }

    async fn send_message(&self, channel_id: Id<ChannelMarker>, message: OutgoingMessage) -> Result<Id<MessageMarker>, Error> {
        let components = message.controls.as_ref().map(action_rows).unwrap_or_default();
        let attachments: Vec<HttpAttachment> = message
            .attachment
            .map(|a| vec![HttpAttachment::from_bytes(a.filename, a.bytes, 1)])
            .unwrap_or_default();

        let sent = self
            .http
            .create_message(channel_id)
            .content(&message.content)
            .components(&components)
            .attachments(&attachments)
            .await
            .map_err(|e| map_http_error(Resource::Channel, channel_id.get(), e))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("Error parsing sent message: {e}")))?;
        Ok(sent.id)
    }

    async fn send_direct_message(&self, user_id: Id<UserMarker>, message: OutgoingMessage) -> Result<Id<MessageMarker>, Error> {
        let dm = self
            .http
            .create_private_channel(user_id)
            .await
            .map_err(|e| map_http_error(Resource::Member, user_id.get(), e))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("Error parsing private channel: {e}")))?;
        self.send_message(dm.id, message).await
    }

    async fn set_message_controls(
        &self,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
        controls: Option<ControlSet>,
    ) -> Result<(), Error> {
        let components = controls.as_ref().map(action_rows).unwrap_or_default();
        self.http
            .update_message(channel_id, message_id)
            .components(Some(components.as_slice()))
            .await
            .map_err(|e| map_http_error(Resource::Message, message_id.get(), e))?;
        Ok(())
    }

    async fn fetch_message(&self, channel_id: Id<ChannelMarker>, message_id: Id<MessageMarker>) -> Result<(), Error> {
        if let Some(cache) = &self.cache {
            if cache.message(message_id).is_some() {
                return Ok(());
            }
        }
        self.http
            .message(channel_id, message_id)
            .await
            .map_err(|e| map_http_error(Resource::Message, message_id.get(), e))?;
        Ok(())
    }

    async fn resolve_guild(&self, guild_id: Id<GuildMarker>) -> Result<(), Error> {
        if let Some(cache) = &self.cache {
            if cache.guild(guild_id).is_some() {
                return Ok(());
            }
        }
        self.http
            .guild(guild_id)
            .await
            .map_err(|e| map_http_error(Resource::Guild, guild_id.get(), e))?;
        Ok(())
    }

    async fn resolve_channel(&self, channel_id: Id<ChannelMarker>) -> Result<(), Error> {
        if let Some(cache) = &self.cache {
            if cache.channel(channel_id).is_some() {
                return Ok(());
            }
        }
        self.http
            .channel(channel_id)
            .await
            .map_err(|e| map_http_error(Resource::Channel, channel_id.get(), e))?;
        Ok(())
    }

    async fn resolve_member(&self, guild_id: Id<GuildMarker>, user_id: Id<UserMarker>) -> Result<MemberInfo, Error> {
        if let Some(cache) = &self.cache {
            if let Some(member) = cache.member(guild_id, user_id) {
                let user = cache.user(user_id);
                return Ok(MemberInfo {
                    user_id,
                    display_name: member
                        .nick()
                        .map(str::to_string)
                        .or_else(|| user.as_ref().map(|u| u.name.clone()))
                        .unwrap_or_else(|| user_id.to_string()),
                    roles: member.roles().to_vec(),
                    bot: user.as_ref().is_some_and(|u| u.bot),
                });
            }
        }

        let member = self
            .http
            .guild_member(guild_id, user_id)
            .await
            .map_err(|e| map_http_error(Resource::Member, user_id.get(), e))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("Error parsing member: {e}")))?;
        Ok(MemberInfo {
            user_id,
            display_name: member.nick.unwrap_or_else(|| member.user.name.clone()),
            roles: member.roles,
            bot: member.user.bot,
        })
    }
}
