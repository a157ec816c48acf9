// File: dragonbot-core/src/test_utils/fake_platform.rs
//
// Scriptable `TicketPlatform` that keeps just enough remote state (channels, messages,
// member overwrites) for the managers to be exercised end to end. Every call yields once
// so concurrent operations interleave the way they would against the real API.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use dragonbot_common::error::{Error, Resource};
use dragonbot_common::models::{ControlSet, MemberInfo, NewTicketChannel, OutgoingMessage, Visibility};
use dragonbot_common::traits::platform_traits::TicketPlatform;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker, RoleMarker, UserMarker};
use twilight_model::id::Id;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel_id: Id<ChannelMarker>,
    pub message_id: Id<MessageMarker>,
    pub message: OutgoingMessage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeChannel {
    pub guild_id: Option<Id<GuildMarker>>,
    pub name: String,
}

#[derive(Default)]
pub struct FakeState {
    next_id: u64,
    pub channels: BTreeMap<Id<ChannelMarker>, FakeChannel>,
    /// message -> (channel, current controls)
    pub messages: HashMap<Id<MessageMarker>, (Id<ChannelMarker>, Option<ControlSet>)>,
    pub missing_guilds: HashSet<Id<GuildMarker>>,
    /// Guilds whose lookup fails with a transient error.
    pub unreachable_guilds: HashSet<Id<GuildMarker>>,
    pub overwrites: HashMap<(Id<ChannelMarker>, Id<UserMarker>), Visibility>,
    pub forbidden_users: HashSet<Id<UserMarker>>,
    pub member_roles: HashMap<Id<UserMarker>, Vec<Id<RoleMarker>>>,
    /// When set, message probes fail with a transient error instead of answering.
    pub probes_fail: bool,
    pub fail_channel_create: bool,
    pub fail_renames: bool,
    pub fail_channel_delete: bool,

    pub visibility_calls: Vec<(Id<ChannelMarker>, Id<UserMarker>, Visibility)>,
    pub renames: Vec<(Id<ChannelMarker>, String)>,
    pub deleted_channels: Vec<Id<ChannelMarker>>,
    pub sent: Vec<SentMessage>,
    pub direct_messages: Vec<(Id<UserMarker>, OutgoingMessage)>,
    pub control_edits: Vec<(Id<ChannelMarker>, Id<MessageMarker>, Option<ControlSet>)>,
}

impl FakeState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        1_000 + self.next_id
    }
}

#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an existing channel.
    pub fn add_channel(&self, guild_id: Id<GuildMarker>, name: &str) -> Id<ChannelMarker> {
        let mut state = self.state();
        let id = Id::new(state.next_id());
        state.channels.insert(
            id,
            FakeChannel {
                guild_id: Some(guild_id),
                name: name.to_string(),
            },
        );
        id
    }

    /// Registers an existing message in `channel_id`.
    pub fn add_message(&self, channel_id: Id<ChannelMarker>) -> Id<MessageMarker> {
        let mut state = self.state();
        let id = Id::new(state.next_id());
        state.messages.insert(id, (channel_id, None));
        id
    }

    pub fn remove_channel(&self, channel_id: Id<ChannelMarker>) {
        let mut state = self.state();
        state.channels.remove(&channel_id);
        state.messages.retain(|_, (c, _)| *c != channel_id);
    }

    pub fn remove_message(&self, message_id: Id<MessageMarker>) {
        self.state().messages.remove(&message_id);
    }

    pub fn visibility(&self, channel_id: Id<ChannelMarker>, user_id: Id<UserMarker>) -> Option<Visibility> {
        self.state().overwrites.get(&(channel_id, user_id)).copied()
    }

    /// Users with a `Visible` overwrite on the channel.
    pub fn visible_users(&self, channel_id: Id<ChannelMarker>) -> Vec<Id<UserMarker>> {
        let mut users: Vec<_> = self
            .state()
            .overwrites
            .iter()
            .filter(|((c, _), v)| *c == channel_id && **v == Visibility::Visible)
            .map(|((_, u), _)| *u)
            .collect();
        users.sort();
        users
    }

    pub fn channel_name(&self, channel_id: Id<ChannelMarker>) -> Option<String> {
        self.state().channels.get(&channel_id).map(|c| c.name.clone())
    }

    pub fn clear_calls(&self) {
        let mut state = self.state();
        state.visibility_calls.clear();
        state.renames.clear();
        state.deleted_channels.clear();
        state.sent.clear();
        state.direct_messages.clear();
        state.control_edits.clear();
    }

    fn require_channel(&self, channel_id: Id<ChannelMarker>) -> Result<(), Error> {
        if self.state().channels.contains_key(&channel_id) {
            Ok(())
        } else {
            Err(Error::not_found(Resource::Channel, channel_id.get()))
        }
    }
}

#[async_trait]
impl TicketPlatform for FakePlatform {
    async fn create_ticket_channel(&self, request: &NewTicketChannel) -> Result<Id<ChannelMarker>, Error> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        if state.fail_channel_create {
            return Err(Error::Platform("channel create rejected".into()));
        }
        let id = Id::new(state.next_id());
        state.channels.insert(
            id,
            FakeChannel {
                guild_id: Some(request.guild_id),
                name: request.name.clone(),
            },
        );
        state.overwrites.insert((id, request.requester), Visibility::Visible);
        Ok(id)
    }

    async fn rename_channel(&self, channel_id: Id<ChannelMarker>, name: &str) -> Result<(), Error> {
        tokio::task::yield_now().await;
        self.require_channel(channel_id)?;
        let mut state = self.state();
        if state.fail_renames {
            return Err(Error::Platform("rename rate limited".into()));
        }
        state.renames.push((channel_id, name.to_string()));
        if let Some(channel) = state.channels.get_mut(&channel_id) {
            channel.name = name.to_string();
        }
        Ok(())
    }

    async fn delete_channel(&self, channel_id: Id<ChannelMarker>) -> Result<(), Error> {
        tokio::task::yield_now().await;
        self.require_channel(channel_id)?;
        if self.state().fail_channel_delete {
            return Err(Error::Forbidden(format!("cannot delete channel {channel_id}")));
        }
        self.remove_channel(channel_id);
        self.state().deleted_channels.push(channel_id);
        Ok(())
    }

    async fn set_member_visibility(
        &self,
        channel_id: Id<ChannelMarker>,
        user_id: Id<UserMarker>,
        visibility: Visibility,
    ) -> Result<(), Error> {
        tokio::task::yield_now().await;
        self.require_channel(channel_id)?;
        let mut state = self.state();
        state.visibility_calls.push((channel_id, user_id, visibility));
        if state.forbidden_users.contains(&user_id) {
            return Err(Error::Forbidden(format!("cannot edit overwrite of {user_id}")));
        }
        state.overwrites.insert((channel_id, user_id), visibility);
        Ok(())
    }

    async fn send_message(&self, channel_id: Id<ChannelMarker>, message: OutgoingMessage) -> Result<Id<MessageMarker>, Error> {
        tokio::task::yield_now().await;
        self.require_channel(channel_id)?;
        let mut state = self.state();
        let message_id = Id::new(state.next_id());
        state.messages.insert(message_id, (channel_id, message.controls.clone()));
        state.sent.push(SentMessage {
            channel_id,
            message_id,
            message,
        });
        Ok(message_id)
    }

    async fn send_direct_message(&self, user_id: Id<UserMarker>, message: OutgoingMessage) -> Result<Id<MessageMarker>, Error> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        if state.forbidden_users.contains(&user_id) {
            return Err(Error::Forbidden(format!("{user_id} does not accept direct messages")));
        }
        state.direct_messages.push((user_id, message));
        Ok(Id::new(state.next_id()))
    }

    async fn set_message_controls(
        &self,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
        controls: Option<ControlSet>,
    ) -> Result<(), Error> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.control_edits.push((channel_id, message_id, controls.clone()));
        match state.messages.get_mut(&message_id) {
            Some((c, current)) if *c == channel_id => {
                *current = controls;
                Ok(())
            }
            _ => Err(Error::not_found(Resource::Message, message_id.get())),
        }
    }

    async fn fetch_message(&self, channel_id: Id<ChannelMarker>, message_id: Id<MessageMarker>) -> Result<(), Error> {
        tokio::task::yield_now().await;
        let state = self.state();
        if state.probes_fail {
            return Err(Error::Platform("gateway timeout".into()));
        }
        if !state.channels.contains_key(&channel_id) {
            return Err(Error::not_found(Resource::Channel, channel_id.get()));
        }
        match state.messages.get(&message_id) {
            Some((c, _)) if *c == channel_id => Ok(()),
            _ => Err(Error::not_found(Resource::Message, message_id.get())),
        }
    }

    async fn resolve_guild(&self, guild_id: Id<GuildMarker>) -> Result<(), Error> {
        tokio::task::yield_now().await;
        let state = self.state();
        if state.missing_guilds.contains(&guild_id) {
            return Err(Error::not_found(Resource::Guild, guild_id.get()));
        }
        if state.unreachable_guilds.contains(&guild_id) {
            return Err(Error::Platform(format!("guild {guild_id} unavailable")));
        }
        Ok(())
    }

    async fn resolve_channel(&self, channel_id: Id<ChannelMarker>) -> Result<(), Error> {
        tokio::task::yield_now().await;
        self.require_channel(channel_id)
    }

    async fn resolve_member(&self, _guild_id: Id<GuildMarker>, user_id: Id<UserMarker>) -> Result<MemberInfo, Error> {
        tokio::task::yield_now().await;
        let roles = self.state().member_roles.get(&user_id).cloned().unwrap_or_default();
        Ok(MemberInfo {
            user_id,
            display_name: format!("user{user_id}"),
            roles,
            bot: false,
        })
    }
}
