// File: dragonbot-core/src/services/tickets/ticket_manager.rs
//
// Ticket lifecycle: creation, status transitions, participants, close/reopen/delete and
// the transcript hand-off. The cache is updated first, the store second, the live channel
// last.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker, RoleMarker, UserMarker};
use twilight_model::id::Id;

use dragonbot_common::error::{ArchiveError, Error, InvariantViolation, Resource};
use dragonbot_common::models::{
    Attachment, CloseMessageKind, MemberInfo, NewTicketChannel, OutgoingMessage, Presence, Ticket, TicketConfig,
    TicketStatus, TicketType, Visibility,
};
use dragonbot_common::traits::platform_traits::{presence_of, TicketPlatform};
use dragonbot_common::traits::ticket_traits::FeedbackHandoff;

use crate::cache::TicketCache;
use crate::db::TableStore;
use crate::repositories::{NewTicketRow, TicketRepository};
use crate::services::tickets::archiver::{Archiver, Transcript};
use crate::services::tickets::permission_sync::PermissionSync;
use crate::services::tickets::reconcile::{reconcile_tickets, TicketAction, TicketProbe};

const ACKNOWLEDGEMENT: &str =
    "Hello! We have received your message, thank you for reaching out. We will answer as soon as we are online~";
const ARCHIVE_FAILED_NOTICE: &str = "Transcript generation failed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketLookup {
    Id(i64),
    Channel(Id<ChannelMarker>),
}

/// A committed status change.
#[derive(Debug, Clone)]
struct Transition {
    ticket: Ticket,
    from: TicketStatus,
    /// Participants whose overwrite changed as part of the transition.
    changed: Vec<Id<UserMarker>>,
}

#[derive(Debug)]
pub enum ArchiveOutcome {
    Delivered { filename: String },
    Failed(ArchiveError),
}

impl ArchiveOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ArchiveOutcome::Delivered { .. })
    }
}

#[derive(Debug)]
pub struct CloseReport {
    pub ticket_id: i64,
    pub previous_status: TicketStatus,
    pub revoked: Vec<Id<UserMarker>>,
    pub archive: ArchiveOutcome,
}

/// A message posted in some channel, as far as ticket handling cares.
#[derive(Debug, Clone, Default)]
pub struct TicketMessage {
    pub channel_id: Option<Id<ChannelMarker>>,
    pub author_id: Option<Id<UserMarker>>,
    pub author_is_bot: bool,
    pub author_roles: Vec<Id<RoleMarker>>,
    pub mentioned_users: Vec<Id<UserMarker>>,
    pub mentioned_roles: Vec<Id<RoleMarker>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TicketReconcileSummary {
    pub reattached: usize,
    pub resent: usize,
    pub forgotten: usize,
    pub skipped: usize,
}

pub struct TicketManager {
    repo: TicketRepository,
    cache: Arc<TicketCache>,
    platform: Arc<dyn TicketPlatform>,
    permissions: PermissionSync,
    archiver: Archiver,
    feedback: Arc<dyn FeedbackHandoff>,
    config: TicketConfig,
}

impl TicketManager {
    pub fn new(
        store: Arc<dyn TableStore>,
        platform: Arc<dyn TicketPlatform>,
        archiver: Archiver,
        feedback: Arc<dyn FeedbackHandoff>,
        config: TicketConfig,
    ) -> Self {
        Self {
            repo: TicketRepository::new(store),
            cache: Arc::new(TicketCache::new()),
            permissions: PermissionSync::new(Arc::clone(&platform)),
            platform,
            archiver,
            feedback,
            config,
        }
    }

    pub fn with_cache(mut self, cache: Arc<TicketCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<TicketCache> {
        &self.cache
    }

    pub fn config(&self) -> &TicketConfig {
        &self.config
    }

    /// Loads every persisted ticket into the cache.
    pub async fn init_cache(&self) -> Result<usize, Error> {
        let tickets = self.repo.load_all().await?;
        let count = tickets.len();
        self.cache.replace_all(tickets);
        info!("Loaded {} tickets into cache.", count);
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Cache first, then the store; a store hit is cached.
    pub async fn get_ticket(&self, lookup: TicketLookup) -> Result<Option<Ticket>, Error> {
        let cached = match lookup {
            TicketLookup::Id(id) => self.cache.get(id),
            TicketLookup::Channel(channel_id) => self.cache.find_by_channel(channel_id),
        };
        if cached.is_some() {
            return Ok(cached);
        }

        let loaded = match lookup {
            TicketLookup::Id(id) => self.repo.find_by_id(id).await?,
            TicketLookup::Channel(channel_id) => self.repo.find_by_channel(channel_id).await?,
        };
        if let Some(ticket) = &loaded {
            debug!(ticket_id = ticket.id, "Cached ticket after store hit");
            self.cache.insert(ticket.clone());
        }
        Ok(loaded)
    }

    async fn ticket_in(&self, channel_id: Id<ChannelMarker>) -> Result<Ticket, Error> {
        self.get_ticket(TicketLookup::Channel(channel_id))
            .await?
            .ok_or(Error::ChannelNotTicket(channel_id.get()))
    }

    pub async fn is_ticket_channel(&self, channel_id: Id<ChannelMarker>) -> Result<bool, Error> {
        Ok(self.get_ticket(TicketLookup::Channel(channel_id)).await?.is_some())
    }

    pub async fn get_ticket_participants(&self, channel_id: Id<ChannelMarker>) -> Result<BTreeSet<Id<UserMarker>>, Error> {
        Ok(self.ticket_in(channel_id).await?.participants)
    }

    /// Participants resolved to guild members. Members that cannot be resolved are skipped.
    pub async fn get_ticket_participants_member(&self, channel_id: Id<ChannelMarker>) -> Result<Vec<MemberInfo>, Error> {
        let ticket = self.ticket_in(channel_id).await?;
        let mut members = Vec::with_capacity(ticket.participants.len());
        for user_id in &ticket.participants {
            match self.platform.resolve_member(ticket.guild_id, *user_id).await {
                Ok(member) => members.push(member),
                Err(e) => warn!(ticket_id = ticket.id, %user_id, "Could not resolve participant: {}", e),
            }
        }
        Ok(members)
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    fn greeting(&self, requester: Id<UserMarker>) -> String {
        let mut text = format!(
            "<@{requester}> thank you for contacting us! <@&{}> will be with you shortly.",
            self.config.staff_role_id
        );
        if !self.config.business_hours.is_empty() {
            text.push_str("\n\n**Business hours**");
            for line in &self.config.business_hours {
                text.push('\n');
                text.push_str(line);
            }
        }
        text
    }

    pub async fn create_ticket(
        &self,
        requester: Id<UserMarker>,
        guild_id: Id<GuildMarker>,
        ticket_type: TicketType,
    ) -> Result<Ticket, Error> {
        let request = NewTicketChannel {
            guild_id,
            name: format!("{}-temp", ticket_type.as_str()),
            requester,
            staff_role: self.config.staff_role_id,
        };
        let channel_id = self.platform.create_ticket_channel(&request).await?;
        info!(%channel_id, %requester, "Created ticket channel");

        match self.register_ticket(channel_id, requester, guild_id, ticket_type).await {
            Ok(ticket) => {
                match self.project_name(&ticket).await {
                    Ok(()) => {}
                    Err(e @ Error::OrphanedTicket { .. }) => return Err(e),
                    Err(e) => warn!(ticket_id = ticket.id, "Could not name new ticket channel: {}", e),
                }
                info!(ticket_id = ticket.id, %channel_id, "Ticket opened");
                Ok(ticket)
            }
            Err(e) => {
                error!(%channel_id, "Ticket registration failed, removing channel: {}", e);
                if let Err(cleanup) = self.platform.delete_channel(channel_id).await {
                    warn!(%channel_id, "Could not remove channel of failed ticket: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    /// Greets, persists and caches a ticket whose channel already exists.
    async fn register_ticket(
        &self,
        channel_id: Id<ChannelMarker>,
        requester: Id<UserMarker>,
        guild_id: Id<GuildMarker>,
        ticket_type: TicketType,
    ) -> Result<Ticket, Error> {
        let greeting = OutgoingMessage::text(self.greeting(requester))
            .with_controls(CloseMessageKind::CloseToggle.controls());
        let close_message_id = self.platform.send_message(channel_id, greeting).await?;

        let row = NewTicketRow {
            channel_id,
            guild_id,
            ticket_type,
            status: TicketStatus::Open,
            close_message_id: Some(close_message_id),
            close_message_kind: Some(CloseMessageKind::CloseToggle),
            auto_timeout: self.config.auto_timeout_hours,
        };
        let ticket_id = self.repo.insert(&row).await?;
        if let Err(e) = self.repo.add_participants(ticket_id, &[requester]).await {
            if let Err(cleanup) = self.repo.delete(ticket_id).await {
                warn!(ticket_id, "Could not remove half-written ticket: {}", cleanup);
            }
            return Err(e);
        }

        let ticket = Ticket {
            id: ticket_id,
            channel_id,
            guild_id,
            ticket_type,
            status: TicketStatus::Open,
            close_message_id: Some(close_message_id),
            close_message_kind: Some(CloseMessageKind::CloseToggle),
            auto_timeout: self.config.auto_timeout_hours,
            timed_out: false,
            participants: BTreeSet::from([requester]),
        };
        self.cache.insert(ticket.clone());
        Ok(ticket)
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// Renames the channel after the ticket. A vanished channel is reported as
    /// `Error::OrphanedTicket`.
    async fn project_name(&self, ticket: &Ticket) -> Result<(), Error> {
        match self.platform.rename_channel(ticket.channel_id, &ticket.channel_name()).await {
            Err(e) if e.is_not_found() => Err(Error::OrphanedTicket {
                ticket_id: ticket.id,
                channel_id: ticket.channel_id.get(),
            }),
            other => other,
        }
    }

    /// Moves the ticket to `status`. Returns `None` when it is already there.
    ///
    /// Leaving a visible state revokes every participant; entering one grants them. The
    /// participant snapshot is taken under the same lock that flips the status, so an
    /// `add_ticket_participants` racing with us either lands in the snapshot or sees the
    /// new status on its re-check.
    async fn transition(&self, ticket_id: i64, status: TicketStatus) -> Result<Option<Transition>, Error> {
        if self.get_ticket(TicketLookup::Id(ticket_id)).await?.is_none() {
            return Err(Error::not_found(Resource::Ticket, ticket_id as u64));
        }

        let flipped = self
            .cache
            .update(ticket_id, |t| {
                let from = t.status;
                if from == status {
                    return Ok(None);
                }
                if !from.can_transition_to(status) {
                    return Err(InvariantViolation::InvalidTransition {
                        ticket_id,
                        from: from.label(),
                        to: status.label(),
                    });
                }
                t.status = status;
                Ok(Some((from, t.clone())))
            })
            .ok_or(Error::not_found(Resource::Ticket, ticket_id as u64))??;

        let Some((from, ticket)) = flipped else {
            debug!(ticket_id, %status, "Status unchanged");
            return Ok(None);
        };

        self.repo.set_status(ticket_id, status).await?;

        let participants: Vec<_> = ticket.participants.iter().copied().collect();
        let changed = match (from.grants_visibility(), status.grants_visibility()) {
            (true, false) => {
                self.permissions
                    .apply(ticket.channel_id, &participants, Visibility::Hidden, &ticket.participants)
                    .await
            }
            (false, true) => {
                self.permissions
                    .apply(ticket.channel_id, &participants, Visibility::Visible, &BTreeSet::new())
                    .await
            }
            _ => Vec::new(),
        };

        match self.project_name(&ticket).await {
            Ok(()) => {}
            Err(e @ Error::OrphanedTicket { .. }) => return Err(e),
            Err(e) => warn!(ticket_id, %status, "Could not rename ticket channel: {}", e),
        }
        info!(ticket_id, %from, to = %status, "Ticket status changed");
        Ok(Some(Transition { ticket, from, changed }))
    }

    /// Returns whether anything changed.
    pub async fn set_ticket_status(&self, ticket_id: i64, status: TicketStatus) -> Result<bool, Error> {
        Ok(self.transition(ticket_id, status).await?.is_some())
    }

    /// Staff speaking in an OPEN ticket moves it to IN_PROGRESS; mentioning staff or the
    /// bot gets an acknowledgement. Messages outside ticket channels are ignored.
    pub async fn handle_ticket_message(&self, message: &TicketMessage) -> Result<(), Error> {
        if message.author_is_bot {
            return Ok(());
        }
        let Some(channel_id) = message.channel_id else {
            return Ok(());
        };
        let Some(ticket) = self.get_ticket(TicketLookup::Channel(channel_id)).await? else {
            return Ok(());
        };

        if ticket.status == TicketStatus::Open && self.config.is_staff(&message.author_roles) {
            self.set_ticket_status(ticket.id, TicketStatus::InProgress).await?;
        }

        let acknowledged = message
            .mentioned_roles
            .iter()
            .any(|r| self.config.acknowledged_roles.contains(r))
            || message
                .mentioned_users
                .iter()
                .any(|u| self.config.acknowledged_users.contains(u));
        if acknowledged {
            self.platform
                .send_message(channel_id, OutgoingMessage::text(ACKNOWLEDGEMENT))
                .await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Close / reopen / delete
    // ------------------------------------------------------------------

    /// Closes the ticket in `channel_id`. Returns `None` if it was already closed.
    ///
    /// The CLOSED status and the revocations stand even when the transcript cannot be
    /// produced; the report says what happened to the archive.
    pub async fn close_ticket(
        &self,
        channel_id: Id<ChannelMarker>,
        closed_by: Id<UserMarker>,
    ) -> Result<Option<CloseReport>, Error> {
        let ticket = self.ticket_in(channel_id).await?;
        let Some(transition) = self.transition(ticket.id, TicketStatus::Closed).await? else {
            return Ok(None);
        };
        info!(ticket_id = ticket.id, %closed_by, "Ticket closed");

        let archive = self.deliver_transcript(&transition.ticket).await;

        let notice = format!("Ticket closed by <@{closed_by}>.");
        if let Err(e) = self
            .post_close_controls(channel_id, CloseMessageKind::AfterClose, notice)
            .await
        {
            warn!(ticket_id = ticket.id, "Could not post after-close controls: {}", e);
        }

        Ok(Some(CloseReport {
            ticket_id: ticket.id,
            previous_status: transition.from,
            revoked: transition.changed,
            archive,
        }))
    }

    /// Exports the transcript and hands it out: archive channel, then each participant
    /// with a feedback prompt. Delivery failures are logged per recipient.
    async fn deliver_transcript(&self, ticket: &Ticket) -> ArchiveOutcome {
        let transcript = match self.archiver.archive(ticket.channel_id, &ticket.channel_name()).await {
            Ok(t) => t,
            Err(e) => {
                error!(ticket_id = ticket.id, "Archiving failed: {}", e);
                if let Err(post) = self
                    .platform
                    .send_message(ticket.channel_id, OutgoingMessage::text(ARCHIVE_FAILED_NOTICE))
                    .await
                {
                    warn!(ticket_id = ticket.id, "Could not post archive failure notice: {}", post);
                }
                return ArchiveOutcome::Failed(e);
            }
        };

        let attachment = Attachment {
            filename: transcript.filename.clone(),
            bytes: transcript.bytes,
        };

        if let Some(archive_channel) = self.config.archive_channel_id {
            let message = OutgoingMessage::text(format!("Transcript of {}", ticket.channel_name()))
                .with_attachment(attachment.clone());
            if let Err(e) = self.platform.send_message(archive_channel, message).await {
                warn!(ticket_id = ticket.id, %archive_channel, "Could not post transcript to archive: {}", e);
            }
        }

        for participant in &ticket.participants {
            let message = OutgoingMessage::text(format!("Here is the transcript of your ticket {}.", ticket.channel_name()))
                .with_attachment(attachment.clone());
            if let Err(e) = self.platform.send_direct_message(*participant, message).await {
                warn!(ticket_id = ticket.id, %participant, "Could not send transcript: {}", e);
                continue;
            }
            if let Err(e) = self.feedback.prompt_feedback(ticket, *participant).await {
                warn!(ticket_id = ticket.id, %participant, "Feedback hand-off failed: {}", e);
            }
        }

        ArchiveOutcome::Delivered {
            filename: transcript.filename,
        }
    }

    /// Reopens a CLOSED ticket. Returns `false` if it is already OPEN.
    pub async fn reopen_ticket(&self, channel_id: Id<ChannelMarker>) -> Result<bool, Error> {
        let ticket = self.ticket_in(channel_id).await?;
        match ticket.status {
            TicketStatus::Open => return Ok(false),
            TicketStatus::Closed => {}
            other => {
                return Err(InvariantViolation::InvalidTransition {
                    ticket_id: ticket.id,
                    from: other.label(),
                    to: TicketStatus::Open.label(),
                }
                .into());
            }
        }

        let Some(transition) = self.transition(ticket.id, TicketStatus::Open).await? else {
            return Ok(false);
        };
        info!(ticket_id = ticket.id, regranted = transition.changed.len(), "Ticket reopened");

        if let Err(e) = self
            .post_close_controls(channel_id, CloseMessageKind::CloseToggle, "Ticket reopened.".to_string())
            .await
        {
            warn!(ticket_id = ticket.id, "Could not post close toggle: {}", e);
        }
        Ok(true)
    }

    /// Removes a CLOSED ticket for good: cache, row, then the channel itself.
    pub async fn delete_ticket(&self, channel_id: Id<ChannelMarker>) -> Result<(), Error> {
        let ticket = self.ticket_in(channel_id).await?;
        if !ticket.is_closed() {
            return Err(InvariantViolation::NotClosed { ticket_id: ticket.id }.into());
        }

        self.cache.remove(ticket.id);
        self.repo.delete(ticket.id).await?;
        info!(ticket_id = ticket.id, %channel_id, "Ticket deleted");

        if let Err(e) = self.platform.delete_channel(channel_id).await {
            warn!(ticket_id = ticket.id, %channel_id, "Could not delete ticket channel: {}", e);
        }
        Ok(())
    }

    /// Forgets a ticket whose channel no longer exists.
    pub async fn prune_orphaned_ticket(&self, ticket_id: i64) -> Result<(), Error> {
        self.cache.remove(ticket_id);
        self.repo.delete(ticket_id).await?;
        warn!(ticket_id, "Pruned ticket whose channel is gone");
        Ok(())
    }

    pub async fn archive_ticket(&self, channel_id: Id<ChannelMarker>) -> Result<Transcript, Error> {
        let ticket = self.ticket_in(channel_id).await?;
        Ok(self.archiver.archive(channel_id, &ticket.channel_name()).await?)
    }

    // ------------------------------------------------------------------
    // Participants
    // ------------------------------------------------------------------

    /// Adds the users not yet in the ticket and returns them. On a CLOSED ticket the
    /// membership is recorded without touching permissions.
    pub async fn add_ticket_participants(
        &self,
        channel_id: Id<ChannelMarker>,
        users: &[Id<UserMarker>],
    ) -> Result<Vec<Id<UserMarker>>, Error> {
        let ticket = self.ticket_in(channel_id).await?;

        let (delta, visible_at_start, before) = self
            .cache
            .update(ticket.id, |t| {
                let before = t.participants.clone();
                let delta: Vec<_> = users
                    .iter()
                    .copied()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .filter(|u| !before.contains(u))
                    .collect();
                t.participants.extend(delta.iter().copied());
                (delta, t.status.grants_visibility(), before)
            })
            .ok_or(Error::not_found(Resource::Ticket, ticket.id as u64))?;

        if delta.is_empty() {
            return Ok(Vec::new());
        }

        let added = if visible_at_start {
            let granted = self
                .permissions
                .apply(channel_id, &delta, Visibility::Visible, &before)
                .await;
            let failed: Vec<_> = delta.iter().filter(|u| !granted.contains(u)).copied().collect();
            if !failed.is_empty() {
                self.cache.update(ticket.id, |t| {
                    for u in &failed {
                        t.participants.remove(u);
                    }
                });
            }
            granted
        } else {
            delta
        };

        self.repo.add_participants(ticket.id, &added).await?;

        // the ticket may have been closed or reopened while we were granting
        let visible_now = self
            .cache
            .get(ticket.id)
            .is_some_and(|t| t.status.grants_visibility());
        match (visible_at_start, visible_now) {
            (true, false) => {
                let granted: BTreeSet<_> = added.iter().copied().collect();
                self.permissions
                    .apply(channel_id, &added, Visibility::Hidden, &granted)
                    .await;
            }
            (false, true) => {
                self.permissions
                    .apply(channel_id, &added, Visibility::Visible, &BTreeSet::new())
                    .await;
            }
            _ => {}
        }

        info!(ticket_id = ticket.id, count = added.len(), "Added ticket participants");
        Ok(added)
    }

    /// Removes the given users that are in the ticket and returns them. Emptying a
    /// ticket that is not CLOSED is rejected before anything changes. While the channel
    /// is visible, a user whose overwrite could not be revoked stays a participant.
    pub async fn remove_ticket_participants(
        &self,
        channel_id: Id<ChannelMarker>,
        users: &[Id<UserMarker>],
    ) -> Result<Vec<Id<UserMarker>>, Error> {
        let ticket = self.ticket_in(channel_id).await?;

        let (delta, visible, before) = self
            .cache
            .update(ticket.id, |t| {
                let delta: Vec<_> = users
                    .iter()
                    .copied()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .filter(|u| t.participants.contains(u))
                    .collect();
                if !delta.is_empty() && !t.is_closed() && delta.len() == t.participants.len() {
                    return Err(InvariantViolation::LastParticipant { ticket_id: t.id });
                }
                Ok((delta, t.status.grants_visibility(), t.participants.clone()))
            })
            .ok_or(Error::not_found(Resource::Ticket, ticket.id as u64))??;

        if delta.is_empty() {
            return Ok(Vec::new());
        }

        // membership only shrinks by what the channel actually stopped showing
        let removed = if visible {
            let revoked = self
                .permissions
                .apply(channel_id, &delta, Visibility::Hidden, &before)
                .await;
            if revoked.len() != delta.len() {
                warn!(ticket_id = ticket.id, "Some participants kept their overwrite and stay in the ticket");
            }
            revoked
        } else {
            delta
        };

        if removed.is_empty() {
            return Ok(Vec::new());
        }

        self.cache.update(ticket.id, |t| {
            for u in &removed {
                t.participants.remove(u);
            }
        });
        self.repo.remove_participants(ticket.id, &removed).await?;
        info!(ticket_id = ticket.id, count = removed.len(), "Removed ticket participants");
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Close controls
    // ------------------------------------------------------------------

    /// Records `message_id` as the ticket's control message and strips the controls off
    /// the previous one.
    pub async fn set_close_msg(
        &self,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
        kind: CloseMessageKind,
    ) -> Result<(), Error> {
        let ticket = self.ticket_in(channel_id).await?;
        let previous = self
            .cache
            .update(ticket.id, |t| {
                t.close_message_kind = Some(kind);
                t.close_message_id.replace(message_id)
            })
            .ok_or(Error::not_found(Resource::Ticket, ticket.id as u64))?;

        self.repo.set_close_message(ticket.id, message_id, kind).await?;

        if let Some(old) = previous.filter(|old| *old != message_id) {
            if let Err(e) = self.platform.set_message_controls(channel_id, old, None).await {
                debug!(ticket_id = ticket.id, message_id = %old, "Could not detach old controls: {}", e);
            }
        }
        Ok(())
    }

    /// Posts a control message of `kind` and makes it the ticket's close message.
    pub async fn post_close_controls(
        &self,
        channel_id: Id<ChannelMarker>,
        kind: CloseMessageKind,
        content: String,
    ) -> Result<Id<MessageMarker>, Error> {
        let message = OutgoingMessage::text(content).with_controls(kind.controls());
        let message_id = self.platform.send_message(channel_id, message).await?;
        self.set_close_msg(channel_id, message_id, kind).await?;
        Ok(message_id)
    }

    // ------------------------------------------------------------------
    // Startup
    // ------------------------------------------------------------------

    async fn probe(&self, ticket: &Ticket) -> TicketProbe {
        let guild = presence_of(&self.platform.resolve_guild(ticket.guild_id).await);
        let channel = if guild == Presence::Present {
            presence_of(&self.platform.resolve_channel(ticket.channel_id).await)
        } else {
            Presence::Unknown
        };
        let close_message = match ticket.close_message_id {
            Some(message_id) if channel == Presence::Present => {
                Some(presence_of(&self.platform.fetch_message(ticket.channel_id, message_id).await))
            }
            Some(_) => Some(Presence::Unknown),
            None => None,
        };
        TicketProbe {
            ticket_id: ticket.id,
            guild,
            channel,
            close_message,
        }
    }

    fn default_close_kind(ticket: &Ticket) -> CloseMessageKind {
        ticket.close_message_kind.unwrap_or(if ticket.is_closed() {
            CloseMessageKind::AfterClose
        } else {
            CloseMessageKind::CloseToggle
        })
    }

    /// Loads the cache and brings every ticket back in line with its channel. One
    /// ticket's failure does not stop the others.
    pub async fn reconcile_tickets(&self) -> Result<TicketReconcileSummary, Error> {
        self.init_cache().await?;
        let tickets = self.cache.all();

        let mut probes = Vec::with_capacity(tickets.len());
        for ticket in &tickets {
            probes.push(self.probe(ticket).await);
        }

        let mut summary = TicketReconcileSummary::default();
        for action in reconcile_tickets(&probes) {
            let result = match action {
                TicketAction::Skip(ticket_id) => {
                    debug!(ticket_id, "Guild or channel unavailable, leaving ticket as is");
                    summary.skipped += 1;
                    Ok(())
                }
                TicketAction::Forget(ticket_id) => {
                    summary.forgotten += 1;
                    self.prune_orphaned_ticket(ticket_id).await
                }
                TicketAction::ResendControls(ticket_id) => {
                    summary.resent += 1;
                    self.resend_controls(ticket_id).await
                }
                TicketAction::Reattach(ticket_id) => {
                    summary.reattached += 1;
                    self.reattach_controls(ticket_id).await
                }
            };
            if let Err(e) = result {
                error!(?action, "Ticket reconciliation step failed: {}", e);
            }
        }
        info!(?summary, "Ticket reconciliation finished");
        Ok(summary)
    }

    async fn resend_controls(&self, ticket_id: i64) -> Result<(), Error> {
        let ticket = self
            .cache
            .get(ticket_id)
            .ok_or(Error::not_found(Resource::Ticket, ticket_id as u64))?;
        let kind = Self::default_close_kind(&ticket);
        let content = match kind {
            CloseMessageKind::AfterClose => "This ticket is closed.",
            _ => "Close this ticket when you are done.",
        };
        self.post_close_controls(ticket.channel_id, kind, content.to_string())
            .await?;
        Ok(())
    }

    async fn reattach_controls(&self, ticket_id: i64) -> Result<(), Error> {
        let ticket = self
            .cache
            .get(ticket_id)
            .ok_or(Error::not_found(Resource::Ticket, ticket_id as u64))?;
        if let Some(message_id) = ticket.close_message_id {
            let kind = Self::default_close_kind(&ticket);
            self.platform
                .set_message_controls(ticket.channel_id, message_id, Some(kind.controls()))
                .await?;
        }
        self.project_name(&ticket).await
    }
}
