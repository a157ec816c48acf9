// File: dragonbot-core/src/services/tickets/actions.rs
//
// What each ticket button does, independent of how the press arrived.

use std::sync::Arc;

use tracing::{error, info, warn};
use twilight_model::id::marker::{ChannelMarker, GuildMarker, RoleMarker, UserMarker};
use twilight_model::id::Id;

use dragonbot_common::error::Error;
use dragonbot_common::models::{Attachment, CloseMessageKind, ControlAction};

use crate::services::tickets::panel_manager::TicketPanelManager;
use crate::services::tickets::ticket_manager::{ArchiveOutcome, TicketManager};

/// The two managers the gateway drives.
pub struct TicketServices {
    pub tickets: Arc<TicketManager>,
    pub panels: Arc<TicketPanelManager>,
}

/// Who pressed what, where.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub guild_id: Option<Id<GuildMarker>>,
    pub channel_id: Id<ChannelMarker>,
    pub user_id: Id<UserMarker>,
    pub roles: Vec<Id<RoleMarker>>,
}

/// Private answer to the user who pressed the control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub attachment: Option<Attachment>,
}

impl Reply {
    fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachment: None,
        }
    }
}

impl TicketServices {
    pub fn new(tickets: Arc<TicketManager>, panels: Arc<TicketPanelManager>) -> Self {
        Self { tickets, panels }
    }

    /// Runs `action` and turns any failure into a user-facing reply. A ticket whose
    /// channel turned out to be gone is pruned on the way.
    pub async fn handle_action(&self, action: ControlAction, ctx: &ActionContext) -> Reply {
        match self.run_action(action, ctx).await {
            Ok(reply) => reply,
            Err(e) => {
                if let Error::OrphanedTicket { ticket_id, .. } = e {
                    if let Err(prune) = self.tickets.prune_orphaned_ticket(ticket_id).await {
                        error!(ticket_id, "Could not prune orphaned ticket: {}", prune);
                    }
                } else {
                    warn!(?action, channel_id = %ctx.channel_id, "Ticket action failed: {}", e);
                }
                Reply::text(e.user_message())
            }
        }
    }

    /// Staff command: post the guild's ticket panel in the current channel.
    pub async fn request_panel(&self, ctx: &ActionContext) -> Reply {
        let result = async {
            if !self.tickets.config().is_staff(&ctx.roles) {
                return Err(Error::Forbidden("only staff may post the ticket panel".into()));
            }
            let guild_id = ctx
                .guild_id
                .ok_or_else(|| Error::Forbidden("panels can only be posted inside a server".into()))?;
            self.panels.request_panel(guild_id, ctx.channel_id).await
        }
        .await;
        match result {
            Ok(panel) => Reply::text(format!("Ticket panel posted: {}", panel.jump_url())),
            Err(e) => {
                warn!(channel_id = %ctx.channel_id, "Panel request failed: {}", e);
                Reply::text(e.user_message())
            }
        }
    }

    async fn run_action(&self, action: ControlAction, ctx: &ActionContext) -> Result<Reply, Error> {
        let tickets = &self.tickets;
        match action {
            ControlAction::CreateTicket(kind) => {
                let guild_id = ctx
                    .guild_id
                    .ok_or_else(|| Error::Forbidden("tickets can only be opened inside a server".into()))?;
                let ticket = tickets.create_ticket(ctx.user_id, guild_id, kind).await?;
                Ok(Reply::text(format!("Your ticket is ready: <#{}>", ticket.channel_id)))
            }
            ControlAction::RequestClose => {
                tickets
                    .post_close_controls(
                        ctx.channel_id,
                        CloseMessageKind::CloseConfirm,
                        "Are you sure you want to close this ticket?".to_string(),
                    )
                    .await?;
                Ok(Reply::text("Please confirm below."))
            }
            ControlAction::CancelClose => {
                tickets
                    .post_close_controls(ctx.channel_id, CloseMessageKind::CloseToggle, "Close cancelled.".to_string())
                    .await?;
                Ok(Reply::text("The ticket stays open."))
            }
            ControlAction::ConfirmClose => match tickets.close_ticket(ctx.channel_id, ctx.user_id).await? {
                None => Ok(Reply::text("This ticket is already closed.")),
                Some(report) => match report.archive {
                    ArchiveOutcome::Delivered { filename } => {
                        info!(ticket_id = report.ticket_id, %filename, "Close finished with transcript");
                        Ok(Reply::text("Ticket closed. The transcript has been sent to every participant."))
                    }
                    ArchiveOutcome::Failed(_) => Ok(Reply::text("Ticket closed, but transcript generation failed.")),
                },
            },
            ControlAction::SaveTranscript => {
                let transcript = tickets.archive_ticket(ctx.channel_id).await?;
                Ok(Reply {
                    content: "Channel transcript".to_string(),
                    attachment: Some(Attachment {
                        filename: transcript.filename,
                        bytes: transcript.bytes,
                    }),
                })
            }
            ControlAction::Reopen => {
                if tickets.reopen_ticket(ctx.channel_id).await? {
                    Ok(Reply::text("Ticket reopened."))
                } else {
                    Ok(Reply::text("This ticket is already open."))
                }
            }
            ControlAction::Delete => {
                if !tickets.config().is_staff(&ctx.roles) {
                    return Err(Error::Forbidden("only staff may delete tickets".into()));
                }
                tickets.delete_ticket(ctx.channel_id).await?;
                Ok(Reply::text("Ticket deleted."))
            }
        }
    }
}
