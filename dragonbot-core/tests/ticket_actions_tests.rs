// File: dragonbot-core/tests/ticket_actions_tests.rs

use dragonbot_common::error::Error;
use dragonbot_common::models::{CloseMessageKind, ControlAction, TicketStatus, TicketType};
use dragonbot_core::repositories::tickets::TICKETS_TABLE;
use dragonbot_core::services::tickets::{ActionContext, TicketLookup};
use dragonbot_core::test_utils::helpers::*;
use twilight_model::id::marker::ChannelMarker;
use twilight_model::id::Id;

fn ctx(channel_id: Id<ChannelMarker>, user_id: u64, staff: bool) -> ActionContext {
    ActionContext {
        guild_id: Some(guild()),
        channel_id,
        user_id: user(user_id),
        roles: if staff { vec![staff_role()] } else { Vec::new() },
    }
}

#[tokio::test]
async fn test_create_button_opens_ticket() -> Result<(), Error> {
    let h = TestHarness::new();
    let panel_channel = h.platform.add_channel(guild(), "support");

    let reply = h
        .services
        .handle_action(ControlAction::CreateTicket(TicketType::Group), &ctx(panel_channel, 1, false))
        .await;
    assert!(reply.content.starts_with("Your ticket is ready"), "{}", reply.content);

    let ticket = h.tickets.get_ticket(TicketLookup::Id(1)).await?.unwrap();
    assert_eq!(ticket.ticket_type, TicketType::Group);
    assert!(reply.content.contains(&ticket.channel_id.to_string()));
    Ok(())
}

#[tokio::test]
async fn test_create_outside_guild_is_refused() -> Result<(), Error> {
    let h = TestHarness::new();
    let mut context = ctx(Id::new(77), 1, false);
    context.guild_id = None;

    let reply = h
        .services
        .handle_action(ControlAction::CreateTicket(TicketType::Other), &context)
        .await;
    assert_eq!(reply.content, "I am not allowed to do that here.");
    assert!(h.store.rows(TICKETS_TABLE).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_close_button_flow() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = h.tickets.create_ticket(user(1), guild(), TicketType::Purchase).await?;
    let here = ctx(ticket.channel_id, 1, false);

    h.services.handle_action(ControlAction::RequestClose, &here).await;
    let current = h.tickets.get_ticket(TicketLookup::Id(ticket.id)).await?.unwrap();
    assert_eq!(current.close_message_kind, Some(CloseMessageKind::CloseConfirm));
    assert_eq!(current.status, TicketStatus::Open);

    h.services.handle_action(ControlAction::CancelClose, &here).await;
    let current = h.tickets.get_ticket(TicketLookup::Id(ticket.id)).await?.unwrap();
    assert_eq!(current.close_message_kind, Some(CloseMessageKind::CloseToggle));

    let reply = h.services.handle_action(ControlAction::ConfirmClose, &here).await;
    assert_eq!(reply.content, "Ticket closed. The transcript has been sent to every participant.");
    let current = h.tickets.get_ticket(TicketLookup::Id(ticket.id)).await?.unwrap();
    assert_eq!(current.status, TicketStatus::Closed);
    assert_eq!(current.close_message_kind, Some(CloseMessageKind::AfterClose));

    let reply = h.services.handle_action(ControlAction::ConfirmClose, &here).await;
    assert_eq!(reply.content, "This ticket is already closed.");
    Ok(())
}

#[tokio::test]
async fn test_close_reply_mentions_failed_transcript() -> Result<(), Error> {
    let h = TestHarness::new();
    h.exporter.set_failing(true);
    let ticket = h.tickets.create_ticket(user(1), guild(), TicketType::Purchase).await?;

    let reply = h
        .services
        .handle_action(ControlAction::ConfirmClose, &ctx(ticket.channel_id, 1, false))
        .await;
    assert_eq!(reply.content, "Ticket closed, but transcript generation failed.");
    Ok(())
}

#[tokio::test]
async fn test_save_transcript_returns_attachment() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = h.tickets.create_ticket(user(1), guild(), TicketType::Purchase).await?;
    h.tickets.close_ticket(ticket.channel_id, user(99)).await?;

    let reply = h
        .services
        .handle_action(ControlAction::SaveTranscript, &ctx(ticket.channel_id, 99, true))
        .await;
    let attachment = reply.attachment.expect("transcript attached");
    assert_eq!(attachment.filename, "purchase-0001-CLOSED.html");
    assert_eq!(attachment.bytes, TRANSCRIPT_HTML);
    Ok(())
}

#[tokio::test]
async fn test_delete_requires_staff_and_closed_ticket() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = h.tickets.create_ticket(user(1), guild(), TicketType::Purchase).await?;

    let reply = h
        .services
        .handle_action(ControlAction::Delete, &ctx(ticket.channel_id, 99, true))
        .await;
    assert_eq!(reply.content, "Close the ticket before deleting it.");

    h.tickets.close_ticket(ticket.channel_id, user(99)).await?;
    let reply = h
        .services
        .handle_action(ControlAction::Delete, &ctx(ticket.channel_id, 1, false))
        .await;
    assert_eq!(reply.content, "I am not allowed to do that here.");
    assert!(h.tickets.is_ticket_channel(ticket.channel_id).await?);

    let reply = h
        .services
        .handle_action(ControlAction::Delete, &ctx(ticket.channel_id, 99, true))
        .await;
    assert_eq!(reply.content, "Ticket deleted.");
    assert!(h.store.rows(TICKETS_TABLE).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_reopen_button() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = h.tickets.create_ticket(user(1), guild(), TicketType::Purchase).await?;
    let here = ctx(ticket.channel_id, 1, false);

    let reply = h.services.handle_action(ControlAction::Reopen, &here).await;
    assert_eq!(reply.content, "This ticket is already open.");

    h.tickets.close_ticket(ticket.channel_id, user(99)).await?;
    let reply = h.services.handle_action(ControlAction::Reopen, &here).await;
    assert_eq!(reply.content, "Ticket reopened.");
    assert_eq!(h.platform.visible_users(ticket.channel_id), vec![user(1)]);
    Ok(())
}

#[tokio::test]
async fn test_controls_outside_ticket_channel() -> Result<(), Error> {
    let h = TestHarness::new();
    let general = h.platform.add_channel(guild(), "general");

    let reply = h
        .services
        .handle_action(ControlAction::ConfirmClose, &ctx(general, 1, false))
        .await;
    assert_eq!(reply.content, "This is not a ticket channel!");
    Ok(())
}

#[tokio::test]
async fn test_action_on_vanished_channel_prunes_ticket() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = h.tickets.create_ticket(user(1), guild(), TicketType::Purchase).await?;
    h.platform.remove_channel(ticket.channel_id);

    h.services
        .handle_action(ControlAction::ConfirmClose, &ctx(ticket.channel_id, 1, false))
        .await;

    assert!(h.tickets.get_ticket(TicketLookup::Id(ticket.id)).await?.is_none());
    assert!(h.store.rows(TICKETS_TABLE).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_panel_command_is_staff_only() -> Result<(), Error> {
    let h = TestHarness::new();
    let channel = h.platform.add_channel(guild(), "support");

    let reply = h.services.request_panel(&ctx(channel, 1, false)).await;
    assert_eq!(reply.content, "I am not allowed to do that here.");
    assert!(h.panels.get_panel(Some(guild()), None, None).await?.is_none());

    let reply = h.services.request_panel(&ctx(channel, 99, true)).await;
    let panel = h.panels.get_panel(Some(guild()), None, None).await?.unwrap();
    assert_eq!(reply.content, format!("Ticket panel posted: {}", panel.jump_url()));

    let reply = h.services.request_panel(&ctx(channel, 99, true)).await;
    assert!(reply.content.starts_with("There can only be one ticket panel per server"));
    assert!(reply.content.ends_with(&format!("/{}", panel.message_id)));
    Ok(())
}
