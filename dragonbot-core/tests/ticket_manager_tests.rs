// File: dragonbot-core/tests/ticket_manager_tests.rs

use dragonbot_common::error::{Error, InvariantViolation};
use dragonbot_common::models::{CloseMessageKind, TicketStatus, TicketType, Visibility};
use dragonbot_core::repositories::tickets::{PARTICIPANTS_TABLE, TICKETS_TABLE};
use dragonbot_core::services::tickets::{TicketLookup, TicketMessage};
use dragonbot_core::test_utils::helpers::*;

async fn open_ticket(h: &TestHarness) -> Result<dragonbot_common::models::Ticket, Error> {
    h.tickets.create_ticket(user(1), guild(), TicketType::Purchase).await
}

#[tokio::test]
async fn test_create_ticket_names_channel_and_records_requester() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;

    assert_eq!(ticket.id, 1);
    assert_eq!(ticket.status, TicketStatus::Open);
    assert_eq!(ticket.participants.iter().copied().collect::<Vec<_>>(), vec![user(1)]);
    assert_eq!(h.platform.channel_name(ticket.channel_id).as_deref(), Some("purchase-0001-OPEN"));
    assert_eq!(h.platform.visible_users(ticket.channel_id), vec![user(1)]);

    assert_eq!(h.store.rows(TICKETS_TABLE).await.len(), 1);
    assert_eq!(h.store.rows(PARTICIPANTS_TABLE).await.len(), 1);

    let state = h.platform.state();
    let greeting = state
        .sent
        .iter()
        .find(|m| m.channel_id == ticket.channel_id)
        .expect("greeting posted");
    assert!(greeting.message.content.contains("<@1>"));
    assert!(greeting.message.content.contains("<@&600>"));
    assert!(greeting.message.content.contains("Mon-Fri 13:00~24:00"));
    assert_eq!(greeting.message.controls, Some(CloseMessageKind::CloseToggle.controls()));
    assert_eq!(ticket.close_message_id, Some(greeting.message_id));
    Ok(())
}

#[tokio::test]
async fn test_seventh_ticket_is_named_with_padded_id() -> Result<(), Error> {
    let h = TestHarness::new();
    for n in 0..6 {
        h.tickets.create_ticket(user(10 + n), guild(), TicketType::Group).await?;
    }
    let ticket = open_ticket(&h).await?;

    assert_eq!(ticket.id, 7);
    assert_eq!(h.platform.channel_name(ticket.channel_id).as_deref(), Some("purchase-0007-OPEN"));
    Ok(())
}

#[tokio::test]
async fn test_create_ticket_failure_removes_channel() -> Result<(), Error> {
    let h = TestHarness::new();
    h.store.fail_writes(true);

    let err = open_ticket(&h).await.unwrap_err();
    assert!(matches!(err, Error::Database(_)));

    let state = h.platform.state();
    assert_eq!(state.deleted_channels.len(), 1);
    drop(state);
    assert!(h.tickets.cache().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_channel_create_rejection_writes_nothing() -> Result<(), Error> {
    let h = TestHarness::new();
    h.platform.state().fail_channel_create = true;

    assert!(open_ticket(&h).await.is_err());
    assert_eq!(h.store.writes(), 0);
    assert!(h.tickets.cache().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_setting_same_status_twice_is_a_noop() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;

    h.store.reset_writes();
    h.platform.clear_calls();
    assert!(h.tickets.set_ticket_status(ticket.id, TicketStatus::InProgress).await?);
    assert_eq!(h.store.writes(), 1);
    assert_eq!(h.platform.state().renames.len(), 1);
    assert_eq!(h.platform.channel_name(ticket.channel_id).as_deref(), Some("purchase-0001-IN_PROGRESS"));

    h.store.reset_writes();
    h.platform.clear_calls();
    assert!(!h.tickets.set_ticket_status(ticket.id, TicketStatus::InProgress).await?);
    assert_eq!(h.store.writes(), 0);
    let state = h.platform.state();
    assert!(state.renames.is_empty());
    assert!(state.visibility_calls.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_resolved_ticket_cannot_go_back_in_progress() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;
    h.tickets.set_ticket_status(ticket.id, TicketStatus::Resolved).await?;

    let err = h
        .tickets
        .set_ticket_status(ticket.id, TicketStatus::InProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Invariant(InvariantViolation::InvalidTransition { .. })));

    let cached = h.tickets.get_ticket(TicketLookup::Id(ticket.id)).await?.unwrap();
    assert_eq!(cached.status, TicketStatus::Resolved);
    Ok(())
}

#[tokio::test]
async fn test_removing_last_participant_is_rejected() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;
    h.store.reset_writes();
    h.platform.clear_calls();

    let err = h
        .tickets
        .remove_ticket_participants(ticket.channel_id, &[user(1)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Invariant(InvariantViolation::LastParticipant { ticket_id: 1 })));

    let participants = h.tickets.get_ticket_participants(ticket.channel_id).await?;
    assert!(participants.contains(&user(1)));
    assert_eq!(participants.len(), 1);
    assert_eq!(h.store.writes(), 0);
    assert!(h.platform.state().visibility_calls.is_empty());
    assert_eq!(h.platform.visibility(ticket.channel_id, user(1)), Some(Visibility::Visible));
    Ok(())
}

#[tokio::test]
async fn test_add_then_remove_touches_only_the_delta() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;
    h.platform.clear_calls();

    let added = h
        .tickets
        .add_ticket_participants(ticket.channel_id, &[user(3), user(2), user(1), user(2)])
        .await?;
    assert_eq!(added, vec![user(2), user(3)]);
    {
        let state = h.platform.state();
        let mut calls = state.visibility_calls.clone();
        calls.sort();
        assert_eq!(
            calls,
            vec![
                (ticket.channel_id, user(2), Visibility::Visible),
                (ticket.channel_id, user(3), Visibility::Visible),
            ]
        );
    }
    assert_eq!(h.store.rows(PARTICIPANTS_TABLE).await.len(), 3);

    h.platform.clear_calls();
    let removed = h
        .tickets
        .remove_ticket_participants(ticket.channel_id, &[user(2), user(3), user(9)])
        .await?;
    assert_eq!(removed, vec![user(2), user(3)]);
    {
        let state = h.platform.state();
        assert_eq!(state.visibility_calls.len(), 2);
        assert!(state.visibility_calls.iter().all(|(_, _, v)| *v == Visibility::Hidden));
    }

    let participants = h.tickets.get_ticket_participants(ticket.channel_id).await?;
    assert_eq!(participants.into_iter().collect::<Vec<_>>(), vec![user(1)]);
    assert_eq!(h.store.rows(PARTICIPANTS_TABLE).await.len(), 1);
    assert_eq!(h.platform.visible_users(ticket.channel_id), vec![user(1)]);
    Ok(())
}

#[tokio::test]
async fn test_forbidden_grant_is_not_recorded() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;
    h.platform.state().forbidden_users.insert(user(4));

    let added = h
        .tickets
        .add_ticket_participants(ticket.channel_id, &[user(2), user(4)])
        .await?;
    assert_eq!(added, vec![user(2)]);

    let participants = h.tickets.get_ticket_participants(ticket.channel_id).await?;
    assert!(!participants.contains(&user(4)));
    assert_eq!(h.store.rows(PARTICIPANTS_TABLE).await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_refused_revoke_keeps_participant_until_close() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;
    h.tickets.add_ticket_participants(ticket.channel_id, &[user(2)]).await?;
    h.platform.state().forbidden_users.insert(user(2));

    let removed = h
        .tickets
        .remove_ticket_participants(ticket.channel_id, &[user(2)])
        .await?;
    assert!(removed.is_empty());
    assert!(h.tickets.get_ticket_participants(ticket.channel_id).await?.contains(&user(2)));
    assert_eq!(h.store.rows(PARTICIPANTS_TABLE).await.len(), 2);
    assert_eq!(h.platform.visibility(ticket.channel_id, user(2)), Some(Visibility::Visible));

    // once the platform lets go, closing revokes everyone still listed
    h.platform.state().forbidden_users.clear();
    h.tickets.close_ticket(ticket.channel_id, user(99)).await?;
    assert!(h.platform.visible_users(ticket.channel_id).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_close_from_every_open_state_hides_channel() -> Result<(), Error> {
    for start in [TicketStatus::Open, TicketStatus::InProgress, TicketStatus::Resolved] {
        for exporter_fails in [false, true] {
            let h = TestHarness::new();
            h.exporter.set_failing(exporter_fails);
            let ticket = open_ticket(&h).await?;
            h.tickets.add_ticket_participants(ticket.channel_id, &[user(2)]).await?;
            h.tickets.set_ticket_status(ticket.id, start).await?;

            let report = h
                .tickets
                .close_ticket(ticket.channel_id, user(99))
                .await?
                .expect("ticket was open");
            assert_eq!(report.previous_status, start);
            assert_eq!(report.archive.is_delivered(), !exporter_fails);
            assert!(h.platform.visible_users(ticket.channel_id).is_empty(), "{start} / {exporter_fails}");

            let cached = h.tickets.get_ticket(TicketLookup::Id(ticket.id)).await?.unwrap();
            assert_eq!(cached.status, TicketStatus::Closed);
            assert_eq!(cached.close_message_kind, Some(CloseMessageKind::AfterClose));
            assert_eq!(h.platform.channel_name(ticket.channel_id).as_deref(), Some("purchase-0001-CLOSED"));

            let reloaded = h.restart();
            reloaded.tickets.init_cache().await?;
            let stored = reloaded.tickets.get_ticket(TicketLookup::Id(ticket.id)).await?.unwrap();
            assert_eq!(stored.status, TicketStatus::Closed);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_close_delivers_transcript_and_feedback() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;
    h.tickets.add_ticket_participants(ticket.channel_id, &[user(2)]).await?;

    let report = h.tickets.close_ticket(ticket.channel_id, user(99)).await?.unwrap();
    assert!(report.archive.is_delivered());
    let mut revoked = report.revoked.clone();
    revoked.sort();
    assert_eq!(revoked, vec![user(1), user(2)]);

    let state = h.platform.state();
    let archive_channel = h.config.archive_channel_id.unwrap();
    let archived = state
        .sent
        .iter()
        .find(|m| m.channel_id == archive_channel)
        .expect("transcript posted to archive channel");
    let attachment = archived.message.attachment.as_ref().unwrap();
    assert_eq!(attachment.filename, "purchase-0001-CLOSED.html");
    assert_eq!(attachment.bytes, TRANSCRIPT_HTML);

    let recipients: Vec<_> = state.direct_messages.iter().map(|(u, _)| *u).collect();
    assert_eq!(recipients, vec![user(1), user(2)]);
    assert!(state.direct_messages.iter().all(|(_, m)| m.attachment.is_some()));

    // greeting controls were detached in favour of the after-close set
    assert!(state
        .control_edits
        .iter()
        .any(|(c, m, controls)| *c == ticket.channel_id && Some(*m) == ticket.close_message_id && controls.is_none()));
    drop(state);

    assert_eq!(h.feedback.prompts(), vec![(ticket.id, user(1)), (ticket.id, user(2))]);
    Ok(())
}

#[tokio::test]
async fn test_failed_export_posts_notice_and_skips_delivery() -> Result<(), Error> {
    let h = TestHarness::new();
    h.exporter.set_failing(true);
    let ticket = open_ticket(&h).await?;

    h.tickets.close_ticket(ticket.channel_id, user(99)).await?.unwrap();

    let state = h.platform.state();
    assert!(state
        .sent
        .iter()
        .any(|m| m.channel_id == ticket.channel_id && m.message.content == "Transcript generation failed."));
    assert!(state.direct_messages.is_empty());
    drop(state);
    assert!(h.feedback.prompts().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_close_with_failed_rename_still_archives() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;
    h.platform.state().fail_renames = true;

    let report = h
        .tickets
        .close_ticket(ticket.channel_id, user(99))
        .await?
        .expect("ticket was open");
    assert!(report.archive.is_delivered());
    assert_eq!(h.platform.channel_name(ticket.channel_id).as_deref(), Some("purchase-0001-OPEN"));
    assert!(h.platform.visible_users(ticket.channel_id).is_empty());

    let current = h.tickets.get_ticket(TicketLookup::Id(ticket.id)).await?.unwrap();
    assert_eq!(current.status, TicketStatus::Closed);
    assert_eq!(current.close_message_kind, Some(CloseMessageKind::AfterClose));
    assert_eq!(h.feedback.prompts(), vec![(ticket.id, user(1))]);
    Ok(())
}

#[tokio::test]
async fn test_closing_twice_reports_nothing_new() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;
    h.tickets.close_ticket(ticket.channel_id, user(99)).await?;

    h.store.reset_writes();
    assert!(h.tickets.close_ticket(ticket.channel_id, user(99)).await?.is_none());
    assert_eq!(h.store.writes(), 0);
    Ok(())
}

#[tokio::test]
async fn test_reopen_restores_visibility_of_current_participants() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;
    h.tickets.close_ticket(ticket.channel_id, user(99)).await?;

    // joined while closed: recorded, not granted
    h.platform.clear_calls();
    let added = h.tickets.add_ticket_participants(ticket.channel_id, &[user(2)]).await?;
    assert_eq!(added, vec![user(2)]);
    assert!(h.platform.state().visibility_calls.is_empty());

    assert!(h.tickets.reopen_ticket(ticket.channel_id).await?);
    assert_eq!(h.platform.visible_users(ticket.channel_id), vec![user(1), user(2)]);
    assert_eq!(h.platform.channel_name(ticket.channel_id).as_deref(), Some("purchase-0001-OPEN"));

    let cached = h.tickets.get_ticket(TicketLookup::Id(ticket.id)).await?.unwrap();
    assert_eq!(cached.close_message_kind, Some(CloseMessageKind::CloseToggle));

    assert!(!h.tickets.reopen_ticket(ticket.channel_id).await?);
    Ok(())
}

#[tokio::test]
async fn test_reopen_of_in_progress_ticket_is_rejected() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;
    h.tickets.set_ticket_status(ticket.id, TicketStatus::InProgress).await?;

    let err = h.tickets.reopen_ticket(ticket.channel_id).await.unwrap_err();
    assert!(matches!(err, Error::Invariant(InvariantViolation::InvalidTransition { .. })));
    Ok(())
}

#[tokio::test]
async fn test_delete_requires_closed_ticket() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;

    let err = h.tickets.delete_ticket(ticket.channel_id).await.unwrap_err();
    assert!(matches!(err, Error::Invariant(InvariantViolation::NotClosed { .. })));

    h.tickets.close_ticket(ticket.channel_id, user(99)).await?;
    h.tickets.delete_ticket(ticket.channel_id).await?;

    assert!(h.tickets.get_ticket(TicketLookup::Id(ticket.id)).await?.is_none());
    assert!(h.store.rows(TICKETS_TABLE).await.is_empty());
    assert!(h.store.rows(PARTICIPANTS_TABLE).await.is_empty());
    assert!(h.platform.state().deleted_channels.contains(&ticket.channel_id));
    Ok(())
}

#[tokio::test]
async fn test_delete_stands_when_channel_removal_fails() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;
    h.tickets.close_ticket(ticket.channel_id, user(99)).await?;
    h.platform.state().fail_channel_delete = true;

    h.tickets.delete_ticket(ticket.channel_id).await?;

    assert!(h.tickets.get_ticket(TicketLookup::Id(ticket.id)).await?.is_none());
    assert!(h.store.rows(TICKETS_TABLE).await.is_empty());
    assert!(h.store.rows(PARTICIPANTS_TABLE).await.is_empty());
    assert!(h.platform.channel_name(ticket.channel_id).is_some());
    Ok(())
}

#[tokio::test]
async fn test_state_survives_restart() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;
    h.tickets.add_ticket_participants(ticket.channel_id, &[user(2)]).await?;
    h.tickets.set_ticket_status(ticket.id, TicketStatus::InProgress).await?;
    let before = h.tickets.get_ticket(TicketLookup::Id(ticket.id)).await?.unwrap();

    let restarted = h.restart();
    assert_eq!(restarted.tickets.init_cache().await?, 1);
    let after = restarted.tickets.get_ticket(TicketLookup::Channel(ticket.channel_id)).await?.unwrap();
    assert_eq!(after, before);
    Ok(())
}

#[tokio::test]
async fn test_lookup_falls_back_to_store() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;

    let cold = h.restart();
    assert!(cold.tickets.cache().is_empty());
    assert!(cold.tickets.is_ticket_channel(ticket.channel_id).await?);
    assert_eq!(cold.tickets.cache().len(), 1);

    let other = h.platform.add_channel(guild(), "general");
    assert!(!cold.tickets.is_ticket_channel(other).await?);
    let err = cold.tickets.get_ticket_participants(other).await.unwrap_err();
    assert!(matches!(err, Error::ChannelNotTicket(_)));
    Ok(())
}

#[tokio::test]
async fn test_participants_resolve_to_members() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;
    h.platform.state().member_roles.insert(user(1), vec![staff_role()]);

    let members = h.tickets.get_ticket_participants_member(ticket.channel_id).await?;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, user(1));
    assert_eq!(members[0].roles, vec![staff_role()]);
    assert_eq!(members[0].mention(), "<@1>");
    Ok(())
}

#[tokio::test]
async fn test_interleaved_close_and_add_leave_nobody_visible() -> Result<(), Error> {
    for add_first in [true, false] {
        let h = TestHarness::new();
        let ticket = open_ticket(&h).await?;

        let close = h.tickets.close_ticket(ticket.channel_id, user(99));
        let to_add = [user(2)];
        let add = h.tickets.add_ticket_participants(ticket.channel_id, &to_add);
        let (closed, added) = if add_first {
            let (a, c) = tokio::join!(add, close);
            (c, a)
        } else {
            tokio::join!(close, add)
        };
        assert!(closed?.is_some());
        assert_eq!(added?, vec![user(2)]);

        assert!(h.platform.visible_users(ticket.channel_id).is_empty(), "add_first={add_first}");
        let cached = h.tickets.get_ticket(TicketLookup::Id(ticket.id)).await?.unwrap();
        assert_eq!(cached.status, TicketStatus::Closed);
        assert!(cached.participants.contains(&user(2)));
    }
    Ok(())
}

#[tokio::test]
async fn test_staff_message_moves_open_ticket_forward() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;

    let customer = TicketMessage {
        channel_id: Some(ticket.channel_id),
        author_id: Some(user(1)),
        ..Default::default()
    };
    h.tickets.handle_ticket_message(&customer).await?;
    let cached = h.tickets.get_ticket(TicketLookup::Id(ticket.id)).await?.unwrap();
    assert_eq!(cached.status, TicketStatus::Open);

    let staff = TicketMessage {
        channel_id: Some(ticket.channel_id),
        author_id: Some(user(50)),
        author_roles: vec![staff_role()],
        ..Default::default()
    };
    h.tickets.handle_ticket_message(&staff).await?;
    let cached = h.tickets.get_ticket(TicketLookup::Id(ticket.id)).await?.unwrap();
    assert_eq!(cached.status, TicketStatus::InProgress);
    assert_eq!(h.platform.channel_name(ticket.channel_id).as_deref(), Some("purchase-0001-IN_PROGRESS"));
    Ok(())
}

#[tokio::test]
async fn test_staff_mention_is_acknowledged() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;
    h.platform.clear_calls();

    let bot = TicketMessage {
        channel_id: Some(ticket.channel_id),
        author_id: Some(user(2)),
        author_is_bot: true,
        mentioned_roles: vec![staff_role()],
        ..Default::default()
    };
    h.tickets.handle_ticket_message(&bot).await?;
    assert!(h.platform.state().sent.is_empty());

    let customer = TicketMessage {
        channel_id: Some(ticket.channel_id),
        author_id: Some(user(1)),
        mentioned_roles: vec![staff_role()],
        ..Default::default()
    };
    h.tickets.handle_ticket_message(&customer).await?;
    let state = h.platform.state();
    assert_eq!(state.sent.len(), 1);
    assert!(state.sent[0].message.content.starts_with("Hello! We have received your message"));
    Ok(())
}

#[tokio::test]
async fn test_missing_channel_surfaces_as_orphan() -> Result<(), Error> {
    let h = TestHarness::new();
    let ticket = open_ticket(&h).await?;
    h.platform.remove_channel(ticket.channel_id);

    let err = h
        .tickets
        .set_ticket_status(ticket.id, TicketStatus::InProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::OrphanedTicket { ticket_id: 1, .. }));

    h.tickets.prune_orphaned_ticket(ticket.id).await?;
    assert!(h.tickets.get_ticket(TicketLookup::Id(ticket.id)).await?.is_none());
    assert!(h.store.rows(TICKETS_TABLE).await.is_empty());
    Ok(())
}
