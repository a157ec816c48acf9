// File: dragonbot-core/tests/postgres_store_tests.rs
//
// Needs a reachable Postgres (see `TEST_DATABASE_URL`); run with `--ignored`.

use std::sync::Arc;

use dragonbot_common::error::Error;
use dragonbot_common::models::{TicketConfig, TicketStatus, TicketType};
use dragonbot_core::db::{Criteria, Record, SqlValue, TableStore};
use dragonbot_core::services::tickets::{Archiver, TicketLookup, TicketManager};
use dragonbot_core::test_utils::helpers::*;
use dragonbot_core::test_utils::FakePlatform;

#[tokio::test]
#[ignore]
async fn test_table_store_round_trip() -> Result<(), Error> {
    let db = setup_test_database().await?;

    let row = Record::new()
        .with("guild_id", 1_i64)
        .with("channel_id", 2_i64)
        .with("message_id", 3_i64);
    let key = db.insert("ticket_panels", &row, "guild_id").await?;
    assert_eq!(key, SqlValue::Int(1));

    let found = db
        .select_one("ticket_panels", &Criteria::new().eq("channel_id", 2_i64))
        .await?
        .expect("panel row");
    assert_eq!(found.int("message_id")?, 3);

    let updated = db
        .update(
            "ticket_panels",
            &Record::new().with("message_id", 4_i64),
            &Criteria::new().eq("guild_id", 1_i64),
        )
        .await?;
    assert_eq!(updated, 1);

    let err = db.delete("ticket_panels", &Criteria::new()).await.unwrap_err();
    assert!(matches!(err, Error::EmptyCriteria { .. }));

    let err = db
        .select_all("ticket_panels; DROP TABLE tickets", &Criteria::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidIdentifier(_)));

    assert_eq!(db.delete("ticket_panels", &Criteria::new().eq("guild_id", 1_i64)).await?, 1);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_ticket_lifecycle_against_postgres() -> Result<(), Error> {
    let db = Arc::new(setup_test_database().await?);
    let platform = Arc::new(FakePlatform::new());
    let feedback = Arc::new(RecordingFeedback::default());
    let exporter = Arc::new(StaticExporter::default());
    let manager = TicketManager::new(
        db.clone(),
        platform.clone(),
        Archiver::new(exporter.clone()),
        feedback.clone(),
        TicketConfig::new(staff_role()),
    );

    let ticket = manager.create_ticket(user(1), guild(), TicketType::Purchase).await?;
    manager.add_ticket_participants(ticket.channel_id, &[user(2), user(3)]).await?;
    manager.set_ticket_status(ticket.id, TicketStatus::InProgress).await?;
    manager.remove_ticket_participants(ticket.channel_id, &[user(3)]).await?;

    let fresh = TicketManager::new(
        db.clone(),
        platform.clone(),
        Archiver::new(exporter),
        feedback,
        TicketConfig::new(staff_role()),
    );
    assert_eq!(fresh.init_cache().await?, 1);
    let stored = fresh.get_ticket(TicketLookup::Id(ticket.id)).await?.unwrap();
    assert_eq!(stored.status, TicketStatus::InProgress);
    assert_eq!(stored.participants.into_iter().collect::<Vec<_>>(), vec![user(1), user(2)]);

    fresh.close_ticket(ticket.channel_id, user(99)).await?;
    fresh.delete_ticket(ticket.channel_id).await?;
    assert!(manager.get_ticket(TicketLookup::Id(ticket.id)).await?.is_some(), "other cache is untouched");
    assert!(fresh.get_ticket(TicketLookup::Id(ticket.id)).await?.is_none());
    Ok(())
}
