// File: dragonbot-core/src/test_utils/helpers.rs

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgConnection, Pool, Postgres};
use twilight_model::id::marker::{ChannelMarker, GuildMarker, RoleMarker, UserMarker};
use twilight_model::id::Id;

use dragonbot_common::error::ArchiveError;
use dragonbot_common::models::{Ticket, TicketConfig};
use dragonbot_common::traits::ticket_traits::FeedbackHandoff;

use crate::db::Database;
use crate::services::tickets::actions::TicketServices;
use crate::services::tickets::archiver::{Archiver, TranscriptExporter};
use crate::services::tickets::panel_manager::TicketPanelManager;
use crate::services::tickets::ticket_manager::TicketManager;
use crate::test_utils::fake_platform::FakePlatform;
use crate::test_utils::memory_store::MemoryStore;
use crate::Error;

pub const TEST_GUILD: u64 = 500;
pub const STAFF_ROLE: u64 = 600;
pub const TRANSCRIPT_HTML: &[u8] = b"<html><body>transcript</body></html>";

/// Create the test database if it does not exist yet.
pub async fn ensure_test_database_exists() -> Result<(), Error> {
    let admin_url = std::env::var("DATABASE_ADMIN_URL")
        .unwrap_or_else(|_| "postgres://dragonbot@localhost/postgres".to_string());
    let mut conn = PgConnection::connect(&admin_url).await?;

    let test_db = "dragonbot_test";
    match sqlx::query(&format!("CREATE DATABASE {test_db};")).execute(&mut conn).await {
        Ok(_) => println!("Created test DB '{test_db}'."),
        // 42P04 => duplicate_database
        Err(e) if e.as_database_error().and_then(|d| d.code()).as_deref() == Some("42P04") => {
            println!("Test DB '{test_db}' already exists; ignoring.");
        }
        Err(e) => return Err(Error::Database(e)),
    }
    Ok(())
}

/// Pool on `TEST_DATABASE_URL`, else `postgres://dragonbot@localhost/dragonbot_test`.
pub async fn create_test_db_pool() -> Result<Pool<Postgres>, Error> {
    let url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://dragonbot@localhost/dragonbot_test".to_string());
    let pool = PgPoolOptions::new().max_connections(5).connect(&url).await?;
    Ok(pool)
}

/// Wipes out test data so each test can start fresh.
pub async fn clean_database(pool: &Pool<Postgres>) -> Result<(), Error> {
    sqlx::query("TRUNCATE TABLE ticket_participants, tickets, ticket_panels RESTART IDENTITY CASCADE;")
        .execute(pool)
        .await?;
    Ok(())
}

/// Returns a migrated, empty test DB handle.
pub async fn setup_test_database() -> Result<Database, Error> {
    ensure_test_database_exists().await?;
    let db = Database::from_pool(create_test_db_pool().await?);
    db.migrate().await?;
    clean_database(db.pool()).await?;
    Ok(db)
}

/// Exporter that writes a fixed page, or fails while `fail` is set.
#[derive(Default)]
pub struct StaticExporter {
    fail: AtomicBool,
}

impl StaticExporter {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl TranscriptExporter for StaticExporter {
    fn export(&self, _channel_id: Id<ChannelMarker>, output: &Path) -> Result<(), ArchiveError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ArchiveError::ExporterFailed {
                status: "exit status: 1".into(),
                stderr: "rate limited".into(),
            });
        }
        std::fs::write(output, TRANSCRIPT_HTML).map_err(ArchiveError::Output)
    }
}

/// Remembers who was asked for feedback.
#[derive(Default)]
pub struct RecordingFeedback {
    prompts: Mutex<Vec<(i64, Id<UserMarker>)>>,
}

impl RecordingFeedback {
    pub fn prompts(&self) -> Vec<(i64, Id<UserMarker>)> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl FeedbackHandoff for RecordingFeedback {
    async fn prompt_feedback(&self, ticket: &Ticket, participant: Id<UserMarker>) -> Result<(), Error> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((ticket.id, participant));
        Ok(())
    }
}

pub fn guild() -> Id<GuildMarker> {
    Id::new(TEST_GUILD)
}

pub fn staff_role() -> Id<RoleMarker> {
    Id::new(STAFF_ROLE)
}

pub fn user(id: u64) -> Id<UserMarker> {
    Id::new(id)
}

/// Both managers wired over an in-memory store and a fake platform.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub platform: Arc<FakePlatform>,
    pub exporter: Arc<StaticExporter>,
    pub feedback: Arc<RecordingFeedback>,
    pub config: TicketConfig,
    pub tickets: Arc<TicketManager>,
    pub panels: Arc<TicketPanelManager>,
    pub services: TicketServices,
}

impl TestHarness {
    pub fn new() -> Self {
        let platform = Arc::new(FakePlatform::new());
        let mut config = TicketConfig::new(staff_role());
        config.archive_channel_id = Some(platform.add_channel(guild(), "transcripts"));
        config.business_hours = vec!["Mon-Fri 13:00~24:00".to_string()];
        Self::assemble(
            Arc::new(MemoryStore::new()),
            platform,
            Arc::new(StaticExporter::default()),
            Arc::new(RecordingFeedback::default()),
            config,
        )
    }

    /// Fresh managers (empty caches) over the same store and platform, as after a restart.
    pub fn restart(&self) -> Self {
        Self::assemble(
            Arc::clone(&self.store),
            Arc::clone(&self.platform),
            Arc::clone(&self.exporter),
            Arc::clone(&self.feedback),
            self.config.clone(),
        )
    }

    fn assemble(
        store: Arc<MemoryStore>,
        platform: Arc<FakePlatform>,
        exporter: Arc<StaticExporter>,
        feedback: Arc<RecordingFeedback>,
        config: TicketConfig,
    ) -> Self {
        let tickets = Arc::new(TicketManager::new(
            store.clone(),
            platform.clone(),
            Archiver::new(exporter.clone()),
            feedback.clone(),
            config.clone(),
        ));
        let panels = Arc::new(TicketPanelManager::new(store.clone(), platform.clone()));
        let services = TicketServices::new(Arc::clone(&tickets), Arc::clone(&panels));
        Self {
            store,
            platform,
            exporter,
            feedback,
            config,
            tickets,
            panels,
            services,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
