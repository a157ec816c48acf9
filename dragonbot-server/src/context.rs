//! dragonbot-server/src/context.rs
//!
//! Everything the running bot holds on to: database, Discord clients and the ticket
//! services built over them.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use twilight_http::Client as HttpClient;
use twilight_model::id::marker::UserMarker;
use twilight_model::id::Id;

use dragonbot_common::models::TicketConfig;
use dragonbot_core::platforms::discord::runtime::{build_cache, build_http_client};
use dragonbot_core::platforms::discord::{DiscordRuntime, DiscordTicketPlatform};
use dragonbot_core::services::tickets::{
    Archiver, CommandExporter, DirectMessageFeedback, TicketManager, TicketPanelManager, TicketServices,
};
use dragonbot_core::{Database, Error};

use crate::BotArgs;

fn checked_id<T>(raw: u64, what: &str) -> Result<Id<T>, Error> {
    Id::new_checked(raw).ok_or_else(|| Error::Config(format!("{what} must be a non-zero id")))
}

impl BotArgs {
    /// Ticket settings from the command line. `bot_user` and the staff role are always
    /// acknowledged when mentioned.
    pub fn ticket_config(&self, bot_user: Id<UserMarker>) -> Result<TicketConfig, Error> {
        let mut config = TicketConfig::new(checked_id(self.staff_role_id, "staff role")?);
        config.archive_channel_id = self
            .archive_channel_id
            .map(|raw| checked_id(raw, "archive channel"))
            .transpose()?;
        config.auto_timeout_hours = self.auto_timeout_hours;
        config.business_hours = self.business_hours.clone();
        config.acknowledged_users = std::iter::once(Ok(bot_user))
            .chain(self.acknowledged_users.iter().map(|raw| checked_id(*raw, "acknowledged user")))
            .collect::<Result<_, _>>()?;
        for raw in &self.acknowledged_roles {
            let role = checked_id(*raw, "acknowledged role")?;
            if !config.acknowledged_roles.contains(&role) {
                config.acknowledged_roles.push(role);
            }
        }
        Ok(config)
    }
}

pub struct BotContext {
    pub db: Database,
    pub http: Arc<HttpClient>,
    pub services: Arc<TicketServices>,
    runtime: DiscordRuntime,
}

impl BotContext {
    pub async fn new(args: &BotArgs) -> Result<Self, Error> {
        let db = Database::new(&args.database_url).await?;
        db.migrate().await?;

        let http = build_http_client(&args.token);
        let cache = build_cache();
        let me = http
            .current_user()
            .await
            .map_err(|e| Error::Platform(format!("current_user error: {e}")))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("Error parsing current user: {e}")))?;
        info!("Logged in as {} (ID={})", me.name, me.id);

        let platform = Arc::new(
            DiscordTicketPlatform::new(Arc::clone(&http))
                .with_cache(Arc::clone(&cache))
                .with_bot_user(me.id),
        );
        let exporter = CommandExporter::new(
            &args.exporter_path,
            args.exporter_token.clone().unwrap_or_else(|| args.token.clone()),
        )
        .with_leading_args(args.exporter_args.clone())
        .with_timeout(Duration::from_secs(args.exporter_timeout_secs));

        let store = Arc::new(db.clone());
        let tickets = Arc::new(TicketManager::new(
            store.clone(),
            platform.clone(),
            Archiver::new(Arc::new(exporter)),
            Arc::new(DirectMessageFeedback::new(platform.clone())),
            args.ticket_config(me.id)?,
        ));
        let panels = Arc::new(TicketPanelManager::new(store, platform));
        let services = Arc::new(TicketServices::new(tickets, panels));

        let runtime = DiscordRuntime::new(args.token.clone(), Arc::clone(&http), cache, Arc::clone(&services));
        Ok(Self {
            db,
            http,
            services,
            runtime,
        })
    }

    pub fn runtime_mut(&mut self) -> &mut DiscordRuntime {
        &mut self.runtime
    }
}
