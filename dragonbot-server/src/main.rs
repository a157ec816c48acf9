use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

mod context;
use context::BotContext;

#[derive(Parser, Debug, Clone)]
#[command(name = "dragonbot")]
#[command(author, version, about = "DragonBot - Discord customer-support tickets")]
pub struct BotArgs {
    /// Discord bot token.
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Postgres connection URL.
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://dragonbot@localhost:5432/dragonbot")]
    pub database_url: String,

    /// Role whose members handle tickets.
    #[arg(long, env = "STAFF_ROLE_ID")]
    pub staff_role_id: u64,

    /// Channel that receives every closed ticket's transcript.
    #[arg(long, env = "ARCHIVE_CHANNEL_ID")]
    pub archive_channel_id: Option<u64>,

    /// Transcript exporter executable.
    #[arg(long, env = "EXPORTER_PATH", default_value = "DiscordChatExporter.Cli")]
    pub exporter_path: String,

    /// Arguments placed before `export`, comma separated.
    #[arg(long, env = "EXPORTER_ARGS", value_delimiter = ',')]
    pub exporter_args: Vec<String>,

    /// Seconds an export may run before the exporter is killed.
    #[arg(long, env = "EXPORTER_TIMEOUT_SECS", default_value_t = 600)]
    pub exporter_timeout_secs: u64,

    /// Token handed to the exporter; defaults to the bot token.
    #[arg(long, env = "EXPORTER_TOKEN", hide_env_values = true)]
    pub exporter_token: Option<String>,

    #[arg(long, env = "AUTO_TIMEOUT_HOURS", default_value_t = 48)]
    pub auto_timeout_hours: i32,

    /// Business-hours lines shown in the ticket greeting, separated by ';'.
    #[arg(long, env = "BUSINESS_HOURS", value_delimiter = ';')]
    pub business_hours: Vec<String>,

    /// Extra users whose mention in a ticket gets an acknowledgement, comma separated.
    #[arg(long, env = "ACKNOWLEDGED_USERS", value_delimiter = ',')]
    pub acknowledged_users: Vec<u64>,

    /// Roles besides the staff role whose mention gets an acknowledgement, comma separated.
    #[arg(long, env = "ACKNOWLEDGED_ROLES", value_delimiter = ',')]
    pub acknowledged_roles: Vec<u64>,
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("dragonbot=info".parse().unwrap_or_default());
    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set global subscriber: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;
    let args = BotArgs::parse();
    info!(
        "DragonBot starting. staff_role={}, archive_channel={:?}",
        args.staff_role_id, args.archive_channel_id
    );

    let mut ctx = BotContext::new(&args).await.context("Failed to build bot context")?;
    let runtime = ctx.runtime_mut();
    runtime.start().await.context("Failed to start Discord shards")?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Ctrl-C handler error: {:?}", e);
    }
    info!("Ctrl-C received. Shutting down shards...");
    runtime.shutdown().await;
    info!("DragonBot stopped.");
    Ok(())
}
