// File: dragonbot-core/src/platforms/discord/runtime.rs
//
// Gateway side of the bot: shards feed the in-memory cache and route the events the
// ticket core cares about. Every handler runs in its own task so a slow close (the
// transcript export) never stalls the shard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use twilight_cache_inmemory::{InMemoryCache, ResourceType};
use twilight_gateway::{self as gateway, CloseFrame, Config, Event, EventTypeFlags, Intents, MessageSender, Shard, StreamExt};
use twilight_http::client::ClientBuilder;
use twilight_http::Client as HttpClient;
use twilight_model::application::interaction::{Interaction, InteractionData};
use twilight_model::channel::message::MessageFlags;
use twilight_model::channel::Message;
use twilight_model::http::attachment::Attachment as HttpAttachment;
use twilight_model::http::interaction::{InteractionResponse, InteractionResponseData, InteractionResponseType};

use dragonbot_common::error::Error;
use dragonbot_common::models::ControlAction;

use crate::services::tickets::actions::{ActionContext, TicketServices};
use crate::services::tickets::ticket_manager::{TicketLookup, TicketMessage};

/// Text command staff use to post the ticket panel in the current channel.
pub const PANEL_COMMAND: &str = "!ticketpanel";

pub fn build_http_client(token: &str) -> Arc<HttpClient> {
    Arc::new(
        ClientBuilder::new()
            .token(token.to_string())
            .timeout(Duration::from_secs(30))
            .build(),
    )
}

pub fn build_cache() -> Arc<InMemoryCache> {
    Arc::new(
        InMemoryCache::builder()
            .resource_types(
                ResourceType::GUILD
                    | ResourceType::CHANNEL
                    | ResourceType::MESSAGE
                    | ResourceType::MEMBER
                    | ResourceType::USER
                    | ResourceType::ROLE,
            )
            .build(),
    )
}

fn ticket_message(msg: &Message) -> TicketMessage {
    TicketMessage {
        channel_id: Some(msg.channel_id),
        author_id: Some(msg.author.id),
        author_is_bot: msg.author.bot,
        author_roles: msg.member.as_ref().map(|m| m.roles.clone()).unwrap_or_default(),
        mentioned_users: msg.mentions.iter().map(|m| m.id).collect(),
        mentioned_roles: msg.mention_roles.clone(),
    }
}

async fn reconcile_on_ready(services: Arc<TicketServices>) {
    match services.panels.load_ticket_panel_messages().await {
        Ok(kept) => info!("Panel reconciliation kept {} panels.", kept.len()),
        Err(e) => error!("Panel reconciliation failed: {}", e),
    }
    if let Err(e) = services.tickets.reconcile_tickets().await {
        error!("Ticket reconciliation failed: {}", e);
    }
}

async fn handle_message(services: Arc<TicketServices>, message: TicketMessage) {
    match services.tickets.handle_ticket_message(&message).await {
        Ok(()) => {}
        Err(Error::OrphanedTicket { ticket_id, .. }) => {
            if let Err(e) = services.tickets.prune_orphaned_ticket(ticket_id).await {
                error!(ticket_id, "Could not prune orphaned ticket: {}", e);
            }
        }
        Err(e) => warn!(channel_id = ?message.channel_id, "Ticket message handling failed: {}", e),
    }
}

async fn handle_panel_command(http: Arc<HttpClient>, services: Arc<TicketServices>, msg: Message) {
    let ctx = ActionContext {
        guild_id: msg.guild_id,
        channel_id: msg.channel_id,
        user_id: msg.author.id,
        roles: msg.member.as_ref().map(|m| m.roles.clone()).unwrap_or_default(),
    };
    let reply = services.request_panel(&ctx).await;
    if let Err(e) = http.create_message(msg.channel_id).content(&reply.content).await {
        warn!(channel_id = %msg.channel_id, "Could not answer panel command: {}", e);
    }
}

async fn handle_channel_delete(services: Arc<TicketServices>, channel: twilight_model::channel::Channel) {
    if let Err(e) = services.panels.handle_channel_deleted(channel.guild_id, channel.id).await {
        warn!(channel_id = %channel.id, "Panel cleanup after channel delete failed: {}", e);
    }
    match services.tickets.get_ticket(TicketLookup::Channel(channel.id)).await {
        Ok(Some(ticket)) => {
            if let Err(e) = services.tickets.prune_orphaned_ticket(ticket.id).await {
                error!(ticket_id = ticket.id, "Could not prune ticket of deleted channel: {}", e);
            }
        }
        Ok(None) => {}
        Err(e) => warn!(channel_id = %channel.id, "Ticket lookup after channel delete failed: {}", e),
    }
}

/// Component presses: defer privately, run the action, answer with a follow-up.
async fn handle_interaction(http: Arc<HttpClient>, services: Arc<TicketServices>, interaction: Interaction) {
    let Some(InteractionData::MessageComponent(data)) = &interaction.data else {
        return;
    };
    let Some(action) = ControlAction::from_custom_id(&data.custom_id) else {
        trace!(custom_id = %data.custom_id, "Ignoring foreign component");
        return;
    };
    let (Some(channel_id), Some(user_id)) = (interaction.channel.as_ref().map(|c| c.id), interaction.author_id()) else {
        warn!(?action, "Component interaction without channel or author");
        return;
    };

    let client = http.interaction(interaction.application_id);
    let deferred = InteractionResponse {
        kind: InteractionResponseType::DeferredChannelMessageWithSource,
        data: Some(InteractionResponseData {
            flags: Some(MessageFlags::EPHEMERAL),
            ..Default::default()
        }),
    };
    if let Err(e) = client.create_response(interaction.id, &interaction.token, &deferred).await {
        warn!(?action, "Could not acknowledge interaction: {}", e);
        return;
    }

    let ctx = ActionContext {
        guild_id: interaction.guild_id,
        channel_id,
        user_id,
        roles: interaction.member.as_ref().map(|m| m.roles.clone()).unwrap_or_default(),
    };
    debug!(?action, %channel_id, %user_id, "Handling ticket control");
    let reply = services.handle_action(action, &ctx).await;

    let attachments: Vec<HttpAttachment> = reply
        .attachment
        .map(|a| vec![HttpAttachment::from_bytes(a.filename, a.bytes, 1)])
        .unwrap_or_default();
    if let Err(e) = client
        .create_followup(&interaction.token)
        .content(&reply.content)
        .attachments(&attachments)
        .flags(MessageFlags::EPHEMERAL)
        .await
    {
        warn!(?action, "Could not send interaction follow-up: {}", e);
    }
}

async fn shard_runner(
    mut shard: Shard,
    http: Arc<HttpClient>,
    cache: Arc<InMemoryCache>,
    services: Arc<TicketServices>,
    reconciled: Arc<AtomicBool>,
) {
    let shard_id = shard.id().number();
    info!("(ShardRunner) Shard {shard_id} started. Listening for events.");

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        let event = match item {
            Ok(event) => event,
            Err(err) => {
                error!("Shard {shard_id} => error receiving event: {err:?}");
                continue;
            }
        };
        cache.update(&event);

        match event {
            Event::Ready(ready) => {
                info!("Shard {shard_id} => READY as {} (ID={})", ready.user.name, ready.user.id);
                if !reconciled.swap(true, Ordering::SeqCst) {
                    tokio::spawn(reconcile_on_ready(Arc::clone(&services)));
                }
            }
            Event::MessageCreate(msg) => {
                if msg.author.bot {
                    continue;
                }
                if msg.content.trim() == PANEL_COMMAND {
                    tokio::spawn(handle_panel_command(Arc::clone(&http), Arc::clone(&services), msg.0));
                    continue;
                }
                tokio::spawn(handle_message(Arc::clone(&services), ticket_message(&msg.0)));
            }
            Event::ChannelDelete(channel) => {
                tokio::spawn(handle_channel_delete(Arc::clone(&services), channel.0));
            }
            Event::MessageDelete(deleted) => {
                let services = Arc::clone(&services);
                tokio::spawn(async move {
                    if let Err(e) = services.panels.handle_message_deleted(deleted.channel_id, deleted.id).await {
                        warn!(message_id = %deleted.id, "Panel cleanup after message delete failed: {}", e);
                    }
                });
            }
            Event::MessageDeleteBulk(bulk) => {
                let services = Arc::clone(&services);
                tokio::spawn(async move {
                    for id in bulk.ids {
                        if let Err(e) = services.panels.handle_message_deleted(bulk.channel_id, id).await {
                            warn!(message_id = %id, "Panel cleanup after bulk delete failed: {}", e);
                        }
                    }
                });
            }
            Event::InteractionCreate(interaction) => {
                tokio::spawn(handle_interaction(Arc::clone(&http), Arc::clone(&services), interaction.0));
            }
            other => {
                trace!("Shard {shard_id} => unhandled event: {:?}", other.kind());
            }
        }
    }

    warn!("(ShardRunner) Shard {shard_id} event loop ended.");
}

pub struct DiscordRuntime {
    token: String,
    http: Arc<HttpClient>,
    cache: Arc<InMemoryCache>,
    services: Arc<TicketServices>,
    shard_senders: Vec<MessageSender>,
    shard_tasks: Vec<JoinHandle<()>>,
}

impl DiscordRuntime {
    pub fn new(token: String, http: Arc<HttpClient>, cache: Arc<InMemoryCache>, services: Arc<TicketServices>) -> Self {
        Self {
            token,
            http,
            cache,
            services,
            shard_senders: Vec::new(),
            shard_tasks: Vec::new(),
        }
    }

    /// Creates the recommended shards and spawns one runner per shard.
    pub async fn start(&mut self) -> Result<(), Error> {
        let config = Config::new(
            self.token.clone(),
            Intents::GUILDS | Intents::GUILD_MESSAGES | Intents::MESSAGE_CONTENT,
        );
        let shards = gateway::create_recommended(&self.http, config, |_, b| b.build())
            .await
            .map_err(|e| Error::Platform(format!("create_recommended error: {e}")))?;

        let reconciled = Arc::new(AtomicBool::new(false));
        for shard in shards {
            self.shard_senders.push(shard.sender());
            let handle = tokio::spawn(shard_runner(
                shard,
                Arc::clone(&self.http),
                Arc::clone(&self.cache),
                Arc::clone(&self.services),
                Arc::clone(&reconciled),
            ));
            self.shard_tasks.push(handle);
        }
        info!("Started {} Discord shard(s).", self.shard_tasks.len());
        Ok(())
    }

    /// Waits until every shard runner has stopped.
    pub async fn wait(&mut self) {
        for task in self.shard_tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Shard task failed: {}", e);
            }
        }
    }

    pub async fn shutdown(&mut self) {
        for sender in &self.shard_senders {
            if let Err(e) = sender.close(CloseFrame::NORMAL) {
                debug!("Shard already closed: {}", e);
            }
        }
        self.wait().await;
        self.shard_senders.clear();
    }
}
