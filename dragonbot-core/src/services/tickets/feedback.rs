// File: dragonbot-core/src/services/tickets/feedback.rs

use std::sync::Arc;

use async_trait::async_trait;
use twilight_model::id::marker::UserMarker;
use twilight_model::id::Id;

use dragonbot_common::error::Error;
use dragonbot_common::models::{OutgoingMessage, Ticket};
use dragonbot_common::traits::platform_traits::TicketPlatform;
use dragonbot_common::traits::ticket_traits::FeedbackHandoff;

/// Asks the participant, in private, how the ticket went. The survey itself lives
/// elsewhere; this only opens the conversation.
pub struct DirectMessageFeedback {
    platform: Arc<dyn TicketPlatform>,
}

impl DirectMessageFeedback {
    pub fn new(platform: Arc<dyn TicketPlatform>) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl FeedbackHandoff for DirectMessageFeedback {
    async fn prompt_feedback(&self, ticket: &Ticket, participant: Id<UserMarker>) -> Result<(), Error> {
        let prompt = format!(
            "Thanks for contacting us about {}! How did we do? Reply here with any feedback.",
            ticket.channel_name()
        );
        self.platform
            .send_direct_message(participant, OutgoingMessage::text(prompt))
            .await?;
        Ok(())
    }
}
