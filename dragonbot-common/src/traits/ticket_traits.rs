use async_trait::async_trait;
use twilight_model::id::marker::UserMarker;
use twilight_model::id::Id;

use crate::error::Error;
use crate::models::ticket::Ticket;

/// Hand-off to the feedback survey once a closed ticket's transcript was delivered.
#[async_trait]
pub trait FeedbackHandoff: Send + Sync {
    async fn prompt_feedback(&self, ticket: &Ticket, participant: Id<UserMarker>) -> Result<(), Error>;
}
