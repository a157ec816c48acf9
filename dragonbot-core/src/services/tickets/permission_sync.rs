// File: dragonbot-core/src/services/tickets/permission_sync.rs
//
// Applies member-level visibility to a ticket channel for a batch of users.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};
use twilight_model::id::marker::{ChannelMarker, UserMarker};
use twilight_model::id::Id;

use dragonbot_common::models::Visibility;
use dragonbot_common::traits::platform_traits::TicketPlatform;

#[derive(Clone)]
pub struct PermissionSync {
    platform: Arc<dyn TicketPlatform>,
}

impl PermissionSync {
    pub fn new(platform: Arc<dyn TicketPlatform>) -> Self {
        Self { platform }
    }

    /// Moves every target to `desired` and returns the ones whose overwrite actually
    /// changed. Targets already at `desired` (per `currently_visible`) get no call; a
    /// failed call is logged and leaves that user out of the result.
    pub async fn apply(
        &self,
        channel_id: Id<ChannelMarker>,
        targets: &[Id<UserMarker>],
        desired: Visibility,
        currently_visible: &BTreeSet<Id<UserMarker>>,
    ) -> Vec<Id<UserMarker>> {
        let pending: Vec<Id<UserMarker>> = targets
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|u| Visibility::from_visible(currently_visible.contains(u)) != desired)
            .collect();

        if pending.is_empty() {
            debug!(%channel_id, ?desired, "No visibility changes needed");
            return Vec::new();
        }

        let calls = pending.iter().map(|user_id| {
            let platform = Arc::clone(&self.platform);
            let user_id = *user_id;
            async move {
                let result = platform.set_member_visibility(channel_id, user_id, desired).await;
                (user_id, result)
            }
        });

        let mut changed = Vec::with_capacity(pending.len());
        for (user_id, result) in join_all(calls).await {
            match result {
                Ok(()) => changed.push(user_id),
                Err(e) => warn!(%channel_id, %user_id, ?desired, "Skipping visibility change: {}", e),
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakePlatform;
    use twilight_model::id::marker::GuildMarker;

    #[tokio::test]
    async fn only_differing_users_are_touched() {
        let fake = Arc::new(FakePlatform::new());
        let channel = fake.add_channel(Id::<GuildMarker>::new(1), "purchase-temp");
        let sync = PermissionSync::new(fake.clone());

        let visible: BTreeSet<_> = [Id::new(1), Id::new(2)].into_iter().collect();
        let changed = sync
            .apply(channel, &[Id::new(2), Id::new(3), Id::new(3)], Visibility::Visible, &visible)
            .await;

        assert_eq!(changed, vec![Id::new(3)]);
        assert_eq!(fake.state().visibility_calls.len(), 1);
    }

    #[tokio::test]
    async fn forbidden_users_are_skipped_not_fatal() {
        let fake = Arc::new(FakePlatform::new());
        let channel = fake.add_channel(Id::<GuildMarker>::new(1), "group-temp");
        fake.state().forbidden_users.insert(Id::new(5));
        let sync = PermissionSync::new(fake.clone());

        let changed = sync
            .apply(channel, &[Id::new(4), Id::new(5)], Visibility::Visible, &BTreeSet::new())
            .await;

        assert_eq!(changed, vec![Id::new(4)]);
        assert_eq!(fake.visible_users(channel), vec![Id::new(4)]);
    }
}
