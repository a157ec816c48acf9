// File: dragonbot-core/src/services/tickets/reconcile.rs
//
// Startup reconciliation as pure decisions: persisted records plus what the platform
// reported about them go in, a list of actions comes out. Applying the actions is the
// managers' job.

use dragonbot_common::models::{PanelMessage, Presence};

/// What the platform said about one persisted panel. Probes stop at the first failure;
/// later stages are `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelProbe {
    pub panel: PanelMessage,
    pub guild: Presence,
    pub channel: Presence,
    pub message: Presence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    /// Reattach controls and cache.
    Keep(PanelMessage),
    /// Forget the record.
    Delete(PanelMessage),
}

/// A panel survives only when guild, channel and message all resolved.
pub fn reconcile_panels(probes: &[PanelProbe]) -> Vec<PanelAction> {
    probes
        .iter()
        .map(|p| {
            let resolved = [p.guild, p.channel, p.message]
                .iter()
                .all(|presence| *presence == Presence::Present);
            if resolved {
                PanelAction::Keep(p.panel)
            } else {
                PanelAction::Delete(p.panel)
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketProbe {
    pub ticket_id: i64,
    pub guild: Presence,
    pub channel: Presence,
    /// `None` when no close message was ever recorded.
    pub close_message: Option<Presence>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketAction {
    /// Leave the ticket alone this time.
    Skip(i64),
    /// Guild or channel is gone: drop row and cache entry.
    Forget(i64),
    /// Post a new control message of the stored kind and record it.
    ResendControls(i64),
    /// Reattach controls to the existing close message and re-project the name.
    Reattach(i64),
}

pub fn reconcile_tickets(probes: &[TicketProbe]) -> Vec<TicketAction> {
    probes
        .iter()
        .map(|p| match (p.guild, p.channel, p.close_message) {
            (Presence::Missing, _, _) => TicketAction::Forget(p.ticket_id),
            (Presence::Unknown, _, _) => TicketAction::Skip(p.ticket_id),
            (_, Presence::Missing, _) => TicketAction::Forget(p.ticket_id),
            (_, Presence::Unknown, _) => TicketAction::Skip(p.ticket_id),
            (_, _, Some(Presence::Present)) => TicketAction::Reattach(p.ticket_id),
            (_, _, None | Some(Presence::Missing)) => TicketAction::ResendControls(p.ticket_id),
            (_, _, Some(Presence::Unknown)) => TicketAction::Skip(p.ticket_id),
        })
        .collect()
}
