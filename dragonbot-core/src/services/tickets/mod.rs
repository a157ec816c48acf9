// File: dragonbot-core/src/services/tickets/mod.rs

pub mod actions;
pub mod archiver;
pub mod feedback;
pub mod panel_manager;
pub mod permission_sync;
pub mod reconcile;
pub mod ticket_manager;

pub use actions::{ActionContext, Reply, TicketServices};
pub use archiver::{Archiver, CommandExporter, Transcript, TranscriptExporter};
pub use feedback::DirectMessageFeedback;
pub use panel_manager::TicketPanelManager;
pub use permission_sync::PermissionSync;
pub use ticket_manager::{ArchiveOutcome, CloseReport, TicketLookup, TicketManager, TicketMessage, TicketReconcileSummary};
