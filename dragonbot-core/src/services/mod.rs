// File: dragonbot-core/src/services/mod.rs

pub mod tickets;

pub use tickets::{TicketManager, TicketPanelManager};
