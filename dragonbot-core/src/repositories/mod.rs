// dragonbot-core/src/repositories/mod.rs

pub mod panels;
pub mod tickets;

pub use panels::PanelRepository;
pub use tickets::{NewTicketRow, TicketRepository};
