// File: src/cache/mod.rs

pub mod panel_cache;
pub mod ticket_cache;

pub use panel_cache::PanelCache;
pub use ticket_cache::TicketCache;
