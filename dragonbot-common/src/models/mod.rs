pub mod config;
pub mod controls;
pub mod panel;
pub mod platform;
pub mod ticket;

pub use config::TicketConfig;
pub use controls::{CloseMessageKind, Control, ControlAction, ControlSet, ControlStyle};
pub use panel::PanelMessage;
pub use platform::{Attachment, MemberInfo, NewTicketChannel, OutgoingMessage, Presence, Visibility};
pub use ticket::{Ticket, TicketStatus, TicketType};
