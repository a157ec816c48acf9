pub mod platform_traits;
pub mod ticket_traits;
