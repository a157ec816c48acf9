use twilight_model::id::marker::{ChannelMarker, RoleMarker, UserMarker};
use twilight_model::id::Id;

/// Settings the ticket managers need at runtime.
#[derive(Debug, Clone)]
pub struct TicketConfig {
    /// Members with this role are staff: they see every ticket and move OPEN tickets forward.
    pub staff_role_id: Id<RoleMarker>,
    /// Where transcripts of closed tickets are posted.
    pub archive_channel_id: Option<Id<ChannelMarker>>,
    pub auto_timeout_hours: i32,
    /// Lines appended to the greeting, e.g. "Mon 13:00~24:00".
    pub business_hours: Vec<String>,
    /// Roles whose mention gets an acknowledgement in ticket channels.
    pub acknowledged_roles: Vec<Id<RoleMarker>>,
    /// Users (the bot itself, owners) whose mention gets an acknowledgement.
    pub acknowledged_users: Vec<Id<UserMarker>>,
}

impl TicketConfig {
    pub fn new(staff_role_id: Id<RoleMarker>) -> Self {
        Self {
            staff_role_id,
            archive_channel_id: None,
            auto_timeout_hours: 48,
            business_hours: Vec::new(),
            acknowledged_roles: vec![staff_role_id],
            acknowledged_users: Vec::new(),
        }
    }

    pub fn is_staff(&self, roles: &[Id<RoleMarker>]) -> bool {
        roles.contains(&self.staff_role_id)
    }
}
