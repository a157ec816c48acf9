// Interactive controls (buttons) attached to ticket and panel messages.
//
// The platform client turns a `ControlSet` into real components; the custom ids are
// what comes back on a component interaction.

use serde::{Deserialize, Serialize};

use crate::models::ticket::TicketType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

/// What a control does when pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlAction {
    CreateTicket(TicketType),
    RequestClose,
    ConfirmClose,
    CancelClose,
    SaveTranscript,
    Delete,
    Reopen,
}

impl ControlAction {
    pub fn custom_id(self) -> String {
        match self {
            ControlAction::CreateTicket(kind) => format!("ticket:create:{}", kind.as_str()),
            ControlAction::RequestClose => "ticket:close".to_string(),
            ControlAction::ConfirmClose => "ticket:close:confirm".to_string(),
            ControlAction::CancelClose => "ticket:close:cancel".to_string(),
            ControlAction::SaveTranscript => "ticket:save".to_string(),
            ControlAction::Delete => "ticket:delete".to_string(),
            ControlAction::Reopen => "ticket:reopen".to_string(),
        }
    }

    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        if let Some(kind) = custom_id.strip_prefix("ticket:create:") {
            return TicketType::parse(kind).map(ControlAction::CreateTicket);
        }
        match custom_id {
            "ticket:close" => Some(ControlAction::RequestClose),
            "ticket:close:confirm" => Some(ControlAction::ConfirmClose),
            "ticket:close:cancel" => Some(ControlAction::CancelClose),
            "ticket:save" => Some(ControlAction::SaveTranscript),
            "ticket:delete" => Some(ControlAction::Delete),
            "ticket:reopen" => Some(ControlAction::Reopen),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub action: ControlAction,
    pub label: String,
    pub style: ControlStyle,
}

impl Control {
    fn new(action: ControlAction, label: &str, style: ControlStyle) -> Self {
        Self {
            action,
            label: label.to_string(),
            style,
        }
    }
}

/// One row of controls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSet(pub Vec<Control>);

impl ControlSet {
    /// Buttons on the guild panel, one per ticket type.
    pub fn ticket_creation() -> Self {
        ControlSet(
            TicketType::ALL
                .iter()
                .map(|kind| Control::new(ControlAction::CreateTicket(*kind), kind.button_label(), ControlStyle::Primary))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Which control message is currently attached to a ticket channel. The discriminants
/// are what the `close_msg_type` column stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseMessageKind {
    CloseToggle = 0,
    CloseConfirm = 1,
    AfterClose = 2,
}

impl CloseMessageKind {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(CloseMessageKind::CloseToggle),
            1 => Some(CloseMessageKind::CloseConfirm),
            2 => Some(CloseMessageKind::AfterClose),
            _ => None,
        }
    }

    /// The controls this kind of message carries.
    pub fn controls(self) -> ControlSet {
        match self {
            CloseMessageKind::CloseToggle => ControlSet(vec![Control::new(
                ControlAction::RequestClose,
                "Close ticket",
                ControlStyle::Primary,
            )]),
            CloseMessageKind::CloseConfirm => ControlSet(vec![
                Control::new(ControlAction::ConfirmClose, "Close ticket", ControlStyle::Danger),
                Control::new(ControlAction::CancelClose, "Cancel", ControlStyle::Secondary),
            ]),
            CloseMessageKind::AfterClose => ControlSet(vec![
                Control::new(ControlAction::SaveTranscript, "Save transcript", ControlStyle::Primary),
                Control::new(ControlAction::Delete, "Delete ticket", ControlStyle::Danger),
                Control::new(ControlAction::Reopen, "Reopen ticket", ControlStyle::Success),
            ]),
        }
    }
}
