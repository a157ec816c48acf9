// File: dragonbot-core/src/platforms/discord/components.rs
//
// ControlSet <-> Discord message components.

use twilight_model::channel::message::component::{ActionRow, Button, ButtonStyle, Component};

use dragonbot_common::models::{ControlSet, ControlStyle};

/// Discord caps an action row at five buttons.
const BUTTONS_PER_ROW: usize = 5;

fn button_style(style: ControlStyle) -> ButtonStyle {
    match style {
        ControlStyle::Primary => ButtonStyle::Primary,
        ControlStyle::Secondary => ButtonStyle::Secondary,
        ControlStyle::Success => ButtonStyle::Success,
        ControlStyle::Danger => ButtonStyle::Danger,
    }
}

pub fn action_rows(controls: &ControlSet) -> Vec<Component> {
    controls
        .0
        .chunks(BUTTONS_PER_ROW)
        .map(|chunk| {
            let buttons = chunk
                .iter()
                .map(|control| {
                    Component::Button(Button {
                        custom_id: Some(control.action.custom_id()),
                        disabled: false,
                        emoji: None,
                        label: Some(control.label.clone()),
                        style: button_style(control.style),
                        url: None,
                        sku_id: None,
                    })
                })
                .collect();
            Component::ActionRow(ActionRow { components: buttons })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dragonbot_common::models::{CloseMessageKind, ControlAction};

    #[test]
    fn after_close_controls_fit_one_row() {
        let rows = action_rows(&CloseMessageKind::AfterClose.controls());
        assert_eq!(rows.len(), 1);

        let Component::ActionRow(row) = &rows[0] else {
            panic!("expected an action row");
        };
        let ids: Vec<_> = row
            .components
            .iter()
            .filter_map(|c| match c {
                Component::Button(b) => b.custom_id.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(
            ids,
            vec![
                ControlAction::SaveTranscript.custom_id(),
                ControlAction::Delete.custom_id(),
                ControlAction::Reopen.custom_id(),
            ]
        );
    }

    #[test]
    fn empty_set_has_no_rows() {
        assert!(action_rows(&ControlSet::default()).is_empty());
    }
}
