/// Inline keyboard (buttons) attached to confirmation prompts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }

    /// Confirm / cancel pair for a pending action, one button per row.
    pub fn confirm_cancel(token: &str) -> Self {
        Self::new(vec![
            InlineButton {
                label: "✅ Confirm".to_string(),
                callback_data: format!("confirm:{token}:yes"),
            },
            InlineButton {
                label: "❌ Cancel".to_string(),
                callback_data: format!("confirm:{token}:no"),
            },
        ])
    }
}
