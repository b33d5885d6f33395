/// Outgoing "chat action" (typing indicator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

/// Inline keyboard, laid out row by row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    /// Lay buttons out `per_row` at a time; the last row may be shorter.
    pub fn grid(buttons: Vec<InlineButton>, per_row: usize) -> Self {
        let per_row = per_row.max(1);
        let mut rows = Vec::new();
        let mut row = Vec::with_capacity(per_row);
        for b in buttons {
            row.push(b);
            if row.len() == per_row {
                rows.push(std::mem::replace(&mut row, Vec::with_capacity(per_row)));
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
        Self { rows }
    }

    pub fn push_row(mut self, row: Vec<InlineButton>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.rows.iter().flatten()
    }
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_chat_actions: bool,
    pub supports_inline_keyboards: bool,
    pub max_message_len: usize,
}
