//! Inline keyboards for the menu screens.

use relay_core::messaging::types::{InlineButton, InlineKeyboard};

/// `(button label, model id)` shown on the model selection screen.
pub const POPULAR_MODELS: [(&str, &str); 6] = [
    ("GPT-4", "openai/gpt-4"),
    ("GPT-3.5 Turbo", "openai/gpt-3.5-turbo"),
    ("Claude Sonnet", "anthropic/claude-3-sonnet"),
    ("Gemini Pro", "google/gemini-pro"),
    ("Mistral 7B", "mistralai/mistral-7b-instruct"),
    ("Llama 2 70B", "meta-llama/llama-2-70b-chat"),
];

/// Callback data prefix for direct model selection.
pub const MODEL_PREFIX: &str = "model_";

pub fn main_menu() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![
            InlineButton::new("⚙️ Settings", "settings"),
            InlineButton::new("📊 Expenses", "expenses"),
        ],
        vec![
            InlineButton::new("🤖 Models", "listmodels"),
            InlineButton::new("📈 Status", "status"),
        ],
        vec![
            InlineButton::new("🗑️ Clear History", "clear"),
            InlineButton::new("❓ Help", "help"),
        ],
    ])
}

pub fn settings() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![
            InlineButton::new("💬 Chat Mode", "chat_mode"),
            InlineButton::new("🤖 Change Model", "change_model"),
        ],
        vec![InlineButton::new("➕ Add Custom Model", "add_model")],
        vec![InlineButton::new("⬅️ Back to Menu", "back_to_menu")],
    ])
}

pub fn chat_mode() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![InlineButton::new("📝 With History", "mode_with_history")],
        vec![InlineButton::new("🔄 Without History", "mode_without_history")],
        vec![InlineButton::new("⬅️ Back to Settings", "settings")],
    ])
}

pub fn model_selection() -> InlineKeyboard {
    let buttons = POPULAR_MODELS
        .iter()
        .map(|(label, id)| InlineButton::new(*label, format!("{MODEL_PREFIX}{id}")))
        .collect();

    InlineKeyboard::grid(buttons, 2)
        .push_row(vec![InlineButton::new("📋 All Models", "listmodels")])
        .push_row(vec![InlineButton::new("⬅️ Back to Settings", "settings")])
}

/// Yes/No pair answering with `confirm_<action>` / `cancel_<action>`.
pub fn confirmation(action: &str) -> InlineKeyboard {
    InlineKeyboard::new(vec![vec![
        InlineButton::new("✅ Yes", format!("confirm_{action}")),
        InlineButton::new("❌ No", format!("cancel_{action}")),
    ]])
}

pub fn back_to_menu() -> InlineKeyboard {
    InlineKeyboard::new(vec![vec![InlineButton::new(
        "⬅️ Back to Menu",
        "back_to_menu",
    )]])
}
