//! Format → split → send.

use crate::{
    chunking::{split_html, split_markdown},
    domain::{ChatId, MessageRef},
    formatting::{format, Dialect},
    messaging::{port::MessagingPort, types::InlineKeyboard},
    Result,
};

/// Render `text` for `dialect` and split it into sendable chunks.
pub fn render_chunks(text: &str, dialect: Dialect, max_len: usize) -> Vec<String> {
    let formatted = format(text, dialect);
    let chunks = match dialect {
        Dialect::MarkupEntities => split_html(&formatted, max_len),
        Dialect::PlainEmphasis | Dialect::StrictEscaped => split_markdown(&formatted, max_len),
    };

    chunks
        .into_iter()
        .filter(|c| !c.trim().is_empty())
        .collect()
}

/// Format, split and send `text`; stops at the first failed chunk.
pub async fn deliver(
    port: &dyn MessagingPort,
    chat_id: ChatId,
    text: &str,
    dialect: Dialect,
    max_len: usize,
) -> Result<Vec<MessageRef>> {
    let chunks = render_chunks(text, dialect, max_len);
    tracing::debug!(
        chat_id = chat_id.0,
        ?dialect,
        chunks = chunks.len(),
        "delivering message"
    );

    let mut sent = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        sent.push(port.send_text(chat_id, &chunk, dialect).await?);
    }
    Ok(sent)
}

/// Format a short message (menu, prompt) and send it with a keyboard attached.
pub async fn send_menu(
    port: &dyn MessagingPort,
    chat_id: ChatId,
    text: &str,
    dialect: Dialect,
    keyboard: InlineKeyboard,
) -> Result<MessageRef> {
    port.send_with_keyboard(chat_id, &format(text, dialect), dialect, keyboard)
        .await
}
