use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    formatting::Dialect,
    messaging::types::{ChatAction, InlineKeyboard, MessagingCapabilities},
    Result,
};

/// Outbound messenger port.
///
/// `text` is already rendered for `dialect`; the adapter only picks the matching
/// parse mode. Use [`crate::messaging::delivery`] to format and split raw text.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_text(&self, chat_id: ChatId, text: &str, dialect: Dialect)
        -> Result<MessageRef>;

    async fn send_with_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        dialect: Dialect,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
