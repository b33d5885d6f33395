//! Telegram adapter (teloxide).
//!
//! This crate implements the `relay-core` MessagingPort over the Telegram Bot API
//! and routes incoming updates to the command, callback and chat handlers.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
};

use tokio::time::sleep;

pub mod handlers;
pub mod keyboards;
pub mod router;

use relay_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    formatting::Dialect,
    messaging::{
        port::MessagingPort,
        types::{ChatAction, InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    max_message_len: usize,
}

impl TelegramMessenger {
    pub fn new(bot: Bot, max_message_len: usize) -> Self {
        Self {
            bot,
            max_message_len,
        }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        tracing::warn!(retry_after = ?d, "telegram flood control, retrying");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[allow(deprecated)]
fn parse_mode(dialect: Dialect) -> ParseMode {
    match dialect {
        Dialect::PlainEmphasis => ParseMode::Markdown,
        Dialect::StrictEscaped => ParseMode::MarkdownV2,
        Dialect::MarkupEntities => ParseMode::Html,
    }
}

fn markup(keyboard: InlineKeyboard) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
        .rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|b| InlineKeyboardButton::callback(b.label, b.callback_data))
                .collect()
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_chat_actions: true,
            supports_inline_keyboards: true,
            max_message_len: self.max_message_len,
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str, dialect: Dialect) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), text.to_string())
                    .parse_mode(parse_mode(dialect))
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn send_with_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        dialect: Dialect,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let markup = markup(keyboard);

        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), text.to_string())
                    .parse_mode(parse_mode(dialect))
                    .reply_markup(markup.clone())
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let tg_action = match action {
            ChatAction::Typing => teloxide::types::ChatAction::Typing,
        };
        self.with_retry(|| self.bot.send_chat_action(Self::tg_chat(chat_id), tg_action))
            .await?;
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }
}
