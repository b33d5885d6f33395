use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    formatting::Dialect,
    messaging::{
        port::MessagingPort,
        types::{ChatAction, InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Sent {
    Text {
        chat: ChatId,
        text: String,
        dialect: Dialect,
    },
    Keyboard {
        chat: ChatId,
        text: String,
        dialect: Dialect,
        keyboard: InlineKeyboard,
    },
    Action(ChatId, ChatAction),
    CallbackAnswer(String),
}

/// In-memory messenger that records every call.
#[derive(Default)]
pub(crate) struct RecordingMessenger {
    pub sent: Mutex<Vec<(tokio::time::Instant, Sent)>>,
    pub fail_sends: bool,
}

impl RecordingMessenger {
    pub fn failing() -> Self {
        Self {
            fail_sends: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().iter().map(|(_, s)| s.clone()).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } | Sent::Keyboard { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn typing_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|s| matches!(s, Sent::Action(_, ChatAction::Typing)))
            .count()
    }

    fn record(&self, s: Sent) -> Result<MessageRef> {
        let mut sent = self.sent.lock().unwrap();
        let chat_id = match &s {
            Sent::Text { chat, .. } | Sent::Keyboard { chat, .. } => *chat,
            Sent::Action(chat, _) => *chat,
            Sent::CallbackAnswer(_) => ChatId(0),
        };
        sent.push((tokio::time::Instant::now(), s));
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(sent.len() as i32),
        })
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_chat_actions: true,
            supports_inline_keyboards: true,
            max_message_len: 4096,
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str, dialect: Dialect) -> Result<MessageRef> {
        if self.fail_sends {
            return Err(Error::External("send failed".to_string()));
        }
        self.record(Sent::Text {
            chat: chat_id,
            text: text.to_string(),
            dialect,
        })
    }

    async fn send_with_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        dialect: Dialect,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        if self.fail_sends {
            return Err(Error::External("send failed".to_string()));
        }
        self.record(Sent::Keyboard {
            chat: chat_id,
            text: text.to_string(),
            dialect,
            keyboard,
        })
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        self.record(Sent::Action(chat_id, action)).map(|_| ())
    }

    async fn answer_callback_query(&self, callback_id: &str, _text: Option<&str>) -> Result<()> {
        self.record(Sent::CallbackAnswer(callback_id.to_string()))
            .map(|_| ())
    }
}
