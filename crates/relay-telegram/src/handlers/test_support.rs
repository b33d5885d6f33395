use std::{collections::HashMap, sync::Arc, sync::Mutex};

use async_trait::async_trait;

use relay_core::{
    chat::ChatService,
    config::Config,
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    formatting::Dialect,
    llm::{
        client::{CompletionClient, GenerationStatsSource},
        types::{ChatMessage, Choice, CompletionRequest, CompletionResponse, StatsResponse, Usage},
    },
    messaging::{
        port::MessagingPort,
        types::{ChatAction, InlineKeyboard, MessagingCapabilities},
    },
    reconcile::{CostReconciler, RetryPolicy},
    storage::{FileStore, Role, SettingsStore},
    Result,
};

use crate::router::{AppState, ChatLocks};

#[derive(Clone, Debug, PartialEq)]
pub struct Outgoing {
    pub chat: ChatId,
    pub text: String,
    pub dialect: Dialect,
    pub keyboard: Option<InlineKeyboard>,
}

#[derive(Default)]
pub struct RecordingPort {
    pub sent: Mutex<Vec<Outgoing>>,
    pub typing: Mutex<usize>,
}

impl RecordingPort {
    pub fn last(&self) -> Outgoing {
        self.sent.lock().unwrap().last().cloned().unwrap()
    }

    pub fn all(&self) -> Vec<Outgoing> {
        self.sent.lock().unwrap().clone()
    }

    fn push(&self, o: Outgoing) -> Result<MessageRef> {
        let mut sent = self.sent.lock().unwrap();
        let chat_id = o.chat;
        sent.push(o);
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(sent.len() as i32),
        })
    }
}

#[async_trait]
impl MessagingPort for RecordingPort {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_chat_actions: true,
            supports_inline_keyboards: true,
            max_message_len: 4096,
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str, dialect: Dialect) -> Result<MessageRef> {
        self.push(Outgoing {
            chat: chat_id,
            text: text.to_string(),
            dialect,
            keyboard: None,
        })
    }

    async fn send_with_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        dialect: Dialect,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.push(Outgoing {
            chat: chat_id,
            text: text.to_string(),
            dialect,
            keyboard: Some(keyboard),
        })
    }

    async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
        *self.typing.lock().unwrap() += 1;
        Ok(())
    }

    async fn answer_callback_query(&self, _callback_id: &str, _text: Option<&str>) -> Result<()> {
        Ok(())
    }
}

struct EchoLlm;

#[async_trait]
impl CompletionClient for EchoLlm {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse> {
        let last = req
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(CompletionResponse {
            id: None,
            model: req.model,
            created: None,
            choices: vec![Choice {
                index: 0,
                message: ChatMessage::new(Role::Assistant, format!("echo: {last}")),
                finish_reason: Some("stop".to_string()),
            }],
            usage: Usage {
                prompt_tokens: 10,
                completion_tokens: 10,
                total_tokens: 20,
            },
            error: None,
        })
    }
}

struct NoStats;

#[async_trait]
impl GenerationStatsSource for NoStats {
    async fn fetch(&self, _generation_id: &str) -> Result<StatsResponse> {
        Err(Error::Transport("offline".to_string()))
    }
}

pub struct Harness {
    pub state: AppState,
    pub port: Arc<RecordingPort>,
    _dir: tempfile::TempDir,
}

pub fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let env: HashMap<&str, String> = HashMap::from([
        ("TELEGRAM_BOT_TOKEN", "123:abc".to_string()),
        ("TELEGRAM_ALLOWED_USERS", "42".to_string()),
        ("OPENROUTER_API_KEY", "sk-or-test".to_string()),
        ("DATA_DIR", dir.path().display().to_string()),
    ]);
    let cfg = Arc::new(Config::from_lookup(|k| env.get(k).cloned()).unwrap());

    let store: Arc<dyn SettingsStore> = Arc::new(FileStore::new(
        cfg.data_dir.clone(),
        cfg.default_model.clone(),
        cfg.default_chat_mode,
    ));
    let reconciler = Arc::new(CostReconciler::new(Arc::new(NoStats), RetryPolicy::default()));
    let chat = Arc::new(ChatService::new(
        store.clone(),
        Arc::new(EchoLlm),
        reconciler,
        cfg.max_message_length,
    ));
    let port = Arc::new(RecordingPort::default());

    Harness {
        state: AppState {
            cfg,
            chat,
            store,
            messenger: port.clone(),
            chat_locks: Arc::new(ChatLocks::default()),
        },
        port,
        _dir: dir,
    }
}
