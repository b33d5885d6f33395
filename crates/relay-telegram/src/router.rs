use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};

use relay_core::{
    chat::ChatService,
    config::Config,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    storage::SettingsStore,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub chat: Arc<ChatService>,
    pub store: Arc<dyn SettingsStore>,
    pub messenger: Arc<dyn MessagingPort>,
    pub chat_locks: Arc<ChatLocks>,
}

/// Serializes chat turns per Telegram chat.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub async fn run_polling(cfg: Arc<Config>, chat: Arc<ChatService>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "bot started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed"),
    }
    tracing::info!(
        allowed_users = cfg.telegram_allowed_users.len(),
        data_dir = %cfg.data_dir.display(),
        "configuration loaded"
    );

    // Spacing between consecutive chunks; RetryAfter is still handled by the adapter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(
        bot.clone(),
        cfg.max_message_length,
    ));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        store: chat.store().clone(),
        chat,
        messenger,
        chat_locks: Arc::new(ChatLocks::default()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("bot stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn chat_lock_serializes_same_chat() {
        let locks = Arc::new(ChatLocks::default());
        let guard = locks.lock_chat(1).await;

        let other = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.lock_chat(2).await })
        };
        assert!(other.await.is_ok());

        let same = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock_chat(1).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!same.is_finished());

        drop(guard);
        assert!(same.await.is_ok());
    }
}
