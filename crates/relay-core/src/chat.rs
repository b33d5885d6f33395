//! The relay itself: user text in, model reply out, cost recorded.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    domain::{ChatId, UserId},
    errors::Error,
    formatting::{system_prompt, Dialect},
    llm::{
        client::CompletionClient,
        types::{ChatMessage, CompletionRequest},
    },
    messaging::{delivery::deliver, port::MessagingPort, types::ChatAction},
    reconcile::CostReconciler,
    storage::{ChatMode, ExpenseRecord, Role, SettingsStore},
    Result,
};

/// Prior history entries sent along in `with_history` mode.
pub const HISTORY_WINDOW: usize = 10;

/// Telegram drops the typing indicator after ~5 s.
pub const TYPING_INTERVAL: Duration = Duration::from_secs(4);

#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub text: String,
    pub expense: ExpenseRecord,
}

pub struct ChatService {
    store: Arc<dyn SettingsStore>,
    llm: Arc<dyn CompletionClient>,
    reconciler: Arc<CostReconciler>,
    max_message_length: usize,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        llm: Arc<dyn CompletionClient>,
        reconciler: Arc<CostReconciler>,
        max_message_length: usize,
    ) -> Self {
        Self {
            store,
            llm,
            reconciler,
            max_message_length,
        }
    }

    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    /// One completion round-trip for `user`, with the expense recorded.
    pub async fn respond(&self, user: UserId, text: &str) -> Result<Reply> {
        let settings = self.store.load(user).await?;

        if let Err(e) = self.store.add_history_entry(user, Role::User, text).await {
            tracing::warn!(user_id = user.0, error = %e, "failed to store user message");
        }

        let mut messages = vec![ChatMessage::new(Role::System, system_prompt())];
        if settings.chat_mode == ChatMode::WithHistory {
            let prior: Vec<_> = settings
                .chat_history
                .iter()
                .filter(|h| h.role != Role::System)
                .collect();
            let start = prior.len().saturating_sub(HISTORY_WINDOW);
            messages.extend(
                prior[start..]
                    .iter()
                    .map(|h| ChatMessage::new(h.role, h.content.clone())),
            );
        }
        messages.push(ChatMessage::new(Role::User, text));

        let model = settings.current_model;
        tracing::debug!(
            user_id = user.0,
            model = %model,
            messages = messages.len(),
            "requesting completion"
        );

        let resp = self
            .llm
            .complete(CompletionRequest::new(model.clone(), messages))
            .await?;
        let reply_text = resp
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| Error::Provider("no response choices returned".to_string()))?;

        let expense = self.reconciler.reconcile(&resp, &model).await;
        if let Err(e) = self.store.add_expense(user, expense.clone()).await {
            tracing::error!(user_id = user.0, error = %e, "failed to record expense");
        }

        tracing::info!(
            user_id = user.0,
            model = %expense.model,
            input_tokens = expense.input_tokens,
            output_tokens = expense.output_tokens,
            cost = expense.cost,
            "reply ready"
        );

        Ok(Reply {
            text: reply_text,
            expense,
        })
    }

    /// Full platform flow for a plain text message.
    ///
    /// Failures of the model call are reported to the user; only failures to
    /// deliver the reply itself are returned.
    pub async fn handle_text(
        &self,
        messenger: &dyn MessagingPort,
        chat_id: ChatId,
        user: UserId,
        text: &str,
    ) -> Result<()> {
        let cancel = CancellationToken::new();
        let typing = keep_typing(messenger, chat_id, cancel.clone());
        let work = async {
            let res = self.respond(user, text).await;
            cancel.cancel();
            res
        };
        let ((), res) = tokio::join!(typing, work);

        match res {
            Ok(reply) => {
                deliver(
                    messenger,
                    chat_id,
                    &reply.text,
                    Dialect::MarkupEntities,
                    self.max_message_length,
                )
                .await?;

                if let Err(e) = self
                    .store
                    .add_history_entry(user, Role::Assistant, &reply.text)
                    .await
                {
                    tracing::warn!(user_id = user.0, error = %e, "failed to store reply");
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(user_id = user.0, error = %e, "failed to get response");
                let apology = format!("Sorry, there was an error getting a response: {e}");
                deliver(
                    messenger,
                    chat_id,
                    &apology,
                    Dialect::MarkupEntities,
                    self.max_message_length,
                )
                .await?;
                Ok(())
            }
        }
    }
}

async fn keep_typing(messenger: &dyn MessagingPort, chat_id: ChatId, cancel: CancellationToken) {
    loop {
        if let Err(e) = messenger.send_chat_action(chat_id, ChatAction::Typing).await {
            tracing::debug!(chat_id = chat_id.0, error = %e, "typing indicator failed");
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(TYPING_INTERVAL) => {}
        }
    }
}
