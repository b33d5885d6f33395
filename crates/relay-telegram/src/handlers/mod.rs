//! Telegram update handlers.
//!
//! The teloxide endpoints only extract ids and check the allow-list; the actual
//! work happens in functions taking `&AppState` so it runs against any
//! `MessagingPort`.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use relay_core::{
    domain::{ChatId, UserId},
    formatting::Dialect,
};

use crate::router::AppState;

mod callback;
mod commands;
mod text;

#[cfg(test)]
mod test_support;

pub async fn handle_callback(
    _bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let user_id = UserId(q.from.id.0 as i64);
    if !state.cfg.is_user_allowed(user_id) {
        tracing::warn!(
            user_id = user_id.0,
            username = q.from.username.as_deref().unwrap_or("unknown"),
            "unauthorized user tried to use bot buttons"
        );
        return Ok(());
    }

    // Remove the button's loading state first.
    if let Err(e) = state.messenger.answer_callback_query(&q.id, None).await {
        tracing::debug!(error = %e, "answer_callback_query failed");
    }

    let (Some(message), Some(data)) = (q.message.as_ref(), q.data.as_deref()) else {
        return Ok(());
    };
    let chat_id = ChatId(message.chat.id.0);

    tracing::info!(user_id = user_id.0, data, "button pressed");
    if let Err(e) = callback::route(&state, chat_id, user_id, data).await {
        tracing::error!(user_id = user_id.0, error = %e, "callback handling failed");
    }
    Ok(())
}

pub async fn handle_message(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = UserId(user.id.0 as i64);
    if !state.cfg.is_user_allowed(user_id) {
        tracing::warn!(
            user_id = user_id.0,
            username = user.username.as_deref().unwrap_or("unknown"),
            "unauthorized user tried to use bot"
        );
        return Ok(());
    }

    let chat_id = ChatId(msg.chat.id.0);
    let Some(text) = msg.text() else {
        if let Err(e) = state
            .messenger
            .send_text(chat_id, "Only text messages are supported.", Dialect::PlainEmphasis)
            .await
        {
            tracing::warn!(chat_id = chat_id.0, error = %e, "failed to reject non-text message");
        }
        return Ok(());
    };
    tracing::info!(user_id = user_id.0, chars = text.chars().count(), "message received");

    let res = if text.starts_with('/') {
        commands::handle_command(&state, chat_id, user_id, text).await
    } else {
        // Sequentialize chat turns per chat.
        let _guard = state.chat_locks.lock_chat(chat_id.0).await;
        text::handle_text(&state, chat_id, user_id, text).await
    };

    if let Err(e) = res {
        tracing::error!(user_id = user_id.0, error = %e, "message handling failed");
    }
    Ok(())
}
