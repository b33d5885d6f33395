use relay_core::{
    domain::{ChatId, UserId},
    Result,
};

use crate::router::AppState;

/// Plain text goes to the model.
pub async fn handle_text(state: &AppState, chat_id: ChatId, user_id: UserId, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Ok(());
    }
    state
        .chat
        .handle_text(&*state.messenger, chat_id, user_id, text)
        .await
}
