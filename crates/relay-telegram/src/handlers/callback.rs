use relay_core::{
    domain::{ChatId, UserId},
    Result,
};

use crate::keyboards::MODEL_PREFIX;
use crate::router::AppState;

use super::commands;

/// Dispatch a button press by its callback data.
pub async fn route(state: &AppState, chat_id: ChatId, user_id: UserId, data: &str) -> Result<()> {
    match data {
        "menu" | "back_to_menu" => commands::main_menu(state, chat_id).await,
        "settings" => commands::settings_menu(state, chat_id).await,
        "expenses" => commands::expenses(state, chat_id, user_id).await,
        "status" => commands::status(state, chat_id, user_id).await,
        "listmodels" => commands::list_models(state, chat_id, user_id).await,
        "clear" => commands::clear_confirmation(state, chat_id).await,
        "confirm_clear" => commands::clear(state, chat_id, user_id).await,
        "cancel_clear" => commands::notice(state, chat_id, "❌ Clear operation cancelled.").await,
        "help" => commands::start(state, chat_id).await,
        "chat_mode" => commands::chat_mode_menu(state, chat_id, user_id).await,
        "change_model" => commands::model_selection_menu(state, chat_id, user_id).await,
        "add_model" => commands::add_model_prompt(state, chat_id).await,
        "mode_with_history" => commands::mode(state, chat_id, user_id, "with_history").await,
        "mode_without_history" => {
            commands::mode(state, chat_id, user_id, "without_history").await
        }
        _ => match data.strip_prefix(MODEL_PREFIX) {
            Some(model) => commands::model(state, chat_id, user_id, model).await,
            None => {
                tracing::warn!(user_id = user_id.0, data, "unknown callback data");
                commands::notice(state, chat_id, "Unknown button action. Please try again.").await
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::harness;
    use crate::keyboards;
    use relay_core::{
        formatting::Dialect,
        storage::ChatMode,
    };

    const CHAT: ChatId = ChatId(42);
    const USER: UserId = UserId(42);

    #[tokio::test]
    async fn model_button_switches_model() {
        let h = harness();
        route(&h.state, CHAT, USER, "model_google/gemini-pro")
            .await
            .unwrap();

        let s = h.state.store.load(USER).await.unwrap();
        assert_eq!(s.current_model, "google/gemini-pro");
        assert!(h.port.last().text.contains("`google/gemini-pro`"));
    }

    #[tokio::test]
    async fn mode_buttons_set_chat_mode() {
        let h = harness();
        route(&h.state, CHAT, USER, "mode_with_history").await.unwrap();
        assert_eq!(
            h.state.store.load(USER).await.unwrap().chat_mode,
            ChatMode::WithHistory
        );

        route(&h.state, CHAT, USER, "mode_without_history")
            .await
            .unwrap();
        assert_eq!(
            h.state.store.load(USER).await.unwrap().chat_mode,
            ChatMode::WithoutHistory
        );
    }

    #[tokio::test]
    async fn clear_asks_before_deleting() {
        let h = harness();
        h.state
            .store
            .add_history_entry(USER, relay_core::storage::Role::User, "keep me")
            .await
            .unwrap();

        route(&h.state, CHAT, USER, "clear").await.unwrap();
        let out = h.port.last();
        assert_eq!(out.keyboard, Some(keyboards::confirmation("clear")));
        assert_eq!(h.state.store.chat_history(USER).await.unwrap().len(), 1);

        route(&h.state, CHAT, USER, "cancel_clear").await.unwrap();
        assert!(h.port.last().text.contains("Clear operation cancelled"));
        assert_eq!(h.state.store.chat_history(USER).await.unwrap().len(), 1);

        route(&h.state, CHAT, USER, "confirm_clear").await.unwrap();
        assert!(h.state.store.chat_history(USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn navigation_buttons_open_screens() {
        let h = harness();
        for (data, keyboard) in [
            ("back_to_menu", keyboards::main_menu()),
            ("settings", keyboards::settings()),
            ("chat_mode", keyboards::chat_mode()),
            ("change_model", keyboards::model_selection()),
            ("add_model", keyboards::back_to_menu()),
            ("help", keyboards::main_menu()),
        ] {
            route(&h.state, CHAT, USER, data).await.unwrap();
            assert_eq!(h.port.last().keyboard, Some(keyboard), "{data}");
        }

        route(&h.state, CHAT, USER, "settings").await.unwrap();
        assert_eq!(h.port.last().dialect, Dialect::StrictEscaped);
    }

    #[tokio::test]
    async fn unknown_button_is_reported() {
        let h = harness();
        route(&h.state, CHAT, USER, "self_destruct").await.unwrap();
        assert!(h.port.last().text.starts_with("Unknown button action."));
        assert_eq!(h.port.all().len(), 1);
    }
}
