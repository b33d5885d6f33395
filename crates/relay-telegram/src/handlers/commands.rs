//! Slash commands and the menu screens shared with button callbacks.

use chrono::Utc;

use relay_core::{
    domain::{ChatId, UserId},
    errors::Error,
    expenses::ExpenseSummary,
    formatting::Dialect,
    messaging::{
        delivery::{deliver, send_menu},
        types::InlineKeyboard,
    },
    storage::{ChatMode, UserSettings},
    Result,
};

use crate::keyboards::{self, POPULAR_MODELS};
use crate::router::AppState;

const WELCOME: &str = "🤖 *Welcome to LLM Chat Bot!*

This bot provides access to various LLM models through OpenRouter.

*Quick Start:*
• Just type any message to chat with the AI
• Use the menu buttons below for settings and commands
• The bot supports advanced formatting

*Features:*
✅ Multiple LLM models support
✅ Chat history modes
✅ Expense tracking
✅ Custom model management
✅ Message splitting for long responses

Use the buttons below to get started!";

const MAIN_MENU: &str = "📋 *Main Menu*

Welcome to your AI assistant! Choose an option below or just start typing to chat with the AI.

*Quick Actions:*
• 💬 Just type a message to chat
• ⚙️ Settings - Configure chat mode and models
• 📊 View expenses and usage statistics
• 🤖 Browse and change AI models

*Features:*
✅ Interactive button controls
✅ Multiple LLM models
✅ Chat history management
✅ Real-time expense tracking

Choose an option below:";

const ADD_MODEL_EXAMPLES: &str = "*Examples:*
• `/addmodel mistralai/mistral-7b-instruct`
• `/addmodel meta-llama/llama-2-70b-chat`
• `/addmodel cohere/command-r-plus`";

const UNKNOWN_COMMAND: &str = "Unknown command. Type /menu to see available commands.";

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// Model ids are interpolated into code spans, so they may not carry backticks.
fn validate_model_name(raw: &str) -> std::result::Result<&str, &'static str> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("❌ Please specify a model name.");
    }
    if name.chars().any(|c| c.is_whitespace() || c == '`') {
        return Err("❌ Invalid model name. Use the `provider/model-name` form.");
    }
    Ok(name)
}

pub async fn handle_command(
    state: &AppState,
    chat_id: ChatId,
    user_id: UserId,
    text: &str,
) -> Result<()> {
    let (cmd, arg) = parse_command(text);
    tracing::debug!(user_id = user_id.0, cmd = %cmd, "command");

    match cmd.as_str() {
        "start" | "help" => start(state, chat_id).await,
        "menu" => main_menu(state, chat_id).await,
        "mode" => mode(state, chat_id, user_id, &arg).await,
        "model" => model(state, chat_id, user_id, &arg).await,
        "addmodel" => add_model(state, chat_id, user_id, &arg).await,
        "listmodels" => list_models(state, chat_id, user_id).await,
        "expenses" => expenses(state, chat_id, user_id).await,
        "clear" => clear(state, chat_id, user_id).await,
        "status" => status(state, chat_id, user_id).await,
        _ => notice(state, chat_id, UNKNOWN_COMMAND).await,
    }
}

// ============== Output helpers ==============

/// Short status or error line.
pub(super) async fn notice(state: &AppState, chat_id: ChatId, text: &str) -> Result<()> {
    deliver(
        &*state.messenger,
        chat_id,
        text,
        Dialect::MarkupEntities,
        state.cfg.max_message_length,
    )
    .await?;
    Ok(())
}

async fn reply(state: &AppState, chat_id: ChatId, text: &str) -> Result<()> {
    deliver(
        &*state.messenger,
        chat_id,
        text,
        Dialect::PlainEmphasis,
        state.cfg.max_message_length,
    )
    .await?;
    Ok(())
}

async fn reply_with(
    state: &AppState,
    chat_id: ChatId,
    text: &str,
    keyboard: InlineKeyboard,
) -> Result<()> {
    send_menu(
        &*state.messenger,
        chat_id,
        text,
        Dialect::PlainEmphasis,
        keyboard,
    )
    .await?;
    Ok(())
}

async fn screen(
    state: &AppState,
    chat_id: ChatId,
    text: &str,
    keyboard: InlineKeyboard,
) -> Result<()> {
    send_menu(
        &*state.messenger,
        chat_id,
        text,
        Dialect::StrictEscaped,
        keyboard,
    )
    .await?;
    Ok(())
}

async fn load_settings(
    state: &AppState,
    chat_id: ChatId,
    user_id: UserId,
) -> Result<Option<UserSettings>> {
    match state.store.load(user_id).await {
        Ok(s) => Ok(Some(s)),
        Err(e) => {
            tracing::error!(user_id = user_id.0, error = %e, "failed to load user settings");
            notice(state, chat_id, "Error retrieving your settings.").await?;
            Ok(None)
        }
    }
}

async fn save_failed(state: &AppState, chat_id: ChatId, user_id: UserId, e: Error) -> Result<()> {
    tracing::error!(user_id = user_id.0, error = %e, "failed to save user settings");
    notice(state, chat_id, "Error saving your settings.").await
}

// ============== Commands ==============

pub(super) async fn start(state: &AppState, chat_id: ChatId) -> Result<()> {
    reply_with(state, chat_id, WELCOME, keyboards::main_menu()).await
}

pub(super) async fn main_menu(state: &AppState, chat_id: ChatId) -> Result<()> {
    reply_with(state, chat_id, MAIN_MENU, keyboards::main_menu()).await
}

pub(super) async fn mode(
    state: &AppState,
    chat_id: ChatId,
    user_id: UserId,
    arg: &str,
) -> Result<()> {
    if arg.trim().is_empty() {
        let Some(settings) = load_settings(state, chat_id, user_id).await? else {
            return Ok(());
        };
        let text = format!(
            "🔧 *Current chat mode:* `{}`\n\n\
*Available modes:*\n\
• `with_history` - AI remembers previous messages\n\
• `without_history` - Each message is independent\n\n\
*Usage:* `/mode with_history` or `/mode without_history`",
            settings.chat_mode
        );
        return reply(state, chat_id, &text).await;
    }

    let Ok(mode) = arg.trim().to_lowercase().parse::<ChatMode>() else {
        return notice(
            state,
            chat_id,
            "❌ Invalid mode. Use: `with_history` or `without_history`",
        )
        .await;
    };

    if let Err(e) = state.store.set_chat_mode(user_id, mode).await {
        return save_failed(state, chat_id, user_id, e).await;
    }
    tracing::info!(user_id = user_id.0, mode = %mode, "chat mode changed");

    let note = match mode {
        ChatMode::WithHistory => "The AI will now remember your previous messages in this session.",
        ChatMode::WithoutHistory => "Each message will be processed independently.",
    };
    let text = format!("✅ Chat mode changed to: `{mode}`\n\n*Note:* {note}");
    reply_with(state, chat_id, &text, keyboards::back_to_menu()).await
}

pub(super) async fn model(
    state: &AppState,
    chat_id: ChatId,
    user_id: UserId,
    arg: &str,
) -> Result<()> {
    if arg.trim().is_empty() {
        let Some(settings) = load_settings(state, chat_id, user_id).await? else {
            return Ok(());
        };
        let text = format!(
            "🤖 *Current model:* `{}`\n\n\
*Popular models:*\n\
• `openai/gpt-4` - Most capable, higher cost\n\
• `openai/gpt-3.5-turbo` - Fast and affordable\n\
• `anthropic/claude-3-sonnet` - Great for analysis\n\
• `google/gemini-pro` - Google's latest model\n\n\
*Usage:* `/model openai/gpt-4`\n\
*See all:* `/listmodels`",
            settings.current_model
        );
        return reply(state, chat_id, &text).await;
    }

    let name = match validate_model_name(arg) {
        Ok(name) => name,
        Err(msg) => return notice(state, chat_id, msg).await,
    };

    if let Err(e) = state.store.set_model(user_id, name).await {
        return save_failed(state, chat_id, user_id, e).await;
    }
    tracing::info!(user_id = user_id.0, model = name, "model changed");

    let text = format!(
        "✅ Model changed to: `{name}`\n\n\
*Tip:* The pricing and capabilities may vary between models. Check expenses to monitor usage."
    );
    reply_with(state, chat_id, &text, keyboards::back_to_menu()).await
}

async fn add_model(state: &AppState, chat_id: ChatId, user_id: UserId, arg: &str) -> Result<()> {
    if arg.trim().is_empty() {
        let text = format!(
            "🔧 *Add Custom Model*\n\n\
*Usage:* `/addmodel model-provider/model-name`\n\n\
{ADD_MODEL_EXAMPLES}\n\n\
*Note:* Make sure the model is available on OpenRouter."
        );
        return reply(state, chat_id, &text).await;
    }

    let name = match validate_model_name(arg) {
        Ok(name) => name,
        Err(msg) => return notice(state, chat_id, msg).await,
    };

    match state.store.add_custom_model(user_id, name).await {
        Ok(()) => {}
        Err(Error::Validation(_)) => {
            let text = format!("❌ Model `{name}` is already in your list.");
            return notice(state, chat_id, &text).await;
        }
        Err(e) => return save_failed(state, chat_id, user_id, e).await,
    }
    tracing::info!(user_id = user_id.0, model = name, "custom model added");

    let text = format!("✅ Added model: `{name}`\n\nYou can now use it with: `/model {name}`");
    reply(state, chat_id, &text).await
}

pub(super) async fn list_models(state: &AppState, chat_id: ChatId, user_id: UserId) -> Result<()> {
    let Some(settings) = load_settings(state, chat_id, user_id).await? else {
        return Ok(());
    };
    let current = settings.current_model.as_str();

    let mut text = format!("🤖 *Available Models*\n\n*Current:* `{current}` ✅\n\n*Popular Models:*\n");
    for (_, id) in POPULAR_MODELS.iter().filter(|(_, id)| *id != current) {
        text.push_str(&format!("• `{id}`\n"));
    }

    let custom: Vec<&String> = settings
        .custom_models
        .iter()
        .filter(|m| m.as_str() != current)
        .collect();
    if !settings.custom_models.is_empty() {
        text.push_str("\n*Your Custom Models:*\n");
        for m in custom {
            text.push_str(&format!("• `{m}`\n"));
        }
    }

    text.push_str("\n*Usage:* Click a model button above or type `/model model-name`");
    reply_with(state, chat_id, &text, keyboards::back_to_menu()).await
}

fn render_expenses(summary: &ExpenseSummary) -> String {
    let mut text = format!(
        "💰 *Your Usage Statistics*\n\n\
*Total Expenses:* ${:.6}\n\
*Total Requests:* {}\n\
_Using accurate OpenRouter pricing & native token counts_\n",
        summary.total_cost, summary.requests
    );

    if summary.is_empty() {
        text.push_str("\n*No usage data yet.* Start chatting to see your statistics!");
        return text;
    }

    text.push_str(&format!(
        "*Total Tokens:* {}\n*Last 7 Days:* ${:.6}\n\n*Model Usage:*\n",
        summary.total_tokens, summary.last_7_days
    ));
    for (model, count) in &summary.by_model {
        text.push_str(&format!("• `{model}`: {count} requests\n"));
    }

    text.push_str("\n*Recent Transactions:*\n");
    for e in &summary.recent {
        text.push_str(&format!(
            "• {}: ${:.6} ({})\n",
            e.timestamp.format("%m/%d %H:%M"),
            e.cost,
            Dialect::PlainEmphasis.escape(&e.model)
        ));
    }
    text
}

pub(super) async fn expenses(state: &AppState, chat_id: ChatId, user_id: UserId) -> Result<()> {
    let Some(settings) = load_settings(state, chat_id, user_id).await? else {
        return Ok(());
    };
    let summary = ExpenseSummary::from_settings(&settings, Utc::now());
    reply_with(
        state,
        chat_id,
        &render_expenses(&summary),
        keyboards::back_to_menu(),
    )
    .await
}

pub(super) async fn clear(state: &AppState, chat_id: ChatId, user_id: UserId) -> Result<()> {
    if let Err(e) = state.store.clear_chat_history(user_id).await {
        tracing::error!(user_id = user_id.0, error = %e, "failed to clear chat history");
        return notice(state, chat_id, "Error clearing chat history.").await;
    }
    tracing::info!(user_id = user_id.0, "chat history cleared");

    let text = "🗑️ *Chat history cleared!*\n\n\
Your conversation history has been deleted. The AI will start fresh with your next message.";
    reply_with(state, chat_id, text, keyboards::back_to_menu()).await
}

fn render_status(settings: &UserSettings) -> String {
    const TS: &str = "%Y-%m-%d %H:%M:%S";

    let mut text = format!(
        "📊 *Your Current Settings*\n\n\
*User ID:* `{}`\n\
*Current Model:* `{}`\n\
*Chat Mode:* `{}`\n\
*Total Expenses:* ${:.6}\n\
*Chat History:* {} messages\n\
*Custom Models:* {}\n\
*Last Updated:* {}\n",
        settings.user_id,
        settings.current_model,
        settings.chat_mode,
        settings.total_expenses,
        settings.chat_history.len(),
        settings.custom_models.len(),
        settings.last_updated.format(TS),
    );
    if let Some(last) = settings.expense_history.last() {
        text.push_str(&format!("*Last Activity:* {}\n", last.timestamp.format(TS)));
    }
    text.push_str("\n*Quick Actions:*\nUse the buttons below for easy navigation.");
    text
}

pub(super) async fn status(state: &AppState, chat_id: ChatId, user_id: UserId) -> Result<()> {
    let Some(settings) = load_settings(state, chat_id, user_id).await? else {
        return Ok(());
    };
    reply_with(
        state,
        chat_id,
        &render_status(&settings),
        keyboards::main_menu(),
    )
    .await
}

// ============== Menu screens ==============

pub(super) async fn settings_menu(state: &AppState, chat_id: ChatId) -> Result<()> {
    screen(
        state,
        chat_id,
        "# ⚙️ Settings Menu\n\nChoose what you'd like to configure:",
        keyboards::settings(),
    )
    .await
}

pub(super) async fn chat_mode_menu(
    state: &AppState,
    chat_id: ChatId,
    user_id: UserId,
) -> Result<()> {
    let Some(settings) = load_settings(state, chat_id, user_id).await? else {
        return Ok(());
    };
    let text = format!(
        "# 💬 Chat Mode Settings\n\n\
Current mode: `{}`\n\n\
Available modes:\n\
• With History - AI remembers previous messages\n\
• Without History - Each message is independent\n\n\
Select your preferred mode:",
        settings.chat_mode
    );
    screen(state, chat_id, &text, keyboards::chat_mode()).await
}

pub(super) async fn model_selection_menu(
    state: &AppState,
    chat_id: ChatId,
    user_id: UserId,
) -> Result<()> {
    let Some(settings) = load_settings(state, chat_id, user_id).await? else {
        return Ok(());
    };
    let text = format!(
        "# 🤖 Model Selection\n\n\
Current model: `{}`\n\n\
Choose from popular models or view all available models:",
        settings.current_model
    );
    screen(state, chat_id, &text, keyboards::model_selection()).await
}

pub(super) async fn clear_confirmation(state: &AppState, chat_id: ChatId) -> Result<()> {
    screen(
        state,
        chat_id,
        "# 🗑️ Clear Chat History\n\n\
Are you sure you want to clear your chat history?\n\
This action cannot be undone.",
        keyboards::confirmation("clear"),
    )
    .await
}

pub(super) async fn add_model_prompt(state: &AppState, chat_id: ChatId) -> Result<()> {
    let text = format!(
        "# ➕ Add Custom Model\n\n\
To add a custom model, use this command format:\n\
`/addmodel provider/model-name`\n\n\
{}\n\n\
Make sure the model is available on OpenRouter.",
        ADD_MODEL_EXAMPLES.replace("*Examples:*", "Examples:")
    );
    screen(state, chat_id, &text, keyboards::back_to_menu()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::harness;
    use chrono::TimeZone;
    use relay_core::storage::{ExpenseRecord, Role};

    const CHAT: ChatId = ChatId(42);
    const USER: UserId = UserId(42);

    #[test]
    fn parse_command_strips_bot_mention_and_keeps_args() {
        assert_eq!(
            parse_command("/Model@relay_bot  openai/gpt-4 "),
            ("model".to_string(), "openai/gpt-4".to_string())
        );
        assert_eq!(parse_command("/status"), ("status".to_string(), String::new()));
    }

    #[test]
    fn model_names_are_validated() {
        assert_eq!(validate_model_name("  openai/gpt-4 "), Ok("openai/gpt-4"));
        assert!(validate_model_name("   ").is_err());
        assert!(validate_model_name("two words").is_err());
        assert!(validate_model_name("a`b").is_err());
    }

    #[tokio::test]
    async fn mode_switch_persists_and_confirms() {
        let h = harness();
        handle_command(&h.state, CHAT, USER, "/mode WITH_HISTORY")
            .await
            .unwrap();

        let s = h.state.store.load(USER).await.unwrap();
        assert_eq!(s.chat_mode, ChatMode::WithHistory);

        let out = h.port.last();
        assert_eq!(out.dialect, Dialect::PlainEmphasis);
        assert!(out.text.contains("`with_history`"));
        assert_eq!(out.keyboard, Some(keyboards::back_to_menu()));
    }

    #[tokio::test]
    async fn invalid_mode_leaves_settings_alone() {
        let h = harness();
        handle_command(&h.state, CHAT, USER, "/mode sometimes")
            .await
            .unwrap();

        let out = h.port.last();
        assert_eq!(out.dialect, Dialect::MarkupEntities);
        assert!(out.text.starts_with("❌ Invalid mode."));
        assert!(out.text.contains("<code>with_history</code>"));
        let s = h.state.store.load(USER).await.unwrap();
        assert_eq!(s.chat_mode, h.state.cfg.default_chat_mode);
    }

    #[tokio::test]
    async fn model_without_argument_shows_current() {
        let h = harness();
        handle_command(&h.state, CHAT, USER, "/model").await.unwrap();

        let out = h.port.last();
        assert!(out
            .text
            .contains(&format!("`{}`", h.state.cfg.default_model)));
        assert!(out.keyboard.is_none());
    }

    #[tokio::test]
    async fn model_change_and_rejects_spaces() {
        let h = harness();
        handle_command(&h.state, CHAT, USER, "/model anthropic/claude-3-sonnet")
            .await
            .unwrap();
        assert_eq!(
            h.state.store.load(USER).await.unwrap().current_model,
            "anthropic/claude-3-sonnet"
        );

        handle_command(&h.state, CHAT, USER, "/model bad name")
            .await
            .unwrap();
        assert!(h.port.last().text.starts_with("❌ Invalid model name."));
        assert_eq!(
            h.state.store.load(USER).await.unwrap().current_model,
            "anthropic/claude-3-sonnet"
        );
    }

    #[tokio::test]
    async fn addmodel_rejects_duplicates() {
        let h = harness();
        handle_command(&h.state, CHAT, USER, "/addmodel cohere/command-r-plus")
            .await
            .unwrap();
        assert!(h.port.last().text.starts_with("✅ Added model:"));

        handle_command(&h.state, CHAT, USER, "/addmodel cohere/command-r-plus")
            .await
            .unwrap();
        let out = h.port.last();
        assert_eq!(out.dialect, Dialect::MarkupEntities);
        assert!(out.text.contains("is already in your list"));

        let s = h.state.store.load(USER).await.unwrap();
        assert_eq!(s.custom_models, vec!["cohere/command-r-plus".to_string()]);
    }

    #[tokio::test]
    async fn listmodels_skips_current_and_shows_custom() {
        let h = harness();
        h.state.store.set_model(USER, "openai/gpt-4").await.unwrap();
        h.state
            .store
            .add_custom_model(USER, "cohere/command-r-plus")
            .await
            .unwrap();

        handle_command(&h.state, CHAT, USER, "/listmodels")
            .await
            .unwrap();
        let text = h.port.last().text;
        assert_eq!(text.matches("openai/gpt-4`").count(), 1);
        assert!(text.contains("*Your Custom Models:*\n• `cohere/command-r-plus`"));
    }

    #[tokio::test]
    async fn expenses_without_usage() {
        let h = harness();
        handle_command(&h.state, CHAT, USER, "/expenses")
            .await
            .unwrap();
        let text = h.port.last().text;
        assert!(text.contains("*Total Expenses:* $0.000000"));
        assert!(text.contains("*No usage data yet.*"));
    }

    #[test]
    fn expenses_render_totals_and_recent() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let mut s = UserSettings::new(USER, "openai/gpt-4", ChatMode::WithoutHistory);
        s.push_expense(ExpenseRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 9, 8, 5, 0).unwrap(),
            model: "mistralai/mistral_7b".to_string(),
            input_tokens: 100,
            output_tokens: 50,
            cost: 0.0015,
        });

        let text = render_expenses(&ExpenseSummary::from_settings(&s, now));
        assert!(text.contains("*Total Requests:* 1"));
        assert!(text.contains("*Total Tokens:* 150"));
        assert!(text.contains("*Last 7 Days:* $0.001500"));
        assert!(text.contains("• `mistralai/mistral_7b`: 1 requests"));
        assert!(text.contains("• 03/09 08:05: $0.001500 (mistralai/mistral\\_7b)"));
    }

    #[tokio::test]
    async fn clear_empties_history() {
        let h = harness();
        h.state
            .store
            .add_history_entry(USER, Role::User, "hi")
            .await
            .unwrap();

        handle_command(&h.state, CHAT, USER, "/clear").await.unwrap();
        assert!(h.state.store.chat_history(USER).await.unwrap().is_empty());
        assert!(h.port.last().text.contains("Chat history cleared!"));
    }

    #[tokio::test]
    async fn status_uses_main_menu() {
        let h = harness();
        handle_command(&h.state, CHAT, USER, "/status").await.unwrap();
        let out = h.port.last();
        assert!(out.text.contains("*User ID:* `42`"));
        assert_eq!(out.keyboard, Some(keyboards::main_menu()));
    }

    #[tokio::test]
    async fn unknown_command_is_reported() {
        let h = harness();
        handle_command(&h.state, CHAT, USER, "/frobnicate")
            .await
            .unwrap();
        let out = h.port.last();
        assert_eq!(out.dialect, Dialect::MarkupEntities);
        assert!(out.text.starts_with("Unknown command."));
    }

    #[tokio::test]
    async fn menus_are_strictly_escaped() {
        let h = harness();
        chat_mode_menu(&h.state, CHAT, USER).await.unwrap();
        let out = h.port.last();
        assert_eq!(out.dialect, Dialect::StrictEscaped);
        assert!(out.text.starts_with("*💬 Chat Mode Settings*"));
        assert!(out.text.contains("`without_history`"));
        assert!(out.text.contains("With History \\- AI remembers"));
    }
}
