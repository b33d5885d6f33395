use std::sync::Arc;

use relay_core::{
    chat::ChatService,
    config::Config,
    reconcile::CostReconciler,
    storage::{FileStore, SettingsStore},
};
use relay_openrouter::{OpenRouterClient, OpenRouterConfig};

#[tokio::main]
async fn main() -> Result<(), relay_core::Error> {
    relay_core::logging::init("relay")?;

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn SettingsStore> = Arc::new(FileStore::new(
        cfg.data_dir.clone(),
        cfg.default_model.clone(),
        cfg.default_chat_mode,
    ));

    // One client serves both completions and generation stats.
    let openrouter = Arc::new(OpenRouterClient::new(OpenRouterConfig::from_config(&cfg))?);
    let reconciler = Arc::new(CostReconciler::new(openrouter.clone(), cfg.retry_policy()));

    let chat = Arc::new(ChatService::new(
        store,
        openrouter,
        reconciler,
        cfg.max_message_length,
    ));

    tracing::info!(model = %cfg.default_model, "starting relay");

    relay_telegram::router::run_polling(cfg, chat)
        .await
        .map_err(|e| relay_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
