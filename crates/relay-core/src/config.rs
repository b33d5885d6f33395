use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::UserId, errors::Error, reconcile::RetryPolicy, storage::ChatMode, Result};

pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-3.5-turbo";

/// Typed configuration for the relay.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_allowed_users: Vec<i64>,
    pub max_message_length: usize,

    // OpenRouter
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub request_timeout: Duration,
    pub temperature: f64,
    pub max_tokens: u32,

    // Cost reconciliation
    pub stats_max_attempts: u32,
    pub stats_backoff_step: Duration,

    // Per-user defaults
    pub default_model: String,
    pub default_chat_mode: ChatMode,

    // Persistence
    pub data_dir: PathBuf,
}

impl Config {
    /// Load from the process environment, after an optional `.env` file.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (env, map, ...).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Required
        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;
        let telegram_allowed_users = parse_csv_i64(get("TELEGRAM_ALLOWED_USERS"));
        if telegram_allowed_users.is_empty() {
            return Err(Error::Config(
                "TELEGRAM_ALLOWED_USERS environment variable is required".to_string(),
            ));
        }
        let openrouter_api_key = get("OPENROUTER_API_KEY").ok_or_else(|| {
            Error::Config("OPENROUTER_API_KEY environment variable is required".to_string())
        })?;

        let openrouter_base_url = get("OPENROUTER_BASE_URL")
            .unwrap_or_else(|| DEFAULT_OPENROUTER_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let default_model = get("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let default_chat_mode = match get("DEFAULT_CHAT_MODE") {
            Some(raw) => raw
                .parse::<ChatMode>()
                .map_err(|e| Error::Config(format!("DEFAULT_CHAT_MODE: {e}")))?,
            None => ChatMode::WithoutHistory,
        };

        let max_message_length = parse_num::<usize>(&get, "MAX_MESSAGE_LENGTH")?.unwrap_or(4096);
        if max_message_length == 0 {
            return Err(Error::Config(
                "MAX_MESSAGE_LENGTH must be greater than zero".to_string(),
            ));
        }

        let request_timeout =
            Duration::from_secs(parse_num::<u64>(&get, "REQUEST_TIMEOUT_SECS")?.unwrap_or(60));
        let temperature = parse_num::<f64>(&get, "LLM_TEMPERATURE")?.unwrap_or(0.7);
        let max_tokens = parse_num::<u32>(&get, "LLM_MAX_TOKENS")?.unwrap_or(200_000);

        let stats_max_attempts = parse_num::<u32>(&get, "STATS_MAX_ATTEMPTS")?
            .unwrap_or(5)
            .max(1);
        let stats_backoff_step =
            Duration::from_millis(parse_num::<u64>(&get, "STATS_BACKOFF_MS")?.unwrap_or(1000));

        let data_dir = PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "data".to_string()));
        fs::create_dir_all(&data_dir)?;

        Ok(Self {
            telegram_bot_token,
            telegram_allowed_users,
            max_message_length,
            openrouter_api_key,
            openrouter_base_url,
            request_timeout,
            temperature,
            max_tokens,
            stats_max_attempts,
            stats_backoff_step,
            default_model,
            default_chat_mode,
            data_dir,
        })
    }

    pub fn is_user_allowed(&self, user_id: UserId) -> bool {
        self.telegram_allowed_users.contains(&user_id.0)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.stats_max_attempts,
            backoff_step: self.stats_backoff_step,
        }
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_num<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw}"))),
    }
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    fn required(dir: &Path) -> Vec<(&'static str, String)> {
        vec![
            ("TELEGRAM_BOT_TOKEN", "123:abc".to_string()),
            ("TELEGRAM_ALLOWED_USERS", "42, 7,oops".to_string()),
            ("OPENROUTER_API_KEY", "sk-or-test".to_string()),
            ("DATA_DIR", dir.display().to_string()),
        ]
    }

    fn build(pairs: Vec<(&'static str, String)>) -> Result<Config> {
        let borrowed: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (*k, v.as_str())).collect();
        Config::from_lookup(lookup(&borrowed))
    }

    #[test]
    fn applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = build(required(dir.path())).unwrap();

        assert_eq!(cfg.telegram_allowed_users, vec![42, 7]);
        assert_eq!(cfg.openrouter_base_url, DEFAULT_OPENROUTER_BASE_URL);
        assert_eq!(cfg.default_model, DEFAULT_MODEL);
        assert_eq!(cfg.default_chat_mode, ChatMode::WithoutHistory);
        assert_eq!(cfg.max_message_length, 4096);
        assert_eq!(cfg.request_timeout, Duration::from_secs(60));
        assert_eq!(cfg.max_tokens, 200_000);
        assert_eq!(cfg.stats_max_attempts, 5);
        assert_eq!(cfg.stats_backoff_step, Duration::from_secs(1));
        assert!(cfg.is_user_allowed(UserId(7)));
        assert!(!cfg.is_user_allowed(UserId(8)));
    }

    #[test]
    fn rejects_missing_required_values() {
        let dir = tempfile::tempdir().unwrap();
        for missing in [
            "TELEGRAM_BOT_TOKEN",
            "TELEGRAM_ALLOWED_USERS",
            "OPENROUTER_API_KEY",
        ] {
            let pairs = required(dir.path())
                .into_iter()
                .filter(|(k, _)| *k != missing)
                .collect();
            let err = build(pairs).unwrap_err();
            assert!(matches!(err, Error::Config(ref m) if m.contains(missing)));
        }
    }

    #[test]
    fn parses_overrides_and_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let mut pairs = required(dir.path());
        pairs.push(("DEFAULT_CHAT_MODE", "with_history".to_string()));
        pairs.push(("OPENROUTER_BASE_URL", "http://localhost:9/api/".to_string()));
        pairs.push(("STATS_BACKOFF_MS", "250".to_string()));
        let cfg = build(pairs.clone()).unwrap();
        assert_eq!(cfg.default_chat_mode, ChatMode::WithHistory);
        assert_eq!(cfg.openrouter_base_url, "http://localhost:9/api");
        assert_eq!(cfg.retry_policy().backoff_step, Duration::from_millis(250));

        pairs.push(("MAX_MESSAGE_LENGTH", "lots".to_string()));
        assert!(matches!(build(pairs).unwrap_err(), Error::Config(_)));
    }
}
