use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, session::AppCredentials, Result};

/// Typed configuration, loaded from the environment (with `.env` support).
///
/// Credential presence is NOT validated here: a run that only targets Slack
/// must not fail because the Telegram credentials are absent. Each backend
/// checks its own credentials at first use.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram user-client credentials.
    pub telegram_api_id: String,
    pub telegram_api_hash: String,
    /// Where the persisted Telegram session lives.
    pub session_file: PathBuf,

    // Slack
    pub slack_bot_token: String,

    // Notion
    pub notion_api_token: String,
    pub notion_database_id: String,

    // Outbound HTTP
    pub http_timeout: Duration,

    // Default destinations, merged with caller-provided lists.
    pub telegram_channels: Vec<String>,
    pub telegram_groups: Vec<String>,
    pub slack_channels: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let state_dir = env_path("CROSSPOST_STATE_DIR")
            .or_else(|| dirs::home_dir().map(|home| home.join(".crosspost")))
            .ok_or_else(|| {
                Error::Config(
                    "cannot determine a state directory (set CROSSPOST_STATE_DIR)".to_string(),
                )
            })?;
        fs::create_dir_all(&state_dir)?;

        Ok(Self {
            telegram_api_id: env_str("TELEGRAM_API_ID").unwrap_or_default(),
            telegram_api_hash: env_str("TELEGRAM_API_HASH").unwrap_or_default(),
            session_file: state_dir.join("telegram.session"),
            slack_bot_token: env_str("SLACK_BOT_TOKEN").unwrap_or_default(),
            notion_api_token: env_str("NOTION_API_TOKEN").unwrap_or_default(),
            notion_database_id: env_str("NOTION_DATABASE_ID").unwrap_or_default(),
            http_timeout: Duration::from_secs(env_u64("HTTP_TIMEOUT_SECS").unwrap_or(30)),
            telegram_channels: parse_csv(env_str("TELEGRAM_CHANNELS")),
            telegram_groups: parse_csv(env_str("TELEGRAM_GROUPS")),
            slack_channels: parse_csv(env_str("SLACK_CHANNELS")),
        })
    }

    pub fn telegram_credentials(&self) -> AppCredentials {
        AppCredentials {
            app_id: self.telegram_api_id.clone(),
            app_hash: self.telegram_api_hash.clone(),
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
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
