use std::path::PathBuf;
use std::time::Duration;

use crate::reporting::categories::CATEGORIES;

#[derive(Debug, Clone)]
pub struct ReportingConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub token_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct ChatModelConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub word_boost: Vec<String>,
    pub custom_spelling: Vec<(Vec<String>, String)>,
}

/// Process-wide configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub reporting: ReportingConfig,
    pub chat_model: ChatModelConfig,
    pub transcription: TranscriptionConfig,
    /// `None` leaves the tool-calling loop unbounded.
    pub max_tool_rounds: Option<u32>,
    pub default_window_days: u32,
    pub max_audio_bytes: usize,
    pub database_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let reporting = ReportingConfig {
            base_url: env_or("REPORTING_BASE_URL", "https://api.umbrella.com"),
            client_id: env_or("REPORTING_CLIENT_ID", ""),
            client_secret: env_or("REPORTING_CLIENT_SECRET", ""),
            token_ttl: Duration::from_secs(env_parse("TOKEN_TTL_SECS", 3500)?),
        };
        url::Url::parse(&reporting.base_url)?;

        let chat_model = ChatModelConfig {
            base_url: env_or("COHERE_BASE_URL", "https://api.cohere.ai/v1"),
            api_key: std::env::var("COHERE_API_KEY").ok(),
            model: env_or("CHAT_MODEL", "command-r-plus"),
        };

        let transcription = TranscriptionConfig {
            base_url: env_or("ASSEMBLYAI_BASE_URL", "https://api.assemblyai.com/v2"),
            api_key: std::env::var("ASSEMBLYAI_API_KEY").ok(),
            poll_interval: Duration::from_millis(env_parse("TRANSCRIPTION_POLL_MS", 1000)?),
            timeout: Duration::from_secs(env_parse("TRANSCRIPTION_TIMEOUT_SECS", 300)?),
            word_boost: default_word_boost(),
            custom_spelling: vec![(vec!["fishing".to_string()], "Phishing".to_string())],
        };

        let max_tool_rounds = match env_parse::<u32>("MAX_TOOL_ROUNDS", 10)? {
            0 => None,
            n => Some(n),
        };

        Ok(Self {
            reporting,
            chat_model,
            transcription,
            max_tool_rounds,
            default_window_days: env_parse("DEFAULT_WINDOW_DAYS", 30)?,
            max_audio_bytes: env_parse("MAX_AUDIO_BYTES", 25 * 1024 * 1024)?,
            database_url: std::env::var("DATABASE_URL").ok(),
        })
    }
}

/// Vocabulary hints for the transcriber: every category the reporting API knows.
pub fn default_word_boost() -> Vec<String> {
    CATEGORIES.iter().map(|c| c.name.to_string()).collect()
}

pub fn resolve_default_db_url() -> anyhow::Result<String> {
    let base = std::env::var("XDG_DATA_HOME").ok().map(PathBuf::from).unwrap_or_else(|| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".local").join("share")
    });
    let dir = base.join("secops_assistant");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("assistant.db");
    Ok(format!("sqlite://{}", path.to_string_lossy()))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {}={:?}: {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}
