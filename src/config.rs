use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;

const DEFAULT_DATABASE_URL: &str = "sqlite://site.db?mode=rwc";
const DEFAULT_LLM_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const DEFAULT_LLM_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:8080,http://127.0.0.1:8080";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub llm_api_key: String,
    pub llm_api_base: String,
    pub llm_model: String,
    pub jwt_secret: String,
    pub bind_address: String,
    pub allowed_origins: Vec<String>,
    pub cookie_secure: bool,
    pub session_ttl: Duration,
    pub data_dir: PathBuf,
    pub rules_file: Option<PathBuf>,
    pub kb_max_depth: usize,
    pub kb_max_file_bytes: u64,
    pub chat_idle_timeout: Duration,
    pub chat_max_sessions: u64,
    pub chat_max_history: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests can inject values without touching the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let llm_api_key = lookup("LLM_API_KEY").ok_or_else(|| anyhow!("LLM_API_KEY not found"))?;

        let jwt_secret = lookup("JWT_SECRET").ok_or_else(|| anyhow!("JWT_SECRET not found"))?;

        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let llm_api_base = lookup("LLM_API_BASE").unwrap_or_else(|| DEFAULT_LLM_API_BASE.to_string());
        let llm_model = lookup("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string());
        let bind_address = lookup("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        let cookie_secure: bool = parse_or(&lookup, "COOKIE_SECURE", false)?;
        let session_ttl_hours: u64 = parse_or(&lookup, "SESSION_TTL_HOURS", 168)?;
        let data_dir = PathBuf::from(lookup("DATA_DIR").unwrap_or_else(|| "data".to_string()));
        let rules_file = lookup("RULES_FILE").map(PathBuf::from);
        let kb_max_depth: usize = parse_or(&lookup, "KB_MAX_DEPTH", 16)?;
        let kb_max_file_mb: u64 = parse_or(&lookup, "KB_MAX_FILE_MB", 50)?;
        let chat_idle_minutes: u64 = parse_or(&lookup, "CHAT_IDLE_MINUTES", 30)?;
        let chat_max_sessions: u64 = parse_or(&lookup, "CHAT_MAX_SESSIONS", 1000)?;
        let chat_max_history: usize = parse_or(&lookup, "CHAT_MAX_HISTORY", 20)?;

        Ok(AppConfig {
            database_url,
            llm_api_key,
            llm_api_base,
            llm_model,
            jwt_secret,
            bind_address,
            allowed_origins,
            cookie_secure,
            session_ttl: Duration::from_secs(session_ttl_hours * 3600),
            data_dir,
            rules_file,
            kb_max_depth,
            kb_max_file_bytes: kb_max_file_mb * 1024 * 1024,
            chat_idle_timeout: Duration::from_secs(chat_idle_minutes * 60),
            chat_max_sessions,
            chat_max_history,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, anyhow::Error>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}
