//! Process configuration loaded once at startup
//!
//! All runtime settings come from environment variables (a .env file is
//! honored by the binaries). Initialization order is fixed: load config,
//! connect to the database, build the LLM client, bind routes.

use crate::error::{AgentError, Result};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub database_url: String,
    pub model: String,
    pub base_url: String,
    pub bind_addr: String,
    pub llm_timeout: Duration,
}

impl Config {
    /// Read configuration from the process environment. Fails fast when a
    /// required variable is missing so the server never starts half-wired.
    pub fn from_env() -> Result<Self> {
        let openai_api_key = require_var("OPENAI_API_KEY")?;
        let database_url = require_var("DATABASE_URL")?;

        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        let llm_timeout = match std::env::var("LLM_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    AgentError::Config(format!("LLM_TIMEOUT_SECS must be an integer, got '{}'", raw))
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
        };

        Ok(Self {
            openai_api_key,
            database_url,
            model,
            base_url,
            bind_addr,
            llm_timeout,
        })
    }
}

fn require_var(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AgentError::Config(format!(
            "{} not set. Add it to your environment or .env file.",
            name
        ))),
    }
}
