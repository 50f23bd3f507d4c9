//! SQL generation via an external chat-completions API
//!
//! `LlmClient` performs the outbound call; `SqlGenerator` owns the prompt
//! and turns a free-text completion into a single SQL statement through
//! `extract_sql`, which is a pure function so it can be tested against
//! literal sample responses.

use crate::error::{AgentError, Result};
use async_trait::async_trait;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Seam between the generator and the completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub struct LlmClient {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api_key,
            model,
            base_url,
            http,
        })
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.0,
            "max_tokens": 300
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::UpstreamUnavailable(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::UpstreamUnavailable(format!(
                "LLM API returned {}: {}",
                status, detail
            )));
        }

        let response_json: serde_json::Value = response.json().await.map_err(|e| {
            AgentError::UpstreamUnavailable(format!("failed to parse LLM response: {}", e))
        })?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                AgentError::GenerationEmpty("no content in LLM response".to_string())
            })?;

        Ok(content.to_string())
    }
}

pub struct SqlGenerator {
    backend: Arc<dyn CompletionBackend>,
}

impl SqlGenerator {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Generate one SQL statement for a question. Exactly one outbound
    /// call per invocation; no caching, no retries.
    pub async fn generate(&self, question: &str, schema: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AgentError::Validation("question must not be empty".to_string()));
        }

        let prompt = build_prompt(question, schema);
        let raw = self.backend.complete(&prompt).await?;
        debug!(raw = %raw, "completion received");

        let sql = extract_sql(&raw)?;
        ensure_parses(&sql)?;
        Ok(sql)
    }
}

pub fn build_prompt(question: &str, schema: &str) -> String {
    format!(
        r#"You are a helpful assistant that generates SQL queries for PostgreSQL.

Database schema:
{}

User question:
{}

Produce ONLY the SQL query, no explanation."#,
        schema, question
    )
}

const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "EXPLAIN", "SHOW",
];

/// Pull the first SQL statement out of a free-text completion. Strips code
/// fences and surrounding prose; stops at the statement's closing semicolon.
pub fn extract_sql(raw: &str) -> Result<String> {
    let candidate = fenced_block(raw).unwrap_or(raw);

    let mut collected = String::new();
    let mut started = false;
    for line in candidate.lines() {
        if !started {
            match find_sql_start(line) {
                Some(pos) => {
                    started = true;
                    collected.push_str(line[pos..].trim_end());
                }
                None => continue,
            }
        } else {
            collected.push('\n');
            collected.push_str(line.trim_end());
        }
        if let Some(pos) = collected.find(';') {
            collected.truncate(pos + 1);
            break;
        }
    }

    let sql = collected.trim().to_string();
    if !started || sql.is_empty() {
        return Err(AgentError::GenerationEmpty(format!(
            "no SQL statement found in response: {}",
            summarize(raw)
        )));
    }
    Ok(sql)
}

/// Contents of the first ``` fence, with an optional language tag removed.
fn fenced_block(raw: &str) -> Option<&str> {
    let start = raw.find("```")?;
    let after = &raw[start + 3..];
    let after = after
        .strip_prefix("sql")
        .or_else(|| after.strip_prefix("SQL"))
        .unwrap_or(after);
    match after.find("```") {
        Some(end) => Some(&after[..end]),
        None => Some(after),
    }
}

/// Byte offset where a SQL statement begins on this line, if any.
/// ASCII-only uppercasing keeps offsets valid for the original line.
fn find_sql_start(line: &str) -> Option<usize> {
    let upper = line.to_ascii_uppercase();
    let mut best: Option<usize> = None;
    for kw in SQL_KEYWORDS {
        let mut from = 0;
        while let Some(rel) = upper[from..].find(kw) {
            let pos = from + rel;
            let end = pos + kw.len();
            let boundary_before = pos == 0
                || !upper[..pos]
                    .chars()
                    .next_back()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_');
            let boundary_after = end == upper.len()
                || !upper[end..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_');
            if boundary_before && boundary_after {
                best = Some(best.map_or(pos, |b| b.min(pos)));
                break;
            }
            from = end;
        }
    }
    best
}

/// Reject extracted text that is not syntactically valid SQL, so a caller
/// never receives malformed text marked successful.
fn ensure_parses(sql: &str) -> Result<()> {
    Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| AgentError::GenerationEmpty(format!("model output is not valid SQL: {}", e)))?;
    Ok(())
}

fn summarize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() > 120 {
        let head: String = trimmed.chars().take(120).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}
