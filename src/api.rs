//! Request handler: validation, orchestration, and error translation
//!
//! The two operations here are transport-independent so they can be driven
//! directly in tests. Validation happens before any downstream call, and a
//! generation failure short-circuits so the gateway is never touched.

use crate::db::{JsonRow, SqlExecutor};
use crate::error::{AgentError, Result};
use crate::llm::SqlGenerator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Shared read-only state, built once at startup and cloned per request.
pub struct AppState {
    pub schema: &'static str,
    pub generator: SqlGenerator,
    pub gateway: Arc<dyn SqlExecutor>,
}

impl AppState {
    pub fn new(schema: &'static str, generator: SqlGenerator, gateway: Arc<dyn SqlExecutor>) -> Self {
        Self {
            schema,
            generator,
            gateway,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub sql: String,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub sql: String,
    pub rows: Vec<JsonRow>,
}

/// Generate SQL for a question without executing it.
pub async fn generate_only(state: &AppState, question: &str) -> Result<GenerateResponse> {
    let question = validate_question(question)?;
    let sql = state.generator.generate(question, state.schema).await?;
    info!(question = %question, sql = %sql, "generated SQL");
    Ok(GenerateResponse { sql })
}

/// Generate SQL, then run it against the database. Execution failures
/// discard the statement from the response body; it is still logged.
pub async fn generate_and_execute(state: &AppState, question: &str) -> Result<ExecuteResponse> {
    let question = validate_question(question)?;
    let sql = state.generator.generate(question, state.schema).await?;
    let rows = state.gateway.execute(&sql).await.map_err(|e| {
        error!(sql = %sql, error = %e, "query execution failed");
        e
    })?;
    info!(question = %question, sql = %sql, rows = rows.len(), "executed SQL");
    Ok(ExecuteResponse { sql, rows })
}

fn validate_question(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(AgentError::Validation(
            "question must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

/// JSON error body: `{"error": {"kind": ..., "message": ...}}`.
pub fn error_body(err: &AgentError) -> String {
    serde_json::json!({
        "error": {
            "kind": err.kind(),
            "message": err.to_string(),
        }
    })
    .to_string()
}
