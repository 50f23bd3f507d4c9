//! End-to-end handler tests with stubbed LLM and database backends.

use ai_sql_agent::api::{self, AppState};
use ai_sql_agent::db::{JsonRow, SqlExecutor};
use ai_sql_agent::error::{AgentError, Result};
use ai_sql_agent::llm::{CompletionBackend, SqlGenerator};
use ai_sql_agent::server::{self, HttpRequest};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SCHEMA: &str = "Table: customers\nColumns: id, name, email, revenue, signup_date";

struct StubCompletion {
    reply: std::result::Result<String, ()>,
    calls: AtomicUsize,
}

impl StubCompletion {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            reply: Err(()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for StubCompletion {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(()) => Err(AgentError::UpstreamUnavailable(
                "connection timed out".to_string(),
            )),
        }
    }
}

struct StubExecutor {
    rows: std::result::Result<Vec<JsonRow>, String>,
    calls: AtomicUsize,
}

impl StubExecutor {
    fn returning(rows: Vec<JsonRow>) -> Arc<Self> {
        Arc::new(Self {
            rows: Ok(rows),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            rows: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SqlExecutor for StubExecutor {
    async fn execute(&self, _sql: &str) -> Result<Vec<JsonRow>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.rows {
            Ok(rows) => Ok(rows.clone()),
            Err(message) => Err(AgentError::Execution(message.clone())),
        }
    }
}

fn count_row(count: i64) -> JsonRow {
    let mut row = JsonRow::new();
    row.insert("count".to_string(), serde_json::json!(count));
    row
}

fn state_with(
    completion: Arc<StubCompletion>,
    executor: Arc<StubExecutor>,
) -> AppState {
    AppState::new(SCHEMA, SqlGenerator::new(completion), executor)
}

#[tokio::test]
async fn empty_question_is_rejected_before_any_downstream_call() {
    let completion = StubCompletion::replying("SELECT 1;");
    let executor = StubExecutor::returning(vec![]);
    let state = state_with(completion.clone(), executor.clone());

    for question in ["", "   ", "\t\n"] {
        let err = api::generate_only(&state, question).await.unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
        let err = api::generate_and_execute(&state, question).await.unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
    }

    assert_eq!(completion.calls(), 0);
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn generate_only_returns_extracted_sql() {
    let completion = StubCompletion::replying(
        "```sql\nSELECT COUNT(*) FROM customers WHERE revenue > 1000;\n```",
    );
    let executor = StubExecutor::returning(vec![]);
    let state = state_with(completion.clone(), executor.clone());

    let resp = api::generate_only(&state, "How many customers with revenue over 1000?")
        .await
        .unwrap();
    assert_eq!(resp.sql, "SELECT COUNT(*) FROM customers WHERE revenue > 1000;");
    assert_eq!(completion.calls(), 1);
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn generation_failure_never_reaches_the_gateway() {
    let completion = StubCompletion::unavailable();
    let executor = StubExecutor::returning(vec![count_row(2)]);
    let state = state_with(completion.clone(), executor.clone());

    let err = api::generate_and_execute(&state, "How many customers?")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::UpstreamUnavailable(_)));
    assert_eq!(err.status(), 502);
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn prose_only_completion_is_a_generation_failure() {
    let completion = StubCompletion::replying("I'm sorry, I can't write that query.");
    let executor = StubExecutor::returning(vec![count_row(2)]);
    let state = state_with(completion.clone(), executor.clone());

    let err = api::generate_and_execute(&state, "How many customers?")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::GenerationEmpty(_)));
    assert_eq!(err.status(), 502);
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn execute_returns_sql_and_rows() {
    let completion =
        StubCompletion::replying("SELECT COUNT(*) FROM customers WHERE revenue > 1000;");
    let executor = StubExecutor::returning(vec![count_row(2)]);
    let state = state_with(completion.clone(), executor.clone());

    let resp = api::generate_and_execute(&state, "How many customers with revenue over 1000?")
        .await
        .unwrap();
    assert_eq!(resp.sql, "SELECT COUNT(*) FROM customers WHERE revenue > 1000;");
    assert_eq!(resp.rows.len(), 1);
    assert_eq!(resp.rows[0]["count"], serde_json::json!(2));
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn execution_failure_maps_to_500_with_native_message() {
    let completion = StubCompletion::replying("SELECT * FROM widgets;");
    let executor = StubExecutor::failing("relation \"widgets\" does not exist");
    let state = state_with(completion.clone(), executor.clone());

    let err = api::generate_and_execute(&state, "List all widgets")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Execution(_)));
    assert_eq!(err.status(), 500);
    assert!(err.to_string().contains("widgets"));
    // the generated statement is not part of the error body
    let body: serde_json::Value = serde_json::from_str(&api::error_body(&err)).unwrap();
    assert!(body["error"]["sql"].is_null());
    assert_eq!(body["error"]["kind"], "execution");
}

fn post(path: &str, body: &str) -> HttpRequest {
    HttpRequest {
        method: "POST".to_string(),
        path: path.to_string(),
        headers: HashMap::new(),
        body: body.to_string(),
    }
}

fn response_parts(response: &str) -> (u16, serde_json::Value) {
    let status: u16 = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap();
    let body = response.split("\r\n\r\n").nth(1).unwrap_or("");
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(body).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn route_generate_sql_happy_path() {
    let completion =
        StubCompletion::replying("SELECT COUNT(*) FROM customers WHERE revenue > 1000;");
    let executor = StubExecutor::returning(vec![]);
    let state = state_with(completion, executor);

    let response = server::route(
        &state,
        &post("/generate-sql", r#"{"question":"How many customers with revenue over 1000?"}"#),
    )
    .await;
    let (status, body) = response_parts(&response);
    assert_eq!(status, 200);
    assert_eq!(
        body["sql"],
        "SELECT COUNT(*) FROM customers WHERE revenue > 1000;"
    );
}

#[tokio::test]
async fn route_rejects_missing_question_field() {
    let completion = StubCompletion::replying("SELECT 1;");
    let executor = StubExecutor::returning(vec![]);
    let state = state_with(completion.clone(), executor.clone());

    let response = server::route(&state, &post("/generate-sql", r#"{"q":"hello"}"#)).await;
    let (status, body) = response_parts(&response);
    assert_eq!(status, 400);
    assert_eq!(body["error"]["kind"], "validation");
    assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn route_rejects_empty_question_with_400() {
    let completion = StubCompletion::replying("SELECT 1;");
    let executor = StubExecutor::returning(vec![]);
    let state = state_with(completion.clone(), executor.clone());

    let response = server::route(&state, &post("/execute-sql", r#"{"question":"  "}"#)).await;
    let (status, body) = response_parts(&response);
    assert_eq!(status, 400);
    assert_eq!(body["error"]["kind"], "validation");
    assert_eq!(completion.calls(), 0);
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn route_execute_sql_returns_rows() {
    let completion =
        StubCompletion::replying("SELECT COUNT(*) FROM customers WHERE revenue > 1000;");
    let executor = StubExecutor::returning(vec![count_row(2)]);
    let state = state_with(completion, executor);

    let response = server::route(
        &state,
        &post("/execute-sql", r#"{"question":"How many customers with revenue over 1000?"}"#),
    )
    .await;
    let (status, body) = response_parts(&response);
    assert_eq!(status, 200);
    assert_eq!(body["rows"][0]["count"], 2);
}

#[tokio::test]
async fn route_execution_failure_is_500_without_sql_in_body() {
    let completion = StubCompletion::replying("SELECT * FROM widgets;");
    let executor = StubExecutor::failing("relation \"widgets\" does not exist");
    let state = state_with(completion, executor);

    let response = server::route(&state, &post("/execute-sql", r#"{"question":"widgets?"}"#)).await;
    let (status, body) = response_parts(&response);
    assert_eq!(status, 500);
    assert_eq!(body["error"]["kind"], "execution");
    assert!(body.get("sql").is_none());
}

#[tokio::test]
async fn route_unknown_path_is_404() {
    let completion = StubCompletion::replying("SELECT 1;");
    let executor = StubExecutor::returning(vec![]);
    let state = state_with(completion, executor);

    let response = server::route(&state, &post("/nope", "{}")).await;
    let (status, body) = response_parts(&response);
    assert_eq!(status, 404);
    assert_eq!(body["error"]["kind"], "not_found");
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let completion = StubCompletion::replying("SELECT 1;");
    let executor = StubExecutor::returning(vec![]);
    let state = state_with(completion, executor);

    let request = HttpRequest {
        method: "GET".to_string(),
        path: "/health".to_string(),
        headers: HashMap::new(),
        body: String::new(),
    };
    let (status, body) = response_parts(&server::route(&state, &request).await);
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}
