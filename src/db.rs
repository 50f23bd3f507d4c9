//! Database gateway for executing generated SQL against PostgreSQL
//!
//! The gateway treats statements as opaque text. The one policy it does
//! enforce is read-only execution: the statement must parse as a single
//! SELECT-shaped query before it touches the pool.

use crate::error::{AgentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row, TypeInfo};
use tracing::{info, warn};

pub type JsonRow = serde_json::Map<String, Value>;

/// Seam between the request handler and the store.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<Vec<JsonRow>>;
}

/// Connect a pool up front so startup fails loudly when the store is down.
pub async fn connect_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|e| AgentError::Connection(format!("failed to connect to database: {}", e)))?;
    info!("database pool established");
    Ok(pool)
}

pub struct DbGateway {
    pool: PgPool,
}

impl DbGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SqlExecutor for DbGateway {
    /// Execute one statement and materialize every row before returning.
    async fn execute(&self, sql: &str) -> Result<Vec<JsonRow>> {
        if sql.trim().is_empty() {
            return Err(AgentError::Validation("sql must not be empty".to_string()));
        }
        ensure_read_only(sql)?;

        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;

        Ok(rows.iter().map(row_to_json).collect())
    }
}

/// Accept only a single SELECT-shaped query. Model-generated SQL is
/// untrusted input; anything that mutates state is rejected before it
/// reaches the pool.
pub fn ensure_read_only(sql: &str) -> Result<()> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| AgentError::Execution(format!("generated SQL failed syntax check: {}", e)))?;

    match statements.as_slice() {
        [Statement::Query(_)] => Ok(()),
        [] => Err(AgentError::Execution("empty statement".to_string())),
        [_] => Err(AgentError::Execution(
            "only SELECT statements are allowed".to_string(),
        )),
        _ => Err(AgentError::Execution(
            "expected exactly one statement".to_string(),
        )),
    }
}

/// Split transport problems from statement problems so the handler can map
/// them to different responses.
fn classify_sqlx_error(e: sqlx::Error) -> AgentError {
    match e {
        sqlx::Error::Database(db) => AgentError::Execution(db.message().to_string()),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Protocol(_) => AgentError::Connection(e.to_string()),
        other => AgentError::Execution(other.to_string()),
    }
}

/// Decode a row into an ordered column-name → JSON value map. Types outside
/// the demo set decode as null rather than failing the whole request.
fn row_to_json(row: &PgRow) -> JsonRow {
    let mut map = JsonRow::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, i, column.type_info().name());
        map.insert(column.name().to_string(), value);
    }
    map
}

fn decode_column(row: &PgRow, i: usize, type_name: &str) -> Value {
    match type_name {
        "BOOL" => opt_value(row.try_get::<Option<bool>, _>(i).map(|v| v.map(Value::Bool))),
        "INT2" => opt_value(
            row.try_get::<Option<i16>, _>(i)
                .map(|v| v.map(|n| Value::Number(n.into()))),
        ),
        "INT4" => opt_value(
            row.try_get::<Option<i32>, _>(i)
                .map(|v| v.map(|n| Value::Number(n.into()))),
        ),
        "INT8" => opt_value(
            row.try_get::<Option<i64>, _>(i)
                .map(|v| v.map(|n| Value::Number(n.into()))),
        ),
        "FLOAT4" => opt_value(
            row.try_get::<Option<f32>, _>(i)
                .map(|v| v.and_then(|n| serde_json::Number::from_f64(n as f64).map(Value::Number))),
        ),
        "FLOAT8" => opt_value(
            row.try_get::<Option<f64>, _>(i)
                .map(|v| v.and_then(|n| serde_json::Number::from_f64(n).map(Value::Number))),
        ),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => opt_value(
            row.try_get::<Option<String>, _>(i)
                .map(|v| v.map(Value::String)),
        ),
        "DATE" => opt_value(
            row.try_get::<Option<NaiveDate>, _>(i)
                .map(|v| v.map(|d| Value::String(d.to_string()))),
        ),
        "TIMESTAMP" => opt_value(
            row.try_get::<Option<NaiveDateTime>, _>(i)
                .map(|v| v.map(|t| Value::String(t.to_string()))),
        ),
        "TIMESTAMPTZ" => opt_value(
            row.try_get::<Option<DateTime<Utc>>, _>(i)
                .map(|v| v.map(|t| Value::String(t.to_rfc3339()))),
        ),
        other => {
            warn!(column_type = other, "unsupported column type, returning null");
            Value::Null
        }
    }
}

fn opt_value(decoded: std::result::Result<Option<Value>, sqlx::Error>) -> Value {
    match decoded {
        Ok(Some(v)) => v,
        Ok(None) => Value::Null,
        Err(e) => {
            warn!(error = %e, "failed to decode column, returning null");
            Value::Null
        }
    }
}
