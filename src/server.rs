//! HTTP transport for the agent
//!
//! Hand-rolled HTTP/1.1 on raw tokio, one spawned task per connection so a
//! request blocked on the LLM or the database never stalls the accept loop.
//! Request parsing lives here (not in the binary) so it is testable.

use crate::api::{self, AppState, QueryRequest};
use crate::error::{AgentError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

const MAX_HEAD_BYTES: usize = 16 * 1024;
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Bind and serve until the process is killed.
pub async fn run(state: Arc<AppState>, bind_addr: &str) -> Result<()> {
    let listener = TcpListener::bind(bind_addr).await.map_err(AgentError::Io)?;
    info!(addr = bind_addr, "server listening");

    loop {
        let (stream, addr) = listener.accept().await.map_err(AgentError::Io)?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(state, stream).await {
                warn!(peer = %addr, error = %e, "connection error");
            }
        });
    }
}

async fn handle_connection(state: Arc<AppState>, mut stream: TcpStream) -> std::io::Result<()> {
    let response = match read_request(&mut stream).await? {
        Some(request) => route(&state, &request).await,
        None => create_response(400, r#"{"error":{"kind":"validation","message":"malformed HTTP request"}}"#),
    };
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// Read one request: head until the blank line, then a Content-Length
/// bounded body. Returns None for anything malformed or oversized.
pub async fn read_request<S>(stream: &mut S) -> std::io::Result<Option<HttpRequest>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(pos) = find_blank_line(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Ok(None);
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let Some((method, path, headers)) = parse_head(&head) else {
        return Ok(None);
    };

    let content_length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Ok(None);
    }

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(Some(HttpRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    }))
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Parse the request line and headers. Strips query parameters and a
/// trailing slash from the path.
pub fn parse_head(head: &str) -> Option<(String, String, HashMap<String, String>)> {
    let mut lines = head.lines();
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let raw_path = parts.next()?;

    let mut path = match raw_path.find('?') {
        Some(q) => &raw_path[..q],
        None => raw_path,
    };
    if path.len() > 1 {
        path = path.trim_end_matches('/');
    }
    let path = if path.is_empty() { "/" } else { path }.to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    Some((method, path, headers))
}

pub async fn route(state: &AppState, request: &HttpRequest) -> String {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => {
            create_response(200, r#"{"status":"ok","service":"ai-sql-agent"}"#)
        }
        ("POST", "/generate-sql") => match parse_question(&request.body) {
            Ok(question) => match api::generate_only(state, &question).await {
                Ok(resp) => json_response(200, &resp),
                Err(e) => error_response(&e),
            },
            Err(e) => error_response(&e),
        },
        ("POST", "/execute-sql") => match parse_question(&request.body) {
            Ok(question) => match api::generate_and_execute(state, &question).await {
                Ok(resp) => json_response(200, &resp),
                Err(e) => error_response(&e),
            },
            Err(e) => error_response(&e),
        },
        ("OPTIONS", _) => create_response(200, ""),
        _ => {
            let body = serde_json::json!({
                "error": {
                    "kind": "not_found",
                    "message": format!("no route for {} {}", request.method, request.path),
                }
            });
            create_response(404, &body.to_string())
        }
    }
}

fn parse_question(body: &str) -> Result<String> {
    let request: QueryRequest = serde_json::from_str(body)
        .map_err(|e| AgentError::Validation(format!("invalid request body: {}", e)))?;
    Ok(request.question)
}

fn json_response<T: Serialize>(status: u16, value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(body) => create_response(status, &body),
        Err(e) => {
            error!(error = %e, "failed to serialize response");
            create_response(
                500,
                r#"{"error":{"kind":"json","message":"failed to serialize response"}}"#,
            )
        }
    }
}

fn error_response(err: &AgentError) -> String {
    create_response(err.status(), &api::error_body(err))
}

pub fn create_response(status: u16, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {}",
        status,
        status_text(status),
        body.len(),
        body
    )
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "Unknown",
    }
}
