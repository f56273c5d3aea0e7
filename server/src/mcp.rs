//! MCP-style JSON-RPC 2.0 over stdio.
//!
//! One message per line on stdin, one response per line on stdout. Requests
//! are handled concurrently; responses are written as they complete, so a
//! long step on one session never holds up calls on another.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ToolError;
use crate::tools::{call_tool, catalogue};
use crate::AppState;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

fn success(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn failure(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message.into()}})
}

/// Wrap a tool outcome as an MCP `tools/call` result.
fn tool_result(payload: &Value, is_error: bool) -> Value {
    json!({
        "content": [{"type": "text", "text": payload.to_string()}],
        "structuredContent": payload,
        "isError": is_error,
    })
}

async fn call(state: &Arc<AppState>, id: Value, params: &Value) -> Value {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return failure(id, INVALID_PARAMS, "tools/call requires a string 'name'");
    };
    let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
    match call_tool(Arc::clone(state), name, args).await {
        Ok(payload) => success(id, tool_result(&payload, false)),
        Err(ToolError::UnknownTool(name)) => {
            failure(id, INVALID_PARAMS, format!("unknown tool '{}'", name))
        }
        Err(e) => {
            debug!(tool = name, kind = %e.kind(), "tool call failed");
            success(id, tool_result(&e.payload(), true))
        }
    }
}

/// Handle one decoded JSON-RPC message. Notifications yield no response.
pub async fn handle_message(state: &Arc<AppState>, message: Value) -> Option<Value> {
    let id = message.get("id").cloned();
    let Some(method) = message.get("method").and_then(Value::as_str) else {
        return Some(failure(id.unwrap_or(Value::Null), INVALID_REQUEST, "missing 'method'"));
    };

    let Some(id) = id else {
        match method {
            "notifications/initialized" => info!("client initialized"),
            other => debug!(method = other, "ignoring notification"),
        }
        return None;
    };

    let params = message.get("params").cloned().unwrap_or(Value::Null);
    let response = match method {
        "initialize" => success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {"listChanged": false}},
                "serverInfo": {"name": "arbor", "version": env!("CARGO_PKG_VERSION")},
            }),
        ),
        "ping" => success(id, json!({})),
        "tools/list" => success(id, json!({ "tools": catalogue() })),
        "tools/call" => call(state, id, &params).await,
        other => failure(id, METHOD_NOT_FOUND, format!("method '{}' not found", other)),
    };
    Some(response)
}

/// Decode one input line, which may hold a single message or a batch.
pub async fn handle_line(state: &Arc<AppState>, line: &str) -> Option<Value> {
    let message: Value = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => return Some(failure(Value::Null, PARSE_ERROR, format!("parse error: {}", e))),
    };
    match message {
        Value::Array(batch) if batch.is_empty() => {
            Some(failure(Value::Null, INVALID_REQUEST, "empty batch"))
        }
        Value::Array(batch) => {
            let mut responses = Vec::with_capacity(batch.len());
            for message in batch {
                if let Some(response) = handle_message(state, message).await {
                    responses.push(response);
                }
            }
            (!responses.is_empty()).then(|| Value::Array(responses))
        }
        message => handle_message(state, message).await,
    }
}

/// Serve until stdin closes.
pub async fn serve_stdio(state: Arc<AppState>) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = rx.recv().await {
            let mut line = response.to_string();
            line.push('\n');
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                warn!("Failed to write response: {}", e);
                break;
            }
            if let Err(e) = stdout.flush().await {
                warn!("Failed to flush stdout: {}", e);
                break;
            }
        }
    });

    info!("Serving MCP over stdio");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let state = Arc::clone(&state);
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(response) = handle_line(&state, &line).await {
                // The writer only stops once every sender is gone
                let _ = tx.send(response);
            }
        });
    }

    info!("stdin closed, waiting for in-flight requests");
    drop(tx);
    writer.await?;
    Ok(())
}
