use std::io::Write;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::jobs::handlers;

const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Line-delimited JSON-RPC 2.0 over stdio. Jobs are request-triggered and
/// always answer with structured JSON: a result payload on the happy or
/// partial path, an error object on fatal failure.
pub async fn run_stdio_server() -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = std::io::stdout().lock();

    while let Some(line) = lines.next_line().await.context("read job server stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(response_line) = handle_request_line(&line).await {
            writeln!(stdout, "{response_line}").context("write job server response")?;
            stdout.flush().context("flush job server response")?;
        }
    }

    Ok(())
}

async fn handle_request_line(line: &str) -> Option<String> {
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(error) => {
            return Some(
                jsonrpc_error(None, -32700, "Parse error", Some(json!(error.to_string())))
                    .to_string(),
            );
        }
    };

    if request.jsonrpc != JSONRPC_VERSION {
        return Some(
            jsonrpc_error(
                request.id,
                -32600,
                "Invalid Request",
                Some(json!("jsonrpc must be \"2.0\"")),
            )
            .to_string(),
        );
    }

    let id = request.id.clone();
    let response = match request.method.as_str() {
        "initialize" => jsonrpc_result(
            id,
            json!({
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": {
                    "jobs": {}
                }
            }),
        ),
        "jobs/list" => jsonrpc_result(
            id,
            json!({
                "jobs": handlers::job_schemas()
            }),
        ),
        "jobs/run" => {
            let Some(job_name) = request.params.get("name").and_then(Value::as_str) else {
                return Some(
                    jsonrpc_error(
                        id,
                        -32602,
                        "Invalid params",
                        Some(json!("jobs/run requires params.name")),
                    )
                    .to_string(),
                );
            };

            let arguments = request
                .params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            match handlers::run_job(job_name, arguments).await {
                Ok(result) => jsonrpc_result(id, result),
                Err(failure) => {
                    let mut data = json!({ "error": failure.message });
                    if let (Some(map), Some(details)) = (data.as_object_mut(), failure.details) {
                        map.insert("details".to_string(), details);
                    }
                    jsonrpc_error(id, -32000, "Job execution failed", Some(data))
                }
            }
        }
        _ => jsonrpc_error(
            id,
            -32601,
            "Method not found",
            Some(json!(format!("Unknown method '{}'", request.method))),
        ),
    };

    if response.get("id").is_some_and(Value::is_null) && request.id.is_none() {
        return None;
    }

    Some(response.to_string())
}

fn jsonrpc_result(id: Option<Value>, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id.unwrap_or(Value::Null),
        "result": result
    })
}

fn jsonrpc_error(id: Option<Value>, code: i64, message: &str, data: Option<Value>) -> Value {
    let mut error = json!({
        "code": code,
        "message": message,
    });
    if let Some(data) = data {
        error["data"] = data;
    }

    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id.unwrap_or(Value::Null),
        "error": error
    })
}
