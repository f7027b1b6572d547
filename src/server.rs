//! MCP server over stdio: JSON-RPC 2.0, one message per line.
//!
//! Requests are read from stdin, dispatched to the [`ToolRouter`] and
//! answered on stdout. Logging goes to stderr.
//!
//! Session:
//! 1. `initialize` → capabilities
//! 2. `notifications/initialized`
//! 3. `tools/list` → preview, apply, undo, progress
//! 4. `tools/call` → tool result; tool failures come back as `isError`
//! 5. stdin closed → exit
//!
//! The router owns the [`Engine`], so a preview and the apply that follows
//! it share state for the lifetime of the process.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::tools::ToolRouter;

/// Upper bound on one request line (10 MiB); a directive batch is plain JSON.
const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

const PROTOCOL_VERSION: &str = "2025-06-18";

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<serde_json::Value>,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// MCP protocol types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfo {
    name: String,
    version: String,
}

#[derive(Debug, Serialize)]
struct ServerCapabilities {
    tools: ToolsCapability,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolsCapability {
    list_changed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    protocol_version: String,
    capabilities: ServerCapabilities,
    server_info: ServerInfo,
}

/// Entry of the `tools/list` result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ToolsListResult {
    tools: Vec<ToolDefinition>,
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// Result of `tools/call`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub content: Vec<ContentItem>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem {
                content_type: "text".to_owned(),
                text: text.into(),
            }],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(text)
        }
    }

    /// First text item, for logging and tests.
    pub fn first_text(&self) -> &str {
        self.content.first().map_or("", |c| c.text.as_str())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Root that every `documentPath` must stay inside.
    pub workspace: PathBuf,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
        }
    }
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

/// Serve MCP on stdin/stdout until stdin closes.
///
/// # Errors
///
/// Returns an error if stdin/stdout I/O fails fatally.
pub fn run_mcp_server(config: McpServerConfig, engine: Engine) -> Result<()> {
    info!(
        workspace = %config.workspace.display(),
        semantic = engine.has_semantic(),
        "oa-bulkfix MCP server starting"
    );

    let mut router = ToolRouter::new(config.workspace, engine);
    let stdin = std::io::stdin();
    let mut reader = std::io::BufReader::new(stdin.lock());
    let mut stdout = std::io::stdout().lock();
    let mut line = Vec::new();

    loop {
        line.clear();
        let response = match read_line_limited(&mut reader, &mut line, MAX_LINE_BYTES)
            .context("failed to read from stdin")?
        {
            LineRead::Eof => {
                info!("stdin closed, shutting down");
                break;
            }
            LineRead::TooLong => {
                warn!(max_bytes = MAX_LINE_BYTES, "request line too long, dropped");
                Some(error_response(
                    None,
                    -32600,
                    &format!("request exceeds maximum size ({MAX_LINE_BYTES} bytes)"),
                ))
            }
            LineRead::Line => handle_raw_line(&mut router, &line),
        };

        if let Some(response) = response {
            write_response(&mut stdout, &response)?;
        }
    }

    info!("oa-bulkfix MCP server stopped");
    Ok(())
}

/// Decode one raw request line and dispatch it.
///
/// Blank lines and notifications yield `None`. Invalid UTF-8 is answered
/// with a parse error; the session keeps running.
pub fn handle_raw_line(router: &mut ToolRouter, raw: &[u8]) -> Option<JsonRpcResponse> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim(),
        Err(e) => {
            warn!(error = %e, "non-UTF-8 request line");
            return Some(error_response(
                None,
                -32700,
                &format!("parse error: request is not valid UTF-8: {e}"),
            ));
        }
    };
    if line.is_empty() {
        return None;
    }
    debug!(raw = line, "received request");
    handle_line(router, line)
}

/// Parse and dispatch one request line. `None` for notifications.
pub fn handle_line(router: &mut ToolRouter, line: &str) -> Option<JsonRpcResponse> {
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "invalid JSON-RPC request");
            return Some(error_response(None, -32700, &format!("parse error: {e}")));
        }
    };

    if request.jsonrpc != "2.0" {
        warn!(version = request.jsonrpc, "invalid JSON-RPC version");
        return Some(error_response(
            request.id,
            -32600,
            &format!(
                "invalid request: jsonrpc version must be \"2.0\", got \"{}\"",
                request.jsonrpc
            ),
        ));
    }

    let response = dispatch(router, &request);
    if request.id.is_none() {
        debug!(method = request.method, "notification handled");
        return None;
    }
    response
}

fn dispatch(router: &mut ToolRouter, req: &JsonRpcRequest) -> Option<JsonRpcResponse> {
    match req.method.as_str() {
        "initialize" => Some(handle_initialize(req)),
        "notifications/initialized" => {
            info!("client initialized");
            None
        }
        "tools/list" => Some(success_response(
            req.id.clone(),
            &ToolsListResult {
                tools: router.list_tools(),
            },
        )),
        "tools/call" => Some(handle_tools_call(router, req)),
        "ping" => Some(success_response(req.id.clone(), &serde_json::json!({}))),
        _ => {
            warn!(method = req.method, "unknown method");
            Some(error_response(
                req.id.clone(),
                -32601,
                &format!("method not found: {}", req.method),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn handle_initialize(req: &JsonRpcRequest) -> JsonRpcResponse {
    let result = InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_owned(),
        capabilities: ServerCapabilities {
            tools: ToolsCapability {
                list_changed: false,
            },
        },
        server_info: ServerInfo {
            name: "oa-bulkfix".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        },
    };
    success_response(req.id.clone(), &result)
}

fn handle_tools_call(router: &mut ToolRouter, req: &JsonRpcRequest) -> JsonRpcResponse {
    let params: ToolCallParams = match serde_json::from_value(req.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            return error_response(
                req.id.clone(),
                -32602,
                &format!("invalid tools/call params: {e}"),
            );
        }
    };

    match router.call_tool(&params.name, params.arguments) {
        Ok(result) => success_response(req.id.clone(), &result),
        Err(e) => {
            error!(tool = params.name, error = %e, "tool call failed");
            success_response(req.id.clone(), &ToolCallResult::error(format!("Error: {e:#}")))
        }
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn success_response(id: Option<serde_json::Value>, result: &impl Serialize) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(v) => JsonRpcResponse {
            jsonrpc: "2.0".to_owned(),
            id,
            result: Some(v),
            error: None,
        },
        Err(e) => {
            error!(error = %e, "failed to serialize result");
            error_response(id, -32603, &format!("internal error: failed to serialize result: {e}"))
        }
    }
}

fn error_response(id: Option<serde_json::Value>, code: i64, message: &str) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_owned(),
        id,
        result: None,
        error: Some(JsonRpcError {
            code,
            message: message.to_owned(),
            data: None,
        }),
    }
}

fn write_response(out: &mut impl Write, resp: &JsonRpcResponse) -> Result<()> {
    let json = serde_json::to_string(resp).context("failed to serialize response")?;
    debug!(response = json, "sending response");
    out.write_all(json.as_bytes())
        .context("failed to write to stdout")?;
    out.write_all(b"\n").context("failed to write to stdout")?;
    out.flush().context("failed to flush stdout")
}

/// Outcome of [`read_line_limited`].
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    Eof,
    Line,
    /// The line was longer than the limit and has been discarded.
    TooLong,
}

/// Read one raw line (newline included) into `buf`.
///
/// Bytes are collected across buffer refills and decoded by the caller, so a
/// multi-byte character split between two reads stays intact. An oversized
/// line is drained up to its newline so the next read starts on a fresh
/// message.
fn read_line_limited(reader: &mut impl BufRead, buf: &mut Vec<u8>, max_bytes: usize) -> Result<LineRead> {
    loop {
        let available = reader.fill_buf().context("stdin fill_buf failed")?;
        if available.is_empty() {
            return Ok(if buf.is_empty() { LineRead::Eof } else { LineRead::Line });
        }
        let (take, newline) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };

        if buf.len() + take > max_bytes {
            reader.consume(take);
            if !newline {
                drain_line(reader)?;
            }
            buf.clear();
            return Ok(LineRead::TooLong);
        }

        buf.extend_from_slice(&available[..take]);
        reader.consume(take);
        if newline {
            return Ok(LineRead::Line);
        }
    }
}

fn drain_line(reader: &mut impl BufRead) -> Result<()> {
    loop {
        let rest = reader.fill_buf().context("stdin fill_buf failed")?;
        if rest.is_empty() {
            return Ok(());
        }
        if let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let n = rest.len();
        reader.consume(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_line_limited() {
        let mut input = std::io::Cursor::new(b"{\"a\":1}\nnext\n".to_vec());
        let mut buf = Vec::new();
        assert_eq!(read_line_limited(&mut input, &mut buf, 64).expect("read"), LineRead::Line);
        assert_eq!(buf, b"{\"a\":1}\n");
    }

    #[test]
    fn test_oversized_line_is_drained() {
        let mut input = std::io::Cursor::new(b"0123456789\nok\n".to_vec());
        let mut buf = Vec::new();
        assert_eq!(read_line_limited(&mut input, &mut buf, 4).expect("read"), LineRead::TooLong);
        assert!(buf.is_empty());
        assert_eq!(read_line_limited(&mut input, &mut buf, 4).expect("next line"), LineRead::Line);
        assert_eq!(buf, b"ok\n");
        buf.clear();
        assert_eq!(read_line_limited(&mut input, &mut buf, 4).expect("eof"), LineRead::Eof);
    }

    #[test]
    fn test_multibyte_char_across_refills() {
        // The em dash straddles the 8-byte buffer boundary.
        let data = "aaaaaaa\u{2014}x\n".as_bytes();
        let mut reader = std::io::BufReader::with_capacity(8, data);
        let mut buf = Vec::new();
        assert_eq!(read_line_limited(&mut reader, &mut buf, 64).expect("read"), LineRead::Line);
        assert_eq!(std::str::from_utf8(&buf).expect("utf-8"), "aaaaaaa\u{2014}x\n");
    }

    #[test]
    fn test_final_line_without_newline() {
        let mut input = std::io::Cursor::new(b"tail".to_vec());
        let mut buf = Vec::new();
        assert_eq!(read_line_limited(&mut input, &mut buf, 64).expect("read"), LineRead::Line);
        assert_eq!(buf, b"tail");
    }

    #[test]
    fn test_invalid_utf8_line_is_answered() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut router = ToolRouter::new(dir.path().to_path_buf(), Engine::new());
        let resp = handle_raw_line(&mut router, b"{\"jsonrpc\":\"2.0\",\"id\":1,\xff}\n")
            .expect("response");
        assert_eq!(resp.error.expect("error").code, -32700);
        assert!(handle_raw_line(&mut router, b"  \n").is_none());

        let ping = handle_raw_line(&mut router, b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n")
            .expect("response");
        assert!(ping.error.is_none());
    }
}
