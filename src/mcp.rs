//! MCP server over stdio: newline-delimited JSON-RPC 2.0.
//!
//! Every `tools/call` answers with one text content item holding the tool's
//! JSON response. `isError` is set only when the call never reached a tool
//! (unknown tool, malformed arguments, a panic inside the tool).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};

use crate::git::GitBackend;
use crate::tools::ToolService;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "jar-indexer";

const INSTRUCTIONS: &str = "\
Browse Java/Maven artifact sources.\n\
\n\
Workflow:\n\
1) register_source (or search_cached_artifact to find a local -sources.jar first)\n\
2) index_artifact to materialize the code tree\n\
3) list_folder_tree / search_file_names / search_file_content / get_file to read it\n\
\n\
list_artifacts shows what is stored and each artifact's status.";

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(rename = "jsonrpc")]
    _jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn result(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError { code, message }),
        }
    }
}

/// Serves stdin/stdout until stdin closes.
pub fn run<B: GitBackend>(service: &ToolService<B>) -> io::Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(stdin.lock(), stdout.lock(), service)
}

pub fn serve<B: GitBackend>(input: impl BufRead, mut output: impl Write, service: &ToolService<B>) -> io::Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let req = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(req) => req,
            Err(err) => {
                write_response(&mut output, &JsonRpcResponse::error(None, -32700, format!("parse error: {err}")))?;
                continue;
            }
        };

        // Notifications carry no id and get no response.
        if req.id.is_none() {
            debug!(method = %req.method, "notification");
            continue;
        }

        let resp = handle_request(&req, service);
        write_response(&mut output, &resp)?;
    }
    Ok(())
}

fn write_response(w: &mut impl Write, resp: &JsonRpcResponse) -> io::Result<()> {
    serde_json::to_writer(&mut *w, resp)?;
    w.write_all(b"\n")?;
    w.flush()
}

fn handle_request<B: GitBackend>(req: &JsonRpcRequest, service: &ToolService<B>) -> JsonRpcResponse {
    let id = req.id.clone();
    match req.method.as_str() {
        "initialize" => JsonRpcResponse::result(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                },
                "instructions": INSTRUCTIONS
            }),
        ),
        "ping" => JsonRpcResponse::result(id, json!({})),
        "tools/list" => JsonRpcResponse::result(id, json!({ "tools": tool_definitions() })),
        "tools/call" => handle_tool_call(req, service),
        other => JsonRpcResponse::error(id, -32601, format!("method not found: {other}")),
    }
}

fn handle_tool_call<B: GitBackend>(req: &JsonRpcRequest, service: &ToolService<B>) -> JsonRpcResponse {
    let name = req
        .params
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let args = req.params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| dispatch_tool(service, name, args)))
        .unwrap_or_else(|payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(tool = name, %reason, "tool panicked");
            Err(internal_error(format!("Internal error occurred: {reason}")))
        });

    let (text, is_error) = match outcome {
        Ok(text) => (text, false),
        Err(text) => (text, true),
    };
    JsonRpcResponse::result(
        req.id.clone(),
        json!({
            "content": [{ "type": "text", "text": text }],
            "isError": is_error
        }),
    )
}

fn internal_error(message: String) -> String {
    json!({ "status": "internal_error", "message": message }).to_string()
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| internal_error(format!("invalid arguments: {e}")))
}

fn render<T: Serialize>(response: &T) -> Result<String, String> {
    serde_json::to_string_pretty(response).map_err(|e| internal_error(format!("cannot encode response: {e}")))
}

fn dispatch_tool<B: GitBackend>(service: &ToolService<B>, name: &str, args: Value) -> Result<String, String> {
    match name {
        "register_source" => render(&service.register_source(&parse_args(args)?)),
        "index_artifact" => render(&service.index_artifact(&parse_args(args)?)),
        "list_artifacts" => render(&service.list_artifacts(&parse_args(args)?)),
        "list_folder_tree" => render(&service.list_folder_tree(&parse_args(args)?)),
        "get_file" => render(&service.get_file(&parse_args(args)?)),
        "search_file_names" => render(&service.search_file_names(&parse_args(args)?)),
        "search_file_content" => render(&service.search_file_content(&parse_args(args)?)),
        "search_cached_artifact" => render(&service.search_cached_artifact(&parse_args(args)?)),
        _ => Err(internal_error(format!("unknown tool: {name}"))),
    }
}

fn coordinate_properties() -> serde_json::Map<String, Value> {
    let mut props = serde_json::Map::new();
    props.insert(
        "group_id".into(),
        json!({ "type": "string", "description": "Maven group ID (e.g., 'org.springframework')" }),
    );
    props.insert(
        "artifact_id".into(),
        json!({ "type": "string", "description": "Maven artifact ID (e.g., 'spring-core')" }),
    );
    props.insert(
        "version".into(),
        json!({ "type": "string", "description": "Maven version (e.g., '5.3.21')" }),
    );
    props
}

/// Schema with the three coordinate fields plus `extra`.
fn coordinate_schema(extra: Value, required: &[&str]) -> Value {
    let mut props = coordinate_properties();
    if let Value::Object(more) = extra {
        props.extend(more);
    }
    let mut req = vec!["group_id", "artifact_id", "version"];
    req.extend_from_slice(required);
    json!({ "type": "object", "properties": props, "required": req })
}

fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "register_source",
            "description": "Register a source (local/remote JAR, local directory or git repository) for a Maven artifact.",
            "inputSchema": coordinate_schema(json!({
                "source_uri": { "type": "string", "description": "file://, http(s):// .jar, .git or git@host:path URI" },
                "auto_index": { "type": "boolean", "default": true },
                "git_ref": { "type": "string", "description": "Branch, tag or commit (default: main)" }
            }), &["source_uri"]),
        }),
        json!({
            "name": "index_artifact",
            "description": "Materialize the browsable source tree of a registered artifact.",
            "inputSchema": coordinate_schema(json!({}), &[]),
        }),
        json!({
            "name": "list_artifacts",
            "description": "List stored artifacts with their status, optionally filtered and paginated.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "page": { "type": "integer", "minimum": 1 },
                    "page_size": { "type": "integer", "minimum": 1 },
                    "group_filter": { "type": "string", "description": "group_id prefix" },
                    "artifact_filter": { "type": "string", "description": "artifact_id prefix" },
                    "version_filter": { "type": "string", "description": "e.g. '5.3.21', '>=5.0.0,<6.0.0'" },
                    "status_filter": { "type": "string", "description": "comma-separated labels, e.g. 'source-jar,file-searchable'" }
                }
            },
        }),
        json!({
            "name": "list_folder_tree",
            "description": "Explore the directory structure of an indexed artifact.",
            "inputSchema": coordinate_schema(json!({
                "path": { "type": "string", "default": "" },
                "include_files": { "type": "boolean", "default": false },
                "max_depth": { "type": "integer", "default": 3, "minimum": 1, "maximum": 10 }
            }), &[]),
        }),
        json!({
            "name": "get_file",
            "description": "Retrieve file content from an indexed artifact with an optional line range.",
            "inputSchema": coordinate_schema(json!({
                "file_path": { "type": "string" },
                "start_line": { "type": "integer", "minimum": 1 },
                "end_line": { "type": "integer", "minimum": 1 }
            }), &["file_path"]),
        }),
        json!({
            "name": "search_file_names",
            "description": "Search files by name pattern (recursively) in an indexed artifact.",
            "inputSchema": coordinate_schema(json!({
                "pattern": { "type": "string", "description": "Glob ('*.java') or regex ('^Test.*')" },
                "pattern_type": { "type": "string", "enum": ["glob", "regex"], "default": "glob" },
                "start_path": { "type": "string", "default": "" },
                "max_depth": { "type": "integer", "default": 10, "minimum": 1, "maximum": 20 }
            }), &["pattern"]),
        }),
        json!({
            "name": "search_file_content",
            "description": "Search for content within files of an indexed artifact.",
            "inputSchema": coordinate_schema(json!({
                "query": { "type": "string" },
                "query_type": { "type": "string", "enum": ["string", "regex"], "default": "string" },
                "start_path": { "type": "string", "default": "" },
                "max_depth": { "type": "integer", "default": 10, "minimum": 1, "maximum": 20 },
                "context_before": { "type": "integer", "default": 2, "minimum": 0, "maximum": 10 },
                "context_after": { "type": "integer", "default": 2, "minimum": 0, "maximum": 10 },
                "max_results": { "type": "integer", "default": 100, "minimum": 1, "maximum": 1000 }
            }), &["query"]),
        }),
        json!({
            "name": "search_cached_artifact",
            "description": "Search for source JAR files in Maven/Gradle local repository caches.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "group_id": { "type": "string" },
                    "artifact_id": { "type": "string" },
                    "version_filter": { "type": "string", "description": "e.g. '5.3.21', '>=5.3.0', '>=5.0.0,<6.0.0'" },
                    "cache": { "type": "string", "default": "maven,gradle" }
                },
                "required": ["group_id", "artifact_id"]
            },
        }),
    ]
}
