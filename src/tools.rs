//! Tool router: dispatches agent tool calls onto the blob, docs, and
//! datetime collaborators.
//!
//! Tool failures are serialized into the tool result (`{"error": ...}`)
//! instead of thrown, so agents can quote "got error:" evidence and the
//! conversation keeps moving.

use crate::clock::Clock;
use crate::docs::DocsLookup;
use crate::history::ToolCall;
use crate::storage::BlobStore;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

pub const TOOL_LIST_BLOBS: &str = "list_blobs_in_container";
pub const TOOL_FIND_BLOBS: &str = "find_blobs";
pub const TOOL_CHECK_BLOB_EXISTS: &str = "check_blob_exists";
pub const TOOL_READ_BLOB_CONTENT: &str = "read_blob_content";
pub const TOOL_SAVE_CONTENT: &str = "save_content_to_blob";
pub const TOOL_DOCS_SEARCH: &str = "microsoft_docs_search";
pub const TOOL_DATETIME_NOW: &str = "datetime_now";

/// All tool names, for prompt rendering.
pub const ALL_TOOLS: &[&str] = &[
    TOOL_LIST_BLOBS,
    TOOL_FIND_BLOBS,
    TOOL_CHECK_BLOB_EXISTS,
    TOOL_READ_BLOB_CONTENT,
    TOOL_SAVE_CONTENT,
    TOOL_DOCS_SEARCH,
    TOOL_DATETIME_NOW,
];

#[derive(Debug, Deserialize)]
struct ListArgs {
    #[serde(default)]
    container_name: Option<String>,
    folder_path: String,
    #[serde(default)]
    recursive: bool,
}

#[derive(Debug, Deserialize)]
struct FindArgs {
    pattern: String,
    #[serde(default)]
    container_name: Option<String>,
    folder_path: String,
}

#[derive(Debug, Deserialize)]
struct BlobNameArgs {
    name: String,
    #[serde(default)]
    container_name: Option<String>,
    folder_path: String,
}

#[derive(Debug, Deserialize)]
struct SaveArgs {
    name: String,
    content: String,
    #[serde(default)]
    container_name: Option<String>,
    folder_path: String,
}

#[derive(Debug, Deserialize)]
struct DocsArgs {
    query: String,
}

/// Per-phase tool dispatcher bound to the request's container.
pub struct ToolRouter {
    blob: Arc<dyn BlobStore>,
    docs: Arc<dyn DocsLookup>,
    clock: Arc<dyn Clock>,
    default_container: String,
}

impl ToolRouter {
    pub fn new(
        blob: Arc<dyn BlobStore>,
        docs: Arc<dyn DocsLookup>,
        clock: Arc<dyn Clock>,
        default_container: &str,
    ) -> Self {
        Self {
            blob,
            docs,
            clock,
            default_container: default_container.to_string(),
        }
    }

    /// Execute one tool call and serialize its outcome. Always returns
    /// a JSON string; errors come back as `{"error": "..."}`.
    pub async fn dispatch(&self, call: &ToolCall) -> String {
        debug!(tool = %call.name, "dispatching tool call");
        let outcome = self.try_dispatch(call).await;
        match outcome {
            Ok(value) => value.to_string(),
            Err(message) => json!({ "error": message }).to_string(),
        }
    }

    async fn try_dispatch(&self, call: &ToolCall) -> Result<Value, String> {
        match call.name.as_str() {
            TOOL_LIST_BLOBS => {
                let args: ListArgs = parse_args(&call.arguments)?;
                let container = self.container(&args.container_name);
                let entries = self
                    .blob
                    .list_blobs(&container, &args.folder_path, args.recursive)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(serde_json::to_value(entries).map_err(|e| e.to_string())?)
            }
            TOOL_FIND_BLOBS => {
                let args: FindArgs = parse_args(&call.arguments)?;
                let container = self.container(&args.container_name);
                let names = self
                    .blob
                    .find_blobs(&args.pattern, &container, &args.folder_path)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(json!(names))
            }
            TOOL_CHECK_BLOB_EXISTS => {
                let args: BlobNameArgs = parse_args(&call.arguments)?;
                let container = self.container(&args.container_name);
                let exists = self
                    .blob
                    .check_blob_exists(&args.name, &container, &args.folder_path)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "name": args.name, "exists": exists }))
            }
            TOOL_READ_BLOB_CONTENT => {
                let args: BlobNameArgs = parse_args(&call.arguments)?;
                let container = self.container(&args.container_name);
                let content = self
                    .blob
                    .read_blob_content(&args.name, &container, &args.folder_path)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "name": args.name, "content": content }))
            }
            TOOL_SAVE_CONTENT => {
                let args: SaveArgs = parse_args(&call.arguments)?;
                let container = self.container(&args.container_name);
                self.blob
                    .save_content_to_blob(&args.name, &args.content, &container, &args.folder_path)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "name": args.name, "saved": true }))
            }
            TOOL_DOCS_SEARCH => {
                let args: DocsArgs = parse_args(&call.arguments)?;
                let articles = self.docs.search(&args.query).await.map_err(|e| e.to_string())?;
                Ok(serde_json::to_value(articles).map_err(|e| e.to_string())?)
            }
            TOOL_DATETIME_NOW => Ok(json!({ "utc": self.clock.now().to_rfc3339() })),
            unknown => Err(format!("unknown tool '{unknown}'")),
        }
    }

    fn container(&self, requested: &Option<String>) -> String {
        requested
            .clone()
            .unwrap_or_else(|| self.default_container.clone())
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: &Value) -> Result<T, String> {
    serde_json::from_value(arguments.clone()).map_err(|e| format!("invalid arguments: {e}"))
}
