//! MCP server exposing the search engine as three tools over stdio.
use std::borrow::Cow;
use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ErrorCode, ErrorData, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use tracing::info;

use docseek_core::Error;
use docseek_hybrid::{AttachmentFilter, HierarchyFilter, SearchEngine, SearchRequest, SearchResponse};

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct SearchParams {
    /// Natural-language or keyword query.
    pub query: String,
    /// Maximum number of results (default 10, at most 100).
    #[serde(default)]
    pub limit: Option<usize>,
    /// Restrict to these sources: git, confluence, jira, localfile, publicdocs.
    #[serde(default)]
    pub source_types: Vec<String>,
}

impl SearchParams {
    fn request(&self) -> SearchRequest {
        SearchRequest { query: self.query.clone(), limit: self.limit, source_types: self.source_types.clone() }
    }
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct HierarchySearchParams {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub source_types: Vec<String>,
    /// Keep results at most this many levels below their root.
    #[serde(default)]
    pub max_depth: Option<usize>,
    /// Keep only direct children of this entry id.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Keep only top-level entries.
    #[serde(default)]
    pub root_only: bool,
    /// Keep only entries with (true) or without (false) children.
    #[serde(default)]
    pub has_children: Option<bool>,
    /// Also return results grouped under their root document.
    #[serde(default)]
    pub organize_by_hierarchy: bool,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct AttachmentSearchParams {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub source_types: Vec<String>,
    /// File extension (`pdf`) or MIME type (`application/pdf`).
    #[serde(default)]
    pub file_type: Option<String>,
    /// Minimum file size in bytes.
    #[serde(default)]
    pub min_size: Option<u64>,
    /// Maximum file size in bytes.
    #[serde(default)]
    pub max_size: Option<u64>,
    #[serde(default)]
    pub author: Option<String>,
    /// Keep only attachments of this document id.
    #[serde(default)]
    pub parent_document_id: Option<String>,
}

/// Validation failures are the caller's fault; anything else is ours.
pub fn to_error_data(err: Error) -> ErrorData {
    let code = if err.is_validation() { ErrorCode::INVALID_PARAMS } else { ErrorCode::INTERNAL_ERROR };
    ErrorData { code, message: Cow::from(err.to_string()), data: None }
}

fn respond(response: &SearchResponse) -> Result<CallToolResult, ErrorData> {
    let json = serde_json::to_string_pretty(response).map_err(|e| ErrorData {
        code: ErrorCode::INTERNAL_ERROR,
        message: Cow::from(format!("Failed to serialize response: {e}")),
        data: None,
    })?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[derive(Clone)]
pub struct DocseekMcpServer {
    engine: Arc<SearchEngine>,
    tool_router: ToolRouter<Self>,
}

impl DocseekMcpServer {
    pub fn new(engine: Arc<SearchEngine>) -> Self {
        Self { engine, tool_router: Self::tool_router() }
    }
}

#[tool_router]
impl DocseekMcpServer {
    #[tool(description = "Hybrid semantic + keyword search over the indexed corpus (code, wiki pages, tickets, local files, public docs). Results carry per-signal scores; `degraded` is set when a stage fell back.")]
    pub async fn search(&self, Parameters(params): Parameters<SearchParams>) -> Result<CallToolResult, ErrorData> {
        let response = self.engine.search(params.request()).await.map_err(to_error_data)?;
        respond(&response)
    }

    #[tool(description = "Hybrid search with page-tree context: each result carries its parent, breadcrumb, depth and child count. Filter by depth, parent or root-only, optionally grouped by root document.")]
    pub async fn hierarchy_search(
        &self,
        Parameters(params): Parameters<HierarchySearchParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let req = SearchRequest { query: params.query, limit: params.limit, source_types: params.source_types };
        let filter = HierarchyFilter {
            max_depth: params.max_depth,
            parent_id: params.parent_id,
            root_only: params.root_only,
            has_children: params.has_children,
        };
        let response = self
            .engine
            .hierarchy_search(req, filter, params.organize_by_hierarchy)
            .await
            .map_err(to_error_data)?;
        respond(&response)
    }

    #[tool(description = "Hybrid search restricted to file attachments, with their parent document, filename, size, MIME type and author. Filter by file type, size range, author or parent document.")]
    pub async fn attachment_search(
        &self,
        Parameters(params): Parameters<AttachmentSearchParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let req = SearchRequest { query: params.query, limit: params.limit, source_types: params.source_types };
        let filter = AttachmentFilter {
            file_type: params.file_type,
            min_size: params.min_size,
            max_size: params.max_size,
            author: params.author,
            parent_document_id: params.parent_document_id,
        };
        let response = self.engine.attachment_search(req, filter).await.map_err(to_error_data)?;
        respond(&response)
    }
}

#[tool_handler]
impl ServerHandler for DocseekMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "docseek".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("docseek hybrid retrieval".to_string()),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Use 'search' for general questions, 'hierarchy_search' when page structure matters \
                 and 'attachment_search' to find files attached to documents."
                    .to_string(),
            ),
        }
    }
}

/// Serve on stdio until the client disconnects.
pub async fn run_mcp_server(engine: Arc<SearchEngine>) -> Result<()> {
    use rmcp::transport::stdio;

    let service = DocseekMcpServer::new(engine).serve(stdio()).await.context("Failed to start MCP server")?;
    info!("mcp server ready");
    service.waiting().await?;
    Ok(())
}
