//! MCP stdio server exposing the four scraping tools to external agents.
//!
//! Each MCP tool forwards to the same [`ToolBox`] the built-in agent uses,
//! so sandboxing and artifact naming are identical on both paths.

use std::sync::Arc;

use rmcp::{
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::builtins::{read_file, run_script, save_content, scrape_url};
use crate::tools::ToolBox;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ScrapeUrlArgs {
    /// URL of the page to download (http or https).
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SaveContentArgs {
    /// Text to write.
    pub content: String,
    /// File extension without the dot, e.g. "py" or "json". Default "txt".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReadFileArgs {
    /// Absolute path of a file created by another tool.
    pub file_path: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExecuteScriptArgs {
    /// Absolute path of the script to run.
    pub script_path_file: String,
    /// Optional text passed on stdin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Extension of the stdout file. Default "txt".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_extension: Option<String>,
}

/// MCP server backed by a [`ToolBox`].
#[derive(Clone)]
pub struct ScrapeToolServer {
    tool_router: ToolRouter<Self>,
    toolbox: Arc<ToolBox>,
}

#[tool_router]
impl ScrapeToolServer {
    pub fn new(toolbox: Arc<ToolBox>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            toolbox,
        }
    }

    /// Run a toolbox tool and wrap the outcome for MCP. Tool failures are
    /// reported as error results, not protocol errors.
    async fn forward(&self, name: &str, args: impl Serialize) -> Result<CallToolResult, McpError> {
        let args = serde_json::to_value(args)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        tracing::debug!(tool = name, "mcp tool call");
        match self.toolbox.call(name, args).await {
            Ok(Value::String(s)) => Ok(CallToolResult::success(vec![Content::text(s)])),
            Ok(other) => Ok(CallToolResult::success(vec![Content::text(other.to_string())])),
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "mcp tool failed");
                Ok(CallToolResult::error(vec![Content::text(format!("Error: {e}"))]))
            }
        }
    }

    #[tool(description = "Download a web page, strip scripts and styles, and save the HTML to a new file. Returns the file path.")]
    async fn scrape_url_to_file(
        &self,
        Parameters(args): Parameters<ScrapeUrlArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.forward(scrape_url::NAME, args).await
    }

    #[tool(description = "Save text content to a new file with the given extension. Returns the file path.")]
    async fn save_content_to_file(
        &self,
        Parameters(args): Parameters<SaveContentArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.forward(save_content::NAME, args).await
    }

    #[tool(description = "Read and return the content of a file created by the other tools.")]
    async fn read_file_content(
        &self,
        Parameters(args): Parameters<ReadFileArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.forward(read_file::NAME, args).await
    }

    #[tool(description = "Execute a Python script file with optional stdin input and save its stdout to a new file.")]
    async fn execute_python_script_from_file(
        &self,
        Parameters(args): Parameters<ExecuteScriptArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.forward(run_script::NAME, args).await
    }
}

#[tool_handler]
impl rmcp::ServerHandler for ScrapeToolServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Web scraping tools. Files are created in a sandboxed artifacts directory; pass the returned paths to the other tools."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Serve the tools over stdin/stdout until the client disconnects.
pub async fn serve_stdio(toolbox: Arc<ToolBox>) -> anyhow::Result<()> {
    tracing::info!("mcp tool server listening on stdio");
    let running = ScrapeToolServer::new(toolbox)
        .serve(stdio())
        .await
        .map_err(|e| anyhow::anyhow!("mcp server failed to start: {e}"))?;
    running
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("mcp server stopped abnormally: {e}"))?;
    tracing::info!("mcp client disconnected");
    Ok(())
}
