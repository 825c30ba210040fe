//! MCP tool server over newline-delimited JSON-RPC.
//!
//! Exposes `extract_and_parse_donations` and `save_results_to_csv` to an
//! agent host. Requests are handled one at a time in arrival order. Logging
//! goes through `tracing`; the binary routes it to stderr so stdout carries
//! protocol traffic only.

pub mod protocol;
pub mod tools;
pub mod transport;

use crate::config::ExtractionConfig;
use protocol::*;
use serde_json::{json, Value};
use std::io;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader, Stdin, Stdout};
use tracing::{debug, info, warn};
use transport::{Inbound, LineTransport};

pub const SERVER_NAME: &str = "dvac-donations";

pub struct McpServer<R, W> {
    transport: LineTransport<R, W>,
    config: ExtractionConfig,
    initialized: bool,
}

impl McpServer<BufReader<Stdin>, Stdout> {
    pub fn stdio(config: ExtractionConfig) -> Self {
        Self::new(LineTransport::stdio(), config)
    }
}

impl<R, W> McpServer<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(transport: LineTransport<R, W>, config: ExtractionConfig) -> Self {
        Self {
            transport,
            config,
            initialized: false,
        }
    }

    pub fn into_transport(self) -> LineTransport<R, W> {
        self.transport
    }

    /// Serve until the peer closes its end.
    pub async fn run(&mut self) -> io::Result<()> {
        info!("MCP server ready");
        while let Some(inbound) = self.transport.read_message().await? {
            match inbound {
                Inbound::Request(request) => self.handle_request(request).await?,
                Inbound::Malformed(detail) => {
                    warn!("Unreadable message: {}", detail);
                    let response =
                        JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {detail}"));
                    self.transport.write_response(&response).await?;
                }
            }
        }
        info!("Client disconnected");
        Ok(())
    }

    async fn handle_request(&mut self, request: JsonRpcRequest) -> io::Result<()> {
        debug!("Received {}", request.method);

        let Some(id) = request.id.clone() else {
            self.handle_notification(&request);
            return Ok(());
        };

        let response = match self.dispatch(&request.method, request.params).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err((code, message)) => JsonRpcResponse::error(Some(id), code, message),
        };
        self.transport.write_response(&response).await
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => debug!("Client finished initialisation"),
            "notifications/cancelled" => debug!("Received cancellation notification"),
            other => debug!("Ignoring notification: {}", other),
        }
    }

    async fn dispatch(&mut self, method: &str, params: Value) -> Result<Value, (i32, String)> {
        match method {
            "initialize" => self.handle_initialize(params),
            "ping" => Ok(json!({})),
            "tools/list" | "tools/call" if !self.initialized => {
                Err((INVALID_REQUEST, "Server not initialized".to_string()))
            }
            "tools/list" => to_value(ToolsListResult {
                tools: tools::tool_definitions(&self.config),
            }),
            "tools/call" => self.handle_tool_call(params).await,
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {other}"))),
        }
    }

    fn handle_initialize(&mut self, params: Value) -> Result<Value, (i32, String)> {
        let params: InitializeParams = if params.is_null() {
            InitializeParams::default()
        } else {
            serde_json::from_value(params)
                .map_err(|e| (INVALID_PARAMS, format!("Invalid initialize params: {e}")))?
        };
        if let Some(ref client) = params.client_info {
            info!("Initialising for {} {}", client.name, client.version);
        }

        self.initialized = true;
        to_value(InitializeResult {
            protocol_version: params
                .protocol_version
                .unwrap_or_else(|| PROTOCOL_VERSION.to_string()),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })
    }

    async fn handle_tool_call(&mut self, params: Value) -> Result<Value, (i32, String)> {
        let call: ToolCallParams = serde_json::from_value(params)
            .map_err(|e| (INVALID_PARAMS, format!("Invalid tool call params: {e}")))?;

        match tools::call_tool(&call.name, call.arguments, &self.config).await {
            Some(result) => to_value(result),
            None => Err((INVALID_PARAMS, format!("Unknown tool: {}", call.name))),
        }
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, (i32, String)> {
    serde_json::to_value(value).map_err(|e| (INTERNAL_ERROR, e.to_string()))
}
