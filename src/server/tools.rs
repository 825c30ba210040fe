//! The two agent-facing tools and their dispatch.
//!
//! Tool failures never become JSON-RPC errors: an agent gets a normal tool
//! result whose text says what went wrong, and `isError` is set.

use crate::config::ExtractionConfig;
use crate::export::save_results_to_csv;
use crate::extract::extract_and_parse_donations;
use crate::output::{BatchRequest, DonationRecord};
use crate::server::protocol::{Tool, ToolCallResult};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

pub const EXTRACT_TOOL: &str = "extract_and_parse_donations";
pub const SAVE_TOOL: &str = "save_results_to_csv";

/// Tool definitions for `tools/list`. The batch cap is taken from `config`.
pub fn tool_definitions(config: &ExtractionConfig) -> Vec<Tool> {
    vec![
        Tool {
            name: EXTRACT_TOOL.to_string(),
            description: format!(
                "Extract donor name, address, amount and date from scanned donation \
                 receipt PDFs. Returns a JSON array with one record per file, in input \
                 order; failed files carry an \"error\" field. Process at most {} files \
                 per call.",
                config.max_batch_size
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_paths": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Absolute paths to PDF files",
                        "maxItems": config.max_batch_size
                    },
                    "max_pages": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Pages to read per file",
                        "default": config.max_pages
                    }
                },
                "required": ["file_paths"]
            }),
        },
        Tool {
            name: SAVE_TOOL.to_string(),
            description: "Save extracted donation records to a CSV file. Existing files \
                          are overwritten."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "data": {
                        "type": "array",
                        "items": {"type": "object"},
                        "description": "Records returned by extract_and_parse_donations"
                    },
                    "output_file": {
                        "type": "string",
                        "description": "Absolute path of the CSV file to write"
                    }
                },
                "required": ["data", "output_file"]
            }),
        },
    ]
}

/// Run the named tool. Unknown names return `None`.
pub async fn call_tool(
    name: &str,
    arguments: Value,
    config: &ExtractionConfig,
) -> Option<ToolCallResult> {
    match name {
        EXTRACT_TOOL => Some(extract_tool(arguments, config).await),
        SAVE_TOOL => Some(save_tool(arguments).await),
        _ => None,
    }
}

fn error_json(message: impl Into<String>) -> ToolCallResult {
    let body = json!({ "error": message.into() });
    ToolCallResult::error(body.to_string())
}

async fn extract_tool(arguments: Value, config: &ExtractionConfig) -> ToolCallResult {
    let request: BatchRequest = match serde_json::from_value(arguments) {
        Ok(request) => request,
        Err(e) => return error_json(format!("Invalid arguments: {e}")),
    };
    info!(
        "{} called with {} file(s)",
        EXTRACT_TOOL,
        request.file_paths.len()
    );

    match extract_and_parse_donations(&request, config).await {
        Ok(result) => match serde_json::to_string_pretty(&result.records) {
            Ok(text) => ToolCallResult::text(text),
            Err(e) => error_json(format!("Failed to serialise records: {e}")),
        },
        Err(e) => {
            warn!("{} rejected: {}", EXTRACT_TOOL, e);
            error_json(e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct SaveArgs {
    data: Value,
    output_file: String,
}

/// Agents sometimes pass the records as a JSON string instead of an array.
fn records_from_value(data: Value) -> Result<Vec<DonationRecord>, serde_json::Error> {
    match data {
        Value::String(text) => serde_json::from_str(&text),
        other => serde_json::from_value(other),
    }
}

async fn save_tool(arguments: Value) -> ToolCallResult {
    let args: SaveArgs = match serde_json::from_value(arguments) {
        Ok(args) => args,
        Err(e) => return ToolCallResult::error(format!("Error saving CSV: invalid arguments: {e}")),
    };
    let records = match records_from_value(args.data) {
        Ok(records) => records,
        Err(e) => return ToolCallResult::error(format!("Error saving CSV: invalid data: {e}")),
    };
    info!(
        "{} called with {} record(s) for {}",
        SAVE_TOOL,
        records.len(),
        args.output_file
    );

    match save_results_to_csv(&records, &args.output_file).await {
        Ok(summary) => ToolCallResult::text(summary.to_string()),
        Err(e) => {
            warn!("{} failed: {}", SAVE_TOOL, e);
            ToolCallResult::error(format!("Error saving CSV: {e}"))
        }
    }
}
