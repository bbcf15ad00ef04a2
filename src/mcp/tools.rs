//! Tool adapter: manifest operations exposed as MCP tools.
//!
//! Every operation becomes one flat tool named after its path with `/`
//! replaced by `_`. One more tool, [`API_REQUEST_TOOL`], bypasses the
//! manifest and sends a caller-described request as-is.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::api::{ApiClient, ApiRequest};
use crate::error::CommandError;
use crate::manifest::{tool_name, Field, FieldKind, HttpMethod, Manifest, Operation, Switch};
use crate::output::pretty_json;
use crate::request::{self, args, RuntimeContext};

/// Name of the built-in raw request tool.
pub const API_REQUEST_TOOL: &str = "api_request";

/// A tool definition for the `tools/list` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Lists the built-in raw request tool followed by one tool per operation,
/// in manifest order.
#[must_use]
pub fn tool_definitions(manifest: &Manifest) -> Vec<ToolDefinition> {
    std::iter::once(api_request_definition())
        .chain(manifest.operations.iter().map(operation_definition))
        .collect()
}

fn api_request_definition() -> ToolDefinition {
    ToolDefinition {
        name: API_REQUEST_TOOL.to_string(),
        description: Some(
            "Make an arbitrary HTTP request to the RunOS API. Use this to test endpoints, \
             debug API calls, or make requests not covered by other tools. Returns status \
             code and response body."
                .to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "method": {
                    "type": "string",
                    "description": "HTTP method (GET, POST, PUT, PATCH, DELETE)",
                    "enum": ["GET", "POST", "PUT", "PATCH", "DELETE"]
                },
                "endpoint": {
                    "type": "string",
                    "description": "API endpoint path (e.g., /api/backend/v1/osi/instance/valkey-abc123)"
                },
                "body": {
                    "type": "object",
                    "description": "Request body as JSON object (for POST/PUT/PATCH requests)"
                },
                "cid": {
                    "type": "string",
                    "description": "Cluster ID for the X-CID header"
                }
            },
            "required": ["method", "endpoint", "cid"]
        }),
    }
}

fn operation_definition(op: &Operation) -> ToolDefinition {
    let mut properties = Map::new();
    for field in op.fields() {
        properties.insert(field.name.clone(), field_property(field));
    }
    for switch in op.switches() {
        properties.insert(switch.name.clone(), switch_property(switch));
    }
    let required: Vec<&str> = op
        .fields()
        .iter()
        .filter(|f| f.required)
        .map(|f| f.name.as_str())
        .collect();

    ToolDefinition {
        name: tool_name(&op.path),
        description: Some(op.description.clone()).filter(|d| !d.is_empty()),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

const fn schema_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Integer => "number",
        FieldKind::Array => "array",
        FieldKind::String => "string",
    }
}

fn field_property(field: &Field) -> Value {
    let mut property = Map::new();
    property.insert("type".into(), schema_type(field.kind).into());
    if !field.description.is_empty() {
        property.insert("description".into(), field.description.clone().into());
    }
    if !field.enum_values.is_empty() {
        property.insert("enum".into(), json!(field.enum_values));
    }
    if let Some(default) = &field.default {
        property.insert("default".into(), default.clone());
    }
    Value::Object(property)
}

fn switch_property(switch: &Switch) -> Value {
    let mut property = Map::new();
    property.insert("type".into(), "boolean".into());
    if !switch.description.is_empty() {
        property.insert("description".into(), switch.description.clone().into());
    }
    property.insert("default".into(), switch.default.into());
    Value::Object(property)
}

/// Executes tool calls against the backend.
pub struct ToolDispatcher {
    manifest: Arc<Manifest>,
    client: Arc<dyn ApiClient>,
    context: RuntimeContext,
}

impl ToolDispatcher {
    /// Creates a dispatcher for `manifest`.
    #[must_use]
    pub fn new(manifest: Arc<Manifest>, client: Arc<dyn ApiClient>, context: RuntimeContext) -> Self {
        Self {
            manifest,
            client,
            context,
        }
    }

    /// The manifest tools are derived from.
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Runs one tool call and returns the text to hand back to the caller.
    ///
    /// # Errors
    ///
    /// Any [`CommandError`]; an unknown tool name is
    /// [`CommandError::UnknownOperation`].
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<&Map<String, Value>>,
    ) -> Result<String, CommandError> {
        let empty = Map::new();
        let arguments = arguments.unwrap_or(&empty);

        if name == API_REQUEST_TOOL {
            return self.raw_request(arguments).await;
        }

        let op = self.manifest.operation_by_tool_name(name)?;
        let resolved = args::resolve(op, None, &args::supplied_from_json(arguments))?;
        let built = request::build(op, &resolved, &self.context)?;
        tracing::debug!(tool = name, method = %built.method, url = %built.url, "Calling tool");

        let response = self
            .client
            .send(&ApiRequest::from(built))
            .await?
            .error_for_status()?;
        Ok(pretty_json(&response.body))
    }

    async fn raw_request(&self, arguments: &Map<String, Value>) -> Result<String, CommandError> {
        let method: HttpMethod = required_string(arguments, "method")?
            .parse()
            .map_err(CommandError::Validation)?;
        let endpoint = required_string(arguments, "endpoint")?;
        let cluster_id = required_string(arguments, "cid")?;
        let body = match arguments.get("body") {
            None | Some(Value::Null) => None,
            Some(Value::Object(body)) => Some(body.clone()),
            Some(_) => {
                return Err(CommandError::Validation("body must be a JSON object".to_string()));
            }
        };

        let request = ApiRequest {
            method,
            url: self.context.url(endpoint),
            body,
            cluster_header: Some(cluster_id.to_string()),
        };
        tracing::debug!(method = %request.method, url = %request.url, "Raw API request");

        let response = self.client.send(&request).await?;
        let body = serde_json::from_slice::<Value>(&response.body)
            .unwrap_or_else(|_| Value::String(response.text()));
        let result = json!({
            "status": response.status,
            "status_text": response.status_text(),
            "body": body,
        });
        serde_json::to_string_pretty(&result).map_err(|e| CommandError::Protocol(e.to_string()))
    }
}

fn required_string<'a>(arguments: &'a Map<String, Value>, key: &str) -> Result<&'a str, CommandError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CommandError::Validation(format!("{key} is required")))
}
