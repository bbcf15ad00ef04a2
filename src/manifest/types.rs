//! Manifest structures for deserialisation.
//!
//! These map directly onto the manifest document served by the backend
//! (`version` plus a list of `commands`), so the serde names follow the wire
//! format rather than the Rust field names.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::endpoint;

/// Placeholder name substituted with the configured account ID.
pub const ACCOUNT_ID_PLACEHOLDER: &str = "aid";

/// Placeholder name substituted with the resolved cluster ID.
pub const CLUSTER_ID_PLACEHOLDER: &str = "cid";

/// Root manifest structure: a versioned, ordered list of operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Opaque version string; a change triggers wholesale replacement.
    pub version: String,

    /// Operations in declaration order.
    #[serde(rename = "commands", default)]
    pub operations: Vec<Operation>,
}

/// One manifest-described unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Slash-separated command path, e.g. `services/add/valkey`.
    #[serde(rename = "command")]
    pub path: String,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Endpoint template, e.g. `/v1/clusters/:cid/services/{name}`.
    #[serde(rename = "endpoint")]
    pub endpoint_template: String,

    /// HTTP method used for the call.
    #[serde(rename = "method")]
    pub http_method: HttpMethod,

    /// Declared inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputSpec>,

    /// How the response should be rendered as text.
    #[serde(rename = "output", default, skip_serializing_if = "Option::is_none")]
    pub output_hint: Option<OutputSpec>,

    /// Whether the backend answers with an asynchronous job.
    #[serde(rename = "returns_job", default, skip_serializing_if = "is_false")]
    pub returns_async_job: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

impl Operation {
    /// Declared fields, in order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        self.input.as_ref().map_or(&[], |i| i.fields.as_slice())
    }

    /// Declared boolean switches, in order.
    #[must_use]
    pub fn switches(&self) -> &[Switch] {
        self.input.as_ref().map_or(&[], |i| i.switches.as_slice())
    }

    /// Positional fields in declaration order.
    pub fn positional_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields().iter().filter(|f| f.positional)
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Looks up a switch by name.
    #[must_use]
    pub fn switch(&self, name: &str) -> Option<&Switch> {
        self.switches().iter().find(|s| s.name == name)
    }

    /// Whether the operation declares any fields (switches do not count).
    #[must_use]
    pub fn has_fields(&self) -> bool {
        !self.fields().is_empty()
    }

    /// Whether the endpoint template references the cluster ID.
    #[must_use]
    pub fn references_cluster_id(&self) -> bool {
        endpoint::has_placeholder(&self.endpoint_template, CLUSTER_ID_PLACEHOLDER)
    }

    /// Whether a positional field is consumed by the endpoint template.
    #[must_use]
    pub fn templates_field(&self, field: &Field) -> bool {
        field.positional && endpoint::has_placeholder(&self.endpoint_template, &field.name)
    }
}

/// HTTP methods an operation may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl HttpMethod {
    /// Canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Only `POST`, `PUT` and `PATCH` carry a request body.
    #[must_use]
    pub const fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(format!("unsupported HTTP method '{s}'")),
        }
    }
}

impl TryFrom<String> for HttpMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HttpMethod> for String {
    fn from(method: HttpMethod) -> Self {
        method.as_str().to_string()
    }
}

/// Input schema of an operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    /// Typed fields, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,

    /// Boolean switches, in order.
    #[serde(rename = "flags", default, skip_serializing_if = "Vec::is_empty")]
    pub switches: Vec<Switch>,
}

/// A typed, possibly positional input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name; also the flag name and the body key.
    pub name: String,

    /// Declared value kind.
    #[serde(rename = "type", default)]
    pub kind: FieldKind,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Whether a value must be present after precedence resolution.
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,

    /// Declared default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Accepted values, if restricted.
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,

    /// Element format for array fields.
    #[serde(rename = "format", default, skip_serializing_if = "Option::is_none")]
    pub array_format: Option<ArrayFormat>,

    /// Bound to a CLI positional argument instead of a flag.
    #[serde(default, skip_serializing_if = "is_false")]
    pub positional: bool,
}

impl Field {
    /// Whether array elements are `key:value` tokens.
    #[must_use]
    pub fn is_key_value(&self) -> bool {
        self.kind == FieldKind::Array && self.array_format == Some(ArrayFormat::KeyValue)
    }
}

/// Value kinds a field may declare.
///
/// Kinds the backend adds later degrade to `String`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Signed 64-bit integer.
    Integer,
    /// Sequence of strings.
    Array,
    /// Free text.
    #[default]
    #[serde(other)]
    String,
}

/// Element format of array fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayFormat {
    /// Elements are `key:value` tokens sent as `{key, value}` objects.
    #[serde(alias = "keyValue")]
    KeyValue,
    /// Elements are sent as-is.
    #[serde(other)]
    Plain,
}

/// A boolean input; never positional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Switch {
    /// Switch name; also the flag name and the body key.
    pub name: String,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Value used when the caller does not supply one.
    #[serde(default)]
    pub default: bool,
}

/// Rendering hint for text output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Shape of the response body.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<OutputKind>,

    /// Fields to display, in column order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

/// Response shapes the formatter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// A single JSON object rendered as `key: value` lines.
    Object,
    /// A JSON array rendered as a table.
    Array,
    /// Anything else is printed verbatim.
    #[serde(other)]
    Raw,
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALKEY: &str = r#"
version: "7"
commands:
  - command: services/add/valkey
    description: Add a Valkey service
    endpoint: /v1/clusters/:cid/services
    method: post
    returns_job: true
    input:
      fields:
        - name: name
          type: string
          positional: true
          required: true
        - name: tags
          type: array
          format: key_value
        - name: replicas
          type: integer
          default: 1
      flags:
        - name: persistent
          default: true
    output:
      type: object
      fields: [id, status]
"#;

    #[test]
    fn parse_wire_format() {
        let manifest: Manifest = serde_yaml::from_str(VALKEY).unwrap();
        assert_eq!(manifest.version, "7");
        let op = &manifest.operations[0];
        assert_eq!(op.path, "services/add/valkey");
        assert_eq!(op.http_method, HttpMethod::Post);
        assert!(op.returns_async_job);
        assert_eq!(op.fields().len(), 3);
        assert!(op.fields()[1].is_key_value());
        assert_eq!(op.fields()[2].default, Some(serde_json::json!(1)));
        assert!(op.switches()[0].default);
        assert_eq!(
            op.output_hint.as_ref().unwrap().kind,
            Some(OutputKind::Object)
        );
    }

    #[test]
    fn unknown_field_kind_degrades_to_string() {
        let field: Field = serde_yaml::from_str("name: x\ntype: uuid").unwrap();
        assert_eq!(field.kind, FieldKind::String);
    }

    #[test]
    fn kinds_and_array_formats_decode() {
        let field: Field = serde_yaml::from_str("name: x\ntype: integer").unwrap();
        assert_eq!(field.kind, FieldKind::Integer);

        let field: Field =
            serde_yaml::from_str("name: tags\ntype: array\nformat: keyValue").unwrap();
        assert!(field.is_key_value());

        let field: Field =
            serde_yaml::from_str("name: tags\ntype: array\nformat: csv").unwrap();
        assert_eq!(field.array_format, Some(ArrayFormat::Plain));
        assert!(!field.is_key_value());
    }

    #[test]
    fn missing_kind_defaults_to_string() {
        let field: Field = serde_yaml::from_str("name: x").unwrap();
        assert_eq!(field.kind, FieldKind::String);
        assert!(!field.positional);
    }

    #[test]
    fn reject_unknown_method() {
        let result: Result<Operation, _> =
            serde_yaml::from_str("command: a\nendpoint: /a\nmethod: TRACE");
        assert!(result.is_err());
    }

    #[test]
    fn placeholder_queries() {
        let manifest: Manifest = serde_yaml::from_str(VALKEY).unwrap();
        let op = &manifest.operations[0];
        assert!(op.references_cluster_id());
        assert!(!op.templates_field(&op.fields()[0]));
    }

    #[test]
    fn method_body_rules() {
        assert!(HttpMethod::Post.carries_body());
        assert!(HttpMethod::Patch.carries_body());
        assert!(!HttpMethod::Get.carries_body());
        assert!(!HttpMethod::Delete.carries_body());
    }
}
