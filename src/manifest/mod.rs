//! Manifest model: the declarative list of operations the backend supports.
//!
//! The manifest is loaded once per process and never mutated afterwards.
//! Both front ends read it: the CLI adapter turns each operation into a
//! nested subcommand, the tool adapter turns it into a named MCP tool.
//!
//! Tool names are derived from paths by replacing `/` with `_`. The mapping
//! must stay invertible, so [`Manifest::validate`] rejects manifests where
//! two paths collapse to the same tool name.

pub mod loader;
mod types;

pub use types::{
    ArrayFormat, Field, FieldKind, HttpMethod, InputSpec, Manifest, Operation, OutputKind,
    OutputSpec, Switch, ACCOUNT_ID_PLACEHOLDER, CLUSTER_ID_PLACEHOLDER,
};

use std::collections::{HashMap, HashSet};

use crate::cli::{MAX_POSITIONAL_ARGS, RESERVED_FLAGS};
use crate::error::{CommandError, ManifestError};
use crate::request::args;

/// Converts an operation path to its tool name.
#[must_use]
pub fn tool_name(path: &str) -> String {
    path.replace('/', "_")
}

impl Manifest {
    /// Resolves an operation by exact path.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::UnknownOperation`] when no operation has this path.
    pub fn operation(&self, path: &str) -> Result<&Operation, CommandError> {
        self.operations
            .iter()
            .find(|op| op.path == path)
            .ok_or_else(|| CommandError::UnknownOperation(path.to_string()))
    }

    /// Resolves an operation by tool name.
    ///
    /// Matching compares against each path's derived tool name, so paths that
    /// themselves contain `_` still resolve.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::UnknownOperation`] when no operation maps to `name`.
    pub fn operation_by_tool_name(&self, name: &str) -> Result<&Operation, CommandError> {
        self.operations
            .iter()
            .find(|op| tool_name(&op.path) == name)
            .ok_or_else(|| CommandError::UnknownOperation(name.to_string()))
    }

    /// Checks the invariants both adapters rely on.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut paths = HashSet::new();
        let mut tools: HashMap<String, &str> = HashMap::new();

        for op in &self.operations {
            if !paths.insert(op.path.as_str()) {
                return Err(ManifestError::DuplicatePath {
                    path: op.path.clone(),
                });
            }

            let tool = tool_name(&op.path);
            if let Some(first) = tools.insert(tool.clone(), &op.path) {
                return Err(ManifestError::ToolNameCollision {
                    tool,
                    first: first.to_string(),
                    second: op.path.clone(),
                });
            }

            validate_operation(op)?;
        }

        Ok(())
    }
}

const RESERVED_SEGMENT: &str = "help";

fn validate_operation(op: &Operation) -> Result<(), ManifestError> {
    let invalid = |message: String| ManifestError::InvalidOperation {
        path: op.path.clone(),
        message,
    };

    if op.path.is_empty() || op.path.split('/').any(str::is_empty) {
        return Err(invalid("path has an empty segment".to_string()));
    }
    // clap adds its own `help` subcommand under every parent.
    if op.path.split('/').any(|segment| segment == RESERVED_SEGMENT) {
        return Err(invalid(format!("path segment '{RESERVED_SEGMENT}' is reserved")));
    }

    let mut names = HashSet::new();
    let input_names = op
        .fields()
        .iter()
        .map(|f| f.name.as_str())
        .chain(op.switches().iter().map(|s| s.name.as_str()));
    for name in input_names {
        if name.is_empty() {
            return Err(invalid("input with an empty name".to_string()));
        }
        if RESERVED_FLAGS.contains(&name) {
            return Err(invalid(format!("input name '{name}' is reserved")));
        }
        if !names.insert(name) {
            return Err(invalid(format!("input '{name}' is declared twice")));
        }
    }

    for field in op.fields() {
        if field.array_format == Some(ArrayFormat::KeyValue) && field.kind != FieldKind::Array {
            return Err(invalid(format!(
                "field '{}' uses key_value format but is not an array",
                field.name
            )));
        }
        if let Some(default) = &field.default {
            args::coerce_json(field, default).map_err(|e| invalid(format!("default: {e}")))?;
        }
    }

    let positional: Vec<&Field> = op.positional_fields().collect();
    if positional.len() > MAX_POSITIONAL_ARGS {
        return Err(invalid(format!(
            "{} positional fields declared, at most {MAX_POSITIONAL_ARGS} supported",
            positional.len()
        )));
    }
    for (i, field) in positional.iter().enumerate() {
        let is_last = i + 1 == positional.len();
        if field.kind == FieldKind::Array && !is_last {
            return Err(invalid(format!(
                "positional array field '{}' must be the last positional",
                field.name
            )));
        }
        if field.required && positional[..i].iter().any(|f| !f.required) {
            return Err(invalid(format!(
                "required positional field '{}' follows an optional one",
                field.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(path: &str) -> Operation {
        Operation {
            path: path.to_string(),
            description: String::new(),
            endpoint_template: "/v1/things".to_string(),
            http_method: HttpMethod::Get,
            input: None,
            output_hint: None,
            returns_async_job: false,
        }
    }

    fn field(name: &str) -> Field {
        Field {
            name: name.to_string(),
            kind: FieldKind::String,
            description: String::new(),
            required: false,
            default: None,
            enum_values: Vec::new(),
            array_format: None,
            positional: false,
        }
    }

    fn manifest(ops: Vec<Operation>) -> Manifest {
        Manifest {
            version: "1".to_string(),
            operations: ops,
        }
    }

    #[test]
    fn lookup_by_path_and_tool_name() {
        let m = manifest(vec![op("services/list"), op("clusters/get")]);
        assert_eq!(m.operation("clusters/get").unwrap().path, "clusters/get");
        assert_eq!(
            m.operation_by_tool_name("services_list").unwrap().path,
            "services/list"
        );
    }

    #[test]
    fn lookup_failure_is_unknown_operation() {
        let m = manifest(vec![op("services/list")]);
        let err = m.operation_by_tool_name("nodes_reboot").unwrap_err();
        assert!(matches!(err, CommandError::UnknownOperation(_)));
        assert!(err.to_string().contains("unknown command"));
    }

    #[test]
    fn tool_name_round_trips_for_underscored_paths() {
        let m = manifest(vec![op("node_pools/list")]);
        assert!(m.validate().is_ok());
        assert_eq!(
            m.operation_by_tool_name("node_pools_list").unwrap().path,
            "node_pools/list"
        );
    }

    #[test]
    fn reject_duplicate_paths() {
        let m = manifest(vec![op("a/b"), op("a/b")]);
        assert!(matches!(
            m.validate(),
            Err(ManifestError::DuplicatePath { .. })
        ));
    }

    #[test]
    fn reject_tool_name_collisions() {
        let m = manifest(vec![op("a/b_c"), op("a_b/c")]);
        assert!(matches!(
            m.validate(),
            Err(ManifestError::ToolNameCollision { .. })
        ));
    }

    #[test]
    fn reject_reserved_input_names() {
        let mut o = op("a");
        o.input = Some(InputSpec {
            fields: vec![field("json")],
            switches: Vec::new(),
        });
        assert!(manifest(vec![o]).validate().is_err());
    }

    #[test]
    fn reject_required_positional_after_optional() {
        let mut first = field("first");
        first.positional = true;
        let mut second = field("second");
        second.positional = true;
        second.required = true;
        let mut o = op("a");
        o.input = Some(InputSpec {
            fields: vec![first, second],
            switches: Vec::new(),
        });
        assert!(manifest(vec![o]).validate().is_err());
    }

    #[test]
    fn reject_too_many_positionals() {
        let fields = (0..=MAX_POSITIONAL_ARGS)
            .map(|i| {
                let mut f = field(&format!("p{i}"));
                f.positional = true;
                f
            })
            .collect();
        let mut o = op("a");
        o.input = Some(InputSpec {
            fields,
            switches: Vec::new(),
        });
        assert!(manifest(vec![o]).validate().is_err());
    }

    #[test]
    fn reject_mistyped_default() {
        let mut f = field("count");
        f.kind = FieldKind::Integer;
        f.default = Some(serde_json::json!("many"));
        let mut o = op("a");
        o.input = Some(InputSpec {
            fields: vec![f],
            switches: Vec::new(),
        });
        assert!(manifest(vec![o]).validate().is_err());
    }

    #[test]
    fn reject_empty_segments() {
        assert!(manifest(vec![op("services//list")]).validate().is_err());
    }

    #[test]
    fn reject_help_segment() {
        for path in ["services/help", "help", "help/me"] {
            let err = manifest(vec![op(path)]).validate().unwrap_err();
            assert!(
                matches!(err, ManifestError::InvalidOperation { .. }),
                "{path}: {err}"
            );
            assert!(err.to_string().contains("'help' is reserved"));
        }
        assert!(manifest(vec![op("services/helpers")]).validate().is_ok());
    }
}
