//! Shared request building.
//!
//! Both front ends end up here: the CLI adapter after parsing flags and the
//! tool adapter after decoding call arguments. Given an operation, its
//! resolved arguments and the runtime context, [`build`] produces the final
//! URL and body, so the two front ends cannot disagree on the wire.
//!
//! Placeholders are resolved in a fixed order: account ID, cluster ID, then
//! positional fields in declaration order. The base URL is prepended last.

pub mod args;
pub mod endpoint;

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::CommandError;
use crate::manifest::{HttpMethod, Operation, ACCOUNT_ID_PLACEHOLDER, CLUSTER_ID_PLACEHOLDER};

use self::args::{coerce_json, ArgValue, ResolvedArguments};

/// Values supplied by configuration and flags, never by the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeContext {
    /// Base API URL, without trailing slash.
    pub base_url: String,
    /// Account the caller is logged in to.
    pub account_id: Option<String>,
    /// Cluster operations are scoped to.
    pub cluster_id: Option<String>,
    /// Whether the caller can pass a cluster ID per invocation (`--cid`).
    pub cluster_flag: bool,
}

impl RuntimeContext {
    /// Creates a context for `base_url` with no account or cluster.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            account_id: None,
            cluster_id: None,
            cluster_flag: false,
        }
    }

    /// Sets the account ID; empty strings count as unset.
    #[must_use]
    pub fn with_account_id(mut self, account_id: Option<String>) -> Self {
        self.account_id = account_id.filter(|s| !s.is_empty());
        self
    }

    /// Sets the default cluster ID; empty strings count as unset.
    #[must_use]
    pub fn with_cluster_id(mut self, cluster_id: Option<String>) -> Self {
        self.cluster_id = cluster_id.filter(|s| !s.is_empty());
        self
    }

    /// Replaces the cluster ID when an explicit override is given.
    ///
    /// Marks the context as accepting a per-invocation cluster ID, which
    /// shapes the hint of a missing-cluster error.
    #[must_use]
    pub fn with_cluster_override(mut self, cluster_id: Option<String>) -> Self {
        self.cluster_flag = true;
        if let Some(cid) = cluster_id.filter(|s| !s.is_empty()) {
            self.cluster_id = Some(cid);
        }
        self
    }

    /// Joins the base URL and an endpoint path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// A concrete backend request.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// JSON body; `None` for `GET` and `DELETE`.
    pub body: Option<Map<String, Value>>,
}

/// Builds the request for `op`.
///
/// A positional field consumed by an endpoint placeholder is not repeated in
/// the body; a positional field the template never mentions is sent in the
/// body like any other field.
///
/// # Errors
///
/// - [`CommandError::MissingAccountId`] / [`CommandError::MissingClusterId`]
///   when the template needs a context value that is absent.
/// - [`CommandError::Validation`] when a positional placeholder has no value
///   or a required field is still empty.
pub fn build(
    op: &Operation,
    args: &ResolvedArguments,
    ctx: &RuntimeContext,
) -> Result<BuiltRequest, CommandError> {
    let mut path_values = HashMap::new();
    for field in op.positional_fields() {
        if !op.templates_field(field) {
            continue;
        }
        let value = args
            .get(&field.name)
            .cloned()
            .or_else(|| field.default.as_ref().and_then(|d| coerce_json(field, d).ok()))
            .ok_or_else(|| {
                CommandError::Validation(format!(
                    "no value for placeholder '{}' in {}",
                    field.name, op.endpoint_template
                ))
            })?;
        path_values.insert(field.name.as_str(), value.to_path_segment());
    }

    let path = render_endpoint(&op.endpoint_template, ctx, path_values)?;

    let mut body = Map::new();
    for field in op.fields() {
        if op.templates_field(field) {
            continue;
        }
        let value = match args.get(&field.name) {
            Some(value) => Some(value.clone()),
            None => field
                .default
                .as_ref()
                .map(|d| coerce_json(field, d))
                .transpose()?,
        };
        match value {
            Some(value) => {
                body.insert(field.name.clone(), value.to_json());
            }
            None if field.required => {
                return Err(CommandError::Validation(format!(
                    "missing required field '{}'",
                    field.name
                )));
            }
            None => {}
        }
    }
    for switch in op.switches() {
        let value = args
            .get(&switch.name)
            .cloned()
            .unwrap_or(ArgValue::Bool(switch.default));
        body.insert(switch.name.clone(), value.to_json());
    }

    let request = BuiltRequest {
        method: op.http_method,
        url: ctx.url(&path),
        body: op.http_method.carries_body().then_some(body),
    };
    tracing::debug!(
        operation = %op.path,
        method = %request.method,
        url = %request.url,
        "Built request"
    );
    Ok(request)
}

/// Renders an endpoint template against the runtime context plus extra values.
///
/// Account and cluster placeholders are checked first, in that order, so a
/// missing context value is reported before anything else.
///
/// # Errors
///
/// Returns [`CommandError::MissingAccountId`] or [`CommandError::MissingClusterId`].
pub fn render_endpoint<'a>(
    template: &str,
    ctx: &RuntimeContext,
    mut values: HashMap<&'a str, String>,
) -> Result<String, CommandError> {
    if endpoint::has_placeholder(template, ACCOUNT_ID_PLACEHOLDER) {
        let aid = ctx.account_id.clone().ok_or(CommandError::MissingAccountId)?;
        values.insert(ACCOUNT_ID_PLACEHOLDER, aid);
    }
    if endpoint::has_placeholder(template, CLUSTER_ID_PLACEHOLDER) {
        let cid = ctx.cluster_id.clone().ok_or(CommandError::MissingClusterId {
            via_flag: ctx.cluster_flag,
        })?;
        values.insert(CLUSTER_ID_PLACEHOLDER, cid);
    }
    Ok(endpoint::render(template, &values))
}
