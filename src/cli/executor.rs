//! Execution of a manifest command invoked from the command line.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::api::{ApiClient, ApiRequest};
use crate::error::CommandError;
use crate::manifest::{OutputKind, OutputSpec, Operation};
use crate::output::Formatter;
use crate::request::{self, args, RuntimeContext};

use super::command::{usage_line, LeafInvocation};
use super::wait::{self, PollSettings};

/// Runs leaf commands against the backend.
pub struct Executor {
    client: Arc<dyn ApiClient>,
    context: RuntimeContext,
    jobs_endpoint: String,
    poll: PollSettings,
}

impl Executor {
    /// Creates an executor.
    #[must_use]
    pub fn new(
        client: Arc<dyn ApiClient>,
        context: RuntimeContext,
        jobs_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client,
            context,
            jobs_endpoint: jobs_endpoint.into(),
            poll: PollSettings::default(),
        }
    }

    /// Overrides the `--wait` polling cadence.
    #[must_use]
    pub const fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Resolves arguments, sends the request and writes the formatted result to `out`.
    ///
    /// A missing required positional that declares an enumeration prints the
    /// accepted values and a usage line instead of failing.
    ///
    /// # Errors
    ///
    /// Any [`CommandError`]; nothing is sent when resolution or building fails.
    pub async fn execute<W: Write>(
        &self,
        op: &Operation,
        invocation: &LeafInvocation,
        out: &mut W,
    ) -> Result<(), CommandError> {
        let bulk = invocation.file.as_deref().map(load_bulk_input).transpose()?;
        let resolved = args::resolve(op, bulk.as_ref(), &invocation.explicit)?;

        for field in op.positional_fields() {
            if !field.required || resolved.contains(&field.name) {
                continue;
            }
            if field.enum_values.is_empty() {
                return Err(CommandError::MissingRequiredArgument(field.name.clone()));
            }
            let mut guidance = format!("Available options for <{}>:\n\n", field.name);
            for option in &field.enum_values {
                guidance.push_str(&format!("  {option}\n"));
            }
            guidance.push_str(&format!("\nUsage: {}\n", usage_line(op, field)));
            return write_out(out, guidance.as_bytes());
        }

        let ctx = self
            .context
            .clone()
            .with_cluster_override(invocation.cluster_id.clone());
        let built = request::build(op, &resolved, &ctx)?;
        let response = self
            .client
            .send(&ApiRequest::from(built))
            .await?
            .error_for_status()?;

        let formatter = Formatter::new(invocation.json);
        formatter
            .write(out, &response.body, op.output_hint.as_ref())
            .map_err(CommandError::Output)?;

        if invocation.wait && op.returns_async_job {
            let Some(job_id) = wait::job_id(&response.body) else {
                tracing::warn!(operation = %op.path, "Response carries no job ID, not waiting");
                return Ok(());
            };
            tracing::info!(job_id = %job_id, "Waiting for job");
            let job = wait::wait_for_job(
                self.client.as_ref(),
                &ctx,
                &self.jobs_endpoint,
                &job_id,
                self.poll,
            )
            .await?;
            let body = serde_json::to_vec(&job)
                .map_err(|e| CommandError::Output(std::io::Error::other(e)))?;
            let hint = OutputSpec {
                kind: Some(OutputKind::Object),
                fields: Vec::new(),
            };
            formatter.write(out, &body, Some(&hint)).map_err(CommandError::Output)?;
        }

        Ok(())
    }
}

fn write_out<W: Write>(out: &mut W, bytes: &[u8]) -> Result<(), CommandError> {
    out.write_all(bytes).map_err(CommandError::Output)
}

/// Reads a bulk-input file: a YAML or JSON mapping of input names to values.
///
/// An empty file counts as an empty mapping.
///
/// # Errors
///
/// Returns [`CommandError::Input`] if the file cannot be read or is not a mapping.
pub fn load_bulk_input(path: &Path) -> Result<Map<String, Value>, CommandError> {
    let input_error = |message: String| CommandError::Input {
        path: path.to_path_buf(),
        message,
    };
    let text = std::fs::read_to_string(path).map_err(|e| input_error(e.to_string()))?;
    if text.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_yaml::from_str::<Value>(&text).map_err(|e| input_error(e.to_string()))? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(input_error("expected a mapping of input names to values".to_string())),
    }
}
