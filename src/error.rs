//! Error types for runos.
//!
//! # Security Note
//!
//! Error messages never include bearer tokens or refresh tokens. Variants
//! that wrap an authentication failure carry a generic description only.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be written.
    #[error("failed to write configuration file: {path}")]
    WriteError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// No home directory could be determined for the default location.
    #[error("could not determine the configuration directory")]
    NoConfigDir,

    /// `config get`/`config set` was given a key it does not know.
    #[error("unknown config key: {key}\nAvailable keys: {available}")]
    UnknownKey {
        /// The key that was requested.
        key: String,
        /// Comma-separated list of accepted keys.
        available: &'static str,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised while reading, fetching or validating a manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read manifest: {path}")]
    Read {
        /// Path to the manifest file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest could not be decoded.
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The manifest could not be fetched from the backend.
    #[error("failed to fetch manifest: {0}")]
    Fetch(String),

    /// No manifest is available locally and none could be fetched.
    #[error("no manifest available: {0}")]
    Unavailable(String),

    /// Two operations declare the same path.
    #[error("duplicate operation path: {path}")]
    DuplicatePath {
        /// The repeated path.
        path: String,
    },

    /// Two operation paths map to the same tool name.
    #[error("operations '{first}' and '{second}' both map to tool name '{tool}'")]
    ToolNameCollision {
        /// Tool name both paths collapse to.
        tool: String,
        /// First operation path.
        first: String,
        /// Second operation path.
        second: String,
    },

    /// An operation declares an input the adapters cannot express.
    #[error("operation '{path}': {message}")]
    InvalidOperation {
        /// Operation path.
        path: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Errors raised while resolving, building or executing an operation.
///
/// These are the failures both front ends report: the CLI turns any of them
/// into a non-zero exit, the MCP server into an `isError` tool result.
#[derive(Error, Debug)]
pub enum CommandError {
    /// No operation matches the given path or tool name.
    #[error("unknown command: {0}")]
    UnknownOperation(String),

    /// The endpoint needs an account ID and none is configured.
    #[error("account ID not set: run 'runos config set account-id <account-id>'")]
    MissingAccountId,

    /// The endpoint needs a cluster ID and none was supplied or configured.
    #[error("cluster ID required: {}", cluster_hint(.via_flag))]
    MissingClusterId {
        /// Whether the caller could have passed `--cid`.
        via_flag: bool,
    },

    /// A required positional argument was not supplied.
    #[error("missing required argument: {0}")]
    MissingRequiredArgument(String),

    /// A supplied value does not match the field's declared kind.
    #[error("invalid value for '{field}': {message}")]
    Coercion {
        /// Field or switch name.
        field: String,
        /// Why the value was rejected.
        message: String,
    },

    /// A placeholder or required field is still unresolved after precedence resolution.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The backend answered with a non-success status.
    #[error("API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(String),

    /// Command output could not be written.
    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),

    /// Malformed JSON-RPC input.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No usable credentials.
    #[error("authentication required: {0}")]
    Auth(String),

    /// The bulk-input file could not be read or decoded.
    #[error("failed to load input file {path}: {message}")]
    Input {
        /// Path given with `--file`.
        path: PathBuf,
        /// Read or decode failure.
        message: String,
    },

    /// An asynchronous job finished unsuccessfully or never finished.
    #[error("job {job_id} {message}")]
    JobFailed {
        /// Backend job identifier.
        job_id: String,
        /// Final status or timeout description.
        message: String,
    },
}

#[allow(clippy::trivially_copy_pass_by_ref)] // thiserror passes fields by reference
const fn cluster_hint(via_flag: &bool) -> &'static str {
    if *via_flag {
        "use --cid flag or set default with 'runos config set cid <cluster-id>'"
    } else {
        "set RUNOS_CLUSTER_ID or a default with 'runos config set cid <cluster-id>'"
    }
}

impl From<reqwest::Error> for CommandError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest's Display can embed the full URL; strip it so query-string keys never leak.
        Self::Transport(err.without_url().to_string())
    }
}
