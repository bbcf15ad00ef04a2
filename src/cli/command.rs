//! Rendering of the command tree as `clap` subcommands.
//!
//! Every flag is optional at the `clap` level. Requiredness depends on the
//! bulk-input file as well, so it is checked after argument resolution.

use std::path::PathBuf;

use clap::builder::PossibleValuesParser;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use crate::error::CommandError;
use crate::manifest::{Field, FieldKind, Manifest, Operation, Switch};
use crate::request::args::{SuppliedArguments, SuppliedValue};

use super::tree::{CommandNode, CommandTree};

/// Built-in subcommands that manifest commands may not shadow.
pub const STATIC_COMMANDS: [&str; 3] = ["mcp", "config", "version"];

/// Everything a leaf invocation supplied on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeafInvocation {
    /// Field and switch values given as flags or positionals.
    pub explicit: SuppliedArguments,
    /// `--file`.
    pub file: Option<PathBuf>,
    /// `--cid`.
    pub cluster_id: Option<String>,
    /// `--json`.
    pub json: bool,
    /// `--wait`.
    pub wait: bool,
}

/// Builds one `clap` subcommand per top-level node of `tree`.
///
/// Top-level names that collide with a built-in subcommand are skipped.
#[must_use]
pub fn build_commands(tree: &CommandTree, manifest: &Manifest) -> Vec<Command> {
    tree.roots()
        .filter(|node| {
            let clash = STATIC_COMMANDS.contains(&node.name.as_str());
            if clash {
                tracing::warn!(command = %node.name, "Manifest command shadows a built-in command, skipping");
            }
            !clash
        })
        .map(|node| build_node(tree, manifest, node))
        .collect()
}

fn build_node(tree: &CommandTree, manifest: &Manifest, node: &CommandNode) -> Command {
    let mut cmd = Command::new(node.name.clone());

    match tree.operation(node, manifest) {
        Some(op) => {
            cmd = add_leaf_args(cmd.about(op.description.clone()), op);
        }
        None => {
            cmd = cmd.about(format!("Manage {}", node.name));
        }
    }

    for child in tree.children(node) {
        cmd = cmd.subcommand(build_node(tree, manifest, child));
    }

    if node.is_container() {
        cmd = if node.is_leaf() {
            cmd.args_conflicts_with_subcommands(true)
        } else {
            cmd.subcommand_required(true).arg_required_else_help(true)
        };
    }
    cmd
}

fn add_leaf_args(mut cmd: Command, op: &Operation) -> Command {
    for (i, field) in op.positional_fields().enumerate() {
        cmd = cmd.arg(field_arg(field).index(i + 1).value_name(field.name.clone()));
    }
    for field in op.fields().iter().filter(|f| !f.positional) {
        cmd = cmd.arg(field_arg(field).long(field.name.clone()));
    }
    for switch in op.switches() {
        cmd = cmd.arg(switch_arg(switch));
    }

    if op.has_fields() {
        cmd = cmd.arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("YAML or JSON file with input values"),
        );
    }
    if op.references_cluster_id() {
        cmd = cmd.arg(
            Arg::new("cid")
                .long("cid")
                .value_name("CLUSTER_ID")
                .help("Cluster ID (uses default from config if not specified)"),
        );
    }
    cmd = cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Output as JSON"),
    );
    if op.returns_async_job {
        cmd = cmd.arg(
            Arg::new("wait")
                .long("wait")
                .action(ArgAction::SetTrue)
                .help("Wait for job to complete"),
        );
    }
    cmd
}

fn field_arg(field: &Field) -> Arg {
    let mut arg = Arg::new(field.name.clone()).help(field.description.clone());
    arg = match field.kind {
        FieldKind::Integer => arg.value_parser(value_parser!(i64)),
        FieldKind::Array if field.positional => arg.action(ArgAction::Append).num_args(1..),
        FieldKind::Array => arg.action(ArgAction::Append).value_delimiter(','),
        FieldKind::String if !field.enum_values.is_empty() => {
            arg.value_parser(PossibleValuesParser::new(field.enum_values.clone()))
        }
        FieldKind::String => arg,
    };
    if !field.positional && field.kind != FieldKind::Array {
        arg = arg.value_name("VALUE");
    }
    arg
}

fn switch_arg(switch: &Switch) -> Arg {
    Arg::new(switch.name.clone())
        .long(switch.name.clone())
        .help(switch.description.clone())
        .action(ArgAction::Set)
        .value_parser(value_parser!(bool))
        .num_args(0..=1)
        .require_equals(true)
        .default_missing_value("true")
}

/// Collects what the caller supplied for `op` from its parsed matches.
#[must_use]
pub fn invocation_from_matches(op: &Operation, matches: &ArgMatches) -> LeafInvocation {
    let mut explicit = SuppliedArguments::new();

    for field in op.fields() {
        let name = field.name.as_str();
        let value = match field.kind {
            FieldKind::Integer => matches.get_one::<i64>(name).map(|n| SuppliedValue::Integer(*n)),
            FieldKind::Array => matches
                .get_many::<String>(name)
                .map(|values| SuppliedValue::List(values.cloned().collect())),
            FieldKind::String => matches
                .get_one::<String>(name)
                .map(|s| SuppliedValue::Text(s.clone())),
        };
        if let Some(value) = value {
            explicit.insert(field.name.clone(), value);
        }
    }
    for switch in op.switches() {
        if let Some(flag) = matches.get_one::<bool>(&switch.name) {
            explicit.insert(switch.name.clone(), SuppliedValue::Flag(*flag));
        }
    }

    LeafInvocation {
        explicit,
        file: matches.try_get_one::<PathBuf>("file").ok().flatten().cloned(),
        cluster_id: matches.try_get_one::<String>("cid").ok().flatten().cloned(),
        json: matches.get_flag("json"),
        wait: matches
            .try_get_one::<bool>("wait")
            .ok()
            .flatten()
            .copied()
            .unwrap_or(false),
    }
}

/// Follows nested subcommand matches from a top-level manifest command down
/// to the invoked operation.
///
/// # Errors
///
/// Returns [`CommandError::UnknownOperation`] if the walked path names no
/// operation.
pub fn find_leaf<'m, 'a>(
    manifest: &'m Manifest,
    name: &str,
    matches: &'a ArgMatches,
) -> Result<(&'m Operation, &'a ArgMatches), CommandError> {
    let mut path = name.to_string();
    let mut current = matches;
    while let Some((child, child_matches)) = current.subcommand() {
        path.push('/');
        path.push_str(child);
        current = child_matches;
    }
    manifest.operation(&path).map(|op| (op, current))
}

/// Usage line shown with enumeration guidance, e.g. `runos services add <name>`.
#[must_use]
pub fn usage_line(op: &Operation, field: &Field) -> String {
    format!("runos {} <{}>", op.path.replace('/', " "), field.name)
}
