//! CLI integration tests for the runos binary.
//!
//! Each test runs the compiled binary with a temporary config directory, a
//! manifest file and a mock backend.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;
use tempfile::{tempdir, TempDir};

const MANIFEST: &str = r"
version: '7'
commands:
  - command: services/add
    description: Add a service
    endpoint: /v1/clusters/:cid/services
    method: POST
    input:
      fields:
        - name: kind
          positional: true
          required: true
          enum: [valkey, postgres]
        - name: replicas
          type: integer
          default: 1
  - command: clusters/list
    description: List clusters
    endpoint: /v1/accounts/:aid/clusters
    method: GET
    output:
      type: array
      fields: [id, name]
";

struct Env {
    dir: TempDir,
}

impl Env {
    fn new(config: &str) -> Self {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("manifest-file.yaml"), MANIFEST).expect("write manifest");
        if !config.is_empty() {
            fs::write(dir.path().join("config.json"), config).expect("write config");
        }
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn runos(&self, server: &MockServer) -> Command {
        let mut cmd = Command::cargo_bin("runos").expect("runos binary");
        cmd.env_remove("RUNOS_CLUSTER_ID")
            .env_remove("RUNOS_CONFIG_DIR")
            .env_remove("RUNOS_MANIFEST")
            .env("RUNOS_TOKEN", "test-token")
            .env("CONSOLE_URL", server.base_url())
            .env("CONDUCTOR_API_URL", server.base_url())
            .arg("--config-dir")
            .arg(self.path())
            .arg("--manifest")
            .arg(self.path().join("manifest-file.yaml"));
        cmd
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Static Commands
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_manifest_commands() {
    let server = MockServer::start();
    let env = Env::new("");
    env.runos(&server)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("services"))
        .stdout(predicate::str::contains("clusters"))
        .stdout(predicate::str::contains("mcp"));
}

#[test]
fn test_version_subcommand() {
    let server = MockServer::start();
    let env = Env::new("");
    env.runos(&server)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("runos "));
}

#[test]
fn test_config_set_then_get() {
    let server = MockServer::start();
    let env = Env::new("");
    env.runos(&server)
        .args(["config", "set", "cid", "c42"])
        .assert()
        .success();

    let saved = fs::read_to_string(env.path().join("config.json")).unwrap();
    assert!(saved.contains("c42"));

    env.runos(&server)
        .args(["config", "get", "cid"])
        .assert()
        .success()
        .stdout("c42\n");
}

#[test]
fn test_config_set_account_id() {
    let server = MockServer::start();
    let env = Env::new("");
    env.runos(&server)
        .args(["config", "set", "account-id", "acct-7"])
        .assert()
        .success();

    env.runos(&server)
        .args(["config", "get", "account-id"])
        .assert()
        .success()
        .stdout("acct-7\n");
}

#[test]
fn test_config_rejects_unknown_key() {
    let server = MockServer::start();
    let env = Env::new("");
    env.runos(&server)
        .args(["config", "get", "colour"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("colour"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Manifest Commands
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_add_service_posts_body() {
    let server = MockServer::start();
    let add = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/clusters/c9/services")
            .header("authorization", "Bearer test-token")
            .json_body_obj(&serde_json::json!({"kind": "valkey", "replicas": 3}));
        then.status(201)
            .json_body_obj(&serde_json::json!({"id": "svc-1"}));
    });

    let env = Env::new("");
    env.runos(&server)
        .args(["services", "add", "valkey", "--replicas", "3", "--cid", "c9", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": \"svc-1\""));

    add.assert();
}

#[test]
fn test_default_cluster_from_config() {
    let server = MockServer::start();
    let add = server.mock(|when, then| {
        when.method(POST).path("/v1/clusters/from-config/services");
        then.status(201).body("{}");
    });

    let env = Env::new(r#"{"default_cluster_id": "from-config"}"#);
    env.runos(&server)
        .args(["services", "add", "postgres"])
        .assert()
        .success();

    add.assert();
}

#[test]
fn test_missing_cluster_id_fails_without_request() {
    let server = MockServer::start();
    let any = server.mock(|when, then| {
        when.any_request();
        then.status(200);
    });

    let env = Env::new("");
    env.runos(&server)
        .args(["services", "add", "valkey"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cluster ID required"));

    assert_eq!(any.hits(), 0);
}

#[test]
fn test_enum_guidance_for_missing_positional() {
    let server = MockServer::start();
    let env = Env::new("");
    env.runos(&server)
        .args(["services", "add", "--cid", "c1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Available options for <kind>:"))
        .stdout(predicate::str::contains("  postgres"))
        .stdout(predicate::str::contains("Usage: runos services add <kind>"));
}

#[test]
fn test_bulk_file_supplies_values() {
    let server = MockServer::start();
    let add = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/clusters/c1/services")
            .json_body_obj(&serde_json::json!({"kind": "postgres", "replicas": 2}));
        then.status(201).body("{}");
    });

    let env = Env::new("");
    let input = env.path().join("input.yaml");
    fs::write(&input, "kind: postgres\nreplicas: 2\n").unwrap();
    env.runos(&server)
        .args(["services", "add", "--cid", "c1", "-f"])
        .arg(&input)
        .assert()
        .success();

    add.assert();
}

#[test]
fn test_list_renders_table() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/accounts/acct-1/clusters");
        then.status(200).json_body_obj(&serde_json::json!([
            {"id": "c1", "name": "prod", "region": "eu"},
            {"id": "c2", "name": "staging", "region": "us"}
        ]));
    });

    let env = Env::new(r#"{"account_id": "acct-1"}"#);
    env.runos(&server)
        .args(["clusters", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ID  NAME"))
        .stdout(predicate::str::contains("staging"))
        .stdout(predicate::str::contains("region").not());
}

#[test]
fn test_api_error_exits_non_zero() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET);
        then.status(403).body("forbidden");
    });

    let env = Env::new(r#"{"account_id": "acct-1"}"#);
    env.runos(&server)
        .args(["clusters", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API error (403): forbidden"));
}

// ─────────────────────────────────────────────────────────────────────────────
// MCP Server
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_mcp_session_over_stdio() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/accounts/acct-1/clusters")
            .header("authorization", "Bearer test-token");
        then.status(200).body(r#"[{"id":"c1"}]"#);
    });

    let input = concat!(
        "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\n",
        "{\"jsonrpc\":\"2.0\",\"method\":\"initialized\"}\n",
        "garbage\n",
        "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/call\",",
        "\"params\":{\"name\":\"clusters_list\",\"arguments\":{}}}\n",
    );

    let env = Env::new(r#"{"account_id": "acct-1"}"#);
    let output = env
        .runos(&server)
        .arg("mcp")
        .write_stdin(input)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let replies: Vec<serde_json::Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0]["result"]["serverInfo"]["name"], "runos");
    assert_eq!(replies[1]["error"]["code"], -32700);
    assert_eq!(replies[2]["id"], 2);
    assert!(replies[2]["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("c1"));

    list.assert();
}
