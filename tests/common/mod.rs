//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use runos::api::{ApiClient, ApiRequest, ApiResponse};
use runos::error::CommandError;
use runos::manifest::{loader::parse_manifest, Manifest};

/// Manifest used across the integration tests.
pub const MANIFEST: &str = r"
version: '2024.1'
commands:
  - command: services/add/valkey
    description: Add a Valkey service
    endpoint: /v1/clusters/:cid/services
    method: POST
    input:
      fields:
        - name: name
          type: string
          positional: true
          required: true
  - command: services/get
    description: Show a service
    endpoint: /v1/clusters/{cid}/services/{name}
    method: GET
    input:
      fields:
        - name: name
          type: string
          positional: true
          required: true
  - command: services/logs
    description: Show service logs
    endpoint: /v1/clusters/:cid/services/:name/logs
    method: GET
    input:
      fields:
        - name: name
          type: string
          positional: true
          required: true
  - command: clusters/list
    description: List clusters
    endpoint: /v1/accounts/:aid/clusters
    method: GET
    output:
      type: array
      fields: [id, name]
";

pub fn manifest() -> Manifest {
    parse_manifest(MANIFEST).expect("test manifest is valid")
}

/// Records every request and answers with canned responses, `200 {}` once
/// the script runs out.
#[derive(Default)]
pub struct RecordingClient {
    responses: Mutex<VecDeque<(u16, String)>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl RecordingClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_responses(responses: &[(u16, &str)]) -> Arc<Self> {
        let client = Self::default();
        client
            .responses
            .lock()
            .unwrap()
            .extend(responses.iter().map(|(s, b)| (*s, (*b).to_string())));
        Arc::new(client)
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApiClient for RecordingClient {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, CommandError> {
        self.requests.lock().unwrap().push(request.clone());
        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| (200, "{}".to_string()));
        Ok(ApiResponse {
            status,
            reason: String::new(),
            body: body.into_bytes(),
        })
    }
}
