// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: an in-memory Kubernetes API server behind a `kube::Client`.
//!
//! Objects are stored as JSON keyed by their item path
//! (e.g. `/api/v1/namespaces/ns/secrets/name`). GET, POST, PUT and merge PATCH
//! (including the `/status` subresource) are supported, `metadata.resourceVersion`
//! preconditions are enforced, and Secret `stringData` is folded into `data`
//! the way the real API server does on write.

use crate::kubernetes::events::EventPublisher;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::{Request, Response};
use http_body_util::BodyExt;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::client::Body;
use kube::runtime::events::EventType;
use kube::Client;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Value>,
    requests: Vec<RecordedRequest>,
    failures: Vec<(String, String, u16)>,
    next_resource_version: u64,
}

/// A stateful fake API server that can be turned into a kube Client.
#[derive(Clone, Default)]
pub struct FakeApiServer {
    state: Arc<Mutex<State>>,
}

impl FakeApiServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object under its collection path
    pub fn with_object(self, collection_path: &str, object: Value) -> Self {
        let name = object["metadata"]["name"]
            .as_str()
            .expect("seeded object needs metadata.name")
            .to_string();
        {
            let mut state = self.state.lock().unwrap();
            let stored = state.prepare_new(object);
            state
                .objects
                .insert(format!("{}/{}", collection_path, name), stored);
        }
        self
    }

    /// Make every request with this method and exact path fail with the given code
    pub fn fail_on(self, method: &str, path: &str, code: u16) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .push((method.to_string(), path.to_string(), code));
        self
    }

    pub fn object(&self, path: &str) -> Option<Value> {
        self.state.lock().unwrap().objects.get(path).cloned()
    }

    /// Decoded `data` of a stored Secret
    pub fn secret_data(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let secret = self.object(path)?;
        let data = secret.get("data").and_then(Value::as_object);
        Some(
            data.map(|d| {
                d.iter()
                    .map(|(k, v)| {
                        let raw = STANDARD.decode(v.as_str().unwrap_or_default()).unwrap();
                        (k.clone(), String::from_utf8(raw).unwrap())
                    })
                    .collect()
            })
            .unwrap_or_default(),
        )
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Number of requests with the given method whose path starts with `path_prefix`
    pub fn count(&self, method: &str, path_prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path.starts_with(path_prefix))
            .count()
    }

    /// Number of mutating requests (POST, PUT, PATCH, DELETE)
    pub fn write_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.method != "GET")
            .count()
    }

    /// Build a kube Client backed by this server
    pub fn client(&self) -> Client {
        Client::new(self.clone(), "default")
    }
}

impl State {
    fn bump(&mut self) -> String {
        self.next_resource_version += 1;
        self.next_resource_version.to_string()
    }

    fn prepare_new(&mut self, mut object: Value) -> Value {
        let rv = self.bump();
        let name = object["metadata"]["name"].as_str().unwrap_or("obj").to_string();
        let metadata = &mut object["metadata"];
        metadata["resourceVersion"] = json!(rv);
        if metadata.get("uid").is_none() {
            metadata["uid"] = json!(format!("uid-{}", name));
        }
        if metadata.get("creationTimestamp").is_none() {
            metadata["creationTimestamp"] = json!("2026-01-01T00:00:00Z");
        }
        normalize_secret(&mut object);
        object
    }

    fn handle(&mut self, method: &str, path: &str, body: Option<Value>) -> (u16, Value) {
        if let Some((_, _, code)) = self
            .failures
            .iter()
            .find(|(m, p, _)| m == method && p == path)
        {
            return (*code, status_json(*code, "injected failure"));
        }

        let (item_path, status_subresource) = match path.strip_suffix("/status") {
            Some(p) => (p.to_string(), true),
            None => (path.to_string(), false),
        };

        match method {
            "GET" => match self.objects.get(&item_path) {
                Some(obj) => (200, obj.clone()),
                None => (404, status_json(404, &format!("{} not found", item_path))),
            },
            "POST" => {
                let Some(object) = body else {
                    return (400, status_json(400, "missing body"));
                };
                let name = object["metadata"]["name"].as_str().unwrap_or_default().to_string();
                let key = format!("{}/{}", path, name);
                if self.objects.contains_key(&key) {
                    return (409, status_json(409, &format!("{} already exists", key)));
                }
                let stored = self.prepare_new(object);
                self.objects.insert(key, stored.clone());
                (201, stored)
            }
            "PATCH" | "PUT" => {
                let Some(incoming) = body else {
                    return (400, status_json(400, "missing body"));
                };
                let Some(current) = self.objects.get(&item_path).cloned() else {
                    return (404, status_json(404, &format!("{} not found", item_path)));
                };
                if let Some(expected) = incoming["metadata"]["resourceVersion"].as_str() {
                    if current["metadata"]["resourceVersion"].as_str() != Some(expected) {
                        return (409, status_json(409, "the object has been modified"));
                    }
                }

                let mut updated = current.clone();
                if method == "PUT" {
                    updated = incoming;
                    updated["metadata"]["uid"] = current["metadata"]["uid"].clone();
                    updated["metadata"]["creationTimestamp"] =
                        current["metadata"]["creationTimestamp"].clone();
                } else if status_subresource {
                    merge_patch(&mut updated["status"], &incoming["status"]);
                } else {
                    let mut patch = incoming;
                    if let Some(meta) = patch.get_mut("metadata").and_then(Value::as_object_mut) {
                        meta.remove("resourceVersion");
                    }
                    merge_patch(&mut updated, &patch);
                }
                normalize_secret(&mut updated);

                if updated != current {
                    updated["metadata"]["resourceVersion"] = json!(self.bump());
                } else {
                    updated["metadata"]["resourceVersion"] =
                        current["metadata"]["resourceVersion"].clone();
                }
                self.objects.insert(item_path, updated.clone());
                (200, updated)
            }
            _ => (405, status_json(405, "method not allowed")),
        }
    }
}

/// RFC 7386 JSON merge patch
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = json!({});
    }
    let target_map = target.as_object_mut().unwrap();
    for (key, value) in patch_map {
        if value.is_null() {
            target_map.remove(key);
        } else {
            merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
        }
    }
}

fn normalize_secret(object: &mut Value) {
    if object["kind"] != "Secret" {
        return;
    }
    let Some(string_data) = object
        .as_object_mut()
        .and_then(|o| o.remove("stringData"))
    else {
        return;
    };
    if !object["data"].is_object() {
        object["data"] = json!({});
    }
    if let Value::Object(entries) = string_data {
        for (k, v) in entries {
            let encoded = STANDARD.encode(v.as_str().unwrap_or_default());
            object["data"][k] = json!(encoded);
        }
    }
}

fn status_json(code: u16, message: &str) -> Value {
    let reason = match code {
        404 => "NotFound",
        409 => "Conflict",
        _ => "InternalError",
    };
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
}

impl Service<Request<Body>> for FakeApiServer {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let state = self.state.clone();

        Box::pin(async move {
            let method = req.method().to_string();
            let path = req.uri().path().to_string();
            let bytes = req.into_body().collect().await?.to_bytes();
            let body: Option<Value> = if bytes.is_empty() {
                None
            } else {
                Some(serde_json::from_slice(&bytes)?)
            };

            let (status, response) = {
                let mut state = state.lock().unwrap();
                state.requests.push(RecordedRequest {
                    method: method.clone(),
                    path: path.clone(),
                    body: body.clone(),
                });
                state.handle(&method, &path, body)
            };

            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&response)?))
                .unwrap())
        })
    }
}

/// Item path of a namespaced core/v1 Secret
pub fn secret_path(namespace: &str, name: &str) -> String {
    format!("/api/v1/namespaces/{}/secrets/{}", namespace, name)
}

pub fn secrets_collection(namespace: &str) -> String {
    format!("/api/v1/namespaces/{}/secrets", namespace)
}

pub fn service_accounts_collection(namespace: &str) -> String {
    format!("/api/v1/namespaces/{}/serviceaccounts", namespace)
}

pub fn dpa_collection(namespace: &str) -> String {
    format!(
        "/apis/oadp.openshift.io/v1alpha1/namespaces/{}/dataprotectionapplications",
        namespace
    )
}

/// Secret JSON with plain-text values stored base64 encoded in `data`
pub fn secret_json(namespace: &str, name: &str, data: &[(&str, &str)]) -> Value {
    let data: serde_json::Map<String, Value> = data
        .iter()
        .map(|(k, v)| (k.to_string(), json!(STANDARD.encode(v))))
        .collect();
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {"name": name, "namespace": namespace},
        "data": data
    })
}

pub fn service_account_json(namespace: &str, name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ServiceAccount",
        "metadata": {"name": name, "namespace": namespace}
    })
}

/// A valid DataProtectionApplication with one AWS backup location
pub fn dpa_json(namespace: &str, name: &str) -> Value {
    json!({
        "apiVersion": "oadp.openshift.io/v1alpha1",
        "kind": "DataProtectionApplication",
        "metadata": {"name": name, "namespace": namespace, "generation": 1},
        "spec": {
            "backupLocations": [{
                "provider": "aws",
                "objectStorage": {"bucket": "velero-backups"},
                "default": true
            }],
            "configuration": {"velero": {"defaultPlugins": ["aws"]}}
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub object_name: Option<String>,
    pub type_: String,
    pub reason: String,
    pub note: Option<String>,
}

/// Event publisher that keeps everything it is asked to publish
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventPublisher {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        note: Option<String>,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            object_name: resource_ref.name.clone(),
            type_: format!("{:?}", type_),
            reason: reason.to_string(),
            note,
        });
    }
}

/// Serve one canned response per connection, in order, on an ephemeral local port.
///
/// Returns the base URL and a handle resolving to the raw request texts.
pub async fn serve_http(
    responses: Vec<(u16, &'static str)>,
) -> (String, tokio::task::JoinHandle<Vec<String>>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 8192];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw);
                if let Some(end) = text.find("\r\n\r\n") {
                    let content_length = text[..end]
                        .lines()
                        .filter_map(|l| l.split_once(':'))
                        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            requests.push(String::from_utf8_lossy(&raw).into_owned());
        }
        requests
    });

    (url, handle)
}

pub async fn serve_http_once(
    status: u16,
    body: &'static str,
) -> (String, tokio::task::JoinHandle<String>) {
    let (url, requests) = serve_http(vec![(status, body)]).await;
    let handle = tokio::spawn(async move { requests.await.unwrap().remove(0) });
    (url, handle)
}
