// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use loom_vault_sys::{Method, SecretString, SystemClient, Transport, TransportError, TransportResponse};
use serde_json::{json, Map, Value};

pub const ROOT_TOKEN: &str = "hvs.mock-root";

/// A recorded request.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
	pub method: Method,
	pub path: String,
	pub body: Option<Value>,
}

#[derive(Default)]
struct State {
	initialized: bool,
	threshold: u32,
	total: u32,
	shares: Vec<String>,
	sealed: bool,
	provided: Vec<String>,
	nonce_counter: u32,
	nonce: String,
	audit: BTreeMap<String, Value>,
	auth: BTreeMap<String, Value>,
	tune: BTreeMap<String, Value>,
	grants: HashMap<String, HashMap<String, Vec<String>>>,
	accessors: HashMap<String, String>,
	offline: bool,
	unreachable: Vec<String>,
	nest_listings: bool,
	requests: Vec<Recorded>,
}

/// In-memory stand-in for the remote secret store.
///
/// Implements the subset of the system API the client uses, with the same
/// status codes and error messages, and records every request it receives.
pub struct MockVault {
	state: Mutex<State>,
}

impl MockVault {
	pub fn new() -> Arc<Self> {
		let mut state = State {
			sealed: true,
			..Default::default()
		};
		state.auth.insert(
			"token".to_string(),
			json!({
				"type": "token",
				"description": "token based credentials",
				"accessor": "auth_token_1"
			}),
		);
		Arc::new(Self {
			state: Mutex::new(state),
		})
	}

	/// Listings nested under `data` instead of at the top level.
	pub fn with_nested_listings(self: Arc<Self>) -> Arc<Self> {
		self.state.lock().unwrap().nest_listings = true;
		self
	}

	pub fn client(self: &Arc<Self>) -> SystemClient {
		SystemClient::with_transport(self.clone())
	}

	pub fn set_offline(&self, offline: bool) {
		self.state.lock().unwrap().offline = offline;
	}

	/// Fails every request to `path` at the transport level.
	pub fn set_unreachable(&self, path: &str) {
		self.state.lock().unwrap().unreachable.push(path.to_string());
	}

	pub fn clear_unreachable(&self) {
		self.state.lock().unwrap().unreachable.clear();
	}

	/// Grants `capabilities` on `path` to `token`, reachable via `accessor`.
	pub fn grant(&self, token: &str, accessor: &str, path: &str, capabilities: &[&str]) {
		let mut state = self.state.lock().unwrap();
		state
			.grants
			.entry(token.to_string())
			.or_default()
			.insert(path.to_string(), capabilities.iter().map(|c| c.to_string()).collect());
		state.accessors.insert(accessor.to_string(), token.to_string());
	}

	pub fn requests(&self) -> Vec<Recorded> {
		self.state.lock().unwrap().requests.clone()
	}

	pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
		self.requests().into_iter().filter(|r| r.path == path).collect()
	}

	pub fn clear_requests(&self) {
		self.state.lock().unwrap().requests.clear();
	}

	/// Key shares submitted to `sys/unseal`, in arrival order.
	pub fn submitted_keys(&self) -> Vec<String> {
		self.requests_to("sys/unseal")
			.into_iter()
			.filter_map(|r| r.body.and_then(|b| b.get("key").and_then(Value::as_str).map(str::to_string)))
			.collect()
	}

	pub fn audit_paths(&self) -> Vec<String> {
		self.state.lock().unwrap().audit.keys().cloned().collect()
	}

	pub fn auth_paths(&self) -> Vec<String> {
		self.state.lock().unwrap().auth.keys().cloned().collect()
	}
}

impl State {
	fn seal_status(&self) -> Value {
		let cluster_name = if self.initialized && !self.sealed {
			json!("vault-cluster-mock")
		} else {
			Value::Null
		};
		json!({
			"type": "shamir",
			"initialized": self.initialized,
			"sealed": self.sealed,
			"t": self.threshold,
			"n": self.total,
			"progress": self.provided.len(),
			"nonce": self.nonce,
			"version": "1.15.2",
			"migration": false,
			"cluster_name": cluster_name,
			"recovery_seal": false,
			"storage_type": "inmem"
		})
	}

	fn new_nonce(&mut self) {
		self.nonce_counter += 1;
		self.nonce = format!("nonce-{}", self.nonce_counter);
	}

	fn listing(&self, mounts: &BTreeMap<String, Value>) -> Value {
		let entries: Map<String, Value> = mounts
			.iter()
			.map(|(path, value)| (format!("{path}/"), value.clone()))
			.collect();
		let mut body = Map::new();
		body.insert("request_id".into(), json!("req-1"));
		body.insert("lease_id".into(), json!(""));
		body.insert("renewable".into(), json!(false));
		body.insert("lease_duration".into(), json!(0));
		if self.nest_listings {
			body.insert("data".into(), Value::Object(entries));
		} else {
			body.extend(entries);
		}
		Value::Object(body)
	}

	fn route(&mut self, method: Method, path: &str, body: Option<&Value>) -> TransportResponse {
		let segments: Vec<&str> = path.split('/').collect();
		match (method, segments.as_slice()) {
			(Method::Get, ["sys", "init"]) => ok(json!({ "initialized": self.initialized })),
			(Method::Put, ["sys", "init"]) => self.initialize(body),
			(Method::Get, ["sys", "seal-status"]) => ok(self.seal_status()),
			(Method::Put, ["sys", "unseal"]) => self.unseal(body),
			(Method::Put, ["sys", "seal"]) => {
				if !self.initialized {
					return bad_request("Vault is not initialized");
				}
				if self.sealed {
					return TransportResponse::new(503, Some(json!({ "errors": ["Vault is sealed"] })));
				}
				self.sealed = true;
				self.provided.clear();
				self.nonce.clear();
				TransportResponse::empty(204)
			}
			(Method::Get, ["sys", "audit"]) => ok(self.listing(&self.audit)),
			(Method::Put, ["sys", "audit", rest @ ..]) => {
				let path = rest.join("/");
				if self.audit.contains_key(&path) {
					return bad_request(&format!("path already in use at {path}/"));
				}
				self.audit.insert(path, strip_config(body));
				TransportResponse::empty(204)
			}
			(Method::Delete, ["sys", "audit", rest @ ..]) => {
				let path = rest.join("/");
				if self.audit.remove(&path).is_none() {
					return TransportResponse::new(404, Some(json!({ "errors": [] })));
				}
				TransportResponse::empty(204)
			}
			(Method::Post, ["sys", "audit-hash", rest @ ..]) => {
				let path = rest.join("/");
				if !self.audit.contains_key(&path) {
					return bad_request("unknown audit backend");
				}
				let input = body.and_then(|b| b.get("input")).and_then(Value::as_str).unwrap_or_default();
				let mut hasher = DefaultHasher::new();
				(path.as_str(), input).hash(&mut hasher);
				let hash = format!("hmac-sha256:{:016x}", hasher.finish());
				ok(json!({ "hash": hash, "data": { "hash": hash } }))
			}
			(Method::Get, ["sys", "auth"]) => ok(self.listing(&self.auth)),
			(Method::Get, ["sys", "auth", rest @ .., "tune"]) => {
				let path = rest.join("/");
				if !self.auth.contains_key(&path) {
					return bad_request(&format!("cannot fetch sysview for path \"{path}/\""));
				}
				let config = self.tune.get(&path).cloned().unwrap_or_else(|| {
					json!({ "default_lease_ttl": 2764800, "max_lease_ttl": 2764800, "force_no_cache": false })
				});
				ok(json!({ "data": config }))
			}
			(Method::Post, ["sys", "auth", rest @ .., "tune"]) => {
				let path = rest.join("/");
				if !self.auth.contains_key(&path) {
					return bad_request(&format!("cannot fetch sysview for path \"{path}/\""));
				}
				let entry = self.tune.entry(path).or_insert_with(|| json!({}));
				if let (Some(target), Some(Value::Object(update))) = (entry.as_object_mut(), body) {
					for (key, value) in update {
						target.insert(key.clone(), value.clone());
					}
				}
				TransportResponse::empty(204)
			}
			(Method::Post, ["sys", "auth", rest @ ..]) => {
				let path = rest.join("/");
				if self.auth.contains_key(&path) {
					return bad_request(&format!("path is already in use at {path}/"));
				}
				let mut value = body.cloned().unwrap_or_else(|| json!({}));
				if let Some(config) = value.as_object_mut().and_then(|v| v.remove("config")) {
					self.tune.insert(path.clone(), config);
				}
				if let Some(map) = value.as_object_mut() {
					map.insert("accessor".into(), json!(format!("auth_{path}_1")));
				}
				self.auth.insert(path, value);
				TransportResponse::empty(204)
			}
			(Method::Delete, ["sys", "auth", rest @ ..]) => {
				let path = rest.join("/");
				if self.auth.remove(&path).is_none() {
					return bad_request(&format!("no matching mount at \"{path}/\""));
				}
				self.tune.remove(&path);
				TransportResponse::empty(204)
			}
			(Method::Post, ["sys", "capabilities"]) => {
				let token = field(body, "token");
				self.capabilities(&token, body, "invalid token")
			}
			(Method::Post, ["sys", "capabilities-accessor"]) => {
				let accessor = field(body, "accessor");
				match self.accessors.get(&accessor).cloned() {
					Some(token) => self.capabilities(&token, body, "invalid accessor"),
					None => bad_request("invalid accessor"),
				}
			}
			(Method::Post, ["sys", "capabilities-self"]) => {
				let path = field(body, "path");
				ok(json!({ "capabilities": ["root"], path: ["root"] }))
			}
			_ => TransportResponse::new(404, Some(json!({ "errors": [] }))),
		}
	}

	fn initialize(&mut self, body: Option<&Value>) -> TransportResponse {
		if self.initialized {
			return bad_request("Vault is already initialized");
		}
		let body = body.cloned().unwrap_or_default();
		let total = body.get("secret_shares").and_then(Value::as_u64).unwrap_or(0) as u32;
		let threshold = body.get("secret_threshold").and_then(Value::as_u64).unwrap_or(0) as u32;
		if threshold == 0 || threshold > total {
			return bad_request("invalid seal configuration");
		}

		self.initialized = true;
		self.threshold = threshold;
		self.total = total;
		self.shares = (0..total).map(|i| format!("{:02x}share{:04x}", i, i * 7919 + 17)).collect();
		self.sealed = true;
		self.provided.clear();
		self.nonce.clear();

		ok(json!({
			"keys": self.shares,
			"keys_base64": self.shares.iter().map(|s| format!("b64:{s}")).collect::<Vec<_>>(),
			"root_token": ROOT_TOKEN
		}))
	}

	fn unseal(&mut self, body: Option<&Value>) -> TransportResponse {
		if !self.initialized {
			return bad_request("Vault is not initialized");
		}
		let body = body.cloned().unwrap_or_default();
		if body.get("reset").and_then(Value::as_bool).unwrap_or(false) {
			self.provided.clear();
			self.nonce.clear();
		}
		let Some(key) = body.get("key").and_then(Value::as_str) else {
			return ok(self.seal_status());
		};
		if !self.sealed {
			return ok(self.seal_status());
		}
		if !self.shares.iter().any(|s| s == key) {
			return bad_request("Unseal failed, invalid key");
		}
		if self.provided.iter().any(|s| s == key) {
			return bad_request("given key has already been provided during this generation operation");
		}
		if self.provided.is_empty() {
			self.new_nonce();
		}
		self.provided.push(key.to_string());
		if self.provided.len() as u32 >= self.threshold {
			self.sealed = false;
			self.provided.clear();
			self.nonce.clear();
		}
		ok(self.seal_status())
	}

	fn capabilities(&self, token: &str, body: Option<&Value>, invalid: &str) -> TransportResponse {
		let Some(grants) = self.grants.get(token) else {
			return bad_request(invalid);
		};
		let path = field(body, "path");
		let caps = grants.get(&path).cloned().unwrap_or_else(|| vec!["deny".to_string()]);
		ok(json!({ "capabilities": caps, path: caps, "data": { "capabilities": caps } }))
	}
}

#[async_trait]
impl Transport for MockVault {
	async fn request(
		&self,
		method: Method,
		path: &str,
		body: Option<Value>,
	) -> Result<TransportResponse, TransportError> {
		let mut state = self.state.lock().unwrap();
		if state.offline {
			return Err(TransportError::Unavailable("connection refused".to_string()));
		}
		if state.unreachable.iter().any(|p| p == path) {
			return Err(TransportError::Unavailable("connection reset".to_string()));
		}
		state.requests.push(Recorded {
			method,
			path: path.to_string(),
			body: body.clone(),
		});
		Ok(state.route(method, path, body.as_ref()))
	}
}

fn ok(body: Value) -> TransportResponse {
	TransportResponse::new(200, Some(body))
}

fn bad_request(message: &str) -> TransportResponse {
	TransportResponse::new(400, Some(json!({ "errors": [message] })))
}

fn field(body: Option<&Value>, key: &str) -> String {
	body
		.and_then(|b| b.get(key))
		.and_then(Value::as_str)
		.unwrap_or_default()
		.to_string()
}

fn strip_config(body: Option<&Value>) -> Value {
	let mut value = body.cloned().unwrap_or_else(|| json!({}));
	if let Some(map) = value.as_object_mut() {
		map.remove("config");
	}
	value
}

pub fn secrets(values: &[String]) -> Vec<SecretString> {
	values.iter().map(|v| SecretString::new(v.clone())).collect()
}

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter("loom_vault_sys=debug")
		.with_test_writer()
		.try_init();
}
