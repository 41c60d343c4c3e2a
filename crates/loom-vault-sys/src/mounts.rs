// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Registry of audit and authentication backend mounts.
//!
//! Audit and auth mounts live in disjoint namespaces: the same path may be
//! mounted in both kinds at once. Within a kind the path is unique and the
//! remote reports a second mount at an occupied path as a conflict.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Result, VaultSysError};
use crate::path::require_path;
use crate::request::{api_error, decode, send};
use crate::transport::{Method, Transport, TransportResponse};

const CONFLICT_MARKERS: &[&str] = &["already in use", "existing mount"];
const NOT_FOUND_MARKERS: &[&str] = &[
	"no matching mount",
	"no audit backend",
	"unknown audit backend",
	"no auth backend",
	"cannot fetch sysview",
	"not found",
];

/// The two mount namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MountKind {
	Audit,
	Auth,
}

impl MountKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Audit => "audit",
			Self::Auth => "auth",
		}
	}

	fn resource(&self, path: &str) -> String {
		format!("sys/{}/{path}", self.as_str())
	}

	fn listing(&self) -> String {
		format!("sys/{}", self.as_str())
	}
}

impl fmt::Display for MountKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Tunable parameters of a mounted backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
	/// Default lease TTL in seconds.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub default_lease_ttl: Option<u64>,
	/// Maximum lease TTL in seconds.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_lease_ttl: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub force_no_cache: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub audit_non_hmac_request_keys: Vec<String>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub audit_non_hmac_response_keys: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub listing_visibility: Option<String>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub passthrough_request_headers: Vec<String>,
}

/// A mounted (or to-be-mounted) audit or auth backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendMount {
	/// Mount path. Blank means "use the backend type".
	pub path: String,
	pub backend_type: String,
	pub description: String,
	pub local: bool,
	/// Backend-specific options, e.g. `file_path` for a file audit sink.
	pub options: BTreeMap<String, Value>,
	/// Tuned parameters; only meaningful for auth backends.
	pub config: Option<BackendConfig>,
	/// Reported by the remote for auth mounts.
	pub accessor: Option<String>,
}

pub type AuditBackend = BackendMount;
pub type AuthBackend = BackendMount;

impl BackendMount {
	pub fn new(backend_type: impl Into<String>) -> Self {
		Self {
			backend_type: backend_type.into(),
			..Self::default()
		}
	}

	pub fn at_path(mut self, path: impl Into<String>) -> Self {
		self.path = path.into();
		self
	}

	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = description.into();
		self
	}

	pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.options.insert(key.into(), value.into());
		self
	}

	pub fn with_config(mut self, config: BackendConfig) -> Self {
		self.config = Some(config);
		self
	}

	pub fn local(mut self, local: bool) -> Self {
		self.local = local;
		self
	}

	/// The path this backend will be mounted at: its own path, or its type
	/// when the path is blank.
	pub fn effective_path(&self) -> &str {
		if self.path.trim().trim_matches('/').is_empty() {
			&self.backend_type
		} else {
			&self.path
		}
	}

	fn mount_body(&self, kind: MountKind) -> Value {
		let mut body = Map::new();
		body.insert("type".into(), json!(self.backend_type));
		body.insert("description".into(), json!(self.description));
		body.insert("local".into(), json!(self.local));
		if !self.options.is_empty() {
			body.insert("options".into(), json!(self.options));
		}
		if kind == MountKind::Auth {
			if let Some(config) = &self.config {
				body.insert("config".into(), json!(config));
			}
		}
		Value::Object(body)
	}
}

/// Keyed digest produced by an audit backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditHash {
	pub hash: String,
}

/// A listing value as the remote reports it: without its own path.
#[derive(Debug, Deserialize)]
struct MountEntry {
	#[serde(rename = "type")]
	backend_type: String,
	#[serde(default)]
	description: String,
	#[serde(default)]
	local: bool,
	#[serde(default)]
	options: Option<BTreeMap<String, Value>>,
	#[serde(default)]
	config: Option<BackendConfig>,
	#[serde(default)]
	accessor: Option<String>,
}

/// Builds a new path-keyed map from a listing payload, setting each value's
/// `path` from its key. The payload itself is not modified.
pub(crate) fn stitch_mount_paths(payload: &Value) -> std::result::Result<BTreeMap<String, BackendMount>, String> {
	let Some(entries) = payload.as_object() else {
		return Err(format!("expected an object of mounts, got {payload}"));
	};

	entries
		.iter()
		.filter(|(_, value)| value.is_object())
		.map(|(key, value)| {
			let entry: MountEntry = serde_json::from_value(value.clone())
				.map_err(|err| format!("mount '{key}': {err}"))?;
			let mount = BackendMount {
				path: key.clone(),
				backend_type: entry.backend_type,
				description: entry.description,
				local: entry.local,
				options: entry.options.unwrap_or_default(),
				config: entry.config,
				accessor: entry.accessor,
			};
			Ok((key.clone(), mount))
		})
		.collect()
}

/// Tracks mounted audit and authentication backends.
#[derive(Clone)]
pub struct MountRegistry {
	transport: Arc<dyn Transport>,
}

impl MountRegistry {
	pub fn new(transport: Arc<dyn Transport>) -> Self {
		Self { transport }
	}

	pub async fn list_audit_backends(&self) -> Result<BTreeMap<String, AuditBackend>> {
		self.list(MountKind::Audit, "list_audit_backends").await
	}

	/// Mounts an audit backend; the path defaults to the backend type.
	pub async fn mount_audit_backend(&self, backend: &AuditBackend) -> Result<()> {
		self.mount(MountKind::Audit, "mount_audit_backend", backend).await
	}

	pub async fn unmount_audit_backend(&self, path: &str) -> Result<()> {
		self.unmount(MountKind::Audit, "unmount_audit_backend", path).await
	}

	/// Hashes `input` with the keyed hash of the audit backend at `mount_path`.
	pub async fn audit_hash(&self, mount_path: &str, input: &str) -> Result<AuditHash> {
		const OP: &str = "audit_hash";
		let path = require_path(OP, mount_path)?;
		let resource = format!("sys/audit-hash/{path}");
		let body = json!({ "input": input });

		let response = send(self.transport.as_ref(), OP, Method::Post, &resource, Some(body)).await?;
		if !response.is_success() {
			return Err(not_found_or_api(OP, &path, &response));
		}
		decode(OP, response.payload())
	}

	/// Hashing without naming an audit backend is not supported; no backend is
	/// picked on the caller's behalf.
	pub async fn hash_with_default_audit_backend(&self, _input: &str) -> Result<AuditHash> {
		Err(VaultSysError::UnsupportedOperation {
			operation: "hash_with_default_audit_backend",
		})
	}

	pub async fn list_auth_backends(&self) -> Result<BTreeMap<String, AuthBackend>> {
		self.list(MountKind::Auth, "list_auth_backends").await
	}

	/// Mounts an auth method; the path defaults to the backend type.
	pub async fn mount_auth_backend(&self, backend: &AuthBackend) -> Result<()> {
		self.mount(MountKind::Auth, "mount_auth_backend", backend).await
	}

	pub async fn unmount_auth_backend(&self, path: &str) -> Result<()> {
		self.unmount(MountKind::Auth, "unmount_auth_backend", path).await
	}

	/// Reads the tuning parameters of a mounted auth backend.
	pub async fn auth_backend_config(&self, path: &str) -> Result<BackendConfig> {
		const OP: &str = "auth_backend_config";
		let path = require_path(OP, path)?;
		let resource = format!("{}/tune", MountKind::Auth.resource(&path));

		let response = send(self.transport.as_ref(), OP, Method::Get, &resource, None).await?;
		if !response.is_success() {
			return Err(not_found_or_api(OP, &path, &response));
		}
		decode(OP, response.payload())
	}

	/// Writes tuning parameters of a mounted auth backend.
	pub async fn tune_auth_backend(&self, path: &str, config: &BackendConfig) -> Result<()> {
		const OP: &str = "tune_auth_backend";
		let path = require_path(OP, path)?;
		let resource = format!("{}/tune", MountKind::Auth.resource(&path));
		let body = serde_json::to_value(config)
			.map_err(|err| VaultSysError::InvalidOptions(err.to_string()))?;

		let response = send(self.transport.as_ref(), OP, Method::Post, &resource, Some(body)).await?;
		if !response.is_success() {
			return Err(not_found_or_api(OP, &path, &response));
		}
		info!(path = %path, "auth backend tuned");
		Ok(())
	}

	async fn list(&self, kind: MountKind, operation: &'static str) -> Result<BTreeMap<String, BackendMount>> {
		let response = send(self.transport.as_ref(), operation, Method::Get, &kind.listing(), None).await?;
		if !response.is_success() {
			return Err(api_error(operation, &response));
		}

		let mounts = stitch_mount_paths(&response.payload())
			.map_err(|message| VaultSysError::invalid_response(operation, message))?;
		debug!(kind = %kind, count = mounts.len(), "listed mounts");
		Ok(mounts)
	}

	async fn mount(&self, kind: MountKind, operation: &'static str, backend: &BackendMount) -> Result<()> {
		if backend.backend_type.trim().is_empty() {
			return Err(VaultSysError::InvalidOptions(format!(
				"{kind} backend type must not be empty"
			)));
		}
		let path = require_path(operation, backend.effective_path())?;
		let method = match kind {
			MountKind::Audit => Method::Put,
			MountKind::Auth => Method::Post,
		};

		let response = send(
			self.transport.as_ref(),
			operation,
			method,
			&kind.resource(&path),
			Some(backend.mount_body(kind)),
		)
		.await?;

		if !response.is_success() {
			if response.status == 409 || response.mentions(CONFLICT_MARKERS) {
				warn!(kind = %kind, path = %path, "mount path already in use");
				return Err(VaultSysError::MountConflict { kind, path });
			}
			return Err(api_error(operation, &response));
		}

		info!(kind = %kind, path = %path, backend_type = %backend.backend_type, "backend mounted");
		Ok(())
	}

	async fn unmount(&self, kind: MountKind, operation: &'static str, path: &str) -> Result<()> {
		let path = require_path(operation, path)?;
		let response = send(
			self.transport.as_ref(),
			operation,
			Method::Delete,
			&kind.resource(&path),
			None,
		)
		.await?;

		if !response.is_success() {
			return Err(not_found_or_api(operation, &path, &response));
		}

		info!(kind = %kind, path = %path, "backend unmounted");
		Ok(())
	}
}

fn not_found_or_api(operation: &'static str, path: &str, response: &TransportResponse) -> VaultSysError {
	if response.status == 404 || response.mentions(NOT_FOUND_MARKERS) {
		return VaultSysError::not_found(operation, path);
	}
	api_error(operation, response)
}
