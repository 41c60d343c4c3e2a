// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Token capability introspection.
//!
//! The remote policy engine unions every policy attached to a token and
//! reports the resulting capabilities on a path. Lookups by accessor avoid
//! handling the token itself.

use std::collections::BTreeSet;
use std::sync::Arc;

use loom_common_secret::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Result, VaultSysError};
use crate::path::require_path;
use crate::request::{api_error, send};
use crate::transport::{Method, Transport};

const INVALID_CREDENTIAL_MARKERS: &[&str] = &[
	"invalid token",
	"bad token",
	"invalid accessor",
	"token not found",
	"expired",
];

pub const DENY: &str = "deny";
pub const ROOT: &str = "root";

/// Capabilities a credential holds on one path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCapability {
	pub path: String,
	pub capabilities: BTreeSet<String>,
}

impl TokenCapability {
	/// Whether `capability` is granted. `deny` overrides everything and
	/// `root` grants everything else.
	pub fn allows(&self, capability: &str) -> bool {
		if self.capabilities.contains(DENY) {
			return false;
		}
		self.capabilities.contains(ROOT) || self.capabilities.contains(capability)
	}

	pub fn is_denied(&self) -> bool {
		self.capabilities.is_empty() || self.capabilities.contains(DENY)
	}
}

/// Answers what a credential may do on a path.
#[derive(Clone)]
pub struct CapabilityEvaluator {
	transport: Arc<dyn Transport>,
}

impl CapabilityEvaluator {
	pub fn new(transport: Arc<dyn Transport>) -> Self {
		Self { transport }
	}

	pub async fn capabilities_for_token(&self, path: &str, token: &SecretString) -> Result<TokenCapability> {
		const OP: &str = "capabilities_for_token";
		let path = require_path(OP, path)?;
		let body = json!({ "path": path, "token": token.expose() });
		self.evaluate(OP, "sys/capabilities", path, body).await
	}

	pub async fn capabilities_for_accessor(&self, path: &str, accessor: &str) -> Result<TokenCapability> {
		const OP: &str = "capabilities_for_accessor";
		let path = require_path(OP, path)?;
		let body = json!({ "path": path, "accessor": accessor });
		self.evaluate(OP, "sys/capabilities-accessor", path, body).await
	}

	/// Capabilities of the credential the transport authenticates with.
	pub async fn capabilities_for_self(&self, path: &str) -> Result<TokenCapability> {
		const OP: &str = "capabilities_for_self";
		let path = require_path(OP, path)?;
		let body = json!({ "path": path });
		self.evaluate(OP, "sys/capabilities-self", path, body).await
	}

	async fn evaluate(
		&self,
		operation: &'static str,
		resource: &str,
		path: String,
		body: Value,
	) -> Result<TokenCapability> {
		let response = send(self.transport.as_ref(), operation, Method::Post, resource, Some(body)).await?;

		if !response.is_success() {
			let invalid_credential = matches!(response.status, 400 | 404)
				|| (response.status == 403 && response.mentions(INVALID_CREDENTIAL_MARKERS));
			if invalid_credential {
				return Err(VaultSysError::not_found(operation, path));
			}
			return Err(api_error(operation, &response));
		}

		let capabilities = capabilities_from(&response.payload(), &path)
			.ok_or_else(|| VaultSysError::invalid_response(operation, "capabilities missing"))?;
		debug!(operation, path = %path, count = capabilities.len(), "capabilities evaluated");

		Ok(TokenCapability { path, capabilities })
	}
}

/// Reads the `capabilities` list, falling back to the list keyed by path.
fn capabilities_from(payload: &Value, path: &str) -> Option<BTreeSet<String>> {
	let list = payload
		.get("capabilities")
		.or_else(|| payload.get(path))?
		.as_array()?;
	Some(
		list
			.iter()
			.filter_map(Value::as_str)
			.map(str::to_string)
			.collect(),
	)
}
