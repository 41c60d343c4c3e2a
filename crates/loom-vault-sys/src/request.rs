// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, VaultSysError};
use crate::transport::{Method, Transport, TransportResponse};

/// Issues exactly one request and tags transport failures with `operation`.
pub(crate) async fn send(
	transport: &dyn Transport,
	operation: &'static str,
	method: Method,
	path: &str,
	body: Option<Value>,
) -> Result<TransportResponse> {
	debug!(operation, method = %method, path, "sending control-plane request");

	let response = transport
		.request(method, path, body)
		.await
		.map_err(|source| VaultSysError::Transport { operation, source })?;

	debug!(operation, status = response.status, "control-plane response received");
	Ok(response)
}

/// The catch-all mapping for a non-success response.
pub(crate) fn api_error(operation: &'static str, response: &TransportResponse) -> VaultSysError {
	VaultSysError::Api {
		operation,
		status: response.status,
		errors: response.errors(),
	}
}

pub(crate) fn decode<T: DeserializeOwned>(operation: &'static str, value: Value) -> Result<T> {
	serde_json::from_value(value).map_err(|err| VaultSysError::invalid_response(operation, err.to_string()))
}
