// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The transport seam consumed by every component.
//!
//! A [`Transport`] sends one request to a version-relative resource path such
//! as `sys/seal-status` and hands back the status code and decoded JSON body.
//! It owns wire encoding, authentication headers, timeouts and any retry
//! policy. Components never retry on their own.

use std::fmt;

use async_trait::async_trait;
use loom_common_http::RetryableError;
use serde_json::Value;
use thiserror::Error;

/// HTTP verbs used by the control-plane API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
	Get,
	Put,
	Post,
	Delete,
}

impl Method {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Put => "PUT",
			Self::Post => "POST",
			Self::Delete => "DELETE",
		}
	}

	/// Whether the request can be sent twice without a second effect.
	pub fn is_idempotent_read(&self) -> bool {
		matches!(self, Self::Get)
	}
}

impl fmt::Display for Method {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl From<Method> for reqwest::Method {
	fn from(method: Method) -> Self {
		match method {
			Method::Get => reqwest::Method::GET,
			Method::Put => reqwest::Method::PUT,
			Method::Post => reqwest::Method::POST,
			Method::Delete => reqwest::Method::DELETE,
		}
	}
}

/// Keys the remote adds around payloads that are never part of the payload.
const ENVELOPE_KEYS: &[&str] = &[
	"request_id",
	"lease_id",
	"renewable",
	"lease_duration",
	"data",
	"wrap_info",
	"warnings",
	"auth",
	"mount_type",
];

/// A response received from the remote system.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
	pub status: u16,
	pub body: Option<Value>,
}

impl TransportResponse {
	pub fn new(status: u16, body: Option<Value>) -> Self {
		Self { status, body }
	}

	/// A response without a body, such as `204 No Content`.
	pub fn empty(status: u16) -> Self {
		Self { status, body: None }
	}

	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Error messages reported under the `errors` key.
	pub fn errors(&self) -> Vec<String> {
		self.body
			.as_ref()
			.and_then(|body| body.get("errors"))
			.and_then(Value::as_array)
			.map(|errors| {
				errors
					.iter()
					.filter_map(|e| e.as_str().map(str::to_string))
					.collect()
			})
			.unwrap_or_default()
	}

	/// Whether any reported error contains one of `markers` (case-insensitive).
	pub fn mentions(&self, markers: &[&str]) -> bool {
		self.errors().iter().any(|message| {
			let message = message.to_lowercase();
			markers.iter().any(|marker| message.contains(marker))
		})
	}

	/// The payload of the response.
	///
	/// The remote nests payloads under `data` on newer endpoints and returns
	/// them at the top level on older ones; both shapes are accepted. For the
	/// top-level shape, envelope metadata keys are dropped.
	pub fn payload(&self) -> Value {
		let Some(body) = &self.body else {
			return Value::Null;
		};
		if let Some(data) = body.get("data").filter(|d| d.is_object()) {
			return data.clone();
		}
		match body {
			Value::Object(map) => Value::Object(
				map
					.iter()
					.filter(|(key, _)| !ENVELOPE_KEYS.contains(&key.as_str()))
					.map(|(key, value)| (key.clone(), value.clone()))
					.collect(),
			),
			other => other.clone(),
		}
	}
}

/// Failures of the transport collaborator itself.
#[derive(Debug, Error)]
pub enum TransportError {
	#[error("network error: {0}")]
	Network(#[source] reqwest::Error),

	#[error("request timed out")]
	Timeout,

	#[error("invalid URL: {0}")]
	InvalidUrl(String),

	#[error("failed to decode response body: {0}")]
	Decode(String),

	#[error("transport unavailable: {0}")]
	Unavailable(String),
}

impl From<reqwest::Error> for TransportError {
	fn from(err: reqwest::Error) -> Self {
		if err.is_timeout() {
			Self::Timeout
		} else {
			Self::Network(err)
		}
	}
}

impl RetryableError for TransportError {
	fn is_retryable(&self) -> bool {
		match self {
			Self::Network(e) => e.is_retryable(),
			Self::Timeout => true,
			Self::Unavailable(_) => true,
			Self::InvalidUrl(_) | Self::Decode(_) => false,
		}
	}
}

/// Sends one request to the remote system.
///
/// Implementations must issue exactly one logical request per call for
/// non-`GET` methods. Dropping the returned future cancels the request.
#[async_trait]
pub trait Transport: Send + Sync {
	async fn request(
		&self,
		method: Method,
		path: &str,
		body: Option<Value>,
	) -> Result<TransportResponse, TransportError>;
}
