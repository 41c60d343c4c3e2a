// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Default [`Transport`] over HTTP using reqwest.

use async_trait::async_trait;
use loom_common_http::RetryConfig;
use loom_common_secret::SecretString;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::config::{ClientConfig, ConfigError};
use crate::transport::{Method, Transport, TransportError, TransportResponse};

const API_VERSION: &str = "v1";
const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// Sends control-plane requests to `{address}/v1/{path}`.
///
/// Only `GET` requests are retried; state-changing requests are sent once.
pub struct HttpTransport {
	base_url: Url,
	http: reqwest::Client,
	token: Option<SecretString>,
	namespace: Option<String>,
	retry_config: RetryConfig,
}

impl HttpTransport {
	pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
		config.validate()?;

		let builder = match &config.user_agent {
			Some(user_agent) => loom_common_http::builder_with_user_agent(user_agent.clone()),
			None => loom_common_http::builder(),
		};
		let http = builder.timeout(config.request_timeout()).build()?;

		let mut base_url = config.address.clone();
		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());
			base_url.set_path(&path);
		}

		debug!(address = %base_url, namespace = ?config.namespace, "http transport configured");

		Ok(Self {
			base_url,
			http,
			token: config.token.clone(),
			namespace: config.namespace.clone(),
			retry_config: config.retry.to_retry_config(),
		})
	}

	fn url(&self, path: &str) -> Result<Url, TransportError> {
		self
			.base_url
			.join(&format!("{API_VERSION}/{}", path.trim_start_matches('/')))
			.map_err(|e| TransportError::InvalidUrl(e.to_string()))
	}

	fn apply_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		let req = match &self.token {
			Some(token) => req.header(TOKEN_HEADER, token.expose()),
			None => req,
		};
		match &self.namespace {
			Some(namespace) => req.header(NAMESPACE_HEADER, namespace.trim_matches('/')),
			None => req,
		}
	}

	async fn send_once(
		&self,
		method: Method,
		url: &Url,
		body: Option<&Value>,
	) -> Result<reqwest::Response, TransportError> {
		let mut req = self.http.request(method.into(), url.clone());
		if let Some(body) = body {
			req = req.json(body);
		}
		self.apply_headers(req).send().await.map_err(TransportError::from)
	}
}

#[async_trait]
impl Transport for HttpTransport {
	async fn request(
		&self,
		method: Method,
		path: &str,
		body: Option<Value>,
	) -> Result<TransportResponse, TransportError> {
		let url = self.url(path)?;

		let response = if method.is_idempotent_read() {
			loom_common_http::retry(&self.retry_config, || {
				self.send_once(method, &url, body.as_ref())
			})
			.await?
		} else {
			self.send_once(method, &url, body.as_ref()).await?
		};

		let status = response.status();
		let bytes = response.bytes().await.map_err(TransportError::from)?;
		debug!(method = %method, url = %url, status = status.as_u16(), "http request completed");

		let body = decode_body(status.is_success(), &bytes)?;
		Ok(TransportResponse::new(status.as_u16(), body))
	}
}

/// Decodes a JSON body. A non-JSON body on an error status is kept as the
/// single error message rather than failing the request.
fn decode_body(success: bool, bytes: &[u8]) -> Result<Option<Value>, TransportError> {
	if bytes.iter().all(u8::is_ascii_whitespace) {
		return Ok(None);
	}
	match serde_json::from_slice::<Value>(bytes) {
		Ok(value) => Ok(Some(value)),
		Err(_) if !success => {
			let text = String::from_utf8_lossy(bytes).trim().to_string();
			Ok(Some(json!({ "errors": [text] })))
		}
		Err(err) => Err(TransportError::Decode(err.to_string())),
	}
}
