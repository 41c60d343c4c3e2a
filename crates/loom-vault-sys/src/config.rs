// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Transport configuration.
//!
//! A [`ClientConfig`] is passed explicitly to every client at construction;
//! nothing is read from ambient process state, so clients for different
//! clusters can coexist in one process. The struct deserializes with serde,
//! leaving the file format to the embedding application.

use std::time::Duration;

use loom_common_http::RetryConfig;
use loom_common_secret::SecretString;
use serde::Deserialize;
use url::Url;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Errors that can occur while building or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Missing required field: {0}")]
	MissingField(String),

	#[error("Invalid value for {field}: {message}")]
	InvalidValue { field: String, message: String },

	#[error("failed to build HTTP client: {0}")]
	HttpClient(#[from] reqwest::Error),
}

impl ConfigError {
	pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
		Self::InvalidValue {
			field: field.into(),
			message: message.into(),
		}
	}
}

/// Retry settings for idempotent reads, in serializable form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
	pub max_attempts: u32,
	pub base_delay_ms: u64,
	pub max_delay_ms: u64,
	pub jitter: bool,
}

impl Default for RetrySettings {
	fn default() -> Self {
		let defaults = RetryConfig::default();
		Self {
			max_attempts: defaults.max_attempts,
			base_delay_ms: defaults.base_delay.as_millis() as u64,
			max_delay_ms: defaults.max_delay.as_millis() as u64,
			jitter: defaults.jitter,
		}
	}
}

impl RetrySettings {
	pub fn to_retry_config(&self) -> RetryConfig {
		RetryConfig {
			max_attempts: self.max_attempts,
			base_delay: Duration::from_millis(self.base_delay_ms),
			max_delay: Duration::from_millis(self.max_delay_ms),
			jitter: self.jitter,
			..RetryConfig::default()
		}
	}
}

fn default_timeout_ms() -> u64 {
	DEFAULT_TIMEOUT_MS
}

/// Connection settings for one secret-store cluster.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
	/// Base address, e.g. `https://vault.internal:8200`.
	pub address: Url,
	/// Token sent with every request. Initialization and unseal work without one.
	#[serde(default)]
	pub token: Option<SecretString>,
	#[serde(default)]
	pub namespace: Option<String>,
	/// Per-request timeout in milliseconds.
	#[serde(default = "default_timeout_ms")]
	pub request_timeout_ms: u64,
	#[serde(default)]
	pub retry: RetrySettings,
	#[serde(default)]
	pub user_agent: Option<String>,
}

impl ClientConfig {
	pub fn new(address: Url) -> Self {
		Self {
			address,
			token: None,
			namespace: None,
			request_timeout_ms: DEFAULT_TIMEOUT_MS,
			retry: RetrySettings::default(),
			user_agent: None,
		}
	}

	pub fn builder() -> ClientConfigBuilder {
		ClientConfigBuilder::default()
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}

	/// Checks the address scheme, timeout, retry and namespace settings.
	pub fn validate(&self) -> Result<(), ConfigError> {
		match self.address.scheme() {
			"http" | "https" => {}
			other => {
				return Err(ConfigError::invalid_value(
					"address",
					format!("scheme must be http or https, got '{other}'"),
				))
			}
		}
		if self.address.host_str().is_none() {
			return Err(ConfigError::invalid_value("address", "must include a host"));
		}
		if self.request_timeout_ms == 0 {
			return Err(ConfigError::invalid_value(
				"request_timeout_ms",
				"must be greater than zero",
			));
		}
		if self.retry.max_attempts == 0 {
			return Err(ConfigError::invalid_value(
				"retry.max_attempts",
				"must be at least 1",
			));
		}
		if let Some(namespace) = &self.namespace {
			if namespace.trim_matches('/').is_empty() {
				return Err(ConfigError::invalid_value("namespace", "must not be empty"));
			}
		}
		if self.token.as_ref().is_some_and(|t| t.is_empty()) {
			return Err(ConfigError::invalid_value("token", "must not be empty"));
		}
		Ok(())
	}
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
	address: Option<String>,
	token: Option<SecretString>,
	namespace: Option<String>,
	request_timeout: Option<Duration>,
	retry: Option<RetrySettings>,
	user_agent: Option<String>,
}

impl ClientConfigBuilder {
	pub fn address(mut self, address: impl Into<String>) -> Self {
		self.address = Some(address.into());
		self
	}

	pub fn token(mut self, token: SecretString) -> Self {
		self.token = Some(token);
		self
	}

	pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
		self.namespace = Some(namespace.into());
		self
	}

	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = Some(timeout);
		self
	}

	pub fn retry(mut self, retry: RetrySettings) -> Self {
		self.retry = Some(retry);
		self
	}

	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = Some(user_agent.into());
		self
	}

	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		let raw = self.address.ok_or_else(|| ConfigError::MissingField("address".to_string()))?;
		let address =
			Url::parse(&raw).map_err(|e| ConfigError::invalid_value("address", e.to_string()))?;

		let mut config = ClientConfig::new(address);
		config.token = self.token;
		config.namespace = self.namespace;
		if let Some(timeout) = self.request_timeout {
			// Sub-millisecond timeouts round up rather than to zero.
			let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
			config.request_timeout_ms = if millis == 0 && !timeout.is_zero() { 1 } else { millis };
		}
		if let Some(retry) = self.retry {
			config.retry = retry;
		}
		config.user_agent = self.user_agent;

		config.validate()?;
		Ok(config)
	}
}
