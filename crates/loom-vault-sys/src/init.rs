// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! First-time initialization of the secret store.
//!
//! Initialization is the only way out of the uninitialized state and it
//! happens once. The returned [`MasterCredentials`] are the only time the full
//! share set is visible together; hand each share to its custodian and drop
//! the rest. Nothing here is persisted or retried.

use std::sync::Arc;

use loom_common_secret::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, VaultSysError};
use crate::request::{api_error, decode, send};
use crate::seal::{SealStatus, UnsealCoordinator};
use crate::transport::{Method, Transport};

const INIT_PATH: &str = "sys/init";

const ALREADY_INITIALIZED_MARKERS: &[&str] = &["already initialized"];

/// Parameters for [`InitializationController::initialize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitOptions {
	/// Shares required to unseal.
	#[serde(rename = "secret_threshold")]
	pub share_threshold: u32,
	/// Shares to generate.
	#[serde(rename = "secret_shares")]
	pub total_shares: u32,
	/// One PGP public key per share; shares come back encrypted.
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub pgp_keys: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub root_token_pgp_key: Option<String>,
	/// Shares kept by an auto-unseal mechanism.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stored_shares: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub recovery_shares: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub recovery_threshold: Option<u32>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub recovery_pgp_keys: Vec<String>,
}

impl InitOptions {
	pub fn new(share_threshold: u32, total_shares: u32) -> Self {
		Self {
			share_threshold,
			total_shares,
			pgp_keys: Vec::new(),
			root_token_pgp_key: None,
			stored_shares: None,
			recovery_shares: None,
			recovery_threshold: None,
			recovery_pgp_keys: Vec::new(),
		}
	}

	pub fn with_pgp_keys(mut self, keys: Vec<String>) -> Self {
		self.pgp_keys = keys;
		self
	}

	pub fn with_root_token_pgp_key(mut self, key: impl Into<String>) -> Self {
		self.root_token_pgp_key = Some(key.into());
		self
	}

	pub fn with_recovery(mut self, threshold: u32, shares: u32) -> Self {
		self.recovery_threshold = Some(threshold);
		self.recovery_shares = Some(shares);
		self
	}

	/// Checks `1 <= share_threshold <= total_shares` and the key counts.
	pub fn validate(&self) -> Result<()> {
		if self.share_threshold == 0 {
			return Err(VaultSysError::InvalidOptions(
				"share_threshold must be at least 1".to_string(),
			));
		}
		if self.share_threshold > self.total_shares {
			return Err(VaultSysError::InvalidOptions(format!(
				"share_threshold {} exceeds total_shares {}",
				self.share_threshold, self.total_shares
			)));
		}
		if !self.pgp_keys.is_empty() && self.pgp_keys.len() != self.total_shares as usize {
			return Err(VaultSysError::InvalidOptions(format!(
				"{} pgp_keys given for {} shares",
				self.pgp_keys.len(),
				self.total_shares
			)));
		}
		if let Some(stored) = self.stored_shares {
			if stored > self.total_shares {
				return Err(VaultSysError::InvalidOptions(format!(
					"stored_shares {stored} exceeds total_shares {}",
					self.total_shares
				)));
			}
		}
		match (self.recovery_threshold, self.recovery_shares) {
			(Some(threshold), Some(shares)) if threshold == 0 || threshold > shares => {
				return Err(VaultSysError::InvalidOptions(format!(
					"recovery_threshold {threshold} must be between 1 and recovery_shares {shares}"
				)));
			}
			(Some(_), None) | (None, Some(_)) => {
				return Err(VaultSysError::InvalidOptions(
					"recovery_threshold and recovery_shares must be set together".to_string(),
				));
			}
			_ => {}
		}
		Ok(())
	}
}

/// Root credentials and the initial key-share set.
///
/// Every secret is wrapped so that `Debug` output never reveals it.
#[derive(Debug, Clone)]
pub struct MasterCredentials {
	pub root_token: SecretString,
	/// Hex-encoded key shares, in the order the remote issued them.
	pub key_shares: Vec<SecretString>,
	pub key_shares_base64: Vec<SecretString>,
	pub recovery_keys: Vec<SecretString>,
	pub share_threshold: u32,
	pub total_shares: u32,
}

/// Credentials together with the result of unsealing with them.
///
/// The credentials are returned even when unsealing fails; the store is
/// initialized at that point and they cannot be obtained again.
#[derive(Debug)]
pub struct InitOutcome {
	pub credentials: MasterCredentials,
	pub seal_status: Result<SealStatus>,
}

impl InitOutcome {
	pub fn is_unsealed(&self) -> bool {
		self.seal_status.as_ref().is_ok_and(|status| !status.sealed)
	}
}

#[derive(Debug, Deserialize)]
struct InitStatusResponse {
	initialized: bool,
}

#[derive(Debug, Deserialize)]
struct InitResponse {
	#[serde(default)]
	keys: Vec<SecretString>,
	#[serde(default)]
	keys_base64: Vec<SecretString>,
	#[serde(default)]
	recovery_keys: Vec<SecretString>,
	root_token: SecretString,
}

/// Orchestrates first-time setup.
#[derive(Clone)]
pub struct InitializationController {
	transport: Arc<dyn Transport>,
}

impl InitializationController {
	pub fn new(transport: Arc<dyn Transport>) -> Self {
		Self { transport }
	}

	/// Whether first-time setup has completed.
	pub async fn init_status(&self) -> Result<bool> {
		const OP: &str = "init_status";
		let response = send(self.transport.as_ref(), OP, Method::Get, INIT_PATH, None).await?;
		if !response.is_success() {
			return Err(api_error(OP, &response));
		}
		Ok(decode::<InitStatusResponse>(OP, response.payload())?.initialized)
	}

	/// Initializes the secret store.
	///
	/// Fails with [`VaultSysError::AlreadyInitialized`] when the remote was
	/// already initialized; a failed attempt leaves it uninitialized and may
	/// be reissued by the caller.
	pub async fn initialize(&self, options: &InitOptions) -> Result<MasterCredentials> {
		const OP: &str = "initialize";
		options.validate()?;

		let body = serde_json::to_value(options)
			.map_err(|err| VaultSysError::InvalidOptions(err.to_string()))?;
		let response = send(self.transport.as_ref(), OP, Method::Put, INIT_PATH, Some(body)).await?;

		if !response.is_success() {
			if response.mentions(ALREADY_INITIALIZED_MARKERS) {
				warn!("initialization refused, secret store is already initialized");
				return Err(VaultSysError::AlreadyInitialized);
			}
			return Err(api_error(OP, &response));
		}

		let parsed: InitResponse = decode(OP, response.payload())?;
		let credentials = credentials_from(options, parsed)?;

		info!(
			share_threshold = credentials.share_threshold,
			total_shares = credentials.total_shares,
			"secret store initialized"
		);
		Ok(credentials)
	}

	/// Initializes, then unseals with the first `share_threshold` shares.
	///
	/// Only plain shares can be submitted, so PGP-encrypted shares, stored
	/// shares and recovery mode are refused before any request. Once
	/// initialization succeeds the credentials are always returned; an
	/// unseal failure is reported in [`InitOutcome::seal_status`].
	pub async fn initialize_and_unseal(&self, options: &InitOptions) -> Result<InitOutcome> {
		const OP: &str = "initialize_and_unseal";
		if !options.pgp_keys.is_empty() {
			return Err(VaultSysError::InvalidOptions(format!(
				"{OP} cannot submit pgp-encrypted key shares"
			)));
		}
		if options.stored_shares.is_some_and(|stored| stored > 0) {
			return Err(VaultSysError::InvalidOptions(format!(
				"{OP} cannot unseal with stored key shares"
			)));
		}
		if options.recovery_shares.is_some() || options.recovery_threshold.is_some() {
			return Err(VaultSysError::InvalidOptions(format!(
				"{OP} cannot unseal in recovery mode"
			)));
		}

		let credentials = self.initialize(options).await?;
		let seal_status = self.unseal_with(&credentials).await;
		if let Err(err) = &seal_status {
			warn!(error = %err, "secret store initialized but not unsealed");
		}
		Ok(InitOutcome {
			credentials,
			seal_status,
		})
	}

	async fn unseal_with(&self, credentials: &MasterCredentials) -> Result<SealStatus> {
		let threshold = credentials.share_threshold as usize;
		if credentials.key_shares.len() < threshold {
			return Err(VaultSysError::invalid_response(
				"initialize_and_unseal",
				format!(
					"{} key shares returned, {threshold} needed to unseal",
					credentials.key_shares.len()
				),
			));
		}
		UnsealCoordinator::new(self.transport.clone())
			.unseal_with_all_shares(&credentials.key_shares[..threshold])
			.await
	}
}

fn credentials_from(options: &InitOptions, parsed: InitResponse) -> Result<MasterCredentials> {
	const OP: &str = "initialize";
	if parsed.root_token.is_empty() {
		return Err(VaultSysError::invalid_response(OP, "root token missing"));
	}

	let expected = options.total_shares - options.stored_shares.unwrap_or(0);
	if parsed.keys.len() != expected as usize && parsed.recovery_keys.is_empty() {
		return Err(VaultSysError::invalid_response(
			OP,
			format!("expected {expected} key shares, got {}", parsed.keys.len()),
		));
	}

	Ok(MasterCredentials {
		root_token: parsed.root_token,
		key_shares: parsed.keys,
		key_shares_base64: parsed.keys_base64,
		recovery_keys: parsed.recovery_keys,
		share_threshold: options.share_threshold,
		total_shares: options.total_shares,
	})
}
