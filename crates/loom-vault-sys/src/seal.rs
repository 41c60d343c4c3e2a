// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Seal state and the threshold unseal protocol.
//!
//! The remote system accumulates key shares for the current unseal session
//! (identified by its nonce) and unseals once `threshold` distinct shares
//! have been submitted. The client keeps no session state of its own: every
//! call returns the status as reported by the remote system.
//!
//! ```text
//! Uninitialized --(initialize)--> Sealed { progress: 0 }
//! Sealed { p } --(submit_share)--> Sealed { p + 1 }   while p + 1 < threshold
//! Sealed { p } --(submit_share)--> Unsealed           when p + 1 == threshold
//! Unsealed     --(seal)---------> Sealed { progress: 0 }
//! ```

use std::sync::Arc;

use loom_common_secret::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{Result, VaultSysError};
use crate::request::{api_error, decode, send};
use crate::transport::{Method, Transport};

const SEAL_STATUS_PATH: &str = "sys/seal-status";
const UNSEAL_PATH: &str = "sys/unseal";
const SEAL_PATH: &str = "sys/seal";

const NOT_INITIALIZED_MARKERS: &[&str] = &["not initialized"];
const ALREADY_SEALED_MARKERS: &[&str] = &["is sealed", "already sealed"];

fn default_initialized() -> bool {
	true
}

/// Seal status as reported by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealStatus {
	/// Older servers omit this field; they only answer once initialized.
	#[serde(default = "default_initialized")]
	pub initialized: bool,
	pub sealed: bool,
	/// Number of shares required to unseal.
	#[serde(rename = "t", default)]
	pub threshold: u32,
	/// Total number of shares issued at initialization.
	#[serde(rename = "n", default)]
	pub total_shares: u32,
	/// Shares accepted so far in the current unseal session.
	#[serde(default)]
	pub progress: u32,
	/// Identity of the current unseal session.
	#[serde(default)]
	pub nonce: String,
	#[serde(default)]
	pub version: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cluster_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cluster_id: Option<String>,
	#[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
	pub seal_type: Option<String>,
	#[serde(default)]
	pub migration: bool,
	#[serde(default)]
	pub recovery_seal: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub storage_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub build_date: Option<String>,
}

/// Position of the secret store in the seal state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealState {
	Uninitialized,
	Sealed { progress: u32, threshold: u32 },
	Unsealed,
}

impl SealStatus {
	pub fn state(&self) -> SealState {
		if !self.initialized {
			SealState::Uninitialized
		} else if self.sealed {
			SealState::Sealed {
				progress: self.progress,
				threshold: self.threshold,
			}
		} else {
			SealState::Unsealed
		}
	}

	/// Shares still needed in the current session; zero once unsealed.
	pub fn remaining_shares(&self) -> u32 {
		if self.sealed {
			self.threshold.saturating_sub(self.progress)
		} else {
			0
		}
	}

	fn check(self, operation: &'static str) -> Result<Self> {
		if self.threshold > 0 && self.progress > self.threshold {
			return Err(VaultSysError::invalid_response(
				operation,
				format!(
					"progress {} exceeds threshold {}",
					self.progress, self.threshold
				),
			));
		}
		Ok(self)
	}
}

/// Drives the sealed to unsealed transition.
#[derive(Clone)]
pub struct UnsealCoordinator {
	transport: Arc<dyn Transport>,
}

impl UnsealCoordinator {
	pub fn new(transport: Arc<dyn Transport>) -> Self {
		Self { transport }
	}

	/// Returns the current seal status. Never mutates remote state.
	pub async fn seal_status(&self) -> Result<SealStatus> {
		const OP: &str = "seal_status";
		let response = send(self.transport.as_ref(), OP, Method::Get, SEAL_STATUS_PATH, None).await?;
		if !response.is_success() {
			if response.mentions(NOT_INITIALIZED_MARKERS) {
				return Err(VaultSysError::NotInitialized { operation: OP });
			}
			return Err(api_error(OP, &response));
		}
		decode::<SealStatus>(OP, response.payload())?.check(OP)
	}

	/// Submits one key share toward the threshold.
	///
	/// With `reset_session`, the remote discards partial progress before
	/// applying this share. A rejected share is reported as
	/// [`VaultSysError::InvalidShare`]; resubmitting it cannot succeed.
	pub async fn submit_share(&self, share: &SecretString, reset_session: bool) -> Result<SealStatus> {
		const OP: &str = "submit_share";
		if share.expose().trim().is_empty() {
			return Err(VaultSysError::InvalidShare {
				message: "key share is empty".to_string(),
			});
		}

		let body = json!({
			"key": share.expose(),
			"reset": reset_session,
		});
		let status = self.unseal_request(OP, body).await?;

		if status.sealed {
			debug!(
				progress = status.progress,
				threshold = status.threshold,
				nonce = %status.nonce,
				"key share accepted"
			);
		} else {
			info!(cluster_name = ?status.cluster_name, "secret store unsealed");
		}
		Ok(status)
	}

	/// Discards partial progress of the current unseal session.
	pub async fn reset_progress(&self) -> Result<SealStatus> {
		let status = self.unseal_request("reset_progress", json!({ "reset": true })).await?;
		info!(threshold = status.threshold, "unseal progress reset");
		Ok(status)
	}

	/// Submits `shares` one at a time, in order, until the store unseals.
	///
	/// Stops at the first status reporting `sealed == false` without sending
	/// the remaining shares, and stops at the first failure without trying
	/// the rest. With no shares, returns the current status.
	pub async fn unseal_with_all_shares(&self, shares: &[SecretString]) -> Result<SealStatus> {
		if shares.is_empty() {
			return self.seal_status().await;
		}

		let mut last = None;
		for (index, share) in shares.iter().enumerate() {
			let status = match self.submit_share(share, false).await {
				Ok(status) => status,
				Err(err) => {
					warn!(share_index = index, error = %err, "unseal aborted");
					return Err(err);
				}
			};
			if !status.sealed {
				debug!(
					submitted = index + 1,
					skipped = shares.len() - index - 1,
					"threshold reached"
				);
				return Ok(status);
			}
			last = Some(status);
		}

		last.ok_or_else(|| VaultSysError::invalid_response("unseal_with_all_shares", "no status"))
	}

	/// Seals the store. Sealing an already sealed store succeeds.
	pub async fn seal(&self) -> Result<()> {
		const OP: &str = "seal";
		let response = send(self.transport.as_ref(), OP, Method::Put, SEAL_PATH, None).await?;
		if response.is_success() {
			info!("secret store sealed");
			return Ok(());
		}
		if response.mentions(ALREADY_SEALED_MARKERS) {
			debug!("secret store was already sealed");
			return Ok(());
		}
		Err(api_error(OP, &response))
	}

	async fn unseal_request(&self, operation: &'static str, body: serde_json::Value) -> Result<SealStatus> {
		let carries_share = body.get("key").is_some();
		let response = send(self.transport.as_ref(), operation, Method::Put, UNSEAL_PATH, Some(body)).await?;

		if !response.is_success() {
			if response.mentions(NOT_INITIALIZED_MARKERS) {
				return Err(VaultSysError::NotInitialized { operation });
			}
			if carries_share && response.status == 400 {
				let message = response.errors().join("; ");
				warn!(operation, message = %message, "unseal request rejected");
				return Err(VaultSysError::InvalidShare { message });
			}
			return Err(api_error(operation, &response));
		}

		decode::<SealStatus>(operation, response.payload())?.check(operation)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn status(json: serde_json::Value) -> SealStatus {
		serde_json::from_value(json).unwrap()
	}

	#[test]
	fn deserializes_wire_field_names() {
		let s = status(json!({
			"type": "shamir",
			"initialized": true,
			"sealed": true,
			"t": 3,
			"n": 5,
			"progress": 2,
			"nonce": "6f0c",
			"version": "1.15.2",
			"cluster_name": "vault-cluster-1",
			"migration": false,
			"recovery_seal": false,
			"storage_type": "raft"
		}));
		assert_eq!(s.threshold, 3);
		assert_eq!(s.total_shares, 5);
		assert_eq!(s.progress, 2);
		assert_eq!(s.seal_type.as_deref(), Some("shamir"));
		assert_eq!(s.cluster_name.as_deref(), Some("vault-cluster-1"));
		assert_eq!(s.state(), SealState::Sealed { progress: 2, threshold: 3 });
		assert_eq!(s.remaining_shares(), 1);
	}

	#[test]
	fn missing_initialized_defaults_to_true() {
		let s = status(json!({"sealed": false, "t": 1, "n": 1}));
		assert!(s.initialized);
		assert_eq!(s.state(), SealState::Unsealed);
		assert_eq!(s.remaining_shares(), 0);
	}

	#[test]
	fn uninitialized_state() {
		let s = status(json!({"initialized": false, "sealed": true, "t": 0, "n": 0}));
		assert_eq!(s.state(), SealState::Uninitialized);
	}

	#[test]
	fn progress_above_threshold_is_rejected() {
		let s = status(json!({"sealed": true, "t": 2, "n": 3, "progress": 3}));
		let err = s.check("seal_status").unwrap_err();
		assert!(matches!(err, VaultSysError::InvalidResponse { .. }));
	}

	#[test]
	fn serializes_back_to_wire_names() {
		let s = status(json!({"sealed": true, "t": 2, "n": 3, "progress": 1}));
		let value = serde_json::to_value(&s).unwrap();
		assert_eq!(value["t"], 2);
		assert_eq!(value["n"], 3);
	}
}
