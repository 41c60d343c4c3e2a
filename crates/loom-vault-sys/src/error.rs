// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the control-plane client.

use thiserror::Error;

use crate::config::ConfigError;
use crate::mounts::MountKind;
use crate::transport::TransportError;

/// Result type alias for control-plane operations.
pub type Result<T> = std::result::Result<T, VaultSysError>;

/// Errors surfaced by the control-plane components.
///
/// None of these are retried by the components themselves.
#[derive(Debug, Error)]
pub enum VaultSysError {
	/// The transport collaborator failed before a response was received.
	#[error("transport failure during {operation}: {source}")]
	Transport {
		operation: &'static str,
		#[source]
		source: TransportError,
	},

	/// The remote system rejected an unseal key share.
	#[error("unseal key share rejected: {message}")]
	InvalidShare { message: String },

	/// A second initialization was attempted.
	#[error("secret store is already initialized")]
	AlreadyInitialized,

	/// The operation requires an initialized secret store.
	#[error("{operation} requires an initialized secret store")]
	NotInitialized { operation: &'static str },

	/// A mount already occupies the path.
	#[error("{kind} mount path '{path}' is already in use")]
	MountConflict { kind: MountKind, path: String },

	/// Nothing exists at the path, or the token/accessor is unknown.
	#[error("{operation}: nothing found at '{path}'")]
	NotFound { operation: &'static str, path: String },

	/// The caller asked for something the target does not provide.
	#[error("operation '{operation}' is not supported")]
	UnsupportedOperation { operation: &'static str },

	/// A caller-supplied path is empty once separators are stripped.
	#[error("invalid path '{path}' for {operation}")]
	InvalidPath { operation: &'static str, path: String },

	/// Caller-supplied options violate an invariant.
	#[error("invalid options: {0}")]
	InvalidOptions(String),

	/// The remote answered with something that cannot be interpreted.
	#[error("unexpected response to {operation}: {message}")]
	InvalidResponse {
		operation: &'static str,
		message: String,
	},

	/// Any other non-success answer from the remote system.
	#[error("{operation} failed with status {status}: {}", .errors.join("; "))]
	Api {
		operation: &'static str,
		status: u16,
		errors: Vec<String>,
	},

	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
}

impl VaultSysError {
	pub(crate) fn invalid_response(operation: &'static str, message: impl Into<String>) -> Self {
		Self::InvalidResponse {
			operation,
			message: message.into(),
		}
	}

	pub(crate) fn not_found(operation: &'static str, path: impl Into<String>) -> Self {
		Self::NotFound {
			operation,
			path: path.into(),
		}
	}

	/// Returns the operation name when the error carries one.
	pub fn operation(&self) -> Option<&'static str> {
		match self {
			Self::Transport { operation, .. }
			| Self::NotInitialized { operation }
			| Self::NotFound { operation, .. }
			| Self::UnsupportedOperation { operation }
			| Self::InvalidPath { operation, .. }
			| Self::InvalidResponse { operation, .. }
			| Self::Api { operation, .. } => Some(operation),
			_ => None,
		}
	}

	/// Returns the offending path for registry mismatches.
	pub fn path(&self) -> Option<&str> {
		match self {
			Self::MountConflict { path, .. }
			| Self::NotFound { path, .. }
			| Self::InvalidPath { path, .. } => Some(path),
			_ => None,
		}
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound { .. })
	}

	pub fn is_conflict(&self) -> bool {
		matches!(self, Self::MountConflict { .. })
	}
}
