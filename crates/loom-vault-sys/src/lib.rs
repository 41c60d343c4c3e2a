// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Control-plane client for a secret store.
//!
//! This crate provides:
//! - [`UnsealCoordinator`]: seal status and the threshold unseal protocol
//! - [`InitializationController`]: one-shot initialization producing the root
//!   token and key shares
//! - [`MountRegistry`]: audit and auth backend mounts, tuning and audit hashing
//! - [`CapabilityEvaluator`]: token and accessor capabilities on a path
//! - [`SystemClient`]: all of the above over one shared [`Transport`]
//!
//! The components hold no state and no cache. Every call is one request to
//! the remote system through a [`Transport`]; [`HttpTransport`] is the
//! reqwest-backed default.

pub mod capabilities;
mod client;
pub mod config;
pub mod error;
mod http;
pub mod init;
pub mod mounts;
pub mod path;
mod request;
pub mod seal;
pub mod transport;

pub use capabilities::{CapabilityEvaluator, TokenCapability};
pub use client::SystemClient;
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError, RetrySettings};
pub use error::{Result, VaultSysError};
pub use http::HttpTransport;
pub use init::{InitOptions, InitOutcome, InitializationController, MasterCredentials};
pub use mounts::{AuditBackend, AuditHash, AuthBackend, BackendConfig, BackendMount, MountKind, MountRegistry};
pub use path::normalize_path;
pub use seal::{SealState, SealStatus, UnsealCoordinator};
pub use transport::{Method, Transport, TransportError, TransportResponse};

pub use loom_common_secret::SecretString;
