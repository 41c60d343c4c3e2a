// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use tracing::info;

use crate::capabilities::CapabilityEvaluator;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::http::HttpTransport;
use crate::init::InitializationController;
use crate::mounts::MountRegistry;
use crate::seal::UnsealCoordinator;
use crate::transport::Transport;

/// All control-plane components over one shared transport.
///
/// # Example
///
/// ```ignore
/// use loom_vault_sys::{ClientConfig, InitOptions, SystemClient};
///
/// let config = ClientConfig::builder()
///     .address("https://vault.internal:8200")
///     .build()?;
/// let client = SystemClient::new(&config)?;
///
/// if !client.init().init_status().await? {
///     let creds = client.init().initialize(&InitOptions::new(3, 5)).await?;
///     // distribute creds.key_shares to custodians
/// }
/// let status = client.unseal().seal_status().await?;
/// ```
#[derive(Clone)]
pub struct SystemClient {
	unseal: UnsealCoordinator,
	init: InitializationController,
	mounts: MountRegistry,
	capabilities: CapabilityEvaluator,
}

impl SystemClient {
	/// Builds a client backed by [`HttpTransport`].
	pub fn new(config: &ClientConfig) -> Result<Self> {
		let transport = HttpTransport::new(config)?;
		info!(address = %config.address, "control-plane client initialized");
		Ok(Self::with_transport(Arc::new(transport)))
	}

	pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
		Self {
			unseal: UnsealCoordinator::new(transport.clone()),
			init: InitializationController::new(transport.clone()),
			mounts: MountRegistry::new(transport.clone()),
			capabilities: CapabilityEvaluator::new(transport),
		}
	}

	pub fn unseal(&self) -> &UnsealCoordinator {
		&self.unseal
	}

	pub fn init(&self) -> &InitializationController {
		&self.init
	}

	pub fn mounts(&self) -> &MountRegistry {
		&self.mounts
	}

	pub fn capabilities(&self) -> &CapabilityEvaluator {
		&self.capabilities
	}
}
