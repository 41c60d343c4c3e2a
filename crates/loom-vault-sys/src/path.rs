// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Path normalization for caller-supplied mount and policy paths.
//!
//! Leading and trailing `/` are stripped before a path is joined into a
//! resource path, so `"/approle/"` and `"approle"` address the same resource.

use crate::error::{Result, VaultSysError};

pub fn normalize_path(path: &str) -> &str {
	path.trim_matches('/')
}

/// Normalizes `path` and rejects it when nothing remains.
pub(crate) fn require_path(operation: &'static str, path: &str) -> Result<String> {
	let normalized = normalize_path(path.trim());
	if normalized.is_empty() {
		return Err(VaultSysError::InvalidPath {
			operation,
			path: path.to_string(),
		});
	}
	Ok(normalized.to_string())
}
