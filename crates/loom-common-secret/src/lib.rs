// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret wrapper that keeps sensitive values out of logs.
//!
//! Root tokens, unseal key shares and accessors all travel through
//! [`SecretString`]. Formatting a secret with `{:?}` or `{}` prints
//! [`REDACTED`], and the inner value is zeroized when the wrapper is dropped.
//! The only way to read the value is an explicit call to [`Secret::expose`].
//!
//! With the `serde` feature enabled, secrets deserialize transparently from
//! their inner type but serialize as [`REDACTED`], so a secret can never leak
//! through a serialized debug dump. Code that must put a secret on the wire
//! builds the payload from `expose()` on purpose.

use std::fmt;

use zeroize::Zeroize;

/// Placeholder printed instead of a secret value.
pub const REDACTED: &str = "[REDACTED]";

/// A value that must never be logged.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret<T: Zeroize> {
	inner: T,
}

/// The common case: a secret string such as a token or key share.
pub type SecretString = Secret<String>;

impl<T: Zeroize> Secret<T> {
	/// Wraps a value.
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	/// Returns a reference to the secret value.
	///
	/// Every call site is a place where the secret leaves its wrapper; keep
	/// them few and obvious.
	pub fn expose(&self) -> &T {
		&self.inner
	}

	/// Consumes the wrapper and returns the value.
	pub fn into_inner(mut self) -> T
	where
		T: Default,
	{
		std::mem::take(&mut self.inner)
	}
}

impl SecretString {
	/// Returns true when the secret string is empty.
	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}
}

impl<T: Zeroize> Drop for Secret<T> {
	fn drop(&mut self) {
		self.inner.zeroize();
	}
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl<T: Zeroize> fmt::Display for Secret<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl From<String> for SecretString {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

impl From<&str> for SecretString {
	fn from(value: &str) -> Self {
		Self::new(value.to_string())
	}
}

#[cfg(feature = "serde")]
impl<'de, T> serde::Deserialize<'de> for Secret<T>
where
	T: Zeroize + serde::Deserialize<'de>,
{
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		T::deserialize(deserializer).map(Secret::new)
	}
}

#[cfg(feature = "serde")]
impl<T: Zeroize> serde::Serialize for Secret<T> {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(REDACTED)
	}
}
