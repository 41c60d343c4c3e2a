// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Retry with exponential backoff and jitter.
//!
//! Callers decide what is safe to retry. Wrapping a request in [`retry`]
//! only makes sense when sending it twice cannot cause a second effect.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Backoff settings for [`retry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
	/// Total attempts including the first one. `1` disables retries.
	pub max_attempts: u32,
	/// Delay before the second attempt.
	pub base_delay: Duration,
	/// Upper bound for any single delay.
	pub max_delay: Duration,
	/// Multiplier applied to the delay after each failed attempt.
	pub backoff_factor: f64,
	/// Randomize each delay between 50% and 100% of its nominal value.
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(200),
			max_delay: Duration::from_secs(5),
			backoff_factor: 2.0,
			jitter: true,
		}
	}
}

impl RetryConfig {
	/// A configuration that never retries.
	pub fn disabled() -> Self {
		Self {
			max_attempts: 1,
			..Self::default()
		}
	}

	/// Nominal delay after `attempt` failures (1-based), before jitter.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1) as i32;
		let factor = self.backoff_factor.max(1.0).powi(exponent);
		let nominal = self.base_delay.as_secs_f64() * factor;
		let capped = nominal.min(self.max_delay.as_secs_f64());
		Duration::from_secs_f64(capped.max(0.0))
	}

	fn jittered(&self, delay: Duration) -> Duration {
		if !self.jitter || delay.is_zero() {
			return delay;
		}
		let scale = 0.5 + fastrand::f64() * 0.5;
		delay.mul_f64(scale)
	}
}

/// Errors that know whether another attempt could succeed.
pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		if self.is_timeout() || self.is_connect() {
			return true;
		}
		match self.status() {
			Some(status) => {
				status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
			}
			None => self.is_request(),
		}
	}
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `config.max_attempts` is exhausted. The last error is returned.
pub async fn retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Display,
{
	let max_attempts = config.max_attempts.max(1);
	let mut attempt = 1;

	loop {
		match operation().await {
			Ok(value) => return Ok(value),
			Err(err) if attempt < max_attempts && err.is_retryable() => {
				let delay = config.jittered(config.delay_for(attempt));
				warn!(
					attempt,
					max_attempts,
					delay_ms = delay.as_millis() as u64,
					error = %err,
					"request failed, retrying"
				);
				tokio::time::sleep(delay).await;
				attempt += 1;
			}
			Err(err) => return Err(err),
		}
	}
}
