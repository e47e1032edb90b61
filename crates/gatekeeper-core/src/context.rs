// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Caller-supplied cancellation and deadlines.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Per-call cancellation signal and optional deadline.
///
/// Every engine and leasing entry point runs its body through
/// [`CallContext::run`]. Store writes are single atomic steps, so abandoning
/// an operation never leaves a half-written record behind.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
	cancellation: CancellationToken,
	deadline: Option<Instant>,
}

impl CallContext {
	pub fn new() -> Self {
		Self::default()
	}

	/// A context whose deadline is `timeout` from now. A zero timeout means
	/// no deadline.
	pub fn with_timeout(timeout: Duration) -> Self {
		Self::new().timeout(timeout)
	}

	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
		self
	}

	pub fn deadline(mut self, deadline: Instant) -> Self {
		self.deadline = Some(deadline);
		self
	}

	pub fn cancellation(mut self, token: CancellationToken) -> Self {
		self.cancellation = token;
		self
	}

	pub fn cancellation_token(&self) -> &CancellationToken {
		&self.cancellation
	}

	pub fn cancel(&self) {
		self.cancellation.cancel();
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancellation.is_cancelled()
	}

	/// Drives `operation` to completion unless the context is cancelled or
	/// its deadline passes first.
	pub async fn run<T, F>(&self, operation: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		if self.cancellation.is_cancelled() {
			return Err(Error::Cancelled);
		}

		match self.deadline {
			Some(deadline) => {
				tokio::select! {
					biased;
					_ = self.cancellation.cancelled() => Err(Error::Cancelled),
					outcome = tokio::time::timeout_at(deadline, operation) => {
						outcome.unwrap_or(Err(Error::DeadlineExceeded))
					}
				}
			}
			None => {
				tokio::select! {
					biased;
					_ = self.cancellation.cancelled() => Err(Error::Cancelled),
					outcome = operation => outcome,
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn completes_when_not_cancelled() {
		let ctx = CallContext::new();
		let value = ctx.run(async { Ok::<_, Error>(7) }).await.unwrap();
		assert_eq!(value, 7);
	}

	#[tokio::test]
	async fn cancelled_context_short_circuits() {
		let ctx = CallContext::new();
		ctx.cancel();
		let result = ctx.run(async { Ok::<_, Error>(()) }).await;
		assert!(matches!(result, Err(Error::Cancelled)));
	}

	#[tokio::test(start_paused = true)]
	async fn deadline_elapses() {
		let ctx = CallContext::with_timeout(Duration::from_millis(50));
		let result = ctx
			.run(async {
				tokio::time::sleep(Duration::from_secs(5)).await;
				Ok::<_, Error>(())
			})
			.await;
		assert!(matches!(result, Err(Error::DeadlineExceeded)));
	}

	#[tokio::test]
	async fn cancellation_during_operation() {
		let ctx = CallContext::new();
		let token = ctx.cancellation_token().clone();
		let handle = tokio::spawn(async move {
			ctx.run(async {
				tokio::time::sleep(Duration::from_secs(30)).await;
				Ok::<_, Error>(())
			})
			.await
		});
		token.cancel();
		let result = handle.await.unwrap();
		assert!(matches!(result, Err(Error::Cancelled)));
	}

	#[test]
	fn zero_timeout_means_no_deadline() {
		let ctx = CallContext::with_timeout(Duration::ZERO);
		assert!(ctx.deadline.is_none());
	}
}
