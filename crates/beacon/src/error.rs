// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the beacon SDK.
//!
//! Nothing in the SDK propagates a panic or an error across the public
//! fire/set boundary: those methods return `bool` and park the most recent
//! failure on the tracker's `last_error()` for inspection. The types here
//! are what lands there.

use beacon_core::ValidationError;
use thiserror::Error;

/// Beacon SDK errors.
#[derive(Debug, Error)]
pub enum TrackerError {
	/// A payload failed validation; carries the invalid field names.
	#[error("validation failed: {0}")]
	Validation(#[from] ValidationError),

	/// The configuration failed validation at build time.
	#[error("invalid configuration: {0}")]
	Config(String),

	/// The JSON endpoint answered with something other than 204 No Content.
	#[error("collector endpoint returned status {status}")]
	Transport { status: u16 },

	/// The HTTP request itself failed.
	#[error("request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	/// A signal was sent before the collector callback was connected.
	#[error("collector not connected")]
	CollectorUnavailable,

	/// A CSR token or handoff blob could not be decoded.
	#[error("decode failed: {0}")]
	Decode(String),

	/// Party id resolution exhausted its bounded retries.
	#[error("party id unresolved after {attempts} attempts")]
	IdentityTimeout { attempts: u32 },

	/// A storage adapter failed.
	#[error("storage error: {0}")]
	Storage(String),
}

impl From<beacon_core::CoreError> for TrackerError {
	fn from(err: beacon_core::CoreError) -> Self {
		match err {
			beacon_core::CoreError::Validation(v) => TrackerError::Validation(v),
			beacon_core::CoreError::Decode(d) => TrackerError::Decode(d),
		}
	}
}

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
