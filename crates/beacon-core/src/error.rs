// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the beacon core.

use thiserror::Error;

/// Core errors.
#[derive(Debug, Error)]
pub enum CoreError {
	/// A payload failed validation.
	#[error("validation failed: {0}")]
	Validation(#[from] ValidationError),

	/// A token or persisted blob could not be decoded.
	#[error("decode failed: {0}")]
	Decode(String),
}

/// A payload failed validation; carries the offending field names.
///
/// Field names are the caller-facing names (`category`, `page`), not the
/// wire keys they map to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid fields: {}", fields.join(", "))]
pub struct ValidationError {
	pub fields: Vec<String>,
}

impl ValidationError {
	/// Creates a validation error for the given field names.
	pub fn new(fields: Vec<String>) -> Self {
		Self { fields }
	}

	/// Creates a validation error for a single field.
	pub fn field(name: impl Into<String>) -> Self {
		Self {
			fields: vec![name.into()],
		}
	}
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn validation_error_lists_fields() {
		let err = ValidationError::new(vec!["category".to_string(), "action".to_string()]);
		assert_eq!(err.to_string(), "invalid fields: category, action");
	}

	#[test]
	fn validation_error_single_field() {
		let err = ValidationError::field("page");
		assert_eq!(err.fields, vec!["page"]);
	}

	#[test]
	fn core_error_from_validation() {
		let err: CoreError = ValidationError::field("time").into();
		assert!(matches!(err, CoreError::Validation(_)));
	}
}
