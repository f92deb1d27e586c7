// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Party and session identity types.
//!
//! A party is a persistent, cross-session client identifier; a session is a
//! bounded-duration grouping of events, rotated after inactivity. Both use
//! the same sortable id format: a fixed prefix, the creation time in
//! base 36, and a random component. Uniqueness is the requirement; ordering
//! across clients is not.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Fixed prefix of generated ids.
const ID_PREFIX: &str = "0";

/// Length of the random id component.
const TOKEN_LEN: usize = 12;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A generated tracker identifier: `0:<base36 millis>:<random>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackerId(String);

impl TrackerId {
	/// Generates a fresh id stamped with the given wall-clock milliseconds.
	pub fn generate(now_millis: i64) -> Self {
		let stamp = to_base36(now_millis.max(0) as u64);
		Self(format!("{ID_PREFIX}:{stamp}:{}", random_token()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl std::fmt::Display for TrackerId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// A random base 36 token, suitable for event ids.
pub fn random_token() -> String {
	let mut rng = rand::thread_rng();
	(0..TOKEN_LEN)
		.map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
		.collect()
}

fn to_base36(mut n: u64) -> String {
	if n == 0 {
		return "0".to_string();
	}
	let mut digits = Vec::new();
	while n > 0 {
		digits.push(BASE36[(n % 36) as usize]);
		n /= 36;
	}
	digits.reverse();
	String::from_utf8(digits).expect("base36 digits are ascii")
}

/// The persistent, cross-session client identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
	pub id: String,
}

impl Party {
	pub fn new(id: impl Into<String>) -> Self {
		Self { id: id.into() }
	}

	pub fn generate(now_millis: i64) -> Self {
		Self {
			id: TrackerId::generate(now_millis).into_string(),
		}
	}
}

/// A bounded-duration grouping of events.
///
/// `access_time` advances monotonically on use; the owner rotates the id
/// when the idle gap exceeds its configured maximum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
	pub id: String,
	/// Wall-clock milliseconds of the last use.
	pub access_time: i64,
}

impl Session {
	pub fn new(id: impl Into<String>, access_time: i64) -> Self {
		Self {
			id: id.into(),
			access_time,
		}
	}

	pub fn generate(now_millis: i64) -> Self {
		Self {
			id: TrackerId::generate(now_millis).into_string(),
			access_time: now_millis,
		}
	}
}
