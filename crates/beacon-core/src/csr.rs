// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cross-page redirect (CSR) tokens.
//!
//! A CSR token arrives in the page url as url-safe base64 over serialized
//! JSON. It always names a redirect target `u`, and carries either a batch
//! of events `e` to replay against the JSON endpoint `j` before navigating,
//! or a state blob `s` to hand off to the next page, or both.

use base64::alphabet;
use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::{DecodePaddingMode, Engine, GeneralPurposeConfig};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::params::Fields;

/// Standard-alphabet decoder that accepts padded and unpadded input.
/// Tokens come from assorted encoders; some strip the trailing `=`.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
	&alphabet::STANDARD,
	GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// One event to replay before the redirect proceeds.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrEvent {
	/// The wire event type; entries with an empty type are skipped.
	pub event_type: String,
	pub payload: Fields,
}

/// A validated CSR token.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrToken {
	/// Where to send the browser once processing completes.
	pub redirect_url: String,
	/// Events to replay, in order.
	pub events: Vec<CsrEvent>,
	/// JSON endpoint override for the replayed events.
	pub json_endpoint: Option<String>,
	/// State blob to persist for the next page load.
	pub state: Option<Fields>,
}

impl CsrToken {
	/// Decodes the raw token text into JSON.
	///
	/// The token uses the url-safe alphabet; substitute back to the
	/// standard one (`-`→`+`, `_`→`/`) before decoding.
	pub fn decode(token: &str) -> Result<Value> {
		let standard = token.replace('-', "+").replace('_', "/");
		let bytes = LENIENT_STANDARD
			.decode(standard.as_bytes())
			.map_err(|e| CoreError::Decode(format!("base64: {e}")))?;
		serde_json::from_slice(&bytes).map_err(|e| CoreError::Decode(format!("json: {e}")))
	}

	/// Checks the decoded JSON against the token shape.
	///
	/// Valid iff `u` is a non-empty string and either `e` is a non-empty
	/// array with a string `j` alongside it, or `s` is an object. Anything
	/// else is not a CSR token.
	pub fn validate(value: &Value) -> Option<CsrToken> {
		let obj = value.as_object()?;
		let redirect_url = obj
			.get("u")?
			.as_str()
			.filter(|u| !u.is_empty())?
			.to_string();

		let events: Option<Vec<CsrEvent>> = obj
			.get("e")
			.and_then(Value::as_array)
			.map(|entries| entries.iter().map(Self::event_entry).collect());
		let json_endpoint = obj
			.get("j")
			.and_then(Value::as_str)
			.map(str::to_string);
		let state = obj.get("s").and_then(Value::as_object).cloned();

		let has_replay = matches!(&events, Some(e) if !e.is_empty()) && json_endpoint.is_some();
		if !has_replay && state.is_none() {
			return None;
		}

		Some(CsrToken {
			redirect_url,
			events: if has_replay {
				events.unwrap_or_default()
			} else {
				Vec::new()
			},
			json_endpoint: if has_replay { json_endpoint } else { None },
			state,
		})
	}

	/// Decodes and validates in one step. `Ok(None)` means well-formed
	/// JSON that is not a valid token.
	pub fn parse(token: &str) -> Result<Option<CsrToken>> {
		Ok(Self::validate(&Self::decode(token)?))
	}

	fn event_entry(value: &Value) -> CsrEvent {
		let event_type = value
			.get("t")
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string();
		let payload = value
			.get("p")
			.and_then(Value::as_object)
			.cloned()
			.unwrap_or_default();
		CsrEvent {
			event_type,
			payload,
		}
	}
}
