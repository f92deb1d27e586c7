// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ambient page context: campaign attribution and the logged-in user.
//!
//! Campaign parameters come from `utm_`-prefixed arrival-url arguments; ad
//! click ids (`gclid`, `dclid`) pass straight through. The logged-in user
//! id is recovered from a JWT cookie's `sub` claim, or from the identity
//! provider's session cookie as a fallback. All of it lands in persistent
//! parameters through the same update path as any other caller.

use std::collections::HashMap;

use base64::alphabet;
use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::{DecodePaddingMode, Engine, GeneralPurposeConfig};
use beacon_core::Fields;
use serde_json::Value;
use tracing::debug;

use crate::environment::Environment;

/// JWT segments use the url-safe alphabet, normally unpadded.
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
	&alphabet::URL_SAFE,
	GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Identity-provider session cookie checked when no JWT cookie exists.
/// Its value has the form `<realm>/<user id>`.
const IDP_SESSION_COOKIE: &str = "KEYCLOAK_SESSION";

/// Maps `utm_` arrival-url arguments onto campaign wire keys.
pub fn campaign_fields(args: &HashMap<String, String>) -> Fields {
	const UTM: &[(&str, &str)] = &[
		("utm_id", "ci"),
		("utm_campaign", "cn"),
		("utm_source", "cs"),
		("utm_medium", "cm"),
		("utm_term", "ck"),
		("utm_content", "cc"),
	];
	let mut out = Fields::new();
	for (arg, key) in UTM {
		if let Some(value) = args.get(*arg) {
			out.insert((*key).to_string(), Value::String(value.clone()));
		}
	}
	out
}

/// Passes ad click identifiers through from the arrival url.
pub fn ad_click_fields(args: &HashMap<String, String>) -> Fields {
	let mut out = Fields::new();
	for key in ["gclid", "dclid"] {
		if let Some(value) = args.get(key) {
			out.insert(key.to_string(), Value::String(value.clone()));
		}
	}
	out
}

/// Recovers the logged-in user id from cookies.
///
/// Prefers the named JWT cookie (`sub` claim in its payload segment);
/// malformed tokens are logged and ignored. Falls back to the identity
/// provider's session cookie.
pub fn user_id_from_cookies(env: &dyn Environment, token_cookie: &str) -> Option<String> {
	if let Some(token) = env.read_cookie(token_cookie) {
		match subject_from_jwt(&token) {
			Some(subject) => return Some(subject),
			None => debug!(cookie = token_cookie, "no subject recoverable from token"),
		}
	}
	env.read_cookie(IDP_SESSION_COOKIE)
		.and_then(|value| value.split('/').nth(1).map(str::to_string))
		.filter(|id| !id.is_empty())
}

fn subject_from_jwt(token: &str) -> Option<String> {
	let payload = token.split('.').nth(1)?;
	let bytes = LENIENT_URL_SAFE.decode(payload.as_bytes()).ok()?;
	let claims: Value = serde_json::from_slice(&bytes).ok()?;
	claims.get("sub")?.as_str().map(str::to_string)
}
