// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Arrival-url query helpers.

use std::collections::HashMap;

use tracing::debug;

/// Parses the query string of `url` into a map. The first occurrence of a
/// repeated key wins. An unparseable url yields an empty map.
pub fn parse_query(url: &str) -> HashMap<String, String> {
	let mut args = HashMap::new();
	let parsed = match reqwest::Url::parse(url) {
		Ok(parsed) => parsed,
		Err(e) => {
			debug!(error = %e, "arrival url did not parse, no query args");
			return args;
		}
	};
	for (key, value) in parsed.query_pairs() {
		args.entry(key.into_owned()).or_insert_with(|| value.into_owned());
	}
	args
}

/// Returns one query argument from `url`.
pub fn query_arg(url: &str, name: &str) -> Option<String> {
	parse_query(url).remove(name)
}
