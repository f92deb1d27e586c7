// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The cross-page redirect (CSR) protocol.
//!
//! A page can arrive carrying an encoded token that instructs the tracker
//! to replay a batch of events against a JSON endpoint and/or hand a blob
//! of parameter state to the next page, then send the browser onward. The
//! protocol runs through a small state machine:
//!
//! ```text
//! Idle -> TokenFound -> Validated -> Replaying -> Redirecting
//! ```
//!
//! An absent or invalid token leaves the machine in `Idle`. Navigation is
//! gated on the transport's sent-signal counter reaching the number of
//! replayed fires, bounded by the configured redirect poll — events fired
//! just before navigation would otherwise race the page teardown and be
//! dropped silently.
//!
//! The handoff side is symmetric: before token parsing, a fresh page
//! consumes the state blob a previous page persisted under the well-known
//! storage key, applying it as ordinary parameter updates.

use beacon_core::{CsrToken, Lifetime};
use serde_json::Value;
use tracing::{debug, warn};

use crate::query;
use crate::queue::Command;
use crate::tracker::Tracker;

/// Well-known synchronous-storage key for cross-page state handoff.
pub const CSR_STATE_KEY: &str = "__c_s_r__s_t_a_t_e__";

/// Query parameter the token arrives under.
pub const CSR_QUERY_ARG: &str = "_csr";

/// Where the redirect protocol stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectState {
	/// No valid token on this page.
	Idle,
	/// A token parameter is present on the arrival url.
	TokenFound,
	/// The token decoded and passed shape validation.
	Validated,
	/// Token events are being replayed.
	Replaying,
	/// Waiting out the signal gate, then navigating. Terminal.
	Redirecting,
}

/// Reads and validates the arrival url's token, forcing the JSON transport
/// when the token carries a replay batch. Returns the token for later
/// processing, or `None` (state `Idle`) when there is nothing valid.
pub(crate) fn detect(tracker: &mut Tracker) -> Option<CsrToken> {
	let url = tracker.env.arrival_url()?;
	let raw = query::query_arg(&url, CSR_QUERY_ARG)?;
	tracker.redirect_state = RedirectState::TokenFound;

	let token = match CsrToken::parse(&raw) {
		Ok(Some(token)) => token,
		Ok(None) => {
			debug!("csr token failed shape validation");
			tracker.redirect_state = RedirectState::Idle;
			return None;
		}
		Err(e) => {
			debug!(error = %e, "csr token failed to decode");
			tracker.redirect_state = RedirectState::Idle;
			return None;
		}
	};

	if let Some(endpoint) = token.json_endpoint.clone() {
		// Replay must go to the token's endpoint; the automatic page view
		// and the geolocation wait would only delay the handoff.
		if let Err(e) = tracker
			.transport
			.force_json(&endpoint, tracker.config.request_timeout)
		{
			warn!(error = %e, "could not force json transport for replay");
			tracker.last_error = Some(e);
			tracker.redirect_state = RedirectState::Idle;
			return None;
		}
		tracker.config.use_json_endpoint = true;
		tracker.config.json_endpoint = endpoint;
		tracker.config.auto_page_view = false;
		tracker.wait_on_geo = false;
	}

	tracker.redirect_state = RedirectState::Validated;
	Some(token)
}

impl Tracker {
	/// Consumes a state blob persisted by a previous page, applying each
	/// top-level entry as an update to the lifetime it names. The key is
	/// removed whether or not the blob was usable; malformed content is
	/// logged and discarded.
	pub(crate) fn consume_handoff_state(&mut self) {
		let Some(raw) = self.sync_storage.get_item(CSR_STATE_KEY) else {
			return;
		};
		match serde_json::from_str::<Value>(&raw) {
			Ok(Value::Object(map)) => {
				for (key, value) in map {
					match (key.parse::<Lifetime>(), value) {
						(Ok(lifetime), Value::Object(fields)) => {
							debug!(lifetime = lifetime.as_str(), "applying handoff state");
							self.store.update(fields, lifetime);
						}
						_ => debug!(key = %key, "skipping unrecognized handoff entry"),
					}
				}
			}
			Ok(_) => debug!("handoff state was not an object, discarding"),
			Err(e) => debug!(error = %e, "handoff state failed to parse, discarding"),
		}
		self.sync_storage.remove_item(CSR_STATE_KEY);
	}

	/// Processes a validated token: replay its events in order, persist
	/// its handoff state, then navigate once the transport's counter shows
	/// the replayed fires were sent (or the poll bound expires).
	pub(crate) async fn process_csr(&mut self, token: CsrToken) {
		let base = self.signals_sent();
		let mut fired = 0u64;

		if !token.events.is_empty() {
			self.redirect_state = RedirectState::Replaying;
			for event in &token.events {
				if event.event_type.trim().is_empty() {
					continue;
				}
				self.submit(Command::Fire {
					event_type: event.event_type.clone(),
					fields: event.payload.clone(),
				})
				.await;
				fired += 1;
			}
		}

		if let Some(state) = &token.state {
			match serde_json::to_string(state) {
				Ok(raw) => self.sync_storage.set_item(CSR_STATE_KEY, &raw),
				Err(e) => warn!(error = %e, "handoff state failed to serialize"),
			}
		}

		self.redirect_state = RedirectState::Redirecting;
		let target = base + fired;
		let poll = self.config.redirect_poll;
		let mut attempts = 0u32;
		while self.signals_sent() < target && attempts < poll.max_attempts {
			attempts += 1;
			tokio::time::sleep(poll.interval).await;
		}

		if self.env.navigate(&token.redirect_url) {
			debug!(url = %token.redirect_url, "redirecting");
		} else {
			debug!("navigation unavailable, redirect skipped");
		}
	}
}
