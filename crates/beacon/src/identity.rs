// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Party and session management.
//!
//! The party id is created once per device and recovered from a cookie or
//! from async storage on later runs. The session id is recovered from a
//! cookie when fresh enough and rotated whenever the idle gap exceeds the
//! configured maximum. Identity resolution can stall (slow storage), so the
//! resolution path is a bounded poll with id synthesis as the fallback —
//! a tracker never fails to produce identity.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::{Party, Session};
use tracing::{debug, warn};

use crate::config::PollPolicy;
use crate::environment::Environment;
use crate::storage::AsyncStorage;

/// Storage key under which the party id persists.
const PARTY_STORAGE_KEY: &str = "party";

/// Owns party/session identity and the idle-timeout rule.
pub struct IdentityManager {
	party: Option<Party>,
	party_is_new: bool,
	session: Option<Session>,
	session_is_new: bool,
	max_session_idle: Duration,
	storage: Arc<dyn AsyncStorage>,
}

impl IdentityManager {
	pub fn new(max_session_idle: Duration, storage: Arc<dyn AsyncStorage>) -> Self {
		Self {
			party: None,
			party_is_new: true,
			session: None,
			session_is_new: true,
			max_session_idle,
			storage,
		}
	}

	/// Recovers party and session ids from the environment's cookies, when
	/// it has any. A recovered session's access time starts at now.
	pub fn resolve_from_cookies(
		&mut self,
		env: &dyn Environment,
		party_cookie: &str,
		session_cookie: &str,
	) {
		if !env.has_cookies() {
			return;
		}
		if let Some(id) = env.read_cookie(party_cookie) {
			debug!(cookie = party_cookie, "recovered party id from cookie");
			self.party = Some(Party::new(id));
			self.party_is_new = false;
		}
		if let Some(id) = env.read_cookie(session_cookie) {
			debug!(cookie = session_cookie, "recovered session id from cookie");
			self.session = Some(Session::new(id, env.now_millis()));
			self.session_is_new = false;
		}
	}

	/// Returns the party id, resolving it first if needed.
	///
	/// Resolution reads async storage; a missing entry generates and
	/// persists a fresh id, and repeated read failures are retried on the
	/// policy's interval until its attempt cap, after which an id is
	/// synthesized rather than blocking forever.
	pub async fn ensure_party(&mut self, now_millis: i64, poll: PollPolicy) -> String {
		if let Some(party) = &self.party {
			return party.id.clone();
		}

		let mut attempts = 0u32;
		loop {
			match self.storage.get_item(PARTY_STORAGE_KEY).await {
				Ok(Some(id)) if !id.is_empty() => {
					debug!("recovered party id from storage");
					self.party = Some(Party::new(id));
					self.party_is_new = false;
					break;
				}
				Ok(_) => {
					let party = Party::generate(now_millis);
					if let Err(e) = self
						.storage
						.set_item(PARTY_STORAGE_KEY, &party.id)
						.await
					{
						warn!(error = %e, "failed to persist generated party id");
					}
					self.party = Some(party);
					self.party_is_new = true;
					break;
				}
				Err(e) => {
					attempts += 1;
					if attempts >= poll.max_attempts {
						warn!(
							attempts,
							error = %e,
							"party id unresolved, synthesizing one"
						);
						self.force_party(now_millis);
						break;
					}
					tokio::time::sleep(poll.interval).await;
				}
			}
		}

		self.party
			.as_ref()
			.map(|p| p.id.clone())
			.unwrap_or_default()
	}

	/// Synthesizes a fresh party id immediately.
	pub fn force_party(&mut self, now_millis: i64) {
		self.party = Some(Party::generate(now_millis));
		self.party_is_new = true;
	}

	/// Re-evaluates the session against the idle-timeout rule.
	///
	/// A gap beyond the maximum rotates the id; any positive gap advances
	/// the access time. The access time never moves backward.
	pub fn touch(&mut self, now_millis: i64) {
		let max_idle = self.max_session_idle.as_millis() as i64;
		match &mut self.session {
			Some(session) => {
				let idle = now_millis - session.access_time;
				if idle > max_idle {
					debug!(idle_ms = idle, "session idle timeout, rotating id");
					*session = Session::generate(now_millis);
					self.session_is_new = true;
				} else if idle > 0 {
					session.access_time = now_millis;
				}
			}
			None => {
				self.session = Some(Session::generate(now_millis));
				self.session_is_new = true;
			}
		}
	}

	/// Called after a successful send: both identities have now been seen
	/// by the collector.
	pub fn mark_sent(&mut self) {
		self.party_is_new = false;
		self.session_is_new = false;
	}

	pub fn party(&self) -> Option<&Party> {
		self.party.as_ref()
	}

	pub fn session(&self) -> Option<&Session> {
		self.session.as_ref()
	}

	pub fn party_is_new(&self) -> bool {
		self.party_is_new
	}

	pub fn session_is_new(&self) -> bool {
		self.session_is_new
	}
}
