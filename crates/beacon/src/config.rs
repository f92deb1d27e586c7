// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tracker configuration.

use std::time::Duration;

use crate::error::{Result, TrackerError};

/// Default party-id cookie name.
pub const DEFAULT_PARTY_COOKIE: &str = "_dvp";
/// Default session-id cookie name.
pub const DEFAULT_SESSION_COOKIE: &str = "_dvs";
/// Default user-token (JWT) cookie name.
pub const DEFAULT_USER_TOKEN_COOKIE: &str = "_rtok";

/// Sessions may not rotate faster than this.
const MIN_SESSION_IDLE: Duration = Duration::from_secs(300);
/// Geolocation waits longer than this stall event delivery for no benefit.
const MAX_GEO_WAIT: Duration = Duration::from_secs(30);

/// A bounded fixed-interval polling loop.
///
/// Every suspension point in the SDK polls with one of these: a fixed
/// interval and a capped attempt count, with a fallback action once the cap
/// is reached. The defaults are empirical, not protocol-mandated, so they
/// are configuration rather than constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
	pub interval: Duration,
	pub max_attempts: u32,
}

impl PollPolicy {
	pub fn new(interval: Duration, max_attempts: u32) -> Self {
		Self {
			interval,
			max_attempts,
		}
	}
}

/// Configuration for a [`Tracker`](crate::Tracker).
#[derive(Debug, Clone)]
pub struct TrackerConfig {
	/// Endpoint for the direct-JSON transport.
	pub json_endpoint: String,
	/// Use the direct-JSON transport instead of the injected collector.
	pub use_json_endpoint: bool,
	/// Maximum idle gap before the session id rotates.
	pub max_session_idle: Duration,
	/// How long fires may wait on a pending geolocation result. Zero
	/// disables geolocation entirely.
	pub geo_wait: Duration,
	/// Fire a page view automatically at startup.
	pub auto_page_view: bool,
	/// Page for the automatic page view; defaults to the arrival url path.
	pub auto_page_view_page: Option<String>,
	/// Allow more than one page view per tracker.
	pub allow_multiple_page_views: bool,
	/// Report validation failures as `exception` events through the normal
	/// dispatch path.
	pub send_auto_exceptions: bool,
	/// Party-id cookie name.
	pub party_cookie: String,
	/// Session-id cookie name.
	pub session_cookie: String,
	/// User-token cookie name (JWT with a `sub` claim).
	pub user_token_cookie: String,
	/// Bounded wait for party-id resolution from async storage.
	pub identity_poll: PollPolicy,
	/// Bounded wait for in-flight signals before a CSR redirect navigates.
	pub redirect_poll: PollPolicy,
	/// Bounded wait for page-load readiness before a page view fires.
	pub page_load_poll: PollPolicy,
	/// Tick between geolocation readiness checks.
	pub geo_poll_interval: Duration,
	/// HTTP request timeout for the JSON transport.
	pub request_timeout: Duration,
}

impl Default for TrackerConfig {
	fn default() -> Self {
		Self {
			json_endpoint: "http://localhost:8290/json".to_string(),
			use_json_endpoint: false,
			max_session_idle: Duration::from_secs(1800),
			geo_wait: Duration::ZERO,
			auto_page_view: false,
			auto_page_view_page: None,
			allow_multiple_page_views: false,
			send_auto_exceptions: true,
			party_cookie: DEFAULT_PARTY_COOKIE.to_string(),
			session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
			user_token_cookie: DEFAULT_USER_TOKEN_COOKIE.to_string(),
			identity_poll: PollPolicy::new(Duration::from_millis(100), 100),
			redirect_poll: PollPolicy::new(Duration::from_millis(100), 20),
			page_load_poll: PollPolicy::new(Duration::from_millis(10), 500),
			geo_poll_interval: Duration::from_millis(50),
			request_timeout: Duration::from_secs(30),
		}
	}
}

impl TrackerConfig {
	/// Starts a builder with the defaults above.
	pub fn builder() -> TrackerConfigBuilder {
		TrackerConfigBuilder::new()
	}

	/// Validates bounds the rest of the SDK relies on.
	pub fn validate(&self) -> Result<()> {
		if reqwest::Url::parse(&self.json_endpoint).is_err() {
			return Err(TrackerError::Config(format!(
				"json_endpoint is not a valid url: {}",
				self.json_endpoint
			)));
		}
		if self.max_session_idle < MIN_SESSION_IDLE {
			return Err(TrackerError::Config(format!(
				"max_session_idle below minimum of {}s",
				MIN_SESSION_IDLE.as_secs()
			)));
		}
		if self.geo_wait > MAX_GEO_WAIT {
			return Err(TrackerError::Config(format!(
				"geo_wait above maximum of {}s",
				MAX_GEO_WAIT.as_secs()
			)));
		}
		for (name, policy) in [
			("identity_poll", self.identity_poll),
			("redirect_poll", self.redirect_poll),
			("page_load_poll", self.page_load_poll),
		] {
			if policy.max_attempts == 0 {
				return Err(TrackerError::Config(format!(
					"{name} must allow at least one attempt"
				)));
			}
		}
		Ok(())
	}
}

/// Builder for [`TrackerConfig`].
#[derive(Debug, Clone, Default)]
pub struct TrackerConfigBuilder {
	config: TrackerConfig,
}

impl TrackerConfigBuilder {
	pub fn new() -> Self {
		Self {
			config: TrackerConfig::default(),
		}
	}

	/// Points the tracker at a JSON endpoint and selects that transport.
	pub fn json_endpoint(mut self, url: impl Into<String>) -> Self {
		self.config.json_endpoint = url.into();
		self.config.use_json_endpoint = true;
		self
	}

	pub fn max_session_idle(mut self, idle: Duration) -> Self {
		self.config.max_session_idle = idle;
		self
	}

	pub fn geo_wait(mut self, wait: Duration) -> Self {
		self.config.geo_wait = wait;
		self
	}

	pub fn auto_page_view(mut self, page: impl Into<String>) -> Self {
		self.config.auto_page_view = true;
		self.config.auto_page_view_page = Some(page.into());
		self
	}

	pub fn allow_multiple_page_views(mut self) -> Self {
		self.config.allow_multiple_page_views = true;
		self
	}

	pub fn send_auto_exceptions(mut self, send: bool) -> Self {
		self.config.send_auto_exceptions = send;
		self
	}

	pub fn party_cookie(mut self, name: impl Into<String>) -> Self {
		self.config.party_cookie = name.into();
		self
	}

	pub fn session_cookie(mut self, name: impl Into<String>) -> Self {
		self.config.session_cookie = name.into();
		self
	}

	pub fn user_token_cookie(mut self, name: impl Into<String>) -> Self {
		self.config.user_token_cookie = name.into();
		self
	}

	pub fn identity_poll(mut self, policy: PollPolicy) -> Self {
		self.config.identity_poll = policy;
		self
	}

	pub fn redirect_poll(mut self, policy: PollPolicy) -> Self {
		self.config.redirect_poll = policy;
		self
	}

	pub fn page_load_poll(mut self, policy: PollPolicy) -> Self {
		self.config.page_load_poll = policy;
		self
	}

	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout = timeout;
		self
	}

	/// Validates and returns the configuration.
	pub fn build(self) -> Result<TrackerConfig> {
		self.config.validate()?;
		Ok(self.config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_config_is_valid() {
		assert!(TrackerConfig::default().validate().is_ok());
	}

	#[test]
	fn builder_selects_json_transport() {
		let config = TrackerConfig::builder()
			.json_endpoint("https://collector.example.com/json")
			.build()
			.unwrap();
		assert!(config.use_json_endpoint);
		assert_eq!(config.json_endpoint, "https://collector.example.com/json");
	}

	#[test]
	fn rejects_invalid_endpoint() {
		let result = TrackerConfig::builder().json_endpoint("not a url").build();
		assert!(matches!(result, Err(TrackerError::Config(_))));
	}

	#[test]
	fn rejects_short_session_idle() {
		let result = TrackerConfig::builder()
			.max_session_idle(Duration::from_secs(10))
			.build();
		assert!(matches!(result, Err(TrackerError::Config(_))));
	}

	#[test]
	fn rejects_excessive_geo_wait() {
		let result = TrackerConfig::builder()
			.geo_wait(Duration::from_secs(60))
			.build();
		assert!(matches!(result, Err(TrackerError::Config(_))));
	}

	#[test]
	fn rejects_zero_attempt_poll() {
		let result = TrackerConfig::builder()
			.redirect_poll(PollPolicy::new(Duration::from_millis(100), 0))
			.build();
		assert!(matches!(result, Err(TrackerError::Config(_))));
	}

	#[test]
	fn auto_page_view_sets_page() {
		let config = TrackerConfig::builder()
			.auto_page_view("/landing")
			.build()
			.unwrap();
		assert!(config.auto_page_view);
		assert_eq!(config.auto_page_view_page.as_deref(), Some("/landing"));
	}
}
