// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The environment capability seam.
//!
//! The tracker never touches ambient globals. Everything it wants from the
//! host — cookies, the arrival url, navigation, page-load state, timing,
//! geolocation, the clock — arrives through an [`Environment`] passed at
//! construction. Hosts implement what they have; every capability has a
//! no-op default, and [`NullEnvironment`] is the environment with none.

use beacon_core::Fields;
use chrono::Utc;
use serde_json::Value;

/// Where a geolocation request currently stands.
///
/// Geolocation is a poll-style capability: the tracker asks again on a
/// fixed tick until the result arrives or its configured wait expires.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum GeoStatus {
	/// The host has no geolocation capability, or the lookup failed.
	#[default]
	Unavailable,
	/// A lookup is in flight; ask again later.
	Pending,
	/// Coordinates are known.
	Resolved { latitude: f64, longitude: f64 },
}

/// Navigation-timing marks, all in wall-clock milliseconds.
///
/// Hosts with a performance-timing capability fill these from their timing
/// api; the tracker derives the page-load parameters sent with page views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageTiming {
	pub navigation_start: i64,
	pub redirect_start: i64,
	pub redirect_end: i64,
	pub domain_lookup_start: i64,
	pub domain_lookup_end: i64,
	pub connect_start: i64,
	pub connect_end: i64,
	pub request_start: i64,
	pub response_start: i64,
	pub response_end: i64,
	pub dom_interactive: i64,
	pub dom_content_loaded_event_start: i64,
	pub load_event_end: i64,
}

impl PageTiming {
	/// Derives the page-load timing fields sent with a page view.
	pub fn to_fields(&self) -> Fields {
		let mut out = Fields::new();
		let mut put = |key: &str, value: i64| {
			out.insert(key.to_string(), Value::from(value));
		};
		put("plt", self.load_event_end - self.navigation_start);
		put("pdt", self.response_end - self.response_start);
		put("dns", self.domain_lookup_end - self.domain_lookup_start);
		put("rrt", self.redirect_end - self.redirect_start);
		put("tcp", self.connect_end - self.connect_start);
		put("srt", self.response_end - self.connect_end);
		put("dit", self.dom_interactive - self.navigation_start);
		put("clt", self.dom_content_loaded_event_start - self.navigation_start);
		put(
			"pln",
			(self.request_start - self.navigation_start)
				+ (self.response_end - self.response_start),
		);
		put("pls", self.response_start - self.request_start);
		put("pld", self.dom_content_loaded_event_start - self.response_end);
		put(
			"plf",
			self.load_event_end - self.dom_content_loaded_event_start,
		);
		out
	}
}

/// Capabilities the host environment may provide.
pub trait Environment: Send + Sync {
	/// Whether cookie reads can be expected to work at all.
	fn has_cookies(&self) -> bool {
		false
	}

	/// Reads a cookie by name.
	fn read_cookie(&self, _name: &str) -> Option<String> {
		None
	}

	/// The full url the page arrived on, query string included.
	fn arrival_url(&self) -> Option<String> {
		None
	}

	/// Sends the host to `url`. Returns false when the host cannot
	/// navigate; the caller skips the redirect silently.
	fn navigate(&self, _url: &str) -> bool {
		false
	}

	/// Whether the page has finished loading.
	fn page_loaded(&self) -> bool {
		true
	}

	/// Navigation-timing marks, when the host has a performance api.
	fn performance_timing(&self) -> Option<PageTiming> {
		None
	}

	/// Milliseconds since the page began loading, when the host can tell.
	fn time_since_load_millis(&self) -> Option<i64> {
		None
	}

	/// Current geolocation state.
	fn poll_geolocation(&self) -> GeoStatus {
		GeoStatus::Unavailable
	}

	/// Current wall-clock time in milliseconds.
	fn now_millis(&self) -> i64 {
		Utc::now().timestamp_millis()
	}
}

/// An environment with no capabilities at all.
///
/// Fires still work; identity comes from storage or synthesis, redirects
/// never navigate, and page views fire without timing data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEnvironment;

impl Environment for NullEnvironment {}

/// A fixed-value environment for headless hosts and tests.
///
/// Cookie values, the arrival url, and geolocation are set up front;
/// navigations are recorded rather than performed.
#[derive(Debug, Default)]
pub struct StaticEnvironment {
	cookies: std::collections::HashMap<String, String>,
	arrival_url: Option<String>,
	page_loaded: bool,
	can_navigate: bool,
	timing: Option<PageTiming>,
	geo: std::sync::Mutex<GeoStatus>,
	navigations: std::sync::Mutex<Vec<String>>,
	now_override: std::sync::atomic::AtomicI64,
}

impl StaticEnvironment {
	pub fn new() -> Self {
		Self {
			page_loaded: true,
			can_navigate: true,
			geo: std::sync::Mutex::new(GeoStatus::Unavailable),
			..Self::default()
		}
	}

	pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.cookies.insert(name.into(), value.into());
		self
	}

	pub fn with_arrival_url(mut self, url: impl Into<String>) -> Self {
		self.arrival_url = Some(url.into());
		self
	}

	pub fn with_page_loaded(mut self, loaded: bool) -> Self {
		self.page_loaded = loaded;
		self
	}

	pub fn without_navigation(mut self) -> Self {
		self.can_navigate = false;
		self
	}

	pub fn with_timing(mut self, timing: PageTiming) -> Self {
		self.timing = Some(timing);
		self
	}

	/// Pins the clock; zero restores the wall clock.
	pub fn set_now_millis(&self, now: i64) {
		self.now_override
			.store(now, std::sync::atomic::Ordering::SeqCst);
	}

	pub fn set_geolocation(&self, status: GeoStatus) {
		*self.geo.lock().expect("geo lock") = status;
	}

	/// Urls passed to `navigate`, in order.
	pub fn navigations(&self) -> Vec<String> {
		self.navigations.lock().expect("navigations lock").clone()
	}
}

impl Environment for StaticEnvironment {
	fn has_cookies(&self) -> bool {
		!self.cookies.is_empty()
	}

	fn read_cookie(&self, name: &str) -> Option<String> {
		self.cookies.get(name).cloned()
	}

	fn arrival_url(&self) -> Option<String> {
		self.arrival_url.clone()
	}

	fn navigate(&self, url: &str) -> bool {
		if !self.can_navigate {
			return false;
		}
		self.navigations
			.lock()
			.expect("navigations lock")
			.push(url.to_string());
		true
	}

	fn page_loaded(&self) -> bool {
		self.page_loaded
	}

	fn performance_timing(&self) -> Option<PageTiming> {
		self.timing
	}

	fn poll_geolocation(&self) -> GeoStatus {
		*self.geo.lock().expect("geo lock")
	}

	fn now_millis(&self) -> i64 {
		let pinned = self.now_override.load(std::sync::atomic::Ordering::SeqCst);
		if pinned != 0 {
			pinned
		} else {
			Utc::now().timestamp_millis()
		}
	}
}
