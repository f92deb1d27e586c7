// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The tracker facade.
//!
//! A [`Tracker`] owns the parameter store, the dispatch queue, identity,
//! and the transport, and exposes the typed `track`/`fire_page_view`/
//! `add_*` surface. It is an explicit factory product: construct one, hold
//! the reference, and drop it when done — nothing installs itself anywhere.
//!
//! Public set/fire methods never panic and never return errors directly:
//! they report success as `bool` and park the failure on [`last_error`]
//! for inspection, optionally echoing it to the collector as an
//! `exception` event.
//!
//! [`last_error`]: Tracker::last_error

use std::sync::Arc;
use std::time::Duration;

use beacon_core::{
	CsrToken, Event, Fields, Impression, Lifetime, PageView, Product, ProductAction, Promotion,
	ValidationError,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::TrackerConfig;
use crate::context;
use crate::environment::{Environment, GeoStatus};
use crate::error::{Result, TrackerError};
use crate::identity::IdentityManager;
use crate::query;
use crate::queue::{Command, DispatchQueue};
use crate::redirect::RedirectState;
use crate::storage::{AsyncStorage, SyncStorage};
use crate::transport::{CollectorFn, Transport};

/// A client-side event tracker.
pub struct Tracker {
	pub(crate) config: TrackerConfig,
	pub(crate) env: Arc<dyn Environment>,
	pub(crate) sync_storage: Arc<dyn SyncStorage>,
	pub(crate) store: beacon_core::ParameterStore,
	pub(crate) queue: DispatchQueue,
	pub(crate) identity: IdentityManager,
	pub(crate) transport: Transport,
	pub(crate) redirect_state: RedirectState,
	pub(crate) last_error: Option<TrackerError>,
	pub(crate) page_view_fired: bool,
	pub(crate) started_at_millis: i64,
	pub(crate) wait_on_geo: bool,
	started: bool,
}

impl Tracker {
	/// Builds a tracker. The transport variant is fixed here: the injected
	/// collector unless the configuration selects the JSON endpoint.
	pub fn new(
		config: TrackerConfig,
		env: Arc<dyn Environment>,
		sync_storage: Arc<dyn SyncStorage>,
		async_storage: Arc<dyn AsyncStorage>,
	) -> Result<Self> {
		config.validate()?;
		let transport = if config.use_json_endpoint {
			Transport::json(config.json_endpoint.clone(), config.request_timeout)?
		} else {
			Transport::collector()
		};
		let started_at_millis = env.now_millis();
		let wait_on_geo = config.geo_wait > Duration::ZERO;
		Ok(Self {
			identity: IdentityManager::new(config.max_session_idle, async_storage),
			config,
			env,
			sync_storage,
			store: beacon_core::ParameterStore::new(),
			queue: DispatchQueue::new(),
			transport,
			redirect_state: RedirectState::Idle,
			last_error: None,
			page_view_fired: false,
			started_at_millis,
			wait_on_geo,
			started: false,
		})
	}

	/// Runs the startup sequence: consume any cross-page handoff state,
	/// detect a redirect token on the arrival url, recover identity,
	/// establish ambient context, fire the automatic page view, and
	/// process the redirect token. Idempotent; a second call is a no-op.
	pub async fn start(&mut self) {
		if self.started {
			return;
		}
		self.started = true;

		self.consume_handoff_state();
		let token = self.detect_csr();

		if self.transport.is_ready() {
			let drained = self.queue.mark_ready();
			self.execute_all(drained).await;
		}

		if self.config.use_json_endpoint {
			let (party_cookie, session_cookie) = (
				self.config.party_cookie.clone(),
				self.config.session_cookie.clone(),
			);
			self.identity
				.resolve_from_cookies(self.env.as_ref(), &party_cookie, &session_cookie);
			self.identity.touch(self.env.now_millis());
		}

		self.apply_ambient_context().await;

		if self.config.auto_page_view {
			self.fire_page_view(None).await;
		}

		if let Some(token) = token {
			self.process_csr(token).await;
		}
	}

	/// Connects the host's collector callback, marking the transport ready
	/// and draining anything queued. Returns whether the callback was
	/// installed (it is one-time, and ignored on the JSON variant).
	pub async fn connect_collector(&mut self, collector: Arc<CollectorFn>) -> bool {
		if !self.transport.connect_collector(collector) {
			return false;
		}
		let drained = self.queue.mark_ready();
		self.execute_all(drained).await;
		true
	}

	/// Tracks a typed event. Returns false on validation failure, with the
	/// error on [`last_error`](Self::last_error).
	pub async fn track(&mut self, event: Event) -> bool {
		match event {
			Event::PageView(page_view) => self.fire_page_view(Some(page_view)).await,
			other => {
				let event_type = other.event_type().to_string();
				match other.into_fields() {
					Ok(fields) => {
						self.submit(Command::Fire { event_type, fields }).await;
						true
					}
					Err(err) => {
						self.report_validation(err).await;
						false
					}
				}
			}
		}
	}

	/// Fires a page view, waiting (bounded) for page-load readiness and
	/// merging the environment's page-load timing. Duplicate page views
	/// are suppressed unless configured otherwise.
	pub async fn fire_page_view(&mut self, page_view: Option<PageView>) -> bool {
		if self.page_view_fired && !self.config.allow_multiple_page_views {
			debug!("page view already fired");
			return false;
		}

		let page_view =
			page_view.unwrap_or_else(|| PageView::new(self.default_page().unwrap_or_default()));
		let mut fields = match Event::PageView(page_view).into_fields() {
			Ok(fields) => fields,
			Err(err) => {
				self.report_validation(err).await;
				return false;
			}
		};

		// Page-load timing is only meaningful once the page has loaded;
		// poll up to the bound, then fire regardless.
		let poll = self.config.page_load_poll;
		let mut attempts = 0u32;
		while !self.env.page_loaded() && attempts < poll.max_attempts {
			attempts += 1;
			tokio::time::sleep(poll.interval).await;
		}

		if let Some(timing) = self.env.performance_timing() {
			for (key, value) in timing.to_fields() {
				fields.entry(key).or_insert(value);
			}
		}

		self.page_view_fired = true;
		self.submit(Command::Fire {
			event_type: "pageview".to_string(),
			fields,
		})
		.await;
		true
	}

	/// Merges fields into a parameter lifetime through the dispatch queue.
	pub async fn set_params(&mut self, fields: Fields, lifetime: Lifetime) {
		self.submit(Command::Update { fields, lifetime }).await;
	}

	/// Removes keys from a parameter lifetime through the dispatch queue.
	pub async fn remove_params(&mut self, keys: &[&str], lifetime: Lifetime) {
		self.submit(Command::Remove {
			keys: keys.iter().map(|k| k.to_string()).collect(),
			lifetime,
		})
		.await;
	}

	/// Attaches a product to the next fired event.
	pub async fn add_product(&mut self, product: Product) -> bool {
		match product.into_fields() {
			Ok(fields) => {
				self.submit(Command::Update {
					fields,
					lifetime: Lifetime::Products,
				})
				.await;
				true
			}
			Err(err) => {
				self.report_validation(err).await;
				false
			}
		}
	}

	/// Attaches a promotion to the next fired event.
	pub async fn add_promotion(&mut self, promotion: Promotion) -> bool {
		match promotion.into_fields() {
			Ok(fields) => {
				self.submit(Command::Update {
					fields,
					lifetime: Lifetime::Promotions,
				})
				.await;
				true
			}
			Err(err) => {
				self.report_validation(err).await;
				false
			}
		}
	}

	/// Files an impression under its list for the next fired event.
	pub async fn add_impression(&mut self, impression: Impression) -> bool {
		match impression.into_fields() {
			Ok(fields) => {
				self.submit(Command::Update {
					fields,
					lifetime: Lifetime::Impressions,
				})
				.await;
				true
			}
			Err(err) => {
				self.report_validation(err).await;
				false
			}
		}
	}

	/// Sets the product action riding on the next fired event.
	pub async fn set_product_action(&mut self, action: ProductAction) -> bool {
		match action.into_fields() {
			Ok(fields) => {
				self.submit(Command::Update {
					fields,
					lifetime: Lifetime::Ephemeral,
				})
				.await;
				true
			}
			Err(err) => {
				self.report_validation(err).await;
				false
			}
		}
	}

	/// Clears the product action from the next event.
	pub async fn reset_product_action(&mut self) {
		self.remove_params(ProductAction::wire_keys(), Lifetime::Ephemeral)
			.await;
	}

	/// Sets the logged-in user id, sent as `uid` on every event.
	pub async fn set_user_id(&mut self, user_id: impl Into<String>) -> bool {
		let user_id = user_id.into();
		let trimmed = user_id.trim();
		if trimmed.is_empty() {
			self.report_validation(ValidationError::field("user_id")).await;
			return false;
		}
		let mut fields = Fields::new();
		fields.insert("uid".to_string(), Value::from(trimmed));
		self.set_params(fields, Lifetime::Persistent).await;
		true
	}

	/// Clears the user id, then re-derives it from the token cookie when
	/// one is present.
	pub async fn reset_user_id(&mut self) {
		self.remove_params(&["uid"], Lifetime::Persistent).await;
		let recovered =
			context::user_id_from_cookies(self.env.as_ref(), &self.config.user_token_cookie);
		if let Some(uid) = recovered {
			let mut fields = Fields::new();
			fields.insert("uid".to_string(), Value::String(uid));
			self.set_params(fields, Lifetime::Persistent).await;
		}
	}

	/// Sets the link id riding on the next event.
	pub async fn set_link_id(&mut self, link_id: impl Into<String>) -> bool {
		let link_id = link_id.into();
		let trimmed = link_id.trim();
		if trimmed.is_empty() {
			self.report_validation(ValidationError::field("link_id")).await;
			return false;
		}
		let mut fields = Fields::new();
		fields.insert("linkid".to_string(), Value::from(trimmed));
		self.set_params(fields, Lifetime::Ephemeral).await;
		true
	}

	pub async fn reset_link_id(&mut self) {
		self.remove_params(&["linkid"], Lifetime::Ephemeral).await;
	}

	/// Marks the next event as non-interactive.
	pub async fn set_noninteractive(&mut self) {
		let mut fields = Fields::new();
		fields.insert("ni".to_string(), Value::from(true));
		self.set_params(fields, Lifetime::Ephemeral).await;
	}

	pub async fn reset_noninteractive(&mut self) {
		self.remove_params(&["ni"], Lifetime::Ephemeral).await;
	}

	/// Pauses dispatch; fires and parameter changes queue until resumed.
	pub fn pause(&mut self) {
		self.queue.pause();
	}

	/// Resumes dispatch and drains the queue in submission order.
	pub async fn resume(&mut self) {
		let drained = self.queue.resume();
		self.execute_all(drained).await;
	}

	/// The most recent failure, if any. Fire/set methods overwrite this on
	/// each failure and leave it untouched on success.
	pub fn last_error(&self) -> Option<&TrackerError> {
		self.last_error.as_ref()
	}

	/// Count of signals successfully handed to the transport.
	pub fn signals_sent(&self) -> u64 {
		self.transport.signals_sent()
	}

	/// Where the redirect protocol currently stands.
	pub fn redirect_state(&self) -> RedirectState {
		self.redirect_state
	}

	/// Read access to the parameter store.
	pub fn params(&self) -> &beacon_core::ParameterStore {
		&self.store
	}

	pub(crate) async fn submit(&mut self, command: Command) {
		if let Some(command) = self.queue.submit(command) {
			self.execute(command).await;
		}
	}

	pub(crate) async fn execute_all(&mut self, commands: Vec<Command>) {
		for command in commands {
			self.execute(command).await;
		}
	}

	async fn execute(&mut self, command: Command) {
		match command {
			Command::Update { fields, lifetime } => self.store.update(fields, lifetime),
			Command::Remove { keys, lifetime } => {
				let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
				self.store.remove(&refs, lifetime);
			}
			Command::Fire { event_type, fields } => self.fire_now(&event_type, fields).await,
		}
	}

	/// Assembles and delivers one event: geolocation wait, parameter
	/// snapshot, time-since-load, event fields, then the transport. The
	/// ephemeral layers are cleared only after a successful delivery, with
	/// no mutation interleaved between snapshot and clear.
	pub(crate) async fn fire_now(&mut self, event_type: &str, event_fields: Fields) {
		self.await_geolocation().await;

		let mut merged = self.store.snapshot_for_fire();
		merged.insert("tspl".to_string(), Value::from(self.time_since_load()));
		for (key, value) in event_fields {
			merged.insert(key, value);
		}
		merged.retain(|_, value| !value.is_null());

		debug!(event_type, "firing event");
		let now = self.env.now_millis();
		let identity_poll = self.config.identity_poll;
		match self
			.transport
			.signal(&mut self.identity, now, identity_poll, event_type, merged)
			.await
		{
			Ok(()) => self.store.clear_ephemeral(),
			Err(err) => {
				warn!(error = %err, event_type, "signal failed");
				self.last_error = Some(err);
			}
		}
	}

	/// Blocks the fire (bounded) while a geolocation lookup is pending,
	/// merging the coordinates into persistent parameters on resolution.
	/// Past the configured deadline the fire proceeds without them.
	async fn await_geolocation(&mut self) {
		if !self.wait_on_geo {
			return;
		}
		let deadline = self.started_at_millis + self.config.geo_wait.as_millis() as i64;
		loop {
			match self.env.poll_geolocation() {
				GeoStatus::Resolved {
					latitude,
					longitude,
				} => {
					let mut fields = Fields::new();
					fields.insert("lat".to_string(), Value::from(latitude));
					fields.insert("lon".to_string(), Value::from(longitude));
					self.store.update(fields, Lifetime::Persistent);
					self.wait_on_geo = false;
					return;
				}
				GeoStatus::Unavailable => {
					self.wait_on_geo = false;
					return;
				}
				GeoStatus::Pending => {
					if self.env.now_millis() >= deadline {
						debug!("geolocation wait expired, firing without coordinates");
						return;
					}
					tokio::time::sleep(self.config.geo_poll_interval).await;
				}
			}
		}
	}

	/// Establishes the startup parameter context: data source, campaign
	/// attribution from the arrival url, ad click ids, and the logged-in
	/// user when a token cookie is present.
	async fn apply_ambient_context(&mut self) {
		let mut fields = Fields::new();
		fields.insert("ds".to_string(), Value::from("web"));

		if let Some(url) = self.env.arrival_url() {
			let args = query::parse_query(&url);
			for (key, value) in context::campaign_fields(&args) {
				fields.insert(key, value);
			}
			for (key, value) in context::ad_click_fields(&args) {
				fields.insert(key, value);
			}
		}

		if let Some(uid) =
			context::user_id_from_cookies(self.env.as_ref(), &self.config.user_token_cookie)
		{
			fields.insert("uid".to_string(), Value::String(uid));
		}

		self.submit(Command::Update {
			fields,
			lifetime: Lifetime::Persistent,
		})
		.await;
	}

	pub(crate) async fn report_validation(&mut self, err: ValidationError) {
		warn!(fields = ?err.fields, "payload validation failed");
		let detail = err.fields.join(", ");
		self.last_error = Some(TrackerError::Validation(err));

		// Usage bugs would otherwise be invisible; echo them through the
		// normal dispatch path so they land on a dashboard somewhere.
		if self.config.send_auto_exceptions {
			let mut fields = Fields::new();
			fields.insert("ds".to_string(), Value::from("sdk"));
			fields.insert(
				"exd".to_string(),
				Value::from(format!("invalid fields: {detail}")),
			);
			fields.insert("exf".to_string(), Value::from(false));
			self.submit(Command::Fire {
				event_type: "exception".to_string(),
				fields,
			})
			.await;
		}
	}

	fn time_since_load(&self) -> i64 {
		self.env
			.time_since_load_millis()
			.unwrap_or_else(|| self.env.now_millis() - self.started_at_millis)
	}

	fn default_page(&self) -> Option<String> {
		if let Some(page) = &self.config.auto_page_view_page {
			return Some(page.clone());
		}
		let url = self.env.arrival_url()?;
		reqwest::Url::parse(&url)
			.ok()
			.map(|parsed| parsed.path().to_string())
	}

	pub(crate) fn detect_csr(&mut self) -> Option<CsrToken> {
		crate::redirect::detect(self)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::PollPolicy;
	use crate::environment::{PageTiming, StaticEnvironment};
	use crate::storage::{MemoryAsyncStorage, MemoryStorage};
	use beacon_core::{Action, Custom, Exception, Timing};
	use serde_json::json;
	use std::sync::Mutex;
	use wiremock::matchers::method;
	use wiremock::{Mock, MockServer, ResponseTemplate};

	type Captured = Arc<Mutex<Vec<(String, Fields)>>>;

	fn capture() -> (Arc<CollectorFn>, Captured) {
		let seen: Captured = Arc::new(Mutex::new(Vec::new()));
		let sink = seen.clone();
		let collector: Arc<CollectorFn> = Arc::new(move |event_type, fields| {
			sink.lock()
				.unwrap()
				.push((event_type.to_string(), fields.clone()));
		});
		(collector, seen)
	}

	fn fields(value: serde_json::Value) -> Fields {
		value.as_object().unwrap().clone()
	}

	fn collector_tracker(env: StaticEnvironment) -> Tracker {
		Tracker::new(
			TrackerConfig::default(),
			Arc::new(env),
			Arc::new(MemoryStorage::new()),
			Arc::new(MemoryAsyncStorage::new()),
		)
		.unwrap()
	}

	async fn json_tracker(endpoint: String, env: StaticEnvironment) -> Tracker {
		let config = TrackerConfig::builder()
			.json_endpoint(endpoint)
			.identity_poll(PollPolicy::new(Duration::from_millis(1), 3))
			.build()
			.unwrap();
		Tracker::new(
			config,
			Arc::new(env),
			Arc::new(MemoryStorage::new()),
			Arc::new(MemoryAsyncStorage::new()),
		)
		.unwrap()
	}

	#[tokio::test]
	async fn commands_queue_until_collector_connects() {
		let mut tracker = collector_tracker(StaticEnvironment::new());
		tracker.start().await;
		tracker
			.set_params(fields(json!({"uid": "u1"})), Lifetime::Persistent)
			.await;
		assert!(tracker
			.track(Event::Action(Action::new("nav", "click")))
			.await);
		assert!(tracker.params().persistent().is_empty());

		let (collector, seen) = capture();
		assert!(tracker.connect_collector(collector).await);

		let seen = seen.lock().unwrap();
		// the queued parameter updates flush before the queued fire, so the
		// action carries both the persistent uid and the ambient context
		assert_eq!(seen.len(), 1);
		assert_eq!(seen[0].0, "event");
		assert_eq!(seen[0].1["uid"], json!("u1"));
		assert_eq!(seen[0].1["ec"], json!("nav"));
		assert_eq!(seen[0].1["ds"], json!("web"));
	}

	#[tokio::test]
	async fn ambient_context_is_the_first_signal() {
		let env = StaticEnvironment::new()
			.with_arrival_url("https://shop.example/?utm_campaign=spring&gclid=g1");
		let mut tracker = collector_tracker(env);
		tracker.start().await;
		let (collector, seen) = capture();
		tracker.connect_collector(collector).await;
		tracker
			.track(Event::Custom(Custom::new("ping", Fields::new())))
			.await;

		let seen = seen.lock().unwrap();
		let (_, fired) = &seen[0];
		assert_eq!(fired["cn"], json!("spring"));
		assert_eq!(fired["gclid"], json!("g1"));
		assert_eq!(fired["ds"], json!("web"));
	}

	#[tokio::test]
	async fn pause_resume_preserves_order() {
		let mut tracker = collector_tracker(StaticEnvironment::new());
		tracker.start().await;
		let (collector, seen) = capture();
		tracker.connect_collector(collector).await;

		tracker.pause();
		tracker
			.track(Event::Custom(Custom::new("first", Fields::new())))
			.await;
		tracker
			.set_params(fields(json!({"step": "2"})), Lifetime::Ephemeral)
			.await;
		tracker
			.track(Event::Custom(Custom::new("second", Fields::new())))
			.await;
		assert_eq!(seen.lock().unwrap().len(), 0);

		tracker.resume().await;
		let seen = seen.lock().unwrap();
		let types: Vec<&str> = seen.iter().map(|(t, _)| t.as_str()).collect();
		assert_eq!(types, vec!["first", "second"]);
		// the ephemeral update queued between the fires applies between
		// them: absent from the first, present on the second
		assert!(!seen[0].1.contains_key("step"));
		assert_eq!(seen[1].1["step"], json!("2"));
	}

	#[tokio::test]
	async fn ephemeral_clears_after_successful_fire() {
		let mut tracker = collector_tracker(StaticEnvironment::new());
		tracker.start().await;
		let (collector, seen) = capture();
		tracker.connect_collector(collector).await;

		tracker
			.set_params(fields(json!({"linkid": "top"})), Lifetime::Ephemeral)
			.await;
		tracker
			.track(Event::Custom(Custom::new("one", Fields::new())))
			.await;
		tracker
			.track(Event::Custom(Custom::new("two", Fields::new())))
			.await;

		let seen = seen.lock().unwrap();
		assert_eq!(seen[0].1["linkid"], json!("top"));
		assert!(!seen[1].1.contains_key("linkid"));
	}

	#[tokio::test]
	async fn commerce_payloads_ride_the_next_event() {
		let mut tracker = collector_tracker(StaticEnvironment::new());
		tracker.start().await;
		let (collector, seen) = capture();
		tracker.connect_collector(collector).await;

		assert!(tracker
			.add_product(Product::new("sku1", "Widget", "gadgets", 9.99))
			.await);
		assert!(tracker
			.add_impression(Impression::new("sku2", "Gizmo", "gadgets").in_list("search"))
			.await);
		assert!(tracker
			.set_product_action(ProductAction::Add)
			.await);
		tracker
			.track(Event::Custom(Custom::new("cart", Fields::new())))
			.await;

		let seen = seen.lock().unwrap();
		let (_, fired) = &seen[0];
		assert_eq!(fired["pr"][0]["id"], json!("sku1"));
		assert_eq!(fired["il"][0]["nm"], json!("search"));
		assert_eq!(fired["pa"], json!("add"));
	}

	#[tokio::test]
	async fn validation_failure_sets_error_and_fires_auto_exception() {
		let mut tracker = collector_tracker(StaticEnvironment::new());
		tracker.start().await;
		let (collector, seen) = capture();
		tracker.connect_collector(collector).await;

		assert!(!tracker
			.track(Event::Timing(Timing::new("", "load", -1)))
			.await);
		assert!(matches!(
			tracker.last_error(),
			Some(TrackerError::Validation(_))
		));

		let seen = seen.lock().unwrap();
		let (event_type, fired) = seen.last().unwrap();
		assert_eq!(event_type, "exception");
		assert_eq!(fired["ds"], json!("sdk"));
		assert_eq!(fired["exf"], json!(false));
		assert!(fired["exd"]
			.as_str()
			.unwrap()
			.contains("category"));
	}

	#[tokio::test]
	async fn auto_exceptions_can_be_disabled() {
		let config = TrackerConfig::builder()
			.send_auto_exceptions(false)
			.build()
			.unwrap();
		let mut tracker = Tracker::new(
			config,
			Arc::new(StaticEnvironment::new()),
			Arc::new(MemoryStorage::new()),
			Arc::new(MemoryAsyncStorage::new()),
		)
		.unwrap();
		tracker.start().await;
		let (collector, seen) = capture();
		tracker.connect_collector(collector).await;

		assert!(!tracker.track(Event::Exception(Exception::new(" "))).await);
		assert!(seen.lock().unwrap().iter().all(|(t, _)| t != "exception"));
	}

	#[tokio::test]
	async fn page_view_fires_once_by_default() {
		let env = StaticEnvironment::new().with_arrival_url("https://shop.example/cart?x=1");
		let mut tracker = collector_tracker(env);
		tracker.start().await;
		let (collector, seen) = capture();
		tracker.connect_collector(collector).await;

		assert!(tracker.fire_page_view(None).await);
		assert!(!tracker.fire_page_view(None).await);

		let seen = seen.lock().unwrap();
		let views: Vec<_> = seen.iter().filter(|(t, _)| t == "pageview").collect();
		assert_eq!(views.len(), 1);
		assert_eq!(views[0].1["page"], json!("/cart"));
	}

	#[tokio::test]
	async fn multiple_page_views_when_allowed() {
		let config = TrackerConfig::builder()
			.allow_multiple_page_views()
			.build()
			.unwrap();
		let mut tracker = Tracker::new(
			config,
			Arc::new(StaticEnvironment::new()),
			Arc::new(MemoryStorage::new()),
			Arc::new(MemoryAsyncStorage::new()),
		)
		.unwrap();
		tracker.start().await;
		let (collector, seen) = capture();
		tracker.connect_collector(collector).await;

		assert!(tracker.fire_page_view(Some(PageView::new("/a"))).await);
		assert!(tracker.fire_page_view(Some(PageView::new("/b"))).await);
		let seen = seen.lock().unwrap();
		assert_eq!(seen.iter().filter(|(t, _)| t == "pageview").count(), 2);
	}

	#[tokio::test]
	async fn page_view_merges_timing_beneath_payload() {
		let timing = PageTiming {
			navigation_start: 1000,
			load_event_end: 1800,
			..PageTiming::default()
		};
		let env = StaticEnvironment::new().with_timing(timing);
		let mut tracker = collector_tracker(env);
		tracker.start().await;
		let (collector, seen) = capture();
		tracker.connect_collector(collector).await;

		tracker.fire_page_view(Some(PageView::new("/x"))).await;
		let seen = seen.lock().unwrap();
		let (_, fired) = seen.iter().find(|(t, _)| t == "pageview").unwrap();
		assert_eq!(fired["plt"], json!(800));
		assert_eq!(fired["page"], json!("/x"));
	}

	#[tokio::test]
	async fn page_view_without_page_is_rejected() {
		let mut tracker = collector_tracker(StaticEnvironment::new());
		tracker.start().await;
		let (collector, _) = capture();
		tracker.connect_collector(collector).await;

		// no arrival url and no configured page: nothing to default to
		assert!(!tracker.fire_page_view(None).await);
		assert!(matches!(
			tracker.last_error(),
			Some(TrackerError::Validation(_))
		));
		assert!(!tracker.page_view_fired);
	}

	#[tokio::test]
	async fn auto_page_view_fires_at_startup() {
		let config = TrackerConfig::builder()
			.auto_page_view("/landing")
			.build()
			.unwrap();
		let mut tracker = Tracker::new(
			config,
			Arc::new(StaticEnvironment::new()),
			Arc::new(MemoryStorage::new()),
			Arc::new(MemoryAsyncStorage::new()),
		)
		.unwrap();
		tracker.start().await;
		let (collector, seen) = capture();
		tracker.connect_collector(collector).await;

		let seen = seen.lock().unwrap();
		let (_, fired) = seen.iter().find(|(t, _)| t == "pageview").unwrap();
		assert_eq!(fired["page"], json!("/landing"));
	}

	#[tokio::test]
	async fn resolved_geolocation_merges_coordinates() {
		let env = StaticEnvironment::new();
		env.set_geolocation(GeoStatus::Resolved {
			latitude: 52.1,
			longitude: 4.3,
		});
		let config = TrackerConfig::builder()
			.geo_wait(Duration::from_millis(200))
			.build()
			.unwrap();
		let mut tracker = Tracker::new(
			config,
			Arc::new(env),
			Arc::new(MemoryStorage::new()),
			Arc::new(MemoryAsyncStorage::new()),
		)
		.unwrap();
		tracker.start().await;
		let (collector, seen) = capture();
		tracker.connect_collector(collector).await;

		tracker
			.track(Event::Custom(Custom::new("ping", Fields::new())))
			.await;
		let seen = seen.lock().unwrap();
		let (_, fired) = seen.last().unwrap();
		assert_eq!(fired["lat"], json!(52.1));
		assert_eq!(fired["lon"], json!(4.3));
	}

	#[tokio::test]
	async fn pending_geolocation_expires_and_fires_anyway() {
		let env = StaticEnvironment::new();
		env.set_geolocation(GeoStatus::Pending);
		let config = TrackerConfig::builder()
			.geo_wait(Duration::from_millis(60))
			.build()
			.unwrap();
		let mut tracker = Tracker::new(
			config,
			Arc::new(env),
			Arc::new(MemoryStorage::new()),
			Arc::new(MemoryAsyncStorage::new()),
		)
		.unwrap();
		tracker.start().await;
		let (collector, seen) = capture();
		tracker.connect_collector(collector).await;

		tracker
			.track(Event::Custom(Custom::new("ping", Fields::new())))
			.await;
		let seen = seen.lock().unwrap();
		let (_, fired) = seen.last().unwrap();
		assert!(!fired.contains_key("lat"));
	}

	#[tokio::test]
	async fn user_and_link_setters_route_to_their_lifetimes() {
		let mut tracker = collector_tracker(StaticEnvironment::new());
		tracker.start().await;
		let (collector, _) = capture();
		tracker.connect_collector(collector).await;

		assert!(tracker.set_user_id("  user-1  ").await);
		assert!(tracker.set_link_id("header-cta").await);
		tracker.set_noninteractive().await;

		assert_eq!(
			tracker.params().get("uid", Lifetime::Persistent),
			Some(&json!("user-1"))
		);
		assert_eq!(
			tracker.params().get("linkid", Lifetime::Ephemeral),
			Some(&json!("header-cta"))
		);
		assert_eq!(
			tracker.params().get("ni", Lifetime::Ephemeral),
			Some(&json!(true))
		);

		tracker.reset_link_id().await;
		tracker.reset_noninteractive().await;
		assert!(tracker.params().ephemeral().is_empty());
	}

	#[tokio::test]
	async fn empty_user_id_is_rejected() {
		let mut tracker = collector_tracker(StaticEnvironment::new());
		tracker.start().await;
		let (collector, _) = capture();
		tracker.connect_collector(collector).await;

		assert!(!tracker.set_user_id("   ").await);
		assert!(matches!(
			tracker.last_error(),
			Some(TrackerError::Validation(_))
		));
	}

	#[tokio::test]
	async fn reset_user_id_rederives_from_cookie() {
		let payload = json!({"sub": "cookie-user"});
		let encode = |v: &serde_json::Value| {
			use base64::Engine;
			base64::engine::general_purpose::URL_SAFE_NO_PAD
				.encode(serde_json::to_vec(v).unwrap())
		};
		let jwt = format!("{}.{}.sig", encode(&json!({"alg": "none"})), encode(&payload));
		let env = StaticEnvironment::new().with_cookie("_rtok", jwt);
		let mut tracker = collector_tracker(env);
		tracker.start().await;
		let (collector, _) = capture();
		tracker.connect_collector(collector).await;

		tracker.set_user_id("manual-user").await;
		tracker.reset_user_id().await;
		assert_eq!(
			tracker.params().get("uid", Lifetime::Persistent),
			Some(&json!("cookie-user"))
		);
	}

	#[tokio::test]
	async fn every_fire_carries_time_since_load() {
		let mut tracker = collector_tracker(StaticEnvironment::new());
		tracker.start().await;
		let (collector, seen) = capture();
		tracker.connect_collector(collector).await;

		tracker
			.track(Event::Custom(Custom::new("ping", Fields::new())))
			.await;
		let seen = seen.lock().unwrap();
		let (_, fired) = seen.last().unwrap();
		assert!(fired["tspl"].as_i64().unwrap() >= 0);
	}

	#[tokio::test]
	async fn transport_failure_keeps_ephemeral_and_records_error() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(500))
			.mount(&server)
			.await;
		let mut tracker =
			json_tracker(format!("{}/json", server.uri()), StaticEnvironment::new()).await;
		tracker.start().await;

		tracker
			.set_params(fields(json!({"linkid": "top"})), Lifetime::Ephemeral)
			.await;
		tracker
			.track(Event::Custom(Custom::new("ping", Fields::new())))
			.await;

		assert!(matches!(
			tracker.last_error(),
			Some(TrackerError::Transport { status: 500 })
		));
		assert_eq!(tracker.signals_sent(), 0);
		// the next fire still carries the ephemeral value
		assert_eq!(
			tracker.params().ephemeral()["linkid"],
			json!("top")
		);
	}

	#[tokio::test]
	async fn json_tracker_delivers_end_to_end() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(204))
			.mount(&server)
			.await;
		let env = StaticEnvironment::new()
			.with_cookie("_dvp", "party-cookie")
			.with_cookie("_dvs", "session-cookie");
		let mut tracker = json_tracker(format!("{}/json", server.uri()), env).await;
		tracker.start().await;

		tracker
			.track(Event::Action(Action::new("nav", "click")))
			.await;

		assert_eq!(tracker.signals_sent(), 1);
		let requests = server.received_requests().await.unwrap();
		let last: serde_json::Value =
			serde_json::from_slice(&requests.last().unwrap().body).unwrap();
		assert_eq!(last["event_type"], "event");
		assert_eq!(last["session_id"], "session-cookie");
		assert_eq!(last["is_new_party"], false);
		assert!(requests
			.last()
			.unwrap()
			.url
			.query()
			.unwrap()
			.contains("party-cookie"));
	}
}
