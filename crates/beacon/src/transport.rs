// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Transport adapters for delivering signals to the collector.
//!
//! Two variants, chosen at construction and never switched at runtime —
//! except by the redirect protocol, which forces the direct-JSON variant to
//! replay a token's events. The injected-collector variant hands signals to
//! a callback the host connects once its collector has loaded; the JSON
//! variant posts an envelope straight to the collector's JSON endpoint.
//!
//! Every successfully issued signal increments a monotonic counter the
//! redirect protocol reads to decide when navigation may proceed.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::{random_token, Fields};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::PollPolicy;
use crate::error::{Result, TrackerError};
use crate::identity::IdentityManager;

/// The injected collector callback: `(event_type, fields)`.
pub type CollectorFn = dyn Fn(&str, &Fields) + Send + Sync;

/// The envelope posted to the JSON endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
	pub session_id: String,
	pub event_id: String,
	pub is_new_party: bool,
	pub is_new_session: bool,
	pub client_timestamp_iso: String,
	pub event_type: String,
	pub parameters: Fields,
}

/// A transport for collector signals.
pub enum Transport {
	/// Delegates to a host-connected collector callback.
	Collector(CollectorTransport),
	/// Posts directly to a JSON endpoint.
	Json(JsonTransport),
}

impl Transport {
	/// Builds the injected-collector variant; not ready until the host
	/// connects its callback.
	pub fn collector() -> Self {
		Transport::Collector(CollectorTransport {
			collector: None,
			sent: 0,
		})
	}

	/// Builds the direct-JSON variant pointed at `endpoint`.
	pub fn json(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self> {
		Ok(Transport::Json(JsonTransport::new(
			endpoint.into(),
			request_timeout,
		)?))
	}

	/// Whether signals can be delivered right now.
	pub fn is_ready(&self) -> bool {
		match self {
			Transport::Collector(t) => t.collector.is_some(),
			Transport::Json(_) => true,
		}
	}

	/// Count of successfully issued signals.
	pub fn signals_sent(&self) -> u64 {
		match self {
			Transport::Collector(t) => t.sent,
			Transport::Json(t) => t.sent,
		}
	}

	/// Connects the host's collector callback. One-time: a second
	/// connection attempt is ignored, as is connecting onto the JSON
	/// variant. Returns whether the callback was installed.
	pub fn connect_collector(&mut self, collector: Arc<CollectorFn>) -> bool {
		match self {
			Transport::Collector(t) if t.collector.is_none() => {
				t.collector = Some(collector);
				true
			}
			_ => false,
		}
	}

	/// Replaces this transport with the JSON variant at `endpoint`,
	/// carrying the sent-signal count forward. Used only by the redirect
	/// protocol.
	pub fn force_json(
		&mut self,
		endpoint: impl Into<String>,
		request_timeout: Duration,
	) -> Result<()> {
		let sent = self.signals_sent();
		let mut json = JsonTransport::new(endpoint.into(), request_timeout)?;
		json.sent = sent;
		*self = Transport::Json(json);
		Ok(())
	}

	/// Delivers one signal.
	///
	/// The JSON variant resolves the party id first (bounded poll, id
	/// synthesis as the fallback), re-evaluates the session, and treats
	/// exactly 204 No Content as success. Failures are returned for the
	/// caller to record; they are not retried here.
	pub async fn signal(
		&mut self,
		identity: &mut IdentityManager,
		now_millis: i64,
		identity_poll: PollPolicy,
		event_type: &str,
		fields: Fields,
	) -> Result<()> {
		match self {
			Transport::Collector(t) => t.signal(event_type, fields),
			Transport::Json(t) => {
				t.signal(identity, now_millis, identity_poll, event_type, fields)
					.await
			}
		}
	}
}

/// Transport that hands signals to an injected collector callback.
pub struct CollectorTransport {
	collector: Option<Arc<CollectorFn>>,
	sent: u64,
}

impl CollectorTransport {
	fn signal(&mut self, event_type: &str, fields: Fields) -> Result<()> {
		let collector = self
			.collector
			.as_ref()
			.ok_or(TrackerError::CollectorUnavailable)?;
		collector(event_type, &fields);
		self.sent += 1;
		debug!(event_type, sent = self.sent, "signal handed to collector");
		Ok(())
	}
}

/// Transport that posts envelopes to the JSON endpoint.
pub struct JsonTransport {
	endpoint: String,
	client: reqwest::Client,
	sent: u64,
}

impl JsonTransport {
	fn new(endpoint: String, request_timeout: Duration) -> Result<Self> {
		let client = reqwest::Client::builder()
			.timeout(request_timeout)
			.build()?;
		Ok(Self {
			endpoint,
			client,
			sent: 0,
		})
	}

	async fn signal(
		&mut self,
		identity: &mut IdentityManager,
		now_millis: i64,
		identity_poll: PollPolicy,
		event_type: &str,
		fields: Fields,
	) -> Result<()> {
		let party_id = identity.ensure_party(now_millis, identity_poll).await;
		identity.touch(now_millis);

		let envelope = Envelope {
			session_id: identity
				.session()
				.map(|s| s.id.clone())
				.unwrap_or_default(),
			event_id: random_token(),
			is_new_party: identity.party_is_new(),
			is_new_session: identity.session_is_new(),
			client_timestamp_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
			event_type: event_type.to_string(),
			parameters: fields,
		};

		debug!(event_type, party = %party_id, "posting signal to json endpoint");
		let response = self
			.client
			.post(&self.endpoint)
			.query(&[("p", party_id.as_str())])
			.json(&envelope)
			.send()
			.await?;

		let status = response.status().as_u16();
		if status != 204 {
			warn!(status, event_type, "json endpoint rejected signal");
			return Err(TrackerError::Transport { status });
		}

		identity.mark_sent();
		self.sent += 1;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::storage::{AsyncStorage, MemoryAsyncStorage};
	use serde_json::json;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Mutex;
	use wiremock::matchers::{method, path, query_param};
	use wiremock::{Mock, MockServer, Request, ResponseTemplate};

	const IDLE: Duration = Duration::from_secs(1800);
	const TIMEOUT: Duration = Duration::from_secs(5);

	fn fast_poll() -> PollPolicy {
		PollPolicy::new(Duration::from_millis(1), 3)
	}

	fn identity() -> IdentityManager {
		IdentityManager::new(IDLE, Arc::new(MemoryAsyncStorage::new()))
	}

	fn fields(value: serde_json::Value) -> Fields {
		value.as_object().unwrap().clone()
	}

	#[test]
	fn collector_transport_not_ready_until_connected() {
		let mut transport = Transport::collector();
		assert!(!transport.is_ready());
		assert!(transport.connect_collector(Arc::new(|_, _| {})));
		assert!(transport.is_ready());
	}

	#[test]
	fn collector_connection_is_one_time() {
		let mut transport = Transport::collector();
		assert!(transport.connect_collector(Arc::new(|_, _| {})));
		assert!(!transport.connect_collector(Arc::new(|_, _| {})));
	}

	#[test]
	fn json_transport_is_always_ready() {
		let transport = Transport::json("http://localhost:1/json", TIMEOUT).unwrap();
		assert!(transport.is_ready());
	}

	#[tokio::test]
	async fn collector_signal_invokes_callback_and_counts() {
		let count = Arc::new(AtomicUsize::new(0));
		let seen = Arc::new(Mutex::new(Vec::new()));
		let mut transport = Transport::collector();
		{
			let count = count.clone();
			let seen = seen.clone();
			transport.connect_collector(Arc::new(move |event_type, _fields| {
				count.fetch_add(1, Ordering::SeqCst);
				seen.lock().unwrap().push(event_type.to_string());
			}));
		}
		let mut id = identity();
		transport
			.signal(&mut id, 1_000, fast_poll(), "pageview", Fields::new())
			.await
			.unwrap();
		assert_eq!(count.load(Ordering::SeqCst), 1);
		assert_eq!(seen.lock().unwrap().as_slice(), ["pageview"]);
		assert_eq!(transport.signals_sent(), 1);
	}

	#[tokio::test]
	async fn unconnected_collector_reports_unavailable() {
		let mut transport = Transport::collector();
		let mut id = identity();
		let err = transport
			.signal(&mut id, 1_000, fast_poll(), "pageview", Fields::new())
			.await
			.unwrap_err();
		assert!(matches!(err, TrackerError::CollectorUnavailable));
		assert_eq!(transport.signals_sent(), 0);
	}

	#[tokio::test]
	async fn json_signal_posts_envelope_with_party_query() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/json"))
			.respond_with(ResponseTemplate::new(204))
			.expect(1)
			.mount(&server)
			.await;

		let mut transport = Transport::json(format!("{}/json", server.uri()), TIMEOUT).unwrap();
		let mut id = identity();
		transport
			.signal(
				&mut id,
				1_000,
				fast_poll(),
				"pageview",
				fields(json!({"page": "/x"})),
			)
			.await
			.unwrap();

		assert_eq!(transport.signals_sent(), 1);
		let requests = server.received_requests().await.unwrap();
		let request: &Request = &requests[0];
		assert!(request.url.query().unwrap().starts_with("p=0%3A"));
		let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
		assert_eq!(body["event_type"], "pageview");
		assert_eq!(body["parameters"]["page"], "/x");
		assert_eq!(body["is_new_party"], true);
		assert_eq!(body["is_new_session"], true);
		assert!(body["session_id"].as_str().unwrap().starts_with("0:"));
		assert!(!body["event_id"].as_str().unwrap().is_empty());
		assert!(body["client_timestamp_iso"]
			.as_str()
			.unwrap()
			.ends_with('Z'));
	}

	#[tokio::test]
	async fn json_success_clears_new_flags() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(204))
			.mount(&server)
			.await;

		let mut transport = Transport::json(format!("{}/json", server.uri()), TIMEOUT).unwrap();
		let mut id = identity();
		transport
			.signal(&mut id, 1_000, fast_poll(), "a", Fields::new())
			.await
			.unwrap();
		transport
			.signal(&mut id, 1_001, fast_poll(), "b", Fields::new())
			.await
			.unwrap();

		let requests = server.received_requests().await.unwrap();
		let second: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
		assert_eq!(second["is_new_party"], false);
		assert_eq!(second["is_new_session"], false);
		assert_eq!(transport.signals_sent(), 2);
	}

	#[tokio::test]
	async fn json_non_204_is_an_error_and_not_counted() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(200))
			.mount(&server)
			.await;

		let mut transport = Transport::json(format!("{}/json", server.uri()), TIMEOUT).unwrap();
		let mut id = identity();
		let err = transport
			.signal(&mut id, 1_000, fast_poll(), "a", Fields::new())
			.await
			.unwrap_err();
		assert!(matches!(err, TrackerError::Transport { status: 200 }));
		assert_eq!(transport.signals_sent(), 0);
		assert!(id.party_is_new());
	}

	#[tokio::test]
	async fn json_reuses_party_across_signals() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(query_param("p", "0:fixed:party"))
			.respond_with(ResponseTemplate::new(204))
			.expect(2)
			.mount(&server)
			.await;

		let storage = Arc::new(MemoryAsyncStorage::new());
		storage.set_item("party", "0:fixed:party").await.unwrap();
		let mut id = IdentityManager::new(IDLE, storage);

		let mut transport = Transport::json(format!("{}/json", server.uri()), TIMEOUT).unwrap();
		for n in 0..2 {
			transport
				.signal(&mut id, 1_000 + n, fast_poll(), "ev", Fields::new())
				.await
				.unwrap();
		}
	}

	#[tokio::test]
	async fn force_json_carries_sent_count() {
		let mut transport = Transport::collector();
		transport.connect_collector(Arc::new(|_, _| {}));
		let mut id = identity();
		transport
			.signal(&mut id, 1_000, fast_poll(), "ev", Fields::new())
			.await
			.unwrap();
		assert_eq!(transport.signals_sent(), 1);

		transport
			.force_json("http://localhost:9/json", TIMEOUT)
			.unwrap();
		assert!(matches!(transport, Transport::Json(_)));
		assert_eq!(transport.signals_sent(), 1);
	}
}
