// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client-side event-tracking SDK.
//!
//! This crate builds and dispatches analytics events — page views,
//! e-commerce actions, social interactions, timings, exceptions — to a
//! remote collector, managing party/session identity, a layered parameter
//! store, exactly-once in-order dispatch with queueing while the transport
//! is not ready, and the cross-page redirect (CSR) handoff protocol.
//!
//! # Features
//!
//! - **Typed events**: a closed catalog of event kinds, each validated and
//!   mapped onto the collector's wire keys
//! - **Layered parameters**: persistent, ephemeral, and list-valued state
//!   merged into every fire
//! - **Two transports**: an injected collector callback, or direct JSON
//!   POSTs with party/session identity in the envelope
//! - **Capability injection**: cookies, navigation, timing, geolocation
//!   and storage all arrive through traits; no ambient globals
//! - **Redirect protocol**: replay-then-navigate handoff across pages,
//!   gated so in-flight events are not dropped
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use beacon::{Tracker, TrackerConfig, NullEnvironment, MemoryStorage, MemoryAsyncStorage};
//! use beacon_core::{Action, Event};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TrackerConfig::builder()
//!         .json_endpoint("https://collector.example.com/json")
//!         .build()?;
//!     let mut tracker = Tracker::new(
//!         config,
//!         Arc::new(NullEnvironment),
//!         Arc::new(MemoryStorage::new()),
//!         Arc::new(MemoryAsyncStorage::new()),
//!     )?;
//!     tracker.start().await;
//!
//!     tracker.track(Event::Action(Action::new("nav", "click"))).await;
//!     Ok(())
//! }
//! ```

mod config;
mod context;
mod environment;
mod error;
mod identity;
mod query;
mod queue;
mod redirect;
mod storage;
mod tracker;
mod transport;

pub use config::{
	PollPolicy, TrackerConfig, TrackerConfigBuilder, DEFAULT_PARTY_COOKIE, DEFAULT_SESSION_COOKIE,
	DEFAULT_USER_TOKEN_COOKIE,
};
pub use environment::{Environment, GeoStatus, NullEnvironment, PageTiming, StaticEnvironment};
pub use error::{Result, TrackerError};
pub use identity::IdentityManager;
pub use queue::{Command, DispatchQueue};
pub use redirect::{RedirectState, CSR_QUERY_ARG, CSR_STATE_KEY};
pub use storage::{AsyncStorage, MemoryAsyncStorage, MemoryStorage, SyncStorage};
pub use tracker::Tracker;
pub use transport::{CollectorFn, Envelope, Transport};

// Re-export core types for convenience
pub use beacon_core::{
	Action, CsrEvent, CsrToken, Custom, Event, Exception, Fields, Impression, Lifetime, PageView,
	ParameterStore, Party, Product, ProductAction, Promotion, ScreenView, Session, Social, Timing,
	TrackerId, Transaction, ValidationError,
};
