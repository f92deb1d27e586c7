// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the beacon event-tracking SDK.
//!
//! This crate provides the pure data model shared by the client SDK
//! (`beacon`): the layered parameter store, the closed catalog of event
//! kinds with their validation and wire-key mappings, party/session
//! identity types, and the cross-page redirect (CSR) token format.
//!
//! # Example
//!
//! ```
//! use beacon_core::{Action, Event, Lifetime, ParameterStore};
//!
//! let mut store = ParameterStore::new();
//! store.update(
//! 	serde_json::json!({"uid": "user1"}).as_object().unwrap().clone(),
//! 	Lifetime::Persistent,
//! );
//!
//! let event = Event::Action(Action::new("nav", "click").with_label("logo"));
//! let fields = event.into_fields().unwrap();
//! assert_eq!(fields["ec"], "nav");
//! ```

pub mod commerce;
pub mod csr;
pub mod error;
pub mod event;
pub mod identity;
pub mod params;

pub use commerce::{Impression, Product, ProductAction, Promotion, Transaction};
pub use csr::{CsrEvent, CsrToken};
pub use error::{CoreError, Result, ValidationError};
pub use event::{Action, Custom, Event, Exception, PageView, ScreenView, Social, Timing};
pub use identity::{random_token, Party, Session, TrackerId};
pub use params::{
	Fields, ImpressionList, Lifetime, ParameterStore, DEFAULT_IMPRESSION_LIST, IMPRESSION_LIST_KEY,
};
