// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The closed catalog of trackable events.
//!
//! Every event kind carries a typed payload with its own validation and its
//! own mapping onto the short wire keys the collector schema expects. There
//! is no string-assembled dispatch: adding an event kind means adding a
//! variant here.
//!
//! Payloads accept arbitrary extra fields (merged beneath the typed keys),
//! so long as the caller keeps them compatible with the collector schema.

use serde_json::Value;

use crate::error::ValidationError;
use crate::params::Fields;

/// A trackable event with its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
	/// A page view (`pageview`).
	PageView(PageView),
	/// A screen view in a non-browser app (`screenview`).
	ScreenView(ScreenView),
	/// A custom category/action interaction (`event`).
	Action(Action),
	/// A social network interaction (`social`).
	Social(Social),
	/// An application exception (`exception`).
	Exception(Exception),
	/// A user timing measurement (`timing`).
	Timing(Timing),
	/// A raw passthrough event; fields are sent as given.
	Custom(Custom),
}

impl Event {
	/// The wire event type.
	pub fn event_type(&self) -> &str {
		match self {
			Event::PageView(_) => "pageview",
			Event::ScreenView(_) => "screenview",
			Event::Action(_) => "event",
			Event::Social(_) => "social",
			Event::Exception(_) => "exception",
			Event::Timing(_) => "timing",
			Event::Custom(c) => &c.event_type,
		}
	}

	/// Validates the payload and maps it onto wire fields.
	pub fn into_fields(self) -> Result<Fields, ValidationError> {
		match self {
			Event::PageView(p) => p.into_fields(),
			Event::ScreenView(p) => p.into_fields(),
			Event::Action(p) => p.into_fields(),
			Event::Social(p) => p.into_fields(),
			Event::Exception(p) => p.into_fields(),
			Event::Timing(p) => p.into_fields(),
			Event::Custom(p) => p.into_fields(),
		}
	}
}

/// Collects invalid field names across a whole payload before failing,
/// so the caller sees every problem at once.
#[derive(Debug, Default)]
pub(crate) struct Validator {
	invalid: Vec<String>,
}

impl Validator {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	/// A required string: must be non-empty after trimming.
	pub(crate) fn require_str(&mut self, name: &str, value: &str) -> String {
		let trimmed = value.trim();
		if trimmed.is_empty() {
			self.invalid.push(name.to_string());
		}
		trimmed.to_string()
	}

	/// An optional string: empty after trimming counts as absent.
	pub(crate) fn optional_str(&mut self, value: Option<&str>) -> Option<String> {
		value
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.map(str::to_string)
	}

	/// A required integer that must be strictly positive.
	pub(crate) fn require_positive(&mut self, name: &str, value: i64) -> i64 {
		if value <= 0 {
			self.invalid.push(name.to_string());
		}
		value
	}

	/// An optional number that must be strictly positive when present.
	pub(crate) fn optional_positive(&mut self, name: &str, value: Option<f64>) -> Option<f64> {
		if let Some(v) = value {
			if v <= 0.0 {
				self.invalid.push(name.to_string());
			}
		}
		value
	}

	pub(crate) fn fail(&mut self, name: &str) {
		self.invalid.push(name.to_string());
	}

	pub(crate) fn finish(self) -> Result<(), ValidationError> {
		if self.invalid.is_empty() {
			Ok(())
		} else {
			Err(ValidationError::new(self.invalid))
		}
	}
}

/// Merges typed wire keys over any caller-supplied extras.
pub(crate) fn assemble(extra: Fields, typed: Vec<(&str, Value)>) -> Fields {
	let mut out = extra;
	for (key, value) in typed {
		out.insert(key.to_string(), value);
	}
	out
}

/// Payload for a `pageview` event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageView {
	/// The url of the page being viewed.
	pub page: String,
	/// Extra schema-compatible fields to ride along.
	pub extra: Fields,
}

impl PageView {
	pub fn new(page: impl Into<String>) -> Self {
		Self {
			page: page.into(),
			extra: Fields::new(),
		}
	}

	pub fn with_extra(mut self, extra: Fields) -> Self {
		self.extra = extra;
		self
	}

	fn into_fields(self) -> Result<Fields, ValidationError> {
		let mut v = Validator::new();
		let page = v.require_str("page", &self.page);
		v.finish()?;
		Ok(assemble(self.extra, vec![("page", Value::String(page))]))
	}
}

/// Payload for a `screenview` event.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenView {
	/// The name of the screen being viewed.
	pub screen: String,
	pub extra: Fields,
}

impl ScreenView {
	pub fn new(screen: impl Into<String>) -> Self {
		Self {
			screen: screen.into(),
			extra: Fields::new(),
		}
	}

	pub fn with_extra(mut self, extra: Fields) -> Self {
		self.extra = extra;
		self
	}

	fn into_fields(self) -> Result<Fields, ValidationError> {
		let mut v = Validator::new();
		let screen = v.require_str("screen", &self.screen);
		v.finish()?;
		Ok(assemble(self.extra, vec![("cd", Value::String(screen))]))
	}
}

/// Payload for a custom interaction `event`.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
	pub category: String,
	pub action: String,
	pub label: Option<String>,
	pub value: Option<i64>,
	pub extra: Fields,
}

impl Action {
	pub fn new(category: impl Into<String>, action: impl Into<String>) -> Self {
		Self {
			category: category.into(),
			action: action.into(),
			label: None,
			value: None,
			extra: Fields::new(),
		}
	}

	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = Some(label.into());
		self
	}

	pub fn with_value(mut self, value: i64) -> Self {
		self.value = Some(value);
		self
	}

	pub fn with_extra(mut self, extra: Fields) -> Self {
		self.extra = extra;
		self
	}

	fn into_fields(self) -> Result<Fields, ValidationError> {
		let mut v = Validator::new();
		let category = v.require_str("category", &self.category);
		let action = v.require_str("action", &self.action);
		let label = v.optional_str(self.label.as_deref());
		v.finish()?;
		let mut typed = vec![
			("ec", Value::String(category)),
			("ea", Value::String(action)),
		];
		if let Some(label) = label {
			typed.push(("el", Value::String(label)));
		}
		if let Some(value) = self.value {
			typed.push(("ev", Value::from(value)));
		}
		Ok(assemble(self.extra, typed))
	}
}

/// Payload for a `social` event.
#[derive(Debug, Clone, PartialEq)]
pub struct Social {
	pub network: String,
	pub action: String,
	pub target: String,
	pub extra: Fields,
}

impl Social {
	pub fn new(
		network: impl Into<String>,
		action: impl Into<String>,
		target: impl Into<String>,
	) -> Self {
		Self {
			network: network.into(),
			action: action.into(),
			target: target.into(),
			extra: Fields::new(),
		}
	}

	pub fn with_extra(mut self, extra: Fields) -> Self {
		self.extra = extra;
		self
	}

	fn into_fields(self) -> Result<Fields, ValidationError> {
		let mut v = Validator::new();
		let network = v.require_str("network", &self.network);
		let action = v.require_str("action", &self.action);
		let target = v.require_str("target", &self.target);
		v.finish()?;
		Ok(assemble(
			self.extra,
			vec![
				("sn", Value::String(network)),
				("sa", Value::String(action)),
				("st", Value::String(target)),
			],
		))
	}
}

/// Payload for an `exception` event.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
	/// A description of the exception.
	pub description: String,
	/// Whether the exception was fatal to the application.
	pub fatal: bool,
	pub extra: Fields,
}

impl Exception {
	pub fn new(description: impl Into<String>) -> Self {
		Self {
			description: description.into(),
			fatal: false,
			extra: Fields::new(),
		}
	}

	pub fn fatal(mut self) -> Self {
		self.fatal = true;
		self
	}

	pub fn with_extra(mut self, extra: Fields) -> Self {
		self.extra = extra;
		self
	}

	fn into_fields(self) -> Result<Fields, ValidationError> {
		let mut v = Validator::new();
		let description = v.require_str("description", &self.description);
		v.finish()?;
		Ok(assemble(
			self.extra,
			vec![
				("exd", Value::String(description)),
				("exf", Value::Bool(self.fatal)),
			],
		))
	}
}

/// Payload for a `timing` event.
#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
	pub category: String,
	pub variable: String,
	/// Measured time in milliseconds; must be positive.
	pub time: i64,
	pub label: Option<String>,
	pub extra: Fields,
}

impl Timing {
	pub fn new(category: impl Into<String>, variable: impl Into<String>, time: i64) -> Self {
		Self {
			category: category.into(),
			variable: variable.into(),
			time,
			label: None,
			extra: Fields::new(),
		}
	}

	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = Some(label.into());
		self
	}

	pub fn with_extra(mut self, extra: Fields) -> Self {
		self.extra = extra;
		self
	}

	fn into_fields(self) -> Result<Fields, ValidationError> {
		let mut v = Validator::new();
		let category = v.require_str("category", &self.category);
		let variable = v.require_str("variable", &self.variable);
		let time = v.require_positive("time", self.time);
		let label = v.optional_str(self.label.as_deref());
		v.finish()?;
		let mut typed = vec![
			("utc", Value::String(category)),
			("utv", Value::String(variable)),
			("utt", Value::from(time)),
		];
		if let Some(label) = label {
			typed.push(("utl", Value::String(label)));
		}
		Ok(assemble(self.extra, typed))
	}
}

/// A raw event: type and fields are sent as given.
#[derive(Debug, Clone, PartialEq)]
pub struct Custom {
	pub event_type: String,
	pub fields: Fields,
}

impl Custom {
	pub fn new(event_type: impl Into<String>, fields: Fields) -> Self {
		Self {
			event_type: event_type.into(),
			fields,
		}
	}

	fn into_fields(self) -> Result<Fields, ValidationError> {
		let mut v = Validator::new();
		if self.event_type.trim().is_empty() {
			v.fail("event_type");
		}
		v.finish()?;
		Ok(self.fields)
	}
}
