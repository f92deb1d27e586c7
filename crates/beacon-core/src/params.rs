// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered event parameter state.
//!
//! Parameters live in one of five lifetimes: `persistent` values ride on
//! every fired event until removed, `ephemeral` values ride on exactly the
//! next event, and the three list lifetimes (`products`, `promotions`,
//! `impressions`) accumulate entries that ride on the next event as arrays.
//! Everything except the persistent map is discarded after a fire.

use serde::Serialize;
use serde_json::{Map, Value};

/// Default impression list name when an impression does not name one.
pub const DEFAULT_IMPRESSION_LIST: &str = "il1";

/// Wire key under which an impression routes itself to a named list.
pub const IMPRESSION_LIST_KEY: &str = "ilnm";

/// A flat map of event fields.
pub type Fields = Map<String, Value>;

/// The lifetime of a parameter update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
	/// Sent on all events until explicitly removed.
	Persistent,
	/// Sent on the next event only.
	Ephemeral,
	/// Product entries sent with the next event under `pr`.
	Products,
	/// Promotion entries sent with the next event under `promo`.
	Promotions,
	/// Impression entries, grouped by list, sent with the next event under `il`.
	Impressions,
}

impl Lifetime {
	/// Returns the string representation used in cross-page handoff blobs.
	pub fn as_str(&self) -> &'static str {
		match self {
			Lifetime::Persistent => "persistent",
			Lifetime::Ephemeral => "ephemeral",
			Lifetime::Products => "products",
			Lifetime::Promotions => "promotions",
			Lifetime::Impressions => "impressions",
		}
	}
}

impl std::str::FromStr for Lifetime {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"persistent" => Ok(Lifetime::Persistent),
			"ephemeral" => Ok(Lifetime::Ephemeral),
			"products" => Ok(Lifetime::Products),
			"promotions" => Ok(Lifetime::Promotions),
			"impressions" => Ok(Lifetime::Impressions),
			_ => Err(()),
		}
	}
}

/// A named impression list and its accumulated items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpressionList {
	#[serde(rename = "nm")]
	pub name: String,
	#[serde(rename = "im")]
	pub items: Vec<Fields>,
}

/// Layered key/value state merged into every fired event.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
	persistent: Fields,
	ephemeral: Fields,
	products: Vec<Fields>,
	promotions: Vec<Fields>,
	impressions: Vec<ImpressionList>,
}

impl ParameterStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Merges `fields` into the given lifetime.
	///
	/// For the map lifetimes, string values are trimmed and a value of
	/// `null` or empty string removes the key instead of storing it. For
	/// `products`/`promotions` the whole map is appended as one entry. For
	/// `impressions` the entry is appended to the list named by its `ilnm`
	/// field (default `il1`), with that field stripped from the stored item.
	pub fn update(&mut self, fields: Fields, lifetime: Lifetime) {
		match lifetime {
			Lifetime::Persistent => Self::merge_sanitized(&mut self.persistent, fields),
			Lifetime::Ephemeral => Self::merge_sanitized(&mut self.ephemeral, fields),
			Lifetime::Products => self.products.push(fields),
			Lifetime::Promotions => self.promotions.push(fields),
			Lifetime::Impressions => self.add_impression(fields),
		}
	}

	/// Removes the named keys from a map lifetime. No-op for list lifetimes.
	pub fn remove(&mut self, keys: &[&str], lifetime: Lifetime) {
		let map = match lifetime {
			Lifetime::Persistent => &mut self.persistent,
			Lifetime::Ephemeral => &mut self.ephemeral,
			_ => return,
		};
		for key in keys {
			map.remove(*key);
		}
	}

	/// Returns a single value from a map lifetime.
	pub fn get(&self, key: &str, lifetime: Lifetime) -> Option<&Value> {
		match lifetime {
			Lifetime::Persistent => self.persistent.get(key),
			Lifetime::Ephemeral => self.ephemeral.get(key),
			_ => None,
		}
	}

	pub fn persistent(&self) -> &Fields {
		&self.persistent
	}

	pub fn ephemeral(&self) -> &Fields {
		&self.ephemeral
	}

	pub fn products(&self) -> &[Fields] {
		&self.products
	}

	pub fn promotions(&self) -> &[Fields] {
		&self.promotions
	}

	pub fn impressions(&self) -> &[ImpressionList] {
		&self.impressions
	}

	/// Assembles the parameters for a fire: persistent merged with
	/// ephemeral (ephemeral wins on collision), then the non-empty list
	/// layers under their fixed keys (`pr`, `promo`, `il`). Null values
	/// are omitted from the result.
	pub fn snapshot_for_fire(&self) -> Fields {
		let mut out = Fields::new();
		for (k, v) in self.persistent.iter().chain(self.ephemeral.iter()) {
			if !v.is_null() {
				out.insert(k.clone(), v.clone());
			} else {
				out.remove(k);
			}
		}
		if !self.products.is_empty() {
			out.insert("pr".to_string(), Value::from(self.products.clone()));
		}
		if !self.promotions.is_empty() {
			out.insert("promo".to_string(), Value::from(self.promotions.clone()));
		}
		if !self.impressions.is_empty() {
			let lists: Vec<Value> = self
				.impressions
				.iter()
				.map(|l| serde_json::to_value(l).unwrap_or(Value::Null))
				.collect();
			out.insert("il".to_string(), Value::from(lists));
		}
		out
	}

	/// Discards the ephemeral map and the three list layers. Idempotent.
	pub fn clear_ephemeral(&mut self) {
		self.ephemeral.clear();
		self.products.clear();
		self.promotions.clear();
		self.impressions.clear();
	}

	fn add_impression(&mut self, mut fields: Fields) {
		let name = match fields.remove(IMPRESSION_LIST_KEY) {
			Some(Value::String(s)) if !s.is_empty() => s,
			_ => DEFAULT_IMPRESSION_LIST.to_string(),
		};
		match self.impressions.iter_mut().find(|l| l.name == name) {
			Some(list) => list.items.push(fields),
			None => self.impressions.push(ImpressionList {
				name,
				items: vec![fields],
			}),
		}
	}

	fn merge_sanitized(map: &mut Fields, fields: Fields) {
		for (key, value) in fields {
			match Self::sanitize(value) {
				Some(v) => {
					map.insert(key, v);
				}
				None => {
					map.remove(&key);
				}
			}
		}
	}

	/// Trims string values; maps null and empty strings to a removal.
	fn sanitize(value: Value) -> Option<Value> {
		match value {
			Value::Null => None,
			Value::String(s) => {
				let trimmed = s.trim();
				if trimmed.is_empty() {
					None
				} else {
					Some(Value::String(trimmed.to_string()))
				}
			}
			other => Some(other),
		}
	}
}
