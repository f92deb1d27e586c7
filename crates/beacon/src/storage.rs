// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Storage adapter contracts.
//!
//! The SDK consumes two storage capabilities and implements neither beyond
//! an in-memory fallback: a synchronous store for redirect handoff state
//! (browser local/session storage territory) and an asynchronous store for
//! party identity (mobile-style key/value apis). Which concrete store backs
//! each — and, for framed pages, which browser storage wins — is the
//! embedder's decision, made before construction.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;

/// Synchronous key/value storage.
pub trait SyncStorage: Send + Sync {
	fn get_item(&self, key: &str) -> Option<String>;
	fn set_item(&self, key: &str, value: &str);
	fn remove_item(&self, key: &str);
}

/// Asynchronous key/value storage.
#[async_trait]
pub trait AsyncStorage: Send + Sync {
	async fn get_item(&self, key: &str) -> Result<Option<String>>;
	async fn set_item(&self, key: &str, value: &str) -> Result<()>;
	async fn remove_item(&self, key: &str) -> Result<()>;
}

/// In-memory synchronous storage; the default when the host has none.
#[derive(Debug, Default)]
pub struct MemoryStorage {
	items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

impl SyncStorage for MemoryStorage {
	fn get_item(&self, key: &str) -> Option<String> {
		self.items.lock().expect("storage lock").get(key).cloned()
	}

	fn set_item(&self, key: &str, value: &str) {
		self.items
			.lock()
			.expect("storage lock")
			.insert(key.to_string(), value.to_string());
	}

	fn remove_item(&self, key: &str) {
		self.items.lock().expect("storage lock").remove(key);
	}
}

/// In-memory asynchronous storage; the default when the host has none.
#[derive(Debug, Default)]
pub struct MemoryAsyncStorage {
	inner: MemoryStorage,
}

impl MemoryAsyncStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl AsyncStorage for MemoryAsyncStorage {
	async fn get_item(&self, key: &str) -> Result<Option<String>> {
		Ok(self.inner.get_item(key))
	}

	async fn set_item(&self, key: &str, value: &str) -> Result<()> {
		self.inner.set_item(key, value);
		Ok(())
	}

	async fn remove_item(&self, key: &str) -> Result<()> {
		self.inner.remove_item(key);
		Ok(())
	}
}
