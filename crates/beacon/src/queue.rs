// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The dispatch queue and its execution gate.
//!
//! Parameter mutations and fire requests are plain [`Command`] values. While
//! the tracker is paused or its transport is not yet ready, submitted
//! commands queue; once both gates open they drain in FIFO order, each
//! command executed exactly once. The queue itself never executes anything —
//! it hands commands back to the tracker, which keeps it pure and keeps the
//! ordering law testable in isolation.

use std::collections::VecDeque;

use beacon_core::{Fields, Lifetime};

/// A deferred operation, captured by value.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
	/// Merge fields into a parameter lifetime.
	Update { fields: Fields, lifetime: Lifetime },
	/// Remove keys from a parameter lifetime.
	Remove {
		keys: Vec<String>,
		lifetime: Lifetime,
	},
	/// Fire an event with pre-validated wire fields.
	Fire { event_type: String, fields: Fields },
}

/// FIFO command queue gated on `paused` and `ready`.
#[derive(Debug, Default)]
pub struct DispatchQueue {
	paused: bool,
	ready: bool,
	queue: VecDeque<Command>,
}

impl DispatchQueue {
	pub fn new() -> Self {
		Self::default()
	}

	/// Both gates open: commands execute immediately.
	pub fn is_open(&self) -> bool {
		!self.paused && self.ready
	}

	pub fn is_paused(&self) -> bool {
		self.paused
	}

	pub fn is_ready(&self) -> bool {
		self.ready
	}

	pub fn len(&self) -> usize {
		self.queue.len()
	}

	pub fn is_empty(&self) -> bool {
		self.queue.is_empty()
	}

	/// Submits a command. Returns it when the gate is open (the caller
	/// executes it now); otherwise the command queues behind everything
	/// already waiting.
	#[must_use]
	pub fn submit(&mut self, command: Command) -> Option<Command> {
		if self.is_open() {
			Some(command)
		} else {
			self.queue.push_back(command);
			None
		}
	}

	/// Closes the pause gate; subsequent submissions queue.
	pub fn pause(&mut self) {
		self.paused = true;
	}

	/// Opens the pause gate and drains whatever the gate state allows.
	#[must_use]
	pub fn resume(&mut self) -> Vec<Command> {
		self.paused = false;
		self.drain()
	}

	/// Marks the transport ready and drains whatever the gate state allows.
	#[must_use]
	pub fn mark_ready(&mut self) -> Vec<Command> {
		self.ready = true;
		self.drain()
	}

	/// Hands back every queued command in submission order, provided both
	/// gates are open. Draining an empty queue is a no-op, so repeated
	/// drains cannot double-execute anything.
	fn drain(&mut self) -> Vec<Command> {
		if !self.is_open() {
			return Vec::new();
		}
		self.queue.drain(..).collect()
	}
}
