// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! E-commerce payloads: products, promotions, impressions, product actions.
//!
//! These feed the list lifetimes of the parameter store (and, for product
//! actions, the ephemeral map); they ride on the next fired event and are
//! discarded with it.

use serde_json::Value;

use crate::error::ValidationError;
use crate::event::Validator;
use crate::params::{Fields, IMPRESSION_LIST_KEY};

/// A product attached to the next event.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
	pub id: String,
	pub name: String,
	pub category: String,
	/// Unit price; must be positive.
	pub price: f64,
	pub quantity: Option<i64>,
	pub brand: Option<String>,
	pub variant: Option<String>,
	pub coupon: Option<String>,
	/// One-based position in the enclosing list.
	pub position: Option<i64>,
}

impl Product {
	pub fn new(
		id: impl Into<String>,
		name: impl Into<String>,
		category: impl Into<String>,
		price: f64,
	) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
			category: category.into(),
			price,
			quantity: None,
			brand: None,
			variant: None,
			coupon: None,
			position: None,
		}
	}

	pub fn with_quantity(mut self, quantity: i64) -> Self {
		self.quantity = Some(quantity);
		self
	}

	pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
		self.brand = Some(brand.into());
		self
	}

	pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
		self.variant = Some(variant.into());
		self
	}

	pub fn with_coupon(mut self, coupon: impl Into<String>) -> Self {
		self.coupon = Some(coupon.into());
		self
	}

	pub fn with_position(mut self, position: i64) -> Self {
		self.position = Some(position);
		self
	}

	/// Validates and maps onto wire keys.
	pub fn into_fields(self) -> Result<Fields, ValidationError> {
		let mut v = Validator::new();
		let id = v.require_str("id", &self.id);
		let name = v.require_str("name", &self.name);
		let category = v.require_str("category", &self.category);
		v.optional_positive("price", Some(self.price));
		if let Some(q) = self.quantity {
			v.require_positive("quantity", q);
		}
		if let Some(p) = self.position {
			v.require_positive("position", p);
		}
		v.finish()?;

		let mut out = Fields::new();
		out.insert("id".to_string(), Value::String(id));
		out.insert("nm".to_string(), Value::String(name));
		out.insert("ca".to_string(), Value::String(category));
		out.insert("pr".to_string(), Value::from(self.price));
		if let Some(q) = self.quantity {
			out.insert("qt".to_string(), Value::from(q));
		}
		if let Some(b) = self.brand {
			out.insert("br".to_string(), Value::String(b));
		}
		if let Some(va) = self.variant {
			out.insert("va".to_string(), Value::String(va));
		}
		if let Some(c) = self.coupon {
			out.insert("cc".to_string(), Value::String(c));
		}
		if let Some(p) = self.position {
			out.insert("ps".to_string(), Value::from(p));
		}
		Ok(out)
	}
}

/// An internal promotion attached to the next event.
#[derive(Debug, Clone, PartialEq)]
pub struct Promotion {
	pub id: String,
	pub name: String,
	pub creative: Option<String>,
	/// Position of the creative on the page, e.g. `banner_slot_1`.
	pub position: Option<String>,
}

impl Promotion {
	pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
			creative: None,
			position: None,
		}
	}

	pub fn with_creative(mut self, creative: impl Into<String>) -> Self {
		self.creative = Some(creative.into());
		self
	}

	pub fn with_position(mut self, position: impl Into<String>) -> Self {
		self.position = Some(position.into());
		self
	}

	pub fn into_fields(self) -> Result<Fields, ValidationError> {
		let mut v = Validator::new();
		let id = v.require_str("id", &self.id);
		let name = v.require_str("name", &self.name);
		v.finish()?;

		let mut out = Fields::new();
		out.insert("id".to_string(), Value::String(id));
		out.insert("nm".to_string(), Value::String(name));
		if let Some(c) = self.creative {
			out.insert("cr".to_string(), Value::String(c));
		}
		if let Some(p) = self.position {
			out.insert("ps".to_string(), Value::String(p));
		}
		Ok(out)
	}
}

/// A product impression: a product seen (or clicked) within a named list.
#[derive(Debug, Clone, PartialEq)]
pub struct Impression {
	/// The impression list to file this under; defaults to `il1`.
	pub list: Option<String>,
	pub id: String,
	pub name: String,
	pub category: String,
	pub price: Option<f64>,
	pub brand: Option<String>,
	pub variant: Option<String>,
	pub position: Option<i64>,
}

impl Impression {
	pub fn new(
		id: impl Into<String>,
		name: impl Into<String>,
		category: impl Into<String>,
	) -> Self {
		Self {
			list: None,
			id: id.into(),
			name: name.into(),
			category: category.into(),
			price: None,
			brand: None,
			variant: None,
			position: None,
		}
	}

	pub fn in_list(mut self, list: impl Into<String>) -> Self {
		self.list = Some(list.into());
		self
	}

	pub fn with_price(mut self, price: f64) -> Self {
		self.price = Some(price);
		self
	}

	pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
		self.brand = Some(brand.into());
		self
	}

	pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
		self.variant = Some(variant.into());
		self
	}

	pub fn with_position(mut self, position: i64) -> Self {
		self.position = Some(position);
		self
	}

	/// Validates and maps onto wire keys, including the `ilnm` routing key
	/// the parameter store uses (and strips) to group by list.
	pub fn into_fields(self) -> Result<Fields, ValidationError> {
		let mut v = Validator::new();
		let id = v.require_str("id", &self.id);
		let name = v.require_str("name", &self.name);
		let category = v.require_str("category", &self.category);
		if let Some(p) = self.position {
			v.require_positive("position", p);
		}
		v.finish()?;

		let mut out = Fields::new();
		if let Some(list) = self.list {
			out.insert(IMPRESSION_LIST_KEY.to_string(), Value::String(list));
		}
		out.insert("id".to_string(), Value::String(id));
		out.insert("nm".to_string(), Value::String(name));
		out.insert("ca".to_string(), Value::String(category));
		if let Some(p) = self.price {
			out.insert("pr".to_string(), Value::from(p));
		}
		if let Some(b) = self.brand {
			out.insert("br".to_string(), Value::String(b));
		}
		if let Some(va) = self.variant {
			out.insert("va".to_string(), Value::String(va));
		}
		if let Some(p) = self.position {
			out.insert("ps".to_string(), Value::from(p));
		}
		Ok(out)
	}
}

/// Transaction details for purchase and refund actions.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
	pub id: String,
	pub affiliation: Option<String>,
	pub revenue: f64,
	pub shipping: Option<f64>,
	pub tax: Option<f64>,
	pub coupon: Option<String>,
}

impl Transaction {
	pub fn new(id: impl Into<String>, revenue: f64) -> Self {
		Self {
			id: id.into(),
			affiliation: None,
			revenue,
			shipping: None,
			tax: None,
			coupon: None,
		}
	}

	pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
		self.affiliation = Some(affiliation.into());
		self
	}

	pub fn with_shipping(mut self, shipping: f64) -> Self {
		self.shipping = Some(shipping);
		self
	}

	pub fn with_tax(mut self, tax: f64) -> Self {
		self.tax = Some(tax);
		self
	}

	pub fn with_coupon(mut self, coupon: impl Into<String>) -> Self {
		self.coupon = Some(coupon.into());
		self
	}
}

/// The action a set of attached products participates in.
///
/// Written to the ephemeral lifetime so it rides on exactly the next event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductAction {
	/// A click on a product or product link.
	Click { list: Option<String> },
	/// A view of product details.
	Detail { list: Option<String> },
	/// Products added to the cart.
	Add,
	/// Products removed from the cart.
	Remove,
	/// A checkout step; `option` carries the step's chosen value if known.
	Checkout { step: i64, option: Option<String> },
	/// The option chosen for a previously-reported checkout step.
	CheckoutOption { step: i64, option: String },
	/// A completed sale.
	Purchase(Transaction),
	/// A refunded sale.
	Refund(Transaction),
	/// A click on an internal promotion.
	PromoClick,
}

impl ProductAction {
	/// Validates and maps onto ephemeral wire keys.
	pub fn into_fields(self) -> Result<Fields, ValidationError> {
		let mut out = Fields::new();
		match self {
			ProductAction::Click { list } => {
				out.insert("pa".to_string(), Value::from("click"));
				if let Some(list) = list {
					out.insert("pal".to_string(), Value::String(list));
				}
			}
			ProductAction::Detail { list } => {
				out.insert("pa".to_string(), Value::from("detail"));
				if let Some(list) = list {
					out.insert("pal".to_string(), Value::String(list));
				}
			}
			ProductAction::Add => {
				out.insert("pa".to_string(), Value::from("add"));
			}
			ProductAction::Remove => {
				out.insert("pa".to_string(), Value::from("remove"));
			}
			ProductAction::Checkout { step, option } => {
				let mut v = Validator::new();
				v.require_positive("step", step);
				v.finish()?;
				out.insert("pa".to_string(), Value::from("checkout"));
				out.insert("cos".to_string(), Value::from(step));
				if let Some(option) = option {
					out.insert("col".to_string(), Value::String(option));
				}
			}
			ProductAction::CheckoutOption { step, option } => {
				let mut v = Validator::new();
				v.require_positive("step", step);
				let option = v.require_str("option", &option);
				v.finish()?;
				out.insert("pa".to_string(), Value::from("checkout_option"));
				out.insert("cos".to_string(), Value::from(step));
				out.insert("col".to_string(), Value::String(option));
			}
			ProductAction::Purchase(tx) => {
				Self::transaction_fields(&mut out, "purchase", tx)?;
			}
			ProductAction::Refund(tx) => {
				Self::transaction_fields(&mut out, "refund", tx)?;
			}
			ProductAction::PromoClick => {
				out.insert("promoa".to_string(), Value::from("promo_click"));
			}
		}
		Ok(out)
	}

	/// Wire keys a product action may have set; used to reset them.
	pub fn wire_keys() -> &'static [&'static str] {
		&[
			"pa", "promoa", "pal", "cos", "col", "ti", "ta", "tr", "ts", "tt", "tcc",
		]
	}

	fn transaction_fields(
		out: &mut Fields,
		action: &str,
		tx: Transaction,
	) -> Result<(), ValidationError> {
		let mut v = Validator::new();
		let id = v.require_str("id", &tx.id);
		v.finish()?;
		out.insert("pa".to_string(), Value::from(action));
		out.insert("ti".to_string(), Value::String(id));
		out.insert("tr".to_string(), Value::from(tx.revenue));
		if let Some(ta) = tx.affiliation {
			out.insert("ta".to_string(), Value::String(ta));
		}
		if let Some(ts) = tx.shipping {
			out.insert("ts".to_string(), Value::from(ts));
		}
		if let Some(tt) = tx.tax {
			out.insert("tt".to_string(), Value::from(tt));
		}
		if let Some(tcc) = tx.coupon {
			out.insert("tcc".to_string(), Value::String(tcc));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn product_maps_wire_keys() {
		let fields = Product::new("sku1", "Widget", "gadgets", 9.99)
			.with_quantity(2)
			.with_brand("Acme")
			.with_position(1)
			.into_fields()
			.unwrap();
		assert_eq!(fields["id"], json!("sku1"));
		assert_eq!(fields["nm"], json!("Widget"));
		assert_eq!(fields["ca"], json!("gadgets"));
		assert_eq!(fields["pr"], json!(9.99));
		assert_eq!(fields["qt"], json!(2));
		assert_eq!(fields["br"], json!("Acme"));
		assert_eq!(fields["ps"], json!(1));
	}

	#[test]
	fn product_rejects_nonpositive_price() {
		let err = Product::new("sku1", "Widget", "gadgets", 0.0)
			.into_fields()
			.unwrap_err();
		assert_eq!(err.fields, vec!["price"]);
	}

	#[test]
	fn product_collects_all_failures() {
		let err = Product::new("", "", "gadgets", -1.0)
			.with_quantity(0)
			.into_fields()
			.unwrap_err();
		assert_eq!(err.fields, vec!["id", "name", "price", "quantity"]);
	}

	#[test]
	fn promotion_position_is_a_string() {
		let fields = Promotion::new("p1", "Spring Sale")
			.with_creative("banner")
			.with_position("slot_1")
			.into_fields()
			.unwrap();
		assert_eq!(fields["cr"], json!("banner"));
		assert_eq!(fields["ps"], json!("slot_1"));
	}

	#[test]
	fn impression_carries_list_routing_key() {
		let fields = Impression::new("sku1", "Widget", "gadgets")
			.in_list("search_results")
			.into_fields()
			.unwrap();
		assert_eq!(fields["ilnm"], json!("search_results"));
	}

	#[test]
	fn impression_without_list_omits_routing_key() {
		let fields = Impression::new("sku1", "Widget", "gadgets")
			.into_fields()
			.unwrap();
		assert!(!fields.contains_key("ilnm"));
	}

	#[test]
	fn action_click_with_list() {
		let fields = ProductAction::Click {
			list: Some("search".to_string()),
		}
		.into_fields()
		.unwrap();
		assert_eq!(fields["pa"], json!("click"));
		assert_eq!(fields["pal"], json!("search"));
	}

	#[test]
	fn action_checkout_requires_positive_step() {
		let err = ProductAction::Checkout {
			step: 0,
			option: None,
		}
		.into_fields()
		.unwrap_err();
		assert_eq!(err.fields, vec!["step"]);
	}

	#[test]
	fn action_checkout_option_requires_option() {
		let err = ProductAction::CheckoutOption {
			step: 2,
			option: "  ".to_string(),
		}
		.into_fields()
		.unwrap_err();
		assert_eq!(err.fields, vec!["option"]);
	}

	#[test]
	fn action_purchase_maps_transaction() {
		let tx = Transaction::new("T123", 49.90)
			.with_affiliation("web")
			.with_shipping(4.50)
			.with_tax(2.10)
			.with_coupon("SAVE10");
		let fields = ProductAction::Purchase(tx).into_fields().unwrap();
		assert_eq!(fields["pa"], json!("purchase"));
		assert_eq!(fields["ti"], json!("T123"));
		assert_eq!(fields["tr"], json!(49.90));
		assert_eq!(fields["ts"], json!(4.50));
		assert_eq!(fields["tt"], json!(2.10));
		assert_eq!(fields["tcc"], json!("SAVE10"));
	}

	#[test]
	fn action_promo_click_uses_promoa() {
		let fields = ProductAction::PromoClick.into_fields().unwrap();
		assert_eq!(fields["promoa"], json!("promo_click"));
		assert!(!fields.contains_key("pa"));
	}

	#[test]
	fn wire_keys_cover_every_action_output() {
		let keys = ProductAction::wire_keys();
		for action in [
			ProductAction::Click { list: Some("l".to_string()) },
			ProductAction::Checkout { step: 1, option: Some("o".to_string()) },
			ProductAction::Purchase(Transaction::new("t", 1.0)),
			ProductAction::PromoClick,
		] {
			for key in action.into_fields().unwrap().keys() {
				assert!(keys.contains(&key.as_str()), "missing {key}");
			}
		}
	}
}
