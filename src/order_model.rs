//! # Canonical Order Model
//!
//! This module defines the order representation every inbound shape is
//! normalized into, independent of whether it came from the web app export
//! or the plain HTML form.
//!
//! ## Core Concepts
//!
//! - **Customer**: contact and delivery details, copied into each order
//! - **Order**: amounts, payment and shipping details plus its line items
//! - **LineItem**: one product row with quantity, unit price and line total
//!
//! ## Usage
//!
//! ```rust
//! use order_intake::order_model::{Customer, LineItem, Order};
//! use rust_decimal::Decimal;
//!
//! let customer = Customer::new("Иванов Иван", "+7 999", "ivan@example.com", "", "Москва");
//! let order = Order::for_customer(customer)
//!     .with_item(LineItem::new(1, "Труба 57x3.5", Decimal::from(20), "meters", Decimal::from(450)));
//! assert_eq!(order.shipping_address, "Москва");
//! assert_eq!(order.line_items_total(), Decimal::from(9000));
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Contact and delivery details of the ordering party
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    /// Empty when the customer is a private person
    pub company: String,
    pub delivery_address: String,
}

impl Customer {
    pub fn new(
        full_name: impl Into<String>,
        phone: impl Into<String>,
        email: impl Into<String>,
        company: impl Into<String>,
        delivery_address: impl Into<String>,
    ) -> Self {
        Self {
            full_name: full_name.into(),
            phone: phone.into(),
            email: email.into(),
            company: company.into(),
            delivery_address: delivery_address.into(),
        }
    }

    /// Whether the order was placed on behalf of a company
    pub fn is_corporate(&self) -> bool {
        !self.company.trim().is_empty()
    }
}

/// A single product row of an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: u64,
    pub product_name: String,
    /// Unit-dependent amount (meters, tons, pieces...)
    pub quantity: Decimal,
    pub unit_type: String,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub line_total: Decimal,
}

impl LineItem {
    /// Create a line item whose total is `quantity * unit_price` with no discount
    pub fn new(
        product_id: u64,
        product_name: impl Into<String>,
        quantity: Decimal,
        unit_type: impl Into<String>,
        unit_price: Decimal,
    ) -> Self {
        Self {
            product_id,
            product_name: product_name.into(),
            quantity,
            unit_type: unit_type.into(),
            unit_price,
            discount_percent: Decimal::ZERO,
            line_total: quantity * unit_price,
        }
    }

    /// Override the line total with the amount reported by the source
    pub fn with_line_total(mut self, line_total: Decimal) -> Self {
        self.line_total = line_total;
        self
    }
}

/// The canonical order every inbound payload is converted into
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub customer: Customer,
    pub subtotal_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub payment_method: String,
    pub customer_notes: String,
    pub shipping_address: String,
    pub items: Vec<LineItem>,
}

impl Order {
    /// Start an order for the customer, shipping to their delivery address
    pub fn for_customer(customer: Customer) -> Self {
        let shipping_address = customer.delivery_address.clone();
        Self {
            customer,
            shipping_address,
            ..Default::default()
        }
    }

    pub fn with_item(mut self, item: LineItem) -> Self {
        self.items.push(item);
        self
    }

    /// Sum of the line totals as reported by the items
    pub fn line_items_total(&self) -> Decimal {
        self.items.iter().map(|item| item.line_total).sum()
    }

    /// Whether `total = subtotal - discount` and, when items are present,
    /// `subtotal` equals the sum of line totals.
    ///
    /// Inbound amounts are never rejected on this basis; the check only feeds
    /// diagnostics.
    pub fn totals_consistent(&self) -> bool {
        let total_matches = self.total_amount == self.subtotal_amount - self.discount_amount;
        let subtotal_matches =
            self.items.is_empty() || self.subtotal_amount == self.line_items_total();
        total_matches && subtotal_matches
    }
}
