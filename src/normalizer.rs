//! # Order Normalizer Module
//!
//! Converts the two inbound order shapes into the canonical [`Order`]:
//!
//! - the structured export produced by the web app (customer, order, cart and
//!   metadata sections, property names in any letter case)
//! - the flat URL-encoded body posted by the HTML order form
//!
//! Product attributes carried by export cart items are dropped; the canonical
//! model has no place for them.

use std::collections::HashMap;

use chrono::Local;
use lazy_static::lazy_static;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::intake_errors::{IntakeError, IntakeResult};
use crate::order_model::{Customer, LineItem, Order};

/// Form keys recognized by the order form endpoint
pub const FORM_CUSTOMER_NAME: &str = "customerName";
pub const FORM_CUSTOMER_PHONE: &str = "customerPhone";
pub const FORM_CUSTOMER_EMAIL: &str = "customerEmail";
pub const FORM_CUSTOMER_COMPANY: &str = "customerCompany";
pub const FORM_DELIVERY_ADDRESS: &str = "deliveryAddress";
pub const FORM_ORDER_COMMENT: &str = "orderComment";

/// An inbound order payload in one of the supported shapes
#[derive(Debug, Clone, Copy)]
pub enum OrderSource<'a> {
    /// JSON document exported by the web app
    StructuredExport(&'a str),
    /// `application/x-www-form-urlencoded` body of the order form
    FormSubmission(&'a str),
}

/// Normalize any supported payload into the canonical order
pub fn normalize(source: OrderSource<'_>) -> IntakeResult<Order> {
    match source {
        OrderSource::StructuredExport(json) => normalize_export(json),
        OrderSource::FormSubmission(body) => Ok(normalize_form(body)),
    }
}

// Export wire shape. Deserialization runs on canonicalized keys so that
// property names match in any letter case; the template is written in
// camelCase.

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct OrderExport {
    pub customer: ExportCustomer,
    #[serde(default)]
    pub order: ExportOrderInfo,
    pub cart: ExportCart,
    #[serde(default)]
    pub metadata: ExportMetadata,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct ExportCustomer {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub company: String,
    pub delivery_address: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct ExportOrderInfo {
    pub subtotal_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub customer_notes: String,
    pub payment_method: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct ExportCart {
    pub cart_items: Vec<ExportCartItem>,
    pub total_amount: Decimal,
    pub item_count: u32,
    pub export_date: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct ExportCartItem {
    pub product_id: u64,
    pub product_name: String,
    pub quantity: Decimal,
    pub unit_type: String,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub product_data: Option<ExportProductData>,
    pub added_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct ExportProductData {
    pub gost: String,
    pub steel_grade: String,
    pub diameter: Decimal,
    pub wall_thickness: Decimal,
    pub warehouse: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct ExportMetadata {
    pub order_date: String,
    pub user_agent: String,
    pub source: String,
}

/// Every property name of the export shape, in snake_case
const EXPORT_FIELDS: &[&str] = &[
    "customer",
    "order",
    "cart",
    "metadata",
    "full_name",
    "phone",
    "email",
    "company",
    "delivery_address",
    "subtotal_amount",
    "discount_amount",
    "total_amount",
    "customer_notes",
    "payment_method",
    "cart_items",
    "item_count",
    "export_date",
    "product_id",
    "product_name",
    "quantity",
    "unit_type",
    "unit_price",
    "total_price",
    "product_data",
    "added_at",
    "gost",
    "steel_grade",
    "diameter",
    "wall_thickness",
    "warehouse",
    "order_date",
    "user_agent",
    "source",
];

lazy_static! {
    static ref FIELDS_BY_FOLDED_NAME: HashMap<String, &'static str> = EXPORT_FIELDS
        .iter()
        .map(|field| (fold_key(field), *field))
        .collect();
}

/// Lowercase a property name and drop its separators
fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|ch| *ch != '_' && *ch != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Map a property name in any letter case to the snake_case field it names.
/// `FullName`, `fullName`, `FULLNAME` and `full_name` all become `full_name`;
/// unknown names are returned folded.
fn canonical_key(key: &str) -> String {
    let folded = fold_key(key);
    match FIELDS_BY_FOLDED_NAME.get(&folded) {
        Some(field) => field.to_string(),
        None => folded,
    }
}

/// Canonicalize every object key and drop `null` members, recursively
fn canonicalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let canonical: Map<String, Value> = map
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (canonical_key(&k), canonicalize_keys(v)))
                .collect();
            Value::Object(canonical)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize_keys).collect()),
        other => other,
    }
}

/// Parse a structured export and convert it into the canonical order
pub fn normalize_export(json: &str) -> IntakeResult<Order> {
    let raw: Value = serde_json::from_str(json)
        .map_err(|e| IntakeError::MalformedInput(format!("export is not valid JSON: {e}")))?;

    let canonical = canonicalize_keys(raw);
    let Value::Object(sections) = &canonical else {
        return Err(IntakeError::MalformedInput(
            "export must be a JSON object".to_string(),
        ));
    };
    for required in ["customer", "cart"] {
        if !sections.contains_key(required) {
            return Err(IntakeError::MalformedInput(format!(
                "export has no `{required}` section"
            )));
        }
    }

    let export: OrderExport = serde_json::from_value(canonical)
        .map_err(|e| IntakeError::MalformedInput(format!("export has an invalid shape: {e}")))?;

    Ok(export_into_order(export))
}

fn export_into_order(export: OrderExport) -> Order {
    let OrderExport {
        customer,
        order: info,
        cart,
        metadata,
    } = export;

    debug!(
        source = %metadata.source,
        items = cart.cart_items.len(),
        "Normalizing structured export"
    );

    let customer = Customer {
        full_name: customer.full_name,
        phone: customer.phone,
        email: customer.email,
        company: customer.company,
        delivery_address: customer.delivery_address,
    };

    let mut order = Order::for_customer(customer);
    order.subtotal_amount = info.subtotal_amount;
    order.discount_amount = info.discount_amount;
    order.total_amount = info.total_amount;
    order.customer_notes = info.customer_notes;
    order.payment_method = info.payment_method;
    order.items = cart
        .cart_items
        .into_iter()
        .map(|item| {
            LineItem::new(
                item.product_id,
                item.product_name,
                item.quantity,
                item.unit_type,
                item.unit_price,
            )
            .with_line_total(item.total_price)
        })
        .collect();

    if !order.totals_consistent() {
        warn!(
            subtotal = %order.subtotal_amount,
            discount = %order.discount_amount,
            total = %order.total_amount,
            line_items_total = %order.line_items_total(),
            "Order totals do not add up, keeping reported amounts"
        );
    }

    order
}

/// Split a URL-encoded body into decoded key/value pairs.
///
/// Only pairs made of exactly one key and one value are kept. `+` is read
/// as a space in values.
pub fn parse_form_data(body: &str) -> HashMap<String, String> {
    body.split('&')
        .filter_map(|pair| {
            let mut parts = pair.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => {
                    Some((decode_component(key), decode_component(&value.replace('+', " "))))
                }
                _ => None,
            }
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned(),
    }
}

/// Convert an order form body into the canonical order. Never fails: absent
/// fields become empty strings.
pub fn normalize_form(body: &str) -> Order {
    let mut fields = parse_form_data(body);
    let mut take = |key: &str| fields.remove(key).unwrap_or_default();

    let customer = Customer {
        full_name: take(FORM_CUSTOMER_NAME),
        phone: take(FORM_CUSTOMER_PHONE),
        email: take(FORM_CUSTOMER_EMAIL),
        company: take(FORM_CUSTOMER_COMPANY),
        delivery_address: take(FORM_DELIVERY_ADDRESS),
    };
    let notes = take(FORM_ORDER_COMMENT);

    let mut order = Order::for_customer(customer);
    order.customer_notes = notes;
    order
}

/// Sample export that documents the structured shape for web app authors
pub fn order_template() -> OrderExport {
    let now = Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    OrderExport {
        customer: ExportCustomer {
            full_name: "Иванов Иван Иванович".to_string(),
            phone: "+7 (999) 999-99-99".to_string(),
            email: "ivanov@example.com".to_string(),
            company: "ООО Ромашка".to_string(),
            delivery_address: "г. Москва, ул. Примерная, д. 1".to_string(),
        },
        order: ExportOrderInfo {
            subtotal_amount: Decimal::new(1_000_000, 2),
            discount_amount: Decimal::new(100_000, 2),
            total_amount: Decimal::new(900_000, 2),
            customer_notes: "Комментарий к заказу".to_string(),
            payment_method: "bank_transfer".to_string(),
        },
        cart: ExportCart {
            cart_items: vec![ExportCartItem {
                product_id: 1,
                product_name: "Труба стальная электросварная 57x3.5мм".to_string(),
                quantity: Decimal::new(200, 1),
                unit_type: "meters".to_string(),
                unit_price: Decimal::new(45_000, 2),
                total_price: Decimal::new(900_000, 2),
                product_data: Some(ExportProductData {
                    gost: "ГОСТ 10704-91".to_string(),
                    steel_grade: "Ст3сп".to_string(),
                    diameter: Decimal::new(570, 1),
                    wall_thickness: Decimal::new(35, 1),
                    warehouse: "Склад Москва".to_string(),
                }),
                added_at: now.clone(),
            }],
            total_amount: Decimal::new(900_000, 2),
            item_count: 1,
            export_date: now.clone(),
        },
        metadata: ExportMetadata {
            order_date: now,
            user_agent: "TMK Web App".to_string(),
            source: "web".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_keys_handles_case_and_nulls() {
        let value = serde_json::json!({
            "Customer": { "FullName": "A", "Company": null },
            "cart": { "cartItems": [ { "Product_Id": 3 } ] }
        });
        let canonical = canonicalize_keys(value);
        assert_eq!(canonical["customer"]["full_name"], "A");
        assert!(canonical["customer"].get("company").is_none());
        assert_eq!(canonical["cart"]["cart_items"][0]["product_id"], 3);
    }

    #[test]
    fn test_canonical_key_ignores_case() {
        assert_eq!(canonical_key("FullName"), "full_name");
        assert_eq!(canonical_key("fullName"), "full_name");
        assert_eq!(canonical_key("full_name"), "full_name");
        assert_eq!(canonical_key("FULLNAME"), "full_name");
        assert_eq!(canonical_key("cartitems"), "cart_items");
        assert_eq!(canonical_key("ProductID"), "product_id");
        assert_eq!(canonical_key("Gost"), "gost");
        assert_eq!(canonical_key("SomethingElse"), "somethingelse");
    }

    #[test]
    fn test_form_pairs_with_extra_equals_are_skipped() {
        let fields = parse_form_data("a=1&b=2=3&c&d=x+y");
        assert_eq!(fields.get("a").map(String::as_str), Some("1"));
        assert!(!fields.contains_key("b"));
        assert!(!fields.contains_key("c"));
        assert_eq!(fields.get("d").map(String::as_str), Some("x y"));
    }

    #[test]
    fn test_plus_encoded_as_percent_survives() {
        let fields = parse_form_data("customerPhone=%2B7999");
        assert_eq!(fields["customerPhone"], "+7999");
    }

    #[test]
    fn test_template_is_a_valid_export() {
        let json = serde_json::to_string_pretty(&order_template()).unwrap();
        let order = normalize_export(&json).unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.total_amount, Decimal::new(900_000, 2));
    }
}
