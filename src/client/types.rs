//! Type definitions for the Bessa API.
//!
//! This module holds two layers of types:
//!
//! - Wire types ([`ApiOrder`], [`ApiMenuCategory`], [`PaginatedResponse`], ...) that mirror
//!   the JSON returned by `api.bessa.app`. Almost every field is optional because the vendor
//!   schema is only partly documented.
//! - Domain types ([`Order`], [`Menu`], [`OrderState`]) that the coordinator and sensors work
//!   with. Conversion from wire to domain is where malformed payloads are rejected.
//!
//! ## API Compatibility
//!
//! - Prices and totals arrive as decimal strings (`"4.50"`) but some endpoints send numbers;
//!   both are accepted.
//! - `available_amount` on menu items may be a string, a number, or missing.
//! - Order state codes outside 1-13 decode to [`OrderState::Unknown`] instead of failing.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::client::error::{ApiError, ApiResult};

/// Token response from `POST /v1/auth/login/`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthToken {
    /// Session token, sent back as `Authorization: Token <key>`
    #[serde(default)]
    pub key: Option<String>,
}

/// Login payload. Bessa authenticates by email, not username.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthRequest {
    pub email: String,
    pub password: String,
}

/// Validation errors returned with a 400 from the login endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct LoginErrorBody {
    #[serde(default)]
    pub non_field_errors: Vec<String>,
    #[serde(default)]
    pub email: Vec<String>,
    #[serde(default)]
    pub password: Vec<String>,
}

impl LoginErrorBody {
    /// First populated error list, joined for display.
    pub fn message(&self) -> Option<String> {
        [&self.non_field_errors, &self.email, &self.password]
            .into_iter()
            .find(|errors| !errors.is_empty())
            .map(|errors| errors.join(", "))
    }
}

/// Standard list envelope used by every Bessa collection endpoint.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct PaginatedResponse<T> {
    #[serde(default)]
    pub count: Option<i64>,
    /// Absolute URL of the next page
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub results: Vec<T>,
}

/// One entry of an order's state history, newest first.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiOrderStateEntry {
    #[serde(default)]
    pub state: Option<i64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// A line item on an order as returned by `/v1/user/orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiOrderItem {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de_amount")]
    pub price: Option<f64>,
    /// Quantity ordered
    #[serde(default, deserialize_with = "de_amount")]
    pub amount: Option<f64>,
}

/// An order as returned by `/v1/user/orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiOrder {
    pub id: i64,
    #[serde(default)]
    pub venue: Option<i64>,
    #[serde(default)]
    pub order_state: Option<i64>,
    #[serde(default)]
    pub states: Vec<ApiOrderStateEntry>,
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Pickup timestamp, ISO 8601
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "de_amount")]
    pub total: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub pickup_code: Option<String>,
    #[serde(default)]
    pub number: Option<i64>,
    #[serde(default)]
    pub preorder: bool,
    #[serde(default)]
    pub items: Vec<ApiOrderItem>,
}

/// A menu category from `/v1/venues/{venue}/menu/{type}/{date}/`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiMenuCategory {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub items: Vec<ApiMenuItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiMenuItem {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de_amount")]
    pub price: Option<f64>,
    /// Comma-separated allergen codes, e.g. `"A,C,G"`
    #[serde(default)]
    pub allergens: Option<serde_json::Value>,
    /// Remaining portions; string, number, or null
    #[serde(default)]
    pub available_amount: Option<serde_json::Value>,
}

/// Accepts a decimal as either a JSON string or a JSON number.
fn de_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a decimal number or decimal string")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D2>(self, deserializer: D2) -> Result<Self::Value, D2::Error>
        where
            D2: serde::Deserializer<'de>,
        {
            deserializer.deserialize_any(AmountVisitor)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<f64>()
                .map(Some)
                .map_err(|_| E::custom(format!("invalid decimal: {:?}", v)))
        }
    }

    deserializer.deserialize_option(AmountVisitor)
}

/// Lifecycle state of a Bessa order.
///
/// The vendor documents codes 1 through 13. Anything else is kept as
/// [`OrderState::Unknown`] so a new server-side state never breaks a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderState {
    New,
    PaymentProcessing,
    Transmittable,
    Transmitted,
    Accepted,
    Preparing,
    Ready,
    Done,
    Cancelled,
    Rejected,
    Failed,
    Expired,
    PreOrdered,
    Unknown(i64),
}

impl OrderState {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => OrderState::New,
            2 => OrderState::PaymentProcessing,
            3 => OrderState::Transmittable,
            4 => OrderState::Transmitted,
            5 => OrderState::Accepted,
            6 => OrderState::Preparing,
            7 => OrderState::Ready,
            8 => OrderState::Done,
            9 => OrderState::Cancelled,
            10 => OrderState::Rejected,
            11 => OrderState::Failed,
            12 => OrderState::Expired,
            13 => OrderState::PreOrdered,
            other => OrderState::Unknown(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            OrderState::New => 1,
            OrderState::PaymentProcessing => 2,
            OrderState::Transmittable => 3,
            OrderState::Transmitted => 4,
            OrderState::Accepted => 5,
            OrderState::Preparing => 6,
            OrderState::Ready => 7,
            OrderState::Done => 8,
            OrderState::Cancelled => 9,
            OrderState::Rejected => 10,
            OrderState::Failed => 11,
            OrderState::Expired => 12,
            OrderState::PreOrdered => 13,
            OrderState::Unknown(code) => *code,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrderState::New => "New",
            OrderState::PaymentProcessing => "Payment Processing",
            OrderState::Transmittable => "Transmittable",
            OrderState::Transmitted => "Transmitted",
            OrderState::Accepted => "Accepted",
            OrderState::Preparing => "Preparing",
            OrderState::Ready => "Ready",
            OrderState::Done => "Done",
            OrderState::Cancelled => "Cancelled",
            OrderState::Rejected => "Rejected",
            OrderState::Failed => "Failed",
            OrderState::Expired => "Expired",
            OrderState::PreOrdered => "Pre-ordered",
            OrderState::Unknown(_) => "Unknown",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, OrderState::Cancelled)
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for OrderState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// A meal line on an order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    pub name: String,
    pub description: Option<String>,
    /// Unit price
    pub price: f64,
    pub quantity: f64,
}

/// A lunch order for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: i64,
    pub state: OrderState,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub currency: String,
    pub pickup_code: Option<String>,
    pub pickup_time: Option<NaiveTime>,
    /// Calendar day the order is for
    pub date: NaiveDate,
    /// Full pickup timestamp, used for newest-first ordering
    pub placed_at: DateTime<FixedOffset>,
    pub number: Option<i64>,
    pub payment_method: Option<String>,
    pub preorder: bool,
}

impl Order {
    /// Sum of price × quantity over all lines.
    pub fn items_total(&self) -> f64 {
        self.items.iter().map(|item| item.price * item.quantity).sum()
    }
}

impl ApiOrder {
    /// Converts the wire order into a domain [`Order`].
    ///
    /// Returns `Ok(None)` for orders without a pickup date; those cannot be
    /// assigned to a day. An unparsable date is a malformed response.
    pub fn into_order(self) -> ApiResult<Option<Order>> {
        let Some(raw_date) = self.date.as_deref() else {
            tracing::warn!("Order {} has no date, skipping", self.id);
            return Ok(None);
        };
        let placed_at = parse_timestamp(raw_date).ok_or_else(|| {
            ApiError::MalformedResponse(format!("order {} has invalid date {:?}", self.id, raw_date))
        })?;

        let state_code = self
            .order_state
            .or_else(|| self.states.first().and_then(|entry| entry.state));
        let state = state_code.map(OrderState::from_code).unwrap_or(OrderState::Unknown(0));

        let items: Vec<OrderItem> = self
            .items
            .into_iter()
            .map(|item| OrderItem {
                name: item.name.unwrap_or_default(),
                description: item.description,
                price: item.price.unwrap_or(0.0),
                quantity: item.amount.unwrap_or(1.0),
            })
            .collect();

        let total = match self.total {
            Some(total) => total,
            None => items.iter().map(|item| item.price * item.quantity).sum(),
        };

        Ok(Some(Order {
            id: self.id,
            state,
            items,
            total,
            currency: self.currency.unwrap_or_else(|| "EUR".to_string()),
            pickup_code: self.pickup_code,
            pickup_time: Some(placed_at.time()),
            date: placed_at.date_naive(),
            placed_at,
            number: self.number,
            payment_method: self.payment_method,
            preorder: self.preorder,
        }))
    }
}

/// RFC 3339 first; naive timestamps from older endpoints are read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed);
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()?;
    Some(naive.and_utc().fixed_offset())
}

/// A meal offered on a menu day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Meal {
    pub id: Option<i64>,
    pub name: String,
    pub description: String,
    pub price: f64,
    /// Portions left; `None` when the venue does not publish stock
    pub available: Option<u32>,
    pub category: String,
    pub allergens: Vec<String>,
}

/// The menu for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Menu {
    pub date: NaiveDate,
    pub meals: Vec<Meal>,
}

impl Menu {
    pub fn empty(date: NaiveDate) -> Self {
        Self { date, meals: Vec::new() }
    }

    /// Flattens categorised menu pages into a single meal list, keeping
    /// the server's category and item order.
    pub fn from_categories(date: NaiveDate, categories: Vec<ApiMenuCategory>) -> Self {
        let meals = categories
            .into_iter()
            .flat_map(|category| {
                let category_name = category.name.unwrap_or_default();
                category.items.into_iter().map(move |item| Meal {
                    id: item.id,
                    name: item.name.unwrap_or_else(|| "Unknown".to_string()),
                    description: item.description.unwrap_or_default(),
                    price: item.price.unwrap_or(0.0),
                    available: item.available_amount.as_ref().and_then(parse_stock),
                    category: category_name.clone(),
                    allergens: item.allergens.as_ref().map(parse_allergens).unwrap_or_default(),
                })
            })
            .collect();
        Self { date, meals }
    }

    pub fn availability_label(&self) -> String {
        format!("{} meals available", self.meals.len())
    }
}

/// Stock is a non-negative count. Negative values mean sold out.
fn parse_stock(value: &serde_json::Value) -> Option<u32> {
    let amount = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !amount.is_finite() {
        return None;
    }
    Some(amount.max(0.0).min(u32::MAX as f64) as u32)
}

fn parse_allergens(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect(),
        serde_json::Value::Array(codes) => codes
            .iter()
            .filter_map(|code| match code {
                serde_json::Value::String(s) => Some(s.trim().to_string()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|code| !code.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}
