//! Per-day sensor projections of the published snapshot.
//!
//! Each of the 7 days gets an order sensor and a menu sensor. A sensor resolves its target
//! date from "today" at read time and looks that date up in the snapshot, so a snapshot
//! left over from yesterday never shows yesterday's data under "Today".

use chrono::{Days, NaiveDate};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::client::{Menu, Order};
use crate::coordinator::{CoordinatorState, DailySnapshot, DAYS_AHEAD};

const ICON_ORDERED: &str = "mdi:checkbox-marked-circle";
const ICON_NOT_ORDERED: &str = "mdi:checkbox-blank-circle-outline";
const ICON_MENU: &str = "mdi:food-variant";

pub const NO_ORDER: &str = "No order";
pub const NO_MENU: &str = "No menu available";

/// A rendered sensor, ready to hand to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub unique_id: String,
    pub name: String,
    pub state: String,
    pub icon: &'static str,
    pub available: bool,
    pub attributes: Map<String, Value>,
}

/// "Today", "Tomorrow", "Day +N"; used in sensor names.
pub fn day_label(days_ahead: usize) -> String {
    match days_ahead {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        n => format!("Day +{}", n),
    }
}

/// "Today", "Tomorrow", or the weekday name.
pub fn day_name(days_ahead: usize, date: NaiveDate) -> String {
    match days_ahead {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        _ => date.format("%A").to_string(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn target_date(today: NaiveDate, days_ahead: usize) -> NaiveDate {
    today
        .checked_add_days(Days::new(days_ahead as u64))
        .unwrap_or(today)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyOrderSensor {
    entry_id: String,
    days_ahead: usize,
}

impl DailyOrderSensor {
    pub fn new(entry_id: impl Into<String>, days_ahead: usize) -> Self {
        Self {
            entry_id: entry_id.into(),
            days_ahead,
        }
    }

    pub fn name(&self) -> String {
        format!("Order {}", day_label(self.days_ahead))
    }

    pub fn unique_id(&self) -> String {
        format!("{}_order_day_{}", self.entry_id, self.days_ahead)
    }

    fn order<'a>(&self, snapshot: Option<&'a DailySnapshot>, date: NaiveDate) -> Option<&'a Order> {
        snapshot.and_then(|snapshot| snapshot.order_for(date))
    }

    pub fn state(&self, snapshot: Option<&DailySnapshot>, today: NaiveDate) -> String {
        let Some(order) = self.order(snapshot, target_date(today, self.days_ahead)) else {
            return NO_ORDER.to_string();
        };
        let names: Vec<&str> = order
            .items
            .iter()
            .map(|item| item.name.as_str())
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            "Ordered".to_string()
        } else {
            names.join(", ")
        }
    }

    pub fn attributes(&self, snapshot: Option<&DailySnapshot>, today: NaiveDate) -> Map<String, Value> {
        let date = target_date(today, self.days_ahead);
        let order = self.order(snapshot, date);

        let mut attrs = Map::new();
        attrs.insert("date".into(), json!(date.format("%Y-%m-%d").to_string()));
        attrs.insert("day_name".into(), json!(day_name(self.days_ahead, date)));
        attrs.insert("has_order".into(), json!(order.is_some()));

        if let Some(order) = order {
            let meals: Vec<Value> = order
                .items
                .iter()
                .map(|item| {
                    json!({
                        "name": item.name,
                        "description": item.description,
                        "price": item.price,
                        "quantity": item.quantity,
                    })
                })
                .collect();

            attrs.insert("order_id".into(), json!(order.id));
            attrs.insert("meals".into(), Value::Array(meals));
            attrs.insert("total_price".into(), json!(round2(order.total)));
            attrs.insert("order_state".into(), json!(order.state.label()));
            attrs.insert("order_state_code".into(), json!(order.state.code()));
            attrs.insert(
                "pickup_time".into(),
                json!(order.pickup_time.map(|t| t.format("%H:%M").to_string())),
            );
            attrs.insert("pickup_code".into(), json!(order.pickup_code));
            attrs.insert("number".into(), json!(order.number));
            attrs.insert("currency".into(), json!(order.currency));
            attrs.insert("payment_method".into(), json!(order.payment_method));
            attrs.insert("preorder".into(), json!(order.preorder));
        }

        attrs
    }

    pub fn icon(&self, snapshot: Option<&DailySnapshot>, today: NaiveDate) -> &'static str {
        match self.order(snapshot, target_date(today, self.days_ahead)) {
            Some(_) => ICON_ORDERED,
            None => ICON_NOT_ORDERED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyMenuSensor {
    entry_id: String,
    days_ahead: usize,
}

impl DailyMenuSensor {
    pub fn new(entry_id: impl Into<String>, days_ahead: usize) -> Self {
        Self {
            entry_id: entry_id.into(),
            days_ahead,
        }
    }

    pub fn name(&self) -> String {
        format!("Menu {}", day_label(self.days_ahead))
    }

    pub fn unique_id(&self) -> String {
        format!("{}_menu_day_{}", self.entry_id, self.days_ahead)
    }

    fn menu<'a>(&self, snapshot: Option<&'a DailySnapshot>, date: NaiveDate) -> Option<&'a Menu> {
        snapshot.and_then(|snapshot| snapshot.menu_for(date))
    }

    pub fn state(&self, snapshot: Option<&DailySnapshot>, today: NaiveDate) -> String {
        match self.menu(snapshot, target_date(today, self.days_ahead)) {
            Some(menu) => menu.availability_label(),
            None => NO_MENU.to_string(),
        }
    }

    pub fn attributes(&self, snapshot: Option<&DailySnapshot>, today: NaiveDate) -> Map<String, Value> {
        let date = target_date(today, self.days_ahead);
        let menu = self.menu(snapshot, date);
        let meals = menu.map(|menu| menu.meals.as_slice()).unwrap_or_default();

        let meal_values: Vec<Value> = meals
            .iter()
            .map(|meal| {
                json!({
                    "name": meal.name,
                    "description": meal.description,
                    "price": meal.price,
                    "available": meal.available,
                    "category": meal.category,
                    "allergens": meal.allergens.join(","),
                })
            })
            .collect();
        let meal_names: Vec<String> = meals
            .iter()
            .map(|meal| match meal.available {
                Some(left) => format!("{} ({} left)", meal.name, left),
                None => meal.name.clone(),
            })
            .collect();

        let mut attrs = Map::new();
        attrs.insert("date".into(), json!(date.format("%Y-%m-%d").to_string()));
        attrs.insert("day_name".into(), json!(day_name(self.days_ahead, date)));
        attrs.insert("meal_count".into(), json!(meals.len()));
        attrs.insert("meals".into(), Value::Array(meal_values));
        attrs.insert("meal_names".into(), json!(meal_names));
        attrs
    }
}

/// One of the 14 sensors exposed per account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LunchSensor {
    Order(DailyOrderSensor),
    Menu(DailyMenuSensor),
}

impl LunchSensor {
    pub fn unique_id(&self) -> String {
        match self {
            LunchSensor::Order(sensor) => sensor.unique_id(),
            LunchSensor::Menu(sensor) => sensor.unique_id(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            LunchSensor::Order(sensor) => sensor.name(),
            LunchSensor::Menu(sensor) => sensor.name(),
        }
    }

    /// Renders the sensor against the coordinator's current state.
    pub fn read(&self, state: &CoordinatorState, today: NaiveDate) -> SensorReading {
        let snapshot = state.snapshot.as_deref();
        let (value, icon, attributes) = match self {
            LunchSensor::Order(sensor) => (
                sensor.state(snapshot, today),
                sensor.icon(snapshot, today),
                sensor.attributes(snapshot, today),
            ),
            LunchSensor::Menu(sensor) => (
                sensor.state(snapshot, today),
                ICON_MENU,
                sensor.attributes(snapshot, today),
            ),
        };

        SensorReading {
            unique_id: self.unique_id(),
            name: self.name(),
            state: value,
            icon,
            available: state.is_available(),
            attributes,
        }
    }
}

/// Order and menu sensor for each day, interleaved by day.
pub fn all_sensors(entry_id: &str) -> Vec<LunchSensor> {
    (0..DAYS_AHEAD)
        .flat_map(|days_ahead| {
            [
                LunchSensor::Order(DailyOrderSensor::new(entry_id, days_ahead)),
                LunchSensor::Menu(DailyMenuSensor::new(entry_id, days_ahead)),
            ]
        })
        .collect()
}
