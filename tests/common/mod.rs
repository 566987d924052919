#![allow(dead_code)]

use std::time::Duration;

use bessa_lunch::{BessaClient, Credentials};
use chrono::NaiveDate;
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};

pub const TEST_EMAIL: &str = "lunch@example.com";
pub const TEST_PASSWORD: &str = "testing1";
pub const TEST_VENUE: u64 = 591;
pub const TEST_TOKEN: &str = "0123456789abcdef0123456789abcdef01234567";

/// Monday 2025-12-08; the snapshot window runs to Sunday 2025-12-14.
pub fn fixed_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, 8).expect("valid date")
}

/// A mock Bessa API backed by a local mockito server.
pub struct MockBessa {
    pub server: ServerGuard,
}

impl MockBessa {
    pub async fn start() -> Self {
        Self {
            server: Server::new_async().await,
        }
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    pub fn client(&self) -> BessaClient {
        BessaClient::with_timeout(
            self.server.url(),
            Credentials::new(TEST_EMAIL, TEST_PASSWORD),
            Duration::from_secs(5),
        )
        .expect("Failed to build client")
    }

    /// Login that succeeds with `token`, expected `hits` times.
    pub async fn mock_login(&mut self, token: &str, hits: usize) -> Mock {
        self.server
            .mock("POST", "/v1/auth/login/")
            .match_body(Matcher::Json(json!({
                "email": TEST_EMAIL,
                "password": TEST_PASSWORD,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "key": token }).to_string())
            .expect(hits)
            .create_async()
            .await
    }

    /// Orders listing for the default snapshot window, first page.
    pub async fn mock_orders(&mut self, body: Value, hits: usize) -> Mock {
        self.server
            .mock("GET", "/v1/user/orders")
            .match_query(window_query())
            .match_header("authorization", format!("Token {}", TEST_TOKEN).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .expect(hits)
            .create_async()
            .await
    }

    /// Same empty menu for every day at the test venue.
    pub async fn mock_any_menu(&mut self, body: Value, hits: usize) -> Mock {
        self.server
            .mock(
                "GET",
                Matcher::Regex(format!(r"^/v1/venues/{}/menu/7/\d{{4}}-\d{{2}}-\d{{2}}/$", TEST_VENUE)),
            )
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .expect(hits)
            .create_async()
            .await
    }

    pub async fn mock_menu_for(&mut self, date: &str, body: Value) -> Mock {
        self.server
            .mock("GET", format!("/v1/venues/{}/menu/7/{}/", TEST_VENUE, date).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }
}

/// Query the client sends for `fixed_today()..=fixed_today()+6`.
pub fn window_query() -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("venue".into(), TEST_VENUE.to_string()),
        Matcher::UrlEncoded("deleted__isnull".into(), "true".into()),
        Matcher::UrlEncoded("date__gte".into(), "2025-12-08T00:00:00".into()),
        Matcher::UrlEncoded("date__lt".into(), "2025-12-15T00:00:00".into()),
        Matcher::UrlEncoded("ordering".into(), "-date".into()),
    ])
}

pub fn page(results: Vec<Value>, next: Option<String>) -> Value {
    json!({
        "count": results.len(),
        "next": next,
        "previous": null,
        "results": results,
    })
}

pub fn order_json(id: i64, date: &str, state: i64, meals: &[&str]) -> Value {
    let items: Vec<Value> = meals
        .iter()
        .map(|name| json!({ "name": name, "price": "5.50", "amount": 1, "vat": "10.00", "article": 1 }))
        .collect();
    json!({
        "id": id,
        "venue": TEST_VENUE,
        "order_type": 7,
        "order_state": state,
        "date": date,
        "total": format!("{:.2}", 5.5 * meals.len() as f64),
        "currency": "EUR",
        "pickup_code": format!("P{}", id),
        "number": id,
        "items": items,
        "created": "2025-12-01T08:00:00Z",
        "updated": "2025-12-01T08:00:00Z",
        "deleted": null,
    })
}

pub fn menu_json(categories: Vec<(&str, Vec<Value>)>) -> Value {
    let results: Vec<Value> = categories
        .into_iter()
        .enumerate()
        .map(|(idx, (name, items))| json!({ "id": idx, "name": name, "items": items }))
        .collect();
    page(results, None)
}

pub fn meal_json(id: i64, name: &str, available: Value) -> Value {
    json!({
        "id": id,
        "name": name,
        "description": format!("{} of the day", name),
        "price": "6.20",
        "allergens": "A,G",
        "available_amount": available,
    })
}

pub fn init_test_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}
