mod common;

use std::io::Write;
use std::time::{Duration, Instant};

use bessa_lunch::client::OrderState;
use bessa_lunch::{ApiError, BessaClient, Credentials};
use chrono::{Days, NaiveDate};
use common::{
    fixed_today, order_json, page, window_query, MockBessa, TEST_EMAIL, TEST_PASSWORD, TEST_TOKEN,
    TEST_VENUE,
};
use mockito::Matcher;
use pretty_assertions::assert_eq;
use serde_json::json;

fn window() -> (NaiveDate, NaiveDate) {
    let today = fixed_today();
    (today, today.checked_add_days(Days::new(6)).unwrap())
}

#[tokio::test]
async fn test_fetch_orders_merges_pages_newest_first() {
    common::init_test_logging();
    let mut bessa = MockBessa::start().await;
    let login = bessa.mock_login(TEST_TOKEN, 1).await;

    let next = format!("{}/v1/user/orders?page=2&venue={}", bessa.url(), TEST_VENUE);
    let first = bessa
        .mock_orders(
            page(
                vec![
                    order_json(12, "2025-12-11T11:30:00Z", 13, &["Curry"]),
                    order_json(10, "2025-12-09T11:30:00Z", 5, &["Soup"]),
                ],
                Some(next),
            ),
            1,
        )
        .await;
    // Page 2 repeats order 10 and carries one older than page 1's tail.
    let second = bessa
        .server
        .mock("GET", "/v1/user/orders")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .match_header("authorization", format!("Token {}", TEST_TOKEN).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            page(
                vec![
                    order_json(10, "2025-12-09T11:30:00Z", 5, &["Soup"]),
                    order_json(11, "2025-12-10T11:30:00Z", 4, &["Pasta"]),
                    order_json(9, "2025-12-08T12:00:00Z", 8, &["Salad"]),
                ],
                None,
            )
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let mut client = bessa.client();
    let (from, to) = window();
    let orders = client
        .fetch_orders(TEST_VENUE, from, to)
        .await
        .expect("fetch_orders should succeed");

    let ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![12, 11, 10, 9]);
    assert!(orders.windows(2).all(|w| w[0].placed_at >= w[1].placed_at));
    assert_eq!(orders[0].state, OrderState::PreOrdered);
    assert_eq!(orders[0].pickup_code.as_deref(), Some("P12"));

    login.assert_async().await;
    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn test_fetch_orders_follows_relative_next_link() {
    let mut bessa = MockBessa::start().await;
    let _mock = bessa.mock_login(TEST_TOKEN, 1).await;
    let _mock = bessa
        .mock_orders(
            page(
                vec![order_json(1, "2025-12-09T11:30:00Z", 5, &["Soup"])],
                Some("/v1/user/orders?page=2".to_string()),
            ),
            1,
        )
        .await;
    let second = bessa
        .server
        .mock("GET", "/v1/user/orders")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_status(200)
        .with_body(page(vec![order_json(2, "2025-12-10T11:30:00Z", 5, &[])], None).to_string())
        .expect(1)
        .create_async()
        .await;

    let (from, to) = window();
    let orders = bessa.client().fetch_orders(TEST_VENUE, from, to).await.unwrap();

    assert_eq!(orders.len(), 2);
    second.assert_async().await;
}

#[tokio::test]
async fn test_unknown_state_code_maps_to_unknown() {
    let mut bessa = MockBessa::start().await;
    let _mock = bessa.mock_login(TEST_TOKEN, 1).await;
    let _mock = bessa
        .mock_orders(
            page(vec![order_json(5, "2025-12-09T11:30:00Z", 99, &["Soup"])], None),
            1,
        )
        .await;

    let (from, to) = window();
    let orders = bessa.client().fetch_orders(TEST_VENUE, from, to).await.unwrap();

    assert_eq!(orders[0].state, OrderState::Unknown(99));
    assert_eq!(orders[0].state.label(), "Unknown");
}

#[tokio::test]
async fn test_expired_token_reauthenticates_once() {
    let mut bessa = MockBessa::start().await;
    let stale = bessa
        .server
        .mock("GET", "/v1/user/orders")
        .match_query(window_query())
        .match_header("authorization", "Token stale")
        .with_status(401)
        .with_body(json!({ "detail": "Invalid token." }).to_string())
        .expect(1)
        .create_async()
        .await;
    let login = bessa.mock_login(TEST_TOKEN, 1).await;
    let fresh = bessa
        .mock_orders(page(vec![order_json(1, "2025-12-09T11:30:00Z", 5, &["Soup"])], None), 1)
        .await;

    let mut client = bessa.client();
    client.set_token("stale".to_string());

    let (from, to) = window();
    let orders = client.fetch_orders(TEST_VENUE, from, to).await.unwrap();

    assert_eq!(orders.len(), 1);
    assert_eq!(client.get_token(), Some(TEST_TOKEN));
    stale.assert_async().await;
    login.assert_async().await;
    fresh.assert_async().await;
}

#[tokio::test]
async fn test_second_401_surfaces_authentication_failure() {
    let mut bessa = MockBessa::start().await;
    // One login for the missing token, exactly one more after the first 401.
    let login = bessa.mock_login(TEST_TOKEN, 2).await;
    let rejected = bessa
        .server
        .mock("GET", "/v1/user/orders")
        .match_query(window_query())
        .with_status(401)
        .expect(2)
        .create_async()
        .await;

    let mut client = bessa.client();
    let (from, to) = window();
    let err = client.fetch_orders(TEST_VENUE, from, to).await.unwrap_err();

    assert!(matches!(err, ApiError::AuthenticationFailure(_)), "got {:?}", err);
    assert!(!err.is_transient());
    assert!(!client.is_authenticated());
    login.assert_async().await;
    rejected.assert_async().await;
}

#[tokio::test]
async fn test_failed_page_fails_whole_listing() {
    let mut bessa = MockBessa::start().await;
    let _mock = bessa.mock_login(TEST_TOKEN, 1).await;
    let next = format!("{}/v1/user/orders?page=2", bessa.url());
    let _mock = bessa
        .mock_orders(page(vec![order_json(1, "2025-12-09T11:30:00Z", 5, &[])], Some(next)), 1)
        .await;
    let _mock = bessa
        .server
        .mock("GET", "/v1/user/orders")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_status(502)
        .create_async()
        .await;

    let (from, to) = window();
    let err = bessa.client().fetch_orders(TEST_VENUE, from, to).await.unwrap_err();
    assert!(matches!(err, ApiError::TransientNetwork(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_rate_limited_listing() {
    let mut bessa = MockBessa::start().await;
    let _mock = bessa.mock_login(TEST_TOKEN, 1).await;
    let _mock = bessa
        .server
        .mock("GET", "/v1/user/orders")
        .match_query(window_query())
        .with_status(429)
        .create_async()
        .await;

    let (from, to) = window();
    let err = bessa.client().fetch_orders(TEST_VENUE, from, to).await.unwrap_err();
    assert_eq!(err, ApiError::RateLimited);
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_listing() {
    let mut bessa = MockBessa::start().await;
    let _mock = bessa.mock_login(TEST_TOKEN, 1).await;
    let _mock = bessa
        .server
        .mock("GET", "/v1/user/orders")
        .match_query(window_query())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"results": "not a list"}"#)
        .create_async()
        .await;

    let (from, to) = window();
    let err = bessa.client().fetch_orders(TEST_VENUE, from, to).await.unwrap_err();
    assert!(matches!(err, ApiError::MalformedResponse(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_pagination_loop_detected() {
    let mut bessa = MockBessa::start().await;
    let _mock = bessa.mock_login(TEST_TOKEN, 1).await;
    let loop_url = format!("{}/v1/user/orders?page=2", bessa.url());
    let _mock = bessa.mock_orders(page(vec![], Some(loop_url.clone())), 1).await;
    let _mock = bessa
        .server
        .mock("GET", "/v1/user/orders")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_status(200)
        .with_body(page(vec![], Some(loop_url)).to_string())
        .create_async()
        .await;

    let (from, to) = window();
    let err = bessa.client().fetch_orders(TEST_VENUE, from, to).await.unwrap_err();
    assert!(matches!(err, ApiError::MalformedResponse(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_inverted_range_makes_no_request() {
    let bessa = MockBessa::start().await;
    let (from, to) = window();

    let orders = bessa.client().fetch_orders(TEST_VENUE, to, from).await.unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn test_stalled_response_times_out_as_transient() {
    let mut bessa = MockBessa::start().await;
    let _login = bessa.mock_login(TEST_TOKEN, 1).await;
    let _stalled = bessa
        .server
        .mock("GET", "/v1/user/orders")
        .match_query(window_query())
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_secs(3));
            w.write_all(b"{\"results\": []}")
        })
        .create_async()
        .await;

    let mut client = BessaClient::with_timeout(
        bessa.url(),
        Credentials::new(TEST_EMAIL, TEST_PASSWORD),
        Duration::from_millis(500),
    )
    .expect("client");

    let started = Instant::now();
    let (from, to) = window();
    let err = client.fetch_orders(TEST_VENUE, from, to).await.unwrap_err();

    assert!(matches!(err, ApiError::TransientNetwork(_)), "got {:?}", err);
    assert!(err.is_transient());
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "timed out after {:?}",
        started.elapsed()
    );
}
