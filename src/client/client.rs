use chrono::{Days, NaiveDate};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::time::Duration;

use crate::client::{
    auth::{token_preview, BessaAuth, Credentials},
    error::{ApiError, ApiResult},
    types::*,
};

pub const DEFAULT_BASE_URL: &str = "https://api.bessa.app";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Menu type 7 is the canteen menu.
pub const CANTEEN_MENU_TYPE: u32 = 7;

/// Upper bound on followed `next` links per listing.
const MAX_PAGES: usize = 100;

pub struct BessaClient {
    base_url: String,
    client: Client,
    auth: BessaAuth,
}

impl BessaClient {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> ApiResult<Self> {
        Self::with_timeout(base_url, credentials, DEFAULT_TIMEOUT)
    }

    /// Every request made by this client, login included, is bounded by `timeout`.
    pub fn with_timeout(
        base_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> ApiResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            auth: BessaAuth::new(base_url.clone(), client.clone(), credentials),
            client,
            base_url,
        })
    }

    /// Logs in with the given credentials, remembering them for later re-authentication.
    pub async fn authenticate(&mut self, email: &str, password: &str) -> ApiResult<String> {
        self.auth.set_credentials(Credentials::new(email, password));
        self.auth.authenticate().await
    }

    /// Logs in with the credentials the client was built with.
    pub async fn login(&mut self) -> ApiResult<String> {
        self.auth.authenticate().await
    }

    /// Startup check. `Ok(false)` means Bessa could not be reached right now and the
    /// poll loop should retry; only rejected credentials are an error.
    pub async fn validate_credentials(&mut self) -> ApiResult<bool> {
        match self.auth.authenticate().await {
            Ok(_) => Ok(true),
            Err(e) if e.is_transient() => {
                tracing::warn!("Could not validate credentials yet: {}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.auth.set_credentials(credentials);
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    pub fn get_token_preview(&self) -> Option<String> {
        self.auth.get_token().map(token_preview)
    }

    pub fn set_token(&mut self, token: String) {
        self.auth.set_token(token);
    }

    pub fn get_token(&self) -> Option<&str> {
        self.auth.get_token()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // Orders

    /// Fetches every non-deleted order at `venue` dated within `date_from..=date_to`.
    ///
    /// All pages are requested in order and merged. The result has no duplicate ids and
    /// is sorted newest first by pickup timestamp.
    pub async fn fetch_orders(
        &mut self,
        venue: u64,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> ApiResult<Vec<Order>> {
        if date_from > date_to {
            tracing::debug!("Empty order range {} > {}, skipping request", date_from, date_to);
            return Ok(Vec::new());
        }

        let upper = date_to
            .checked_add_days(Days::new(1))
            .ok_or_else(|| ApiError::Config(format!("Date out of range: {}", date_to)))?;

        let params = [
            format!("venue={}", venue),
            "deleted__isnull=true".to_string(),
            format!(
                "date__gte={}",
                urlencoding::encode(&date_from.format("%Y-%m-%dT00:00:00").to_string())
            ),
            format!(
                "date__lt={}",
                urlencoding::encode(&upper.format("%Y-%m-%dT00:00:00").to_string())
            ),
            "ordering=-date".to_string(),
        ];
        let url = format!("{}/v1/user/orders?{}", self.base_url, params.join("&"));

        tracing::debug!("Fetching orders for venue {} from {} to {}", venue, date_from, date_to);
        let raw: Vec<ApiOrder> = self.fetch_all_pages(url, "orders").await?;
        let fetched = raw.len();

        let mut orders = Vec::with_capacity(raw.len());
        for api_order in raw {
            if let Some(order) = api_order.into_order()? {
                orders.push(order);
            }
        }

        let mut seen = HashSet::new();
        orders.retain(|order| seen.insert(order.id));
        orders.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));

        tracing::debug!("Retrieved {} orders ({} raw)", orders.len(), fetched);
        Ok(orders)
    }

    // Menus

    /// Fetches the canteen menu for `date`. A day without a published menu (404 on the
    /// first page) yields an empty [`Menu`]; a 404 on a later page is an error.
    pub async fn fetch_menu(&mut self, venue: u64, date: NaiveDate) -> ApiResult<Menu> {
        let url = format!(
            "{}/v1/venues/{}/menu/{}/{}/",
            self.base_url,
            venue,
            CANTEEN_MENU_TYPE,
            date.format("%Y-%m-%d")
        );

        match self.fetch_all_pages::<ApiMenuCategory>(url, "menu").await {
            Ok(categories) => {
                let menu = Menu::from_categories(date, categories);
                tracing::debug!("Menu for {}: {} meals", date, menu.meals.len());
                Ok(menu)
            }
            Err(ApiError::UnexpectedStatus { status: 404, .. }) => {
                tracing::debug!("No menu published for {}", date);
                Ok(Menu::empty(date))
            }
            Err(e) => Err(e),
        }
    }

    // Transport

    /// Follows `next` links sequentially and concatenates every page's results.
    async fn fetch_all_pages<T: DeserializeOwned>(
        &mut self,
        first_url: String,
        what: &str,
    ) -> ApiResult<Vec<T>> {
        let mut results = Vec::new();
        let mut visited = HashSet::new();
        let mut next_url = Some(first_url);

        while let Some(url) = next_url.take() {
            if !visited.insert(url.clone()) {
                return Err(ApiError::MalformedResponse(format!(
                    "Pagination loop in {} at {}",
                    what, url
                )));
            }
            if visited.len() > MAX_PAGES {
                return Err(ApiError::MalformedResponse(format!(
                    "More than {} pages of {}",
                    MAX_PAGES, what
                )));
            }

            let page: PaginatedResponse<T> = match self.get_json(&url, what).await {
                Ok(page) => page,
                // Only a missing first page means "no such listing".
                Err(ApiError::UnexpectedStatus { status: 404, .. }) if visited.len() > 1 => {
                    return Err(ApiError::MalformedResponse(format!(
                        "Page {} of {} vanished: {}",
                        visited.len(),
                        what,
                        url
                    )));
                }
                Err(e) => return Err(e),
            };
            tracing::debug!("Fetched page {} of {} ({} results)", visited.len(), what, page.results.len());
            results.extend(page.results);
            next_url = page.next.map(|next| self.absolute_url(next));
        }

        Ok(results)
    }

    fn absolute_url(&self, url: String) -> String {
        if url.starts_with('/') {
            format!("{}{}", self.base_url, url)
        } else {
            url
        }
    }

    async fn get_json<T: DeserializeOwned>(&mut self, url: &str, what: &str) -> ApiResult<T> {
        let response = self.get_authorized(url).await?;
        let response = check_status(response, what).await?;

        let body = response.text().await.map_err(|e| {
            tracing::error!("Failed to read {} response: {}", what, e);
            ApiError::TransientNetwork(format!("Failed to read {} response: {}", what, e))
        })?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse {} response: {}", what, e);
            ApiError::MalformedResponse(format!("Invalid {} response: {}", what, e))
        })
    }

    /// Issues an authenticated GET. A 401 drops the token, triggers exactly one new
    /// login and one retry; a second 401 is an authentication failure.
    async fn get_authorized(&mut self, url: &str) -> ApiResult<Response> {
        let cached = self.auth.get_token().map(str::to_string);
        let token = match cached {
            Some(token) => token,
            None => self.auth.authenticate().await?,
        };

        let response = self.send_get(url, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::warn!("Token rejected for {}, re-authenticating", url);
        self.auth.clear_token();
        let token = self.auth.authenticate().await?;

        let response = self.send_get(url, &token).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::error!("Token rejected again after re-authentication");
            self.auth.clear_token();
            return Err(ApiError::AuthenticationFailure(
                "Token rejected after re-authentication".to_string(),
            ));
        }

        Ok(response)
    }

    async fn send_get(&self, url: &str, token: &str) -> ApiResult<Response> {
        self.client
            .get(url)
            .header("Authorization", format!("Token {}", token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Network error requesting {}: {}", url, e);
                if e.is_timeout() {
                    ApiError::TransientNetwork(format!("Request to {} timed out", url))
                } else {
                    ApiError::TransientNetwork(format!("Failed to connect to Bessa API: {}", e))
                }
            })
    }
}

/// Maps non-success statuses onto [`ApiError`].
async fn check_status(response: Response, what: &str) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());

    match status {
        StatusCode::NOT_FOUND => {
            tracing::debug!("{} not found: {}", what, error_body);
        }
        _ => {
            tracing::error!("Failed to get {} with status {}: {}", what, status, error_body);
        }
    }

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ApiError::AuthenticationFailure(format!("Access denied to {} ({})", what, status))
        }
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited,
        s if s.is_server_error() => {
            ApiError::TransientNetwork(format!("Bessa server error getting {} ({})", what, s))
        }
        s => ApiError::UnexpectedStatus {
            status: s.as_u16(),
            message: error_body,
        },
    })
}
