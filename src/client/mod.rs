//! # Bessa HTTP Client
//!
//! This module provides a read-only HTTP client for the Bessa lunch-ordering API. It
//! handles login, token caching with one transparent re-authentication on 401, paginated
//! order listings, and per-day canteen menus.
//!
//! ## Modules
//!
//! - [`auth`] - Login and session token handling
//! - [`client`] - HTTP client with the order and menu endpoints
//! - [`error`] - [`ApiError`] and its transient/fatal classification
//! - [`types`] - Wire types and the domain [`Order`] / [`Menu`] model
//!
//! ## Quick Start
//!
//! ```no_run
//! use bessa_lunch::client::{BessaClient, Credentials};
//! use chrono::{Days, Local};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut client = BessaClient::new(
//!     "https://api.bessa.app",
//!     Credentials::new("me@example.com", "secret"),
//! )?;
//!
//! let today = Local::now().date_naive();
//! let orders = client.fetch_orders(591, today, today + Days::new(6)).await?;
//! let menu = client.fetch_menu(591, today).await?;
//! println!("{} orders, {}", orders.len(), menu.availability_label());
//! # Ok(())
//! # }
//! ```

pub mod auth;
#[allow(clippy::module_inception)]
pub mod client;
pub mod error;
pub mod types;

pub use auth::Credentials;
pub use client::{BessaClient, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use error::{ApiError, ApiResult};
pub use types::*;
