//! # Bessa Lunch Library
//!
//! This library polls the Bessa lunch-ordering API and exposes the result as read-only
//! sensors: for each of the next 7 days, the user's order and the canteen menu.
//!
//! ## Client Module
//!
//! The [`client`] module is an HTTP client for the Bessa API. It handles login, token
//! re-authentication, paginated order listings and daily menus.
//!
//! ## Coordinator Module
//!
//! The [`coordinator`] module refreshes the 7-day window on a fixed interval and publishes
//! an immutable [`DailySnapshot`]. Failed refreshes keep the last good snapshot.
//!
//! ## Sensor and Server Modules
//!
//! [`sensor`] renders the snapshot as 14 sensors; [`server`] serves them over the Model
//! Context Protocol.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bessa_lunch::{BessaClient, Coordinator, Credentials};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = BessaClient::new(
//!     "https://api.bessa.app",
//!     Credentials::new("me@example.com", "secret"),
//! )?;
//! let coordinator = Coordinator::new(client, 591, Duration::from_secs(30 * 60));
//!
//! let snapshot = coordinator.refresh().await?;
//! println!("{} orders this week", snapshot.order_count());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod coordinator;
pub mod sensor;
pub mod server;

pub use client::{ApiError, ApiResult, BessaClient, Credentials};
pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorState, DailySnapshot};
pub use server::LunchMcpServer;
