//! Periodic refresh of the 7-day order and menu window.
//!
//! The [`Coordinator`] owns the [`BessaClient`] and publishes a [`CoordinatorState`] through a
//! `tokio::sync::watch` channel. Each successful refresh replaces the whole
//! [`DailySnapshot`]; a failed refresh leaves the previous snapshot untouched and only
//! records the error.
//!
//! Refreshes are single-flight. The client mutex doubles as the flight gate: a caller that
//! arrives while a refresh holds the lock waits for it and then returns that refresh's
//! outcome instead of starting another round-trip.

use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{ApiError, ApiResult, BessaClient, Credentials, Menu, Order};

/// Days covered by a snapshot: today through today+6.
pub const DAYS_AHEAD: usize = 7;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Order and menu for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySlot {
    pub date: NaiveDate,
    pub order: Option<Order>,
    pub menu: Option<Menu>,
}

/// The complete 7-day state published after a successful refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySnapshot {
    pub start: NaiveDate,
    pub built_at: DateTime<Utc>,
    pub days: Vec<DaySlot>,
}

impl DailySnapshot {
    /// Builds the per-day view for `today..today+6`.
    ///
    /// `orders` must be newest first. For each day the newest order that is not
    /// cancelled wins; menus are matched by date.
    pub fn build(
        today: NaiveDate,
        orders: &[Order],
        menus: Vec<Menu>,
        built_at: DateTime<Utc>,
    ) -> Self {
        let mut menus = menus;
        let days = (0..DAYS_AHEAD)
            .filter_map(|offset| today.checked_add_days(Days::new(offset as u64)))
            .map(|date| {
                let order = orders
                    .iter()
                    .find(|order| order.date == date && !order.state.is_cancelled())
                    .cloned();
                let menu = menus
                    .iter()
                    .position(|menu| menu.date == date)
                    .map(|idx| menus.swap_remove(idx));
                DaySlot { date, order, menu }
            })
            .collect();

        Self {
            start: today,
            built_at,
            days,
        }
    }

    pub fn day(&self, days_ahead: usize) -> Option<&DaySlot> {
        self.days.get(days_ahead)
    }

    pub fn slot_for(&self, date: NaiveDate) -> Option<&DaySlot> {
        self.days.iter().find(|slot| slot.date == date)
    }

    pub fn order_for(&self, date: NaiveDate) -> Option<&Order> {
        self.slot_for(date).and_then(|slot| slot.order.as_ref())
    }

    pub fn menu_for(&self, date: NaiveDate) -> Option<&Menu> {
        self.slot_for(date).and_then(|slot| slot.menu.as_ref())
    }

    pub fn order_count(&self) -> usize {
        self.days.iter().filter(|slot| slot.order.is_some()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Refreshing,
}

/// Everything consumers read: the current snapshot plus refresh health.
#[derive(Debug, Clone)]
pub struct CoordinatorState {
    pub phase: Phase,
    pub snapshot: Option<Arc<DailySnapshot>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_refresh_success: bool,
    pub last_error: Option<ApiError>,
    /// Set after an authentication failure; cleared by [`Coordinator::reconfigure`].
    pub requires_reconfiguration: bool,
    /// Number of refreshes that ran to completion, successful or not.
    pub completed_refreshes: u64,
}

impl Default for CoordinatorState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            snapshot: None,
            last_success: None,
            last_refresh_success: false,
            last_error: None,
            requires_reconfiguration: false,
            completed_refreshes: 0,
        }
    }
}

impl CoordinatorState {
    /// Whether sensors should report as available.
    pub fn is_available(&self) -> bool {
        self.snapshot.is_some() && self.last_refresh_success
    }

    fn outcome(&self) -> ApiResult<Arc<DailySnapshot>> {
        if let Some(err) = &self.last_error {
            return Err(err.clone());
        }
        self.snapshot
            .clone()
            .ok_or_else(|| ApiError::MalformedResponse("No snapshot published".to_string()))
    }
}

pub struct Coordinator {
    client: Mutex<BessaClient>,
    venue: u64,
    interval: Duration,
    today: fn() -> NaiveDate,
    state_tx: watch::Sender<CoordinatorState>,
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

impl Coordinator {
    pub fn new(client: BessaClient, venue: u64, interval: Duration) -> Self {
        let (state_tx, _) = watch::channel(CoordinatorState::default());
        Self {
            client: Mutex::new(client),
            venue,
            interval,
            today: local_today,
            state_tx,
        }
    }

    /// Overrides the source of "today". Tests pin the calendar with this.
    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn venue(&self) -> u64 {
        self.venue
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn today(&self) -> NaiveDate {
        (self.today)()
    }

    /// Current state. The snapshot inside is shared, never mutated after publication.
    pub fn state(&self) -> CoordinatorState {
        self.state_tx.borrow().clone()
    }

    pub fn snapshot(&self) -> Option<Arc<DailySnapshot>> {
        self.state_tx.borrow().snapshot.clone()
    }

    /// Receiver that is notified on every phase change and publication.
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state_tx.subscribe()
    }

    /// Refreshes the 7-day window, or joins a refresh already in flight.
    ///
    /// On failure the previously published snapshot is kept and the error is recorded.
    /// After an authentication failure no requests are made until [`Self::reconfigure`].
    pub async fn refresh(&self) -> ApiResult<Arc<DailySnapshot>> {
        let observed = self.state_tx.borrow().completed_refreshes;
        let mut client = self.client.lock().await;

        let current = self.state();
        if current.completed_refreshes != observed {
            debug!("Joined refresh that completed while waiting");
            return current.outcome();
        }
        if current.requires_reconfiguration {
            warn!("Skipping refresh: credentials rejected, reconfiguration required");
            return current.outcome();
        }

        self.state_tx.send_modify(|state| state.phase = Phase::Refreshing);
        let phase = PhaseGuard::new(&self.state_tx);

        let today = self.today();
        debug!("Refreshing window starting {}", today);
        let result = fetch_window(&mut client, self.venue, today).await;

        // Client lock stays held until `completed_refreshes` is published.
        let outcome = match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                info!(
                    "Refreshed lunch data: {} orders across {} days",
                    snapshot.order_count(),
                    snapshot.days.len()
                );
                self.state_tx.send_modify(|state| {
                    state.phase = Phase::Idle;
                    state.snapshot = Some(snapshot.clone());
                    state.last_success = Some(snapshot.built_at);
                    state.last_refresh_success = true;
                    state.last_error = None;
                    state.completed_refreshes += 1;
                });
                Ok(snapshot)
            }
            Err(err) => {
                if err.is_transient() {
                    warn!("Refresh failed, keeping previous snapshot: {}", err);
                } else {
                    error!("Refresh failed, reconfiguration required: {}", err);
                }
                self.state_tx.send_modify(|state| {
                    state.phase = Phase::Idle;
                    state.last_refresh_success = false;
                    state.last_error = Some(err.clone());
                    state.requires_reconfiguration = !err.is_transient();
                    state.completed_refreshes += 1;
                });
                Err(err)
            }
        };
        phase.disarm();
        drop(client);
        outcome
    }

    /// Installs new credentials and lifts the authentication block.
    pub async fn reconfigure(&self, credentials: Credentials) {
        let mut client = self.client.lock().await;
        client.set_credentials(credentials);
        self.state_tx.send_modify(|state| state.requires_reconfiguration = false);
        info!("Credentials updated");
    }

    /// Refreshes on every tick until `cancel` fires. The first tick is immediate.
    ///
    /// Failures wait for the next tick; there is no backoff.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Polling venue {} every {} minutes",
            self.venue,
            self.interval.as_secs() / 60
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Poll loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        debug!("Scheduled refresh failed ({})", e.kind());
                    }
                }
            }
        }
    }
}

/// Puts the phase back to `Idle` if a refresh is abandoned mid-fetch, e.g. when the
/// caller's future is dropped.
struct PhaseGuard<'a> {
    state_tx: &'a watch::Sender<CoordinatorState>,
    armed: bool,
}

impl<'a> PhaseGuard<'a> {
    fn new(state_tx: &'a watch::Sender<CoordinatorState>) -> Self {
        Self {
            state_tx,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Refresh abandoned before completion");
            self.state_tx.send_modify(|state| state.phase = Phase::Idle);
        }
    }
}

async fn fetch_window(
    client: &mut BessaClient,
    venue: u64,
    today: NaiveDate,
) -> ApiResult<DailySnapshot> {
    let dates: Vec<NaiveDate> = (0..DAYS_AHEAD)
        .filter_map(|offset| today.checked_add_days(Days::new(offset as u64)))
        .collect();
    let (Some(first), Some(last)) = (dates.first().copied(), dates.last().copied()) else {
        return Err(ApiError::Config(format!("Date out of range: {}", today)));
    };

    let orders = client.fetch_orders(venue, first, last).await?;

    let mut menus = Vec::with_capacity(dates.len());
    for date in dates {
        menus.push(client.fetch_menu(venue, date).await?);
    }

    Ok(DailySnapshot::build(today, &orders, menus, Utc::now()))
}
