#![deny(warnings)]

//! Day-cycle runtime for Tea Cart Tycoon.
//!
//! [`DayCycleSimulator`] owns a session's [`GameState`] and advances it one
//! day at a time: price the stock, charge it, sample the market, sell, record.
//! Randomness and wall-clock time are injected so a session can be replayed
//! exactly from its seed.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;
use tea_core::{
    validate_scenario, DayRecord, InventoryDecision, MarketConditions, PurchasePolicy, Scenario,
    ValidationError,
};
use tea_econ::{
    compute_sales, compute_wastage, price_inventory, sample_market_conditions, EconError,
    RandomSource, SeededRandom,
};
use thiserror::Error;
use tracing::{info, warn};

/// Wall-clock time source for the countdown.
pub trait Clock {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system's UTC clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl ManualClock {
    /// Clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    /// Move time forward for this clock and its clones.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

/// Mutable session state. Only [`DayCycleSimulator`] mutates it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// Day about to be played, starting at 1.
    pub current_day: u32,
    /// Cash on hand; negative only under the deferred purchase policy.
    pub cash_balance: Decimal,
    /// Completed days, oldest first.
    pub history: Vec<DayRecord>,
    /// Latched; never reverts once set.
    pub game_over: bool,
    /// `None` when the countdown is disabled.
    pub countdown_deadline: Option<DateTime<Utc>>,
}

impl GameState {
    fn start(initial_cash: Decimal, now: DateTime<Utc>, countdown_seconds: Option<u64>) -> Self {
        Self {
            current_day: 1,
            cash_balance: initial_cash,
            history: Vec::new(),
            game_over: false,
            countdown_deadline: countdown_seconds.and_then(|secs| deadline_after(now, secs)),
        }
    }
}

fn deadline_after(now: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    let span = Duration::from_std(std::time::Duration::from_secs(secs)).ok()?;
    now.checked_add_signed(span)
}

/// Totals over a session's history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Completed days.
    pub days_played: u32,
    /// Cash balance at the time of the summary.
    pub final_cash: Decimal,
    /// Revenue summed over every day.
    pub total_revenue: Decimal,
    /// Replenishment cost summed over every day.
    pub total_cost: Decimal,
    /// Revenue minus cost.
    pub net_profit: Decimal,
    /// Units sold across all items and days.
    pub units_sold: u64,
    /// Units left unsold across all items and days.
    pub units_wasted: u64,
    /// Whether the session has ended.
    pub game_over: bool,
}

/// Errors returned by the simulator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Replenishment costs more than the cash on hand. State is unchanged;
    /// resubmit a smaller decision.
    #[error("insufficient cash: stock costs {cost}, balance is {cash}")]
    InsufficientCash { cost: Decimal, cash: Decimal },
    /// The day horizon or the countdown has been reached.
    #[error("session has ended")]
    SessionEnded,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Econ(#[from] EconError),
}

/// Owns one session and advances it day by day.
pub struct DayCycleSimulator<R = SeededRandom, C = SystemClock> {
    scenario: Scenario,
    state: GameState,
    rng: R,
    clock: C,
}

impl DayCycleSimulator<SeededRandom, SystemClock> {
    /// Simulator seeded from the scenario's `rng_seed`, on the system clock.
    pub fn seeded(scenario: Scenario) -> Result<Self, SimError> {
        let rng = SeededRandom::from_seed(scenario.config.rng_seed);
        Self::new(scenario, rng, SystemClock)
    }
}

impl<R: RandomSource, C: Clock> DayCycleSimulator<R, C> {
    /// Start a session from the scenario's config.
    ///
    /// Fails when a table is empty or the config is unusable. Malformed impact
    /// ranges are only flagged; they act as a neutral impact during play.
    pub fn new(scenario: Scenario, rng: R, clock: C) -> Result<Self, SimError> {
        validate_scenario(&scenario)?;
        for err in scenario.malformed_impacts() {
            warn!(%err, "impact range will be treated as 0%");
        }
        let cfg = &scenario.config;
        let state = GameState::start(cfg.initial_cash, clock.now(), cfg.countdown_seconds);
        info!(
            cash = %state.cash_balance,
            horizon = cfg.horizon_days,
            countdown_secs = ?cfg.countdown_seconds,
            "session started"
        );
        Ok(Self {
            scenario,
            state,
            rng,
            clock,
        })
    }

    /// Restart the session with explicit parameters, discarding history.
    ///
    /// A zero-day horizon yields a session that is over from the start.
    pub fn initialize(&mut self, initial_cash: Decimal, horizon_days: u32, countdown_seconds: Option<u64>) {
        self.scenario.config.initial_cash = initial_cash;
        self.scenario.config.horizon_days = horizon_days;
        self.scenario.config.countdown_seconds = countdown_seconds;
        self.state = GameState::start(initial_cash, self.clock.now(), countdown_seconds);
        self.state.game_over = self.state.current_day > horizon_days;
        info!(cash = %initial_cash, horizon = horizon_days, "session restarted");
    }

    /// Draw today's weather and events for the given route.
    pub fn sample_market_conditions(&mut self, locations: &[String]) -> MarketConditions {
        sample_market_conditions(&self.scenario, locations, &mut self.rng)
    }

    /// Replenishment cost of a decision. Pure.
    pub fn price_inventory(&self, decision: &InventoryDecision) -> Result<Decimal, SimError> {
        Ok(price_inventory(&self.scenario.catalog, decision)?)
    }

    /// Charge a purchase against cash, or reject it without changing anything.
    pub fn commit_purchase(&mut self, cost: Decimal) -> Result<(), SimError> {
        if self.state.cash_balance < cost {
            return Err(self.reject(cost));
        }
        self.state.cash_balance = self
            .state
            .cash_balance
            .checked_sub(cost)
            .ok_or(EconError::Overflow("cash balance"))?;
        Ok(())
    }

    fn reject(&self, cost: Decimal) -> SimError {
        warn!(cost = %cost, cash = %self.state.cash_balance, "purchase rejected");
        SimError::InsufficientCash {
            cost,
            cash: self.state.cash_balance,
        }
    }

    fn ensure_affordable(&self, cost: Decimal) -> Result<(), SimError> {
        let cash = self.state.cash_balance;
        let refused = match self.scenario.config.purchase_policy {
            PurchasePolicy::Upfront => cash < cost,
            PurchasePolicy::Deferred => cash < Decimal::ZERO && cost > Decimal::ZERO,
        };
        if refused {
            return Err(self.reject(cost));
        }
        Ok(())
    }

    /// Play one day with the given stock.
    ///
    /// On any error the game state is left untouched, except that an expired
    /// countdown latches `game_over`. A balance that no longer fits in a
    /// `Decimal` is reported as [`EconError::Overflow`].
    pub fn advance_day(&mut self, decision: &InventoryDecision) -> Result<DayRecord, SimError> {
        if self.is_game_over() {
            self.state.game_over = true;
            return Err(SimError::SessionEnded);
        }
        decision.validate(&self.scenario)?;
        let cost = self.price_inventory(decision)?;
        self.ensure_affordable(cost)?;

        let market = self.sample_market_conditions(decision.locations());
        let sales = compute_sales(&self.scenario.catalog, decision, &market, &mut self.rng)?;
        let wastage = compute_wastage(decision, &sales.sold);

        let cash = self
            .state
            .cash_balance
            .checked_sub(cost)
            .and_then(|c| c.checked_add(sales.revenue))
            .ok_or(EconError::Overflow("cash balance"))?;
        self.state.cash_balance = cash;

        let stocked = self
            .scenario
            .catalog
            .items
            .iter()
            .map(|item| (item.name.clone(), decision.quantity(&item.name)))
            .collect();
        let record = DayRecord {
            day_index: self.state.current_day,
            stocked,
            sold: sales.sold,
            wastage,
            revenue: sales.revenue,
            cost,
            market,
        };
        self.state.history.push(record.clone());
        self.state.current_day += 1;

        info!(
            day = record.day_index,
            revenue = %record.revenue,
            cost = %record.cost,
            wasted = record.units_wasted(),
            cash = %self.state.cash_balance,
            "day completed"
        );

        if self.state.current_day > self.scenario.config.horizon_days || self.countdown_expired() {
            self.state.game_over = true;
            info!(days = record.day_index, cash = %self.state.cash_balance, "game over");
        }
        Ok(record)
    }

    /// True once the horizon is passed, or as soon as the countdown elapses.
    pub fn is_game_over(&self) -> bool {
        self.state.game_over || self.countdown_expired()
    }

    /// Whether the wall-clock deadline has passed.
    pub fn countdown_expired(&self) -> bool {
        self.state
            .countdown_deadline
            .is_some_and(|deadline| self.clock.now() >= deadline)
    }

    /// Time left on the countdown, never negative; `None` when disabled.
    pub fn remaining_time(&self) -> Option<Duration> {
        self.state
            .countdown_deadline
            .map(|deadline| (deadline - self.clock.now()).max(Duration::zero()))
    }

    /// Read-only view of the session state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Day about to be played, starting at 1.
    pub fn current_day(&self) -> u32 {
        self.state.current_day
    }

    /// Cash on hand.
    pub fn cash_balance(&self) -> Decimal {
        self.state.cash_balance
    }

    /// Completed days, oldest first.
    pub fn history(&self) -> &[DayRecord] {
        &self.state.history
    }

    /// Scenario the session runs on.
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Totals over the history so far.
    pub fn summary(&self) -> SessionSummary {
        let history = &self.state.history;
        let total_revenue: Decimal = history.iter().map(|d| d.revenue).sum();
        let total_cost: Decimal = history.iter().map(|d| d.cost).sum();
        SessionSummary {
            days_played: u32::try_from(history.len()).unwrap_or(u32::MAX),
            final_cash: self.state.cash_balance,
            total_revenue,
            total_cost,
            net_profit: total_revenue - total_cost,
            units_sold: history.iter().map(DayRecord::units_sold).sum(),
            units_wasted: history.iter().map(DayRecord::units_wasted).sum(),
            game_over: self.is_game_over(),
        }
    }
}
