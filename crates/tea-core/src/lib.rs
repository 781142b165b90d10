#![deny(warnings)]

//! Core domain models and invariants for Tea Cart Tycoon.
//!
//! This crate defines the static tables a session is parameterized by (item
//! catalog, weather values, location event tables), the per-day value types
//! exchanged with the economy and runtime crates, and validation helpers that
//! guarantee the tables are usable before a session starts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Scenario shipped with the game, embedded at compile time.
pub const BUILTIN_SCENARIO: &str = include_str!("../data/tea_cart.yaml");

/// Largest price, cost or starting cash a scenario may carry.
pub const MAX_MONEY: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);
/// Largest stocking limit or base demand per item.
pub const MAX_UNITS: u32 = 100_000;
/// Largest absolute event impact, in percent.
pub const MAX_IMPACT_PERCENT: i32 = 1_000;

/// Product categories sold from the cart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Hot drinks.
    Tea,
    /// Finger food sold alongside tea.
    Snack,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tea => f.write_str("tea"),
            Self::Snack => f.write_str("snack"),
        }
    }
}

/// Stocking limit and base-demand range shared by every item of a category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRules {
    /// Most units of a single item a player may stock for one day.
    pub max_quantity: u32,
    /// Lowest base demand drawn per item per day.
    pub demand_low: u32,
    /// Highest base demand drawn per item per day (inclusive).
    pub demand_high: u32,
}

/// A sellable item. Immutable for the session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemType {
    /// Display name, unique within the catalog.
    pub name: String,
    /// Category that determines stocking limit and demand range.
    pub category: Category,
    /// Price charged per unit sold.
    pub unit_price: Decimal,
    /// Replenishment cost per unit stocked.
    pub unit_cost: Decimal,
}

/// Ordered item catalog. Catalog order fixes the order of demand draws.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Rules per category; every category used by an item must be present.
    pub rules: BTreeMap<Category, CategoryRules>,
    /// Items in presentation order.
    pub items: Vec<ItemType>,
}

impl Catalog {
    /// Look up an item by name.
    pub fn item(&self, name: &str) -> Option<&ItemType> {
        self.items.iter().find(|i| i.name == name)
    }

    /// Rules for a category.
    pub fn rules_for(&self, category: Category) -> Option<&CategoryRules> {
        self.rules.get(&category)
    }

    /// Items of one category, in catalog order.
    pub fn items_in(&self, category: Category) -> impl Iterator<Item = &ItemType> {
        self.items.iter().filter(move |i| i.category == category)
    }
}

/// Weather conditions drawn once per day.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    #[default]
    Sunny,
    Rainy,
    Cold,
    Festive,
}

impl Weather {
    /// Every weather value, in table order.
    pub const ALL: [Weather; 4] = [Self::Sunny, Self::Rainy, Self::Cold, Self::Festive];

    /// Human-readable label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sunny => "Sunny",
            Self::Rainy => "Rainy",
            Self::Cold => "Cold",
            Self::Festive => "Festive",
        }
    }
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Signed demand modifier range in percent, normalized so `low <= high`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactRange {
    low: i32,
    high: i32,
}

impl ImpactRange {
    /// Build a range from two bounds given in either order.
    pub fn new(a: i32, b: i32) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    /// Normalize a stored range. Anything other than a pair is malformed.
    pub fn from_stored(stored: &[i32]) -> Option<Self> {
        match stored {
            [a, b] => Some(Self::new(*a, *b)),
            _ => None,
        }
    }

    /// Lower bound, inclusive.
    pub const fn low(self) -> i32 {
        self.low
    }

    /// Upper bound, inclusive.
    pub const fn high(self) -> i32 {
        self.high
    }

    /// A zero-width range has exactly one possible impact.
    pub const fn is_fixed(self) -> bool {
        self.low == self.high
    }

    /// Whether `impact` lies within the bounds.
    pub const fn contains(self, impact: i32) -> bool {
        self.low <= impact && impact <= self.high
    }
}

/// One entry of a location's event table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationEvent {
    /// What happened, e.g. "Festival Nearby (Higher Demand)".
    pub description: String,
    /// Stored impact bounds in percent; expected to be a pair, possibly reversed.
    pub impact: Vec<i32>,
}

impl LocationEvent {
    /// Normalized impact range, or `InvalidImpactRange` when the stored value is not a pair.
    pub fn impact_range(&self) -> Result<ImpactRange, ValidationError> {
        ImpactRange::from_stored(&self.impact).ok_or_else(|| ValidationError::InvalidImpactRange {
            event: self.description.clone(),
            stored: self.impact.clone(),
        })
    }
}

/// A market location the cart can operate from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Display name, unique within the scenario.
    pub name: String,
    /// Events that may happen here on a given day (uniform draw).
    pub events: Vec<LocationEvent>,
}

/// Which locations draw an event on a given day.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventScope {
    /// Only the morning/evening locations chosen in the day's decision.
    #[default]
    SelectedLocations,
    /// Every configured location.
    AllLocations,
    /// `count` distinct locations sampled without replacement.
    RandomLocations { count: usize },
}

/// When the replenishment cost is charged against cash.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchasePolicy {
    /// Charged before selling; a purchase above the cash balance is rejected.
    #[default]
    Upfront,
    /// Settled with the day's revenue; the balance may go negative, which
    /// blocks replenishment on later days.
    Deferred,
}

const fn default_max_locations() -> usize {
    2
}

/// Session parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Cash at the start of day 1.
    pub initial_cash: Decimal,
    /// Number of simulated days before the game ends.
    pub horizon_days: u32,
    /// Wall-clock session limit; `None` disables the countdown.
    #[serde(default)]
    pub countdown_seconds: Option<u64>,
    /// Seed for deterministic RNG.
    pub rng_seed: u64,
    /// Most locations a decision may select (morning + evening).
    #[serde(default = "default_max_locations")]
    pub max_locations: usize,
    /// Which locations draw an event each day.
    #[serde(default)]
    pub event_scope: EventScope,
    /// When replenishment is charged.
    #[serde(default)]
    pub purchase_policy: PurchasePolicy,
}

/// Everything a session is parameterized by.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Session parameters.
    pub config: SimConfig,
    /// Items and per-category rules.
    pub catalog: Catalog,
    /// Weather values participating in the daily uniform draw.
    pub weather: Vec<Weather>,
    /// Locations and their event tables.
    pub locations: Vec<Location>,
}

impl Scenario {
    /// Parse and validate a YAML scenario.
    pub fn from_yaml_str(text: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = serde_yaml::from_str(text)?;
        validate_scenario(&scenario)?;
        Ok(scenario)
    }

    /// Read, parse and validate a YAML scenario file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let scenario = Self::from_yaml_str(&text)?;
        debug!(
            path = %path.as_ref().display(),
            items = scenario.catalog.items.len(),
            locations = scenario.locations.len(),
            "loaded scenario"
        );
        Ok(scenario)
    }

    /// The scenario shipped with the game.
    pub fn builtin() -> Result<Self, ScenarioError> {
        Self::from_yaml_str(BUILTIN_SCENARIO)
    }

    pub fn location(&self, name: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.name == name)
    }

    /// Events whose stored impact range cannot be normalized.
    pub fn malformed_impacts(&self) -> Vec<ValidationError> {
        self.locations
            .iter()
            .flat_map(|l| l.events.iter())
            .filter_map(|e| e.impact_range().err())
            .collect()
    }
}

/// Errors raised while loading a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("scenario parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Validation errors for domain invariants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A table that must be non-empty has no entries.
    #[error("{0} table is empty")]
    EmptyTable(&'static str),
    /// A location has no events to draw from.
    #[error("location {0} has no events")]
    NoEvents(String),
    #[error("duplicate item: {0}")]
    DuplicateItem(String),
    #[error("duplicate location: {0}")]
    DuplicateLocation(String),
    #[error("unknown item: {0}")]
    UnknownItem(String),
    #[error("unknown location: {0}")]
    UnknownLocation(String),
    /// An item's category has no rules in the catalog.
    #[error("no rules for category {0}")]
    MissingRules(Category),
    /// Demand range must satisfy low <= high.
    #[error("invalid demand range for category {0}")]
    InvalidDemandRange(Category),
    /// Price, cost or cash must be non-negative.
    #[error("negative monetary value for {0}")]
    NegativeMoney(String),
    /// Price, cost or cash above [`MAX_MONEY`].
    #[error("monetary value for {0} exceeds {max}", max = MAX_MONEY)]
    MoneyAboveLimit(String),
    /// Stocking limit or demand bound above [`MAX_UNITS`].
    #[error("unit counts for category {0} exceed {max}", max = MAX_UNITS)]
    UnitsAboveLimit(Category),
    /// An impact bound outside `±MAX_IMPACT_PERCENT`.
    #[error("event {event:?} has impact {impact}% outside ±{max}%", max = MAX_IMPACT_PERCENT)]
    ImpactOutOfBounds { event: String, impact: i32 },
    #[error("horizon must be at least one day")]
    NonPositiveHorizon,
    #[error("at least one location must be selectable")]
    NoSelectableLocations,
    #[error("random event scope needs 1..={available} locations, got {count}")]
    InvalidEventScope { count: usize, available: usize },
    #[error("{item}: quantity {quantity} exceeds limit {max}")]
    QuantityAboveLimit { item: String, quantity: u32, max: u32 },
    #[error("too many locations selected: {selected} > {max}")]
    TooManyLocations { selected: usize, max: usize },
    /// Stored impact range is not a two-element pair.
    #[error("event {event:?} has malformed impact range {stored:?}")]
    InvalidImpactRange { event: String, stored: Vec<i32> },
}

/// Validate the item catalog.
pub fn validate_catalog(catalog: &Catalog) -> Result<(), ValidationError> {
    if catalog.items.is_empty() {
        return Err(ValidationError::EmptyTable("item"));
    }
    for (category, rules) in &catalog.rules {
        if rules.demand_low > rules.demand_high {
            return Err(ValidationError::InvalidDemandRange(*category));
        }
        if rules.demand_high > MAX_UNITS || rules.max_quantity > MAX_UNITS {
            return Err(ValidationError::UnitsAboveLimit(*category));
        }
    }
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for item in &catalog.items {
        if !names.insert(item.name.as_str()) {
            return Err(ValidationError::DuplicateItem(item.name.clone()));
        }
        if catalog.rules_for(item.category).is_none() {
            return Err(ValidationError::MissingRules(item.category));
        }
        if item.unit_price < Decimal::ZERO || item.unit_cost < Decimal::ZERO {
            return Err(ValidationError::NegativeMoney(item.name.clone()));
        }
        if item.unit_price > MAX_MONEY || item.unit_cost > MAX_MONEY {
            return Err(ValidationError::MoneyAboveLimit(item.name.clone()));
        }
    }
    Ok(())
}

/// Validate a scenario: non-empty tables, unique names and sane config.
///
/// Malformed impact ranges are not rejected here; the simulator treats them
/// as a neutral impact and flags them when the session starts. Impact bounds
/// beyond `±MAX_IMPACT_PERCENT` are rejected whatever their shape.
pub fn validate_scenario(scenario: &Scenario) -> Result<(), ValidationError> {
    validate_catalog(&scenario.catalog)?;
    if scenario.weather.is_empty() {
        return Err(ValidationError::EmptyTable("weather"));
    }
    if scenario.locations.is_empty() {
        return Err(ValidationError::EmptyTable("location"));
    }
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for location in &scenario.locations {
        if !names.insert(location.name.as_str()) {
            return Err(ValidationError::DuplicateLocation(location.name.clone()));
        }
        if location.events.is_empty() {
            return Err(ValidationError::NoEvents(location.name.clone()));
        }
        for event in &location.events {
            if let Some(&impact) = event
                .impact
                .iter()
                .find(|i| !(-MAX_IMPACT_PERCENT..=MAX_IMPACT_PERCENT).contains(*i))
            {
                return Err(ValidationError::ImpactOutOfBounds {
                    event: event.description.clone(),
                    impact,
                });
            }
        }
    }

    let cfg = &scenario.config;
    if cfg.horizon_days == 0 {
        return Err(ValidationError::NonPositiveHorizon);
    }
    if cfg.initial_cash < Decimal::ZERO {
        return Err(ValidationError::NegativeMoney("initial cash".to_string()));
    }
    if cfg.initial_cash > MAX_MONEY {
        return Err(ValidationError::MoneyAboveLimit("initial cash".to_string()));
    }
    if cfg.max_locations == 0 {
        return Err(ValidationError::NoSelectableLocations);
    }
    if let EventScope::RandomLocations { count } = cfg.event_scope {
        let available = scenario.locations.len();
        if count == 0 || count > available {
            return Err(ValidationError::InvalidEventScope { count, available });
        }
    }
    Ok(())
}

/// The player's stocking choice for one day.
///
/// Built fresh each day and consumed by the simulator. Items not mentioned
/// are stocked at zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDecision {
    quantities: BTreeMap<String, u32>,
    locations: Vec<String>,
}

impl InventoryDecision {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the replenishment quantity for an item, checking the category limit.
    pub fn stock(
        &mut self,
        catalog: &Catalog,
        item: &str,
        quantity: u32,
    ) -> Result<&mut Self, ValidationError> {
        let entry = catalog
            .item(item)
            .ok_or_else(|| ValidationError::UnknownItem(item.to_string()))?;
        let rules = catalog
            .rules_for(entry.category)
            .ok_or(ValidationError::MissingRules(entry.category))?;
        if quantity > rules.max_quantity {
            return Err(ValidationError::QuantityAboveLimit {
                item: item.to_string(),
                quantity,
                max: rules.max_quantity,
            });
        }
        self.quantities.insert(item.to_string(), quantity);
        Ok(self)
    }

    /// Add a location to today's route (morning first, then evening).
    pub fn visit(&mut self, scenario: &Scenario, location: &str) -> Result<&mut Self, ValidationError> {
        if scenario.location(location).is_none() {
            return Err(ValidationError::UnknownLocation(location.to_string()));
        }
        let max = scenario.config.max_locations;
        if self.locations.len() >= max {
            return Err(ValidationError::TooManyLocations {
                selected: self.locations.len() + 1,
                max,
            });
        }
        self.locations.push(location.to_string());
        Ok(self)
    }

    /// Re-check a decision against a scenario, e.g. after deserialization.
    pub fn validate(&self, scenario: &Scenario) -> Result<(), ValidationError> {
        let catalog = &scenario.catalog;
        for (name, &quantity) in &self.quantities {
            let item = catalog
                .item(name)
                .ok_or_else(|| ValidationError::UnknownItem(name.clone()))?;
            let rules = catalog
                .rules_for(item.category)
                .ok_or(ValidationError::MissingRules(item.category))?;
            if quantity > rules.max_quantity {
                return Err(ValidationError::QuantityAboveLimit {
                    item: name.clone(),
                    quantity,
                    max: rules.max_quantity,
                });
            }
        }
        if self.locations.len() > scenario.config.max_locations {
            return Err(ValidationError::TooManyLocations {
                selected: self.locations.len(),
                max: scenario.config.max_locations,
            });
        }
        for location in &self.locations {
            if scenario.location(location).is_none() {
                return Err(ValidationError::UnknownLocation(location.clone()));
            }
        }
        Ok(())
    }

    /// Quantity chosen for an item (zero when not stocked).
    pub fn quantity(&self, item: &str) -> u32 {
        self.quantities.get(item).copied().unwrap_or(0)
    }

    pub fn quantities(&self) -> &BTreeMap<String, u32> {
        &self.quantities
    }

    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    pub fn total_units(&self) -> u64 {
        self.quantities.values().map(|&q| u64::from(q)).sum()
    }
}

/// An event drawn for one location on one day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampledEvent {
    pub location: String,
    pub description: String,
    /// Signed demand modifier in percent.
    pub impact_percent: i32,
}

/// Weather and events for one day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConditions {
    pub weather: Weather,
    /// In location order of the draw.
    pub events: Vec<SampledEvent>,
}

impl MarketConditions {
    /// Conditions with no events, i.e. zero demand impact.
    pub fn calm(weather: Weather) -> Self {
        Self {
            weather,
            events: Vec::new(),
        }
    }

    pub fn impact_sum(&self) -> i64 {
        self.events.iter().map(|e| i64::from(e.impact_percent)).sum()
    }

    /// Mean impact percent over the day's events, zero when there are none.
    pub fn average_impact(&self) -> Decimal {
        if self.events.is_empty() {
            return Decimal::ZERO;
        }
        Decimal::from(self.impact_sum()) / Decimal::from(self.events.len() as u64)
    }

    /// One-line description, e.g. `Sunny | Tourist Spot: Festival Nearby (+25%)`.
    pub fn summary(&self) -> String {
        let mut out = self.weather.label().to_string();
        for e in &self.events {
            out.push_str(&format!(
                " | {}: {} ({:+}%)",
                e.location, e.description, e.impact_percent
            ));
        }
        out
    }
}

/// Outcome of one simulated day. Immutable once appended to the history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRecord {
    /// 1-based day number.
    pub day_index: u32,
    /// Units stocked per item.
    pub stocked: BTreeMap<String, u32>,
    /// Units sold per item (never above stocked).
    pub sold: BTreeMap<String, u32>,
    /// Units left unsold per item.
    pub wastage: BTreeMap<String, u32>,
    pub revenue: Decimal,
    /// Replenishment cost.
    pub cost: Decimal,
    pub market: MarketConditions,
}

impl DayRecord {
    pub fn profit(&self) -> Decimal {
        self.revenue - self.cost
    }

    pub fn units_sold(&self) -> u64 {
        self.sold.values().map(|&q| u64::from(q)).sum()
    }

    pub fn units_wasted(&self) -> u64 {
        self.wastage.values().map(|&q| u64::from(q)).sum()
    }
}
