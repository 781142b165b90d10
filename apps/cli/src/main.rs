#![deny(warnings)]

//! Headless CLI that plays a Tea Cart Tycoon session with fixed daily stock.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tea_core::{Category, InventoryDecision, Scenario};
use tea_runtime::{DayCycleSimulator, SimError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_TEA: u32 = 50;
const DEFAULT_SNACKS: u32 = 40;

#[derive(Debug, Default, PartialEq)]
struct Args {
    scenario: Option<String>,
    days: Option<u32>,
    seed: Option<u64>,
    tea: Option<u32>,
    snacks: Option<u32>,
    morning: Option<String>,
    evening: Option<String>,
    json: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(raw: I) -> Args {
    let mut args = Args::default();
    let mut it = raw.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--scenario" => args.scenario = it.next(),
            "--days" => args.days = it.next().and_then(|s| s.parse().ok()),
            "--seed" => args.seed = it.next().and_then(|s| s.parse().ok()),
            "--tea" => args.tea = it.next().and_then(|s| s.parse().ok()),
            "--snacks" => args.snacks = it.next().and_then(|s| s.parse().ok()),
            "--morning" => args.morning = it.next(),
            "--evening" => args.evening = it.next(),
            "--json" => args.json = true,
            _ => {}
        }
    }
    args
}

fn load_scenario(args: &Args) -> Result<Scenario> {
    let mut scenario = match &args.scenario {
        Some(path) => Scenario::from_path(path).with_context(|| format!("loading {path}"))?,
        None => Scenario::builtin().context("loading built-in scenario")?,
    };
    if let Some(days) = args.days {
        scenario.config.horizon_days = days;
    }
    if let Some(seed) = args.seed {
        scenario.config.rng_seed = seed;
    }
    Ok(scenario)
}

/// Morning and evening stops; defaults to the first two locations.
fn route(scenario: &Scenario, args: &Args) -> Vec<String> {
    let default_at = |i: usize| scenario.locations.get(i).map(|l| l.name.clone());
    [
        args.morning.clone().or_else(|| default_at(0)),
        args.evening.clone().or_else(|| default_at(1)),
    ]
    .into_iter()
    .flatten()
    .take(scenario.config.max_locations)
    .collect()
}

/// Stock every tea item with `tea` units and every snack with `snacks`,
/// capped at the category limit.
fn build_decision(scenario: &Scenario, stops: &[String], tea: u32, snacks: u32) -> Result<InventoryDecision> {
    let mut decision = InventoryDecision::new();
    let catalog = &scenario.catalog;
    for (category, wanted) in [(Category::Tea, tea), (Category::Snack, snacks)] {
        let max = catalog.rules_for(category).map_or(0, |r| r.max_quantity);
        for item in catalog.items_in(category) {
            decision.stock(catalog, &item.name, wanted.min(max))?;
        }
    }
    for stop in stops {
        decision.visit(scenario, stop)?;
    }
    Ok(decision)
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1));
    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_SHA"),
        built = env!("BUILD_DATE"),
        ?args,
        "starting tea-cart"
    );

    let scenario = load_scenario(&args)?;
    let stops = route(&scenario, &args);
    let mut tea = args.tea.unwrap_or(DEFAULT_TEA);
    let mut snacks = args.snacks.unwrap_or(DEFAULT_SNACKS);
    let mut sim = DayCycleSimulator::seeded(scenario)?;

    println!(
        "Tea Cart Tycoon | cash: ₹{} | days: {} | route: {}",
        sim.cash_balance(),
        sim.scenario().config.horizon_days,
        stops.join(" -> ")
    );

    while !sim.is_game_over() {
        let decision = build_decision(sim.scenario(), &stops, tea, snacks)?;
        let record = match sim.advance_day(&decision) {
            Ok(record) => record,
            Err(SimError::InsufficientCash { cost, cash }) => {
                warn!(%cost, %cash, "cutting today's stock in half");
                tea /= 2;
                snacks /= 2;
                continue;
            }
            Err(SimError::SessionEnded) => break,
            Err(other) => return Err(other.into()),
        };

        if args.json {
            println!("{}", serde_json::to_string(&record)?);
        } else {
            println!(
                "Day {} | {} | sold: {} | wasted: {} | revenue: ₹{} | cost: ₹{} | profit: ₹{} | cash: ₹{}",
                record.day_index,
                record.market.summary(),
                record.units_sold(),
                record.units_wasted(),
                record.revenue,
                record.cost,
                record.profit(),
                sim.cash_balance()
            );
            if let Some(left) = sim.remaining_time() {
                let secs = left.num_seconds();
                println!("  {} minutes {} seconds left", secs / 60, secs % 60);
            }
        }
    }

    let summary = sim.summary();
    if args.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        let margin = if summary.total_revenue.is_zero() {
            Decimal::ZERO
        } else {
            (summary.net_profit / summary.total_revenue * Decimal::ONE_HUNDRED).round_dp(1)
        };
        println!(
            "Game over | days: {} | revenue: ₹{} | cost: ₹{} | profit: ₹{} ({}%) | sold: {} | wasted: {} | final cash: ₹{}",
            summary.days_played,
            summary.total_revenue,
            summary.total_cost,
            summary.net_profit,
            margin,
            summary.units_sold,
            summary.units_wasted,
            summary.final_cash
        );
    }
    Ok(())
}
