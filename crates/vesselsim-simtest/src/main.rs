//! VesselSim Headless Simulation Harness
//!
//! Validates the resource engine end-to-end against the fixture vessels in
//! `data/`. Runs entirely in-process: no rendering, no host game.
//!
//! Usage:
//!   cargo run -p vesselsim-simtest
//!   cargo run -p vesselsim-simtest -- --verbose

use log::{Level, LevelFilter, Metadata, Record};
use rand::rngs::StdRng;
use rand::SeedableRng;
use vesselsim_core::generation::{load_templates, VesselTemplate};
use vesselsim_core::prelude::*;
use vesselsim_logic::background::{
    CommandModule, ComponentCatalog, Environment, ModuleKind, ModuleState,
    RadioisotopeGeneratorModule, SimulatedComponent,
};
use vesselsim_logic::broker::BrokerCategory;
use vesselsim_logic::rules::RuleSet;
use vesselsim_logic::settings::SimSettings;
use vesselsim_logic::storage::{Container, ResourceStorage, VesselId};

// ── Fixtures (same JSON the host loads) ─────────────────────────────────
const SETTINGS_JSON: &str = include_str!("../../../data/settings.json");
const RULES_JSON: &str = include_str!("../../../data/rules.json");
const VESSELS_JSON: &str = include_str!("../../../data/vessels.json");

const DAY_S: f64 = 86_400.0;
const EC: &str = "ElectricCharge";

// ── Logging ─────────────────────────────────────────────────────────────

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

struct Fixtures {
    settings: SimSettings,
    rules: RuleSet,
    templates: Vec<VesselTemplate>,
}

fn main() {
    let verbose = std::env::args().any(|a| a == "--verbose");
    if verbose && log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
    println!("=== VesselSim Simulation Harness ===\n");

    let mut results = Vec::new();

    // 1. Fixture parsing
    let fixtures = match load_fixtures(&mut results) {
        Some(f) => f,
        None => return summarize(&results, verbose),
    };

    // 2. Fleet day at one-minute steps
    results.extend(validate_fleet_day(&fixtures, verbose));

    // 3. Component behavior on the fixture vessels
    results.extend(validate_components(&fixtures, verbose));

    // 4. Step size independence
    results.extend(validate_timestep_independence(verbose));

    // 5. Coherency guard
    results.extend(validate_coherency_guard(verbose));

    // 6. Vessel lifecycle
    results.extend(validate_lifecycle(&fixtures, verbose));

    summarize(&results, verbose);
}

fn summarize(results: &[TestResult], verbose: bool) {
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

fn check(name: &str, passed: bool, detail: String) -> TestResult {
    TestResult {
        name: name.into(),
        passed,
        detail,
    }
}

/// Spawn every template into a fresh simulation and run it for `duration_s`.
fn run_fleet(fixtures: &Fixtures, step_s: f64, duration_s: f64) -> (Simulation, Vec<VesselId>) {
    let mut sim = Simulation::new(fixtures.settings.clone(), fixtures.rules.clone());
    let mut rng = StdRng::seed_from_u64(0);
    let ids = fixtures
        .templates
        .iter()
        .map(|t| sim.spawn(t, &mut rng, 0.0))
        .collect();
    let steps = (duration_s / step_s).round() as usize;
    for _ in 0..steps {
        sim.update(step_s);
    }
    (sim, ids)
}

fn vessel_named(sim: &Simulation, ids: &[VesselId], name: &str) -> Option<VesselId> {
    ids.iter()
        .copied()
        .find(|&id| sim.host.vessel(id).map(|v| v.name == name).unwrap_or(false))
}

fn component_of(sim: &Simulation, vessel: VesselId, tag: &str) -> Option<SimulatedComponent> {
    sim.host
        .simulated_components(vessel)
        .into_iter()
        .find(|c| c.kind.tag() == tag)
}

// ── 1. Fixtures ─────────────────────────────────────────────────────────

fn load_fixtures(results: &mut Vec<TestResult>) -> Option<Fixtures> {
    println!("--- Fixtures ---");

    let settings = SimSettings::from_json(SETTINGS_JSON);
    results.push(check(
        "settings_parse",
        settings.is_ok(),
        match &settings {
            Ok(s) => format!("guard armed above x{}", s.coherency_warp_rate),
            Err(e) => e.to_string(),
        },
    ));

    let rules = RuleSet::from_json(RULES_JSON);
    results.push(check(
        "rules_parse",
        rules.as_ref().map(|r| !r.is_empty()).unwrap_or(false),
        match &rules {
            Ok(r) => format!("{} rules loaded", r.rules().len()),
            Err(e) => e.to_string(),
        },
    ));

    let templates = load_templates(VESSELS_JSON);
    results.push(check(
        "vessels_parse",
        templates.as_ref().map(|t| t.len() >= 4).unwrap_or(false),
        match &templates {
            Ok(t) => format!("{} vessel templates loaded", t.len()),
            Err(e) => e.to_string(),
        },
    ));

    Some(Fixtures {
        settings: settings.ok()?,
        rules: rules.ok()?,
        templates: templates.ok()?,
    })
}

// ── 2. Fleet Day ────────────────────────────────────────────────────────

fn validate_fleet_day(fixtures: &Fixtures, verbose: bool) -> Vec<TestResult> {
    println!("--- Fleet Day ---");
    let mut results = Vec::new();
    let (sim, ids) = run_fleet(fixtures, 60.0, DAY_S);

    let mut violations = Vec::new();
    for &id in &ids {
        for c in sim.host.containers(id) {
            if !c.amount.is_finite() || c.amount < -1e-9 || c.amount > c.capacity + 1e-9 {
                violations.push(format!("{} {} = {}/{}", id, c.resource, c.amount, c.capacity));
            }
        }
    }
    results.push(check(
        "containers_within_bounds",
        violations.is_empty(),
        if violations.is_empty() {
            format!("{} vessels, every container in [0, capacity]", ids.len())
        } else {
            violations.join("; ")
        },
    ));

    let mut ledger_violations = 0;
    for &id in &ids {
        if let Some(book) = sim.book(id) {
            for ledger in book.ledgers().iter() {
                if verbose {
                    println!(
                        "    {} {:<16} {:>10.3}/{:<10.3} rate {:+.6}/s",
                        id,
                        ledger.name(),
                        ledger.amount(),
                        ledger.capacity(),
                        ledger.average_rate()
                    );
                }
                if ledger.amount() < -1e-9 || ledger.amount() > ledger.capacity() + 1e-9 {
                    ledger_violations += 1;
                }
            }
        }
    }
    results.push(check(
        "ledgers_within_bounds",
        ledger_violations == 0,
        format!("{} ledgers out of bounds", ledger_violations),
    ));

    if let Some(station) = vessel_named(&sim, &ids, "Kestrel Station") {
        let crew = sim.host.crew(station);
        let hungry = crew.iter().filter(|c| c.problem("eating") > 0.0).count();
        results.push(check(
            "fed_crew_stay_healthy",
            !crew.is_empty() && hungry == 0,
            format!("{} crew, {} hungry", crew.len(), hungry),
        ));

        let food = sim.depletion(station, "Food");
        results.push(check(
            "food_depletion_estimate",
            food.map(|t| t.is_finite() && t > 0.0).unwrap_or(false),
            format!("food lasts {:?} s", food),
        ));
    }

    results
}

// ── 3. Components ───────────────────────────────────────────────────────

fn validate_components(fixtures: &Fixtures, _verbose: bool) -> Vec<TestResult> {
    println!("--- Components ---");
    let mut results = Vec::new();
    let (sim, ids) = run_fleet(fixtures, 60.0, DAY_S);

    if let Some(station) = vessel_named(&sim, &ids, "Kestrel Station") {
        let growth = component_of(&sim, station, "greenhouse")
            .map(|c| c.state.get_f64("growth", 0.0))
            .unwrap_or(0.0);
        results.push(check(
            "greenhouse_grows",
            growth > 0.0 && growth <= 1.0,
            format!("growth {:.3} after one day", growth),
        ));

        let solar: f64 = sim
            .ledger(station, EC)
            .map(|l| {
                l.broker_rates()
                    .iter()
                    .filter(|b| b.broker.category == BrokerCategory::SolarPanel)
                    .map(|b| b.rate)
                    .sum()
            })
            .unwrap_or(0.0);
        results.push(check(
            "solar_panels_charge_at_home_flux",
            (solar - 2.0).abs() < 1e-6,
            format!("solar panels deliver {:.4} EC/s", solar),
        ));
    }

    if let Some(tanker) = vessel_named(&sim, &ids, "Cryo Tanker") {
        let (hydrogen, _) = sim.host.sum_amount_and_capacity(tanker, "LqdHydrogen");
        let (charge, _) = sim.host.sum_amount_and_capacity(tanker, EC);
        results.push(check(
            "cryo_boils_off_without_charge",
            charge <= 1e-9 && hydrogen < 1000.0 && hydrogen > 850.0,
            format!("EC {:.3}, LqdHydrogen {:.3}", charge, hydrogen),
        ));
    }

    if let Some(rig) = vessel_named(&sim, &ids, "Prospector") {
        let mass = component_of(&sim, rig, "asteroid_drill")
            .map(|c| c.state.get_f64("current_mass", 0.0))
            .unwrap_or(0.0);
        results.push(check(
            "asteroid_mass_drains",
            mass < 1000.0 && mass > 100.0,
            format!("asteroid mass {:.3}", mass),
        ));

        let stamp = component_of(&sim, rig, "drill")
            .map(|c| c.state.get_f64("last_update_time", 0.0))
            .unwrap_or(0.0);
        results.push(check(
            "drill_stamps_update_time",
            (stamp - sim.universal_time()).abs() < 1e-6,
            format!("last_update_time {} at UT {}", stamp, sim.universal_time()),
        ));

        let (ore, _) = sim.host.sum_amount_and_capacity(rig, "Ore");
        let (metal, _) = sim.host.sum_amount_and_capacity(rig, "Metal");
        results.push(check(
            "mining_chain_produces",
            ore > 0.0 && metal > 0.0,
            format!("Ore {:.3}, Metal {:.3}", ore, metal),
        ));
    }

    let rtg = RadioisotopeGeneratorModule {
        base_power: 0.2,
        half_life_years: 10.0,
    };
    let decayed = rtg.power_at(10.0);
    results.push(check(
        "rtg_half_life",
        (decayed - 0.1).abs() < 1e-12,
        format!("{:.4} EC/s after one half-life", decayed),
    ));

    results
}

// ── 4. Step Size ────────────────────────────────────────────────────────

fn drain_probe(sim: &mut Simulation) -> VesselId {
    let v = sim.host.spawn_vessel("Drain", 0.0, Environment::default());
    let core = ModuleSlot {
        kind: ModuleKind::Command(CommandModule {
            ec_rate: 0.01,
            minimum_crew: 0,
        }),
        state: ModuleState::new(),
    };
    sim.host
        .add_part(v, "core", 0, vec![Container::new(EC, 1000.0, 1000.0)], vec![core]);
    v
}

fn validate_timestep_independence(_verbose: bool) -> Vec<TestResult> {
    println!("--- Step Size ---");
    let mut results = Vec::new();

    let mut remaining = Vec::new();
    for step_s in [1.0, 60.0, 3600.0, DAY_S] {
        let mut sim = Simulation::default();
        let v = drain_probe(&mut sim);
        let steps = (DAY_S / step_s) as usize;
        for _ in 0..steps {
            sim.update(step_s);
        }
        remaining.push((step_s, sim.host.sum_amount_and_capacity(v, EC).0));
    }

    let spread = remaining
        .iter()
        .map(|(_, ec)| (ec - 136.0).abs())
        .fold(0.0, f64::max);
    results.push(check(
        "continuous_drain_step_independent",
        spread < 1e-6,
        format!("{:?}", remaining),
    ));

    results
}

// ── 5. Coherency Guard ──────────────────────────────────────────────────

fn validate_coherency_guard(_verbose: bool) -> Vec<TestResult> {
    println!("--- Coherency Guard ---");
    let mut results = Vec::new();

    let mut sim = Simulation::default();
    let v = drain_probe(&mut sim);
    sim.host.apply_delta(v, EC, -500.0);
    sim.set_loaded(v, true);
    sim.set_warp_rate(100_000.0);
    sim.update(10.0);

    // a producer writing to storage behind the engine's back
    sim.host.apply_delta(v, EC, 50.0);
    sim.update(10.0);

    let notes = sim.take_notifications();
    results.push(check(
        "guard_drops_warp",
        sim.warp_rate() == sim.settings().coherency_warp_rate && notes.len() == 1,
        format!("warp x{}, {} notifications", sim.warp_rate(), notes.len()),
    ));

    sim.update(10.0);
    results.push(check(
        "guard_quiet_after_drop",
        sim.notifications().is_empty(),
        format!("{} new notifications", sim.notifications().len()),
    ));

    results
}

// ── 6. Lifecycle ────────────────────────────────────────────────────────

fn validate_lifecycle(fixtures: &Fixtures, _verbose: bool) -> Vec<TestResult> {
    println!("--- Lifecycle ---");
    let mut results = Vec::new();
    let (mut sim, ids) = run_fleet(fixtures, 600.0, 3600.0);

    let before: f64 = ids
        .iter()
        .map(|&id| sim.host.sum_amount_and_capacity(id, EC).1)
        .sum();
    let (Some(station), Some(tanker)) = (
        vessel_named(&sim, &ids, "Kestrel Station"),
        vessel_named(&sim, &ids, "Cryo Tanker"),
    ) else {
        results.push(check("lifecycle_fixtures", false, "fixture vessels missing".into()));
        return results;
    };

    let merged = sim.merge_vessels(station, tanker);
    sim.update(600.0);
    let after: f64 = sim
        .host
        .vessel_ids()
        .iter()
        .map(|&id| sim.host.sum_amount_and_capacity(id, EC).1)
        .sum();
    results.push(check(
        "docking_keeps_capacity",
        merged && (before - after).abs() < 1e-9 && sim.host.vessel_count() == ids.len() - 1,
        format!("EC capacity {} before, {} after", before, after),
    ));

    sim.change_scene();
    let rebuilt = sim.book(station).is_none();
    sim.update(600.0);
    results.push(check(
        "scene_change_rebuilds_books",
        rebuilt && sim.book(station).is_some(),
        "books cleared and rebuilt from storage".into(),
    ));

    let destroyed = sim.destroy_vessel(station);
    results.push(check(
        "destroy_purges_book",
        destroyed && sim.book(station).is_none() && !sim.host.contains(station),
        format!("{} vessels left", sim.host.vessel_count()),
    ));

    results
}
