//! Simulation engine - main entry point for running the simulation

use std::collections::BTreeSet;

use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use vesselsim_logic::background::{BackgroundDispatcher, BackgroundModule, VesselContext};
use vesselsim_logic::book::VesselResourceBook;
use vesselsim_logic::cache::ResourceCache;
use vesselsim_logic::ledger::{ResourceLedger, SyncContext};
use vesselsim_logic::rules::RuleSet;
use vesselsim_logic::settings::SimSettings;
use vesselsim_logic::storage::VesselId;

use crate::generation::{generate_vessel, VesselTemplate};
use crate::host::ShipHost;

/// User-facing message raised during a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Universal time the message was raised at.
    pub time: f64,
    pub vessel: VesselId,
    pub message: String,
}

/// Outcome of stepping one vessel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub components: usize,
    pub recipe_passes: usize,
    pub warnings: usize,
}

/// Main simulation driver: owns the host world, the resource books and the
/// time warp state.
pub struct Simulation {
    /// ECS host holding every vessel
    pub host: ShipHost,
    cache: ResourceCache,
    settings: SimSettings,
    rules: RuleSet,
    dispatcher: BackgroundDispatcher,
    /// Universal time in seconds
    universal_time: f64,
    warp_rate: f64,
    /// Warp changed since the last step
    warp_blending: bool,
    /// Vessels whose next step is transitional
    unstable: BTreeSet<VesselId>,
    notifications: Vec<Notification>,
}

impl Simulation {
    pub fn new(settings: SimSettings, rules: RuleSet) -> Self {
        Self {
            host: ShipHost::new(),
            cache: ResourceCache::new(),
            settings,
            rules,
            dispatcher: BackgroundDispatcher::new(),
            universal_time: 0.0,
            warp_rate: 1.0,
            warp_blending: false,
            unstable: BTreeSet::new(),
            notifications: Vec::new(),
        }
    }

    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Register a third-party background module by name.
    pub fn register_module(&mut self, name: impl Into<String>, module: Box<dyn BackgroundModule>) {
        self.dispatcher.register(name, module);
    }

    // ── Vessel lifecycle ───────────────────────────────────────────────

    pub fn spawn(&mut self, template: &VesselTemplate, rng: &mut impl Rng, jitter: f64) -> VesselId {
        generate_vessel(&mut self.host, template, rng, jitter)
    }

    pub fn destroy_vessel(&mut self, vessel: VesselId) -> bool {
        self.cache.purge(vessel);
        self.unstable.remove(&vessel);
        let removed = self.host.despawn_vessel(vessel);
        if removed {
            info!("{} destroyed", vessel);
        }
        removed
    }

    /// Dock `from` onto `into`. Both books are rebuilt from storage.
    pub fn merge_vessels(&mut self, into: VesselId, from: VesselId) -> bool {
        if !self.host.merge(into, from) {
            return false;
        }
        self.cache.purge(into);
        self.cache.purge(from);
        self.unstable.remove(&from);
        self.unstable.insert(into);
        true
    }

    pub fn set_loaded(&mut self, vessel: VesselId, loaded: bool) -> bool {
        if !self.host.set_loaded(vessel, loaded) {
            return false;
        }
        self.cache.purge(vessel);
        self.unstable.insert(vessel);
        info!("{} {}", vessel, if loaded { "loaded" } else { "unloaded" });
        true
    }

    /// Every book is dropped and every vessel's next step is transitional.
    pub fn change_scene(&mut self) {
        self.cache.clear();
        self.unstable.extend(self.host.vessel_ids());
        info!("Scene change: {} vessels reset", self.host.vessel_count());
    }

    // ── Time ───────────────────────────────────────────────────────────

    /// Change time acceleration. The next step is treated as a blend.
    pub fn set_warp_rate(&mut self, rate: f64) {
        let rate = rate.max(1.0);
        if (rate - self.warp_rate).abs() > f64::EPSILON {
            self.warp_rate = rate;
            self.warp_blending = true;
        }
    }

    pub fn warp_rate(&self) -> f64 {
        self.warp_rate
    }

    pub fn universal_time(&self) -> f64 {
        self.universal_time
    }

    /// Advance universal time by `elapsed_s` and step every vessel.
    pub fn update(&mut self, elapsed_s: f64) -> StepReport {
        let mut total = StepReport::default();
        if elapsed_s <= 0.0 {
            return total;
        }
        self.universal_time += elapsed_s;

        // a warp drop during this step marks the next one as blending
        let blending = std::mem::replace(&mut self.warp_blending, false);
        let unstable = std::mem::take(&mut self.unstable);

        for vessel in self.host.vessel_ids() {
            let transitional = blending || unstable.contains(&vessel);
            let report = self.step_vessel(vessel, elapsed_s, transitional);
            total.components += report.components;
            total.recipe_passes += report.recipe_passes;
            total.warnings += report.warnings;
        }
        total
    }

    /// One step for one vessel: crew rules, component adapters, then sync.
    fn step_vessel(&mut self, vessel: VesselId, elapsed_s: f64, transitional: bool) -> StepReport {
        let Some(info) = self.host.vessel(vessel) else {
            return StepReport::default();
        };
        let environment = self.host.environment(vessel);
        let mut crew = self.host.take_crew(vessel);
        let book = self.cache.get(vessel);

        self.rules.execute(book, &self.host, &mut crew, elapsed_s);

        let ctx = VesselContext {
            vessel,
            now: self.universal_time,
            mission_time: info.mission_time(self.universal_time),
            crew: &crew,
            environment,
            settings: &self.settings,
        };
        let components = self.dispatcher.update(&mut self.host, book, &ctx, elapsed_s);

        let mut sync = if info.loaded {
            SyncContext::loaded(elapsed_s, self.warp_rate)
        } else {
            SyncContext::background(elapsed_s)
        };
        if transitional {
            sync = sync.unstable();
        }
        let report = book.sync(&mut self.host, &mut crew, &sync, &self.settings);
        self.host.restore_crew(vessel, crew);

        for warning in &report.warnings {
            self.notifications.push(Notification {
                time: self.universal_time,
                vessel,
                message: warning.message(Some(&info.name)),
            });
            if self.warp_rate > warning.max_warp_rate {
                info!(
                    "Warp dropped from {} to {} after incoherent {} on '{}'",
                    self.warp_rate, warning.max_warp_rate, warning.resource, info.name
                );
                self.warp_rate = warning.max_warp_rate;
                self.warp_blending = true;
            }
        }

        debug!(
            "{}: {} components, {} recipe passes",
            vessel, components, report.recipe_passes
        );
        StepReport {
            components,
            recipe_passes: report.recipe_passes,
            warnings: report.warnings.len(),
        }
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn book(&self, vessel: VesselId) -> Option<&VesselResourceBook> {
        self.cache.peek(vessel)
    }

    pub fn ledger(&self, vessel: VesselId, resource: &str) -> Option<&ResourceLedger> {
        self.cache.peek(vessel)?.get(resource)
    }

    /// Seconds until `resource` runs out on `vessel` given its crew and the
    /// periodic rules, or `f64::INFINITY` if it never does.
    pub fn depletion(&self, vessel: VesselId, resource: &str) -> Option<f64> {
        let ledger = self.ledger(vessel, resource)?;
        let consumers = self.host.crew(vessel).iter().filter(|c| !c.disabled).count();
        Some(ledger.depletion(consumers, &self.rules))
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(SimSettings::default(), RuleSet::default())
    }
}
