//! Per-vessel resource book: ledgers plus the step's pending recipes.

use log::{debug, warn};

use crate::broker::Broker;
use crate::crew::CureTarget;
use crate::ledger::{CoherencyWarning, LedgerMap, ResourceLedger, SyncContext};
use crate::recipe::{execute_all, pass_limit, Recipe};
use crate::settings::SimSettings;
use crate::storage::{ResourceStorage, VesselId};

/// Outcome of one [`VesselResourceBook::sync`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub recipe_passes: usize,
    pub warnings: Vec<CoherencyWarning>,
}

#[derive(Debug, Clone)]
pub struct VesselResourceBook {
    vessel: VesselId,
    ledgers: LedgerMap,
    pending: Vec<Recipe>,
}

impl VesselResourceBook {
    pub fn new(vessel: VesselId) -> Self {
        Self {
            vessel,
            ledgers: LedgerMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn vessel(&self) -> VesselId {
        self.vessel
    }

    /// Get or create the ledger for `name`. A new ledger reads its amount
    /// and capacity at the next sync.
    pub fn ledger(&mut self, name: &str) -> &mut ResourceLedger {
        self.ledgers.entry(name)
    }

    /// Get or create the ledger for `name`, reading storage right away if
    /// the ledger is new so that amount and level are meaningful.
    pub fn resource<S>(&mut self, storage: &S, name: &str) -> &mut ResourceLedger
    where
        S: ResourceStorage + ?Sized,
    {
        let vessel = self.vessel;
        let ledger = self.ledgers.entry(name);
        if !ledger.is_observed() {
            let (amount, capacity) = storage.sum_amount_and_capacity(vessel, name);
            ledger.observe(amount, capacity);
        }
        ledger
    }

    pub fn get(&self, name: &str) -> Option<&ResourceLedger> {
        self.ledgers.get(name)
    }

    pub fn ledgers(&self) -> &LedgerMap {
        &self.ledgers
    }

    pub fn produce(&mut self, name: &str, quantity: f64, broker: &Broker) {
        self.ledgers.entry(name).produce(quantity, broker);
    }

    pub fn consume(&mut self, name: &str, quantity: f64, broker: &Broker) {
        self.ledgers.entry(name).consume(quantity, broker);
    }

    pub fn queue_recipe(&mut self, recipe: Recipe) {
        if !recipe.is_empty() {
            self.pending.push(recipe);
        }
    }

    pub fn pending_recipes(&self) -> &[Recipe] {
        &self.pending
    }

    /// Settle the step.
    ///
    /// Runs the pending recipes to a fixpoint, drops them, then syncs every
    /// ledger against `storage`.
    pub fn sync<S>(
        &mut self,
        storage: &mut S,
        crew: &mut dyn CureTarget,
        ctx: &SyncContext,
        settings: &SimSettings,
    ) -> SyncReport
    where
        S: ResourceStorage + ?Sized,
    {
        // recipes ration against amount, so new ledgers must be read first
        let names: Vec<String> = self
            .pending
            .iter()
            .flat_map(|r| r.resource_names())
            .map(str::to_string)
            .collect();
        for name in names {
            self.resource(&*storage, &name);
        }

        let mut report = SyncReport::default();
        if !self.pending.is_empty() {
            let max_passes = settings
                .max_recipe_passes
                .unwrap_or_else(|| pass_limit(self.pending.len()));
            report.recipe_passes =
                execute_all(&mut self.pending, &mut self.ledgers, crew, max_passes);
            debug!(
                "{}: {} recipes settled in {} passes",
                self.vessel,
                self.pending.len(),
                report.recipe_passes
            );
            self.pending.clear();
        }

        for ledger in self.ledgers.iter_mut() {
            if let Some(warning) = ledger.sync(storage, self.vessel, ctx, settings) {
                report.warnings.push(warning);
            }
        }
        if !report.warnings.is_empty() {
            warn!(
                "{}: {} resources flagged incoherent this step",
                self.vessel,
                report.warnings.len()
            );
        }
        report
    }
}
