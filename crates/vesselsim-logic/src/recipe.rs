//! Recipes - rationed input → output transformations.
//!
//! A recipe describes one step's worth of a transformation: "consume these
//! inputs, produce these outputs, apply these cures". Executing it finds the
//! largest fraction of the remaining work (`left`) that neither overdraws an
//! input nor overflows a non-dumping output, and records that fraction as
//! deferred flows on the ledgers.
//!
//! Recipes are single-step. Whatever is `left` when the book syncs is
//! dropped.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::broker::Broker;
use crate::crew::CureTarget;
use crate::ledger::LedgerMap;
use crate::EPSILON;

/// Role of an input in a combined (substitutable) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Combined {
    /// Preferred input; names the secondary that covers its shortfall.
    Primary(String),
    /// Substitute drawn from only when the primary runs short.
    Secondary,
}

/// One input or output line of a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    /// Quantity per full execution. Always > EPSILON.
    pub quantity: f64,
    pub inv_quantity: f64,
    /// Output only: excess may be discarded instead of throttling.
    pub dump: bool,
    pub combined: Option<Combined>,
}

impl Entry {
    fn new(name: impl Into<String>, quantity: f64, dump: bool, combined: Option<Combined>) -> Self {
        Self {
            name: name.into(),
            quantity,
            inv_quantity: 1.0 / quantity,
            dump,
            combined,
        }
    }
}

/// Reduction of a crew rule's accumulated problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cure {
    pub rule: String,
    pub quantity: f64,
    /// Only crew assigned to this sickbay tag are cured.
    pub sickbay: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    broker: Broker,
    inputs: Vec<Entry>,
    outputs: Vec<Entry>,
    cures: Vec<Cure>,
    left: f64,
}

impl Recipe {
    pub fn new(broker: Broker) -> Self {
        Self {
            broker,
            inputs: Vec::new(),
            outputs: Vec::new(),
            cures: Vec::new(),
            left: 1.0,
        }
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn inputs(&self) -> &[Entry] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Entry] {
        &self.outputs
    }

    pub fn cures(&self) -> &[Cure] {
        &self.cures
    }

    /// Fraction of the recipe still to execute, in `[0, 1]`.
    pub fn left(&self) -> f64 {
        self.left
    }

    pub fn is_done(&self) -> bool {
        self.left <= EPSILON
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty() && self.cures.is_empty()
    }

    /// Every resource the recipe touches.
    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .map(|e| e.name.as_str())
    }

    pub fn add_input(&mut self, name: impl Into<String>, quantity: f64) {
        if quantity > EPSILON {
            self.inputs.push(Entry::new(name, quantity, false, None));
        }
    }

    /// Add a primary input whose shortfall may be covered by `secondary`,
    /// which must also be added with [`Recipe::add_secondary_input`].
    pub fn add_combined_input(
        &mut self,
        name: impl Into<String>,
        quantity: f64,
        secondary: impl Into<String>,
    ) {
        if quantity > EPSILON {
            let combined = Combined::Primary(secondary.into());
            self.inputs
                .push(Entry::new(name, quantity, false, Some(combined)));
        }
    }

    pub fn add_secondary_input(&mut self, name: impl Into<String>, quantity: f64) {
        if quantity > EPSILON {
            self.inputs
                .push(Entry::new(name, quantity, false, Some(Combined::Secondary)));
        }
    }

    pub fn add_output(&mut self, name: impl Into<String>, quantity: f64, dump: bool) {
        if quantity > EPSILON {
            self.outputs.push(Entry::new(name, quantity, dump, None));
        }
    }

    pub fn add_cure(&mut self, rule: impl Into<String>, quantity: f64, sickbay: impl Into<String>) {
        if quantity > EPSILON {
            self.cures.push(Cure {
                rule: rule.into(),
                quantity,
                sickbay: sickbay.into(),
            });
        }
    }

    /// Secondary entry paired with the primary `entry`, matched by name.
    fn secondary_of(&self, entry: &Entry) -> Option<&Entry> {
        match &entry.combined {
            Some(Combined::Primary(secondary)) => self
                .inputs
                .iter()
                .find(|e| &e.name == secondary && e.combined == Some(Combined::Secondary)),
            _ => None,
        }
    }

    /// A secondary is handled through its primary. One that no primary
    /// refers to behaves as a plain input.
    fn is_paired_secondary(&self, entry: &Entry) -> bool {
        entry.combined == Some(Combined::Secondary)
            && self.inputs.iter().any(
                |e| matches!(&e.combined, Some(Combined::Primary(s)) if *s == entry.name),
            )
    }

    /// Largest executable fraction allowed by the inputs.
    fn worst_input(&self, ledgers: &mut LedgerMap) -> f64 {
        let mut worst = self.left;
        for e in &self.inputs {
            if self.is_paired_secondary(e) {
                continue;
            }
            let available = ledgers.entry(&e.name).available();
            match self.secondary_of(e) {
                Some(sec) => {
                    let need = e.quantity + sec.quantity;
                    let primary_only = (available / need).clamp(0.0, worst);
                    if primary_only < worst {
                        let pooled = available.max(0.0) + ledgers.entry(&sec.name).available().max(0.0);
                        worst = (pooled / need).clamp(0.0, worst);
                    }
                }
                None => worst = (available * e.inv_quantity).clamp(0.0, worst),
            }
        }
        worst
    }

    /// Largest executable fraction allowed by non-dumping outputs.
    /// Recipes without inputs are not limited.
    fn worst_output(&self, ledgers: &mut LedgerMap) -> f64 {
        let mut worst = self.left;
        if self.inputs.is_empty() {
            return worst;
        }
        for e in self.outputs.iter().filter(|e| !e.dump) {
            let headroom = ledgers.entry(&e.name).headroom();
            worst = (headroom * e.inv_quantity).clamp(0.0, worst);
        }
        worst
    }

    /// Execute as much of the remaining recipe as the ledgers allow.
    ///
    /// Returns true if any progress was made.
    pub fn execute(&mut self, ledgers: &mut LedgerMap, cures: &mut dyn CureTarget) -> bool {
        if self.is_done() {
            return false;
        }
        let ratio = self.worst_input(ledgers).min(self.worst_output(ledgers));

        for e in &self.inputs {
            if self.is_paired_secondary(e) {
                continue;
            }
            match self.secondary_of(e) {
                Some(sec) => {
                    let need = (e.quantity + sec.quantity) * ratio;
                    let primary = ledgers.entry(&e.name);
                    let available = primary.available().max(0.0);
                    if available >= need {
                        primary.consume(need, &self.broker);
                    } else {
                        primary.consume(available, &self.broker);
                        ledgers
                            .entry(&sec.name)
                            .consume(need - available, &self.broker);
                    }
                }
                None => ledgers.entry(&e.name).consume(e.quantity * ratio, &self.broker),
            }
        }

        for e in &self.outputs {
            ledgers.entry(&e.name).produce(e.quantity * ratio, &self.broker);
        }

        for cure in &self.cures {
            cures.cure(&cure.rule, &cure.sickbay, cure.quantity * ratio);
        }

        self.left -= ratio;
        ratio > EPSILON
    }
}

/// Solver passes allowed per queued recipe before the solver gives up.
pub const MAX_PASSES_PER_RECIPE: usize = 1000;

/// Default pass limit for a queue of `recipes` recipes.
pub fn pass_limit(recipes: usize) -> usize {
    recipes.max(1).saturating_mul(MAX_PASSES_PER_RECIPE)
}

/// Execute `recipes` repeatedly until a full pass makes no progress.
///
/// Chains through a small non-dumping buffer advance a little on every
/// pass, so the loop only stops early when `max_passes` is reached.
/// Returns the number of passes run.
pub fn execute_all(
    recipes: &mut [Recipe],
    ledgers: &mut LedgerMap,
    cures: &mut dyn CureTarget,
    max_passes: usize,
) -> usize {
    let mut passes = 0;
    loop {
        if passes >= max_passes {
            debug!(
                "recipe solver stopped after {} passes with {} recipes unfinished",
                passes,
                recipes.iter().filter(|r| !r.is_done()).count()
            );
            break;
        }
        passes += 1;

        let mut progress = false;
        for recipe in recipes.iter_mut().filter(|r| !r.is_done()) {
            progress |= recipe.execute(ledgers, cures);
        }
        if !progress {
            break;
        }
    }
    passes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crew::CrewMember;
    use crate::ledger::ResourceLedger;

    fn ledgers(entries: &[(&str, f64, f64)]) -> LedgerMap {
        let mut map = LedgerMap::new();
        for (name, amount, capacity) in entries {
            map.insert(ResourceLedger::with_amount(*name, *amount, *capacity));
        }
        map
    }

    fn deferred(map: &LedgerMap, name: &str) -> f64 {
        map.get(name).map(|l| l.deferred()).unwrap_or(0.0)
    }

    #[test]
    fn non_positive_entries_are_skipped() {
        let mut r = Recipe::new(Broker::OTHERS);
        r.add_input("Fuel", 0.0);
        r.add_output("Heat", -1.0, false);
        r.add_cure("stress", 0.0, "bay");
        assert!(r.is_empty());
    }

    #[test]
    fn output_headroom_limits_execution() {
        let mut map = ledgers(&[("Fuel", 4.0, 100.0), ("Heat", 0.0, 1.0)]);
        let mut r = Recipe::new(Broker::OTHERS);
        r.add_input("Fuel", 10.0);
        r.add_output("Heat", 5.0, false);
        assert!(r.execute(&mut map, &mut ()));
        assert!((deferred(&map, "Fuel") + 2.0).abs() < 1e-12);
        assert!((deferred(&map, "Heat") - 1.0).abs() < 1e-12);
        assert!((r.left() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn dump_outputs_do_not_throttle() {
        let mut map = ledgers(&[("Ore", 10.0, 10.0), ("Metal", 0.0, 1.0), ("Slag", 0.0, 0.0)]);
        let mut r = Recipe::new(Broker::OTHERS);
        r.add_input("Ore", 10.0);
        r.add_output("Metal", 1.0, false);
        r.add_output("Slag", 5.0, true);
        r.execute(&mut map, &mut ());
        assert_eq!(deferred(&map, "Ore"), -10.0);
        assert_eq!(deferred(&map, "Slag"), 5.0);
    }

    #[test]
    fn missing_input_blocks_all_flow() {
        let mut map = ledgers(&[("A", 10.0, 10.0), ("B", 0.0, 10.0), ("C", 0.0, 10.0)]);
        let mut r = Recipe::new(Broker::OTHERS);
        r.add_input("A", 1.0);
        r.add_input("B", 1.0);
        r.add_output("C", 1.0, false);
        assert!(!r.execute(&mut map, &mut ()));
        assert_eq!(deferred(&map, "A"), 0.0);
        assert_eq!(deferred(&map, "C"), 0.0);
    }

    #[test]
    fn pure_output_recipe_runs_fully() {
        let mut map = ledgers(&[("EC", 0.0, 1.0)]);
        let mut r = Recipe::new(Broker::OTHERS);
        r.add_output("EC", 10.0, false);
        assert!(r.execute(&mut map, &mut ()));
        assert_eq!(deferred(&map, "EC"), 10.0);
        assert!(r.is_done());
    }

    #[test]
    fn combined_primary_covers_need_alone() {
        let mut map = ledgers(&[("Waste", 10.0, 10.0), ("CO2", 10.0, 10.0)]);
        let mut r = Recipe::new(Broker::OTHERS);
        r.add_combined_input("Waste", 2.0, "CO2");
        r.add_secondary_input("CO2", 3.0);
        r.add_output("Oxygen", 1.0, true);
        r.execute(&mut map, &mut ());
        assert_eq!(deferred(&map, "Waste"), -5.0);
        assert_eq!(deferred(&map, "CO2"), 0.0);
    }

    #[test]
    fn combined_shortfall_spills_to_secondary() {
        let mut map = ledgers(&[("Waste", 3.0, 10.0), ("CO2", 10.0, 10.0)]);
        let mut r = Recipe::new(Broker::OTHERS);
        r.add_combined_input("Waste", 2.0, "CO2");
        r.add_secondary_input("CO2", 3.0);
        r.add_output("Oxygen", 1.0, true);
        r.execute(&mut map, &mut ());
        assert_eq!(deferred(&map, "Waste"), -3.0);
        assert_eq!(deferred(&map, "CO2"), -2.0);
        assert!(r.is_done());
    }

    #[test]
    fn combined_pair_never_overdraws() {
        let mut map = ledgers(&[("Waste", 1.0, 10.0), ("CO2", 1.5, 10.0)]);
        let mut r = Recipe::new(Broker::OTHERS);
        r.add_combined_input("Waste", 2.0, "CO2");
        r.add_secondary_input("CO2", 3.0);
        r.add_output("Oxygen", 1.0, true);
        r.execute(&mut map, &mut ());
        assert!((deferred(&map, "Waste") + 1.0).abs() < 1e-12);
        assert!((deferred(&map, "CO2") + 1.5).abs() < 1e-12);
        assert!((r.left() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn unpaired_secondary_acts_as_plain_input() {
        let mut map = ledgers(&[("CO2", 1.0, 10.0), ("O2", 0.0, 10.0)]);
        let mut r = Recipe::new(Broker::OTHERS);
        r.add_secondary_input("CO2", 2.0);
        r.add_output("O2", 1.0, false);
        r.execute(&mut map, &mut ());
        assert_eq!(deferred(&map, "CO2"), -1.0);
        assert_eq!(deferred(&map, "O2"), 0.5);
    }

    #[test]
    fn cures_scale_with_executed_ratio() {
        let mut map = ledgers(&[("Med", 5.0, 10.0), ("Out", 0.0, 10.0)]);
        let mut crew = vec![CrewMember::new("Val").in_sickbay("bay")];
        crew[0].rule("radiation").problem = 100.0;
        let mut r = Recipe::new(Broker::OTHERS);
        r.add_input("Med", 10.0);
        r.add_output("Out", 1.0, true);
        r.add_cure("radiation", 20.0, "bay");
        r.execute(&mut map, &mut crew);
        assert!((crew[0].problem("radiation") - 90.0).abs() < 1e-12);
    }

    #[test]
    fn chain_settles_regardless_of_order() {
        let mut map = ledgers(&[("X", 0.0, 0.0), ("Y", 0.0, 100.0)]);
        let mut consumer = Recipe::new(Broker::OTHERS);
        consumer.add_input("X", 5.0);
        consumer.add_output("Y", 5.0, false);
        let mut producer = Recipe::new(Broker::OTHERS);
        producer.add_output("X", 5.0, false);

        let mut recipes = vec![consumer, producer];
        let passes = execute_all(&mut recipes, &mut map, &mut (), 3);
        assert_eq!(passes, 3);
        assert!(deferred(&map, "X").abs() < 1e-12);
        assert!((deferred(&map, "Y") - 5.0).abs() < 1e-12);
    }

    #[test]
    fn small_buffer_chain_runs_to_completion() {
        let mut map = ledgers(&[("X", 10.0, 10.0), ("Y", 0.0, 1.0), ("Z", 0.0, 100.0)]);
        let mut first = Recipe::new(Broker::OTHERS);
        first.add_input("X", 10.0);
        first.add_output("Y", 10.0, false);
        let mut second = Recipe::new(Broker::OTHERS);
        second.add_input("Y", 10.0);
        second.add_output("Z", 10.0, false);

        let mut recipes = vec![first, second];
        let passes = execute_all(&mut recipes, &mut map, &mut (), pass_limit(2));
        assert!(passes > 3, "{} passes", passes);
        assert!((deferred(&map, "Z") - 10.0).abs() < 1e-9);
        assert!((deferred(&map, "X") + 10.0).abs() < 1e-9);
        assert!(deferred(&map, "Y").abs() < 1e-9);
    }

    #[test]
    fn solver_respects_pass_cap() {
        let mut map = ledgers(&[("X", 0.0, 0.0), ("Y", 0.0, 100.0)]);
        let mut consumer = Recipe::new(Broker::OTHERS);
        consumer.add_input("X", 5.0);
        consumer.add_output("Y", 5.0, false);
        let mut producer = Recipe::new(Broker::OTHERS);
        producer.add_output("X", 5.0, false);

        let mut recipes = vec![consumer, producer];
        assert_eq!(execute_all(&mut recipes, &mut map, &mut (), 1), 1);
        assert_eq!(deferred(&map, "Y"), 0.0);
    }
}
