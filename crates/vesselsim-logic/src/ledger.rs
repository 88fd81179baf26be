//! Per-resource ledger - amount, capacity and the deferred delta.
//!
//! Producers and consumers never touch storage directly. They accumulate a
//! signed `deferred` delta, and once per step [`ResourceLedger::sync`]
//! settles it:
//!
//! 1. re-read amount/capacity from storage (this is how writes made by
//!    anything outside the engine become visible),
//! 2. run the coherency guard on loaded, time-accelerated vessels,
//! 3. clamp `deferred` to `[-amount, capacity - amount]`,
//! 4. write it back, balanced across all containers,
//! 5. update `amount`, `rate` and `level`, then reset `deferred`.
//!
//! Because only `deferred` is touched between syncs, every produce/consume
//! issued within a step commutes.

use std::collections::{BTreeMap, HashMap};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::broker::{Broker, BrokerRate};
use crate::settings::SimSettings;
use crate::storage::{ResourceStorage, VesselId};
use crate::{EPSILON, NEGLIGIBLE};

/// Facts about the step being settled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncContext {
    pub elapsed_s: f64,
    /// The vessel is actively simulated by the host.
    pub loaded: bool,
    /// Current time acceleration factor.
    pub warp_rate: f64,
    /// Transitional step (scene change, warp blending): keep the old rate.
    pub unstable: bool,
}

impl SyncContext {
    /// Context for an unloaded vessel at normal speed.
    pub fn background(elapsed_s: f64) -> Self {
        Self {
            elapsed_s,
            loaded: false,
            warp_rate: 1.0,
            unstable: false,
        }
    }

    pub fn loaded(elapsed_s: f64, warp_rate: f64) -> Self {
        Self {
            elapsed_s,
            loaded: true,
            warp_rate,
            unstable: false,
        }
    }

    pub fn unstable(mut self) -> Self {
        self.unstable = true;
        self
    }
}

/// Raised when an external producer is detected under high time warp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherencyWarning {
    pub vessel: VesselId,
    pub resource: String,
    /// Highest warp rate the host should allow after this warning.
    pub max_warp_rate: f64,
}

impl CoherencyWarning {
    /// User-facing text for the notification.
    pub fn message(&self, vessel_name: Option<&str>) -> String {
        let origin = match vessel_name {
            Some(name) => format!("On {} a producer", name),
            None => "A producer".to_string(),
        };
        format!(
            "{} of {} has incoherent behavior at high warp speed. Unload the vessel before warping.",
            origin, self.resource
        )
    }
}

/// Read-only table of per-consumer periodic rates, keyed by resource.
pub trait PeriodicRates {
    /// Signed per-consumer rate in units/s: negative for consumption.
    fn periodic_rate(&self, resource: &str) -> f64;
}

impl PeriodicRates for () {
    fn periodic_rate(&self, _resource: &str) -> f64 {
        0.0
    }
}

/// Vessel-wide state of one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLedger {
    name: String,
    amount: f64,
    capacity: f64,
    deferred: f64,
    rate: f64,
    average_rate: f64,
    level: f64,
    /// Amount/capacity have been read from storage at least once.
    observed: bool,

    interval_rule_amount: f64,
    interval_rules_rate: f64,
    interval_rule_pending: bool,
    interval_rule_happened: bool,

    brokers: HashMap<Broker, f64>,
    interval_brokers: HashMap<Broker, f64>,
    broker_rates: Vec<BrokerRate>,
}

impl ResourceLedger {
    /// Empty ledger. Amount and capacity are read at the first sync.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            amount: 0.0,
            capacity: 0.0,
            deferred: 0.0,
            rate: 0.0,
            average_rate: 0.0,
            level: 0.0,
            observed: false,
            interval_rule_amount: 0.0,
            interval_rules_rate: 0.0,
            interval_rule_pending: false,
            interval_rule_happened: false,
            brokers: HashMap::new(),
            interval_brokers: HashMap::new(),
            broker_rates: Vec::new(),
        }
    }

    /// Ledger with known amount and capacity, as if freshly read from storage.
    pub fn with_amount(name: impl Into<String>, amount: f64, capacity: f64) -> Self {
        let mut ledger = Self::new(name);
        ledger.observe(amount, capacity);
        ledger
    }

    /// Record amount and capacity read from storage outside of a sync.
    pub fn observe(&mut self, amount: f64, capacity: f64) {
        self.amount = amount;
        self.capacity = capacity;
        self.level = level_of(amount, capacity);
        self.observed = true;
    }

    pub fn is_observed(&self) -> bool {
        self.observed
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn deferred(&self) -> f64 {
        self.deferred
    }

    /// Net change per second measured by the last sync.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// `rate` plus the averaged contribution of interval rules.
    pub fn average_rate(&self) -> f64 {
        self.average_rate
    }

    /// `amount / capacity`, or 0 without capacity.
    pub fn level(&self) -> f64 {
        self.level
    }

    /// Amount still obtainable this step.
    pub fn available(&self) -> f64 {
        self.amount + self.deferred
    }

    /// Free space still fillable this step.
    pub fn headroom(&self) -> f64 {
        self.capacity - (self.amount + self.deferred)
    }

    /// True if an interval rule consumed or produced during the last step.
    pub fn interval_rule_happened(&self) -> bool {
        self.interval_rule_happened
    }

    /// Batch amount recorded by interval rules since the last sync.
    pub fn interval_rule_amount(&self) -> f64 {
        self.interval_rule_amount
    }

    /// Per-broker breakdown from the last sync, sorted by broker.
    pub fn broker_rates(&self) -> &[BrokerRate] {
        &self.broker_rates
    }

    pub fn produce(&mut self, quantity: f64, broker: &Broker) {
        if quantity <= EPSILON {
            return;
        }
        self.deferred += quantity;
        self.track(quantity, broker);
    }

    pub fn consume(&mut self, quantity: f64, broker: &Broker) {
        if quantity <= EPSILON {
            return;
        }
        self.deferred -= quantity;
        self.track(-quantity, broker);
    }

    fn track(&mut self, signed: f64, broker: &Broker) {
        if signed.abs() < NEGLIGIBLE {
            return;
        }
        *self.brokers.entry(broker.clone()).or_insert(0.0) += signed;
    }

    /// Record an interval rule's share of this step.
    ///
    /// `amount` is the batch (a meal) that fell due this step, 0 if none
    /// did; `average_rate` is the rule's rate averaged over its interval.
    /// The batch itself must still go through produce/consume. Recording it
    /// only suppresses the spike it would cause in `rate`.
    pub fn record_interval_rule(&mut self, amount: f64, average_rate: f64, broker: &Broker) {
        self.interval_rule_amount += amount;
        self.interval_rules_rate += average_rate;
        if amount > 0.0 {
            self.interval_rule_pending = true;
        }
        *self.interval_brokers.entry(broker.clone()).or_insert(0.0) += average_rate;
    }

    /// Settle the deferred delta against storage.
    ///
    /// Returns a warning when the coherency guard trips; the caller is
    /// expected to lower time acceleration to `max_warp_rate`.
    pub fn sync<S>(
        &mut self,
        storage: &mut S,
        vessel: VesselId,
        ctx: &SyncContext,
        settings: &SimSettings,
    ) -> Option<CoherencyWarning>
    where
        S: ResourceStorage + ?Sized,
    {
        let (amount, capacity) = storage.sum_amount_and_capacity(vessel, &self.name);

        // first observation has nothing to compare against
        let (old_amount, old_capacity) = if self.observed {
            (self.amount, self.capacity)
        } else {
            (amount, capacity)
        };
        self.amount = amount;
        self.capacity = capacity;
        self.observed = true;

        // nothing has been written yet, so any change came from outside the engine
        let mut external = amount - old_amount;
        if external.abs() < settings.coherency_amount_tolerance {
            external = 0.0;
        }
        let external_rate = if ctx.elapsed_s > 0.0 {
            external / ctx.elapsed_s
        } else {
            0.0
        };
        let flow_state_changed = capacity - old_capacity > settings.coherency_capacity_tolerance;

        let lower = -amount.max(0.0);
        let upper = (capacity - amount).max(0.0);
        self.deferred = self.deferred.clamp(lower, upper);

        if self.deferred.abs() > NEGLIGIBLE {
            storage.apply_delta(vessel, &self.name, self.deferred);
        }
        self.amount += self.deferred;
        self.level = level_of(self.amount, self.capacity);

        if !ctx.unstable && !self.interval_rule_pending && ctx.elapsed_s > 0.0 {
            self.rate = (self.amount - old_amount) / ctx.elapsed_s;
        }
        self.average_rate = self.rate;
        if (self.interval_rules_rate > 0.0 && self.level < 1.0)
            || (self.interval_rules_rate < 0.0 && self.level > 0.0)
        {
            self.average_rate += self.interval_rules_rate;
        }

        self.update_broker_rates(external_rate, ctx.elapsed_s);

        let warning = if settings.enforce_coherency
            && ctx.loaded
            && ctx.warp_rate > settings.coherency_warp_rate
            && external_rate > 0.0
            && !flow_state_changed
        {
            warn!(
                "{}: uncontrolled producer of {} at warp x{} ({:+.6}/s unaccounted)",
                vessel, self.name, ctx.warp_rate, external_rate
            );
            Some(CoherencyWarning {
                vessel,
                resource: self.name.clone(),
                max_warp_rate: settings.coherency_warp_rate,
            })
        } else {
            None
        };

        self.deferred = 0.0;
        self.interval_rule_happened = self.interval_rule_pending;
        self.interval_rule_pending = false;
        self.interval_rule_amount = 0.0;
        self.interval_rules_rate = 0.0;
        self.brokers.clear();
        self.interval_brokers.clear();

        warning
    }

    fn update_broker_rates(&mut self, external_rate: f64, elapsed_s: f64) {
        let mut merged: BTreeMap<Broker, f64> = BTreeMap::new();
        if elapsed_s > 0.0 {
            for (broker, amount) in &self.brokers {
                *merged.entry(broker.clone()).or_insert(0.0) += amount / elapsed_s;
            }
        }
        for (broker, rate) in &self.interval_brokers {
            *merged.entry(broker.clone()).or_insert(0.0) += rate;
        }
        if external_rate != 0.0 {
            *merged.entry(Broker::UNSUPPORTED).or_insert(0.0) += external_rate;
        }
        self.broker_rates = merged
            .into_iter()
            .map(|(broker, rate)| BrokerRate { broker, rate })
            .collect();
    }

    /// Seconds until empty at the averaged rate of the last sync.
    ///
    /// 0 when already empty, `f64::INFINITY` when not decreasing.
    pub fn depletion_time(&self) -> f64 {
        depletion(self.amount, self.average_rate)
    }

    /// Seconds until empty given `consumers` periodic consumers drawing from
    /// `periodic` on top of the measured rate.
    pub fn depletion<P>(&self, consumers: usize, periodic: &P) -> f64
    where
        P: PeriodicRates + ?Sized,
    {
        let net = self.rate + periodic.periodic_rate(&self.name) * consumers as f64;
        depletion(self.amount, net)
    }
}

fn level_of(amount: f64, capacity: f64) -> f64 {
    if capacity > EPSILON {
        amount / capacity
    } else {
        0.0
    }
}

fn depletion(amount: f64, net_rate: f64) -> f64 {
    if amount <= NEGLIGIBLE {
        0.0
    } else if net_rate >= -NEGLIGIBLE {
        f64::INFINITY
    } else {
        amount / -net_rate
    }
}

/// Ledgers of one vessel, ordered by resource name.
#[derive(Debug, Clone, Default)]
pub struct LedgerMap {
    ledgers: BTreeMap<String, ResourceLedger>,
}

impl LedgerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ResourceLedger> {
        self.ledgers.get(name)
    }

    /// Get or create the ledger for `name`.
    pub fn entry(&mut self, name: &str) -> &mut ResourceLedger {
        self.ledgers
            .entry(name.to_string())
            .or_insert_with(|| ResourceLedger::new(name))
    }

    pub fn insert(&mut self, ledger: ResourceLedger) {
        self.ledgers.insert(ledger.name.clone(), ledger);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ledgers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceLedger> {
        self.ledgers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ResourceLedger> {
        self.ledgers.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Container, MemoryStorage};

    const V: VesselId = VesselId(1);

    fn storage_with(resource: &str, amount: f64, capacity: f64) -> MemoryStorage {
        let mut s = MemoryStorage::default();
        s.add_container(V, Container::new(resource, amount, capacity));
        s
    }

    #[test]
    fn consume_beyond_amount_is_clamped() {
        let mut storage = storage_with("Food", 50.0, 100.0);
        let mut ledger = ResourceLedger::new("Food");
        ledger.consume(80.0, &Broker::OTHERS);
        ledger.sync(&mut storage, V, &SyncContext::background(1.0), &SimSettings::default());
        assert_eq!(ledger.amount(), 0.0);
        assert_eq!(ledger.deferred(), 0.0);
        assert_eq!(storage.sum_amount_and_capacity(V, "Food"), (0.0, 100.0));
    }

    #[test]
    fn produce_beyond_capacity_is_clamped() {
        let mut storage = storage_with("Water", 90.0, 100.0);
        let mut ledger = ResourceLedger::new("Water");
        ledger.produce(25.0, &Broker::OTHERS);
        ledger.sync(&mut storage, V, &SyncContext::background(1.0), &SimSettings::default());
        assert_eq!(ledger.amount(), 100.0);
        assert_eq!(ledger.level(), 1.0);
    }

    #[test]
    fn non_positive_quantities_are_ignored() {
        let mut ledger = ResourceLedger::with_amount("Food", 10.0, 10.0);
        ledger.produce(0.0, &Broker::OTHERS);
        ledger.consume(-5.0, &Broker::OTHERS);
        assert_eq!(ledger.deferred(), 0.0);
    }

    #[test]
    fn rate_reflects_settled_change() {
        let mut storage = storage_with("Oxygen", 50.0, 100.0);
        let mut ledger = ResourceLedger::with_amount("Oxygen", 50.0, 100.0);
        ledger.consume(10.0, &Broker::OTHERS);
        ledger.sync(&mut storage, V, &SyncContext::background(5.0), &SimSettings::default());
        assert!((ledger.rate() + 2.0).abs() < 1e-12);
    }

    #[test]
    fn unstable_step_keeps_previous_rate() {
        let mut storage = storage_with("Oxygen", 50.0, 100.0);
        let mut ledger = ResourceLedger::with_amount("Oxygen", 50.0, 100.0);
        let settings = SimSettings::default();
        ledger.consume(10.0, &Broker::OTHERS);
        ledger.sync(&mut storage, V, &SyncContext::background(1.0), &settings);
        ledger.consume(30.0, &Broker::OTHERS);
        ledger.sync(&mut storage, V, &SyncContext::background(1.0).unstable(), &settings);
        assert!((ledger.rate() + 10.0).abs() < 1e-12);
        assert!((ledger.amount() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn interval_rule_step_keeps_previous_rate() {
        let mut storage = storage_with("Food", 100.0, 100.0);
        let mut ledger = ResourceLedger::with_amount("Food", 100.0, 100.0);
        let settings = SimSettings::default();
        let meal = Broker::named("Eat", crate::broker::BrokerCategory::Crew);
        ledger.consume(1.0, &Broker::OTHERS);
        ledger.sync(&mut storage, V, &SyncContext::background(1.0), &settings);

        ledger.consume(20.0, &meal);
        ledger.record_interval_rule(20.0, -0.01, &meal);
        ledger.sync(&mut storage, V, &SyncContext::background(1.0), &settings);

        assert!((ledger.rate() + 1.0).abs() < 1e-12);
        assert!((ledger.average_rate() + 1.01).abs() < 1e-12);
        assert!(ledger.interval_rule_happened());
    }

    #[test]
    fn external_production_is_reported_as_unsupported_broker() {
        let mut storage = storage_with("ElectricCharge", 10.0, 100.0);
        let mut ledger = ResourceLedger::with_amount("ElectricCharge", 10.0, 100.0);
        storage.containers_mut(V)[0].amount = 20.0;
        ledger.sync(&mut storage, V, &SyncContext::background(2.0), &SimSettings::default());
        let unsupported = ledger
            .broker_rates()
            .iter()
            .find(|b| b.broker == Broker::UNSUPPORTED)
            .map(|b| b.rate);
        assert_eq!(unsupported, Some(5.0));
    }

    #[test]
    fn coherency_guard_trips_only_when_loaded_and_warping() {
        let settings = SimSettings::default();
        let mut storage = storage_with("ElectricCharge", 10.0, 100.0);
        let mut ledger = ResourceLedger::with_amount("ElectricCharge", 10.0, 100.0);

        storage.containers_mut(V)[0].amount = 20.0;
        let unloaded = SyncContext {
            loaded: false,
            ..SyncContext::loaded(1.0, 10_000.0)
        };
        assert!(ledger.sync(&mut storage, V, &unloaded, &settings).is_none());

        storage.containers_mut(V)[0].amount = 30.0;
        let slow = SyncContext::loaded(1.0, 100.0);
        assert!(ledger.sync(&mut storage, V, &slow, &settings).is_none());

        storage.containers_mut(V)[0].amount = 40.0;
        let fast = SyncContext::loaded(1.0, 10_000.0);
        let warning = ledger.sync(&mut storage, V, &fast, &settings);
        assert_eq!(
            warning.map(|w| w.max_warp_rate),
            Some(settings.coherency_warp_rate)
        );
    }

    #[test]
    fn coherency_guard_ignores_capacity_changes() {
        let settings = SimSettings::default();
        let mut storage = storage_with("ElectricCharge", 10.0, 100.0);
        let mut ledger = ResourceLedger::with_amount("ElectricCharge", 10.0, 100.0);
        storage.add_container(V, Container::new("ElectricCharge", 50.0, 50.0));
        let fast = SyncContext::loaded(1.0, 10_000.0);
        assert!(ledger.sync(&mut storage, V, &fast, &settings).is_none());
    }

    #[test]
    fn depletion_sentinels() {
        let empty = ResourceLedger::with_amount("Food", 0.0, 10.0);
        assert_eq!(empty.depletion_time(), 0.0);

        let steady = ResourceLedger::with_amount("Food", 5.0, 10.0);
        assert_eq!(steady.depletion_time(), f64::INFINITY);
    }

    struct Meals(f64);

    impl PeriodicRates for Meals {
        fn periodic_rate(&self, resource: &str) -> f64 {
            if resource == "Food" {
                -self.0
            } else {
                0.0
            }
        }
    }

    #[test]
    fn depletion_counts_periodic_consumers() {
        let ledger = ResourceLedger::with_amount("Food", 100.0, 100.0);
        assert_eq!(ledger.depletion(4, &Meals(0.5)), 50.0);
        assert_eq!(ledger.depletion(0, &Meals(0.5)), f64::INFINITY);
        assert_eq!(ledger.depletion(3, &()), f64::INFINITY);
    }

    #[test]
    fn ledger_map_creates_on_demand() {
        let mut map = LedgerMap::new();
        assert!(map.get("Ore").is_none());
        map.entry("Ore").produce(1.0, &Broker::OTHERS);
        assert_eq!(map.get("Ore").map(|l| l.deferred()), Some(1.0));
        assert_eq!(map.len(), 1);
    }
}
