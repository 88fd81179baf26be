//! Storage collaborator contract - the live per-container amounts.
//!
//! The engine never owns resource amounts. Every ledger re-reads the sum of
//! all flow-enabled containers at sync time and writes its settled delta
//! back through [`ResourceStorage::apply_delta`]. Hosts that keep their
//! containers as plain [`Container`] values can use [`sum_containers`] and
//! [`distribute_delta`] to get the balanced semantics for free.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::NEGLIGIBLE;

/// Stable identity of a vessel across steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VesselId(pub u64);

impl fmt::Display for VesselId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vessel#{}", self.0)
    }
}

/// One container of one resource on one part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub resource: String,
    pub amount: f64,
    pub capacity: f64,
    /// Containers with flow disabled are invisible to the engine.
    #[serde(default = "default_flow")]
    pub flow_enabled: bool,
}

fn default_flow() -> bool {
    true
}

impl Container {
    pub fn new(resource: impl Into<String>, amount: f64, capacity: f64) -> Self {
        Self {
            resource: resource.into(),
            amount,
            capacity,
            flow_enabled: true,
        }
    }

    pub fn with_flow(mut self, enabled: bool) -> Self {
        self.flow_enabled = enabled;
        self
    }

    /// True if this container takes part in the simulation of `resource`.
    pub fn participates(&self, resource: &str) -> bool {
        self.flow_enabled && self.resource == resource
    }
}

/// Abstract access to the host's per-vessel resource containers.
pub trait ResourceStorage {
    /// Sum of amount and capacity over every flow-enabled container holding
    /// `resource` on the vessel. Unknown vessels or resources yield `(0, 0)`.
    fn sum_amount_and_capacity(&self, vessel: VesselId, resource: &str) -> (f64, f64);

    /// Apply a signed delta to the vessel's containers of `resource`,
    /// balanced across all flow-enabled containers (see [`distribute_delta`]).
    fn apply_delta(&mut self, vessel: VesselId, resource: &str, delta: f64);
}

/// Sum amount and capacity of the containers participating in `resource`.
pub fn sum_containers<'a, I>(containers: I, resource: &str) -> (f64, f64)
where
    I: IntoIterator<Item = &'a Container>,
{
    containers
        .into_iter()
        .filter(|c| c.participates(resource))
        .fold((0.0, 0.0), |(amount, capacity), c| {
            (amount + c.amount, capacity + c.capacity)
        })
}

/// Distribute `delta` across `containers`, which must already be filtered
/// to the flow-enabled containers of a single resource.
///
/// Removal is weighted by each container's share of the current amount,
/// addition by each container's share of the free space. The result does
/// not depend on the order of `containers`.
pub fn distribute_delta(containers: &mut [&mut Container], delta: f64) {
    if delta.abs() <= NEGLIGIBLE {
        return;
    }

    let (amount, capacity) = containers
        .iter()
        .fold((0.0, 0.0), |(a, c), k| (a + k.amount, c + k.capacity));

    let pool = if delta < 0.0 { amount } else { capacity - amount };
    if pool <= NEGLIGIBLE {
        return;
    }

    for c in containers.iter_mut() {
        let share = if delta < 0.0 {
            c.amount / pool
        } else {
            (c.capacity - c.amount) / pool
        };
        c.amount = (c.amount + delta * share).clamp(0.0, c.capacity.max(0.0));
    }
}

/// In-memory storage keyed by vessel, used by tests and by hosts that do
/// not need anything richer.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    vessels: HashMap<VesselId, Vec<Container>>,
}

impl MemoryStorage {
    pub fn add_container(&mut self, vessel: VesselId, container: Container) {
        self.vessels.entry(vessel).or_default().push(container);
    }

    pub fn containers(&self, vessel: VesselId) -> &[Container] {
        self.vessels.get(&vessel).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn containers_mut(&mut self, vessel: VesselId) -> &mut Vec<Container> {
        self.vessels.entry(vessel).or_default()
    }

    pub fn remove_vessel(&mut self, vessel: VesselId) {
        self.vessels.remove(&vessel);
    }
}

impl ResourceStorage for MemoryStorage {
    fn sum_amount_and_capacity(&self, vessel: VesselId, resource: &str) -> (f64, f64) {
        sum_containers(self.containers(vessel), resource)
    }

    fn apply_delta(&mut self, vessel: VesselId, resource: &str, delta: f64) {
        if let Some(containers) = self.vessels.get_mut(&vessel) {
            let mut matching: Vec<&mut Container> = containers
                .iter_mut()
                .filter(|c| c.participates(resource))
                .collect();
            distribute_delta(&mut matching, delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_skips_disabled_and_foreign_containers() {
        let containers = vec![
            Container::new("Food", 10.0, 20.0),
            Container::new("Food", 5.0, 5.0).with_flow(false),
            Container::new("Water", 30.0, 40.0),
            Container::new("Food", 1.0, 10.0),
        ];
        assert_eq!(sum_containers(&containers, "Food"), (11.0, 30.0));
    }

    #[test]
    fn removal_is_weighted_by_amount() {
        let mut a = Container::new("Food", 30.0, 100.0);
        let mut b = Container::new("Food", 10.0, 100.0);
        distribute_delta(&mut [&mut a, &mut b], -20.0);
        assert!((a.amount - 15.0).abs() < 1e-9);
        assert!((b.amount - 5.0).abs() < 1e-9);
    }

    #[test]
    fn addition_is_weighted_by_free_space() {
        let mut a = Container::new("Food", 90.0, 100.0); // 10 free
        let mut b = Container::new("Food", 70.0, 100.0); // 30 free
        distribute_delta(&mut [&mut a, &mut b], 20.0);
        assert!((a.amount - 95.0).abs() < 1e-9);
        assert!((b.amount - 85.0).abs() < 1e-9);
    }

    #[test]
    fn distribution_is_order_independent() {
        let mut a1 = Container::new("Ore", 3.0, 10.0);
        let mut b1 = Container::new("Ore", 8.0, 50.0);
        let mut a2 = a1.clone();
        let mut b2 = b1.clone();
        distribute_delta(&mut [&mut a1, &mut b1], 17.0);
        distribute_delta(&mut [&mut b2, &mut a2], 17.0);
        assert_eq!(a1.amount, a2.amount);
        assert_eq!(b1.amount, b2.amount);
    }

    #[test]
    fn memory_storage_round_trip() {
        let v = VesselId(7);
        let mut storage = MemoryStorage::default();
        storage.add_container(v, Container::new("Oxygen", 10.0, 20.0));
        storage.add_container(v, Container::new("Oxygen", 0.0, 20.0));
        storage.apply_delta(v, "Oxygen", 10.0);
        assert_eq!(storage.sum_amount_and_capacity(v, "Oxygen"), (20.0, 40.0));
        assert_eq!(storage.sum_amount_and_capacity(VesselId(8), "Oxygen"), (0.0, 0.0));
    }
}
