//! Vessel-level components: identity, load state, environment and crew.

use serde::{Deserialize, Serialize};
use vesselsim_logic::background::Environment;
use vesselsim_logic::crew::CrewMember;
use vesselsim_logic::storage::VesselId;

/// Root entity of a vessel. Parts point back at it through [`Part::vessel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vessel {
    pub id: VesselId,
    pub name: String,
    /// Actively simulated by the host rather than stepped in the background.
    pub loaded: bool,
    /// Universal time of launch, in seconds.
    pub launch_time: f64,
}

impl Vessel {
    pub fn mission_time(&self, now: f64) -> f64 {
        (now - self.launch_time).max(0.0)
    }
}

/// Environment facts computed by the host, consumed by the adapters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VesselEnvironment(pub Environment);

/// Everyone aboard, in seating order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VesselCrew(pub Vec<CrewMember>);

impl VesselCrew {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Members not disabled (hibernating, incapacitated).
    pub fn active(&self) -> usize {
        self.0.iter().filter(|c| !c.disabled).count()
    }
}
