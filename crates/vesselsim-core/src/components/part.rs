//! Part-level components. Every part entity carries all three.

use serde::{Deserialize, Serialize};
use vesselsim_logic::background::{ModuleKind, ModuleState};
use vesselsim_logic::storage::{Container, VesselId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub vessel: VesselId,
    /// Position in the vessel, stable for the vessel's lifetime.
    pub index: u32,
    pub name: String,
    /// Crew seated in this part.
    pub crew: usize,
}

/// Resource containers of a part.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartResources(pub Vec<Container>);

/// A module fitted to a part, with its last-known state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSlot {
    pub kind: ModuleKind,
    #[serde(default)]
    pub state: ModuleState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartModules(pub Vec<ModuleSlot>);
