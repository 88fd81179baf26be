//! VesselSim Core - ECS host and simulation driver
//!
//! Hosts vessels in a `hecs` world and drives the resource engine from
//! `vesselsim-logic` over them, one step at a time.
//!
//! # Architecture
//!
//! - **Entities**: vessels and their parts
//! - **Components**: pure data (containers, fitted modules, crew, environment)
//! - **Host**: [`host::ShipHost`] exposes the world as storage and as a
//!   component catalog
//! - **Engine**: [`engine::Simulation`] owns the resource books, applies crew
//!   rules, dispatches background modules and settles every vessel
//!
//! # Example
//!
//! ```rust,no_run
//! use rand::SeedableRng;
//! use vesselsim_core::prelude::*;
//! use vesselsim_core::generation::load_templates;
//!
//! let templates = load_templates(include_str!("../../../data/vessels.json")).unwrap();
//! let mut sim = Simulation::default();
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! for template in &templates {
//!     sim.spawn(template, &mut rng, 0.0);
//! }
//!
//! loop {
//!     sim.update(60.0); // one minute per step
//! }
//! ```

pub mod components;
pub mod engine;
pub mod error;
pub mod generation;
pub mod host;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::components::*;
    pub use crate::engine::{Notification, Simulation, StepReport};
    pub use crate::host::ShipHost;
}
