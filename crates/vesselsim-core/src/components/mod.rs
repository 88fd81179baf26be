//! Component definitions for the host ECS world.
//!
//! Components are pure data structs attached to entities.
//! They have no behavior - that lives in the host and the engine.

mod part;
mod vessel;

pub use part::*;
pub use vessel::*;
