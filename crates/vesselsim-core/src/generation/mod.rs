//! Generation - spawning vessels from JSON templates.

mod vessel;

pub use vessel::*;
