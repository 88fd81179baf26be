//! Pure resource simulation logic for vesselsim.
//!
//! This crate holds the vessel resource engine: the per-resource ledgers,
//! the recipe solver, the per-vessel book that settles them once per step,
//! and the background dispatcher that replays component behavior for
//! vessels that are not actively simulated. It has no dependency on any
//! host: storage, component enumeration and crew are reached through the
//! small traits in [`storage`], [`background`] and [`crew`].
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`background`] | Per-step replay of component behavior for unloaded vessels |
//! | [`book`] | Per-vessel ledgers plus the queue of pending recipes |
//! | [`broker`] | Named producers/consumers used for rate breakdowns |
//! | [`cache`] | Vessel-keyed registry of books |
//! | [`crew`] | Crew records, rule accumulators and cure application |
//! | [`ledger`] | Amount, capacity, deferred delta and the sync algorithm |
//! | [`recipe`] | Rationed input → output transformations |
//! | [`rules`] | Crew life-support rules and their periodic rates |
//! | [`settings`] | Tunable policy (coherency guard, calendar, solver bounds) |
//! | [`storage`] | Storage collaborator contract and proportional distribution |
//!
//! # Usage
//!
//! ```
//! use vesselsim_logic::book::VesselResourceBook;
//! use vesselsim_logic::broker::Broker;
//! use vesselsim_logic::ledger::SyncContext;
//! use vesselsim_logic::settings::SimSettings;
//! use vesselsim_logic::storage::{Container, MemoryStorage, VesselId};
//!
//! let vessel = VesselId(1);
//! let mut storage = MemoryStorage::default();
//! storage.add_container(vessel, Container::new("Oxygen", 50.0, 100.0));
//!
//! let mut book = VesselResourceBook::new(vessel);
//! book.consume("Oxygen", 80.0, &Broker::OTHERS);
//! book.sync(&mut storage, &mut (), &SyncContext::background(1.0), &SimSettings::default());
//!
//! assert_eq!(book.get("Oxygen").map(|l| l.amount()), Some(0.0));
//! ```

pub mod background;
pub mod book;
pub mod broker;
pub mod cache;
pub mod crew;
pub mod ledger;
pub mod recipe;
pub mod rules;
pub mod settings;
pub mod storage;

/// Quantities at or below this are treated as zero.
pub const EPSILON: f64 = f64::EPSILON;

/// Deltas below this are not written back to storage, and broker
/// contributions below it are not tracked.
pub const NEGLIGIBLE: f64 = 1e-10;

/// Resource name used for electrical power throughout the adapters.
pub const ELECTRIC_CHARGE: &str = "ElectricCharge";
