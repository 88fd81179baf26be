//! Background simulation of components on unloaded vessels.
//!
//! Once per step the host enumerates a vessel's simulated components
//! (through [`ComponentCatalog`]) together with their last-known state. The
//! dispatcher hands each one to the adapter for its kind, which issues the
//! produce/consume/recipe calls the component would have made if it were
//! loaded, then the state is handed back to the host.
//!
//! Adapters only read the ledgers' settled values from the previous sync,
//! never the current step's deferred deltas, so they can run in any order.
//!
//! | Kind | Adapter | Effect |
//! |------|---------|--------|
//! | `command` | [`CommandModule`] | EC draw, reduced while hibernating |
//! | `generator` | [`GeneratorModule`] | input → output recipe, outputs dumped |
//! | `solar_panel` | [`SolarPanelModule`] | EC scaled by flux, stored exposure and wear |
//! | `converter` | [`ConverterModule`] | recipe scaled by specialist bonus |
//! | `drill` | [`DrillModule`] | harvest scaled by local abundance |
//! | `asteroid_drill` | [`AsteroidDrillModule`] | EC → ore, drains asteroid mass |
//! | `science_lab` | [`ScienceLabModule`] | EC draw |
//! | `light` | [`LightModule`] | EC draw |
//! | `fission_generator` | [`FissionGeneratorModule`] | EC at the throttle setting |
//! | `radioisotope_generator` | [`RadioisotopeGeneratorModule`] | EC decaying with mission time |
//! | `cryo_tank` | [`CryoTankModule`] | cooling EC, or boil-off without it |
//! | `greenhouse` | [`GreenhouseModule`] | lamp EC, crop recipe and growth |
//! | `process` | [`ProcessModule`] | configurable recipe with cures |
//! | `external` | registered [`BackgroundModule`] | third-party behavior |

mod industry;
mod life_support;
mod power;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::book::VesselResourceBook;
use crate::broker::Broker;
use crate::crew::{best_experience, CrewMember};
use crate::ledger::ResourceLedger;
use crate::recipe::Recipe;
use crate::settings::SimSettings;
use crate::storage::{Container, ResourceStorage, VesselId};

pub use industry::{AsteroidDrillModule, ConverterModule, DrillModule, ProcessCure, ProcessModule};
pub use life_support::{CryoFuel, CryoTankModule, GreenhouseModule};
pub use power::{
    CommandModule, FissionGeneratorModule, GeneratorModule, LightModule,
    RadioisotopeGeneratorModule, ScienceLabModule, SolarPanelModule,
};

/// Component position on a vessel: part index and module index in the part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId {
    pub part: u32,
    pub index: u32,
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "part{}/module{}", self.part, self.index)
    }
}

/// Last-known serialized state of one component, as loose key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleState(BTreeMap<String, Value>);

impl ModuleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.0.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.0.insert(key.to_string(), Value::Bool(value));
    }

    /// Non-finite values are stored as null.
    pub fn set_f64(&mut self, key: &str, value: f64) {
        self.0.insert(key.to_string(), Value::from(value));
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), Value::String(value.to_string()));
    }

    pub fn with_bool(mut self, key: &str, value: bool) -> Self {
        self.set_bool(key, value);
        self
    }

    pub fn with_f64(mut self, key: &str, value: f64) -> Self {
        self.set_f64(key, value);
        self
    }
}

/// One input or output rate of a component, per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRate {
    pub resource: String,
    pub rate: f64,
    /// Output only: excess is discarded instead of throttling.
    #[serde(default)]
    pub dump: bool,
}

impl ResourceRate {
    pub fn new(resource: impl Into<String>, rate: f64) -> Self {
        Self {
            resource: resource.into(),
            rate,
            dump: false,
        }
    }

    pub fn dumped(mut self) -> Self {
        self.dump = true;
        self
    }
}

fn one() -> f64 {
    1.0
}

/// Efficiency bonus granted by crew with a matching experience effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialistBonus {
    pub experience_effect: String,
    #[serde(default = "one")]
    pub efficiency_bonus: f64,
    #[serde(default)]
    pub specialist_bonus_base: f64,
    #[serde(default)]
    pub specialist_efficiency_factor: f64,
}

impl SpecialistBonus {
    /// `efficiency · (base + factor · (level + 1))` for the best specialist
    /// aboard, or `efficiency · base` without one.
    pub fn multiplier(&self, crew: &[CrewMember]) -> f64 {
        match best_experience(crew, &self.experience_effect) {
            Some(level) => {
                self.efficiency_bonus
                    * (self.specialist_bonus_base
                        + self.specialist_efficiency_factor * (level as f64 + 1.0))
            }
            None => self.efficiency_bonus * self.specialist_bonus_base,
        }
    }
}

/// Multiplier of an optional specialist bonus; 1 when the component has none.
pub(crate) fn bonus(specialist: &Option<SpecialistBonus>, crew: &[CrewMember]) -> f64 {
    specialist.as_ref().map_or(1.0, |s| s.multiplier(crew))
}

/// Closed set of first-party component kinds, plus an escape hatch for
/// modules registered at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModuleKind {
    Command(CommandModule),
    Generator(GeneratorModule),
    SolarPanel(SolarPanelModule),
    Converter(ConverterModule),
    Drill(DrillModule),
    AsteroidDrill(AsteroidDrillModule),
    ScienceLab(ScienceLabModule),
    Light(LightModule),
    FissionGenerator(FissionGeneratorModule),
    RadioisotopeGenerator(RadioisotopeGeneratorModule),
    CryoTank(CryoTankModule),
    Greenhouse(GreenhouseModule),
    Process(ProcessModule),
    /// Dispatched to the module registered under this name.
    External { module: String },
}

impl ModuleKind {
    pub fn tag(&self) -> &str {
        match self {
            ModuleKind::Command(_) => "command",
            ModuleKind::Generator(_) => "generator",
            ModuleKind::SolarPanel(_) => "solar_panel",
            ModuleKind::Converter(_) => "converter",
            ModuleKind::Drill(_) => "drill",
            ModuleKind::AsteroidDrill(_) => "asteroid_drill",
            ModuleKind::ScienceLab(_) => "science_lab",
            ModuleKind::Light(_) => "light",
            ModuleKind::FissionGenerator(_) => "fission_generator",
            ModuleKind::RadioisotopeGenerator(_) => "radioisotope_generator",
            ModuleKind::CryoTank(_) => "cryo_tank",
            ModuleKind::Greenhouse(_) => "greenhouse",
            ModuleKind::Process(_) => "process",
            ModuleKind::External { module } => module,
        }
    }
}

/// A component as enumerated by the host for one background step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedComponent {
    pub id: ComponentId,
    pub kind: ModuleKind,
    pub state: ModuleState,
    /// Crew seated in the component's part.
    #[serde(default)]
    pub part_crew: usize,
    /// Containers of the component's part.
    #[serde(default)]
    pub part_containers: Vec<Container>,
}

/// What a component can see of its own part.
#[derive(Debug, Clone, Copy)]
pub struct PartView<'a> {
    pub crew: usize,
    pub containers: &'a [Container],
}

impl PartView<'_> {
    /// Amount of `resource` held in this part alone.
    pub fn amount(&self, resource: &str) -> Option<f64> {
        self.containers
            .iter()
            .filter(|c| c.resource == resource)
            .map(|c| c.amount)
            .reduce(|a, b| a + b)
    }
}

/// Host collaborator that classifies and enumerates simulated components.
pub trait ComponentCatalog {
    fn simulated_components(&self, vessel: VesselId) -> Vec<SimulatedComponent>;

    /// Receive the components back after the step, with updated state.
    fn write_back(&mut self, vessel: VesselId, components: Vec<SimulatedComponent>);
}

/// Environment of a vessel as last computed by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Total solar flux at the vessel, in W/m².
    pub solar_flux: f64,
    /// The vessel is inside an atmosphere crew can breathe.
    pub breathable: bool,
}

/// Read-only facts about the vessel for one step.
#[derive(Debug, Clone, Copy)]
pub struct VesselContext<'a> {
    pub vessel: VesselId,
    /// Universal time at the end of the step, in seconds.
    pub now: f64,
    /// Seconds since launch.
    pub mission_time: f64,
    pub crew: &'a [CrewMember],
    pub environment: Environment,
    pub settings: &'a SimSettings,
}

/// Resource access handed to adapters for one step.
pub struct StepResources<'a> {
    book: &'a mut VesselResourceBook,
    storage: &'a dyn ResourceStorage,
}

impl<'a> StepResources<'a> {
    pub fn new(book: &'a mut VesselResourceBook, storage: &'a dyn ResourceStorage) -> Self {
        Self { book, storage }
    }

    /// Ledger as settled at the previous sync.
    pub fn previous(&mut self, resource: &str) -> &ResourceLedger {
        self.book.resource(self.storage, resource)
    }

    pub fn produce(&mut self, resource: &str, quantity: f64, broker: &Broker) {
        self.book.produce(resource, quantity, broker);
    }

    pub fn consume(&mut self, resource: &str, quantity: f64, broker: &Broker) {
        self.book.consume(resource, quantity, broker);
    }

    pub fn queue(&mut self, recipe: Recipe) {
        self.book.queue_recipe(recipe);
    }
}

/// Behavior of one kind of component during a background step.
///
/// Implementations must confine side effects to `state` and to the calls
/// made through `res`.
pub trait BackgroundModule {
    fn background_update(
        &self,
        state: &mut ModuleState,
        part: &PartView<'_>,
        res: &mut StepResources<'_>,
        ctx: &VesselContext<'_>,
        elapsed_s: f64,
    );
}

/// Routes each simulated component to the adapter for its kind.
#[derive(Default)]
pub struct BackgroundDispatcher {
    external: HashMap<String, Box<dyn BackgroundModule>>,
}

impl BackgroundDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a third-party module, dispatched from `ModuleKind::External`.
    pub fn register(&mut self, name: impl Into<String>, module: Box<dyn BackgroundModule>) {
        self.external.insert(name.into(), module);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.external.contains_key(name)
    }

    fn resolve<'a>(&'a self, kind: &'a ModuleKind) -> Option<&'a dyn BackgroundModule> {
        match kind {
            ModuleKind::Command(m) => Some(m),
            ModuleKind::Generator(m) => Some(m),
            ModuleKind::SolarPanel(m) => Some(m),
            ModuleKind::Converter(m) => Some(m),
            ModuleKind::Drill(m) => Some(m),
            ModuleKind::AsteroidDrill(m) => Some(m),
            ModuleKind::ScienceLab(m) => Some(m),
            ModuleKind::Light(m) => Some(m),
            ModuleKind::FissionGenerator(m) => Some(m),
            ModuleKind::RadioisotopeGenerator(m) => Some(m),
            ModuleKind::CryoTank(m) => Some(m),
            ModuleKind::Greenhouse(m) => Some(m),
            ModuleKind::Process(m) => Some(m),
            ModuleKind::External { module } => self.external.get(module).map(|m| m.as_ref()),
        }
    }

    /// Run every component once. Returns the number of components that
    /// were dispatched.
    pub fn run(
        &self,
        components: &mut [SimulatedComponent],
        res: &mut StepResources<'_>,
        ctx: &VesselContext<'_>,
        elapsed_s: f64,
    ) -> usize {
        let mut dispatched = 0;
        for component in components.iter_mut() {
            if !component.state.get_bool("enabled", true) {
                continue;
            }
            let Some(module) = self.resolve(&component.kind) else {
                debug!(
                    "{} {}: no background module for '{}'",
                    ctx.vessel,
                    component.id,
                    component.kind.tag()
                );
                continue;
            };
            let part = PartView {
                crew: component.part_crew,
                containers: &component.part_containers,
            };
            module.background_update(&mut component.state, &part, res, ctx, elapsed_s);
            dispatched += 1;
        }
        dispatched
    }

    /// Enumerate the vessel's components from `host`, run them against
    /// `book` and hand the updated state back.
    pub fn update<H>(
        &self,
        host: &mut H,
        book: &mut VesselResourceBook,
        ctx: &VesselContext<'_>,
        elapsed_s: f64,
    ) -> usize
    where
        H: ComponentCatalog + ResourceStorage,
    {
        let mut components = host.simulated_components(ctx.vessel);
        if components.is_empty() {
            return 0;
        }
        let dispatched = {
            let mut res = StepResources::new(book, &*host);
            self.run(&mut components, &mut res, ctx, elapsed_s)
        };
        host.write_back(ctx.vessel, components);
        dispatched
    }
}
