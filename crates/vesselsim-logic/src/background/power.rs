//! Electrical consumers and producers: command pods, generators, solar
//! panels, lights, labs and reactors.

use serde::{Deserialize, Serialize};

use super::{BackgroundModule, ModuleState, PartView, ResourceRate, StepResources, VesselContext};
use crate::broker::Broker;
use crate::recipe::Recipe;
use crate::ELECTRIC_CHARGE;

fn default_command_rate() -> f64 {
    0.02
}

/// Command pod or probe core.
///
/// Crewed pods left empty draw nothing. While hibernating the draw is
/// scaled by `SimSettings::hibernating_ec_factor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandModule {
    #[serde(default = "default_command_rate")]
    pub ec_rate: f64,
    #[serde(default)]
    pub minimum_crew: u32,
}

impl BackgroundModule for CommandModule {
    fn background_update(
        &self,
        state: &mut ModuleState,
        part: &PartView<'_>,
        res: &mut StepResources<'_>,
        ctx: &VesselContext<'_>,
        elapsed_s: f64,
    ) {
        if self.minimum_crew > 0 && part.crew == 0 {
            return;
        }
        let mut rate = self.ec_rate;
        if state.get_bool("hibernating", false) {
            rate *= ctx.settings.hibernating_ec_factor;
        }
        res.consume(ELECTRIC_CHARGE, rate * elapsed_s, &Broker::COMMAND);
    }
}

/// Always-on generator. Outputs are dumped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorModule {
    #[serde(default)]
    pub inputs: Vec<ResourceRate>,
    #[serde(default)]
    pub outputs: Vec<ResourceRate>,
}

impl BackgroundModule for GeneratorModule {
    fn background_update(
        &self,
        state: &mut ModuleState,
        _part: &PartView<'_>,
        res: &mut StepResources<'_>,
        _ctx: &VesselContext<'_>,
        elapsed_s: f64,
    ) {
        if !state.get_bool("active", false) {
            return;
        }
        let mut recipe = Recipe::new(Broker::STOCK_GENERATOR);
        for input in &self.inputs {
            recipe.add_input(input.resource.as_str(), input.rate * elapsed_s);
        }
        for output in &self.outputs {
            recipe.add_output(output.resource.as_str(), output.rate * elapsed_s, true);
        }
        res.queue(recipe);
    }
}

fn default_nominal_rate() -> f64 {
    10.0
}

/// Deployment states in which a panel faces the sun.
const DEPLOYED: [&str; 3] = ["static", "extended", "extended_fixed"];

/// Solar panel.
///
/// Sun attitude is not recomputed for unloaded vessels. The exposure
/// stored as `persistent_factor` when the vessel was last loaded is reused
/// for every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarPanelModule {
    /// EC/s at home flux with full exposure.
    #[serde(default = "default_nominal_rate")]
    pub nominal_rate: f64,
    /// Output multiplier by hours since launch, as `(hours, factor)` keys.
    #[serde(default)]
    pub wear_curve: Vec<(f64, f64)>,
}

impl SolarPanelModule {
    /// Wear multiplier after `hours` of service, clamped to `[0, 1]`.
    /// Curves with fewer than two keys never wear.
    pub fn wear_factor(&self, hours: f64) -> f64 {
        let keys = &self.wear_curve;
        if keys.len() < 2 {
            return 1.0;
        }
        let factor = match keys.iter().position(|&(h, _)| h > hours) {
            Some(0) => keys[0].1,
            None => keys[keys.len() - 1].1,
            Some(i) => {
                let (h0, f0) = keys[i - 1];
                let (h1, f1) = keys[i];
                f0 + (f1 - f0) * (hours - h0) / (h1 - h0)
            }
        };
        factor.clamp(0.0, 1.0)
    }

    /// EC/s for the given stored state and vessel environment.
    pub fn output(&self, state: &ModuleState, ctx: &VesselContext<'_>) -> f64 {
        let deployed = state
            .get_str("state")
            .map_or(false, |s| DEPLOYED.contains(&s));
        if !deployed {
            return 0.0;
        }
        let exposure = state.get_f64("persistent_factor", 1.0);
        let flux = ctx.environment.solar_flux / ctx.settings.solar_flux_at_home;
        let wear = self.wear_factor(ctx.mission_time / 3600.0);
        state.get_f64("nominal_rate", self.nominal_rate) * exposure * flux * wear
    }
}

impl BackgroundModule for SolarPanelModule {
    fn background_update(
        &self,
        state: &mut ModuleState,
        _part: &PartView<'_>,
        res: &mut StepResources<'_>,
        ctx: &VesselContext<'_>,
        elapsed_s: f64,
    ) {
        let output = self.output(state, ctx);
        if output > 0.0 {
            res.produce(ELECTRIC_CHARGE, output * elapsed_s, &Broker::SOLAR_PANEL);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScienceLabModule {
    pub power_requirement: f64,
}

impl BackgroundModule for ScienceLabModule {
    fn background_update(
        &self,
        state: &mut ModuleState,
        _part: &PartView<'_>,
        res: &mut StepResources<'_>,
        _ctx: &VesselContext<'_>,
        elapsed_s: f64,
    ) {
        if state.get_bool("active", false) {
            res.consume(ELECTRIC_CHARGE, self.power_requirement * elapsed_s, &Broker::SCIENCE_LAB);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightModule {
    pub ec_rate: f64,
    #[serde(default)]
    pub uses_resources: bool,
}

impl BackgroundModule for LightModule {
    fn background_update(
        &self,
        state: &mut ModuleState,
        _part: &PartView<'_>,
        res: &mut StepResources<'_>,
        _ctx: &VesselContext<'_>,
        elapsed_s: f64,
    ) {
        if self.uses_resources && state.get_bool("on", false) {
            res.consume(ELECTRIC_CHARGE, self.ec_rate * elapsed_s, &Broker::LIGHT);
        }
    }
}

/// Fission reactor. Heat is not simulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FissionGeneratorModule {
    pub power_generation: f64,
}

impl BackgroundModule for FissionGeneratorModule {
    fn background_update(
        &self,
        state: &mut ModuleState,
        _part: &PartView<'_>,
        res: &mut StepResources<'_>,
        _ctx: &VesselContext<'_>,
        elapsed_s: f64,
    ) {
        let throttle = state.get_f64("power_percent", 100.0) * 0.01;
        res.produce(
            ELECTRIC_CHARGE,
            self.power_generation * throttle * elapsed_s,
            &Broker::FISSION_REACTOR,
        );
    }
}

/// RTG whose output halves every `half_life_years` of mission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioisotopeGeneratorModule {
    pub base_power: f64,
    pub half_life_years: f64,
}

impl RadioisotopeGeneratorModule {
    pub fn power_at(&self, mission_years: f64) -> f64 {
        if self.half_life_years <= 0.0 {
            return 0.0;
        }
        self.base_power * 2f64.powf(-mission_years / self.half_life_years)
    }
}

impl BackgroundModule for RadioisotopeGeneratorModule {
    fn background_update(
        &self,
        _state: &mut ModuleState,
        _part: &PartView<'_>,
        res: &mut StepResources<'_>,
        ctx: &VesselContext<'_>,
        elapsed_s: f64,
    ) {
        let years = ctx.mission_time / ctx.settings.seconds_per_year();
        res.produce(ELECTRIC_CHARGE, self.power_at(years) * elapsed_s, &Broker::RTG);
    }
}
