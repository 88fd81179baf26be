//! Greenhouses and cryogenic tanks.

use serde::{Deserialize, Serialize};

use super::{BackgroundModule, ModuleState, PartView, ResourceRate, StepResources, VesselContext};
use crate::broker::Broker;
use crate::recipe::Recipe;
use crate::{ELECTRIC_CHARGE, EPSILON};

const WASTE_ATMOSPHERE: &str = "WasteAtmosphere";
const CARBON_DIOXIDE: &str = "CarbonDioxide";
const OXYGEN: &str = "Oxygen";

/// Growth at which the crop is ready and the greenhouse stops.
const HARVEST_READY: f64 = 0.99;

fn is_atmosphere_input(name: &str) -> bool {
    name == WASTE_ATMOSPHERE || name == CARBON_DIOXIDE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreenhouseModule {
    /// Lamp draw at full artificial lighting.
    pub ec_rate: f64,
    /// Light flux the crop needs to grow.
    pub light_tolerance: f64,
    /// Growth per second under good conditions.
    pub crop_rate: f64,
    #[serde(default)]
    pub inputs: Vec<ResourceRate>,
    #[serde(default)]
    pub outputs: Vec<ResourceRate>,
    /// Draw WasteAtmosphere first and cover its shortfall with CarbonDioxide.
    #[serde(default)]
    pub combine_waste_atmosphere: bool,
}

impl GreenhouseModule {
    fn crop_recipe(&self, breathable: bool, elapsed_s: f64) -> Recipe {
        let mut recipe = Recipe::new(Broker::GREENHOUSE);
        for input in &self.inputs {
            let name = input.resource.as_str();
            let quantity = if breathable && is_atmosphere_input(name) {
                0.0
            } else {
                input.rate * elapsed_s
            };
            match name {
                WASTE_ATMOSPHERE if self.combine_waste_atmosphere => {
                    recipe.add_combined_input(name, quantity, CARBON_DIOXIDE)
                }
                CARBON_DIOXIDE if self.combine_waste_atmosphere => {
                    recipe.add_secondary_input(name, quantity)
                }
                _ => recipe.add_input(name, quantity),
            }
        }
        for output in &self.outputs {
            let name = output.resource.as_str();
            let quantity = if breathable && name == OXYGEN {
                0.0
            } else {
                output.rate * elapsed_s
            };
            recipe.add_output(name, quantity, true);
        }
        recipe
    }

    /// First input found empty at the previous sync, if any.
    fn missing_input(&self, res: &mut StepResources<'_>, breathable: bool) -> Option<String> {
        for input in &self.inputs {
            let name = input.resource.as_str();
            if is_atmosphere_input(name) {
                if breathable {
                    continue;
                }
                if self.combine_waste_atmosphere {
                    let waste = res.previous(WASTE_ATMOSPHERE).amount();
                    let co2 = res.previous(CARBON_DIOXIDE).amount();
                    if waste <= EPSILON && co2 <= EPSILON {
                        return Some(CARBON_DIOXIDE.to_string());
                    }
                    continue;
                }
            }
            if res.previous(name).amount() <= EPSILON {
                return Some(name.to_string());
            }
        }
        None
    }
}

impl BackgroundModule for GreenhouseModule {
    fn background_update(
        &self,
        state: &mut ModuleState,
        _part: &PartView<'_>,
        res: &mut StepResources<'_>,
        ctx: &VesselContext<'_>,
        elapsed_s: f64,
    ) {
        let mut growth = state.get_f64("growth", 0.0);
        if !state.get_bool("active", false) || growth >= HARVEST_READY {
            return;
        }

        let natural = ctx.environment.solar_flux;
        let mut artificial = (self.light_tolerance - natural).max(0.0);
        if artificial > 0.0 && self.light_tolerance > 0.0 {
            let lamps = self.ec_rate * (artificial / self.light_tolerance) * elapsed_s;
            res.consume(ELECTRIC_CHARGE, lamps, &Broker::GREENHOUSE);
        }
        if res.previous(ELECTRIC_CHARGE).amount() <= EPSILON {
            artificial = 0.0;
        }

        let breathable = ctx.environment.breathable;
        res.queue(self.crop_recipe(breathable, elapsed_s));

        let lighting = natural + artificial >= self.light_tolerance;
        let missing = self.missing_input(res, breathable);

        if lighting && missing.is_none() {
            growth = (growth + self.crop_rate * elapsed_s).min(1.0);
            if growth >= HARVEST_READY {
                growth = 1.0;
            }
        }

        let issue = match (&missing, lighting) {
            (Some(name), _) => format!("missing {}", name),
            (None, false) => "insufficient lighting".to_string(),
            (None, true) => String::new(),
        };

        state.set_f64("natural", natural);
        state.set_f64("artificial", artificial);
        state.set_f64("growth", growth);
        if self.crop_rate > 0.0 {
            state.set_f64("time_to_harvest", (1.0 - growth) / self.crop_rate);
        }
        state.set_str("issue", &issue);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryoFuel {
    pub resource: String,
    /// Percent of the stored amount lost per hour without cooling.
    pub boiloff_rate: f64,
}

/// Cryogenic tank. Cooling costs EC in proportion to the fuel held in the
/// part; without charge, or with cooling switched off, the fuel boils off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryoTankModule {
    /// EC per second per thousand units of fuel.
    pub cooling_cost: f64,
    #[serde(default)]
    pub fuels: Vec<CryoFuel>,
}

impl BackgroundModule for CryoTankModule {
    fn background_update(
        &self,
        state: &mut ModuleState,
        part: &PartView<'_>,
        res: &mut StepResources<'_>,
        _ctx: &VesselContext<'_>,
        elapsed_s: f64,
    ) {
        let cooling = state.get_bool("cooling_enabled", true)
            && res.previous(ELECTRIC_CHARGE).amount() > EPSILON;

        let mut ec_cost = 0.0;
        for fuel in &self.fuels {
            if res.previous(&fuel.resource).amount() <= 0.0 {
                continue;
            }
            let Some(amount) = part.amount(&fuel.resource) else {
                continue;
            };
            ec_cost += self.cooling_cost * amount * 0.001;

            if !cooling {
                // %/h to a per-second fraction
                let rate = fuel.boiloff_rate / 360_000.0;
                if rate > 0.0 {
                    let lost = amount * (1.0 - (1.0 - rate).powf(elapsed_s));
                    res.consume(&fuel.resource, lost, &Broker::BOILOFF);
                }
            }
        }

        if cooling && ec_cost > 0.0 {
            res.consume(ELECTRIC_CHARGE, ec_cost * elapsed_s, &Broker::CRYOTANK);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Bench;
    use super::super::Environment;
    use super::*;
    use crate::storage::Container;

    fn greenhouse(combine: bool) -> GreenhouseModule {
        GreenhouseModule {
            ec_rate: 2.0,
            light_tolerance: 400.0,
            crop_rate: 0.001,
            inputs: vec![
                ResourceRate::new("Water", 0.1),
                ResourceRate::new(WASTE_ATMOSPHERE, 0.2),
                ResourceRate::new(CARBON_DIOXIDE, 0.3),
            ],
            outputs: vec![ResourceRate::new(OXYGEN, 0.5), ResourceRate::new("Food", 0.05)],
            combine_waste_atmosphere: combine,
        }
    }

    fn stocked() -> Bench {
        Bench::new()
            .with(ELECTRIC_CHARGE, 100.0, 100.0)
            .with("Water", 100.0, 100.0)
            .with(WASTE_ATMOSPHERE, 0.0, 100.0)
            .with(CARBON_DIOXIDE, 100.0, 100.0)
            .with(OXYGEN, 0.0, 100.0)
            .with("Food", 0.0, 100.0)
    }

    #[test]
    fn greenhouse_grows_under_lamps() {
        let mut bench = stocked();
        bench.environment = Environment { solar_flux: 100.0, breathable: false };
        let mut state = ModuleState::new().with_bool("active", true);
        bench.step(&greenhouse(true), &mut state, 10.0);

        // lamps cover 300 of 400
        assert!((bench.amount(ELECTRIC_CHARGE) - 85.0).abs() < 1e-9);
        assert!((state.get_f64("growth", 0.0) - 0.01).abs() < 1e-12);
        assert_eq!(state.get_str("issue"), Some(""));
        // waste is empty so the whole combined need comes from CO2
        assert!((bench.amount(CARBON_DIOXIDE) - 95.0).abs() < 1e-9);
    }

    #[test]
    fn greenhouse_stalls_without_input() {
        let mut bench = stocked();
        bench.storage.containers_mut(super::super::testing::V)[1].amount = 0.0;
        let mut state = ModuleState::new().with_bool("active", true);
        bench.step(&greenhouse(true), &mut state, 10.0);
        assert_eq!(state.get_f64("growth", 0.0), 0.0);
        assert_eq!(state.get_str("issue"), Some("missing Water"));
    }

    #[test]
    fn breathable_atmosphere_skips_gas_exchange() {
        let mut bench = stocked();
        bench.environment = Environment { solar_flux: 500.0, breathable: true };
        let mut state = ModuleState::new().with_bool("active", true);
        bench.step(&greenhouse(false), &mut state, 10.0);
        assert_eq!(bench.amount(CARBON_DIOXIDE), 100.0);
        assert_eq!(bench.amount(OXYGEN), 0.0);
        assert!((bench.amount("Food") - 0.5).abs() < 1e-12);
        assert_eq!(bench.amount(ELECTRIC_CHARGE), 100.0);
    }

    #[test]
    fn ready_crop_stops_greenhouse() {
        let mut bench = stocked();
        let mut state = ModuleState::new()
            .with_bool("active", true)
            .with_f64("growth", 0.995);
        bench.step(&greenhouse(true), &mut state, 10.0);
        assert_eq!(bench.amount("Water"), 100.0);
    }

    fn tank() -> CryoTankModule {
        CryoTankModule {
            cooling_cost: 1.0,
            fuels: vec![CryoFuel { resource: "LqdHydrogen".into(), boiloff_rate: 36.0 }],
        }
    }

    #[test]
    fn cooled_tank_draws_ec() {
        let mut bench = Bench::new()
            .with(ELECTRIC_CHARGE, 100.0, 100.0)
            .with("LqdHydrogen", 1000.0, 1000.0);
        let tank_part = [Container::new("LqdHydrogen", 1000.0, 1000.0)];
        let part = PartView { crew: 0, containers: &tank_part };
        bench.step_in_part(&tank(), &mut ModuleState::new(), part, 10.0);
        assert!((bench.amount(ELECTRIC_CHARGE) - 90.0).abs() < 1e-9);
        assert_eq!(bench.amount("LqdHydrogen"), 1000.0);
    }

    #[test]
    fn uncooled_tank_boils_off() {
        let mut bench = Bench::new()
            .with(ELECTRIC_CHARGE, 100.0, 100.0)
            .with("LqdHydrogen", 1000.0, 1000.0);
        let tank_part = [Container::new("LqdHydrogen", 1000.0, 1000.0)];
        let part = PartView { crew: 0, containers: &tank_part };
        let mut state = ModuleState::new().with_bool("cooling_enabled", false);
        bench.step_in_part(&tank(), &mut state, part, 100.0);

        let expected = 1000.0 * (1.0 - 0.0001_f64).powf(100.0);
        assert!((bench.amount("LqdHydrogen") - expected).abs() < 1e-6);
        assert_eq!(bench.amount(ELECTRIC_CHARGE), 100.0);
    }
}
