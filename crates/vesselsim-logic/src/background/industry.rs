//! Converters, drills and configurable processes.
//!
//! Converters and drills stamp `last_update_time` on every active step so
//! the host does not replay the same interval with its own catch-up logic.

use serde::{Deserialize, Serialize};

use super::{
    bonus, BackgroundModule, ModuleState, PartView, ResourceRate, SpecialistBonus,
    StepResources, VesselContext,
};
use crate::broker::{Broker, BrokerCategory};
use crate::recipe::Recipe;
use crate::{ELECTRIC_CHARGE, EPSILON};

fn full() -> f64 {
    1.0
}

/// Stock resource converter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterModule {
    #[serde(default)]
    pub inputs: Vec<ResourceRate>,
    #[serde(default)]
    pub outputs: Vec<ResourceRate>,
    /// Level at which every output counts as full and the converter idles.
    #[serde(default = "full")]
    pub fill_amount: f64,
    #[serde(default)]
    pub specialist: Option<SpecialistBonus>,
}

impl BackgroundModule for ConverterModule {
    fn background_update(
        &self,
        state: &mut ModuleState,
        _part: &PartView<'_>,
        res: &mut StepResources<'_>,
        ctx: &VesselContext<'_>,
        elapsed_s: f64,
    ) {
        if !state.get_bool("active", false) {
            return;
        }

        let all_full = self
            .outputs
            .iter()
            .all(|o| res.previous(&o.resource).level() >= self.fill_amount - EPSILON);

        if !all_full {
            let k = bonus(&self.specialist, ctx.crew) * elapsed_s;
            let mut recipe = Recipe::new(Broker::STOCK_CONVERTER);
            for input in &self.inputs {
                recipe.add_input(input.resource.as_str(), input.rate * k);
            }
            for output in &self.outputs {
                recipe.add_output(output.resource.as_str(), output.rate * k, output.dump);
            }
            res.queue(recipe);
        }

        state.set_f64("last_update_time", ctx.now);
    }
}

/// Surface harvester. Local abundance is read from `state["abundance"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrillModule {
    pub resource: String,
    #[serde(default)]
    pub inputs: Vec<ResourceRate>,
    pub efficiency: f64,
    #[serde(default)]
    pub harvest_threshold: f64,
    #[serde(default = "full")]
    pub fill_amount: f64,
    #[serde(default)]
    pub specialist: Option<SpecialistBonus>,
}

impl BackgroundModule for DrillModule {
    fn background_update(
        &self,
        state: &mut ModuleState,
        _part: &PartView<'_>,
        res: &mut StepResources<'_>,
        ctx: &VesselContext<'_>,
        elapsed_s: f64,
    ) {
        if !state.get_bool("active", false) {
            return;
        }

        let abundance = state.get_f64("abundance", 0.0);
        let has_room = res.previous(&self.resource).level() < self.fill_amount - EPSILON;
        if has_room && abundance > self.harvest_threshold {
            let mut recipe = Recipe::new(Broker::STOCK_DRILL);
            for input in &self.inputs {
                recipe.add_input(input.resource.as_str(), input.rate * elapsed_s);
            }
            let yield_rate = abundance * self.efficiency * bonus(&self.specialist, ctx.crew);
            recipe.add_output(self.resource.as_str(), yield_rate * elapsed_s, true);
            res.queue(recipe);
        }

        state.set_f64("last_update_time", ctx.now);
    }
}

/// Drill attached to an asteroid. The asteroid's remaining mass lives in
/// this component's state (`current_mass`, `mass_threshold`) together with
/// the resource `abundance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsteroidDrillModule {
    pub resource: String,
    pub power_consumption: f64,
    pub efficiency: f64,
    /// Mass per unit of `resource`.
    pub density: f64,
    #[serde(default)]
    pub specialist: Option<SpecialistBonus>,
}

impl BackgroundModule for AsteroidDrillModule {
    fn background_update(
        &self,
        state: &mut ModuleState,
        _part: &PartView<'_>,
        res: &mut StepResources<'_>,
        ctx: &VesselContext<'_>,
        elapsed_s: f64,
    ) {
        if !state.get_bool("active", false) {
            return;
        }

        let mass = state.get_f64("current_mass", 0.0);
        let threshold = state.get_f64("mass_threshold", 0.0);
        let abundance = state.get_f64("abundance", 0.0);

        if mass > threshold && abundance > EPSILON {
            let mined = abundance * self.efficiency * bonus(&self.specialist, ctx.crew) * elapsed_s;

            let mut recipe = Recipe::new(Broker::STOCK_DRILL);
            recipe.add_input(ELECTRIC_CHARGE, self.power_consumption * elapsed_s);
            recipe.add_output(self.resource.as_str(), mined, true);
            res.queue(recipe);

            // judged on last step's charge, like every other adapter
            if res.previous(ELECTRIC_CHARGE).amount() > EPSILON {
                state.set_f64("current_mass", mass - self.density * mined);
            }
        }

        state.set_f64("last_update_time", ctx.now);
    }
}

/// Cure applied by a process to crew in the matching sickbay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessCure {
    pub rule: String,
    /// Problem removed per second at full capacity.
    pub rate: f64,
    pub sickbay: String,
}

/// Configurable process (scrubber, water recycler, sickbay...).
///
/// `state["capacity"]` overrides the configured capacity, so a part can
/// run several units of the same process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessModule {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<ResourceRate>,
    #[serde(default)]
    pub outputs: Vec<ResourceRate>,
    #[serde(default)]
    pub cures: Vec<ProcessCure>,
    #[serde(default = "full")]
    pub capacity: f64,
}

impl BackgroundModule for ProcessModule {
    fn background_update(
        &self,
        state: &mut ModuleState,
        _part: &PartView<'_>,
        res: &mut StepResources<'_>,
        _ctx: &VesselContext<'_>,
        elapsed_s: f64,
    ) {
        if !state.get_bool("running", true) {
            return;
        }
        let k = state.get_f64("capacity", self.capacity) * elapsed_s;
        if k <= EPSILON {
            return;
        }

        let mut recipe = Recipe::new(Broker::named(self.name.clone(), BrokerCategory::Converter));
        for input in &self.inputs {
            recipe.add_input(input.resource.as_str(), input.rate * k);
        }
        for output in &self.outputs {
            recipe.add_output(output.resource.as_str(), output.rate * k, output.dump);
        }
        for cure in &self.cures {
            recipe.add_cure(cure.rule.as_str(), cure.rate * k, cure.sickbay.as_str());
        }
        res.queue(recipe);
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Bench;
    use super::*;
    use crate::crew::CrewMember;

    fn electrolyzer() -> ConverterModule {
        ConverterModule {
            inputs: vec![ResourceRate::new("Water", 1.0)],
            outputs: vec![
                ResourceRate::new("Hydrogen", 2.0),
                ResourceRate::new("Oxygen", 1.0).dumped(),
            ],
            fill_amount: 0.95,
            specialist: None,
        }
    }

    #[test]
    fn converter_runs_and_stamps_time() {
        let mut bench = Bench::new()
            .with("Water", 100.0, 100.0)
            .with("Hydrogen", 0.0, 100.0)
            .with("Oxygen", 0.0, 100.0);
        let mut state = ModuleState::new().with_bool("active", true);
        bench.step(&electrolyzer(), &mut state, 10.0);
        assert_eq!(bench.amount("Water"), 90.0);
        assert_eq!(bench.amount("Hydrogen"), 20.0);
        assert_eq!(state.get_f64("last_update_time", 0.0), 1000.0);
    }

    #[test]
    fn converter_idles_when_outputs_full() {
        let mut bench = Bench::new()
            .with("Water", 100.0, 100.0)
            .with("Hydrogen", 99.0, 100.0)
            .with("Oxygen", 100.0, 100.0);
        let mut state = ModuleState::new().with_bool("active", true);
        bench.step(&electrolyzer(), &mut state, 10.0);
        assert_eq!(bench.amount("Water"), 100.0);
        assert_eq!(state.get_f64("last_update_time", 0.0), 1000.0);
    }

    #[test]
    fn converter_specialist_bonus_scales_recipe() {
        let mut bench = Bench::new()
            .with("Water", 100.0, 100.0)
            .with("Hydrogen", 0.0, 100.0)
            .with("Oxygen", 0.0, 100.0);
        bench.crew = vec![CrewMember::new("Bill").with_trait("ConverterSkill", 1)];
        let mut module = electrolyzer();
        module.specialist = Some(SpecialistBonus {
            experience_effect: "ConverterSkill".into(),
            efficiency_bonus: 1.0,
            specialist_bonus_base: 0.5,
            specialist_efficiency_factor: 0.25,
        });
        bench.step(&module, &mut ModuleState::new().with_bool("active", true), 10.0);
        assert_eq!(bench.amount("Water"), 90.0);
    }

    #[test]
    fn drill_respects_threshold_and_fill() {
        let drill = DrillModule {
            resource: "Ore".into(),
            inputs: vec![ResourceRate::new(ELECTRIC_CHARGE, 1.0)],
            efficiency: 2.0,
            harvest_threshold: 0.1,
            fill_amount: 1.0,
            specialist: None,
        };
        let mut bench = Bench::new()
            .with(ELECTRIC_CHARGE, 100.0, 100.0)
            .with("Ore", 0.0, 100.0);

        let mut poor = ModuleState::new().with_bool("active", true).with_f64("abundance", 0.05);
        bench.step(&drill, &mut poor, 10.0);
        assert_eq!(bench.amount("Ore"), 0.0);

        let mut rich = ModuleState::new().with_bool("active", true).with_f64("abundance", 0.5);
        bench.step(&drill, &mut rich, 10.0);
        assert!((bench.amount("Ore") - 10.0).abs() < 1e-12);
        assert!((bench.amount(ELECTRIC_CHARGE) - 90.0).abs() < 1e-12);
    }

    #[test]
    fn asteroid_drill_drains_mass_only_with_charge() {
        let drill = AsteroidDrillModule {
            resource: "Ore".into(),
            power_consumption: 1.0,
            efficiency: 1.0,
            density: 0.01,
            specialist: None,
        };
        let state = || {
            ModuleState::new()
                .with_bool("active", true)
                .with_f64("current_mass", 50.0)
                .with_f64("mass_threshold", 10.0)
                .with_f64("abundance", 0.5)
        };

        let mut dark = Bench::new().with(ELECTRIC_CHARGE, 0.0, 100.0).with("Ore", 0.0, 100.0);
        let mut s = state();
        dark.step(&drill, &mut s, 10.0);
        assert_eq!(s.get_f64("current_mass", 0.0), 50.0);
        assert_eq!(dark.amount("Ore"), 0.0);

        let mut lit = Bench::new().with(ELECTRIC_CHARGE, 100.0, 100.0).with("Ore", 0.0, 100.0);
        let mut s = state();
        lit.step(&drill, &mut s, 10.0);
        assert!((s.get_f64("current_mass", 0.0) - 49.95).abs() < 1e-9);
        assert!((lit.amount("Ore") - 5.0).abs() < 1e-12);
    }

    #[test]
    fn process_applies_capacity_and_cures() {
        let sickbay = ProcessModule {
            name: "sickbay".into(),
            inputs: vec![ResourceRate::new(ELECTRIC_CHARGE, 1.0)],
            outputs: vec![],
            cures: vec![ProcessCure {
                rule: "radiation".into(),
                rate: 0.5,
                sickbay: "rtg_sickbay".into(),
            }],
            capacity: 1.0,
        };
        let mut bench = Bench::new().with(ELECTRIC_CHARGE, 100.0, 100.0);
        bench.crew = vec![
            CrewMember::new("Val").in_sickbay("rtg_sickbay"),
            CrewMember::new("Bill"),
        ];
        for member in bench.crew.iter_mut() {
            member.rule("radiation").problem = 8.0;
        }

        let mut state = ModuleState::new().with_f64("capacity", 2.0);
        bench.step(&sickbay, &mut state, 5.0);
        assert_eq!(bench.amount(ELECTRIC_CHARGE), 90.0);
        assert!((bench.crew[0].problem("radiation") - 3.0).abs() < 1e-12);
        assert_eq!(bench.crew[1].problem("radiation"), 8.0);

        bench.step(&sickbay, &mut ModuleState::new().with_bool("running", false), 5.0);
        assert_eq!(bench.amount(ELECTRIC_CHARGE), 90.0);
        assert!((bench.crew[0].problem("radiation") - 3.0).abs() < 1e-12);
    }
}
