//! ECS host - the live vessel world the resource engine runs against.
//!
//! Vessels are root entities carrying [`Vessel`], [`VesselEnvironment`] and
//! [`VesselCrew`]. Parts are separate entities carrying [`Part`],
//! [`PartResources`] and [`PartModules`], linked to their vessel by id.
//! [`ShipHost`] implements the collaborators the engine expects: container
//! storage and component enumeration.

use std::collections::{BTreeMap, HashMap};

use hecs::{Entity, World};
use log::info;
use vesselsim_logic::background::{
    ComponentCatalog, ComponentId, Environment, ModuleState, SimulatedComponent,
};
use vesselsim_logic::crew::CrewMember;
use vesselsim_logic::storage::{distribute_delta, sum_containers, Container, ResourceStorage, VesselId};

use crate::components::*;

/// Owns the ECS world and the vessel id → root entity index.
pub struct ShipHost {
    world: World,
    vessels: BTreeMap<VesselId, Entity>,
    next_id: u64,
}

impl ShipHost {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            vessels: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn spawn_vessel(
        &mut self,
        name: impl Into<String>,
        launch_time: f64,
        environment: Environment,
    ) -> VesselId {
        let id = VesselId(self.next_id);
        self.next_id += 1;
        let vessel = Vessel {
            id,
            name: name.into(),
            loaded: false,
            launch_time,
        };
        let entity = self
            .world
            .spawn((vessel, VesselEnvironment(environment), VesselCrew::default()));
        self.vessels.insert(id, entity);
        id
    }

    /// Attach a new part at the end of the vessel. Returns its index, or
    /// `None` if the vessel does not exist.
    pub fn add_part(
        &mut self,
        vessel: VesselId,
        name: impl Into<String>,
        crew: usize,
        containers: Vec<Container>,
        modules: Vec<ModuleSlot>,
    ) -> Option<u32> {
        if !self.contains(vessel) {
            return None;
        }
        let index = self.part_count(vessel) as u32;
        let part = Part {
            vessel,
            index,
            name: name.into(),
            crew,
        };
        self.world
            .spawn((part, PartResources(containers), PartModules(modules)));
        Some(index)
    }

    pub fn contains(&self, vessel: VesselId) -> bool {
        self.vessels.contains_key(&vessel)
    }

    /// Vessel ids in ascending order.
    pub fn vessel_ids(&self) -> Vec<VesselId> {
        self.vessels.keys().copied().collect()
    }

    pub fn vessel_count(&self) -> usize {
        self.vessels.len()
    }

    pub fn vessel(&self, id: VesselId) -> Option<Vessel> {
        let entity = *self.vessels.get(&id)?;
        self.world.get::<&Vessel>(entity).ok().map(|v| (*v).clone())
    }

    pub fn part_count(&self, vessel: VesselId) -> usize {
        self.world
            .query::<&Part>()
            .iter()
            .filter(|(_, p)| p.vessel == vessel)
            .count()
    }

    pub fn set_loaded(&mut self, id: VesselId, loaded: bool) -> bool {
        let Some(&entity) = self.vessels.get(&id) else {
            return false;
        };
        match self.world.get::<&mut Vessel>(entity) {
            Ok(mut vessel) => {
                vessel.loaded = loaded;
                true
            }
            Err(_) => false,
        }
    }

    pub fn environment(&self, id: VesselId) -> Environment {
        self.vessels
            .get(&id)
            .and_then(|&e| self.world.get::<&VesselEnvironment>(e).ok().map(|env| env.0))
            .unwrap_or_default()
    }

    pub fn set_environment(&mut self, id: VesselId, environment: Environment) {
        if let Some(&entity) = self.vessels.get(&id) {
            if let Ok(mut env) = self.world.get::<&mut VesselEnvironment>(entity) {
                env.0 = environment;
            }
        }
    }

    pub fn crew(&self, id: VesselId) -> Vec<CrewMember> {
        self.vessels
            .get(&id)
            .and_then(|&e| self.world.get::<&VesselCrew>(e).ok().map(|c| c.0.clone()))
            .unwrap_or_default()
    }

    pub fn add_crew(&mut self, id: VesselId, member: CrewMember) -> bool {
        let Some(&entity) = self.vessels.get(&id) else {
            return false;
        };
        match self.world.get::<&mut VesselCrew>(entity) {
            Ok(mut crew) => {
                crew.0.push(member);
                true
            }
            Err(_) => false,
        }
    }

    /// Move the crew out of the world for the duration of a step.
    pub fn take_crew(&mut self, id: VesselId) -> Vec<CrewMember> {
        self.vessels
            .get(&id)
            .and_then(|&e| self.world.get::<&mut VesselCrew>(e).ok())
            .map(|mut crew| std::mem::take(&mut crew.0))
            .unwrap_or_default()
    }

    pub fn restore_crew(&mut self, id: VesselId, members: Vec<CrewMember>) {
        if let Some(&entity) = self.vessels.get(&id) {
            if let Ok(mut crew) = self.world.get::<&mut VesselCrew>(entity) {
                crew.0 = members;
            }
        }
    }

    /// Every container of the vessel, in part order.
    pub fn containers(&self, vessel: VesselId) -> Vec<Container> {
        let mut parts: Vec<(u32, Vec<Container>)> = self
            .world
            .query::<(&Part, &PartResources)>()
            .iter()
            .filter(|(_, (p, _))| p.vessel == vessel)
            .map(|(_, (p, r))| (p.index, r.0.clone()))
            .collect();
        parts.sort_by_key(|(index, _)| *index);
        parts.into_iter().flat_map(|(_, c)| c).collect()
    }

    pub fn module_state(&self, vessel: VesselId, id: ComponentId) -> Option<ModuleState> {
        self.world
            .query::<(&Part, &PartModules)>()
            .iter()
            .find(|(_, (p, _))| p.vessel == vessel && p.index == id.part)
            .and_then(|(_, (_, m))| m.0.get(id.index as usize).map(|slot| slot.state.clone()))
    }

    pub fn set_module_state(&mut self, vessel: VesselId, id: ComponentId, state: ModuleState) -> bool {
        for (_, (part, modules)) in self.world.query_mut::<(&Part, &mut PartModules)>() {
            if part.vessel != vessel || part.index != id.part {
                continue;
            }
            if let Some(slot) = modules.0.get_mut(id.index as usize) {
                slot.state = state;
                return true;
            }
        }
        false
    }

    /// Remove the vessel root and all of its parts.
    pub fn despawn_vessel(&mut self, id: VesselId) -> bool {
        let Some(root) = self.vessels.remove(&id) else {
            return false;
        };
        let parts: Vec<Entity> = self
            .world
            .query::<&Part>()
            .iter()
            .filter(|(_, p)| p.vessel == id)
            .map(|(e, _)| e)
            .collect();
        for entity in parts {
            let _ = self.world.despawn(entity);
        }
        let _ = self.world.despawn(root);
        true
    }

    /// Dock `from` onto `into`: parts are renumbered after `into`'s own,
    /// crew come aboard, and `from` ceases to exist.
    pub fn merge(&mut self, into: VesselId, from: VesselId) -> bool {
        if into == from || !self.contains(into) || !self.contains(from) {
            return false;
        }
        let offset = self.part_count(into) as u32;
        for (_, part) in self.world.query_mut::<&mut Part>() {
            if part.vessel == from {
                part.vessel = into;
                part.index += offset;
            }
        }
        let crew = self.take_crew(from);
        if let Some(&entity) = self.vessels.get(&into) {
            if let Ok(mut aboard) = self.world.get::<&mut VesselCrew>(entity) {
                aboard.0.extend(crew);
            }
        }
        if let Some(root) = self.vessels.remove(&from) {
            let _ = self.world.despawn(root);
        }
        info!("{} docked into {}", from, into);
        true
    }
}

impl Default for ShipHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceStorage for ShipHost {
    fn sum_amount_and_capacity(&self, vessel: VesselId, resource: &str) -> (f64, f64) {
        let mut query = self.world.query::<(&Part, &PartResources)>();
        let containers = query
            .iter()
            .filter(|(_, (p, _))| p.vessel == vessel)
            .flat_map(|(_, (_, r))| r.0.iter());
        sum_containers(containers, resource)
    }

    fn apply_delta(&mut self, vessel: VesselId, resource: &str, delta: f64) {
        let mut matching: Vec<&mut Container> = self
            .world
            .query_mut::<(&Part, &mut PartResources)>()
            .into_iter()
            .filter(|(_, (p, _))| p.vessel == vessel)
            .flat_map(|(_, (_, r))| r.0.iter_mut())
            .filter(|c| c.participates(resource))
            .collect();
        distribute_delta(&mut matching, delta);
    }
}

impl ComponentCatalog for ShipHost {
    fn simulated_components(&self, vessel: VesselId) -> Vec<SimulatedComponent> {
        let mut components = Vec::new();
        for (_, (part, resources, modules)) in self
            .world
            .query::<(&Part, &PartResources, &PartModules)>()
            .iter()
        {
            if part.vessel != vessel {
                continue;
            }
            for (index, slot) in modules.0.iter().enumerate() {
                components.push(SimulatedComponent {
                    id: ComponentId {
                        part: part.index,
                        index: index as u32,
                    },
                    kind: slot.kind.clone(),
                    state: slot.state.clone(),
                    part_crew: part.crew,
                    part_containers: resources.0.clone(),
                });
            }
        }
        components.sort_by_key(|c| c.id);
        components
    }

    fn write_back(&mut self, vessel: VesselId, components: Vec<SimulatedComponent>) {
        let mut by_part: HashMap<u32, Vec<SimulatedComponent>> = HashMap::new();
        for component in components {
            by_part.entry(component.id.part).or_default().push(component);
        }
        for (_, (part, modules)) in self.world.query_mut::<(&Part, &mut PartModules)>() {
            if part.vessel != vessel {
                continue;
            }
            let Some(updated) = by_part.remove(&part.index) else {
                continue;
            };
            for component in updated {
                if let Some(slot) = modules.0.get_mut(component.id.index as usize) {
                    slot.state = component.state;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesselsim_logic::background::{LightModule, ModuleKind};

    fn light() -> ModuleSlot {
        ModuleSlot {
            kind: ModuleKind::Light(LightModule {
                ec_rate: 0.04,
                uses_resources: true,
            }),
            state: ModuleState::new().with_bool("on", true),
        }
    }

    fn host_with_two_tanks() -> (ShipHost, VesselId) {
        let mut host = ShipHost::new();
        let v = host.spawn_vessel("Tug", 0.0, Environment::default());
        host.add_part(v, "tank-a", 0, vec![Container::new("Water", 10.0, 20.0)], vec![]);
        host.add_part(
            v,
            "tank-b",
            1,
            vec![
                Container::new("Water", 30.0, 40.0),
                Container::new("Water", 50.0, 50.0).with_flow(false),
            ],
            vec![light()],
        );
        (host, v)
    }

    #[test]
    fn sums_only_flowing_containers_of_own_vessel() {
        let (mut host, v) = host_with_two_tanks();
        let other = host.spawn_vessel("Other", 0.0, Environment::default());
        host.add_part(other, "tank", 0, vec![Container::new("Water", 99.0, 99.0)], vec![]);

        assert_eq!(host.sum_amount_and_capacity(v, "Water"), (40.0, 60.0));
        assert_eq!(host.sum_amount_and_capacity(v, "Oxygen"), (0.0, 0.0));
    }

    #[test]
    fn delta_is_balanced_across_parts() {
        let (mut host, v) = host_with_two_tanks();
        host.apply_delta(v, "Water", -20.0);
        let containers = host.containers(v);
        assert!((containers[0].amount - 5.0).abs() < 1e-9);
        assert!((containers[1].amount - 15.0).abs() < 1e-9);
        assert_eq!(containers[2].amount, 50.0);
    }

    #[test]
    fn catalog_round_trips_module_state() {
        let (mut host, v) = host_with_two_tanks();
        let mut components = host.simulated_components(v);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].id, ComponentId { part: 1, index: 0 });
        assert_eq!(components[0].part_crew, 1);

        components[0].state.set_bool("on", false);
        host.write_back(v, components);
        let state = host.module_state(v, ComponentId { part: 1, index: 0 });
        assert_eq!(state.map(|s| s.get_bool("on", true)), Some(false));
    }

    #[test]
    fn merge_renumbers_parts_and_moves_crew() {
        let (mut host, a) = host_with_two_tanks();
        let b = host.spawn_vessel("Lander", 0.0, Environment::default());
        host.add_part(b, "pod", 1, vec![Container::new("Water", 5.0, 5.0)], vec![light()]);
        host.add_crew(b, CrewMember::new("Val"));

        assert!(host.merge(a, b));
        assert!(!host.contains(b));
        assert_eq!(host.part_count(a), 3);
        assert_eq!(host.crew(a).len(), 1);
        assert_eq!(host.sum_amount_and_capacity(a, "Water"), (45.0, 65.0));
        let ids: Vec<ComponentId> = host.simulated_components(a).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![ComponentId { part: 1, index: 0 }, ComponentId { part: 2, index: 0 }]);
    }

    #[test]
    fn despawn_removes_parts() {
        let (mut host, v) = host_with_two_tanks();
        assert!(host.despawn_vessel(v));
        assert!(!host.despawn_vessel(v));
        assert_eq!(host.world().len(), 0);
    }

    #[test]
    fn take_and_restore_crew() {
        let (mut host, v) = host_with_two_tanks();
        host.add_crew(v, CrewMember::new("Jeb"));
        let crew = host.take_crew(v);
        assert_eq!(crew.len(), 1);
        assert!(host.crew(v).is_empty());
        host.restore_crew(v, crew);
        assert_eq!(host.crew(v).len(), 1);
    }
}
