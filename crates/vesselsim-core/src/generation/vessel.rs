//! Vessel templates and spawning into the host world.

use log::info;
use rand::Rng;
use serde::{Deserialize, Serialize};
use vesselsim_logic::background::Environment;
use vesselsim_logic::crew::CrewMember;
use vesselsim_logic::storage::{Container, VesselId};

use crate::components::ModuleSlot;
use crate::error::TemplateError;
use crate::host::ShipHost;

/// Template for one part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartTemplate {
    pub name: String,
    /// Crew seats occupied in this part.
    #[serde(default)]
    pub crew: usize,
    #[serde(default)]
    pub resources: Vec<Container>,
    #[serde(default)]
    pub modules: Vec<ModuleSlot>,
}

/// Template for a whole vessel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselTemplate {
    pub name: String,
    #[serde(default)]
    pub launch_time: f64,
    #[serde(default)]
    pub environment: Environment,
    pub parts: Vec<PartTemplate>,
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

impl VesselTemplate {
    pub fn validate(&self) -> Result<(), TemplateError> {
        let invalid = |reason: String| TemplateError::Invalid {
            template: self.name.clone(),
            reason,
        };
        if self.name.is_empty() {
            return Err(invalid("vessel has no name".into()));
        }
        if self.parts.is_empty() {
            return Err(invalid("vessel has no parts".into()));
        }
        for part in &self.parts {
            for c in &part.resources {
                if c.capacity < 0.0 || c.amount < 0.0 || c.amount > c.capacity {
                    return Err(invalid(format!(
                        "part '{}': {} amount {} outside [0, {}]",
                        part.name, c.resource, c.amount, c.capacity
                    )));
                }
            }
        }
        let seats: usize = self.parts.iter().map(|p| p.crew).sum();
        if seats > self.crew.len() {
            return Err(invalid(format!(
                "{} seats occupied but only {} crew listed",
                seats,
                self.crew.len()
            )));
        }
        Ok(())
    }
}

/// Parse and validate a JSON array of vessel templates.
pub fn load_templates(json: &str) -> Result<Vec<VesselTemplate>, TemplateError> {
    let templates: Vec<VesselTemplate> = serde_json::from_str(json)?;
    for template in &templates {
        template.validate()?;
    }
    Ok(templates)
}

/// Spawn `template` into `host`.
///
/// With `jitter > 0` every initial amount is scaled by a random factor in
/// `[1 - jitter, 1 + jitter]` and clamped to its capacity.
pub fn generate_vessel(
    host: &mut ShipHost,
    template: &VesselTemplate,
    rng: &mut impl Rng,
    jitter: f64,
) -> VesselId {
    let id = host.spawn_vessel(&template.name, template.launch_time, template.environment);

    for part in &template.parts {
        let resources = part
            .resources
            .iter()
            .map(|c| {
                let mut c = c.clone();
                if jitter > 0.0 {
                    let factor = 1.0 + rng.gen_range(-jitter..=jitter);
                    c.amount = (c.amount * factor).clamp(0.0, c.capacity);
                }
                c
            })
            .collect();
        host.add_part(id, &part.name, part.crew, resources, part.modules.clone());
    }
    for member in &template.crew {
        host.add_crew(id, member.clone());
    }

    info!(
        "Spawned {} '{}' with {} parts and {} crew",
        id,
        template.name,
        template.parts.len(),
        template.crew.len()
    );
    id
}
