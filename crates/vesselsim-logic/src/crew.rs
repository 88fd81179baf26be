//! Crew records, per-rule accumulators and cure application.
//!
//! Rules (see [`crate::rules`]) accumulate a `problem` value per crew
//! member, and recipes carrying cures reduce it for the members currently
//! assigned to a matching sickbay.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Accumulated state of one rule for one crew member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleState {
    /// Degeneration accumulated so far. Never negative.
    pub problem: f64,
    /// Seconds since the rule's interval last fired.
    pub time_since: f64,
}

/// One crew member as seen by the resource engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewMember {
    pub name: String,
    /// Trait names, matched against specialist experience effects.
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub experience_level: u32,
    /// Sickbay tags this member is currently assigned to.
    #[serde(default)]
    pub sickbay: BTreeSet<String>,
    #[serde(default)]
    pub rules: BTreeMap<String, RuleState>,
    /// Disabled members are skipped by rules (e.g. hibernating in a pod).
    #[serde(default)]
    pub disabled: bool,
}

impl CrewMember {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            traits: Vec::new(),
            experience_level: 0,
            sickbay: BTreeSet::new(),
            rules: BTreeMap::new(),
            disabled: false,
        }
    }

    pub fn with_trait(mut self, name: impl Into<String>, level: u32) -> Self {
        self.traits.push(name.into());
        self.experience_level = level;
        self
    }

    pub fn in_sickbay(mut self, tag: impl Into<String>) -> Self {
        self.sickbay.insert(tag.into());
        self
    }

    pub fn has_trait(&self, name: &str) -> bool {
        self.traits.iter().any(|t| t == name)
    }

    /// Get or create the state of `rule`.
    pub fn rule(&mut self, rule: &str) -> &mut RuleState {
        self.rules.entry(rule.to_string()).or_default()
    }

    pub fn problem(&self, rule: &str) -> f64 {
        self.rules.get(rule).map(|r| r.problem).unwrap_or(0.0)
    }
}

/// Highest experience level among crew with the `effect` trait, if any.
pub fn best_experience(crew: &[CrewMember], effect: &str) -> Option<u32> {
    crew.iter()
        .filter(|c| c.has_trait(effect))
        .map(|c| c.experience_level)
        .max()
}

/// Receiver of recipe cures.
pub trait CureTarget {
    /// Reduce the `rule` problem by `amount` in total, split equally among
    /// every member assigned to `sickbay`. Problems never go below zero.
    fn cure(&mut self, rule: &str, sickbay: &str, amount: f64);
}

/// No crew: cures have nothing to act on.
impl CureTarget for () {
    fn cure(&mut self, _rule: &str, _sickbay: &str, _amount: f64) {}
}

impl CureTarget for Vec<CrewMember> {
    fn cure(&mut self, rule: &str, sickbay: &str, amount: f64) {
        let patients = self.iter().filter(|c| c.sickbay.contains(sickbay)).count();
        if patients == 0 {
            return;
        }
        let share = amount / patients as f64;
        for member in self.iter_mut().filter(|c| c.sickbay.contains(sickbay)) {
            let state = member.rule(rule);
            state.problem = (state.problem - share).max(0.0);
        }
    }
}
