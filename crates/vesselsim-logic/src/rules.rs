//! Crew life-support rules.
//!
//! A rule makes every active crew member draw `rate` of its input, either
//! continuously (units/s) or as a batch every `interval` seconds, optionally
//! turning it into an output that is always dumped. When the input runs
//! short the member's `problem` accumulator grows by `degeneration`.
//!
//! | Kind | `interval` | `rate` unit | Rate reporting |
//! |------|-----------|-------------|----------------|
//! | Continuous | 0 | per second | measured |
//! | Interval | > 0 | per batch | averaged over the interval |

use serde::{Deserialize, Serialize};

use crate::book::VesselResourceBook;
use crate::broker::{Broker, BrokerCategory};
use crate::crew::CrewMember;
use crate::ledger::PeriodicRates;
use crate::recipe::Recipe;
use crate::settings::SettingsError;
use crate::storage::ResourceStorage;
use crate::EPSILON;

fn default_ratio() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    /// Per second, or per batch when `interval > 0`.
    #[serde(default)]
    pub rate: f64,
    /// Output produced per unit of input.
    #[serde(default = "default_ratio")]
    pub ratio: f64,
    /// Seconds between batches. 0 means continuous.
    #[serde(default)]
    pub interval: f64,
    /// Problem added per second (or per batch) without enough input.
    #[serde(default)]
    pub degeneration: f64,
}

impl Rule {
    pub fn broker(&self) -> Broker {
        Broker::named(self.name.clone(), BrokerCategory::Crew)
    }

    pub fn is_interval(&self) -> bool {
        self.interval > EPSILON
    }

    /// Per-member input rate averaged over the interval, in units/s.
    pub fn average_rate(&self) -> f64 {
        if self.is_interval() {
            self.rate / self.interval
        } else {
            self.rate
        }
    }

    /// Apply the rule to every active member of `crew` for `elapsed_s`.
    ///
    /// Input availability is judged on the amount settled at the last sync,
    /// so the outcome does not depend on what else runs this step.
    pub fn execute<S>(
        &self,
        book: &mut VesselResourceBook,
        storage: &S,
        crew: &mut [CrewMember],
        elapsed_s: f64,
    ) where
        S: ResourceStorage + ?Sized,
    {
        let broker = self.broker();
        let active = crew.iter().filter(|c| !c.disabled).count();
        if active == 0 || elapsed_s <= 0.0 {
            return;
        }

        let settled = self
            .input
            .as_deref()
            .map(|name| book.resource(storage, name).amount());

        let mut batch_total = 0.0;
        for member in crew.iter_mut().filter(|c| !c.disabled) {
            let state = member.rule(&self.name);

            // batches that fell due during this step
            let units = if self.is_interval() {
                state.time_since += elapsed_s;
                let batches = (state.time_since / self.interval).floor();
                state.time_since -= batches * self.interval;
                batches
            } else {
                elapsed_s
            };

            let required = self.rate * units;
            let availability = match settled {
                Some(amount) if required * (active as f64) > EPSILON => {
                    (amount / (required * active as f64)).clamp(0.0, 1.0)
                }
                Some(_) => 1.0,
                None => 0.0,
            };

            if let Some(input) = &self.input {
                self.draw(book, input, required, &broker);
            }
            batch_total += required;

            if units > 0.0 {
                state.problem += self.degeneration * units * (1.0 - availability);
            }
        }

        if self.is_interval() {
            let batch_rate = self.average_rate() * active as f64;
            if let Some(input) = &self.input {
                book.ledger(input)
                    .record_interval_rule(batch_total, -batch_rate, &broker);
                if let Some(output) = &self.output {
                    book.ledger(output).record_interval_rule(
                        batch_total * self.ratio,
                        batch_rate * self.ratio,
                        &broker,
                    );
                }
            }
        }
    }

    fn draw(&self, book: &mut VesselResourceBook, input: &str, required: f64, broker: &Broker) {
        match &self.output {
            None => book.consume(input, required, broker),
            Some(output) => {
                let mut recipe = Recipe::new(broker.clone());
                recipe.add_input(input, required);
                recipe.add_output(output.as_str(), required * self.ratio, true);
                book.queue_recipe(recipe);
            }
        }
    }
}

/// The crew rules in effect, also the table of periodic rates used for
/// depletion estimates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Parse a JSON array of rules.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let set: RuleSet = serde_json::from_str(json)?;
        for rule in &set.rules {
            if rule.name.is_empty() {
                return Err(SettingsError::Invalid {
                    field: "rules.name",
                    reason: "rule without a name".into(),
                });
            }
            if rule.rate < 0.0 || rule.interval < 0.0 || rule.degeneration < 0.0 {
                return Err(SettingsError::Invalid {
                    field: "rules",
                    reason: format!("rule '{}' has a negative rate, interval or degeneration", rule.name),
                });
            }
        }
        Ok(set)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn execute<S>(
        &self,
        book: &mut VesselResourceBook,
        storage: &S,
        crew: &mut [CrewMember],
        elapsed_s: f64,
    ) where
        S: ResourceStorage + ?Sized,
    {
        for rule in &self.rules {
            rule.execute(book, storage, crew, elapsed_s);
        }
    }
}

impl PeriodicRates for RuleSet {
    fn periodic_rate(&self, resource: &str) -> f64 {
        self.rules
            .iter()
            .filter(|r| r.is_interval())
            .map(|r| {
                let mut rate = 0.0;
                if r.input.as_deref() == Some(resource) {
                    rate -= r.average_rate();
                }
                if r.output.as_deref() == Some(resource) {
                    rate += r.average_rate() * r.ratio;
                }
                rate
            })
            .sum()
    }
}
