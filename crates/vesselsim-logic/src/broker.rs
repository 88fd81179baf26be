//! Brokers - the named producers and consumers behind every flow.
//!
//! A broker is only bookkeeping: the engine sums each broker's
//! contribution over a step so a display can break a resource's rate down
//! by source. It never affects how much is produced or consumed.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Broad grouping of brokers for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BrokerCategory {
    Unknown,
    Generator,
    Converter,
    SolarPanel,
    Harvester,
    Rtg,
    VesselSystem,
    Crew,
    Science,
}

/// A named source or sink of resource flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Broker {
    pub id: Cow<'static, str>,
    pub category: BrokerCategory,
}

impl Broker {
    pub const OTHERS: Broker = Broker::fixed("Others", BrokerCategory::Unknown);
    /// Flow observed in storage that no broker accounted for.
    pub const UNSUPPORTED: Broker = Broker::fixed("Unsupported", BrokerCategory::Unknown);
    pub const COMMAND: Broker = Broker::fixed("Command", BrokerCategory::VesselSystem);
    pub const LIGHT: Broker = Broker::fixed("Light", BrokerCategory::VesselSystem);
    pub const BOILOFF: Broker = Broker::fixed("Boiloff", BrokerCategory::VesselSystem);
    pub const CRYOTANK: Broker = Broker::fixed("Cryotank", BrokerCategory::VesselSystem);
    pub const GREENHOUSE: Broker = Broker::fixed("Greenhouse", BrokerCategory::VesselSystem);
    pub const SCIENCE_LAB: Broker = Broker::fixed("ScienceLab", BrokerCategory::Science);
    pub const FISSION_REACTOR: Broker = Broker::fixed("FissionReactor", BrokerCategory::Converter);
    pub const SOLAR_PANEL: Broker = Broker::fixed("SolarPanel", BrokerCategory::SolarPanel);
    pub const RTG: Broker = Broker::fixed("RTG", BrokerCategory::Rtg);
    pub const STOCK_CONVERTER: Broker = Broker::fixed("StockConverter", BrokerCategory::Converter);
    pub const STOCK_GENERATOR: Broker = Broker::fixed("StockGenerator", BrokerCategory::Generator);
    pub const STOCK_DRILL: Broker = Broker::fixed("StockDrill", BrokerCategory::Harvester);

    pub const fn fixed(id: &'static str, category: BrokerCategory) -> Self {
        Self {
            id: Cow::Borrowed(id),
            category,
        }
    }

    pub fn named(id: impl Into<String>, category: BrokerCategory) -> Self {
        Self {
            id: Cow::Owned(id.into()),
            category,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Per-second contribution of one broker, computed at sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerRate {
    pub broker: Broker,
    pub rate: f64,
}
