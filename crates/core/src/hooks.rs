//! Hook interfaces to external collaborators (§6 "Hook interfaces to
//! external collaborators"): disturbance modules, a pluggable water-
//! interception calculation, and tree-death observers.

use crate::output::{DisturbanceEvent, DisturbanceSource};
use crate::resource_unit::ResourceUnit;
use crate::tree::Tree;
use crate::water::CanopyInterception;

/// A removal-type tag passed to `TreeDeathObserver::tree_death` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalType {
    Died,
    Harvested,
    KilledByDisturbance,
}

/// An external module that can alter resource units over the course of a
/// run: fire, bark beetle, wind, browsing, or a management system (§6).
pub trait DisturbanceModule: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str {
        "1.0"
    }
    fn description(&self) -> &str {
        ""
    }

    /// Called once after the landscape is built, before the first year.
    fn setup(&mut self, _model_seed: u64) {}

    /// Called once per resource unit at setup time.
    fn setup_resource_unit(&mut self, _ru: &ResourceUnit) {}

    /// Hook for scripting integration; the default forest core has no
    /// embedded scripting engine, so this is a no-op unless a host
    /// application wires one in.
    fn setup_scripting(&mut self) {}

    /// Called once at the start of every simulated year, before any RU
    /// stage runs (§4.1 step 1 "begin-year hooks").
    fn year_begin(&mut self, _year: u32) {}

    /// Runs the module's effect on one resource unit for the current year,
    /// returning the events it wants recorded in the RU's disturbance
    /// history.
    fn run(&mut self, ru: &mut ResourceUnit, year: u32) -> Vec<DisturbanceEvent>;
}

/// Pluggable interception-and-evapotranspiration calculation a host can
/// substitute for the built-in Penman-Monteith-derived default (§6).
pub trait WaterInterceptModule: Send {
    fn calculate_water(&mut self, ru: &ResourceUnit, canopy: &CanopyInterception) -> f64;
}

/// Observer notified whenever a tree leaves the live population, whatever
/// the cause (§6).
pub trait TreeDeathObserver: Send {
    fn tree_death(&mut self, ru_index: usize, tree: &Tree, removal: RemovalType);
}

/// Appends a disturbance event to the resource unit's history, satisfying
/// the `notifyDisturbance` hook contract (§6).
pub fn notify_disturbance(
    history: &mut crate::output::DisturbanceHistory,
    year: u32,
    source: DisturbanceSource,
    info: impl Into<String>,
) {
    history.notify(DisturbanceEvent {
        year,
        source,
        info: info.into(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::DisturbanceHistory;

    struct NoopDisturbance;
    impl DisturbanceModule for NoopDisturbance {
        fn name(&self) -> &str {
            "noop"
        }
        fn run(&mut self, _ru: &mut ResourceUnit, _year: u32) -> Vec<DisturbanceEvent> {
            Vec::new()
        }
    }

    #[test]
    fn disturbance_module_default_methods_are_callable() {
        let mut module = NoopDisturbance;
        module.setup(1);
        module.year_begin(2020);
        assert_eq!(module.name(), "noop");
    }

    #[test]
    fn notify_disturbance_records_into_history() {
        let mut history = DisturbanceHistory::new(4);
        notify_disturbance(&mut history, 2020, DisturbanceSource::Wind, "storm event");
        assert_eq!(history.iter_newest_first().count(), 1);
    }
}
