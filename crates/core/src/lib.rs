//! Headless individual-based forest landscape simulation core.
//!
//! Carries no rendering, windowing or scripting surface: the host binary
//! (`forest-cli`) drives a [`Model`] directly year by year. Resources are
//! plain owned data rather than ECS entities — trees, saplings and resource
//! units never need to be queried by a scheduler, only by their owning
//! struct — so the only bevy machinery kept from the teacher is `bevy_ecs`'s
//! `Resource` derive (for save/load registration) and `bevy_tasks`'s scoped
//! thread pool (for the per-year parallel stages).

pub mod climate;
pub mod config;
pub mod error;
pub mod expr;
pub mod grid;
pub mod hooks;
pub mod light;
pub mod model;
pub mod output;
pub mod production;
pub mod resource_unit;
pub mod sapling;
pub mod saveable;
pub mod scheduler;
pub mod sim_rng;
pub mod snag;
pub mod soil;
pub mod species;
pub mod stand_grid;
pub mod svd;
pub mod test_harness;
pub mod tree;
pub mod water;

pub use error::{ClimateError, ExpressionError, ModelError, OutputError, SetupError, WorkerError};
pub use model::Model;
pub use saveable::{Saveable, SaveableRegistry};
pub use sim_rng::SimRng;

use bevy_app::prelude::*;

/// Wires the landscape-level resources that participate in save/load into a
/// host `App` (§4.11). `Model` itself is not inserted here: it only exists
/// once a project has been loaded, so a host calls [`Model::load_project`]
/// and inserts the result after adding this plugin, the way the teacher's
/// `NewGameConfigPlugin` leaves city-specific state to its own constructor.
pub struct ForestSimPlugin;

impl Plugin for ForestSimPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SimRng>();

        app.init_resource::<SaveableRegistry>();
        let mut registry = app.world_mut().resource_mut::<SaveableRegistry>();
        registry.register::<SimRng>();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_registers_sim_rng_in_the_save_registry() {
        let mut app = App::new();
        app.add_plugins(ForestSimPlugin);
        let registry = app.world().resource::<SaveableRegistry>();
        assert!(registry.keys().any(|k| k == "sim_rng"));
    }
}
