//! Error taxonomy for setup, climate input, worker and output failures (§7).
//!
//! Mirrors the teacher's hand-written `SaveError`: plain enums with manual
//! `Display`/`Error` impls rather than a derive-macro crate, so every
//! message can name the failing phase the way §7 requires.

use std::fmt;

/// Fatal errors raised while validating configuration or building the
/// landscape (`Model::load_project`). Always aborts the run.
#[derive(Debug, Clone, PartialEq)]
pub enum SetupError {
    /// World dimensions / buffer / cell size failed a §6 range check.
    InvalidWorldGeometry(String),
    /// A species id referenced by config has no entry in the species set.
    UnknownSpecies(String),
    /// No resource unit had a valid id after masking against the stand grid.
    NoValidResourceUnit,
    /// A referenced file (species table, stand grid, environment) is missing.
    MissingFile(String),
    /// A config value was outside its required range.
    InvalidConfig(String),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::InvalidWorldGeometry(msg) => {
                write!(f, "setup of the world: {msg}")
            }
            SetupError::UnknownSpecies(id) => {
                write!(f, "setup of the world: unknown species '{id}'")
            }
            SetupError::NoValidResourceUnit => {
                write!(f, "setup of the world: no valid resource unit in landscape")
            }
            SetupError::MissingFile(path) => {
                write!(f, "setup of the world: missing file '{path}'")
            }
            SetupError::InvalidConfig(msg) => {
                write!(f, "setup of the world: invalid configuration: {msg}")
            }
        }
    }
}

impl std::error::Error for SetupError {}

/// Fatal errors raised while loading or advancing a climate table.
#[derive(Debug, Clone, PartialEq)]
pub enum ClimateError {
    /// A climate day's date did not continue the prior day (gap, repeat, or
    /// out-of-order).
    NonContiguousDates { year: i32, month: u8, day: u8 },
    /// Random sampling was requested but fewer years are available than the
    /// simulation will run.
    InsufficientYears { available: u32, required: u32 },
    /// The underlying climate source is missing a required column.
    MissingColumn(String),
}

impl fmt::Display for ClimateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClimateError::NonContiguousDates { year, month, day } => write!(
                f,
                "load climate: non-contiguous date {year}-{month:02}-{day:02}"
            ),
            ClimateError::InsufficientYears {
                available,
                required,
            } => write!(
                f,
                "load climate: random sampling needs {required} years but only {available} are loaded"
            ),
            ClimateError::MissingColumn(name) => {
                write!(f, "load climate: missing column '{name}'")
            }
        }
    }
}

impl std::error::Error for ClimateError {}

/// An error captured inside a parallel worker (§5, §7). The scheduler stores
/// these in a thread-safe list and re-throws the first one at the stage
/// barrier; the rest of the stage still runs to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerError {
    /// Name of the pipeline stage the worker was executing, e.g. "apply LIP".
    pub phase: String,
    /// Dense index of the resource unit (or species) the worker owned.
    pub unit_index: usize,
    /// Human-readable cause.
    pub message: String,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: unit {}: {}",
            self.phase, self.unit_index, self.message
        )
    }
}

impl std::error::Error for WorkerError {}

/// Errors raised while parsing or evaluating an expression (§4.8).
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionError {
    Parse(String),
    UnknownVariable(String),
    TypeMismatch(String),
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionError::Parse(msg) => write!(f, "expression parse error: {msg}"),
            ExpressionError::UnknownVariable(name) => {
                write!(f, "expression error: unknown variable '{name}'")
            }
            ExpressionError::TypeMismatch(msg) => write!(f, "expression error: {msg}"),
        }
    }
}

impl std::error::Error for ExpressionError {}

/// Errors raised while setting up or writing an output table (§4.9).
#[derive(Debug, Clone, PartialEq)]
pub enum OutputError {
    Setup(String),
    Write(String),
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::Setup(msg) => write!(f, "output setup error: {msg}"),
            OutputError::Write(msg) => write!(f, "output write error: {msg}"),
        }
    }
}

impl std::error::Error for OutputError {}

/// Top-level error returned by `Model::run_year` / `Model::load_project`,
/// unifying the phase-specific kinds above the way the host binary's exit
/// code (§6 CLI surface) expects a single displayable cause.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    Setup(SetupError),
    Climate(ClimateError),
    Worker(WorkerError),
    Expression(ExpressionError),
    Output(OutputError),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Setup(e) => write!(f, "{e}"),
            ModelError::Climate(e) => write!(f, "{e}"),
            ModelError::Worker(e) => write!(f, "{e}"),
            ModelError::Expression(e) => write!(f, "{e}"),
            ModelError::Output(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<SetupError> for ModelError {
    fn from(e: SetupError) -> Self {
        ModelError::Setup(e)
    }
}
impl From<ClimateError> for ModelError {
    fn from(e: ClimateError) -> Self {
        ModelError::Climate(e)
    }
}
impl From<WorkerError> for ModelError {
    fn from(e: WorkerError) -> Self {
        ModelError::Worker(e)
    }
}
impl From<ExpressionError> for ModelError {
    fn from(e: ExpressionError) -> Self {
        ModelError::Expression(e)
    }
}
impl From<OutputError> for ModelError {
    fn from(e: OutputError) -> Self {
        ModelError::Output(e)
    }
}
