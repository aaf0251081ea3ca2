use crate::compiler_frontend::compiler_errors::CompilerError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const CONFIG_TABLE_NAME: &str = "borrow_checker";

// Rough starting capacity for the string table; most functions only name a handful of locals.
pub const MINIMUM_STRING_TABLE_CAPACITY: usize = 32;

// The joint ownership/ledger fixed point only grows the kill set, so it converges in at most
// one round per move site. Hitting this cap means the lattice is broken, not that the input is big.
pub const DEFAULT_MAX_FIXPOINT_ROUNDS: usize = 64;

// Each node's state can only climb a finite lattice. Revisiting a node more often than this
// signals a non-monotonic join.
pub const DEFAULT_MAX_DATAFLOW_VISITS_PER_NODE: usize = 256;

/// Tuning knobs for one borrow checking run.
///
/// None of these change which programs are accepted. The caps only bound loops
/// that are guaranteed to terminate, and exceeding one is reported as an internal error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BorrowCheckConfig {
    pub max_fixpoint_rounds: usize,
    pub max_dataflow_visits_per_node: usize,

    /// Analyze functions on the rayon pool instead of the calling thread.
    pub parallel: bool,

    /// Keep the per-node ownership snapshots in the annotated output.
    pub record_ownership_snapshots: bool,

    /// Record the per-function ownership timeline (moves, borrows, uses and drops).
    pub record_ownership_timeline: bool,
}

impl Default for BorrowCheckConfig {
    fn default() -> Self {
        Self {
            max_fixpoint_rounds: DEFAULT_MAX_FIXPOINT_ROUNDS,
            max_dataflow_visits_per_node: DEFAULT_MAX_DATAFLOW_VISITS_PER_NODE,
            parallel: true,
            record_ownership_snapshots: false,
            record_ownership_timeline: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    borrow_checker: Option<BorrowCheckConfig>,
}

impl BorrowCheckConfig {
    /// Parses the `[borrow_checker]` table of a TOML document.
    /// A document without that table yields the defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, CompilerError> {
        let file: ConfigFile = toml::from_str(source).map_err(|error| {
            CompilerError::config_error(format!(
                "Invalid [{CONFIG_TABLE_NAME}] configuration: {error}"
            ))
        })?;

        let config = file.borrow_checker.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, CompilerError> {
        let source = fs::read_to_string(path).map_err(|error| {
            CompilerError::config_error(format!(
                "Could not read borrow checker config '{}': {error}",
                path.display()
            ))
        })?;

        Self::from_toml_str(&source)
    }

    pub(crate) fn validate(&self) -> Result<(), CompilerError> {
        if self.max_fixpoint_rounds == 0 {
            return Err(CompilerError::config_error(
                "max_fixpoint_rounds must be at least 1",
            ));
        }

        if self.max_dataflow_visits_per_node == 0 {
            return Err(CompilerError::config_error(
                "max_dataflow_visits_per_node must be at least 1",
            ));
        }

        Ok(())
    }
}
