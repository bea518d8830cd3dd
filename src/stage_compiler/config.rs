// Compiler configuration
//
// Loaded from a TOML file; every field has a default so an empty file is valid.

use crate::stage_compiler::error::CompilerError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Drop (with a warning) top-level statements that sit outside any code block.
    pub strict_blocks: bool,
    /// Iteration cap for each compile-time `for`/`while` loop in setup code.
    pub max_loop_iterations: usize,
    /// Total number of statements the setup expander may produce.
    pub max_expanded_statements: usize,
    /// Append `ACTIONS`/`PREDICATES` lookup tables to the generated module.
    pub emit_dispatch_table: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            strict_blocks: false,
            max_loop_iterations: 10_000,
            max_expanded_statements: 100_000,
            emit_dispatch_table: true,
        }
    }
}

impl CompilerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, CompilerError> {
        toml::from_str(text)
            .map_err(|e| CompilerError::IOError(format!("invalid compiler config: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, CompilerError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CompilerError::IOError(format!("cannot read config '{}': {}", path.display(), e))
        })?;
        log::debug!("CONFIG: loading {}", path.display());
        Self::from_toml_str(&text)
    }
}
