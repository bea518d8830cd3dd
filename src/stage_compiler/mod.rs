// Stage Compiler Module
// Compiles game scripts written in a Python-shaped DSL into a project
// specification, an IR document and a JavaScript module.

#[path = "assembler.rs"]
pub mod assembler;
pub mod binding;
#[path = "body_compiler.rs"]
pub mod body_compiler;
pub mod codegen;
pub mod codegen_coroutine;
pub mod config;
pub mod error;
pub mod expander;
pub mod ir;
pub mod lexer;
pub mod macros;
pub mod parser;
pub mod project;
pub mod schema;
pub mod syntax;
pub mod validate;
pub mod value;

use std::path::{Path, PathBuf};

pub use config::CompilerConfig;
pub use error::{CompilerError, Diagnostic, Diagnostics, Severity, Span};
use ir::IrDocument;
use project::ProjectSpec;

/// Everything one compilation produces.
#[derive(Debug, Clone)]
pub struct CompiledGame {
    pub project: ProjectSpec,
    pub ir: IrDocument,
    /// The generated ES module.
    pub target_source: String,
    pub warnings: Vec<Diagnostic>,
}

impl CompiledGame {
    pub fn project_json(&self) -> Result<String, CompilerError> {
        serde_json::to_string_pretty(&self.project)
            .map_err(|e| CompilerError::CodeGenError(format!("cannot serialize project: {}", e)))
    }

    pub fn ir_json(&self) -> Result<String, CompilerError> {
        serde_json::to_string_pretty(&self.ir)
            .map_err(|e| CompilerError::CodeGenError(format!("cannot serialize IR: {}", e)))
    }
}

/// State for a single compilation. Consumed by `compile`, so nothing carries
/// over into the next one.
pub struct CompilerSession {
    config: CompilerConfig,
    source_path: Option<PathBuf>,
    diagnostics: Diagnostics,
}

impl CompilerSession {
    pub fn new(config: CompilerConfig, source_path: Option<&Path>) -> Self {
        CompilerSession {
            config,
            source_path: source_path.map(Path::to_path_buf),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn compile(mut self, source: &str) -> Result<CompiledGame, CompilerError> {
        // Phase 1: Parsing
        let module = parser::parse_source(source)?;

        // Phase 2: Code blocks
        let module = macros::MacroPreprocessor::new(self.config.strict_blocks, &mut self.diagnostics)
            .preprocess(module)?;

        // Phase 3: Static setup expansion
        let (module, constants) = expander::SetupExpander::new(&self.config).expand(module)?;

        // Phase 4: Binding, assembly, validation and pruning
        let (project, ir) = assembler::ProjectAssembler::new(
            constants,
            self.source_path.as_deref(),
            &mut self.diagnostics,
        )
        .assemble(&module)?;

        // Phase 5: Code generation
        let target_source = codegen::JsCodeGen::new(&self.config).generate(&ir)?;

        log::info!(
            "compiled {} actions, {} predicates, {} helpers with {} warning(s)",
            project.actions.len(),
            project.predicates.len(),
            project.callables.len(),
            self.diagnostics.len()
        );
        Ok(CompiledGame {
            project,
            ir,
            target_source,
            warnings: self.diagnostics.into_items(),
        })
    }
}

/// Main compiler structure
#[derive(Debug, Clone, Default)]
pub struct StageCompiler {
    config: CompilerConfig,
}

impl StageCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        StageCompiler { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile source text; `path` locates files loaded by `load_grid`/`load_text`.
    pub fn compile_source(&self, source: &str, path: Option<&Path>) -> Result<CompiledGame, CompilerError> {
        CompilerSession::new(self.config.clone(), path).compile(source)
    }

    pub fn compile_file(&self, path: &Path) -> Result<CompiledGame, CompilerError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| CompilerError::IOError(format!("cannot read '{}': {}", path.display(), e)))?;
        self.compile_source(&source, Some(path))
    }
}
