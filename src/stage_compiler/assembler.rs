// Project Assembler
//
// Walks the expanded module twice. Pass 1 collects schemas, function
// signatures, aliases and the game object; functions are then compiled in
// source order; pass 2 performs registrations in source order. Validation and
// pruning run last.

use crate::stage_compiler::body_compiler::{BodyCompiler, BodyContext, CompiledFunction, FunctionKind};
use crate::stage_compiler::error::{CompilerError, Diagnostics, Span};
use crate::stage_compiler::expander::MUTATORS;
use crate::stage_compiler::ir::IrDocument;
use crate::stage_compiler::project::ProjectSpec;
use crate::stage_compiler::schema::{Schema, SchemaRegistry, TypeExpr};
use crate::stage_compiler::syntax::{Expr, ExprKind, FunctionDef, Keyword, Module, StmtKind};
use crate::stage_compiler::validate;
use crate::stage_compiler::value::{eval_static, Env, Value};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Longest alias chain followed before giving up.
const MAX_ALIAS_DEPTH: usize = 32;

/// A top-level function seen in pass 1.
#[derive(Debug, Clone)]
struct PendingFunction {
    def: FunctionDef,
    span: Span,
    kind: FunctionKind,
    /// Arguments of `@condition(...)` decorators, in order.
    conditions: Vec<Expr>,
}

/// A declaration call such as `Camera("main", zoom=2)`, after alias resolution.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeclCall<'e> {
    pub name: &'e str,
    pub args: &'e [Expr],
    pub keywords: &'e [Keyword],
    pub span: Span,
}

impl<'e> DeclCall<'e> {
    /// Argument given either at `index` or as keyword `name`.
    pub fn arg(&self, index: usize, name: &str) -> Option<&'e Expr> {
        self.args
            .get(index)
            .or_else(|| Keyword::find(self.keywords, name))
    }

    pub fn keyword(&self, name: &str) -> Option<&'e Expr> {
        Keyword::find(self.keywords, name)
    }

    pub fn expect_args(&self, max_positional: usize, keywords: &[&str]) -> Result<(), CompilerError> {
        if self.args.len() > max_positional {
            return Err(CompilerError::UnsupportedSyntax(
                format!(
                    "{}() takes at most {} positional argument{}",
                    self.name,
                    max_positional,
                    if max_positional == 1 { "" } else { "s" }
                ),
                self.args[max_positional].span,
            ));
        }
        if let Some(unknown) = self.keywords.iter().find(|kw| !keywords.contains(&kw.name.as_str())) {
            return Err(CompilerError::UnsupportedSyntax(
                format!("{}() has no argument '{}'", self.name, unknown.name),
                unknown.value.span,
            ));
        }
        Ok(())
    }

    pub fn required(&self, index: usize, name: &str) -> Result<&'e Expr, CompilerError> {
        self.arg(index, name).ok_or_else(|| {
            CompilerError::ValidationError(format!("{}() is missing '{}'", self.name, name), self.span)
        })
    }
}

pub struct ProjectAssembler<'a> {
    pub(crate) diagnostics: &'a mut Diagnostics,
    base_dir: Option<PathBuf>,
    pub(crate) constants: Env,
    pub(crate) schemas: SchemaRegistry,
    aliases: IndexMap<String, Expr>,
    game: Option<String>,
    functions: Vec<PendingFunction>,
    helpers: IndexMap<String, usize>,
    pub(crate) project: ProjectSpec,
    pub(crate) ir: IrDocument,
    /// Actions bound by collision rules, and by any other rule.
    pub(crate) collision_actions: HashSet<String>,
    pub(crate) other_actions: HashSet<String>,
    /// Functions already warned about an ignored selector.
    pub(crate) selector_warnings: HashSet<String>,
    /// Tool name to the action it is bound to.
    pub(crate) tools: IndexMap<String, String>,
}

impl<'a> ProjectAssembler<'a> {
    /// `source_path` locates files referenced by `load_grid` and `load_text`.
    pub fn new(constants: Env, source_path: Option<&Path>, diagnostics: &'a mut Diagnostics) -> Self {
        ProjectAssembler {
            diagnostics,
            base_dir: source_path.and_then(|p| p.parent()).map(Path::to_path_buf),
            constants,
            schemas: SchemaRegistry::new(),
            aliases: IndexMap::new(),
            game: None,
            functions: Vec::new(),
            helpers: IndexMap::new(),
            project: ProjectSpec::default(),
            ir: IrDocument::default(),
            collision_actions: HashSet::new(),
            other_actions: HashSet::new(),
            selector_warnings: HashSet::new(),
            tools: IndexMap::new(),
        }
    }

    pub fn assemble(mut self, module: &Module) -> Result<(ProjectSpec, IrDocument), CompilerError> {
        self.collect(module)?;
        if self.game.is_none() {
            return Err(CompilerError::ValidationError(
                "no game declared; expected `game = Game(...)` at module level".to_string(),
                module.body.first().map_or_else(Span::unknown, |stmt| stmt.span),
            ));
        }
        self.project.actor_schemas = self.schemas.actors().clone();
        self.project.role_schemas = self.schemas.roles().clone();

        self.compile_functions()?;
        self.register(module)?;

        log::debug!(
            "ASSEMBLE: {} actors, {} rules, {} roles, {} actions compiled",
            self.project.actors.len(),
            self.project.rules.len(),
            self.project.roles.len(),
            self.ir.actions.len()
        );
        validate::validate(&self.project, &self.ir, self.diagnostics)?;
        validate::prune(&mut self.project, &mut self.ir, self.diagnostics);
        Ok((self.project, self.ir))
    }

    // Pass 1

    fn collect(&mut self, module: &Module) -> Result<(), CompilerError> {
        for stmt in &module.body {
            match &stmt.kind {
                StmtKind::ClassDef(class) => {
                    let schema = Schema::from_class(class, stmt.span, &self.constants)?;
                    log::debug!("ASSEMBLE: schema {} ({:?})", schema.name, schema.kind);
                    self.schemas.register(schema)?;
                }
                StmtKind::FunctionDef(def) => self.collect_function(def, stmt.span)?,
                StmtKind::Assign { target, value } | StmtKind::AnnAssign { target, value: Some(value), .. } => {
                    let name = match target.as_name() {
                        Some(name) => name,
                        None => continue,
                    };
                    if is_game_call(value) {
                        if let Some(existing) = &self.game {
                            return Err(CompilerError::DuplicateSymbol(
                                format!("Game (already declared as '{}')", existing),
                                stmt.span,
                            ));
                        }
                        self.game = Some(name.to_string());
                        self.declare_game(value)?;
                        continue;
                    }
                    self.bind_alias(name, value);
                }
                _ => {}
            }
        }
        for function in &self.functions {
            if self.schemas.is_actor(&function.def.name) || self.schemas.is_role(&function.def.name) {
                return Err(CompilerError::DuplicateSymbol(function.def.name.clone(), function.span));
            }
        }
        Ok(())
    }

    fn collect_function(&mut self, def: &FunctionDef, span: Span) -> Result<(), CompilerError> {
        if self.functions.iter().any(|f| f.def.name == def.name) {
            return Err(CompilerError::DuplicateSymbol(def.name.clone(), span));
        }
        let mut kind: Option<FunctionKind> = None;
        let mut conditions = Vec::new();
        for decorator in &def.decorators {
            let declared = match &decorator.kind {
                ExprKind::Name(name) if name == "action" => FunctionKind::Action,
                ExprKind::Name(name) if name == "predicate" => FunctionKind::Predicate,
                ExprKind::Name(name) if name == "callable" => FunctionKind::Callable,
                ExprKind::Call { func, args, keywords } if func.as_name() == Some("condition") => {
                    if args.len() != 1 || !keywords.is_empty() {
                        return Err(CompilerError::UnsupportedSyntax(
                            "@condition(...) takes exactly one condition".to_string(),
                            decorator.span,
                        ));
                    }
                    conditions.push(args[0].clone());
                    FunctionKind::Action
                }
                _ => {
                    return Err(CompilerError::UnsupportedSyntax(
                        format!(
                            "unknown decorator {}; expected @action, @predicate, @callable or @condition(...)",
                            decorator.describe()
                        ),
                        decorator.span,
                    ))
                }
            };
            match kind {
                Some(previous) if previous != declared => {
                    return Err(CompilerError::UnsupportedSyntax(
                        format!(
                            "'{}' is declared both {} and {}",
                            def.name,
                            previous.describe(),
                            declared.describe()
                        ),
                        decorator.span,
                    ))
                }
                _ => kind = Some(declared),
            }
        }
        let kind = kind.unwrap_or(FunctionKind::Action);
        if kind == FunctionKind::Callable {
            let arity = def
                .params
                .iter()
                .filter(|p| p.annotation.as_ref().map(|a| TypeExpr::parse(a).is_ok()).unwrap_or(false))
                .count();
            self.helpers.insert(def.name.clone(), arity);
        }
        self.functions.push(PendingFunction {
            def: def.clone(),
            span,
            kind,
            conditions,
        });
        Ok(())
    }

    fn declare_game(&mut self, value: &Expr) -> Result<(), CompilerError> {
        let call = self.declaration(value, &["Game"])?;
        call.expect_args(0, &["scene", "multiplayer"])?;
        let scene = call.keyword("scene").map(|scene| self.scene_decl(scene)).transpose()?;
        let multiplayer = call.keyword("multiplayer").map(|multiplayer| self.multiplayer_decl(multiplayer));
        if let Some(scene) = scene {
            self.project.scene = scene;
        }
        if let Some(multiplayer) = multiplayer {
            self.project.multiplayer = Some(multiplayer?);
        }
        Ok(())
    }

    fn compile_functions(&mut self) -> Result<(), CompilerError> {
        let ctx = BodyContext {
            schemas: &self.schemas,
            constants: &self.constants,
            helpers: &self.helpers,
        };
        for function in &self.functions {
            match BodyCompiler::new(ctx, function.kind).compile(&function.def, function.span)? {
                CompiledFunction::Action(action) => {
                    self.ir.actions.insert(action.name.clone(), action);
                }
                CompiledFunction::Predicate(predicate) => {
                    self.ir.predicates.insert(predicate.name.clone(), predicate);
                }
                CompiledFunction::Callable(callable) => {
                    self.ir.callables.insert(callable.name.clone(), callable);
                }
            }
        }
        Ok(())
    }

    // Pass 2

    /// Aliases are rebuilt statement by statement, so each registration sees the
    /// binding live at that point of the source.
    fn register(&mut self, module: &Module) -> Result<(), CompilerError> {
        let functions = std::mem::take(&mut self.functions);
        let mut pending = functions.iter();
        self.aliases.clear();
        for stmt in &module.body {
            match &stmt.kind {
                StmtKind::Assign { target, value } | StmtKind::AnnAssign { target, value: Some(value), .. } => {
                    if let Some(name) = target.as_name() {
                        if !is_game_call(value) {
                            self.bind_alias(name, value);
                        }
                    }
                }
                StmtKind::FunctionDef(def) => {
                    if let Some(function) = pending.find(|f| f.def.name == def.name) {
                        for condition in &function.conditions {
                            self.add_rule(condition, &def.name, condition.span)?;
                        }
                    }
                }
                StmtKind::Expr(expr) => self.register_statement(expr)?,
                StmtKind::Return(_) | StmtKind::Yield(_) | StmtKind::Continue => {
                    return Err(CompilerError::UnsupportedSyntax(
                        "statement is only allowed inside a function".to_string(),
                        stmt.span,
                    ))
                }
                _ => {}
            }
        }
        self.functions = functions;
        Ok(())
    }

    fn register_statement(&mut self, expr: &Expr) -> Result<(), CompilerError> {
        let (func, args, keywords) = match &expr.kind {
            ExprKind::Call { func, args, keywords } => (func.as_ref(), args.as_slice(), keywords.as_slice()),
            // stray docstrings
            ExprKind::Str(_) => return Ok(()),
            _ => {
                return Err(CompilerError::UnsupportedSyntax(
                    format!("{} has no effect at module level", expr.describe()),
                    expr.span,
                ))
            }
        };
        let method = match self.game_method(func) {
            Some(method) => method,
            None => {
                // setup-time collection updates already applied by the expander
                if let ExprKind::Attribute { value, attr } = &func.kind {
                    if value.as_name().is_some() && MUTATORS.contains(&attr.as_str()) {
                        return Ok(());
                    }
                }
                return Err(CompilerError::UnsupportedSyntax(
                    format!(
                        "{} at module level is not a game registration",
                        expr.describe()
                    ),
                    expr.span,
                ));
            }
        };
        let call = DeclCall {
            name: method.as_str(),
            args,
            keywords,
            span: expr.span,
        };
        log::debug!("ASSEMBLE: game.{}", method);
        match method.as_str() {
            "add_actor" => self.add_actor(&call),
            "add_global" => self.add_global(&call),
            "add_resource" => self.add_resource(&call),
            "add_sprite" => self.add_sprite(&call),
            "add_rule" => {
                call.expect_args(2, &["condition", "action"])?;
                let condition = call.required(0, "condition")?;
                let action = call.required(1, "action")?;
                let action = self.function_name(action)?;
                self.add_rule(condition, &action, expr.span)
            }
            "set_map" => self.set_map(&call),
            "add_camera" => self.add_camera(&call),
            "add_role" => self.add_role(&call),
            "set_multiplayer" => {
                call.expect_args(1, &[])?;
                let decl = call.required(0, "multiplayer")?;
                self.project.multiplayer = Some(self.multiplayer_decl(decl)?);
                Ok(())
            }
            "set_interface" => self.set_interface(&call),
            "set_scene" => {
                call.expect_args(1, &[])?;
                let decl = call.required(0, "scene")?;
                self.project.scene = self.scene_decl(decl)?;
                Ok(())
            }
            other => Err(CompilerError::UndefinedSymbol(
                format!("{}.{}", self.game.as_deref().unwrap_or("game"), other),
                func.span,
            )),
        }
    }

    /// Registration method named by `func`, directly (`game.add_actor`) or via an alias.
    fn game_method(&self, func: &Expr) -> Option<String> {
        match &self.resolve(func).kind {
            ExprKind::Attribute { value, attr } if self.is_game(value) => Some(attr.clone()),
            _ => None,
        }
    }

    fn is_game(&self, expr: &Expr) -> bool {
        match (self.resolve(expr).as_name(), &self.game) {
            (Some(name), Some(game)) => name == game,
            _ => false,
        }
    }

    // Shared helpers

    /// Bind `name` to what `value` currently stands for; a later rebinding of a
    /// name used in `value` does not change it.
    fn bind_alias(&mut self, name: &str, value: &Expr) {
        let bound = self.resolve(value).clone();
        log::trace!("ASSEMBLE: alias {} = {}", name, bound.describe());
        self.aliases.insert(name.to_string(), bound);
    }

    /// Follow name aliases to the expression they stand for.
    pub(crate) fn resolve<'e>(&'e self, expr: &'e Expr) -> &'e Expr {
        let mut current = expr;
        for _ in 0..MAX_ALIAS_DEPTH {
            match current.as_name().and_then(|name| self.aliases.get(name)) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    /// Resolve `expr` to a call of one of `names`.
    pub(crate) fn declaration<'e>(&'e self, expr: &'e Expr, names: &[&str]) -> Result<DeclCall<'e>, CompilerError> {
        let resolved = self.resolve(expr);
        if let ExprKind::Call { func, args, keywords } = &resolved.kind {
            if let Some(name) = func.as_name() {
                if names.contains(&name) {
                    return Ok(DeclCall {
                        name,
                        args,
                        keywords,
                        span: resolved.span,
                    });
                }
            }
        }
        Err(CompilerError::BindingError(
            format!("expected {}(...), found {}", names.join("(...) or "), expr.describe()),
            expr.span,
        ))
    }

    /// Compile-time value of a declaration argument.
    pub(crate) fn static_value(&self, expr: &Expr, what: &str) -> Result<Value, CompilerError> {
        let resolved = self.resolve(expr);
        eval_static(resolved, &self.constants).map_err(|reason| {
            CompilerError::ValidationError(
                format!("{} must be known at compile time ({})", what, reason),
                expr.span,
            )
        })
    }

    pub(crate) fn static_str(&self, expr: &Expr, what: &str) -> Result<String, CompilerError> {
        match self.static_value(expr, what)? {
            Value::Str(s) => Ok(s),
            other => Err(CompilerError::TypeMismatch(
                format!("str for {}", what),
                other.type_name().to_string(),
                expr.span,
            )),
        }
    }

    pub(crate) fn static_number(&self, expr: &Expr, what: &str) -> Result<f64, CompilerError> {
        let value = self.static_value(expr, what)?;
        value.as_number().ok_or_else(|| {
            CompilerError::TypeMismatch(
                format!("a number for {}", what),
                value.type_name().to_string(),
                expr.span,
            )
        })
    }

    /// A function reference: its name, or a string naming it.
    pub(crate) fn function_name(&self, expr: &Expr) -> Result<String, CompilerError> {
        match &self.resolve(expr).kind {
            ExprKind::Name(name) => Ok(name.clone()),
            ExprKind::Str(name) => Ok(name.clone()),
            _ => Err(CompilerError::BindingError(
                format!("expected a function name, found {}", expr.describe()),
                expr.span,
            )),
        }
    }

    /// Read an asset file relative to the compiled source.
    pub(crate) fn load_asset(&self, path: &str, span: Span) -> Result<String, CompilerError> {
        let full = match &self.base_dir {
            Some(dir) => dir.join(path),
            None => PathBuf::from(path),
        };
        log::debug!("ASSEMBLE: loading {}", full.display());
        std::fs::read_to_string(&full).map_err(|e| {
            CompilerError::IOError(format!(
                "cannot read '{}' (line {}): {}",
                full.display(),
                span.line,
                e
            ))
        })
    }
}

fn is_game_call(value: &Expr) -> bool {
    match &value.kind {
        ExprKind::Call { func, .. } => func.as_name() == Some("Game"),
        _ => false,
    }
}

// Extracted modules for functional organization
mod assemble_declarations;
mod assemble_rules;

#[cfg(test)]
#[path = "assembler_tests.rs"]
mod tests;
