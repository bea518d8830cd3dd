// Body Compiler - lowers action, predicate and helper bodies into IR
//
// Tracks a type tag per variable so that field access and method calls can be
// checked and dispatched at compile time. The statement, expression and call
// lowering live in the body_gen_* modules below.

use crate::stage_compiler::binding::classify_param;
use crate::stage_compiler::error::{CompilerError, Span};
use crate::stage_compiler::ir::{
    ActionIr, BindingKind, CallableIr, IrExpr, ParamBinding, PredicateIr, ValueParam,
};
use crate::stage_compiler::schema::{SchemaRegistry, TypeExpr};
use crate::stage_compiler::syntax::{docstring, walk_stmts, Expr, ExprKind, FunctionDef, Stmt, StmtKind};
use crate::stage_compiler::value::Env;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};

lazy_static! {
    /// Runtime builtins callable from bodies, with their (min, max) arity.
    pub static ref BUILTINS: IndexMap<&'static str, (usize, usize)> = {
        let mut m = IndexMap::new();
        m.insert("random", (0, 0));
        m.insert("randint", (2, 2));
        m.insert("uniform", (2, 2));
        m.insert("choice", (1, 1));
        m.insert("abs", (1, 1));
        m.insert("min", (1, usize::MAX));
        m.insert("max", (1, usize::MAX));
        m.insert("len", (1, 1));
        m.insert("round", (1, 2));
        m.insert("int", (1, 1));
        m.insert("float", (1, 1));
        m.insert("str", (1, 1));
        m
    };

    /// Camera fields readable from a body.
    pub static ref CAMERA_FIELDS: Vec<&'static str> = vec!["x", "y", "width", "height", "zoom"];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Action,
    Predicate,
    Callable,
}

impl FunctionKind {
    pub fn describe(&self) -> &'static str {
        match self {
            FunctionKind::Action => "action",
            FunctionKind::Predicate => "predicate",
            FunctionKind::Callable => "callable",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompiledFunction {
    Action(ActionIr),
    Predicate(PredicateIr),
    Callable(CallableIr),
}

/// Everything a body may refer to besides its own parameters and locals.
#[derive(Debug, Clone, Copy)]
pub struct BodyContext<'a> {
    pub schemas: &'a SchemaRegistry,
    /// Module-level constants left by the setup expander; inlined as literals.
    pub constants: &'a Env,
    /// Compiled helpers by name, with the number of positional arguments they take.
    pub helpers: &'a IndexMap<String, usize>,
}

/// Tracked declared type of a variable.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum VarTag {
    Actor(Option<String>),
    ActorList(Option<String>),
    Role(Option<String>),
    Camera,
    Scene,
    Tick,
    /// A global binding or helper argument, with its declared type when known.
    Value(Option<TypeExpr>),
    /// A local list or dict.
    Collection,
}

impl VarTag {
    fn from_binding(binding: &ParamBinding) -> VarTag {
        match binding.kind {
            BindingKind::Actor => VarTag::Actor(binding.schema.clone()),
            BindingKind::ActorList => VarTag::ActorList(binding.schema.clone()),
            BindingKind::Role => VarTag::Role(binding.schema.clone()),
            BindingKind::Camera => VarTag::Camera,
            BindingKind::Scene => VarTag::Scene,
            BindingKind::Tick => VarTag::Tick,
            BindingKind::Global => VarTag::Value(binding.value_type.clone()),
        }
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self {
            VarTag::Actor(_) => "actor",
            VarTag::ActorList(_) => "actor list",
            VarTag::Role(_) => "role",
            VarTag::Camera => "camera",
            VarTag::Scene => "scene",
            VarTag::Tick => "tick",
            VarTag::Value(_) => "value",
            VarTag::Collection => "collection",
        }
    }

    /// Receivers of `append`/`update`/`pop`.
    pub(crate) fn is_collection(&self) -> bool {
        match self {
            VarTag::Collection => true,
            VarTag::Value(None) => true,
            VarTag::Value(Some(ty)) => matches!(ty, TypeExpr::List(_) | TypeExpr::Dict(_)),
            _ => false,
        }
    }
}

/// An actor constructor assigned to a variable, waiting for `scene.spawn(...)`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SpawnTemplate {
    pub schema: String,
    pub uid: IrExpr,
    pub fields: IndexMap<String, IrExpr>,
}

pub struct BodyCompiler<'a> {
    ctx: BodyContext<'a>,
    kind: FunctionKind,
    function: String,
    /// Parameter name to its binding kind; `None` for positional helper arguments.
    params: IndexMap<String, Option<BindingKind>>,
    locals: HashSet<String>,
    tags: HashMap<String, VarTag>,
    templates: HashMap<String, SpawnTemplate>,
    loop_depth: usize,
}

impl<'a> BodyCompiler<'a> {
    pub fn new(ctx: BodyContext<'a>, kind: FunctionKind) -> Self {
        BodyCompiler {
            ctx,
            kind,
            function: String::new(),
            params: IndexMap::new(),
            locals: HashSet::new(),
            tags: HashMap::new(),
            templates: HashMap::new(),
            loop_depth: 0,
        }
    }

    /// Compile one top-level function definition.
    pub fn compile(mut self, def: &FunctionDef, span: Span) -> Result<CompiledFunction, CompilerError> {
        self.function = def.name.clone();
        log::debug!("BIND: compiling {} '{}'", self.kind.describe(), def.name);

        let (args, params) = self.bind_params(def)?;
        self.collect_locals(&def.body);

        let description = docstring(&def.body).map(|doc| doc.trim().to_string());
        let body = if description.is_some() {
            &def.body[1..]
        } else {
            &def.body[..]
        };

        match self.kind {
            FunctionKind::Action => {
                let body = self.lower_block(body)?;
                Ok(CompiledFunction::Action(ActionIr {
                    name: def.name.clone(),
                    params,
                    body,
                    description,
                    span,
                }))
            }
            FunctionKind::Predicate | FunctionKind::Callable => {
                let (last, init) = match body.split_last() {
                    Some((last, init)) => (last, init),
                    None => return Err(self.missing_return(span)),
                };
                let result_expr = match &last.kind {
                    StmtKind::Return(Some(value)) => value,
                    _ => return Err(self.missing_return(last.span)),
                };
                let body = self.lower_block(init)?;
                let result = self.lower_expr(result_expr)?;
                let compiled = PredicateIr {
                    name: def.name.clone(),
                    args,
                    params,
                    body,
                    result,
                    description,
                    span,
                };
                Ok(match self.kind {
                    FunctionKind::Predicate => CompiledFunction::Predicate(compiled),
                    _ => CompiledFunction::Callable(compiled),
                })
            }
        }
    }

    fn missing_return(&self, span: Span) -> CompilerError {
        CompilerError::UnsupportedSyntax(
            format!(
                "{} '{}' must end with a single 'return <expression>'",
                self.kind.describe(),
                self.function
            ),
            span,
        )
    }

    /// Helpers take positional value arguments (`def clamp(v: float)`) as well as
    /// context bindings; every other function only has bindings.
    fn bind_params(&mut self, def: &FunctionDef) -> Result<(Vec<ValueParam>, Vec<ParamBinding>), CompilerError> {
        let mut args = Vec::new();
        let mut params = Vec::new();
        for param in &def.params {
            if self.params.contains_key(&param.name) {
                return Err(CompilerError::DuplicateSymbol(param.name.clone(), param.span));
            }
            let value_type = match (&param.annotation, self.kind) {
                (Some(annotation), FunctionKind::Callable) => TypeExpr::parse(annotation).ok(),
                _ => None,
            };
            if let Some(ty) = value_type {
                let tag = match ty {
                    TypeExpr::List(_) | TypeExpr::Dict(_) => VarTag::Collection,
                    _ => VarTag::Value(Some(ty.clone())),
                };
                self.tags.insert(param.name.clone(), tag);
                self.params.insert(param.name.clone(), None);
                args.push(ValueParam {
                    name: param.name.clone(),
                    ty,
                });
                continue;
            }
            let binding = classify_param(param, self.ctx.schemas)?;
            self.tags.insert(param.name.clone(), VarTag::from_binding(&binding));
            self.params.insert(param.name.clone(), Some(binding.kind));
            params.push(binding);
        }
        Ok((args, params))
    }

    /// Every name assigned anywhere in the body is a local for the whole body.
    fn collect_locals(&mut self, body: &[Stmt]) {
        let mut names = Vec::new();
        walk_stmts(body, &mut |stmt| match &stmt.kind {
            StmtKind::Assign { target, .. }
            | StmtKind::AugAssign { target, .. }
            | StmtKind::AnnAssign { target, .. }
            | StmtKind::For { target, .. } => {
                if let ExprKind::Name(name) = &target.kind {
                    names.push(name.clone());
                }
            }
            _ => {}
        });
        for name in names {
            if !self.params.contains_key(&name) {
                self.locals.insert(name);
            }
        }
    }

    pub(crate) fn is_variable(&self, name: &str) -> bool {
        self.params.contains_key(name) || self.locals.contains(name)
    }

    pub(crate) fn tag(&self, name: &str) -> Option<&VarTag> {
        self.tags.get(name)
    }

    /// Tag of a receiver expression: a variable, an element of an actor list, or
    /// a list/dict field of a typed actor or role.
    pub(crate) fn receiver_tag(&self, expr: &Expr) -> Option<VarTag> {
        match &expr.kind {
            ExprKind::Name(name) => self.tags.get(name).cloned(),
            ExprKind::Subscript { value, .. } => match value.as_name().and_then(|n| self.tags.get(n)) {
                Some(VarTag::ActorList(schema)) => Some(VarTag::Actor(schema.clone())),
                _ => None,
            },
            ExprKind::Attribute { value, attr } => match self.receiver_tag(value)? {
                VarTag::Actor(Some(schema)) | VarTag::Role(Some(schema)) => {
                    let spec = self
                        .ctx
                        .schemas
                        .actor(&schema)
                        .or_else(|| self.ctx.schemas.role(&schema))
                        .and_then(|s| s.field(attr))?;
                    match &spec.ty {
                        TypeExpr::List(_) | TypeExpr::Dict(_) if !spec.local => {
                            Some(VarTag::Value(Some(spec.ty.clone())))
                        }
                        _ => None,
                    }
                }
                _ => None,
            },
            _ => None,
        }
    }
}

// Extracted modules for functional organization
mod body_gen_calls;
mod body_gen_expressions;
mod body_gen_statements;

#[cfg(test)]
#[path = "body_compiler_tests.rs"]
mod tests;
