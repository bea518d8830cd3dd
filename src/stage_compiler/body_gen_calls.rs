// Body Compiler - Calls
//
// Method-call statements dispatch on the receiver's tracked type: actors,
// cameras, the scene, and collections each have a fixed operation set.
// Call expressions are limited to builtins and compiled helpers.

use crate::stage_compiler::error::{CompilerError, Span};
use crate::stage_compiler::ir::{CallOp, ExternalKind, IrExpr, IrStmt};
use crate::stage_compiler::schema::TypeExpr;
use crate::stage_compiler::syntax::{Expr, ExprKind, Keyword};
use crate::stage_compiler::value::Value;
use indexmap::IndexMap;

use super::{BodyCompiler, FunctionKind, SpawnTemplate, VarTag, BUILTINS};

impl<'a> BodyCompiler<'a> {
    pub(super) fn lower_call_expr(
        &mut self,
        func: &Expr,
        args: &[Expr],
        keywords: &[Keyword],
        span: Span,
    ) -> Result<IrExpr, CompilerError> {
        let name = match &func.kind {
            ExprKind::Name(name) if !self.is_variable(name) => name.as_str(),
            ExprKind::Attribute { .. } => {
                return Err(CompilerError::UnsupportedSyntax(
                    format!("{} has no value; method calls are statements", func.describe()),
                    span,
                ))
            }
            _ => {
                return Err(CompilerError::UnsupportedSyntax(
                    format!("cannot call {}", func.describe()),
                    span,
                ))
            }
        };
        if name == "range" {
            return Err(CompilerError::UnsupportedSyntax(
                "range() is only allowed as the iterable of a for loop".to_string(),
                span,
            ));
        }
        if self.ctx.schemas.is_actor(name) {
            return Err(CompilerError::UnsupportedSyntax(
                format!(
                    "{}(...) must be assigned to a variable or passed to spawn()",
                    name
                ),
                span,
            ));
        }

        let (external, min, max) = if let Some(arity) = self.ctx.helpers.get(name) {
            (ExternalKind::Helper, *arity, *arity)
        } else if let Some((min, max)) = BUILTINS.get(name) {
            (ExternalKind::Builtin, *min, *max)
        } else {
            return Err(CompilerError::UndefinedSymbol(name.to_string(), func.span));
        };
        if let Some(keyword) = keywords.first() {
            return Err(CompilerError::UnsupportedSyntax(
                format!("{}() takes no keyword arguments, found '{}'", name, keyword.name),
                keyword.value.span,
            ));
        }
        check_arity(name, args.len(), min, max, span)?;
        let args = args
            .iter()
            .map(|arg| self.lower_expr(arg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(IrExpr::Call {
            func: name.to_string(),
            external,
            args,
        })
    }

    pub(super) fn lower_call_stmt(
        &mut self,
        func: &Expr,
        args: &[Expr],
        keywords: &[Keyword],
        span: Span,
        out: &mut Vec<IrStmt>,
    ) -> Result<(), CompilerError> {
        if self.kind == FunctionKind::Predicate {
            return Err(CompilerError::BindingError(
                format!(
                    "predicate '{}' is read-only and cannot perform {}",
                    self.function,
                    func.describe()
                ),
                span,
            ));
        }
        let (receiver, method) = match &func.kind {
            ExprKind::Attribute { value, attr } => (value.as_ref(), attr.as_str()),
            ExprKind::Name(name) if self.ctx.helpers.contains_key(name) || BUILTINS.contains_key(name.as_str()) => {
                return Err(CompilerError::UnsupportedSyntax(
                    format!("the result of {}() is discarded; call it inside an expression", name),
                    span,
                ))
            }
            ExprKind::Name(name) if !self.is_variable(name) && !self.ctx.schemas.is_actor(name) => {
                return Err(CompilerError::UndefinedSymbol(name.clone(), func.span))
            }
            _ => {
                return Err(CompilerError::UnsupportedSyntax(
                    format!("{} is not a supported statement", func.describe()),
                    span,
                ))
            }
        };

        // Scene.method(scene, ...) is the same as scene.method(...)
        if receiver.as_name() == Some("Scene") && !self.is_variable("Scene") {
            let (scene, rest) = match args.split_first() {
                Some((scene, rest)) if scene.as_name().and_then(|n| self.tag(n)) == Some(&VarTag::Scene) => {
                    (scene, rest)
                }
                _ => {
                    return Err(CompilerError::BindingError(
                        format!("Scene.{}() expects a Scene parameter as its first argument", method),
                        span,
                    ))
                }
            };
            let scene = self.lower_expr(scene)?;
            let stmt = self.scene_method(scene, method, rest, keywords, span)?;
            out.push(stmt);
            return Ok(());
        }

        let stmt = match self.receiver_tag(receiver) {
            Some(VarTag::Actor(_)) => {
                let actor = self.lower_expr(receiver)?;
                self.actor_method(actor, method, args, keywords, span)?
            }
            Some(VarTag::Camera) => {
                let camera = self.lower_expr(receiver)?;
                self.camera_method(camera, method, args, keywords, span)?
            }
            Some(VarTag::Scene) => {
                let scene = self.lower_expr(receiver)?;
                self.scene_method(scene, method, args, keywords, span)?
            }
            Some(tag) if tag.is_collection() => {
                let collection = self.lower_expr(receiver)?;
                self.collection_method(collection, method, args, keywords, span)?
            }
            Some(tag) => {
                return Err(CompilerError::UnsupportedSyntax(
                    format!("{} '{}' has no method '{}'", tag.describe(), receiver_name(receiver), method),
                    span,
                ))
            }
            None => {
                return Err(CompilerError::BindingError(
                    format!(
                        "cannot call '{}' on {}; it is not an actor, camera, scene or collection",
                        method,
                        receiver.describe()
                    ),
                    receiver.span,
                ))
            }
        };
        log::trace!("BIND: {}.{} -> {:?}", receiver_name(receiver), method, stmt_op(&stmt));
        out.push(stmt);
        Ok(())
    }

    fn actor_method(
        &mut self,
        actor: IrExpr,
        method: &str,
        args: &[Expr],
        keywords: &[Keyword],
        span: Span,
    ) -> Result<IrStmt, CompilerError> {
        no_keywords(method, keywords)?;
        let (op, args) = match method {
            "play" => {
                check_arity(method, args.len(), 1, 1, span)?;
                (CallOp::Play, vec![actor, self.lower_expr(&args[0])?])
            }
            "destroy" => {
                check_arity(method, args.len(), 0, 0, span)?;
                (CallOp::Destroy, vec![actor])
            }
            "attached_to" => {
                check_arity(method, args.len(), 1, 1, span)?;
                (CallOp::AttachedTo, vec![actor, self.actor_ident(&args[0])?])
            }
            "detached" => {
                check_arity(method, args.len(), 0, 0, span)?;
                (CallOp::Detached, vec![actor])
            }
            _ => return Err(unknown_method("actor", method, "play, destroy, attached_to, detached", span)),
        };
        Ok(IrStmt::Call { op, args })
    }

    fn camera_method(
        &mut self,
        camera: IrExpr,
        method: &str,
        args: &[Expr],
        keywords: &[Keyword],
        span: Span,
    ) -> Result<IrStmt, CompilerError> {
        no_keywords(method, keywords)?;
        let (op, args) = match method {
            "follow" => {
                check_arity(method, args.len(), 1, 1, span)?;
                (CallOp::Follow, vec![camera, self.actor_ident(&args[0])?])
            }
            "detach" => {
                check_arity(method, args.len(), 0, 0, span)?;
                (CallOp::Detach, vec![camera])
            }
            "translate" => {
                check_arity(method, args.len(), 2, 2, span)?;
                let dx = self.lower_expr(&args[0])?;
                let dy = self.lower_expr(&args[1])?;
                (CallOp::Translate, vec![camera, dx, dy])
            }
            _ => return Err(unknown_method("camera", method, "follow, detach, translate", span)),
        };
        Ok(IrStmt::Call { op, args })
    }

    fn scene_method(
        &mut self,
        scene: IrExpr,
        method: &str,
        args: &[Expr],
        keywords: &[Keyword],
        span: Span,
    ) -> Result<IrStmt, CompilerError> {
        let (op, args) = match method {
            "enable_gravity" | "disable_gravity" | "next_turn" => {
                no_keywords(method, keywords)?;
                check_arity(method, args.len(), 0, 0, span)?;
                let op = match method {
                    "enable_gravity" => CallOp::EnableGravity,
                    "disable_gravity" => CallOp::DisableGravity,
                    _ => CallOp::NextTurn,
                };
                (op, vec![scene])
            }
            "set_interface" => {
                check_arity(method, args.len(), 1, 2, span)?;
                let role_expr = match (args.get(1), Keyword::find(keywords, "role")) {
                    (Some(_), Some(kw)) => {
                        return Err(CompilerError::UnsupportedSyntax(
                            "role given both positionally and by keyword".to_string(),
                            kw.span,
                        ))
                    }
                    (positional, keyword) => positional.or(keyword),
                };
                if let Some(other) = keywords.iter().find(|kw| kw.name != "role") {
                    return Err(CompilerError::UnsupportedSyntax(
                        format!("set_interface() has no keyword '{}'", other.name),
                        other.value.span,
                    ));
                }
                let role = match role_expr {
                    Some(expr) => Value::Str(crate::stage_compiler::binding::parse_role_ref(
                        expr,
                        self.ctx.schemas,
                    )?),
                    None => Value::None,
                };
                let text = self.lower_expr(&args[0])?;
                (CallOp::SetInterface, vec![scene, text, IrExpr::constant(role)])
            }
            "spawn" => {
                no_keywords(method, keywords)?;
                check_arity(method, args.len(), 1, 1, span)?;
                let template = match &args[0].kind {
                    ExprKind::Name(name) if self.templates.contains_key(name) => {
                        self.templates.get(name).cloned()
                    }
                    _ => self.spawn_template_of(&args[0])?,
                };
                let template = template.ok_or_else(|| {
                    CompilerError::BindingError(
                        format!(
                            "spawn() expects an actor constructor such as Coin(\"c1\", x=10), found {}",
                            args[0].describe()
                        ),
                        args[0].span,
                    )
                })?;
                (
                    CallOp::Spawn,
                    vec![
                        scene,
                        IrExpr::constant(Value::Str(template.schema)),
                        template.uid,
                        IrExpr::Object {
                            entries: template.fields,
                        },
                    ],
                )
            }
            _ => {
                return Err(unknown_method(
                    "scene",
                    method,
                    "enable_gravity, disable_gravity, set_interface, next_turn, spawn",
                    span,
                ))
            }
        };
        Ok(IrStmt::Call { op, args })
    }

    fn collection_method(
        &mut self,
        collection: IrExpr,
        method: &str,
        args: &[Expr],
        keywords: &[Keyword],
        span: Span,
    ) -> Result<IrStmt, CompilerError> {
        no_keywords(method, keywords)?;
        let op = match method {
            "append" => {
                check_arity(method, args.len(), 1, 1, span)?;
                CallOp::Append
            }
            "update" => {
                check_arity(method, args.len(), 1, 1, span)?;
                CallOp::Update
            }
            "pop" => {
                check_arity(method, args.len(), 0, 1, span)?;
                CallOp::Pop
            }
            _ => return Err(unknown_method("collection", method, "append, update, pop", span)),
        };
        let mut lowered = vec![collection];
        for arg in args {
            lowered.push(self.lower_expr(arg)?);
        }
        Ok(IrStmt::Call { op, args: lowered })
    }

    /// `Schema(uid?, field=value, ...)` as a pending spawn; `None` if `expr` is not
    /// an actor constructor.
    pub(super) fn spawn_template_of(&mut self, expr: &Expr) -> Result<Option<SpawnTemplate>, CompilerError> {
        let (schema_name, args, keywords) = match &expr.kind {
            ExprKind::Call {
                func,
                args,
                keywords,
            } => match func.as_name() {
                Some(name) if self.ctx.schemas.is_actor(name) && !self.is_variable(name) => {
                    (name.to_string(), args, keywords)
                }
                Some(name) if self.ctx.schemas.is_role(name) => {
                    return Err(CompilerError::UnsupportedSyntax(
                        format!("role '{}' can only be declared in setup code", name),
                        expr.span,
                    ))
                }
                _ => return Ok(None),
            },
            ExprKind::Name(name) => return Ok(self.templates.get(name).cloned()),
            _ => return Ok(None),
        };
        if args.len() > 1 {
            return Err(CompilerError::UnsupportedSyntax(
                format!("{}() takes the uid as its only positional argument", schema_name),
                args[1].span,
            ));
        }
        let mut uid = match args.first() {
            Some(arg) => self.lower_expr(arg)?,
            // the runtime assigns a fresh uid
            None => IrExpr::constant(Value::None),
        };

        let mut fields = IndexMap::new();
        for keyword in keywords {
            let declared = self
                .ctx
                .schemas
                .field_type(&schema_name, &keyword.name)
                .cloned()
                .ok_or_else(|| {
                    CompilerError::UndefinedSymbol(
                        format!("{}.{}", schema_name, keyword.name),
                        keyword.value.span,
                    )
                })?;
            let value = match keyword.name.as_str() {
                "parent" => self.actor_ident(&keyword.value)?,
                _ => {
                    let value = self.lower_expr(&keyword.value)?;
                    self.check_value_type(&declared, &value, keyword.value.span)?;
                    value
                }
            };
            if keyword.name == "uid" {
                if !args.is_empty() {
                    return Err(CompilerError::DuplicateSymbol("uid".to_string(), keyword.value.span));
                }
                uid = value;
                continue;
            }
            fields.insert(keyword.name.clone(), value);
        }
        if let Some(declared) = self.expr_type(&uid) {
            if declared != TypeExpr::Str {
                return Err(CompilerError::TypeMismatch("str uid".to_string(), declared.to_string(), expr.span));
            }
        }
        Ok(Some(SpawnTemplate {
            schema: schema_name,
            uid,
            fields,
        }))
    }

    /// Resolve an actor reference to its uid: a string, a typed actor variable,
    /// `actor.uid`, or `Schema["uid"]`.
    fn actor_ident(&mut self, expr: &Expr) -> Result<IrExpr, CompilerError> {
        let fail = || {
            CompilerError::BindingError(
                format!(
                    "cannot resolve {} to an actor identifier; use a uid string, a typed actor variable or Schema[\"uid\"]",
                    expr.describe()
                ),
                expr.span,
            )
        };
        match &expr.kind {
            ExprKind::Str(uid) => Ok(IrExpr::constant(Value::Str(uid.clone()))),
            ExprKind::Name(name) => match self.tag(name) {
                Some(VarTag::Actor(Some(_))) => Ok(IrExpr::attr(IrExpr::var(name), "uid")),
                Some(_) => Err(fail()),
                None if self.is_variable(name) => Err(fail()),
                None => match self.ctx.constants.get(name) {
                    Some(value @ Value::Str(_)) => Ok(IrExpr::constant(value.clone())),
                    _ => Err(fail()),
                },
            },
            ExprKind::Attribute { value, attr } if attr == "uid" => {
                self.field_type(value, attr, false, expr.span)?;
                Ok(IrExpr::attr(self.lower_expr(value)?, "uid"))
            }
            ExprKind::Subscript { value, index } => {
                let head = value.as_name().unwrap_or("");
                if head != "Actor" && !self.ctx.schemas.is_actor(head) {
                    return Err(fail());
                }
                match index.as_str() {
                    Some(uid) => Ok(IrExpr::constant(Value::Str(uid.to_string()))),
                    None => Err(CompilerError::BindingError(
                        format!("{}[...] must name a uid here, not an index", head),
                        index.span,
                    )),
                }
            }
            _ => Err(fail()),
        }
    }

    /// Iterable of `for v in range(...)`.
    pub(super) fn lower_range(
        &mut self,
        args: &[Expr],
        keywords: &[Keyword],
        span: Span,
    ) -> Result<IrExpr, CompilerError> {
        no_keywords("range", keywords)?;
        check_arity("range", args.len(), 1, 3, span)?;
        let mut lowered = Vec::new();
        for arg in args {
            let value = self.lower_expr(arg)?;
            if let Some(ty) = self.expr_type(&value) {
                if ty != TypeExpr::Int {
                    return Err(CompilerError::TypeMismatch("int".to_string(), ty.to_string(), arg.span));
                }
            }
            lowered.push(value);
        }
        let zero = || IrExpr::constant(Value::Int(0));
        let one = || IrExpr::constant(Value::Int(1));
        let (start, stop, step) = match lowered.len() {
            1 => (zero(), lowered.remove(0), one()),
            2 => {
                let stop = lowered.remove(1);
                (lowered.remove(0), stop, one())
            }
            _ => {
                let step = lowered.remove(2);
                let stop = lowered.remove(1);
                (lowered.remove(0), stop, step)
            }
        };
        if matches!(&step, IrExpr::Const { value: Value::Int(0) }) {
            return Err(CompilerError::BindingError(
                "range() step must not be zero".to_string(),
                span,
            ));
        }
        Ok(IrExpr::Range {
            start: Box::new(start),
            stop: Box::new(stop),
            step: Box::new(step),
        })
    }
}

fn check_arity(name: &str, given: usize, min: usize, max: usize, span: Span) -> Result<(), CompilerError> {
    if given >= min && given <= max {
        return Ok(());
    }
    let expected = if min == max {
        format!("{}", min)
    } else if max == usize::MAX {
        format!("at least {}", min)
    } else {
        format!("{} to {}", min, max)
    };
    Err(CompilerError::BindingError(
        format!(
            "{}() takes {} argument{}, {} given",
            name,
            expected,
            if max == 1 && min == 1 { "" } else { "s" },
            given
        ),
        span,
    ))
}

fn no_keywords(method: &str, keywords: &[Keyword]) -> Result<(), CompilerError> {
    match keywords.first() {
        Some(keyword) => Err(CompilerError::UnsupportedSyntax(
            format!("{}() takes no keyword arguments, found '{}'", method, keyword.name),
            keyword.value.span,
        )),
        None => Ok(()),
    }
}

fn unknown_method(receiver: &str, method: &str, known: &str, span: Span) -> CompilerError {
    CompilerError::UnsupportedSyntax(
        format!("{} has no method '{}' (expected one of: {})", receiver, method, known),
        span,
    )
}

fn receiver_name(receiver: &Expr) -> String {
    receiver.dotted_path().unwrap_or_else(|| receiver.describe())
}

fn stmt_op(stmt: &IrStmt) -> Option<CallOp> {
    match stmt {
        IrStmt::Call { op, .. } => Some(*op),
        _ => None,
    }
}
