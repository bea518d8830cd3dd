// Body Compiler - Expression Lowering
//
// Names, literals, operators, field access and static type checks.

use crate::stage_compiler::error::{CompilerError, Span};
use crate::stage_compiler::ir::{IrExpr, IrUnaryOp};
use crate::stage_compiler::schema::TypeExpr;
use crate::stage_compiler::syntax::{Expr, ExprKind};
use crate::stage_compiler::value::Value;
use indexmap::IndexMap;

use super::{BodyCompiler, VarTag, CAMERA_FIELDS};

impl<'a> BodyCompiler<'a> {
    pub(super) fn lower_expr(&mut self, expr: &Expr) -> Result<IrExpr, CompilerError> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Name(name) => self.lower_name(name, span),
            ExprKind::Int(i) => Ok(IrExpr::constant(Value::Int(*i))),
            ExprKind::Float(f) => Ok(IrExpr::constant(Value::Float(*f))),
            ExprKind::Str(s) => Ok(IrExpr::constant(Value::Str(s.clone()))),
            ExprKind::Bool(b) => Ok(IrExpr::constant(Value::Bool(*b))),
            ExprKind::None => Ok(IrExpr::constant(Value::None)),
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                let items = items
                    .iter()
                    .map(|item| self.lower_expr(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(IrExpr::List { items })
            }
            ExprKind::Dict(entries) => {
                let mut out = IndexMap::new();
                for (key, value) in entries {
                    let key = key.as_str().ok_or_else(|| {
                        CompilerError::UnsupportedSyntax(
                            format!("dict keys must be string literals, found {}", key.describe()),
                            key.span,
                        )
                    })?;
                    let value = self.lower_expr(value)?;
                    out.insert(key.to_string(), value);
                }
                Ok(IrExpr::Object { entries: out })
            }
            ExprKind::Attribute { value, attr } => {
                self.field_type(value, attr, false, span)?;
                Ok(IrExpr::attr(self.lower_expr(value)?, attr))
            }
            ExprKind::Subscript { value, index } => {
                if let Some(tag) = value.as_name().and_then(|n| self.tag(n)) {
                    if matches!(
                        tag,
                        VarTag::Actor(_) | VarTag::Role(_) | VarTag::Camera | VarTag::Scene | VarTag::Tick
                    ) {
                        return Err(CompilerError::BindingError(
                            format!("{} '{}' cannot be indexed", tag.describe(), value.describe()),
                            span,
                        ));
                    }
                }
                Ok(IrExpr::Index {
                    object: Box::new(self.lower_expr(value)?),
                    index: Box::new(self.lower_expr(index)?),
                })
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => self.lower_call_expr(func, args, keywords, span),
            ExprKind::Unary { op, operand } => {
                let operand = self.lower_expr(operand)?;
                // fold negative literals so constants stay constants
                if let (IrUnaryOp::Minus, IrExpr::Const { value }) = (IrUnaryOp::from(*op), &operand) {
                    match value {
                        Value::Int(i) => return Ok(IrExpr::constant(Value::Int(-i))),
                        Value::Float(f) => return Ok(IrExpr::constant(Value::Float(-f))),
                        _ => {}
                    }
                }
                Ok(IrExpr::Unary {
                    op: IrUnaryOp::from(*op),
                    operand: Box::new(operand),
                })
            }
            ExprKind::Binary { left, op, right } => Ok(IrExpr::Binary {
                op: (*op).into(),
                left: Box::new(self.lower_expr(left)?),
                right: Box::new(self.lower_expr(right)?),
            }),
        }
    }

    fn lower_name(&self, name: &str, span: Span) -> Result<IrExpr, CompilerError> {
        if self.templates.contains_key(name) {
            return Err(CompilerError::UnsupportedSyntax(
                format!("'{}' holds an actor template and can only be passed to spawn()", name),
                span,
            ));
        }
        if self.is_variable(name) {
            return Ok(IrExpr::var(name));
        }
        if let Some(value) = self.ctx.constants.get(name) {
            log::trace!("BIND: inlining constant {} = {}", name, value);
            return Ok(IrExpr::constant(value.clone()));
        }
        if self.ctx.schemas.is_actor(name) || self.ctx.schemas.is_role(name) {
            return Err(CompilerError::UnsupportedSyntax(
                format!("schema '{}' cannot be used as a value", name),
                span,
            ));
        }
        Err(CompilerError::UndefinedSymbol(name.to_string(), span))
    }

    /// Check `receiver.field` against the receiver's tracked type and return the
    /// field's declared type.
    pub(super) fn field_type(
        &self,
        receiver: &Expr,
        field: &str,
        write: bool,
        span: Span,
    ) -> Result<Option<TypeExpr>, CompilerError> {
        let tag = self.receiver_tag(receiver).ok_or_else(|| {
            CompilerError::BindingError(
                format!(
                    "{} has no declared type; field access needs an actor, role, camera, scene or tick binding",
                    receiver.describe()
                ),
                receiver.span,
            )
        })?;
        let read_only = |what: &str| {
            CompilerError::BindingError(format!("{} '{}' is read-only", what, field), span)
        };
        match &tag {
            VarTag::Actor(None) | VarTag::Role(None) => Err(CompilerError::BindingError(
                format!(
                    "untyped {} binding has no fields; annotate it with a schema to access '{}'",
                    tag.describe(),
                    field
                ),
                span,
            )),
            VarTag::Actor(Some(schema)) | VarTag::Role(Some(schema)) => {
                let spec = self
                    .ctx
                    .schemas
                    .actor(schema)
                    .or_else(|| self.ctx.schemas.role(schema))
                    .and_then(|s| s.field(field))
                    .ok_or_else(|| CompilerError::UndefinedSymbol(format!("{}.{}", schema, field), span))?;
                if write && field == "uid" {
                    return Err(read_only("actor field"));
                }
                if write && spec.local {
                    return Err(CompilerError::BindingError(
                        format!("'{}' is a client-local field of {} and cannot be set here", field, schema),
                        span,
                    ));
                }
                Ok(Some(spec.ty.clone()))
            }
            VarTag::Camera => {
                if !CAMERA_FIELDS.contains(&field) {
                    return Err(CompilerError::UndefinedSymbol(format!("Camera.{}", field), span));
                }
                if write {
                    return Err(read_only("camera field"));
                }
                Ok(Some(TypeExpr::Float))
            }
            VarTag::Scene | VarTag::Tick => {
                if field != "elapsed" {
                    return Err(CompilerError::BindingError(
                        format!("{} only exposes 'elapsed', not '{}'", tag.describe(), field),
                        span,
                    ));
                }
                if write {
                    return Err(read_only("field"));
                }
                Ok(Some(TypeExpr::Float))
            }
            VarTag::ActorList(_) | VarTag::Value(_) | VarTag::Collection => Err(CompilerError::BindingError(
                format!("{} {} has no field '{}'", tag.describe(), receiver.describe(), field),
                span,
            )),
        }
    }

    /// Static type of a lowered expression, where it can be known.
    pub(super) fn expr_type(&self, expr: &IrExpr) -> Option<TypeExpr> {
        match expr {
            IrExpr::Const { value } => TypeExpr::infer(value),
            IrExpr::Var { name } => match self.tag(name) {
                Some(VarTag::Value(ty)) => ty.clone(),
                _ => None,
            },
            IrExpr::Attr { object, field } => {
                let tag = match object.as_ref() {
                    IrExpr::Var { name } => self.tag(name).cloned(),
                    IrExpr::Index { object, .. } => match object.as_ref() {
                        IrExpr::Var { name } => match self.tag(name) {
                            Some(VarTag::ActorList(schema)) => Some(VarTag::Actor(schema.clone())),
                            _ => None,
                        },
                        _ => None,
                    },
                    _ => None,
                };
                match tag? {
                    VarTag::Actor(Some(schema)) | VarTag::Role(Some(schema)) => {
                        self.ctx.schemas.field_type(&schema, field).cloned()
                    }
                    VarTag::Camera | VarTag::Scene | VarTag::Tick => Some(TypeExpr::Float),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    pub(super) fn check_value_type(
        &self,
        declared: &TypeExpr,
        value: &IrExpr,
        span: Span,
    ) -> Result<(), CompilerError> {
        match self.expr_type(value) {
            Some(found) if !assignable(declared, &found) => Err(CompilerError::TypeMismatch(
                declared.to_string(),
                found.to_string(),
                span,
            )),
            _ => Ok(()),
        }
    }
}

/// Whether a value of type `found` may be stored where `declared` is expected.
fn assignable(declared: &TypeExpr, found: &TypeExpr) -> bool {
    match (declared, found) {
        (TypeExpr::Float, TypeExpr::Int) => true,
        (TypeExpr::List(a), TypeExpr::List(b)) | (TypeExpr::Dict(a), TypeExpr::Dict(b)) => assignable(a, b),
        (a, b) => a == b,
    }
}
