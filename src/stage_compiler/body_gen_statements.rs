// Body Compiler - Statement Lowering
//
// Assignments, control flow, `yield` and `continue`. Call statements are
// dispatched from here into body_gen_calls.

use crate::stage_compiler::error::{CompilerError, Span};
use crate::stage_compiler::ir::{AssignTarget, BindingKind, IrBinaryOp, IrExpr, IrStmt};
use crate::stage_compiler::schema::TypeExpr;
use crate::stage_compiler::syntax::{BinaryOp, Expr, ExprKind, Stmt, StmtKind};

use super::{BodyCompiler, FunctionKind, VarTag};

impl<'a> BodyCompiler<'a> {
    pub(super) fn lower_block(&mut self, body: &[Stmt]) -> Result<Vec<IrStmt>, CompilerError> {
        let mut out = Vec::new();
        for stmt in body {
            self.lower_stmt(stmt, &mut out)?;
        }
        Ok(out)
    }

    fn lower_stmt(&mut self, stmt: &Stmt, out: &mut Vec<IrStmt>) -> Result<(), CompilerError> {
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Pass => Ok(()),
            StmtKind::Import(_) | StmtKind::ImportFrom { .. } => Err(CompilerError::UnsupportedSyntax(
                "imports are only allowed at module level".to_string(),
                span,
            )),
            StmtKind::FunctionDef(def) => Err(CompilerError::UnsupportedSyntax(
                format!("nested function '{}' is not supported", def.name),
                span,
            )),
            StmtKind::ClassDef(class) => Err(CompilerError::UnsupportedSyntax(
                format!("class '{}' must be declared at module level", class.name),
                span,
            )),
            StmtKind::If { test, body, orelse } => {
                let cond = self.lower_expr(test)?;
                let then_body = self.lower_block(body)?;
                let else_body = self.lower_block(orelse)?;
                out.push(IrStmt::If {
                    cond,
                    then_body,
                    else_body,
                });
                Ok(())
            }
            StmtKind::While { test, body, orelse } => {
                let cond = self.lower_expr(test)?;
                self.loop_depth += 1;
                let body = self.lower_block(body);
                self.loop_depth -= 1;
                out.push(IrStmt::While { cond, body: body? });
                // without `break` the else clause always runs once the loop ends
                out.extend(self.lower_block(orelse)?);
                Ok(())
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => self.lower_for(target, iter, body, orelse, out),
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(CompilerError::UnsupportedSyntax(
                        "'continue' outside of a loop".to_string(),
                        span,
                    ));
                }
                out.push(IrStmt::Continue);
                Ok(())
            }
            StmtKind::Return(_) => Err(match self.kind {
                FunctionKind::Action => CompilerError::UnsupportedSyntax(
                    format!(
                        "action '{}' cannot return a value; actions only have effects",
                        self.function
                    ),
                    span,
                ),
                _ => CompilerError::UnsupportedSyntax(
                    format!(
                        "{} '{}' may only return once, as its last statement",
                        self.kind.describe(),
                        self.function
                    ),
                    span,
                ),
            }),
            StmtKind::Yield(value) => self.lower_yield(value, span, out),
            StmtKind::Assign { target, value } => self.lower_assign(target, value, span, out),
            StmtKind::AugAssign { target, op, value } => {
                self.lower_aug_assign(target, *op, value, span, out)
            }
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => {
                let value = value.as_ref().ok_or_else(|| {
                    CompilerError::UnsupportedSyntax(
                        "a local declaration needs a value".to_string(),
                        span,
                    )
                })?;
                let before = out.len();
                self.lower_assign(target, value, span, out)?;
                if let (Ok(declared), Some(IrStmt::Assign { value: lowered, .. })) =
                    (TypeExpr::parse(annotation), out.get(before))
                {
                    self.check_value_type(&declared, lowered, value.span)?;
                }
                Ok(())
            }
            StmtKind::Expr(expr) => match &expr.kind {
                ExprKind::Call {
                    func,
                    args,
                    keywords,
                } => self.lower_call_stmt(func, args, keywords, span, out),
                _ => Err(CompilerError::UnsupportedSyntax(
                    format!("{} has no effect as a statement", expr.describe()),
                    span,
                )),
            },
        }
    }

    fn lower_yield(&mut self, value: &Expr, span: Span, out: &mut Vec<IrStmt>) -> Result<(), CompilerError> {
        if self.kind != FunctionKind::Action {
            return Err(CompilerError::UnsupportedSyntax(
                format!(
                    "{} '{}' cannot yield; only actions may suspend",
                    self.kind.describe(),
                    self.function
                ),
                span,
            ));
        }
        match value.as_name() {
            Some(name) if self.tag(name) == Some(&VarTag::Tick) => {
                out.push(IrStmt::Yield {
                    tick: name.to_string(),
                });
                Ok(())
            }
            _ => Err(CompilerError::BindingError(
                format!(
                    "yield expects a Tick parameter, found {}",
                    value.describe()
                ),
                value.span,
            )),
        }
    }

    fn lower_for(
        &mut self,
        target: &Expr,
        iter: &Expr,
        body: &[Stmt],
        orelse: &[Stmt],
        out: &mut Vec<IrStmt>,
    ) -> Result<(), CompilerError> {
        let var = match &target.kind {
            ExprKind::Name(name) => name.clone(),
            ExprKind::Tuple(_) => {
                return Err(CompilerError::UnsupportedSyntax(
                    "tuple unpacking in a for loop is only supported in setup code".to_string(),
                    target.span,
                ))
            }
            _ => {
                return Err(CompilerError::UnsupportedSyntax(
                    format!("cannot use {} as a loop variable", target.describe()),
                    target.span,
                ))
            }
        };
        self.check_rebind(&var, target.span)?;

        let iter_ir = match &iter.kind {
            ExprKind::Call { func, args, keywords } if func.as_name() == Some("range") && !self.is_variable("range") => {
                self.lower_range(args, keywords, iter.span)?
            }
            _ => self.lower_expr(iter)?,
        };
        // iterating an actor list yields actors of the same schema
        match iter.as_name().and_then(|n| self.tag(n)) {
            Some(VarTag::ActorList(schema)) => {
                let tag = VarTag::Actor(schema.clone());
                self.tags.insert(var.clone(), tag);
            }
            _ => {
                self.tags.remove(&var);
            }
        }
        self.templates.remove(&var);

        self.loop_depth += 1;
        let body = self.lower_block(body);
        self.loop_depth -= 1;
        out.push(IrStmt::For {
            var,
            iter: iter_ir,
            body: body?,
        });
        out.extend(self.lower_block(orelse)?);
        Ok(())
    }

    fn lower_assign(&mut self, target: &Expr, value: &Expr, span: Span, out: &mut Vec<IrStmt>) -> Result<(), CompilerError> {
        match &target.kind {
            ExprKind::Name(name) => {
                self.check_rebind(name, target.span)?;
                if let Some(template) = self.spawn_template_of(value)? {
                    log::trace!("BIND: '{}' holds a spawn template for {}", name, template.schema);
                    self.tags.remove(name);
                    self.templates.insert(name.clone(), template);
                    return Ok(());
                }
                let lowered = self.lower_expr(value)?;
                let tag = match &value.kind {
                    ExprKind::Name(source) => self.tag(source).cloned(),
                    ExprKind::List(_) | ExprKind::Dict(_) => Some(VarTag::Collection),
                    _ => None,
                };
                if let Some(VarTag::Value(Some(declared))) = self.tag(name).cloned() {
                    if self.params.contains_key(name) {
                        self.check_value_type(&declared, &lowered, value.span)?;
                    }
                }
                // a parameter keeps its binding tag when reassigned
                if !self.params.contains_key(name) {
                    match tag {
                        Some(tag) => self.tags.insert(name.clone(), tag),
                        None => self.tags.remove(name),
                    };
                    self.templates.remove(name);
                }
                out.push(IrStmt::Assign {
                    target: AssignTarget::Var { name: name.clone() },
                    value: lowered,
                });
                Ok(())
            }
            ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => {
                let target = self.assign_target(target)?;
                let lowered = self.lower_expr(value)?;
                if let Some(declared) = self.target_type(&target) {
                    self.check_value_type(&declared, &lowered, value.span)?;
                }
                out.push(IrStmt::Assign {
                    target,
                    value: lowered,
                });
                Ok(())
            }
            ExprKind::Tuple(_) | ExprKind::List(_) => Err(CompilerError::UnsupportedSyntax(
                "unpacking assignment is only supported in setup code".to_string(),
                span,
            )),
            _ => Err(CompilerError::UnsupportedSyntax(
                format!("cannot assign to {}", target.describe()),
                target.span,
            )),
        }
    }

    fn lower_aug_assign(
        &mut self,
        target: &Expr,
        op: BinaryOp,
        value: &Expr,
        span: Span,
        out: &mut Vec<IrStmt>,
    ) -> Result<(), CompilerError> {
        let ir_target = match &target.kind {
            ExprKind::Name(name) => {
                self.check_rebind(name, target.span)?;
                if !self.params.contains_key(name) {
                    self.tags.remove(name);
                }
                AssignTarget::Var { name: name.clone() }
            }
            ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => self.assign_target(target)?,
            _ => {
                return Err(CompilerError::UnsupportedSyntax(
                    format!("cannot assign to {}", target.describe()),
                    span,
                ))
            }
        };
        let current = self.lower_expr(target)?;
        let value = IrExpr::Binary {
            op: IrBinaryOp::from(op),
            left: Box::new(current),
            right: Box::new(self.lower_expr(value)?),
        };
        out.push(IrStmt::Assign {
            target: ir_target,
            value,
        });
        Ok(())
    }

    /// Attribute and index targets; the receiver must allow writes.
    fn assign_target(&mut self, target: &Expr) -> Result<AssignTarget, CompilerError> {
        match &target.kind {
            ExprKind::Attribute { value, attr } => {
                if self.kind == FunctionKind::Predicate {
                    return Err(self.read_only_predicate(target));
                }
                self.field_type(value, attr, true, target.span)?;
                Ok(AssignTarget::Attr {
                    object: self.lower_expr(value)?,
                    field: attr.clone(),
                })
            }
            ExprKind::Subscript { value, index } => {
                if let Some(root) = value.as_name() {
                    if self.kind == FunctionKind::Predicate && self.params.contains_key(root) {
                        return Err(self.read_only_predicate(target));
                    }
                    match self.tag(root) {
                        Some(VarTag::Value(Some(ty))) if ty.is_primitive() => {
                            return Err(CompilerError::TypeMismatch(
                                "a list or dict".to_string(),
                                ty.to_string(),
                                value.span,
                            ))
                        }
                        Some(tag) if !tag.is_collection() && !matches!(tag, VarTag::Value(_)) => {
                            return Err(CompilerError::BindingError(
                                format!("cannot assign into {} '{}'", tag.describe(), root),
                                value.span,
                            ))
                        }
                        _ => {}
                    }
                }
                Ok(AssignTarget::Index {
                    object: self.lower_expr(value)?,
                    index: self.lower_expr(index)?,
                })
            }
            _ => Err(CompilerError::UnsupportedSyntax(
                format!("cannot assign to {}", target.describe()),
                target.span,
            )),
        }
    }

    fn read_only_predicate(&self, target: &Expr) -> CompilerError {
        CompilerError::BindingError(
            format!(
                "predicate '{}' is read-only and cannot assign to {}",
                self.function,
                target.describe()
            ),
            target.span,
        )
    }

    /// Only globals and helper arguments may be reassigned, and never in a predicate.
    fn check_rebind(&self, name: &str, span: Span) -> Result<(), CompilerError> {
        match self.params.get(name) {
            None => Ok(()),
            Some(_) if self.kind == FunctionKind::Predicate => Err(CompilerError::BindingError(
                format!(
                    "predicate '{}' is read-only and cannot reassign parameter '{}'",
                    self.function, name
                ),
                span,
            )),
            Some(None) | Some(Some(BindingKind::Global)) => Ok(()),
            Some(Some(_)) => Err(CompilerError::BindingError(
                format!(
                    "cannot reassign {} parameter '{}'",
                    self.tag(name).map(VarTag::describe).unwrap_or("bound"),
                    name
                ),
                span,
            )),
        }
    }

    /// Declared type of an attribute target, when the receiver schema declares one.
    fn target_type(&self, target: &AssignTarget) -> Option<TypeExpr> {
        match target {
            AssignTarget::Attr { object, field } => self.expr_type(&IrExpr::Attr {
                object: Box::new(object.clone()),
                field: field.clone(),
            }),
            _ => None,
        }
    }
}
