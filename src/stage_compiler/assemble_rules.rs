// Project Assembler - Rules
//
// Parses condition expressions, binds them to actions, and rebinds the
// parameters of collision actions and logical predicates to the reserved
// identifiers the runtime provides.

use crate::stage_compiler::binding::{parse_actor_ref, parse_role_ref};
use crate::stage_compiler::error::{CompilerError, Span};
use crate::stage_compiler::ir::{
    ActorRef, BindingKind, CollisionMode, ConditionSpec, InputPhase, ParamBinding, RuleSpec, Selector,
    COLLIDER_A, COLLIDER_B, LOGICAL_SUBJECT,
};
use crate::stage_compiler::syntax::{Expr, ExprKind};

use super::{DeclCall, ProjectAssembler};

impl<'a> ProjectAssembler<'a> {
    pub(super) fn add_rule(&mut self, condition: &Expr, action: &str, span: Span) -> Result<(), CompilerError> {
        let mut condition = self.parse_condition(condition)?;
        let description = match self.ir.actions.get(action) {
            Some(compiled) => compiled.description.clone(),
            None if self.ir.predicates.contains_key(action) || self.ir.callables.contains_key(action) => {
                return Err(CompilerError::BindingError(
                    format!("'{}' is not an action and cannot be bound to a rule", action),
                    span,
                ))
            }
            None => return Err(CompilerError::UndefinedSymbol(action.to_string(), span)),
        };

        if condition.is_collision() {
            if self.other_actions.contains(action) {
                return Err(mixed_binding(action, span));
            }
            if let ConditionSpec::Collision { a, b, .. } = &condition {
                self.rebind_collision(action, a, b, span)?;
            }
            self.collision_actions.insert(action.to_string());
        } else {
            if self.collision_actions.contains(action) {
                return Err(mixed_binding(action, span));
            }
            self.other_actions.insert(action.to_string());
        }

        match &mut condition {
            ConditionSpec::Logical { predicate, target } => {
                let (predicate, target) = (predicate.clone(), target.clone());
                self.rebind_subject(&predicate, &target, span)?;
            }
            ConditionSpec::Tool {
                name,
                description: tool_description,
                ..
            } => {
                match self.tools.get(name.as_str()) {
                    Some(bound) if bound != action => {
                        return Err(CompilerError::ValidationError(
                            format!("tool '{}' is already bound to action '{}'", name, bound),
                            span,
                        ))
                    }
                    _ => {
                        self.tools.insert(name.clone(), action.to_string());
                    }
                }
                if tool_description.is_none() {
                    *tool_description = description;
                }
                if tool_description.is_none() {
                    self.diagnostics.warn(
                        format!(
                            "tool '{}' has no description; give OnToolCall a description or '{}' a docstring, otherwise it is exposed without one",
                            name, action
                        ),
                        span,
                    );
                }
            }
            _ => {}
        }

        log::debug!("ASSEMBLE: rule {:?} -> {}", condition, action);
        self.project.rules.push(RuleSpec {
            condition,
            action: action.to_string(),
            span,
        });
        Ok(())
    }

    fn parse_condition(&self, expr: &Expr) -> Result<ConditionSpec, CompilerError> {
        let resolved = self.resolve(expr);
        let (func, args, keywords) = match &resolved.kind {
            ExprKind::Call { func, args, keywords } => (func.as_ref(), args.as_slice(), keywords.as_slice()),
            _ => return Err(unknown_condition(expr)),
        };
        let call = |name: &'static str| DeclCall {
            name,
            args,
            keywords,
            span: resolved.span,
        };

        match &func.kind {
            ExprKind::Attribute { value, attr } => {
                let family = value.as_name().unwrap_or("");
                let (press, verb) = match family {
                    "KeyboardCondition" => ("key", "press"),
                    "ButtonCondition" => ("button", "press"),
                    "MouseCondition" => ("button", "click"),
                    _ => return Err(unknown_condition(expr)),
                };
                let phase = match attr.strip_suffix(verb).and_then(|p| p.strip_suffix('_')) {
                    Some("begin") => InputPhase::Begin,
                    Some("on") => InputPhase::On,
                    Some("end") => InputPhase::End,
                    _ => {
                        return Err(CompilerError::UndefinedSymbol(
                            format!("{}.{}", family, attr),
                            func.span,
                        ))
                    }
                };
                let call = call(press);
                call.expect_args(2, &[press, "role"])?;
                let input = self.static_str(call.required(0, press)?, press)?;
                let role = parse_role_ref(self.resolve(call.required(1, "role")?), &self.schemas)?;
                Ok(match family {
                    "KeyboardCondition" => ConditionSpec::Keyboard {
                        key: input,
                        phase,
                        role,
                    },
                    "ButtonCondition" => ConditionSpec::Button {
                        button: input,
                        phase,
                        role,
                    },
                    _ => ConditionSpec::Mouse {
                        button: input,
                        phase,
                        role,
                    },
                })
            }
            ExprKind::Name(name) if name == "OnOverlap" || name == "OnContact" => {
                let call = call(if name == "OnOverlap" { "OnOverlap" } else { "OnContact" });
                call.expect_args(2, &["a", "b"])?;
                let a = parse_actor_ref(self.resolve(call.required(0, "a")?), &self.schemas)?;
                let b = parse_actor_ref(self.resolve(call.required(1, "b")?), &self.schemas)?;
                let mode = if name == "OnOverlap" {
                    CollisionMode::Overlap
                } else {
                    CollisionMode::Contact
                };
                Ok(ConditionSpec::Collision { a, b, mode })
            }
            ExprKind::Name(name) if name == "OnLogicalCondition" => {
                let call = call("OnLogicalCondition");
                call.expect_args(2, &["predicate", "target"])?;
                let predicate_expr = call.required(0, "predicate")?;
                let predicate = self.function_name(predicate_expr)?;
                if !self.ir.predicates.contains_key(&predicate) {
                    return Err(if self.ir.actions.contains_key(&predicate) || self.ir.callables.contains_key(&predicate) {
                        CompilerError::BindingError(
                            format!("'{}' is not a @predicate", predicate),
                            predicate_expr.span,
                        )
                    } else {
                        CompilerError::UndefinedSymbol(predicate, predicate_expr.span)
                    });
                }
                let target = parse_actor_ref(self.resolve(call.required(1, "target")?), &self.schemas)?;
                Ok(ConditionSpec::Logical { predicate, target })
            }
            ExprKind::Name(name) if name == "OnToolCall" => {
                let call = call("OnToolCall");
                call.expect_args(3, &["name", "description", "role"])?;
                let tool = self.static_str(call.required(0, "name")?, "tool name")?;
                // OnToolCall(name, role) or OnToolCall(name, description, role)
                let (description, role) = match (args.len(), call.keyword("role")) {
                    (3, _) => (Some(&args[1]), Some(&args[2])),
                    (2, Some(role)) => (Some(&args[1]), Some(role)),
                    (2, None) => (call.keyword("description"), Some(&args[1])),
                    (_, role) => (call.keyword("description"), role),
                };
                let role = role.ok_or_else(|| {
                    CompilerError::ValidationError(
                        format!("tool '{}' needs a role", tool),
                        resolved.span,
                    )
                })?;
                let description = match description {
                    Some(text) => Some(self.static_str(text, "tool description")?),
                    None => None,
                };
                Ok(ConditionSpec::Tool {
                    name: tool,
                    description,
                    role: parse_role_ref(self.resolve(role), &self.schemas)?,
                })
            }
            _ => Err(unknown_condition(expr)),
        }
    }

    /// The action's first two parameters become the two colliding actors.
    fn rebind_collision(&mut self, action: &str, a: &ActorRef, b: &ActorRef, span: Span) -> Result<(), CompilerError> {
        let params = match self.ir.actions.get_mut(action) {
            Some(compiled) => &mut compiled.params,
            None => return Err(CompilerError::UndefinedSymbol(action.to_string(), span)),
        };
        if params.len() < 2 {
            return Err(CompilerError::BindingError(
                format!("collision action '{}' needs two actor parameters", action),
                span,
            ));
        }
        let ignored_a = rebind(&mut params[0], a, COLLIDER_A, action)?;
        let ignored_b = rebind(&mut params[1], b, COLLIDER_B, action)?;
        if ignored_a || ignored_b {
            self.warn_ignored_selector(action, "collision", span);
        }
        Ok(())
    }

    /// A logical condition's predicate evaluates its first parameter as the subject.
    fn rebind_subject(&mut self, predicate: &str, target: &ActorRef, span: Span) -> Result<(), CompilerError> {
        let params = match self.ir.predicates.get_mut(predicate) {
            Some(compiled) => &mut compiled.params,
            None => return Err(CompilerError::UndefinedSymbol(predicate.to_string(), span)),
        };
        let first = params.first_mut().ok_or_else(|| {
            CompilerError::BindingError(
                format!("predicate '{}' needs an actor parameter for its subject", predicate),
                span,
            )
        })?;
        if rebind(first, target, LOGICAL_SUBJECT, predicate)? {
            self.warn_ignored_selector(predicate, "logical condition", span);
        }
        Ok(())
    }

    fn warn_ignored_selector(&mut self, function: &str, rule: &str, span: Span) {
        if self.selector_warnings.insert(function.to_string()) {
            self.diagnostics.warn(
                format!(
                    "selectors on the parameters of '{}' are overridden; the {} rule supplies the actors",
                    function, rule
                ),
                span,
            );
        }
    }
}

/// Point `param` at a reserved identifier; returns whether an explicit selector was overridden.
fn rebind(param: &mut ParamBinding, reference: &ActorRef, reserved: &str, function: &str) -> Result<bool, CompilerError> {
    if param.kind != BindingKind::Actor {
        return Err(CompilerError::BindingError(
            format!(
                "parameter '{}' of '{}' must be an actor binding to receive a colliding or tested actor",
                param.name, function
            ),
            param.span,
        ));
    }
    if let (Some(expected), Some(declared)) = (&reference.schema, &param.schema) {
        if expected != declared {
            return Err(CompilerError::TypeMismatch(
                format!("{} for parameter '{}' of '{}'", expected, param.name, function),
                declared.clone(),
                param.span,
            ));
        }
    }
    let overridden = param.explicit_selector
        && param.selector != Some(Selector::Ident(reserved.to_string()));
    param.selector = Some(Selector::Ident(reserved.to_string()));
    param.explicit_selector = false;
    log::trace!("ASSEMBLE: {}.{} -> {}", function, param.name, reserved);
    Ok(overridden)
}

fn mixed_binding(action: &str, span: Span) -> CompilerError {
    CompilerError::ValidationError(
        format!(
            "action '{}' cannot be bound to both collision and non-collision rules",
            action
        ),
        span,
    )
}

fn unknown_condition(expr: &Expr) -> CompilerError {
    CompilerError::BindingError(
        format!(
            "{} is not a condition; expected KeyboardCondition, MouseCondition, ButtonCondition, OnOverlap, OnContact, OnLogicalCondition or OnToolCall",
            expr.describe()
        ),
        expr.span,
    )
}
