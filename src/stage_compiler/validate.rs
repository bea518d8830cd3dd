// Project Validation and Pruning
//
// Whole-project cross checks that need every registration in place, followed
// by removal of functions no rule can reach.

use crate::stage_compiler::error::{CompilerError, Diagnostics, Span};
use crate::stage_compiler::ir::{
    contains_op, helper_calls, BindingKind, CallOp, ConditionSpec, IrDocument, IrExpr, IrStmt,
    ParamBinding,
};
use crate::stage_compiler::project::{LoopMode, ProjectSpec};
use crate::stage_compiler::value::Value;
use std::collections::HashSet;

/// Every parameter of every compiled function, tagged with its function name.
fn all_params(ir: &IrDocument) -> impl Iterator<Item = (&str, &ParamBinding)> {
    let actions = ir
        .actions
        .values()
        .flat_map(|f| f.params.iter().map(move |p| (f.name.as_str(), p)));
    let predicates = ir
        .predicates
        .values()
        .chain(ir.callables.values())
        .flat_map(|f| f.params.iter().map(move |p| (f.name.as_str(), p)));
    actions.chain(predicates)
}

fn undeclared_role(role: &str, context: &str, span: Span) -> CompilerError {
    CompilerError::ValidationError(
        format!("role '{}' used by {} is not declared; add it with add_role", role, context),
        span,
    )
}

pub fn validate(project: &ProjectSpec, ir: &IrDocument, diagnostics: &mut Diagnostics) -> Result<(), CompilerError> {
    validate_roles(project, ir)?;
    validate_bindings(project, ir)?;

    for actor in &project.actors {
        if let Some(Value::Str(parent)) = actor.fields.get("parent") {
            if !parent.is_empty() && project.actor(parent).is_none() {
                return Err(CompilerError::UndefinedSymbol(
                    format!("parent actor '{}' of '{}'", parent, actor.uid),
                    actor.span,
                ));
            }
        }
    }

    let shared_camera = project.cameras.values().any(|c| c.role.is_none());
    for (id, role) in project.human_roles() {
        let has_camera = project.cameras.values().any(|c| c.role.as_deref() == Some(id.as_str()));
        if !has_camera && !shared_camera {
            diagnostics.warn(
                format!("human role '{}' has no camera; its view will not follow anything", id),
                role.span,
            );
        }
    }

    // only actions that survive pruning can advance the turn
    let bound: HashSet<&str> = project.rules.iter().map(|r| r.action.as_str()).collect();
    if let Some(multiplayer) = &project.multiplayer {
        if multiplayer.default_loop == LoopMode::Turn
            && !ir
                .actions
                .values()
                .any(|a| bound.contains(a.name.as_str()) && contains_op(&a.body, CallOp::NextTurn))
        {
            return Err(CompilerError::ValidationError(
                "the turn-based loop needs an action that calls scene.next_turn(); none does, so play would never advance"
                    .to_string(),
                multiplayer.span,
            ));
        }
    }

    log::debug!("ASSEMBLE: validation passed");
    Ok(())
}

fn validate_roles(project: &ProjectSpec, ir: &IrDocument) -> Result<(), CompilerError> {
    let declared = |role: &str| project.roles.contains_key(role);

    for rule in &project.rules {
        if let Some(role) = rule.condition.role() {
            if !declared(role) {
                return Err(undeclared_role(role, &format!("the rule for '{}'", rule.action), rule.span));
            }
        }
    }
    for role in project.interface.roles.keys() {
        if !declared(role) {
            let span = project.interface.role_spans.get(role).copied().unwrap_or_default();
            return Err(undeclared_role(role, "set_interface", span));
        }
    }
    for (name, camera) in &project.cameras {
        if let Some(role) = &camera.role {
            if !declared(role) {
                return Err(undeclared_role(role, &format!("camera '{}'", name), camera.span));
            }
        }
    }
    if let Some(multiplayer) = &project.multiplayer {
        for role in &multiplayer.turn_order {
            if !declared(role) {
                return Err(undeclared_role(role, "the turn order", multiplayer.span));
            }
        }
    }

    for (function, param) in all_params(ir) {
        if param.kind == BindingKind::Role {
            if let Some(role) = param.ident() {
                if !declared(role) {
                    return Err(undeclared_role(
                        role,
                        &format!("parameter '{}' of '{}'", param.name, function),
                        param.span,
                    ));
                }
            }
        }
    }

    for action in ir.actions.values() {
        let mut missing = None;
        IrStmt::walk(&action.body, &mut |stmt| {
            if let IrStmt::Call {
                op: CallOp::SetInterface,
                args,
            } = stmt
            {
                if let Some(IrExpr::Const {
                    value: Value::Str(role),
                }) = args.get(1)
                {
                    if missing.is_none() && !declared(role) {
                        missing = Some(role.clone());
                    }
                }
            }
        });
        if let Some(role) = missing {
            return Err(undeclared_role(
                &role,
                &format!("set_interface in '{}'", action.name),
                action.span,
            ));
        }
    }
    Ok(())
}

fn validate_bindings(project: &ProjectSpec, ir: &IrDocument) -> Result<(), CompilerError> {
    for (function, param) in all_params(ir) {
        match param.kind {
            BindingKind::Camera => {
                if let Some(name) = param.ident() {
                    if !project.cameras.contains_key(name) {
                        return Err(CompilerError::UndefinedSymbol(
                            format!("camera '{}' bound by '{}'", name, function),
                            param.span,
                        ));
                    }
                }
            }
            BindingKind::Global => {
                let name = param.ident().unwrap_or(param.name.as_str());
                let global = project.globals.get(name).ok_or_else(|| {
                    CompilerError::UndefinedSymbol(
                        format!("global '{}' bound by '{}'", name, function),
                        param.span,
                    )
                })?;
                if let Some(ty) = &param.value_type {
                    if ty.coerce(&global.value).is_none() {
                        return Err(CompilerError::TypeMismatch(
                            format!("{} for global '{}'", ty, name),
                            global.value.type_name().to_string(),
                            param.span,
                        ));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Drop actions, predicates and helpers that no rule can reach.
pub fn prune(project: &mut ProjectSpec, ir: &mut IrDocument, diagnostics: &mut Diagnostics) {
    let bound: HashSet<&str> = project.rules.iter().map(|r| r.action.as_str()).collect();
    let tested: HashSet<&str> = project
        .rules
        .iter()
        .filter_map(|r| match &r.condition {
            ConditionSpec::Logical { predicate, .. } => Some(predicate.as_str()),
            _ => None,
        })
        .collect();

    for action in ir.actions.values().filter(|a| !bound.contains(a.name.as_str())) {
        diagnostics.warn(
            format!("action '{}' is not bound to any rule and is ignored", action.name),
            action.span,
        );
    }
    for predicate in ir.predicates.values().filter(|p| !tested.contains(p.name.as_str())) {
        diagnostics.warn(
            format!(
                "predicate '{}' is not used by any OnLogicalCondition and is ignored",
                predicate.name
            ),
            predicate.span,
        );
    }
    ir.actions.retain(|name, _| bound.contains(name.as_str()));
    ir.predicates.retain(|name, _| tested.contains(name.as_str()));

    // Helpers reachable from what is left, following helper-to-helper calls.
    let mut pending: Vec<String> = Vec::new();
    for action in ir.actions.values() {
        pending.extend(helper_calls(&action.body, &[]));
    }
    for predicate in ir.predicates.values() {
        pending.extend(helper_calls(&predicate.body, &[&predicate.result]));
    }
    let mut reachable: HashSet<String> = HashSet::new();
    while let Some(name) = pending.pop() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        if let Some(callable) = ir.callables.get(&name) {
            pending.extend(helper_calls(&callable.body, &[&callable.result]));
        }
    }
    for callable in ir.callables.values().filter(|c| !reachable.contains(&c.name)) {
        diagnostics.warn(
            format!(
                "helper '{}' is not reachable from any bound action or predicate and is ignored",
                callable.name
            ),
            callable.span,
        );
    }
    ir.callables.retain(|name, _| reachable.contains(name));

    project.actions = ir.actions.keys().cloned().collect();
    project.predicates = ir.predicates.keys().cloned().collect();
    project.callables = ir.callables.keys().cloned().collect();
    log::debug!(
        "ASSEMBLE: kept {} actions, {} predicates, {} helpers",
        project.actions.len(),
        project.predicates.len(),
        project.callables.len()
    );
}
