// Parameter Binding Resolution
//
// Classifies function parameter annotations into binding kinds, and parses the
// actor/role references that appear in conditions.

use crate::stage_compiler::error::{CompilerError, Span};
use crate::stage_compiler::ir::{ActorRef, BindingKind, ParamBinding, Selector};
use crate::stage_compiler::schema::{SchemaRegistry, TypeExpr};
use crate::stage_compiler::syntax::{Expr, ExprKind, Param};

/// Classify one parameter. Precedence: Scene/Tick keywords, bare schema names,
/// `Global[...]`, actor selectors, role selectors, `Camera[...]`, actor lists.
pub fn classify_param(param: &Param, schemas: &SchemaRegistry) -> Result<ParamBinding, CompilerError> {
    let annotation = param.annotation.as_ref().ok_or_else(|| {
        CompilerError::BindingError(
            format!(
                "parameter '{}' needs an annotation such as Actor[\"id\"] or Global[\"name\"]",
                param.name
            ),
            param.span,
        )
    })?;
    let binding = classify_annotation(&param.name, annotation, schemas)?;
    log::trace!(
        "BIND: {} -> {:?} {:?}",
        param.name,
        binding.kind,
        binding.selector
    );
    Ok(binding)
}

fn classify_annotation(
    name: &str,
    annotation: &Expr,
    schemas: &SchemaRegistry,
) -> Result<ParamBinding, CompilerError> {
    let span = annotation.span;
    match &annotation.kind {
        ExprKind::Name(keyword) if keyword == "Scene" => {
            Ok(ParamBinding::new(name, BindingKind::Scene, span))
        }
        ExprKind::Name(keyword) if keyword == "Tick" => {
            Ok(ParamBinding::new(name, BindingKind::Tick, span))
        }
        // bare schema: the instance whose identifier is the type name
        ExprKind::Name(schema) if schemas.is_actor(schema) => {
            Ok(ParamBinding::new(name, BindingKind::Actor, span)
                .with_schema(Some(schema.clone()))
                .with_selector(Selector::Ident(schema.clone()), false))
        }
        ExprKind::Name(schema) if schemas.is_role(schema) => {
            Ok(ParamBinding::new(name, BindingKind::Role, span)
                .with_schema(Some(schema.clone()))
                .with_selector(Selector::Ident(schema.clone()), false))
        }
        ExprKind::Subscript { value, index } => {
            let head = value.as_name().ok_or_else(|| unsupported(name, annotation))?;
            match head {
                "Global" => classify_global(name, index, span),
                "Actor" => Ok(ParamBinding::new(name, BindingKind::Actor, span)
                    .with_selector(parse_selector(index)?, true)),
                schema if schemas.is_actor(schema) => {
                    Ok(ParamBinding::new(name, BindingKind::Actor, span)
                        .with_schema(Some(schema.to_string()))
                        .with_selector(parse_selector(index)?, true))
                }
                "Role" => Ok(ParamBinding::new(name, BindingKind::Role, span)
                    .with_selector(ident_selector(index, "Role")?, true)),
                schema if schemas.is_role(schema) => {
                    Ok(ParamBinding::new(name, BindingKind::Role, span)
                        .with_schema(Some(schema.to_string()))
                        .with_selector(ident_selector(index, schema)?, true))
                }
                "Camera" => Ok(ParamBinding::new(name, BindingKind::Camera, span)
                    .with_selector(ident_selector(index, "Camera")?, true)),
                "List" | "list" => match index.as_name() {
                    Some("Actor") => Ok(ParamBinding::new(name, BindingKind::ActorList, span)),
                    Some(schema) if schemas.is_actor(schema) => {
                        Ok(ParamBinding::new(name, BindingKind::ActorList, span)
                            .with_schema(Some(schema.to_string())))
                    }
                    _ => Err(CompilerError::BindingError(
                        format!(
                            "List parameter '{}' must hold actors, e.g. List[Actor] or List[<ActorSchema>]",
                            name
                        ),
                        index.span,
                    )),
                },
                _ => Err(unsupported(name, annotation)),
            }
        }
        _ => Err(unsupported(name, annotation)),
    }
}

fn unsupported(name: &str, annotation: &Expr) -> CompilerError {
    CompilerError::BindingError(
        format!(
            "cannot bind parameter '{}' from {}",
            name,
            annotation.describe()
        ),
        annotation.span,
    )
}

fn classify_global(name: &str, index: &Expr, span: Span) -> Result<ParamBinding, CompilerError> {
    let (key, declared) = match &index.kind {
        ExprKind::Str(key) => (key.clone(), None),
        ExprKind::Tuple(items) if items.len() == 2 => {
            let key = items[0].as_str().ok_or_else(|| {
                CompilerError::BindingError(
                    "Global name must be a string literal".to_string(),
                    items[0].span,
                )
            })?;
            let ty = TypeExpr::parse(&items[1])?;
            validate_global_type(&ty, items[1].span)?;
            (key.to_string(), Some(ty))
        }
        _ => {
            return Err(CompilerError::BindingError(
                "expected Global[\"name\"] or Global[\"name\", type]".to_string(),
                index.span,
            ))
        }
    };
    let mut binding = ParamBinding::new(name, BindingKind::Global, span)
        .with_selector(Selector::Ident(key), true);
    binding.value_type = declared;
    Ok(binding)
}

/// Globals hold primitives, lists of primitives or nested lists, and str-keyed dicts.
fn validate_global_type(ty: &TypeExpr, span: Span) -> Result<(), CompilerError> {
    fn list_element_ok(ty: &TypeExpr) -> bool {
        match ty {
            TypeExpr::List(inner) => list_element_ok(inner),
            other => other.is_primitive(),
        }
    }
    let ok = match ty {
        TypeExpr::List(inner) => list_element_ok(inner),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(CompilerError::TypeMismatch(
            "a primitive, List of primitives or nested lists, or Dict[str, ...]".to_string(),
            ty.to_string(),
            span,
        ))
    }
}

/// `0`, `-1` or `"uid"`.
pub fn parse_selector(index: &Expr) -> Result<Selector, CompilerError> {
    if let Some(i) = index.as_int() {
        return Ok(Selector::Index(i));
    }
    if let Some(id) = index.as_str() {
        return Ok(Selector::Ident(id.to_string()));
    }
    Err(CompilerError::BindingError(
        format!(
            "selector must be an integer index or a string identifier, found {}",
            index.describe()
        ),
        index.span,
    ))
}

fn ident_selector(index: &Expr, head: &str) -> Result<Selector, CompilerError> {
    match parse_selector(index)? {
        Selector::Index(_) => Err(CompilerError::BindingError(
            format!("{}[...] takes a string identifier, not an index", head),
            index.span,
        )),
        selector => Ok(selector),
    }
}

/// Actor reference in a condition: `Schema`, `Schema[sel]` or `Actor[sel]`.
pub fn parse_actor_ref(expr: &Expr, schemas: &SchemaRegistry) -> Result<ActorRef, CompilerError> {
    match &expr.kind {
        ExprKind::Name(schema) if schemas.is_actor(schema) => Ok(ActorRef {
            schema: Some(schema.clone()),
            selector: None,
        }),
        ExprKind::Name(name) if name == "Actor" => Ok(ActorRef {
            schema: None,
            selector: None,
        }),
        ExprKind::Subscript { value, index } => match value.as_name() {
            Some("Actor") => Ok(ActorRef {
                schema: None,
                selector: Some(parse_selector(index)?),
            }),
            Some(schema) if schemas.is_actor(schema) => Ok(ActorRef {
                schema: Some(schema.to_string()),
                selector: Some(parse_selector(index)?),
            }),
            _ => Err(CompilerError::UndefinedSymbol(
                value.dotted_path().unwrap_or_else(|| value.describe()),
                value.span,
            )),
        },
        ExprKind::Name(name) => Err(CompilerError::UndefinedSymbol(name.clone(), expr.span)),
        _ => Err(CompilerError::BindingError(
            format!("expected an actor selector, found {}", expr.describe()),
            expr.span,
        )),
    }
}

/// Role reference: `Role["id"]`, `<RoleSchema>["id"]` or a plain id string.
pub fn parse_role_ref(expr: &Expr, schemas: &SchemaRegistry) -> Result<String, CompilerError> {
    if let Some(id) = expr.as_str() {
        return Ok(id.to_string());
    }
    if let ExprKind::Subscript { value, index } = &expr.kind {
        let head = value.as_name().unwrap_or("");
        if head == "Role" || schemas.is_role(head) {
            if let Selector::Ident(id) = ident_selector(index, head)? {
                return Ok(id);
            }
        }
    }
    Err(CompilerError::BindingError(
        format!(
            "expected a role such as Role[\"player_1\"], found {}",
            expr.describe()
        ),
        expr.span,
    ))
}

#[cfg(test)]
#[path = "binding_tests.rs"]
mod tests;
