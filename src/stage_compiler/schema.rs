// Schema and Type Model
//
// Field type grammar plus the actor/role schema registry for one compilation.

use crate::stage_compiler::error::{CompilerError, Span};
use crate::stage_compiler::syntax::{docstring, ClassDef, Expr, ExprKind, StmtKind};
use crate::stage_compiler::value::{eval_static, Env, Value};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Int,
    Float,
    Str,
    Bool,
    List(Box<TypeExpr>),
    /// Keys are always `str`.
    Dict(Box<TypeExpr>),
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypeExpr::Int => write!(f, "int"),
            TypeExpr::Float => write!(f, "float"),
            TypeExpr::Str => write!(f, "str"),
            TypeExpr::Bool => write!(f, "bool"),
            TypeExpr::List(inner) => write!(f, "List[{}]", inner),
            TypeExpr::Dict(inner) => write!(f, "Dict[str, {}]", inner),
        }
    }
}

impl Serialize for TypeExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl TypeExpr {
    pub fn from_name(name: &str) -> Option<TypeExpr> {
        match name {
            "int" => Some(TypeExpr::Int),
            "float" => Some(TypeExpr::Float),
            "str" => Some(TypeExpr::Str),
            "bool" => Some(TypeExpr::Bool),
            _ => None,
        }
    }

    /// Parse a type annotation: `int`, `List[T]`, `Dict[str, T]`.
    pub fn parse(expr: &Expr) -> Result<TypeExpr, CompilerError> {
        let unsupported = || {
            CompilerError::TypeMismatch(
                "int, float, str, bool, List[T] or Dict[str, T]".to_string(),
                expr.describe(),
                expr.span,
            )
        };
        match &expr.kind {
            ExprKind::Name(name) => TypeExpr::from_name(name).ok_or_else(unsupported),
            ExprKind::Subscript { value, index } => match value.as_name() {
                Some("List") | Some("list") => {
                    Ok(TypeExpr::List(Box::new(TypeExpr::parse(index)?)))
                }
                Some("Dict") | Some("dict") => match &index.kind {
                    ExprKind::Tuple(items) if items.len() == 2 => {
                        if items[0].as_name() != Some("str") {
                            return Err(CompilerError::TypeMismatch(
                                "str dictionary keys".to_string(),
                                items[0].describe(),
                                items[0].span,
                            ));
                        }
                        Ok(TypeExpr::Dict(Box::new(TypeExpr::parse(&items[1])?)))
                    }
                    _ => Err(unsupported()),
                },
                _ => Err(unsupported()),
            },
            _ => Err(unsupported()),
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeExpr::Int | TypeExpr::Float | TypeExpr::Str | TypeExpr::Bool
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeExpr::Int | TypeExpr::Float)
    }

    pub fn default_value(&self) -> Value {
        match self {
            TypeExpr::Int => Value::Int(0),
            TypeExpr::Float => Value::Float(0.0),
            TypeExpr::Str => Value::Str(String::new()),
            TypeExpr::Bool => Value::Bool(false),
            TypeExpr::List(_) => Value::List(Vec::new()),
            TypeExpr::Dict(_) => Value::Dict(IndexMap::new()),
        }
    }

    /// The value converted to this type, if it conforms (ints widen to floats).
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (TypeExpr::Int, Value::Int(_))
            | (TypeExpr::Float, Value::Float(_))
            | (TypeExpr::Str, Value::Str(_))
            | (TypeExpr::Bool, Value::Bool(_)) => Some(value.clone()),
            (TypeExpr::Float, Value::Int(i)) => Some(Value::Float(*i as f64)),
            (TypeExpr::List(inner), Value::List(items)) => items
                .iter()
                .map(|item| inner.coerce(item))
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            (TypeExpr::Dict(inner), Value::Dict(entries)) => {
                let mut out = IndexMap::new();
                for (key, item) in entries {
                    out.insert(key.clone(), inner.coerce(item)?);
                }
                Some(Value::Dict(out))
            }
            _ => None,
        }
    }

    /// Type of a literal value, when one can be inferred.
    pub fn infer(value: &Value) -> Option<TypeExpr> {
        match value {
            Value::Int(_) => Some(TypeExpr::Int),
            Value::Float(_) => Some(TypeExpr::Float),
            Value::Str(_) => Some(TypeExpr::Str),
            Value::Bool(_) => Some(TypeExpr::Bool),
            Value::List(items) => {
                let mut element: Option<TypeExpr> = None;
                for item in items {
                    let ty = TypeExpr::infer(item)?;
                    element = Some(match element {
                        None => ty,
                        Some(TypeExpr::Int) if ty == TypeExpr::Float => TypeExpr::Float,
                        Some(TypeExpr::Float) if ty == TypeExpr::Int => TypeExpr::Float,
                        Some(prev) if prev == ty => prev,
                        Some(_) => return None,
                    });
                }
                element.map(|e| TypeExpr::List(Box::new(e)))
            }
            Value::Dict(entries) => {
                let mut element: Option<TypeExpr> = None;
                for item in entries.values() {
                    let ty = TypeExpr::infer(item)?;
                    match &element {
                        Some(prev) if *prev != ty => return None,
                        _ => element = Some(ty),
                    }
                }
                element.map(|e| TypeExpr::Dict(Box::new(e)))
            }
            Value::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    Actor,
    Role,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub ty: TypeExpr,
    pub default: Value,
    /// Client-local role field; never supplied at declaration time.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub local: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub base: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    pub name: String,
    pub kind: SchemaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldSpec>,
    #[serde(skip)]
    pub span: Span,
}

lazy_static! {
    /// Fields every actor carries, in declaration order.
    pub static ref ACTOR_BASE_FIELDS: Vec<(&'static str, TypeExpr, Value)> = vec![
        ("uid", TypeExpr::Str, Value::Str(String::new())),
        ("x", TypeExpr::Float, Value::Float(0.0)),
        ("y", TypeExpr::Float, Value::Float(0.0)),
        ("width", TypeExpr::Float, Value::Float(32.0)),
        ("height", TypeExpr::Float, Value::Float(32.0)),
        ("depth", TypeExpr::Int, Value::Int(0)),
        ("active", TypeExpr::Bool, Value::Bool(true)),
        ("mask", TypeExpr::Int, Value::Int(1)),
        ("parent", TypeExpr::Str, Value::Str(String::new())),
        ("clip", TypeExpr::Str, Value::Str(String::new())),
    ];
}

pub fn is_actor_base_field(name: &str) -> bool {
    ACTOR_BASE_FIELDS.iter().any(|(field, _, _)| *field == name)
}

impl Schema {
    /// Build a schema from `class Name(Actor|Role): field: T = default`.
    pub fn from_class(class: &ClassDef, span: Span, env: &Env) -> Result<Schema, CompilerError> {
        let kind = match class.bases.as_slice() {
            [base] if base.as_name() == Some("Actor") => SchemaKind::Actor,
            [base] if base.as_name() == Some("Role") => SchemaKind::Role,
            _ => {
                return Err(CompilerError::UnsupportedSyntax(
                    format!(
                        "class '{}' must derive from exactly one of Actor or Role",
                        class.name
                    ),
                    span,
                ))
            }
        };
        if let Some(decorator) = class.decorators.first() {
            return Err(CompilerError::UnsupportedSyntax(
                "schema classes take no decorators".to_string(),
                decorator.span,
            ));
        }

        let mut fields = IndexMap::new();
        if kind == SchemaKind::Actor {
            for (name, ty, default) in ACTOR_BASE_FIELDS.iter() {
                fields.insert(
                    name.to_string(),
                    FieldSpec {
                        ty: ty.clone(),
                        default: default.clone(),
                        local: false,
                        base: true,
                    },
                );
            }
        }

        let description = docstring(&class.body).map(|s| s.trim().to_string());
        for (i, stmt) in class.body.iter().enumerate() {
            let (target, annotation, value) = match &stmt.kind {
                StmtKind::Pass => continue,
                StmtKind::Expr(_) if i == 0 && description.is_some() => continue,
                StmtKind::AnnAssign {
                    target,
                    annotation,
                    value,
                } => (target, annotation, value),
                _ => {
                    return Err(CompilerError::UnsupportedSyntax(
                        format!(
                            "schema '{}' may only contain annotated fields",
                            class.name
                        ),
                        stmt.span,
                    ))
                }
            };
            let field_name = target.as_name().ok_or_else(|| {
                CompilerError::SyntaxError("field name must be a plain identifier".to_string(), target.span)
            })?;
            if fields.contains_key(field_name) {
                let what = if is_actor_base_field(field_name) && kind == SchemaKind::Actor {
                    format!("{} (built-in actor field)", field_name)
                } else {
                    field_name.to_string()
                };
                return Err(CompilerError::DuplicateSymbol(what, target.span));
            }

            let (ty, local) = match &annotation.kind {
                ExprKind::Subscript { value, index } if value.as_name() == Some("Local") => {
                    if kind != SchemaKind::Role {
                        return Err(CompilerError::BindingError(
                            "Local[...] fields are only allowed on Role schemas".to_string(),
                            annotation.span,
                        ));
                    }
                    (TypeExpr::parse(index)?, true)
                }
                _ => (TypeExpr::parse(annotation)?, false),
            };

            let default = match value {
                Some(expr) => {
                    let literal = eval_static(expr, env)
                        .map_err(|reason| CompilerError::ExpansionError(reason, expr.span))?;
                    ty.coerce(&literal).ok_or_else(|| {
                        CompilerError::TypeMismatch(
                            ty.to_string(),
                            literal.type_name().to_string(),
                            expr.span,
                        )
                    })?
                }
                None => ty.default_value(),
            };

            fields.insert(
                field_name.to_string(),
                FieldSpec {
                    ty,
                    default,
                    local,
                    base: false,
                },
            );
        }

        log::debug!(
            "SCHEMA: {:?} '{}' with {} field(s)",
            kind,
            class.name,
            fields.len()
        );

        Ok(Schema {
            name: class.name.clone(),
            kind,
            description,
            fields,
            span,
        })
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }
}

/// Every schema declared in one compilation, per category.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    actors: IndexMap<String, Schema>,
    roles: IndexMap<String, Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: Schema) -> Result<(), CompilerError> {
        if self.actors.contains_key(&schema.name) || self.roles.contains_key(&schema.name) {
            return Err(CompilerError::DuplicateSymbol(schema.name.clone(), schema.span));
        }
        match schema.kind {
            SchemaKind::Actor => self.actors.insert(schema.name.clone(), schema),
            SchemaKind::Role => self.roles.insert(schema.name.clone(), schema),
        };
        Ok(())
    }

    pub fn actor(&self, name: &str) -> Option<&Schema> {
        self.actors.get(name)
    }

    pub fn role(&self, name: &str) -> Option<&Schema> {
        self.roles.get(name)
    }

    pub fn is_actor(&self, name: &str) -> bool {
        self.actors.contains_key(name)
    }

    pub fn is_role(&self, name: &str) -> bool {
        self.roles.contains_key(name)
    }

    pub fn actors(&self) -> &IndexMap<String, Schema> {
        &self.actors
    }

    pub fn roles(&self) -> &IndexMap<String, Schema> {
        &self.roles
    }

    /// Type of `schema.field`, searching both categories.
    pub fn field_type(&self, schema: &str, field: &str) -> Option<&TypeExpr> {
        self.actor(schema)
            .or_else(|| self.role(schema))
            .and_then(|s| s.field(field))
            .map(|f| &f.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage_compiler::parser::parse_source;
    use test_log::test;

    fn class_schema(src: &str) -> Result<Schema, CompilerError> {
        let module = parse_source(src).unwrap();
        match &module.body[0].kind {
            StmtKind::ClassDef(class) => Schema::from_class(class, module.body[0].span, &Env::new()),
            other => panic!("Expected class, got {:?}", other),
        }
    }

    #[test]
    fn test_actor_schema_has_base_fields_first() {
        let schema =
            class_schema("class Player(Actor):\n    \"\"\"The hero.\"\"\"\n    hp: int = 3\n    speed: float = 2\n")
                .unwrap();
        assert_eq!(schema.kind, SchemaKind::Actor);
        assert_eq!(schema.description.as_deref(), Some("The hero."));
        let names: Vec<&str> = schema.fields.keys().map(|k| k.as_str()).collect();
        assert_eq!(names[0], "uid");
        assert_eq!(&names[names.len() - 2..], &["hp", "speed"]);
        // ints widen into float fields
        assert_eq!(schema.field("speed").unwrap().default, Value::Float(2.0));
    }

    #[test]
    fn test_role_local_fields() {
        let schema = class_schema("class Pilot(Role):\n    score: int\n    zoom: Local[float] = 1.5\n").unwrap();
        assert!(!schema.field("score").unwrap().local);
        assert!(schema.field("zoom").unwrap().local);
        assert!(schema.field("uid").is_none());
    }

    #[test]
    fn test_local_rejected_on_actor() {
        assert!(matches!(
            class_schema("class A(Actor):\n    z: Local[int]\n"),
            Err(CompilerError::BindingError(_, _))
        ));
    }

    #[test]
    fn test_base_field_redeclared() {
        assert!(matches!(
            class_schema("class A(Actor):\n    x: int\n"),
            Err(CompilerError::DuplicateSymbol(_, _))
        ));
    }

    #[test]
    fn test_default_type_mismatch() {
        assert!(matches!(
            class_schema("class A(Actor):\n    name: str = 4\n"),
            Err(CompilerError::TypeMismatch(_, _, _))
        ));
    }

    #[test]
    fn test_type_grammar() {
        let module = parse_source("x: Dict[str, List[int]]\n").unwrap();
        match &module.body[0].kind {
            StmtKind::AnnAssign { annotation, .. } => {
                let ty = TypeExpr::parse(annotation).unwrap();
                assert_eq!(ty.to_string(), "Dict[str, List[int]]");
            }
            other => panic!("Expected annotation, got {:?}", other),
        }
        let module = parse_source("x: Dict[int, int]\n").unwrap();
        match &module.body[0].kind {
            StmtKind::AnnAssign { annotation, .. } => assert!(TypeExpr::parse(annotation).is_err()),
            other => panic!("Expected annotation, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_rejects_duplicates_across_categories() {
        let mut registry = SchemaRegistry::new();
        registry.register(class_schema("class Hero(Actor):\n    pass\n").unwrap()).unwrap();
        let err = registry
            .register(class_schema("class Hero(Role):\n    pass\n").unwrap())
            .unwrap_err();
        assert!(matches!(err, CompilerError::DuplicateSymbol(_, _)));
        assert_eq!(registry.field_type("Hero", "x"), Some(&TypeExpr::Float));
    }
}
