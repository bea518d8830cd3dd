// Compile-time values
//
// Literal values known while the compiler walks setup code: macro arguments,
// expander environment entries, globals, and declaration keywords.

use crate::stage_compiler::error::Span;
use crate::stage_compiler::syntax::{BinaryOp, Expr, ExprKind, UnaryOp};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Dict(IndexMap<String, Value>),
}

pub type Env = IndexMap<String, Value>;

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Dict(entries) => !entries.is_empty(),
        }
    }

    /// Numeric view; bools count as numbers the way the host language treats them.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a pure literal expression (no names) into a value.
    pub fn from_literal(expr: &Expr) -> Option<Value> {
        eval_static(expr, &Env::new()).ok()
    }

    /// Literal syntax for this value, used when substituting into the tree.
    pub fn to_expr(&self, span: Span) -> Expr {
        let kind = match self {
            Value::None => ExprKind::None,
            Value::Bool(b) => ExprKind::Bool(*b),
            Value::Int(i) => match i.checked_neg() {
                Some(magnitude) if *i < 0 => ExprKind::Unary {
                    op: UnaryOp::Minus,
                    operand: Box::new(Expr::new(ExprKind::Int(magnitude), span)),
                },
                _ => ExprKind::Int(*i),
            },
            Value::Float(f) if *f < 0.0 => ExprKind::Unary {
                op: UnaryOp::Minus,
                operand: Box::new(Expr::new(ExprKind::Float(-f), span)),
            },
            Value::Float(f) => ExprKind::Float(*f),
            Value::Str(s) => ExprKind::Str(s.clone()),
            Value::List(items) => ExprKind::List(items.iter().map(|v| v.to_expr(span)).collect()),
            Value::Dict(entries) => ExprKind::Dict(
                entries
                    .iter()
                    .map(|(k, v)| (Expr::new(ExprKind::Str(k.clone()), span), v.to_expr(span)))
                    .collect(),
            ),
        };
        Expr::new(kind, span)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => {
                if x.fract() == 0.0 && x.is_finite() {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt_repr(f)?;
                }
                write!(f, "]")
            }
            Value::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}': ", key)?;
                    value.fmt_repr(f)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Value {
    fn fmt_repr(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "'{}'", s),
            other => write!(f, "{}", other),
        }
    }
}

/// Evaluate an expression against a literal environment.
///
/// The error string explains why the value is not statically known; callers decide
/// whether that is fatal.
pub fn eval_static(expr: &Expr, env: &Env) -> Result<Value, String> {
    match &expr.kind {
        ExprKind::None => Ok(Value::None),
        ExprKind::Bool(b) => Ok(Value::Bool(*b)),
        ExprKind::Int(i) => Ok(Value::Int(*i)),
        ExprKind::Float(f) => Ok(Value::Float(*f)),
        ExprKind::Str(s) => Ok(Value::Str(s.clone())),
        ExprKind::Name(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| format!("'{}' has no compile-time value", name)),
        ExprKind::List(items) | ExprKind::Tuple(items) => items
            .iter()
            .map(|item| eval_static(item, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        ExprKind::Dict(entries) => {
            let mut map = IndexMap::new();
            for (key, value) in entries {
                let key = match eval_static(key, env)? {
                    Value::Str(s) => s,
                    other => {
                        return Err(format!("dict keys must be strings, found {}", other.type_name()))
                    }
                };
                map.insert(key, eval_static(value, env)?);
            }
            Ok(Value::Dict(map))
        }
        ExprKind::Unary { op, operand } => {
            let value = eval_static(operand, env)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                UnaryOp::Plus => match value {
                    Value::Int(_) | Value::Float(_) => Ok(value),
                    other => Err(format!("bad operand for unary +: {}", other.type_name())),
                },
                UnaryOp::Minus => match value {
                    Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    other => Err(format!("bad operand for unary -: {}", other.type_name())),
                },
            }
        }
        ExprKind::Binary { left, op, right } => {
            let lhs = eval_static(left, env)?;
            // short-circuit like the host language
            match op {
                BinaryOp::And if !lhs.truthy() => return Ok(lhs),
                BinaryOp::Or if lhs.truthy() => return Ok(lhs),
                BinaryOp::And | BinaryOp::Or => return eval_static(right, env),
                _ => {}
            }
            let rhs = eval_static(right, env)?;
            binary_op(&lhs, *op, &rhs)
        }
        ExprKind::Subscript { value, index } => {
            let container = eval_static(value, env)?;
            let index = eval_static(index, env)?;
            subscript(&container, &index)
        }
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            let name = func
                .as_name()
                .ok_or_else(|| format!("{} is not statically evaluable", expr.describe()))?;
            if !keywords.is_empty() {
                return Err(format!("'{}' takes no keyword arguments here", name));
            }
            let args = args
                .iter()
                .map(|arg| eval_static(arg, env))
                .collect::<Result<Vec<_>, _>>()?;
            call_builtin(name, &args)
        }
        ExprKind::Attribute { .. } => Err(format!("{} is not statically evaluable", expr.describe())),
    }
}

pub fn binary_op(lhs: &Value, op: BinaryOp, rhs: &Value) -> Result<Value, String> {
    use Value::*;
    let mismatch = || {
        format!(
            "unsupported operand types for {}: {} and {}",
            op.symbol(),
            lhs.type_name(),
            rhs.type_name()
        )
    };
    match op {
        BinaryOp::Eq => return Ok(Bool(lhs == rhs)),
        BinaryOp::NotEq => return Ok(Bool(lhs != rhs)),
        BinaryOp::Lt | BinaryOp::LtE | BinaryOp::Gt | BinaryOp::GtE => {
            let ordering = match (lhs, rhs) {
                (Str(a), Str(b)) => a.partial_cmp(b),
                _ => match (lhs.as_number(), rhs.as_number()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => return Err(mismatch()),
                },
            };
            let ordering = ordering.ok_or_else(mismatch)?;
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtE => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            return Ok(Bool(result));
        }
        _ => {}
    }

    match (lhs, op, rhs) {
        (Str(a), BinaryOp::Add, Str(b)) => Ok(Str(format!("{}{}", a, b))),
        (List(a), BinaryOp::Add, List(b)) => Ok(List(a.iter().chain(b.iter()).cloned().collect())),
        (Str(s), BinaryOp::Mul, Int(n)) | (Int(n), BinaryOp::Mul, Str(s)) => {
            let count = repeat_count(s.len(), *n)?;
            Ok(Str(s.repeat(count)))
        }
        (List(items), BinaryOp::Mul, Int(n)) | (Int(n), BinaryOp::Mul, List(items)) => {
            repeat_count(items.len(), *n)?;
            let mut out = Vec::new();
            for _ in 0..(*n).max(0) {
                out.extend(items.iter().cloned());
            }
            Ok(List(out))
        }
        _ => {
            let both_int = matches!(
                (lhs, rhs),
                (Int(_) | Bool(_), Int(_) | Bool(_))
            );
            let (a, b) = match (lhs.as_number(), rhs.as_number()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(mismatch()),
            };
            if both_int {
                let (a, b) = (a as i64, b as i64);
                return match op {
                    BinaryOp::Add => a.checked_add(b).map(Int).ok_or_else(overflow),
                    BinaryOp::Sub => a.checked_sub(b).map(Int).ok_or_else(overflow),
                    BinaryOp::Mul => a.checked_mul(b).map(Int).ok_or_else(overflow),
                    BinaryOp::Div if b == 0 => Err("division by zero".to_string()),
                    BinaryOp::Div => Ok(Float(a as f64 / b as f64)),
                    BinaryOp::FloorDiv | BinaryOp::Mod if b == 0 => {
                        Err("integer division or modulo by zero".to_string())
                    }
                    BinaryOp::FloorDiv => floor_div(a, b).map(Int).ok_or_else(overflow),
                    BinaryOp::Mod => floor_mod(a, b).map(Int).ok_or_else(overflow),
                    BinaryOp::Pow if b >= 0 => u32::try_from(b)
                        .ok()
                        .and_then(|exp| a.checked_pow(exp))
                        .map(Int)
                        .ok_or_else(overflow),
                    BinaryOp::Pow => Ok(Float((a as f64).powf(b as f64))),
                    _ => Err(mismatch()),
                };
            }
            match op {
                BinaryOp::Add => Ok(Float(a + b)),
                BinaryOp::Sub => Ok(Float(a - b)),
                BinaryOp::Mul => Ok(Float(a * b)),
                BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => {
                    Err("float division by zero".to_string())
                }
                BinaryOp::Div => Ok(Float(a / b)),
                BinaryOp::FloorDiv => Ok(Float((a / b).floor())),
                BinaryOp::Mod => Ok(Float(a - b * (a / b).floor())),
                BinaryOp::Pow => Ok(Float(a.powf(b))),
                _ => Err(mismatch()),
            }
        }
    }
}

fn overflow() -> String {
    "integer overflow".to_string()
}

/// Longest string or list a compile-time expression may build.
pub const MAX_STATIC_LEN: usize = 1_000_000;

fn repeat_count(len: usize, n: i64) -> Result<usize, String> {
    let count = n.max(0) as u64;
    if (len as u64).saturating_mul(count) > MAX_STATIC_LEN as u64 {
        return Err(format!("repetition builds more than {} elements", MAX_STATIC_LEN));
    }
    Ok(count as usize)
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if index < 0 { len + index } else { index };
    if idx >= 0 && idx < len {
        Some(idx as usize)
    } else {
        None
    }
}

fn subscript(container: &Value, index: &Value) -> Result<Value, String> {
    match (container, index) {
        (Value::List(items), Value::Int(i)) => normalize_index(*i, items.len())
            .map(|i| items[i].clone())
            .ok_or_else(|| format!("list index {} out of range", i)),
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            normalize_index(*i, chars.len())
                .map(|i| Value::Str(chars[i].to_string()))
                .ok_or_else(|| format!("string index {} out of range", i))
        }
        (Value::Dict(entries), Value::Str(key)) => entries
            .get(key)
            .cloned()
            .ok_or_else(|| format!("key '{}' not found", key)),
        (c, i) => Err(format!(
            "cannot index {} with {}",
            c.type_name(),
            i.type_name()
        )),
    }
}

/// Evaluate `range(...)` arguments into the produced sequence, refusing ranges
/// longer than `limit` before building them.
pub fn range_values(args: &[Value], limit: usize) -> Result<Vec<i64>, String> {
    let ints = args
        .iter()
        .map(|a| a.as_int().ok_or_else(|| "range() arguments must be integers".to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err("range() takes 1 to 3 arguments".to_string()),
    };
    if step == 0 {
        return Err("range() step must not be zero".to_string());
    }
    let len = range_len(start, stop, step);
    if len > limit as u128 {
        return Err(format!(
            "range() produces {} values, more than the limit of {}",
            len, limit
        ));
    }
    let mut out = Vec::with_capacity(len as usize);
    let mut i = start;
    for _ in 0..len {
        out.push(i);
        i = match i.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(out)
}

/// Number of values `range(start, stop, step)` produces; `step` is non-zero.
pub fn range_len(start: i64, stop: i64, step: i64) -> u128 {
    let (start, stop, step) = (start as i128, stop as i128, step as i128);
    if step > 0 && start < stop {
        ((stop - start + step - 1) / step) as u128
    } else if step < 0 && start > stop {
        ((start - stop - step - 1) / -step) as u128
    } else {
        0
    }
}

fn call_builtin(name: &str, args: &[Value]) -> Result<Value, String> {
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(format!("{}() takes {} argument(s), {} given", name, n, args.len()))
        }
    };
    match name {
        "range" => Ok(Value::List(
            range_values(args, MAX_STATIC_LEN)?.into_iter().map(Value::Int).collect(),
        )),
        "len" => {
            arity(1)?;
            match &args[0] {
                Value::List(items) => Ok(Value::Int(items.len() as i64)),
                Value::Dict(entries) => Ok(Value::Int(entries.len() as i64)),
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                other => Err(format!("object of type {} has no len()", other.type_name())),
            }
        }
        "abs" => {
            arity(1)?;
            match &args[0] {
                Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(overflow),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(format!("bad operand for abs(): {}", other.type_name())),
            }
        }
        "min" | "max" => {
            let items: Vec<Value> = match args {
                [Value::List(items)] => items.clone(),
                _ => args.to_vec(),
            };
            let mut best: Option<Value> = None;
            for item in items {
                best = Some(match best {
                    None => item,
                    Some(current) => {
                        let op = if name == "min" { BinaryOp::Lt } else { BinaryOp::Gt };
                        if binary_op(&item, op, &current)?.truthy() {
                            item
                        } else {
                            current
                        }
                    }
                });
            }
            best.ok_or_else(|| format!("{}() arg is an empty sequence", name))
        }
        "int" => {
            arity(1)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Bool(b) => Ok(Value::Int(*b as i64)),
                Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
                Value::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| format!("invalid literal for int(): '{}'", s)),
                other => Err(format!("int() argument cannot be {}", other.type_name())),
            }
        }
        "float" => {
            arity(1)?;
            match &args[0] {
                Value::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| format!("could not convert string to float: '{}'", s)),
                other => other
                    .as_number()
                    .map(Value::Float)
                    .ok_or_else(|| format!("float() argument cannot be {}", other.type_name())),
            }
        }
        "str" => {
            arity(1)?;
            Ok(Value::Str(args[0].to_string()))
        }
        "bool" => {
            arity(1)?;
            Ok(Value::Bool(args[0].truthy()))
        }
        "list" => {
            arity(1)?;
            match &args[0] {
                Value::List(items) => Ok(Value::List(items.clone())),
                Value::Dict(entries) => Ok(Value::List(
                    entries.keys().map(|k| Value::Str(k.clone())).collect(),
                )),
                other => Err(format!("{} is not iterable", other.type_name())),
            }
        }
        _ => Err(format!("call to '{}' is not statically evaluable", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage_compiler::parser::parse_source;
    use crate::stage_compiler::syntax::StmtKind;
    use test_log::test;

    fn eval(src: &str, env: &Env) -> Result<Value, String> {
        let module = parse_source(src).unwrap();
        match &module.body[0].kind {
            StmtKind::Expr(expr) => eval_static(expr, env),
            other => panic!("Expected expression, got {:?}", other),
        }
    }

    #[test]
    fn test_arithmetic_follows_host_semantics() {
        let env = Env::new();
        assert_eq!(eval("7 // 2", &env), Ok(Value::Int(3)));
        assert_eq!(eval("-7 // 2", &env), Ok(Value::Int(-4)));
        assert_eq!(eval("-7 % 3", &env), Ok(Value::Int(2)));
        assert_eq!(eval("7 / 2", &env), Ok(Value::Float(3.5)));
        assert_eq!(eval("2 ** 10", &env), Ok(Value::Int(1024)));
        assert_eq!(eval("1 + 0.5", &env), Ok(Value::Float(1.5)));
        assert!(eval("1 // 0", &env).is_err());
    }

    #[test]
    fn test_names_and_collections() {
        let mut env = Env::new();
        env.insert("n".to_string(), Value::Int(3));
        env.insert(
            "colors".to_string(),
            Value::List(vec![Value::Str("red".into()), Value::Str("blue".into())]),
        );
        assert_eq!(eval("colors[-1]", &env), Ok(Value::Str("blue".into())));
        assert_eq!(eval("len(colors) + n", &env), Ok(Value::Int(5)));
        assert_eq!(eval("[0] * n", &env), Ok(Value::List(vec![Value::Int(0); 3])));
        assert!(eval("missing + 1", &env).is_err());
    }

    #[test]
    fn test_range_values() {
        assert_eq!(range_values(&[Value::Int(5)], 100), Ok(vec![0, 1, 2, 3, 4]));
        assert_eq!(
            range_values(&[Value::Int(10), Value::Int(0), Value::Int(-1)], 100),
            Ok((1..=10).rev().collect::<Vec<i64>>())
        );
        assert_eq!(range_values(&[Value::Int(0), Value::Int(7), Value::Int(3)], 100), Ok(vec![0, 3, 6]));
        assert!(range_values(&[Value::Int(1), Value::Int(2), Value::Int(0)], 100).is_err());
        assert!(range_values(&[Value::Int(101)], 100).is_err());
    }

    #[test]
    fn test_range_length_near_the_integer_limits() {
        assert_eq!(range_len(i64::MAX - 1, i64::MAX, 5), 1);
        assert_eq!(range_len(i64::MIN, i64::MAX, 1), u64::MAX as u128);
        assert_eq!(range_len(i64::MAX, i64::MIN, i64::MIN), 2);
        assert_eq!(
            range_values(&[Value::Int(i64::MAX - 1), Value::Int(i64::MAX), Value::Int(5)], 10),
            Ok(vec![i64::MAX - 1])
        );
        assert!(range_values(&[Value::Int(i64::MIN), Value::Int(i64::MAX)], 10).is_err());
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        let mut env = Env::new();
        env.insert("big".to_string(), Value::Int(i64::MAX));
        env.insert("least".to_string(), Value::Int(i64::MIN));
        assert_eq!(eval("big + 1", &env), Err("integer overflow".to_string()));
        assert_eq!(eval("abs(least)", &env), Err("integer overflow".to_string()));
        assert_eq!(eval("-least", &env), Err("integer overflow".to_string()));
        assert_eq!(eval("least // -1", &env), Err("integer overflow".to_string()));
        assert_eq!(eval("2 ** 4294967296", &env), Err("integer overflow".to_string()));
        assert_eq!(eval("2 ** 10", &env), Ok(Value::Int(1024)));
        assert_eq!(eval("7 % -3", &env), Ok(Value::Int(-2)));
        assert!(eval("\"ab\" * 100000000", &env).is_err());
        assert_eq!(Value::from_literal(&Value::Int(i64::MIN).to_expr(Span::unknown())), Some(Value::Int(i64::MIN)));
    }

    #[test]
    fn test_short_circuit() {
        // the right side is never evaluated, so the unknown name is fine
        assert_eq!(eval("False and unknown", &Env::new()), Ok(Value::Bool(false)));
        assert_eq!(eval("1 or unknown", &Env::new()), Ok(Value::Int(1)));
    }

    #[test]
    fn test_to_expr_round_trips_negative_numbers() {
        let expr = Value::Int(-2).to_expr(Span::unknown());
        assert_eq!(Value::from_literal(&expr), Some(Value::Int(-2)));
    }

    #[test]
    fn test_json_shape() {
        let mut map = IndexMap::new();
        map.insert("b".to_string(), Value::Int(1));
        map.insert("a".to_string(), Value::None);
        let json = serde_json::to_string(&Value::Dict(map)).unwrap();
        assert_eq!(json, r#"{"b":1,"a":null}"#);
    }
}
