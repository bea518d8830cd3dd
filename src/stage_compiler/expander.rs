// Static Setup Expander
//
// Partially evaluates top-level setup code. Compile-time `if`/`for`/`while` are
// unrolled against an environment of literal values; every other statement has its
// known names replaced by literals and then updates the environment when it can.

use crate::stage_compiler::config::CompilerConfig;
use crate::stage_compiler::error::{CompilerError, Span};
use crate::stage_compiler::syntax::*;
use crate::stage_compiler::value::{binary_op, eval_static, range_values, Env, Value};

/// Collection methods whose effect on a known value can be tracked.
pub(crate) const MUTATORS: &[&str] = &["append", "extend", "insert", "update", "pop", "clear"];

pub struct SetupExpander {
    env: Env,
    max_loop_iterations: usize,
    max_statements: usize,
    produced: usize,
}

impl SetupExpander {
    pub fn new(config: &CompilerConfig) -> Self {
        SetupExpander {
            env: Env::new(),
            max_loop_iterations: config.max_loop_iterations,
            max_statements: config.max_expanded_statements,
            produced: 0,
        }
    }

    /// Expand the module; also returns the final environment of known constants.
    pub fn expand(mut self, module: Module) -> Result<(Module, Env), CompilerError> {
        log::debug!("EXPAND: {} top-level statement(s)", module.body.len());
        let mut out = Vec::new();
        self.expand_body(module.body, &mut out)?;
        log::debug!(
            "EXPAND: produced {} statement(s), {} constant(s) known",
            out.len(),
            self.env.len()
        );
        Ok((Module { body: out }, self.env))
    }

    fn expand_body(&mut self, body: Vec<Stmt>, out: &mut Vec<Stmt>) -> Result<(), CompilerError> {
        for stmt in body {
            self.expand_stmt(stmt, out)?;
        }
        Ok(())
    }

    fn expand_stmt(&mut self, stmt: Stmt, out: &mut Vec<Stmt>) -> Result<(), CompilerError> {
        let span = stmt.span;
        match stmt.kind {
            StmtKind::If { test, body, orelse } => {
                let taken = self.static_condition(&test)?;
                log::trace!("EXPAND: if at {} takes {} branch", span, if taken { "then" } else { "else" });
                self.expand_body(if taken { body } else { orelse }, out)
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => self.expand_for(target, iter, body, orelse, span, out),
            StmtKind::While { test, body, orelse } => {
                let mut iterations = 0;
                while self.static_condition(&test)? {
                    iterations += 1;
                    if iterations > self.max_loop_iterations {
                        return Err(CompilerError::ExpansionError(
                            format!(
                                "while loop exceeds {} compile-time iterations",
                                self.max_loop_iterations
                            ),
                            span,
                        ));
                    }
                    self.expand_body(body.clone(), out)?;
                }
                // no `break` exists, so `else` always runs after the loop
                self.expand_body(orelse, out)
            }
            StmtKind::FunctionDef(def) => {
                self.env.shift_remove(&def.name);
                self.push(Stmt::new(StmtKind::FunctionDef(def), span), out)
            }
            StmtKind::ClassDef(class) => {
                self.env.shift_remove(&class.name);
                self.push(Stmt::new(StmtKind::ClassDef(class), span), out)
            }
            kind => {
                let mut stmt = Stmt::new(kind, span);
                if !stmt.is_import() {
                    // the update sees the statement as written, against the old environment
                    let original = stmt.clone();
                    self.substitute(&mut stmt);
                    self.update_env(&original);
                }
                self.push(stmt, out)
            }
        }
    }

    fn expand_for(
        &mut self,
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
        span: Span,
        out: &mut Vec<Stmt>,
    ) -> Result<(), CompilerError> {
        let items = match self.static_iterable(&iter) {
            Ok(Value::List(items)) => items,
            Ok(Value::Dict(entries)) => entries.keys().map(|k| Value::Str(k.clone())).collect(),
            Ok(Value::Str(s)) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
            Ok(other) => {
                return Err(CompilerError::ExpansionError(
                    format!("cannot iterate over {} at compile time", other.type_name()),
                    iter.span,
                ))
            }
            Err(reason) => {
                return Err(CompilerError::ExpansionError(
                    format!("loop iterable must be known at compile time: {}", reason),
                    iter.span,
                ))
            }
        };
        if items.len() > self.max_loop_iterations {
            return Err(CompilerError::ExpansionError(
                format!(
                    "for loop runs {} times, more than the limit of {}",
                    items.len(),
                    self.max_loop_iterations
                ),
                span,
            ));
        }

        let names = loop_target_names(&target)?;
        let saved: Vec<(String, Option<Value>)> = names
            .iter()
            .map(|name| (name.clone(), self.env.get(name).cloned()))
            .collect();

        log::trace!("EXPAND: unrolling for loop at {} ({} iterations)", span, items.len());
        for item in items {
            self.bind_loop_target(&target, &names, item)?;
            self.expand_body(body.clone(), out)?;
        }

        for (name, previous) in saved {
            match previous {
                Some(value) => {
                    self.env.insert(name, value);
                }
                None => {
                    self.env.shift_remove(&name);
                }
            }
        }
        self.expand_body(orelse, out)
    }

    /// `range(...)` is checked against the loop limit before it is built.
    fn static_iterable(&self, iter: &Expr) -> Result<Value, String> {
        if let ExprKind::Call { func, args, keywords } = &iter.kind {
            if func.as_name() == Some("range") && keywords.is_empty() && !self.env.contains_key("range") {
                let args = args
                    .iter()
                    .map(|arg| eval_static(arg, &self.env))
                    .collect::<Result<Vec<_>, _>>()?;
                let values = range_values(&args, self.max_loop_iterations)?;
                return Ok(Value::List(values.into_iter().map(Value::Int).collect()));
            }
        }
        eval_static(iter, &self.env)
    }

    fn bind_loop_target(
        &mut self,
        target: &Expr,
        names: &[String],
        item: Value,
    ) -> Result<(), CompilerError> {
        if let [name] = names {
            if target.as_name().is_some() {
                self.env.insert(name.clone(), item);
                return Ok(());
            }
        }
        match item {
            Value::List(values) if values.len() == names.len() => {
                for (name, value) in names.iter().zip(values) {
                    self.env.insert(name.clone(), value);
                }
                Ok(())
            }
            other => Err(CompilerError::ExpansionError(
                format!(
                    "cannot unpack {} into {} loop variables",
                    other.type_name(),
                    names.len()
                ),
                target.span,
            )),
        }
    }

    fn static_condition(&self, test: &Expr) -> Result<bool, CompilerError> {
        eval_static(test, &self.env)
            .map(|value| value.truthy())
            .map_err(|reason| {
                CompilerError::ExpansionError(
                    format!("setup condition must be known at compile time: {}", reason),
                    test.span,
                )
            })
    }

    fn push(&mut self, stmt: Stmt, out: &mut Vec<Stmt>) -> Result<(), CompilerError> {
        self.produced += 1;
        if self.produced > self.max_statements {
            return Err(CompilerError::ExpansionError(
                format!(
                    "setup code expands to more than {} statements",
                    self.max_statements
                ),
                stmt.span,
            ));
        }
        out.push(stmt);
        Ok(())
    }

    /// Replace loads of known names with their literal values.
    fn substitute(&self, stmt: &mut Stmt) {
        let env = &self.env;
        rewrite_stmt_exprs(stmt, &mut |expr, ctx| substitute_expr(env, expr, ctx));
    }

    /// Best-effort environment update; unknown results drop the binding.
    fn update_env(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Assign { target, value }
            | StmtKind::AnnAssign {
                target,
                value: Some(value),
                ..
            } => {
                let result = eval_static(value, &self.env).ok();
                self.assign(target, result);
            }
            StmtKind::AugAssign { target, op, value } => {
                let name = match target.as_name() {
                    Some(name) => name,
                    None => {
                        self.invalidate_target(target);
                        return;
                    }
                };
                let result = match (self.env.get(name), eval_static(value, &self.env)) {
                    (Some(current), Ok(rhs)) => binary_op(current, *op, &rhs).ok(),
                    _ => None,
                };
                self.assign(target, result);
            }
            StmtKind::Expr(expr) => self.apply_mutator(expr),
            _ => {}
        }
    }

    fn assign(&mut self, target: &Expr, value: Option<Value>) {
        match (&target.kind, value) {
            (ExprKind::Name(name), Some(value)) => {
                log::trace!("EXPAND: {} = {}", name, value);
                self.env.insert(name.clone(), value);
            }
            (ExprKind::Name(name), None) => {
                self.env.shift_remove(name);
            }
            (ExprKind::Tuple(targets), Some(Value::List(values)))
                if targets.len() == values.len() =>
            {
                for (target, value) in targets.iter().zip(values) {
                    self.assign(target, Some(value));
                }
            }
            (ExprKind::Tuple(targets), _) => {
                for target in targets {
                    self.assign(target, None);
                }
            }
            (ExprKind::Subscript { value, index }, Some(new_value)) => {
                let updated = match (value.as_name(), eval_static(index, &self.env)) {
                    (Some(name), Ok(key)) => match (self.env.get_mut(name), key) {
                        (Some(Value::List(items)), Value::Int(i)) => {
                            let len = items.len() as i64;
                            let idx = if i < 0 { len + i } else { i };
                            if idx >= 0 && idx < len {
                                items[idx as usize] = new_value;
                                true
                            } else {
                                false
                            }
                        }
                        (Some(Value::Dict(entries)), Value::Str(key)) => {
                            entries.insert(key, new_value);
                            true
                        }
                        _ => false,
                    },
                    _ => false,
                };
                if !updated {
                    self.invalidate_target(target);
                }
            }
            _ => self.invalidate_target(target),
        }
    }

    /// Forget the root name of an assignment target whose new value is unknown.
    fn invalidate_target(&mut self, target: &Expr) {
        let mut root = target;
        loop {
            match &root.kind {
                ExprKind::Attribute { value, .. } | ExprKind::Subscript { value, .. } => root = value,
                _ => break,
            }
        }
        if let Some(name) = root.as_name() {
            self.env.shift_remove(name);
        }
    }

    fn apply_mutator(&mut self, expr: &Expr) {
        let (receiver, method, args) = match &expr.kind {
            ExprKind::Call { func, args, .. } => match &func.kind {
                ExprKind::Attribute { value, attr } => match value.as_name() {
                    Some(name) if self.env.contains_key(name) => (name.to_string(), attr.as_str(), args),
                    _ => return,
                },
                _ => return,
            },
            _ => return,
        };
        if !MUTATORS.contains(&method) {
            // unknown method on a known value: it may have changed
            self.env.shift_remove(&receiver);
            return;
        }

        let args: Option<Vec<Value>> = args.iter().map(|a| eval_static(a, &self.env).ok()).collect();
        let applied = match (self.env.get_mut(&receiver), args) {
            (Some(target), Some(args)) => mutate(target, method, &args),
            _ => false,
        };
        if applied {
            log::trace!("EXPAND: {}.{}(...) tracked", receiver, method);
        } else {
            self.env.shift_remove(&receiver);
        }
    }
}

fn mutate(target: &mut Value, method: &str, args: &[Value]) -> bool {
    match (target, method, args) {
        (Value::List(items), "append", [value]) => {
            items.push(value.clone());
            true
        }
        (Value::List(items), "extend", [Value::List(more)]) => {
            items.extend(more.iter().cloned());
            true
        }
        (Value::List(items), "insert", [Value::Int(i), value]) => {
            let len = items.len() as i64;
            let idx = if *i < 0 { (len + i).max(0) } else { (*i).min(len) };
            items.insert(idx as usize, value.clone());
            true
        }
        (Value::List(items), "pop", []) => items.pop().is_some(),
        (Value::List(items), "pop", [Value::Int(i)]) => {
            let len = items.len() as i64;
            let idx = if *i < 0 { len + i } else { *i };
            if idx >= 0 && idx < len {
                items.remove(idx as usize);
                true
            } else {
                false
            }
        }
        (Value::Dict(entries), "update", [Value::Dict(more)]) => {
            for (key, value) in more {
                entries.insert(key.clone(), value.clone());
            }
            true
        }
        (Value::Dict(entries), "pop", [Value::Str(key), ..]) => {
            entries.shift_remove(key);
            true
        }
        (Value::List(items), "clear", []) => {
            items.clear();
            true
        }
        (Value::Dict(entries), "clear", []) => {
            entries.clear();
            true
        }
        _ => false,
    }
}

fn substitute_expr(env: &Env, expr: &mut Expr, ctx: NameContext) -> bool {
    if ctx == NameContext::Store {
        // the receiver of `cfg["a"] = 1` stays a name; only indices are loads
        return match &mut expr.kind {
            ExprKind::Subscript { value, index } => {
                rewrite_expr(value, NameContext::Store, &mut |e, c| substitute_expr(env, e, c));
                rewrite_expr(index, NameContext::Load, &mut |e, c| substitute_expr(env, e, c));
                true
            }
            ExprKind::Attribute { value, .. } => {
                rewrite_expr(value, NameContext::Store, &mut |e, c| substitute_expr(env, e, c));
                true
            }
            _ => false,
        };
    }
    match &mut expr.kind {
        ExprKind::Name(name) => {
            if let Some(value) = env.get(name.as_str()) {
                *expr = value.to_expr(expr.span);
                return true;
            }
            false
        }
        // keep the receiver of a tracked mutator call so the statement stays meaningful
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            let keeps_receiver = match &func.kind {
                ExprKind::Attribute { value, attr } => {
                    value.as_name().map(|n| env.contains_key(n)).unwrap_or(false)
                        && MUTATORS.contains(&attr.as_str())
                }
                _ => false,
            };
            if !keeps_receiver {
                return false;
            }
            for arg in args.iter_mut() {
                rewrite_expr(arg, NameContext::Load, &mut |e, c| substitute_expr(env, e, c));
            }
            for keyword in keywords.iter_mut() {
                rewrite_expr(&mut keyword.value, NameContext::Load, &mut |e, c| {
                    substitute_expr(env, e, c)
                });
            }
            true
        }
        _ => false,
    }
}

fn loop_target_names(target: &Expr) -> Result<Vec<String>, CompilerError> {
    match &target.kind {
        ExprKind::Name(name) => Ok(vec![name.clone()]),
        ExprKind::Tuple(items) | ExprKind::List(items) => items
            .iter()
            .map(|item| {
                item.as_name().map(|n| n.to_string()).ok_or_else(|| {
                    CompilerError::ExpansionError(
                        "loop variables must be plain names".to_string(),
                        item.span,
                    )
                })
            })
            .collect(),
        _ => Err(CompilerError::ExpansionError(
            "loop variables must be plain names".to_string(),
            target.span,
        )),
    }
}

#[cfg(test)]
#[path = "expander_tests.rs"]
mod tests;
