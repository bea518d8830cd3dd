// JavaScript Code Generation
//
// Lowers the IR document to a single ES module. The output is a pure function
// of the IR: maps are walked in insertion order and every temporary is named
// after the source variable it serves, so identical IR gives identical text.
//
// Runtime contract: each exported function takes the runtime `ctx`, which
// provides `globals` (name -> value), `actors` (live collection, each actor
// carrying `uid` and `schema`), `actorIndex` (Map of uid -> actor, also holding
// the reserved collider/subject identifiers), `roles`, `cameras`, `scene`,
// `tick`, `rng` and `ops` (side-effecting operations).

use crate::stage_compiler::config::CompilerConfig;
use crate::stage_compiler::error::CompilerError;
use crate::stage_compiler::ir::*;
use crate::stage_compiler::value::Value;
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::fmt::Write;

lazy_static! {
    /// Source names that cannot be used verbatim as JavaScript identifiers.
    static ref JS_RESERVED: HashSet<&'static str> = [
        "arguments", "await", "break", "case", "catch", "class", "const", "continue",
        "debugger", "default", "delete", "do", "else", "enum", "eval", "export",
        "extends", "false", "finally", "for", "function", "if", "implements", "import",
        "in", "instanceof", "interface", "let", "new", "null", "package", "private",
        "protected", "public", "return", "static", "super", "switch", "this", "throw",
        "true", "try", "typeof", "undefined", "var", "void", "while", "with", "yield",
        "NaN", "Infinity", "Math", "Object", "Array", "Number", "String",
        "structuredClone", "ctx",
    ]
    .into_iter()
    .collect();
}

/// Python-compatible helpers shared by every generated function.
const PRELUDE: &str = r#"const __py = {
  mod: (a, b) => ((a % b) + b) % b,
  at: (xs, i) => (i < 0 ? xs[xs.length + i] : xs[i]),
  iter: (xs) => (Array.isArray(xs) || typeof xs === "string" ? xs : Object.keys(xs)),
  len: (xs) => (Array.isArray(xs) || typeof xs === "string" ? xs.length : Object.keys(xs).length),
  round: (x, n = 0) => Math.round(x * 10 ** n) / 10 ** n,
  int: (x) => Math.trunc(Number(x)),
  float: (x) => Number(x),
  str: (x) => (x === null ? "None" : typeof x === "boolean" ? (x ? "True" : "False") : String(x)),
  pop: (xs, k) => {
    if (Array.isArray(xs)) {
      return k === undefined ? xs.pop() : xs.splice(k < 0 ? xs.length + k : k, 1)[0];
    }
    const v = xs[k];
    delete xs[k];
    return v;
  },
};
"#;

pub fn js_ident(name: &str) -> String {
    if JS_RESERVED.contains(name) {
        format!("{}_", name)
    } else {
        name.to_string()
    }
}

fn js_string(s: &str) -> Result<String, CompilerError> {
    serde_json::to_string(s).map_err(|e| CompilerError::CodeGenError(format!("cannot quote string: {}", e)))
}

pub fn js_value(value: &Value) -> Result<String, CompilerError> {
    Ok(match value {
        Value::None => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_nan() => "NaN".to_string(),
        Value::Float(f) if f.is_infinite() => (if *f > 0.0 { "Infinity" } else { "-Infinity" }).to_string(),
        Value::Float(f) => f.to_string(),
        Value::Str(s) => js_string(s)?,
        Value::List(items) => {
            let items = items.iter().map(js_value).collect::<Result<Vec<_>, _>>()?;
            format!("[{}]", items.join(", "))
        }
        Value::Dict(entries) if entries.is_empty() => "{}".to_string(),
        Value::Dict(entries) => {
            let mut parts = Vec::new();
            for (key, item) in entries {
                parts.push(format!("{}: {}", js_string(key)?, js_value(item)?));
            }
            format!("{{ {} }}", parts.join(", "))
        }
    })
}

/// What a function does when a binding cannot be resolved at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exit {
    Action,
    Predicate,
    Callable,
    /// One step of a coroutine action.
    Step,
}

/// Naming state for one generated function.
#[derive(Debug)]
pub(crate) struct FunctionScope {
    exit: Exit,
    /// Source locals; in a coroutine they live on the state object.
    locals: Vec<String>,
    /// (JS variable, global name) pairs written back before every exit.
    writeback: Vec<(String, String)>,
    temps: HashMap<String, usize>,
}

impl FunctionScope {
    pub(crate) fn new(exit: Exit, locals: Vec<String>) -> Self {
        FunctionScope {
            exit,
            locals,
            writeback: Vec::new(),
            temps: HashMap::new(),
        }
    }

    pub(crate) fn var(&self, name: &str) -> String {
        if self.exit == Exit::Step && self.locals.iter().any(|l| l == name) {
            format!("__s.{}", js_ident(name))
        } else {
            js_ident(name)
        }
    }

    /// Base name for the temporaries of a loop over `name`; repeats get a numeric suffix.
    pub(crate) fn temp(&mut self, name: &str) -> String {
        let count = self.temps.entry(name.to_string()).or_insert(0);
        *count += 1;
        let base = if *count == 1 {
            format!("__{}", name)
        } else {
            format!("__{}_{}", name, count)
        };
        if self.exit == Exit::Step {
            format!("__s.{}", base)
        } else {
            base
        }
    }

    fn missing(&self) -> &'static str {
        match self.exit {
            Exit::Action => "return;",
            Exit::Predicate => "return false;",
            Exit::Callable => "return null;",
            Exit::Step => "{ __s.pc = -1; return true; }",
        }
    }
}

/// Variables assigned or iterated in `body`, in order of first appearance.
pub(crate) fn collect_locals(body: &[IrStmt], exclude: &[String]) -> Vec<String> {
    let mut locals: Vec<String> = Vec::new();
    IrStmt::walk(body, &mut |stmt| {
        let name = match stmt {
            IrStmt::Assign {
                target: AssignTarget::Var { name },
                ..
            } => name,
            IrStmt::For { var, .. } => var,
            _ => return,
        };
        if !exclude.contains(name) && !locals.contains(name) {
            locals.push(name.clone());
        }
    });
    locals
}

pub struct JsCodeGen {
    emit_dispatch_table: bool,
    out: String,
    indent: usize,
}

impl JsCodeGen {
    pub fn new(config: &CompilerConfig) -> Self {
        JsCodeGen {
            emit_dispatch_table: config.emit_dispatch_table,
            out: String::new(),
            indent: 0,
        }
    }

    pub fn generate(mut self, ir: &IrDocument) -> Result<String, CompilerError> {
        log::debug!(
            "CODEGEN: {} actions, {} predicates, {} helpers",
            ir.actions.len(),
            ir.predicates.len(),
            ir.callables.len()
        );
        self.line("// Generated by stage-compiler. Do not edit.");
        self.blank();
        self.out.push_str(PRELUDE);

        for callable in ir.callables.values() {
            self.blank();
            self.emit_value_function(callable, Exit::Callable)?;
        }
        for predicate in ir.predicates.values() {
            self.blank();
            self.emit_value_function(predicate, Exit::Predicate)?;
        }
        for action in ir.actions.values() {
            self.blank();
            if action.is_coroutine() {
                log::debug!("CODEGEN: {} is a coroutine", action.name);
                self.emit_coroutine(action)?;
            } else {
                self.emit_action(action)?;
            }
        }

        if self.emit_dispatch_table {
            self.blank();
            self.open("export const ACTIONS = {");
            for action in ir.actions.values() {
                let name = js_ident(&action.name);
                self.line(format!(
                    "{}: {{ fn: {}, coroutine: {} }},",
                    name,
                    name,
                    action.is_coroutine()
                ));
            }
            self.close("};");
            self.blank();
            self.open("export const PREDICATES = {");
            for predicate in ir.predicates.values() {
                self.line(format!("{},", js_ident(&predicate.name)));
            }
            self.close("};");
        }
        Ok(self.out)
    }

    // Output helpers

    pub(crate) fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        let _ = writeln!(self.out, "{}", text.as_ref());
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    pub(crate) fn open(&mut self, text: impl AsRef<str>) {
        self.line(text);
        self.indent += 1;
    }

    pub(crate) fn close(&mut self, text: &str) {
        self.dedent();
        self.line(text);
    }

    pub(crate) fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub(crate) fn doc_comment(&mut self, description: Option<&str>) {
        let description = match description {
            Some(text) if !text.trim().is_empty() => text.trim(),
            _ => return,
        };
        let lines: Vec<&str> = description.lines().map(str::trim).collect();
        if lines.len() == 1 {
            self.line(format!("/** {} */", lines[0].replace("*/", "* /")));
        } else {
            self.line("/**");
            for text in lines {
                self.line(format!(" * {}", text.replace("*/", "* /")).trim_end());
            }
            self.line(" */");
        }
    }

    // Functions

    fn emit_action(&mut self, action: &ActionIr) -> Result<(), CompilerError> {
        let params: Vec<String> = action.params.iter().map(|p| p.name.clone()).collect();
        let mut scope = FunctionScope::new(Exit::Action, collect_locals(&action.body, &params));
        self.doc_comment(action.description.as_deref());
        self.open(format!("export function {}(ctx) {{", js_ident(&action.name)));
        self.emit_prologue(&action.params, &mut scope)?;
        self.emit_hoisted(&scope);
        self.emit_block(&action.body, &mut scope, None)?;
        self.emit_writeback(&scope);
        self.close("}");
        Ok(())
    }

    fn emit_value_function(&mut self, function: &PredicateIr, exit: Exit) -> Result<(), CompilerError> {
        let mut bound: Vec<String> = function.params.iter().map(|p| p.name.clone()).collect();
        bound.extend(function.args.iter().map(|a| a.name.clone()));
        let mut scope = FunctionScope::new(exit, collect_locals(&function.body, &bound));

        let mut signature = vec!["ctx".to_string()];
        signature.extend(function.args.iter().map(|a| js_ident(&a.name)));
        self.doc_comment(function.description.as_deref());
        self.open(format!(
            "export function {}({}) {{",
            js_ident(&function.name),
            signature.join(", ")
        ));
        self.emit_prologue(&function.params, &mut scope)?;
        self.emit_hoisted(&scope);
        self.emit_block(&function.body, &mut scope, None)?;
        let result = self.expr_bare(&function.result, &scope)?;
        if scope.writeback.is_empty() {
            self.line(format!("return {};", result));
        } else {
            self.line(format!("const __result = {};", result));
            self.emit_writeback(&scope);
            self.line("return __result;");
        }
        self.close("}");
        Ok(())
    }

    /// Resolve every context binding; bail out of the function if one is missing.
    pub(crate) fn emit_prologue(&mut self, params: &[ParamBinding], scope: &mut FunctionScope) -> Result<(), CompilerError> {
        for param in params {
            let name = js_ident(&param.name);
            let guarded = match param.kind {
                BindingKind::Global => {
                    let key = param.ident().unwrap_or(param.name.as_str());
                    let key = js_string(key)?;
                    self.line(format!("let {} = structuredClone(ctx.globals[{}]);", name, key));
                    if scope.exit != Exit::Predicate {
                        scope.writeback.push((name.clone(), key));
                    }
                    false
                }
                BindingKind::Actor => {
                    let lookup = self.actor_lookup(param)?;
                    self.line(format!("const {} = {};", name, lookup));
                    true
                }
                BindingKind::ActorList => {
                    let view = match &param.schema {
                        Some(schema) => format!("ctx.actors.filter((a) => a.schema === {})", js_string(schema)?),
                        None => "ctx.actors".to_string(),
                    };
                    self.line(format!("const {} = {};", name, view));
                    false
                }
                BindingKind::Role | BindingKind::Camera => {
                    let table = if param.kind == BindingKind::Role { "roles" } else { "cameras" };
                    let id = param.ident().ok_or_else(|| {
                        CompilerError::CodeGenError(format!(
                            "parameter '{}' has no identifier to look up",
                            param.name
                        ))
                    })?;
                    self.line(format!("const {} = ctx.{}[{}];", name, table, js_string(id)?));
                    true
                }
                BindingKind::Scene => {
                    self.line(format!("const {} = ctx.scene;", name));
                    false
                }
                BindingKind::Tick => {
                    self.line(format!("const {} = ctx.tick;", name));
                    false
                }
            };
            if guarded {
                self.line(format!("if ({} === undefined) {}", name, scope.missing()));
            }
        }
        Ok(())
    }

    fn actor_lookup(&mut self, param: &ParamBinding) -> Result<String, CompilerError> {
        match &param.selector {
            Some(selector @ Selector::Ident(id)) => {
                let id = js_string(id)?;
                if selector.is_reserved() {
                    Ok(format!("ctx.actorIndex.get({})", id))
                } else {
                    Ok(format!(
                        "ctx.actorIndex.get({}) ?? ctx.actors.find((a) => a.uid === {})",
                        id, id
                    ))
                }
            }
            Some(Selector::Index(index)) => {
                let view = match &param.schema {
                    Some(schema) => {
                        let view = format!("__{}_view", param.name);
                        self.line(format!(
                            "const {} = ctx.actors.filter((a) => a.schema === {});",
                            view,
                            js_string(schema)?
                        ));
                        view
                    }
                    None => "ctx.actors".to_string(),
                };
                if *index < 0 {
                    Ok(format!("{}[{}.length - {}]", view, view, -index))
                } else {
                    Ok(format!("{}[{}]", view, index))
                }
            }
            None => match &param.schema {
                Some(schema) => Ok(format!("ctx.actors.find((a) => a.schema === {})", js_string(schema)?)),
                None => Err(CompilerError::CodeGenError(format!(
                    "actor parameter '{}' has neither a selector nor a schema",
                    param.name
                ))),
            },
        }
    }

    fn emit_hoisted(&mut self, scope: &FunctionScope) {
        if !scope.locals.is_empty() {
            let names: Vec<String> = scope.locals.iter().map(|l| js_ident(l)).collect();
            self.line(format!("let {};", names.join(", ")));
        }
    }

    pub(crate) fn emit_writeback(&mut self, scope: &FunctionScope) {
        for (var, key) in &scope.writeback {
            self.line(format!("ctx.globals[{}] = {};", key, var));
        }
    }

    // Statements

    /// `cont` is the coroutine label a `continue` jumps to; `None` inside plain loops.
    pub(crate) fn emit_block(&mut self, body: &[IrStmt], scope: &mut FunctionScope, cont: Option<usize>) -> Result<(), CompilerError> {
        for stmt in body {
            self.emit_stmt(stmt, scope, cont)?;
        }
        Ok(())
    }

    pub(crate) fn emit_stmt(&mut self, stmt: &IrStmt, scope: &mut FunctionScope, cont: Option<usize>) -> Result<(), CompilerError> {
        match stmt {
            IrStmt::Assign { target, value } => {
                let target = self.target(target, scope)?;
                let value = self.expr_bare(value, scope)?;
                self.line(format!("{} = {};", target, value));
            }
            IrStmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let cond = self.expr_bare(cond, scope)?;
                self.open(format!("if ({}) {{", cond));
                self.emit_block(then_body, scope, cont)?;
                self.emit_else(else_body, scope, cont)?;
            }
            IrStmt::While { cond, body } => {
                let cond = self.expr_bare(cond, scope)?;
                self.open(format!("while ({}) {{", cond));
                self.emit_block(body, scope, None)?;
                self.close("}");
            }
            IrStmt::For { var, iter, body } => {
                let target = scope.var(var);
                match iter {
                    IrExpr::Range { start, stop, step } => {
                        let t = scope.temp(var);
                        let start = self.expr_bare(start, scope)?;
                        let stop = self.expr_bare(stop, scope)?;
                        let step = self.expr_bare(step, scope)?;
                        if scope.exit == Exit::Step {
                            self.line(format!("{} = {};", t, start));
                            self.line(format!("{}_stop = {};", t, stop));
                            self.line(format!("{}_step = {};", t, step));
                            self.open(format!(
                                "for (; {t}_step >= 0 ? {t} < {t}_stop : {t} > {t}_stop; {t} += {t}_step) {{",
                                t = t
                            ));
                        } else {
                            self.open(format!(
                                "for (let {t} = {}, {t}_stop = {}, {t}_step = {}; {t}_step >= 0 ? {t} < {t}_stop : {t} > {t}_stop; {t} += {t}_step) {{",
                                start,
                                stop,
                                step,
                                t = t
                            ));
                        }
                        self.line(format!("{} = {};", target, t));
                    }
                    other => {
                        let iter = self.expr_bare(other, scope)?;
                        self.open(format!("for ({} of __py.iter({})) {{", target, iter));
                    }
                }
                self.emit_block(body, scope, None)?;
                self.close("}");
            }
            IrStmt::Continue => match cont {
                Some(label) => self.emit_jump(label),
                None => self.line("continue;"),
            },
            IrStmt::Yield { .. } => {
                return Err(CompilerError::CodeGenError(
                    "yield reached outside a coroutine body".to_string(),
                ))
            }
            IrStmt::Call { op, args } => {
                let call = self.call_stmt(*op, args, scope)?;
                self.line(format!("{};", call));
            }
        }
        Ok(())
    }

    fn emit_else(&mut self, else_body: &[IrStmt], scope: &mut FunctionScope, cont: Option<usize>) -> Result<(), CompilerError> {
        match else_body {
            [] => self.close("}"),
            [IrStmt::If {
                cond,
                then_body,
                else_body,
            }] => {
                let cond = self.expr_bare(cond, scope)?;
                self.dedent();
                self.open(format!("}} else if ({}) {{", cond));
                self.emit_block(then_body, scope, cont)?;
                self.emit_else(else_body, scope, cont)?;
            }
            _ => {
                self.dedent();
                self.open("} else {");
                self.emit_block(else_body, scope, cont)?;
                self.close("}");
            }
        }
        Ok(())
    }

    fn call_stmt(&self, op: CallOp, args: &[IrExpr], scope: &FunctionScope) -> Result<String, CompilerError> {
        let lowered = args
            .iter()
            .map(|arg| self.expr_bare(arg, scope))
            .collect::<Result<Vec<_>, _>>()?;
        let arg = |i: usize| {
            lowered.get(i).cloned().ok_or_else(|| {
                CompilerError::CodeGenError(format!("{}() is missing argument {}", op.name(), i + 1))
            })
        };
        Ok(match op {
            CallOp::AttachedTo => format!("{}.parent = {}", arg(0)?, arg(1)?),
            CallOp::Detached => format!("{}.parent = \"\"", arg(0)?),
            CallOp::Append => format!("{}.push({})", arg(0)?, arg(1)?),
            CallOp::Update => format!("Object.assign({}, {})", arg(0)?, arg(1)?),
            CallOp::Pop => format!("__py.pop({})", lowered.join(", ")),
            _ => format!("ctx.ops.{}({})", op.name(), lowered.join(", ")),
        })
    }

    fn target(&self, target: &AssignTarget, scope: &FunctionScope) -> Result<String, CompilerError> {
        Ok(match target {
            AssignTarget::Var { name } => scope.var(name),
            AssignTarget::Attr { object, field } => format!("{}.{}", self.expr(object, scope)?, field),
            AssignTarget::Index { object, index } => {
                let object = self.expr(object, scope)?;
                match index {
                    IrExpr::Const {
                        value: Value::Int(i),
                    } if *i < 0 => format!("{}[{}.length - {}]", object, object, -i),
                    _ => format!("{}[{}]", object, self.expr_bare(index, scope)?),
                }
            }
        })
    }

    // Expressions

    /// An expression in a position that needs no surrounding parentheses.
    pub(crate) fn expr_bare(&self, expr: &IrExpr, scope: &FunctionScope) -> Result<String, CompilerError> {
        match expr {
            IrExpr::Binary { op, left, right } => self.binary(*op, left, right, scope),
            IrExpr::Const {
                value: value @ (Value::Int(_) | Value::Float(_)),
            } => js_value(value),
            _ => self.expr(expr, scope),
        }
    }

    pub(crate) fn expr(&self, expr: &IrExpr, scope: &FunctionScope) -> Result<String, CompilerError> {
        Ok(match expr {
            IrExpr::Const { value } => {
                let text = js_value(value)?;
                if text.starts_with('-') {
                    format!("({})", text)
                } else {
                    text
                }
            }
            IrExpr::Var { name } => scope.var(name),
            IrExpr::Attr { object, field } => format!("{}.{}", self.expr(object, scope)?, field),
            IrExpr::Unary { op, operand } => {
                let operand = self.expr(operand, scope)?;
                match op {
                    IrUnaryOp::Not => format!("(!{})", operand),
                    IrUnaryOp::Plus => format!("(+{})", operand),
                    IrUnaryOp::Minus => format!("(-{})", operand),
                }
            }
            IrExpr::Binary { op, left, right } => format!("({})", self.binary(*op, left, right, scope)?),
            IrExpr::List { items } => {
                let items = items
                    .iter()
                    .map(|item| self.expr_bare(item, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("[{}]", items.join(", "))
            }
            IrExpr::Object { entries } if entries.is_empty() => "{}".to_string(),
            IrExpr::Object { entries } => {
                let mut parts = Vec::new();
                for (key, item) in entries {
                    parts.push(format!("{}: {}", js_string(key)?, self.expr_bare(item, scope)?));
                }
                format!("{{ {} }}", parts.join(", "))
            }
            IrExpr::Index { object, index } => {
                let object = self.expr(object, scope)?;
                match index.as_ref() {
                    IrExpr::Const {
                        value: Value::Int(i),
                    } if *i < 0 => format!("__py.at({}, {})", object, i),
                    index => format!("{}[{}]", object, self.expr_bare(index, scope)?),
                }
            }
            IrExpr::Range { .. } => {
                return Err(CompilerError::CodeGenError(
                    "range() is only valid as a for-loop iterable".to_string(),
                ))
            }
            IrExpr::Call {
                func,
                external,
                args,
            } => {
                let args = args
                    .iter()
                    .map(|arg| self.expr_bare(arg, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                match external {
                    ExternalKind::Helper => {
                        let mut all = vec!["ctx".to_string()];
                        all.extend(args);
                        format!("{}({})", js_ident(func), all.join(", "))
                    }
                    ExternalKind::Builtin => builtin_call(func, &args)?,
                }
            }
        })
    }

    fn binary(&self, op: IrBinaryOp, left: &IrExpr, right: &IrExpr, scope: &FunctionScope) -> Result<String, CompilerError> {
        let l = self.expr(left, scope)?;
        let r = self.expr(right, scope)?;
        let symbol = match op {
            IrBinaryOp::FloorDiv => return Ok(format!("Math.floor({} / {})", l, r)),
            IrBinaryOp::Mod => return Ok(format!("__py.mod({}, {})", l, r)),
            IrBinaryOp::Add => "+",
            IrBinaryOp::Sub => "-",
            IrBinaryOp::Mul => "*",
            IrBinaryOp::Div => "/",
            IrBinaryOp::Pow => "**",
            IrBinaryOp::Eq => "===",
            IrBinaryOp::NotEq => "!==",
            IrBinaryOp::Lt => "<",
            IrBinaryOp::LtE => "<=",
            IrBinaryOp::Gt => ">",
            IrBinaryOp::GtE => ">=",
            IrBinaryOp::And => "&&",
            IrBinaryOp::Or => "||",
        };
        Ok(format!("{} {} {}", l, symbol, r))
    }
}

fn builtin_call(name: &str, args: &[String]) -> Result<String, CompilerError> {
    let joined = args.join(", ");
    Ok(match name {
        "random" | "randint" | "uniform" | "choice" => format!("ctx.rng.{}({})", name, joined),
        "abs" => format!("Math.abs({})", joined),
        "min" | "max" if args.len() == 1 => format!("Math.{}(...{})", name, joined),
        "min" | "max" => format!("Math.{}({})", name, joined),
        "len" | "round" | "int" | "float" | "str" => format!("__py.{}({})", name, joined),
        other => {
            return Err(CompilerError::CodeGenError(format!(
                "no JavaScript lowering for builtin '{}'",
                other
            )))
        }
    })
}

#[cfg(test)]
#[path = "codegen_tests.rs"]
mod tests;
