// Code Block Preprocessor
//
// Expands `CodeBlock` and `AbstractCodeBlock` declarations before any other pass.
// Concrete blocks are spliced in place; abstract blocks become templates that are
// copied, renamed and specialised at every `instantiate` call.

use crate::stage_compiler::error::{CompilerError, Diagnostics, Span};
use crate::stage_compiler::schema::TypeExpr;
use crate::stage_compiler::syntax::*;
use crate::stage_compiler::value::Value;
use indexmap::IndexMap;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Code,
    Abstract,
}

impl BlockKind {
    fn label(&self) -> &'static str {
        match self {
            BlockKind::Code => "CodeBlock",
            BlockKind::Abstract => "AbstractCodeBlock",
        }
    }
}

/// Declared macro parameter; `None` accepts any argument shape.
type ParamType = Option<TypeExpr>;

#[derive(Debug, Clone)]
struct Template {
    id: String,
    description: Option<String>,
    params: IndexMap<String, ParamType>,
    body: Vec<Stmt>,
    instantiations: usize,
    span: Span,
}

#[derive(Debug)]
struct OpenBlock {
    kind: BlockKind,
    id: String,
    span: Span,
    body: Vec<Stmt>,
    template: Option<Template>,
}

#[derive(Debug)]
enum Directive {
    Begin {
        kind: BlockKind,
        id: String,
        description: Option<String>,
        params: IndexMap<String, ParamType>,
        var: Option<String>,
    },
    End {
        kind: BlockKind,
        id: Option<String>,
    },
    Instantiate {
        id: String,
        args: Vec<Keyword>,
    },
}

/// An instantiate argument, validated but not evaluated.
#[derive(Debug, Clone)]
enum MacroArg {
    Literal(Value),
    Selector(Expr),
}

impl MacroArg {
    fn to_expr(&self, span: Span) -> Expr {
        match self {
            MacroArg::Literal(value) => value.to_expr(span),
            MacroArg::Selector(expr) => {
                let mut copy = expr.clone();
                copy.span = span;
                copy
            }
        }
    }
}

pub struct MacroPreprocessor<'a> {
    strict: bool,
    diagnostics: &'a mut Diagnostics,
    templates: IndexMap<String, Template>,
    /// Variables bound to an abstract block by `t = AbstractCodeBlock.begin(...)`.
    template_vars: HashMap<String, String>,
    open: Option<OpenBlock>,
    output: Vec<Stmt>,
}

impl<'a> MacroPreprocessor<'a> {
    pub fn new(strict: bool, diagnostics: &'a mut Diagnostics) -> Self {
        MacroPreprocessor {
            strict,
            diagnostics,
            templates: IndexMap::new(),
            template_vars: HashMap::new(),
            open: None,
            output: Vec::new(),
        }
    }

    pub fn preprocess(mut self, module: Module) -> Result<Module, CompilerError> {
        log::debug!(
            "MACRO: preprocessing {} top-level statement(s), strict={}",
            module.body.len(),
            self.strict
        );

        for stmt in module.body {
            match self.classify(&stmt)? {
                Some(directive) => self.apply(directive, stmt.span)?,
                None => self.emit_source(stmt),
            }
        }

        if let Some(open) = &self.open {
            return Err(CompilerError::MacroError(
                format!("{} '{}' is never closed", open.kind.label(), open.id),
                open.span,
            ));
        }

        for template in self.templates.values() {
            if template.instantiations == 0 {
                self.diagnostics.warn(
                    format!(
                        "AbstractCodeBlock '{}' is never instantiated",
                        template.id
                    ),
                    template.span,
                );
            }
        }

        log::debug!(
            "MACRO: produced {} statement(s) from {} template(s)",
            self.output.len(),
            self.templates.len()
        );
        Ok(Module { body: self.output })
    }

    /// A source statement that is not a block directive.
    fn emit_source(&mut self, stmt: Stmt) {
        if let Some(open) = self.open.as_mut() {
            open.body.push(stmt);
            return;
        }
        if self.strict && !stmt.is_import() {
            self.diagnostics.warn(
                "statement outside any code block is ignored in strict mode",
                stmt.span,
            );
            return;
        }
        self.output.push(stmt);
    }

    fn apply(&mut self, directive: Directive, span: Span) -> Result<(), CompilerError> {
        match directive {
            Directive::Begin {
                kind,
                id,
                description,
                params,
                var,
            } => {
                if let Some(open) = &self.open {
                    return Err(CompilerError::MacroError(
                        format!(
                            "cannot open '{}' inside {} '{}'; blocks do not nest",
                            id,
                            open.kind.label(),
                            open.id
                        ),
                        span,
                    ));
                }
                if !is_identifier_like(&id) {
                    return Err(CompilerError::MacroError(
                        format!("block id '{}' must be letters, digits and underscores", id),
                        span,
                    ));
                }
                let template = if kind == BlockKind::Abstract {
                    if self.templates.contains_key(&id) {
                        return Err(CompilerError::MacroError(
                            format!("AbstractCodeBlock '{}' is already defined", id),
                            span,
                        ));
                    }
                    if let Some(var) = var {
                        self.template_vars.insert(var, id.clone());
                    }
                    Some(Template {
                        id: id.clone(),
                        description,
                        params,
                        body: Vec::new(),
                        instantiations: 0,
                        span,
                    })
                } else {
                    None
                };
                log::trace!("MACRO: begin {} '{}'", kind.label(), id);
                self.open = Some(OpenBlock {
                    kind,
                    id,
                    span,
                    body: Vec::new(),
                    template,
                });
                Ok(())
            }
            Directive::End { kind, id } => {
                let open = self.open.take().ok_or_else(|| {
                    CompilerError::MacroError(
                        format!("{}.end without a matching begin", kind.label()),
                        span,
                    )
                })?;
                if open.kind != kind {
                    return Err(CompilerError::MacroError(
                        format!(
                            "{} '{}' closed with {}.end",
                            open.kind.label(),
                            open.id,
                            kind.label()
                        ),
                        span,
                    ));
                }
                if let Some(id) = id {
                    if id != open.id {
                        return Err(CompilerError::MacroError(
                            format!("end of '{}' does not match open block '{}'", id, open.id),
                            span,
                        ));
                    }
                }
                log::trace!(
                    "MACRO: end {} '{}' ({} statement(s))",
                    kind.label(),
                    open.id,
                    open.body.len()
                );
                match open.template {
                    Some(mut template) => {
                        template.body = open.body;
                        if let Some(description) = &template.description {
                            log::debug!("MACRO: template '{}': {}", template.id, description);
                        }
                        self.templates.insert(template.id.clone(), template);
                    }
                    None => self.output.extend(open.body),
                }
                Ok(())
            }
            Directive::Instantiate { id, args } => {
                if let Some(open) = &self.open {
                    if open.kind == BlockKind::Abstract {
                        return Err(CompilerError::MacroError(
                            format!(
                                "cannot instantiate '{}' inside AbstractCodeBlock '{}'",
                                id, open.id
                            ),
                            span,
                        ));
                    }
                }
                let expanded = self.instantiate(&id, &args, span)?;
                match self.open.as_mut() {
                    Some(open) => open.body.extend(expanded),
                    None => self.output.extend(expanded),
                }
                Ok(())
            }
        }
    }

    fn instantiate(
        &mut self,
        id: &str,
        args: &[Keyword],
        span: Span,
    ) -> Result<Vec<Stmt>, CompilerError> {
        let template = self.templates.get_mut(id).ok_or_else(|| {
            CompilerError::MacroError(format!("unknown AbstractCodeBlock '{}'", id), span)
        })?;

        let mut bound: HashMap<String, MacroArg> = HashMap::new();
        for keyword in args {
            let declared = template.params.get(&keyword.name).ok_or_else(|| {
                CompilerError::MacroError(
                    format!(
                        "'{}' is not a parameter of AbstractCodeBlock '{}'",
                        keyword.name, id
                    ),
                    keyword.value.span,
                )
            })?;
            let arg = validate_argument(&keyword.name, &keyword.value, declared)?;
            bound.insert(keyword.name.clone(), arg);
        }
        let missing: Vec<&str> = template
            .params
            .keys()
            .filter(|name| !bound.contains_key(*name))
            .map(|name| name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(CompilerError::MacroError(
                format!(
                    "instantiate of '{}' is missing argument(s): {}",
                    id,
                    missing.join(", ")
                ),
                span,
            ));
        }

        let n = template.instantiations;
        template.instantiations += 1;
        let suffix = format!("__{}_{}", id, n);

        let mut body = template.body.clone();
        let mut locals = Vec::new();
        collect_local_names(&body, &mut locals);
        let renames: HashMap<String, String> = locals
            .into_iter()
            .filter(|name| !bound.contains_key(name))
            .map(|name| {
                let renamed = format!("{}{}", name, suffix);
                (name, renamed)
            })
            .collect();

        let template_vars: Vec<&String> = self
            .template_vars
            .iter()
            .filter(|(_, block)| block.as_str() == id)
            .map(|(var, _)| var)
            .collect();

        let mut failure: Option<CompilerError> = None;
        rewrite_exprs(&mut body, &mut |expr, ctx| {
            if let ExprKind::Name(name) = &expr.kind {
                if let Some(arg) = bound.get(name) {
                    if ctx == NameContext::Store {
                        failure.get_or_insert(CompilerError::MacroError(
                            format!("cannot assign to macro parameter '{}'", name),
                            expr.span,
                        ));
                        return true;
                    }
                    *expr = arg.to_expr(expr.span);
                    return true;
                }
                if let Some(renamed) = renames.get(name) {
                    expr.kind = ExprKind::Name(renamed.clone());
                    return true;
                }
                return false;
            }
            if let ExprKind::Attribute { value, attr } = &expr.kind {
                let via_template = value
                    .as_name()
                    .map(|var| template_vars.iter().any(|v| v.as_str() == var))
                    .unwrap_or(false);
                if via_template {
                    if let Some(arg) = bound.get(attr) {
                        *expr = arg.to_expr(expr.span);
                        return true;
                    }
                }
            }
            false
        });
        if let Some(err) = failure {
            return Err(err);
        }
        rename_definitions(&mut body, &renames);

        log::debug!(
            "MACRO: instantiated '{}' #{} ({} renamed local(s))",
            id,
            n,
            renames.len()
        );
        Ok(body)
    }

    fn classify(&self, stmt: &Stmt) -> Result<Option<Directive>, CompilerError> {
        // t = AbstractCodeBlock.begin(...)
        if let StmtKind::Assign { target, value } = &stmt.kind {
            if let ExprKind::Call {
                func,
                args,
                keywords,
            } = &value.kind
            {
                if func.dotted_path().as_deref() == Some("AbstractCodeBlock.begin") {
                    let var = target.as_name().map(|s| s.to_string()).ok_or_else(|| {
                        CompilerError::MacroError(
                            "AbstractCodeBlock.begin must be bound to a plain name".to_string(),
                            target.span,
                        )
                    })?;
                    return self
                        .begin_directive(BlockKind::Abstract, args, keywords, Some(var), stmt.span)
                        .map(Some);
                }
            }
            return Ok(None);
        }

        let (func, args, keywords) = match stmt.as_call() {
            Some(call) => call,
            None => return Ok(None),
        };
        let (receiver, method) = match &func.kind {
            ExprKind::Attribute { value, attr } => match value.as_name() {
                Some(receiver) => (receiver, attr.as_str()),
                None => return Ok(None),
            },
            _ => return Ok(None),
        };

        let kind = match receiver {
            "CodeBlock" => BlockKind::Code,
            "AbstractCodeBlock" => BlockKind::Abstract,
            var if self.template_vars.contains_key(var) => {
                let id = self.template_vars[var].clone();
                return match method {
                    "end" => {
                        expect_no_args(method, args, keywords, stmt.span)?;
                        Ok(Some(Directive::End {
                            kind: BlockKind::Abstract,
                            id: Some(id),
                        }))
                    }
                    "instantiate" => {
                        if !args.is_empty() {
                            return Err(CompilerError::MacroError(
                                "instantiate arguments must be passed by keyword".to_string(),
                                args[0].span,
                            ));
                        }
                        Ok(Some(Directive::Instantiate {
                            id,
                            args: keywords.to_vec(),
                        }))
                    }
                    _ => Ok(None),
                };
            }
            _ => return Ok(None),
        };

        match (kind, method) {
            (_, "begin") => self
                .begin_directive(kind, args, keywords, None, stmt.span)
                .map(Some),
            (_, "end") => {
                if !keywords.is_empty() || args.len() > 1 {
                    return Err(CompilerError::MacroError(
                        format!("{}.end takes at most the block id", kind.label()),
                        stmt.span,
                    ));
                }
                let id = match args.first() {
                    Some(arg) => Some(block_id(arg)?),
                    None => None,
                };
                Ok(Some(Directive::End { kind, id }))
            }
            (BlockKind::Abstract, "instantiate") => {
                let id = match args {
                    [arg] => block_id(arg)?,
                    _ => {
                        return Err(CompilerError::MacroError(
                            "AbstractCodeBlock.instantiate takes the block id followed by keyword arguments"
                                .to_string(),
                            stmt.span,
                        ))
                    }
                };
                Ok(Some(Directive::Instantiate {
                    id,
                    args: keywords.to_vec(),
                }))
            }
            (_, other) => Err(CompilerError::MacroError(
                format!("unknown {} operation '{}'", kind.label(), other),
                stmt.span,
            )),
        }
    }

    fn begin_directive(
        &self,
        kind: BlockKind,
        args: &[Expr],
        keywords: &[Keyword],
        var: Option<String>,
        span: Span,
    ) -> Result<Directive, CompilerError> {
        let id = match args.first() {
            Some(arg) => block_id(arg)?,
            None => {
                return Err(CompilerError::MacroError(
                    format!("{}.begin needs a block id", kind.label()),
                    span,
                ))
            }
        };

        if kind == BlockKind::Code {
            if args.len() > 1 || !keywords.is_empty() {
                return Err(CompilerError::MacroError(
                    "CodeBlock.begin takes only the block id".to_string(),
                    span,
                ));
            }
            return Ok(Directive::Begin {
                kind,
                id,
                description: None,
                params: IndexMap::new(),
                var,
            });
        }

        let description = match args.get(1) {
            Some(arg) => Some(
                arg.as_str()
                    .ok_or_else(|| {
                        CompilerError::MacroError(
                            "block description must be a string literal".to_string(),
                            arg.span,
                        )
                    })?
                    .to_string(),
            ),
            None => None,
        };
        if args.len() > 2 {
            return Err(CompilerError::MacroError(
                "macro parameters must be declared by keyword, e.g. x=int".to_string(),
                args[2].span,
            ));
        }

        let mut params = IndexMap::new();
        for keyword in keywords {
            let declared = match &keyword.value.kind {
                ExprKind::Name(name) => TypeExpr::from_name(name),
                ExprKind::Subscript { .. } => Some(TypeExpr::parse(&keyword.value)?),
                _ => {
                    return Err(CompilerError::MacroError(
                        format!("parameter '{}' must be declared with a type", keyword.name),
                        keyword.value.span,
                    ))
                }
            };
            params.insert(keyword.name.clone(), declared);
        }

        Ok(Directive::Begin {
            kind,
            id,
            description,
            params,
            var,
        })
    }
}

fn expect_no_args(
    method: &str,
    args: &[Expr],
    keywords: &[Keyword],
    span: Span,
) -> Result<(), CompilerError> {
    if args.is_empty() && keywords.is_empty() {
        Ok(())
    } else {
        Err(CompilerError::MacroError(
            format!("{}() takes no arguments here", method),
            span,
        ))
    }
}

fn block_id(expr: &Expr) -> Result<String, CompilerError> {
    expr.as_str().map(|s| s.to_string()).ok_or_else(|| {
        CompilerError::MacroError(
            "block id must be a string literal".to_string(),
            expr.span,
        )
    })
}

fn is_identifier_like(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A literal (recursively), or a selector expression: `name` or `name["literal"]`.
fn validate_argument(
    param: &str,
    value: &Expr,
    declared: &ParamType,
) -> Result<MacroArg, CompilerError> {
    if let Some(literal) = Value::from_literal(value) {
        if let Some(ty) = declared {
            let coerced = ty.coerce(&literal).ok_or_else(|| {
                CompilerError::TypeMismatch(
                    format!("{} for macro parameter '{}'", ty, param),
                    literal.type_name().to_string(),
                    value.span,
                )
            })?;
            return Ok(MacroArg::Literal(coerced));
        }
        return Ok(MacroArg::Literal(literal));
    }

    let is_selector = match &value.kind {
        ExprKind::Name(_) => true,
        ExprKind::Subscript { value, index } => {
            value.as_name().is_some() && (index.as_str().is_some() || index.as_int().is_some())
        }
        _ => false,
    };
    if is_selector {
        Ok(MacroArg::Selector(value.clone()))
    } else {
        Err(CompilerError::MacroError(
            format!(
                "argument '{}' must be a literal or a selector such as Name[\"id\"], found {}",
                param,
                value.describe()
            ),
            value.span,
        ))
    }
}

/// Names a block body defines: functions, classes, parameters and assigned variables.
fn collect_local_names(body: &[Stmt], out: &mut Vec<String>) {
    fn push(name: &str, out: &mut Vec<String>) {
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    for stmt in body {
        match &stmt.kind {
            StmtKind::FunctionDef(def) => {
                push(&def.name, out);
                for param in &def.params {
                    push(&param.name, out);
                }
                collect_local_names(&def.body, out);
            }
            // class bodies only declare fields
            StmtKind::ClassDef(class) => push(&class.name, out),
            StmtKind::Assign { target, .. }
            | StmtKind::AugAssign { target, .. }
            | StmtKind::AnnAssign { target, .. } => {
                for name in target_names(target) {
                    push(&name, out);
                }
            }
            StmtKind::For {
                target,
                body,
                orelse,
                ..
            } => {
                for name in target_names(target) {
                    push(&name, out);
                }
                collect_local_names(body, out);
                collect_local_names(orelse, out);
            }
            StmtKind::If { body, orelse, .. } | StmtKind::While { body, orelse, .. } => {
                collect_local_names(body, out);
                collect_local_names(orelse, out);
            }
            _ => {}
        }
    }
}

fn target_names(target: &Expr) -> Vec<String> {
    match &target.kind {
        ExprKind::Name(name) => vec![name.clone()],
        ExprKind::Tuple(items) | ExprKind::List(items) => {
            items.iter().flat_map(target_names).collect()
        }
        _ => Vec::new(),
    }
}

fn rename_definitions(body: &mut [Stmt], renames: &HashMap<String, String>) {
    for stmt in body.iter_mut() {
        match &mut stmt.kind {
            StmtKind::FunctionDef(def) => {
                if let Some(renamed) = renames.get(&def.name) {
                    def.name = renamed.clone();
                }
                for param in def.params.iter_mut() {
                    if let Some(renamed) = renames.get(&param.name) {
                        param.name = renamed.clone();
                    }
                }
                rename_definitions(&mut def.body, renames);
            }
            StmtKind::ClassDef(class) => {
                if let Some(renamed) = renames.get(&class.name) {
                    class.name = renamed.clone();
                }
            }
            StmtKind::If { body, orelse, .. }
            | StmtKind::While { body, orelse, .. }
            | StmtKind::For { body, orelse, .. } => {
                rename_definitions(body, renames);
                rename_definitions(orelse, renames);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "macros_tests.rs"]
mod tests;
