// Syntax tree for the host surface syntax
//
// The compiler only ever inspects this tree; author code is never executed.

use crate::stage_compiler::error::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Import(Vec<String>),
    ImportFrom {
        module: String,
        names: Vec<String>,
    },
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Yield(Expr),
    Continue,
    Pass,
    Assign {
        target: Expr,
        value: Expr,
    },
    AugAssign {
        target: Expr,
        op: BinaryOp,
        value: Expr,
    },
    AnnAssign {
        target: Expr,
        annotation: Expr,
        value: Option<Expr>,
    },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Option<Expr>,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<Expr>,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,

    // Comparison
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,

    // Logical
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtE => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtE => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Plus,
    Minus,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }

    pub fn name(name: &str, span: Span) -> Self {
        Expr::new(ExprKind::Name(name.to_string()), span)
    }

    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Integer literal, including a negated one such as `-1`.
    pub fn as_int(&self) -> Option<i64> {
        match &self.kind {
            ExprKind::Int(value) => Some(*value),
            ExprKind::Unary {
                op: UnaryOp::Minus,
                operand,
            } => match operand.kind {
                ExprKind::Int(value) => Some(-value),
                _ => None,
            },
            _ => None,
        }
    }

    /// `a.b.c` rendered as a dotted path, if the expression is only names and attributes.
    pub fn dotted_path(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Name(name) => Some(name.clone()),
            ExprKind::Attribute { value, attr } => {
                value.dotted_path().map(|base| format!("{}.{}", base, attr))
            }
            _ => None,
        }
    }

    /// Short human-readable description used in error messages.
    pub fn describe(&self) -> String {
        match &self.kind {
            ExprKind::Name(name) => format!("name '{}'", name),
            ExprKind::Int(_) | ExprKind::Float(_) => "number".to_string(),
            ExprKind::Str(_) => "string".to_string(),
            ExprKind::Bool(_) => "boolean".to_string(),
            ExprKind::None => "None".to_string(),
            ExprKind::List(_) => "list literal".to_string(),
            ExprKind::Tuple(_) => "tuple".to_string(),
            ExprKind::Dict(_) => "dict literal".to_string(),
            ExprKind::Attribute { .. } => match self.dotted_path() {
                Some(path) => format!("attribute '{}'", path),
                None => "attribute access".to_string(),
            },
            ExprKind::Subscript { .. } => "subscript".to_string(),
            ExprKind::Call { func, .. } => match func.dotted_path() {
                Some(path) => format!("call to '{}'", path),
                None => "call".to_string(),
            },
            ExprKind::Unary { .. } => "unary expression".to_string(),
            ExprKind::Binary { op, .. } => format!("'{}' expression", op.symbol()),
        }
    }
}

impl Keyword {
    pub fn find<'a>(keywords: &'a [Keyword], name: &str) -> Option<&'a Expr> {
        keywords.iter().find(|kw| kw.name == name).map(|kw| &kw.value)
    }
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Stmt { kind, span }
    }

    pub fn is_import(&self) -> bool {
        matches!(self.kind, StmtKind::Import(_) | StmtKind::ImportFrom { .. })
    }

    /// The call expression of an expression statement, if it is a call.
    pub fn as_call(&self) -> Option<(&Expr, &[Expr], &[Keyword])> {
        match &self.kind {
            StmtKind::Expr(Expr {
                kind:
                    ExprKind::Call {
                        func,
                        args,
                        keywords,
                    },
                ..
            }) => Some((func, args, keywords)),
            _ => None,
        }
    }
}

/// Leading docstring of a function or class body.
pub fn docstring(body: &[Stmt]) -> Option<&str> {
    match body.first() {
        Some(Stmt {
            kind: StmtKind::Expr(expr),
            ..
        }) => expr.as_str(),
        _ => None,
    }
}

/// Whether a name occurrence is read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameContext {
    Load,
    Store,
}

/// Rewrites every expression reachable from a statement list, outermost first.
///
/// The callback sees each expression together with its load/store context and may
/// replace it; replaced expressions are not visited again.
pub fn rewrite_exprs<F>(body: &mut [Stmt], f: &mut F)
where
    F: FnMut(&mut Expr, NameContext) -> bool,
{
    for stmt in body.iter_mut() {
        rewrite_stmt_exprs(stmt, f);
    }
}

pub fn rewrite_stmt_exprs<F>(stmt: &mut Stmt, f: &mut F)
where
    F: FnMut(&mut Expr, NameContext) -> bool,
{
    match &mut stmt.kind {
        StmtKind::Import(_) | StmtKind::ImportFrom { .. } | StmtKind::Continue | StmtKind::Pass => {}
        StmtKind::FunctionDef(def) => {
            for decorator in def.decorators.iter_mut() {
                rewrite_expr(decorator, NameContext::Load, f);
            }
            for param in def.params.iter_mut() {
                if let Some(annotation) = param.annotation.as_mut() {
                    rewrite_expr(annotation, NameContext::Load, f);
                }
            }
            if let Some(returns) = def.returns.as_mut() {
                rewrite_expr(returns, NameContext::Load, f);
            }
            rewrite_exprs(&mut def.body, f);
        }
        StmtKind::ClassDef(class) => {
            for decorator in class.decorators.iter_mut() {
                rewrite_expr(decorator, NameContext::Load, f);
            }
            for base in class.bases.iter_mut() {
                rewrite_expr(base, NameContext::Load, f);
            }
            // field names in a class body are declarations, not variables
            for field in class.body.iter_mut() {
                let is_field = matches!(
                    &field.kind,
                    StmtKind::AnnAssign { target, .. } if target.as_name().is_some()
                );
                if !is_field {
                    rewrite_stmt_exprs(field, f);
                    continue;
                }
                if let StmtKind::AnnAssign {
                    annotation, value, ..
                } = &mut field.kind
                {
                    rewrite_expr(annotation, NameContext::Load, f);
                    if let Some(value) = value {
                        rewrite_expr(value, NameContext::Load, f);
                    }
                }
            }
        }
        StmtKind::If { test, body, orelse } | StmtKind::While { test, body, orelse } => {
            rewrite_expr(test, NameContext::Load, f);
            rewrite_exprs(body, f);
            rewrite_exprs(orelse, f);
        }
        StmtKind::For {
            target,
            iter,
            body,
            orelse,
        } => {
            rewrite_expr(target, NameContext::Store, f);
            rewrite_expr(iter, NameContext::Load, f);
            rewrite_exprs(body, f);
            rewrite_exprs(orelse, f);
        }
        StmtKind::Return(value) => {
            if let Some(value) = value {
                rewrite_expr(value, NameContext::Load, f);
            }
        }
        StmtKind::Yield(value) | StmtKind::Expr(value) => {
            rewrite_expr(value, NameContext::Load, f);
        }
        StmtKind::Assign { target, value } | StmtKind::AugAssign { target, value, .. } => {
            rewrite_expr(target, NameContext::Store, f);
            rewrite_expr(value, NameContext::Load, f);
        }
        StmtKind::AnnAssign {
            target,
            annotation,
            value,
        } => {
            rewrite_expr(target, NameContext::Store, f);
            rewrite_expr(annotation, NameContext::Load, f);
            if let Some(value) = value {
                rewrite_expr(value, NameContext::Load, f);
            }
        }
    }
}

/// Store context only applies to the outermost name of a target; the object of
/// `a.b = …` or `a[i] = …` is itself loaded.
pub fn rewrite_expr<F>(expr: &mut Expr, ctx: NameContext, f: &mut F)
where
    F: FnMut(&mut Expr, NameContext) -> bool,
{
    if f(expr, ctx) {
        return;
    }
    match &mut expr.kind {
        ExprKind::Name(_)
        | ExprKind::Int(_)
        | ExprKind::Float(_)
        | ExprKind::Str(_)
        | ExprKind::Bool(_)
        | ExprKind::None => {}
        ExprKind::List(items) | ExprKind::Tuple(items) => {
            for item in items.iter_mut() {
                rewrite_expr(item, ctx, f);
            }
        }
        ExprKind::Dict(entries) => {
            for (key, value) in entries.iter_mut() {
                rewrite_expr(key, NameContext::Load, f);
                rewrite_expr(value, NameContext::Load, f);
            }
        }
        ExprKind::Attribute { value, .. } => rewrite_expr(value, NameContext::Load, f),
        ExprKind::Subscript { value, index } => {
            rewrite_expr(value, NameContext::Load, f);
            rewrite_expr(index, NameContext::Load, f);
        }
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            rewrite_expr(func, NameContext::Load, f);
            for arg in args.iter_mut() {
                rewrite_expr(arg, NameContext::Load, f);
            }
            for keyword in keywords.iter_mut() {
                rewrite_expr(&mut keyword.value, NameContext::Load, f);
            }
        }
        ExprKind::Unary { operand, .. } => rewrite_expr(operand, NameContext::Load, f),
        ExprKind::Binary { left, right, .. } => {
            rewrite_expr(left, NameContext::Load, f);
            rewrite_expr(right, NameContext::Load, f);
        }
    }
}

/// Visits statements recursively (including nested function bodies), innermost after outer.
pub fn walk_stmts<'a, F>(body: &'a [Stmt], f: &mut F)
where
    F: FnMut(&'a Stmt),
{
    for stmt in body {
        f(stmt);
        match &stmt.kind {
            StmtKind::FunctionDef(def) => walk_stmts(&def.body, f),
            StmtKind::ClassDef(class) => walk_stmts(&class.body, f),
            StmtKind::If { body, orelse, .. }
            | StmtKind::While { body, orelse, .. }
            | StmtKind::For { body, orelse, .. } => {
                walk_stmts(body, f);
                walk_stmts(orelse, f);
            }
            _ => {}
        }
    }
}
