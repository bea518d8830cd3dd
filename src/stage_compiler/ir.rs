// Intermediate Representation for compiled game logic
//
// Closed node sets produced by the body compiler and consumed by the backend.
// Every node serializes with a stable shape so the IR document can be diffed.

use crate::stage_compiler::error::Span;
use crate::stage_compiler::schema::TypeExpr;
use crate::stage_compiler::syntax::{BinaryOp, UnaryOp};
use crate::stage_compiler::value::Value;
use indexmap::IndexMap;
use serde::Serialize;

/// Identifiers the runtime binds to the two actors of a collision, and to the
/// subject of a logical condition.
pub const COLLIDER_A: &str = "__collider_a";
pub const COLLIDER_B: &str = "__collider_b";
pub const LOGICAL_SUBJECT: &str = "__subject";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    Global,
    Actor,
    ActorList,
    Role,
    Camera,
    Scene,
    Tick,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// Position in the (possibly type-filtered) actor collection; negative counts from the end.
    Index(i64),
    /// Literal identifier: actor uid, role id, camera or global name.
    Ident(String),
}

impl Selector {
    pub fn is_reserved(&self) -> bool {
        matches!(self, Selector::Ident(id) if id == COLLIDER_A || id == COLLIDER_B || id == LOGICAL_SUBJECT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamBinding {
    pub name: String,
    pub kind: BindingKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
    /// Actor or role schema narrowing the binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Declared value type of a global binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<TypeExpr>,
    /// The selector was written by the author rather than implied.
    #[serde(skip)]
    pub explicit_selector: bool,
    #[serde(skip)]
    pub span: Span,
}

impl ParamBinding {
    pub fn new(name: &str, kind: BindingKind, span: Span) -> Self {
        ParamBinding {
            name: name.to_string(),
            kind,
            selector: None,
            schema: None,
            value_type: None,
            explicit_selector: false,
            span,
        }
    }

    pub fn with_selector(mut self, selector: Selector, explicit: bool) -> Self {
        self.selector = Some(selector);
        self.explicit_selector = explicit;
        self
    }

    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    pub fn ident(&self) -> Option<&str> {
        match &self.selector {
            Some(Selector::Ident(id)) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IrUnaryOp {
    #[serde(rename = "!")]
    Not,
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
}

impl From<UnaryOp> for IrUnaryOp {
    fn from(op: UnaryOp) -> Self {
        match op {
            UnaryOp::Not => IrUnaryOp::Not,
            UnaryOp::Plus => IrUnaryOp::Plus,
            UnaryOp::Minus => IrUnaryOp::Minus,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IrBinaryOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "//")]
    FloorDiv,
    #[serde(rename = "%")]
    Mod,
    #[serde(rename = "**")]
    Pow,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtE,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtE,
    #[serde(rename = "and")]
    And,
    #[serde(rename = "or")]
    Or,
}

impl From<BinaryOp> for IrBinaryOp {
    fn from(op: BinaryOp) -> Self {
        match op {
            BinaryOp::Add => IrBinaryOp::Add,
            BinaryOp::Sub => IrBinaryOp::Sub,
            BinaryOp::Mul => IrBinaryOp::Mul,
            BinaryOp::Div => IrBinaryOp::Div,
            BinaryOp::FloorDiv => IrBinaryOp::FloorDiv,
            BinaryOp::Mod => IrBinaryOp::Mod,
            BinaryOp::Pow => IrBinaryOp::Pow,
            BinaryOp::Eq => IrBinaryOp::Eq,
            BinaryOp::NotEq => IrBinaryOp::NotEq,
            BinaryOp::Lt => IrBinaryOp::Lt,
            BinaryOp::LtE => IrBinaryOp::LtE,
            BinaryOp::Gt => IrBinaryOp::Gt,
            BinaryOp::GtE => IrBinaryOp::GtE,
            BinaryOp::And => IrBinaryOp::And,
            BinaryOp::Or => IrBinaryOp::Or,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalKind {
    /// Runtime-provided helper such as `randint`.
    Builtin,
    /// Another compiled `@callable` function.
    Helper,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum IrExpr {
    Const {
        value: Value,
    },
    Var {
        name: String,
    },
    Attr {
        object: Box<IrExpr>,
        field: String,
    },
    Unary {
        op: IrUnaryOp,
        operand: Box<IrExpr>,
    },
    Binary {
        op: IrBinaryOp,
        left: Box<IrExpr>,
        right: Box<IrExpr>,
    },
    List {
        items: Vec<IrExpr>,
    },
    Object {
        entries: IndexMap<String, IrExpr>,
    },
    Index {
        object: Box<IrExpr>,
        index: Box<IrExpr>,
    },
    /// Only legal as the iterable of a `for` statement.
    Range {
        start: Box<IrExpr>,
        stop: Box<IrExpr>,
        step: Box<IrExpr>,
    },
    Call {
        func: String,
        external: ExternalKind,
        args: Vec<IrExpr>,
    },
}

impl IrExpr {
    pub fn constant(value: Value) -> Self {
        IrExpr::Const { value }
    }

    pub fn var(name: &str) -> Self {
        IrExpr::Var {
            name: name.to_string(),
        }
    }

    pub fn attr(object: IrExpr, field: &str) -> Self {
        IrExpr::Attr {
            object: Box::new(object),
            field: field.to_string(),
        }
    }

    /// Visit this expression and all sub-expressions.
    pub fn visit<F: FnMut(&IrExpr)>(&self, f: &mut F) {
        f(self);
        match self {
            IrExpr::Const { .. } | IrExpr::Var { .. } => {}
            IrExpr::Attr { object, .. } => object.visit(f),
            IrExpr::Unary { operand, .. } => operand.visit(f),
            IrExpr::Binary { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            IrExpr::List { items } => items.iter().for_each(|item| item.visit(f)),
            IrExpr::Object { entries } => entries.values().for_each(|item| item.visit(f)),
            IrExpr::Index { object, index } => {
                object.visit(f);
                index.visit(f);
            }
            IrExpr::Range { start, stop, step } => {
                start.visit(f);
                stop.visit(f);
                step.visit(f);
            }
            IrExpr::Call { args, .. } => args.iter().for_each(|arg| arg.visit(f)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum AssignTarget {
    Var { name: String },
    Attr { object: IrExpr, field: String },
    Index { object: IrExpr, index: IrExpr },
}

/// Side-effecting operations a call statement may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOp {
    // actor
    Play,
    Destroy,
    AttachedTo,
    Detached,
    // camera
    Follow,
    Detach,
    Translate,
    // scene
    EnableGravity,
    DisableGravity,
    SetInterface,
    NextTurn,
    Spawn,
    // collections
    Append,
    Update,
    Pop,
}

impl CallOp {
    pub fn name(&self) -> &'static str {
        match self {
            CallOp::Play => "play",
            CallOp::Destroy => "destroy",
            CallOp::AttachedTo => "attached_to",
            CallOp::Detached => "detached",
            CallOp::Follow => "follow",
            CallOp::Detach => "detach",
            CallOp::Translate => "translate",
            CallOp::EnableGravity => "enable_gravity",
            CallOp::DisableGravity => "disable_gravity",
            CallOp::SetInterface => "set_interface",
            CallOp::NextTurn => "next_turn",
            CallOp::Spawn => "spawn",
            CallOp::Append => "append",
            CallOp::Update => "update",
            CallOp::Pop => "pop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum IrStmt {
    Assign {
        target: AssignTarget,
        value: IrExpr,
    },
    If {
        cond: IrExpr,
        then_body: Vec<IrStmt>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        else_body: Vec<IrStmt>,
    },
    While {
        cond: IrExpr,
        body: Vec<IrStmt>,
    },
    For {
        var: String,
        iter: IrExpr,
        body: Vec<IrStmt>,
    },
    Continue,
    /// One suspension point; the operand names the Tick-bound parameter.
    Yield {
        tick: String,
    },
    Call {
        op: CallOp,
        args: Vec<IrExpr>,
    },
}

impl IrStmt {
    /// Visit statements depth first, including nested bodies.
    pub fn walk<'a, F: FnMut(&'a IrStmt)>(body: &'a [IrStmt], f: &mut F) {
        for stmt in body {
            f(stmt);
            match stmt {
                IrStmt::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    IrStmt::walk(then_body, f);
                    IrStmt::walk(else_body, f);
                }
                IrStmt::While { body, .. } | IrStmt::For { body, .. } => IrStmt::walk(body, f),
                _ => {}
            }
        }
    }

    /// Visit every expression directly held by this statement (not nested bodies).
    pub fn exprs(&self) -> Vec<&IrExpr> {
        match self {
            IrStmt::Assign { target, value } => {
                let mut out = match target {
                    AssignTarget::Var { .. } => Vec::new(),
                    AssignTarget::Attr { object, .. } => vec![object],
                    AssignTarget::Index { object, index } => vec![object, index],
                };
                out.push(value);
                out
            }
            IrStmt::If { cond, .. } | IrStmt::While { cond, .. } => vec![cond],
            IrStmt::For { iter, .. } => vec![iter],
            IrStmt::Continue | IrStmt::Yield { .. } => Vec::new(),
            IrStmt::Call { args, .. } => args.iter().collect(),
        }
    }
}

pub fn contains_yield(body: &[IrStmt]) -> bool {
    let mut found = false;
    IrStmt::walk(body, &mut |stmt| {
        if matches!(stmt, IrStmt::Yield { .. }) {
            found = true;
        }
    });
    found
}

pub fn contains_op(body: &[IrStmt], op: CallOp) -> bool {
    let mut found = false;
    IrStmt::walk(body, &mut |stmt| {
        if matches!(stmt, IrStmt::Call { op: o, .. } if *o == op) {
            found = true;
        }
    });
    found
}

/// Names of compiled helpers called anywhere in a body or expression list.
pub fn helper_calls(body: &[IrStmt], extra: &[&IrExpr]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut collect = |expr: &IrExpr| {
        if let IrExpr::Call {
            func,
            external: ExternalKind::Helper,
            ..
        } = expr
        {
            if !names.contains(func) {
                names.push(func.clone());
            }
        }
    };
    IrStmt::walk(body, &mut |stmt| {
        for expr in stmt.exprs() {
            expr.visit(&mut collect);
        }
    });
    for expr in extra {
        expr.visit(&mut collect);
    }
    names
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionIr {
    pub name: String,
    pub params: Vec<ParamBinding>,
    pub body: Vec<IrStmt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip)]
    pub span: Span,
}

impl ActionIr {
    /// Actions containing `yield` are generated as resumable state machines.
    pub fn is_coroutine(&self) -> bool {
        contains_yield(&self.body)
    }
}

/// Positional argument of a helper, passed by the caller rather than bound from context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeExpr,
}

/// A function returning a value: predicates return a boolean, callables any value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredicateIr {
    pub name: String,
    /// Always empty for predicates.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ValueParam>,
    pub params: Vec<ParamBinding>,
    /// Local computation that runs before the terminal return.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<IrStmt>,
    pub result: IrExpr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip)]
    pub span: Span,
}

pub type CallableIr = PredicateIr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputPhase {
    Begin,
    On,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionMode {
    Overlap,
    Contact,
}

/// Actor reference inside a condition: a schema, a specific instance, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionSpec {
    Keyboard {
        key: String,
        phase: InputPhase,
        role: String,
    },
    Mouse {
        button: String,
        phase: InputPhase,
        role: String,
    },
    Button {
        button: String,
        phase: InputPhase,
        role: String,
    },
    Collision {
        a: ActorRef,
        b: ActorRef,
        mode: CollisionMode,
    },
    Logical {
        predicate: String,
        target: ActorRef,
    },
    Tool {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        role: String,
    },
}

impl ConditionSpec {
    pub fn is_collision(&self) -> bool {
        matches!(self, ConditionSpec::Collision { .. })
    }

    /// Role id this condition is scoped to, if any.
    pub fn role(&self) -> Option<&str> {
        match self {
            ConditionSpec::Keyboard { role, .. }
            | ConditionSpec::Mouse { role, .. }
            | ConditionSpec::Button { role, .. }
            | ConditionSpec::Tool { role, .. } => Some(role),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleSpec {
    pub condition: ConditionSpec,
    pub action: String,
    #[serde(skip)]
    pub span: Span,
}

/// The IR document: every compiled function that survived pruning.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IrDocument {
    pub actions: IndexMap<String, ActionIr>,
    pub predicates: IndexMap<String, PredicateIr>,
    pub callables: IndexMap<String, CallableIr>,
}

#[cfg(test)]
#[path = "ir_tests.rs"]
mod tests;
