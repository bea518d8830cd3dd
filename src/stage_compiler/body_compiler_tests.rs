// Body compiler tests

#[cfg(test)]
mod body_compiler_tests {
    use crate::stage_compiler::body_compiler::*;
    use crate::stage_compiler::error::CompilerError;
    use crate::stage_compiler::ir::*;
    use crate::stage_compiler::parser::parse_source;
    use crate::stage_compiler::schema::{Schema, SchemaRegistry};
    use crate::stage_compiler::syntax::StmtKind;
    use crate::stage_compiler::value::{Env, Value};
    use indexmap::IndexMap;
    use test_log::test;

    const SCHEMAS: &str = "\
class Player(Actor):
    hp: int = 3
    speed: float = 2.0
class Coin(Actor):
    value: int = 1
class Pilot(Role):
    score: int
    zoom: Local[float] = 1.0
";

    fn compile_as(src: &str, kind: FunctionKind) -> Result<CompiledFunction, CompilerError> {
        let module = parse_source(&format!("{}{}", SCHEMAS, src)).unwrap();
        let mut registry = SchemaRegistry::new();
        let mut def = None;
        for stmt in &module.body {
            match &stmt.kind {
                StmtKind::ClassDef(class) => registry
                    .register(Schema::from_class(class, stmt.span, &Env::new()).unwrap())
                    .unwrap(),
                StmtKind::FunctionDef(f) => def = Some((f.clone(), stmt.span)),
                _ => {}
            }
        }
        let mut constants = Env::new();
        constants.insert("JUMP".to_string(), Value::Int(12));
        let mut helpers = IndexMap::new();
        helpers.insert("clamp".to_string(), 1);
        let ctx = BodyContext {
            schemas: &registry,
            constants: &constants,
            helpers: &helpers,
        };
        let (def, span) = def.expect("test source has a function");
        BodyCompiler::new(ctx, kind).compile(&def, span)
    }

    fn action(src: &str) -> ActionIr {
        match compile_as(src, FunctionKind::Action) {
            Ok(CompiledFunction::Action(action)) => action,
            other => panic!("Expected action, got {:?}", other),
        }
    }

    fn action_err(src: &str) -> CompilerError {
        compile_as(src, FunctionKind::Action).unwrap_err()
    }

    #[test]
    fn test_field_update_and_constants() {
        let a = action("def jump(p: Player):\n    \"\"\"Jump up.\"\"\"\n    p.y -= JUMP\n");
        assert_eq!(a.description.as_deref(), Some("Jump up."));
        assert_eq!(a.params[0].kind, BindingKind::Actor);
        match &a.body[0] {
            IrStmt::Assign {
                target: AssignTarget::Attr { field, .. },
                value: IrExpr::Binary { op, right, .. },
            } => {
                assert_eq!(field, "y");
                assert_eq!(*op, IrBinaryOp::Sub);
                assert_eq!(**right, IrExpr::constant(Value::Int(12)));
            }
            other => panic!("Expected field update, got {:?}", other),
        }
    }

    #[test]
    fn test_field_access_is_checked() {
        assert!(matches!(
            action_err("def f(p: Player):\n    p.mana = 1\n"),
            CompilerError::UndefinedSymbol(_, _)
        ));
        assert!(action_err("def f(p: Actor[0]):\n    p.x = 1\n")
            .message()
            .contains("untyped actor"));
        assert!(action_err("def f(p: Player):\n    p.uid = \"x\"\n")
            .message()
            .contains("read-only"));
        assert!(matches!(
            action_err("def f(p: Player):\n    p.hp = \"lots\"\n"),
            CompilerError::TypeMismatch(_, _, _)
        ));
        // ints widen into float fields
        action("def f(p: Player):\n    p.speed = 3\n");
    }

    #[test]
    fn test_camera_scene_and_tick_fields() {
        action("def f(c: Camera[\"main\"], s: Scene, p: Player):\n    p.x = c.zoom + s.elapsed\n");
        assert!(action_err("def f(c: Camera[\"main\"]):\n    c.zoom = 2\n")
            .message()
            .contains("read-only"));
        assert!(matches!(
            action_err("def f(c: Camera[\"main\"]):\n    c.angle\n"),
            CompilerError::UnsupportedSyntax(_, _)
        ));
        assert!(action_err("def f(t: Tick, p: Player):\n    p.x = t.frame\n")
            .message()
            .contains("only exposes 'elapsed'"));
    }

    #[test]
    fn test_role_local_fields_are_client_only() {
        action("def f(r: Pilot[\"p1\"]):\n    r.score += 1\n");
        assert!(action_err("def f(r: Pilot[\"p1\"]):\n    r.zoom = 2.0\n")
            .message()
            .contains("client-local"));
    }

    #[test]
    fn test_alias_propagation() {
        let a = action("def f(p: Player):\n    q = p\n    q.hp = 1\n    q = 5\n");
        assert_eq!(a.body.len(), 3);
        assert!(action_err("def f(p: Player):\n    q = p\n    q = 5\n    q.hp = 1\n")
            .message()
            .contains("no declared type"));
    }

    #[test]
    fn test_method_dispatch_by_receiver() {
        let a = action(
            "def f(p: Player, c: Camera[\"main\"], s: Scene, score: Global[\"log\"]):\n    p.play(\"run\")\n    c.follow(p)\n    s.enable_gravity()\n    score.append(1)\n    Scene.next_turn(s)\n",
        );
        let ops: Vec<CallOp> = a
            .body
            .iter()
            .filter_map(|s| match s {
                IrStmt::Call { op, .. } => Some(*op),
                _ => None,
            })
            .collect();
        assert_eq!(
            ops,
            vec![
                CallOp::Play,
                CallOp::Follow,
                CallOp::EnableGravity,
                CallOp::Append,
                CallOp::NextTurn
            ]
        );
        // follow resolves the actor to its uid
        match &a.body[1] {
            IrStmt::Call { args, .. } => assert_eq!(args[1], IrExpr::attr(IrExpr::var("p"), "uid")),
            other => panic!("Expected call, got {:?}", other),
        }
        assert!(action_err("def f(p: Player):\n    p.follow(p)\n")
            .message()
            .contains("actor has no method 'follow'"));
        assert!(action_err("def f(n: Global[\"n\", int]):\n    n.append(1)\n")
            .message()
            .contains("no method 'append'"));
    }

    #[test]
    fn test_list_fields_take_collection_methods() {
        let a = action(
            "class Fighter(Actor):\n    log: List[str] = []\ndef f(me: Fighter):\n    me.log.append(\"hit\")\n",
        );
        match &a.body[0] {
            IrStmt::Call { op, args } => {
                assert_eq!(*op, CallOp::Append);
                assert_eq!(args[0], IrExpr::attr(IrExpr::var("me"), "log"));
            }
            other => panic!("Expected append, got {:?}", other),
        }
        assert!(action_err("def f(p: Player):\n    p.hp.append(1)\n")
            .message()
            .contains("cannot call 'append'"));
    }

    #[test]
    fn test_attached_to_resolution() {
        let a = action("def f(p: Player):\n    p.attached_to(Coin[\"c1\"])\n    p.attached_to(\"c2\")\n");
        match &a.body[0] {
            IrStmt::Call { op, args } => {
                assert_eq!(*op, CallOp::AttachedTo);
                assert_eq!(args[1], IrExpr::constant(Value::Str("c1".into())));
            }
            other => panic!("Expected call, got {:?}", other),
        }
        assert!(action_err("def f(p: Player):\n    p.attached_to(Coin[0])\n")
            .message()
            .contains("must name a uid"));
        assert!(action_err("def f(p: Player, q: Actor[1]):\n    p.attached_to(q)\n")
            .message()
            .contains("cannot resolve"));
    }

    #[test]
    fn test_spawn_through_template_variable() {
        let a = action(
            "def f(s: Scene, p: Player):\n    c = Coin(\"c9\", x=p.x, value=5, parent=p)\n    s.spawn(c)\n",
        );
        assert_eq!(a.body.len(), 1);
        match &a.body[0] {
            IrStmt::Call {
                op: CallOp::Spawn,
                args,
            } => {
                assert_eq!(args[1], IrExpr::constant(Value::Str("Coin".into())));
                assert_eq!(args[2], IrExpr::constant(Value::Str("c9".into())));
                match &args[3] {
                    IrExpr::Object { entries } => {
                        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["x", "value", "parent"]);
                        assert_eq!(entries["parent"], IrExpr::attr(IrExpr::var("p"), "uid"));
                    }
                    other => panic!("Expected fields, got {:?}", other),
                }
            }
            other => panic!("Expected spawn, got {:?}", other),
        }
        assert!(matches!(
            action_err("def f(s: Scene):\n    s.spawn(Coin(\"c\", colour=1))\n"),
            CompilerError::UndefinedSymbol(_, _)
        ));
        assert!(action_err("def f(s: Scene):\n    c = Coin(\"c\")\n    x = c\n    y = c + 1\n")
            .message()
            .contains("only be passed to spawn()"));
    }

    #[test]
    fn test_range_loops() {
        let a = action("def f(p: Player):\n    for i in range(10, 0, -1):\n        p.x += i\n");
        match &a.body[0] {
            IrStmt::For {
                var,
                iter: IrExpr::Range { start, stop, step },
                ..
            } => {
                assert_eq!(var, "i");
                assert_eq!(**start, IrExpr::constant(Value::Int(10)));
                assert_eq!(**stop, IrExpr::constant(Value::Int(0)));
                assert_eq!(**step, IrExpr::constant(Value::Int(-1)));
            }
            other => panic!("Expected range loop, got {:?}", other),
        }
        assert!(action_err("def f(p: Player):\n    n = range(3)\n")
            .message()
            .contains("only allowed as the iterable"));
        assert!(action_err("def f(p: Player):\n    for i in range(0, 3, 0):\n        pass\n")
            .message()
            .contains("must not be zero"));
    }

    #[test]
    fn test_actor_list_loop_variables_are_typed() {
        let a = action("def f(coins: List[Coin]):\n    for c in coins:\n        c.value += 1\n    coins[0].value = 2\n");
        assert_eq!(a.body.len(), 2);
        assert!(action_err("def f(all: List[Actor]):\n    for a in all:\n        a.x = 1\n")
            .message()
            .contains("untyped"));
    }

    #[test]
    fn test_loop_else_runs_after_loop() {
        let a = action("def f(n: Global[\"n\", int]):\n    while n < 3:\n        n += 1\n    else:\n        n = 0\n");
        assert!(matches!(a.body[0], IrStmt::While { .. }));
        assert!(matches!(a.body[1], IrStmt::Assign { .. }));
    }

    #[test]
    fn test_continue_and_yield_rules() {
        assert!(action_err("def f(p: Player):\n    continue\n")
            .message()
            .contains("outside of a loop"));
        let a = action("def f(p: Player, t: Tick):\n    while p.x < 10:\n        p.x += 1\n        yield t\n");
        assert!(a.is_coroutine());
        assert!(matches!(
            action_err("def f(p: Player):\n    yield p\n"),
            CompilerError::BindingError(_, _)
        ));
    }

    #[test]
    fn test_parameters_are_not_rebindable() {
        assert!(action_err("def f(p: Player, q: Player[1]):\n    p = q\n")
            .message()
            .contains("cannot reassign actor parameter"));
        assert!(matches!(
            action_err("def f(n: Global[\"n\", int]):\n    n = \"x\"\n"),
            CompilerError::TypeMismatch(_, _, _)
        ));
    }

    #[test]
    fn test_calls() {
        let a = action("def f(p: Player):\n    p.x = randint(0, 10) + clamp(p.y)\n");
        let mut externals = Vec::new();
        for stmt in &a.body {
            for expr in stmt.exprs() {
                expr.visit(&mut |e| {
                    if let IrExpr::Call { func, external, .. } = e {
                        externals.push((func.clone(), *external));
                    }
                });
            }
        }
        assert_eq!(
            externals,
            vec![
                ("randint".to_string(), ExternalKind::Builtin),
                ("clamp".to_string(), ExternalKind::Helper)
            ]
        );
        assert!(action_err("def f(p: Player):\n    p.x = randint(1)\n")
            .message()
            .contains("randint() takes 2 arguments, 1 given"));
        assert!(action_err("def f(p: Player):\n    clamp(1)\n")
            .message()
            .contains("discarded"));
        assert!(matches!(
            action_err("def f(p: Player):\n    p.x = teleport()\n"),
            CompilerError::UndefinedSymbol(_, _)
        ));
        assert!(action_err("def f(p: Player):\n    return 1\n")
            .message()
            .contains("cannot return"));
    }

    #[test]
    fn test_predicates() {
        let compiled = compile_as(
            "def low(p: Player):\n    limit = 2\n    return p.hp < limit\n",
            FunctionKind::Predicate,
        )
        .unwrap();
        match compiled {
            CompiledFunction::Predicate(pred) => {
                assert_eq!(pred.body.len(), 1);
                assert!(matches!(pred.result, IrExpr::Binary { op: IrBinaryOp::Lt, .. }));
            }
            other => panic!("Expected predicate, got {:?}", other),
        }
        let read_only = compile_as("def low(p: Player):\n    p.hp = 1\n    return True\n", FunctionKind::Predicate)
            .unwrap_err();
        assert!(read_only.message().contains("read-only"));
        let effect = compile_as("def low(p: Player):\n    p.play(\"x\")\n    return True\n", FunctionKind::Predicate)
            .unwrap_err();
        assert!(effect.message().contains("read-only"));
        let early = compile_as(
            "def low(p: Player):\n    if p.hp < 1:\n        return True\n    return False\n",
            FunctionKind::Predicate,
        )
        .unwrap_err();
        assert!(early.message().contains("may only return once"));
    }

    #[test]
    fn test_callables_take_value_arguments() {
        let compiled = compile_as(
            "def clamp(v: float, p: Player):\n    return min(v, p.speed)\n",
            FunctionKind::Callable,
        )
        .unwrap();
        match compiled {
            CompiledFunction::Callable(helper) => {
                assert_eq!(helper.args.len(), 1);
                assert_eq!(helper.args[0].name, "v");
                assert_eq!(helper.params.len(), 1);
            }
            other => panic!("Expected callable, got {:?}", other),
        }
        assert!(compile_as("def h(t: Tick):\n    yield t\n    return 1\n", FunctionKind::Callable)
            .unwrap_err()
            .message()
            .contains("cannot yield"));
        assert!(compile_as("def h(p: Player):\n    p.x = 1\n", FunctionKind::Callable)
            .unwrap_err()
            .message()
            .contains("must end with a single 'return"));
    }
}
