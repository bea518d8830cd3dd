// Parser tests for the host surface syntax

#[cfg(test)]
mod parser_tests {
    use crate::stage_compiler::error::CompilerError;
    use crate::stage_compiler::parser::parse_source;
    use crate::stage_compiler::syntax::*;
    use test_log::test;

    fn parse_ok(input: &str) -> Module {
        parse_source(input).unwrap()
    }

    fn single_expr(input: &str) -> Expr {
        let module = parse_ok(input);
        match module.body.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Expr(expr)) => expr,
            other => panic!("Expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_module() {
        assert!(parse_ok("").body.is_empty());
        assert!(parse_ok("\n\n# nothing\n").body.is_empty());
    }

    #[test]
    fn test_imports() {
        let module = parse_ok("import game.dsl\nfrom stagehand import Actor, Role\nfrom x import *\n");
        assert_eq!(module.body.len(), 3);
        assert_eq!(
            module.body[0].kind,
            StmtKind::Import(vec!["game.dsl".to_string()])
        );
        match &module.body[1].kind {
            StmtKind::ImportFrom { module, names } => {
                assert_eq!(module, "stagehand");
                assert_eq!(names, &vec!["Actor".to_string(), "Role".to_string()]);
            }
            other => panic!("Expected from-import, got {:?}", other),
        }
        assert!(module.body.iter().all(Stmt::is_import));
    }

    #[test]
    fn test_decorated_function() {
        let input = r#"
@condition(KeyboardCondition.on_press("d", Role["human_1"]))
def move_right(player: Player["hero"], speed: Global["speed", float]) -> None:
    """Moves the hero right."""
    player.x += speed
"#;
        let module = parse_ok(input);
        let def = match &module.body[0].kind {
            StmtKind::FunctionDef(def) => def,
            other => panic!("Expected function, got {:?}", other),
        };
        assert_eq!(def.name, "move_right");
        assert_eq!(def.decorators.len(), 1);
        assert_eq!(def.params.len(), 2);
        assert_eq!(def.params[0].name, "player");
        assert!(def.returns.is_some());
        assert_eq!(docstring(&def.body), Some("Moves the hero right."));
        match &def.params[1].annotation.as_ref().unwrap().kind {
            ExprKind::Subscript { index, .. } => {
                assert!(matches!(index.kind, ExprKind::Tuple(ref items) if items.len() == 2));
            }
            other => panic!("Expected subscript annotation, got {:?}", other),
        }
        assert!(matches!(
            def.body[1].kind,
            StmtKind::AugAssign {
                op: BinaryOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn test_class_with_fields() {
        let module = parse_ok("class Player(Actor):\n    hp: int = 3\n    tag: str\n");
        match &module.body[0].kind {
            StmtKind::ClassDef(class) => {
                assert_eq!(class.name, "Player");
                assert_eq!(class.bases[0].as_name(), Some("Actor"));
                assert_eq!(class.body.len(), 2);
                assert!(matches!(
                    class.body[1].kind,
                    StmtKind::AnnAssign { value: None, .. }
                ));
            }
            other => panic!("Expected class, got {:?}", other),
        }
    }

    #[test]
    fn test_if_elif_else_chain() {
        let module = parse_ok("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
        match &module.body[0].kind {
            StmtKind::If { orelse, .. } => {
                assert_eq!(orelse.len(), 1);
                match &orelse[0].kind {
                    StmtKind::If { orelse, .. } => assert_eq!(orelse.len(), 1),
                    other => panic!("Expected nested if for elif, got {:?}", other),
                }
            }
            other => panic!("Expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_for_with_else_and_tuple_target() {
        let module = parse_ok("for i, j in pairs:\n    pass\nelse:\n    done = True\n");
        match &module.body[0].kind {
            StmtKind::For { target, orelse, .. } => {
                assert!(matches!(target.kind, ExprKind::Tuple(ref t) if t.len() == 2));
                assert_eq!(orelse.len(), 1);
            }
            other => panic!("Expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_one_line_block() {
        let module = parse_ok("while n > 0: n -= 1\n");
        match &module.body[0].kind {
            StmtKind::While { body, .. } => assert_eq!(body.len(), 1),
            other => panic!("Expected while, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        // a + b * c ** 2  ==  a + (b * (c ** 2))
        let expr = single_expr("a + b * c ** 2\n");
        match expr.kind {
            ExprKind::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => match right.kind {
                ExprKind::Binary {
                    op: BinaryOp::Mul,
                    right,
                    ..
                } => assert!(matches!(
                    right.kind,
                    ExprKind::Binary {
                        op: BinaryOp::Pow,
                        ..
                    }
                )),
                other => panic!("Expected multiplication, got {:?}", other),
            },
            other => panic!("Expected addition, got {:?}", other),
        }
    }

    #[test]
    fn test_boolean_precedence() {
        let expr = single_expr("not a or b and c\n");
        match expr.kind {
            ExprKind::Binary {
                left,
                op: BinaryOp::Or,
                right,
            } => {
                assert!(matches!(
                    left.kind,
                    ExprKind::Unary {
                        op: UnaryOp::Not,
                        ..
                    }
                ));
                assert!(matches!(
                    right.kind,
                    ExprKind::Binary {
                        op: BinaryOp::And,
                        ..
                    }
                ));
            }
            other => panic!("Expected or, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_literal_helper() {
        let expr = single_expr("-3\n");
        assert_eq!(expr.as_int(), Some(-3));
    }

    #[test]
    fn test_call_with_keywords() {
        let expr = single_expr("game.add_actor(Player(\"hero\", x=1.0, y=2))\n");
        let (func, args) = match expr.kind {
            ExprKind::Call { func, args, .. } => (func, args),
            other => panic!("Expected call, got {:?}", other),
        };
        assert_eq!(func.dotted_path().as_deref(), Some("game.add_actor"));
        match &args[0].kind {
            ExprKind::Call { args, keywords, .. } => {
                assert_eq!(args.len(), 1);
                assert_eq!(keywords.len(), 2);
                assert!(Keyword::find(keywords, "y").is_some());
            }
            other => panic!("Expected inner call, got {:?}", other),
        }
    }

    #[test]
    fn test_collection_literals() {
        let expr = single_expr("[1, (2, 3), {\"a\": [], \"b\": ()}]\n");
        match expr.kind {
            ExprKind::List(items) => {
                assert_eq!(items.len(), 3);
                assert!(matches!(items[1].kind, ExprKind::Tuple(_)));
                assert!(matches!(items[2].kind, ExprKind::Dict(ref d) if d.len() == 2));
            }
            other => panic!("Expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_spans_are_recorded() {
        let module = parse_ok("x = 1\n\ny = x + 2\n");
        assert_eq!(module.body[1].span.line, 3);
        match &module.body[1].kind {
            StmtKind::Assign { value, .. } => assert_eq!(value.span.column, 5),
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_break_rejected() {
        let err = parse_source("while True:\n    break\n").unwrap_err();
        assert!(matches!(err, CompilerError::UnsupportedSyntax(_, _)));
        assert_eq!(err.span().map(|s| s.line), Some(2));
    }

    #[test]
    fn test_chained_comparison_rejected() {
        let err = parse_source("ok = 0 < x < 10\n").unwrap_err();
        assert!(err.message().contains("chained comparisons"));
    }

    #[test]
    fn test_lambda_and_comprehension_rejected() {
        assert!(matches!(
            parse_source("f = lambda: 1\n"),
            Err(CompilerError::UnsupportedSyntax(_, _))
        ));
        assert!(matches!(
            parse_source("xs = [i for i in ys]\n"),
            Err(CompilerError::UnsupportedSyntax(_, _))
        ));
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(matches!(
            parse_source("f() = 3\n"),
            Err(CompilerError::SyntaxError(_, _))
        ));
    }

    #[test]
    fn test_missing_colon() {
        match parse_source("def f()\n    pass\n") {
            Err(CompilerError::ExpectedToken(expected, _, span)) => {
                assert!(expected.contains("':'"));
                assert_eq!(span.line, 1);
            }
            other => panic!("Expected missing colon error, got {:?}", other),
        }
    }
}
