// IR structure and serialization tests

#[cfg(test)]
mod ir_tests {
    use crate::stage_compiler::error::Span;
    use crate::stage_compiler::ir::*;
    use crate::stage_compiler::value::Value;
    use test_log::test;

    fn tick_action(body: Vec<IrStmt>) -> ActionIr {
        ActionIr {
            name: "blink".to_string(),
            params: vec![ParamBinding::new("t", BindingKind::Tick, Span::unknown())],
            body,
            description: None,
            span: Span::unknown(),
        }
    }

    #[test]
    fn test_yield_detected_in_nested_bodies() {
        let nested = IrStmt::While {
            cond: IrExpr::constant(Value::Bool(true)),
            body: vec![IrStmt::If {
                cond: IrExpr::var("x"),
                then_body: vec![IrStmt::Yield {
                    tick: "t".to_string(),
                }],
                else_body: vec![],
            }],
        };
        assert!(tick_action(vec![nested]).is_coroutine());
        assert!(!tick_action(vec![IrStmt::Continue]).is_coroutine());
    }

    #[test]
    fn test_contains_op_searches_recursively() {
        let body = vec![IrStmt::For {
            var: "i".to_string(),
            iter: IrExpr::var("xs"),
            body: vec![IrStmt::Call {
                op: CallOp::NextTurn,
                args: vec![IrExpr::var("scene")],
            }],
        }];
        assert!(contains_op(&body, CallOp::NextTurn));
        assert!(!contains_op(&body, CallOp::Spawn));
    }

    #[test]
    fn test_helper_calls_are_collected_once() {
        let call = IrExpr::Call {
            func: "distance".to_string(),
            external: ExternalKind::Helper,
            args: vec![],
        };
        let random = IrExpr::Call {
            func: "random".to_string(),
            external: ExternalKind::Builtin,
            args: vec![],
        };
        let body = vec![IrStmt::Assign {
            target: AssignTarget::Var {
                name: "d".to_string(),
            },
            value: IrExpr::Binary {
                op: IrBinaryOp::Add,
                left: Box::new(call.clone()),
                right: Box::new(random),
            },
        }];
        assert_eq!(helper_calls(&body, &[&call]), vec!["distance".to_string()]);
    }

    #[test]
    fn test_serialized_shapes() {
        let stmt = IrStmt::Assign {
            target: AssignTarget::Attr {
                object: IrExpr::var("p"),
                field: "x".to_string(),
            },
            value: IrExpr::Binary {
                op: IrBinaryOp::Add,
                left: Box::new(IrExpr::attr(IrExpr::var("p"), "x")),
                right: Box::new(IrExpr::constant(Value::Int(1))),
            },
        };
        let json = serde_json::to_value(&stmt).unwrap();
        assert_eq!(json["stmt"], "assign");
        assert_eq!(json["target"]["target"], "attr");
        assert_eq!(json["value"]["op"], "+");
        assert_eq!(json["value"]["right"]["value"], 1);

        let binding = ParamBinding::new("hero", BindingKind::Actor, Span::unknown())
            .with_selector(Selector::Index(-1), true);
        let json = serde_json::to_value(&binding).unwrap();
        assert_eq!(json["kind"], "actor");
        assert_eq!(json["selector"]["index"], -1);
        assert!(json.get("explicit_selector").is_none());
    }

    #[test]
    fn test_reserved_selectors() {
        assert!(Selector::Ident(COLLIDER_A.to_string()).is_reserved());
        assert!(!Selector::Ident("hero".to_string()).is_reserved());
        assert!(!Selector::Index(0).is_reserved());
    }
}
