// Static setup expander tests

#[cfg(test)]
mod expander_tests {
    use crate::stage_compiler::config::CompilerConfig;
    use crate::stage_compiler::error::CompilerError;
    use crate::stage_compiler::expander::SetupExpander;
    use crate::stage_compiler::parser::parse_source;
    use crate::stage_compiler::syntax::*;
    use crate::stage_compiler::value::{Env, Value};
    use test_log::test;

    fn expand_with(src: &str, config: &CompilerConfig) -> Result<(Module, Env), CompilerError> {
        SetupExpander::new(config).expand(parse_source(src).unwrap())
    }

    fn expand(src: &str) -> (Module, Env) {
        expand_with(src, &CompilerConfig::default()).unwrap()
    }

    /// First positional argument of each `add(...)` call, evaluated.
    fn added_values(module: &Module) -> Vec<Value> {
        module
            .body
            .iter()
            .filter_map(|stmt| stmt.as_call())
            .filter(|(func, _, _)| func.as_name() == Some("add"))
            .filter_map(|(_, args, _)| Value::from_literal(&args[0]))
            .collect()
    }

    #[test]
    fn test_for_loop_unrolled_with_substitution() {
        let (module, env) = expand("for i in range(3):\n    add(\"coin_\" + str(i * 10))\n");
        assert_eq!(
            added_values(&module),
            vec![
                Value::Str("coin_0".into()),
                Value::Str("coin_10".into()),
                Value::Str("coin_20".into()),
            ]
        );
        // loop variable does not leak
        assert!(!env.contains_key("i"));
    }

    #[test]
    fn test_loop_variable_restored() {
        let (module, env) = expand("i = 7\nfor i in [1, 2]:\n    add(i)\nadd(i)\n");
        assert_eq!(
            added_values(&module),
            vec![Value::Int(1), Value::Int(2), Value::Int(7)]
        );
        assert_eq!(env.get("i"), Some(&Value::Int(7)));
    }

    #[test]
    fn test_if_takes_one_branch() {
        let src = "hard = True\nif hard and 2 > 1:\n    add(\"boss\")\nelse:\n    add(\"slime\")\n";
        let (module, _) = expand(src);
        assert_eq!(added_values(&module), vec![Value::Str("boss".into())]);
    }

    #[test]
    fn test_while_with_else() {
        let src = "n = 0\nwhile n < 3:\n    add(n)\n    n += 1\nelse:\n    add(\"done\")\n";
        let (module, env) = expand(src);
        assert_eq!(
            added_values(&module),
            vec![
                Value::Int(0),
                Value::Int(1),
                Value::Int(2),
                Value::Str("done".into())
            ]
        );
        assert_eq!(env.get("n"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_tuple_unpacking() {
        let (module, _) = expand("for name, x in [(\"a\", 1), (\"b\", 2)]:\n    add(name + str(x))\n");
        assert_eq!(
            added_values(&module),
            vec![Value::Str("a1".into()), Value::Str("b2".into())]
        );
    }

    #[test]
    fn test_mutators_tracked() {
        let src = "xs = [1]\nxs.append(2)\nxs.extend([3, 4])\nxs.pop(0)\ncfg = {}\ncfg.update({\"speed\": 2})\n";
        let (module, env) = expand(src);
        assert_eq!(
            env.get("xs"),
            Some(&Value::List(vec![Value::Int(2), Value::Int(3), Value::Int(4)]))
        );
        assert_eq!(
            env.get("cfg").and_then(|v| match v {
                Value::Dict(d) => d.get("speed").cloned(),
                _ => None,
            }),
            Some(Value::Int(2))
        );
        // receivers of tracked calls keep their names
        let (func, _, _) = module.body[1].as_call().unwrap();
        assert_eq!(func.dotted_path().as_deref(), Some("xs.append"));
    }

    #[test]
    fn test_subscript_store_keeps_its_receiver() {
        let (module, env) = expand("cfg = {\"a\": 0}\nk = \"a\"\ncfg[k] = 1\n");
        match &module.body[2].kind {
            StmtKind::Assign { target, .. } => match &target.kind {
                ExprKind::Subscript { value, index } => {
                    assert_eq!(value.as_name(), Some("cfg"));
                    assert_eq!(Value::from_literal(index), Some(Value::Str("a".into())));
                }
                other => panic!("Expected subscript target, got {:?}", other),
            },
            other => panic!("Expected assignment, got {:?}", other),
        }
        assert_eq!(
            env.get("cfg").and_then(|v| match v {
                Value::Dict(d) => d.get("a").cloned(),
                _ => None,
            }),
            Some(Value::Int(1))
        );
    }

    #[test]
    fn test_unknown_values_drop_binding() {
        let (_, env) = expand("hero = 1\nhero = Player(\"hero\")\nlevel = 2\nlevel.reset()\n");
        assert!(!env.contains_key("hero"));
        assert!(!env.contains_key("level"));
    }

    #[test]
    fn test_definitions_pass_through_and_clear_names() {
        let (module, env) = expand("jump = 1\ndef jump(p: Player):\n    p.y -= jump_height\n");
        assert!(!env.contains_key("jump"));
        match &module.body[1].kind {
            StmtKind::FunctionDef(def) => {
                assert_eq!(def.name, "jump");
                // bodies are not expanded
                assert_eq!(def.body.len(), 1);
            }
            other => panic!("Expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_dynamic_condition_is_an_error() {
        let err = expand_with("if player.alive:\n    add(1)\n", &CompilerConfig::default()).unwrap_err();
        assert!(matches!(err, CompilerError::ExpansionError(_, _)));
        assert_eq!(err.span().map(|s| s.line), Some(1));
    }

    #[test]
    fn test_iteration_cap() {
        let config = CompilerConfig {
            max_loop_iterations: 5,
            ..CompilerConfig::default()
        };
        assert!(expand_with("for i in range(6):\n    add(i)\n", &config).is_err());
        assert!(expand_with("n = 0\nwhile True:\n    n += 1\n", &config).is_err());
        assert!(expand_with("for i in range(5):\n    add(i)\n", &config).is_ok());
    }

    #[test]
    fn test_huge_ranges_are_refused_before_they_are_built() {
        let err = expand_with("for i in range(10 ** 10):\n    add(i)\n", &CompilerConfig::default()).unwrap_err();
        assert!(matches!(err, CompilerError::ExpansionError(_, _)), "{:?}", err);
        assert!(err.message().contains("10000000000"), "{}", err);

        // bound through eval_static rather than a loop
        let (_, env) = expand("x = range(10 ** 10)\n");
        assert!(!env.contains_key("x"));
    }

    #[test]
    fn test_range_near_the_integer_limit() {
        let (module, _) = expand("for i in range(9223372036854775806, 9223372036854775807, 5):\n    add(i)\n");
        assert_eq!(added_values(&module), vec![Value::Int(i64::MAX - 1)]);
    }

    #[test]
    fn test_statement_budget() {
        let config = CompilerConfig {
            max_expanded_statements: 10,
            ..CompilerConfig::default()
        };
        let err = expand_with("for i in range(4):\n    for j in range(4):\n        add(i + j)\n", &config)
            .unwrap_err();
        assert!(err.message().contains("more than 10 statements"));
    }
}
