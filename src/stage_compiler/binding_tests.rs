// Parameter binding tests

#[cfg(test)]
mod binding_tests {
    use crate::stage_compiler::binding::*;
    use crate::stage_compiler::error::CompilerError;
    use crate::stage_compiler::ir::{BindingKind, ParamBinding, Selector};
    use crate::stage_compiler::parser::parse_source;
    use crate::stage_compiler::schema::{Schema, SchemaRegistry, TypeExpr};
    use crate::stage_compiler::syntax::{Expr, StmtKind};
    use crate::stage_compiler::value::Env;
    use test_log::test;

    fn registry() -> SchemaRegistry {
        let module = parse_source(
            "class Player(Actor):\n    hp: int\nclass Coin(Actor):\n    pass\nclass Pilot(Role):\n    score: int\n",
        )
        .unwrap();
        let mut registry = SchemaRegistry::new();
        for stmt in &module.body {
            if let StmtKind::ClassDef(class) = &stmt.kind {
                registry
                    .register(Schema::from_class(class, stmt.span, &Env::new()).unwrap())
                    .unwrap();
            }
        }
        registry
    }

    fn bind(annotation: &str) -> Result<ParamBinding, CompilerError> {
        let module = parse_source(&format!("def f(p: {}):\n    pass\n", annotation)).unwrap();
        match &module.body[0].kind {
            StmtKind::FunctionDef(def) => classify_param(&def.params[0], &registry()),
            other => panic!("Expected function, got {:?}", other),
        }
    }

    fn expr(src: &str) -> Expr {
        let module = parse_source(src).unwrap();
        match module.body.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Expr(e)) => e,
            other => panic!("Expected expression, got {:?}", other),
        }
    }

    #[test]
    fn test_keywords_have_no_selector() {
        let scene = bind("Scene").unwrap();
        assert_eq!(scene.kind, BindingKind::Scene);
        assert_eq!(scene.selector, None);
        assert_eq!(bind("Tick").unwrap().kind, BindingKind::Tick);
    }

    #[test]
    fn test_bare_schema_selects_type_name() {
        let binding = bind("Player").unwrap();
        assert_eq!(binding.kind, BindingKind::Actor);
        assert_eq!(binding.schema.as_deref(), Some("Player"));
        assert_eq!(binding.selector, Some(Selector::Ident("Player".to_string())));
        assert!(!binding.explicit_selector);

        let role = bind("Pilot").unwrap();
        assert_eq!(role.kind, BindingKind::Role);
        assert_eq!(role.selector, Some(Selector::Ident("Pilot".to_string())));
    }

    #[test]
    fn test_actor_selectors() {
        let by_index = bind("Player[-1]").unwrap();
        assert_eq!(by_index.selector, Some(Selector::Index(-1)));
        assert!(by_index.explicit_selector);

        let untyped = bind("Actor[\"hero\"]").unwrap();
        assert_eq!(untyped.kind, BindingKind::Actor);
        assert_eq!(untyped.schema, None);
        assert_eq!(untyped.selector, Some(Selector::Ident("hero".to_string())));
    }

    #[test]
    fn test_globals() {
        let plain = bind("Global[\"score\"]").unwrap();
        assert_eq!(plain.kind, BindingKind::Global);
        assert_eq!(plain.ident(), Some("score"));
        assert_eq!(plain.value_type, None);

        let typed = bind("Global[\"grid\", List[List[int]]]").unwrap();
        assert_eq!(
            typed.value_type,
            Some(TypeExpr::List(Box::new(TypeExpr::List(Box::new(TypeExpr::Int)))))
        );

        assert!(bind("Global[\"x\", Dict[str, List[int]]]").is_ok());
        assert!(matches!(
            bind("Global[\"x\", List[Dict[str, int]]]"),
            Err(CompilerError::TypeMismatch(_, _, _))
        ));
    }

    #[test]
    fn test_roles_and_cameras_take_identifiers_only() {
        assert_eq!(bind("Role[\"human_1\"]").unwrap().ident(), Some("human_1"));
        assert_eq!(bind("Pilot[\"p2\"]").unwrap().schema.as_deref(), Some("Pilot"));
        assert_eq!(bind("Camera[\"main\"]").unwrap().kind, BindingKind::Camera);
        assert!(matches!(bind("Role[0]"), Err(CompilerError::BindingError(_, _))));
        assert!(matches!(bind("Camera[1]"), Err(CompilerError::BindingError(_, _))));
    }

    #[test]
    fn test_actor_lists() {
        let all = bind("List[Actor]").unwrap();
        assert_eq!(all.kind, BindingKind::ActorList);
        assert_eq!(all.schema, None);
        assert_eq!(bind("List[Coin]").unwrap().schema.as_deref(), Some("Coin"));
        assert!(bind("List[int]").is_err());
    }

    #[test]
    fn test_unknown_annotations_rejected() {
        assert!(matches!(bind("int"), Err(CompilerError::BindingError(_, _))));
        assert!(matches!(bind("Ghost[0]"), Err(CompilerError::BindingError(_, _))));
        assert!(matches!(bind("Player[1.5]"), Err(CompilerError::BindingError(_, _))));

        let module = parse_source("def f(p):\n    pass\n").unwrap();
        if let StmtKind::FunctionDef(def) = &module.body[0].kind {
            let err = classify_param(&def.params[0], &registry()).unwrap_err();
            assert!(err.message().contains("needs an annotation"));
        }
    }

    #[test]
    fn test_condition_references() {
        let schemas = registry();
        let any_coin = parse_actor_ref(&expr("Coin\n"), &schemas).unwrap();
        assert_eq!(any_coin.schema.as_deref(), Some("Coin"));
        assert_eq!(any_coin.selector, None);

        let hero = parse_actor_ref(&expr("Player[\"hero\"]\n"), &schemas).unwrap();
        assert_eq!(hero.selector, Some(Selector::Ident("hero".to_string())));

        assert!(matches!(
            parse_actor_ref(&expr("Ghost\n"), &schemas),
            Err(CompilerError::UndefinedSymbol(_, _))
        ));

        assert_eq!(parse_role_ref(&expr("Role[\"human_2\"]\n"), &schemas).unwrap(), "human_2");
        assert_eq!(parse_role_ref(&expr("Pilot[\"p1\"]\n"), &schemas).unwrap(), "p1");
        assert_eq!(parse_role_ref(&expr("\"ai_1\"\n"), &schemas).unwrap(), "ai_1");
        assert!(parse_role_ref(&expr("3\n"), &schemas).is_err());
    }
}
