// Code block preprocessor tests

#[cfg(test)]
mod macros_tests {
    use crate::stage_compiler::error::{CompilerError, Diagnostics};
    use crate::stage_compiler::macros::MacroPreprocessor;
    use crate::stage_compiler::parser::parse_source;
    use crate::stage_compiler::syntax::*;
    use crate::stage_compiler::value::Value;
    use test_log::test;

    fn run(src: &str, strict: bool) -> (Result<Module, CompilerError>, Diagnostics) {
        let module = parse_source(src).unwrap();
        let mut diagnostics = Diagnostics::new();
        let result = MacroPreprocessor::new(strict, &mut diagnostics).preprocess(module);
        (result, diagnostics)
    }

    fn expand(src: &str) -> Module {
        let (result, _) = run(src, false);
        result.unwrap()
    }

    fn def_names(module: &Module) -> Vec<String> {
        module
            .body
            .iter()
            .filter_map(|stmt| match &stmt.kind {
                StmtKind::FunctionDef(def) => Some(def.name.clone()),
                StmtKind::ClassDef(class) => Some(class.name.clone()),
                _ => None,
            })
            .collect()
    }

    const ENEMY_TEMPLATE: &str = r#"
t = AbstractCodeBlock.begin("enemy", "A configurable enemy", x=int)
class Enemy(Actor):
    hp: int = x
def hit(e: Enemy["e"]):
    e.hp -= t.x
t.end()
t.instantiate(x=1)
AbstractCodeBlock.instantiate("enemy", x=2)
"#;

    #[test]
    fn test_two_instantiations_are_independent() {
        let module = expand(ENEMY_TEMPLATE);
        assert_eq!(
            def_names(&module),
            vec![
                "Enemy__enemy_0".to_string(),
                "hit__enemy_0".to_string(),
                "Enemy__enemy_1".to_string(),
                "hit__enemy_1".to_string(),
            ]
        );

        let defaults: Vec<Value> = module
            .body
            .iter()
            .filter_map(|stmt| match &stmt.kind {
                StmtKind::ClassDef(class) => match &class.body[0].kind {
                    StmtKind::AnnAssign {
                        target,
                        value: Some(value),
                        ..
                    } => {
                        // field names are never renamed
                        assert_eq!(target.as_name(), Some("hp"));
                        Value::from_literal(value)
                    }
                    _ => None,
                },
                _ => None,
            })
            .collect();
        assert_eq!(defaults, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_references_follow_renamed_locals() {
        let module = expand(ENEMY_TEMPLATE);
        let def = match &module.body[3].kind {
            StmtKind::FunctionDef(def) => def,
            other => panic!("Expected function, got {:?}", other),
        };
        assert_eq!(def.params[0].name, "e__enemy_1");
        let annotation = def.params[0].annotation.as_ref().unwrap();
        match &annotation.kind {
            ExprKind::Subscript { value, .. } => assert_eq!(value.as_name(), Some("Enemy__enemy_1")),
            other => panic!("Expected subscript, got {:?}", other),
        }
        match &def.body[0].kind {
            StmtKind::AugAssign { target, value, .. } => {
                assert_eq!(target.dotted_path().as_deref(), Some("e__enemy_1.hp"));
                // `t.x` resolves to the bound argument
                assert_eq!(value.as_int(), Some(2));
            }
            other => panic!("Expected augmented assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_code_block_spliced_and_strict_mode_drops_outside_statements() {
        let src = r#"
import random
loose = 1
CodeBlock.begin("setup")
speed = 2
CodeBlock.end("setup")
"#;
        let (result, diagnostics) = run(src, true);
        let module = result.unwrap();
        assert_eq!(module.body.len(), 2);
        assert!(module.body[0].is_import());
        assert!(matches!(
            &module.body[1].kind,
            StmtKind::Assign { target, .. } if target.as_name() == Some("speed")
        ));
        assert_eq!(diagnostics.len(), 1);

        let (result, diagnostics) = run(src, false);
        assert_eq!(result.unwrap().body.len(), 3);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_selector_arguments_pass_through() {
        let src = r#"
AbstractCodeBlock.begin("follow", target=Actor)
def chase(me: Actor["ghost"], other: target):
    me.x = other.x
AbstractCodeBlock.end("follow")
AbstractCodeBlock.instantiate("follow", target=Player["hero"])
"#;
        let module = expand(src);
        let def = match &module.body[0].kind {
            StmtKind::FunctionDef(def) => def,
            other => panic!("Expected function, got {:?}", other),
        };
        let annotation = def.params[1].annotation.as_ref().unwrap();
        match &annotation.kind {
            ExprKind::Subscript { value, index } => {
                assert_eq!(value.as_name(), Some("Player"));
                assert_eq!(index.as_str(), Some("hero"));
            }
            other => panic!("Expected selector, got {:?}", other),
        }
    }

    #[test]
    fn test_unused_template_warns() {
        let (result, diagnostics) = run(
            "AbstractCodeBlock.begin(\"spare\")\nx = 1\nAbstractCodeBlock.end()\n",
            false,
        );
        assert!(result.unwrap().body.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics.items()[0].message.contains("spare"));
    }

    fn error_of(src: &str) -> CompilerError {
        let (result, _) = run(src, false);
        result.unwrap_err()
    }

    #[test]
    fn test_unmatched_blocks() {
        assert!(error_of("CodeBlock.begin(\"a\")\nx = 1\n")
            .message()
            .contains("never closed"));
        assert!(error_of("CodeBlock.end(\"a\")\n")
            .message()
            .contains("without a matching begin"));
        assert!(error_of("CodeBlock.begin(\"a\")\nCodeBlock.end(\"b\")\n")
            .message()
            .contains("does not match"));
    }

    #[test]
    fn test_end_kind_mismatch() {
        let err = error_of("AbstractCodeBlock.begin(\"a\")\nCodeBlock.end(\"a\")\n");
        assert!(matches!(err, CompilerError::MacroError(_, _)));
        assert!(err.message().contains("closed with CodeBlock.end"));
    }

    #[test]
    fn test_nesting_rejected() {
        let err = error_of("CodeBlock.begin(\"a\")\nCodeBlock.begin(\"b\")\n");
        assert!(err.message().contains("do not nest"));
    }

    #[test]
    fn test_duplicate_abstract_id() {
        let src = "AbstractCodeBlock.begin(\"a\")\nAbstractCodeBlock.end()\nAbstractCodeBlock.begin(\"a\")\nAbstractCodeBlock.end()\n";
        assert!(error_of(src).message().contains("already defined"));
    }

    #[test]
    fn test_instantiate_argument_checks() {
        let header = "t = AbstractCodeBlock.begin(\"b\", x=int)\ny = x\nt.end()\n";
        let unknown = error_of(&format!("{}t.instantiate(x=1, z=2)\n", header));
        assert!(unknown.message().contains("'z' is not a parameter"));

        let missing = error_of(&format!("{}t.instantiate()\n", header));
        assert!(missing.message().contains("missing argument(s): x"));

        let shape = error_of(&format!("{}t.instantiate(x=compute())\n", header));
        assert!(matches!(shape, CompilerError::MacroError(_, _)));

        let mismatch = error_of(&format!("{}t.instantiate(x=\"three\")\n", header));
        assert!(matches!(mismatch, CompilerError::TypeMismatch(_, _, _)));

        let unknown_block = error_of("AbstractCodeBlock.instantiate(\"nope\")\n");
        assert!(unknown_block.message().contains("unknown AbstractCodeBlock"));
    }

    #[test]
    fn test_literal_arguments_are_fresh_copies() {
        let src = r#"
t = AbstractCodeBlock.begin("bag", items=List[int])
a = items
b = items
t.end()
t.instantiate(items=[1, 2])
"#;
        let module = expand(src);
        assert_eq!(module.body.len(), 2);
        for stmt in &module.body {
            match &stmt.kind {
                StmtKind::Assign { value, .. } => {
                    assert_eq!(
                        Value::from_literal(value),
                        Some(Value::List(vec![Value::Int(1), Value::Int(2)]))
                    );
                }
                other => panic!("Expected assignment, got {:?}", other),
            }
        }
        assert_eq!(def_names(&module).len(), 0);
    }
}
