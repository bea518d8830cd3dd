// Lexer tests for the host surface syntax

#[cfg(test)]
mod tests {
    use crate::stage_compiler::error::CompilerError;
    use crate::stage_compiler::lexer::{Lexer, TokenKind};
    use test_log::test;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(input);
        lexer
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(kinds(""), vec![TokenKind::EOF]);
    }

    #[test]
    fn test_simple_assignment() {
        assert_eq!(
            kinds("speed = 2.5\n"),
            vec![
                TokenKind::Identifier("speed".to_string()),
                TokenKind::Equal,
                TokenKind::FloatLiteral(2.5),
                TokenKind::Newline,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn test_indent_and_dedent() {
        let tokens = kinds("def f(t: Tick):\n    yield t\nx = 1\n");
        assert!(tokens.contains(&TokenKind::Indent));
        assert!(tokens.contains(&TokenKind::Dedent));
        let indent = tokens.iter().position(|t| *t == TokenKind::Indent).unwrap();
        let dedent = tokens.iter().position(|t| *t == TokenKind::Dedent).unwrap();
        assert!(indent < dedent);
        assert_eq!(tokens[dedent + 1], TokenKind::Identifier("x".to_string()));
    }

    #[test]
    fn test_dedents_closed_at_end_of_file() {
        let tokens = kinds("if True:\n    if True:\n        x = 1");
        let dedents = tokens.iter().filter(|t| **t == TokenKind::Dedent).count();
        assert_eq!(dedents, 2);
        assert_eq!(tokens.last(), Some(&TokenKind::EOF));
    }

    #[test]
    fn test_blank_lines_and_comments_ignored() {
        let tokens = kinds("x = 1\n\n   # just a comment\n\ny = 2  # trailing\n");
        let newlines = tokens.iter().filter(|t| **t == TokenKind::Newline).count();
        assert_eq!(newlines, 2);
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_brackets_join_lines() {
        let tokens = kinds("grid = [\n    [1, 0],\n    [0, 1],\n]\n");
        let newlines = tokens.iter().filter(|t| **t == TokenKind::Newline).count();
        assert_eq!(newlines, 1);
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a //= b ** 2 != c -> d"),
            vec![
                TokenKind::Identifier("a".to_string()),
                TokenKind::DoubleSlashEqual,
                TokenKind::Identifier("b".to_string()),
                TokenKind::DoubleStar,
                TokenKind::IntegerLiteral(2),
                TokenKind::NotEqual,
                TokenKind::Identifier("c".to_string()),
                TokenKind::Arrow,
                TokenKind::Identifier("d".to_string()),
                TokenKind::Newline,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        let tokens = kinds(r#"a = 'it\'s' + "tab\there""#);
        assert!(tokens.contains(&TokenKind::StringLiteral("it's".to_string())));
        assert!(tokens.contains(&TokenKind::StringLiteral("tab\there".to_string())));
    }

    #[test]
    fn test_triple_quoted_docstring() {
        let tokens = kinds("\"\"\"Moves the\nplayer.\"\"\"\n");
        assert_eq!(
            tokens[0],
            TokenKind::StringLiteral("Moves the\nplayer.".to_string())
        );
    }

    #[test]
    fn test_keywords() {
        let tokens = kinds("for i in range(3): continue");
        assert_eq!(tokens[0], TokenKind::For);
        assert_eq!(tokens[2], TokenKind::In);
        assert!(tokens.contains(&TokenKind::Continue));
    }

    #[test]
    fn test_numbers_with_separators_and_exponents() {
        let tokens = kinds("a = 1_000 + 2e3 + .5");
        assert!(tokens.contains(&TokenKind::IntegerLiteral(1000)));
        assert!(tokens.contains(&TokenKind::FloatLiteral(2000.0)));
        assert!(tokens.contains(&TokenKind::FloatLiteral(0.5)));
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("x = \"open\n");
        match lexer.tokenize() {
            Err(CompilerError::UnterminatedString(span)) => {
                assert_eq!(span.line, 1);
                assert_eq!(span.column, 5);
            }
            other => panic!("Expected unterminated string error, got {:?}", other),
        }
    }

    #[test]
    fn test_inconsistent_dedent() {
        let mut lexer = Lexer::new("if x:\n        a = 1\n    b = 2\n");
        assert!(matches!(
            lexer.tokenize(),
            Err(CompilerError::SyntaxError(_, _))
        ));
    }

    #[test]
    fn test_token_positions() {
        let mut lexer = Lexer::new("x = 1\n  \ny = foo\n");
        let tokens = lexer.tokenize().unwrap();
        let foo = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Identifier("foo".to_string()))
            .unwrap();
        assert_eq!((foo.line, foo.column), (3, 5));
    }
}
