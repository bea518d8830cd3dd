// Compiler Error Handling
//
// Fatal errors abort a compilation; diagnostics are collected as warnings and
// rendered through the same formatter.

use std::fmt;

/// Source location attached to syntax nodes (1-based line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Span { line, column }
    }

    /// Location used for nodes synthesized by the compiler itself.
    pub fn unknown() -> Self {
        Span { line: 0, column: 0 }
    }

    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_known() {
            write!(f, "line {}, column {}", self.line, self.column)
        } else {
            write!(f, "unknown location")
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompilerError {
    // Host syntax errors
    SyntaxError(String, Span),
    UnexpectedCharacter(char, Span),
    UnterminatedString(Span),
    ExpectedToken(String, String, Span), // expected, found, position

    // Code block templates
    MacroError(String, Span),

    // Compile-time setup evaluation
    ExpansionError(String, Span),

    // Parameter bindings and bodies
    BindingError(String, Span),
    UnsupportedSyntax(String, Span),
    TypeMismatch(String, String, Span), // expected, found, position
    UndefinedSymbol(String, Span),
    DuplicateSymbol(String, Span),

    // Whole-project consistency
    ValidationError(String, Span),

    // Target emission
    CodeGenError(String),

    // Files referenced by the project or given on the command line
    IOError(String),
}

impl CompilerError {
    pub fn span(&self) -> Option<Span> {
        match self {
            CompilerError::SyntaxError(_, span)
            | CompilerError::UnexpectedCharacter(_, span)
            | CompilerError::UnterminatedString(span)
            | CompilerError::ExpectedToken(_, _, span)
            | CompilerError::MacroError(_, span)
            | CompilerError::ExpansionError(_, span)
            | CompilerError::BindingError(_, span)
            | CompilerError::UnsupportedSyntax(_, span)
            | CompilerError::TypeMismatch(_, _, span)
            | CompilerError::UndefinedSymbol(_, span)
            | CompilerError::DuplicateSymbol(_, span)
            | CompilerError::ValidationError(_, span) => Some(*span).filter(Span::is_known),
            CompilerError::CodeGenError(_) | CompilerError::IOError(_) => None,
        }
    }

    /// Message without the location prefix.
    pub fn message(&self) -> String {
        match self {
            CompilerError::SyntaxError(msg, _)
            | CompilerError::MacroError(msg, _)
            | CompilerError::ExpansionError(msg, _)
            | CompilerError::BindingError(msg, _)
            | CompilerError::UnsupportedSyntax(msg, _)
            | CompilerError::ValidationError(msg, _)
            | CompilerError::CodeGenError(msg)
            | CompilerError::IOError(msg) => msg.clone(),
            CompilerError::UnexpectedCharacter(ch, _) => format!("unexpected character '{}'", ch),
            CompilerError::UnterminatedString(_) => "unterminated string literal".to_string(),
            CompilerError::ExpectedToken(expected, found, _) => {
                format!("expected {} but found {}", expected, found)
            }
            CompilerError::TypeMismatch(expected, found, _) => {
                format!("type mismatch: expected {}, found {}", expected, found)
            }
            CompilerError::UndefinedSymbol(symbol, _) => format!("undefined name '{}'", symbol),
            CompilerError::DuplicateSymbol(symbol, _) => format!("'{}' is already defined", symbol),
        }
    }

    /// Render with a source snippet, the same way warnings are rendered.
    pub fn render(&self, source: &str, path: Option<&str>) -> String {
        render_message("error", &self.message(), self.span(), source, path)
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompilerError::SyntaxError(msg, span) => {
                write!(f, "Syntax error at {}: {}", span, msg)
            }
            CompilerError::UnexpectedCharacter(ch, span) => {
                write!(f, "Unexpected character '{}' at {}", ch, span)
            }
            CompilerError::UnterminatedString(span) => {
                write!(f, "Unterminated string starting at {}", span)
            }
            CompilerError::ExpectedToken(expected, found, span) => {
                write!(f, "Expected {} but found {} at {}", expected, found, span)
            }
            CompilerError::MacroError(msg, span) => {
                write!(f, "Code block error at {}: {}", span, msg)
            }
            CompilerError::ExpansionError(msg, span) => {
                write!(f, "Setup code error at {}: {}", span, msg)
            }
            CompilerError::BindingError(msg, span) => {
                write!(f, "Binding error at {}: {}", span, msg)
            }
            CompilerError::UnsupportedSyntax(msg, span) => {
                write!(f, "Unsupported syntax at {}: {}", span, msg)
            }
            CompilerError::TypeMismatch(expected, found, span) => {
                write!(
                    f,
                    "Type mismatch at {}: expected {}, found {}",
                    span, expected, found
                )
            }
            CompilerError::UndefinedSymbol(symbol, span) => {
                write!(f, "Undefined name '{}' at {}", symbol, span)
            }
            CompilerError::DuplicateSymbol(symbol, span) => {
                write!(f, "Duplicate definition of '{}' at {}", symbol, span)
            }
            CompilerError::ValidationError(msg, span) => {
                write!(f, "Invalid game at {}: {}", span, msg)
            }
            CompilerError::CodeGenError(msg) => {
                write!(f, "Code generation error: {}", msg)
            }
            CompilerError::IOError(msg) => {
                write!(f, "IO error: {}", msg)
            }
        }
    }
}

impl std::error::Error for CompilerError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Note,
}

/// Non-fatal issue collected during a compilation.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            span: Some(span).filter(Span::is_known),
        }
    }

    pub fn note(message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Note,
            message: message.into(),
            span: Some(span).filter(Span::is_known),
        }
    }

    pub fn render(&self, source: &str, path: Option<&str>) -> String {
        let label = match self.severity {
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        render_message(label, &self.message, self.span, source, path)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self.severity {
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        match self.span {
            Some(span) => write!(f, "{} at {}: {}", label, span, self.message),
            None => write!(f, "{}: {}", label, self.message),
        }
    }
}

/// Accumulates diagnostics for one compilation.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, message: impl Into<String>, span: Span) {
        let diagnostic = Diagnostic::warning(message, span);
        log::warn!("{}", diagnostic);
        self.items.push(diagnostic);
    }

    pub fn note(&mut self, message: impl Into<String>, span: Span) {
        let diagnostic = Diagnostic::note(message, span);
        log::info!("{}", diagnostic);
        self.items.push(diagnostic);
    }

    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Diagnostic> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn render_message(
    label: &str,
    message: &str,
    span: Option<Span>,
    source: &str,
    path: Option<&str>,
) -> String {
    let mut out = format!("{}: {}\n", label, message);
    let span = match span {
        Some(span) => span,
        None => return out,
    };

    out.push_str(&format!(
        "  --> {}:{}:{}\n",
        path.unwrap_or("<source>"),
        span.line,
        span.column
    ));

    if let Some(text) = source.lines().nth(span.line - 1) {
        let gutter = span.line.to_string();
        let pad = " ".repeat(gutter.len());
        out.push_str(&format!("{} |\n", pad));
        out.push_str(&format!("{} | {}\n", gutter, text));
        let caret_offset = " ".repeat(span.column.saturating_sub(1));
        out.push_str(&format!("{} | {}^\n", pad, caret_offset));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_render_points_at_column() {
        let source = "x = 1\ngame.add_rule(jump, fly)\n";
        let err = CompilerError::UndefinedSymbol("fly".to_string(), Span::new(2, 21));
        let rendered = err.render(source, Some("game.py"));
        assert!(rendered.starts_with("error: undefined name 'fly'"));
        assert!(rendered.contains("--> game.py:2:21"));
        assert!(rendered.contains("2 | game.add_rule(jump, fly)"));
        assert!(rendered.contains(&format!("  | {}^", " ".repeat(20))));
    }

    #[test]
    fn test_warning_shares_renderer() {
        let diagnostic = Diagnostic::warning("action 'idle' is never used", Span::new(1, 1));
        let rendered = diagnostic.render("def idle(t: Tick):\n", None);
        assert!(rendered.starts_with("warning: action 'idle' is never used"));
        assert!(rendered.contains("<source>:1:1"));
    }

    #[test]
    fn test_codegen_error_has_no_location() {
        let err = CompilerError::CodeGenError("bad".to_string());
        assert_eq!(err.span(), None);
        assert_eq!(err.render("", None), "error: bad\n");
    }
}
