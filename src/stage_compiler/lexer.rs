// Host Syntax Lexer
// Tokenizes the Python-shaped surface syntax, producing INDENT/DEDENT tokens from
// leading whitespace the way a conventional parser for that syntax would.

use crate::stage_compiler::error::{CompilerError, Span};

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    StringLiteral(String),
    IntegerLiteral(i64),
    FloatLiteral(f64),
    Identifier(String),

    // Keywords
    Def,
    Class,
    If,
    Elif,
    Else,
    For,
    In,
    While,
    Return,
    Yield,
    Continue,
    Break,
    Pass,
    Import,
    From,
    And,
    Or,
    Not,
    True,
    False,
    None,

    // Symbols
    LeftParen,    // (
    RightParen,   // )
    LeftBracket,  // [
    RightBracket, // ]
    LeftBrace,    // {
    RightBrace,   // }
    Colon,        // :
    Comma,        // ,
    Dot,          // .
    Arrow,        // ->
    At,           // @

    // Operators
    Equal,        // =
    EqualEqual,   // ==
    NotEqual,     // !=
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=
    Plus,         // +
    Minus,        // -
    Star,         // *
    DoubleStar,   // **
    Slash,        // /
    DoubleSlash,  // //
    Percent,      // %
    PlusEqual,    // +=
    MinusEqual,   // -=
    StarEqual,    // *=
    SlashEqual,   // /=
    DoubleSlashEqual, // //=
    PercentEqual, // %=

    // Layout
    Newline,
    Indent,
    Dedent,
    EOF,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::StringLiteral(_) => "string".to_string(),
            TokenKind::IntegerLiteral(value) => format!("'{}'", value),
            TokenKind::FloatLiteral(value) => format!("'{}'", value),
            TokenKind::Identifier(name) => format!("'{}'", name),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::EOF => "end of file".to_string(),
            other => format!("{:?}", other),
        }
    }
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    current_char: Option<char>,
    indent_stack: Vec<usize>,
    bracket_depth: usize,
    at_line_start: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Lexer {
            input: chars,
            position: 0,
            line: 1,
            column: 1,
            current_char,
            indent_stack: vec![0],
            bracket_depth: 0,
            at_line_start: true,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, CompilerError> {
        let mut tokens = Vec::new();

        loop {
            if self.at_line_start && self.bracket_depth == 0 {
                self.at_line_start = false;
                if !self.handle_indentation(&mut tokens)? {
                    continue;
                }
            }

            self.skip_inline_whitespace();

            let line = self.line;
            let column = self.column;
            let ch = match self.current_char {
                Some(ch) => ch,
                None => break,
            };

            let kind = match ch {
                '#' => {
                    self.skip_comment();
                    continue;
                }
                '\\' if self.peek_char() == Some('\n') => {
                    // Explicit line continuation
                    self.advance();
                    self.advance();
                    continue;
                }
                '\n' => {
                    self.advance();
                    if self.bracket_depth == 0 {
                        self.at_line_start = true;
                        if !matches!(
                            tokens.last().map(|t| &t.kind),
                            None | Some(TokenKind::Newline)
                        ) {
                            tokens.push(Token {
                                kind: TokenKind::Newline,
                                line,
                                column,
                            });
                        }
                    }
                    continue;
                }
                '(' | '[' | '{' => {
                    self.advance();
                    self.bracket_depth += 1;
                    match ch {
                        '(' => TokenKind::LeftParen,
                        '[' => TokenKind::LeftBracket,
                        _ => TokenKind::LeftBrace,
                    }
                }
                ')' | ']' | '}' => {
                    self.advance();
                    self.bracket_depth = self.bracket_depth.saturating_sub(1);
                    match ch {
                        ')' => TokenKind::RightParen,
                        ']' => TokenKind::RightBracket,
                        _ => TokenKind::RightBrace,
                    }
                }
                ':' => {
                    self.advance();
                    TokenKind::Colon
                }
                ',' => {
                    self.advance();
                    TokenKind::Comma
                }
                '@' => {
                    self.advance();
                    TokenKind::At
                }
                '.' if !self.peek_char().is_some_and(|c| c.is_ascii_digit()) => {
                    self.advance();
                    TokenKind::Dot
                }
                '+' => self.operator_with_assign(TokenKind::Plus, TokenKind::PlusEqual),
                '%' => self.operator_with_assign(TokenKind::Percent, TokenKind::PercentEqual),
                '-' => {
                    self.advance();
                    match self.current_char {
                        Some('>') => {
                            self.advance();
                            TokenKind::Arrow
                        }
                        Some('=') => {
                            self.advance();
                            TokenKind::MinusEqual
                        }
                        _ => TokenKind::Minus,
                    }
                }
                '*' => {
                    self.advance();
                    match self.current_char {
                        Some('*') => {
                            self.advance();
                            TokenKind::DoubleStar
                        }
                        Some('=') => {
                            self.advance();
                            TokenKind::StarEqual
                        }
                        _ => TokenKind::Star,
                    }
                }
                '/' => {
                    self.advance();
                    match self.current_char {
                        Some('/') => {
                            self.advance();
                            if self.current_char == Some('=') {
                                self.advance();
                                TokenKind::DoubleSlashEqual
                            } else {
                                TokenKind::DoubleSlash
                            }
                        }
                        Some('=') => {
                            self.advance();
                            TokenKind::SlashEqual
                        }
                        _ => TokenKind::Slash,
                    }
                }
                '=' => self.operator_with_assign(TokenKind::Equal, TokenKind::EqualEqual),
                '<' => self.operator_with_assign(TokenKind::Less, TokenKind::LessEqual),
                '>' => self.operator_with_assign(TokenKind::Greater, TokenKind::GreaterEqual),
                '!' => {
                    self.advance();
                    if self.current_char == Some('=') {
                        self.advance();
                        TokenKind::NotEqual
                    } else {
                        return Err(CompilerError::UnexpectedCharacter('!', Span::new(line, column)));
                    }
                }
                '"' | '\'' => {
                    let value = self.read_string(ch, Span::new(line, column))?;
                    TokenKind::StringLiteral(value)
                }
                ch if ch.is_ascii_digit() || ch == '.' => self.read_number(Span::new(line, column))?,
                ch if ch.is_alphabetic() || ch == '_' => {
                    let identifier = self.read_identifier();
                    self.keyword_or_identifier(identifier)
                }
                ch => {
                    return Err(CompilerError::UnexpectedCharacter(ch, Span::new(line, column)));
                }
            };

            tokens.push(Token { kind, line, column });
        }

        // Close the final logical line and any open blocks
        if !matches!(tokens.last().map(|t| &t.kind), None | Some(TokenKind::Newline)) {
            tokens.push(Token {
                kind: TokenKind::Newline,
                line: self.line,
                column: self.column,
            });
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            tokens.push(Token {
                kind: TokenKind::Dedent,
                line: self.line,
                column: self.column,
            });
        }
        tokens.push(Token {
            kind: TokenKind::EOF,
            line: self.line,
            column: self.column,
        });

        Ok(tokens)
    }

    /// Measures the indentation of a new logical line. Returns false when the line is
    /// blank or a comment, in which case it produces no tokens.
    fn handle_indentation(&mut self, tokens: &mut Vec<Token>) -> Result<bool, CompilerError> {
        let mut width = 0;
        while let Some(ch) = self.current_char {
            match ch {
                ' ' => width += 1,
                '\t' => width += 8 - (width % 8),
                '\r' => {}
                _ => break,
            }
            self.advance();
        }

        match self.current_char {
            None => return Ok(true),
            Some('\n') => {
                self.advance();
                self.at_line_start = true;
                return Ok(false);
            }
            Some('#') => {
                self.skip_comment();
                if self.current_char == Some('\n') {
                    self.advance();
                }
                self.at_line_start = true;
                return Ok(false);
            }
            _ => {}
        }

        let current = self.indent_stack.last().copied().unwrap_or(0);
        if width > current {
            self.indent_stack.push(width);
            tokens.push(Token {
                kind: TokenKind::Indent,
                line: self.line,
                column: 1,
            });
        } else if width < current {
            while self.indent_stack.last().copied().unwrap_or(0) > width {
                self.indent_stack.pop();
                tokens.push(Token {
                    kind: TokenKind::Dedent,
                    line: self.line,
                    column: 1,
                });
            }
            if self.indent_stack.last().copied().unwrap_or(0) != width {
                return Err(CompilerError::SyntaxError(
                    "unindent does not match any outer indentation level".to_string(),
                    Span::new(self.line, self.column),
                ));
            }
        }
        Ok(true)
    }

    fn operator_with_assign(&mut self, plain: TokenKind, with_equal: TokenKind) -> TokenKind {
        self.advance();
        if self.current_char == Some('=') {
            self.advance();
            with_equal
        } else {
            plain
        }
    }

    fn advance(&mut self) {
        if let Some('\n') = self.current_char {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn skip_inline_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch == ' ' || ch == '\t' || ch == '\r' || (ch == '\n' && self.bracket_depth > 0) {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.current_char {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn read_string(&mut self, quote: char, start: Span) -> Result<String, CompilerError> {
        let triple = self.peek_char() == Some(quote)
            && self.input.get(self.position + 2).copied() == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }
        self.advance();

        let mut value = String::new();
        while let Some(ch) = self.current_char {
            if ch == quote {
                if !triple {
                    self.advance();
                    return Ok(value);
                }
                if self.peek_char() == Some(quote)
                    && self.input.get(self.position + 2).copied() == Some(quote)
                {
                    self.advance();
                    self.advance();
                    self.advance();
                    return Ok(value);
                }
                value.push(ch);
                self.advance();
                continue;
            }
            match ch {
                '\n' if !triple => return Err(CompilerError::UnterminatedString(start)),
                '\\' => {
                    self.advance();
                    match self.current_char {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some('0') => value.push('\0'),
                        Some('\\') => value.push('\\'),
                        Some('\'') => value.push('\''),
                        Some('"') => value.push('"'),
                        Some('\n') => {}
                        Some(other) => {
                            value.push('\\');
                            value.push(other);
                        }
                        None => return Err(CompilerError::UnterminatedString(start)),
                    }
                    self.advance();
                }
                ch => {
                    value.push(ch);
                    self.advance();
                }
            }
        }

        Err(CompilerError::UnterminatedString(start))
    }

    fn read_number(&mut self, start: Span) -> Result<TokenKind, CompilerError> {
        let mut text = String::new();
        let mut is_float = false;

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                text.push(ch);
            } else if ch == '_' {
                // digit separator
            } else if ch == '.' && !is_float {
                is_float = true;
                text.push(ch);
            } else if (ch == 'e' || ch == 'E') && !text.is_empty() {
                is_float = true;
                text.push(ch);
                if let Some(sign @ ('+' | '-')) = self.peek_char() {
                    self.advance();
                    text.push(sign);
                }
            } else {
                break;
            }
            self.advance();
        }

        if is_float {
            text.parse::<f64>()
                .map(TokenKind::FloatLiteral)
                .map_err(|_| CompilerError::SyntaxError(format!("invalid number '{}'", text), start))
        } else {
            text.parse::<i64>()
                .map(TokenKind::IntegerLiteral)
                .map_err(|_| CompilerError::SyntaxError(format!("invalid number '{}'", text), start))
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut value = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        value
    }

    fn keyword_or_identifier(&self, identifier: String) -> TokenKind {
        match identifier.as_str() {
            "def" => TokenKind::Def,
            "class" => TokenKind::Class,
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "while" => TokenKind::While,
            "return" => TokenKind::Return,
            "yield" => TokenKind::Yield,
            "continue" => TokenKind::Continue,
            "break" => TokenKind::Break,
            "pass" => TokenKind::Pass,
            "import" => TokenKind::Import,
            "from" => TokenKind::From,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "True" => TokenKind::True,
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            _ => TokenKind::Identifier(identifier),
        }
    }
}

#[cfg(test)]
#[path = "lexer_tests.rs"]
mod tests;
