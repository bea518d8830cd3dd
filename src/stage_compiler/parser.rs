// Host Syntax Recursive Descent Parser
//
// Builds the syntax tree for the supported subset of the host surface syntax.
// Anything outside the subset is rejected here rather than passed along.

use crate::stage_compiler::error::{CompilerError, Span};
use crate::stage_compiler::lexer::{Token, TokenKind};
use crate::stage_compiler::syntax::*;

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, current: 0 }
    }

    pub fn parse(&mut self) -> Result<Module, CompilerError> {
        let mut body = Vec::new();

        while !self.is_at_end() {
            if self.check(&TokenKind::Newline) {
                self.advance();
                continue;
            }
            body.push(self.parse_statement()?);
        }

        Ok(Module { body })
    }

    fn parse_statement(&mut self) -> Result<Stmt, CompilerError> {
        let span = self.peek().span();
        match &self.peek().kind {
            TokenKind::At => self.parse_decorated(),
            TokenKind::Def => self.parse_function_def(Vec::new(), span),
            TokenKind::Class => self.parse_class_def(Vec::new(), span),
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::While => self.parse_while(),
            TokenKind::Indent => Err(CompilerError::SyntaxError(
                "unexpected indent".to_string(),
                span,
            )),
            _ => {
                let stmt = self.parse_simple_statement()?;
                self.end_of_line()?;
                Ok(stmt)
            }
        }
    }

    fn parse_simple_statement(&mut self) -> Result<Stmt, CompilerError> {
        let span = self.peek().span();
        let kind = match self.peek().kind.clone() {
            TokenKind::Pass => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Continue => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Break => {
                return Err(CompilerError::UnsupportedSyntax(
                    "'break' is not supported; loops run to completion".to_string(),
                    span,
                ));
            }
            TokenKind::Return => {
                self.advance();
                if self.check(&TokenKind::Newline) || self.check(&TokenKind::EOF) {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_expression()?))
                }
            }
            TokenKind::Yield => {
                self.advance();
                StmtKind::Yield(self.parse_expression()?)
            }
            TokenKind::Import => {
                self.advance();
                let mut names = vec![self.parse_dotted_name()?];
                while self.match_token(&TokenKind::Comma) {
                    names.push(self.parse_dotted_name()?);
                }
                StmtKind::Import(names)
            }
            TokenKind::From => {
                self.advance();
                let module = self.parse_dotted_name()?;
                self.consume(TokenKind::Import, "'import'")?;
                let mut names = Vec::new();
                if self.match_token(&TokenKind::Star) {
                    names.push("*".to_string());
                } else {
                    let parenthesized = self.match_token(&TokenKind::LeftParen);
                    loop {
                        names.push(self.consume_identifier("imported name")?);
                        if !self.match_token(&TokenKind::Comma) {
                            break;
                        }
                        if parenthesized && self.check(&TokenKind::RightParen) {
                            break;
                        }
                    }
                    if parenthesized {
                        self.consume(TokenKind::RightParen, "')'")?;
                    }
                }
                StmtKind::ImportFrom { module, names }
            }
            _ => return self.parse_expression_statement(),
        };
        Ok(Stmt::new(kind, span))
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, CompilerError> {
        let span = self.peek().span();
        let first = self.parse_expression_list()?;

        if self.match_token(&TokenKind::Equal) {
            self.check_assignable(&first)?;
            let value = self.parse_expression_list()?;
            if self.check(&TokenKind::Equal) {
                return Err(CompilerError::UnsupportedSyntax(
                    "chained assignment is not supported".to_string(),
                    self.peek().span(),
                ));
            }
            return Ok(Stmt::new(
                StmtKind::Assign {
                    target: first,
                    value,
                },
                span,
            ));
        }

        if self.match_token(&TokenKind::Colon) {
            self.check_assignable(&first)?;
            let annotation = self.parse_expression()?;
            let value = if self.match_token(&TokenKind::Equal) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            return Ok(Stmt::new(
                StmtKind::AnnAssign {
                    target: first,
                    annotation,
                    value,
                },
                span,
            ));
        }

        let aug_op = match self.peek().kind {
            TokenKind::PlusEqual => Some(BinaryOp::Add),
            TokenKind::MinusEqual => Some(BinaryOp::Sub),
            TokenKind::StarEqual => Some(BinaryOp::Mul),
            TokenKind::SlashEqual => Some(BinaryOp::Div),
            TokenKind::DoubleSlashEqual => Some(BinaryOp::FloorDiv),
            TokenKind::PercentEqual => Some(BinaryOp::Mod),
            _ => None,
        };
        if let Some(op) = aug_op {
            self.advance();
            self.check_assignable(&first)?;
            let value = self.parse_expression()?;
            return Ok(Stmt::new(
                StmtKind::AugAssign {
                    target: first,
                    op,
                    value,
                },
                span,
            ));
        }

        Ok(Stmt::new(StmtKind::Expr(first), span))
    }

    fn check_assignable(&self, target: &Expr) -> Result<(), CompilerError> {
        match &target.kind {
            ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => Ok(()),
            ExprKind::Tuple(items) => {
                for item in items {
                    self.check_assignable(item)?;
                }
                Ok(())
            }
            _ => Err(CompilerError::SyntaxError(
                format!("cannot assign to {}", target.describe()),
                target.span,
            )),
        }
    }

    fn parse_decorated(&mut self) -> Result<Stmt, CompilerError> {
        let span = self.peek().span();
        let mut decorators = Vec::new();
        while self.match_token(&TokenKind::At) {
            decorators.push(self.parse_expression()?);
            self.consume(TokenKind::Newline, "end of line after decorator")?;
            while self.match_token(&TokenKind::Newline) {}
        }
        match self.peek().kind {
            TokenKind::Def => self.parse_function_def(decorators, span),
            TokenKind::Class => self.parse_class_def(decorators, span),
            _ => Err(CompilerError::ExpectedToken(
                "'def' or 'class' after decorator".to_string(),
                self.peek().kind.describe(),
                self.peek().span(),
            )),
        }
    }

    fn parse_function_def(
        &mut self,
        decorators: Vec<Expr>,
        span: Span,
    ) -> Result<Stmt, CompilerError> {
        self.consume(TokenKind::Def, "'def'")?;
        let name = self.consume_identifier("function name")?;
        self.consume(TokenKind::LeftParen, "'(' after function name")?;

        let mut params = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            let param_span = self.peek().span();
            let param_name = self.consume_identifier("parameter name")?;
            let annotation = if self.match_token(&TokenKind::Colon) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            if self.check(&TokenKind::Equal) {
                return Err(CompilerError::UnsupportedSyntax(
                    "default parameter values are not supported".to_string(),
                    self.peek().span(),
                ));
            }
            params.push(Param {
                name: param_name,
                annotation,
                span: param_span,
            });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightParen, "')' after parameters")?;

        let returns = if self.match_token(&TokenKind::Arrow) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Colon, "':' after function signature")?;
        let body = self.parse_block()?;

        Ok(Stmt::new(
            StmtKind::FunctionDef(FunctionDef {
                name,
                params,
                returns,
                body,
                decorators,
            }),
            span,
        ))
    }

    fn parse_class_def(&mut self, decorators: Vec<Expr>, span: Span) -> Result<Stmt, CompilerError> {
        self.consume(TokenKind::Class, "'class'")?;
        let name = self.consume_identifier("class name")?;
        let mut bases = Vec::new();
        if self.match_token(&TokenKind::LeftParen) {
            while !self.check(&TokenKind::RightParen) {
                bases.push(self.parse_expression()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            self.consume(TokenKind::RightParen, "')' after class bases")?;
        }
        self.consume(TokenKind::Colon, "':' after class header")?;
        let body = self.parse_block()?;

        Ok(Stmt::new(
            StmtKind::ClassDef(ClassDef {
                name,
                bases,
                body,
                decorators,
            }),
            span,
        ))
    }

    fn parse_if(&mut self) -> Result<Stmt, CompilerError> {
        let span = self.peek().span();
        self.advance(); // 'if' or 'elif'
        let test = self.parse_expression()?;
        self.consume(TokenKind::Colon, "':' after condition")?;
        let body = self.parse_block()?;

        let orelse = if self.check(&TokenKind::Elif) {
            vec![self.parse_if()?]
        } else if self.match_token(&TokenKind::Else) {
            self.consume(TokenKind::Colon, "':' after 'else'")?;
            self.parse_block()?
        } else {
            Vec::new()
        };

        Ok(Stmt::new(StmtKind::If { test, body, orelse }, span))
    }

    fn parse_for(&mut self) -> Result<Stmt, CompilerError> {
        let span = self.peek().span();
        self.consume(TokenKind::For, "'for'")?;
        let target = self.parse_target_list()?;
        self.consume(TokenKind::In, "'in' in for statement")?;
        let iter = self.parse_expression_list()?;
        self.consume(TokenKind::Colon, "':' after for clause")?;
        let body = self.parse_block()?;
        let orelse = self.parse_loop_else()?;

        Ok(Stmt::new(
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            },
            span,
        ))
    }

    fn parse_while(&mut self) -> Result<Stmt, CompilerError> {
        let span = self.peek().span();
        self.consume(TokenKind::While, "'while'")?;
        let test = self.parse_expression()?;
        self.consume(TokenKind::Colon, "':' after while condition")?;
        let body = self.parse_block()?;
        let orelse = self.parse_loop_else()?;

        Ok(Stmt::new(StmtKind::While { test, body, orelse }, span))
    }

    fn parse_loop_else(&mut self) -> Result<Vec<Stmt>, CompilerError> {
        if self.match_token(&TokenKind::Else) {
            self.consume(TokenKind::Colon, "':' after 'else'")?;
            self.parse_block()
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_target_list(&mut self) -> Result<Expr, CompilerError> {
        let span = self.peek().span();
        let first = self.parse_postfix()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.match_token(&TokenKind::Comma) {
            if self.check(&TokenKind::In) {
                break;
            }
            items.push(self.parse_postfix()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), span))
    }

    /// Either a simple statement on the same line, or NEWLINE INDENT stmts DEDENT.
    fn parse_block(&mut self) -> Result<Vec<Stmt>, CompilerError> {
        if !self.match_token(&TokenKind::Newline) {
            let stmt = self.parse_simple_statement()?;
            self.end_of_line()?;
            return Ok(vec![stmt]);
        }

        self.consume(TokenKind::Indent, "an indented block")?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::Dedent) && !self.is_at_end() {
            if self.match_token(&TokenKind::Newline) {
                continue;
            }
            body.push(self.parse_statement()?);
        }
        self.consume(TokenKind::Dedent, "end of block")?;
        Ok(body)
    }

    fn end_of_line(&mut self) -> Result<(), CompilerError> {
        if self.match_token(&TokenKind::Newline) || self.check(&TokenKind::EOF) {
            return Ok(());
        }
        if self.check(&TokenKind::Dedent) {
            return Ok(());
        }
        Err(CompilerError::ExpectedToken(
            "end of line".to_string(),
            self.peek().kind.describe(),
            self.peek().span(),
        ))
    }

    fn parse_dotted_name(&mut self) -> Result<String, CompilerError> {
        let mut name = self.consume_identifier("module name")?;
        while self.match_token(&TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.consume_identifier("module name")?);
        }
        Ok(name)
    }

    // Expressions

    /// `a, b` without brackets is a tuple.
    fn parse_expression_list(&mut self) -> Result<Expr, CompilerError> {
        let span = self.peek().span();
        let first = self.parse_expression()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.match_token(&TokenKind::Comma) {
            if self.at_expression_end() {
                break;
            }
            items.push(self.parse_expression()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), span))
    }

    fn at_expression_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline
                | TokenKind::EOF
                | TokenKind::Equal
                | TokenKind::Colon
                | TokenKind::RightParen
                | TokenKind::RightBracket
                | TokenKind::RightBrace
        )
    }

    pub fn parse_expression(&mut self) -> Result<Expr, CompilerError> {
        if let TokenKind::Identifier(name) = &self.peek().kind {
            if name == "lambda" {
                return Err(CompilerError::UnsupportedSyntax(
                    "lambda expressions are not supported".to_string(),
                    self.peek().span(),
                ));
            }
        }
        let expr = self.parse_or()?;
        if self.check(&TokenKind::If) {
            return Err(CompilerError::UnsupportedSyntax(
                "conditional expressions are not supported; use an if statement".to_string(),
                self.peek().span(),
            ));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, CompilerError> {
        let mut left = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            let span = self.advance().span();
            let right = self.parse_and()?;
            left = binary(left, BinaryOp::Or, right, span);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, CompilerError> {
        let mut left = self.parse_not()?;
        while self.check(&TokenKind::And) {
            let span = self.advance().span();
            let right = self.parse_not()?;
            left = binary(left, BinaryOp::And, right, span);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, CompilerError> {
        if self.check(&TokenKind::Not) {
            let span = self.advance().span();
            let operand = self.parse_not()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, CompilerError> {
        let left = self.parse_additive()?;
        let op = match self.comparison_op() {
            Some(op) => op,
            None => return Ok(left),
        };
        let span = self.advance().span();
        let right = self.parse_additive()?;
        if self.comparison_op().is_some() {
            return Err(CompilerError::UnsupportedSyntax(
                "chained comparisons are not supported; combine them with 'and'".to_string(),
                self.peek().span(),
            ));
        }
        Ok(binary(left, op, right, span))
    }

    fn comparison_op(&self) -> Option<BinaryOp> {
        match self.peek().kind {
            TokenKind::EqualEqual => Some(BinaryOp::Eq),
            TokenKind::NotEqual => Some(BinaryOp::NotEq),
            TokenKind::Less => Some(BinaryOp::Lt),
            TokenKind::LessEqual => Some(BinaryOp::LtE),
            TokenKind::Greater => Some(BinaryOp::Gt),
            TokenKind::GreaterEqual => Some(BinaryOp::GtE),
            _ => None,
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, CompilerError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let span = self.advance().span();
            let right = self.parse_multiplicative()?;
            left = binary(left, op, right, span);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CompilerError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::DoubleSlash => BinaryOp::FloorDiv,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let span = self.advance().span();
            let right = self.parse_unary()?;
            left = binary(left, op, right, span);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompilerError> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Plus => Some(UnaryOp::Plus),
            _ => None,
        };
        if let Some(op) = op {
            let span = self.advance().span();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, CompilerError> {
        let base = self.parse_postfix()?;
        if self.check(&TokenKind::DoubleStar) {
            let span = self.advance().span();
            // right associative, binds tighter than unary minus on its left
            let exponent = self.parse_unary()?;
            return Ok(binary(base, BinaryOp::Pow, exponent, span));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompilerError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.match_token(&TokenKind::Dot) {
                let attr = self.consume_identifier("attribute name")?;
                let span = expr.span;
                expr = Expr::new(
                    ExprKind::Attribute {
                        value: Box::new(expr),
                        attr,
                    },
                    span,
                );
            } else if self.check(&TokenKind::LeftParen) {
                self.advance();
                let (args, keywords) = self.parse_call_arguments()?;
                let span = expr.span;
                expr = Expr::new(
                    ExprKind::Call {
                        func: Box::new(expr),
                        args,
                        keywords,
                    },
                    span,
                );
            } else if self.check(&TokenKind::LeftBracket) {
                self.advance();
                let index = self.parse_expression_list()?;
                self.consume(TokenKind::RightBracket, "']' after subscript")?;
                let span = expr.span;
                expr = Expr::new(
                    ExprKind::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<Keyword>), CompilerError> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();

        while !self.check(&TokenKind::RightParen) {
            if self.check(&TokenKind::Star) || self.check(&TokenKind::DoubleStar) {
                return Err(CompilerError::UnsupportedSyntax(
                    "argument unpacking is not supported".to_string(),
                    self.peek().span(),
                ));
            }
            let is_keyword = matches!(self.peek().kind, TokenKind::Identifier(_))
                && self.peek_next().kind == TokenKind::Equal;
            if is_keyword {
                let span = self.peek().span();
                let name = self.consume_identifier("keyword name")?;
                self.consume(TokenKind::Equal, "'='")?;
                let value = self.parse_expression()?;
                if keywords.iter().any(|kw| kw.name == name) {
                    return Err(CompilerError::SyntaxError(
                        format!("keyword argument '{}' repeated", name),
                        span,
                    ));
                }
                keywords.push(Keyword { name, value });
            } else {
                if !keywords.is_empty() {
                    return Err(CompilerError::SyntaxError(
                        "positional argument follows keyword argument".to_string(),
                        self.peek().span(),
                    ));
                }
                args.push(self.parse_expression()?);
            }
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightParen, "')' after arguments")?;
        Ok((args, keywords))
    }

    fn parse_primary(&mut self) -> Result<Expr, CompilerError> {
        let token = self.advance().clone();
        let span = token.span();
        let kind = match token.kind {
            TokenKind::Identifier(name) => ExprKind::Name(name),
            TokenKind::IntegerLiteral(value) => ExprKind::Int(value),
            TokenKind::FloatLiteral(value) => ExprKind::Float(value),
            TokenKind::StringLiteral(mut value) => {
                // Adjacent string literals concatenate
                while let TokenKind::StringLiteral(next) = &self.peek().kind {
                    value.push_str(next);
                    self.advance();
                }
                ExprKind::Str(value)
            }
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::None => ExprKind::None,
            TokenKind::LeftParen => {
                if self.match_token(&TokenKind::RightParen) {
                    ExprKind::Tuple(Vec::new())
                } else {
                    let inner = self.parse_expression()?;
                    if self.match_token(&TokenKind::RightParen) {
                        return Ok(inner);
                    }
                    let mut items = vec![inner];
                    while self.match_token(&TokenKind::Comma) {
                        if self.check(&TokenKind::RightParen) {
                            break;
                        }
                        items.push(self.parse_expression()?);
                    }
                    self.consume(TokenKind::RightParen, "')'")?;
                    ExprKind::Tuple(items)
                }
            }
            TokenKind::LeftBracket => {
                let mut items = Vec::new();
                while !self.check(&TokenKind::RightBracket) {
                    items.push(self.parse_expression()?);
                    if self.check(&TokenKind::For) {
                        return Err(CompilerError::UnsupportedSyntax(
                            "comprehensions are not supported".to_string(),
                            self.peek().span(),
                        ));
                    }
                    if !self.match_token(&TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(TokenKind::RightBracket, "']' after list")?;
                ExprKind::List(items)
            }
            TokenKind::LeftBrace => {
                let mut entries = Vec::new();
                while !self.check(&TokenKind::RightBrace) {
                    let key = self.parse_expression()?;
                    self.consume(TokenKind::Colon, "':' in dict literal")?;
                    let value = self.parse_expression()?;
                    entries.push((key, value));
                    if !self.match_token(&TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(TokenKind::RightBrace, "'}' after dict")?;
                ExprKind::Dict(entries)
            }
            other => {
                return Err(CompilerError::ExpectedToken(
                    "an expression".to_string(),
                    other.describe(),
                    span,
                ));
            }
        };
        Ok(Expr::new(kind, span))
    }

    // Token helpers

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.current.min(last)]
    }

    fn peek_next(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.current + 1).min(last)]
    }

    fn is_at_end(&self) -> bool {
        self.tokens.is_empty() || self.peek().kind == TokenKind::EOF
    }

    fn advance(&mut self) -> &Token {
        if self.is_at_end() {
            return self.peek();
        }
        self.current += 1;
        &self.tokens[self.current - 1]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        !self.tokens.is_empty() && &self.peek().kind == kind
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, expected: &str) -> Result<(), CompilerError> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(CompilerError::ExpectedToken(
                expected.to_string(),
                self.peek().kind.describe(),
                self.peek().span(),
            ))
        }
    }

    fn consume_identifier(&mut self, expected: &str) -> Result<String, CompilerError> {
        if let TokenKind::Identifier(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(CompilerError::ExpectedToken(
                expected.to_string(),
                self.peek().kind.describe(),
                self.peek().span(),
            ))
        }
    }
}

fn binary(left: Expr, op: BinaryOp, right: Expr, span: Span) -> Expr {
    let span = if left.span.is_known() { left.span } else { span };
    Expr::new(
        ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    )
}

/// Lex and parse a source text in one step.
pub fn parse_source(source: &str) -> Result<Module, CompilerError> {
    let mut lexer = crate::stage_compiler::lexer::Lexer::new(source);
    let tokens = lexer.tokenize()?;
    let mut parser = Parser::new(tokens);
    parser.parse()
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
