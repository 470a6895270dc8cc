use super::ast::{BinaryOp, Expression, Program, Statement, UnaryOp};
use crate::error::{Error, Result};
use crate::lexer::{Token, TokenKind};

/// Declaration keywords accepted before a variable name. The template
/// language is dynamically typed, so the keyword only marks a declaration.
const DECLARATION_KEYWORDS: &[&str] = &[
    "int", "uint", "long", "ulong", "short", "ushort", "char", "uchar", "float", "double", "bool",
    "string", "var", "auto",
];

/// Recursive-descent parser for template code
pub struct TemplateParser {
    tokens: Vec<Token>,
    current: usize,
}

impl TemplateParser {
    /// Creates a new parser over scanned tokens
    pub fn new(tokens: Vec<Token>) -> Self {
        TemplateParser { tokens, current: 0 }
    }

    /// Parses the tokens into a program
    pub fn parse(&mut self) -> Result<Program> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            statements.push(self.parse_statement()?);
        }

        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match &self.peek().kind {
            TokenKind::LeftBrace => self.parse_block(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Break => {
                self.advance();
                self.consume(TokenKind::Semicolon, "';' after 'break'")?;
                Ok(Statement::Break)
            }
            TokenKind::Continue => {
                self.advance();
                self.consume(TokenKind::Semicolon, "';' after 'continue'")?;
                Ok(Statement::Continue)
            }
            TokenKind::Semicolon => {
                self.advance();
                Ok(Statement::Empty)
            }
            _ => {
                let stmt = self.parse_simple_statement()?;
                self.consume(TokenKind::Semicolon, "';' after statement")?;
                Ok(stmt)
            }
        }
    }

    /// Declaration or expression, without the trailing `;`
    fn parse_simple_statement(&mut self) -> Result<Statement> {
        if self.at_declaration() {
            self.advance();
            let name = self.expect_identifier("variable name")?;
            let value = if self.match_kind(&TokenKind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            return Ok(Statement::Declaration { name, value });
        }
        Ok(Statement::Expression(self.parse_expression()?))
    }

    fn at_declaration(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Identifier(word) if DECLARATION_KEYWORDS.contains(&word.as_str()) => {
                matches!(self.peek_at(1).kind, TokenKind::Identifier(_))
            }
            _ => false,
        }
    }

    fn parse_block(&mut self) -> Result<Statement> {
        self.consume(TokenKind::LeftBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            if self.is_at_end() {
                return Err(self.syntax_error("Unclosed '{': expected '}' before end of template"));
            }
            statements.push(self.parse_statement()?);
        }
        self.consume(TokenKind::RightBrace, "'}'")?;
        Ok(Statement::Block(statements))
    }

    fn parse_if(&mut self) -> Result<Statement> {
        self.consume(TokenKind::If, "'if'")?;
        self.consume(TokenKind::LeftParen, "'(' after 'if'")?;
        let condition = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "')' after if condition")?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.match_kind(&TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_while(&mut self) -> Result<Statement> {
        self.consume(TokenKind::While, "'while'")?;
        self.consume(TokenKind::LeftParen, "'(' after 'while'")?;
        let condition = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "')' after while condition")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::While { condition, body })
    }

    fn parse_for(&mut self) -> Result<Statement> {
        self.consume(TokenKind::For, "'for'")?;
        self.consume(TokenKind::LeftParen, "'(' after 'for'")?;

        let init = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_simple_statement()?))
        };
        self.consume(TokenKind::Semicolon, "';' after for initializer")?;

        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::Semicolon, "';' after for condition")?;

        let step = if self.check(&TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::RightParen, "')' after for clauses")?;

        let body = Box::new(self.parse_statement()?);
        Ok(Statement::For {
            init,
            condition,
            step,
            body,
        })
    }

    /// Parse an expression, including assignment
    fn parse_expression(&mut self) -> Result<Expression> {
        let target = self.parse_ternary()?;

        let op = match self.peek().kind {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinaryOp::Add),
            TokenKind::MinusAssign => Some(BinaryOp::Sub),
            TokenKind::StarAssign => Some(BinaryOp::Mul),
            TokenKind::SlashAssign => Some(BinaryOp::Div),
            TokenKind::PercentAssign => Some(BinaryOp::Mod),
            _ => return Ok(target),
        };

        let name = match target {
            Expression::Variable(name) => name,
            _ => return Err(self.syntax_error("Left side of assignment must be a variable")),
        };
        self.advance();
        let value = Box::new(self.parse_expression()?);
        Ok(Expression::Assign { name, op, value })
    }

    fn parse_ternary(&mut self) -> Result<Expression> {
        let condition = self.parse_binary(0)?;
        if !self.match_kind(&TokenKind::Question) {
            return Ok(condition);
        }
        let then_expr = self.parse_expression()?;
        self.consume(TokenKind::Colon, "':' in conditional expression")?;
        let else_expr = self.parse_ternary()?;
        Ok(Expression::Ternary {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    /// Precedence climbing over the binary operator table
    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expression> {
        let mut left = self.parse_unary()?;

        while let Some((op, precedence)) = Self::binary_op(&self.peek().kind) {
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let right = self.parse_binary(precedence + 1)?;
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
        let entry = match kind {
            TokenKind::Or => (BinaryOp::Or, 0),
            TokenKind::And => (BinaryOp::And, 1),
            TokenKind::Pipe => (BinaryOp::BitOr, 2),
            TokenKind::Caret => (BinaryOp::BitXor, 3),
            TokenKind::Amp => (BinaryOp::BitAnd, 4),
            TokenKind::Eq => (BinaryOp::Eq, 5),
            TokenKind::NotEq => (BinaryOp::NotEq, 5),
            TokenKind::Lt => (BinaryOp::Lt, 6),
            TokenKind::LtEq => (BinaryOp::LtEq, 6),
            TokenKind::Gt => (BinaryOp::Gt, 6),
            TokenKind::GtEq => (BinaryOp::GtEq, 6),
            TokenKind::Shl => (BinaryOp::Shl, 7),
            TokenKind::Shr => (BinaryOp::Shr, 7),
            TokenKind::Plus => (BinaryOp::Add, 8),
            TokenKind::Minus => (BinaryOp::Sub, 8),
            TokenKind::Star => (BinaryOp::Mul, 9),
            TokenKind::Slash => (BinaryOp::Div, 9),
            TokenKind::Percent => (BinaryOp::Mod, 9),
            _ => return None,
        };
        Some(entry)
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = Box::new(self.parse_unary()?);
            return Ok(Expression::Unary { op, operand });
        }

        if matches!(self.peek().kind, TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let delta = if self.advance().kind == TokenKind::PlusPlus {
                1
            } else {
                -1
            };
            let name = self.expect_identifier("variable after prefix increment")?;
            return Ok(Expression::Increment {
                name,
                delta,
                prefix: true,
            });
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression> {
        let expr = self.parse_primary()?;

        if matches!(self.peek().kind, TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let name = match expr {
                Expression::Variable(name) => name,
                _ => return Err(self.syntax_error("Increment target must be a variable")),
            };
            let delta = if self.advance().kind == TokenKind::PlusPlus {
                1
            } else {
                -1
            };
            return Ok(Expression::Increment {
                name,
                delta,
                prefix: false,
            });
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        match self.peek().kind.clone() {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expression::IntLiteral(n))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expression::FloatLiteral(f))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expression::StringLiteral(s))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::BoolLiteral(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::BoolLiteral(false))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.match_kind(&TokenKind::LeftParen) {
                    let args = self.parse_arguments()?;
                    Ok(Expression::Call { name, args })
                } else {
                    Ok(Expression::Variable(name))
                }
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.consume(TokenKind::RightParen, "')' after expression")?;
                Ok(expr)
            }
            other => Err(self.syntax_error(format!(
                "Unexpected {} in expression; expected a number, string, variable, call or '('",
                other
            ))),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expression>> {
        let mut args = Vec::new();
        if self.match_kind(&TokenKind::RightParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            if self.match_kind(&TokenKind::Comma) {
                continue;
            }
            self.consume(TokenKind::RightParen, "')' after arguments")?;
            return Ok(args);
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.current + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.tokens[self.current - 1].clone()
    }

    fn check(&self, kind: &TokenKind) -> bool {
        if self.is_at_end() {
            return false;
        }
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn match_kind(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, expected: &str) -> Result<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.syntax_error(format!("Expected {}, got {}", expected, self.peek().kind)))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.syntax_error(format!("Expected {}, got {}", what, other))),
        }
    }

    fn syntax_error(&self, message: impl Into<String>) -> Error {
        let token = self.peek();
        Error::TemplateSyntaxError {
            line: token.line,
            col: token.column,
            message: message.into(),
            listing: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::TemplateScanner;

    fn parse(source: &str) -> Result<Program> {
        let mut scanner = TemplateScanner::new(source);
        let tokens = scanner.scan_tokens()?;
        TemplateParser::new(tokens).parse()
    }

    #[test]
    fn test_for_loop() {
        let program = parse("for(i=0;i<3;i++) { }").unwrap();
        assert_eq!(program.statements.len(), 1);
        match &program.statements[0] {
            Statement::For {
                init,
                condition,
                step,
                body,
            } => {
                assert!(init.is_some());
                assert!(condition.is_some());
                assert_eq!(
                    step,
                    &Some(Expression::Increment {
                        name: "i".to_string(),
                        delta: 1,
                        prefix: false,
                    })
                );
                assert_eq!(**body, Statement::Block(vec![]));
            }
            other => panic!("expected for loop, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let program = parse("x = 1 + 2 * 3;").unwrap();
        let expected = Statement::Expression(Expression::Assign {
            name: "x".to_string(),
            op: None,
            value: Box::new(Expression::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expression::IntLiteral(1)),
                right: Box::new(Expression::Binary {
                    op: BinaryOp::Mul,
                    left: Box::new(Expression::IntLiteral(2)),
                    right: Box::new(Expression::IntLiteral(3)),
                }),
            }),
        });
        assert_eq!(program.statements[0], expected);
    }

    #[test]
    fn test_declaration() {
        let program = parse("int n = 4; float f;").unwrap();
        assert_eq!(
            program.statements[0],
            Statement::Declaration {
                name: "n".to_string(),
                value: Some(Expression::IntLiteral(4)),
            }
        );
        assert_eq!(
            program.statements[1],
            Statement::Declaration {
                name: "f".to_string(),
                value: None,
            }
        );
    }

    #[test]
    fn test_if_else_chain() {
        let program = parse("if (a) b = 1; else if (c) b = 2; else b = 3;").unwrap();
        match &program.statements[0] {
            Statement::If { else_branch, .. } => {
                let nested = else_branch.as_ref().unwrap();
                assert!(matches!(**nested, Statement::If { .. }));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_semicolon_reports_position() {
        match parse("x = 1\ny = 2;") {
            Err(Error::TemplateSyntaxError { line, col, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(col, 1);
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_unclosed_block() {
        assert!(matches!(
            parse("for (i = 0; i < 2; i++) {"),
            Err(Error::TemplateSyntaxError { .. })
        ));
    }
}
