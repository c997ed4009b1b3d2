use crate::ast::{BinaryOperator, CompareOperator, Const, Expr, Operand, UnaryOperator};
use crate::parser::Parser;
use crate::parser::error::ParseError;
use crate::parser::lexer::{Token, TokenKind};

// Binding powers (precedence). Higher = tighter binding.
const BP_CONDITIONAL: u8 = 2; // x if y else z
const BP_OR: u8 = 4; // or
const BP_AND: u8 = 6; // and
const BP_NOT: u8 = 8; // not
const BP_COMPARE: u8 = 10; // == != < > <= >= in, not in
const BP_ADDITIVE: u8 = 12; // + -
const BP_CONCAT: u8 = 14; // ~
const BP_MULTIPLICATIVE: u8 = 16; // * / // %
const BP_UNARY: u8 = 18; // - +

#[derive(Debug, Clone, Copy, PartialEq)]
enum Infix {
    Conditional,
    Or,
    And,
    Compare(CompareOperator),
    Binary(BinaryOperator),
}

impl Infix {
    fn binding_power(self) -> u8 {
        match self {
            Infix::Conditional => BP_CONDITIONAL,
            Infix::Or => BP_OR,
            Infix::And => BP_AND,
            Infix::Compare(_) => BP_COMPARE,
            Infix::Binary(BinaryOperator::Add | BinaryOperator::Sub) => BP_ADDITIVE,
            Infix::Binary(BinaryOperator::Concat) => BP_CONCAT,
            Infix::Binary(_) => BP_MULTIPLICATIVE,
        }
    }
}

impl<'a> Parser<'a> {
    /// Parse one expression, including conditional expressions.
    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_expr(0, true)
    }

    /// Parse a comma-separated list of expressions. A single expression
    /// without a trailing comma is returned as-is; otherwise a `Tuple`.
    pub fn parse_tuple(&mut self, with_condexpr: bool) -> Result<Expr, ParseError> {
        let mut items = Vec::new();
        let mut saw_comma = false;

        loop {
            if !items.is_empty() {
                if !self.skip_if(TokenKind::Comma) {
                    break;
                }
                saw_comma = true;
            }
            if self.is_tuple_end() {
                break;
            }
            items.push(self.parse_expr(0, with_condexpr)?);
        }

        if !saw_comma {
            if let Some(item) = items.pop() {
                return Ok(item);
            }
            return Err(self.error(format!(
                "expected an expression, got {}",
                self.current().token.describe()
            )));
        }
        Ok(Expr::Tuple(items))
    }

    fn is_tuple_end(&self) -> bool {
        matches!(
            self.current().token.kind(),
            TokenKind::VariableEnd | TokenKind::BlockEnd | TokenKind::RParen | TokenKind::Eof
        ) || self.current_is_name("in")
    }

    // ------------------------------------------------------------------
    // Pratt parser core
    // ------------------------------------------------------------------

    fn parse_expr(&mut self, min_bp: u8, with_condexpr: bool) -> Result<Expr, ParseError> {
        let mut left = self.parse_prefix(with_condexpr)?;

        loop {
            let Some(infix) = self.current_infix(with_condexpr) else {
                break;
            };
            let bp = infix.binding_power();
            if bp < min_bp {
                break;
            }

            left = match infix {
                Infix::Conditional => {
                    self.next_token();
                    let test = self.parse_expr(BP_OR, false)?;
                    let expr2 = if self.skip_if_name("else") {
                        Some(Box::new(self.parse_expr(BP_CONDITIONAL, true)?))
                    } else {
                        None
                    };
                    Expr::CondExpr {
                        test: Box::new(test),
                        expr1: Box::new(left),
                        expr2,
                    }
                }
                Infix::Or => {
                    self.next_token();
                    let right = self.parse_expr(BP_OR + 1, with_condexpr)?;
                    Expr::Or(Box::new(left), Box::new(right))
                }
                Infix::And => {
                    self.next_token();
                    let right = self.parse_expr(BP_AND + 1, with_condexpr)?;
                    Expr::And(Box::new(left), Box::new(right))
                }
                Infix::Compare(_) => {
                    let mut ops = Vec::new();
                    while let Some(Infix::Compare(op)) = self.current_infix(with_condexpr) {
                        self.consume_compare_operator(op);
                        let expr = self.parse_expr(BP_COMPARE + 1, with_condexpr)?;
                        ops.push(Operand { op, expr });
                    }
                    Expr::Compare {
                        expr: Box::new(left),
                        ops,
                    }
                }
                Infix::Binary(operator) => {
                    self.next_token();
                    let right = self.parse_expr(bp + 1, with_condexpr)?;
                    Expr::BinaryOperation {
                        operator,
                        left: Box::new(left),
                        right: Box::new(right),
                    }
                }
            };
        }

        Ok(left)
    }

    fn current_infix(&self, with_condexpr: bool) -> Option<Infix> {
        let infix = match &self.current().token {
            Token::Name(name) => match name.as_str() {
                "if" if with_condexpr => Infix::Conditional,
                "or" => Infix::Or,
                "and" => Infix::And,
                "in" => Infix::Compare(CompareOperator::In),
                "not" if matches!(&self.look().token, Token::Name(n) if n == "in") => {
                    Infix::Compare(CompareOperator::NotIn)
                }
                _ => return None,
            },
            Token::EqEq => Infix::Compare(CompareOperator::Eq),
            Token::Ne => Infix::Compare(CompareOperator::Ne),
            Token::Lt => Infix::Compare(CompareOperator::Lt),
            Token::Gt => Infix::Compare(CompareOperator::Gt),
            Token::LtEq => Infix::Compare(CompareOperator::LtEq),
            Token::GtEq => Infix::Compare(CompareOperator::GtEq),
            Token::Add => Infix::Binary(BinaryOperator::Add),
            Token::Sub => Infix::Binary(BinaryOperator::Sub),
            Token::Tilde => Infix::Binary(BinaryOperator::Concat),
            Token::Mul => Infix::Binary(BinaryOperator::Mul),
            Token::Div => Infix::Binary(BinaryOperator::Div),
            Token::FloorDiv => Infix::Binary(BinaryOperator::FloorDiv),
            Token::Mod => Infix::Binary(BinaryOperator::Mod),
            _ => return None,
        };
        Some(infix)
    }

    fn consume_compare_operator(&mut self, op: CompareOperator) {
        self.next_token();
        if op == CompareOperator::NotIn {
            // `not in` spans two name tokens
            self.next_token();
        }
    }

    fn parse_prefix(&mut self, with_condexpr: bool) -> Result<Expr, ParseError> {
        match &self.current().token {
            Token::Name(name) if name == "not" => {
                self.next_token();
                let operand = self.parse_expr(BP_NOT, with_condexpr)?;
                Ok(Expr::Not(Box::new(operand)))
            }
            Token::Sub => {
                self.next_token();
                let operand = self.parse_expr(BP_UNARY, with_condexpr)?;
                Ok(Expr::UnaryOperation {
                    operator: UnaryOperator::Neg,
                    operand: Box::new(operand),
                })
            }
            Token::Add => {
                self.next_token();
                let operand = self.parse_expr(BP_UNARY, with_condexpr)?;
                Ok(Expr::UnaryOperation {
                    operator: UnaryOperator::Pos,
                    operand: Box::new(operand),
                })
            }
            _ => {
                let primary = self.parse_primary()?;
                self.parse_postfix(primary)
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.next_token();

        match token.token {
            Token::Name(name) => Ok(literal_name(&name).unwrap_or(Expr::Name(name, token.span))),
            Token::Str(mut s) => {
                // Adjacent string literals concatenate: "a" "b"
                while let Token::Str(next) = &self.current().token {
                    s.push_str(next);
                    self.next_token();
                }
                Ok(Expr::Const(Const::Str(s)))
            }
            Token::Integer(n) => Ok(Expr::Const(Const::Int(n))),
            Token::Float(n) => Ok(Expr::Const(Const::Float(n))),

            // Parenthesized expression or tuple
            Token::LParen => {
                if self.skip_if(TokenKind::RParen) {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let expr = self.parse_tuple(true)?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }

            Token::LBracket => {
                let items = self.parse_sequence(TokenKind::RBracket)?;
                Ok(Expr::List(items))
            }

            Token::LBrace => {
                let mut pairs = Vec::new();
                while !self.current_is(TokenKind::RBrace) {
                    if !pairs.is_empty() {
                        self.expect(TokenKind::Comma)?;
                        if self.current_is(TokenKind::RBrace) {
                            break;
                        }
                    }
                    let key = self.parse_expression()?;
                    self.expect(TokenKind::Colon)?;
                    let value = self.parse_expression()?;
                    pairs.push((key, value));
                }
                self.expect(TokenKind::RBrace)?;
                Ok(Expr::Dict(pairs))
            }

            Token::Eof => Err(self.error("unexpected end of template, expected an expression")),
            other => Err(ParseError::syntax(
                format!("unexpected {}", other.describe()),
                token.span,
                token.lineno,
                self.file_id(),
            )),
        }
    }

    /// Comma-separated expressions up to `close`, trailing comma allowed.
    fn parse_sequence(&mut self, close: TokenKind) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        while !self.current_is(close) {
            if !items.is_empty() {
                self.expect(TokenKind::Comma)?;
                if self.current_is(close) {
                    break;
                }
            }
            items.push(self.parse_expression()?);
        }
        self.expect(close)?;
        Ok(items)
    }

    /// Attribute access, subscripts, filters and tests.
    fn parse_postfix(&mut self, mut node: Expr) -> Result<Expr, ParseError> {
        loop {
            let start = self.current().span.start;
            match &self.current().token {
                Token::Dot => {
                    self.next_token();
                    let attr_token = self.next_token();
                    let attr = match attr_token.token {
                        Token::Name(name) => name,
                        Token::Integer(n) => n.to_string(),
                        other => {
                            return Err(self.error(format!(
                                "expected attribute name, got {}",
                                other.describe()
                            )));
                        }
                    };
                    node = Expr::Getattr {
                        node: Box::new(node),
                        attr,
                        span: start..self.previous_end(),
                    };
                }
                Token::LBracket => {
                    self.next_token();
                    let arg = self.parse_expression()?;
                    self.expect(TokenKind::RBracket)?;
                    node = Expr::Getitem {
                        node: Box::new(node),
                        arg: Box::new(arg),
                        span: start..self.previous_end(),
                    };
                }
                Token::Pipe => {
                    self.next_token();
                    let name = self.expect_name()?;
                    let args = if self.skip_if(TokenKind::LParen) {
                        self.parse_sequence(TokenKind::RParen)?
                    } else {
                        Vec::new()
                    };
                    node = Expr::Filter {
                        node: Box::new(node),
                        name,
                        args,
                        span: start..self.previous_end(),
                    };
                }
                Token::Name(name) if name == "is" => {
                    self.next_token();
                    let negated = self.skip_if_name("not");
                    let test_name = match &self.current().token {
                        // `is none`, `is true`: literal keywords double as test names
                        Token::Name(name) => name.to_lowercase(),
                        other => {
                            return Err(self.error(format!(
                                "expected test name, got {}",
                                other.describe()
                            )));
                        }
                    };
                    self.next_token();
                    let test = Expr::test(node, test_name, start..self.previous_end());
                    node = if negated {
                        Expr::Not(Box::new(test))
                    } else {
                        test
                    };
                }
                _ => break,
            }
        }
        Ok(node)
    }
}

/// Names that are literals rather than variable references.
fn literal_name(name: &str) -> Option<Expr> {
    match name {
        "true" | "True" => Some(Expr::Const(Const::Bool(true))),
        "false" | "False" => Some(Expr::Const(Const::Bool(false))),
        "none" | "None" => Some(Expr::Const(Const::None)),
        _ => None,
    }
}
