use crate::ast::{Node, Target};
use crate::parser::error::ParseError;
use crate::parser::lexer::{Token, TokenKind};
use crate::parser::Parser;

impl<'a> Parser<'a> {
    /// Parse template data, prints and statements until one of `end_tokens`
    /// opens a block tag (left unconsumed on the tag name) or input ends.
    pub(crate) fn subparse(
        &mut self,
        end_tokens: Option<&[&'static str]>,
    ) -> Result<Vec<Node>, ParseError> {
        if let Some(ends) = end_tokens {
            self.end_token_stack.push(ends.to_vec());
        }
        let result = self.subparse_inner(end_tokens);
        if end_tokens.is_some() {
            self.end_token_stack.pop();
        }
        result
    }

    fn subparse_inner(
        &mut self,
        end_tokens: Option<&[&'static str]>,
    ) -> Result<Vec<Node>, ParseError> {
        let mut body = Vec::new();

        loop {
            let start = self.current().span.start;
            match &self.current().token {
                Token::Data(text) => {
                    body.push(Node::Text(text.clone()));
                    self.next_token();
                }
                Token::VariableBegin => {
                    self.next_token();
                    let expr = self.parse_tuple(true)?;
                    self.expect(TokenKind::VariableEnd)?;
                    body.push(Node::Output {
                        expr,
                        span: start..self.previous_end(),
                    });
                }
                Token::BlockBegin => {
                    self.next_token();
                    if let Some(ends) = end_tokens {
                        if ends.iter().any(|end| self.current_is_name(end)) {
                            return Ok(body);
                        }
                    }
                    let node = self.parse_statement()?;
                    self.expect(TokenKind::BlockEnd)?;
                    body.push(node);
                }
                Token::Eof => break,
                other => {
                    return Err(self.error(format!("unexpected {}", other.describe())));
                }
            }
        }

        Ok(body)
    }

    /// Parse the body of a statement up to one of `end_tokens`.
    ///
    /// Expects the current token to be the `%}` closing the statement's
    /// opening tag. Leaves the stream on the matched end tag name, or past it
    /// when `drop_needle` is set.
    pub fn parse_statements(
        &mut self,
        end_tokens: &[&'static str],
        drop_needle: bool,
    ) -> Result<Vec<Node>, ParseError> {
        self.skip_if(TokenKind::Colon);
        self.expect(TokenKind::BlockEnd)?;

        let body = self.subparse(Some(end_tokens))?;

        if self.current_is(TokenKind::Eof) {
            return Err(self.fail_eof(end_tokens));
        }
        if drop_needle {
            self.next_token();
        }
        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Node, ParseError> {
        let tag = match &self.current().token {
            Token::Name(name) => name.clone(),
            _ => return Err(self.error("tag name expected")),
        };

        match tag.as_str() {
            "if" => self.parse_if(),
            "for" => self.parse_for(),
            "block" => self.parse_block(),
            "extends" => self.parse_extends(),
            "set" => self.parse_set(),
            _ => {
                let extensions = self.extensions;
                match extensions.lookup(&tag) {
                    Some(extension) => extension.parse(self),
                    None => Err(self.fail_unknown_tag(&tag)),
                }
            }
        }
    }

    fn parse_if(&mut self) -> Result<Node, ParseError> {
        let start = self.next_token().span.start;
        let mut branches = Vec::new();
        let mut else_ = Vec::new();

        let mut test = self.parse_tuple(false)?;
        loop {
            let body = self.parse_statements(&["elif", "else", "endif"], false)?;
            branches.push((test, body));

            let tag = self.next_token();
            match &tag.token {
                Token::Name(name) if name == "elif" => {
                    test = self.parse_tuple(false)?;
                }
                Token::Name(name) if name == "else" => {
                    else_ = self.parse_statements(&["endif"], true)?;
                    break;
                }
                _ => break,
            }
        }

        let span = start..self.previous_end();
        let mut node = None;
        for (test, body) in branches.into_iter().rev() {
            let else_branch = match node.take() {
                Some(inner) => vec![inner],
                None => std::mem::take(&mut else_),
            };
            node = Some(Node::If {
                test,
                body,
                else_: else_branch,
                span: span.clone(),
            });
        }
        node.ok_or_else(|| self.error("empty if statement"))
    }

    fn parse_for(&mut self) -> Result<Node, ParseError> {
        let start = self.next_token().span.start;

        let target = self.parse_assign_target()?;
        if !self.skip_if_name("in") {
            return Err(self.error(format!(
                "expected 'in', got {}",
                self.current().token.describe()
            )));
        }
        let iter = self.parse_tuple(false)?;

        let body = self.parse_statements(&["endfor", "else"], false)?;
        let else_ = if self.next_token().token == Token::Name("else".to_string()) {
            self.parse_statements(&["endfor"], true)?
        } else {
            Vec::new()
        };

        Ok(Node::For {
            target,
            iter,
            body,
            else_,
            bind_loop: true,
            span: start..self.previous_end(),
        })
    }

    fn parse_block(&mut self) -> Result<Node, ParseError> {
        let start = self.next_token().span.start;
        let name = self.expect_name()?;

        let body = self.parse_statements(&["endblock"], true)?;
        self.skip_if_name(&name);

        Ok(Node::Block {
            name,
            body,
            span: start..self.previous_end(),
        })
    }

    fn parse_extends(&mut self) -> Result<Node, ParseError> {
        let start = self.next_token().span.start;
        let template = self.parse_expression()?;
        Ok(Node::Extends {
            template,
            span: start..self.previous_end(),
        })
    }

    fn parse_set(&mut self) -> Result<Node, ParseError> {
        let start = self.next_token().span.start;
        let target = self.expect_name()?;
        self.expect(TokenKind::Assign)?;
        let value = self.parse_tuple(true)?;
        Ok(Node::Set {
            target,
            value,
            span: start..self.previous_end(),
        })
    }

    /// `name` or `name, name, ...` (optionally parenthesized).
    fn parse_assign_target(&mut self) -> Result<Target, ParseError> {
        let parenthesized = self.skip_if(TokenKind::LParen);
        let mut names = vec![self.expect_name()?];
        while self.skip_if(TokenKind::Comma) {
            if self.current_is_name("in") || self.current_is(TokenKind::RParen) {
                break;
            }
            names.push(self.expect_name()?);
        }
        if parenthesized {
            self.expect(TokenKind::RParen)?;
        }

        if names.len() == 1 && !parenthesized {
            Ok(Target::Name(names.remove(0)))
        } else {
            Ok(Target::Tuple(names))
        }
    }

    fn innermost_end_tokens(&self) -> Option<String> {
        self.end_token_stack.last().map(|ends| {
            ends.iter()
                .map(|e| format!("'{}'", e))
                .collect::<Vec<_>>()
                .join(" or ")
        })
    }

    fn fail_unknown_tag(&self, tag: &str) -> ParseError {
        let mut err = self.error(format!("encountered unknown tag '{}'", tag));
        let is_end_tag = self
            .end_token_stack
            .iter()
            .any(|ends| ends.iter().any(|end| *end == tag));
        if let Some(expected) = self.innermost_end_tokens() {
            err = err.with_note(if is_end_tag {
                format!(
                    "you probably made a nesting mistake; the innermost block that needs to be closed expects {}",
                    expected
                )
            } else {
                format!("the parser was looking for {}", expected)
            });
        }
        err
    }

    fn fail_eof(&self, end_tokens: &[&'static str]) -> ParseError {
        let expected = end_tokens
            .iter()
            .map(|e| format!("'{}'", e))
            .collect::<Vec<_>>()
            .join(" or ");
        self.error(format!("unexpected end of template, expected {}", expected))
    }
}
