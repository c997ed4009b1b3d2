use std::ops::Range;

use crate::parser::SyntaxConfig;
use crate::parser::error::ParseError;

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Raw template text between tags.
    Data(String),

    // Delimiters
    VariableBegin, // {{
    VariableEnd,   // }}
    BlockBegin,    // {%
    BlockEnd,      // %}

    // Literals & identifiers
    Name(String),
    Str(String),
    Integer(i64),
    Float(f64),

    // Operators
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv, // //
    Mod,
    Tilde,
    Dot,
    Comma,
    Colon,
    Pipe,
    Assign, // =
    EqEq,
    Ne,
    Lt,
    Gt,
    LtEq,
    GtEq,

    // Grouping
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Eof,
}

/// Token kind (for matching without payloads).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Data,
    VariableBegin,
    VariableEnd,
    BlockBegin,
    BlockEnd,
    Name,
    Str,
    Integer,
    Float,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Tilde,
    Dot,
    Comma,
    Colon,
    Pipe,
    Assign,
    EqEq,
    Ne,
    Lt,
    Gt,
    LtEq,
    GtEq,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Eof,
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Data(_) => TokenKind::Data,
            Token::VariableBegin => TokenKind::VariableBegin,
            Token::VariableEnd => TokenKind::VariableEnd,
            Token::BlockBegin => TokenKind::BlockBegin,
            Token::BlockEnd => TokenKind::BlockEnd,
            Token::Name(_) => TokenKind::Name,
            Token::Str(_) => TokenKind::Str,
            Token::Integer(_) => TokenKind::Integer,
            Token::Float(_) => TokenKind::Float,
            Token::Add => TokenKind::Add,
            Token::Sub => TokenKind::Sub,
            Token::Mul => TokenKind::Mul,
            Token::Div => TokenKind::Div,
            Token::FloorDiv => TokenKind::FloorDiv,
            Token::Mod => TokenKind::Mod,
            Token::Tilde => TokenKind::Tilde,
            Token::Dot => TokenKind::Dot,
            Token::Comma => TokenKind::Comma,
            Token::Colon => TokenKind::Colon,
            Token::Pipe => TokenKind::Pipe,
            Token::Assign => TokenKind::Assign,
            Token::EqEq => TokenKind::EqEq,
            Token::Ne => TokenKind::Ne,
            Token::Lt => TokenKind::Lt,
            Token::Gt => TokenKind::Gt,
            Token::LtEq => TokenKind::LtEq,
            Token::GtEq => TokenKind::GtEq,
            Token::LParen => TokenKind::LParen,
            Token::RParen => TokenKind::RParen,
            Token::LBracket => TokenKind::LBracket,
            Token::RBracket => TokenKind::RBracket,
            Token::LBrace => TokenKind::LBrace,
            Token::RBrace => TokenKind::RBrace,
            Token::Eof => TokenKind::Eof,
        }
    }

    /// Human-readable description used in "expected X, got Y" messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Name(name) => format!("'{}'", name),
            Token::Str(_) => "string".to_string(),
            Token::Integer(n) => format!("'{}'", n),
            Token::Float(n) => format!("'{}'", n),
            Token::Data(_) => "template data".to_string(),
            other => other.kind().describe().to_string(),
        }
    }
}

impl TokenKind {
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Data => "template data",
            TokenKind::VariableBegin => "begin of print statement",
            TokenKind::VariableEnd => "end of print statement",
            TokenKind::BlockBegin => "begin of statement block",
            TokenKind::BlockEnd => "end of statement block",
            TokenKind::Name => "name",
            TokenKind::Str => "string",
            TokenKind::Integer => "integer",
            TokenKind::Float => "float",
            TokenKind::Add => "'+'",
            TokenKind::Sub => "'-'",
            TokenKind::Mul => "'*'",
            TokenKind::Div => "'/'",
            TokenKind::FloorDiv => "'//'",
            TokenKind::Mod => "'%'",
            TokenKind::Tilde => "'~'",
            TokenKind::Dot => "'.'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Pipe => "'|'",
            TokenKind::Assign => "'='",
            TokenKind::EqEq => "'=='",
            TokenKind::Ne => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Gt => "'>'",
            TokenKind::LtEq => "'<='",
            TokenKind::GtEq => "'>='",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Eof => "end of template",
        }
    }
}

/// A token with its byte span and 1-based source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Range<usize>,
    pub lineno: usize,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Split template source into a token stream terminated by `Token::Eof`.
pub fn tokenize(
    source: &str,
    file_id: usize,
    config: &SyntaxConfig,
) -> Result<Vec<Spanned>, ParseError> {
    let mut source = source;
    if !config.keep_trailing_newline {
        source = source
            .strip_suffix("\r\n")
            .or_else(|| source.strip_suffix('\n'))
            .unwrap_or(source);
    }

    let mut lexer = Lexer::new(source, file_id, config);
    lexer.run()?;
    let end = source.len();
    lexer.push(Token::Eof, end..end);
    Ok(lexer.tokens)
}

// ---------------------------------------------------------------------------
// Lexer state
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq)]
enum TagKind {
    Variable,
    Block,
}

impl TagKind {
    fn closing(self) -> &'static str {
        match self {
            TagKind::Variable => "}}",
            TagKind::Block => "%}",
        }
    }
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    file_id: usize,
    config: &'a SyntaxConfig,
    /// Byte offsets at which each line starts.
    line_starts: Vec<usize>,
    tokens: Vec<Spanned>,
    /// The previous tag ended with `-`: strip leading whitespace of the next data.
    strip_leading: bool,
    /// The previous tag was a block or comment and `trim_blocks` is set.
    trim_newline: bool,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, file_id: usize, config: &'a SyntaxConfig) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Lexer {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            file_id,
            config,
            line_starts,
            tokens: Vec::new(),
            strip_leading: false,
            trim_newline: false,
        }
    }

    fn lineno(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= offset)
    }

    fn error(&self, msg: impl Into<String>, span: Range<usize>) -> ParseError {
        let lineno = self.lineno(span.start);
        ParseError::syntax(msg, span, lineno, self.file_id)
    }

    fn push(&mut self, token: Token, span: Range<usize>) {
        let lineno = self.lineno(span.start);
        self.tokens.push(Spanned {
            token,
            span,
            lineno,
        });
    }

    fn at(&self, s: &str) -> bool {
        self.source[self.pos..].starts_with(s)
    }

    /// Find the next `{{`, `{%` or `{#` at or after `from`.
    fn find_tag_start(&self, from: usize) -> Option<usize> {
        let mut i = from;
        while let Some(rel) = self.source[i..].find('{') {
            let at = i + rel;
            if matches!(self.bytes.get(at + 1), Some(b'{' | b'%' | b'#')) {
                return Some(at);
            }
            i = at + 1;
        }
        None
    }

    fn run(&mut self) -> Result<(), ParseError> {
        while self.pos < self.bytes.len() {
            let tag_start = self.find_tag_start(self.pos);
            let data_end = tag_start.unwrap_or(self.bytes.len());
            let strip_trailing = tag_start.is_some_and(|s| self.bytes.get(s + 2) == Some(&b'-'));
            self.emit_data(data_end, strip_trailing);

            let Some(start) = tag_start else { break };
            match self.bytes[start + 1] {
                b'#' => self.lex_comment(start)?,
                b'{' => self.lex_tag(start, TagKind::Variable)?,
                _ => self.lex_tag(start, TagKind::Block)?,
            }
        }
        Ok(())
    }

    fn emit_data(&mut self, end: usize, strip_trailing: bool) {
        let mut start = self.pos;
        let mut stop = end;
        let raw = &self.source[start..stop];

        if self.strip_leading {
            start += raw.len() - raw.trim_start().len();
        } else if self.trim_newline {
            if raw.starts_with("\r\n") {
                start += 2;
            } else if raw.starts_with('\n') {
                start += 1;
            }
        }
        self.strip_leading = false;
        self.trim_newline = false;

        if strip_trailing && start < stop {
            let kept = &self.source[start..stop];
            stop = start + kept.trim_end().len();
        }

        if start < stop {
            let text = self.source[start..stop].to_string();
            self.push(Token::Data(text), start..stop);
        }
        self.pos = end;
    }

    fn lex_comment(&mut self, start: usize) -> Result<(), ParseError> {
        let body_start = start + 2;
        let Some(rel) = self.source[body_start..].find("#}") else {
            return Err(self.error("missing end of comment tag", start..start + 2));
        };
        let close = body_start + rel;
        self.strip_leading = close > body_start && self.bytes[close - 1] == b'-';
        self.trim_newline = self.config.trim_blocks;
        self.pos = close + 2;
        Ok(())
    }

    fn lex_tag(&mut self, start: usize, kind: TagKind) -> Result<(), ParseError> {
        let begin = match kind {
            TagKind::Variable => Token::VariableBegin,
            TagKind::Block => Token::BlockBegin,
        };
        self.pos = start + 2;
        if self.bytes.get(self.pos) == Some(&b'-') {
            self.pos += 1;
        }
        self.push(begin, start..self.pos);

        let closing = kind.closing();
        let mut depth = 0usize;
        loop {
            self.skip_whitespace();
            if self.pos >= self.bytes.len() {
                return Err(self
                    .error(
                        format!("unexpected end of template, expected '{}'", closing),
                        start..start + 2,
                    )
                    .with_note("the tag opened here was never closed"));
            }

            if depth == 0 {
                let trimmed_close = format!("-{}", closing);
                if self.at(&trimmed_close) {
                    let end = self.pos + 3;
                    self.push(Self::end_token(kind), self.pos..end);
                    self.pos = end;
                    self.strip_leading = true;
                    return Ok(());
                }
                if self.at(closing) {
                    let end = self.pos + 2;
                    self.push(Self::end_token(kind), self.pos..end);
                    self.pos = end;
                    self.trim_newline = kind == TagKind::Block && self.config.trim_blocks;
                    return Ok(());
                }
            }

            let token = self.lex_token()?;
            match token {
                Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                Token::RParen | Token::RBracket | Token::RBrace => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
    }

    fn end_token(kind: TagKind) -> Token {
        match kind {
            TagKind::Variable => Token::VariableEnd,
            TagKind::Block => Token::BlockEnd,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    /// Lex a single token inside a tag and push it.
    fn lex_token(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        let c = self.bytes[start];

        let token = match c {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let mut end = start + 1;
                while end < self.bytes.len()
                    && (self.bytes[end].is_ascii_alphanumeric() || self.bytes[end] == b'_')
                {
                    end += 1;
                }
                self.pos = end;
                Token::Name(self.source[start..end].to_string())
            }
            b'0'..=b'9' => self.lex_number(start)?,
            b'\'' | b'"' => self.lex_string(start, c)?,
            _ => self.lex_operator(start)?,
        };

        self.push(token.clone(), start..self.pos);
        Ok(token)
    }

    fn lex_number(&mut self, start: usize) -> Result<Token, ParseError> {
        let mut end = start;
        while end < self.bytes.len() && self.bytes[end].is_ascii_digit() {
            end += 1;
        }
        let is_float = self.bytes.get(end) == Some(&b'.')
            && self.bytes.get(end + 1).is_some_and(u8::is_ascii_digit);
        if is_float {
            end += 1;
            while end < self.bytes.len() && self.bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
        self.pos = end;

        let text = &self.source[start..end];
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| self.error(format!("invalid float literal '{}'", text), start..end))
        } else {
            text.parse::<i64>()
                .map(Token::Integer)
                .map_err(|_| self.error(format!("integer literal '{}' is too large", text), start..end))
        }
    }

    fn lex_string(&mut self, start: usize, quote: u8) -> Result<Token, ParseError> {
        let mut value = String::new();
        let mut chars = self.source[start + 1..].char_indices();

        while let Some((offset, ch)) = chars.next() {
            let at = start + 1 + offset;
            if ch as u32 == quote as u32 {
                self.pos = at + 1;
                return Ok(Token::Str(value));
            }
            if ch == '\\' {
                match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, '\'')) => value.push('\''),
                    Some((_, '"')) => value.push('"'),
                    Some((_, other)) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => break,
                }
            } else {
                value.push(ch);
            }
        }

        Err(self.error("unterminated string", start..self.bytes.len()))
    }

    fn lex_operator(&mut self, start: usize) -> Result<Token, ParseError> {
        let two = self.source.get(start..start + 2);
        let double = match two {
            Some("//") => Some(Token::FloorDiv),
            Some("==") => Some(Token::EqEq),
            Some("!=") => Some(Token::Ne),
            Some("<=") => Some(Token::LtEq),
            Some(">=") => Some(Token::GtEq),
            _ => None,
        };
        if let Some(token) = double {
            self.pos = start + 2;
            return Ok(token);
        }

        let token = match self.bytes[start] {
            b'+' => Token::Add,
            b'-' => Token::Sub,
            b'*' => Token::Mul,
            b'/' => Token::Div,
            b'%' => Token::Mod,
            b'~' => Token::Tilde,
            b'.' => Token::Dot,
            b',' => Token::Comma,
            b':' => Token::Colon,
            b'|' => Token::Pipe,
            b'=' => Token::Assign,
            b'<' => Token::Lt,
            b'>' => Token::Gt,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'[' => Token::LBracket,
            b']' => Token::RBracket,
            b'{' => Token::LBrace,
            b'}' => Token::RBrace,
            _ => {
                let ch = self.source[start..].chars().next().unwrap_or('?');
                return Err(self.error(
                    format!("unexpected char '{}'", ch),
                    start..start + ch.len_utf8(),
                ));
            }
        };
        self.pos = start + 1;
        Ok(token)
    }
}
