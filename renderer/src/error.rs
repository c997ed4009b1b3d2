use std::fmt;
use std::ops::Range;

use tmpl::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    TypeError { expected: String, got: String },
    NotIterable(String),
    UndefinedAttribute { owner: String, attr: String },
    UnknownFilter(String),
    UnknownTest(String),
    UnpackMismatch { expected: usize, got: usize },
    DivisionByZero,
    IntegerOverflow,
    /// `str * int` would exceed the repeat size limit.
    ResultTooLarge,
    TemplateNotFound(String),
    /// `extends` chain deeper than the limit, usually a cycle.
    InheritanceTooDeep(String),
    IoError(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::TypeError { expected, got } => {
                write!(f, "type error: expected {}, got {}", expected, got)
            }
            RenderError::NotIterable(type_name) => {
                write!(f, "'{}' object is not iterable", type_name)
            }
            RenderError::UndefinedAttribute { owner, attr } => {
                write!(f, "'{}' has no attribute '{}'", owner, attr)
            }
            RenderError::UnknownFilter(name) => write!(f, "no filter named '{}'", name),
            RenderError::UnknownTest(name) => write!(f, "no test named '{}'", name),
            RenderError::UnpackMismatch { expected, got } => {
                write!(f, "cannot unpack {} values into {} names", got, expected)
            }
            RenderError::DivisionByZero => write!(f, "division by zero"),
            RenderError::IntegerOverflow => write!(f, "integer overflow"),
            RenderError::ResultTooLarge => write!(f, "result too large"),
            RenderError::TemplateNotFound(name) => write!(f, "template not found: {}", name),
            RenderError::InheritanceTooDeep(name) => {
                write!(f, "template inheritance too deep (circular extends?) at '{}'", name)
            }
            RenderError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

/// A render error enriched with source location information.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticError {
    pub error: RenderError,
    pub span: Option<Range<usize>>,
    pub source_id: usize,
}

impl DiagnosticError {
    pub fn at(error: RenderError, span: Range<usize>, source_id: usize) -> Self {
        DiagnosticError {
            error,
            span: Some(span),
            source_id,
        }
    }

    /// Attach a location if the error does not carry one yet.
    pub fn or_at(mut self, span: Option<&Range<usize>>, source_id: usize) -> Self {
        if self.span.is_none() {
            if let Some(span) = span {
                self.span = Some(span.clone());
                self.source_id = source_id;
            }
        }
        self
    }
}

impl From<RenderError> for DiagnosticError {
    fn from(error: RenderError) -> Self {
        DiagnosticError {
            error,
            span: None,
            source_id: 0,
        }
    }
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for DiagnosticError {}

/// Errors returned by the [`Environment`](crate::Environment) API.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Parse(ParseError),
    Render(DiagnosticError),
    UnknownExtension(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(err) => write!(f, "syntax error: {}", err),
            Error::Render(err) => write!(f, "render error: {}", err),
            Error::UnknownExtension(name) => write!(f, "unknown extension: {}", name),
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Parse(err)
    }
}

impl From<DiagnosticError> for Error {
    fn from(err: DiagnosticError) -> Self {
        Error::Render(err)
    }
}

impl From<RenderError> for Error {
    fn from(err: RenderError) -> Self {
        Error::Render(err.into())
    }
}
