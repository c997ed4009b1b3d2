use std::ops::Range;

/// A literal constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    /// Arithmetic negation: -x
    Neg,
    /// Unary plus: +x
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    /// String concatenation: a ~ b
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOperator {
    Eq,
    Ne,
    Lt,
    Gt,
    LtEq,
    GtEq,
    In,
    NotIn,
}

/// One link of a comparison chain: `<op> <expr>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub op: CompareOperator,
    pub expr: Expr,
}

/// An expression AST node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Const),
    Name(String, Range<usize>),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),

    /// `expr op1 a op2 b ...`, each operand compared against the previous value.
    Compare {
        expr: Box<Expr>,
        ops: Vec<Operand>,
    },
    BinaryOperation {
        operator: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOperation {
        operator: UnaryOperator,
        operand: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),

    /// `expr1 if test else expr2`; a missing else branch yields undefined.
    CondExpr {
        test: Box<Expr>,
        expr1: Box<Expr>,
        expr2: Option<Box<Expr>>,
    },

    /// `node is name`. Negated tests are wrapped in `Not`.
    Test {
        node: Box<Expr>,
        name: String,
        span: Range<usize>,
    },
    /// `node | name(args)`
    Filter {
        node: Box<Expr>,
        name: String,
        args: Vec<Expr>,
        span: Range<usize>,
    },
    Getattr {
        node: Box<Expr>,
        attr: String,
        span: Range<usize>,
    },
    Getitem {
        node: Box<Expr>,
        arg: Box<Expr>,
        span: Range<usize>,
    },
}

impl Expr {
    pub fn str(s: impl Into<String>) -> Self {
        Expr::Const(Const::Str(s.into()))
    }

    pub fn test(node: Expr, name: impl Into<String>, span: Range<usize>) -> Self {
        Expr::Test {
            node: Box::new(node),
            name: name.into(),
            span,
        }
    }

    /// Best-effort source span, for error reporting.
    pub fn span(&self) -> Option<Range<usize>> {
        match self {
            Expr::Name(_, span)
            | Expr::Test { span, .. }
            | Expr::Filter { span, .. }
            | Expr::Getattr { span, .. }
            | Expr::Getitem { span, .. } => Some(span.clone()),
            Expr::Compare { expr, .. } => expr.span(),
            Expr::BinaryOperation { left, .. } => left.span(),
            Expr::UnaryOperation { operand, .. } => operand.span(),
            Expr::And(left, _) | Expr::Or(left, _) => left.span(),
            Expr::Not(inner) => inner.span(),
            Expr::CondExpr { expr1, .. } => expr1.span(),
            Expr::Tuple(items) | Expr::List(items) => items.first().and_then(Expr::span),
            Expr::Const(_) | Expr::Dict(_) => None,
        }
    }
}
