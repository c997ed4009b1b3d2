use std::cmp::Ordering;
use std::collections::BTreeMap;

use tmpl::ast::{BinaryOperator, CompareOperator, Const, Expr, UnaryOperator};

use crate::context::Context;
use crate::error::{DiagnosticError, RenderError};
use crate::value::Value;

/// Largest string `str * int` may produce, in bytes.
const MAX_REPEAT_LEN: usize = 16 * 1024 * 1024;

/// Evaluate an expression AST node to produce a Value.
pub fn evaluate(expr: &Expr, ctx: &Context, source_id: usize) -> Result<Value, DiagnosticError> {
    let eval = |e: &Expr| evaluate(e, ctx, source_id);

    match expr {
        // --- Literals ---
        Expr::Const(c) => Ok(const_value(c)),
        Expr::Tuple(items) | Expr::List(items) => {
            items.iter().map(eval).collect::<Result<Vec<_>, _>>().map(Value::Seq)
        }
        Expr::Dict(pairs) => {
            let mut map = BTreeMap::new();
            for (key, value) in pairs {
                map.insert(eval(key)?.to_string(), eval(value)?);
            }
            Ok(Value::Map(map))
        }

        // --- References ---
        Expr::Name(name, _) => Ok(ctx.get(name).cloned().unwrap_or(Value::Undefined)),

        Expr::Getattr { node, attr, span } => {
            let owner = eval(node)?;
            lookup(&owner, &Value::String(attr.clone()), node)
                .map_err(|e| DiagnosticError::at(e, span.clone(), source_id))
        }
        Expr::Getitem { node, arg, span } => {
            let owner = eval(node)?;
            let key = eval(arg)?;
            lookup(&owner, &key, node).map_err(|e| DiagnosticError::at(e, span.clone(), source_id))
        }

        // --- Operations ---
        Expr::UnaryOperation { operator, operand } => {
            let value = eval(operand)?;
            match (operator, &value) {
                (UnaryOperator::Neg, Value::Int(n)) => n
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| located(RenderError::IntegerOverflow, expr, source_id)),
                (UnaryOperator::Neg, Value::Float(n)) => Ok(Value::Float(-n)),
                (UnaryOperator::Pos, Value::Int(_) | Value::Float(_)) => Ok(value),
                _ => Err(type_error("number", &value, expr, source_id)),
            }
        }
        Expr::BinaryOperation {
            operator,
            left,
            right,
        } => {
            let l = eval(left)?;
            let r = eval(right)?;
            eval_binary_op(*operator, &l, &r).map_err(|e| located(e, expr, source_id))
        }
        Expr::Compare { expr: first, ops } => {
            let mut current = eval(first)?;
            for operand in ops {
                let next = eval(&operand.expr)?;
                let holds = compare(operand.op, &current, &next)
                    .map_err(|e| located(e, expr, source_id))?;
                if !holds {
                    return Ok(Value::Bool(false));
                }
                current = next;
            }
            Ok(Value::Bool(true))
        }

        // Logical operators short-circuit and return the deciding operand
        Expr::And(left, right) => {
            let l = eval(left)?;
            if l.is_truthy() { eval(right) } else { Ok(l) }
        }
        Expr::Or(left, right) => {
            let l = eval(left)?;
            if l.is_truthy() { Ok(l) } else { eval(right) }
        }
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner)?.is_truthy())),

        // --- Control flow ---
        Expr::CondExpr { test, expr1, expr2 } => {
            if eval(test)?.is_truthy() {
                eval(expr1)
            } else {
                match expr2 {
                    Some(e) => eval(e),
                    None => Ok(Value::Undefined),
                }
            }
        }

        // --- Tests & filters ---
        Expr::Test { node, name, span } => {
            let value = eval(node)?;
            apply_test(name, &value)
                .map(Value::Bool)
                .map_err(|e| DiagnosticError::at(e, span.clone(), source_id))
        }
        Expr::Filter {
            node,
            name,
            args,
            span,
        } => {
            let value = eval(node)?;
            let args = args.iter().map(eval).collect::<Result<Vec<_>, _>>()?;
            apply_filter(name, value, &args).map_err(|e| DiagnosticError::at(e, span.clone(), source_id))
        }
    }
}

fn const_value(c: &Const) -> Value {
    match c {
        Const::None => Value::None,
        Const::Bool(b) => Value::Bool(*b),
        Const::Int(n) => Value::Int(*n),
        Const::Float(n) => Value::Float(*n),
        Const::Str(s) => Value::String(s.clone()),
    }
}

fn located(error: RenderError, expr: &Expr, source_id: usize) -> DiagnosticError {
    let mut err = DiagnosticError::from(error);
    if let Some(span) = expr.span() {
        err.span = Some(span);
        err.source_id = source_id;
    }
    err
}

fn type_error(expected: &str, got: &Value, expr: &Expr, source_id: usize) -> DiagnosticError {
    located(
        RenderError::TypeError {
            expected: expected.to_string(),
            got: got.type_name().to_string(),
        },
        expr,
        source_id,
    )
}

/// Attribute or subscript access. Missing keys are undefined; any access on
/// an undefined value is an error naming the undefined expression.
fn lookup(owner: &Value, key: &Value, owner_expr: &Expr) -> Result<Value, RenderError> {
    match (owner, key) {
        (Value::Undefined, _) => Err(RenderError::UndefinedAttribute {
            owner: describe_undefined(owner_expr),
            attr: key.to_string(),
        }),
        (Value::Map(map), key) => Ok(map.get(&key.to_string()).cloned().unwrap_or_default()),
        (Value::Seq(items), Value::Int(idx)) => Ok(index(items.len(), *idx)
            .and_then(|i| items.get(i).cloned())
            .unwrap_or_default()),
        (Value::String(s), Value::Int(idx)) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(index(chars.len(), *idx)
                .map(|i| Value::String(chars[i].to_string()))
                .unwrap_or_default())
        }
        (Value::Seq(_) | Value::String(_), Value::String(attr)) if attr.parse::<i64>().is_ok() => {
            let idx = attr.parse::<i64>().unwrap_or_default();
            lookup(owner, &Value::Int(idx), owner_expr)
        }
        _ => Ok(Value::Undefined),
    }
}

/// Resolve a possibly negative index against a length.
fn index(len: usize, idx: i64) -> Option<usize> {
    let resolved = if idx < 0 { len as i64 + idx } else { idx };
    (resolved >= 0 && (resolved as usize) < len).then_some(resolved as usize)
}

fn describe_undefined(expr: &Expr) -> String {
    match expr {
        Expr::Name(name, _) => name.clone(),
        Expr::Getattr { node, attr, .. } => format!("{}.{}", describe_undefined(node), attr),
        _ => "undefined".to_string(),
    }
}

fn eval_binary_op(op: BinaryOperator, l: &Value, r: &Value) -> Result<Value, RenderError> {
    if op == BinaryOperator::Concat {
        return Ok(Value::String(format!("{}{}", l, r)));
    }

    match (op, l, r) {
        (BinaryOperator::Add, Value::String(a), Value::String(b)) => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        (BinaryOperator::Add, Value::Seq(a), Value::Seq(b)) => {
            Ok(Value::Seq(a.iter().chain(b.iter()).cloned().collect()))
        }
        (BinaryOperator::Mul, Value::String(s), Value::Int(n))
        | (BinaryOperator::Mul, Value::Int(n), Value::String(s)) => {
            let count = usize::try_from(*n).unwrap_or(0);
            match s.len().checked_mul(count) {
                Some(len) if len <= MAX_REPEAT_LEN => Ok(Value::String(s.repeat(count))),
                _ => Err(RenderError::ResultTooLarge),
            }
        }
        (_, Value::Int(a), Value::Int(b)) => int_op(op, *a, *b),
        _ => {
            let (Some(a), Some(b)) = (numeric(l), numeric(r)) else {
                return Err(RenderError::TypeError {
                    expected: "number".to_string(),
                    got: format!("{} and {}", l.type_name(), r.type_name()),
                });
            };
            float_op(op, a, b)
        }
    }
}

fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Int(_) | Value::Float(_) => v.as_f64(),
        _ => None,
    }
}

fn int_op(op: BinaryOperator, a: i64, b: i64) -> Result<Value, RenderError> {
    match op {
        BinaryOperator::Div => float_op(op, a as f64, b as f64),
        BinaryOperator::FloorDiv | BinaryOperator::Mod if b == 0 => {
            Err(RenderError::DivisionByZero)
        }
        BinaryOperator::Concat => Ok(Value::String(format!("{}{}", a, b))),
        BinaryOperator::Add => checked(a.checked_add(b)),
        BinaryOperator::Sub => checked(a.checked_sub(b)),
        BinaryOperator::Mul => checked(a.checked_mul(b)),
        BinaryOperator::FloorDiv => checked(a.checked_div_euclid(b)),
        BinaryOperator::Mod => checked(a.checked_rem_euclid(b)),
    }
}

fn checked(result: Option<i64>) -> Result<Value, RenderError> {
    result.map(Value::Int).ok_or(RenderError::IntegerOverflow)
}

fn float_op(op: BinaryOperator, a: f64, b: f64) -> Result<Value, RenderError> {
    match op {
        BinaryOperator::Add => Ok(Value::Float(a + b)),
        BinaryOperator::Sub => Ok(Value::Float(a - b)),
        BinaryOperator::Mul => Ok(Value::Float(a * b)),
        BinaryOperator::Div | BinaryOperator::FloorDiv | BinaryOperator::Mod if b == 0.0 => {
            Err(RenderError::DivisionByZero)
        }
        BinaryOperator::Div => Ok(Value::Float(a / b)),
        BinaryOperator::FloorDiv => Ok(Value::Float((a / b).floor())),
        BinaryOperator::Mod => Ok(Value::Float(a.rem_euclid(b))),
        BinaryOperator::Concat => Ok(Value::String(format!("{}{}", a, b))),
    }
}

fn compare(op: CompareOperator, l: &Value, r: &Value) -> Result<bool, RenderError> {
    match op {
        CompareOperator::Eq => Ok(l == r),
        CompareOperator::Ne => Ok(l != r),
        CompareOperator::In => contains(r, l),
        CompareOperator::NotIn => contains(r, l).map(|found| !found),
        CompareOperator::Lt => order(l, r).map(|o| o == Ordering::Less),
        CompareOperator::Gt => order(l, r).map(|o| o == Ordering::Greater),
        CompareOperator::LtEq => order(l, r).map(|o| o != Ordering::Greater),
        CompareOperator::GtEq => order(l, r).map(|o| o != Ordering::Less),
    }
}

fn order(l: &Value, r: &Value) -> Result<Ordering, RenderError> {
    match (l, r) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => match (numeric(l), numeric(r)) {
            (Some(a), Some(b)) => a.partial_cmp(&b).ok_or(RenderError::TypeError {
                expected: "comparable numbers".to_string(),
                got: "NaN".to_string(),
            }),
            _ => Err(RenderError::TypeError {
                expected: "comparable values".to_string(),
                got: format!("{} and {}", l.type_name(), r.type_name()),
            }),
        },
    }
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool, RenderError> {
    match (haystack, needle) {
        (Value::String(s), Value::String(sub)) => Ok(s.contains(sub.as_str())),
        (Value::Seq(items), _) => Ok(items.contains(needle)),
        (Value::Map(map), _) => Ok(map.contains_key(&needle.to_string())),
        _ => Err(RenderError::TypeError {
            expected: "container".to_string(),
            got: haystack.type_name().to_string(),
        }),
    }
}

/// Apply a named `is` test.
pub fn apply_test(name: &str, value: &Value) -> Result<bool, RenderError> {
    let result = match name {
        "defined" => !value.is_undefined(),
        "undefined" => value.is_undefined(),
        "none" => matches!(value, Value::None),
        "string" => matches!(value, Value::String(_)),
        "number" => matches!(value, Value::Int(_) | Value::Float(_)),
        "sequence" => matches!(value, Value::Seq(_) | Value::String(_) | Value::Map(_)),
        "mapping" => matches!(value, Value::Map(_)),
        "iterable" => matches!(
            value,
            Value::Seq(_) | Value::String(_) | Value::Map(_) | Value::Undefined
        ),
        "true" => matches!(value, Value::Bool(true)),
        "false" => matches!(value, Value::Bool(false)),
        "even" | "odd" => match value {
            Value::Int(n) => (n % 2 == 0) == (name == "even"),
            other => {
                return Err(RenderError::TypeError {
                    expected: "int".to_string(),
                    got: other.type_name().to_string(),
                });
            }
        },
        _ => return Err(RenderError::UnknownTest(name.to_string())),
    };
    Ok(result)
}

/// Apply a named filter.
pub fn apply_filter(name: &str, value: Value, args: &[Value]) -> Result<Value, RenderError> {
    match name {
        "upper" => Ok(Value::String(value.to_string().to_uppercase())),
        "lower" => Ok(Value::String(value.to_string().to_lowercase())),
        "trim" => Ok(Value::String(value.to_string().trim().to_string())),
        "string" => Ok(Value::String(value.to_string())),
        "length" | "count" => value
            .len()
            .map(|n| Value::Int(n as i64))
            .ok_or_else(|| RenderError::TypeError {
                expected: "sized value".to_string(),
                got: value.type_name().to_string(),
            }),
        "default" | "d" => {
            if value.is_undefined() {
                Ok(args.first().cloned().unwrap_or_else(|| Value::String(String::new())))
            } else {
                Ok(value)
            }
        }
        "join" => {
            let sep = args.first().map(|v| v.to_string()).unwrap_or_default();
            let items = value.iter_items()?;
            Ok(Value::String(
                items.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(&sep),
            ))
        }
        "list" => Ok(Value::Seq(value.iter_items()?)),
        "first" => Ok(value.iter_items()?.into_iter().next().unwrap_or_default()),
        "last" => Ok(value.iter_items()?.pop().unwrap_or_default()),
        "reverse" => match value {
            Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
            other => {
                let mut items = other.iter_items()?;
                items.reverse();
                Ok(Value::Seq(items))
            }
        },
        _ => Err(RenderError::UnknownFilter(name.to_string())),
    }
}
