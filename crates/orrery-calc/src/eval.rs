//! Expression evaluation.
//!
//! Values are JSON values: integers stay integers while results are exact,
//! anything else becomes a float.

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::parser::{BinOp, Builtin, Expr};

/// Failure while evaluating an expression.
///
/// Each variant maps to the exception type reported on the cell.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("name '{0}' is not defined")]
    UndefinedName(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("{0}")]
    Type(String),

    #[error("key '{0}' not found")]
    MissingKey(String),

    #[error("numeric overflow")]
    Overflow,
}

impl EvalError {
    pub fn exception_type(&self) -> &'static str {
        match self {
            EvalError::UndefinedName(_) => "NameError",
            EvalError::DivisionByZero => "ZeroDivisionError",
            EvalError::Type(_) => "TypeError",
            EvalError::MissingKey(_) => "KeyError",
            EvalError::Overflow => "OverflowError",
        }
    }
}

/// Where names are looked up.
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Scope for Map<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> Result<Value, EvalError> {
    match expr {
        Expr::Int(n) => Ok(Value::from(*n)),
        Expr::Float(f) => float(*f),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Name(name) => scope
            .lookup(name)
            .ok_or_else(|| EvalError::UndefinedName(name.clone())),
        Expr::Neg(inner) => match evaluate(inner, scope)? {
            Value::Number(n) => match n.as_i64() {
                Some(i) => i.checked_neg().map(Value::from).ok_or(EvalError::Overflow),
                None => float(-as_f64(&n)),
            },
            other => Err(EvalError::Type(format!(
                "bad operand for unary -: {}",
                type_name(&other)
            ))),
        },
        Expr::Binary { op, left, right } => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            binary(*op, left, right)
        }
        Expr::Call { func, args } => {
            let values = args
                .iter()
                .map(|a| evaluate(a, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call(*func, values)
        }
        Expr::Record(fields) => {
            let mut map = Map::new();
            for (key, value) in fields {
                map.insert(key.clone(), evaluate(value, scope)?);
            }
            Ok(Value::Object(map))
        }
        Expr::Field { target, key } => match evaluate(target, scope)? {
            Value::Object(mut map) => map
                .remove(key)
                .ok_or_else(|| EvalError::MissingKey(key.clone())),
            other => Err(EvalError::Type(format!(
                "{} has no field '{}'",
                type_name(&other),
                key
            ))),
        },
    }
}

fn binary(op: BinOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => arithmetic(op, &a, &b),
        (Value::String(a), Value::String(b)) if op == BinOp::Add => Ok(Value::String(a + &b)),
        (a, b) => Err(EvalError::Type(format!(
            "unsupported operand types for {}: {} and {}",
            symbol(op),
            type_name(&a),
            type_name(&b)
        ))),
    }
}

fn arithmetic(op: BinOp, a: &Number, b: &Number) -> Result<Value, EvalError> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return match op {
            BinOp::Add => x.checked_add(y).map(Value::from).ok_or(EvalError::Overflow),
            BinOp::Sub => x.checked_sub(y).map(Value::from).ok_or(EvalError::Overflow),
            BinOp::Mul => x.checked_mul(y).map(Value::from).ok_or(EvalError::Overflow),
            BinOp::Div if y == 0 => Err(EvalError::DivisionByZero),
            BinOp::Div => match x.checked_rem(y) {
                Some(0) => x.checked_div(y).map(Value::from).ok_or(EvalError::Overflow),
                Some(_) => float(x as f64 / y as f64),
                None => Err(EvalError::Overflow),
            },
        };
    }

    let (x, y) = (as_f64(a), as_f64(b));
    match op {
        BinOp::Add => float(x + y),
        BinOp::Sub => float(x - y),
        BinOp::Mul => float(x * y),
        BinOp::Div if y == 0.0 => Err(EvalError::DivisionByZero),
        BinOp::Div => float(x / y),
    }
}

fn call(func: Builtin, args: Vec<Value>) -> Result<Value, EvalError> {
    let mut best: Option<(f64, Value)> = None;
    for arg in args {
        let Value::Number(n) = &arg else {
            return Err(EvalError::Type(format!(
                "{}() expects numbers, got {}",
                builtin_name(func),
                type_name(&arg)
            )));
        };
        let x = as_f64(n);
        let better = match &best {
            None => true,
            Some((current, _)) => match func {
                Builtin::Min => x < *current,
                Builtin::Max => x > *current,
            },
        };
        if better {
            best = Some((x, arg));
        }
    }
    best.map(|(_, v)| v)
        .ok_or_else(|| EvalError::Type(format!("{}() needs arguments", builtin_name(func))))
}

fn float(f: f64) -> Result<Value, EvalError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or(EvalError::Overflow)
}

fn as_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

fn symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
    }
}

fn builtin_name(func: Builtin) -> &'static str {
    match func {
        Builtin::Min => "min",
        Builtin::Max => "max",
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "record",
    }
}

/// Render a value the way `print` shows it.
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
