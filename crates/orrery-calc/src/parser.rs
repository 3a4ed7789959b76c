//! Calc parser - converts cell source into statements.
//!
//! One statement per line. Blank lines and `#` comments are skipped.

use orrery_core::SyntaxError;

use crate::lexer::{Token, tokenize};

/// Expression AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Builtin,
        args: Vec<Expr>,
    },
    Record(Vec<(String, Expr)>),
    Field {
        target: Box<Expr>,
        key: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Min,
    Max,
}

impl Builtin {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "min" => Some(Builtin::Min),
            "max" => Some(Builtin::Max),
            _ => None,
        }
    }
}

impl Expr {
    /// Names read by the expression, in order of first appearance.
    pub fn names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_names(self, &mut names);
        names
    }
}

fn collect_names<'a>(expr: &'a Expr, names: &mut Vec<&'a str>) {
    match expr {
        Expr::Int(_) | Expr::Float(_) | Expr::Str(_) => {}
        Expr::Name(name) => {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        Expr::Neg(inner) => collect_names(inner, names),
        Expr::Binary { left, right, .. } => {
            collect_names(left, names);
            collect_names(right, names);
        }
        Expr::Call { args, .. } => {
            for arg in args {
                collect_names(arg, names);
            }
        }
        Expr::Record(fields) => {
            for (_, value) in fields {
                collect_names(value, names);
            }
        }
        Expr::Field { target, .. } => collect_names(target, names),
    }
}

/// One line of a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `name = expr`
    Assign { name: String, expr: Expr },
    /// `del name`
    Delete { name: String },
    /// `print expr`
    Print { expr: Expr },
    /// `raise Kind [message]`
    Raise { kind: String, message: String },
    /// `stop`
    Stop,
    /// `state name = expr` or `state! name = expr`
    State {
        name: String,
        expr: Expr,
        allow_self_loops: bool,
    },
    /// `set name = expr`
    Set { name: String, expr: Expr },
    /// `slider name = expr`
    Slider { name: String, expr: Expr },
    /// `view name = parent.key`
    View {
        name: String,
        parent: String,
        key: String,
    },
    /// A bare expression; the last one is the cell's output.
    Expr(Expr),
}

/// A statement with its 1-based source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub number: usize,
    pub statement: Statement,
}

/// A parsed cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub lines: Vec<Line>,
}

/// Parse a whole cell.
pub fn parse(code: &str) -> Result<Program, SyntaxError> {
    let mut lines = Vec::new();
    for (index, text) in code.lines().enumerate() {
        let number = index + 1;
        let tokens = tokenize(text).map_err(|e| SyntaxError::new(e).at_line(number))?;
        if tokens.is_empty() {
            continue;
        }
        let statement =
            parse_statement(&tokens).map_err(|e| SyntaxError::new(e).at_line(number))?;
        lines.push(Line { number, statement });
    }
    Ok(Program { lines })
}

fn parse_statement(tokens: &[Token]) -> Result<Statement, String> {
    match tokens {
        [Token::Ident(kw), rest @ ..] if kw == "del" => match rest {
            [Token::Ident(name)] => Ok(Statement::Delete { name: name.clone() }),
            _ => Err("expected `del name`".to_string()),
        },
        [Token::Ident(kw), rest @ ..] if kw == "print" => Ok(Statement::Print {
            expr: parse_full_expr(rest)?,
        }),
        [Token::Ident(kw), rest @ ..] if kw == "raise" => match rest {
            [Token::Ident(kind), message @ ..] => Ok(Statement::Raise {
                kind: kind.clone(),
                message: message_text(message),
            }),
            _ => Err("expected `raise Kind`".to_string()),
        },
        [Token::Ident(kw)] if kw == "stop" => Ok(Statement::Stop),
        [Token::Ident(kw), Token::Bang, rest @ ..] if kw == "state" => {
            let (name, expr) = parse_binding(rest)?;
            Ok(Statement::State {
                name,
                expr,
                allow_self_loops: true,
            })
        }
        [Token::Ident(kw), Token::Ident(_), Token::Assign, ..] if kw == "state" => {
            let (name, expr) = parse_binding(&tokens[1..])?;
            Ok(Statement::State {
                name,
                expr,
                allow_self_loops: false,
            })
        }
        [Token::Ident(kw), Token::Ident(_), Token::Assign, ..] if kw == "set" => {
            let (name, expr) = parse_binding(&tokens[1..])?;
            Ok(Statement::Set { name, expr })
        }
        [Token::Ident(kw), Token::Ident(_), Token::Assign, ..] if kw == "slider" => {
            let (name, expr) = parse_binding(&tokens[1..])?;
            Ok(Statement::Slider { name, expr })
        }
        [Token::Ident(kw), Token::Ident(_), Token::Assign, ..] if kw == "view" => {
            match &tokens[1..] {
                [
                    Token::Ident(name),
                    Token::Assign,
                    Token::Ident(parent),
                    Token::Dot,
                    Token::Ident(key),
                ] => Ok(Statement::View {
                    name: name.clone(),
                    parent: parent.clone(),
                    key: key.clone(),
                }),
                _ => Err("expected `view name = parent.key`".to_string()),
            }
        }
        [Token::Ident(_), Token::Assign, ..] => {
            let (name, expr) = parse_binding(tokens)?;
            Ok(Statement::Assign { name, expr })
        }
        _ => Ok(Statement::Expr(parse_full_expr(tokens)?)),
    }
}

fn parse_binding(tokens: &[Token]) -> Result<(String, Expr), String> {
    match tokens {
        [Token::Ident(name), Token::Assign, rest @ ..] => {
            if is_keyword(name) {
                return Err(format!("'{}' is a reserved word", name));
            }
            Ok((name.clone(), parse_full_expr(rest)?))
        }
        _ => Err("expected `name = expression`".to_string()),
    }
}

fn is_keyword(name: &str) -> bool {
    matches!(
        name,
        "del" | "print" | "raise" | "stop" | "state" | "set" | "slider" | "view"
    )
}

fn message_text(tokens: &[Token]) -> String {
    match tokens {
        [Token::Str(s)] => s.clone(),
        _ => tokens
            .iter()
            .map(|t| match t {
                Token::Ident(s) | Token::Str(s) => s.clone(),
                Token::Int(n) => n.to_string(),
                Token::Float(f) => f.to_string(),
                _ => String::new(),
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn parse_full_expr(tokens: &[Token]) -> Result<Expr, String> {
    if tokens.is_empty() {
        return Err("expected an expression".to_string());
    }
    let (expr, pos) = parse_add_sub(tokens, 0)?;
    if pos < tokens.len() {
        return Err(format!("unexpected {:?}", tokens[pos]));
    }
    Ok(expr)
}

fn parse_add_sub(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => BinOp::Add,
            Token::Minus => BinOp::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_unary(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => BinOp::Mul,
            Token::Slash => BinOp::Div,
            _ => break,
        };
        let (right, new_pos) = parse_unary(tokens, pos + 1)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_unary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    if let Some(Token::Minus) = tokens.get(pos) {
        let (inner, pos) = parse_unary(tokens, pos + 1)?;
        return Ok((Expr::Neg(Box::new(inner)), pos));
    }
    parse_postfix(tokens, pos)
}

// Field access binds tighter than any operator.
fn parse_postfix(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut expr, mut pos) = parse_primary(tokens, pos)?;
    while let Some(Token::Dot) = tokens.get(pos) {
        match tokens.get(pos + 1) {
            Some(Token::Ident(key)) => {
                expr = Expr::Field {
                    target: Box::new(expr),
                    key: key.clone(),
                };
                pos += 2;
            }
            _ => return Err("expected a field name after '.'".to_string()),
        }
    }
    Ok((expr, pos))
}

fn parse_primary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let Some(token) = tokens.get(pos) else {
        return Err("unexpected end of expression".to_string());
    };

    match token {
        Token::Int(n) => Ok((Expr::Int(*n), pos + 1)),
        Token::Float(f) => Ok((Expr::Float(*f), pos + 1)),
        Token::Str(s) => Ok((Expr::Str(s.clone()), pos + 1)),
        Token::Ident(name) => {
            if let Some(Token::LParen) = tokens.get(pos + 1) {
                let func = Builtin::from_name(name)
                    .ok_or_else(|| format!("unknown function '{}'", name))?;
                let (args, pos) = parse_call_args(tokens, pos + 2)?;
                if args.len() < 2 {
                    return Err(format!("{}() takes at least two arguments", name));
                }
                return Ok((Expr::Call { func, args }, pos));
            }
            if is_keyword(name) {
                return Err(format!("'{}' is a reserved word", name));
            }
            Ok((Expr::Name(name.clone()), pos + 1))
        }
        Token::LParen => {
            let (expr, pos) = parse_add_sub(tokens, pos + 1)?;
            match tokens.get(pos) {
                Some(Token::RParen) => Ok((expr, pos + 1)),
                _ => Err("expected ')'".to_string()),
            }
        }
        Token::LBrace => parse_record(tokens, pos + 1),
        other => Err(format!("unexpected {:?}", other)),
    }
}

fn parse_call_args(tokens: &[Token], mut pos: usize) -> Result<(Vec<Expr>, usize), String> {
    let mut args = Vec::new();
    if let Some(Token::RParen) = tokens.get(pos) {
        return Ok((args, pos + 1));
    }
    loop {
        let (arg, new_pos) = parse_add_sub(tokens, pos)?;
        args.push(arg);
        match tokens.get(new_pos) {
            Some(Token::Comma) => pos = new_pos + 1,
            Some(Token::RParen) => return Ok((args, new_pos + 1)),
            _ => return Err("expected ',' or ')'".to_string()),
        }
    }
}

fn parse_record(tokens: &[Token], mut pos: usize) -> Result<(Expr, usize), String> {
    let mut fields: Vec<(String, Expr)> = Vec::new();
    if let Some(Token::RBrace) = tokens.get(pos) {
        return Ok((Expr::Record(fields), pos + 1));
    }
    loop {
        let key = match (tokens.get(pos), tokens.get(pos + 1)) {
            (Some(Token::Ident(key) | Token::Str(key)), Some(Token::Colon)) => key.clone(),
            _ => return Err("expected `key: value`".to_string()),
        };
        if fields.iter().any(|(k, _)| *k == key) {
            return Err(format!("duplicate key '{}'", key));
        }
        let (value, new_pos) = parse_add_sub(tokens, pos + 2)?;
        fields.push((key, value));
        match tokens.get(new_pos) {
            Some(Token::Comma) => pos = new_pos + 1,
            Some(Token::RBrace) => return Ok((Expr::Record(fields), new_pos + 1)),
            _ => return Err("expected ',' or '}'".to_string()),
        }
    }
}
