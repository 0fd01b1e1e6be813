//! Built-in expression language used by breakpoint conditions, log points and watches.
//!
//! Grammar (lowest to highest precedence):
//! `or`, `and`, `not`, comparisons (`== != < <= > >=`), `+ -`, `* / %`,
//! unary `-`, postfix (`.attr`, `[index]`, `(args)`), atoms (literals,
//! names, parenthesized expressions).

use crate::debugger::error::Error;
use crate::debugger::frame::Frame;
use crate::debugger::variable::{read, Value};
use chumsky::prelude::*;
use chumsky::Parser;
use itertools::Itertools;

type Err<'a> = extra::Err<Rich<'a, char>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

enum Postfix {
    Attr(String),
    Index(Expr),
    Call(Vec<Expr>),
}

fn literal<'a>() -> impl Parser<'a, &'a str, Literal, Err<'a>> + Clone {
    let digits = any::<_, Err>()
        .filter(|c: &char| c.is_ascii_digit())
        .repeated()
        .at_least(1);
    let number = text::int(10)
        .then(just('.').then(digits).or_not())
        .to_slice()
        .try_map(|s: &str, span| {
            if s.contains('.') {
                s.parse::<f64>()
                    .map(Literal::Float)
                    .map_err(|e| Rich::custom(span, e))
            } else {
                s.parse::<i64>()
                    .map(Literal::Int)
                    .map_err(|e| Rich::custom(span, e))
            }
        })
        .labelled("number");

    let escape = just('\\').ignore_then(choice((
        just('\\'),
        just('\''),
        just('"'),
        just('n').to('\n'),
        just('t').to('\t'),
        just('r').to('\r'),
    )));
    let quoted = |q: char| {
        none_of([q, '\\'])
            .or(escape.clone())
            .repeated()
            .collect::<String>()
            .delimited_by(just(q), just(q))
    };
    let string = quoted('\'')
        .or(quoted('"'))
        .map(Literal::Str)
        .labelled("string");

    number.or(string)
}

pub fn parser<'a>() -> impl Parser<'a, &'a str, Expr, Err<'a>> {
    let kw = |k: &'static str| {
        text::ascii::ident()
            .filter(move |s: &&str| *s == k)
            .padded()
    };

    let name = text::ascii::ident()
        .try_map(|s: &str, span| match s {
            "None" => Ok(Expr::Literal(Literal::None)),
            "True" => Ok(Expr::Literal(Literal::Bool(true))),
            "False" => Ok(Expr::Literal(Literal::Bool(false))),
            "and" | "or" | "not" => Err(Rich::custom(span, format!("unexpected keyword `{s}`"))),
            _ => Ok(Expr::Name(s.to_string())),
        })
        .labelled("name");

    let expr = recursive(|expr| {
        let op = |c| just(c).padded();

        let atom = literal()
            .map(Expr::Literal)
            .or(name)
            .or(expr.clone().delimited_by(op('('), op(')')))
            .padded()
            .boxed();

        let postfix = choice((
            op('.')
                .ignore_then(text::ascii::ident())
                .map(|s: &str| Postfix::Attr(s.to_string())),
            expr.clone()
                .delimited_by(op('['), op(']'))
                .map(Postfix::Index),
            expr.clone()
                .separated_by(op(','))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(op('('), op(')'))
                .map(Postfix::Call),
        ));
        let postfixed = atom.foldl(postfix.repeated(), |lhs, p| match p {
            Postfix::Attr(attr) => Expr::Attr(Box::new(lhs), attr),
            Postfix::Index(idx) => Expr::Index(Box::new(lhs), Box::new(idx)),
            Postfix::Call(args) => Expr::Call(Box::new(lhs), args),
        });

        let unary = op('-')
            .to(UnaryOp::Neg)
            .repeated()
            .foldr(postfixed, |op, rhs| Expr::Unary(op, Box::new(rhs)))
            .boxed();

        let product = unary.clone().foldl(
            choice((
                op('*').to(BinaryOp::Mul),
                op('/').to(BinaryOp::Div),
                op('%').to(BinaryOp::Mod),
            ))
            .then(unary)
            .repeated(),
            |lhs, (op, rhs)| Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
        );

        let sum = product.clone().foldl(
            choice((op('+').to(BinaryOp::Add), op('-').to(BinaryOp::Sub)))
                .then(product)
                .repeated(),
            |lhs, (op, rhs)| Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
        );

        let cmp_op = choice((
            just("==").to(BinaryOp::Eq),
            just("!=").to(BinaryOp::Ne),
            just("<=").to(BinaryOp::Le),
            just(">=").to(BinaryOp::Ge),
            just("<").to(BinaryOp::Lt),
            just(">").to(BinaryOp::Gt),
        ))
        .padded();
        let comparison = sum.clone().foldl(
            cmp_op.then(sum).repeated(),
            |lhs, (op, rhs)| Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
        );

        let negation = kw("not")
            .to(UnaryOp::Not)
            .repeated()
            .foldr(comparison, |op, rhs| Expr::Unary(op, Box::new(rhs)))
            .boxed();

        let and = negation.clone().foldl(
            kw("and").to(BinaryOp::And).then(negation).repeated(),
            |lhs, (op, rhs)| Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
        );

        and.clone()
            .foldl(
                kw("or").to(BinaryOp::Or).then(and).repeated(),
                |lhs, (op, rhs)| Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
            )
            .boxed()
    });

    expr.padded().then_ignore(end())
}

/// Longest expression accepted by [`parse`].
const MAX_EXPRESSION_LEN: usize = 4096;
/// Deepest bracket nesting accepted by [`parse`], the grammar recurses once per level.
const MAX_NESTING: usize = 32;

/// Reject inputs whose bracket nesting would exhaust the caller stack while parsing.
fn check_nesting(input: &str) -> Result<(), Error> {
    if input.len() > MAX_EXPRESSION_LEN {
        return Err(Error::ExpressionParsing(format!(
            "expression is longer than {MAX_EXPRESSION_LEN} bytes"
        )));
    }

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in input.chars() {
        if let Some(q) = quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                _ if c == q => quote = None,
                _ => {}
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(Error::ExpressionParsing(format!(
                        "expression is nested deeper than {MAX_NESTING} levels"
                    )));
                }
            }
            ')' | ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

/// Parse an expression.
pub fn parse(input: &str) -> Result<Expr, Error> {
    check_nesting(input)?;
    parser().parse(input).into_result().map_err(|errs| {
        Error::ExpressionParsing(errs.into_iter().map(|e| e.to_string()).join(", "))
    })
}

/// Evaluate an expression against a frame.
pub fn evaluate(frame: &dyn Frame, input: &str) -> Result<Value, Error> {
    let expr = parse(input)?;
    Evaluator { frame }.eval(&expr)
}

struct Evaluator<'a> {
    frame: &'a dyn Frame,
}

fn type_error(op: &str, lhs: &Value, rhs: &Value) -> Error {
    Error::Evaluation(format!(
        "unsupported operand types for {op}: `{}` and `{}`",
        lhs.type_identity(),
        rhs.type_identity()
    ))
}

impl<'a> Evaluator<'a> {
    fn eval(&self, expr: &Expr) -> Result<Value, Error> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::None => Value::None,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::Str(s) => Value::str(s.as_str()),
            }),
            Expr::Name(name) => self.lookup(name),
            Expr::Attr(base, attr) => {
                let base = self.eval(base)?;
                match &base {
                    Value::Object(obj) => {
                        obj.get_attr(attr).ok_or_else(|| Error::AttributeNotFound {
                            type_name: obj.type_identity.to_string(),
                            attr: attr.clone(),
                        })
                    }
                    _ => Err(Error::AttributeNotFound {
                        type_name: base.type_identity().to_string(),
                        attr: attr.clone(),
                    }),
                }
            }
            Expr::Index(base, idx) => {
                let base = self.eval(base)?;
                let idx = self.eval(idx)?;
                index(&base, &idx)
            }
            Expr::Call(callee, args) => {
                let Expr::Name(func) = callee.as_ref() else {
                    return Err(Error::Evaluation("only built-in functions can be called".into()));
                };
                let args = args.iter().map(|a| self.eval(a)).collect::<Result<Vec<_>, _>>()?;
                call(func, &args)
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => match value {
                        Value::Int(i) => i
                            .checked_neg()
                            .map(Value::Int)
                            .ok_or_else(|| Error::Evaluation("integer overflow".into())),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        Value::Bool(b) => Ok(Value::Int(-(b as i64))),
                        other => Err(Error::Evaluation(format!(
                            "bad operand type for unary -: `{}`",
                            other.type_identity()
                        ))),
                    },
                }
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if !lhs.is_truthy() {
                    return Ok(lhs);
                }
                self.eval(rhs)
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if lhs.is_truthy() {
                    return Ok(lhs);
                }
                self.eval(rhs)
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, &lhs, &rhs)
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, Error> {
        let find = |vars: Vec<(String, Value)>| vars.into_iter().find(|(n, _)| n == name);
        find(self.frame.locals())
            .or_else(|| find(self.frame.globals()))
            .map(|(_, v)| v)
            .ok_or_else(|| Error::NameNotFound(name.to_string()))
    }
}

fn normalize_index(idx: i64, len: usize) -> Option<usize> {
    let idx = if idx < 0 { len as i64 + idx } else { idx };
    (0..len as i64).contains(&idx).then_some(idx as usize)
}

fn index(base: &Value, idx: &Value) -> Result<Value, Error> {
    let out_of_range = || Error::Evaluation("index out of range".to_string());
    match (base, idx) {
        (Value::List(items), Value::Int(i)) => {
            let items = read(items);
            normalize_index(*i, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(out_of_range)
        }
        (Value::Tuple(items), Value::Int(i)) => normalize_index(*i, items.len())
            .map(|i| items[i].clone())
            .ok_or_else(out_of_range),
        (Value::Str(s), Value::Int(i)) => normalize_index(*i, s.chars().count())
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::str(c.to_string()))
            .ok_or_else(out_of_range),
        (Value::Dict(entries), key) => read(entries)
            .iter()
            .find(|(k, _)| k.equals(key))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| {
                Error::Evaluation(format!(
                    "key not found: {}",
                    crate::debugger::variable::render::repr(key, &Default::default())
                ))
            }),
        _ => Err(Error::Evaluation(format!(
            "`{}` is not subscriptable by `{}`",
            base.type_identity(),
            idx.type_identity()
        ))),
    }
}

fn call(func: &str, args: &[Value]) -> Result<Value, Error> {
    match (func, args) {
        ("len", [value]) => value
            .len()
            .map(|len| Value::Int(len as i64))
            .ok_or_else(|| {
                Error::Evaluation(format!("object of type `{}` has no len()", value.type_identity()))
            }),
        ("str", [Value::Str(s)]) => Ok(Value::Str(s.clone())),
        ("str", [value]) => Ok(Value::str(crate::debugger::variable::render::repr(
            value,
            &Default::default(),
        ))),
        ("repr", [value]) => Ok(Value::str(crate::debugger::variable::render::repr(
            value,
            &Default::default(),
        ))),
        ("len" | "str" | "repr", _) => Err(Error::Evaluation(format!(
            "{func}() takes exactly one argument ({} given)",
            args.len()
        ))),
        _ => Err(Error::NameNotFound(func.to_string())),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Bool(b) => Some(*b as i64 as f64),
        _ => None,
    }
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

/// Remainder with the sign of the divisor, `None` on overflow.
fn floor_rem(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && (r < 0) != (b < 0) {
        Some(r + b)
    } else {
        Some(r)
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    let overflow = || Error::Evaluation("integer overflow".to_string());
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(lhs.equals(rhs))),
        BinaryOp::Ne => return Ok(Value::Bool(!lhs.equals(rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (lhs, rhs) {
                (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                _ => match (as_f64(lhs), as_f64(rhs)) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => return Err(type_error("comparison", lhs, rhs)),
                },
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            return Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }));
        }
        _ => {}
    }

    match (op, lhs, rhs) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::str(format!("{a}{b}"))),
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = read(a).clone();
            items.extend(read(b).iter().cloned());
            return Ok(Value::list(items));
        }
        _ => {}
    }

    if let (Some(a), Some(b)) = (as_i64(lhs), as_i64(rhs)) {
        return match op {
            BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Div if b == 0 => Err(Error::Evaluation("division by zero".to_string())),
            BinaryOp::Div => Ok(Value::Float(a as f64 / b as f64)),
            BinaryOp::Mod if b == 0 => Err(Error::Evaluation("modulo by zero".to_string())),
            BinaryOp::Mod => floor_rem(a, b).map(Value::Int).ok_or_else(overflow),
            _ => Err(type_error("operator", lhs, rhs)),
        };
    }

    if let (Some(a), Some(b)) = (as_f64(lhs), as_f64(rhs)) {
        return match op {
            BinaryOp::Add => Ok(Value::Float(a + b)),
            BinaryOp::Sub => Ok(Value::Float(a - b)),
            BinaryOp::Mul => Ok(Value::Float(a * b)),
            BinaryOp::Div | BinaryOp::Mod if b == 0.0 => {
                Err(Error::Evaluation("division by zero".to_string()))
            }
            BinaryOp::Div => Ok(Value::Float(a / b)),
            BinaryOp::Mod => {
                let r = a % b;
                if r != 0.0 && (r < 0.0) != (b < 0.0) {
                    Ok(Value::Float(r + b))
                } else {
                    Ok(Value::Float(r))
                }
            }
            _ => Err(type_error("operator", lhs, rhs)),
        };
    }

    Err(type_error("operator", lhs, rhs))
}
