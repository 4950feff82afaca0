//! Transition condition language.
//!
//! Conditions are small boolean expressions evaluated against a typed context:
//!
//! ```text
//! intent == 'book_flight' && intent.confidence > 0.6
//! session.user.name !== null || temp.attempts >= 3
//! !(event.type == 'postback')
//! ```
//!
//! Paths start at `event`, `session`, `temp` or `intent`. A bare `intent`
//! resolves to the elected intent name. Missing paths resolve to `null`.
//! Equality, ordering and truthiness follow loose scripting-language rules so
//! that conditions written for the flow editor keep their meaning.

use crate::error::{Error, Result};
use crate::models::{DialogSession, Event};
use crate::services::dialog::election::Election;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map, map_res, recognize, value},
    multi::many0,
    number::complete::recognize_float,
    sequence::{delimited, pair, preceded},
    IResult,
};
use serde_json::{json, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// A parsed transition condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self> {
        if source.trim().is_empty() {
            return Err(Error::Condition("Empty condition".to_string()));
        }

        let (_, expr) = all_consuming(ws(parse_or))(source)
            .map_err(|e| Error::Condition(format!("Invalid condition '{}': {}", source, e)))?;

        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, ctx: &ConditionContext) -> bool {
        truthy(&self.expr.eval(ctx))
    }
}

/// Parses and evaluates in one step.
pub fn evaluate(source: &str, ctx: &ConditionContext) -> Result<bool> {
    Ok(Condition::parse(source)?.evaluate(ctx))
}

/// Values visible to a condition.
#[derive(Debug, Clone, Default)]
pub struct ConditionContext {
    root: Value,
}

impl ConditionContext {
    pub fn new(event: &Event, session: &DialogSession, election: &Election) -> Self {
        let temp = session
            .context
            .as_ref()
            .map(|ctx| Value::Object(ctx.temp.clone()))
            .unwrap_or_else(|| json!({}));
        let elected = election.elected.as_ref();

        Self::from_value(json!({
            "event": serde_json::to_value(event).unwrap_or_default(),
            "session": Value::Object(session.session_vars.clone()),
            "temp": temp,
            "intent": {
                "name": elected.map(|p| p.name.clone()),
                "confidence": elected.map(|p| p.confidence).unwrap_or(0.0),
                "ambiguous": election.ambiguous,
                "margin": election.margin,
                "predictions": election.predictions,
            },
        }))
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    fn resolve(&self, path: &[String]) -> Value {
        if path.len() == 1 && path[0] == "intent" {
            return self.root["intent"]["name"].clone();
        }

        let mut current = &self.root;
        for segment in path {
            current = match current {
                Value::Object(map) => map.get(segment).unwrap_or(&Value::Null),
                Value::Array(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|idx| items.get(idx))
                    .unwrap_or(&Value::Null),
                _ => &Value::Null,
            };
        }
        current.clone()
    }
}

impl Expr {
    fn eval(&self, ctx: &ConditionContext) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Path(path) => ctx.resolve(path),
            Self::Not(inner) => Value::Bool(!truthy(&inner.eval(ctx))),
            Self::Binary(BinaryOp::And, lhs, rhs) => {
                let left = lhs.eval(ctx);
                if truthy(&left) { rhs.eval(ctx) } else { left }
            }
            Self::Binary(BinaryOp::Or, lhs, rhs) => {
                let left = lhs.eval(ctx);
                if truthy(&left) { left } else { rhs.eval(ctx) }
            }
            Self::Binary(op, lhs, rhs) => {
                let (left, right) = (lhs.eval(ctx), rhs.eval(ctx));
                Value::Bool(match op {
                    BinaryOp::Eq => loose_eq(&left, &right),
                    BinaryOp::Ne => !loose_eq(&left, &right),
                    BinaryOp::StrictEq => strict_eq(&left, &right),
                    BinaryOp::StrictNe => !strict_eq(&left, &right),
                    BinaryOp::Lt => compare(&left, &right) == Some(Ordering::Less),
                    BinaryOp::Le => matches!(compare(&left, &right), Some(Ordering::Less | Ordering::Equal)),
                    BinaryOp::Gt => compare(&left, &right) == Some(Ordering::Greater),
                    BinaryOp::Ge => matches!(compare(&left, &right), Some(Ordering::Greater | Ordering::Equal)),
                    BinaryOp::And | BinaryOp::Or => unreachable!("logical operators handled above"),
                })
            }
        }
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::Null | Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => left == right,
        _ => to_number(left) == to_number(right),
    }
}

fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => to_number(left).partial_cmp(&to_number(right)),
    }
}

// Grammar, lowest precedence first:
//   or         := and ("||" and)*
//   and        := equality ("&&" equality)*
//   equality   := comparison (("===" | "!==" | "==" | "!=") comparison)*
//   comparison := unary (("<=" | ">=" | "<" | ">") unary)*
//   unary      := "!" unary | primary
//   primary    := "(" or ")" | string | number | path

fn ws<'a, O>(inner: impl FnMut(&'a str) -> IResult<&'a str, O>) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(multispace0, inner, multispace0)
}

fn fold(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter()
        .fold(first, |lhs, (op, rhs)| Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
}

fn parse_or(input: &str) -> IResult<&str, Expr> {
    let (input, first) = parse_and(input)?;
    let (input, rest) = many0(pair(value(BinaryOp::Or, ws(tag("||"))), parse_and))(input)?;
    Ok((input, fold(first, rest)))
}

fn parse_and(input: &str) -> IResult<&str, Expr> {
    let (input, first) = parse_equality(input)?;
    let (input, rest) = many0(pair(value(BinaryOp::And, ws(tag("&&"))), parse_equality))(input)?;
    Ok((input, fold(first, rest)))
}

fn parse_equality(input: &str) -> IResult<&str, Expr> {
    let operator = alt((
        value(BinaryOp::StrictEq, tag("===")),
        value(BinaryOp::StrictNe, tag("!==")),
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
    ));
    let (input, first) = parse_comparison(input)?;
    let (input, rest) = many0(pair(ws(operator), parse_comparison))(input)?;
    Ok((input, fold(first, rest)))
}

fn parse_comparison(input: &str) -> IResult<&str, Expr> {
    let operator = alt((
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Lt, tag("<")),
        value(BinaryOp::Gt, tag(">")),
    ));
    let (input, first) = parse_unary(input)?;
    let (input, rest) = many0(pair(ws(operator), parse_unary))(input)?;
    Ok((input, fold(first, rest)))
}

fn parse_unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('!')), parse_unary), |inner| Expr::Not(Box::new(inner))),
        parse_primary,
    ))(input)
}

fn parse_primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        delimited(char('('), parse_or, char(')')),
        parse_string,
        parse_number,
        parse_path,
    )))(input)
}

fn parse_string(input: &str) -> IResult<&str, Expr> {
    map(
        alt((
            delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        )),
        |s: &str| Expr::Literal(Value::String(s.to_string())),
    )(input)
}

fn parse_number(input: &str) -> IResult<&str, Expr> {
    map_res(recognize_float, |raw: &str| {
        raw.parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(|n| Expr::Literal(Value::Number(n)))
            .ok_or("invalid number")
    })(input)
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn parse_path(input: &str) -> IResult<&str, Expr> {
    let mut identifier = recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_' || c == '$'),
        take_while(is_identifier_char),
    ));
    let (input, head) = identifier(input)?;
    let (input, tail) = many0(preceded(char('.'), take_while1(is_identifier_char)))(input)?;

    let expr = match (head, tail.is_empty()) {
        ("true", true) => Expr::Literal(Value::Bool(true)),
        ("false", true) => Expr::Literal(Value::Bool(false)),
        ("null" | "undefined", true) => Expr::Literal(Value::Null),
        _ => Expr::Path(
            std::iter::once(head)
                .chain(tail)
                .map(str::to_string)
                .collect(),
        ),
    };
    Ok((input, expr))
}
