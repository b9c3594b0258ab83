//! Text parser for symbolic expressions.
//!
//! Grammar: the usual precedence chain (additive < multiplicative < power <
//! unary < primary), left-associative except for `^`. `der(x)` is a special
//! form producing a derivative leaf; every other call must name one of the
//! closed set of elementary functions.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, multispace0},
    combinator::recognize,
    error::{Error, ErrorKind},
    multi::many0,
    number::complete::double,
    sequence::pair,
    IResult, Parser,
};

use super::{BinaryOp, Expr, UnaryOp};
use crate::error::{DaeOptError, Result};

/// Parse a complete expression, requiring all input to be consumed.
pub fn parse_expr(input: &str) -> Result<Expr> {
    match additive(input.trim()) {
        Ok((remainder, expr)) => {
            if remainder.trim().is_empty() {
                Ok(expr)
            } else {
                Err(DaeOptError::Parse(format!(
                    "Unexpected trailing characters: '{}'",
                    remainder
                )))
            }
        }
        Err(e) => Err(DaeOptError::Parse(format!("{:?}", e))),
    }
}

/// Parse an identifier (variable or function name)
fn identifier(input: &str) -> IResult<&str, String> {
    let mut parser = recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_"), tag(".")))),
    ));

    let (input, matched) = parser.parse(input)?;
    Ok((input, matched.to_string()))
}

fn function_by_name(name: &str) -> Option<UnaryOp> {
    match name {
        "sin" => Some(UnaryOp::Sin),
        "cos" => Some(UnaryOp::Cos),
        "tan" => Some(UnaryOp::Tan),
        "asin" => Some(UnaryOp::Asin),
        "acos" => Some(UnaryOp::Acos),
        "atan" => Some(UnaryOp::Atan),
        "exp" => Some(UnaryOp::Exp),
        "log" | "ln" => Some(UnaryOp::Log),
        "sqrt" => Some(UnaryOp::Sqrt),
        _ => None,
    }
}

/// Parse a number
fn number(input: &str) -> IResult<&str, Expr> {
    let (input, num) = double(input)?;
    Ok((input, Expr::Const(num)))
}

/// Parse an identifier followed by an optional call: `der(x)`, `sin(expr)`
/// or a plain variable reference.
fn name_or_call(input: &str) -> IResult<&str, Expr> {
    let (input, name) = identifier(input)?;
    let (after_ws, _) = multispace0::<&str, Error<&str>>.parse(input)?;

    let mut open_paren = char::<&str, Error<&str>>('(');
    let (inner, _) = match open_paren.parse(after_ws) {
        Ok(res) => res,
        // No parenthesis: plain variable.
        Err(_) => return Ok((input, Expr::Var(name))),
    };

    if name == "der" {
        // Special form: the argument must be a plain variable name.
        let (inner, _) = multispace0::<&str, Error<&str>>.parse(inner)?;
        let (inner, var_name) = identifier(inner)?;
        let (inner, _) = multispace0::<&str, Error<&str>>.parse(inner)?;
        let (inner, _) = char::<&str, Error<&str>>(')').parse(inner)?;
        return Ok((inner, Expr::Der(var_name)));
    }

    let op = match function_by_name(&name) {
        Some(op) => op,
        None => return Err(nom::Err::Error(Error::new(input, ErrorKind::Tag))),
    };

    let (inner, _) = multispace0::<&str, Error<&str>>.parse(inner)?;
    let (inner, arg) = additive(inner)?;
    let (inner, _) = multispace0::<&str, Error<&str>>.parse(inner)?;
    let (inner, _) = char::<&str, Error<&str>>(')').parse(inner)?;

    Ok((inner, Expr::Unary(op, Box::new(arg))))
}

/// Parse a parenthesized expression
fn parens(input: &str) -> IResult<&str, Expr> {
    let (input, _) = char::<&str, Error<&str>>('(').parse(input)?;
    let (input, _) = multispace0::<&str, Error<&str>>.parse(input)?;
    let (input, expr) = additive(input)?;
    let (input, _) = multispace0::<&str, Error<&str>>.parse(input)?;
    let (input, _) = char::<&str, Error<&str>>(')').parse(input)?;
    Ok((input, expr))
}

/// Parse a primary expression (number, call, variable or parenthesized
/// expression)
fn primary(input: &str) -> IResult<&str, Expr> {
    if let Ok(result) = number(input) {
        return Ok(result);
    }

    if let Ok(result) = name_or_call(input) {
        return Ok(result);
    }

    parens(input)
}

/// Parse a unary expression (-expr)
fn unary(input: &str) -> IResult<&str, Expr> {
    let (input, _) = multispace0::<&str, Error<&str>>.parse(input)?;

    let mut neg = char::<&str, Error<&str>>('-');
    match neg.parse(input) {
        Ok((after_op, _)) => {
            let (remaining, expr) = unary(after_op)?;
            Ok((remaining, Expr::Unary(UnaryOp::Neg, Box::new(expr))))
        }
        Err(_) => primary(input),
    }
}

/// Parse a power expression (right-associative `^`)
fn power(input: &str) -> IResult<&str, Expr> {
    let (input, left) = unary(input)?;
    let (after_ws, _) = multispace0::<&str, Error<&str>>.parse(input)?;

    let mut op_parser = char::<&str, Error<&str>>('^');
    match op_parser.parse(after_ws) {
        Ok((after_op, _)) => {
            let (remaining, right) = power(after_op)?;
            Ok((
                remaining,
                Expr::Binary(BinaryOp::Pow, Box::new(left), Box::new(right)),
            ))
        }
        Err(_) => Ok((input, left)),
    }
}

/// Parse a multiplicative expression (left-associative `*` and `/`)
fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = power(input)?;
    let mut acc = first;
    let mut remainder = input;

    loop {
        let (after_ws, _) = multispace0::<&str, Error<&str>>.parse(remainder)?;
        let mut mul_parser = char::<&str, Error<&str>>('*');
        let mut div_parser = char::<&str, Error<&str>>('/');

        if let Ok((after_op, _)) = mul_parser.parse(after_ws) {
            let (rest, rhs) = power(after_op)?;
            acc = Expr::Binary(BinaryOp::Mul, Box::new(acc), Box::new(rhs));
            remainder = rest;
        } else if let Ok((after_op, _)) = div_parser.parse(after_ws) {
            let (rest, rhs) = power(after_op)?;
            acc = Expr::Binary(BinaryOp::Div, Box::new(acc), Box::new(rhs));
            remainder = rest;
        } else {
            break;
        }
    }

    Ok((remainder, acc))
}

/// Parse an additive expression (left-associative `+` and `-`)
fn additive(input: &str) -> IResult<&str, Expr> {
    let (input, _) = multispace0::<&str, Error<&str>>.parse(input)?;
    let (input, first) = term(input)?;
    let mut acc = first;
    let mut remainder = input;

    loop {
        let (after_ws, _) = multispace0::<&str, Error<&str>>.parse(remainder)?;
        let mut add_parser = char::<&str, Error<&str>>('+');
        let mut sub_parser = char::<&str, Error<&str>>('-');

        if let Ok((after_op, _)) = add_parser.parse(after_ws) {
            let (rest, rhs) = term(after_op)?;
            acc = Expr::Binary(BinaryOp::Add, Box::new(acc), Box::new(rhs));
            remainder = rest;
        } else if let Ok((after_op, _)) = sub_parser.parse(after_ws) {
            let (rest, rhs) = term(after_op)?;
            acc = Expr::Binary(BinaryOp::Sub, Box::new(acc), Box::new(rhs));
            remainder = rest;
        } else {
            break;
        }
    }

    Ok((remainder, acc))
}
