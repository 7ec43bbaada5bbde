use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit1, multispace0, satisfy},
    combinator::{cut, map, not, opt, recognize, value, verify},
    error::ErrorKind,
    multi::many0,
    sequence::{pair, preceded, terminated},
};
use std::rc::Rc;

use crate::ast::{MIN_STACK_RED_ZONE, NumberType, STACK_GROWTH_SIZE, Term};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

type NomError<'a> = nom::error::Error<&'a str>;

/// Words that can never be used as variable names
pub const KEYWORDS: &[&str] = &["let", "letrec", "in", "if", "then", "else", "hd", "tl", "fix"];

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn failure<T>(input: &str, code: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Failure(NomError::new(input, code)))
}

/// Skip leading whitespace, then run `parser`
fn token<'a, O, P>(parser: P) -> impl Parser<&'a str, Output = O, Error = NomError<'a>>
where
    P: Parser<&'a str, Output = O, Error = NomError<'a>>,
{
    preceded(multispace0, parser)
}

/// A keyword that is not the prefix of a longer identifier (`let` must not match `letter`)
fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = NomError<'a>> {
    token(terminated(tag(word), not(satisfy(is_identifier_char))))
}

/// Convert nom parsing errors to a structured parse error
fn parse_error_from_nom(input: &str, error: nom::Err<NomError<'_>>) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            if e.code == ErrorKind::TooLarge {
                return ParseError::with_context(
                    ParseErrorKind::TooDeeplyNested,
                    format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                    input,
                    position,
                );
            }
            if e.input.trim().is_empty() {
                return ParseError::with_context(
                    ParseErrorKind::Incomplete,
                    "Unexpected end of input",
                    input,
                    position,
                );
            }
            let message = match e.code {
                ErrorKind::Alt => format!("Expected an expression at position {position}"),
                ErrorKind::Satisfy | ErrorKind::Verify => {
                    format!("Expected a variable name at position {position}")
                }
                ErrorKind::Tag => format!("Expected keyword at position {position}"),
                ErrorKind::Char => format!("Expected character at position {position}"),
                _ => format!("Invalid syntax at position {position}"),
            };
            ParseError::with_context(ParseErrorKind::InvalidSyntax, message, input, position)
        }
        nom::Err::Incomplete(_) => {
            ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input")
        }
    }
}

/// Right-nest `first op rest[0] op rest[1] ...` with `build`
fn fold_right(first: Term, rest: Vec<Term>, build: fn(Rc<Term>, Rc<Term>) -> Term) -> Term {
    match rest
        .into_iter()
        .rev()
        .reduce(|tail, head| build(Rc::new(head), Rc::new(tail)))
    {
        Some(tail) => build(Rc::new(first), Rc::new(tail)),
        None => first,
    }
}

/// Parse an unsigned decimal number with an optional fraction
fn parse_number(input: &str) -> IResult<&str, Term> {
    let (remaining, literal) =
        token(recognize(pair(digit1, opt(pair(char('.'), digit1))))).parse(input)?;

    match literal.parse::<NumberType>() {
        Ok(n) => Ok((remaining, Term::Num(n))),
        Err(_) => Err(nom::Err::Error(NomError::new(input, ErrorKind::Float))),
    }
}

/// Parse a variable name (anything identifier-shaped except a keyword)
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    token(verify(
        recognize(pair(satisfy(is_identifier_start), take_while(is_identifier_char))),
        |name: &str| !KEYWORDS.iter().any(|keyword| *keyword == name),
    ))
    .parse(input)
}

/// atom := number | "#" | identifier | "(" program ")" | lambda
fn parse_atom(input: &str, depth: usize) -> IResult<&str, Term> {
    let result = alt((
        parse_number,
        value(Term::Nil, token(char('#'))),
        map(parse_identifier, |name| Term::Var(name.to_owned())),
        |input| parse_parenthesized(input, depth),
        |input| parse_lambda(input, depth),
    ))
    .parse(input);

    match result {
        // None of the alternatives applied: report the position of the next token
        Err(nom::Err::Error(_)) => {
            let (at, _) = multispace0.parse(input)?;
            Err(nom::Err::Error(NomError::new(at, ErrorKind::Alt)))
        }
        other => other,
    }
}

fn parse_parenthesized(input: &str, depth: usize) -> IResult<&str, Term> {
    let (input, _) = token(char('(')).parse(input)?;
    let (input, inner) = cut(|input| parse_program(input, depth + 1)).parse(input)?;
    let (input, _) = cut(token(char(')'))).parse(input)?;
    Ok((input, inner))
}

/// lambda := ("\" | "λ") identifier "." expr
fn parse_lambda(input: &str, depth: usize) -> IResult<&str, Term> {
    let (input, _) = token(alt((char('\\'), char('λ')))).parse(input)?;
    let (input, param) = cut(parse_identifier).parse(input)?;
    let (input, _) = cut(token(char('.'))).parse(input)?;
    let (input, body) = cut(|input| parse_expr(input, depth + 1)).parse(input)?;
    Ok((input, Term::Lam(param.to_owned(), Rc::new(body))))
}

/// cons := atom (":" atom)*, nested to the right
fn parse_cons(input: &str, depth: usize) -> IResult<&str, Term> {
    let (input, head) = parse_atom(input, depth)?;
    let (input, rest) = many0(preceded(
        token(char(':')),
        cut(|input| parse_atom(input, depth)),
    ))
    .parse(input)?;
    Ok((input, fold_right(head, rest, Term::Cons)))
}

/// apply := cons cons*, left-associative juxtaposition
fn parse_apply(input: &str, depth: usize) -> IResult<&str, Term> {
    let (input, func) = parse_cons(input, depth)?;
    let (input, args) = many0(|input| parse_cons(input, depth)).parse(input)?;
    let term = args
        .into_iter()
        .fold(func, |func, arg| Term::App(Rc::new(func), Rc::new(arg)));
    Ok((input, term))
}

#[derive(Debug, Clone, Copy)]
enum Prefix {
    Neg,
    Hd,
    Tl,
    Fix,
}

impl Prefix {
    fn wrap(self, operand: Term) -> Term {
        let operand = Rc::new(operand);
        match self {
            Prefix::Neg => Term::Neg(operand),
            Prefix::Hd => Term::Hd(operand),
            Prefix::Tl => Term::Tl(operand),
            Prefix::Fix => Term::Fix(operand),
        }
    }
}

/// unary := ("-" | "hd" | "tl" | "fix")* apply
fn parse_unary(input: &str, depth: usize) -> IResult<&str, Term> {
    let (input, prefixes) = many0(alt((
        value(Prefix::Neg, token(char('-'))),
        value(Prefix::Hd, keyword("hd")),
        value(Prefix::Tl, keyword("tl")),
        value(Prefix::Fix, keyword("fix")),
    )))
    .parse(input)?;

    // Each prefix adds a level of nesting to the resulting term
    let depth = depth + prefixes.len();
    if depth >= MAX_PARSE_DEPTH {
        return failure(input, ErrorKind::TooLarge);
    }

    let (input, operand) = if prefixes.is_empty() {
        parse_apply(input, depth)?
    } else {
        cut(|input| parse_apply(input, depth)).parse(input)?
    };

    let term = prefixes
        .into_iter()
        .rev()
        .fold(operand, |operand, prefix| prefix.wrap(operand));
    Ok((input, term))
}

/// term := unary ("*" unary)*
fn parse_term(input: &str, depth: usize) -> IResult<&str, Term> {
    let (input, first) = parse_unary(input, depth)?;
    let (input, rest) = many0(preceded(
        token(char('*')),
        cut(|input| parse_unary(input, depth)),
    ))
    .parse(input)?;
    let term = rest
        .into_iter()
        .fold(first, |l, r| Term::Times(Rc::new(l), Rc::new(r)));
    Ok((input, term))
}

/// arith := term (("+" | "-") term)*
fn parse_arith(input: &str, depth: usize) -> IResult<&str, Term> {
    let (input, first) = parse_term(input, depth)?;
    let (input, rest) = many0(pair(
        token(alt((char('+'), char('-')))),
        cut(|input| parse_term(input, depth)),
    ))
    .parse(input)?;
    let term = rest.into_iter().fold(first, |l, (op, r)| match op {
        '+' => Term::Plus(Rc::new(l), Rc::new(r)),
        _ => Term::Minus(Rc::new(l), Rc::new(r)),
    });
    Ok((input, term))
}

/// compare := arith (("==" | "<=") arith)*
fn parse_compare(input: &str, depth: usize) -> IResult<&str, Term> {
    let (input, first) = parse_arith(input, depth)?;
    let (input, rest) = many0(pair(
        token(alt((tag("=="), tag("<=")))),
        cut(|input| parse_arith(input, depth)),
    ))
    .parse(input)?;
    let term = rest.into_iter().fold(first, |l, (op, r)| match op {
        "==" => Term::Eq(Rc::new(l), Rc::new(r)),
        _ => Term::Leq(Rc::new(l), Rc::new(r)),
    });
    Ok((input, term))
}

/// "let" | "letrec" identifier "=" expr "in" expr
fn parse_let(input: &str, depth: usize) -> IResult<&str, Term> {
    // `letrec` first: `let` would otherwise refuse it as a keyword prefix anyway
    let (input, recursive) =
        alt((value(true, keyword("letrec")), value(false, keyword("let")))).parse(input)?;
    let (input, name) = cut(parse_identifier).parse(input)?;
    let (input, _) = cut(token(char('='))).parse(input)?;
    let (input, bound) = cut(|input| parse_expr(input, depth + 1)).parse(input)?;
    let (input, _) = cut(keyword("in")).parse(input)?;
    let (input, body) = cut(|input| parse_expr(input, depth + 1)).parse(input)?;

    let (name, bound, body) = (name.to_owned(), Rc::new(bound), Rc::new(body));
    let term = if recursive {
        Term::Letrec(name, bound, body)
    } else {
        Term::Let(name, bound, body)
    };
    Ok((input, term))
}

/// "if" expr "then" expr "else" expr
fn parse_if(input: &str, depth: usize) -> IResult<&str, Term> {
    let (input, _) = keyword("if").parse(input)?;
    let (input, cond) = cut(|input| parse_expr(input, depth + 1)).parse(input)?;
    let (input, _) = cut(keyword("then")).parse(input)?;
    let (input, then) = cut(|input| parse_expr(input, depth + 1)).parse(input)?;
    let (input, _) = cut(keyword("else")).parse(input)?;
    let (input, else_) = cut(|input| parse_expr(input, depth + 1)).parse(input)?;
    Ok((input, Term::If(Rc::new(cond), Rc::new(then), Rc::new(else_))))
}

/// expr := lambda | let | letrec | if | compare
fn parse_expr(input: &str, depth: usize) -> IResult<&str, Term> {
    if depth >= MAX_PARSE_DEPTH {
        return failure(input, ErrorKind::TooLarge);
    }
    stacker::maybe_grow(MIN_STACK_RED_ZONE, STACK_GROWTH_SIZE, || {
        alt((
            |input| parse_lambda(input, depth),
            |input| parse_let(input, depth),
            |input| parse_if(input, depth),
            |input| parse_compare(input, depth),
        ))
        .parse(input)
    })
}

/// program := expr (";;" expr)*, sequenced to the right
fn parse_program(input: &str, depth: usize) -> IResult<&str, Term> {
    let (input, first) = parse_expr(input, depth)?;
    let (input, rest) = many0(preceded(
        token(tag(";;")),
        cut(|input| parse_expr(input, depth)),
    ))
    .parse(input)?;
    Ok((input, fold_right(first, rest, Term::Seq)))
}

/// Parse a complete program from source text.
///
/// The whole input must be consumed; surrounding whitespace (including newlines)
/// is ignored.
pub fn parse(input: &str) -> Result<Term, Error> {
    match terminated(|input| parse_program(input, 0), multispace0).parse(input) {
        Ok(("", term)) => Ok(term),
        Ok((remaining, _)) => {
            let position = input.len().saturating_sub(remaining.len());
            let snippet: String = remaining.chars().take(10).collect();
            Err(ParseError::with_context(
                ParseErrorKind::TrailingContent,
                format!("Unexpected remaining input: '{snippet}'"),
                input,
                position,
            )
            .into())
        }
        Err(e) => Err(parse_error_from_nom(input, e).into()),
    }
}
