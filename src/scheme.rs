//! S-expression reader.
//!
//! Turns source text into [`Value`] data. Quote sugar stays as dedicated wrapper
//! nodes (`'x` reads as [`Value::Quote`]) so that printing a parsed form gives
//! back what the user wrote.

use std::cell::RefCell;
use std::rc::Rc;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, multispace1},
    combinator::{cut, recognize, value},
    error::ErrorKind,
    multi::many0,
    sequence::{delimited, pair},
};

use crate::ast::{Atom, NumberType, Symbol, Value};
use crate::{MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

fn error<T>(input: &str, kind: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Error(nom::error::Error::new(input, kind)))
}

/// Unrecoverable error: stops `alt` from trying other branches
fn failure<T>(input: &str, kind: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Failure(nom::error::Error::new(input, kind)))
}

/// Convert nom parsing errors to a [`ParseError`] with context
fn to_parse_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            let (kind, message) = match e.code {
                ErrorKind::TooLarge => (
                    ParseErrorKind::TooDeeplyNested,
                    format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                ),
                _ if e.input.is_empty() => {
                    (ParseErrorKind::Incomplete, "Unexpected end of input".into())
                }
                ErrorKind::Digit => (
                    ParseErrorKind::InvalidSyntax,
                    format!("Invalid number literal at position {position}"),
                ),
                ErrorKind::Escaped => (
                    ParseErrorKind::InvalidSyntax,
                    format!("Unknown escape sequence at position {position}"),
                ),
                ErrorKind::Verify => (
                    ParseErrorKind::InvalidSyntax,
                    format!("Invalid regex literal at position {position}"),
                ),
                ErrorKind::Char if e.input.starts_with(')') => (
                    ParseErrorKind::InvalidSyntax,
                    format!("Unexpected ')' at position {position}"),
                ),
                _ => {
                    let remaining: String = e.input.chars().take(10).collect();
                    (
                        ParseErrorKind::InvalidSyntax,
                        format!("Invalid syntax near '{remaining}'"),
                    )
                }
            };
            ParseError::with_context(kind, message, input, position)
        }
        nom::Err::Incomplete(_) => ParseError::new(ParseErrorKind::Incomplete, "Incomplete input", None),
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';' | '\'' | '`' | ',')
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char(';'), take_while(|c: char| c != '\n'))).parse(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    delimited(tag("#|"), take_until("|#"), tag("|#")).parse(input)
}

/// Whitespace and comments between data
fn atmosphere(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((multispace1, line_comment, block_comment)))).parse(input)
}

fn parse_token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !is_delimiter(c)).parse(input)
}

fn looks_numeric(token: &str) -> bool {
    let body = token.strip_prefix(&['+', '-'][..]).unwrap_or(token);
    let body = body.strip_prefix('.').unwrap_or(body);
    body.starts_with(|c: char| c.is_ascii_digit())
}

/// Integer or real literal; `None` when the token does not look like a number
fn parse_number_token(token: &str) -> Option<Result<Value, ()>> {
    match token {
        "+inf.0" => return Some(Ok(Value::from(f64::INFINITY))),
        "-inf.0" => return Some(Ok(Value::from(f64::NEG_INFINITY))),
        "+nan.0" | "-nan.0" => return Some(Ok(Value::from(f64::NAN))),
        _ if !looks_numeric(token) => return None,
        _ => {}
    }
    if let Ok(n) = token.parse::<NumberType>() {
        return Some(Ok(Value::Atom(Atom::Integer(n))));
    }
    // Out-of-range integers are errors, not reals
    if !token.contains(['.', 'e', 'E']) {
        return Some(Err(()));
    }
    Some(token.parse::<f64>().map(Value::from).map_err(|_| ()))
}

/// Parse a number or symbol
fn parse_atom(input: &str) -> IResult<&str, Value> {
    let (remaining, token) = parse_token(input)?;
    if token == "." || token.starts_with('#') {
        return error(input, ErrorKind::Tag);
    }
    match parse_number_token(token) {
        Some(Ok(number)) => Ok((remaining, number)),
        Some(Err(())) => failure(input, ErrorKind::Digit),
        None => Ok((remaining, Value::Symbol(Symbol::new(token)))),
    }
}

/// Parse a string literal
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), Value::string(&chars))),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('r') => chars.push('\r'),
                    Some('0') => chars.push('\0'),
                    Some('a') => chars.push('\u{7}'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    // Line continuation
                    Some('\n') => {
                        let rest = char_iter.as_str().trim_start_matches([' ', '\t']);
                        char_iter = rest.chars();
                    }
                    Some(_) => return failure(remaining, ErrorKind::Escaped),
                    None => return failure(char_iter.as_str(), ErrorKind::Char),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            None => return failure(remaining, ErrorKind::Char),
        }
    }
}

/// `#\a`, `#\space`, `#\x41`
fn parse_char(input: &str) -> IResult<&str, Value> {
    let mut chars = input.chars();
    let Some(first) = chars.next() else {
        return failure(input, ErrorKind::Char);
    };
    let after_first = chars.as_str();
    let name_len = first.len_utf8() + after_first.find(is_delimiter).unwrap_or(after_first.len());
    let (name, remaining) = input.split_at(name_len);
    if name.len() == first.len_utf8() {
        return Ok((remaining, Value::from(first)));
    }
    let named = match name {
        "space" => Some(' '),
        "newline" | "linefeed" => Some('\n'),
        "tab" => Some('\t'),
        "return" => Some('\r'),
        "null" | "nul" => Some('\0'),
        "delete" => Some('\u{7f}'),
        "escape" => Some('\u{1b}'),
        "alarm" => Some('\u{7}'),
        "backspace" => Some('\u{8}'),
        _ => name
            .strip_prefix('x')
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32),
    };
    match named {
        Some(c) => Ok((remaining, Value::from(c))),
        None => failure(input, ErrorKind::Char),
    }
}

/// `#/pattern/`; `\/` stands for a literal slash
fn parse_regex(input: &str) -> IResult<&str, Value> {
    let mut pattern = String::new();
    let mut chars = input.chars();
    loop {
        match chars.next() {
            Some('/') => break,
            Some('\\') => match chars.next() {
                Some('/') => pattern.push('/'),
                Some(other) => {
                    pattern.push('\\');
                    pattern.push(other);
                }
                None => return failure(chars.as_str(), ErrorKind::Char),
            },
            Some(c) => pattern.push(c),
            None => return failure(chars.as_str(), ErrorKind::Char),
        }
    }
    match regex::Regex::new(&pattern) {
        Ok(re) => Ok((chars.as_str(), Value::Regex(Rc::new(re)))),
        Err(_) => failure(input, ErrorKind::Verify),
    }
}

/// Data up to the closing parenthesis of a vector or bytevector
fn parse_items(mut input: &str, depth: usize) -> IResult<&str, Vec<Value>> {
    let mut items = Vec::new();
    loop {
        let (rest, ()) = atmosphere(input)?;
        if let Some(rest) = rest.strip_prefix(')') {
            return Ok((rest, items));
        }
        if rest.is_empty() {
            return failure(rest, ErrorKind::Char);
        }
        let (rest, item) = cut(|i| parse_sexpr(i, depth + 1)).parse(rest)?;
        items.push(item);
        input = rest;
    }
}

/// Everything introduced by `#` except block comments
fn parse_hash(input: &str, depth: usize) -> IResult<&str, Value> {
    let (rest, _) = char('#').parse(input)?;
    if let Some(rest) = rest.strip_prefix('(') {
        let (rest, items) = parse_items(rest, depth)?;
        return Ok((rest, Value::vector(items)));
    }
    if let Some(rest) = rest.strip_prefix("u8(") {
        let (rest, items) = parse_items(rest, depth)?;
        let bytes = items
            .iter()
            .map(|item| match item {
                Value::Atom(Atom::Integer(n)) => u8::try_from(*n).ok(),
                _ => None,
            })
            .collect::<Option<Vec<u8>>>();
        return match bytes {
            Some(bytes) => Ok((rest, Value::Bytevector(Rc::new(RefCell::new(bytes))))),
            None => failure(input, ErrorKind::Digit),
        };
    }
    if let Some(rest) = rest.strip_prefix('/') {
        return parse_regex(rest);
    }
    if let Some(rest) = rest.strip_prefix('\\') {
        return parse_char(rest);
    }

    let (remaining, token) = parse_token(rest)?;
    match token {
        "t" | "true" => Ok((remaining, Value::boolean(true))),
        "f" | "false" => Ok((remaining, Value::boolean(false))),
        _ => match token
            .strip_prefix(['x', 'X'])
            .map(|hex| NumberType::from_str_radix(hex, 16))
        {
            Some(Ok(n)) => Ok((remaining, Value::Atom(Atom::Integer(n)))),
            Some(Err(_)) => failure(input, ErrorKind::Digit),
            None => failure(input, ErrorKind::Tag),
        },
    }
}

/// Parse a list, possibly dotted
fn parse_list(input: &str, depth: usize) -> IResult<&str, Value> {
    let (mut input, _) = char('(').parse(input)?;
    let mut items = Vec::new();

    loop {
        let (rest, ()) = atmosphere(input)?;
        if let Some(rest) = rest.strip_prefix(')') {
            return Ok((rest, Value::list_from(items)));
        }
        if rest.is_empty() {
            return failure(rest, ErrorKind::Char);
        }
        if let Some(after_dot) = rest.strip_prefix('.')
            && (after_dot.is_empty() || after_dot.starts_with(is_delimiter))
        {
            if items.is_empty() {
                return failure(rest, ErrorKind::Tag);
            }
            let (after, tail) = cut(|i| parse_sexpr(i, depth + 1)).parse(after_dot)?;
            let (after, ()) = atmosphere(after)?;
            let (after, _) = cut(char(')')).parse(after)?;
            return Ok((after, Value::list_with_tail(items, tail)));
        }
        let (rest, item) = cut(|i| parse_sexpr(i, depth + 1)).parse(rest)?;
        items.push(item);
        input = rest;
    }
}

/// Quote sugar: `'x`, `` `x ``, `,x`, `,@x`
fn parse_abbreviation(input: &str, depth: usize) -> IResult<&str, Value> {
    let (input, wrap) = alt((
        value(Value::Quote as fn(Rc<Value>) -> Value, char('\'')),
        value(Value::Quasiquote as fn(Rc<Value>) -> Value, char('`')),
        value(Value::UnquoteSplicing as fn(Rc<Value>) -> Value, tag(",@")),
        value(Value::Unquote as fn(Rc<Value>) -> Value, char(',')),
    ))
    .parse(input)?;
    let (input, datum) = cut(|i| parse_sexpr(i, depth + 1)).parse(input)?;
    Ok((input, wrap(Rc::new(datum))))
}

/// Parse one datum after optional whitespace and comments
fn parse_sexpr(input: &str, depth: usize) -> IResult<&str, Value> {
    if depth >= MAX_PARSE_DEPTH {
        return failure(input, ErrorKind::TooLarge);
    }
    let (input, ()) = atmosphere(input)?;
    alt((
        |input| parse_abbreviation(input, depth),
        |input| parse_list(input, depth),
        |input| parse_hash(input, depth),
        parse_string,
        parse_atom,
    ))
    .parse(input)
}

/// Parse exactly one datum; anything but whitespace and comments after it is an error.
pub fn parse_scheme(input: &str) -> Result<Value, ParseError> {
    let (rest, datum) = parse_sexpr(input, 0).map_err(|e| to_parse_error(input, e))?;
    let (rest, ()) = atmosphere(rest).map_err(|e| to_parse_error(input, e))?;
    if rest.is_empty() {
        Ok(datum)
    } else {
        Err(ParseError::with_context(
            ParseErrorKind::TrailingContent,
            format!("Unexpected remaining input: '{rest}'"),
            input,
            input.len() - rest.len(),
        ))
    }
}

/// Parse a whole source text into a [`Value::Program`] of its top-level forms.
pub fn parse_program(input: &str) -> Result<Value, ParseError> {
    let mut forms = Vec::new();
    let mut rest = input;
    loop {
        let (after, ()) = atmosphere(rest).map_err(|e| to_parse_error(input, e))?;
        if after.is_empty() {
            break;
        }
        let (after, form) = parse_sexpr(after, 0).map_err(|e| to_parse_error(input, e))?;
        forms.push(form);
        rest = after;
    }
    Ok(Value::Program(Rc::from(forms)))
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};

    #[derive(Debug)]
    enum ParseTestResult {
        Success(Value),              // Parsing should succeed with this value
        SpecificError(&'static str), // Parsing should fail with error containing this string
        Error,                       // Parsing should fail (any error)
    }
    use ParseTestResult::*;

    fn success<T: Into<Value>>(value: T) -> ParseTestResult {
        Success(value.into())
    }

    fn quoted(inner: Value) -> Value {
        Value::Quote(Rc::new(inner))
    }

    /// Run parse tests, checking that printed output reads back the same
    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{} ({input})", i + 1);
            match (parse_scheme(input), expected) {
                (Ok(actual), Success(expected_val)) => {
                    assert_eq!(actual, *expected_val, "{test_id}: value mismatch");

                    let displayed = format!("{actual}");
                    let reparsed = parse_scheme(&displayed).unwrap_or_else(|e| {
                        panic!("{test_id}: round-trip parse failed for '{displayed}': {e:?}")
                    });
                    assert_eq!(
                        displayed,
                        format!("{reparsed}"),
                        "{test_id}: round-trip display mismatch"
                    );
                }
                (Err(_), Error) => {}
                (Err(err), SpecificError(expected_text)) => {
                    assert!(
                        err.message.contains(expected_text),
                        "{test_id}: error '{}' should contain '{expected_text}'",
                        err.message
                    );
                }
                (Ok(actual), Error | SpecificError(_)) => {
                    panic!("{test_id}: expected error, got {actual:?}");
                }
                (Err(err), Success(_)) => {
                    panic!("{test_id}: expected success, got error {err:?}");
                }
            }
        }
    }

    #[test]
    #[expect(clippy::too_many_lines)] // one table per syntax family reads best
    fn test_parser_comprehensive() {
        let test_cases = vec![
            // ===== NUMBERS =====
            ("42", success(42)),
            ("-5", success(-5)),
            ("+7", success(7)),
            ("-0", success(0)),
            ("#x1A", success(26)),
            ("#X1a", success(26)),
            ("#xff", success(255)),
            ("9223372036854775807", success(i64::MAX)),
            ("-9223372036854775808", success(i64::MIN)),
            ("2.5", success(2.5)),
            ("-0.25", success(-0.25)),
            (".5", success(0.5)),
            ("1e3", success(1000.0)),
            ("+inf.0", success(f64::INFINITY)),
            ("#xG", Error),
            ("#x", Error),
            ("#y123", Error),
            ("123abc", SpecificError("Invalid number literal")),
            ("99999999999999999999", Error),
            ("1.2.3", Error),
            // ===== SYMBOLS =====
            ("foo", success(sym("foo"))),
            ("+", success(sym("+"))),
            ("-", success(sym("-"))),
            ("...", success(sym("..."))),
            ("=>", success(sym("=>"))),
            (">=", success(sym(">="))),
            ("->string", success(sym("->string"))),
            ("set-car!", success(sym("set-car!"))),
            ("call/cc", success(sym("call/cc"))),
            (".length", success(sym(".length"))),
            ("-abc", success(sym("-abc"))),
            ("a_b$c%d&e:f^g~h", success(sym("a_b$c%d&e:f^g~h"))),
            ("λ", success(sym("λ"))),
            ("-42name", Error),
            // ===== BOOLEANS, CHARACTERS, STRINGS =====
            ("#t", success(true)),
            ("#f", success(false)),
            ("#true", success(true)),
            ("#false", success(false)),
            ("#\\a", success('a')),
            ("#\\space", success(' ')),
            ("#\\newline", success('\n')),
            ("#\\x41", success('A')),
            ("#\\(", success('(')),
            ("#\\bogus", Error),
            ("\"hello\"", success("hello")),
            ("\"\"", success("")),
            ("\"a\\nb\\t\\\"c\\\\\"", success("a\nb\t\"c\\")),
            ("\"bad \\q escape\"", SpecificError("Unknown escape sequence")),
            // ===== LISTS =====
            ("()", success(nil())),
            ("( )", success(nil())),
            ("(1 2 3)", success([1, 2, 3])),
            ("(a (b c) ())", success(vec![sym("a"), val(vec![sym("b"), sym("c")]), nil()])),
            ("(1 . 2)", success(Value::cons(val(1), val(2)))),
            (
                "(1 2 . 3)",
                success(Value::list_with_tail([val(1), val(2)], val(3))),
            ),
            ("(1 . (2 3))", success([1, 2, 3])),
            ("( . 1)", Error),
            ("(1 . 2 3)", Error),
            ("(1 .)", Error),
            // ===== VECTORS AND BYTEVECTORS =====
            ("#(1 a \"s\")", success(Value::vector(vec![val(1), sym("a"), val("s")]))),
            ("#()", success(Value::vector(Vec::new()))),
            (
                "#u8(1 255)",
                success(Value::Bytevector(Rc::new(RefCell::new(vec![1, 255])))),
            ),
            ("#u8(256)", Error),
            ("#u8(a)", Error),
            // ===== QUOTE SUGAR =====
            ("'x", success(quoted(sym("x")))),
            ("'(1 2)", success(quoted(val([1, 2])))),
            ("`(a ,b ,@c)", success(Value::Quasiquote(Rc::new(val(vec![
                sym("a"),
                Value::Unquote(Rc::new(sym("b"))),
                Value::UnquoteSplicing(Rc::new(sym("c"))),
            ]))))),
            ("''x", success(quoted(quoted(sym("x"))))),
            ("(quote x)", success(vec![sym("quote"), sym("x")])),
            // ===== COMMENTS AND WHITESPACE =====
            ("  42  ", success(42)),
            ("; leading\n42 ; trailing", success(42)),
            ("(1 #| inline |# 2)", success([1, 2])),
            ("(1 ; mid\n 2)", success([1, 2])),
            // ===== ERRORS =====
            ("", Error),
            (")", Error),
            ("(1 2))", SpecificError("Unexpected remaining input")),
            ("1 2", Error),
            ("#/[/", SpecificError("Invalid regex literal")),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_regex_literal() {
        let Value::Regex(re) = parse_scheme(r"#/^a\/b$/").unwrap() else {
            panic!("expected regex");
        };
        assert_eq!(re.as_str(), "^a/b$");
        assert!(re.is_match("a/b"));

        let Value::Regex(re) = parse_scheme(r"#/\d+/").unwrap() else {
            panic!("expected regex");
        };
        assert!(re.is_match("x42"));
    }

    #[test]
    fn test_error_kinds() {
        let cases = [
            ("(1 2", ParseErrorKind::Incomplete),
            ("\"open", ParseErrorKind::Incomplete),
            ("'", ParseErrorKind::Incomplete),
            ("#(1", ParseErrorKind::Incomplete),
            ("(a . b", ParseErrorKind::Incomplete),
            ("(1 2))", ParseErrorKind::TrailingContent),
            ("#y", ParseErrorKind::InvalidSyntax),
            ("123abc", ParseErrorKind::InvalidSyntax),
        ];
        for (input, kind) in cases {
            let err = parse_scheme(input).unwrap_err();
            assert_eq!(err.kind, kind, "{input}: {err}");
        }
        assert!(parse_program("(define x\n  (+ 1").unwrap_err().is_incomplete());
    }

    #[test]
    fn test_error_context() {
        let err = parse_scheme("(list 1 2 123abc)").unwrap_err();
        let context = err.context.unwrap();
        assert!(context.contains("123abc"), "{context}");
        assert!(!context.contains('\n'));
    }

    #[test]
    fn test_parse_program() {
        let Value::Program(forms) =
            parse_program("(define x 1) ; one\n(define y 2)\n\n'done").unwrap()
        else {
            panic!("expected program");
        };
        assert_eq!(forms.len(), 3);
        assert_eq!(forms[0], val(vec![sym("define"), sym("x"), val(1)]));
        assert_eq!(forms[2], quoted(sym("done")));

        let Value::Program(empty) = parse_program("  ; nothing here\n").unwrap() else {
            panic!("expected program");
        };
        assert!(empty.is_empty());

        assert!(parse_program("(a) )").is_err());
    }

    #[test]
    fn test_parser_depth_limits() {
        let nested_ok = format!(
            "{}1{}",
            "(".repeat(MAX_PARSE_DEPTH - 1),
            ")".repeat(MAX_PARSE_DEPTH - 1)
        );
        assert!(parse_scheme(&nested_ok).is_ok());

        let nested_deep = format!(
            "{}1{}",
            "(".repeat(MAX_PARSE_DEPTH + 1),
            ")".repeat(MAX_PARSE_DEPTH + 1)
        );
        let err = parse_scheme(&nested_deep).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TooDeeplyNested);
        assert!(err.message.contains("too deeply nested"));

        let quotes = format!("{}x", "'".repeat(MAX_PARSE_DEPTH + 1));
        assert_eq!(
            parse_scheme(&quotes).unwrap_err().kind,
            ParseErrorKind::TooDeeplyNested
        );
    }
}
