//! S-expression reader.
//!
//! Text is parsed with nom into a small [`Datum`] tree first, and only then
//! materialized into the heap. Keeping the two steps apart means a syntax error
//! never leaves half-built objects behind, and the materializer can root each
//! finished element while it allocates the next.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{anychar, char, digit0, digit1, multispace1, not_line_ending, one_of, satisfy},
    combinator::{eof, opt, peek, recognize, value},
    error::ErrorKind,
    multi::many0,
    sequence::{pair, preceded, terminated},
};

use crate::evaluator::Runtime;
use crate::heap::Heap;
use crate::value::Value;
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Characters allowed in symbols besides alphanumerics
const SYMBOL_SPECIAL_CHARS: &str = "!$%&*/:<=>?^_~+-.@";

/// Parsed syntax, not yet allocated.
#[derive(Debug, Clone, PartialEq)]
enum Datum {
    Number(f64),
    Boolean(bool),
    Character(char),
    String(String),
    Symbol(String),
    /// Elements plus an optional dotted tail
    List(Vec<Datum>, Option<Box<Datum>>),
}

fn failure(input: &str, kind: ErrorKind) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(input, kind))
}

/// Commit to the current token: past an opening `(` or `'`, a recoverable
/// error becomes a failure so it is reported where it happened.
fn cut_error(error: nom::Err<nom::error::Error<&str>>) -> nom::Err<nom::error::Error<&str>> {
    match error {
        nom::Err::Error(e) => nom::Err::Failure(e),
        other => other,
    }
}

/// Skip whitespace and `;` line comments
fn parse_atmosphere(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            multispace1,
            recognize(pair(char(';'), not_line_ending)),
        ))),
    )
    .parse(input)
}

/// Succeeds without consuming input where a token may end.
fn at_delimiter(input: &str) -> IResult<&str, ()> {
    peek(alt((
        value(
            (),
            satisfy(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '\'' | '"' | ';')),
        ),
        value((), eof),
    )))
    .parse(input)
}

/// Parse a decimal number, with optional sign, fraction and exponent.
/// Text like `1+` or `2nd` that merely starts with digits is left to
/// [`parse_symbol`].
fn parse_number(input: &str) -> IResult<&str, Datum> {
    let (remaining, number_str) = terminated(
        recognize((
            opt(one_of("+-")),
            alt((
                recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                recognize(pair(char('.'), digit1)),
            )),
            opt((one_of("eE"), opt(one_of("+-")), digit1)),
        )),
        at_delimiter,
    )
    .parse(input)?;

    match number_str.parse::<f64>() {
        Ok(n) => Ok((remaining, Datum::Number(n))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Float,
        ))),
    }
}

/// Parse a boolean (#t, #f, #true, #false)
fn parse_bool(input: &str) -> IResult<&str, Datum> {
    terminated(
        alt((
            value(Datum::Boolean(true), tag("#true")),
            value(Datum::Boolean(false), tag("#false")),
            value(Datum::Boolean(true), tag("#t")),
            value(Datum::Boolean(false), tag("#f")),
        )),
        at_delimiter,
    )
    .parse(input)
}

/// Parse a character literal (#\a, #\space, ...)
fn parse_character(input: &str) -> IResult<&str, Datum> {
    let (input, _) = tag("#\\").parse(input)?;
    let (input, c) = alt((
        terminated(value(' ', tag("space")), at_delimiter),
        terminated(value('\n', tag("newline")), at_delimiter),
        terminated(value('\t', tag("tab")), at_delimiter),
        terminated(value('\r', tag("return")), at_delimiter),
        terminated(value('\0', tag("null")), at_delimiter),
        terminated(anychar, at_delimiter),
    ))
    .parse(input)?;
    Ok((input, Datum::Character(c)))
}

/// Parse a symbol (identifier)
fn parse_symbol(input: &str) -> IResult<&str, Datum> {
    let (remaining, candidate) =
        take_while1(|c: char| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
            .parse(input)?;

    // A lone dot is list syntax, not a symbol.
    if candidate == "." {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Alpha,
        )));
    }
    Ok((remaining, Datum::Symbol(candidate.to_owned())))
}

/// Parse a string literal. Errors inside a string are failures, so an
/// unterminated string is reported at end of input instead of being retried
/// as some other token.
fn parse_string(input: &str) -> IResult<&str, Datum> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), Datum::String(text))),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some(_) => return Err(failure(remaining, ErrorKind::Escaped)),
                    None => return Err(failure(char_iter.as_str(), ErrorKind::Char)),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                text.push(ch);
                remaining = char_iter.as_str();
            }
            None => return Err(failure(remaining, ErrorKind::Char)),
        }
    }
}

/// The `.` separating a dotted tail, which must be followed by a delimiter.
fn parse_dot(input: &str) -> IResult<&str, char> {
    terminated(char('.'), at_delimiter).parse(input)
}

/// Parse a list, proper or dotted
fn parse_list(input: &str, depth: usize) -> IResult<&str, Datum> {
    let (mut input, _) = char('(').parse(input)?;
    let mut items = Vec::new();

    loop {
        let (rest, _) = parse_atmosphere(input)?;
        if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>(')').parse(rest) {
            return Ok((rest, Datum::List(items, None)));
        }

        if !items.is_empty()
            && let Ok((rest, _)) = parse_dot(rest)
        {
            let (rest, tail) = parse_datum(rest, depth + 1).map_err(cut_error)?;
            let (rest, _) = parse_atmosphere(rest)?;
            let (rest, _) = char(')').parse(rest).map_err(cut_error)?;
            return Ok((rest, Datum::List(items, Some(Box::new(tail)))));
        }

        let (rest, item) = parse_datum(rest, depth + 1).map_err(cut_error)?;
        items.push(item);
        input = rest;
    }
}

/// Parse quoted expression ('expr -> (quote expr))
fn parse_quote(input: &str, depth: usize) -> IResult<&str, Datum> {
    let (input, _) = char('\'').parse(input)?;
    let (input, datum) = parse_datum(input, depth + 1).map_err(cut_error)?;
    Ok((
        input,
        Datum::List(vec![Datum::Symbol("quote".to_owned()), datum], None),
    ))
}

/// Parse one datum, skipping leading whitespace and comments
fn parse_datum(input: &str, depth: usize) -> IResult<&str, Datum> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(failure(input, ErrorKind::TooLarge));
    }
    preceded(
        parse_atmosphere,
        alt((
            |input| parse_quote(input, depth),
            |input| parse_list(input, depth),
            parse_number,
            parse_bool,
            parse_character,
            parse_string,
            parse_symbol,
        )),
    )
    .parse(input)
}

/// Convert nom parsing errors to structured parse errors
fn to_parse_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            if e.code == ErrorKind::TooLarge {
                ParseError::with_context(
                    ParseErrorKind::TooDeeplyNested,
                    format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                    input,
                    position,
                )
            } else if e.input.is_empty() {
                ParseError::with_context(
                    ParseErrorKind::Incomplete,
                    "Unexpected end of input",
                    input,
                    position,
                )
            } else if e.code == ErrorKind::Escaped {
                ParseError::with_context(
                    ParseErrorKind::InvalidSyntax,
                    format!("Unknown escape sequence at position {position}"),
                    input,
                    position,
                )
            } else {
                let near: String = e.input.chars().take(10).collect();
                ParseError::with_context(
                    ParseErrorKind::InvalidSyntax,
                    format!("Invalid syntax near '{near}'"),
                    input,
                    position,
                )
            }
        }
        nom::Err::Incomplete(_) => {
            ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input")
        }
    }
}

/// Parse every datum in `input`.
fn read_all(input: &str) -> Result<Vec<Datum>, ParseError> {
    let mut data = Vec::new();
    let mut rest = input;
    loop {
        let (after, _) = parse_atmosphere(rest).map_err(|e| to_parse_error(input, e))?;
        if after.is_empty() {
            return Ok(data);
        }
        let (after, datum) = parse_datum(after, 0).map_err(|e| to_parse_error(input, e))?;
        data.push(datum);
        rest = after;
    }
}

/// Parse at most one datum; anything after it is an error.
fn read_one(input: &str) -> Result<Option<Datum>, ParseError> {
    let (rest, _) = parse_atmosphere(input).map_err(|e| to_parse_error(input, e))?;
    if rest.is_empty() {
        return Ok(None);
    }
    let (rest, datum) = parse_datum(rest, 0).map_err(|e| to_parse_error(input, e))?;
    let (rest, _) = parse_atmosphere(rest).map_err(|e| to_parse_error(input, e))?;
    if !rest.is_empty() {
        return Err(ParseError::with_context(
            ParseErrorKind::TrailingContent,
            format!("Unexpected remaining input: '{}'", rest.trim_end()),
            input,
            input.len() - rest.len(),
        ));
    }
    Ok(Some(datum))
}

/// Allocate `datum` in the heap. Finished elements stay rooted until the
/// enclosing list is built.
fn materialize(heap: &mut Heap, datum: &Datum) -> Result<Value, Error> {
    match datum {
        Datum::Number(n) => Ok(Value::number(*n)),
        Datum::Boolean(b) => Ok(Value::boolean(*b)),
        Datum::Character(c) => Ok(Value::character(*c)),
        Datum::String(text) => heap.alloc_string(text.as_str()),
        Datum::Symbol(name) => heap.intern(name),
        Datum::List(items, tail) => heap.scoped(|heap| {
            let tail = match tail {
                Some(tail) => materialize(heap, tail)?,
                None => Value::EMPTY_LIST,
            };
            heap.push_root(tail);
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                let value = materialize(heap, item)?;
                heap.push_root(value);
                values.push(value);
            }
            heap.list_with_tail(&values, tail)
        }),
    }
}

/// Parse a single S-expression into `heap`. Empty input (only whitespace and
/// comments) yields [`Value::EOF`].
pub fn parse_scheme(heap: &mut Heap, input: &str) -> Result<Value, Error> {
    match read_one(input)? {
        Some(datum) => materialize(heap, &datum),
        None => Ok(Value::EOF),
    }
}

/// Parse every S-expression in `input` into `heap`.
///
/// The returned values are not rooted; root them before allocating again.
pub fn parse_scheme_all(heap: &mut Heap, input: &str) -> Result<Vec<Value>, Error> {
    let data = read_all(input)?;
    heap.scoped(|heap| {
        let mut values = Vec::with_capacity(data.len());
        for datum in &data {
            let value = materialize(heap, datum)?;
            heap.push_root(value);
            values.push(value);
        }
        Ok(values)
    })
}

impl Runtime {
    pub fn parse(&mut self, text: &str) -> Result<Value, Error> {
        self.guard(|rt| parse_scheme(rt.heap_mut(), text))
    }

    pub fn parse_all(&mut self, text: &str) -> Result<Vec<Value>, Error> {
        self.guard(|rt| parse_scheme_all(rt.heap_mut(), text))
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    /// Test result variants for comprehensive parsing tests
    #[derive(Debug)]
    enum ParseTestResult {
        Printed(&'static str),  // Parsing should succeed and print like this
        Kind(ParseErrorKind),   // Parsing should fail with this kind of error
    }
    use ParseTestResult::*;

    /// Run parse tests, checking that printed output reads back unchanged
    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        let mut heap = Heap::new(4096);
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{}", i + 1);
            let result = parse_scheme(&mut heap, input);

            match (result, expected) {
                (Ok(actual), Printed(expected_text)) => {
                    let displayed = heap.printer(actual).to_string();
                    assert_eq!(&displayed, expected_text, "{test_id}: '{input}'");

                    let reparsed = parse_scheme(&mut heap, &displayed).unwrap_or_else(|e| {
                        panic!("{test_id}: round-trip parse failed for '{displayed}': {e:?}")
                    });
                    assert_eq!(
                        heap.printer(reparsed).to_string(),
                        displayed,
                        "{test_id}: round-trip display mismatch for '{input}'"
                    );
                }
                (Err(Error::ParseError(err)), Kind(kind)) => {
                    assert_eq!(&err.kind, kind, "{test_id}: '{input}' gave {err:?}");
                }
                (Ok(actual), Kind(kind)) => {
                    panic!(
                        "{test_id}: expected {kind:?}, got {}",
                        heap.printer(actual)
                    );
                }
                (Err(err), _) => {
                    panic!("{test_id}: unexpected result for '{input}': {err:?}");
                }
            }
            heap.collect(&[]);
        }
    }

    #[test]
    fn test_parser_comprehensive() {
        let test_cases = vec![
            // Numbers
            ("42", Printed("42")),
            ("-7", Printed("-7")),
            ("+5", Printed("5")),
            ("3.25", Printed("3.25")),
            (".5", Printed("0.5")),
            ("1e3", Printed("1000")),
            ("2.5E-1", Printed("0.25")),
            // Booleans
            ("#t", Printed("#t")),
            ("#f", Printed("#f")),
            ("#true", Printed("#t")),
            ("#false", Printed("#f")),
            // Characters
            ("#\\a", Printed("#\\a")),
            ("#\\space", Printed("#\\space")),
            ("#\\newline", Printed("#\\newline")),
            ("#\\tab", Printed("#\\tab")),
            ("#\\(", Printed("#\\(")),
            // Strings
            ("\"hello\"", Printed("\"hello\"")),
            ("\"\"", Printed("\"\"")),
            ("\"a\\nb\"", Printed("\"a\\nb\"")),
            ("\"q\\\"q\\\\\"", Printed("\"q\\\"q\\\\\"")),
            ("\"tab\\there\"", Printed("\"tab\\there\"")),
            // Symbols
            ("foo", Printed("foo")),
            ("set!", Printed("set!")),
            ("<=", Printed("<=")),
            ("->x", Printed("->x")),
            ("1+", Printed("1+")),
            ("2nd", Printed("2nd")),
            ("-1x", Printed("-1x")),
            ("-", Printed("-")),
            ("...", Printed("...")),
            ("string-append", Printed("string-append")),
            // Lists
            ("()", Printed("()")),
            ("( )", Printed("()")),
            ("(1 2 3)", Printed("(1 2 3)")),
            ("(1 . 2)", Printed("(1 . 2)")),
            ("(1 2 . 3)", Printed("(1 2 . 3)")),
            ("(a . (b c))", Printed("(a b c)")),
            ("(a (b c) ())", Printed("(a (b c) ())")),
            ("(\"s\" #\\x #t)", Printed("(\"s\" #\\x #t)")),
            ("(x .5)", Printed("(x 0.5)")),
            ("(1a 2)", Printed("(1a 2)")),
            ("(1)", Printed("(1)")),
            ("(#t)", Printed("(#t)")),
            ("(1;c\n)", Printed("(1)")),
            // Quote shorthand
            ("'foo", Printed("(quote foo)")),
            ("'(1 2)", Printed("(quote (1 2))")),
            ("''a", Printed("(quote (quote a))")),
            ("(a 'b)", Printed("(a (quote b))")),
            // Whitespace and comments
            ("  ; leading comment\n (1 ; inner\n 2)  ; trailing", Printed("(1 2)")),
            ("\n\t(a\n\tb)\n", Printed("(a b)")),
            // Empty input
            ("", Printed("#<eof>")),
            ("   ; nothing here", Printed("#<eof>")),
            // Incomplete input
            ("(1 2", Kind(ParseErrorKind::Incomplete)),
            ("((a)", Kind(ParseErrorKind::Incomplete)),
            ("\"abc", Kind(ParseErrorKind::Incomplete)),
            ("'", Kind(ParseErrorKind::Incomplete)),
            ("(1 .", Kind(ParseErrorKind::Incomplete)),
            // Trailing content
            ("(1 2))", Kind(ParseErrorKind::TrailingContent)),
            ("1 2", Kind(ParseErrorKind::TrailingContent)),
            // Invalid syntax
            (")", Kind(ParseErrorKind::InvalidSyntax)),
            ("\"bad \\q escape\"", Kind(ParseErrorKind::InvalidSyntax)),
            ("(. 1)", Kind(ParseErrorKind::InvalidSyntax)),
            ("(1 . )", Kind(ParseErrorKind::InvalidSyntax)),
            ("(1 . 2 3)", Kind(ParseErrorKind::InvalidSyntax)),
            ("(a ] b)", Kind(ParseErrorKind::InvalidSyntax)),
            ("#tx", Kind(ParseErrorKind::InvalidSyntax)),
            ("#\\ab", Kind(ParseErrorKind::InvalidSyntax)),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_quote_shorthand_matches_long_form() {
        let mut heap = Heap::new(64);
        let short = parse_scheme(&mut heap, "'foo").unwrap();
        heap.push_root(short);
        let long = parse_scheme(&mut heap, "(quote foo)").unwrap();

        assert_eq!(heap.printer(short).to_string(), heap.printer(long).to_string());
        // Interning makes both heads, and both quoted symbols, the same object.
        assert_eq!(heap.car(short), heap.car(long));
        assert_eq!(
            heap.cdr(short).and_then(|rest| heap.car(rest)),
            heap.cdr(long).and_then(|rest| heap.car(rest))
        );
    }

    #[test]
    fn test_parse_all() {
        let mut heap = Heap::new(64);
        let values = parse_scheme_all(&mut heap, "(define x 1) x ; done\n'y").unwrap();
        let printed: Vec<String> = values
            .iter()
            .map(|&v| heap.printer(v).to_string())
            .collect();
        assert_eq!(printed, vec!["(define x 1)", "x", "(quote y)"]);
        assert_eq!(parse_scheme_all(&mut heap, "  ").unwrap(), vec![]);
    }

    #[test]
    fn test_parse_error_details() {
        let mut heap = Heap::new(16);
        let Err(Error::ParseError(err)) = parse_scheme(&mut heap, "(a ] b)") else {
            panic!("expected a parse error");
        };
        assert_eq!(err.found.as_deref(), Some("]"));
        assert!(err.context.is_some());
        assert!(format!("{}", Error::ParseError(err)).starts_with("ParseError: "));
    }

    #[test]
    fn test_parser_depth_limits() {
        let mut heap = Heap::new(4096);

        let ok_depth = MAX_PARSE_DEPTH - 1;
        let nested = format!("{}{}", "(".repeat(ok_depth), ")".repeat(ok_depth));
        assert!(parse_scheme(&mut heap, &nested).is_ok());

        let too_deep = MAX_PARSE_DEPTH + 10;
        let nested = format!("{}{}", "(".repeat(too_deep), ")".repeat(too_deep));
        match parse_scheme(&mut heap, &nested) {
            Err(Error::ParseError(err)) => {
                assert_eq!(err.kind, ParseErrorKind::TooDeeplyNested);
            }
            other => panic!("expected TooDeeplyNested, got {other:?}"),
        }

        let quotes = format!("{}x", "'".repeat(too_deep));
        assert!(matches!(
            parse_scheme(&mut heap, &quotes),
            Err(Error::ParseError(ParseError {
                kind: ParseErrorKind::TooDeeplyNested,
                ..
            }))
        ));
    }

    #[test]
    fn test_parse_survives_collection_pressure() {
        // Small heap: materializing the list forces collections part way through.
        let mut heap = Heap::new(16);
        for _ in 0..10 {
            heap.alloc_string("garbage").unwrap();
        }
        let list = parse_scheme(&mut heap, "(\"a\" \"b\" (\"c\" \"d\") \"e\" . \"f\")").unwrap();
        assert_eq!(
            heap.printer(list).to_string(),
            "(\"a\" \"b\" (\"c\" \"d\") \"e\" . \"f\")"
        );
    }

    #[test]
    fn test_runtime_parse_round_trip() {
        let mut rt = Runtime::new(1 << 12).unwrap();
        let value = rt.parse("(1 2 3)").unwrap();
        assert_eq!(rt.format(value), "(1 2 3)");
        assert_eq!(rt.parse("").unwrap(), Value::EOF);
        assert!(matches!(
            rt.parse("(1 2"),
            Err(Error::ParseError(ParseError {
                kind: ParseErrorKind::Incomplete,
                ..
            }))
        ));
    }
}
