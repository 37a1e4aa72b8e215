// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STEP tokenizer built on nom.
//!
//! Splits one `#id=TYPE(...);` record into its id, type keyword and
//! attribute tokens. Tokens borrow from the input.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    multi::{many0_count, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::error::{Error, Result};

/// One attribute value of a STEP record
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    /// `#123`
    EntityRef(u32),
    /// Quoted text with `''` escapes left in place
    String(&'a str),
    Integer(i64),
    /// `3.14`, `0.`, `1.E-5`
    Float(f64),
    /// `.T.`, `.ELEMENT.` without the dots
    Enum(&'a str),
    List(Vec<Token<'a>>),
    /// Select value such as `IFCPARAMETERVALUE(0.)`
    TypedValue(&'a str, Vec<Token<'a>>),
    /// `$`
    Null,
    /// `*`
    Derived,
}

type Parsed<'a, T> = IResult<&'a str, T>;

fn ws(input: &str) -> Parsed<'_, &str> {
    take_while(char::is_whitespace)(input)
}

fn padded<'a, T>(
    inner: impl FnMut(&'a str) -> Parsed<'a, T>,
) -> impl FnMut(&'a str) -> Parsed<'a, T> {
    delimited(ws, inner, ws)
}

fn keyword(input: &str) -> Parsed<'_, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn entity_id(input: &str) -> Parsed<'_, u32> {
    preceded(char('#'), map_res(digit1, str::parse::<u32>))(input)
}

/// `(a, b, ...)` with any tokens inside
fn arguments(input: &str) -> Parsed<'_, Vec<Token<'_>>> {
    delimited(
        char('('),
        separated_list0(char(','), padded(token)),
        preceded(ws, char(')')),
    )(input)
}

fn quoted(input: &str) -> Parsed<'_, &str> {
    delimited(
        char('\''),
        recognize(many0_count(alt((is_not("'"), tag("''"))))),
        char('\''),
    )(input)
}

fn number(input: &str) -> Parsed<'_, Token<'_>> {
    let exponent = tuple((one_of("eE"), opt(one_of("+-")), digit1));
    let (rest, text) = recognize(tuple((
        opt(one_of("+-")),
        digit1,
        opt(pair(char('.'), opt(digit1))),
        opt(exponent),
    )))(input)?;

    let parsed = if text.contains(['.', 'e', 'E']) {
        text.parse::<f64>().map(Token::Float).ok()
    } else {
        text.parse::<i64>().map(Token::Integer).ok()
    };
    match parsed {
        Some(token) => Ok((rest, token)),
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Float,
        ))),
    }
}

fn token(input: &str) -> Parsed<'_, Token<'_>> {
    alt((
        number,
        map(entity_id, Token::EntityRef),
        map(quoted, Token::String),
        map(
            delimited(char('.'), keyword, char('.')),
            Token::Enum,
        ),
        map(arguments, Token::List),
        map(pair(keyword, preceded(ws, arguments)), |(name, args)| {
            Token::TypedValue(name, args)
        }),
        value(Token::Null, char('$')),
        value(Token::Derived, char('*')),
    ))(input)
}

fn record(input: &str) -> Parsed<'_, (u32, &str, Vec<Token<'_>>)> {
    all_consuming(tuple((
        padded(entity_id),
        preceded(char('='), padded(keyword)),
        terminated(arguments, tuple((ws, char(';'), ws))),
    )))(input)
}

/// Parse one entity record, e.g. `#123=IFCWALL('guid',$,$,$,'name',$,$,$);`
///
/// Returns the id, the raw type keyword and the attribute tokens.
pub fn parse_entity(input: &str) -> Result<(u32, &str, Vec<Token<'_>>)> {
    record(input)
        .map(|(_, parsed)| parsed)
        .map_err(|e| Error::parse(0, format!("Failed to parse entity: {}", e)))
}

/// Byte offset just past the `;` closing the record starting at `input`,
/// ignoring semicolons inside quoted strings.
pub(crate) fn record_end(input: &str) -> Option<usize> {
    let mut in_string = false;
    for (i, b) in input.bytes().enumerate() {
        match b {
            // A doubled quote toggles twice and stays inside the string
            b'\'' => in_string = !in_string,
            b';' if !in_string => return Some(i + 1),
            _ => {}
        }
    }
    None
}

/// Iterate `(id, type keyword, start, end)` over every record in a file.
///
/// Header and data section markers are skipped because they carry no `#id=`.
pub struct EntityScanner<'a> {
    content: &'a str,
    position: usize,
}

impl<'a> EntityScanner<'a> {
    pub fn new(content: &'a str) -> Self {
        Self {
            content,
            position: 0,
        }
    }

    pub fn next_entity(&mut self) -> Option<(u32, &'a str, usize, usize)> {
        loop {
            let start = self.position + self.content[self.position..].find('#')?;
            let end = start + record_end(&self.content[start..])?;
            self.position = end;

            let head = &self.content[start..end];
            let Ok((_, (id, name))) = pair(
                terminated(entity_id, tuple((ws, char('='), ws))),
                keyword,
            )(head) else {
                continue;
            };
            return Some((id, name, start, end));
        }
    }
}
