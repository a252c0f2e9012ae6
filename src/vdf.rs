//! Reader for the client's text KeyValues files (`.acf`, `.vdf`).

use anyhow::{Result, anyhow};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{escaped, is_not, tag},
    character::complete::{anychar, char, multispace1, none_of, not_line_ending},
    combinator::{all_consuming, map, opt, value},
    multi::many0,
    sequence::{delimited, preceded, terminated},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Value(String),
    Section(Vec<(String, Node)>),
}

impl Node {
    /// Case-insensitive lookup of the first child named `key`.
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Section(entries) => entries
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(key))
                .map(|(_, node)| node),
            Node::Value(_) => None,
        }
    }

    pub fn get_path(&self, path: &[&str]) -> Option<&Node> {
        path.iter().try_fold(self, |node, key| node.get(key))
    }

    pub fn str_at(&self, path: &[&str]) -> Option<&str> {
        self.get_path(path).and_then(Node::as_str)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Value(value) => Some(value),
            Node::Section(_) => None,
        }
    }

    pub fn entries(&self) -> &[(String, Node)] {
        match self {
            Node::Section(entries) => entries,
            Node::Value(_) => &[],
        }
    }
}

/// Parses a whole document into a root section.
pub fn parse(input: &str) -> Result<Node> {
    let body = input.trim_start_matches('\u{feff}');
    let (_, entries) = all_consuming(terminated(many0(entry), skip))
        .parse(body)
        .map_err(|err| match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => anyhow!(
                "Malformed KeyValues document near byte {}",
                body.len() - e.input.len()
            ),
            nom::Err::Incomplete(_) => anyhow!("Truncated KeyValues document"),
        })?;
    Ok(Node::Section(entries))
}

// Whitespace and `//` comments
fn skip(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((multispace1, preceded(tag("//"), not_line_ending)))),
    )
    .parse(input)
}

fn entry(input: &str) -> IResult<&str, (String, Node)> {
    let (input, key) = preceded(skip, token).parse(input)?;
    let (input, node) = preceded(
        skip,
        alt((map(section, Node::Section), map(token, Node::Value))),
    )
    .parse(input)?;
    Ok((input, (key, node)))
}

fn section(input: &str) -> IResult<&str, Vec<(String, Node)>> {
    delimited(char('{'), many0(entry), preceded(skip, char('}'))).parse(input)
}

fn token(input: &str) -> IResult<&str, String> {
    alt((quoted, map(is_not(" \t\r\n{}\""), str::to_string))).parse(input)
}

fn quoted(input: &str) -> IResult<&str, String> {
    map(
        delimited(
            char('"'),
            opt(escaped(none_of("\\\""), '\\', anychar)),
            char('"'),
        ),
        |raw: Option<&str>| unescape(raw.unwrap_or_default()),
    )
    .parse(input)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
