//! Spec string parser
//!
//! A spec string is either `"<resolver>: <body>"` or a bare source path.
//! The resolver prefix is matched case-insensitively against the built-in
//! names (`source`, `constant`, `skip`) and the registered resolvers; an
//! unknown prefix is not an error, the whole string is then read as a path.
//!
//! ## Path grammar
//!
//! ```text
//! path     := element ('.' element)*
//! element  := (quoted | field) bracket* | bracket+
//! field    := [^ . " ' [ ] \n \r \t \f \v]+        all digits → index
//! quoted   := '"' (\" | \\ | [^"\\])* '"'  |  '\'' (\' | \\ | [^'\\])* '\''
//! bracket  := '[' (digits | quoted) ']'
//! ```

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, digit1, none_of},
    combinator::{all_consuming, cut, map, map_res, value},
    error::{context, convert_error, VerboseError},
    multi::{many0, many1, separated_list1},
    sequence::{delimited, pair},
    IResult,
};

use super::resolvers::ResolverRegistry;
use crate::error::SpecError;

pub type PathError<'a> = VerboseError<&'a str>;

// =============================================================================
// TYPES
// =============================================================================

/// How the body of a spec string is interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverKind {
    /// Navigate the source data along the path
    Source,
    /// Body verbatim as a string
    Constant,
    /// Omit the enclosing key / element
    Skip,
    /// A registered resolver, by lowercase name
    Custom(String),
}

impl ResolverKind {
    pub fn name(&self) -> &str {
        match self {
            ResolverKind::Source => "source",
            ResolverKind::Constant => "constant",
            ResolverKind::Skip => "skip",
            ResolverKind::Custom(name) => name,
        }
    }
}

/// One step of a source path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{i}"),
            PathSegment::Key(key) if is_bare_key(key) => f.write_str(key),
            PathSegment::Key(key) => {
                let escaped = key.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{escaped}\"")
            }
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Canonical dotted rendering of a path
pub fn format_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

fn is_field_char(c: char) -> bool {
    !matches!(c, '.' | '"' | '\'' | '[' | ']' | '\n' | '\r' | '\t' | '\x0b' | '\x0c')
}

fn is_bare_key(key: &str) -> bool {
    !key.is_empty()
        && key.chars().all(is_field_char)
        && !key.bytes().all(|b| b.is_ascii_digit())
        && key.trim() == key
}

/// Parsed form of one spec string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecIntermediate {
    pub resolver: ResolverKind,
    /// Navigation path (source resolver only)
    pub path: Vec<PathSegment>,
    /// The string as written
    pub raw: String,
    /// Trimmed text after the resolver prefix
    pub body: String,
}

impl SpecIntermediate {
    /// Source path spec built directly from segments
    pub fn source(path: Vec<PathSegment>) -> Self {
        let raw = format_path(&path);
        Self {
            resolver: ResolverKind::Source,
            path,
            body: raw.clone(),
            raw,
        }
    }

    /// Parse `raw` against the given resolver registry
    pub fn parse(raw: &str, resolvers: &ResolverRegistry) -> Result<Self, SpecError> {
        let (resolver, body) = match raw.split_once(':') {
            Some((prefix, body)) => match resolver_kind(prefix, resolvers) {
                Some(kind) => (kind, body.trim()),
                None => (ResolverKind::Source, raw.trim()),
            },
            None => (ResolverKind::Source, raw.trim()),
        };

        let path = match resolver {
            ResolverKind::Source => parse_path(body).map_err(|message| SpecError::InvalidFormat {
                raw: raw.to_string(),
                message,
            })?,
            _ => Vec::new(),
        };

        Ok(Self {
            resolver,
            path,
            raw: raw.to_string(),
            body: body.to_string(),
        })
    }
}

fn resolver_kind(prefix: &str, resolvers: &ResolverRegistry) -> Option<ResolverKind> {
    let name = prefix.trim().to_lowercase();
    match name.as_str() {
        "source" => Some(ResolverKind::Source),
        "constant" => Some(ResolverKind::Constant),
        "skip" => Some(ResolverKind::Skip),
        _ if resolvers.contains(&name) => Some(ResolverKind::Custom(name)),
        _ => None,
    }
}

// =============================================================================
// PATH PARSER
// =============================================================================

/// Parse a source path; an empty body is the empty path (the data itself)
pub fn parse_path(input: &str) -> Result<Vec<PathSegment>, String> {
    if input.is_empty() {
        return Ok(Vec::new());
    }
    match all_consuming(path)(input) {
        Ok((_, segments)) => Ok(segments),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(convert_error(input, e)),
        Err(nom::Err::Incomplete(_)) => Err("Incomplete input".to_string()),
    }
}

fn path(input: &str) -> IResult<&str, Vec<PathSegment>, PathError<'_>> {
    map(separated_list1(char('.'), element), |elements: Vec<Vec<PathSegment>>| {
        elements.into_iter().flatten().collect()
    })(input)
}

fn element(input: &str) -> IResult<&str, Vec<PathSegment>, PathError<'_>> {
    context(
        "path element",
        alt((
            map(
                pair(alt((map(quoted, PathSegment::Key), field)), many0(bracket)),
                |(head, mut rest)| {
                    rest.insert(0, head);
                    rest
                },
            ),
            many1(bracket),
        )),
    )(input)
}

fn field(input: &str) -> IResult<&str, PathSegment, PathError<'_>> {
    map(take_while1(is_field_char), |text: &str| {
        if text.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = text.parse::<usize>() {
                return PathSegment::Index(index);
            }
        }
        PathSegment::Key(text.to_string())
    })(input)
}

fn bracket(input: &str) -> IResult<&str, PathSegment, PathError<'_>> {
    delimited(
        char('['),
        cut(alt((
            map(quoted, PathSegment::Key),
            map_res(digit1, |digits: &str| digits.parse::<usize>().map(PathSegment::Index)),
        ))),
        context("closing bracket", cut(char(']'))),
    )(input)
}

fn quoted(input: &str) -> IResult<&str, String, PathError<'_>> {
    alt((double_quoted, single_quoted))(input)
}

fn double_quoted(input: &str) -> IResult<&str, String, PathError<'_>> {
    quoted_body(input, '"')
}

fn single_quoted(input: &str) -> IResult<&str, String, PathError<'_>> {
    quoted_body(input, '\'')
}

/// Quoted key; only the quote character and the backslash are escapable
fn quoted_body(input: &str, quote: char) -> IResult<&str, String, PathError<'_>> {
    let (mut rest, _) = char::<_, PathError<'_>>(quote)(input)?;
    let mut out = String::new();
    loop {
        if let Ok((after, _)) = char::<_, PathError<'_>>(quote)(rest) {
            return Ok((after, out));
        }
        let (after, c) = alt::<_, _, PathError<'_>, _>((
            value(quote, pair(char('\\'), char(quote))),
            value('\\', pair(char('\\'), char('\\'))),
            none_of("\\\n\r\t\x0b\x0c"),
        ))(rest)
        .map_err(|e| match e {
            nom::Err::Error(inner) => nom::Err::Failure(inner),
            other => other,
        })?;
        out.push(c);
        rest = after;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(k: &str) -> PathSegment {
        PathSegment::Key(k.to_string())
    }

    fn parse(raw: &str) -> SpecIntermediate {
        SpecIntermediate::parse(raw, &ResolverRegistry::default()).unwrap()
    }

    #[test]
    fn test_dotted_path_with_indices() {
        let spec = parse("a.b.0.c");
        assert_eq!(spec.resolver, ResolverKind::Source);
        assert_eq!(spec.path, vec![key("a"), key("b"), PathSegment::Index(0), key("c")]);
    }

    #[test]
    fn test_quoted_and_bracket_segments() {
        assert!(parse_path(r#"servers["eu.west"][1].'it''s'"#).is_err());
        assert_eq!(
            parse_path(r#"servers["eu.west"][1].'it\'s'"#).unwrap(),
            vec![key("servers"), key("eu.west"), PathSegment::Index(1), key("it's")]
        );
        assert_eq!(parse_path(r#""0""#).unwrap(), vec![key("0")]);
        assert_eq!(parse_path("[0][1]").unwrap(), vec![PathSegment::Index(0), PathSegment::Index(1)]);
        assert_eq!(parse_path(r#"a."b\\c""#).unwrap(), vec![key("a"), key(r"b\c")]);
    }

    #[test]
    fn test_resolver_prefixes() {
        let constant = parse("Constant: hello world ");
        assert_eq!(constant.resolver, ResolverKind::Constant);
        assert_eq!(constant.body, "hello world");

        assert_eq!(parse("skip:").resolver, ResolverKind::Skip);
        assert_eq!(parse("source: a.b").path, vec![key("a"), key("b")]);

        // unregistered prefix: the colon is part of a key
        let odd = parse("time:stamp");
        assert_eq!(odd.resolver, ResolverKind::Source);
        assert_eq!(odd.path, vec![key("time:stamp")]);
    }

    #[test]
    fn test_empty_body_is_empty_path() {
        assert!(parse("").path.is_empty());
        assert!(parse("source:").path.is_empty());
    }

    #[test]
    fn test_malformed_paths_rejected() {
        for raw in ["a..b", ".a", "a.", "a[", "a[x]", "\"open", "a[0"] {
            let err = SpecIntermediate::parse(raw, &ResolverRegistry::default()).unwrap_err();
            assert!(matches!(err, SpecError::InvalidFormat { .. }), "accepted {raw}");
        }
    }

    #[test]
    fn test_format_path_round_trip() {
        let path = vec![key("a"), key("eu.west"), PathSegment::Index(2), key("12"), key("say \"hi\"")];
        let text = format_path(&path);
        assert_eq!(text, r#"a."eu.west".2."12"."say \"hi\"""#);
        assert_eq!(parse_path(&text).unwrap(), path);
    }
}
