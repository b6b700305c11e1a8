// Token-level parsers shared by the command parsers

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::{alpha1, alphanumeric1, char, multispace0},
    combinator::{map, opt, recognize},
    multi::many0_count,
    number::complete::double,
    sequence::{delimited, pair},
    IResult,
};

/// Wrap a parser so it skips surrounding whitespace
pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// Attribute, dimension or group name. Composite names keep their `:`.
pub fn identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0_count(alt((alphanumeric1, tag("_"), tag(":"), tag("-")))),
        )),
        String::from,
    )(input)
}

pub fn number_literal(input: &str) -> IResult<&str, f64> {
    double(input)
}

/// Double-quoted string without escapes
pub fn string_literal(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        map(opt(is_not("\"")), |s: Option<&str>| s.unwrap_or_default().to_string()),
        char('"'),
    )(input)
}

/// A name, bare or quoted
pub fn name(input: &str) -> IResult<&str, String> {
    alt((string_literal, identifier))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier() {
        assert_eq!(identifier("n_neighbors)"), Ok((")", "n_neighbors".to_string())));
        assert_eq!(identifier("metric:trustworthiness,"), Ok((",", "metric:trustworthiness".to_string())));
        assert!(identifier("9lives").is_err());
    }

    #[test]
    fn test_literals() {
        assert_eq!(number_literal("-0.25 "), Ok((" ", -0.25)));
        assert_eq!(string_literal(r#""cosine" x"#), Ok((" x", "cosine".to_string())));
        assert_eq!(string_literal(r#""""#), Ok(("", String::new())));
        assert_eq!(name(r#""min dist""#), Ok(("", "min dist".to_string())));
    }
}
