// Command parsers for interaction scripts

use super::ast::{Command, Literal};
use super::lexer::{identifier, name, number_literal, string_literal, ws};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::map,
    multi::separated_list1,
    sequence::preceded,
    IResult,
};

/// Parse a range command
/// Format: range(dimension, lo, hi)
pub fn parse_range(input: &str) -> IResult<&str, Command> {
    let (input, _) = ws(tag("range"))(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, dimension) = ws(name)(input)?;
    let (input, _) = ws(char(','))(input)?;
    let (input, lo) = ws(number_literal)(input)?;
    let (input, _) = ws(char(','))(input)?;
    let (input, hi) = ws(number_literal)(input)?;
    let (input, _) = ws(char(')'))(input)?;

    Ok((input, Command::Range { dimension, lo, hi }))
}

fn literal(input: &str) -> IResult<&str, Literal> {
    alt((
        map(string_literal, Literal::Text),
        map(number_literal, Literal::Number),
    ))(input)
}

/// Parse a select command
/// Format: select(dimension, v1, v2, ...) with numbers or quoted strings
pub fn parse_select(input: &str) -> IResult<&str, Command> {
    let (input, _) = ws(tag("select"))(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, dimension) = ws(name)(input)?;
    let (input, values) = preceded(ws(char(',')), separated_list1(ws(char(',')), ws(literal)))(input)?;
    let (input, _) = ws(char(')'))(input)?;

    Ok((input, Command::Select { dimension, values }))
}

/// Parse a clear command
/// Format: clear(dimension)
pub fn parse_clear(input: &str) -> IResult<&str, Command> {
    let (input, _) = ws(tag("clear"))(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, dimension) = ws(name)(input)?;
    let (input, _) = ws(char(')'))(input)?;

    Ok((input, Command::Clear { dimension }))
}

/// Parse a sort command
/// Format: sort(group, natural|asc|desc)
pub fn parse_sort(input: &str) -> IResult<&str, Command> {
    let (input, _) = ws(tag("sort"))(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, group) = ws(name)(input)?;
    let (input, _) = ws(char(','))(input)?;
    let (input, criterion) = ws(identifier)(input)?;
    let (input, _) = ws(char(')'))(input)?;

    Ok((input, Command::Sort { group, criterion }))
}

/// Parse a series command
/// Format: series(variant)
pub fn parse_series(input: &str) -> IResult<&str, Command> {
    let (input, _) = ws(tag("series"))(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, variant) = ws(name)(input)?;
    let (input, _) = ws(char(')'))(input)?;

    Ok((input, Command::Series { variant }))
}

/// Parse any command
pub fn parse_command(input: &str) -> IResult<&str, Command> {
    alt((parse_range, parse_select, parse_clear, parse_sort, parse_series))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        let (_, cmd) = parse_range("range(trustworthiness, 0.5, 0.9)").unwrap();
        assert_eq!(
            cmd,
            Command::Range { dimension: "trustworthiness".to_string(), lo: 0.5, hi: 0.9 }
        );
    }

    #[test]
    fn test_parse_select_mixed_literals() {
        let (_, cmd) = parse_select(r#"select(metric, "cosine", "euclidean")"#).unwrap();
        match cmd {
            Command::Select { dimension, values } => {
                assert_eq!(dimension, "metric");
                assert_eq!(values, vec![Literal::Text("cosine".into()), Literal::Text("euclidean".into())]);
            }
            _ => panic!("Expected Select command"),
        }

        let (_, cmd) = parse_select("select(n_neighbors, 5, 15)").unwrap();
        assert_eq!(
            cmd,
            Command::Select {
                dimension: "n_neighbors".into(),
                values: vec![Literal::Number(5.0), Literal::Number(15.0)],
            }
        );
    }

    #[test]
    fn test_parse_select_needs_a_value() {
        assert!(parse_select("select(metric)").is_err());
    }

    #[test]
    fn test_parse_sort_keeps_criterion_text() {
        let (_, cmd) = parse_sort("sort(x_hist, sideways)").unwrap();
        assert_eq!(cmd, Command::Sort { group: "x_hist".into(), criterion: "sideways".into() });
    }

    #[test]
    fn test_parse_command_dispatch() {
        assert!(matches!(parse_command("clear(x)"), Ok((_, Command::Clear { .. }))));
        assert!(matches!(parse_command("series(n_neighbors)"), Ok((_, Command::Series { .. }))));
        assert!(parse_command("zoom(x)").is_err());
    }
}
