// Script parser: commands chained with `|`

use super::ast::Script;
use super::command::parse_command;
use super::lexer::ws;
use crate::error::{EngineError, Result};
use nom::{
    bytes::complete::tag,
    combinator::{eof, opt},
    multi::separated_list0,
    IResult,
};

/// Parse a complete script
/// Format: command | command | ...
pub fn parse_commands(input: &str) -> IResult<&str, Script> {
    // A leading "|" is tolerated
    let (input, _) = opt(ws(tag("|")))(input)?;

    let (input, commands) = separated_list0(ws(tag("|")), parse_command)(input)?;

    let (input, _) = ws(eof)(input)?;

    Ok((input, Script { commands }))
}

/// Parse a script, mapping nom failures to an engine error
pub fn parse_script(input: &str) -> Result<Script> {
    match parse_commands(input) {
        Ok((_, script)) => Ok(script),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let at: String = e.input.trim_start().chars().take(24).collect();
            Err(EngineError::Parse(format!("unexpected input near '{}'", at)))
        }
        Err(nom::Err::Incomplete(_)) => Err(EngineError::Parse("incomplete script".to_string())),
    }
}
