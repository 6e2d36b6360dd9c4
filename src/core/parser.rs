// src/core/parser.rs

//! Breaks one command line into a [`CommandLine`].
//!
//! Accepted form, left to right: a program token, argument tokens, redirect
//! clauses (`> file` or `< file`) and an optional trailing `&`, separated by
//! blanks (space, tab, CR, LF). A token is any run of characters other than
//! those blanks, `&`, `<` and `>`.

use crate::models::{CommandLine, ParsedCommand, Redirect, RedirectDirection};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Whitespace is space, tab, CR and LF only; any other character, NBSP and
    // VT included, belongs to a token.
    static ref BLANK_RE: Regex = Regex::new(r"^[ \t\r\n]*$").unwrap();
    static ref EXIT_RE: Regex = Regex::new(r"^[ \t\r\n]*exit[ \t\r\n]*$").unwrap();
    // 1: program, 2: raw argument text, 3: raw redirect text, 4: background marker.
    static ref LINE_RE: Regex = Regex::new(concat!(
        r"^[ \t\r\n]*([^&<> \t\r\n]+)",
        r"((?:[ \t\r\n]+[^&<> \t\r\n]+)*)",
        r"((?:[ \t\r\n]+[<>][ \t\r\n]*[^&<> \t\r\n]+)*)",
        r"[ \t\r\n]*(?:[ \t\r\n](&))?[ \t\r\n]*$",
    ))
    .unwrap();
    static ref TOKEN_RE: Regex = Regex::new(r"[^&<> \t\r\n]+").unwrap();
    static ref REDIRECT_RE: Regex = Regex::new(r"([<>])[ \t\r\n]*([^&<> \t\r\n]+)").unwrap();
}

/// Classifies and parses one line taken from the command slot.
///
/// Whole-line forms are checked first: whitespace only is [`CommandLine::Blank`]
/// and a lone `exit` is [`CommandLine::Exit`]. Anything else must match the
/// command grammar or it is [`CommandLine::Invalid`].
pub fn parse_line(line: &str) -> CommandLine {
    if BLANK_RE.is_match(line) {
        return CommandLine::Blank;
    }
    if EXIT_RE.is_match(line) {
        return CommandLine::Exit;
    }

    let Some(captures) = LINE_RE.captures(line) else {
        log::debug!("Rejected command line: {:?}", line);
        return CommandLine::Invalid;
    };

    let program = captures.get(1).map_or("", |m| m.as_str()).to_string();
    let raw_arguments = captures.get(2).map_or("", |m| m.as_str());
    let raw_redirects = captures.get(3).map_or("", |m| m.as_str());

    let arguments = TOKEN_RE
        .find_iter(raw_arguments)
        .map(|m| m.as_str().to_string())
        .collect();

    let redirects = REDIRECT_RE
        .captures_iter(raw_redirects)
        .map(|c| Redirect {
            direction: if c.get(1).is_some_and(|m| m.as_str() == "<") {
                RedirectDirection::Input
            } else {
                RedirectDirection::Output
            },
            target: c.get(2).map_or("", |m| m.as_str()).to_string(),
        })
        .collect();

    CommandLine::Command(ParsedCommand {
        command_line: format!("{}{}", program, raw_arguments),
        program,
        arguments,
        redirects,
        background: captures.get(4).is_some(),
    })
}
