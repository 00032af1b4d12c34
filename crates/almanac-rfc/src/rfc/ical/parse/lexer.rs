//! Content line lexer for iCalendar (RFC 5545 §3.1).
//!
//! Handles line unfolding and tokenization of content lines.

use std::iter::Peekable;
use std::str::CharIndices;

use super::error::{ParseError, ParseErrorKind, ParseResult};
use crate::rfc::ical::core::{ContentLine, Parameter};

/// Splits input into logical content lines, merging folded continuations.
///
/// Accepts CRLF and bare LF. A line starting with SP/HTAB continues the
/// previous line with that single whitespace character removed. Lines with
/// no colon at all are also treated as continuations, which tolerates
/// writers that fold without the leading whitespace.
///
/// Returns `(first physical line number, unfolded text)` pairs.
#[must_use]
pub fn split_lines(input: &str) -> Vec<(usize, String)> {
    let mut lines: Vec<(usize, String)> = Vec::new();

    for (idx, raw) in input.split('\n').enumerate() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.is_empty() {
            continue;
        }

        let continuation = line
            .strip_prefix([' ', '\t'])
            .or_else(|| (!line.contains(':')).then_some(line));

        match (continuation, lines.last_mut()) {
            (Some(rest), Some((_, prev))) => prev.push_str(rest),
            (Some(rest), None) => lines.push((idx + 1, rest.to_string())),
            (None, _) => lines.push((idx + 1, line.to_string())),
        }
    }

    lines
}

/// Scanner over one unfolded content line.
struct LineScanner<'a> {
    line: &'a str,
    line_num: usize,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> LineScanner<'a> {
    fn new(line: &'a str, line_num: usize) -> Self {
        Self {
            line,
            line_num,
            chars: line.char_indices().peekable(),
        }
    }

    fn error_at(&self, kind: ParseErrorKind, byte: usize) -> ParseError {
        ParseError::new(kind, self.line_num, byte + 1)
    }

    fn position(&mut self) -> usize {
        self.chars.peek().map_or(self.line.len(), |&(i, _)| i)
    }

    /// Reads `[A-Za-z0-9-]+` and returns it upper-cased.
    fn name(&mut self, kind: ParseErrorKind) -> ParseResult<String> {
        let start = self.position();
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '-' {
                self.chars.next();
            } else if matches!(c, ';' | ':' | '=') {
                break;
            } else {
                return Err(self.error_at(kind, i));
            }
        }
        let end = self.position();
        if end == start {
            return Err(self.error_at(kind, start));
        }
        Ok(self.line[start..end].to_ascii_uppercase())
    }

    /// Reads one parameter value, quoted or not, decoding RFC 6868 carets.
    fn param_value(&mut self) -> ParseResult<String> {
        let start = self.position();
        if self.chars.peek().is_some_and(|&(_, c)| c == '"') {
            self.chars.next();
            let mut value = String::new();
            loop {
                match self.chars.next() {
                    Some((_, '"')) => return Ok(decode_carets(&value)),
                    Some((_, c)) => value.push(c),
                    None => return Err(self.error_at(ParseErrorKind::UnclosedQuote, start)),
                }
            }
        }

        while self
            .chars
            .peek()
            .is_some_and(|&(_, c)| !matches!(c, ',' | ';' | ':'))
        {
            self.chars.next();
        }
        let end = self.position();
        Ok(decode_carets(&self.line[start..end]))
    }

    /// Reads `name=value[,value...]`; the leading `;` is already consumed.
    fn parameter(&mut self) -> ParseResult<Parameter> {
        let name = self.name(ParseErrorKind::InvalidParameter)?;
        match self.chars.next() {
            Some((_, '=')) => {}
            Some((i, _)) => return Err(self.error_at(ParseErrorKind::InvalidParameter, i)),
            None => return Err(self.error_at(ParseErrorKind::MissingColon, self.line.len())),
        }

        let mut values = vec![self.param_value()?];
        while self.chars.peek().is_some_and(|&(_, c)| c == ',') {
            self.chars.next();
            values.push(self.param_value()?);
        }
        Ok(Parameter::with_values(name, values))
    }
}

fn decode_carets(s: &str) -> String {
    if !s.contains('^') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '^' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('^') => out.push('^'),
            Some('n' | 'N') => out.push('\n'),
            Some('\'') => out.push('"'),
            // Not an escape: keep the caret literally.
            _ => {
                out.push('^');
                continue;
            }
        }
        chars.next();
    }
    out
}

/// Parses a single content line.
///
/// Format: `name *(";" param) ":" value`
///
/// ## Errors
/// Returns an error if the line is malformed or contains invalid characters.
pub fn parse_content_line(line: &str, line_num: usize) -> ParseResult<ContentLine> {
    let mut scanner = LineScanner::new(line, line_num);
    let name = scanner
        .name(ParseErrorKind::InvalidPropertyName)
        .map_err(|e| {
            if e.column == 1 {
                ParseError::new(ParseErrorKind::MissingPropertyName, line_num, 1)
            } else {
                e
            }
        })?;

    let mut params = Vec::new();
    loop {
        match scanner.chars.next() {
            Some((_, ';')) => params.push(scanner.parameter()?),
            Some((i, ':')) => {
                return Ok(ContentLine {
                    name,
                    params,
                    raw_value: line[i + 1..].to_string(),
                });
            }
            Some((i, _)) => {
                return Err(scanner.error_at(ParseErrorKind::InvalidParameter, i));
            }
            None => {
                return Err(ParseError::new(
                    ParseErrorKind::MissingColon,
                    line_num,
                    line.len(),
                )
                .with_context(name));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_lines_unfolds_continuations() {
        let input = "BEGIN:VEVENT\r\nDESCRIPTION:This is a long\r\n  description\r\n\tthat continues\r\nEND:VEVENT\r\n";
        let lines = split_lines(input);
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            (2, "DESCRIPTION:This is a long descriptionthat continues".to_string())
        );
        assert_eq!(lines[2].0, 5);
    }

    #[test]
    fn split_lines_accepts_bare_lf_and_colonless_lines() {
        let lines = split_lines("SUMMARY:First\nsecond half\nUID:x\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].1, "SUMMARY:Firstsecond half");
    }

    #[test]
    fn parse_simple_line() {
        let result = parse_content_line("SUMMARY:Team Meeting", 1).expect("valid line");
        assert_eq!(result.name, "SUMMARY");
        assert!(result.params.is_empty());
        assert_eq!(result.raw_value, "Team Meeting");
    }

    #[test]
    fn parse_line_with_params() {
        let result =
            parse_content_line("dtstart;tzid=Europe/Berlin:20120207T181500", 1).expect("valid");
        assert_eq!(result.name, "DTSTART");
        assert_eq!(result.tzid(), Some("Europe/Berlin"));
        assert_eq!(result.raw_value, "20120207T181500");
    }

    #[test]
    fn parse_line_with_quoted_and_multi_values() {
        let result = parse_content_line(
            "ATTENDEE;CN=\"Doe, Jane\";ROLE=REQ-PARTICIPANT,OPT-PARTICIPANT:mailto:jane@example.com",
            1,
        )
        .expect("valid line");
        assert_eq!(result.params[0].value(), Some("Doe, Jane"));
        assert_eq!(result.params[1].values.len(), 2);
        assert_eq!(result.raw_value, "mailto:jane@example.com");
    }

    #[test]
    fn parse_line_with_caret_encoding() {
        let result =
            parse_content_line("ATTENDEE;CN=\"Test^nName^'s\":mailto:t@x", 1).expect("valid");
        assert_eq!(result.params[0].value(), Some("Test\nName\"s"));
    }

    #[test]
    fn parse_line_errors() {
        let err = parse_content_line("ATTENDEE;CN=\"Unclosed:mailto:t@x", 4)
            .expect_err("unclosed quote");
        assert_eq!(err.kind, ParseErrorKind::UnclosedQuote);
        assert_eq!(err.line, 4);

        let err = parse_content_line(":value", 1).expect_err("no name");
        assert_eq!(err.kind, ParseErrorKind::MissingPropertyName);

        let err = parse_content_line("SUM MARY:x", 1).expect_err("space in name");
        assert_eq!(err.kind, ParseErrorKind::InvalidPropertyName);
    }
}
