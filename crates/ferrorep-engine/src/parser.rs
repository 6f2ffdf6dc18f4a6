//! Copy command output parsing
//!
//! Verbose `cp` prints one line per entry it touches and one diagnostic per
//! entry it could not copy. Each line is classified as a success or an error,
//! and the item it names is pulled out by the first [`LineMatcher`] that
//! recognises the line's shape.

use std::fmt::Debug;

/// Classification of one output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// The named item was copied
    Success,
    /// The named item failed, with the tool's reason
    Error(String),
}

/// One parsed output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    /// Success or failure
    pub outcome: LineOutcome,
    /// Final path segment of the item the line names
    pub item: String,
    /// Full path token the line names, destination side for arrow lines
    pub path: String,
}

impl ParsedLine {
    /// Whether the line reports a failure
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, LineOutcome::Error(_))
    }
}

/// Extracts the path token from one shape of output line
pub trait LineMatcher: Send + Sync + Debug {
    /// Matcher name for logging
    fn name(&self) -> &'static str;

    /// Path token named by the line, if this matcher recognises it
    fn extract<'a>(&self, line: &'a str) -> Option<&'a str>;
}

const QUOTES: [char; 3] = ['\'', '"', '`'];

fn closing_quote(open: char) -> char {
    if open == '`' {
        '\''
    } else {
        open
    }
}

/// Inner text of a token if it starts with a quote
fn unquote(token: &str) -> &str {
    let mut chars = token.chars();
    match chars.next() {
        Some(open) if QUOTES.contains(&open) => {
            let rest = &token[open.len_utf8()..];
            rest.find(closing_quote(open)).map_or(rest, |end| &rest[..end])
        }
        _ => token,
    }
}

/// `source -> destination`; the destination side wins
#[derive(Debug, Default, Clone, Copy)]
pub struct ArrowMatcher;

impl LineMatcher for ArrowMatcher {
    fn name(&self) -> &'static str {
        "arrow"
    }

    fn extract<'a>(&self, line: &'a str) -> Option<&'a str> {
        let (_, destination) = line.split_once(" -> ")?;
        let token = unquote(destination.trim());
        (!token.is_empty()).then_some(token)
    }
}

/// First `'…'`, `"…"` or `` `…' `` span
#[derive(Debug, Default, Clone, Copy)]
pub struct QuotedPathMatcher;

impl LineMatcher for QuotedPathMatcher {
    fn name(&self) -> &'static str {
        "quoted"
    }

    fn extract<'a>(&self, line: &'a str) -> Option<&'a str> {
        let start = line.find(QUOTES)?;
        let open = line[start..].chars().next()?;
        let rest = &line[start + open.len_utf8()..];
        let end = rest.find(closing_quote(open))?;
        let token = &rest[..end];
        (!token.is_empty()).then_some(token)
    }
}

/// Last whitespace-separated token of the raw line
#[derive(Debug, Default, Clone, Copy)]
pub struct LastSegmentMatcher;

impl LineMatcher for LastSegmentMatcher {
    fn name(&self) -> &'static str {
        "last-segment"
    }

    fn extract<'a>(&self, line: &'a str) -> Option<&'a str> {
        let token = line
            .split_whitespace()
            .last()?
            .trim_matches(|c: char| QUOTES.contains(&c) || c == ':');
        (!token.is_empty()).then_some(token)
    }
}

const ERROR_MARKERS: [&str; 8] = [
    "permission denied",
    "no such file or directory",
    "cannot overwrite",
    "cannot stat",
    "cannot create",
    "read-only file system",
    "operation not permitted",
    "no space left on device",
];

const ERROR_PREFIXES: [&str; 4] = ["cp:", "mkdir:", "error:", "failed"];

/// Line text with quoted spans removed, so file names never look like diagnostics
fn unquoted_text(line: &str) -> String {
    let mut text = String::with_capacity(line.len());
    let mut closing = None;
    for ch in line.chars() {
        match closing {
            Some(close) if ch == close => closing = None,
            Some(_) => {}
            None if QUOTES.contains(&ch) => closing = Some(closing_quote(ch)),
            None => text.push(ch),
        }
    }
    text.to_lowercase()
}

fn is_error_line(line: &str) -> bool {
    let text = unquoted_text(line);
    let trimmed = text.trim_start();
    ERROR_PREFIXES.iter().any(|prefix| trimmed.starts_with(prefix))
        || ERROR_MARKERS.iter().any(|marker| text.contains(marker))
}

fn error_reason(line: &str) -> String {
    line.rsplit_once(": ")
        .map_or(line, |(_, reason)| reason)
        .trim()
        .to_string()
}

fn final_segment(token: &str) -> &str {
    let trimmed = token.trim_end_matches('/');
    match trimmed.rsplit('/').next() {
        Some(segment) if !segment.is_empty() => segment,
        _ => token,
    }
}

/// Classifies copy command output lines with an ordered matcher list
#[derive(Debug)]
pub struct OutputParser {
    matchers: Vec<Box<dyn LineMatcher>>,
}

impl Default for OutputParser {
    fn default() -> Self {
        Self::with_matchers(vec![
            Box::new(ArrowMatcher),
            Box::new(QuotedPathMatcher),
            Box::new(LastSegmentMatcher),
        ])
    }
}

impl OutputParser {
    /// Parser with the arrow, quoted and last-segment matchers in that order
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser with a custom matcher order
    pub fn with_matchers(matchers: Vec<Box<dyn LineMatcher>>) -> Self {
        Self { matchers }
    }

    /// Names of the configured matchers, in order
    pub fn matcher_names(&self) -> Vec<&'static str> {
        self.matchers.iter().map(|m| m.name()).collect()
    }

    /// Classify one line; blank lines yield `None`
    pub fn parse(&self, line: &str) -> Option<ParsedLine> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let outcome = if is_error_line(line) {
            LineOutcome::Error(error_reason(line))
        } else {
            LineOutcome::Success
        };

        let token = self
            .matchers
            .iter()
            .find_map(|matcher| matcher.extract(line))
            .unwrap_or(line);

        Some(ParsedLine {
            outcome,
            item: final_segment(token).to_string(),
            path: token.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("'/src/a.txt' -> '/dst/a.txt'", "a.txt")]
    #[case("\"/src/dir/b.bin\" -> \"/dst/dir/b.bin\"", "b.bin")]
    #[case("/src/c -> /dst/c", "c")]
    #[case("'/src/d' -> '/dst/d' (backup: '/dst/d~')", "d")]
    #[case("'/src/sub' -> '/dst/sub/'", "sub")]
    #[case("`/src/old' -> `/dst/old'", "old")]
    #[case("copied /dst/e.txt", "e.txt")]
    fn test_success_lines(#[case] line: &str, #[case] item: &str) {
        let parsed = OutputParser::new().parse(line).unwrap();
        assert_eq!(parsed.outcome, LineOutcome::Success);
        assert_eq!(parsed.item, item);
    }

    #[rstest]
    #[case(
        "cp: cannot open '/src/secret.db' for reading: Permission denied",
        "secret.db",
        "Permission denied"
    )]
    #[case(
        "cp: cannot stat '/src/gone': No such file or directory",
        "gone",
        "No such file or directory"
    )]
    #[case(
        "mkdir: cannot create directory '/dst/x': Read-only file system",
        "x",
        "Read-only file system"
    )]
    #[case(
        "cp: error writing '/dst/big.iso': No space left on device",
        "big.iso",
        "No space left on device"
    )]
    #[case("Error: transfer of /dst/y broke", "broke", "transfer of /dst/y broke")]
    #[case("failed to copy /dst/z", "z", "failed to copy /dst/z")]
    fn test_error_lines(#[case] line: &str, #[case] item: &str, #[case] reason: &str) {
        let parsed = OutputParser::new().parse(line).unwrap();
        assert_eq!(parsed.outcome, LineOutcome::Error(reason.to_string()));
        assert_eq!(parsed.item, item);
        assert!(parsed.is_error());
    }

    #[rstest]
    #[case("'/s/./sub/x' -> '/d/./sub/x'", "/d/./sub/x")]
    #[case("cp: cannot open '/s/./y' for reading: Permission denied", "/s/./y")]
    #[case("copied /dst/e.txt", "/dst/e.txt")]
    fn test_full_path_is_kept(#[case] line: &str, #[case] path: &str) {
        assert_eq!(OutputParser::new().parse(line).unwrap().path, path);
    }

    #[test]
    fn test_markers_are_case_insensitive() {
        let parsed = OutputParser::new()
            .parse("write '/dst/q': OPERATION NOT PERMITTED")
            .unwrap();
        assert!(parsed.is_error());
        assert_eq!(parsed.item, "q");
    }

    #[test]
    fn test_file_names_never_look_like_errors() {
        let parsed = OutputParser::new()
            .parse("'/src/failed permission denied.log' -> '/dst/failed permission denied.log'")
            .unwrap();
        assert_eq!(parsed.outcome, LineOutcome::Success);
        assert_eq!(parsed.item, "failed permission denied.log");
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\t\r")]
    fn test_blank_lines(#[case] line: &str) {
        assert!(OutputParser::new().parse(line).is_none());
    }

    #[test]
    fn test_custom_matcher_order() {
        let parser = OutputParser::with_matchers(vec![Box::new(LastSegmentMatcher)]);
        assert_eq!(parser.matcher_names(), vec!["last-segment"]);
        let parsed = parser.parse("'/src/a' -> '/dst/b'").unwrap();
        assert_eq!(parsed.item, "b");
    }

    #[test]
    fn test_default_matcher_order() {
        assert_eq!(
            OutputParser::new().matcher_names(),
            vec!["arrow", "quoted", "last-segment"]
        );
    }
}
