//! Include resolution: finds `#include` directives in shader source text and
//! maps each one to the canonical path of the file it names.

use crate::canon::canon_file;
use crate::fs::{FileSystem, MTime};
use crate::scanner::{ParseError, ParseResult, Scanner};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    /// `#include "target"`, relative to the including file.
    Quoted,
    /// `#include <target>`, looked up on the include search path.
    System,
}

/// One well-formed directive.
#[derive(Debug, Clone, PartialEq)]
pub struct Include<'a> {
    pub target: &'a str,
    pub kind: IncludeKind,
    pub line: usize,
}

/// A directive that could not be parsed; it is skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Malformed {
    pub line: usize,
    pub error: ParseError,
}

#[derive(Debug, Default)]
pub struct Includes<'a> {
    pub includes: Vec<Include<'a>>,
    pub malformed: Vec<Malformed>,
}

fn read_target<'a>(scanner: &mut Scanner<'a>, close: char) -> ParseResult<&'a str> {
    let start = scanner.ofs;
    loop {
        if scanner.at_end() || scanner.peek_newline() {
            return scanner.parse_error(format!("unterminated include, expected {:?}", close));
        }
        if scanner.peek() == close {
            break;
        }
        scanner.next();
    }
    let target = scanner.slice(start, scanner.ofs).trim();
    scanner.next();
    if target.is_empty() {
        return scanner.parse_error("empty include target");
    }
    Ok(target)
}

/// Parse a directive at the current position, if there is one.
fn read_directive<'a>(scanner: &mut Scanner<'a>) -> ParseResult<Option<Include<'a>>> {
    scanner.skip_spaces();
    if !scanner.skip('#') {
        return Ok(None);
    }
    scanner.skip_spaces();
    if !scanner.skip_str("include") {
        return Ok(None);
    }
    let c = scanner.peek();
    if c.is_ascii_alphanumeric() || c == '_' {
        // Some other directive that happens to start with "include".
        return Ok(None);
    }
    let line = scanner.line;
    scanner.skip_spaces();
    let (kind, close) = match scanner.peek() {
        '"' => (IncludeKind::Quoted, '"'),
        '<' => (IncludeKind::System, '>'),
        c => {
            return scanner.parse_error(format!(
                "expected '\"' or '<' after #include, got {:?}",
                c
            ))
        }
    };
    scanner.next();
    let target = read_target(scanner, close)?;
    Ok(Some(Include { target, kind, line }))
}

/// Consume input up to and including the `*/` that closes a block comment.
/// Stops after the end of the line if the comment continues past it.
/// Returns whether the comment was closed.
fn close_comment(scanner: &mut Scanner) -> bool {
    while !scanner.at_end() {
        if scanner.skip_str("*/") {
            return true;
        }
        if scanner.read() == '\n' {
            return false;
        }
    }
    false
}

/// Consume the rest of the current line, including its newline.
/// Returns whether the line ends inside an unclosed block comment.
fn skip_rest_of_line(scanner: &mut Scanner) -> bool {
    while !scanner.at_end() {
        if scanner.skip_str("/*") {
            if !close_comment(scanner) {
                return true;
            }
            continue;
        }
        if scanner.skip_str("//") {
            scanner.skip_line();
            return false;
        }
        if scanner.read() == '\n' {
            return false;
        }
    }
    false
}

/// Collect every include directive in `text`, in order of appearance.
/// Directives inside block comments don't count, wherever the comment opens.
/// Malformed directives are recorded and scanning resumes on the next line.
pub fn parse(text: &str) -> Includes {
    let mut scanner = Scanner::new(text);
    let mut result = Includes::default();
    let mut in_comment = false;
    while !scanner.at_end() {
        if in_comment {
            in_comment = !close_comment(&mut scanner);
            if in_comment {
                continue;
            }
        }
        scanner.skip_spaces();
        if scanner.skip_str("/*") {
            in_comment = true;
            continue;
        }
        let line = scanner.line;
        match read_directive(&mut scanner) {
            Ok(Some(include)) => result.includes.push(include),
            Ok(None) => {}
            Err(error) => result.malformed.push(Malformed { line, error }),
        }
        in_comment = skip_rest_of_line(&mut scanner);
    }
    result
}

fn exists(fs: &dyn FileSystem, path: &Path) -> bool {
    matches!(fs.stat(path), Ok(MTime::Stamp(_)))
}

/// Resolve a directive to a canonical path.
///
/// Quoted targets are looked up next to the including file first, then on
/// the search path; if found nowhere, the path next to the including file is
/// returned anyway so that the missing header shows up in the graph.
/// System targets are looked up on the search path first, then next to the
/// including file; if found nowhere they are assumed to be provided by the
/// toolchain and None is returned.
pub fn resolve(
    fs: &dyn FileSystem,
    include: &Include,
    including_dir: &Path,
    search_path: &[PathBuf],
) -> Option<PathBuf> {
    let local = including_dir.join(include.target);
    let searched = search_path.iter().map(|dir| dir.join(include.target));
    match include.kind {
        IncludeKind::Quoted => {
            let found = std::iter::once(local.clone())
                .chain(searched)
                .find(|p| exists(fs, p));
            Some(canon_file(fs, &found.unwrap_or(local)))
        }
        IncludeKind::System => searched
            .chain(std::iter::once(local))
            .find(|p| exists(fs, p))
            .map(|p| canon_file(fs, &p)),
    }
}
