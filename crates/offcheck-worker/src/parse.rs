//! Checker output parser.
//!
//! Normalizes raw `tsc` output into structured [`Diagnostic`] entries. Both
//! the plain `file(line,col): error TSxxxx: msg` form and the pretty
//! `file:line:col - error TSxxxx: msg` form are recognized; ANSI colour codes
//! are stripped first. Indented lines following a diagnostic continue its
//! message.

use std::sync::OnceLock;

use offcheck_core::{Diagnostic, Severity};
use regex::Regex;

use crate::runner::CheckerOutput;

/// Configuration for the output parser.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserConfig {
    /// Maximum number of diagnostics to retain per run.
    pub max_diagnostics: usize,

    /// Minimum severity to include.
    pub min_severity: Severity,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_diagnostics: 500,
            min_severity: Severity::Hint,
        }
    }
}

fn plain_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<file>.+?)\((?P<line>\d+),(?P<col>\d+)\): (?P<sev>error|warning|message) (?P<code>TS\d+): (?P<msg>.*)$",
        )
        .unwrap_or_else(|e| panic!("invalid plain diagnostic pattern: {e}"))
    })
}

fn pretty_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<file>.+?):(?P<line>\d+):(?P<col>\d+) - (?P<sev>error|warning|message) (?P<code>TS\d+): (?P<msg>.*)$",
        )
        .unwrap_or_else(|e| panic!("invalid pretty diagnostic pattern: {e}"))
    })
}

fn global_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<sev>error|warning|message) (?P<code>TS\d+): (?P<msg>.*)$")
            .unwrap_or_else(|e| panic!("invalid global diagnostic pattern: {e}"))
    })
}

fn ansi_escape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\x1b\[[0-9;]*m").unwrap_or_else(|e| panic!("invalid ansi pattern: {e}"))
    })
}

fn severity(raw: &str) -> Severity {
    match raw {
        "error" => Severity::Error,
        "warning" => Severity::Warning,
        _ => Severity::Hint,
    }
}

/// Parse one line into a diagnostic, if it is a diagnostic header.
pub fn parse_line(line: &str) -> Option<Diagnostic> {
    let located = plain_line()
        .captures(line)
        .or_else(|| pretty_line().captures(line));

    if let Some(caps) = located {
        let line_no = caps["line"].parse().ok()?;
        let col = caps["col"].parse().ok()?;
        return Some(
            Diagnostic::new(severity(&caps["sev"]), caps["msg"].trim_end())
                .with_code(&caps["code"])
                .with_location(caps["file"].trim(), line_no, col),
        );
    }

    global_line().captures(line).map(|caps| {
        Diagnostic::new(severity(&caps["sev"]), caps["msg"].trim_end()).with_code(&caps["code"])
    })
}

/// Parse a finished checker run into diagnostics.
///
/// A failed run that produced no recognizable diagnostic still yields one
/// error built from the last line of its output.
pub fn parse_checker_output(output: &CheckerOutput, config: &ParserConfig) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    // Continuation lines only attach to a diagnostic that was kept.
    let mut continuing = false;

    let text = format!("{}\n{}", output.stdout, output.stderr);
    let clean = ansi_escape().replace_all(&text, "");

    for line in clean.lines() {
        if let Some(diag) = parse_line(line) {
            continuing = diag.severity >= config.min_severity;
            if continuing {
                diagnostics.push(diag);
            }
            continue;
        }
        let is_continuation = line.starts_with(char::is_whitespace) && !line.trim().is_empty();
        match diagnostics.last_mut() {
            Some(last) if continuing && is_continuation => {
                last.message.push('\n');
                last.message.push_str(line.trim());
            }
            _ => continuing = false,
        }
    }

    if diagnostics.is_empty() && !output.passed() {
        let message = match output.last_line() {
            Some(line) => format!("type checker failed: {line}"),
            None => format!("type checker exited with code {}", output.exit_code),
        };
        diagnostics.push(Diagnostic::error(message));
    }

    diagnostics.truncate(config.max_diagnostics);
    diagnostics
}
