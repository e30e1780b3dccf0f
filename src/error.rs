//! Diagnostics with source location tracking.
//!
//! Every recoverable error in the pipeline carries `(file, offset, line,
//! message)` and lands in an [`ErrorSink`]. Stages keep going after raising
//! so that one pass reports as much as possible; the driver fails the whole
//! compilation afterwards if the sink holds an error.

use std::fmt;
use std::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// ANSI painting for the pieces of a rendered diagnostic: the severity
/// label, the `-->` location arrow, the line-number gutter and the caret
/// row. Every painted fragment resets at its end.
mod paint {
    use super::Severity;

    const RESET: &str = "\x1b[0m";
    const BOLD_RED: &str = "\x1b[1m\x1b[31m";
    const BOLD_YELLOW: &str = "\x1b[1m\x1b[33m";
    const RED: &str = "\x1b[31m";
    const BLUE: &str = "\x1b[34m";
    const CYAN: &str = "\x1b[36m";

    pub fn severity_label(severity: Severity) -> String {
        match severity {
            Severity::Error => format!("{}error{}", BOLD_RED, RESET),
            Severity::Warning => format!("{}warning{}", BOLD_YELLOW, RESET),
        }
    }

    pub fn location_arrow() -> String {
        format!("{}  -->{}", CYAN, RESET)
    }

    /// The gutter column: a line number for the source row, blank for the
    /// caret row beneath it.
    pub fn gutter(line: Option<u32>) -> String {
        match line {
            Some(line) => format!("{}{:4} |{}", BLUE, line, RESET),
            None => format!("{}     |{}", BLUE, RESET),
        }
    }

    pub fn caret(column: usize) -> String {
        format!("{}{}^{}", " ".repeat(column), RED, RESET)
    }
}

/// Prints a driver-level failure that has no source location (unreadable
/// input file, unwritable output path).
pub fn report_fatal(message: &str) {
    eprintln!("{}: {}", paint::severity_label(Severity::Error), message);
}

/// A single diagnostic, pointing at a byte offset within a source file.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: String,
    pub pos: usize,
    pub line: u32,
}

impl Diagnostic {
    /// Renders the diagnostic against the given source text: a colorized
    /// header, the offending line, and a caret under the offset.
    pub fn render(&self, source: &str) -> String {
        let (line_start, line_content) = find_line(source, self.pos);
        let col = self.pos.saturating_sub(line_start);

        format!(
            "{}: {}\n{} {}:{}\n{} {}\n{} {}",
            paint::severity_label(self.severity),
            self.message,
            paint::location_arrow(),
            self.file,
            self.line,
            paint::gutter(Some(self.line)),
            line_content,
            paint::gutter(None),
            paint::caret(col)
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.message)
    }
}

fn find_line(source: &str, pos: usize) -> (usize, &str) {
    let pos = pos.min(source.len());
    let line_start = source[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = source[line_start..]
        .find('\n')
        .map(|off| line_start + off)
        .unwrap_or(source.len());

    (line_start, &source[line_start..line_end])
}

/// Accumulates diagnostics across the whole compilation.
#[derive(Debug, Default)]
pub struct ErrorSink {
    diags: Vec<Diagnostic>,
    warn_is_err: bool,
}

impl ErrorSink {
    pub fn new(warn_is_err: bool) -> Self {
        Self {
            diags: Vec::new(),
            warn_is_err,
        }
    }

    pub fn raise_error(&mut self, message: impl Into<String>, file: &str, pos: usize, line: u32) {
        self.diags.push(Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            file: file.to_string(),
            pos,
            line,
        });
    }

    pub fn raise_warning(&mut self, message: impl Into<String>, file: &str, pos: usize, line: u32) {
        let severity = if self.warn_is_err {
            Severity::Error
        } else {
            Severity::Warning
        };

        self.diags.push(Diagnostic {
            severity,
            message: message.into(),
            file: file.to_string(),
            pos,
            line,
        });
    }

    pub fn extend(&mut self, other: ErrorSink) {
        self.diags.extend(other.diags);
    }

    pub fn warn_is_err(&self) -> bool {
        self.warn_is_err
    }

    pub fn failed(&self) -> bool {
        self.diags.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.diags.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.diags
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diags
    }

    /// Prints every diagnostic in source order, reading each file once for
    /// caret rendering. Files that cannot be re-read fall back to the plain
    /// one-line form.
    pub fn emit(&mut self) {
        self.diags
            .sort_by(|a, b| a.file.cmp(&b.file).then(a.pos.cmp(&b.pos)));

        let mut curr_file: Option<(String, Option<String>)> = None;
        for diag in &self.diags {
            let cached = match &curr_file {
                Some((name, contents)) if *name == diag.file => contents,
                _ => {
                    curr_file = Some((diag.file.clone(), fs::read_to_string(&diag.file).ok()));
                    &curr_file.as_ref().unwrap().1
                }
            };

            match cached {
                Some(source) => eprintln!("{}\n", diag.render(source)),
                None => eprintln!("{}", diag),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_starts_empty() {
        let sink = ErrorSink::new(false);
        assert!(sink.is_empty());
        assert!(!sink.failed());
    }

    #[test]
    fn error_marks_failure() {
        let mut sink = ErrorSink::new(false);
        sink.raise_error("bad token", "main.tak", 3, 1);
        assert!(sink.failed());
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn warning_does_not_fail_by_default() {
        let mut sink = ErrorSink::new(false);
        sink.raise_warning("suspicious", "main.tak", 0, 1);
        assert!(!sink.failed());
    }

    #[test]
    fn warn_is_error_promotes() {
        let mut sink = ErrorSink::new(true);
        sink.raise_warning("suspicious", "main.tak", 0, 1);
        assert!(sink.failed());
    }

    #[test]
    fn render_points_at_offset() {
        let source = "x : i32 = 5;\ny : bad = 1;\n";
        let diag = Diagnostic {
            severity: Severity::Error,
            message: "Invalid type specifier.".to_string(),
            file: "main.tak".to_string(),
            pos: source.find("bad").unwrap(),
            line: 2,
        };

        let rendered = diag.render(source);
        assert!(rendered.contains("Invalid type specifier."));
        assert!(rendered.contains("y : bad = 1;"));
        assert!(rendered.contains('^'));
    }

    #[test]
    fn error_label_is_bold_red() {
        let label = paint::severity_label(Severity::Error);
        assert!(label.contains("\x1b[1m"));
        assert!(label.contains("\x1b[31m"));
        assert!(label.contains("error"));
        assert!(label.ends_with("\x1b[0m"));
    }

    #[test]
    fn warning_label_is_bold_yellow() {
        let label = paint::severity_label(Severity::Warning);
        assert!(label.contains("\x1b[33m"));
        assert!(label.contains("warning"));
    }

    #[test]
    fn caret_lands_in_its_column() {
        let caret = paint::caret(4);
        assert!(caret.starts_with("    \x1b[31m"));
        assert!(caret.contains('^'));
    }

    #[test]
    fn find_line_on_first_line() {
        let (start, content) = find_line("abc\ndef", 1);
        assert_eq!(start, 0);
        assert_eq!(content, "abc");
    }
}
