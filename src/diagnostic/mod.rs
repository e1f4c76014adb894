//! Human-readable error reports for the command-line driver.
//!
//! Every error type in the crate converts into a [`Diagnostic`], which
//! renders as a rustc-style report: a headline, an optional source
//! snippet with a caret underline, and trailing notes.

use crate::ast::Span;
use crate::assembler::AssemblyError;
use crate::fault::Fault;
use crate::lexer::LexError;
use crate::parser::ParseError;

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub code: Option<&'static str>,
    pub span: Option<Span>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            code: None,
            span: None,
            notes: Vec::new(),
            suggestion: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

// ---- From impls for the crate's error types ----

impl From<&LexError> for Diagnostic {
    fn from(e: &LexError) -> Self {
        Diagnostic::error(e.kind.to_string())
            .with_span(e.span)
            .with_note(format!("near '{}'", e.snippet))
    }
}

impl From<&ParseError> for Diagnostic {
    fn from(e: &ParseError) -> Self {
        Diagnostic::error(&e.message).with_code(e.code).with_span(e.span)
    }
}

impl From<&AssemblyError> for Diagnostic {
    fn from(e: &AssemblyError) -> Self {
        Diagnostic::error(e.kind.to_string())
            .with_code(e.kind.code())
            .with_span(e.span)
            .with_note(format!("in definition '{}'", e.vector))
    }
}

impl From<&Fault> for Diagnostic {
    fn from(e: &Fault) -> Self {
        Diagnostic::error(e.kind.to_string())
            .with_note(format!("in vector '{}' at instruction {}", e.vector, e.pc))
    }
}

impl From<&crate::CompileError> for Diagnostic {
    fn from(e: &crate::CompileError) -> Self {
        match e {
            crate::CompileError::Lex(inner) => inner.into(),
            crate::CompileError::Parse(inner) => inner.into(),
            crate::CompileError::Assembly(inner) => inner.into(),
        }
    }
}

// ---- Rendering ----

pub struct Renderer {
    pub use_color: bool,
}

impl Renderer {
    fn bold(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold_red(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1;31m{s}\x1b[0m") } else { s.to_string() }
    }

    fn cyan(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[36m{s}\x1b[0m") } else { s.to_string() }
    }

    fn dim(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[2m{s}\x1b[0m") } else { s.to_string() }
    }

    /// Renders a diagnostic against the source it was produced from.
    /// The snippet section is skipped when the diagnostic has no span.
    pub fn render(&self, d: &Diagnostic, source: &str) -> String {
        let mut out = String::new();

        let headline = match d.code {
            Some(code) => format!("error[{code}]"),
            None => "error".to_string(),
        };
        out.push_str(&format!("{}: {}\n", self.bold_red(&headline), self.bold(&d.message)));

        if let Some(span) = d.span {
            let (line, col, line_text) = locate(source, span.start);

            out.push_str(&format!("  {} {line}:{col}\n", self.cyan("-->")));

            let gutter = line.to_string().len();
            let pipe = self.cyan("|");
            let pad = " ".repeat(gutter);

            out.push_str(&format!("{pad} {pipe}\n"));
            let line_num = self.cyan(&format!("{line:>gutter$}"));
            out.push_str(&format!("{line_num} {pipe} {line_text}\n"));

            // Clip the underline to the rest of the line so multi-line
            // spans do not overflow the snippet.
            let start_in_line = col - 1;
            let span_len = span.end.saturating_sub(span.start);
            let width = span_len.min(line_text.len().saturating_sub(start_in_line)).max(1);
            let carets = self.bold_red(&"^".repeat(width));
            out.push_str(&format!("{pad} {pipe} {}{carets}\n", " ".repeat(start_in_line)));
            out.push_str(&format!("{pad} {pipe}\n"));
        }

        for note in &d.notes {
            out.push_str(&format!("  {} note: {}\n", self.dim("="), note));
        }
        if let Some(suggestion) = &d.suggestion {
            out.push_str(&format!("  {} suggestion: {}\n", self.dim("="), suggestion));
        }

        out
    }
}

/// Returns the 1-based line and column of a byte offset, plus the text
/// of that line without its terminator.
fn locate(source: &str, offset: usize) -> (usize, usize, &str) {
    let offset = offset.min(source.len());
    let start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
    let line = source[..start].bytes().filter(|b| *b == b'\n').count() + 1;
    let end = source[start..].find('\n').map_or(source.len(), |i| start + i);
    let text = source[start..end].trim_end_matches('\r');
    (line, offset - start + 1, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultKind;
    use std::rc::Rc;

    fn plain() -> Renderer {
        Renderer { use_color: false }
    }

    #[test]
    fn builder_accumulates_parts() {
        let d = Diagnostic::error("something went wrong")
            .with_code("QVR-A001")
            .with_span(Span { start: 5, end: 8 })
            .with_note("in definition 'main'")
            .with_suggestion("rename it");
        assert_eq!(d.message, "something went wrong");
        assert_eq!(d.code, Some("QVR-A001"));
        assert_eq!(d.span, Some(Span { start: 5, end: 8 }));
        assert_eq!(d.notes, vec!["in definition 'main'"]);
        assert_eq!(d.suggestion.as_deref(), Some("rename it"));
    }

    #[test]
    fn locate_handles_multiple_lines() {
        let src = "ab\ncd\nef";
        assert_eq!(locate(src, 0), (1, 1, "ab"));
        assert_eq!(locate(src, 2), (1, 3, "ab"));
        assert_eq!(locate(src, 3), (2, 1, "cd"));
        assert_eq!(locate(src, 7), (3, 2, "ef"));
    }

    #[test]
    fn locate_clamps_past_the_end() {
        assert_eq!(locate("ab", 99), (1, 3, "ab"));
        assert_eq!(locate("", 0), (1, 1, ""));
    }

    #[test]
    fn render_shows_headline_and_snippet() {
        let src = "main: { foo }";
        let d = Diagnostic::error("nothing named 'foo' to call")
            .with_code("QVR-A003")
            .with_span(Span { start: 8, end: 11 });
        let out = plain().render(&d, src);
        assert!(out.contains("error[QVR-A003]: nothing named 'foo' to call"), "{out}");
        assert!(out.contains("--> 1:9"), "{out}");
        assert!(out.contains("main: { foo }"), "{out}");
        assert!(out.contains("^^^"), "{out}");
    }

    #[test]
    fn render_points_at_the_right_line() {
        let src = "first: { 1 }\nsecond: { bad }";
        let d = Diagnostic::error("nothing named 'bad' to call")
            .with_span(Span { start: 23, end: 26 });
        let out = plain().render(&d, src);
        assert!(out.contains("--> 2:11"), "{out}");
        assert!(out.contains("second: { bad }"), "{out}");
        assert!(!out.contains("first: { 1 }"), "{out}");
    }

    #[test]
    fn render_without_span_skips_the_snippet() {
        let d = Diagnostic::error("stack underflow")
            .with_note("in vector 'main' at instruction 2");
        let out = plain().render(&d, "main: { pop }");
        assert!(out.contains("error: stack underflow"), "{out}");
        assert!(!out.contains("-->"), "{out}");
        assert!(out.contains("note: in vector 'main' at instruction 2"), "{out}");
    }

    #[test]
    fn color_toggles_ansi_codes() {
        let d = Diagnostic::error("bad").with_span(Span { start: 0, end: 3 });
        let with = Renderer { use_color: true }.render(&d, "bad");
        let without = plain().render(&d, "bad");
        assert!(with.contains("\x1b["));
        assert!(!without.contains("\x1b["));
    }

    #[test]
    fn fault_converts_with_a_position_note() {
        let fault = Fault {
            kind: FaultKind::StackUnderflow,
            vector: Rc::from("main"),
            pc: 3,
        };
        let d = Diagnostic::from(&fault);
        assert!(d.message.contains("underflow"));
        assert!(d.span.is_none());
        assert!(d.notes.iter().any(|n| n.contains("'main' at instruction 3")));
    }

    #[test]
    fn assembly_errors_carry_their_code() {
        let source = "main: { go }";
        let err = match crate::assemble(source) {
            Err(crate::CompileError::Assembly(e)) => e,
            other => panic!("expected assembly error, got {other:?}"),
        };
        let d = Diagnostic::from(&err);
        assert_eq!(d.code, Some("QVR-A009"));
        assert!(d.notes.iter().any(|n| n.contains("'main'")));
    }
}
