//! Error types and reporting

use crate::ast::Span;
use std::ops::Range;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, CompileError>;

/// Error raised before a program runs: lexing, parsing, or lowering to bytecode
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Lexer error at {span}: {message}")]
    Lexer { message: String, span: Span },

    #[error("Parser error at {span}: {message}")]
    Parser { message: String, span: Span },

    /// A construct the bytecode compiler does not lower
    #[error("line {line}: {construct} is not supported by the bytecode compiler")]
    Unsupported { construct: String, line: usize },

    #[error("IO error: {message}")]
    Io { message: String },
}

impl CompileError {
    pub fn lexer(message: impl Into<String>, span: Span) -> Self {
        Self::Lexer {
            message: message.into(),
            span,
        }
    }

    pub fn parser(message: impl Into<String>, span: Span) -> Self {
        Self::Parser {
            message: message.into(),
            span,
        }
    }

    pub fn unsupported(construct: impl Into<String>, line: usize) -> Self {
        Self::Unsupported {
            construct: construct.into(),
            line,
        }
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Lexer { span, .. } | Self::Parser { span, .. } => Some(*span),
            Self::Unsupported { .. } | Self::Io { .. } => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Lexer { message, .. } => message,
            Self::Parser { message, .. } => message,
            Self::Unsupported { construct, .. } => construct,
            Self::Io { message } => message,
        }
    }
}

impl From<std::io::Error> for CompileError {
    fn from(err: std::io::Error) -> Self {
        Self::io_error(err.to_string())
    }
}

/// Render an error with ariadne into any writer
pub fn write_report<W: std::io::Write>(
    filename: &str,
    source: &str,
    error: &CompileError,
    out: W,
) -> std::io::Result<()> {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let kind = match error {
        CompileError::Lexer { .. } => "Lexer",
        CompileError::Parser { .. } => "Parser",
        CompileError::Unsupported { .. } => "Compile",
        CompileError::Io { .. } => "IO",
    };

    match error.span() {
        Some(span) => {
            let range: Range<usize> = span.into();
            Report::build(ReportKind::Error, (filename, range.clone()))
                .with_message(format!("{kind} error"))
                .with_label(
                    Label::new((filename, range))
                        .with_message(error.message())
                        .with_color(Color::Red),
                )
                .finish()
                .write((filename, Source::from(source)), out)
        }
        None => Report::build(ReportKind::Error, (filename, 0..0))
            .with_message(format!("{kind} error: {error}"))
            .finish()
            .write((filename, Source::from(source)), out),
    }
}

/// Report error with ariadne on stderr
pub fn report_error(filename: &str, source: &str, error: &CompileError) {
    if write_report(filename, source, error, std::io::stderr()).is_err() {
        eprintln!("Error: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_accessor() {
        let err = CompileError::parser("expected ')'", Span::new(3, 4));
        assert_eq!(err.span(), Some(Span::new(3, 4)));
        assert_eq!(CompileError::unsupported("class definition", 2).span(), None);
    }

    #[test]
    fn test_display() {
        let err = CompileError::unsupported("function definition", 4);
        assert_eq!(
            err.to_string(),
            "line 4: function definition is not supported by the bytecode compiler"
        );
        let err = CompileError::lexer("unexpected character: \"$\"", Span::new(0, 1));
        assert_eq!(err.to_string(), "Lexer error at 0..1: unexpected character: \"$\"");
    }

    #[test]
    fn test_write_report_mentions_message() {
        let source = "let x = )";
        let err = CompileError::parser("expected expression, found ')'", Span::new(8, 9));
        let mut buf = Vec::new();
        write_report("test.fine", source, &err, &mut buf).unwrap();
        let text = String::from_utf8_lossy(&buf);
        assert!(text.contains("expected expression"));
    }
}
