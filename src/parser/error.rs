//! User-visible assembly diagnostics.

use std::fmt;

use thiserror::Error as ThisError;

/// Everything that can be wrong with a line of warrior source.
#[derive(ThisError, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    #[error("Line too long")]
    LineTooLong,

    #[error("String too long")]
    StringTooLong,
    #[error("String prematurely terminated")]
    UnterminatedString,
    #[error("Illegal character in string")]
    IllegalStringChar,
    #[error("Number too long")]
    NumberTooLong,
    #[error("Identifier too long")]
    IdentifierTooLong,

    #[error("Unmatched left parenthesis")]
    UnmatchedParen,
    #[error("Unexpected end of input")]
    UnexpectedEol,
    #[error("Unexpected input")]
    UnexpectedInput,
    #[error("Unexpected token")]
    UnexpectedToken,
    #[error("Missing addressing mode indicator")]
    MissingModeMarker,
    #[error("Immediate mode not allowed here")]
    ImmediateNotAllowed,
    #[error("Expected immediate mode argument")]
    ExpectedImmediate,
    #[error("Missing comma")]
    MissingComma,
    #[error("Missing colon")]
    MissingColon,
    #[error("Extra text on line")]
    ExtraText,
    #[error("'=' expected")]
    ExpectedEquals,
    #[error("Identifier expected")]
    ExpectedIdentifier,
    #[error("String expected")]
    ExpectedString,

    #[error("Identifier redefined")]
    IdentifierRedefined,
    #[error("Identifier defined too late")]
    DefinedTooLate,
    #[error("Label redefined")]
    LabelRedefined,

    #[error("Undefined symbol \"{0}\"")]
    UndefinedSymbol(String),
    #[error("Division by zero")]
    DivisionByZero,

    #[error("No instructions in programme")]
    ProgramEmpty,
    #[error("Too many instructions in programme")]
    ProgramTooLarge,
}

/// A diagnostic tied to a place in a warrior source file.
///
/// Rendered the way the assembler has always pointed at problems: the
/// offending line, a caret under the offending column, then a
/// `file:line: ERROR: message.` summary. Diagnostics raised after the
/// line buffer is gone (pass 2) carry no column and render only the
/// summary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub file: String,
    pub line: u32,
    pub col: Option<usize>,
    pub source_line: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = self.col {
            writeln!(f, "{}", self.source_line)?;
            writeln!(f, "{}^", "-".repeat(col))?;
        }
        write!(f, "{}:{}: ERROR: {}.", self.file, self.line, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn render_with_caret() {
        let diagnostic = Diagnostic {
            kind: ErrorKind::MissingComma,
            file: "imp.cw".into(),
            line: 3,
            col: Some(4),
            source_line: "MOV $0 $1".into(),
        };

        assert_eq!(
            diagnostic.to_string(),
            "MOV $0 $1\n----^\nimp.cw:3: ERROR: Missing comma."
        );
    }

    #[test]
    fn render_without_column() {
        let diagnostic = Diagnostic {
            kind: ErrorKind::ProgramEmpty,
            file: "empty.cw".into(),
            line: 1,
            col: None,
            source_line: String::new(),
        };

        assert_eq!(
            diagnostic.to_string(),
            "empty.cw:1: ERROR: No instructions in programme."
        );
    }
}
