//! Diagnostics.

use std::fmt::{self, Display, Formatter};
use std::ops::Range;

use ecow::{EcoString, EcoVec, eco_vec};
use nota_syntax::{Lines, ParseError, SyntaxError};

/// Construct a [`SourceDiagnostic`] for a byte range.
///
/// You can also attach hints with the `; hint: "..."` syntax.
///
/// ```ignore
/// error!(range, "unknown {}", "thing");
/// error!(range, "unknown {}", "thing"; hint: "try {}", "this");
/// ```
#[macro_export]
#[doc(hidden)]
macro_rules! __error {
    (
        $range:expr, $fmt:literal $(, $arg:expr)*
        $(; hint: $hint:literal $(, $hint_arg:expr)*)*
        $(,)?
    ) => {
        $crate::diag::SourceDiagnostic::error(
            $range,
            ::ecow::eco_format!($fmt, $($arg),*),
        ) $(.with_hint(::ecow::eco_format!($hint, $($hint_arg),*)))*
    };
}

#[rustfmt::skip]
#[doc(inline)]
pub use crate::__error as error;

/// A result that can carry multiple source errors.
pub type LowerResult<T> = Result<T, LowerError>;

/// An error in a Nota document, located in the original source.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct SourceDiagnostic {
    /// The byte range of the offending text.
    pub range: Range<usize>,
    /// The zero-based line and column of the range's start, in characters.
    pub position: Option<(usize, usize)>,
    /// A diagnostic message describing the problem.
    pub message: EcoString,
    /// Additional hints to the user, indicating how this problem could be
    /// avoided or worked around.
    pub hints: EcoVec<EcoString>,
}

impl SourceDiagnostic {
    /// Create a new, bare error.
    pub fn error(range: Range<usize>, message: impl Into<EcoString>) -> Self {
        Self { range, position: None, message: message.into(), hints: eco_vec![] }
    }

    /// Adds a single hint to the diagnostic.
    pub fn hint(&mut self, hint: impl Into<EcoString>) {
        self.hints.push(hint.into());
    }

    /// Adds a single hint to the diagnostic.
    pub fn with_hint(mut self, hint: impl Into<EcoString>) -> Self {
        self.hint(hint);
        self
    }

    /// Resolve the line and column of the diagnostic.
    pub fn locate(mut self, lines: &Lines<'_>) -> Self {
        self.position = lines.position(self.range.start).map(|pos| (pos.line, pos.column));
        self
    }
}

impl From<SyntaxError> for SourceDiagnostic {
    fn from(error: SyntaxError) -> Self {
        Self { range: error.range, position: None, message: error.message, hints: error.hints }
    }
}

impl From<ParseError> for SourceDiagnostic {
    fn from(error: ParseError) -> Self {
        let range = error.offset..error.offset;
        Self::error(range, error.message).with_hint(format!(
            "the problem is near \"{}{}\"",
            error.prefix.escape_debug(),
            error.suffix.escape_debug(),
        ))
    }
}

impl Display for SourceDiagnostic {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.position {
            Some((line, column)) => {
                write!(f, "error at {}:{}: {}", line + 1, column + 1, self.message)?
            }
            None => write!(f, "error at byte {}: {}", self.range.start, self.message)?,
        }
        for hint in &self.hints {
            write!(f, "\n  hint: {hint}")?;
        }
        Ok(())
    }
}

/// A document that could not be lowered.
///
/// Holds every problem found, so that all of them can be reported at once.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct LowerError {
    /// The problems, in source order.
    pub diagnostics: EcoVec<SourceDiagnostic>,
}

impl LowerError {
    /// Locate and sort the diagnostics against the source text.
    pub fn new(text: &str, diagnostics: impl IntoIterator<Item = SourceDiagnostic>) -> Self {
        let lines = Lines::new(text);
        let mut diagnostics: Vec<_> =
            diagnostics.into_iter().map(|diag| diag.locate(&lines)).collect();
        diagnostics.sort_by_key(|diag| (diag.range.start, diag.range.end));
        diagnostics.dedup();
        Self { diagnostics: diagnostics.into_iter().collect() }
    }
}

impl Display for LowerError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for (i, diag) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{diag}")?;
        }
        Ok(())
    }
}

impl std::error::Error for LowerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_macro_with_hints() {
        let diag = error!(3..5, "unknown {}", "thing"; hint: "try {}", "this");
        assert_eq!(diag.message, "unknown thing");
        assert_eq!(diag.hints.len(), 1);
        assert_eq!(diag.hints[0], "try this");
    }

    #[test]
    fn test_lower_error_is_located_and_sorted() {
        let text = "first\nsecond line";
        let error = LowerError::new(
            text,
            [
                SourceDiagnostic::error(13..15, "late"),
                SourceDiagnostic::error(2..3, "early").with_hint("look"),
            ],
        );
        assert_eq!(error.diagnostics[0].position, Some((0, 2)));
        assert_eq!(error.diagnostics[1].position, Some((1, 7)));
        assert_eq!(
            error.to_string(),
            "error at 1:3: early\n  hint: look\nerror at 2:8: late"
        );
    }
}
