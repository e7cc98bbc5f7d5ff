//! Diagnostic types for compiler errors, warnings, and hints.

use serde::{Deserialize, Serialize};

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Informational hint
    Hint,
    /// Warning (output is produced but may be suboptimal)
    Warning,
    /// Error (the converted program must not be used)
    Error,
}

impl Severity {
    /// Get the string representation for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Hint => "hint",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic error codes organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // Internal errors (I001-I099)
    /// Internal compiler error
    InternalError,

    // Verification errors (V001-V099)
    /// Function classified as known has free variables
    KnownFunctionCaptures,
    /// Closure capture list differs from its free variables
    CaptureMismatch,
    /// Indirect flag of an application disagrees with its callee
    IndirectCallMismatch,
    /// Function literal left in the rewritten program
    FunctionSurvived,
    /// Closure construction of a function missing from the top level
    UnknownClosureTarget,
}

impl DiagnosticCode {
    /// All codes, in numbering order.
    pub const ALL: [DiagnosticCode; 6] = [
        Self::InternalError,
        Self::KnownFunctionCaptures,
        Self::CaptureMismatch,
        Self::IndirectCallMismatch,
        Self::FunctionSurvived,
        Self::UnknownClosureTarget,
    ];

    /// Get the error code string (e.g., "V001").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InternalError => "I001",

            Self::KnownFunctionCaptures => "V001",
            Self::CaptureMismatch => "V002",
            Self::IndirectCallMismatch => "V003",
            Self::FunctionSurvived => "V004",
            Self::UnknownClosureTarget => "V005",
        }
    }

    /// Look up a code by its string form, case-insensitively.
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(code))
    }

    /// Get the default severity for this error code.
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::InternalError
            | Self::KnownFunctionCaptures
            | Self::CaptureMismatch
            | Self::IndirectCallMismatch
            | Self::FunctionSurvived
            | Self::UnknownClosureTarget => Severity::Error,
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A compiler diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Unique error code
    pub code: DiagnosticCode,
    /// Severity level
    pub severity: Severity,
    /// Short message (single line)
    pub message: String,
    /// Longer explanation (optional)
    pub explanation: Option<String>,
    /// Identifier the diagnostic is about
    pub subject: Option<String>,
    /// Input file the diagnostic was produced for
    pub file: Option<String>,
    /// Additional notes
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> DiagnosticBuilder {
        DiagnosticBuilder::new(code, Severity::Error, message)
    }

    /// Create a new warning diagnostic.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> DiagnosticBuilder {
        DiagnosticBuilder::new(code, Severity::Warning, message)
    }

    /// Create a new hint diagnostic.
    pub fn hint(code: DiagnosticCode, message: impl Into<String>) -> DiagnosticBuilder {
        DiagnosticBuilder::new(code, Severity::Hint, message)
    }

    /// Create a diagnostic with the code's default severity.
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> DiagnosticBuilder {
        DiagnosticBuilder::new(code, code.default_severity(), message)
    }

    /// Check if this is an error.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Check if this is a warning.
    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }

    /// Check if this is a hint.
    pub fn is_hint(&self) -> bool {
        self.severity == Severity::Hint
    }
}

/// Builder for constructing diagnostics fluently.
pub struct DiagnosticBuilder {
    inner: Diagnostic,
}

impl DiagnosticBuilder {
    /// Create a new diagnostic builder.
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            inner: Diagnostic {
                code,
                severity,
                message: message.into(),
                explanation: None,
                subject: None,
                file: None,
                notes: Vec::new(),
            },
        }
    }

    /// Set the identifier the diagnostic is about.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.inner.subject = Some(subject.into());
        self
    }

    /// Set the input file.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.inner.file = Some(file.into());
        self
    }

    /// Add a note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.inner.notes.push(note.into());
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.inner.explanation = Some(help.into());
        self
    }

    /// Build the diagnostic.
    pub fn build(self) -> Diagnostic {
        self.inner
    }
}

/// Collection of diagnostics with summary statistics.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    /// All diagnostics
    pub items: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create a new empty collection.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Add a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    /// Extend with multiple diagnostics.
    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(diagnostics);
    }

    /// Check if there are any errors.
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.is_error())
    }

    /// Count errors.
    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    /// Count warnings.
    pub fn warning_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_warning()).count()
    }

    /// Count hints.
    pub fn hint_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_hint()).count()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the number of diagnostics.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Iterate over diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
