//! Diagnostic emitters for different output formats.

use crate::diagnostic::{Diagnostic, Diagnostics, Severity};
use std::io::Write;

/// Trait for emitting diagnostics in various formats.
pub trait DiagnosticEmitter {
    /// Emit a single diagnostic.
    fn emit(&mut self, diagnostic: &Diagnostic) -> std::io::Result<()>;

    /// Emit multiple diagnostics.
    fn emit_all(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()> {
        for diag in diagnostics.iter() {
            self.emit(diag)?;
        }
        Ok(())
    }

    /// Emit a summary line.
    fn emit_summary(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()>;
}

/// Terminal output, optionally colored.
pub struct TerminalEmitter<W: Write> {
    writer: W,
    colored: bool,
}

impl<W: Write> TerminalEmitter<W> {
    /// Create a new terminal emitter.
    pub fn new(writer: W, colored: bool) -> Self {
        Self { writer, colored }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn severity_color(&self, severity: Severity) -> &'static str {
        if !self.colored {
            return "";
        }
        match severity {
            Severity::Error => "\x1b[31m",   // Red
            Severity::Warning => "\x1b[33m", // Yellow
            Severity::Hint => "\x1b[34m",    // Blue
        }
    }

    fn reset(&self) -> &'static str {
        if self.colored {
            "\x1b[0m"
        } else {
            ""
        }
    }

    fn bold(&self) -> &'static str {
        if self.colored {
            "\x1b[1m"
        } else {
            ""
        }
    }

    fn cyan(&self) -> &'static str {
        if self.colored {
            "\x1b[36m"
        } else {
            ""
        }
    }
}

impl<W: Write> DiagnosticEmitter for TerminalEmitter<W> {
    fn emit(&mut self, diagnostic: &Diagnostic) -> std::io::Result<()> {
        let color = self.severity_color(diagnostic.severity);
        let reset = self.reset();
        let bold = self.bold();
        let cyan = self.cyan();

        // Header: error[V001]: message
        writeln!(
            self.writer,
            "{}{}{}[{}]{}: {}",
            bold,
            color,
            diagnostic.severity.as_str(),
            diagnostic.code.as_str(),
            reset,
            diagnostic.message
        )?;

        // Location: --> file: subject
        match (&diagnostic.file, &diagnostic.subject) {
            (Some(file), Some(subject)) => {
                writeln!(self.writer, "  {}-->{} {}: '{}'", cyan, reset, file, subject)?
            }
            (Some(file), None) => writeln!(self.writer, "  {}-->{} {}", cyan, reset, file)?,
            (None, Some(subject)) => {
                writeln!(self.writer, "  {}-->{} '{}'", cyan, reset, subject)?
            }
            (None, None) => {}
        }

        for note in &diagnostic.notes {
            writeln!(self.writer, "  {}= note:{} {}", cyan, reset, note)?;
        }

        if let Some(ref explanation) = diagnostic.explanation {
            writeln!(self.writer, "  {}= help:{} {}", cyan, reset, explanation)?;
        }

        writeln!(self.writer)?;
        Ok(())
    }

    fn emit_summary(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()> {
        let errors = diagnostics.error_count();
        let warnings = diagnostics.warning_count();

        let color = if errors > 0 {
            self.severity_color(Severity::Error)
        } else if warnings > 0 {
            self.severity_color(Severity::Warning)
        } else {
            ""
        };
        let reset = self.reset();

        if errors > 0 || warnings > 0 {
            write!(self.writer, "{}", color)?;
            if errors > 0 {
                write!(
                    self.writer,
                    "{} error{}",
                    errors,
                    if errors == 1 { "" } else { "s" }
                )?;
            }
            if errors > 0 && warnings > 0 {
                write!(self.writer, " and ")?;
            }
            if warnings > 0 {
                write!(
                    self.writer,
                    "{} warning{}",
                    warnings,
                    if warnings == 1 { "" } else { "s" }
                )?;
            }
            writeln!(self.writer, " emitted{}", reset)?;
        }

        Ok(())
    }
}

/// JSON lines output for tooling integration.
pub struct JsonEmitter<W: Write> {
    writer: W,
}

impl<W: Write> JsonEmitter<W> {
    /// Create a new JSON emitter.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DiagnosticEmitter for JsonEmitter<W> {
    fn emit(&mut self, diagnostic: &Diagnostic) -> std::io::Result<()> {
        let json = serde_json::json!({
            "code": diagnostic.code.as_str(),
            "severity": diagnostic.severity.as_str(),
            "message": diagnostic.message,
            "file": diagnostic.file,
            "subject": diagnostic.subject,
            "notes": diagnostic.notes,
            "help": diagnostic.explanation,
        });

        serde_json::to_writer(&mut self.writer, &json)?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn emit_summary(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()> {
        let summary = serde_json::json!({
            "type": "summary",
            "errors": diagnostics.error_count(),
            "warnings": diagnostics.warning_count(),
            "hints": diagnostics.hint_count(),
            "total": diagnostics.len(),
        });
        serde_json::to_writer(&mut self.writer, &summary)?;
        writeln!(self.writer)?;
        Ok(())
    }
}
