//! Diagnostic infrastructure for the Ocelot compiler.
//!
//! This crate provides structured reporting for compiler passes:
//! - Diagnostic types with stable error codes
//! - Terminal and JSON output
//! - Help text attached to diagnostics
//!
//! # Example
//!
//! ```
//! use ocelot_diagnostics::{Diagnostic, DiagnosticCode, DiagnosticEmitter, TerminalEmitter};
//!
//! let diag = Diagnostic::new(DiagnosticCode::KnownFunctionCaptures, "'f' has free variables: x")
//!     .with_subject("f")
//!     .with_help("Known functions are called directly and cannot capture")
//!     .build();
//!
//! let stderr = std::io::stderr();
//! let mut emitter = TerminalEmitter::new(stderr.lock(), false);
//! emitter.emit(&diag).unwrap();
//! ```

pub mod diagnostic;
pub mod emitter;

// Re-export commonly used types
pub use diagnostic::{Diagnostic, DiagnosticBuilder, DiagnosticCode, Diagnostics, Severity};
pub use emitter::{DiagnosticEmitter, JsonEmitter, TerminalEmitter};
