//! CLI command implementations

pub mod check;
pub mod convert;
pub mod explain;

use anyhow::{Context, Result};
use ocelot_diagnostics::{Diagnostic, DiagnosticCode};
use ocelot_ir::{Ir, TreeBlock};
use ocelot_transform::{ClosureError, Violation};
use std::fs;
use std::path::Path;

/// Read a JSON program tree and lower it into an arena.
pub fn load_program(path: &Path) -> Result<Ir> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let tree: TreeBlock = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {} as a program tree", path.display()))?;
    let ir = Ir::from_tree(tree);
    log::debug!(
        "loaded {}: {} block(s), {} entry instruction(s)",
        path.display(),
        ir.num_blocks(),
        ir.block_len(ir.entry())
    );
    Ok(ir)
}

pub fn internal_diagnostic(err: &ClosureError, file: &str) -> Diagnostic {
    let mut builder = Diagnostic::new(DiagnosticCode::InternalError, err.to_string())
        .with_file(file)
        .with_help("the input violates an IR invariant or the pass has a defect");
    if let Some(subject) = err.subject() {
        builder = builder.with_subject(subject);
    }
    builder.build()
}

pub fn violation_diagnostic(violation: &Violation, file: &str) -> Diagnostic {
    let (code, help) = match violation {
        Violation::KnownCaptures { .. } => (
            DiagnosticCode::KnownFunctionCaptures,
            "known functions are called directly and have no environment",
        ),
        Violation::MissingCapture { .. } | Violation::SpuriousCapture { .. } => (
            DiagnosticCode::CaptureMismatch,
            "a closure captures exactly the free variables of its body",
        ),
        Violation::IndirectMismatch { .. } => (
            DiagnosticCode::IndirectCallMismatch,
            "calls are indirect exactly when the callee is not a known function",
        ),
        Violation::FunctionSurvived { .. } => (
            DiagnosticCode::FunctionSurvived,
            "every function literal is moved to the top level",
        ),
        Violation::UnknownClosureTarget { .. } => (
            DiagnosticCode::UnknownClosureTarget,
            "closure construction must name a top-level function",
        ),
    };
    Diagnostic::new(code, violation.to_string())
        .with_file(file)
        .with_subject(violation.subject())
        .with_help(help)
        .build()
}
