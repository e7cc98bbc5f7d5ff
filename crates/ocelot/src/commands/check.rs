//! Check command - convert and verify a program without printing it

use anyhow::{anyhow, Result};
use clap::Args;
use ocelot_diagnostics::{DiagnosticEmitter, Diagnostics, JsonEmitter, TerminalEmitter};
use ocelot_ir::Ir;
use ocelot_transform::{classify, verify, ConvertOptions, FunKind};
use std::path::PathBuf;

use super::{internal_diagnostic, load_program, violation_diagnostic};
use crate::config::Config;
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Input program tree (JSON)
    pub input: PathBuf,

    /// Compile every function as a closure
    #[arg(long)]
    pub no_kfo: bool,
}

/// Outcome of checking one program
#[derive(Debug, Default)]
struct CheckReport {
    diagnostics: Diagnostics,
    functions: usize,
    known: usize,
    closure_records: usize,
    indirect_calls: usize,
}

fn check_ir(ir: &Ir, options: ConvertOptions, file: &str) -> CheckReport {
    let mut report = CheckReport::default();

    let classification = match classify(ir, options) {
        Ok(classification) => classification,
        Err(err) => {
            report.diagnostics.push(internal_diagnostic(&err, file));
            return report;
        }
    };
    report.functions = classification.decisions().count();
    report.known = classification
        .decisions()
        .filter(|(_, d)| d.kind == FunKind::Known)
        .count();
    report.indirect_calls = classification.closure_calls().count();

    let program = match classification.rewrite(ir.clone()) {
        Ok(program) => program,
        Err(err) => {
            report.diagnostics.push(internal_diagnostic(&err, file));
            return report;
        }
    };
    report.closure_records = program.closures.len();

    match verify(ir, &classification, &program) {
        Ok(violations) => report
            .diagnostics
            .extend(violations.iter().map(|v| violation_diagnostic(v, file))),
        Err(err) => report.diagnostics.push(internal_diagnostic(&err, file)),
    }
    report
}

pub fn run(args: CheckArgs, mut config: Config, format: OutputFormat, use_color: bool) -> Result<()> {
    config.apply_overrides(args.no_kfo, false);
    let ir = load_program(&args.input)?;
    let file = args.input.display().to_string();
    let report = check_ir(&ir, config.convert_options(), &file);
    let diagnostics = &report.diagnostics;

    match format {
        OutputFormat::Text => {
            let mut emitter = TerminalEmitter::new(std::io::stdout().lock(), use_color);
            emitter.emit_all(diagnostics)?;
            emitter.emit_summary(diagnostics)?;

            if !diagnostics.has_errors() {
                let message = format!(
                    "{}: {} function(s), {} known, {} closure record(s), {} indirect call(s)",
                    file,
                    report.functions,
                    report.known,
                    report.closure_records,
                    report.indirect_calls
                );
                if use_color {
                    println!("{} {}", console::style("✓").green().bold(), message);
                } else {
                    println!("OK {}", message);
                }
            }
        }
        OutputFormat::Json => {
            let mut emitter = JsonEmitter::new(std::io::stdout().lock());
            emitter.emit_all(diagnostics)?;

            let summary = serde_json::json!({
                "type": "summary",
                "success": !diagnostics.has_errors(),
                "file": file,
                "errors": diagnostics.error_count(),
                "warnings": diagnostics.warning_count(),
                "functions": report.functions,
                "known": report.known,
                "closure_records": report.closure_records,
                "indirect_calls": report.indirect_calls,
            });
            println!("{}", serde_json::to_string(&summary)?);
        }
    }

    if diagnostics.has_errors() {
        Err(anyhow!("Check failed with errors"))
    } else {
        Ok(())
    }
}
