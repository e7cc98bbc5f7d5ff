//! Convert command - run closure conversion and print the program

use anyhow::{bail, Context, Result};
use clap::Args;
use ocelot_diagnostics::{DiagnosticEmitter, Diagnostics, TerminalEmitter};
use ocelot_ir::Program;
use ocelot_transform::{classify, verify};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use super::{load_program, violation_diagnostic};
use crate::config::Config;
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Input program tree (JSON)
    pub input: PathBuf,

    /// Write the converted program here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Compile every function as a closure
    #[arg(long)]
    pub no_kfo: bool,

    /// Skip verification of the converted program
    #[arg(long)]
    pub no_verify: bool,
}

fn render(program: &Program, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(program.to_string()),
        OutputFormat::Json => {
            let mut text = serde_json::to_string_pretty(&program.to_tree())?;
            text.push('\n');
            Ok(text)
        }
    }
}

pub fn run(
    args: ConvertArgs,
    mut config: Config,
    format: OutputFormat,
    use_color: bool,
    quiet: bool,
) -> Result<()> {
    config.apply_overrides(args.no_kfo, args.no_verify);
    let ir = load_program(&args.input)?;
    let file = args.input.display().to_string();

    let start = Instant::now();
    let classification = classify(&ir, config.convert_options())
        .with_context(|| format!("Closure conversion of {} failed", file))?;
    let source = config.closure.verify.then(|| ir.clone());
    let program = classification
        .rewrite(ir)
        .with_context(|| format!("Closure conversion of {} failed", file))?;
    log::info!("converted {} in {:?}", file, start.elapsed());

    if let Some(source) = source {
        let violations = verify(&source, &classification, &program)
            .with_context(|| format!("Verification of {} failed", file))?;
        if !violations.is_empty() {
            let mut diagnostics = Diagnostics::new();
            diagnostics.extend(violations.iter().map(|v| violation_diagnostic(v, &file)));
            let mut emitter = TerminalEmitter::new(std::io::stderr().lock(), use_color);
            emitter.emit_all(&diagnostics)?;
            emitter.emit_summary(&diagnostics)?;
            bail!("Converted program failed verification");
        }
    }

    let rendered = render(&program, format)?;
    match args.output {
        Some(path) => {
            fs::write(&path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !quiet {
                let message = format!("Wrote {}", path.display());
                if use_color {
                    eprintln!("{}", console::style(message).green());
                } else {
                    eprintln!("{}", message);
                }
            }
        }
        None => print!("{}", rendered),
    }
    Ok(())
}
