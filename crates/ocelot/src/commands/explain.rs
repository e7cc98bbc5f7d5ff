//! Explain command - explain diagnostic codes

use anyhow::{anyhow, Result};
use clap::Args;

use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct ExplainArgs {
    /// Diagnostic code to explain (e.g., V001, I001)
    pub code: String,
}

struct ErrorExplanation {
    code: &'static str,
    title: &'static str,
    description: &'static str,
    example: Option<&'static str>,
    suggestion: Option<&'static str>,
    related: &'static [&'static str],
}

const ERROR_EXPLANATIONS: &[ErrorExplanation] = &[
    // Internal errors
    ErrorExplanation {
        code: "I001",
        title: "Internal Error",
        description: "Closure conversion stopped on an IR invariant violation: a recorded \
decision points at an instruction that is not a function literal, a recorded closure call is \
not an application, a function body is entered while it is already being explored, or the \
free variable walk left a scope open. The input was not produced by a correct lowering, or \
the pass has a defect.",
        example: Some("f = fun\n  g = fun        (body of g is the body of f)\n    ..."),
        suggestion: Some("Run with -vvv to trace the classification up to the failing instruction."),
        related: &[],
    },
    // Verification errors
    ErrorExplanation {
        code: "V001",
        title: "Known Function Captures",
        description: "A function was compiled as a known function, which is called directly \
and has no environment, but its body still refers to names bound outside of it.",
        example: Some("x = int 1\nf = fun y\n  r = binary add x y    (x is free in f)"),
        suggestion: Some("Such a function must be compiled as a closure capturing x."),
        related: &["V002", "V003"],
    },
    ErrorExplanation {
        code: "V002",
        title: "Capture List Mismatch",
        description: "The capture list of a closure differs from the free variables of its \
body. Every name read in the body and bound outside of it must be captured, except the \
closure's own name. Nothing else may be captured.",
        example: Some("g = makecls (x, q) g\n  where g only reads x    (q is spurious)"),
        suggestion: None,
        related: &["V001"],
    },
    ErrorExplanation {
        code: "V003",
        title: "Indirect Flag Mismatch",
        description: "A call is marked indirect although its callee is a known function, or \
direct although its callee is a closure. Calls are indirect exactly when the callee is not \
a known function.",
        example: Some("r = app g x       (g is a closure, expected appcls)"),
        suggestion: None,
        related: &["V001"],
    },
    ErrorExplanation {
        code: "V004",
        title: "Function Literal Survived",
        description: "A function literal is still present in the converted program. Every \
function literal is moved to the top-level table and its definition removed or replaced by \
closure construction.",
        example: None,
        suggestion: None,
        related: &["V005"],
    },
    ErrorExplanation {
        code: "V005",
        title: "Unknown Closure Target",
        description: "A closure construction names a function that is missing from the \
top-level table.",
        example: Some("c = makecls (x) h    (no top-level function h)"),
        suggestion: None,
        related: &["V004"],
    },
];

pub fn run(args: ExplainArgs, format: OutputFormat, use_color: bool) -> Result<()> {
    let code = args.code.to_uppercase();

    let explanation = ERROR_EXPLANATIONS
        .iter()
        .find(|e| e.code == code)
        .ok_or_else(|| anyhow!("Unknown error code: {}", code))?;

    match format {
        OutputFormat::Text => {
            if use_color {
                println!(
                    "\n{}: {}\n{}",
                    console::style(&code).bold().cyan(),
                    console::style(explanation.title).bold(),
                    "=".repeat(code.len() + explanation.title.len() + 2)
                );
            } else {
                println!(
                    "\n{}: {}\n{}",
                    code,
                    explanation.title,
                    "=".repeat(code.len() + explanation.title.len() + 2)
                );
            }

            println!("\n{}\n", explanation.description);

            if let Some(example) = explanation.example {
                if use_color {
                    println!("{}:", console::style("Example").bold());
                } else {
                    println!("Example:");
                }
                for line in example.lines() {
                    println!("  {}", line);
                }
                println!();
            }

            if let Some(suggestion) = explanation.suggestion {
                if use_color {
                    println!("{}:", console::style("Suggestion").bold().green());
                } else {
                    println!("Suggestion:");
                }
                println!("  {}\n", suggestion);
            }

            if !explanation.related.is_empty() {
                if use_color {
                    println!(
                        "{}: {}",
                        console::style("Related").dim(),
                        explanation.related.join(", ")
                    );
                } else {
                    println!("Related: {}", explanation.related.join(", "));
                }
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "code": explanation.code,
                "title": explanation.title,
                "description": explanation.description,
                "example": explanation.example,
                "suggestion": explanation.suggestion,
                "related": explanation.related,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocelot_diagnostics::DiagnosticCode;

    #[test]
    fn test_every_code_is_explained() {
        for code in DiagnosticCode::ALL {
            assert!(
                ERROR_EXPLANATIONS.iter().any(|e| e.code == code.as_str()),
                "{} has no explanation",
                code
            );
        }
    }

    #[test]
    fn test_related_codes_exist() {
        for explanation in ERROR_EXPLANATIONS {
            for related in explanation.related {
                assert!(DiagnosticCode::parse(related).is_some());
            }
        }
    }

    #[test]
    fn test_unknown_code() {
        let err = run(
            ExplainArgs {
                code: "x999".to_string(),
            },
            OutputFormat::Text,
            false,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Unknown error code: X999");
    }
}
