//! Consistency checks of a closure conversion result
//!
//! Decisions are checked against the source arena, the rewritten program
//! against the decisions. A clean run returns no violations.

use crate::closure::{Classification, FunKind};
use crate::error::ClosureError;
use crate::free_vars::{function_free_vars, reads};
use ocelot_ir::{BlockId, Ident, InsnId, Ir, Program, Val};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A function classified as known has free variables
    KnownCaptures { name: Ident, free: Vec<Ident> },
    /// A closure does not capture one of its free variables
    MissingCapture { name: Ident, missing: Vec<Ident> },
    /// A closure captures a name that is not free in its body
    SpuriousCapture { name: Ident, spurious: Vec<Ident> },
    /// An application's indirect flag disagrees with its callee's kind
    IndirectMismatch {
        insn: InsnId,
        callee: Ident,
        indirect: bool,
    },
    /// A function literal is still present after rewriting
    FunctionSurvived { name: Ident },
    /// A closure construction names a function missing from the top level
    UnknownClosureTarget { name: Ident },
}

impl Violation {
    /// Name the violation is about
    pub fn subject(&self) -> &str {
        match self {
            Violation::KnownCaptures { name, .. }
            | Violation::MissingCapture { name, .. }
            | Violation::SpuriousCapture { name, .. }
            | Violation::FunctionSurvived { name }
            | Violation::UnknownClosureTarget { name } => name,
            Violation::IndirectMismatch { callee, .. } => callee,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::KnownCaptures { name, free } => write!(
                f,
                "known function '{}' has free variables: {}",
                name,
                free.join(", ")
            ),
            Violation::MissingCapture { name, missing } => write!(
                f,
                "closure '{}' does not capture {}",
                name,
                missing.join(", ")
            ),
            Violation::SpuriousCapture { name, spurious } => write!(
                f,
                "closure '{}' captures {} which is not free in its body",
                name,
                spurious.join(", ")
            ),
            Violation::IndirectMismatch {
                insn,
                callee,
                indirect,
            } => {
                if *indirect {
                    write!(f, "call of known function '{}' (insn {}) is indirect", callee, insn)
                } else {
                    write!(f, "call of closure '{}' (insn {}) is direct", callee, insn)
                }
            }
            Violation::FunctionSurvived { name } => {
                write!(f, "function literal '{}' survived the rewrite", name)
            }
            Violation::UnknownClosureTarget { name } => {
                write!(f, "closure construction of unknown function '{}'", name)
            }
        }
    }
}

/// Check `program`, produced from `source` with `classification`.
pub fn verify(
    source: &Ir,
    classification: &Classification,
    program: &Program,
) -> Result<Vec<Violation>, ClosureError> {
    let known = classification.known_functions();
    let mut violations = Vec::new();

    for (_, decision) in classification.decisions() {
        let fv = function_free_vars(source, &decision.fun, known)?;
        match decision.kind {
            FunKind::Known => {
                if !fv.is_empty() {
                    violations.push(Violation::KnownCaptures {
                        name: decision.name.clone(),
                        free: fv.into_vec(),
                    });
                }
            }
            FunKind::Closure => {
                let captures = classification.captures(&decision.name).unwrap_or(&[]);
                let missing: Vec<Ident> = fv
                    .iter()
                    .filter(|name| **name != decision.name && !captures.contains(*name))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    violations.push(Violation::MissingCapture {
                        name: decision.name.clone(),
                        missing,
                    });
                }

                let body_reads = reads(source, decision.fun.body);
                let spurious: Vec<Ident> = captures
                    .iter()
                    .filter(|name| {
                        !fv.contains(name.as_str())
                            || !body_reads.contains(name.as_str())
                            || decision.fun.params.contains(name)
                    })
                    .cloned()
                    .collect();
                if !spurious.is_empty() {
                    violations.push(Violation::SpuriousCapture {
                        name: decision.name.clone(),
                        spurious,
                    });
                }
            }
        }
    }

    let mut checker = ProgramChecker {
        program,
        known,
        violations,
    };
    checker.check_block(program.entry());
    for fun in program.toplevel.values() {
        checker.check_block(fun.body);
    }
    Ok(checker.violations)
}

struct ProgramChecker<'a> {
    program: &'a Program,
    known: &'a HashSet<Ident>,
    violations: Vec<Violation>,
}

impl ProgramChecker<'_> {
    fn check_block(&mut self, blk: BlockId) {
        let program = self.program;
        for (id, insn) in program.ir.iter(blk) {
            match &insn.val {
                Val::Fun(_) => self.violations.push(Violation::FunctionSurvived {
                    name: insn.ident.clone(),
                }),
                Val::MakeCls(make) => {
                    if !program.toplevel.contains_key(&make.fun) {
                        self.violations.push(Violation::UnknownClosureTarget {
                            name: make.fun.clone(),
                        });
                    }
                }
                Val::App(app) => {
                    if app.indirect == self.known.contains(&app.callee) {
                        self.violations.push(Violation::IndirectMismatch {
                            insn: id,
                            callee: app.callee.clone(),
                            indirect: app.indirect,
                        });
                    }
                }
                Val::If(branch) => {
                    self.check_block(branch.then);
                    self.check_block(branch.otherwise);
                }
                _ => {}
            }
        }
    }
}
