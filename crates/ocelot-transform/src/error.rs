//! Internal errors of the closure conversion pass
//!
//! Every variant is an invariant violation: either a defect in the pass or
//! malformed IR handed over by lowering. None of them is a user error.

use ocelot_ir::{BlockId, Ident, InsnId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClosureError {
    #[error("replaced function '{ident}' (insn {insn}) is actually not a function: found {found}")]
    NotAFunction {
        insn: InsnId,
        ident: Ident,
        found: &'static str,
    },

    #[error("closure call '{ident}' (insn {insn}) is actually not an application: found {found}")]
    NotAnApplication {
        insn: InsnId,
        ident: Ident,
        found: &'static str,
    },

    #[error("body of function '{ident}' (block {block}) is entered while it is being explored")]
    CyclicBody { ident: Ident, block: BlockId },

    #[error("{open} function body exploration(s) left open, innermost '{ident}'")]
    UnfinishedExploration { ident: Ident, open: usize },

    #[error("free variable walk left {frames} binding frame(s) open")]
    UnbalancedScope { frames: usize },
}

impl ClosureError {
    /// Identifier the error is about, if any
    pub fn subject(&self) -> Option<&str> {
        match self {
            ClosureError::NotAFunction { ident, .. }
            | ClosureError::NotAnApplication { ident, .. }
            | ClosureError::CyclicBody { ident, .. }
            | ClosureError::UnfinishedExploration { ident, .. } => Some(ident),
            ClosureError::UnbalancedScope { .. } => None,
        }
    }
}
