//! Nested surface form of the IR
//!
//! The arena is convenient for passes but not for people or tools. The
//! tree form nests function bodies and branches inside their instruction
//! and is what the driver reads and writes as JSON:
//!
//! ```json
//! [
//!   {"ident": "x", "val": {"int": 1}},
//!   {"ident": "f", "val": {"fun": {"params": ["y"], "body": [
//!     {"ident": "r", "val": {"binary": {"op": "add", "lhs": "x", "rhs": "y"}}}
//!   ]}}},
//!   {"ident": "res", "val": {"app": {"callee": "f", "args": ["x"]}}}
//! ]
//! ```

use crate::builder::IrBuilder;
use crate::ir::{BlockId, Ident, Ir, Program, Val};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeInsn {
    pub ident: Ident,
    pub val: Val<TreeBlock>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeBlock(pub Vec<TreeInsn>);

/// A flattened function in the output tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeFunction {
    pub params: Vec<Ident>,
    /// Present when the function needs a closure record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captures: Option<Vec<Ident>>,
    pub body: TreeBlock,
}

/// Tree form of a converted program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramTree {
    pub functions: BTreeMap<Ident, TreeFunction>,
    pub entry: TreeBlock,
}

impl Ir {
    /// Build an arena whose entry block holds `tree`.
    pub fn from_tree(tree: TreeBlock) -> Ir {
        let mut builder = IrBuilder::new();
        let entry = builder.entry();
        builder.lower(entry, tree);
        builder.finish()
    }

    /// Read a block back into its nested form.
    pub fn to_tree(&self, blk: BlockId) -> TreeBlock {
        TreeBlock(
            self.iter(blk)
                .map(|(_, insn)| TreeInsn {
                    ident: insn.ident.clone(),
                    val: insn.val.clone().map_blocks(|nested| self.to_tree(nested)),
                })
                .collect(),
        )
    }
}

impl Program {
    pub fn to_tree(&self) -> ProgramTree {
        let functions = self
            .toplevel
            .iter()
            .map(|(name, fun)| {
                (
                    name.clone(),
                    TreeFunction {
                        params: fun.params.clone(),
                        captures: self.closures.get(name).cloned(),
                        body: self.ir.to_tree(fun.body),
                    },
                )
            })
            .collect();
        ProgramTree {
            functions,
            entry: self.ir.to_tree(self.entry()),
        }
    }
}
