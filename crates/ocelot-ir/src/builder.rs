//! Programmatic construction of IR arenas

use crate::ir::{App, BinaryOp, BlockId, Fun, Ident, If, InsnId, Ir, UnaryOp, Val};
use crate::tree::TreeBlock;

fn names(list: &[&str]) -> Vec<Ident> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Builds an `Ir` block by block. Nested bodies are filled in by closures
/// receiving the builder and the new block.
#[derive(Debug, Default)]
pub struct IrBuilder {
    ir: Ir,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self { ir: Ir::new() }
    }

    pub fn entry(&self) -> BlockId {
        self.ir.entry()
    }

    pub fn push(&mut self, blk: BlockId, ident: impl Into<Ident>, val: Val) -> InsnId {
        self.ir.push(blk, ident, val)
    }

    pub fn unit(&mut self, blk: BlockId, ident: &str) -> InsnId {
        self.push(blk, ident, Val::Unit)
    }

    pub fn int(&mut self, blk: BlockId, ident: &str, value: i64) -> InsnId {
        self.push(blk, ident, Val::Int(value))
    }

    pub fn bool(&mut self, blk: BlockId, ident: &str, value: bool) -> InsnId {
        self.push(blk, ident, Val::Bool(value))
    }

    /// `ident = of`
    pub fn var(&mut self, blk: BlockId, ident: &str, of: &str) -> InsnId {
        self.push(blk, ident, Val::Ref(of.to_string()))
    }

    pub fn unary(&mut self, blk: BlockId, ident: &str, op: UnaryOp, child: &str) -> InsnId {
        self.push(
            blk,
            ident,
            Val::Unary {
                op,
                child: child.to_string(),
            },
        )
    }

    pub fn binary(
        &mut self,
        blk: BlockId,
        ident: &str,
        op: BinaryOp,
        lhs: &str,
        rhs: &str,
    ) -> InsnId {
        self.push(
            blk,
            ident,
            Val::Binary {
                op,
                lhs: lhs.to_string(),
                rhs: rhs.to_string(),
            },
        )
    }

    pub fn tuple(&mut self, blk: BlockId, ident: &str, elems: &[&str]) -> InsnId {
        self.push(blk, ident, Val::Tuple(names(elems)))
    }

    pub fn app(&mut self, blk: BlockId, ident: &str, callee: &str, args: &[&str]) -> InsnId {
        self.push(
            blk,
            ident,
            Val::App(App {
                callee: callee.to_string(),
                args: names(args),
                indirect: false,
            }),
        )
    }

    pub fn xref(&mut self, blk: BlockId, ident: &str, symbol: &str) -> InsnId {
        self.push(blk, ident, Val::XRef(symbol.to_string()))
    }

    pub fn ext_call(&mut self, blk: BlockId, ident: &str, callee: &str, args: &[&str]) -> InsnId {
        self.push(
            blk,
            ident,
            Val::ExtCall {
                callee: callee.to_string(),
                args: names(args),
            },
        )
    }

    /// Define a function literal in `blk`; `body` fills its body block.
    pub fn fun(
        &mut self,
        blk: BlockId,
        ident: &str,
        params: &[&str],
        body: impl FnOnce(&mut Self, BlockId),
    ) -> InsnId {
        let body_blk = self.ir.new_block();
        let id = self.push(
            blk,
            ident,
            Val::Fun(Fun {
                params: names(params),
                body: body_blk,
            }),
        );
        body(self, body_blk);
        id
    }

    /// `ident = if cond then .. else ..`
    pub fn branch(
        &mut self,
        blk: BlockId,
        ident: &str,
        cond: &str,
        then: impl FnOnce(&mut Self, BlockId),
        otherwise: impl FnOnce(&mut Self, BlockId),
    ) -> InsnId {
        let then_blk = self.ir.new_block();
        let else_blk = self.ir.new_block();
        let id = self.push(
            blk,
            ident,
            Val::If(If {
                cond: cond.to_string(),
                then: then_blk,
                otherwise: else_blk,
            }),
        );
        then(self, then_blk);
        otherwise(self, else_blk);
        id
    }

    /// Lower a surface tree into `blk`, allocating nested blocks as needed.
    pub fn lower(&mut self, blk: BlockId, tree: TreeBlock) {
        for insn in tree.0 {
            let val = insn.val.map_blocks(|nested| {
                let nested_blk = self.ir.new_block();
                self.lower(nested_blk, nested);
                nested_blk
            });
            self.ir.push(blk, insn.ident, val);
        }
    }

    pub fn finish(self) -> Ir {
        self.ir
    }
}
