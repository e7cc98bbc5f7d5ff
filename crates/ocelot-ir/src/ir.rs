//! IR definitions
//!
//! Every instruction binds exactly one identifier to a value. Instructions
//! of a block form a doubly linked list between two sentinel `Nop` records:
//! `top`, which is never observable, and `bottom`, which has no successor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name bound by an instruction or a parameter
pub type Ident = String;

/// Index of an instruction record in the arena
pub type InsnId = u32;

/// Index of a block in the arena
pub type BlockId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    FNeg,
    Not,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::FNeg => "fneg",
            UnaryOp::Not => "not",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    FAdd,
    FSub,
    FMul,
    FDiv,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::FAdd => "fadd",
            BinaryOp::FSub => "fsub",
            BinaryOp::FMul => "fmul",
            BinaryOp::FDiv => "fdiv",
            BinaryOp::Eq => "eq",
            BinaryOp::NotEq => "neq",
            BinaryOp::Less => "lt",
            BinaryOp::LessEq => "lte",
            BinaryOp::Greater => "gt",
            BinaryOp::GreaterEq => "gte",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

/// A function literal. `B` is the representation of the body: a `BlockId`
/// inside the arena, or a nested `TreeBlock` in the surface form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fun<B = BlockId> {
    pub params: Vec<Ident>,
    pub body: B,
}

/// Two-way branch. Bindings made inside a branch are local to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct If<B = BlockId> {
    pub cond: Ident,
    pub then: B,
    pub otherwise: B,
}

/// Function application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub callee: Ident,
    pub args: Vec<Ident>,
    /// Set by closure conversion when the callee is a closure value rather
    /// than a statically known function.
    #[serde(default)]
    pub indirect: bool,
}

/// Closure construction, produced by closure conversion only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakeCls {
    pub captures: Vec<Ident>,
    pub fun: Ident,
}

/// Value bound by an instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Val<B = BlockId> {
    /// Sentinel; never appears between `top` and `bottom`
    Nop,
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Unary {
        op: UnaryOp,
        child: Ident,
    },
    Binary {
        op: BinaryOp,
        lhs: Ident,
        rhs: Ident,
    },
    Ref(Ident),
    If(If<B>),
    Fun(Fun<B>),
    App(App),
    Tuple(Vec<Ident>),
    TplLoad {
        from: Ident,
        index: usize,
    },
    Array {
        size: Ident,
        elem: Ident,
    },
    ArrLit(Vec<Ident>),
    ArrLoad {
        from: Ident,
        index: Ident,
    },
    ArrStore {
        to: Ident,
        index: Ident,
        rhs: Ident,
    },
    ArrLen(Ident),
    MakeSome(Ident),
    MakeNone,
    IsSome(Ident),
    DerefSome(Ident),
    /// Reference to an external (runtime or library) symbol
    XRef(String),
    /// Direct call of an external symbol
    ExtCall {
        callee: String,
        args: Vec<Ident>,
    },
    MakeCls(MakeCls),
}

impl<B> Val<B> {
    /// Identifiers read directly by this value. Nested blocks are not
    /// descended into; the callee of an application is included.
    pub fn operands(&self) -> Vec<&Ident> {
        match self {
            Val::Unary { child, .. } => vec![child],
            Val::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Val::Ref(id)
            | Val::ArrLen(id)
            | Val::MakeSome(id)
            | Val::IsSome(id)
            | Val::DerefSome(id) => vec![id],
            Val::If(branch) => vec![&branch.cond],
            Val::App(app) => std::iter::once(&app.callee).chain(app.args.iter()).collect(),
            Val::Tuple(elems) | Val::ArrLit(elems) => elems.iter().collect(),
            Val::TplLoad { from, .. } => vec![from],
            Val::Array { size, elem } => vec![size, elem],
            Val::ArrLoad { from, index } => vec![from, index],
            Val::ArrStore { to, index, rhs } => vec![to, index, rhs],
            Val::ExtCall { args, .. } => args.iter().collect(),
            Val::MakeCls(make) => make.captures.iter().collect(),
            Val::Nop
            | Val::Unit
            | Val::Bool(_)
            | Val::Int(_)
            | Val::Float(_)
            | Val::Str(_)
            | Val::Fun(_)
            | Val::XRef(_)
            | Val::MakeNone => Vec::new(),
        }
    }

    /// Short variant name, used in dumps and error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Val::Nop => "nop",
            Val::Unit => "unit",
            Val::Bool(_) => "bool",
            Val::Int(_) => "int",
            Val::Float(_) => "float",
            Val::Str(_) => "string",
            Val::Unary { .. } => "unary",
            Val::Binary { .. } => "binary",
            Val::Ref(_) => "ref",
            Val::If(_) => "if",
            Val::Fun(_) => "fun",
            Val::App(_) => "app",
            Val::Tuple(_) => "tuple",
            Val::TplLoad { .. } => "tplload",
            Val::Array { .. } => "array",
            Val::ArrLit(_) => "arrlit",
            Val::ArrLoad { .. } => "arrload",
            Val::ArrStore { .. } => "arrstore",
            Val::ArrLen(_) => "arrlen",
            Val::MakeSome(_) => "some",
            Val::MakeNone => "none",
            Val::IsSome(_) => "issome",
            Val::DerefSome(_) => "derefsome",
            Val::XRef(_) => "xref",
            Val::ExtCall { .. } => "extcall",
            Val::MakeCls(_) => "makecls",
        }
    }

    /// Convert the block representation, keeping everything else.
    pub fn map_blocks<C>(self, mut f: impl FnMut(B) -> C) -> Val<C> {
        match self {
            Val::If(branch) => {
                let then = f(branch.then);
                let otherwise = f(branch.otherwise);
                Val::If(If {
                    cond: branch.cond,
                    then,
                    otherwise,
                })
            }
            Val::Fun(fun) => Val::Fun(Fun {
                params: fun.params,
                body: f(fun.body),
            }),
            Val::Nop => Val::Nop,
            Val::Unit => Val::Unit,
            Val::Bool(b) => Val::Bool(b),
            Val::Int(i) => Val::Int(i),
            Val::Float(x) => Val::Float(x),
            Val::Str(s) => Val::Str(s),
            Val::Unary { op, child } => Val::Unary { op, child },
            Val::Binary { op, lhs, rhs } => Val::Binary { op, lhs, rhs },
            Val::Ref(id) => Val::Ref(id),
            Val::App(app) => Val::App(app),
            Val::Tuple(elems) => Val::Tuple(elems),
            Val::TplLoad { from, index } => Val::TplLoad { from, index },
            Val::Array { size, elem } => Val::Array { size, elem },
            Val::ArrLit(elems) => Val::ArrLit(elems),
            Val::ArrLoad { from, index } => Val::ArrLoad { from, index },
            Val::ArrStore { to, index, rhs } => Val::ArrStore { to, index, rhs },
            Val::ArrLen(id) => Val::ArrLen(id),
            Val::MakeSome(id) => Val::MakeSome(id),
            Val::MakeNone => Val::MakeNone,
            Val::IsSome(id) => Val::IsSome(id),
            Val::DerefSome(id) => Val::DerefSome(id),
            Val::XRef(name) => Val::XRef(name),
            Val::ExtCall { callee, args } => Val::ExtCall { callee, args },
            Val::MakeCls(make) => Val::MakeCls(make),
        }
    }
}

/// One instruction record in the arena
#[derive(Debug, Clone, PartialEq)]
pub struct Insn {
    pub ident: Ident,
    pub val: Val,
    pub prev: Option<InsnId>,
    pub next: Option<InsnId>,
}

/// A block is delimited by its two sentinel records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub top: InsnId,
    pub bottom: InsnId,
}

/// Arena owning every block and instruction of a compilation unit.
///
/// Block 0 is the outermost block (the program entry sequence); nested
/// function bodies and branches are further blocks referenced by id from
/// `Val::Fun` and `Val::If`.
#[derive(Debug, Clone, PartialEq)]
pub struct Ir {
    insns: Vec<Insn>,
    blocks: Vec<Block>,
}

impl Default for Ir {
    fn default() -> Self {
        Self::new()
    }
}

impl Ir {
    /// Create an arena holding an empty entry block.
    pub fn new() -> Self {
        let mut ir = Ir {
            insns: Vec::new(),
            blocks: Vec::new(),
        };
        ir.new_block();
        ir
    }

    pub fn entry(&self) -> BlockId {
        0
    }

    /// Allocate an empty block.
    pub fn new_block(&mut self) -> BlockId {
        let top = self.alloc(Insn {
            ident: Ident::new(),
            val: Val::Nop,
            prev: None,
            next: None,
        });
        let bottom = self.alloc(Insn {
            ident: Ident::new(),
            val: Val::Nop,
            prev: Some(top),
            next: None,
        });
        self.insns[top as usize].next = Some(bottom);
        self.blocks.push(Block { top, bottom });
        (self.blocks.len() - 1) as BlockId
    }

    fn alloc(&mut self, insn: Insn) -> InsnId {
        self.insns.push(insn);
        (self.insns.len() - 1) as InsnId
    }

    /// Append an instruction at the end of a block.
    pub fn push(&mut self, blk: BlockId, ident: impl Into<Ident>, val: Val) -> InsnId {
        let bottom = self.block(blk).bottom;
        let last = self.insns[bottom as usize].prev;
        let id = self.alloc(Insn {
            ident: ident.into(),
            val,
            prev: last,
            next: Some(bottom),
        });
        if let Some(last) = last {
            self.insns[last as usize].next = Some(id);
        }
        self.insns[bottom as usize].prev = Some(id);
        id
    }

    pub fn block(&self, blk: BlockId) -> Block {
        self.blocks[blk as usize]
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn insn(&self, id: InsnId) -> &Insn {
        &self.insns[id as usize]
    }

    /// First record after the start sentinel. This is the bottom sentinel
    /// when the block is empty.
    pub fn first(&self, blk: BlockId) -> InsnId {
        let top = self.block(blk).top;
        self.insns[top as usize]
            .next
            .unwrap_or(self.block(blk).bottom)
    }

    pub fn next(&self, id: InsnId) -> Option<InsnId> {
        self.insns[id as usize].next
    }

    /// Whether `id` is the end of its block (the record without successor)
    pub fn is_end(&self, id: InsnId) -> bool {
        self.insns[id as usize].next.is_none()
    }

    /// Instructions of a block in order, sentinels excluded
    pub fn iter(&self, blk: BlockId) -> Insns<'_> {
        self.iter_from(self.first(blk))
    }

    /// Instructions from `id` to the end of its block
    pub fn iter_from(&self, id: InsnId) -> Insns<'_> {
        Insns {
            ir: self,
            cursor: Some(id),
        }
    }

    pub fn block_len(&self, blk: BlockId) -> usize {
        self.iter(blk).count()
    }

    /// Unlink an instruction from its block. Neighbours are joined in O(1)
    /// and the record's own links are cleared, so detaching twice is a
    /// no-op. Returns false if the instruction was already detached.
    pub fn detach(&mut self, id: InsnId) -> bool {
        let (prev, next) = {
            let insn = &self.insns[id as usize];
            (insn.prev, insn.next)
        };
        if prev.is_none() && next.is_none() {
            return false;
        }
        if let Some(prev) = prev {
            self.insns[prev as usize].next = next;
        }
        if let Some(next) = next {
            self.insns[next as usize].prev = prev;
        }
        let insn = &mut self.insns[id as usize];
        insn.prev = None;
        insn.next = None;
        true
    }

    pub fn is_detached(&self, id: InsnId) -> bool {
        let insn = &self.insns[id as usize];
        insn.prev.is_none() && insn.next.is_none()
    }

    /// Replace the value of an instruction in place. Its identifier and
    /// position are preserved. Returns the previous value.
    pub fn replace_val(&mut self, id: InsnId, val: Val) -> Val {
        std::mem::replace(&mut self.insns[id as usize].val, val)
    }

    /// Set the indirect flag of an application. Returns false when the
    /// instruction is not an application.
    pub fn mark_indirect(&mut self, id: InsnId) -> bool {
        match &mut self.insns[id as usize].val {
            Val::App(app) => {
                app.indirect = true;
                true
            }
            _ => false,
        }
    }
}

/// Iterator over the instructions of a block
pub struct Insns<'a> {
    ir: &'a Ir,
    cursor: Option<InsnId>,
}

impl<'a> Iterator for Insns<'a> {
    type Item = (InsnId, &'a Insn);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let insn = self.ir.insn(id);
        // The bottom sentinel has no successor and is not yielded.
        let next = insn.next?;
        self.cursor = Some(next);
        Some((id, insn))
    }
}

/// Result of closure conversion: flat function table plus the rewritten
/// entry block.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Every function literal of the input, keyed by the name it bound
    pub toplevel: BTreeMap<Ident, Fun>,
    /// Capture lists of the functions that need a closure record
    pub closures: BTreeMap<Ident, Vec<Ident>>,
    pub ir: Ir,
}

impl Program {
    pub fn entry(&self) -> BlockId {
        self.ir.entry()
    }

    /// Whether `name` needs a runtime closure record
    pub fn is_closure(&self, name: &str) -> bool {
        self.closures.contains_key(name)
    }
}
