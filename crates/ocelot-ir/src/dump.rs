//! Human-readable dump of blocks and programs

use crate::ir::{BlockId, Ir, Program, Val};
use std::fmt::{self, Display, Formatter, Write};

fn join(list: &[String]) -> String {
    list.join(", ")
}

/// Write a single-line description of a value. Nested blocks are written
/// separately by `write_block`.
fn write_val(f: &mut impl Write, val: &Val) -> fmt::Result {
    match val {
        Val::Nop => write!(f, "nop"),
        Val::Unit => write!(f, "unit"),
        Val::Bool(b) => write!(f, "bool {}", b),
        Val::Int(i) => write!(f, "int {}", i),
        Val::Float(x) => write!(f, "float {}", x),
        Val::Str(s) => write!(f, "string {:?}", s),
        Val::Unary { op, child } => write!(f, "unary {} {}", op.as_str(), child),
        Val::Binary { op, lhs, rhs } => write!(f, "binary {} {} {}", op.as_str(), lhs, rhs),
        Val::Ref(id) => write!(f, "ref {}", id),
        Val::If(branch) => write!(f, "if {}", branch.cond),
        Val::Fun(fun) => write!(f, "fun {}", join(&fun.params)),
        Val::App(app) => {
            let kind = if app.indirect { "appcls" } else { "app" };
            write!(f, "{} {}", kind, app.callee)?;
            for arg in &app.args {
                write!(f, " {}", arg)?;
            }
            Ok(())
        }
        Val::Tuple(elems) => write!(f, "tuple {}", join(elems)),
        Val::TplLoad { from, index } => write!(f, "tplload {} {}", index, from),
        Val::Array { size, elem } => write!(f, "array {} {}", size, elem),
        Val::ArrLit(elems) => write!(f, "arrlit {}", join(elems)),
        Val::ArrLoad { from, index } => write!(f, "arrload {} {}", index, from),
        Val::ArrStore { to, index, rhs } => write!(f, "arrstore {} {} {}", index, to, rhs),
        Val::ArrLen(arr) => write!(f, "arrlen {}", arr),
        Val::MakeSome(id) => write!(f, "some {}", id),
        Val::MakeNone => write!(f, "none"),
        Val::IsSome(id) => write!(f, "issome {}", id),
        Val::DerefSome(id) => write!(f, "derefsome {}", id),
        Val::XRef(name) => write!(f, "xref {}", name),
        Val::ExtCall { callee, args } => {
            write!(f, "appx {}", callee)?;
            for arg in args {
                write!(f, " {}", arg)?;
            }
            Ok(())
        }
        Val::MakeCls(make) => write!(f, "makecls ({}) {}", join(&make.captures), make.fun),
    }
}

fn write_block(f: &mut impl Write, ir: &Ir, blk: BlockId, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    for (_, insn) in ir.iter(blk) {
        write!(f, "{}{} = ", indent, insn.ident)?;
        write_val(f, &insn.val)?;
        writeln!(f)?;
        match &insn.val {
            Val::Fun(fun) => write_block(f, ir, fun.body, depth + 1)?,
            Val::If(branch) => {
                writeln!(f, "{}  then:", indent)?;
                write_block(f, ir, branch.then, depth + 2)?;
                writeln!(f, "{}  else:", indent)?;
                write_block(f, ir, branch.otherwise, depth + 2)?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Display adapter for one block of an arena
pub struct BlockDump<'a> {
    ir: &'a Ir,
    blk: BlockId,
}

impl Ir {
    pub fn dump(&self, blk: BlockId) -> BlockDump<'_> {
        BlockDump { ir: self, blk }
    }
}

impl Display for BlockDump<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_block(f, self.ir, self.blk, 0)
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "[closures]")?;
        for (name, captures) in &self.closures {
            writeln!(f, "{} ({})", name, join(captures))?;
        }
        writeln!(f)?;
        writeln!(f, "[functions]")?;
        for (name, fun) in &self.toplevel {
            writeln!(f, "{} = fun {}", name, join(&fun.params))?;
            write_block(f, &self.ir, fun.body, 1)?;
        }
        writeln!(f)?;
        writeln!(f, "[entry]")?;
        write_block(f, &self.ir, self.entry(), 0)
    }
}
