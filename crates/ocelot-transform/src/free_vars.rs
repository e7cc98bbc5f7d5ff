//! Free variable analysis
//!
//! A free variable of a block is an identifier read somewhere in the block
//! (including nested bodies and branches) that is not bound before the read
//! and does not name a known function in call position. Applying a known
//! function compiles to a direct call and needs no captured environment;
//! referring to any function as a value does.

use crate::error::ClosureError;
use ocelot_ir::{BlockId, Fun, Ident, Insn, InsnId, Ir, Val};
use std::collections::HashSet;

/// Something that can tell whether a name is a known (direct-call) function
pub trait KnownFunctions {
    fn is_known(&self, name: &str) -> bool;
}

impl KnownFunctions for HashSet<Ident> {
    fn is_known(&self, name: &str) -> bool {
        self.contains(name)
    }
}

/// Set of names kept in first-insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameSet {
    order: Vec<Ident>,
    index: HashSet<Ident>,
}

impl NameSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the name was already present.
    pub fn insert(&mut self, name: &str) -> bool {
        if self.index.contains(name) {
            return false;
        }
        self.index.insert(name.to_string());
        self.order.push(name.to_string());
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        if !self.index.remove(name) {
            return false;
        }
        self.order.retain(|n| n != name);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ident> {
        self.order.iter()
    }

    pub fn as_slice(&self) -> &[Ident] {
        &self.order
    }

    pub fn into_vec(self) -> Vec<Ident> {
        self.order
    }
}

impl FromIterator<Ident> for NameSet {
    fn from_iter<I: IntoIterator<Item = Ident>>(iter: I) -> Self {
        let mut set = NameSet::new();
        for name in iter {
            set.insert(&name);
        }
        set
    }
}

struct Gatherer<'a, K: KnownFunctions + ?Sized> {
    ir: &'a Ir,
    known: &'a K,
    /// Binding frames; the first one belongs to the walked block itself.
    scopes: Vec<HashSet<Ident>>,
    found: NameSet,
}

impl<'a, K: KnownFunctions + ?Sized> Gatherer<'a, K> {
    fn new(ir: &'a Ir, known: &'a K) -> Self {
        Self {
            ir,
            known,
            scopes: vec![HashSet::new()],
            found: NameSet::new(),
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|frame| frame.contains(name))
    }

    fn read(&mut self, name: &str) {
        if !self.is_bound(name) {
            self.found.insert(name);
        }
    }

    fn bind(&mut self, name: &str) {
        if let Some(frame) = self.scopes.last_mut() {
            frame.insert(name.to_string());
        }
    }

    fn walk_from(&mut self, start: InsnId) {
        let ir = self.ir;
        let mut in_group = false;
        for (id, insn) in ir.iter_from(start) {
            let is_fun = matches!(insn.val, Val::Fun(_));
            if is_fun && !in_group {
                // Members of a recursive group are in scope for each other
                for (_, member) in rec_group(ir, id) {
                    self.bind(&member.ident);
                }
            }
            in_group = is_fun;
            self.visit(insn);
        }
    }

    fn walk_nested(&mut self, frame: HashSet<Ident>, start: InsnId) {
        self.scopes.push(frame);
        self.walk_from(start);
        self.scopes.pop();
    }

    fn visit(&mut self, insn: &Insn) {
        match &insn.val {
            Val::App(app) => {
                if !self.known.is_known(&app.callee) {
                    self.read(&app.callee);
                }
                for arg in &app.args {
                    self.read(arg);
                }
            }
            Val::Fun(fun) => {
                // The body sees its parameters and its own name
                let mut frame: HashSet<Ident> = fun.params.iter().cloned().collect();
                frame.insert(insn.ident.clone());
                self.walk_nested(frame, self.ir.first(fun.body));
            }
            Val::If(branch) => {
                self.read(&branch.cond);
                self.walk_nested(HashSet::new(), self.ir.first(branch.then));
                self.walk_nested(HashSet::new(), self.ir.first(branch.otherwise));
            }
            val => {
                for operand in val.operands() {
                    self.read(operand);
                }
            }
        }
        self.bind(&insn.ident);
    }

    fn finish(self) -> Result<NameSet, ClosureError> {
        if self.scopes.len() != 1 {
            return Err(ClosureError::UnbalancedScope {
                frames: self.scopes.len().saturating_sub(1),
            });
        }
        Ok(self.found)
    }
}

/// The run of consecutive function literals starting at `start`: one
/// `let rec ... and ...` group. Empty if `start` is not a function literal.
pub fn rec_group(ir: &Ir, start: InsnId) -> impl Iterator<Item = (InsnId, &Insn)> {
    ir.iter_from(start)
        .take_while(|(_, insn)| matches!(insn.val, Val::Fun(_)))
}

/// Free variables of the block starting at `start`, walked to its end.
pub fn free_vars_from<K: KnownFunctions + ?Sized>(
    ir: &Ir,
    start: InsnId,
    known: &K,
) -> Result<NameSet, ClosureError> {
    let mut gatherer = Gatherer::new(ir, known);
    gatherer.walk_from(start);
    gatherer.finish()
}

/// Free variables of a whole block.
pub fn free_vars<K: KnownFunctions + ?Sized>(
    ir: &Ir,
    blk: BlockId,
    known: &K,
) -> Result<NameSet, ClosureError> {
    free_vars_from(ir, ir.first(blk), known)
}

/// Free variables of a function body minus its parameters. The function's
/// own name is kept: a body using itself as a value does capture it.
pub fn function_free_vars<K: KnownFunctions + ?Sized>(
    ir: &Ir,
    fun: &Fun,
    known: &K,
) -> Result<NameSet, ClosureError> {
    let mut fv = free_vars(ir, fun.body, known)?;
    for param in &fun.params {
        fv.remove(param);
    }
    Ok(fv)
}

/// Every identifier read anywhere in a block, bound or not
pub fn reads(ir: &Ir, blk: BlockId) -> NameSet {
    let mut set = NameSet::new();
    collect_reads(ir, blk, &mut set);
    set
}

fn collect_reads(ir: &Ir, blk: BlockId, set: &mut NameSet) {
    for (_, insn) in ir.iter(blk) {
        for operand in insn.val.operands() {
            set.insert(operand);
        }
        match &insn.val {
            Val::Fun(fun) => collect_reads(ir, fun.body, set),
            Val::If(branch) => {
                collect_reads(ir, branch.then, set);
                collect_reads(ir, branch.otherwise, set);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocelot_ir::{BinaryOp, IrBuilder};

    fn none() -> HashSet<Ident> {
        HashSet::new()
    }

    fn known(names: &[&str]) -> HashSet<Ident> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_name_set_keeps_first_order() {
        let mut set = NameSet::new();
        assert!(set.insert("b"));
        assert!(set.insert("a"));
        assert!(!set.insert("b"));
        assert_eq!(set.as_slice(), &["b".to_string(), "a".to_string()]);
        assert!(set.remove("b"));
        assert!(!set.contains("b"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_locally_bound_names_are_not_free() {
        let mut b = IrBuilder::new();
        let entry = b.entry();
        b.int(entry, "one", 1);
        b.binary(entry, "r", BinaryOp::Add, "one", "outer");
        let ir = b.finish();

        let fv = free_vars(&ir, entry, &none()).unwrap();
        assert_eq!(fv.into_vec(), vec!["outer"]);
    }

    #[test]
    fn test_known_callee_is_erased_but_value_use_is_not() {
        let mut b = IrBuilder::new();
        let entry = b.entry();
        b.app(entry, "r", "f", &["a"]);
        b.tuple(entry, "t", &["f", "r"]);
        let ir = b.finish();

        // Call erased, but the tuple reads `f` as a value
        let fv = free_vars(&ir, entry, &known(&["f"])).unwrap();
        assert_eq!(fv.into_vec(), vec!["a", "f"]);

        let mut b = IrBuilder::new();
        let entry = b.entry();
        b.app(entry, "r", "f", &["a"]);
        let ir = b.finish();
        assert_eq!(
            free_vars(&ir, entry, &known(&["f"])).unwrap().into_vec(),
            vec!["a"]
        );
        assert_eq!(
            free_vars(&ir, entry, &none()).unwrap().into_vec(),
            vec!["f", "a"]
        );
    }

    #[test]
    fn test_nested_function_hides_params_and_own_name() {
        let mut b = IrBuilder::new();
        let entry = b.entry();
        b.fun(entry, "g", &["y"], |b, body| {
            b.binary(body, "s", BinaryOp::Add, "x", "y");
            b.app(body, "rec", "g", &["s"]);
        });
        let ir = b.finish();

        let fv = free_vars(&ir, entry, &none()).unwrap();
        assert_eq!(fv.into_vec(), vec!["x"]);
    }

    #[test]
    fn test_branch_bindings_do_not_leak() {
        let mut b = IrBuilder::new();
        let entry = b.entry();
        b.branch(
            entry,
            "r",
            "c",
            |b, then| {
                b.int(then, "a", 1);
            },
            |b, otherwise| {
                b.var(otherwise, "e", "a");
            },
        );
        let ir = b.finish();

        // `a` bound in the then-branch is free in the else-branch
        let fv = free_vars(&ir, entry, &none()).unwrap();
        assert_eq!(fv.into_vec(), vec!["c", "a"]);
    }

    #[test]
    fn test_external_symbols_are_never_free() {
        let mut b = IrBuilder::new();
        let entry = b.entry();
        b.xref(entry, "p", "print_int");
        b.ext_call(entry, "r", "print_int", &["n"]);
        let ir = b.finish();

        let fv = free_vars(&ir, entry, &none()).unwrap();
        assert_eq!(fv.into_vec(), vec!["n"]);
    }

    #[test]
    fn test_free_vars_from_point_sees_only_suffix() {
        let mut b = IrBuilder::new();
        let entry = b.entry();
        b.var(entry, "a", "f");
        let g = b.fun(entry, "g", &[], |_, _| {});
        let after = b.var(entry, "c", "h");
        b.var(entry, "d", "g");
        let ir = b.finish();

        assert_eq!(
            free_vars_from(&ir, after, &none()).unwrap().into_vec(),
            vec!["h", "g"]
        );
        // Starting at `g` binds it before the later use
        assert_eq!(
            free_vars_from(&ir, g, &none()).unwrap().into_vec(),
            vec!["h"]
        );
    }

    #[test]
    fn test_function_free_vars_removes_params() {
        let mut b = IrBuilder::new();
        let entry = b.entry();
        let f = b.fun(entry, "f", &["x"], |b, body| {
            b.binary(body, "r", BinaryOp::Mul, "x", "k");
            b.var(body, "me", "f");
        });
        let ir = b.finish();

        let Val::Fun(fun) = &ir.insn(f).val else {
            panic!("expected function");
        };
        let fv = function_free_vars(&ir, fun, &known(&["f"])).unwrap();
        assert_eq!(fv.into_vec(), vec!["k", "f"]);
    }

    #[test]
    fn test_group_siblings_are_bound_in_enclosing_block() {
        // let rec f a = g a and g b = b + x in f x
        let mut b = IrBuilder::new();
        let entry = b.entry();
        b.fun(entry, "f", &["a"], |b, body| {
            b.app(body, "r", "g", &["a"]);
        });
        b.fun(entry, "g", &["b"], |b, body| {
            b.binary(body, "s", BinaryOp::Add, "b", "x");
        });
        b.app(entry, "res", "f", &["x"]);
        let ir = b.finish();

        let fv = free_vars(&ir, entry, &none()).unwrap();
        assert_eq!(fv.into_vec(), vec!["x"]);
    }

    #[test]
    fn test_group_ends_at_first_non_function() {
        let mut b = IrBuilder::new();
        let entry = b.entry();
        let f = b.fun(entry, "f", &[], |b, body| {
            b.var(body, "u", "h");
        });
        let g = b.fun(entry, "g", &[], |_, _| {});
        b.int(entry, "sep", 0);
        b.fun(entry, "h", &[], |_, _| {});
        let ir = b.finish();

        let ids: Vec<_> = rec_group(&ir, f).map(|(id, _)| id).collect();
        assert_eq!(ids, vec![f, g]);
        // `h` is defined after the group, so `f` reads it before its binding
        assert_eq!(free_vars(&ir, entry, &none()).unwrap().into_vec(), vec!["h"]);
    }

    #[test]
    fn test_reads_descends_into_bodies() {
        let mut b = IrBuilder::new();
        let entry = b.entry();
        b.fun(entry, "f", &["x"], |b, body| {
            b.var(body, "y", "x");
        });
        b.app(entry, "r", "f", &["z"]);
        let ir = b.finish();

        let all = reads(&ir, entry);
        assert!(all.contains("x"));
        assert!(all.contains("f"));
        assert!(all.contains("z"));
        assert!(!all.contains("y"));
    }
}
