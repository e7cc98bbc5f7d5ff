//! Closure conversion pass
//!
//! Moves every function literal to the top level of the program. A function
//! without free variables becomes a plain symbol called directly (a "known"
//! function). A function with free variables becomes a closure: its
//! definition point turns into a `makecls` instruction carrying the captured
//! names, and calls through it become indirect.
//!
//! Whether a function is known cannot be decided before its body is
//! analyzed, because a recursive call to a known function is a direct jump
//! while a call to a closure reads the closure as a value. So the pass:
//! 1. Assumes the function is known and classifies its body on a duplicate
//!    of the current state
//! 2. Checks the body has no free variables under that assumption
//! 3. Otherwise drops the duplicate, classifies the body again without the
//!    assumption and records the captured names
//! 4. Classifies the rest of the enclosing block
//! 5. Keeps a `makecls` at the definition point if the function is used as
//!    a value later in its scope, or removes the definition otherwise
//!
//! Consecutive function literals (a `let rec ... and ...` group) are
//! assumed known together and retried with the failing members dropped
//! until the assumption holds for all remaining ones.

use crate::error::ClosureError;
use crate::free_vars::{self, KnownFunctions, NameSet};
use ocelot_ir::{BlockId, Fun, Ident, InsnId, Ir, MakeCls, Program, Val};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::rc::Rc;

/// Options of the closure conversion pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Try to compile capture-free functions as direct-call symbols. When
    /// disabled every function becomes a closure.
    pub known_function_optimization: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            known_function_optimization: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunKind {
    Known,
    Closure,
}

/// What happens to a function literal instruction on rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialize {
    /// Unlink the definition; the function only lives in the top-level table
    Remove,
    /// Replace the definition with closure construction over these names
    MakeClosure(Vec<Ident>),
}

/// Final fate of one function literal
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub name: Ident,
    pub fun: Fun,
    pub kind: FunKind,
    pub action: Materialize,
}

/// Classification state. Cloned for every hypothesis; capture lists are
/// shared between clones since entries are only ever added.
#[derive(Debug, Clone, Default)]
struct State {
    known: HashSet<Ident>,
    closure_calls: BTreeSet<InsnId>,
    closures: BTreeMap<Ident, Rc<[Ident]>>,
    /// Free variables from each function's definition to the end of its block
    block_free_vars: HashMap<Ident, Rc<NameSet>>,
    decisions: BTreeMap<InsnId, Decision>,
}

impl KnownFunctions for State {
    fn is_known(&self, name: &str) -> bool {
        self.known.contains(name)
    }
}

#[derive(Debug, Clone)]
struct Member {
    insn: InsnId,
    name: Ident,
    fun: Fun,
}

struct Explorer<'ir> {
    ir: &'ir Ir,
    options: ConvertOptions,
    /// Function bodies currently being explored, innermost last
    active: Vec<(Ident, BlockId)>,
}

impl<'ir> Explorer<'ir> {
    fn explore_block(&mut self, blk: BlockId, state: &mut State) -> Result<(), ClosureError> {
        let ir = self.ir;
        let mut groups: Vec<Vec<Member>> = Vec::new();
        let mut cursor = ir.first(blk);

        while !ir.is_end(cursor) {
            let insn = ir.insn(cursor);
            match &insn.val {
                Val::Fun(_) => {
                    let (group, after) = self.rec_group(cursor);
                    self.classify_group(&group, state)?;
                    groups.push(group);
                    cursor = after;
                    continue;
                }
                Val::App(app) => {
                    if !state.known.contains(&app.callee) {
                        log::trace!("'{}' calls closure '{}'", insn.ident, app.callee);
                        state.closure_calls.insert(cursor);
                    }
                }
                Val::If(branch) => {
                    self.explore_block(branch.then, state)?;
                    self.explore_block(branch.otherwise, state)?;
                }
                _ => {}
            }
            cursor = match ir.next(cursor) {
                Some(next) => next,
                None => break,
            };
        }

        // The rest of the block is classified now, so uses of each function
        // as a value can be decided.
        for group in &groups {
            self.materialize_group(group, state)?;
        }
        Ok(())
    }

    /// Collect the recursive group starting at `start`. Returns its members
    /// and the first record after it.
    fn rec_group(&self, start: InsnId) -> (Vec<Member>, InsnId) {
        let mut after = start;
        let group = free_vars::rec_group(self.ir, start)
            .filter_map(|(insn, record)| {
                after = self.ir.next(insn).unwrap_or(insn);
                match &record.val {
                    Val::Fun(fun) => Some(Member {
                        insn,
                        name: record.ident.clone(),
                        fun: fun.clone(),
                    }),
                    _ => None,
                }
            })
            .collect();
        (group, after)
    }

    fn classify_group(&mut self, group: &[Member], state: &mut State) -> Result<(), ClosureError> {
        let mut candidates: Vec<&Member> = if self.options.known_function_optimization {
            group.iter().collect()
        } else {
            Vec::new()
        };

        let mut committed = loop {
            let mut dup = state.clone();
            dup.known
                .extend(candidates.iter().map(|member| member.name.clone()));

            let mut rejected = Vec::new();
            for member in &candidates {
                log::debug!("assuming '{}' is a known function", member.name);
                self.explore_body(member, &mut dup)?;
                let fv = free_vars::function_free_vars(self.ir, &member.fun, &dup)?;
                if !fv.is_empty() {
                    log::debug!(
                        "'{}' has free variables [{}], backtracking",
                        member.name,
                        fv.as_slice().join(", ")
                    );
                    rejected.push(member.name.clone());
                }
            }

            if rejected.is_empty() {
                break dup;
            }
            candidates.retain(|member| !rejected.contains(&member.name));
        };

        for member in group {
            if committed.known.contains(&member.name) {
                continue;
            }
            self.explore_body(member, &mut committed)?;
            let mut fv = free_vars::function_free_vars(self.ir, &member.fun, &committed)?;
            // A closure reaches itself through its own record
            fv.remove(&member.name);
            log::debug!(
                "'{}' is a closure capturing [{}]",
                member.name,
                fv.as_slice().join(", ")
            );
            committed
                .closures
                .insert(member.name.clone(), Rc::from(fv.into_vec()));
        }

        *state = committed;
        Ok(())
    }

    fn explore_body(&mut self, member: &Member, state: &mut State) -> Result<(), ClosureError> {
        let body = member.fun.body;
        if self.active.iter().any(|(_, blk)| *blk == body) {
            return Err(ClosureError::CyclicBody {
                ident: member.name.clone(),
                block: body,
            });
        }
        self.active.push((member.name.clone(), body));
        self.explore_block(body, state)?;
        self.active.pop();
        Ok(())
    }

    fn materialize_group(&self, group: &[Member], state: &mut State) -> Result<(), ClosureError> {
        for (i, member) in group.iter().enumerate() {
            let mut fv = match self.ir.next(member.insn) {
                Some(next) => free_vars::free_vars_from(self.ir, next, state)?,
                None => NameSet::new(),
            };
            // Earlier members of the group may refer to this one too
            for earlier in &group[..i] {
                let earlier_fv = free_vars::function_free_vars(self.ir, &earlier.fun, state)?;
                if earlier_fv.contains(&member.name) {
                    fv.insert(&member.name);
                }
            }

            let kind = if state.known.contains(&member.name) {
                FunKind::Known
            } else {
                FunKind::Closure
            };
            let action = if fv.contains(&member.name) {
                // A function passed around as a value needs a closure record
                // even when it captures nothing: callers cannot tell.
                let captures = state
                    .closures
                    .entry(member.name.clone())
                    .or_insert_with(|| Rc::from(Vec::new()));
                Materialize::MakeClosure(captures.to_vec())
            } else {
                Materialize::Remove
            };
            log::debug!("'{}' is {:?}, {:?}", member.name, kind, action);

            state
                .block_free_vars
                .insert(member.name.clone(), Rc::new(fv));
            state.decisions.insert(
                member.insn,
                Decision {
                    name: member.name.clone(),
                    fun: member.fun.clone(),
                    kind,
                    action,
                },
            );
        }
        Ok(())
    }
}

/// Committed classification of a whole program
#[derive(Debug, Clone)]
pub struct Classification {
    state: State,
}

impl Classification {
    pub fn known_functions(&self) -> &HashSet<Ident> {
        &self.state.known
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.state.known.contains(name)
    }

    /// Capture list of a function that needs a closure record
    pub fn captures(&self, name: &str) -> Option<&[Ident]> {
        self.state.closures.get(name).map(|captures| &captures[..])
    }

    pub fn decisions(&self) -> impl Iterator<Item = (InsnId, &Decision)> {
        self.state.decisions.iter().map(|(insn, d)| (*insn, d))
    }

    pub fn decision(&self, name: &str) -> Option<&Decision> {
        self.state.decisions.values().find(|d| d.name == name)
    }

    pub fn kind(&self, name: &str) -> Option<FunKind> {
        self.decision(name).map(|d| d.kind)
    }

    /// Applications recorded as calls through a closure
    pub fn closure_calls(&self) -> impl Iterator<Item = InsnId> + '_ {
        self.state.closure_calls.iter().copied()
    }

    /// Free variables seen from a function's definition to the end of its
    /// enclosing block
    pub fn suffix_free_vars(&self, name: &str) -> Option<&NameSet> {
        self.state.block_free_vars.get(name).map(|fv| fv.as_ref())
    }

    /// Apply the decisions to `ir` and assemble the program. Rewriting an
    /// already rewritten arena with the same classification yields the same
    /// program.
    pub fn rewrite(&self, mut ir: Ir) -> Result<Program, ClosureError> {
        for &insn in &self.state.closure_calls {
            if !ir.mark_indirect(insn) {
                let record = ir.insn(insn);
                return Err(ClosureError::NotAnApplication {
                    insn,
                    ident: record.ident.clone(),
                    found: record.val.kind_name(),
                });
            }
        }

        let mut toplevel = BTreeMap::new();
        for (&insn, decision) in &self.state.decisions {
            match &ir.insn(insn).val {
                Val::Fun(_) => {}
                Val::MakeCls(make) if make.fun == decision.name => {}
                other => {
                    return Err(ClosureError::NotAFunction {
                        insn,
                        ident: decision.name.clone(),
                        found: other.kind_name(),
                    })
                }
            }
            toplevel.insert(decision.name.clone(), decision.fun.clone());

            match &decision.action {
                Materialize::Remove => {
                    ir.detach(insn);
                }
                Materialize::MakeClosure(captures) => {
                    ir.replace_val(
                        insn,
                        Val::MakeCls(MakeCls {
                            captures: captures.clone(),
                            fun: decision.name.clone(),
                        }),
                    );
                }
            }
        }

        let closures = self
            .state
            .closures
            .iter()
            .map(|(name, captures)| (name.clone(), captures.to_vec()))
            .collect();

        Ok(Program {
            toplevel,
            closures,
            ir,
        })
    }
}

/// Classify every function literal of `ir` without modifying it.
pub fn classify(ir: &Ir, options: ConvertOptions) -> Result<Classification, ClosureError> {
    let mut explorer = Explorer {
        ir,
        options,
        active: Vec::new(),
    };
    let mut state = State::default();
    explorer.explore_block(ir.entry(), &mut state)?;

    if let Some((ident, _)) = explorer.active.last() {
        return Err(ClosureError::UnfinishedExploration {
            ident: ident.clone(),
            open: explorer.active.len(),
        });
    }

    log::info!(
        "classified {} function(s): {} known, {} closure record(s), {} closure call(s)",
        state.decisions.len(),
        state.known.len(),
        state.closures.len(),
        state.closure_calls.len()
    );
    Ok(Classification { state })
}

/// Run closure conversion over a whole program.
pub fn convert_closures(ir: Ir, options: ConvertOptions) -> Result<Program, ClosureError> {
    let classification = classify(&ir, options)?;
    classification.rewrite(ir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocelot_ir::{BinaryOp, IrBuilder, TreeBlock};

    fn app_at(program: &Program, insn: InsnId) -> &ocelot_ir::App {
        match &program.ir.insn(insn).val {
            Val::App(app) => app,
            other => panic!("expected app, got {:?}", other),
        }
    }

    fn entry_idents(program: &Program) -> Vec<String> {
        program
            .ir
            .iter(program.entry())
            .map(|(_, insn)| insn.ident.clone())
            .collect()
    }

    #[test]
    fn test_nested_closure_inside_known_function() {
        // f x = let g y = x + y in g x
        let mut b = IrBuilder::new();
        let entry = b.entry();
        let mut call = 0;
        b.fun(entry, "f", &["x"], |b, body| {
            b.fun(body, "g", &["y"], |b, gb| {
                b.binary(gb, "s", BinaryOp::Add, "x", "y");
            });
            call = b.app(body, "r", "g", &["x"]);
        });
        let ir = b.finish();

        let classification = classify(&ir, ConvertOptions::default()).unwrap();
        assert_eq!(classification.kind("g"), Some(FunKind::Closure));
        assert_eq!(classification.kind("f"), Some(FunKind::Known));
        assert_eq!(classification.captures("g"), Some(&["x".to_string()][..]));
        assert_eq!(classification.captures("f"), None);

        let program = classification.rewrite(ir).unwrap();
        assert!(app_at(&program, call).indirect);
        assert_eq!(program.closures.get("g"), Some(&vec!["x".to_string()]));
        assert!(!program.is_closure("f"));
        assert!(program.toplevel.contains_key("f"));
        assert!(program.toplevel.contains_key("g"));

        // `f` is never used as a value, so its definition is gone
        assert!(entry_idents(&program).is_empty());

        // `g` is called indirectly, so its definition builds the closure
        let f_body = program.toplevel["f"].body;
        let (_, first) = program.ir.iter(f_body).next().unwrap();
        assert_eq!(
            first.val,
            Val::MakeCls(MakeCls {
                captures: vec!["x".to_string()],
                fun: "g".to_string(),
            })
        );
    }

    #[test]
    fn test_mutual_recursion_stays_known() {
        // let rec even n = if n = 0 then true else odd (n - 1)
        // and odd n = if n = 0 then false else even (n - 1)
        let mut b = IrBuilder::new();
        let entry = b.entry();
        let mut calls = Vec::new();
        for (name, other, result) in [("even", "odd", true), ("odd", "even", false)] {
            b.fun(entry, name, &["n"], |b, body| {
                b.int(body, &format!("{}_zero", name), 0);
                b.binary(
                    body,
                    &format!("{}_c", name),
                    BinaryOp::Eq,
                    "n",
                    &format!("{}_zero", name),
                );
                b.branch(
                    body,
                    &format!("{}_r", name),
                    &format!("{}_c", name),
                    |b, then| {
                        b.bool(then, &format!("{}_t", name), result);
                    },
                    |b, otherwise| {
                        b.int(otherwise, &format!("{}_one", name), 1);
                        b.binary(
                            otherwise,
                            &format!("{}_m", name),
                            BinaryOp::Sub,
                            "n",
                            &format!("{}_one", name),
                        );
                        calls.push(b.app(
                            otherwise,
                            &format!("{}_rec", name),
                            other,
                            &[&format!("{}_m", name)],
                        ));
                    },
                );
            });
        }
        b.int(entry, "ten", 10);
        let top_call = b.app(entry, "res", "even", &["ten"]);
        let ir = b.finish();

        let program = convert_closures(ir, ConvertOptions::default()).unwrap();
        assert!(program.closures.is_empty());
        for call in calls.iter().chain(std::iter::once(&top_call)) {
            assert!(!app_at(&program, *call).indirect);
        }
        assert_eq!(entry_idents(&program), vec!["ten", "res"]);
    }

    #[test]
    fn test_self_recursion_is_known() {
        // let rec fact n = if n = 0 then 1 else n * fact (n - 1)
        let mut b = IrBuilder::new();
        let entry = b.entry();
        let mut rec_call = 0;
        b.fun(entry, "fact", &["n"], |b, body| {
            b.int(body, "zero", 0);
            b.binary(body, "c", BinaryOp::Eq, "n", "zero");
            b.branch(
                body,
                "r",
                "c",
                |b, then| {
                    b.int(then, "one", 1);
                },
                |b, otherwise| {
                    b.int(otherwise, "one2", 1);
                    b.binary(otherwise, "m", BinaryOp::Sub, "n", "one2");
                    rec_call = b.app(otherwise, "k", "fact", &["m"]);
                    b.binary(otherwise, "p", BinaryOp::Mul, "n", "k");
                },
            );
        });
        let ir = b.finish();

        let classification = classify(&ir, ConvertOptions::default()).unwrap();
        assert_eq!(classification.kind("fact"), Some(FunKind::Known));
        let program = classification.rewrite(ir).unwrap();
        assert!(!app_at(&program, rec_call).indirect);
        assert!(program.closures.is_empty());
    }

    #[test]
    fn test_recursive_closure_does_not_capture_itself() {
        // let k = 1 in let rec loop n = loop (n + k)
        let mut b = IrBuilder::new();
        let entry = b.entry();
        b.int(entry, "k", 1);
        let mut rec_call = 0;
        b.fun(entry, "loop", &["n"], |b, body| {
            b.binary(body, "m", BinaryOp::Add, "n", "k");
            rec_call = b.app(body, "r", "loop", &["m"]);
        });
        let ir = b.finish();

        let classification = classify(&ir, ConvertOptions::default()).unwrap();
        assert_eq!(classification.kind("loop"), Some(FunKind::Closure));
        assert_eq!(classification.captures("loop"), Some(&["k".to_string()][..]));
        let program = classification.rewrite(ir).unwrap();
        assert!(app_at(&program, rec_call).indirect);
    }

    #[test]
    fn test_value_escape_gets_empty_closure() {
        // let id x = x in (id, id 1)
        let mut b = IrBuilder::new();
        let entry = b.entry();
        let def = b.fun(entry, "id", &["x"], |b, body| {
            b.var(body, "r", "x");
        });
        b.int(entry, "one", 1);
        let call = b.app(entry, "a", "id", &["one"]);
        b.tuple(entry, "t", &["id", "a"]);
        let ir = b.finish();

        let classification = classify(&ir, ConvertOptions::default()).unwrap();
        assert_eq!(classification.kind("id"), Some(FunKind::Known));
        let program = classification.rewrite(ir).unwrap();

        assert_eq!(program.closures.get("id"), Some(&Vec::new()));
        assert_eq!(
            program.ir.insn(def).val,
            Val::MakeCls(MakeCls {
                captures: Vec::new(),
                fun: "id".to_string(),
            })
        );
        // Still a direct call: `id` is known
        assert!(!app_at(&program, call).indirect);
        assert_eq!(entry_idents(&program), vec!["id", "one", "a", "t"]);
    }

    #[test]
    fn test_passing_known_function_makes_caller_capture_it() {
        // let inc x = x + 1 in let apply y = twice inc y
        let mut b = IrBuilder::new();
        let entry = b.entry();
        b.fun(entry, "inc", &["x"], |b, body| {
            b.int(body, "one", 1);
            b.binary(body, "r", BinaryOp::Add, "x", "one");
        });
        b.int(entry, "sep", 0);
        b.fun(entry, "apply", &["y"], |b, body| {
            b.ext_call(body, "r2", "twice", &["inc", "y"]);
        });
        let ir = b.finish();

        let classification = classify(&ir, ConvertOptions::default()).unwrap();
        assert_eq!(classification.kind("inc"), Some(FunKind::Known));
        assert_eq!(classification.kind("apply"), Some(FunKind::Closure));
        assert_eq!(classification.captures("apply"), Some(&["inc".to_string()][..]));
        let escape = classification.suffix_free_vars("inc").unwrap();
        assert!(escape.contains("inc"));
    }

    #[test]
    fn test_closure_call_from_sibling_group_member() {
        // let rec f x = g x and g y = y + z   (z from outer scope)
        let mut b = IrBuilder::new();
        let entry = b.entry();
        b.int(entry, "z", 3);
        let mut call = 0;
        b.fun(entry, "f", &["x"], |b, body| {
            call = b.app(body, "r", "g", &["x"]);
        });
        b.fun(entry, "g", &["y"], |b, body| {
            b.binary(body, "s", BinaryOp::Add, "y", "z");
        });
        let ir = b.finish();

        let classification = classify(&ir, ConvertOptions::default()).unwrap();
        assert_eq!(classification.kind("g"), Some(FunKind::Closure));
        // `f` calls a closure, so it must capture it
        assert_eq!(classification.kind("f"), Some(FunKind::Closure));
        assert_eq!(classification.captures("f"), Some(&["g".to_string()][..]));
        assert_eq!(classification.captures("g"), Some(&["z".to_string()][..]));

        // `g` is read by its earlier sibling, so it needs a closure record
        let g = classification.decision("g").unwrap();
        assert_eq!(g.action, Materialize::MakeClosure(vec!["z".to_string()]));
        let f = classification.decision("f").unwrap();
        assert_eq!(f.action, Materialize::Remove);

        let program = classification.rewrite(ir).unwrap();
        assert!(app_at(&program, call).indirect);
    }

    /// A closure construction may only read a name bound later in its block
    /// when that name belongs to the same run of closure constructions.
    fn assert_captures_bound_or_grouped(program: &Program, blk: BlockId) {
        let records: Vec<_> = program.ir.iter(blk).collect();
        for (pos, (_, insn)) in records.iter().enumerate() {
            let Val::MakeCls(make) = &insn.val else {
                continue;
            };
            for capture in &make.captures {
                let Some(def) = records.iter().position(|(_, r)| &r.ident == capture) else {
                    continue;
                };
                if def > pos {
                    assert!(
                        records[pos..=def]
                            .iter()
                            .all(|(_, r)| matches!(r.val, Val::MakeCls(_))),
                        "'{}' captures '{}' ahead of its binding outside its group",
                        insn.ident,
                        capture
                    );
                }
            }
        }
    }

    #[test]
    fn test_nested_group_keeps_enclosing_function_known() {
        // outer x = let rec f a = g a and g b = b + x in f x
        let mut b = IrBuilder::new();
        let entry = b.entry();
        let mut call = 0;
        b.fun(entry, "outer", &["x"], |b, body| {
            b.fun(body, "f", &["a"], |b, fb| {
                b.app(fb, "r", "g", &["a"]);
            });
            b.fun(body, "g", &["b"], |b, gb| {
                b.binary(gb, "s", BinaryOp::Add, "b", "x");
            });
            call = b.app(body, "res", "f", &["x"]);
        });
        let ir = b.finish();

        let classification = classify(&ir, ConvertOptions::default()).unwrap();
        assert_eq!(classification.kind("outer"), Some(FunKind::Known));
        assert_eq!(classification.captures("outer"), None);
        assert_eq!(classification.kind("f"), Some(FunKind::Closure));
        assert_eq!(classification.kind("g"), Some(FunKind::Closure));
        assert_eq!(classification.captures("f"), Some(&["g".to_string()][..]));
        assert_eq!(classification.captures("g"), Some(&["x".to_string()][..]));

        let program = classification.rewrite(ir.clone()).unwrap();
        assert!(app_at(&program, call).indirect);
        assert!(entry_idents(&program).is_empty());
        let body = program.toplevel["outer"].body;
        assert_eq!(
            program.ir.dump(body).to_string(),
            "f = makecls (g) f\ng = makecls (x) g\nres = appcls f x\n"
        );
        assert_captures_bound_or_grouped(&program, body);

        let violations = crate::verify::verify(&ir, &classification, &program).unwrap();
        assert!(violations.is_empty(), "{:?}", violations);
    }

    #[test]
    fn test_group_member_captures_sibling_value() {
        // let rec f a = (g, a) and g b = b in f 1
        let mut b = IrBuilder::new();
        let entry = b.entry();
        b.fun(entry, "f", &["a"], |b, body| {
            b.tuple(body, "t", &["g", "a"]);
        });
        b.fun(entry, "g", &["b"], |b, body| {
            b.var(body, "r", "b");
        });
        b.int(entry, "one", 1);
        b.app(entry, "res", "f", &["one"]);
        let ir = b.finish();

        let classification = classify(&ir, ConvertOptions::default()).unwrap();
        assert_eq!(classification.kind("g"), Some(FunKind::Known));
        assert_eq!(classification.kind("f"), Some(FunKind::Closure));
        assert_eq!(classification.captures("f"), Some(&["g".to_string()][..]));

        let program = classification.rewrite(ir).unwrap();
        assert_eq!(program.closures.get("g"), Some(&Vec::new()));
        assert_eq!(
            program.ir.dump(program.entry()).to_string(),
            "f = makecls (g) f\ng = makecls () g\none = int 1\nres = appcls f one\n"
        );
        assert_captures_bound_or_grouped(&program, program.entry());
    }

    #[test]
    fn test_functions_in_branches() {
        let mut b = IrBuilder::new();
        let entry = b.entry();
        b.int(entry, "base", 5);
        b.bool(entry, "c", true);
        b.branch(
            entry,
            "r",
            "c",
            |b, then| {
                b.fun(then, "add_base", &["v"], |b, body| {
                    b.binary(body, "s", BinaryOp::Add, "v", "base");
                });
                b.app(then, "t", "add_base", &["base"]);
            },
            |b, otherwise| {
                b.fun(otherwise, "double", &["v"], |b, body| {
                    b.binary(body, "d", BinaryOp::Add, "v", "v");
                });
                b.app(otherwise, "e", "double", &["base"]);
            },
        );
        let ir = b.finish();

        let classification = classify(&ir, ConvertOptions::default()).unwrap();
        assert_eq!(classification.kind("add_base"), Some(FunKind::Closure));
        assert_eq!(classification.kind("double"), Some(FunKind::Known));
        assert_eq!(
            classification.decision("add_base").unwrap().action,
            Materialize::MakeClosure(vec!["base".to_string()])
        );
        assert_eq!(
            classification.decision("double").unwrap().action,
            Materialize::Remove
        );
    }

    #[test]
    fn test_without_known_function_optimization() {
        let mut b = IrBuilder::new();
        let entry = b.entry();
        let mut rec_call = 0;
        b.fun(entry, "f", &["n"], |b, body| {
            rec_call = b.app(body, "r", "f", &["n"]);
        });
        b.int(entry, "one", 1);
        let call = b.app(entry, "x", "f", &["one"]);
        let ir = b.finish();

        let options = ConvertOptions {
            known_function_optimization: false,
        };
        let classification = classify(&ir, options).unwrap();
        assert_eq!(classification.kind("f"), Some(FunKind::Closure));
        assert_eq!(classification.captures("f"), Some(&[][..]));
        let program = classification.rewrite(ir).unwrap();
        assert!(app_at(&program, rec_call).indirect);
        assert!(app_at(&program, call).indirect);
        assert_eq!(entry_idents(&program), vec!["f", "one", "x"]);
    }

    #[test]
    fn test_capture_order_is_first_use() {
        let mut b = IrBuilder::new();
        let entry = b.entry();
        b.fun(entry, "outer", &["a", "b", "c"], |b, body| {
            b.fun(body, "inner", &[], |b, ib| {
                b.binary(ib, "x", BinaryOp::Add, "c", "a");
                b.binary(ib, "y", BinaryOp::Add, "b", "c");
            });
            b.app(body, "r", "inner", &[]);
        });
        let ir = b.finish();

        let classification = classify(&ir, ConvertOptions::default()).unwrap();
        assert_eq!(
            classification.captures("inner").unwrap(),
            &["c".to_string(), "a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let tree: TreeBlock = serde_json::from_value(serde_json::json!([
            {"ident": "x", "val": {"int": 1}},
            {"ident": "f", "val": {"fun": {"params": ["y"], "body": [
                {"ident": "g", "val": {"fun": {"params": ["z"], "body": [
                    {"ident": "s", "val": {"binary": {"op": "add", "lhs": "z", "rhs": "y"}}}
                ]}}},
                {"ident": "r", "val": {"app": {"callee": "g", "args": ["y"]}}}
            ]}}},
            {"ident": "h", "val": {"fun": {"params": [], "body": [
                {"ident": "u", "val": "unit"}
            ]}}},
            {"ident": "res", "val": {"app": {"callee": "f", "args": ["x"]}}},
            {"ident": "hv", "val": {"tuple": ["h", "res"]}}
        ]))
        .unwrap();
        let ir = ocelot_ir::Ir::from_tree(tree);

        let classification = classify(&ir, ConvertOptions::default()).unwrap();
        let once = classification.rewrite(ir).unwrap();
        let twice = classification.rewrite(once.ir.clone()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(entry_idents(&once), vec!["x", "h", "res", "hv"]);
    }

    #[test]
    fn test_rewrite_rejects_non_function_decision() {
        let mut b = IrBuilder::new();
        let entry = b.entry();
        let f = b.fun(entry, "f", &[], |b, body| {
            b.unit(body, "u");
        });
        let mut ir = b.finish();

        let classification = classify(&ir, ConvertOptions::default()).unwrap();
        ir.replace_val(f, Val::Int(0));
        let err = classification.rewrite(ir).unwrap_err();
        assert_eq!(
            err,
            ClosureError::NotAFunction {
                insn: f,
                ident: "f".to_string(),
                found: "int",
            }
        );
    }

    #[test]
    fn test_rewrite_rejects_non_application_call() {
        let mut b = IrBuilder::new();
        let entry = b.entry();
        let call = b.app(entry, "r", "unknown", &[]);
        let mut ir = b.finish();

        let classification = classify(&ir, ConvertOptions::default()).unwrap();
        assert_eq!(classification.closure_calls().collect::<Vec<_>>(), vec![call]);
        ir.replace_val(call, Val::Unit);
        let err = classification.rewrite(ir).unwrap_err();
        assert!(matches!(err, ClosureError::NotAnApplication { .. }));
    }

    #[test]
    fn test_cyclic_body_is_rejected() {
        // A function whose body is the block it is defined in
        let mut ir = ocelot_ir::Ir::new();
        let blk = ir.new_block();
        ir.push(
            ir.entry(),
            "outer",
            Val::Fun(Fun {
                params: Vec::new(),
                body: blk,
            }),
        );
        ir.push(
            blk,
            "inner",
            Val::Fun(Fun {
                params: Vec::new(),
                body: blk,
            }),
        );

        let err = classify(&ir, ConvertOptions::default()).unwrap_err();
        assert!(matches!(err, ClosureError::CyclicBody { .. }));
    }
}
