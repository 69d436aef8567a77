// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, type-graphs authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Structural equivalence of type subgraphs.
//!
//! Two nodes are equivalent if they have the same kind and name, and their payloads are equal,
//! where referenced types are compared recursively.  A forward declaration is also equivalent to
//! a struct or union with the same name.
//!
//! Type graphs are cyclic, so a naive recursive comparison would not terminate.  Instead, each
//! top-level comparison takes a fresh _clear threshold_ from a monotonically increasing mark
//! counter.  Whenever we start comparing a pair of nodes, we give both of them the same new mark;
//! if we later reach a node that already carries a mark above the threshold, we're inside a cycle,
//! and the pair is equivalent exactly when both sides carry the same mark.  Marks live in side
//! tables owned by the checker, one per graph, so the graphs themselves are never modified.

use crate::arena::SupplementalArena;
use crate::graph::Kind;
use crate::graph::TypeGraph;
use crate::graph::TypeId;
use crate::graph::TypeKind;
use crate::graph::TypeNode;

/// The mapping from child ids to parent ids that has been built so far.
pub type Mapping = SupplementalArena<TypeNode, Option<TypeId>>;

#[derive(Clone, Copy)]
enum Mode<'a> {
    /// The two sides belong to different graphs.  A child node that has already been mapped to a
    /// parent node is equivalent to it without further comparison.
    Normal {
        parent: &'a TypeGraph,
        mapping: &'a Mapping,
    },
    /// Both sides belong to the child graph, and mappings are ignored.
    SelfUniquify,
}

/// Decides whether two type subgraphs are structurally identical.
#[derive(Default)]
pub struct EquivalenceChecker {
    child_marks: SupplementalArena<TypeNode, u64>,
    parent_marks: SupplementalArena<TypeNode, u64>,
    clear_mark: u64,
    cur_mark: u64,
}

impl EquivalenceChecker {
    pub fn new() -> EquivalenceChecker {
        EquivalenceChecker::default()
    }

    /// Forgets all marks, and continues counting from `start`.
    pub fn reset(&mut self, start: u64) {
        self.child_marks.clear();
        self.parent_marks.clear();
        self.clear_mark = start;
        self.cur_mark = start;
    }

    /// The most recently assigned mark.
    pub fn current_mark(&self) -> u64 {
        self.cur_mark
    }

    /// Returns whether the subgraph rooted at `c` in `child` is equivalent to the subgraph rooted
    /// at `p` in `parent`.
    pub fn equivalent(
        &mut self,
        child: &TypeGraph,
        c: TypeId,
        parent: &TypeGraph,
        p: TypeId,
        mapping: &Mapping,
    ) -> bool {
        self.begin();
        self.compare(Mode::Normal { parent, mapping }, child, c, p)
    }

    /// Returns whether two subgraphs of the same graph are equivalent.
    pub fn self_equivalent(&mut self, graph: &TypeGraph, a: TypeId, b: TypeId) -> bool {
        self.begin();
        self.compare(Mode::SelfUniquify, graph, a, b)
    }

    fn begin(&mut self) {
        self.clear_mark = self.cur_mark + 1;
        self.cur_mark = self.clear_mark + 1;
    }

    fn marks(&self, mode: Mode, c: TypeId, p: TypeId) -> (u64, u64) {
        match mode {
            Mode::Normal { .. } => (self.child_marks[c], self.parent_marks[p]),
            Mode::SelfUniquify => (self.child_marks[c], self.child_marks[p]),
        }
    }

    fn mark(&mut self, mode: Mode, c: TypeId, p: TypeId) {
        self.cur_mark += 1;
        let mark = self.cur_mark;
        self.child_marks[c] = mark;
        match mode {
            Mode::Normal { .. } => self.parent_marks[p] = mark,
            Mode::SelfUniquify => self.child_marks[p] = mark,
        }
    }

    fn compare(&mut self, mode: Mode, child: &TypeGraph, c: TypeId, p: TypeId) -> bool {
        let (child_mark, parent_mark) = self.marks(mode, c, p);
        if child_mark > self.clear_mark || parent_mark > self.clear_mark {
            return child_mark == parent_mark;
        }

        let parent = match mode {
            Mode::Normal { parent, mapping } => {
                if mapping[c] == Some(p) {
                    return true;
                }
                parent
            }
            Mode::SelfUniquify => child,
        };

        let (cn, pn) = match (child.get_type(c), parent.get_type(p)) {
            (Some(cn), Some(pn)) => (cn, pn),
            _ => return false,
        };
        if cn.name != pn.name {
            return false;
        }
        let (ck, pk) = (cn.kind.kind(), pn.kind.kind());
        if ck != pk {
            return (ck == Kind::Forward || pk == Kind::Forward)
                && Kind::AGGREGATES.contains(ck)
                && Kind::AGGREGATES.contains(pk);
        }

        self.mark(mode, c, p);

        match (&cn.kind, &pn.kind) {
            (TypeKind::Intrinsic(a), TypeKind::Intrinsic(b)) => a == b,
            (TypeKind::Pointer(a), TypeKind::Pointer(b))
            | (TypeKind::Typedef(a), TypeKind::Typedef(b))
            | (TypeKind::Volatile(a), TypeKind::Volatile(b))
            | (TypeKind::Const(a), TypeKind::Const(b))
            | (TypeKind::Restrict(a), TypeKind::Restrict(b)) => self.compare(mode, child, *a, *b),
            (TypeKind::PtrAuth(a), TypeKind::PtrAuth(b)) => {
                a.key == b.key
                    && a.discriminator == b.discriminator
                    && a.discriminated == b.discriminated
                    && self.compare(mode, child, a.ty, b.ty)
            }
            (TypeKind::Array(a), TypeKind::Array(b)) => {
                a.count == b.count
                    && self.compare(mode, child, a.contents, b.contents)
                    && self.compare(mode, child, a.index, b.index)
            }
            (TypeKind::Function(a), TypeKind::Function(b)) => {
                if a.args.len() != b.args.len() || a.varargs != b.varargs {
                    return false;
                }
                if !self.compare(mode, child, a.ret, b.ret) {
                    return false;
                }
                a.args
                    .iter()
                    .zip(&b.args)
                    .all(|(a, b)| self.compare(mode, child, *a, *b))
            }
            (TypeKind::Struct(a), TypeKind::Struct(b)) | (TypeKind::Union(a), TypeKind::Union(b)) => {
                if cn.size != pn.size || a.len() != b.len() {
                    return false;
                }
                let mut previous = None;
                for (a, b) in a.iter().zip(b) {
                    if a.offset != b.offset || a.name != b.name || a.bits != b.bits {
                        return false;
                    }
                    // Consecutive members of the same type only need one comparison.
                    if previous == Some((a.ty, b.ty)) {
                        continue;
                    }
                    if !self.compare(mode, child, a.ty, b.ty) {
                        return false;
                    }
                    previous = Some((a.ty, b.ty));
                }
                true
            }
            (TypeKind::Enum(a), TypeKind::Enum(b)) => a == b,
            (TypeKind::Forward, TypeKind::Forward) => true,
            _ => false,
        }
    }
}
