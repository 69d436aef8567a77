// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, type-graphs authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Merges a child type graph into a parent graph.
//!
//! A merge maps every type that is reachable from the child's declarations onto the parent.  Types
//! that already exist in the parent (according to the [equivalence checker][`EquivalenceChecker`])
//! are reused; everything else is created anew.  The merge proceeds in phases:
//!
//!  1. **Map types.**  We walk each declaration's type subgraph in post-order, and look up every
//!     node in the parent's [layout index][`crate::layout`].  Each node ends up mapped either onto
//!     an existing parent node, or onto a freshly allocated id, in which case it joins the
//!     _pending-creation set_.  If the only match is a parent forward declaration and the child
//!     node is its definition, we create the definition and remember that the forward has been
//!     superseded.
//!  2. **Map declarations.**  A child declaration that matches a parent declaration (same kind,
//!     name, owner, and mapped types) is dropped; the rest are queued.
//!  3. **Create types.**  Every pending node is copied into the target at its pre-allocated id.
//!     References to nodes that don't exist yet keep their child id as a placeholder, and the edge
//!     slot is recorded in the _pending-remap list_.
//!  4. **Create declarations**, deduplicating any repeats within the child.
//!  5. **Resolve remaps.**  Every placeholder must now resolve.
//!  6. **Redirect forwards.**  Every edge of the target that points at a superseded forward is
//!     rewritten to point at its definition.
//!
//! There is no rollback: if a merge fails, the target may have been partially modified and must be
//! discarded.
//!
//! Besides merging into an accumulator, a [`MergeContext`][] can _uniquify_ a graph against a
//! reference graph, producing a third graph that contains only what the reference lacks, and can
//! _self-uniquify_ a graph, collapsing duplicate types within it.

use std::num::NonZeroU32;

use fxhash::FxHashMap;
use smallvec::SmallVec;
use thiserror::Error;

use crate::arena::Handle;
use crate::arena::HandleSet;
use crate::arena::SupplementalArena;
use crate::equivalence::EquivalenceChecker;
use crate::equivalence::Mapping;
use crate::graph::Declaration;
use crate::graph::GraphError;
use crate::graph::TypeGraph;
use crate::graph::TypeId;
use crate::graph::TypeNode;
use crate::layout::LayoutKey;
use crate::stats::MergeStats;

/// The first id allocated in a uniquified graph.  Ids below this belong to the reference graph.
pub const FIRST_CHILD_TYPE_ID: u32 = 0x8001;

const FIRST_CHILD: NonZeroU32 = match NonZeroU32::new(FIRST_CHILD_TYPE_ID) {
    Some(id) => id,
    None => panic!("first child id must be nonzero"),
};

/// An internal consistency violation detected while merging.  All of these are fatal for the
/// merge.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum MergeError {
    #[error("child type {0} has no mapping")]
    MissingMapping(TypeId),
    #[error("{referrer} still refers to child type {target} in slot {slot}")]
    UnresolvedReference {
        referrer: String,
        slot: usize,
        target: TypeId,
    },
    #[error("forward declaration {forward} is superseded by missing definition {definition}")]
    MissingDefinition { forward: TypeId, definition: TypeId },
    #[error("child graph refers to missing type {0}")]
    MissingNode(TypeId),
    #[error("type id {0} is already in use in the target graph")]
    DuplicateNode(TypeId),
    #[error("no room for new types: reference graph already allocates up to id {0}")]
    NoRoomForTypes(u32),
    #[error(transparent)]
    InvalidGraph(#[from] GraphError),
}

/// An addressable reference field in the target graph.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum EdgeSlot {
    Type { node: TypeId, slot: usize },
    Declaration { decl: Handle<Declaration>, slot: usize },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
    /// The parent is also the target.
    Normal,
    /// The parent is a read-only reference graph, and new content goes into a separate target.
    /// Function and variable declarations are never copied.
    Reference,
    /// Like `Reference`, but every declaration that the reference lacks is copied.
    Additive,
    /// There is no parent; duplicates are found among the pending nodes of the child itself.
    SelfUniquify,
}

#[derive(Clone, Copy)]
enum Visit {
    Enter(TypeId),
    Exit(TypeId),
}

/// The transient state of a merge.  Create one per worker and reuse it for every merge that the
/// worker performs; all of its tables are cleared at the start of each merge.
pub struct MergeContext {
    mapping: Mapping,
    pending: Vec<TypeId>,
    pending_set: HandleSet<TypeNode>,
    pending_layout: FxHashMap<LayoutKey, SmallVec<[TypeId; 2]>>,
    pending_declarations: Vec<Handle<Declaration>>,
    remaps: Vec<EdgeSlot>,
    forwards: Vec<(TypeId, TypeId)>,
    checker: EquivalenceChecker,
    visited: SupplementalArena<TypeNode, u64>,
    stack: Vec<Visit>,
    vgen: u64,
    next_id: NonZeroU32,
    stats: MergeStats,
}

impl MergeContext {
    pub fn new() -> MergeContext {
        MergeContext {
            mapping: Mapping::new(),
            pending: Vec::new(),
            pending_set: HandleSet::new(),
            pending_layout: FxHashMap::default(),
            pending_declarations: Vec::new(),
            remaps: Vec::new(),
            forwards: Vec::new(),
            checker: EquivalenceChecker::new(),
            visited: SupplementalArena::new(),
            stack: Vec::new(),
            vgen: 0,
            next_id: NonZeroU32::MIN,
            stats: MergeStats::default(),
        }
    }

    /// Merges `child` into `parent`, creating only the types and declarations that `parent` does
    /// not already have.
    pub fn merge_into(
        &mut self,
        child: &TypeGraph,
        parent: &mut TypeGraph,
    ) -> Result<MergeStats, MergeError> {
        self.run(child, None, parent, Mode::Normal)
    }

    /// Returns a new graph containing exactly the content of `merged` that is absent from
    /// `reference`.  The new graph allocates ids starting at [`FIRST_CHILD_TYPE_ID`][], and may
    /// refer to nodes of `reference`.  Function and variable declarations are never copied.
    ///
    /// [`FIRST_CHILD_TYPE_ID`]: constant.FIRST_CHILD_TYPE_ID.html
    pub fn uniquify(
        &mut self,
        merged: &TypeGraph,
        reference: &TypeGraph,
    ) -> Result<TypeGraph, MergeError> {
        check_room(reference)?;
        let mut target = TypeGraph::starting_at(FIRST_CHILD);
        self.run(merged, Some(reference), &mut target, Mode::Reference)?;
        Ok(target)
    }

    /// Appends everything in `merged` that `with` lacks to `with`, including function and
    /// variable declarations.  Every id that already exists in `with` is preserved.
    pub fn merge_additively(
        &mut self,
        merged: &TypeGraph,
        mut with: TypeGraph,
    ) -> Result<TypeGraph, MergeError> {
        check_room(&with)?;
        let mut target = TypeGraph::starting_at(with.next_id);
        self.run(merged, Some(&with), &mut target, Mode::Additive)?;
        with.absorb(target).map_err(|err| match err {
            GraphError::DuplicateId(id) => MergeError::DuplicateNode(id),
            err => err.into(),
        })?;
        Ok(with)
    }

    /// Returns a copy of `child` in which duplicate types have been collapsed.
    pub fn self_uniquify(&mut self, child: &TypeGraph) -> Result<TypeGraph, MergeError> {
        let mut target = TypeGraph::new();
        self.run(child, None, &mut target, Mode::SelfUniquify)?;
        Ok(target)
    }

    /// Returns the id that a child type was mapped to by the most recent merge.
    pub fn mapping(&self, child: TypeId) -> Option<TypeId> {
        self.mapping[child]
    }

    fn run(
        &mut self,
        child: &TypeGraph,
        reference: Option<&TypeGraph>,
        target: &mut TypeGraph,
        mode: Mode,
    ) -> Result<MergeStats, MergeError> {
        self.start(child, target);

        let parent = match mode {
            Mode::Normal => Some(&*target),
            Mode::Reference | Mode::Additive => reference,
            Mode::SelfUniquify => None,
        };
        self.map_graph(child, parent, mode)?;

        self.create_types(child, reference, target)?;
        self.create_declarations(child, reference, target)?;
        self.resolve_remaps(reference, target)?;
        if mode == Mode::Normal && !self.forwards.is_empty() {
            self.redirect_forwards(target)?;
        }

        self.finish(target);
        log::debug!("merge ({:?}): {}", mode, self.stats);
        Ok(self.stats)
    }

    fn start(&mut self, child: &TypeGraph, target: &TypeGraph) {
        self.mapping.clear();
        self.pending.clear();
        self.pending_set.clear();
        self.pending_layout.clear();
        self.pending_declarations.clear();
        self.remaps.clear();
        self.forwards.clear();
        self.visited.clear();
        self.stack.clear();
        self.stats = MergeStats::default();
        self.checker.reset(target.cur_emark.max(child.cur_emark));
        self.vgen = target.cur_vgen.max(child.cur_vgen) + 1;
        self.next_id = target.next_id;
    }

    fn finish(&mut self, target: &mut TypeGraph) {
        target.cur_emark = self.checker.current_mark();
        target.cur_vgen = self.vgen;
        target.next_id = target.next_id.max(self.next_id);
    }

    fn allocate(&mut self) -> Result<TypeId, MergeError> {
        let id = Handle::new(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(MergeError::NoRoomForTypes(u32::MAX))?;
        Ok(id)
    }

    //---------------------------------------------------------------------------------------------
    // Mapping

    fn map_graph(
        &mut self,
        child: &TypeGraph,
        parent: Option<&TypeGraph>,
        mode: Mode,
    ) -> Result<(), MergeError> {
        for (handle, decl) in child.iter_declarations() {
            for (_, ty) in decl.references() {
                self.map_subgraph(child, parent, ty)?;
            }
            self.map_declaration(parent, handle, decl, mode)?;
        }
        Ok(())
    }

    /// Maps every unmapped node reachable from `root`, children before parents.
    fn map_subgraph(
        &mut self,
        child: &TypeGraph,
        parent: Option<&TypeGraph>,
        root: TypeId,
    ) -> Result<(), MergeError> {
        self.stack.push(Visit::Enter(root));
        while let Some(visit) = self.stack.pop() {
            match visit {
                Visit::Enter(c) => {
                    if self.mapping[c].is_some() || self.visited[c] == self.vgen {
                        continue;
                    }
                    self.visited[c] = self.vgen;
                    let node = child.get_type(c).ok_or(MergeError::MissingNode(c))?;
                    self.stack.push(Visit::Exit(c));
                    for r in node.kind.references().into_iter().rev() {
                        self.stack.push(Visit::Enter(r));
                    }
                }
                Visit::Exit(c) => match parent {
                    Some(parent) => self.map_type(child, parent, c)?,
                    None => self.map_type_within(child, c)?,
                },
            }
        }
        Ok(())
    }

    fn map_type(
        &mut self,
        child: &TypeGraph,
        parent: &TypeGraph,
        c: TypeId,
    ) -> Result<(), MergeError> {
        if self.mapping[c].is_some() {
            return Ok(());
        }
        let node = child.get_type(c).ok_or(MergeError::MissingNode(c))?;
        let key = child.layout_key(c).ok_or(MergeError::MissingNode(c))?;

        let mut superseded = None;
        for &p in parent.candidates(&key) {
            if !self.checker.equivalent(child, c, parent, p, &self.mapping) {
                continue;
            }
            // A forward only stands in for a definition if nothing better turns up.
            if node.kind.is_definition() && parent[p].kind.is_forward() {
                superseded.get_or_insert(p);
                continue;
            }
            copious_debugging!("map {} -> {}", c.display(child), p.display(parent));
            self.mapping[c] = Some(p);
            self.stats.types_mapped += 1;
            return Ok(());
        }

        let fresh = self.allocate()?;
        if let Some(forward) = superseded {
            copious_debugging!(
                "{} supersedes {} as {}",
                c.display(child),
                forward.display(parent),
                fresh
            );
            self.forwards.push((forward, fresh));
        }
        self.add_pending(c, fresh, key);
        Ok(())
    }

    /// Maps a node by looking for duplicates among the child's own pending nodes.
    fn map_type_within(&mut self, child: &TypeGraph, c: TypeId) -> Result<(), MergeError> {
        if self.mapping[c].is_some() {
            return Ok(());
        }
        let node = child.get_type(c).ok_or(MergeError::MissingNode(c))?;
        let key = child.layout_key(c).ok_or(MergeError::MissingNode(c))?;

        let mut found = None;
        if let Some(candidates) = self.pending_layout.get(&key) {
            for &q in candidates {
                if node.kind.is_definition() && child[q].kind.is_forward() {
                    continue;
                }
                if self.checker.self_equivalent(child, c, q) {
                    found = Some(q);
                    break;
                }
            }
        }
        if let Some(q) = found {
            copious_debugging!("{} duplicates {}", c.display(child), q.display(child));
            let mapped = self.mapping[q];
            self.mapping[c] = mapped;
            self.stats.types_mapped += 1;
            return Ok(());
        }

        let fresh = self.allocate()?;
        self.add_pending(c, fresh, key);
        Ok(())
    }

    fn add_pending(&mut self, c: TypeId, fresh: TypeId, key: LayoutKey) {
        if !self.pending_set.add(c) {
            return;
        }
        copious_debugging!("pending {} as {}", c, fresh);
        self.mapping[c] = Some(fresh);
        self.pending.push(c);
        self.pending_layout.entry(key).or_default().push(c);
    }

    fn map_declaration(
        &mut self,
        parent: Option<&TypeGraph>,
        handle: Handle<Declaration>,
        decl: &Declaration,
        mode: Mode,
    ) -> Result<(), MergeError> {
        if mode == Mode::Reference && decl.kind.is_symbol() {
            self.stats.declarations_suppressed += 1;
            return Ok(());
        }
        if let Some(parent) = parent {
            let mapped = self.mapped_declaration(decl)?;
            if find_declaration(parent, &mapped).is_some() {
                self.stats.declarations_matched += 1;
                return Ok(());
            }
        }
        self.pending_declarations.push(handle);
        Ok(())
    }

    fn mapped_declaration(&self, decl: &Declaration) -> Result<Declaration, MergeError> {
        let mut mapped = decl.clone();
        for (slot, r) in decl.references() {
            let m = self.mapping[r].ok_or(MergeError::MissingMapping(r))?;
            if let Some(edge) = mapped.reference_mut(slot) {
                *edge = m;
            }
        }
        Ok(mapped)
    }

    //---------------------------------------------------------------------------------------------
    // Creation

    /// Returns the node that a child reference maps to, if that node already exists.
    fn resolve(
        &self,
        r: TypeId,
        reference: Option<&TypeGraph>,
        target: &TypeGraph,
    ) -> Result<Option<TypeId>, MergeError> {
        let m = self.mapping[r].ok_or(MergeError::MissingMapping(r))?;
        let exists = target.contains_type(m)
            || reference.map(|graph| graph.contains_type(m)).unwrap_or(false);
        Ok(exists.then(|| m))
    }

    fn create_types(
        &mut self,
        child: &TypeGraph,
        reference: Option<&TypeGraph>,
        target: &mut TypeGraph,
    ) -> Result<(), MergeError> {
        for index in 0..self.pending.len() {
            let c = self.pending[index];
            let node = child.get_type(c).ok_or(MergeError::MissingNode(c))?;
            let id = self.mapping[c].ok_or(MergeError::MissingMapping(c))?;
            let mut kind = node.kind.clone();
            for (slot, r) in node.kind.references().into_iter().enumerate() {
                let resolved = if r == c {
                    id
                } else {
                    match self.resolve(r, reference, target)? {
                        Some(m) => m,
                        None => {
                            self.remaps.push(EdgeSlot::Type { node: id, slot });
                            r
                        }
                    }
                };
                if let Some(edge) = kind.reference_mut(slot) {
                    *edge = resolved;
                }
            }
            // Keys never depend on ids, so the child's key is also the new node's key, even if
            // the new node's referent is still a placeholder.
            let key = child.layout_key(c);
            copious_debugging!("create {} as {}", c.display(child), id);
            target
                .store_foreign_type(
                    TypeNode {
                        id,
                        name: node.name.clone(),
                        size: node.size,
                        kind,
                    },
                    key,
                )
                .map_err(|_| MergeError::DuplicateNode(id))?;
            self.stats.types_created += 1;
        }
        Ok(())
    }

    fn create_declarations(
        &mut self,
        child: &TypeGraph,
        reference: Option<&TypeGraph>,
        target: &mut TypeGraph,
    ) -> Result<(), MergeError> {
        for index in 0..self.pending_declarations.len() {
            let handle = self.pending_declarations[index];
            let decl = &child[handle];
            let mut created = self.mapped_declaration(decl)?;
            let mut unresolved = SmallVec::<[usize; 2]>::new();
            for (slot, r) in decl.references() {
                if self.resolve(r, reference, target)?.is_none() {
                    unresolved.push(slot);
                    if let Some(edge) = created.reference_mut(slot) {
                        *edge = r;
                    }
                }
            }
            if unresolved.is_empty() && find_declaration(target, &created).is_some() {
                self.stats.declarations_matched += 1;
                continue;
            }
            let new_handle = target.store_declaration(created);
            copious_debugging!("create {}", new_handle.display(target));
            for slot in unresolved {
                self.remaps.push(EdgeSlot::Declaration {
                    decl: new_handle,
                    slot,
                });
            }
            self.stats.declarations_created += 1;
        }
        Ok(())
    }

    //---------------------------------------------------------------------------------------------
    // Remaps and forwards

    fn resolve_remaps(
        &mut self,
        reference: Option<&TypeGraph>,
        target: &mut TypeGraph,
    ) -> Result<(), MergeError> {
        let remaps = std::mem::take(&mut self.remaps);
        for edge in &remaps {
            let placeholder = match *edge {
                EdgeSlot::Type { node, slot } => target
                    .get_type_mut(node)
                    .and_then(|n| n.kind.reference_mut(slot))
                    .map(|r| *r),
                EdgeSlot::Declaration { decl, slot } => target
                    .get_declaration_mut(decl)
                    .and_then(|d| d.reference_mut(slot))
                    .map(|r| *r),
            };
            let placeholder = match placeholder {
                Some(placeholder) => placeholder,
                None => continue,
            };
            let resolved = match self.resolve(placeholder, reference, target)? {
                Some(resolved) => resolved,
                None => {
                    let (referrer, slot) = match *edge {
                        EdgeSlot::Type { node, slot } => (node.display(target).to_string(), slot),
                        EdgeSlot::Declaration { decl, slot } => {
                            (decl.display(target).to_string(), slot)
                        }
                    };
                    return Err(MergeError::UnresolvedReference {
                        referrer,
                        slot,
                        target: placeholder,
                    });
                }
            };
            let slot = match *edge {
                EdgeSlot::Type { node, slot } => target
                    .get_type_mut(node)
                    .and_then(|n| n.kind.reference_mut(slot)),
                EdgeSlot::Declaration { decl, slot } => target
                    .get_declaration_mut(decl)
                    .and_then(|d| d.reference_mut(slot)),
            };
            if let Some(slot) = slot {
                *slot = resolved;
            }
        }
        self.stats.remaps = remaps.len();
        self.remaps = remaps;
        Ok(())
    }

    /// Rewrites every edge reachable from the target's declarations that points at a superseded
    /// forward declaration.
    fn redirect_forwards(&mut self, target: &mut TypeGraph) -> Result<(), MergeError> {
        let mut redirects: FxHashMap<TypeId, TypeId> = FxHashMap::default();
        for &(forward, definition) in &self.forwards {
            if !target.contains_type(definition) {
                return Err(MergeError::MissingDefinition {
                    forward,
                    definition,
                });
            }
            redirects.entry(forward).or_insert(definition);
        }

        self.vgen += 1;
        self.stack.clear();
        for handle in target.iter_declaration_handles() {
            let decl = match target.get_declaration_mut(handle) {
                Some(decl) => decl,
                None => continue,
            };
            for slot in 0..=decl.args.len() {
                if let Some(edge) = decl.reference_mut(slot) {
                    if let Some(definition) = redirects.get(&*edge) {
                        *edge = *definition;
                    }
                    self.stack.push(Visit::Enter(*edge));
                }
            }
        }
        while let Some(visit) = self.stack.pop() {
            let id = match visit {
                Visit::Enter(id) | Visit::Exit(id) => id,
            };
            if self.visited[id] == self.vgen {
                continue;
            }
            self.visited[id] = self.vgen;
            let node = match target.get_type_mut(id) {
                Some(node) => node,
                None => continue,
            };
            let slots = node.kind.references().len();
            for slot in 0..slots {
                if let Some(edge) = node.kind.reference_mut(slot) {
                    if let Some(definition) = redirects.get(&*edge) {
                        copious_debugging!("redirect {} slot {} to {}", id, slot, definition);
                        *edge = *definition;
                    }
                    self.stack.push(Visit::Enter(*edge));
                }
            }
        }

        for &(forward, _) in &self.forwards {
            target.forget_layout(forward);
        }
        self.stats.forwards_resolved = redirects.len();
        Ok(())
    }
}

impl Default for MergeContext {
    fn default() -> MergeContext {
        MergeContext::new()
    }
}

/// Ids from [`FIRST_CHILD_TYPE_ID`][] on are reserved for content that is new relative to a
/// reference graph.
fn check_room(reference: &TypeGraph) -> Result<(), MergeError> {
    if reference.next_id() >= FIRST_CHILD_TYPE_ID {
        return Err(MergeError::NoRoomForTypes(reference.next_id()));
    }
    Ok(())
}

/// Finds a declaration in `graph` that matches `decl`, whose type references must already be
/// expressed in `graph`'s id space.
fn find_declaration(graph: &TypeGraph, decl: &Declaration) -> Option<Handle<Declaration>> {
    graph
        .declarations_named(decl.name.as_ref())
        .iter()
        .copied()
        .find(|handle| {
            let other = &graph[*handle];
            other.kind == decl.kind
                && other.ty == decl.ty
                && (!decl.kind.is_static() || other.owner == decl.owner)
                && other.args == decl.args
                && other.varargs == decl.varargs
        })
}

//-------------------------------------------------------------------------------------------------
// Pipeline integration

impl crate::pipeline::Mergeable for TypeGraph {
    type Context = MergeContext;
    type Error = MergeError;

    fn merge(
        child: TypeGraph,
        parent: &mut TypeGraph,
        cx: &mut MergeContext,
    ) -> Result<(), MergeError> {
        cx.merge_into(&child, parent).map(|_| ())
    }

    fn summary(&self) -> Option<String> {
        Some(self.stats().to_string())
    }
}
