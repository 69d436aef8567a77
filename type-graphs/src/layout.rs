// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, type-graphs authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Structural signatures used to find merge candidates.
//!
//! Every graph keeps an index from [`LayoutKey`][] to the nodes that have that key.  Two nodes can
//! only be equivalent if their keys are equal, so the merge algorithm only runs the (expensive)
//! equivalence check against the nodes in one bucket.
//!
//! A key is computed from a node's own payload.  Pointers, typedefs and qualifiers have almost no
//! payload of their own, so their keys also include the _name_ of the node they refer to.  Names
//! never change once a node exists, and equivalent nodes always refer to nodes with equal names,
//! so this keeps keys stable across merges.  It does mean that the key of such a node is only
//! known once its referent exists.
//!
//! [`LayoutKey`]: struct.LayoutKey.html

use crate::graph::Encoding;
use crate::graph::Kind;
use crate::graph::PtrAuth;
use crate::graph::Symbol;
use crate::graph::TypeGraph;
use crate::graph::TypeId;
use crate::graph::TypeKind;
use crate::graph::TypeNode;

/// The structural signature of a type node.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct LayoutKey {
    family: Kind,
    name: Option<Symbol>,
    hint: LayoutHint,
}

/// Extra discriminating content drawn from a node's payload.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
enum LayoutHint {
    None,
    Width { real: bool, bits: u32 },
    Count(u64),
    Arity { args: usize, varargs: bool },
    Label(Option<Symbol>),
    Target(Option<Symbol>),
}

impl LayoutKey {
    /// Returns the key of a node of `graph`.  The node itself does not have to be in the graph
    /// yet.  Returns `None` if the node refers to a node that does not exist yet.
    pub fn of(node: &TypeNode, graph: &TypeGraph) -> Option<LayoutKey> {
        let hint = match LayoutKey::dependency(node) {
            Some(ty) if ty == node.id => LayoutHint::Target(node.name.clone()),
            Some(ty) => LayoutHint::Target(graph.get_type(ty)?.name.clone()),
            None => LayoutHint::of(node),
        };
        Some(LayoutKey::new(node, hint))
    }

    /// Returns the id that the key of `node` depends on, if any.
    pub(crate) fn dependency(node: &TypeNode) -> Option<TypeId> {
        match &node.kind {
            TypeKind::Pointer(ty)
            | TypeKind::Typedef(ty)
            | TypeKind::Volatile(ty)
            | TypeKind::Const(ty)
            | TypeKind::Restrict(ty)
            | TypeKind::PtrAuth(PtrAuth { ty, .. }) => Some(*ty),
            _ => None,
        }
    }

    fn new(node: &TypeNode, hint: LayoutHint) -> LayoutKey {
        let kind = node.kind.kind();
        // Forwards have to land in the same bucket as the definitions they stand in for.
        let family = if Kind::AGGREGATES.contains(kind) {
            Kind::Struct
        } else {
            kind
        };
        LayoutKey {
            family,
            name: node.name.clone(),
            hint,
        }
    }

    pub fn family(&self) -> Kind {
        self.family
    }

    pub fn name(&self) -> Option<&Symbol> {
        self.name.as_ref()
    }
}

impl LayoutHint {
    fn of(node: &TypeNode) -> LayoutHint {
        match &node.kind {
            TypeKind::Intrinsic(intrinsic) => LayoutHint::Width {
                real: matches!(intrinsic.encoding, Encoding::Real(_)),
                bits: intrinsic.bits,
            },
            TypeKind::Array(array) => LayoutHint::Count(array.count),
            TypeKind::Function(function) => LayoutHint::Arity {
                args: function.args.len(),
                varargs: function.varargs,
            },
            TypeKind::Enum(enumerators) if node.name.is_none() => {
                LayoutHint::Label(enumerators.first().map(|e| e.name.clone()))
            }
            TypeKind::Struct(members) | TypeKind::Union(members) if node.name.is_none() => {
                LayoutHint::Label(members.first().and_then(|m| m.name.clone()))
            }
            // Named aggregates must share a bucket with forwards of the same name, which carry
            // no payload at all.
            _ => LayoutHint::None,
        }
    }
}
