// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, type-graphs authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Defines the structure of a type graph.
//!
//! This module contains all of the types that you need to define the structure of a type graph:
//! the [type nodes][`TypeNode`] that describe every type in a translation unit, and the
//! [declarations][`Declaration`] (functions, variables, parameters, and named types) that refer to
//! them.  All of the content lives in a [`TypeGraph`][] instance; edges between nodes are
//! [`TypeId`][]s, which are indexes into the graph's arena.
//!
//! A graph is usually built by a parser for one translation unit, and then handed to the
//! [merge][`crate::merge`] machinery, which folds it into an accumulator graph.
//!
//! ## Building a graph
//!
//! Most nodes can be added with [`add_type`][`TypeGraph::add_type`], which allocates a fresh id.
//! Cyclic structures need to refer to a node before it exists; for those, reserve the id first
//! with [`new_type_id`][`TypeGraph::new_type_id`] and fill it in later with
//! [`add_type_at`][`TypeGraph::add_type_at`]:
//!
//! ```
//! # use type_graphs::graph::*;
//! let mut graph = TypeGraph::new();
//! let list = graph.new_type_id();
//! let next = graph.add_type(None, 8, TypeKind::Pointer(list));
//! let name = graph.add_symbol("list");
//! let next_name = graph.add_symbol("next");
//! graph
//!     .add_type_at(
//!         list,
//!         Some(name),
//!         8,
//!         TypeKind::Struct(vec![Member::new(Some(next_name), 0, 64, next)]),
//!     )
//!     .unwrap();
//! assert!(graph.validate(None).is_ok());
//! ```

use std::borrow::Borrow;
use std::fmt::Display;
use std::hash::Hash;
use std::hash::Hasher;
use std::num::NonZeroU32;
use std::ops::Index;
use std::sync::Arc;

use enumset::enum_set;
use enumset::EnumSet;
use enumset::EnumSetType;
use fxhash::FxHashMap;
use fxhash::FxHashSet;
use smallvec::SmallVec;
use thiserror::Error;

use crate::arena::Arena;
use crate::arena::Handle;
use crate::arena::HandleSet;
use crate::layout::LayoutKey;
use crate::stats::FrequencyDistribution;
use crate::stats::GraphStats;

//-------------------------------------------------------------------------------------------------
// Symbols

/// An interned name.  Symbols are cheap to clone, and can be shared between graphs: merging a node
/// into another graph carries its symbols along without copying the underlying strings.
#[derive(Clone)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &*self.0)
    }
}

impl Eq for Symbol {}

impl PartialEq for Symbol {
    fn eq(&self, other: &Symbol) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Symbol) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Symbol) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl TypeGraph {
    /// Adds a symbol to the type graph, ensuring that there's only ever one copy of a particular
    /// symbol stored in the graph.
    pub fn add_symbol<S: AsRef<str> + ?Sized>(&mut self, symbol: &S) -> Symbol {
        let symbol = symbol.as_ref();
        if let Some(existing) = self.symbols.get(symbol) {
            return existing.clone();
        }
        let interned = Symbol(Arc::from(symbol));
        self.symbols.insert(interned.clone());
        interned
    }

    /// Looks up a symbol that has already been added to this graph.
    pub fn symbol(&self, symbol: &str) -> Option<Symbol> {
        self.symbols.get(symbol).cloned()
    }

    /// Interns a symbol that might belong to another graph.
    pub(crate) fn intern(&mut self, symbol: &Symbol) -> Symbol {
        if let Some(existing) = self.symbols.get(symbol.as_str()) {
            return existing.clone();
        }
        self.symbols.insert(symbol.clone());
        symbol.clone()
    }

    fn intern_option(&mut self, symbol: &Option<Symbol>) -> Option<Symbol> {
        symbol.as_ref().map(|symbol| self.intern(symbol))
    }
}

//-------------------------------------------------------------------------------------------------
// Type kinds

/// The identifier of a type node within its graph.
pub type TypeId = Handle<TypeNode>;

/// The kind of a type node, without its payload.
#[derive(Debug, EnumSetType, Hash, Ord, PartialOrd)]
pub enum Kind {
    Intrinsic,
    Pointer,
    Array,
    Function,
    Struct,
    Union,
    Enum,
    Forward,
    Typedef,
    Volatile,
    Const,
    Restrict,
    PtrAuth,
}

impl Kind {
    /// The kinds that can stand in for each other when one side is only a forward declaration.
    pub const AGGREGATES: EnumSet<Kind> = enum_set!(Kind::Forward | Kind::Struct | Kind::Union);

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Intrinsic => "intrinsic",
            Kind::Pointer => "pointer",
            Kind::Array => "array",
            Kind::Function => "function",
            Kind::Struct => "struct",
            Kind::Union => "union",
            Kind::Enum => "enum",
            Kind::Forward => "forward",
            Kind::Typedef => "typedef",
            Kind::Volatile => "volatile",
            Kind::Const => "const",
            Kind::Restrict => "restrict",
            Kind::PtrAuth => "ptrauth",
        }
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format flags of an integer encoding.
#[derive(Debug, EnumSetType, Hash)]
pub enum IntegerFlag {
    Char,
    Bool,
    Varargs,
}

/// The format of a floating-point encoding.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RealFormat {
    Single,
    Double,
    Complex,
    DoubleComplex,
    LongDoubleComplex,
    LongDouble,
    Interval,
    DoubleInterval,
    LongDoubleInterval,
    Imaginary,
    DoubleImaginary,
    LongDoubleImaginary,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Encoding {
    Integer {
        signed: bool,
        flags: EnumSet<IntegerFlag>,
    },
    Real(RealFormat),
}

/// The payload of an intrinsic (base) type.  `offset` and `bits` describe where the value lives
/// within its storage unit, in bits.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Intrinsic {
    pub encoding: Encoding,
    pub offset: u32,
    pub bits: u32,
}

impl Intrinsic {
    pub fn integer(signed: bool, bits: u32) -> Intrinsic {
        Intrinsic {
            encoding: Encoding::Integer {
                signed,
                flags: EnumSet::empty(),
            },
            offset: 0,
            bits,
        }
    }

    pub fn real(format: RealFormat, bits: u32) -> Intrinsic {
        Intrinsic {
            encoding: Encoding::Real(format),
            offset: 0,
            bits,
        }
    }

    pub fn with_flags(mut self, new_flags: EnumSet<IntegerFlag>) -> Intrinsic {
        if let Encoding::Integer { flags, .. } = &mut self.encoding {
            *flags = new_flags;
        }
        self
    }
}

/// A member of a struct or union.  `offset` is in bytes, `bits` is the member's size in bits.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Member {
    pub name: Option<Symbol>,
    pub offset: u64,
    pub bits: u64,
    pub ty: TypeId,
}

impl Member {
    pub fn new(name: Option<Symbol>, offset: u64, bits: u64, ty: TypeId) -> Member {
        Member {
            name,
            offset,
            bits,
            ty,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Enumerator {
    pub name: Symbol,
    pub value: i64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ArrayType {
    pub contents: TypeId,
    pub index: TypeId,
    pub count: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FunctionType {
    pub ret: TypeId,
    pub args: Vec<TypeId>,
    pub varargs: bool,
}

/// A pointer-authentication qualifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PtrAuth {
    pub ty: TypeId,
    pub key: u32,
    pub discriminator: u32,
    pub discriminated: bool,
}

/// The kind-specific payload of a type node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TypeKind {
    Intrinsic(Intrinsic),
    Pointer(TypeId),
    Array(ArrayType),
    Function(FunctionType),
    Struct(Vec<Member>),
    Union(Vec<Member>),
    Enum(Vec<Enumerator>),
    Forward,
    Typedef(TypeId),
    Volatile(TypeId),
    Const(TypeId),
    Restrict(TypeId),
    PtrAuth(PtrAuth),
}

impl TypeKind {
    pub fn kind(&self) -> Kind {
        match self {
            TypeKind::Intrinsic(_) => Kind::Intrinsic,
            TypeKind::Pointer(_) => Kind::Pointer,
            TypeKind::Array(_) => Kind::Array,
            TypeKind::Function(_) => Kind::Function,
            TypeKind::Struct(_) => Kind::Struct,
            TypeKind::Union(_) => Kind::Union,
            TypeKind::Enum(_) => Kind::Enum,
            TypeKind::Forward => Kind::Forward,
            TypeKind::Typedef(_) => Kind::Typedef,
            TypeKind::Volatile(_) => Kind::Volatile,
            TypeKind::Const(_) => Kind::Const,
            TypeKind::Restrict(_) => Kind::Restrict,
            TypeKind::PtrAuth(_) => Kind::PtrAuth,
        }
    }

    /// Returns every referenced type, in edge slot order.
    pub fn references(&self) -> SmallVec<[TypeId; 4]> {
        match self {
            TypeKind::Intrinsic(_) | TypeKind::Enum(_) | TypeKind::Forward => SmallVec::new(),
            TypeKind::Pointer(ty)
            | TypeKind::Typedef(ty)
            | TypeKind::Volatile(ty)
            | TypeKind::Const(ty)
            | TypeKind::Restrict(ty)
            | TypeKind::PtrAuth(PtrAuth { ty, .. }) => smallvec::smallvec![*ty],
            TypeKind::Array(array) => smallvec::smallvec![array.contents, array.index],
            TypeKind::Function(function) => std::iter::once(function.ret)
                .chain(function.args.iter().copied())
                .collect(),
            TypeKind::Struct(members) | TypeKind::Union(members) => {
                members.iter().map(|member| member.ty).collect()
            }
        }
    }

    /// Returns a mutable reference to the edge in a particular slot.
    pub fn reference_mut(&mut self, slot: usize) -> Option<&mut TypeId> {
        match self {
            TypeKind::Intrinsic(_) | TypeKind::Enum(_) | TypeKind::Forward => None,
            TypeKind::Pointer(ty)
            | TypeKind::Typedef(ty)
            | TypeKind::Volatile(ty)
            | TypeKind::Const(ty)
            | TypeKind::Restrict(ty)
            | TypeKind::PtrAuth(PtrAuth { ty, .. }) => (slot == 0).then(|| ty),
            TypeKind::Array(array) => match slot {
                0 => Some(&mut array.contents),
                1 => Some(&mut array.index),
                _ => None,
            },
            TypeKind::Function(function) => match slot {
                0 => Some(&mut function.ret),
                _ => function.args.get_mut(slot - 1),
            },
            TypeKind::Struct(members) | TypeKind::Union(members) => {
                members.get_mut(slot).map(|member| &mut member.ty)
            }
        }
    }

    /// Returns whether this is a complete struct or union definition.
    pub fn is_definition(&self) -> bool {
        matches!(self, TypeKind::Struct(_) | TypeKind::Union(_))
    }

    pub fn is_forward(&self) -> bool {
        matches!(self, TypeKind::Forward)
    }
}

//-------------------------------------------------------------------------------------------------
// Type nodes

/// One type in a type graph.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TypeNode {
    pub id: TypeId,
    pub name: Option<Symbol>,
    pub size: u64,
    pub kind: TypeKind,
}

impl TypeId {
    pub fn display(self, graph: &TypeGraph) -> impl Display + '_ {
        DisplayTypeId {
            wrapped: self,
            graph,
        }
    }
}

#[doc(hidden)]
pub struct DisplayTypeId<'a> {
    wrapped: TypeId,
    graph: &'a TypeGraph,
}

impl<'a> Display for DisplayTypeId<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.graph.get_type(self.wrapped) {
            Some(node) => match &node.name {
                Some(name) => write!(f, "{} {} ({})", node.kind.kind(), name, self.wrapped),
                None => write!(f, "{} <anonymous> ({})", node.kind.kind(), self.wrapped),
            },
            None => write!(f, "<missing> ({})", self.wrapped),
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Declarations

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DeclarationKind {
    NoType,
    GlobalFunction,
    StaticFunction,
    GlobalVariable,
    StaticVariable,
    Parameter,
    Type,
    StructOrUnion,
}

impl DeclarationKind {
    /// Returns whether declarations of this kind are only visible within their owning compilation
    /// unit.
    pub fn is_static(self) -> bool {
        matches!(
            self,
            DeclarationKind::StaticFunction | DeclarationKind::StaticVariable
        )
    }

    /// Returns whether declarations of this kind describe a function or variable symbol.  These
    /// are never copied into a graph that is uniquified against a reference.
    pub fn is_symbol(self) -> bool {
        matches!(
            self,
            DeclarationKind::GlobalFunction
                | DeclarationKind::StaticFunction
                | DeclarationKind::GlobalVariable
                | DeclarationKind::StaticVariable
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeclarationKind::NoType => "notype",
            DeclarationKind::GlobalFunction => "global function",
            DeclarationKind::StaticFunction => "static function",
            DeclarationKind::GlobalVariable => "global variable",
            DeclarationKind::StaticVariable => "static variable",
            DeclarationKind::Parameter => "parameter",
            DeclarationKind::Type => "type",
            DeclarationKind::StructOrUnion => "struct/union",
        }
    }
}

impl Display for DeclarationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named declaration that refers to the type graph.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub name: Option<Symbol>,
    /// The compilation unit that a static declaration belongs to.
    pub owner: Option<Symbol>,
    pub ty: Option<TypeId>,
    pub args: Vec<TypeId>,
    pub varargs: bool,
}

impl Declaration {
    pub fn new(kind: DeclarationKind, name: Option<Symbol>, ty: Option<TypeId>) -> Declaration {
        Declaration {
            kind,
            name,
            owner: None,
            ty,
            args: Vec::new(),
            varargs: false,
        }
    }

    pub fn with_owner(mut self, owner: Symbol) -> Declaration {
        self.owner = Some(owner);
        self
    }

    pub fn with_args(mut self, args: Vec<TypeId>, varargs: bool) -> Declaration {
        self.args = args;
        self.varargs = varargs;
        self
    }

    /// Returns every referenced type along with its edge slot.
    pub fn references(&self) -> impl Iterator<Item = (usize, TypeId)> + '_ {
        self.ty
            .iter()
            .map(|ty| (0, *ty))
            .chain(self.args.iter().enumerate().map(|(i, ty)| (i + 1, *ty)))
    }

    pub fn reference_mut(&mut self, slot: usize) -> Option<&mut TypeId> {
        match slot {
            0 => self.ty.as_mut(),
            _ => self.args.get_mut(slot - 1),
        }
    }
}

impl Handle<Declaration> {
    pub fn display(self, graph: &TypeGraph) -> impl Display + '_ {
        DisplayDeclaration {
            wrapped: self,
            graph,
        }
    }
}

#[doc(hidden)]
pub struct DisplayDeclaration<'a> {
    wrapped: Handle<Declaration>,
    graph: &'a TypeGraph,
}

impl<'a> Display for DisplayDeclaration<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.graph.declarations.get(self.wrapped) {
            Some(decl) => match &decl.name {
                Some(name) => write!(f, "{} {} ({})", decl.kind, name, self.wrapped),
                None => write!(f, "{} <anonymous> ({})", decl.kind, self.wrapped),
            },
            None => write!(f, "<missing declaration> ({})", self.wrapped),
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Type graphs

/// Errors that can occur while building or combining type graphs.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum GraphError {
    #[error("type id {0} is already in use")]
    DuplicateId(TypeId),
    #[error("{referrer} refers to missing type {target} in slot {slot}")]
    MissingNode {
        referrer: String,
        slot: usize,
        target: TypeId,
    },
    #[error("static declaration {0} has no owner")]
    MissingOwner(String),
}

/// Contains all of the types and declarations of one translation unit, or of an accumulator that
/// many translation units have been merged into.
pub struct TypeGraph {
    symbols: FxHashSet<Symbol>,
    types: Arena<TypeNode>,
    layout: FxHashMap<LayoutKey, SmallVec<[TypeId; 2]>>,
    layout_keys: FxHashMap<TypeId, LayoutKey>,
    /// Nodes whose layout key depends on a node that doesn't exist yet, keyed by that node.
    awaiting_layout: FxHashMap<TypeId, SmallVec<[TypeId; 2]>>,
    superseded: HandleSet<TypeNode>,
    declarations: Arena<Declaration>,
    declarations_by_name: FxHashMap<Option<Symbol>, SmallVec<[Handle<Declaration>; 2]>>,
    pub(crate) next_id: NonZeroU32,
    pub(crate) cur_emark: u64,
    pub(crate) cur_vgen: u64,
}

impl TypeGraph {
    /// Creates a new, initially empty, type graph whose ids start at 1.
    pub fn new() -> TypeGraph {
        TypeGraph::starting_at(NonZeroU32::MIN)
    }

    /// Creates a new, initially empty, type graph whose ids start at `first`.
    pub fn starting_at(first: NonZeroU32) -> TypeGraph {
        TypeGraph {
            symbols: FxHashSet::default(),
            types: Arena::starting_at(first),
            layout: FxHashMap::default(),
            layout_keys: FxHashMap::default(),
            awaiting_layout: FxHashMap::default(),
            superseded: HandleSet::new(),
            declarations: Arena::new(),
            declarations_by_name: FxHashMap::default(),
            next_id: first,
            cur_emark: 0,
            cur_vgen: 0,
        }
    }

    /// Returns the smallest id that a node of this graph can have.
    pub fn first_id(&self) -> u32 {
        self.types.first_index()
    }

    /// Returns the id that the next call to [`new_type_id`][] will return.
    ///
    /// [`new_type_id`]: #method.new_type_id
    pub fn next_id(&self) -> u32 {
        self.next_id.get()
    }

    /// Reserves a fresh type id.  No node exists at that id until you call
    /// [`add_type_at`][].
    ///
    /// [`add_type_at`]: #method.add_type_at
    pub fn new_type_id(&mut self) -> TypeId {
        let id = Handle::new(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    /// Adds a new type node at a freshly allocated id.
    pub fn add_type(&mut self, name: Option<Symbol>, size: u64, kind: TypeKind) -> TypeId {
        let id = self.new_type_id();
        if self.add_type_at(id, name, size, kind).is_err() {
            unreachable!("freshly allocated type id {} is occupied", id);
        }
        id
    }

    /// Adds a new type node at an id that was reserved with [`new_type_id`][] (or, when
    /// reconstructing a graph, at any id that isn't in use yet).
    ///
    /// References to other nodes are not checked here, since they might not exist yet; use
    /// [`validate`][] once the graph is complete.
    ///
    /// [`new_type_id`]: #method.new_type_id
    /// [`validate`]: #method.validate
    pub fn add_type_at(
        &mut self,
        id: TypeId,
        name: Option<Symbol>,
        size: u64,
        kind: TypeKind,
    ) -> Result<(), GraphError> {
        self.store_type(
            TypeNode {
                id,
                name,
                size,
                kind,
            },
            None,
        )
    }

    /// Stores a node.  If `key` is not given, it is computed from the node and its referent in
    /// this graph.
    pub(crate) fn store_type(
        &mut self,
        node: TypeNode,
        key: Option<LayoutKey>,
    ) -> Result<(), GraphError> {
        let id = node.id;
        if self.types.contains(id) {
            return Err(GraphError::DuplicateId(id));
        }
        let key = key.or_else(|| LayoutKey::of(&node, self));
        let dependency = LayoutKey::dependency(&node);
        self.types
            .insert(id, node)
            .map_err(|_| GraphError::DuplicateId(id))?;
        match (key, dependency) {
            (Some(key), _) => self.index_layout(id, key),
            (None, Some(dependency)) => self
                .awaiting_layout
                .entry(dependency)
                .or_default()
                .push(id),
            (None, None) => {}
        }
        for waiting in self.awaiting_layout.remove(&id).unwrap_or_default() {
            if let Some(key) = self.layout_key(waiting) {
                self.index_layout(waiting, key);
            }
        }
        if self.next_id.get() <= id.as_u32() {
            self.next_id =
                NonZeroU32::new(id.as_u32().saturating_add(1)).unwrap_or(NonZeroU32::MAX);
        }
        Ok(())
    }

    /// Copies a node from another graph into this one, interning its symbols.  The caller is
    /// responsible for rewriting the node's references into this graph's id space.
    pub(crate) fn store_foreign_type(
        &mut self,
        mut node: TypeNode,
        key: Option<LayoutKey>,
    ) -> Result<(), GraphError> {
        node.name = self.intern_option(&node.name);
        match &mut node.kind {
            TypeKind::Struct(members) | TypeKind::Union(members) => {
                for member in members {
                    member.name = self.intern_option(&member.name);
                }
            }
            TypeKind::Enum(enumerators) => {
                for enumerator in enumerators {
                    enumerator.name = self.intern(&enumerator.name);
                }
            }
            _ => {}
        }
        self.store_type(node, key)
    }

    fn index_layout(&mut self, id: TypeId, key: LayoutKey) {
        self.layout.entry(key.clone()).or_default().push(id);
        self.layout_keys.insert(id, key);
    }

    /// Returns the type node with the given id, if it exists in this graph.
    pub fn get_type(&self, id: TypeId) -> Option<&TypeNode> {
        self.types.get(id)
    }

    pub(crate) fn get_type_mut(&mut self, id: TypeId) -> Option<&mut TypeNode> {
        self.types.get_mut(id)
    }

    pub fn contains_type(&self, id: TypeId) -> bool {
        self.types.contains(id)
    }

    /// Returns an iterator of all of the type nodes in this graph, in id order.
    pub fn iter_types(&self) -> impl Iterator<Item = &TypeNode> + '_ {
        self.types.iter().map(|(_, node)| node)
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Returns the nodes that share a layout key, in the order they were added.
    pub fn candidates(&self, key: &LayoutKey) -> &[TypeId] {
        self.layout.get(key).map(|ids| ids.as_slice()).unwrap_or(&[])
    }

    /// Returns the layout key of a node, or `None` if the node, or a node that its key depends on,
    /// does not exist.
    pub fn layout_key(&self, id: TypeId) -> Option<LayoutKey> {
        match self.layout_keys.get(&id) {
            Some(key) => Some(key.clone()),
            None => LayoutKey::of(self.get_type(id)?, self),
        }
    }

    /// Returns whether a node is a forward declaration that has been superseded by a definition.
    /// Superseded nodes stay in the graph, but are never merge candidates.
    pub fn is_superseded(&self, id: TypeId) -> bool {
        self.superseded.contains(id)
    }

    /// Removes a node from the layout index, so that later merges will not consider it as a
    /// candidate.  The node itself stays in the graph.
    pub(crate) fn forget_layout(&mut self, id: TypeId) {
        if !self.contains_type(id) {
            return;
        }
        self.superseded.add(id);
        let key = match self.layout_keys.get(&id) {
            Some(key) => key.clone(),
            None => return,
        };
        if let Some(ids) = self.layout.get_mut(&key) {
            ids.retain(|candidate| *candidate != id);
            if ids.is_empty() {
                self.layout.remove(&key);
            }
        }
    }

    /// Adds a declaration to this graph.  Static functions and variables must have an owner.
    pub fn add_declaration(
        &mut self,
        declaration: Declaration,
    ) -> Result<Handle<Declaration>, GraphError> {
        if declaration.kind.is_static() && declaration.owner.is_none() {
            let name = declaration
                .name
                .as_ref()
                .map(|name| name.to_string())
                .unwrap_or_else(|| "<anonymous>".to_string());
            return Err(GraphError::MissingOwner(name));
        }
        Ok(self.store_declaration(declaration))
    }

    pub(crate) fn store_declaration(&mut self, mut declaration: Declaration) -> Handle<Declaration> {
        declaration.name = self.intern_option(&declaration.name);
        declaration.owner = self.intern_option(&declaration.owner);
        let name = declaration.name.clone();
        let handle = self.declarations.add(declaration);
        self.declarations_by_name
            .entry(name)
            .or_default()
            .push(handle);
        handle
    }

    pub fn get_declaration(&self, handle: Handle<Declaration>) -> Option<&Declaration> {
        self.declarations.get(handle)
    }

    pub(crate) fn get_declaration_mut(
        &mut self,
        handle: Handle<Declaration>,
    ) -> Option<&mut Declaration> {
        self.declarations.get_mut(handle)
    }

    /// Returns an iterator of all of the declarations in this graph, in the order they were
    /// added.
    pub fn iter_declarations(&self) -> impl Iterator<Item = (Handle<Declaration>, &Declaration)> + '_ {
        self.declarations.iter()
    }

    pub fn iter_declaration_handles(&self) -> impl Iterator<Item = Handle<Declaration>> {
        self.declarations.iter_handles()
    }

    pub fn declaration_count(&self) -> usize {
        self.declarations.len()
    }

    /// Returns the declarations with a particular name, in the order they were added.
    pub fn declarations_named(&self, name: Option<&Symbol>) -> &[Handle<Declaration>] {
        let found = match name {
            Some(name) => self.declarations_by_name.get(&Some(name.clone())),
            None => self.declarations_by_name.get(&None),
        };
        found.map(|handles| handles.as_slice()).unwrap_or(&[])
    }

    /// Checks that every reference in this graph points at a node that exists, either in this
    /// graph or in `reference`.
    pub fn validate(&self, reference: Option<&TypeGraph>) -> Result<(), GraphError> {
        let exists = |id: TypeId| {
            self.contains_type(id) || reference.map(|r| r.contains_type(id)).unwrap_or(false)
        };
        for node in self.iter_types() {
            for (slot, target) in node.kind.references().into_iter().enumerate() {
                if !exists(target) {
                    return Err(GraphError::MissingNode {
                        referrer: node.id.display(self).to_string(),
                        slot,
                        target,
                    });
                }
            }
        }
        for (handle, decl) in self.iter_declarations() {
            for (slot, target) in decl.references() {
                if !exists(target) {
                    return Err(GraphError::MissingNode {
                        referrer: handle.display(self).to_string(),
                        slot,
                        target,
                    });
                }
            }
        }
        Ok(())
    }

    /// Moves all of the content of `other` into this graph.  Every node keeps its id, so the ids in
    /// `other` must not be in use here.  Declarations are appended.
    pub fn absorb(&mut self, other: TypeGraph) -> Result<(), GraphError> {
        if let Some(collision) = other
            .types
            .iter()
            .map(|(id, _)| id)
            .find(|id| self.contains_type(*id))
        {
            return Err(GraphError::DuplicateId(collision));
        }
        let TypeGraph {
            types,
            layout_keys,
            superseded,
            declarations,
            next_id,
            cur_emark,
            cur_vgen,
            ..
        } = other;
        for (id, node) in types.iter() {
            self.store_foreign_type(node.clone(), layout_keys.get(&id).cloned())?;
            if superseded.contains(id) {
                self.forget_layout(id);
            }
        }
        for (_, decl) in declarations.iter() {
            self.store_declaration(decl.clone());
        }
        self.next_id = self.next_id.max(next_id);
        self.cur_emark = self.cur_emark.max(cur_emark);
        self.cur_vgen = self.cur_vgen.max(cur_vgen);
        Ok(())
    }

    /// Returns the frequency of every type kind and declaration kind in this graph.
    pub fn stats(&self) -> GraphStats {
        let mut types = FrequencyDistribution::default();
        for node in self.iter_types() {
            types.record(node.kind.kind());
        }
        let mut declarations = FrequencyDistribution::default();
        for (_, decl) in self.iter_declarations() {
            declarations.record(decl.kind);
        }
        GraphStats {
            types,
            declarations,
        }
    }
}

impl Default for TypeGraph {
    fn default() -> TypeGraph {
        TypeGraph::new()
    }
}

impl Index<TypeId> for TypeGraph {
    type Output = TypeNode;
    #[inline(always)]
    fn index(&self, id: TypeId) -> &TypeNode {
        &self.types[id]
    }
}

impl Index<Handle<Declaration>> for TypeGraph {
    type Output = Declaration;
    #[inline(always)]
    fn index(&self, handle: Handle<Declaration>) -> &Declaration {
        &self.declarations[handle]
    }
}
