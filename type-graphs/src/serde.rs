// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, type-graphs authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! A plain, serializable mirror of a [`TypeGraph`][], for debugging dumps.
//!
//! [`TypeGraph`]: ../graph/struct.TypeGraph.html

use std::num::NonZeroU32;

use enumset::EnumSet;
use thiserror::Error;

use crate::arena::Handle;
use crate::graph::DeclarationKind;
use crate::graph::GraphError;
use crate::graph::IntegerFlag;
use crate::graph::RealFormat;
use crate::graph::TypeId;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum Error {
    #[error("`{0}` is not a valid type id")]
    InvalidTypeId(u32),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Clone, Debug, Default, Eq, PartialEq, ::serde::Deserialize, ::serde::Serialize)]
pub struct TypeGraphSnapshot {
    pub first_id: u32,
    pub next_id: u32,
    /// The graph's equivalence mark and visit generation counters, which later merges continue
    /// from.
    #[serde(skip_serializing_if = "is_zero", default)]
    pub cur_emark: u64,
    #[serde(skip_serializing_if = "is_zero", default)]
    pub cur_vgen: u64,
    pub types: Vec<Type>,
    pub declarations: Vec<Declaration>,
}

#[derive(Clone, Debug, Eq, PartialEq, ::serde::Deserialize, ::serde::Serialize)]
pub struct Type {
    pub id: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    pub size: u64,
    /// Set on forward declarations that a definition has superseded.
    #[serde(skip_serializing_if = "is_false", default)]
    pub superseded: bool,
    #[serde(flatten)]
    pub kind: TypeKind,
}

#[derive(Clone, Debug, Eq, PartialEq, ::serde::Deserialize, ::serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeKind {
    Intrinsic {
        encoding: Encoding,
        offset: u32,
        bits: u32,
    },
    Pointer {
        ty: u32,
    },
    Array {
        contents: u32,
        index: u32,
        count: u64,
    },
    Function {
        ret: u32,
        args: Vec<u32>,
        varargs: bool,
    },
    Struct {
        members: Vec<Member>,
    },
    Union {
        members: Vec<Member>,
    },
    Enum {
        enumerators: Vec<Enumerator>,
    },
    Forward,
    Typedef {
        ty: u32,
    },
    Volatile {
        ty: u32,
    },
    Const {
        ty: u32,
    },
    Restrict {
        ty: u32,
    },
    PtrAuth {
        ty: u32,
        key: u32,
        discriminator: u32,
        discriminated: bool,
    },
}

#[derive(Clone, Debug, Eq, PartialEq, ::serde::Deserialize, ::serde::Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum Encoding {
    Integer {
        signed: bool,
        #[serde(default)]
        char: bool,
        #[serde(default)]
        bool: bool,
        #[serde(default)]
        varargs: bool,
    },
    Real {
        real: RealFormat,
    },
}

#[derive(Clone, Debug, Eq, PartialEq, ::serde::Deserialize, ::serde::Serialize)]
pub struct Member {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    pub offset: u64,
    pub bits: u64,
    pub ty: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, ::serde::Deserialize, ::serde::Serialize)]
pub struct Enumerator {
    pub name: String,
    pub value: i64,
}

#[derive(Clone, Debug, Eq, PartialEq, ::serde::Deserialize, ::serde::Serialize)]
pub struct Declaration {
    pub kind: DeclarationKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ty: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub args: Vec<u32>,
    #[serde(default)]
    pub varargs: bool,
}

//-------------------------------------------------------------------------------------------------
// Conversions

fn is_zero(value: &u64) -> bool {
    *value == 0
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn name_of(symbol: &Option<crate::graph::Symbol>) -> Option<String> {
    symbol.as_ref().map(|symbol| symbol.to_string())
}

fn ids(ids: &[TypeId]) -> Vec<u32> {
    ids.iter().map(|id| id.as_u32()).collect()
}

fn type_id(id: u32) -> Result<TypeId, Error> {
    Handle::from_u32(id).ok_or(Error::InvalidTypeId(id))
}

fn type_ids(ids: &[u32]) -> Result<Vec<TypeId>, Error> {
    ids.iter().map(|id| type_id(*id)).collect()
}

impl TypeGraphSnapshot {
    pub fn from_graph(graph: &crate::graph::TypeGraph) -> TypeGraphSnapshot {
        let types = graph
            .iter_types()
            .map(|node| Type {
                id: node.id.as_u32(),
                name: name_of(&node.name),
                size: node.size,
                superseded: graph.is_superseded(node.id),
                kind: TypeKind::from_kind(&node.kind),
            })
            .collect();
        let declarations = graph
            .iter_declarations()
            .map(|(_, decl)| Declaration {
                kind: decl.kind,
                name: name_of(&decl.name),
                owner: name_of(&decl.owner),
                ty: decl.ty.map(|ty| ty.as_u32()),
                args: ids(&decl.args),
                varargs: decl.varargs,
            })
            .collect();
        TypeGraphSnapshot {
            first_id: graph.first_id(),
            next_id: graph.next_id(),
            cur_emark: graph.cur_emark,
            cur_vgen: graph.cur_vgen,
            types,
            declarations,
        }
    }

    /// Rebuilds the graph that this snapshot describes, including all of its indexes.
    pub fn to_graph(&self) -> Result<crate::graph::TypeGraph, Error> {
        let first = NonZeroU32::new(self.first_id).ok_or(Error::InvalidTypeId(self.first_id))?;
        let mut graph = crate::graph::TypeGraph::starting_at(first);
        for node in &self.types {
            let name = node.name.as_ref().map(|name| graph.add_symbol(name));
            let kind = node.kind.to_kind(&mut graph)?;
            graph.add_type_at(type_id(node.id)?, name, node.size, kind)?;
        }
        for decl in &self.declarations {
            let name = decl.name.as_ref().map(|name| graph.add_symbol(name));
            let owner = decl.owner.as_ref().map(|owner| graph.add_symbol(owner));
            let ty = decl.ty.map(type_id).transpose()?;
            graph.add_declaration(crate::graph::Declaration {
                kind: decl.kind,
                name,
                owner,
                ty,
                args: type_ids(&decl.args)?,
                varargs: decl.varargs,
            })?;
        }
        for node in self.types.iter().filter(|node| node.superseded) {
            graph.forget_layout(type_id(node.id)?);
        }
        if let Some(next_id) = NonZeroU32::new(self.next_id) {
            graph.next_id = graph.next_id.max(next_id);
        }
        graph.cur_emark = self.cur_emark;
        graph.cur_vgen = self.cur_vgen;
        Ok(graph)
    }
}

impl TypeKind {
    fn from_kind(kind: &crate::graph::TypeKind) -> TypeKind {
        use crate::graph::TypeKind as K;
        match kind {
            K::Intrinsic(intrinsic) => TypeKind::Intrinsic {
                encoding: match intrinsic.encoding {
                    crate::graph::Encoding::Integer { signed, flags } => Encoding::Integer {
                        signed,
                        char: flags.contains(IntegerFlag::Char),
                        bool: flags.contains(IntegerFlag::Bool),
                        varargs: flags.contains(IntegerFlag::Varargs),
                    },
                    crate::graph::Encoding::Real(real) => Encoding::Real { real },
                },
                offset: intrinsic.offset,
                bits: intrinsic.bits,
            },
            K::Pointer(ty) => TypeKind::Pointer { ty: ty.as_u32() },
            K::Array(array) => TypeKind::Array {
                contents: array.contents.as_u32(),
                index: array.index.as_u32(),
                count: array.count,
            },
            K::Function(function) => TypeKind::Function {
                ret: function.ret.as_u32(),
                args: ids(&function.args),
                varargs: function.varargs,
            },
            K::Struct(members) => TypeKind::Struct {
                members: Member::from_members(members),
            },
            K::Union(members) => TypeKind::Union {
                members: Member::from_members(members),
            },
            K::Enum(enumerators) => TypeKind::Enum {
                enumerators: enumerators
                    .iter()
                    .map(|e| Enumerator {
                        name: e.name.to_string(),
                        value: e.value,
                    })
                    .collect(),
            },
            K::Forward => TypeKind::Forward,
            K::Typedef(ty) => TypeKind::Typedef { ty: ty.as_u32() },
            K::Volatile(ty) => TypeKind::Volatile { ty: ty.as_u32() },
            K::Const(ty) => TypeKind::Const { ty: ty.as_u32() },
            K::Restrict(ty) => TypeKind::Restrict { ty: ty.as_u32() },
            K::PtrAuth(ptrauth) => TypeKind::PtrAuth {
                ty: ptrauth.ty.as_u32(),
                key: ptrauth.key,
                discriminator: ptrauth.discriminator,
                discriminated: ptrauth.discriminated,
            },
        }
    }

    fn to_kind(
        &self,
        graph: &mut crate::graph::TypeGraph,
    ) -> Result<crate::graph::TypeKind, Error> {
        use crate::graph::TypeKind as K;
        Ok(match self {
            TypeKind::Intrinsic {
                encoding,
                offset,
                bits,
            } => K::Intrinsic(crate::graph::Intrinsic {
                encoding: match encoding {
                    Encoding::Integer {
                        signed,
                        char,
                        bool,
                        varargs,
                    } => {
                        let mut flags = EnumSet::empty();
                        if *char {
                            flags |= IntegerFlag::Char;
                        }
                        if *bool {
                            flags |= IntegerFlag::Bool;
                        }
                        if *varargs {
                            flags |= IntegerFlag::Varargs;
                        }
                        crate::graph::Encoding::Integer {
                            signed: *signed,
                            flags,
                        }
                    }
                    Encoding::Real { real } => crate::graph::Encoding::Real(*real),
                },
                offset: *offset,
                bits: *bits,
            }),
            TypeKind::Pointer { ty } => K::Pointer(type_id(*ty)?),
            TypeKind::Array {
                contents,
                index,
                count,
            } => K::Array(crate::graph::ArrayType {
                contents: type_id(*contents)?,
                index: type_id(*index)?,
                count: *count,
            }),
            TypeKind::Function { ret, args, varargs } => K::Function(crate::graph::FunctionType {
                ret: type_id(*ret)?,
                args: type_ids(args)?,
                varargs: *varargs,
            }),
            TypeKind::Struct { members } => K::Struct(Member::to_members(members, graph)?),
            TypeKind::Union { members } => K::Union(Member::to_members(members, graph)?),
            TypeKind::Enum { enumerators } => K::Enum(
                enumerators
                    .iter()
                    .map(|e| crate::graph::Enumerator {
                        name: graph.add_symbol(&e.name),
                        value: e.value,
                    })
                    .collect(),
            ),
            TypeKind::Forward => K::Forward,
            TypeKind::Typedef { ty } => K::Typedef(type_id(*ty)?),
            TypeKind::Volatile { ty } => K::Volatile(type_id(*ty)?),
            TypeKind::Const { ty } => K::Const(type_id(*ty)?),
            TypeKind::Restrict { ty } => K::Restrict(type_id(*ty)?),
            TypeKind::PtrAuth {
                ty,
                key,
                discriminator,
                discriminated,
            } => K::PtrAuth(crate::graph::PtrAuth {
                ty: type_id(*ty)?,
                key: *key,
                discriminator: *discriminator,
                discriminated: *discriminated,
            }),
        })
    }
}

impl Member {
    fn from_members(members: &[crate::graph::Member]) -> Vec<Member> {
        members
            .iter()
            .map(|member| Member {
                name: name_of(&member.name),
                offset: member.offset,
                bits: member.bits,
                ty: member.ty.as_u32(),
            })
            .collect()
    }

    fn to_members(
        members: &[Member],
        graph: &mut crate::graph::TypeGraph,
    ) -> Result<Vec<crate::graph::Member>, Error> {
        members
            .iter()
            .map(|member| {
                Ok(crate::graph::Member {
                    name: member.name.as_ref().map(|name| graph.add_symbol(name)),
                    offset: member.offset,
                    bits: member.bits,
                    ty: type_id(member.ty)?,
                })
            })
            .collect()
    }
}
