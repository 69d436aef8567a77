// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, type-graphs authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

use type_graphs::arena::Handle;
use type_graphs::graph::ArrayType;
use type_graphs::graph::Declaration;
use type_graphs::graph::DeclarationKind;
use type_graphs::graph::Enumerator;
use type_graphs::graph::FunctionType;
use type_graphs::graph::Intrinsic;
use type_graphs::graph::Member;
use type_graphs::graph::TypeGraph;
use type_graphs::graph::TypeId;
use type_graphs::graph::TypeKind;


/// Shorthand for building type graphs in tests.  Member tuples are `(name, byte offset, type)`;
/// every member is 32 bits wide.
pub trait CreateTypeGraph {
    fn int(&mut self, name: &str, bits: u32) -> TypeId;
    fn pointer(&mut self, to: TypeId) -> TypeId;
    fn constant(&mut self, to: TypeId) -> TypeId;
    fn typedef(&mut self, name: &str, to: TypeId) -> TypeId;
    fn forward(&mut self, name: &str) -> TypeId;
    fn structure(&mut self, name: &str, size: u64, members: &[(&str, u64, TypeId)]) -> TypeId;
    fn define_structure(&mut self, id: TypeId, name: &str, size: u64, members: &[(&str, u64, TypeId)]);
    fn array(&mut self, contents: TypeId, index: TypeId, count: u64) -> TypeId;
    fn function(&mut self, ret: TypeId, args: &[TypeId]) -> TypeId;
    fn enumeration(&mut self, name: &str, enumerators: &[(&str, i64)]) -> TypeId;

    fn global(&mut self, name: &str, ty: TypeId) -> Handle<Declaration>;
    fn static_variable(&mut self, owner: &str, name: &str, ty: TypeId) -> Handle<Declaration>;
    fn function_declaration(&mut self, name: &str, ret: TypeId, args: &[TypeId]) -> Handle<Declaration>;
    fn type_declaration(&mut self, name: &str, ty: TypeId) -> Handle<Declaration>;
    fn struct_declaration(&mut self, name: &str, ty: TypeId) -> Handle<Declaration>;
}

fn build_members(graph: &mut TypeGraph, members: &[(&str, u64, TypeId)]) -> Vec<Member> {
    members
        .iter()
        .map(|(name, offset, ty)| Member::new(Some(graph.add_symbol(*name)), *offset, 32, *ty))
        .collect()
}

impl CreateTypeGraph for TypeGraph {
    fn int(&mut self, name: &str, bits: u32) -> TypeId {
        let name = self.add_symbol(name);
        self.add_type(
            Some(name),
            (bits / 8) as u64,
            TypeKind::Intrinsic(Intrinsic::integer(true, bits)),
        )
    }

    fn pointer(&mut self, to: TypeId) -> TypeId {
        self.add_type(None, 8, TypeKind::Pointer(to))
    }

    fn constant(&mut self, to: TypeId) -> TypeId {
        self.add_type(None, 0, TypeKind::Const(to))
    }

    fn typedef(&mut self, name: &str, to: TypeId) -> TypeId {
        let name = self.add_symbol(name);
        self.add_type(Some(name), 0, TypeKind::Typedef(to))
    }

    fn forward(&mut self, name: &str) -> TypeId {
        let name = self.add_symbol(name);
        self.add_type(Some(name), 0, TypeKind::Forward)
    }

    fn structure(&mut self, name: &str, size: u64, members: &[(&str, u64, TypeId)]) -> TypeId {
        let id = self.new_type_id();
        self.define_structure(id, name, size, members);
        id
    }

    fn define_structure(&mut self, id: TypeId, name: &str, size: u64, members: &[(&str, u64, TypeId)]) {
        let name = self.add_symbol(name);
        let members = build_members(self, members);
        self.add_type_at(id, Some(name), size, TypeKind::Struct(members))
            .unwrap();
    }

    fn array(&mut self, contents: TypeId, index: TypeId, count: u64) -> TypeId {
        self.add_type(
            None,
            0,
            TypeKind::Array(ArrayType {
                contents,
                index,
                count,
            }),
        )
    }

    fn function(&mut self, ret: TypeId, args: &[TypeId]) -> TypeId {
        self.add_type(
            None,
            0,
            TypeKind::Function(FunctionType {
                ret,
                args: args.to_vec(),
                varargs: false,
            }),
        )
    }

    fn enumeration(&mut self, name: &str, enumerators: &[(&str, i64)]) -> TypeId {
        let name = self.add_symbol(name);
        let enumerators = enumerators
            .iter()
            .map(|(name, value)| Enumerator {
                name: self.add_symbol(*name),
                value: *value,
            })
            .collect();
        self.add_type(Some(name), 4, TypeKind::Enum(enumerators))
    }

    fn global(&mut self, name: &str, ty: TypeId) -> Handle<Declaration> {
        let name = self.add_symbol(name);
        self.add_declaration(Declaration::new(
            DeclarationKind::GlobalVariable,
            Some(name),
            Some(ty),
        ))
        .unwrap()
    }

    fn static_variable(&mut self, owner: &str, name: &str, ty: TypeId) -> Handle<Declaration> {
        let name = self.add_symbol(name);
        let owner = self.add_symbol(owner);
        self.add_declaration(
            Declaration::new(DeclarationKind::StaticVariable, Some(name), Some(ty))
                .with_owner(owner),
        )
        .unwrap()
    }

    fn function_declaration(&mut self, name: &str, ret: TypeId, args: &[TypeId]) -> Handle<Declaration> {
        let name = self.add_symbol(name);
        self.add_declaration(
            Declaration::new(DeclarationKind::GlobalFunction, Some(name), Some(ret))
                .with_args(args.to_vec(), false),
        )
        .unwrap()
    }

    fn type_declaration(&mut self, name: &str, ty: TypeId) -> Handle<Declaration> {
        let name = self.add_symbol(name);
        self.add_declaration(Declaration::new(DeclarationKind::Type, Some(name), Some(ty)))
            .unwrap()
    }

    fn struct_declaration(&mut self, name: &str, ty: TypeId) -> Handle<Declaration> {
        let name = self.add_symbol(name);
        self.add_declaration(Declaration::new(
            DeclarationKind::StructOrUnion,
            Some(name),
            Some(ty),
        ))
        .unwrap()
    }
}
