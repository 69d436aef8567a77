// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, type-graphs authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

use std::num::NonZeroU32;

use type_graphs::arena::Handle;
use type_graphs::graph::Declaration;
use type_graphs::graph::DeclarationKind;
use type_graphs::graph::GraphError;
use type_graphs::graph::Kind;
use type_graphs::graph::TypeGraph;
use type_graphs::graph::TypeId;
use type_graphs::graph::TypeKind;

use crate::test_graphs;
use crate::test_graphs::CreateTypeGraph;

#[test]
fn can_create_symbols() {
    let mut graph = TypeGraph::new();
    let a1 = graph.add_symbol("a");
    let a2 = graph.add_symbol("a");
    let b = graph.add_symbol("b");
    assert_eq!(a1, a2);
    assert_ne!(a1, b);
    assert_eq!(a1.as_str(), "a");
    assert_eq!(graph.symbol("a"), Some(a1));
    assert_eq!(graph.symbol("c"), None);
}

#[test]
fn can_build_cyclic_graphs() {
    let graph = test_graphs::linked_list::new();
    assert!(graph.validate(None).is_ok());
    assert_eq!(graph.type_count(), 5);
    assert_eq!(graph.declaration_count(), 3);
    assert_eq!(graph.next_id(), 6);

    let list = graph.iter_types().find(|node| node.kind.is_definition()).unwrap();
    let next = match &list.kind {
        TypeKind::Struct(members) => members[1].ty,
        _ => panic!("list should be a struct"),
    };
    assert_eq!(graph[next].kind, TypeKind::Pointer(list.id));
}

#[test]
fn can_display_types_and_declarations() {
    let graph = test_graphs::linked_list::new();
    let ids = graph.iter_types().map(|node| node.id).collect::<Vec<_>>();
    let rendered = ids
        .iter()
        .map(|id| id.display(&graph).to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        rendered,
        vec![
            "intrinsic int (#1)",
            "struct list (#2)",
            "pointer <anonymous> (#3)",
            "typedef list_t (#4)",
            "pointer <anonymous> (#5)",
        ]
    );
    let missing: TypeId = Handle::from_u32(99).unwrap();
    assert_eq!(missing.display(&graph).to_string(), "<missing> (#99)");

    let decls = graph
        .iter_declaration_handles()
        .map(|handle| handle.display(&graph).to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        decls,
        vec![
            "struct/union list (#1)",
            "type list_t (#2)",
            "global variable head (#3)"
        ]
    );
}

#[test]
fn validation_finds_dangling_references() {
    let mut graph = TypeGraph::new();
    let ghost = graph.new_type_id();
    graph.global("ghost", ghost);
    assert_eq!(
        graph.validate(None),
        Err(GraphError::MissingNode {
            referrer: "global variable ghost (#1)".to_string(),
            slot: 0,
            target: ghost,
        })
    );

    // The same reference is fine if another graph supplies the node.
    let mut reference = TypeGraph::new();
    reference.int("int", 32);
    assert!(graph.validate(Some(&reference)).is_ok());
}

#[test]
fn cannot_reuse_type_ids() {
    let mut graph = TypeGraph::new();
    let int = graph.int("int", 32);
    let name = graph.add_symbol("long");
    assert_eq!(
        graph.add_type_at(int, Some(name), 8, TypeKind::Forward),
        Err(GraphError::DuplicateId(int))
    );
    assert_eq!(graph.type_count(), 1);
}

#[test]
fn static_declarations_need_owners() {
    let mut graph = TypeGraph::new();
    let name = graph.add_symbol("helper");
    assert_eq!(
        graph.add_declaration(Declaration::new(
            DeclarationKind::StaticFunction,
            Some(name.clone()),
            None
        )),
        Err(GraphError::MissingOwner("helper".to_string()))
    );
    let owner = graph.add_symbol("helper.c");
    let handle = graph
        .add_declaration(
            Declaration::new(DeclarationKind::StaticFunction, Some(name.clone()), None)
                .with_owner(owner),
        )
        .unwrap();
    assert_eq!(graph.declarations_named(Some(&name)), &[handle]);
}

#[test]
fn forwards_share_a_layout_bucket_with_definitions() {
    let mut graph = TypeGraph::new();
    let int = graph.int("int", 32);
    let forward = graph.forward("node");
    let definition = graph.structure("node", 4, &[("value", 0, int)]);
    let other = graph.structure("other", 4, &[("value", 0, int)]);
    let key = graph.layout_key(forward).unwrap();
    assert_eq!(key.family(), Kind::Struct);
    assert_eq!(graph.layout_key(definition), Some(key.clone()));
    assert_eq!(graph.candidates(&key), &[forward, definition]);
    assert_ne!(graph.layout_key(other), Some(key));
}

#[test]
fn can_absorb_graphs() {
    let mut graph = test_graphs::global_counter::new();
    let mut other = TypeGraph::starting_at(NonZeroU32::new(10).unwrap());
    let long = other.int("long", 64);
    other.global("total", long);

    graph.absorb(other).unwrap();
    assert_eq!(long.as_u32(), 10);
    assert_eq!(graph.type_count(), 2);
    assert_eq!(graph.declaration_count(), 2);
    assert_eq!(graph.next_id(), 11);
    assert_eq!(graph[long].name.as_ref().map(|n| n.as_str()), Some("long"));
    assert!(graph.validate(None).is_ok());
}

#[test]
fn cannot_absorb_colliding_graphs() {
    let mut graph = test_graphs::global_counter::new();
    let other = test_graphs::global_counter::new();
    let collision = other.iter_types().next().unwrap().id;
    assert_eq!(graph.absorb(other), Err(GraphError::DuplicateId(collision)));
    assert_eq!(graph.type_count(), 1);
}

#[test]
fn pointers_are_bucketed_by_their_referent() {
    let mut graph = TypeGraph::new();
    let int = graph.int("int", 32);
    let mut pointers = Vec::new();
    for index in 0..100 {
        let s = graph.structure(&format!("s{}", index), 4, &[("x", 0, int)]);
        pointers.push(graph.pointer(s));
    }
    let key = graph.layout_key(pointers[0]).unwrap();
    assert_eq!(key.family(), Kind::Pointer);
    assert_eq!(graph.candidates(&key), &pointers[..1]);

    let int_ptr = graph.pointer(int);
    let const_int = graph.constant(int);
    assert_ne!(graph.layout_key(int_ptr), Some(key));
    assert_ne!(graph.layout_key(int_ptr), graph.layout_key(const_int));
}

#[test]
fn pointers_are_indexed_once_their_referent_exists() {
    let mut graph = TypeGraph::new();
    let list = graph.new_type_id();
    let next = graph.pointer(list);
    assert_eq!(graph.layout_key(next), None);

    let int = graph.int("int", 32);
    graph.define_structure(list, "list", 8, &[("value", 0, int), ("next", 4, next)]);
    let key = graph.layout_key(next).unwrap();
    assert_eq!(graph.candidates(&key), &[next]);

    // A pointer to a forward of the same name lands in the same bucket.
    let forward = graph.forward("list");
    let forward_ptr = graph.pointer(forward);
    assert_eq!(graph.layout_key(forward_ptr), Some(key.clone()));
    assert_eq!(graph.candidates(&key), &[next, forward_ptr]);
}
