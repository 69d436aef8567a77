// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, type-graphs authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

use pretty_assertions::assert_eq;
use type_graphs::graph::Kind;
use type_graphs::serde::Error;
use type_graphs::serde::TypeGraphSnapshot;
use type_graphs::MergeContext;
use type_graphs::TypeGraph;

use crate::test_graphs;
use crate::test_graphs::CreateTypeGraph;
use crate::util::dump;
use crate::util::types_named;

#[test]
fn serde_json_type_graph() {
    let graph = test_graphs::global_counter::new();
    let snapshot = TypeGraphSnapshot::from_graph(&graph);
    let actual = serde_json::to_value(&snapshot).expect("Cannot serialize graph");
    let expected = serde_json::json!({
        "first_id": 1,
        "next_id": 2,
        "types": [{
            "id": 1,
            "name": "int",
            "size": 4,
            "kind": "intrinsic",
            "encoding": {
                "format": "integer",
                "signed": true,
                "char": false,
                "bool": false,
                "varargs": false
            },
            "offset": 0,
            "bits": 32
        }],
        "declarations": [{
            "kind": "global_variable",
            "name": "counter",
            "ty": 1,
            "varargs": false
        }]
    });
    assert_eq!(actual, expected);
}

#[test]
fn can_rebuild_graphs_from_snapshots() {
    let graph = test_graphs::linked_list::new();
    let snapshot = TypeGraphSnapshot::from_graph(&graph);
    let json = serde_json::to_string(&snapshot).expect("Cannot serialize graph");
    let decoded: TypeGraphSnapshot = serde_json::from_str(&json).expect("Cannot deserialize graph");
    assert_eq!(decoded, snapshot);

    let rebuilt = decoded.to_graph().expect("Cannot rebuild graph");
    assert_eq!(dump(&rebuilt), dump(&graph));
    assert_eq!(rebuilt.next_id(), graph.next_id());
    assert!(rebuilt.validate(None).is_ok());
}

#[test]
fn snapshots_reject_zero_ids() {
    let snapshot: TypeGraphSnapshot = serde_json::from_value(serde_json::json!({
        "first_id": 1,
        "next_id": 2,
        "types": [{ "id": 1, "size": 8, "kind": "pointer", "ty": 0 }],
        "declarations": []
    }))
    .expect("Cannot deserialize graph");
    assert_eq!(snapshot.to_graph().err(), Some(Error::InvalidTypeId(0)));
}

/// `struct s; struct s *p;`
fn forward_only() -> TypeGraph {
    let mut graph = TypeGraph::new();
    let s = graph.forward("s");
    let p = graph.pointer(s);
    graph.global("p", p);
    graph
}

/// `struct s { int x; }; struct s *q;`
fn definition() -> TypeGraph {
    let mut graph = TypeGraph::new();
    let int = graph.int("int", 32);
    let s = graph.structure("s", 4, &[("x", 0, int)]);
    let q = graph.pointer(s);
    graph.global("q", q);
    graph
}

#[test]
fn snapshots_preserve_merge_state() {
    let mut cx = MergeContext::new();
    let mut graph = TypeGraph::new();
    cx.merge_into(&forward_only(), &mut graph).unwrap();
    cx.merge_into(&definition(), &mut graph).unwrap();
    let forward = types_named(&graph, Kind::Forward, "s")[0];
    assert!(graph.is_superseded(forward));

    let snapshot = TypeGraphSnapshot::from_graph(&graph);
    assert!(snapshot.cur_emark > 0);
    assert!(snapshot.cur_vgen > 0);
    let json = serde_json::to_string(&snapshot).expect("Cannot serialize graph");
    let decoded: TypeGraphSnapshot = serde_json::from_str(&json).expect("Cannot deserialize graph");
    assert_eq!(decoded, snapshot);

    let mut rebuilt = decoded.to_graph().expect("Cannot rebuild graph");
    assert!(rebuilt.is_superseded(forward));
    let key = rebuilt.layout_key(forward).unwrap();
    assert_eq!(rebuilt.candidates(&key), graph.candidates(&key));
    assert!(!rebuilt.candidates(&key).contains(&forward));
    assert_eq!(TypeGraphSnapshot::from_graph(&rebuilt), snapshot);

    cx.merge_into(&forward_only(), &mut graph).unwrap();
    cx.merge_into(&forward_only(), &mut rebuilt).unwrap();
    assert_eq!(dump(&rebuilt), dump(&graph));
}
