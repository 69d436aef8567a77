// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, type-graphs authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

use type_graphs::graph::DeclarationKind;
use type_graphs::graph::Kind;
use type_graphs::stats::FrequencyDistribution;
use type_graphs::stats::MergeStats;
use type_graphs::MergeContext;
use type_graphs::TypeGraph;

use crate::test_graphs;
use crate::util::count_kind;

#[test]
fn can_count_graph_contents() {
    let graph = test_graphs::linked_list::new();
    let stats = graph.stats();
    assert_eq!(stats.types.count(), 5);
    assert_eq!(stats.types.unique(), 4);
    assert_eq!(stats.types.get(&Kind::Pointer), 2);
    assert_eq!(stats.declarations.get(&DeclarationKind::GlobalVariable), 1);
    assert_eq!(count_kind(&graph, Kind::Union), 0);
    assert_eq!(
        stats.to_string(),
        "5 types, 1 intrinsic, 2 pointer, 1 struct, 1 typedef; \
         3 declarations, 1 global variable, 1 type, 1 struct/union"
    );
}

#[test]
fn can_combine_frequency_distributions() {
    let mut a = FrequencyDistribution::default();
    a.record("x");
    a.record("y");
    let mut b = FrequencyDistribution::default();
    b.record("x");
    a += &b;
    assert_eq!(a.count(), 3);
    assert_eq!(a.get(&"x"), 2);
    assert_eq!(a.sorted(), vec![(&"x", 2), (&"y", 1)]);
}

#[test]
fn can_accumulate_merge_stats() {
    let mut cx = MergeContext::new();
    let mut accumulator = TypeGraph::new();
    let mut total = MergeStats::default();
    for _ in 0..3 {
        total += cx
            .merge_into(&test_graphs::linked_list::new(), &mut accumulator)
            .unwrap();
    }
    assert_eq!(total.types_created, 5);
    assert_eq!(total.types_mapped, 10);
    assert_eq!(total.declarations_created, 3);
    assert_eq!(total.declarations_matched, 6);
    assert_eq!(
        total.to_string(),
        "10 types mapped, 5 created, 0 forwards resolved, \
         6 declarations matched, 3 created, 0 suppressed, 1 remaps"
    );
}
