// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, type-graphs authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Type graphs describe the types of a compiled program: its structs, unions, enums, pointers,
//! functions, arrays, typedefs and qualifiers, along with the functions, variables and named types
//! that are declared in terms of them.  A compiler emits one type graph per translation unit.  Most
//! of those graphs repeat each other (every file that includes the same header describes the same
//! structs), so before embedding type information into a linked binary, a toolchain wants to fold
//! all of them into a single graph that describes every distinct type exactly once.
//!
//! This crate does that folding.  The core operation is [merging][`merge::MergeContext`] a _child_
//! graph into a _parent_ (or accumulator) graph: every child type is mapped onto an equivalent
//! parent type if there is one, and created otherwise.  Equivalence is structural, and tolerates
//! arbitrarily cyclic graphs.  A forward declaration in one translation unit is resolved once a
//! later translation unit supplies the definition.
//!
//! Merging thousands of graphs one after the other is slow, so the [`pipeline`][] module merges
//! them on a pool of worker threads.  The pipeline is carefully scheduled so that its result is
//! fully deterministic: the same inputs produce the same graph, id for id, regardless of how many
//! threads run or how they interleave.
//!
//! ## Graph representation
//!
//! All nodes of a graph live in an [arena][`arena::Arena`] owned by the [`TypeGraph`][], and
//! edges are [handles][`arena::Handle`] into that arena.  Every id is stable for the life of the
//! graph, which lets the merge algorithm allocate the ids of new nodes before creating them, and
//! lets graphs that were _uniquified_ against a reference graph point into that reference.
//!
//! [`TypeGraph`]: graph/struct.TypeGraph.html

pub mod arena;
pub mod config;
#[macro_use]
mod debugging;
pub mod equivalence;
pub mod graph;
pub mod layout;
pub mod merge;
pub mod pipeline;
#[cfg(feature = "serde")]
pub mod serde;
pub mod stats;

pub use crate::config::PipelineConfig;
pub use crate::graph::TypeGraph;
pub use crate::graph::TypeId;
pub use crate::merge::MergeContext;
pub use crate::merge::MergeError;
pub use crate::pipeline::MergePipeline;
pub use crate::pipeline::PipelineError;
