// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, type-graphs authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Counts that describe graphs and merges, for logging and tests.

use std::fmt::Display;
use std::hash::Hash;

use fxhash::FxHashMap;
use itertools::Itertools;

use crate::graph::DeclarationKind;
use crate::graph::Kind;

/// Frequency distribution maintains the frequency of T values.
#[derive(Clone, Debug)]
pub struct FrequencyDistribution<T>
where
    T: Eq + Hash,
{
    values: FxHashMap<T, usize>,
    total: usize,
}

impl<T: Eq + Hash> Default for FrequencyDistribution<T> {
    fn default() -> Self {
        FrequencyDistribution {
            values: FxHashMap::default(),
            total: 0,
        }
    }
}

impl<T: Eq + Hash> FrequencyDistribution<T> {
    pub fn record(&mut self, value: T) {
        *self.values.entry(value).or_default() += 1;
        self.total += 1;
    }

    // The number of recorded values.
    pub fn count(&self) -> usize {
        self.total
    }

    // The number of unique recorded values.
    pub fn unique(&self) -> usize {
        self.values.len()
    }

    /// The number of times a particular value was recorded.
    pub fn get(&self, value: &T) -> usize {
        self.values.get(value).copied().unwrap_or(0)
    }
}

impl<T: Eq + Hash + Ord> FrequencyDistribution<T> {
    /// Returns every recorded value with its count, ordered by value.
    pub fn sorted(&self) -> Vec<(&T, usize)> {
        self.values
            .iter()
            .map(|(value, count)| (value, *count))
            .sorted()
            .collect()
    }
}

impl<T> std::ops::AddAssign<&Self> for FrequencyDistribution<T>
where
    T: Eq + Hash + Clone,
{
    fn add_assign(&mut self, rhs: &Self) {
        for (value, count) in &rhs.values {
            *self.values.entry(value.clone()).or_default() += count;
        }
        self.total += rhs.total;
    }
}

/// The content of one type graph, by kind.
#[derive(Clone, Debug, Default)]
pub struct GraphStats {
    pub types: FrequencyDistribution<Kind>,
    pub declarations: FrequencyDistribution<DeclarationKind>,
}

impl Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} types", self.types.count())?;
        for (kind, count) in self.types.sorted() {
            write!(f, ", {} {}", count, kind)?;
        }
        write!(f, "; {} declarations", self.declarations.count())?;
        for (kind, count) in self.declarations.sorted() {
            write!(f, ", {} {}", count, kind)?;
        }
        Ok(())
    }
}

/// What one merge did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MergeStats {
    /// Child nodes that were mapped onto a node that already existed.
    pub types_mapped: usize,
    /// Nodes that were created in the target.
    pub types_created: usize,
    /// Forward declarations that were superseded by a definition.
    pub forwards_resolved: usize,
    pub declarations_matched: usize,
    pub declarations_created: usize,
    /// Function and variable declarations dropped while uniquifying against a reference.
    pub declarations_suppressed: usize,
    /// Edges that had to be patched after all nodes were created.
    pub remaps: usize,
}

impl std::ops::AddAssign for MergeStats {
    fn add_assign(&mut self, rhs: MergeStats) {
        self.types_mapped += rhs.types_mapped;
        self.types_created += rhs.types_created;
        self.forwards_resolved += rhs.forwards_resolved;
        self.declarations_matched += rhs.declarations_matched;
        self.declarations_created += rhs.declarations_created;
        self.declarations_suppressed += rhs.declarations_suppressed;
        self.remaps += rhs.remaps;
    }
}

impl Display for MergeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} types mapped, {} created, {} forwards resolved, \
             {} declarations matched, {} created, {} suppressed, {} remaps",
            self.types_mapped,
            self.types_created,
            self.forwards_resolved,
            self.declarations_matched,
            self.declarations_created,
            self.declarations_suppressed,
            self.remaps,
        )
    }
}
