// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, type-graphs authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Tunables of the merge pipeline.

use thiserror::Error;

pub const BATCH_SIZE_VAR: &str = "TYPE_GRAPHS_BATCH_SIZE";
pub const MAX_SLOTS_VAR: &str = "TYPE_GRAPHS_MAX_SLOTS";
pub const INPUT_THROTTLE_VAR: &str = "TYPE_GRAPHS_INPUT_THROTTLE";
pub const THREADS_VAR: &str = "TYPE_GRAPHS_THREADS";

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, not `{value}`")]
    InvalidValue { name: &'static str, value: String },
}

/// Controls how the [`MergePipeline`][] sizes and schedules its work.
///
/// The final graph only depends on the inputs, `batch_size`, and `max_slots`; thread count and
/// throttling affect speed and memory use, never the result.
///
/// [`MergePipeline`]: ../pipeline/struct.MergePipeline.html
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PipelineConfig {
    /// How many graphs are accumulated in a slot before it is handed to the reduction phase.
    pub batch_size: usize,
    /// The maximum number of slots that accumulate graphs concurrently.
    pub max_slots: usize,
    /// Producers block while more than `input_throttle` graphs per worker are queued.
    pub input_throttle: usize,
    /// The number of worker threads; defaults to one and a half per CPU.
    pub threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> PipelineConfig {
        PipelineConfig {
            batch_size: 8,
            max_slots: 5,
            input_throttle: 10,
            threads: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_slots(mut self, max_slots: usize) -> Self {
        self.max_slots = max_slots;
        self
    }

    pub fn with_input_throttle(mut self, input_throttle: usize) -> Self {
        self.input_throttle = input_throttle;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Returns the default configuration, overridden by any of the `TYPE_GRAPHS_*` environment
    /// variables that are set.
    pub fn from_env() -> Result<PipelineConfig, ConfigError> {
        PipelineConfig::from_lookup(|name| std::env::var(name).ok())
    }

    /// Returns the default configuration, overridden by every variable that `lookup` finds.
    pub fn from_lookup<F>(lookup: F) -> Result<PipelineConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = PipelineConfig::default();
        if let Some(value) = parse(&lookup, BATCH_SIZE_VAR)? {
            config.batch_size = value;
        }
        if let Some(value) = parse(&lookup, MAX_SLOTS_VAR)? {
            config.max_slots = value;
        }
        if let Some(value) = parse(&lookup, INPUT_THROTTLE_VAR)? {
            config.input_throttle = value;
        }
        if let Some(value) = parse(&lookup, THREADS_VAR)? {
            config.threads = Some(value);
        }
        Ok(config)
    }
}

fn parse<F>(lookup: &F, name: &'static str) -> Result<Option<usize>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = match lookup(name) {
        Some(value) => value,
        None => return Ok(None),
    };
    match value.trim().parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(Some(parsed)),
        _ => Err(ConfigError::InvalidValue { name, value }),
    }
}
