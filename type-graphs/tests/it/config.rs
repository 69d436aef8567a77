// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, type-graphs authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;

use maplit::hashmap;
use pretty_assertions::assert_eq;
use type_graphs::config::ConfigError;
use type_graphs::config::BATCH_SIZE_VAR;
use type_graphs::config::MAX_SLOTS_VAR;
use type_graphs::config::THREADS_VAR;
use type_graphs::PipelineConfig;

fn lookup(vars: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
    move |name: &str| vars.get(name).map(|value| value.to_string())
}

#[test]
fn defaults_are_stable() {
    let config = PipelineConfig::default();
    assert_eq!(config.batch_size, 8);
    assert_eq!(config.max_slots, 5);
    assert_eq!(config.input_throttle, 10);
    assert_eq!(config.threads, None);
    assert_eq!(PipelineConfig::from_lookup(|_| None), Ok(config));
}

#[test]
fn can_override_from_variables() {
    let config = PipelineConfig::from_lookup(lookup(hashmap! {
        BATCH_SIZE_VAR => "3",
        THREADS_VAR => " 2 ",
    }))
    .unwrap();
    assert_eq!(
        config,
        PipelineConfig::default()
            .with_batch_size(3)
            .with_threads(2)
    );
}

#[test]
fn rejects_invalid_values() {
    assert_eq!(
        PipelineConfig::from_lookup(lookup(hashmap! { MAX_SLOTS_VAR => "0" })),
        Err(ConfigError::InvalidValue {
            name: MAX_SLOTS_VAR,
            value: "0".to_string(),
        })
    );
    assert_eq!(
        PipelineConfig::from_lookup(lookup(hashmap! { BATCH_SIZE_VAR => "many" })),
        Err(ConfigError::InvalidValue {
            name: BATCH_SIZE_VAR,
            value: "many".to_string(),
        })
    );
}
