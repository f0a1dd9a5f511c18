// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Type annotation of payload keys.
//!
//! Elasticsearch fixes the type of a field the first time it sees it, so two
//! applications logging `"id": 5` and `"id": "abc"` into the same index make
//! one of them fail. Suffixing every key with the kind of its value keeps the
//! fields apart:
//!
//! ```text
//! {"id": 5, "ok": true}  ->  {"id::d": 5, "ok::b": true}
//! ```

use serde_json::{Map, Value};

pub const STRING_SUFFIX: &str = "::s";
pub const NUMBER_SUFFIX: &str = "::d";
pub const BOOL_SUFFIX: &str = "::b";
pub const NULL_SUFFIX: &str = "::n";

const SUFFIXES: [&str; 4] = [STRING_SUFFIX, NUMBER_SUFFIX, BOOL_SUFFIX, NULL_SUFFIX];

/// Renames the keys of every object in `value` after the kind of their value.
///
/// Objects and arrays keep their key untouched and are annotated recursively.
#[must_use]
pub fn annotate(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(annotate_object(map)),
        Value::Array(values) => Value::Array(values.into_iter().map(annotate).collect()),
        other => other,
    }
}

fn annotate_object(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| match value {
            Value::String(_) => (key + STRING_SUFFIX, value),
            Value::Number(_) => (key + NUMBER_SUFFIX, value),
            Value::Bool(_) => (key + BOOL_SUFFIX, value),
            Value::Null => (key + NULL_SUFFIX, value),
            Value::Object(inner) => (key, Value::Object(annotate_object(inner))),
            Value::Array(values) => (key, Value::Array(values.into_iter().map(annotate).collect())),
        })
        .collect()
}

/// Strips annotation suffixes added by [`annotate`].
#[must_use]
pub fn deannotate(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (strip_suffix(key), deannotate(value)))
                .collect(),
        ),
        Value::Array(values) => Value::Array(values.into_iter().map(deannotate).collect()),
        other => other,
    }
}

fn strip_suffix(key: String) -> String {
    for suffix in SUFFIXES {
        if let Some(stripped) = key.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    key
}
