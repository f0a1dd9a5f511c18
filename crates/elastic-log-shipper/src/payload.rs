// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Document, mapping and template bodies sent to the backend.

use chrono::SecondsFormat;
use serde_json::{json, Map, Value};

use crate::annotate::annotate;
use crate::config::IndexSettings;
use crate::item::LogItem;

/// Date formats accepted by the `at` field: no fraction, milliseconds and
/// high precision fractions.
pub const DATE_FORMAT: &str = "yyyy-MM-dd'T'HH:mm:ssZ||yyyy-MM-dd'T'HH:mm:ss.SSSZ||yyyy-MM-dd'T'HH:mm:ss.SSSSSSSSSSSSZ";

/// Encodes `item` as the JSON document stored in the index.
///
/// With `annotate_types` set, only the free-form `data` object gets type
/// suffixes; the mapped top-level fields keep their names.
#[must_use]
pub fn encode(item: &LogItem, annotate_types: bool) -> Value {
    let data = Value::Object(item.payload.clone());
    let data = if annotate_types { annotate(data) } else { data };

    let mut doc = Map::new();
    doc.insert("app".into(), Value::from(item.app.as_str()));
    doc.insert("env".into(), Value::from(item.env.as_str()));
    doc.insert("sev".into(), Value::from(item.severity.as_str()));
    doc.insert("thread".into(), Value::from(item.thread_id.as_str()));
    doc.insert("host".into(), Value::from(item.host.as_str()));
    doc.insert("pid".into(), Value::from(item.pid.to_string()));
    doc.insert("data".into(), data);
    doc.insert("msg".into(), Value::from(item.message.as_str()));
    doc.insert(
        "at".into(),
        Value::from(item.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    doc.insert("ns".into(), Value::from(item.namespace.join(".")));
    if let Some(loc) = &item.location {
        doc.insert(
            "loc".into(),
            json!({
                "loc_pkg": loc.package,
                "loc_mod": loc.module,
                "loc_ln": loc.line,
                "loc_fn": loc.function,
                "loc_col": loc.column,
            }),
        );
    }
    Value::Object(doc)
}

/// Field mapping shared by the base index and every sharded index.
#[must_use]
pub fn base_mapping() -> Value {
    let keyword = || json!({"type": "keyword"});
    json!({
        "properties": {
            "thread": keyword(),
            "sev": keyword(),
            "pid": keyword(),
            "ns": keyword(),
            "msg": {"type": "text"},
            "host": keyword(),
            "env": keyword(),
            "app": keyword(),
            "loc": {
                "properties": {
                    "loc_pkg": keyword(),
                    "loc_mod": keyword(),
                    "loc_ln": keyword(),
                    "loc_fn": keyword(),
                    "loc_col": keyword(),
                }
            },
            "at": {"type": "date", "format": DATE_FORMAT},
        }
    })
}

/// Body of an index creation request.
#[must_use]
pub fn index_body(settings: &IndexSettings) -> Value {
    json!({ "settings": settings.to_json() })
}

/// Body of a legacy index template covering `pattern`.
#[must_use]
pub fn template_body(pattern: &str, settings: &IndexSettings, mapping: &Value) -> Value {
    json!({
        "index_patterns": [pattern],
        "settings": settings.to_json(),
        "mappings": mapping,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Location, Severity};
    use chrono::{TimeZone, Utc};

    fn sample_item() -> LogItem {
        let mut item = LogItem::new(Severity::Warning, "disk almost full")
            .at(Utc.with_ymd_and_hms(2016, 1, 2, 3, 4, 5).unwrap())
            .in_namespace(["app", "storage"])
            .with_field("free_mb", 12)
            .with_location(Location {
                package: "main".into(),
                module: "storage::disk".into(),
                function: "check".into(),
                line: 42,
                column: 9,
            });
        item.app = "billing".into();
        item.env = "production".into();
        item.host = "web-1".into();
        item.pid = 1234;
        item.thread_id = "7".into();
        item
    }

    #[test]
    fn test_encode_shape() {
        let doc = encode(&sample_item(), false);
        assert_eq!(doc["msg"], "disk almost full");
        assert_eq!(doc["sev"], "warning");
        assert_eq!(doc["ns"], "app.storage");
        assert_eq!(doc["pid"], "1234");
        assert_eq!(doc["thread"], "7");
        assert_eq!(doc["host"], "web-1");
        assert_eq!(doc["app"], "billing");
        assert_eq!(doc["env"], "production");
        assert_eq!(doc["at"], "2016-01-02T03:04:05.000Z");
        assert_eq!(doc["data"]["free_mb"], 12);
        assert_eq!(doc["loc"]["loc_mod"], "storage::disk");
        assert_eq!(doc["loc"]["loc_ln"], 42);
    }

    #[test]
    fn test_encode_annotates_data_only() {
        let doc = encode(&sample_item(), true);
        assert_eq!(doc["msg"], "disk almost full");
        assert_eq!(doc["data"]["free_mb::d"], 12);
        assert!(doc["data"].get("free_mb").is_none());
    }

    #[test]
    fn test_encode_without_location() {
        let item = LogItem::new(Severity::Info, "no location");
        let doc = encode(&item, false);
        assert!(doc.get("loc").is_none());
    }

    #[test]
    fn test_base_mapping_fields() {
        let mapping = base_mapping();
        let props = &mapping["properties"];
        for field in ["thread", "sev", "pid", "ns", "host", "env", "app"] {
            assert_eq!(props[field]["type"], "keyword", "{field}");
        }
        assert_eq!(props["at"]["type"], "date");
        assert_eq!(props["at"]["format"], DATE_FORMAT);
        assert!(props["loc"]["properties"]["loc_col"].is_object());
    }

    #[test]
    fn test_template_body() {
        let settings = IndexSettings::default();
        let body = template_body("logs-*", &settings, &base_mapping());
        assert_eq!(body["index_patterns"][0], "logs-*");
        assert_eq!(
            body["settings"]["number_of_shards"],
            settings.number_of_shards
        );
        assert!(body["mappings"]["properties"].is_object());
    }
}
