//! Upgrades of stored feed documents
//!
//! Each migration takes the `data` part of a document at version `N` and
//! rewrites it into version `N + 1`. Migrations only add or normalize fields;
//! they never drop user data.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value, json};

/// Version written by this build
pub const CURRENT_VERSION: u32 = 5;

type Migration = fn(&mut Value);

/// `(from_version, description, migration)` in application order
const MIGRATIONS: &[(u32, &str, Migration)] = &[
    (0, "feed enabled flag", migrate_v1),
    (1, "feed channel", migrate_v2),
    (2, "item enabled flag", migrate_v3),
    (3, "item media size", migrate_v4),
    (4, "publish dates as RFC 3339", migrate_v5),
];

/// Split a stored document and bring its data to [`CURRENT_VERSION`]
///
/// Documents without an envelope are treated as version 0.
pub fn upgrade(document: Value) -> Result<Value> {
    let (version, mut data) = split_envelope(document)?;

    if version > CURRENT_VERSION {
        return Err(Error::Persistence(format!(
            "stored feeds have version {version}, newest supported is {CURRENT_VERSION}"
        )));
    }

    for (from, description, migrate) in MIGRATIONS {
        if version <= *from {
            tracing::info!(from = *from, to = *from + 1, description, "applying feed store migration");
            migrate(&mut data);
        }
    }
    Ok(data)
}

fn split_envelope(document: Value) -> Result<(u32, Value)> {
    match document {
        Value::Object(mut map) if map.contains_key("version") && map.contains_key("data") => {
            let version = map
                .get("version")
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| Error::Persistence("invalid document version".to_string()))?;
            let data = map.remove("data").unwrap_or(Value::Null);
            Ok((version, data))
        }
        Value::Object(map) => Ok((0, Value::Object(map))),
        _ => Err(Error::Persistence(
            "stored feeds are not a JSON object".to_string(),
        )),
    }
}

fn feeds_mut(data: &mut Value) -> impl Iterator<Item = &mut Map<String, Value>> {
    data.get_mut("feeds")
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object_mut)
}

fn items_mut(feed: &mut Map<String, Value>) -> impl Iterator<Item = &mut Map<String, Value>> {
    feed.get_mut("channel")
        .and_then(|channel| channel.get_mut("items"))
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object_mut)
}

/// Migration v1: feeds gain the `enabled` flag
fn migrate_v1(data: &mut Value) {
    for feed in feeds_mut(data) {
        feed.entry("enabled").or_insert(Value::Bool(true));
    }
}

/// Migration v2: feeds without a channel get an empty one
fn migrate_v2(data: &mut Value) {
    for feed in feeds_mut(data) {
        let channel = feed.entry("channel").or_insert(Value::Null);
        if channel.is_null() {
            *channel = json!({"title": "", "link": "", "publish_date": null, "items": []});
        }
    }
}

/// Migration v3: items gain the `enabled` flag
fn migrate_v3(data: &mut Value) {
    for feed in feeds_mut(data) {
        for item in items_mut(feed) {
            item.entry("enabled").or_insert(Value::Bool(true));
        }
    }
}

/// Migration v4: items gain `media_size`, -1 meaning not downloaded
fn migrate_v4(data: &mut Value) {
    for feed in feeds_mut(data) {
        for item in items_mut(feed) {
            item.entry("media_size").or_insert(json!(-1));
        }
    }
}

/// Migration v5: publish dates become RFC 3339 instants
fn migrate_v5(data: &mut Value) {
    for feed in feeds_mut(data) {
        if let Some(channel) = feed.get_mut("channel").and_then(Value::as_object_mut) {
            normalize_date_field(channel);
        }
        for item in items_mut(feed) {
            normalize_date_field(item);
        }
    }
}

fn normalize_date_field(object: &mut Map<String, Value>) {
    let Some(value) = object.get_mut("publish_date") else {
        return;
    };
    let parsed = match &*value {
        Value::Null => return,
        Value::String(text) => parse_legacy_date(text),
        Value::Number(number) => number
            .as_i64()
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0)),
        _ => None,
    };
    *value = match parsed {
        Some(date) => Value::String(date.to_rfc3339()),
        None => Value::Null,
    };
}

/// Parse the date formats older versions wrote
pub fn parse_legacy_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(text) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
