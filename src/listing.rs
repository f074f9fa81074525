//! Client-side helpers for presenting record collections: search,
//! pagination and foreign-key lookup over already fetched records.

use serde_json::Value;
use std::collections::HashMap;

use crate::types::Resource;

/// Extract the record list from a collection response.
///
/// Accepts a bare array or a `{"data": [...]}` envelope; anything else is empty.
pub fn records(body: &Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items.clone(),
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Case-insensitive substring match over a record's scalar fields
pub fn search<'a>(records: &'a [Value], query: &str) -> Vec<&'a Value> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return records.iter().collect();
    }

    records
        .iter()
        .filter(|record| matches_query(record, &needle))
        .collect()
}

fn matches_query(record: &Value, needle: &str) -> bool {
    match record {
        Value::Object(map) => map.values().any(|v| scalar_contains(v, needle)),
        other => scalar_contains(other, needle),
    }
}

fn scalar_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Number(n) => n.to_string().contains(needle),
        Value::Bool(b) => b.to_string() == needle,
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    /// 1-based
    pub page: usize,
    pub total_pages: usize,
    pub total: usize,
}

/// Slice out one page. Page numbers are 1-based and clamped into range.
pub fn paginate<T>(items: &[T], page: usize, per_page: usize) -> Page<'_, T> {
    let per_page = per_page.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(per_page).max(1);
    let page = page.clamp(1, total_pages);

    let start = ((page - 1) * per_page).min(total);
    let end = (start + per_page).min(total);

    Page {
        items: &items[start..end],
        page,
        total_pages,
        total,
    }
}

/// Record ids compare as strings so `7` and `"7"` are the same record
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Linear lookup of a record by its `id` field
pub fn find_by_id<'a>(records: &'a [Value], id: &str) -> Option<&'a Value> {
    records
        .iter()
        .find(|record| record.get("id").and_then(id_string).as_deref() == Some(id))
}

/// Copy of `record` with every resolvable foreign key attached.
///
/// For each key of `resource` whose target collection is present, the matched
/// record is inserted under the relation name (`officer_id` -> `officer`).
/// Unresolvable keys are left alone.
pub fn resolve_references(
    record: &Value,
    resource: Resource,
    collections: &HashMap<Resource, Vec<Value>>,
) -> Value {
    let mut resolved = record.clone();

    if let Some(map) = resolved.as_object_mut() {
        for key in resource.foreign_keys() {
            let Some(id) = record.get(key.field).and_then(id_string) else {
                continue;
            };
            let Some(found) = collections
                .get(&key.target)
                .and_then(|items| find_by_id(items, &id))
            else {
                continue;
            };
            map.insert(key.relation_name().to_string(), found.clone());
        }
    }

    resolved
}
