//! Output helpers
//!
//! `--json` emits `{ "items": [...], "meta": {...} }`; the default is
//! compact text.

use serde_json::{json, Value};

/// Print the structured JSON envelope
pub fn print_json(items: Vec<Value>, meta: Value) {
    let envelope = json!({ "items": items, "meta": meta });
    println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
}

/// One search item as text
pub fn print_search_item(index: usize, item: &docdex_core::SearchItem) {
    println!(
        "{}. {} ({:.3}, conf {:.2})",
        index + 1,
        item.title,
        item.score,
        item.confidence
    );
    let slice = item
        .slice
        .as_deref()
        .map(|s| format!(" [{}]", s))
        .unwrap_or_default();
    println!("   {}{}", item.path, slice);
    if let Some(context) = &item.context_path {
        println!("   {}", context);
    }
    println!("   {}", item.preview);
}

pub fn search_item_json(item: &docdex_core::SearchItem) -> Value {
    serde_json::to_value(item).unwrap_or(Value::Null)
}
