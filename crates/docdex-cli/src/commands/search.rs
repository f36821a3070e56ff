//! `search` and `library` commands

use crate::app::{LibraryArgs, SearchArgs};
use crate::commands::resolve_source;
use crate::output;
use docdex_core::error::{DocdexError, Result};
use docdex_core::{search, Engine, SearchMode, SearchOptions};
use serde_json::json;

pub async fn run(engine: &Engine, args: SearchArgs, json: bool) -> Result<()> {
    let mode = SearchMode::parse(&args.mode)
        .ok_or_else(|| DocdexError::Search(format!("unknown mode `{}`", args.mode)))?;
    let query = args.query.join(" ");
    let source = resolve_source(engine, &args.library)?;
    let db = engine.open_library(&source)?;

    let config = engine.config();
    let options = SearchOptions {
        mode,
        version_label: args.version.clone(),
        strong_score: config.search.strong_score,
        strong_gap: config.search.strong_gap,
        ..Default::default()
    };

    let embedder = engine.embedder();
    let expander = engine.expander();
    let items = search(
        &db,
        &source.name,
        &query,
        &options,
        embedder.as_deref(),
        expander.as_deref(),
    )
    .await?;

    if json {
        output::print_json(
            items.iter().map(output::search_item_json).collect(),
            json!({
                "command": "search",
                "library": source.name,
                "mode": args.mode,
                "version": args.version,
                "query": query,
            }),
        );
        return Ok(());
    }

    if items.is_empty() {
        println!("no results for `{}`", query);
        return Ok(());
    }
    for (i, item) in items.iter().enumerate() {
        output::print_search_item(i, item);
    }
    Ok(())
}

pub async fn library(engine: &Engine, args: LibraryArgs, json: bool) -> Result<()> {
    let query = args.query.join(" ").to_lowercase();
    let sources = engine.index_db().list_sources()?;
    let matched: Vec<_> = sources
        .into_iter()
        .filter(|s| s.name.to_lowercase().contains(&query))
        .collect();

    let mut items = Vec::new();
    for source in &matched {
        let versions = engine.index_db().list_source_versions(source.id)?;
        let labels: Vec<&str> = versions
            .iter()
            .map(|v| v.version_label.as_str())
            .filter(|label| args.version.as_deref().map(|v| v == *label).unwrap_or(true))
            .collect();

        if json {
            items.push(json!({
                "id": source.id,
                "name": source.name,
                "kind": source.kind.as_str(),
                "versions": labels,
            }));
        } else {
            let versions = if labels.is_empty() {
                "(not synced)".to_string()
            } else {
                labels.join(", ")
            };
            println!("#{:<4} {:40} {}", source.id, source.name, versions);
        }
    }

    if json {
        output::print_json(items, json!({ "command": "library", "query": query }));
    } else if matched.is_empty() {
        println!("no libraries match `{}`", query);
    }
    Ok(())
}
