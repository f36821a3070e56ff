//! `status`, `cleanup`, `detect`, and `reset` commands

use crate::app::ResetArgs;
use crate::output;
use docdex_core::crawl::find_browser_binary;
use docdex_core::error::{DocdexError, Result};
use docdex_core::Engine;
use serde_json::json;

pub async fn run(engine: &Engine, json: bool) -> Result<()> {
    let sources = engine.index_db().list_sources()?;
    let mut items = Vec::new();

    for source in &sources {
        let db = engine.open_library(source)?;
        let documents = db.count_documents(true)?;
        let chunks = db.count_chunks()?;
        let embeddings = db.count_embeddings()?;
        let crawl = db.crawl_counts(source.id)?;

        if json {
            items.push(json!({
                "id": source.id,
                "name": source.name,
                "kind": source.kind.as_str(),
                "documents": documents,
                "chunks": chunks,
                "embeddings": embeddings,
                "last_sync_at": source.last_sync_at,
                "last_error": source.last_error,
                "crawl": {
                    "pending": crawl.pending,
                    "done": crawl.done,
                    "failed": crawl.failed,
                },
            }));
        } else {
            println!(
                "#{:<4} {:40} {} docs, {} chunks, {} embedded",
                source.id, source.name, documents, chunks, embeddings
            );
            if crawl.total() > 0 {
                println!(
                    "      crawl queue: {} pending, {} done, {} failed",
                    crawl.pending, crawl.done, crawl.failed
                );
            }
            if let Some(error) = &source.last_error {
                println!("      last error: {}", error);
            }
        }
    }

    if json {
        output::print_json(items, json!({ "command": "status" }));
    } else if sources.is_empty() {
        println!("no sources registered");
    }
    Ok(())
}

pub async fn cleanup(engine: &Engine, json: bool) -> Result<()> {
    let sources = engine.index_db().list_sources()?;
    let mut items = Vec::new();

    for source in &sources {
        let db = engine.open_library(source)?;
        let (documents, blobs) = db.cleanup_inactive()?;
        if json {
            items.push(json!({
                "source": source.name,
                "documents_removed": documents,
                "blobs_removed": blobs,
            }));
        } else if documents + blobs > 0 {
            println!(
                "{}: removed {} inactive documents, {} orphaned blobs",
                source.name, documents, blobs
            );
        }
    }

    if json {
        output::print_json(items, json!({ "command": "cleanup" }));
    } else {
        println!("cleanup complete");
    }
    Ok(())
}

pub async fn detect(engine: &Engine, json: bool) -> Result<()> {
    let config = engine.config();
    let browser = find_browser_binary(config.headless.chrome_path.as_deref());
    let embed_model = config.models.embed.as_deref();
    let query_model = config.models.query.as_deref();

    if json {
        output::print_json(
            vec![json!({
                "browser": browser.as_ref().map(|p| p.display().to_string()),
                "headless_enabled": config.headless.enabled,
                "embed_model": embed_model,
                "query_model": query_model,
                "proxy": config.proxy.endpoint,
            })],
            json!({ "command": "detect" }),
        );
        return Ok(());
    }

    match &browser {
        Some(path) => println!("browser: {}", path.display()),
        None => println!("browser: not found (headless rendering disabled)"),
    }
    println!("embed model: {}", embed_model.unwrap_or("(none configured)"));
    println!("query model: {}", query_model.unwrap_or("(none configured)"));
    if let Some(proxy) = &config.proxy.endpoint {
        println!("proxy: {}", proxy);
    }
    Ok(())
}

pub async fn reset(engine: &Engine, args: ResetArgs, json: bool) -> Result<()> {
    if !args.yes {
        return Err(DocdexError::Config(
            "reset deletes every database; re-run with --yes".to_string(),
        ));
    }

    let sources = engine.index_db().list_sources()?;
    let library_dir = docdex_core::config::library_db_dir();
    let mut removed = 0usize;
    for source in &sources {
        let path = library_dir.join(&source.db_file);
        if path.exists() {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
        engine.index_db().remove_source(source.id)?;
    }

    if json {
        output::print_json(
            vec![json!({ "sources_removed": sources.len(), "databases_removed": removed })],
            json!({ "command": "reset" }),
        );
    } else {
        println!(
            "reset: removed {} sources and {} library databases",
            sources.len(),
            removed
        );
    }
    Ok(())
}
