//! `ingest` and `embed` commands

use crate::app::{EmbedArgs, IngestArgs};
use crate::commands::resolve_source;
use crate::output;
use docdex_core::db::Source;
use docdex_core::embed::HttpEmbedder;
use docdex_core::error::{DocdexError, Result};
use docdex_core::ingest::{embed_library, ingest_source, IngestOptions, SourceReport};
use docdex_core::Engine;
use serde_json::json;
use std::sync::Mutex;
use tracing::error;

pub async fn run(engine: &Engine, args: IngestArgs, json: bool) -> Result<()> {
    let sources = select_sources(engine, args.source.as_deref())?;
    if sources.is_empty() {
        return Err(DocdexError::SourceNotFound(
            "no sources registered".to_string(),
        ));
    }

    let options = IngestOptions {
        force: args.force,
        concurrency: args.concurrency,
    };

    let mut items = Vec::new();
    let mut failures = 0usize;
    for source in &sources {
        let source_name = source.name.clone();
        let progress = move |current: usize, total: usize| {
            if !json {
                eprint!("\r{}: {}/{}    ", source_name, current, total);
            }
        };

        match ingest_source(engine, source, &options, Some(&progress)).await {
            Ok(report) => {
                if !json {
                    eprintln!();
                    print_report(&source.name, &report);
                }
                items.push(report_json(source, &report));

                if args.embed {
                    embed_one(engine, source, None, false, json).await?;
                }
            }
            Err(e) => {
                // One source failing never aborts its siblings
                if !json {
                    eprintln!();
                }
                error!(source = %source.name, error = %e, "ingest failed");
                items.push(json!({ "source": source.name, "error": e.to_string() }));
                failures += 1;
            }
        }
    }

    if json {
        output::print_json(items, json!({ "command": "ingest", "failures": failures }));
    }
    if failures == sources.len() {
        return Err(DocdexError::Sync("all sources failed to ingest".to_string()));
    }
    Ok(())
}

pub async fn embed(engine: &Engine, args: EmbedArgs, json: bool) -> Result<()> {
    let sources = select_sources(engine, args.source.as_deref())?;
    for source in &sources {
        embed_one(engine, source, args.model.as_deref(), args.force, json).await?;
    }
    Ok(())
}

async fn embed_one(
    engine: &Engine,
    source: &Source,
    model_override: Option<&str>,
    force: bool,
    json: bool,
) -> Result<()> {
    let embedder: std::sync::Arc<dyn docdex_core::embed::Embedder> = match model_override {
        Some(model) => std::sync::Arc::new(HttpEmbedder::new(model)?),
        None => engine.embedder().ok_or_else(|| {
            DocdexError::Embedding(
                "no embedding model configured; set models.embed or pass --model".to_string(),
            )
        })?,
    };

    let library = Mutex::new(engine.open_library(source)?);
    let source_name = source.name.clone();
    let progress = move |current: usize, total: usize| {
        if !json {
            eprint!("\rembedding {}: {}/{}    ", source_name, current, total);
        }
    };
    let embedded = embed_library(&library, embedder.as_ref(), force, Some(&progress)).await?;

    if json {
        output::print_json(
            vec![json!({ "source": source.name, "embedded": embedded })],
            json!({ "command": "embed", "model": embedder.model_name() }),
        );
    } else {
        eprintln!();
        println!("{}: embedded {} chunks", source.name, embedded);
    }
    Ok(())
}

fn select_sources(engine: &Engine, filter: Option<&str>) -> Result<Vec<Source>> {
    match filter {
        Some(query) => Ok(vec![resolve_source(engine, query)?]),
        None => engine.index_db().list_sources(),
    }
}

fn print_report(name: &str, report: &SourceReport) {
    println!(
        "{}: {} labels, {} processed, {} updated, {} unchanged, {} skipped, {} failed, {} deactivated",
        name,
        report.labels.len(),
        report.processed,
        report.updated,
        report.unchanged,
        report.skipped,
        report.failed,
        report.deactivated,
    );
    if report.pages_done + report.pages_failed > 0 {
        println!(
            "  pages: {} done, {} failed",
            report.pages_done, report.pages_failed
        );
    }
}

fn report_json(source: &Source, report: &SourceReport) -> serde_json::Value {
    json!({
        "source": source.name,
        "labels": report.labels,
        "processed": report.processed,
        "updated": report.updated,
        "unchanged": report.unchanged,
        "skipped": report.skipped,
        "failed": report.failed,
        "deactivated": report.deactivated,
        "pages_done": report.pages_done,
        "pages_failed": report.pages_failed,
    })
}
