//! `seed` command: bulk-register and ingest from seed lists

use crate::app::{AddArgs, SeedArgs};
use crate::commands::source::new_source_from_args;
use crate::output;
use docdex_core::db::Source;
use docdex_core::error::Result;
use docdex_core::ingest::{ingest_source, with_rate_limit_backoff, IngestOptions};
use docdex_core::Engine;
use serde_json::json;
use tracing::{error, info};

pub async fn run(engine: &Engine, args: SeedArgs, json: bool) -> Result<()> {
    let mut targets: Vec<String> = args.urls.clone();
    for file in &args.files {
        let body = std::fs::read_to_string(file)?;
        targets.extend(
            body.lines()
                .map(|line| line.trim())
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(|line| line.to_string()),
        );
    }

    let mut registered: Vec<Source> = Vec::new();
    let mut items = Vec::new();
    for target in &targets {
        // Already-registered targets are reused, not duplicated
        if let Some(existing) = engine.index_db().find_source(target)? {
            registered.push(existing);
            continue;
        }
        let add_args = AddArgs {
            target: target.clone(),
            name: None,
            git_ref: None,
            docs_path: None,
            repo_mode: false,
            version: None,
            allow: Vec::new(),
            deny: Vec::new(),
            max_depth: 3,
            max_pages: 500,
        };
        match new_source_from_args(&add_args) {
            Ok(new) => {
                let source = engine.index_db().insert_source(&new)?;
                info!(name = %source.name, "seeded source");
                items.push(json!({ "source": source.name, "registered": true }));
                registered.push(source);
            }
            Err(e) => {
                error!(target = %target, error = %e, "seed entry rejected");
                items.push(json!({ "source": target, "error": e.to_string() }));
            }
        }
    }

    if !args.no_ingest {
        let options = IngestOptions {
            force: false,
            concurrency: args.concurrency,
        };
        for source in &registered {
            // Seed-driven ingests ride the rate-limit backoff ladder
            let outcome =
                with_rate_limit_backoff(|| ingest_source(engine, source, &options, None)).await;
            match outcome {
                Ok(report) => {
                    items.push(json!({
                        "source": source.name,
                        "processed": report.processed,
                        "updated": report.updated,
                    }));
                    if !args.no_embed {
                        if let Some(embedder) = engine.embedder() {
                            let library = std::sync::Mutex::new(engine.open_library(source)?);
                            let embedded = docdex_core::ingest::embed_library(
                                &library,
                                embedder.as_ref(),
                                false,
                                None,
                            )
                            .await?;
                            items.push(json!({ "source": source.name, "embedded": embedded }));
                        }
                    }
                }
                Err(e) => {
                    error!(source = %source.name, error = %e, "seed ingest failed");
                    items.push(json!({ "source": source.name, "error": e.to_string() }));
                }
            }
        }
    }

    if json {
        output::print_json(items, json!({ "command": "seed", "targets": targets.len() }));
    } else {
        println!("seeded {} targets", targets.len());
    }
    Ok(())
}
