//! `add` and `source` commands

use crate::app::{AddArgs, SourceAction, SourceArgs};
use crate::output;
use docdex_core::db::{IngestMode, NewSource, SourceKind};
use docdex_core::error::{DocdexError, Result};
use docdex_core::Engine;
use serde_json::json;

pub async fn run(engine: &Engine, args: SourceArgs, json: bool) -> Result<()> {
    match args.action {
        SourceAction::Add(add_args) => add(engine, add_args, json).await,
        SourceAction::List => list(engine, json),
        SourceAction::Remove { id } => remove(engine, id, json),
    }
}

pub async fn add(engine: &Engine, args: AddArgs, json: bool) -> Result<()> {
    let new = new_source_from_args(&args)?;
    let source = engine.index_db().insert_source(&new)?;

    if json {
        output::print_json(
            vec![json!({ "id": source.id, "name": source.name, "kind": source.kind.as_str() })],
            json!({ "command": "add" }),
        );
    } else {
        println!("added {} (#{})", source.name, source.id);
    }
    Ok(())
}

pub fn new_source_from_args(args: &AddArgs) -> Result<NewSource> {
    let target = args.target.trim();

    if target.starts_with("http://") || target.starts_with("https://") {
        let name = args.name.clone().unwrap_or_else(|| {
            target
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        });
        return Ok(NewSource {
            name,
            kind: SourceKind::Web {
                root_url: target.to_string(),
                allowed_paths: args.allow.clone(),
                denied_paths: args.deny.clone(),
                max_depth: args.max_depth,
                max_pages: args.max_pages,
            },
        });
    }

    let (owner, repo) = target
        .split_once('/')
        .filter(|(o, r)| !o.is_empty() && !r.is_empty() && !r.contains('/'))
        .ok_or_else(|| {
            DocdexError::InvalidUrl(format!(
                "expected owner/repo or an http(s) URL, got `{}`",
                target
            ))
        })?;

    Ok(NewSource {
        name: args.name.clone().unwrap_or_else(|| target.to_string()),
        kind: SourceKind::GitHub {
            owner: owner.to_string(),
            repo: repo.to_string(),
            git_ref: args.git_ref.clone(),
            docs_path: args.docs_path.clone(),
            ingest_mode: if args.repo_mode {
                IngestMode::Repo
            } else {
                IngestMode::Docs
            },
            version_label: args.version.clone(),
        },
    })
}

fn list(engine: &Engine, json: bool) -> Result<()> {
    let sources = engine.index_db().list_sources()?;
    if json {
        let items = sources
            .iter()
            .map(|s| {
                json!({
                    "id": s.id,
                    "name": s.name,
                    "kind": s.kind.as_str(),
                    "last_sync_at": s.last_sync_at,
                    "last_error": s.last_error,
                })
            })
            .collect();
        output::print_json(items, json!({ "command": "source list" }));
        return Ok(());
    }

    if sources.is_empty() {
        println!("no sources registered; run `docdex add <owner/repo|url>`");
        return Ok(());
    }
    for source in sources {
        let synced = source.last_sync_at.as_deref().unwrap_or("never");
        println!(
            "#{:<4} {:8} {:40} synced {}",
            source.id,
            source.kind.as_str(),
            source.name,
            synced
        );
        if let Some(error) = &source.last_error {
            println!("      last error: {}", error);
        }
    }
    Ok(())
}

fn remove(engine: &Engine, id: i64, json: bool) -> Result<()> {
    let source = engine
        .index_db()
        .get_source(id)?
        .ok_or_else(|| DocdexError::SourceNotFound(id.to_string()))?;

    let db_path = docdex_core::config::library_db_dir().join(&source.db_file);
    engine.index_db().remove_source(id)?;
    if db_path.exists() {
        std::fs::remove_file(&db_path)?;
    }

    if json {
        output::print_json(
            vec![json!({ "id": id, "name": source.name })],
            json!({ "command": "source remove" }),
        );
    } else {
        println!("removed {} (#{})", source.name, id);
    }
    Ok(())
}
