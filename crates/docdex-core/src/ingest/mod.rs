//! Ingest orchestrator
//!
//! Drives one source end to end: plans version labels, runs the sync
//! or crawl, feeds the chunker, writes documents and chunks,
//! deactivates documents missing from the latest run, and records
//! sync metadata. Work inside one source runs with bounded
//! parallelism; all database writes stay serial behind one lock.

use crate::chunk::{build_document_chunks, has_code_snippet};
use crate::crawl::{page_document_path, CrawlLimits, CrawlScope, CrawledPage, Crawler};
use crate::db::{
    DocumentUpsert, IngestMode, LibraryDb, Source, SourceKind, SourceVersion,
};
use crate::embed::Embedder;
use crate::engine::Engine;
use crate::error::{DocdexError, Result};
use crate::github::{build_version_plan, sync_repo, GitHubClient, RepoSync, SyncCursor};
use chrono::Utc;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Version label used for web sources, which have no tag series
pub const WEB_VERSION_LABEL: &str = "latest";

/// Embedding batch size
const EMBED_BATCH: usize = 16;

/// Rate-limit backoff ladder for seed-driven ingests
const BACKOFF_SECONDS: &[u64] = &[15, 30, 60, 120];

/// Progress callback: `(current, total)` files or pages
pub type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

/// Options for one ingest run
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub force: bool,
    pub concurrency: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            force: false,
            concurrency: 5,
        }
    }
}

/// Outcome counters for one source
#[derive(Debug, Clone, Default)]
pub struct SourceReport {
    pub labels: Vec<String>,
    pub processed: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub deactivated: usize,
    pub pages_done: usize,
    pub pages_failed: usize,
}

/// Ingest one source. Errors surface to the caller, which records
/// them in `last_error`; failures in one source never abort another.
pub async fn ingest_source(
    engine: &Engine,
    source: &Source,
    options: &IngestOptions,
    progress: Option<&ProgressFn>,
) -> Result<SourceReport> {
    let result = match &source.kind {
        SourceKind::GitHub { .. } => ingest_github(engine, source, options, progress).await,
        SourceKind::Web { .. } => ingest_web(engine, source, options, progress).await,
    };

    match &result {
        Ok(report) => {
            info!(
                source = %source.name,
                processed = report.processed,
                updated = report.updated,
                skipped = report.skipped,
                "ingest complete"
            );
        }
        Err(e) => {
            engine
                .index_db()
                .update_source_sync(source.id, None, None, Some(&e.to_string()))?;
        }
    }
    result
}

async fn ingest_github(
    engine: &Engine,
    source: &Source,
    options: &IngestOptions,
    progress: Option<&ProgressFn>,
) -> Result<SourceReport> {
    let SourceKind::GitHub {
        owner,
        repo,
        git_ref,
        docs_path,
        ingest_mode,
        version_label,
    } = &source.kind
    else {
        return Err(DocdexError::Sync("not a github source".to_string()));
    };

    let config = engine.config();
    let client = GitHubClient::new(
        config.github.token.clone(),
        config.proxy.endpoint.as_deref(),
    )?;

    let tags = match client.list_tags(owner, repo).await {
        Ok(tags) => tags,
        Err(DocdexError::TokenInvalid) => return Err(DocdexError::TokenInvalid),
        Err(DocdexError::RateLimited) => return Err(DocdexError::RateLimited),
        Err(e) => {
            warn!(error = %e, "tag listing failed, planning without tags");
            Vec::new()
        }
    };

    let prior_labels: Vec<String> = engine
        .index_db()
        .list_source_versions(source.id)?
        .into_iter()
        .map(|v| v.version_label)
        .collect();
    let plan = build_version_plan(
        &prior_labels,
        version_label.as_deref(),
        git_ref.as_deref(),
        &tags,
        config.ingest.max_major_versions,
    );

    let library = Mutex::new(engine.open_library(source)?);
    let mut report = SourceReport::default();
    let mut last_commit: Option<String> = None;
    let mut last_etag: Option<String> = None;

    // Version plans run sequentially so writes for one source stay
    // serial across labels.
    for entry in plan {
        let prior = engine.index_db().get_source_version(source.id, &entry.label)?;
        let cursor = SyncCursor {
            commit: prior.as_ref().and_then(|v| v.commit_sha.clone()),
            etag: prior.as_ref().and_then(|v| v.etag.clone()),
        };

        let mut files = Vec::new();
        let summary = match sync_repo(
            &client,
            owner,
            repo,
            entry.git_ref.as_deref(),
            docs_path.as_deref(),
            &cursor,
            options.force,
            |file| {
                files.push(file);
                Ok(())
            },
        )
        .await?
        {
            RepoSync::NotModified => {
                info!(label = %entry.label, "not modified");
                report.labels.push(entry.label);
                continue;
            }
            RepoSync::Synced(summary) => summary,
        };
        report.skipped += summary.skipped.len();

        let docs_only = *ingest_mode == IngestMode::Docs;
        let seen: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
        let counters = Counters::default();
        let total = files.len();

        futures::stream::iter(files.into_iter().map(|file| {
            let label = entry.label.clone();
            let library = &library;
            let seen = &seen;
            let counters = &counters;
            async move {
                let outcome = ingest_repo_file(
                    library, source, owner, repo, &label, docs_only, &file.rel_path,
                    &file.content,
                );
                counters.record(outcome);
                let current = counters.bump_processed();
                if let Some(progress) = progress {
                    progress(current, total);
                }
                if let FileOutcome::Upserted { .. } = outcome {
                    if let Ok(mut seen) = lock(seen) {
                        seen.insert(file.rel_path.clone());
                    }
                }
            }
        }))
        .buffer_unordered(options.concurrency.max(1))
        .collect::<Vec<()>>()
        .await;

        let seen = lock(&seen)?.clone();
        let deactivated = lock(&library)?.deactivate_missing(source.id, &entry.label, &seen)?;
        report.deactivated += deactivated;

        engine.index_db().upsert_source_version(&SourceVersion {
            source_id: source.id,
            version_label: entry.label.clone(),
            git_ref: entry.git_ref.clone(),
            commit_sha: summary.commit.clone(),
            tree_hash: None,
            etag: summary.etag.clone(),
            synced_at: Utc::now().to_rfc3339(),
        })?;

        counters.fold_into(&mut report);
        last_commit = summary.commit.or(last_commit);
        last_etag = summary.etag.or(last_etag);
        report.labels.push(entry.label);
    }

    engine.index_db().update_source_sync(
        source.id,
        last_commit.as_deref(),
        last_etag.as_deref(),
        None,
    )?;
    Ok(report)
}

/// What happened to one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Upserted { changed: bool },
    Skipped,
    Failed,
}

#[derive(Default)]
struct Counters {
    processed: AtomicUsize,
    updated: AtomicUsize,
    unchanged: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn record(&self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Upserted { changed: true } => self.updated.fetch_add(1, Ordering::Relaxed),
            FileOutcome::Upserted { changed: false } => {
                self.unchanged.fetch_add(1, Ordering::Relaxed)
            }
            FileOutcome::Skipped => self.skipped.fetch_add(1, Ordering::Relaxed),
            FileOutcome::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn bump_processed(&self) -> usize {
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn fold_into(&self, report: &mut SourceReport) {
        report.processed += self.processed.load(Ordering::Relaxed);
        report.updated += self.updated.load(Ordering::Relaxed);
        report.unchanged += self.unchanged.load(Ordering::Relaxed);
        report.skipped += self.skipped.load(Ordering::Relaxed);
        report.failed += self.failed.load(Ordering::Relaxed);
    }
}

#[allow(clippy::too_many_arguments)]
fn ingest_repo_file(
    library: &Mutex<LibraryDb>,
    source: &Source,
    owner: &str,
    repo: &str,
    label: &str,
    docs_only: bool,
    rel_path: &str,
    content: &str,
) -> FileOutcome {
    if docs_only && !has_code_snippet(content) {
        return FileOutcome::Skipped;
    }

    let title = extract_title(content, rel_path);
    let uri = crate::github::github_uri(owner, repo, label, rel_path);
    let content_type = content_type_for(rel_path);
    let drafts = build_document_chunks(content, rel_path, &title);

    let db = match lock(library) {
        Ok(db) => db,
        Err(_) => return FileOutcome::Failed,
    };
    let outcome = match db.upsert_document(&DocumentUpsert {
        source_id: source.id,
        path: rel_path,
        version_label: label,
        uri: &uri,
        title: &title,
        content,
        content_type,
    }) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(path = rel_path, error = %e, "document upsert failed");
            return FileOutcome::Failed;
        }
    };

    if outcome.changed {
        let result = if drafts.is_empty() {
            // Zero drafts: old chunks go, the document stays
            db.delete_chunks_for_document(outcome.document_id).map(|_| 0)
        } else {
            db.replace_document_chunks(outcome.document_id, rel_path, &uri, &title, &drafts)
        };
        if let Err(e) = result {
            warn!(path = rel_path, error = %e, "chunk rebuild failed");
            return FileOutcome::Failed;
        }
        if drafts.is_empty() {
            return FileOutcome::Skipped;
        }
    }
    FileOutcome::Upserted {
        changed: outcome.changed,
    }
}

async fn ingest_web(
    engine: &Engine,
    source: &Source,
    options: &IngestOptions,
    progress: Option<&ProgressFn>,
) -> Result<SourceReport> {
    let SourceKind::Web {
        root_url,
        allowed_paths,
        denied_paths,
        max_depth,
        max_pages,
    } = &source.kind
    else {
        return Err(DocdexError::Crawl("not a web source".to_string()));
    };

    let config = engine.config();
    let scope = CrawlScope::new(root_url, allowed_paths.clone(), denied_paths.clone())?;
    let crawler = Crawler::new(
        root_url,
        scope,
        CrawlLimits {
            max_depth: *max_depth,
            max_pages: *max_pages,
        },
        config.crawl.clone(),
        config.proxy.endpoint.as_deref(),
        engine.headless().await,
    )?;

    let library = Mutex::new(engine.open_library(source)?);
    let seen: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
    let counters = Counters::default();

    let on_page = |page: CrawledPage| -> Result<()> {
        let path = page_document_path(&page.url);
        let title = page
            .title
            .clone()
            .unwrap_or_else(|| extract_title(&page.markdown, &path));
        let drafts = build_document_chunks(&page.markdown, &path, &title);

        let db = lock(&library)?;
        let outcome = db.upsert_document(&DocumentUpsert {
            source_id: source.id,
            path: &path,
            version_label: WEB_VERSION_LABEL,
            uri: &page.url,
            title: &title,
            content: &page.markdown,
            content_type: "markdown",
        })?;
        if outcome.changed {
            if drafts.is_empty() {
                db.delete_chunks_for_document(outcome.document_id)?;
                counters.record(FileOutcome::Skipped);
            } else {
                db.replace_document_chunks(
                    outcome.document_id,
                    &path,
                    &page.url,
                    &title,
                    &drafts,
                )?;
                counters.record(FileOutcome::Upserted { changed: true });
            }
        } else {
            counters.record(FileOutcome::Upserted { changed: false });
        }
        counters.bump_processed();
        lock(&seen)?.insert(path);
        Ok(())
    };

    let outcome = crawler
        .crawl(&library, source.id, options.force, &on_page, progress)
        .await?;

    let seen = lock(&seen)?.clone();
    let deactivated = lock(&library)?.deactivate_missing(source.id, WEB_VERSION_LABEL, &seen)?;

    engine.index_db().upsert_source_version(&SourceVersion {
        source_id: source.id,
        version_label: WEB_VERSION_LABEL.to_string(),
        git_ref: None,
        commit_sha: None,
        tree_hash: None,
        etag: None,
        synced_at: Utc::now().to_rfc3339(),
    })?;
    engine
        .index_db()
        .update_source_sync(source.id, None, None, None)?;

    let mut report = SourceReport {
        labels: vec![WEB_VERSION_LABEL.to_string()],
        deactivated,
        pages_done: outcome.done,
        pages_failed: outcome.failed,
        ..Default::default()
    };
    counters.fold_into(&mut report);
    Ok(report)
}

/// Embed every chunk of active documents that still lacks a vector
/// under the embedder's model. `force` clears stored embeddings first.
pub async fn embed_library(
    library: &Mutex<LibraryDb>,
    embedder: &dyn Embedder,
    force: bool,
    progress: Option<&ProgressFn>,
) -> Result<usize> {
    if force {
        lock(library)?.clear_embeddings()?;
    }

    let pending = lock(library)?.chunks_needing_embedding(embedder.model_name())?;
    let total = pending.len();
    let mut embedded = 0;

    for batch in pending.chunks(EMBED_BATCH) {
        let texts: Vec<String> = batch.iter().map(|(_, content)| content.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        let db = lock(library)?;
        for ((chunk_id, _), vector) in batch.iter().zip(vectors) {
            db.upsert_embedding(*chunk_id, embedder.model_name(), &vector)?;
            embedded += 1;
        }
        drop(db);
        if let Some(progress) = progress {
            progress(embedded, total);
        }
    }
    Ok(embedded)
}

/// Retry an operation through the rate-limit backoff ladder
pub async fn with_rate_limit_backoff<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(DocdexError::RateLimited) if attempt < BACKOFF_SECONDS.len() => {
                let delay = BACKOFF_SECONDS[attempt];
                warn!(delay, "rate limited, backing off");
                tokio::time::sleep(Duration::from_secs(delay)).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// First H1, else the file name
pub fn extract_title(content: &str, fallback_path: &str) -> String {
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(title) = trimmed.strip_prefix("# ") {
            let title = title.trim();
            if !title.is_empty() {
                return title.to_string();
            }
        }
    }
    fallback_path
        .rsplit('/')
        .next()
        .unwrap_or(fallback_path)
        .to_string()
}

/// Coarse content type stored on the document row
pub fn content_type_for(path: &str) -> &'static str {
    use crate::chunk::FileKind;
    match crate::chunk::file_kind(path) {
        FileKind::Markdown => "markdown",
        FileKind::Code { language: Some(_), .. } => "code",
        FileKind::Code { language: None, .. } => "text",
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| DocdexError::Sync("ingest state lock poisoned".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title() {
        assert_eq!(extract_title("# Routing\n\nbody", "docs/r.md"), "Routing");
        assert_eq!(extract_title("no heading here", "docs/r.md"), "r.md");
        assert_eq!(extract_title("## not h1\n# Real", "x.md"), "Real");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("docs/a.md"), "markdown");
        assert_eq!(content_type_for("src/lib.rs"), "code");
        assert_eq!(content_type_for("conf/app.toml"), "text");
    }

    #[tokio::test]
    async fn test_backoff_passes_through_other_errors() {
        let result: Result<()> =
            with_rate_limit_backoff(|| async { Err(DocdexError::Sync("boom".into())) }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_backoff_returns_success() {
        let result = with_rate_limit_backoff(|| async { Ok(7) }).await.unwrap();
        assert_eq!(result, 7);
    }
}
