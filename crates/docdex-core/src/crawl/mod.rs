//! Web crawler
//!
//! Breadth-first bounded crawl over a persistent queue. Workers pop
//! pages by ascending `(depth, id)`, negotiate markdown, fall back to
//! HTML extraction, optionally re-fetch sparse pages through the
//! headless renderer, and enqueue in-scope links at `depth + 1`.
//! Pending and failed pages are re-picked on restart; `force` clears
//! the queue and repeats discovery.

pub mod discover;
pub mod extract;
pub mod headless;
pub mod scope;

pub use discover::discover_seeds;
pub use extract::{
    extract_html_content, extract_links_markdown, is_sparse, looks_like_markdown,
    sanitize_markdown, ExtractedPage,
};
pub use headless::{find_browser_binary, HeadlessSession};
pub use scope::{normalize_url, CrawlScope};

use crate::config::CrawlConfig;
use crate::db::{CrawlStatus, LibraryDb};
use crate::error::{DocdexError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const PAGE_TIMEOUT: Duration = Duration::from_secs(20);

const ACCEPT_MARKDOWN: &str = "text/markdown,text/plain;q=0.9,text/html;q=0.8,*/*;q=0.5";
const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// A short list of realistic browser agents, rotated per page
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
];

/// Limits for one crawl run
#[derive(Debug, Clone)]
pub struct CrawlLimits {
    pub max_depth: u32,
    pub max_pages: u32,
}

/// A page that produced usable markdown
#[derive(Debug, Clone)]
pub struct CrawledPage {
    pub url: String,
    pub normalized_url: String,
    pub title: Option<String>,
    pub markdown: String,
}

/// Totals after a crawl run
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlOutcome {
    pub done: usize,
    pub failed: usize,
}

/// Progress callback: `(current, total)` pages
pub type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

/// One crawler bound to a source's scope and queue
pub struct Crawler {
    client: reqwest::Client,
    scope: CrawlScope,
    limits: CrawlLimits,
    config: CrawlConfig,
    headless: Option<Arc<HeadlessSession>>,
    root_url: String,
}

impl Crawler {
    pub fn new(
        root_url: &str,
        scope: CrawlScope,
        limits: CrawlLimits,
        config: CrawlConfig,
        proxy: Option<&str>,
        headless: Option<Arc<HeadlessSession>>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .brotli(true);
        if let Some(endpoint) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(endpoint)?);
        }
        Ok(Self {
            client: builder.build()?,
            scope,
            limits,
            config,
            headless,
            root_url: root_url.to_string(),
        })
    }

    /// Run the crawl to completion. `on_page` receives each page that
    /// produced usable markdown; its error marks the page failed.
    pub async fn crawl(
        &self,
        db: &Mutex<LibraryDb>,
        source_id: i64,
        force: bool,
        on_page: &(dyn Fn(CrawledPage) -> Result<()> + Send + Sync),
        progress: Option<&ProgressFn>,
    ) -> Result<CrawlOutcome> {
        self.prepare_queue(db, source_id, force).await?;

        let done = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let processed = AtomicUsize::new(0);

        let workers = (1..=self.config.concurrency.max(1)).map(|worker| {
            let done = &done;
            let failed = &failed;
            let processed = &processed;
            async move {
                loop {
                    let page = {
                        let db = lock_db(db)?;
                        db.claim_next_page(source_id)?
                    };
                    let Some(page) = page else {
                        break;
                    };
                    debug!(worker, url = %page.url, depth = page.depth, "processing page");

                    match self.process_page(db, source_id, &page, on_page).await {
                        Ok(()) => {
                            done.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            warn!(url = %page.url, error = %e, "page failed");
                            let db = lock_db(db)?;
                            db.mark_page(page.id, CrawlStatus::Failed, Some(&e.to_string()))?;
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }

                    let current = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(progress) = progress {
                        let total = {
                            let db = lock_db(db)?;
                            db.crawl_counts(source_id)?.total()
                        };
                        progress(current, total);
                    }
                }
                Ok::<(), DocdexError>(())
            }
        });

        for result in futures::future::join_all(workers).await {
            result?;
        }

        let outcome = CrawlOutcome {
            done: done.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        };
        info!(done = outcome.done, failed = outcome.failed, "crawl finished");
        Ok(outcome)
    }

    /// Reset or seed the queue for this run
    async fn prepare_queue(&self, db: &Mutex<LibraryDb>, source_id: i64, force: bool) -> Result<()> {
        {
            let db = lock_db(db)?;
            if force {
                db.clear_crawl_queue(source_id)?;
            } else {
                db.requeue_incomplete(source_id)?;
            }
            if db.crawl_counts(source_id)?.total() > 0 {
                return Ok(());
            }
        }

        let root = Url::parse(&self.root_url)
            .map_err(|_| DocdexError::InvalidUrl(self.root_url.clone()))?;
        let seeds = discover_seeds(&self.client, &root).await;

        let db = lock_db(db)?;
        let mut enqueued = 0u32;
        for seed in seeds {
            if enqueued >= self.limits.max_pages {
                break;
            }
            let Ok(url) = Url::parse(&seed) else { continue };
            if !self.scope.in_scope(&url) {
                continue;
            }
            let Some(normalized) = normalize_url(&seed) else {
                continue;
            };
            if db.enqueue_page(source_id, &seed, &normalized, 0)? {
                enqueued += 1;
            }
        }

        if enqueued == 0 {
            let normalized = normalize_url(&self.root_url)
                .ok_or_else(|| DocdexError::InvalidUrl(self.root_url.clone()))?;
            db.enqueue_page(source_id, &self.root_url, &normalized, 0)?;
            info!(url = %self.root_url, "queue seeded with root");
        } else {
            info!(count = enqueued, "queue seeded from discovery");
        }
        Ok(())
    }

    async fn process_page(
        &self,
        db: &Mutex<LibraryDb>,
        source_id: i64,
        page: &crate::db::CrawlPage,
        on_page: &(dyn Fn(CrawledPage) -> Result<()> + Send + Sync),
    ) -> Result<()> {
        let user_agent = USER_AGENTS[page.id as usize % USER_AGENTS.len()];
        let fetched = self.fetch_page(&page.url, user_agent).await?;

        let base = Url::parse(&page.url)
            .map_err(|_| DocdexError::InvalidUrl(page.url.clone()))?;
        let (markdown, title, links) = match &fetched {
            FetchedPage::Markdown(body) => {
                let markdown = sanitize_markdown(body);
                let links = extract_links_markdown(&markdown, &base);
                (markdown, None, links)
            }
            FetchedPage::Html(html) => {
                let mut extracted = extract_html_content(html, &base);
                if is_sparse(&extracted.markdown, extracted.links.len(), html) {
                    if let Some(rendered) = self.render_headless(&page.url, user_agent).await {
                        let re_extracted = extract_html_content(&rendered, &base);
                        if re_extracted.markdown.len() > extracted.markdown.len() {
                            extracted = re_extracted;
                        }
                    }
                }
                let markdown = sanitize_markdown(&extracted.markdown);
                let mut links = extracted.links;
                links.extend(extract_links_markdown(&markdown, &base));
                (markdown, extracted.title, links)
            }
        };

        // Content gates: short or code-less pages fail without
        // contributing links.
        if markdown.len() < self.config.min_body_chars {
            return Err(DocdexError::Crawl(format!(
                "body too short ({} chars, minimum {})",
                markdown.len(),
                self.config.min_body_chars
            )));
        }
        if self.config.require_code_snippets && !crate::chunk::has_code_snippet(&markdown) {
            return Err(DocdexError::Crawl("no code snippets in body".to_string()));
        }

        self.enqueue_links(db, source_id, page.depth, links).await?;

        let result = on_page(CrawledPage {
            url: page.url.clone(),
            normalized_url: page.normalized_url.clone(),
            title,
            markdown,
        });

        let db = lock_db(db)?;
        match result {
            Ok(()) => db.mark_page(page.id, CrawlStatus::Done, None)?,
            Err(e) => {
                db.mark_page(page.id, CrawlStatus::Failed, Some(&e.to_string()))?;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn enqueue_links(
        &self,
        db: &Mutex<LibraryDb>,
        source_id: i64,
        depth: u32,
        links: Vec<String>,
    ) -> Result<()> {
        if depth + 1 > self.limits.max_depth {
            return Ok(());
        }
        let db = lock_db(db)?;
        let mut total = db.crawl_counts(source_id)?.total() as u32;
        for link in links {
            if total >= self.limits.max_pages {
                break;
            }
            let Ok(url) = Url::parse(&link) else { continue };
            if !self.scope.in_scope(&url) {
                continue;
            }
            let Some(normalized) = normalize_url(&link) else {
                continue;
            };
            if db.enqueue_page(source_id, &link, &normalized, depth + 1)? {
                total += 1;
            }
        }
        Ok(())
    }

    /// Markdown content negotiation first, HTML second
    async fn fetch_page(&self, url: &str, user_agent: &str) -> Result<FetchedPage> {
        let response = self
            .client
            .get(url)
            .timeout(PAGE_TIMEOUT)
            .header(reqwest::header::ACCEPT, ACCEPT_MARKDOWN)
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocdexError::Crawl(format!("HTTP {} from {}", status, url)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        let body = response.text().await?;

        if content_type.contains("text/markdown")
            || (content_type.contains("text/plain") && looks_like_markdown(&body))
        {
            return Ok(FetchedPage::Markdown(body));
        }
        if content_type.contains("text/html") {
            return Ok(FetchedPage::Html(body));
        }

        // Neither markdown nor HTML by negotiation: ask again for HTML
        let response = self
            .client
            .get(url)
            .timeout(PAGE_TIMEOUT)
            .header(reqwest::header::ACCEPT, ACCEPT_HTML)
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DocdexError::Crawl(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }
        Ok(FetchedPage::Html(response.text().await?))
    }

    async fn render_headless(&self, url: &str, user_agent: &str) -> Option<String> {
        let session = self.headless.as_ref()?;
        debug!(url, "re-fetching sparse page via headless browser");
        session.render(url, user_agent).await
    }
}

enum FetchedPage {
    Markdown(String),
    Html(String),
}

/// Guards are short-lived and never held across an await
fn lock_db<'a>(db: &'a Mutex<LibraryDb>) -> Result<MutexGuard<'a, LibraryDb>> {
    db.lock()
        .map_err(|_| DocdexError::Crawl("library database lock poisoned".to_string()))
}

/// Synthetic document path for a crawled URL: host plus path with a
/// `.md` suffix, query folded in when present.
pub fn page_document_path(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return format!("{}.md", url.replace(['/', ':'], "_"));
    };
    let host = parsed.host_str().unwrap_or("page");
    let path = parsed.path().trim_matches('/');
    let mut out = if path.is_empty() {
        format!("{}/index", host)
    } else {
        format!("{}/{}", host, path)
    };
    if let Some(query) = parsed.query() {
        out.push('-');
        out.push_str(&query.replace(['=', '&'], "-"));
    }
    let out = out.trim_end_matches(".md").to_string();
    format!("{}.md", out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_document_path() {
        assert_eq!(
            page_document_path("https://hono.dev/docs/guides/testing"),
            "hono.dev/docs/guides/testing.md"
        );
        assert_eq!(page_document_path("https://hono.dev/"), "hono.dev/index.md");
        assert_eq!(
            page_document_path("https://hono.dev/docs/page.md"),
            "hono.dev/docs/page.md"
        );
        assert_eq!(
            page_document_path("https://hono.dev/docs?page=2"),
            "hono.dev/docs-page-2.md"
        );
    }

    #[test]
    fn test_user_agents_rotate() {
        let a = USER_AGENTS[1 % USER_AGENTS.len()];
        let b = USER_AGENTS[2 % USER_AGENTS.len()];
        assert_ne!(a, b);
    }
}
