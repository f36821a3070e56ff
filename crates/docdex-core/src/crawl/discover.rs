//! Seed discovery for a web source
//!
//! Before the first crawl the queue is seeded from, in order:
//! `llms.txt` / `llms-full.txt` manifests, `Sitemap:` entries in
//! `robots.txt`, and `sitemap.xml`, following sitemap-index files a
//! few levels deep. URLs outside the root host and path are dropped
//! by the caller's scope filter.

use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const MANIFEST_TIMEOUT: Duration = Duration::from_secs(15);
const SITEMAP_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_SITEMAP_DEPTH: usize = 3;
const MAX_URL_CHARS: usize = 255;

/// Try every discovery channel and return candidate URLs
pub async fn discover_seeds(client: &reqwest::Client, root_url: &Url) -> Vec<String> {
    let mut seeds = Vec::new();

    for manifest in ["llms.txt", "llms-full.txt"] {
        for base in probe_bases(root_url, manifest) {
            if let Some(body) = fetch_text(client, &base, MANIFEST_TIMEOUT).await {
                let urls = parse_llms_manifest(&body, &base);
                if !urls.is_empty() {
                    info!(manifest = %base, count = urls.len(), "seeded from manifest");
                    seeds.extend(urls);
                }
            }
        }
        if !seeds.is_empty() {
            return dedupe(seeds);
        }
    }

    let mut sitemap_urls: Vec<String> = Vec::new();
    for base in probe_bases(root_url, "robots.txt") {
        if let Some(body) = fetch_text(client, &base, MANIFEST_TIMEOUT).await {
            sitemap_urls.extend(parse_robots_sitemaps(&body));
        }
    }
    if let Some(origin) = origin_join(root_url, "sitemap.xml") {
        sitemap_urls.push(origin);
    }

    for sitemap in dedupe(sitemap_urls) {
        let urls = walk_sitemap(client, &sitemap, 0).await;
        if !urls.is_empty() {
            info!(sitemap = %sitemap, count = urls.len(), "seeded from sitemap");
            seeds.extend(urls);
        }
    }

    dedupe(seeds)
}

/// Manifest probe locations: next to the root path, then the domain root
fn probe_bases(root_url: &Url, name: &str) -> Vec<Url> {
    let mut bases = Vec::new();
    let mut dir = root_url.clone();
    dir.set_query(None);
    dir.set_fragment(None);
    let path = dir.path().trim_end_matches('/').to_string();
    if !path.is_empty() {
        if let Ok(at_root_path) = dir.join(&format!("{}/{}", path, name)) {
            bases.push(at_root_path);
        }
    }
    if let Some(at_domain) = origin_join(root_url, name).and_then(|u| Url::parse(&u).ok()) {
        if !bases.iter().any(|b| b == &at_domain) {
            bases.push(at_domain);
        }
    }
    bases
}

fn origin_join(root_url: &Url, name: &str) -> Option<String> {
    let host = root_url.host_str()?;
    Some(format!("{}://{}/{}", root_url.scheme(), host, name))
}

async fn fetch_text(client: &reqwest::Client, url: &Url, timeout: Duration) -> Option<String> {
    let response = client
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        debug!(url = %url, status = %response.status(), "probe miss");
        return None;
    }
    response.text().await.ok()
}

/// Parse `- [title](url)` and bare `- url` list items, resolving
/// relative targets against the manifest location.
pub fn parse_llms_manifest(body: &str, base: &Url) -> Vec<String> {
    let mut urls = Vec::new();
    for line in body.lines() {
        let trimmed = line.trim();
        let Some(item) = trimmed.strip_prefix("- ").or(trimmed.strip_prefix("* ")) else {
            continue;
        };

        let target = if let (Some(open), Some(close)) = (item.find("]("), item.rfind(')')) {
            if open + 2 >= close {
                continue;
            }
            &item[open + 2..close]
        } else {
            item.split_whitespace().next().unwrap_or("")
        };

        if target.is_empty() {
            continue;
        }
        let resolved = match base.join(target) {
            Ok(url) => url.to_string(),
            Err(_) => continue,
        };
        if resolved.len() <= MAX_URL_CHARS {
            urls.push(resolved);
        }
    }
    urls
}

/// `Sitemap:` entries from robots.txt
pub fn parse_robots_sitemaps(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| {
            let line = line.trim();
            let value = line
                .strip_prefix("Sitemap:")
                .or_else(|| line.strip_prefix("sitemap:"))?;
            let value = value.trim();
            Url::parse(value).ok().map(|u| u.to_string())
        })
        .collect()
}

/// Fetch one sitemap, recursing into index entries
async fn walk_sitemap(client: &reqwest::Client, url: &str, depth: usize) -> Vec<String> {
    if depth >= MAX_SITEMAP_DEPTH {
        warn!(url, "sitemap index too deep, stopping");
        return Vec::new();
    }
    let Ok(parsed) = Url::parse(url) else {
        return Vec::new();
    };
    let Some(body) = fetch_text(client, &parsed, SITEMAP_TIMEOUT).await else {
        return Vec::new();
    };

    if body.contains("<sitemapindex") {
        let mut urls = Vec::new();
        for child in extract_locs(&body) {
            urls.extend(Box::pin(walk_sitemap(client, &child, depth + 1)).await);
        }
        urls
    } else {
        extract_locs(&body)
            .into_iter()
            .filter(|u| u.len() <= MAX_URL_CHARS)
            .collect()
    }
}

/// `<loc>` values from sitemap XML, by string scanning
pub fn extract_locs(content: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find("<loc>") {
        let after = &rest[start + 5..];
        let Some(end) = after.find("</loc>") else {
            break;
        };
        let value = after[..end].trim();
        if Url::parse(value).is_ok() {
            urls.push(value.to_string());
        }
        rest = &after[end + 6..];
    }
    urls
}

fn dedupe(urls: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}
