//! URL normalization and crawl scope rules

use crate::error::{DocdexError, Result};
use url::Url;

/// Normalize a URL for queue deduplication: lowercase host, collapse
/// duplicate slashes, strip the trailing slash and a trailing `.md`,
/// drop the fragment, keep scheme and query.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    url.set_fragment(None);

    let mut path = String::with_capacity(url.path().len());
    let mut last_was_slash = false;
    for ch in url.path().chars() {
        if ch == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        path.push(ch);
    }
    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".md").unwrap_or(path);
    let path = if path.is_empty() { "/" } else { path };
    url.set_path(path);

    // The url crate already lowercases registered hosts; normalize
    // percent-encoded leftovers defensively is out of scope here.
    Some(url.to_string().trim_end_matches('/').to_string())
}

/// Scope rules for one web source
#[derive(Debug, Clone)]
pub struct CrawlScope {
    root_host: String,
    root_path: String,
    allowed_paths: Vec<String>,
    denied_paths: Vec<String>,
    pub allow_subdomains: bool,
}

impl CrawlScope {
    pub fn new(
        root_url: &str,
        allowed_paths: Vec<String>,
        denied_paths: Vec<String>,
    ) -> Result<Self> {
        let root = Url::parse(root_url)
            .map_err(|_| DocdexError::InvalidUrl(root_url.to_string()))?;
        let root_host = root
            .host_str()
            .ok_or_else(|| DocdexError::InvalidUrl(format!("{} has no host", root_url)))?
            .to_lowercase();
        let root_path = root.path().trim_end_matches('/').to_string();

        Ok(Self {
            root_host,
            root_path,
            allowed_paths,
            denied_paths,
            allow_subdomains: false,
        })
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Whether a URL belongs to this crawl
    pub fn in_scope(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }
        let host = match url.host_str() {
            Some(host) => host.to_lowercase(),
            None => return false,
        };
        let host_ok = host == self.root_host
            || (self.allow_subdomains && host.ends_with(&format!(".{}", self.root_host)));
        if !host_ok {
            return false;
        }

        let path = url.path();
        if self
            .denied_paths
            .iter()
            .any(|denied| path.starts_with(denied.as_str()))
        {
            return false;
        }
        if !self.allowed_paths.is_empty() {
            return self
                .allowed_paths
                .iter()
                .any(|allowed| path.starts_with(allowed.as_str()));
        }
        self.root_path.is_empty() || path.starts_with(&self.root_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_and_collapses() {
        assert_eq!(
            normalize_url("https://Hono.DEV//docs//guides/").as_deref(),
            Some("https://hono.dev/docs/guides")
        );
        assert_eq!(
            normalize_url("https://hono.dev/docs/page.md").as_deref(),
            Some("https://hono.dev/docs/page")
        );
        assert_eq!(
            normalize_url("https://hono.dev/docs#section").as_deref(),
            Some("https://hono.dev/docs")
        );
        assert_eq!(
            normalize_url("https://hono.dev/docs?page=2").as_deref(),
            Some("https://hono.dev/docs?page=2")
        );
        assert!(normalize_url("not a url").is_none());
    }

    #[test]
    fn test_normalize_idempotent() {
        let inputs = [
            "https://Hono.DEV//docs/guides/",
            "https://hono.dev/docs/page.md",
            "https://hono.dev/",
            "https://hono.dev/a?q=1#frag",
        ];
        for input in inputs {
            let once = normalize_url(input).unwrap();
            let twice = normalize_url(&once).unwrap();
            assert_eq!(once, twice, "normalize not idempotent for {}", input);
        }
    }

    #[test]
    fn test_scope_host_and_prefix() {
        let scope = CrawlScope::new("https://hono.dev/docs", vec![], vec![]).unwrap();
        assert!(scope.in_scope(&Url::parse("https://hono.dev/docs/guides").unwrap()));
        assert!(!scope.in_scope(&Url::parse("https://hono.dev/blog").unwrap()));
        assert!(!scope.in_scope(&Url::parse("https://other.dev/docs").unwrap()));
        assert!(!scope.in_scope(&Url::parse("ftp://hono.dev/docs").unwrap()));
    }

    #[test]
    fn test_scope_subdomains() {
        let mut scope = CrawlScope::new("https://hono.dev/", vec![], vec![]).unwrap();
        assert!(!scope.in_scope(&Url::parse("https://api.hono.dev/x").unwrap()));
        scope.allow_subdomains = true;
        assert!(scope.in_scope(&Url::parse("https://api.hono.dev/x").unwrap()));
    }

    #[test]
    fn test_scope_allowed_and_denied() {
        let scope = CrawlScope::new(
            "https://hono.dev/",
            vec!["/docs".to_string()],
            vec!["/docs/internal".to_string()],
        )
        .unwrap();
        assert!(scope.in_scope(&Url::parse("https://hono.dev/docs/a").unwrap()));
        assert!(!scope.in_scope(&Url::parse("https://hono.dev/api").unwrap()));
        assert!(!scope.in_scope(&Url::parse("https://hono.dev/docs/internal/x").unwrap()));
    }
}
