//! Repository archive fetching and extraction
//!
//! Downloads a zipball for a ref (API endpoint first, codeload
//! fallbacks after), enforces a streamed size cap, unzips into a
//! temporary directory with path sanitization, and recovers the
//! commit SHA so unchanged repos short-circuit to `not-modified`.

use crate::error::{DocdexError, Result};
use reqwest::{header, StatusCode};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Archive download cap
pub const MAX_ARCHIVE_BYTES: u64 = 500 * 1024 * 1024;

const ARCHIVE_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_DELAY: Duration = Duration::from_millis(750);

/// What the previous sync knew
#[derive(Debug, Clone, Default)]
pub struct SyncCursor {
    pub commit: Option<String>,
    pub etag: Option<String>,
}

/// Outcome of an archive fetch
#[derive(Debug)]
pub enum ArchiveOutcome {
    /// Upstream unchanged (304, or the resolved SHA matches)
    NotModified,
    Fetched(FetchedArchive),
}

/// A downloaded and extracted archive
#[derive(Debug)]
pub struct FetchedArchive {
    pub commit: Option<String>,
    pub etag: Option<String>,
    /// Extraction root; removed when dropped
    pub temp: TempDir,
    /// Directory holding the repo contents (top-level dir stripped)
    pub root: PathBuf,
}

/// GitHub HTTP client for archives, tags, and repo metadata
pub struct GitHubClient {
    http: reqwest::Client,
    token: Option<String>,
}

#[derive(serde::Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(serde::Deserialize)]
struct RepoInfo {
    default_branch: String,
}

impl GitHubClient {
    pub fn new(token: Option<String>, proxy: Option<&str>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("docdex/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10));
        if let Some(endpoint) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(endpoint)?);
        }
        Ok(Self {
            http: builder.build()?,
            token,
        })
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(header::AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Fetch and extract the zipball for a ref.
    ///
    /// Candidates are tried in order with a short delay after each
    /// retryable failure; the last error surfaces when all are
    /// exhausted.
    pub async fn fetch_archive(
        &self,
        owner: &str,
        repo: &str,
        git_ref: Option<&str>,
        cursor: &SyncCursor,
        force: bool,
    ) -> Result<ArchiveOutcome> {
        let mut last_error: Option<DocdexError> = None;

        for url in candidate_urls(owner, repo, git_ref) {
            debug!(url = %url, "fetching archive");
            let mut request = self
                .auth(self.http.get(&url))
                .timeout(ARCHIVE_TIMEOUT);
            if let (Some(etag), false) = (&cursor.etag, force) {
                request = request.header(header::IF_NONE_MATCH, etag.clone());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(url = %url, error = %e, "archive request failed");
                    last_error = Some(e.into());
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            match classify_status(&response) {
                StatusClass::NotModified => return Ok(ArchiveOutcome::NotModified),
                StatusClass::TokenInvalid => return Err(DocdexError::TokenInvalid),
                StatusClass::RateLimited => return Err(DocdexError::RateLimited),
                StatusClass::NotFound => {
                    last_error = Some(DocdexError::Sync(format!(
                        "archive not found: {}",
                        url
                    )));
                    continue;
                }
                StatusClass::Retryable(status) => {
                    last_error = Some(DocdexError::Sync(format!(
                        "transient {} from {}",
                        status, url
                    )));
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
                StatusClass::Ok => {}
            }

            let etag = response
                .headers()
                .get(header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let header_sha = response
                .headers()
                .get("x-github-sha")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            let bytes = read_capped(response).await?;
            let (temp, root, top_dir) = extract_zip(&bytes)?;

            let commit = recover_commit_sha(
                header_sha.as_deref(),
                top_dir.as_deref(),
                &url,
                cursor.commit.as_deref(),
            );

            if !force {
                if let (Some(new), Some(prev)) = (&commit, &cursor.commit) {
                    if new == prev {
                        return Ok(ArchiveOutcome::NotModified);
                    }
                }
            }

            return Ok(ArchiveOutcome::Fetched(FetchedArchive {
                commit,
                etag,
                temp,
                root,
            }));
        }

        Err(last_error.unwrap_or_else(|| {
            DocdexError::Sync(format!("no archive candidates for {}/{}", owner, repo))
        }))
    }

    /// List tag names, first page ordered newest-first by GitHub
    pub async fn list_tags(&self, owner: &str, repo: &str) -> Result<Vec<String>> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/tags?per_page=100",
            owner, repo
        );
        let response = self
            .auth(self.http.get(&url))
            .timeout(Duration::from_secs(15))
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        match classify_status(&response) {
            StatusClass::TokenInvalid => return Err(DocdexError::TokenInvalid),
            StatusClass::RateLimited => return Err(DocdexError::RateLimited),
            StatusClass::NotFound => {
                return Err(DocdexError::Sync(format!("{}/{} not found", owner, repo)))
            }
            _ => {}
        }

        let tags: Vec<TagEntry> = response.json().await?;
        Ok(tags.into_iter().map(|t| t.name).collect())
    }

    /// Default branch from the repo metadata endpoint
    pub async fn default_branch(&self, owner: &str, repo: &str) -> Result<String> {
        let url = format!("https://api.github.com/repos/{}/{}", owner, repo);
        let response = self
            .auth(self.http.get(&url))
            .timeout(Duration::from_secs(15))
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        match classify_status(&response) {
            StatusClass::TokenInvalid => Err(DocdexError::TokenInvalid),
            StatusClass::RateLimited => Err(DocdexError::RateLimited),
            StatusClass::NotFound => {
                Err(DocdexError::Sync(format!("{}/{} not found", owner, repo)))
            }
            _ => {
                let info: RepoInfo = response.json().await?;
                Ok(info.default_branch)
            }
        }
    }
}

enum StatusClass {
    Ok,
    NotModified,
    TokenInvalid,
    RateLimited,
    NotFound,
    Retryable(StatusCode),
}

fn classify_status(response: &reqwest::Response) -> StatusClass {
    let status = response.status();
    match status {
        StatusCode::NOT_MODIFIED => StatusClass::NotModified,
        StatusCode::UNAUTHORIZED => StatusClass::TokenInvalid,
        StatusCode::FORBIDDEN => {
            let exhausted = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .map(|v| v == "0")
                .unwrap_or(false);
            if exhausted {
                StatusClass::RateLimited
            } else {
                StatusClass::Retryable(status)
            }
        }
        StatusCode::NOT_FOUND => StatusClass::NotFound,
        StatusCode::TOO_MANY_REQUESTS => StatusClass::Retryable(status),
        s if s.is_server_error() => StatusClass::Retryable(status),
        s if s.is_success() => StatusClass::Ok,
        s => StatusClass::Retryable(s),
    }
}

/// Zipball URL candidates, API endpoint first
pub fn candidate_urls(owner: &str, repo: &str, git_ref: Option<&str>) -> Vec<String> {
    let mut urls = vec![format!(
        "https://api.github.com/repos/{}/{}/zipball/{}",
        owner,
        repo,
        git_ref.unwrap_or("HEAD")
    )];

    if let Some(r) = git_ref {
        if looks_like_sha(r) {
            urls.push(format!(
                "https://codeload.github.com/{}/{}/zip/{}",
                owner, repo, r
            ));
        }
        urls.push(format!(
            "https://codeload.github.com/{}/{}/zip/refs/heads/{}",
            owner, repo, r
        ));
        urls.push(format!(
            "https://codeload.github.com/{}/{}/zip/refs/tags/{}",
            owner, repo, r
        ));
    }
    urls.push(format!(
        "https://codeload.github.com/{}/{}/zip/HEAD",
        owner, repo
    ));
    urls
}

fn looks_like_sha(s: &str) -> bool {
    s.len() >= 7 && s.len() <= 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Recover the commit SHA: response header, then the trailing hex of
/// the archive's top-level directory, then hex in the URL tail, then
/// whatever the previous sync knew.
pub fn recover_commit_sha(
    header_sha: Option<&str>,
    top_dir: Option<&str>,
    url: &str,
    previous: Option<&str>,
) -> Option<String> {
    if let Some(sha) = header_sha.filter(|s| looks_like_sha(s)) {
        return Some(sha.to_string());
    }
    if let Some(dir) = top_dir {
        if let Some(tail) = dir.rsplit('-').next() {
            if looks_like_sha(tail) {
                return Some(tail.to_string());
            }
        }
    }
    if let Some(tail) = url.rsplit('/').next() {
        if looks_like_sha(tail) {
            return Some(tail.to_string());
        }
    }
    previous.map(|s| s.to_string())
}

async fn read_capped(response: reqwest::Response) -> Result<Vec<u8>> {
    if let Some(length) = response.content_length() {
        if length > MAX_ARCHIVE_BYTES {
            return Err(DocdexError::Archive(format!(
                "archive is {} bytes, cap is {}",
                length, MAX_ARCHIVE_BYTES
            )));
        }
    }

    let mut bytes = Vec::new();
    let mut response = response;
    while let Some(chunk) = response.chunk().await? {
        if bytes.len() as u64 + chunk.len() as u64 > MAX_ARCHIVE_BYTES {
            return Err(DocdexError::Archive(format!(
                "archive exceeded the {}-byte cap while streaming",
                MAX_ARCHIVE_BYTES
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Unzip into a temp dir, stripping one shared top-level directory.
/// Entries with absolute paths or parent traversal are skipped, as
/// are symlinks.
pub fn extract_zip(bytes: &[u8]) -> Result<(TempDir, PathBuf, Option<String>)> {
    let temp = TempDir::new()?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;

    let top_dir = common_top_dir(&mut archive);

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        if is_symlink(&entry) {
            debug!(name = entry.name(), "skipping symlink entry");
            continue;
        }
        let Some(sanitized) = sanitize_entry_path(entry.name(), top_dir.as_deref()) else {
            warn!(name = entry.name(), "skipping unsafe archive path");
            continue;
        };

        let dest = temp.path().join(&sanitized);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut contents)?;
        std::fs::write(&dest, contents)?;
    }

    let root = temp.path().to_path_buf();
    Ok((temp, root, top_dir))
}

fn is_symlink(entry: &zip::read::ZipFile) -> bool {
    entry
        .unix_mode()
        .map(|mode| mode & 0o170000 == 0o120000)
        .unwrap_or(false)
}

fn common_top_dir<R: Read + std::io::Seek>(archive: &mut zip::ZipArchive<R>) -> Option<String> {
    let mut top: Option<String> = None;
    for name in archive.file_names() {
        // A root-level file means there is no shared directory
        let (first, rest) = name.split_once('/')?;
        if first.is_empty() || rest.is_empty() && !name.ends_with('/') {
            return None;
        }
        match &top {
            None => top = Some(first.to_string()),
            Some(existing) if existing == first => {}
            Some(_) => return None,
        }
    }
    top
}

/// Reject absolute paths and traversal; strip the shared top dir
fn sanitize_entry_path(name: &str, top_dir: Option<&str>) -> Option<PathBuf> {
    if name.starts_with('/') || name.contains('\\') {
        return None;
    }
    let mut parts: Vec<&str> = Vec::new();
    for part in name.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            other => parts.push(other),
        }
    }
    if let Some(top) = top_dir {
        if parts.first() == Some(&top) {
            parts.remove(0);
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.iter().collect())
}

/// One file from the extracted tree
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    pub abs: PathBuf,
    pub rel: String,
}

/// Walk the extracted tree from an optional base path, returning
/// files sorted by relative path.
pub fn walk_extracted(root: &Path, base_path: Option<&str>) -> Result<Vec<ExtractedFile>> {
    let start = match base_path {
        Some(base) if !base.is_empty() => root.join(base),
        _ => root.to_path_buf(),
    };
    if !start.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut stack = vec![start];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                let rel = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                files.push(ExtractedFile { abs: path, rel });
            }
        }
    }

    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn make_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            for (name, contents) in entries {
                writer
                    .start_file(name.to_string(), SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(contents.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_candidate_urls_order() {
        let urls = candidate_urls("honojs", "hono", Some("v4.0.0"));
        assert!(urls[0].contains("api.github.com/repos/honojs/hono/zipball/v4.0.0"));
        assert!(urls.iter().any(|u| u.contains("refs/heads/v4.0.0")));
        assert!(urls.iter().any(|u| u.contains("refs/tags/v4.0.0")));
        assert!(urls.last().unwrap().ends_with("zip/HEAD"));

        let urls = candidate_urls("o", "r", Some("abc123def456"));
        assert!(urls[1].ends_with("/zip/abc123def456"));
    }

    #[test]
    fn test_recover_commit_sha_order() {
        let sha = "0123456789abcdef0123456789abcdef01234567";
        assert_eq!(
            recover_commit_sha(Some(sha), Some("repo-deadbeef0"), "url", None).as_deref(),
            Some(sha)
        );
        assert_eq!(
            recover_commit_sha(None, Some("owner-repo-deadbeef0"), "url", None).as_deref(),
            Some("deadbeef0")
        );
        assert_eq!(
            recover_commit_sha(None, None, "https://x/zip/cafebabe12", None).as_deref(),
            Some("cafebabe12")
        );
        assert_eq!(
            recover_commit_sha(None, None, "https://x/zip/HEAD", Some("aaaa")).as_deref(),
            Some("aaaa")
        );
    }

    #[test]
    fn test_extract_strips_top_dir() {
        let bytes = make_zip(&[
            ("repo-abc1234/README.md", "# Hi"),
            ("repo-abc1234/docs/guide.md", "guide"),
        ]);
        let (temp, root, top) = extract_zip(&bytes).unwrap();
        assert_eq!(top.as_deref(), Some("repo-abc1234"));
        assert!(root.join("README.md").exists());
        assert!(root.join("docs/guide.md").exists());
        drop(temp);
    }

    #[test]
    fn test_extract_rejects_traversal() {
        let bytes = make_zip(&[("top/../../etc/passwd", "nope"), ("top/ok.md", "fine")]);
        let (_temp, root, _top) = extract_zip(&bytes).unwrap();
        assert!(root.join("ok.md").exists());
        assert!(!root.join("../etc/passwd").exists());
    }

    #[test]
    fn test_walk_extracted_sorted_and_scoped() {
        let bytes = make_zip(&[
            ("r/docs/b.md", "b"),
            ("r/docs/a.md", "a"),
            ("r/src/main.rs", "fn main() {}"),
        ]);
        let (_temp, root, _) = extract_zip(&bytes).unwrap();

        let all = walk_extracted(&root, None).unwrap();
        let rels: Vec<&str> = all.iter().map(|f| f.rel.as_str()).collect();
        assert_eq!(rels, vec!["docs/a.md", "docs/b.md", "src/main.rs"]);

        let docs = walk_extracted(&root, Some("docs")).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|f| f.rel.starts_with("docs/")));

        let missing = walk_extracted(&root, Some("nope")).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_sanitize_entry_path() {
        assert!(sanitize_entry_path("/abs/path", None).is_none());
        assert!(sanitize_entry_path("a/../../b", None).is_none());
        assert_eq!(
            sanitize_entry_path("top/a/b.md", Some("top")),
            Some(PathBuf::from("a/b.md"))
        );
        assert!(sanitize_entry_path("top/", Some("top")).is_none());
    }
}
