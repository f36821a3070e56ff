//! GitHub source synchronization
//!
//! Given owner/repo and a ref, produces either `not-modified` or a
//! stream of loaded files plus the resolved commit SHA, entity tag,
//! and a printable tree of what was kept.

pub mod archive;
pub mod filter;
pub mod versions;

pub use archive::{
    candidate_urls, extract_zip, walk_extracted, ArchiveOutcome, ExtractedFile, FetchedArchive,
    GitHubClient, SyncCursor, MAX_ARCHIVE_BYTES,
};
pub use filter::{should_index_path, SkipReason, MAX_FILE_BYTES};
pub use versions::{
    build_version_plan, extract_major_version, latest_tag_by_major, parse_semver_tag,
    parse_series_label, pick_default_version, pick_latest_for_series, PlanEntry, SemverTag,
};

use crate::db::hash_content;
use crate::error::Result;
use tracing::debug;

/// One file delivered by the sync stream
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub rel_path: String,
    pub content: String,
    pub hash: String,
}

/// A file the filter or reader rejected
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub rel_path: String,
    pub reason: String,
}

/// Result of a repo sync
#[derive(Debug)]
pub enum RepoSync {
    /// Upstream unchanged; prior SHA and etag still hold
    NotModified,
    Synced(SyncSummary),
}

/// Summary of one completed sync
#[derive(Debug)]
pub struct SyncSummary {
    pub commit: Option<String>,
    pub etag: Option<String>,
    pub loaded: usize,
    pub skipped: Vec<SkippedFile>,
    /// Printable tree of the kept files
    pub tree: String,
}

/// Download, extract, filter, and stream a repository snapshot.
///
/// Kept files are read as UTF-8, hashed, and handed to `on_file` one
/// at a time; nothing is accumulated beyond the summary.
pub async fn sync_repo(
    client: &GitHubClient,
    owner: &str,
    repo: &str,
    git_ref: Option<&str>,
    docs_path: Option<&str>,
    cursor: &SyncCursor,
    force: bool,
    mut on_file: impl FnMut(LoadedFile) -> Result<()>,
) -> Result<RepoSync> {
    let fetched = match client
        .fetch_archive(owner, repo, git_ref, cursor, force)
        .await?
    {
        ArchiveOutcome::NotModified => return Ok(RepoSync::NotModified),
        ArchiveOutcome::Fetched(fetched) => fetched,
    };

    let files = walk_extracted(&fetched.root, docs_path)?;
    let mut loaded = 0usize;
    let mut skipped = Vec::new();
    let mut kept_paths = Vec::new();

    for file in files {
        if let Err(reason) = should_index_path(&file.rel) {
            skipped.push(SkippedFile {
                rel_path: file.rel,
                reason: reason.as_str().to_string(),
            });
            continue;
        }

        let size = std::fs::metadata(&file.abs)?.len();
        if size > MAX_FILE_BYTES {
            skipped.push(SkippedFile {
                rel_path: file.rel,
                reason: SkipReason::FileTooLarge.as_str().to_string(),
            });
            continue;
        }

        let bytes = std::fs::read(&file.abs)?;
        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(_) => {
                skipped.push(SkippedFile {
                    rel_path: file.rel,
                    reason: SkipReason::NotUtf8.as_str().to_string(),
                });
                continue;
            }
        };

        let hash = hash_content(&content);
        kept_paths.push(file.rel.clone());
        on_file(LoadedFile {
            rel_path: file.rel,
            content,
            hash,
        })?;
        loaded += 1;
    }

    debug!(owner, repo, loaded, skipped = skipped.len(), "sync complete");
    // The temp dir unlinks here, on every exit path
    let tree = render_tree(&kept_paths);
    Ok(RepoSync::Synced(SyncSummary {
        commit: fetched.commit,
        etag: fetched.etag,
        loaded,
        skipped,
        tree,
    }))
}

/// Indented directory tree of the kept paths
pub fn render_tree(paths: &[String]) -> String {
    let mut out = String::new();
    let mut last_dirs: Vec<String> = Vec::new();

    for path in paths {
        let parts: Vec<&str> = path.split('/').collect();
        let (dirs, file) = parts.split_at(parts.len() - 1);

        let mut shared = 0;
        while shared < dirs.len()
            && shared < last_dirs.len()
            && last_dirs[shared] == dirs[shared]
        {
            shared += 1;
        }
        for (depth, dir) in dirs.iter().enumerate().skip(shared) {
            out.push_str(&"  ".repeat(depth));
            out.push_str(dir);
            out.push_str("/\n");
        }
        out.push_str(&"  ".repeat(dirs.len()));
        out.push_str(file[0]);
        out.push('\n');

        last_dirs = dirs.iter().map(|s| s.to_string()).collect();
    }
    out
}

/// Document URI for a GitHub file: `gh://owner/repo@label/relpath`
pub fn github_uri(owner: &str, repo: &str, label: &str, rel_path: &str) -> String {
    format!("gh://{}/{}@{}/{}", owner, repo, label, rel_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_tree() {
        let paths = vec![
            "docs/a.md".to_string(),
            "docs/guides/b.md".to_string(),
            "src/lib.rs".to_string(),
        ];
        let tree = render_tree(&paths);
        assert_eq!(tree, "docs/\n  a.md\n  guides/\n    b.md\nsrc/\n  lib.rs\n");
    }

    #[test]
    fn test_render_tree_root_files() {
        let tree = render_tree(&["README.md".to_string()]);
        assert_eq!(tree, "README.md\n");
    }

    #[test]
    fn test_github_uri() {
        assert_eq!(
            github_uri("honojs", "website", "16.x", "docs/index.md"),
            "gh://honojs/website@16.x/docs/index.md"
        );
    }
}
