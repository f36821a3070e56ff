//! CLI argument definitions

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "docdex")]
#[command(
    author,
    version,
    about = "Local-first documentation indexer and search engine"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit structured JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a library (owner/repo or a documentation URL)
    Add(AddArgs),

    /// Manage sources
    Source(SourceArgs),

    /// Sync and index sources
    Ingest(IngestArgs),

    /// Generate embeddings for indexed chunks
    Embed(EmbedArgs),

    /// Search a library
    Search(SearchArgs),

    /// Look up libraries and their versions
    Library(LibraryArgs),

    /// Print a document or a line slice of it
    Get(GetArgs),

    /// Show sources and index counts
    Status,

    /// Remove inactive documents and orphaned blobs
    Cleanup,

    /// Report detected browser and model availability
    Detect,

    /// Register and ingest sources from seed lists
    Seed(SeedArgs),

    /// Delete all databases and start fresh
    Reset(ResetArgs),
}

#[derive(Args)]
pub struct AddArgs {
    /// `owner/repo` for GitHub, or an http(s) URL for a website
    pub target: String,

    /// Display name (defaults to the target)
    #[arg(long)]
    pub name: Option<String>,

    /// Git ref to sync (GitHub sources)
    #[arg(long = "ref")]
    pub git_ref: Option<String>,

    /// Restrict indexing to this path inside the repo
    #[arg(long)]
    pub docs_path: Option<String>,

    /// Index the whole repo instead of docs only
    #[arg(long)]
    pub repo_mode: bool,

    /// Version label for the declared ref
    #[arg(long)]
    pub version: Option<String>,

    /// Allowed path prefixes (web sources)
    #[arg(long)]
    pub allow: Vec<String>,

    /// Denied path prefixes (web sources)
    #[arg(long)]
    pub deny: Vec<String>,

    /// Crawl depth limit (web sources)
    #[arg(long, default_value = "3")]
    pub max_depth: u32,

    /// Crawl page limit (web sources)
    #[arg(long, default_value = "500")]
    pub max_pages: u32,
}

#[derive(Args)]
pub struct SourceArgs {
    #[command(subcommand)]
    pub action: SourceAction,
}

#[derive(Subcommand)]
pub enum SourceAction {
    /// Register a library
    Add(AddArgs),
    /// List registered sources
    List,
    /// Remove a source by id
    #[command(alias = "rm")]
    Remove { id: i64 },
}

#[derive(Args)]
pub struct IngestArgs {
    /// Only this source (name, owner/repo, or id)
    #[arg(long)]
    pub source: Option<String>,

    /// Embed chunks after indexing
    #[arg(long)]
    pub embed: bool,

    /// Re-sync even when upstream looks unchanged
    #[arg(long)]
    pub force: bool,

    /// Bounded parallelism for files and pages
    #[arg(long, default_value = "5")]
    pub concurrency: usize,
}

#[derive(Args)]
pub struct EmbedArgs {
    /// Only this source (name, owner/repo, or id)
    #[arg(long)]
    pub source: Option<String>,

    /// Embedding model URI (overrides config)
    #[arg(long)]
    pub model: Option<String>,

    /// Clear stored embeddings and re-embed everything
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Library to search (name or owner/repo)
    #[arg(long)]
    pub library: String,

    /// word, vector, or hybrid
    #[arg(long, default_value = "hybrid")]
    pub mode: String,

    /// Restrict to one version label
    #[arg(long)]
    pub version: Option<String>,

    /// Search query
    #[arg(required = true)]
    pub query: Vec<String>,
}

#[derive(Args)]
pub struct LibraryArgs {
    /// Restrict to one version label
    #[arg(long)]
    pub version: Option<String>,

    /// Library name fragment
    #[arg(required = true)]
    pub query: Vec<String>,
}

#[derive(Args)]
pub struct GetArgs {
    /// Library to read from (name or owner/repo)
    #[arg(long)]
    pub library: String,

    /// Document id
    #[arg(long)]
    pub doc: Option<i64>,

    /// Document path or URI (when --doc is not given)
    pub target: Option<String>,

    /// Line range `start:end` (1-indexed, inclusive)
    #[arg(long)]
    pub slice: Option<String>,
}

#[derive(Args)]
pub struct SeedArgs {
    /// Seed files with one owner/repo or URL per line
    #[arg(long = "file")]
    pub files: Vec<String>,

    /// Seed URLs or owner/repo entries given inline
    #[arg(long = "url")]
    pub urls: Vec<String>,

    /// Register only, skip ingest
    #[arg(long)]
    pub no_ingest: bool,

    /// Skip the embedding pass
    #[arg(long)]
    pub no_embed: bool,

    /// Bounded parallelism for files and pages
    #[arg(long, default_value = "5")]
    pub concurrency: usize,
}

#[derive(Args)]
pub struct ResetArgs {
    /// Skip the confirmation flag; reset refuses without it
    #[arg(long)]
    pub yes: bool,
}
