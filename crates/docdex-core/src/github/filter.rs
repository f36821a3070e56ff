//! Repository path filtering
//!
//! Decides which extracted files are worth indexing: hidden and
//! generated trees are rejected wholesale, well-known lockfiles and
//! build artifacts by basename, binary and media payloads by
//! extension, minified and backup files by suffix.

/// Files above this size are reported as skipped
pub const MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;

/// Why a path was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    HiddenSegment(String),
    Lockfile,
    BinaryExtension(String),
    GeneratedSuffix(String),
    UnknownType,
    FileTooLarge,
    NotUtf8,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HiddenSegment(_) => "hidden_segment",
            Self::Lockfile => "lockfile",
            Self::BinaryExtension(_) => "binary_extension",
            Self::GeneratedSuffix(_) => "generated_suffix",
            Self::UnknownType => "unknown_type",
            Self::FileTooLarge => "file_too_large",
            Self::NotUtf8 => "not_utf8",
        }
    }
}

const HIDDEN_SEGMENTS: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    "target",
    "vendor",
    "coverage",
    "out",
    "__pycache__",
    ".git",
    ".github",
    ".cache",
    ".next",
    ".nuxt",
    ".venv",
];

const LOCKFILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "Cargo.lock",
    "composer.lock",
    "Gemfile.lock",
    "poetry.lock",
    "uv.lock",
    "go.sum",
    "flake.lock",
];

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "ico", "bmp", "svgz", "pdf", "zip", "tar", "gz",
    "tgz", "bz2", "xz", "7z", "rar", "jar", "war", "class", "exe", "dll", "so", "dylib", "a",
    "o", "bin", "dat", "db", "sqlite", "wasm", "woff", "woff2", "ttf", "otf", "eot", "mp3",
    "mp4", "avi", "mov", "webm", "ogg", "wav", "flac", "psd", "ai", "sketch", "fig", "pyc",
    "pyo", "node", "min",
];

const GENERATED_SUFFIXES: &[&str] = &[
    ".min.js",
    ".min.css",
    ".bundle.js",
    ".bundle.css",
    ".map",
    ".log",
    ".bak",
    ".tmp",
    ".swp",
    "~",
];

const TEXT_EXTENSIONS: &[&str] = &[
    "md", "mdx", "markdown", "mdown", "rst", "txt", "rs", "py", "pyi", "js", "mjs", "cjs",
    "jsx", "ts", "mts", "cts", "tsx", "go", "rb", "java", "c", "h", "cc", "cpp", "cxx",
    "hpp", "cs", "php", "swift", "kt", "kts", "scala", "sh", "bash", "zsh", "fish", "ps1",
    "sql", "html", "htm", "css", "scss", "sass", "less", "vue", "svelte", "astro", "json",
    "jsonc", "json5", "yml", "yaml", "toml", "ini", "cfg", "conf", "env", "xml", "svg",
    "graphql", "gql", "proto", "cmake", "gradle", "lua", "vim", "el", "ex", "exs", "erl",
    "hs", "ml", "mli", "clj", "cljs", "edn", "zig", "nim", "dart", "r", "jl", "tf", "hcl",
];

const SPECIAL_NAMES: &[&str] = &[
    "Dockerfile",
    "Makefile",
    "Rakefile",
    "Gemfile",
    "Justfile",
    "Procfile",
    "LICENSE",
    "README",
];

/// Decide whether a relative path should be indexed
pub fn should_index_path(rel_path: &str) -> Result<(), SkipReason> {
    for segment in rel_path.split('/') {
        let hidden = segment.starts_with('.') && segment.len() > 1;
        if hidden || HIDDEN_SEGMENTS.contains(&segment) {
            // Dotfiles in the repo root are fine when they are text
            // config (`.eslintrc`); directories are not.
            if segment != rel_path.rsplit('/').next().unwrap_or(rel_path)
                || HIDDEN_SEGMENTS.contains(&segment)
            {
                return Err(SkipReason::HiddenSegment(segment.to_string()));
            }
        }
    }

    let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
    if LOCKFILES.contains(&name) {
        return Err(SkipReason::Lockfile);
    }

    let lower = name.to_lowercase();
    for suffix in GENERATED_SUFFIXES {
        if lower.ends_with(suffix) {
            return Err(SkipReason::GeneratedSuffix(suffix.to_string()));
        }
    }

    if SPECIAL_NAMES.contains(&name) {
        return Ok(());
    }

    let ext = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
        _ => {
            // Extensionless files other than the special names are
            // usually binaries or scripts we cannot classify.
            return Err(SkipReason::UnknownType);
        }
    };

    if BINARY_EXTENSIONS.contains(&ext.as_str()) {
        return Err(SkipReason::BinaryExtension(ext));
    }
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        return Ok(());
    }
    Err(SkipReason::UnknownType)
}
