//! File-extension dispatch for the chunking strategies

/// Languages with a bundled tree-sitter grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::Go => "go",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "rs" => Some(Self::Rust),
            "py" | "pyi" => Some(Self::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(Self::JavaScript),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "go" => Some(Self::Go),
            _ => None,
        }
    }
}

/// Which strategy handles a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    Markdown,
    Code {
        /// Grammar to parse with, when one is bundled
        language: Option<Language>,
        /// Name used on fenced code blocks
        fence: String,
    },
}

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "mdx", "markdown", "mdown", "rst", "txt"];

/// Decide the strategy and fence name for a path
pub fn file_kind(path: &str) -> FileKind {
    let name = path.rsplit('/').next().unwrap_or(path);
    let ext = name.rsplit('.').next().unwrap_or("").to_lowercase();

    if name.contains('.') && MARKDOWN_EXTENSIONS.contains(&ext.as_str()) {
        return FileKind::Markdown;
    }

    let language = Language::from_extension(&ext);
    let fence = language
        .map(|l| l.as_str().to_string())
        .unwrap_or_else(|| fence_for(name, &ext));
    FileKind::Code { language, fence }
}

fn fence_for(name: &str, ext: &str) -> String {
    match name {
        "Dockerfile" => return "dockerfile".to_string(),
        "Makefile" => return "makefile".to_string(),
        "Rakefile" | "Gemfile" => return "ruby".to_string(),
        _ => {}
    }
    match ext {
        "rb" => "ruby",
        "sh" | "bash" | "zsh" => "bash",
        "yml" | "yaml" => "yaml",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "" => "",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_family() {
        assert_eq!(file_kind("docs/guide.md"), FileKind::Markdown);
        assert_eq!(file_kind("README.mdx"), FileKind::Markdown);
        assert_eq!(file_kind("notes.txt"), FileKind::Markdown);
    }

    #[test]
    fn test_grammar_languages() {
        match file_kind("src/lib.rs") {
            FileKind::Code { language, fence } => {
                assert_eq!(language, Some(Language::Rust));
                assert_eq!(fence, "rust");
            }
            _ => panic!("expected code"),
        }
        match file_kind("app/page.tsx") {
            FileKind::Code { language, .. } => assert_eq!(language, Some(Language::Tsx)),
            _ => panic!("expected code"),
        }
    }

    #[test]
    fn test_no_grammar_keeps_fence() {
        match file_kind("config/app.yaml") {
            FileKind::Code { language, fence } => {
                assert_eq!(language, None);
                assert_eq!(fence, "yaml");
            }
            _ => panic!("expected code"),
        }
    }

    #[test]
    fn test_special_names() {
        match file_kind("Dockerfile") {
            FileKind::Code { fence, .. } => assert_eq!(fence, "dockerfile"),
            _ => panic!("expected code"),
        }
    }
}
