//! Code chunking strategy
//!
//! Walks a tree-sitter syntax tree collecting symbol nodes
//! (functions, methods, classes, interfaces, structs, enums), splits
//! each symbol at a token target with line overlap, merges small
//! neighbors of the same symbol, and drops tiny nested duplicates.
//! Files without a grammar or without symbols fall back to plain
//! line chunking.

use super::{
    approx_tokens, split_by_tokens, ChunkDraft, ChunkType, Language, LinePart, Overlap,
    SymbolInfo, CODE_MAX_TOKENS, CODE_MERGE_MAX_TOKENS, CODE_OVERLAP_LINES, CODE_TARGET_TOKENS,
    CODE_TINY_TOKENS,
};
use tree_sitter::{Language as TsLanguage, Node, Parser};

/// Node kinds are matched by substring; a grammar's `method_definition`
/// and `function_item` both land in the right bucket without
/// per-language tables.
const SYMBOL_CATEGORIES: &[&str] = &[
    "function",
    "method",
    "class",
    "interface",
    "struct",
    "enum",
];

#[derive(Debug, Clone)]
struct Symbol {
    name: String,
    category: &'static str,
    start_byte: usize,
    end_byte: usize,
    start_line: usize,
}

/// One symbol part before formatting
#[derive(Debug, Clone)]
struct RawChunk {
    body: String,
    name: String,
    category: &'static str,
    id: String,
    part_index: Option<usize>,
    part_count: Option<usize>,
    start_line: usize,
    end_line: usize,
    char_start: usize,
    char_end: usize,
}

/// Chunk a source file
pub fn chunk_code(
    content: &str,
    language: Option<Language>,
    fence: &str,
    title: &str,
) -> Vec<ChunkDraft> {
    let symbols = language.and_then(|lang| parse_symbols(content, lang));
    let symbols = match symbols {
        Some(symbols) if !symbols.is_empty() => symbols,
        _ => return fallback_lines(content, fence, title),
    };

    let mut raw: Vec<RawChunk> = Vec::new();
    for symbol in symbols {
        let text = &content[symbol.start_byte..symbol.end_byte];
        let parts = split_symbol_text(text, symbol.start_line, fence_overhead(title, fence));
        let merged = merge_symbol_parts(parts);
        let count = merged.len();
        for (i, part) in merged.into_iter().enumerate() {
            raw.push(RawChunk {
                body: part.text,
                name: symbol.name.clone(),
                category: symbol.category,
                id: format!("{}:{}:{}", symbol.name, symbol.start_byte, symbol.end_byte),
                part_index: (count > 1).then_some(i),
                part_count: (count > 1).then_some(count),
                start_line: part.start_line,
                end_line: part.end_line,
                char_start: symbol.start_byte,
                char_end: symbol.end_byte,
            });
        }
    }

    let raw = drop_tiny_nested(raw);

    raw.into_iter()
        .map(|chunk| {
            let breadcrumb = format!("{} > {}", title, chunk.name);
            let content = format_code(&breadcrumb, fence, &chunk.body);
            let token_count = approx_tokens(&content);
            ChunkDraft {
                chunk_type: ChunkType::Code,
                content,
                context_path: Some(breadcrumb),
                language: non_empty(fence),
                symbol: Some(SymbolInfo {
                    name: chunk.name,
                    symbol_type: chunk.category.to_string(),
                    id: chunk.id,
                    part_index: chunk.part_index,
                    part_count: chunk.part_count,
                }),
                line_start: Some(chunk.start_line),
                line_end: Some(chunk.end_line),
                char_start: Some(chunk.char_start),
                char_end: Some(chunk.char_end),
                token_count,
            }
        })
        .collect()
}

fn non_empty(fence: &str) -> Option<String> {
    if fence.is_empty() {
        None
    } else {
        Some(fence.to_string())
    }
}

fn format_code(breadcrumb: &str, fence: &str, body: &str) -> String {
    format!("{}\n\n```{}\n{}\n```", breadcrumb, fence, body.trim_end())
}

/// Formatting overhead in tokens, so split budgets account for the
/// breadcrumb and fence lines
fn fence_overhead(title: &str, fence: &str) -> usize {
    approx_tokens(title) + approx_tokens(fence) + 4
}

/// Split symbol text at the target, tightening the budget until every
/// part stays under the formatted hard ceiling.
fn split_symbol_text(text: &str, first_line: usize, overhead: usize) -> Vec<LinePart> {
    let mut target = CODE_TARGET_TOKENS;
    loop {
        let parts = split_by_tokens(
            text,
            first_line,
            target,
            Overlap::Lines(CODE_OVERLAP_LINES),
            1,
        );
        let oversized = parts
            .iter()
            .any(|p| approx_tokens(&p.text) + overhead > CODE_MAX_TOKENS);
        if !oversized || target <= 32 {
            return parts;
        }
        target /= 2;
    }
}

/// Fragment size below which a part folds into its predecessor
const MERGE_FRAGMENT_TOKENS: usize = 80;

/// Merge a small trailing part of one symbol into its predecessor
/// while the combined body stays at or under the merge ceiling.
/// Overlap lines repeated at the seam are dropped from the later part.
fn merge_symbol_parts(parts: Vec<LinePart>) -> Vec<LinePart> {
    let mut out: Vec<LinePart> = Vec::with_capacity(parts.len());
    for part in parts {
        if let Some(last) = out.last_mut() {
            let part_tokens = approx_tokens(&part.text);
            let combined = approx_tokens(&last.text) + part_tokens;
            if part_tokens < MERGE_FRAGMENT_TOKENS && combined <= CODE_MERGE_MAX_TOKENS {
                let skip = (last.end_line + 1).saturating_sub(part.start_line);
                let fresh: Vec<&str> = part.text.lines().skip(skip).collect();
                if !fresh.is_empty() {
                    last.text.push('\n');
                    last.text.push_str(&fresh.join("\n"));
                }
                last.end_line = part.end_line.max(last.end_line);
                continue;
            }
        }
        out.push(part);
    }
    out
}

/// Remove chunks under the tiny threshold whose exact code sits inside
/// a containing chunk (line range contained, content substring).
fn drop_tiny_nested(raw: Vec<RawChunk>) -> Vec<RawChunk> {
    let keep: Vec<bool> = raw
        .iter()
        .map(|chunk| {
            if approx_tokens(&chunk.body) >= CODE_TINY_TOKENS {
                return true;
            }
            let duplicated = raw.iter().any(|other| {
                !std::ptr::eq(other, chunk)
                    && other.start_line <= chunk.start_line
                    && other.end_line >= chunk.end_line
                    && (other.start_line, other.end_line)
                        != (chunk.start_line, chunk.end_line)
                    && other.body.contains(chunk.body.trim())
            });
            !duplicated
        })
        .collect();

    raw.into_iter()
        .zip(keep)
        .filter_map(|(chunk, keep)| keep.then_some(chunk))
        .collect()
}

/// Line chunking for files without grammar support or symbols
fn fallback_lines(content: &str, fence: &str, title: &str) -> Vec<ChunkDraft> {
    if content.trim().is_empty() {
        return Vec::new();
    }
    split_by_tokens(
        content,
        1,
        CODE_TARGET_TOKENS,
        Overlap::Lines(CODE_OVERLAP_LINES),
        1,
    )
    .into_iter()
    .map(|part| {
        let content = format_code(title, fence, &part.text);
        let token_count = approx_tokens(&content);
        ChunkDraft {
            chunk_type: ChunkType::Code,
            content,
            context_path: Some(title.to_string()),
            language: non_empty(fence),
            symbol: None,
            line_start: Some(part.start_line),
            line_end: Some(part.end_line),
            char_start: None,
            char_end: None,
            token_count,
        }
    })
    .collect()
}

fn parse_symbols(content: &str, language: Language) -> Option<Vec<Symbol>> {
    let mut parser = Parser::new();
    parser.set_language(&grammar_for(language)).ok()?;
    let tree = parser.parse(content, None)?;

    let mut symbols = Vec::new();
    collect_symbols(content, tree.root_node(), &mut symbols);
    symbols.sort_by_key(|s| (s.start_byte, std::cmp::Reverse(s.end_byte)));
    Some(symbols)
}

fn grammar_for(language: Language) -> TsLanguage {
    match language {
        Language::Rust => tree_sitter_rust::LANGUAGE.into(),
        Language::Python => tree_sitter_python::LANGUAGE.into(),
        Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        Language::Go => tree_sitter_go::LANGUAGE.into(),
    }
}

fn symbol_category(kind: &str) -> Option<&'static str> {
    SYMBOL_CATEGORIES
        .iter()
        .find(|needle| kind.contains(*needle))
        .copied()
}

fn collect_symbols(source: &str, node: Node, symbols: &mut Vec<Symbol>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(category) = symbol_category(child.kind()) {
            symbols.push(Symbol {
                name: symbol_name(source, child),
                category,
                start_byte: child.start_byte(),
                end_byte: child.end_byte(),
                start_line: child.start_position().row + 1,
            });
        }
        collect_symbols(source, child, symbols);
    }
}

fn symbol_name(source: &str, node: Node) -> String {
    if let Some(name) = node.child_by_field_name("name") {
        return source[name.start_byte()..name.end_byte()].to_string();
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind().contains("identifier") {
            return source[child.start_byte()..child.end_byte()].to_string();
        }
    }
    "anonymous".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_symbols_extracted() {
        let source = r#"
/// Greets
fn hello() {
    println!("hi");
}

struct Point {
    x: i32,
    y: i32,
}

enum Shade {
    Light,
    Dark,
}
"#;
        let drafts = chunk_code(source, Some(Language::Rust), "rust", "lib.rs");
        let names: Vec<&str> = drafts
            .iter()
            .filter_map(|d| d.symbol.as_ref().map(|s| s.name.as_str()))
            .collect();
        assert!(names.contains(&"hello"));
        assert!(names.contains(&"Point"));
        assert!(names.contains(&"Shade"));

        let point = drafts
            .iter()
            .find(|d| d.symbol.as_ref().map(|s| s.name.as_str()) == Some("Point"))
            .unwrap();
        assert_eq!(point.symbol.as_ref().unwrap().symbol_type, "struct");
        assert!(point.content.starts_with("lib.rs > Point\n\n```rust\n"));
        assert!(point.content.ends_with("```"));
        assert!(point.line_start.unwrap() <= point.line_end.unwrap());
    }

    #[test]
    fn test_symbol_id_carries_offsets() {
        let source = "fn one() {}\n";
        let drafts = chunk_code(source, Some(Language::Rust), "rust", "a.rs");
        let id = &drafts[0].symbol.as_ref().unwrap().id;
        assert!(id.starts_with("one:"));
        assert_eq!(id.split(':').count(), 3);
    }

    #[test]
    fn test_large_symbol_splits_with_parts() {
        let mut body = String::from("fn big() {\n");
        for i in 0..400 {
            body.push_str(&format!("    let value_{:03} = compute({:03});\n", i, i));
        }
        body.push_str("}\n");

        let drafts = chunk_code(&body, Some(Language::Rust), "rust", "big.rs");
        let parts: Vec<&ChunkDraft> = drafts
            .iter()
            .filter(|d| d.symbol.as_ref().map(|s| s.name.as_str()) == Some("big"))
            .collect();
        assert!(parts.len() >= 2);

        let first = parts[0].symbol.as_ref().unwrap();
        assert_eq!(first.part_index, Some(0));
        assert_eq!(first.part_count, Some(parts.len()));
        for draft in &parts {
            assert!(draft.token_count <= CODE_MAX_TOKENS);
        }

        // Consecutive parts overlap by construction
        assert!(parts[1].line_start.unwrap() <= parts[0].line_end.unwrap());
    }

    #[test]
    fn test_split_union_minus_overlap_is_original() {
        let mut body = String::from("fn wide() {\n");
        for i in 0..240 {
            body.push_str(&format!("    step_{:03}();\n", i));
        }
        body.push_str("}\n");

        let overhead = fence_overhead("t.rs", "rust");
        let parts = split_symbol_text(body.trim_end(), 1, overhead);
        assert!(parts.len() >= 2);

        let mut rebuilt: Vec<String> = Vec::new();
        let mut covered = 0usize;
        for part in &parts {
            for (offset, line) in part.text.lines().enumerate() {
                let line_no = part.start_line + offset;
                if line_no > covered {
                    rebuilt.push(line.to_string());
                    covered = line_no;
                }
            }
        }
        assert_eq!(rebuilt.join("\n"), body.trim_end());
    }

    #[test]
    fn test_tiny_nested_method_dropped() {
        let source = r#"
class Widget {
    render() { return 1; }
}
"#;
        let drafts = chunk_code(source, Some(Language::JavaScript), "javascript", "w.js");
        // The class chunk survives; the one-line method inside it is
        // dropped as a duplicate.
        let names: Vec<&str> = drafts
            .iter()
            .filter_map(|d| d.symbol.as_ref().map(|s| s.name.as_str()))
            .collect();
        assert!(names.contains(&"Widget"));
        assert!(!names.contains(&"render"));
    }

    #[test]
    fn test_no_grammar_falls_back_to_lines() {
        let content = "key: value\nother: thing\n";
        let drafts = chunk_code(content, None, "yaml", "config.yaml");
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].symbol.is_none());
        assert!(drafts[0].content.contains("```yaml\n"));
        assert_eq!(drafts[0].context_path.as_deref(), Some("config.yaml"));
    }

    #[test]
    fn test_no_symbols_falls_back_to_lines() {
        let content = "// just comments\n// nothing else\n";
        let drafts = chunk_code(content, Some(Language::Rust), "rust", "empty.rs");
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].symbol.is_none());
    }

    #[test]
    fn test_empty_file_yields_nothing() {
        let drafts = chunk_code("", Some(Language::Rust), "rust", "void.rs");
        assert!(drafts.is_empty());
    }

    #[test]
    fn test_go_function_detected() {
        let source = "package main\n\nfunc Add(a, b int) int {\n\treturn a + b\n}\n";
        let drafts = chunk_code(source, Some(Language::Go), "go", "add.go");
        let add = drafts
            .iter()
            .find(|d| d.symbol.as_ref().map(|s| s.name.as_str()) == Some("Add"));
        assert!(add.is_some());
    }
}
